//! End-to-end tests of the invocation pipeline against a recording dispatcher.

mod common;

use std::sync::{Arc, Mutex};

use common::{RecordingDispatcher, ok, request, runtime, stored_zip};
use serde_json::{Value, json};
use tessera_runtime::{
  Argument, Operator, OperatorContext, OperatorRegistry, Output, ParameterType, PipelineError,
};
use tessera_schema::sentinel::{NULL_VALUE, mark_batch};

type Calls = Arc<Mutex<Vec<Vec<Value>>>>;

fn values(args: &[Argument]) -> Vec<Value> {
  args
    .iter()
    .map(|arg| arg.as_value().cloned().unwrap_or(Value::Null))
    .collect()
}

/// `concat(a, b)` returns `"{a}{b}"` and records every call.
fn concat(calls: Calls) -> Operator {
  Operator::builder("concat")
    .param("a", ParameterType::Json)
    .param("b", ParameterType::Json)
    .handler(move |_ctx: OperatorContext, args: Vec<Argument>| {
      let calls = calls.clone();
      async move {
        let vals = values(&args);
        calls.lock().unwrap().push(vals.clone());
        let text = |v: &Value| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
        ok(json!(format!("{}{}", text(&vals[0]), text(&vals[1]))))
      }
    })
    .build()
    .unwrap()
}

fn setup(operators: Vec<Operator>) -> (tessera_runtime::ExtensionRuntime, Arc<RecordingDispatcher>) {
  let registry = OperatorRegistry::new();
  for op in operators {
    registry.register(op);
  }
  let dispatcher = Arc::new(RecordingDispatcher::default());
  (runtime(registry, dispatcher.clone()), dispatcher)
}

#[tokio::test]
async fn test_plain_outputs_reported_as_finished() {
  let add_one = Operator::builder("add_one")
    .param("num", ParameterType::num())
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      ok(json!(args[0].as_f64().unwrap_or_default() + 1.0))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![add_one]);

  runtime
    .execute(request(&runtime, "add_one", vec![json!(41)]))
    .await
    .unwrap();

  let finished = dispatcher.finished();
  assert_eq!(finished.len(), 1);
  assert_eq!(finished[0].node, "n1");
  assert_eq!(finished[0].output, vec![json!(42.0)]);
  assert!(dispatcher.errors().is_empty());
}

#[tokio::test]
async fn test_file_output_selects_finished_file() {
  let op = Operator::builder("write")
    .num_outputs(2)
    .handler(|ctx: OperatorContext, _args: Vec<Argument>| async move {
      tokio::fs::write(ctx.work_dir().join("out.txt"), "hello").await?;
      ok((json!("plain"), Output::file("out.txt")))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  runtime
    .execute(request(&runtime, "write", vec![]))
    .await
    .unwrap();

  assert!(dispatcher.finished().is_empty());
  let finished_files = dispatcher.finished_files.lock().unwrap();
  assert_eq!(finished_files.len(), 1);

  let (node, output, files) = &finished_files[0];
  assert_eq!(node, "n1");
  assert_eq!(output, &vec![json!("plain"), json!("")]);
  assert_eq!(files.len(), 1);
  assert_eq!(files[0].index, 1);
  assert_eq!(files[0].file_name, "out.txt");
  assert_eq!(&files[0].data[..], b"hello");
}

#[tokio::test]
async fn test_null_sentinel_substitution() {
  let op = Operator::builder("defaults")
    .num_outputs(3)
    .param("flag", ParameterType::option(ParameterType::Bool))
    .param_with_default("n", ParameterType::num(), json!(5))
    .param("label", ParameterType::option(ParameterType::String))
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      let label = if args[2].is_unset() { json!("unset") } else { json!("set") };
      ok((json!(args[0].as_bool()), json!(args[1].as_i64()), label))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  runtime
    .execute(request(
      &runtime,
      "defaults",
      vec![json!(NULL_VALUE), json!(NULL_VALUE), json!(NULL_VALUE)],
    ))
    .await
    .unwrap();

  assert_eq!(
    dispatcher.finished()[0].output,
    vec![json!(false), json!(5), json!("unset")]
  );
}

#[tokio::test]
async fn test_dir_input_extracted_under_archive_name() {
  let op = Operator::builder("list_dir")
    .num_outputs(2)
    .param("dir", ParameterType::Dir)
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      let dir = args[0].as_path().map(|p| p.to_path_buf()).unwrap_or_default();
      let name = dir.file_name().map(|n| n.to_string_lossy().into_owned());
      let nested = tokio::fs::read_to_string(dir.join("sub/b.txt")).await?;
      ok((json!(name), json!(nested)))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);
  dispatcher.serve(
    "http://store/images.zip?sig=abc",
    stored_zip(&[("a.txt", b"alpha"), ("sub/", b""), ("sub/b.txt", b"beta")]),
  );

  runtime
    .execute(request(
      &runtime,
      "list_dir",
      vec![json!({ "url": "http://store/images.zip?sig=abc" })],
    ))
    .await
    .unwrap();

  assert_eq!(
    dispatcher.finished()[0].output,
    vec![json!("images"), json!("beta")]
  );
}

#[tokio::test]
async fn test_file_input_downloaded_with_base_name() {
  let op = Operator::builder("head")
    .param("file", ParameterType::file_with_extensions(["txt"]))
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      let path = args[0].as_path().map(|p| p.to_path_buf()).unwrap_or_default();
      let text = tokio::fs::read_to_string(&path).await?;
      let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
      ok(json!([name, text]))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);
  dispatcher.serve("http://store/abc", b"line one".to_vec());

  runtime
    .execute(request(
      &runtime,
      "head",
      vec![json!({ "url": "http://store/abc", "name": "notes.txt" })],
    ))
    .await
    .unwrap();

  assert_eq!(
    dispatcher.finished()[0].output,
    vec![json!(["notes.txt", "line one"])]
  );
}

#[tokio::test]
async fn test_reference_without_url_is_invalid() {
  let op = Operator::builder("list_dir")
    .param("dir", ParameterType::Dir)
    .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move { ok(Value::Null) })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  let err = runtime
    .execute(request(&runtime, "list_dir", vec![json!({ "name": "images.zip" })]))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::InvalidFileReference { index: 0, .. }));
  let errors = dispatcher.errors();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].node, "n1");
  assert!(errors[0].error.contains("invalid file reference"));
  assert!(dispatcher.finished().is_empty());
}

#[tokio::test]
async fn test_disallowed_extension_rejected() {
  let op = Operator::builder("csv")
    .param("file", ParameterType::file_with_extensions(["csv"]))
    .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move { ok(Value::Null) })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);
  dispatcher.serve("http://store/a.png", vec![0]);

  let err = runtime
    .execute(request(&runtime, "csv", vec![json!({ "url": "http://store/a.png" })]))
    .await
    .unwrap_err();
  assert!(matches!(err, PipelineError::InvalidFileReference { .. }));
}

#[tokio::test]
async fn test_single_batched_argument_fans_out() {
  let calls: Calls = Arc::default();
  let (runtime, dispatcher) = setup(vec![concat(calls.clone())]);

  runtime
    .execute(request(
      &runtime,
      "concat",
      vec![mark_batch(vec![json!(1), json!(2), json!(3)]), json!("x")],
    ))
    .await
    .unwrap();

  assert_eq!(
    *calls.lock().unwrap(),
    vec![
      vec![json!(1), json!("x")],
      vec![json!(2), json!("x")],
      vec![json!(3), json!("x")],
    ]
  );
  assert_eq!(
    dispatcher.finished()[0].output,
    vec![json!(["1x", "2x", "3x"])]
  );
}

#[tokio::test]
async fn test_all_batched_arguments_are_zipped() {
  let calls: Calls = Arc::default();
  let (runtime, dispatcher) = setup(vec![concat(calls.clone())]);

  runtime
    .execute(request(
      &runtime,
      "concat",
      vec![
        mark_batch(vec![json!("a"), json!("b")]),
        mark_batch(vec![json!(1), json!(2)]),
      ],
    ))
    .await
    .unwrap();

  assert_eq!(
    *calls.lock().unwrap(),
    vec![vec![json!("a"), json!(1)], vec![json!("b"), json!(2)]]
  );
  assert_eq!(dispatcher.finished()[0].output, vec![json!(["a1", "b2"])]);
}

#[tokio::test]
async fn test_unequal_batches_rejected() {
  let calls: Calls = Arc::default();
  let (runtime, dispatcher) = setup(vec![concat(calls.clone())]);

  let err = runtime
    .execute(request(
      &runtime,
      "concat",
      vec![
        mark_batch(vec![json!("a"), json!("b")]),
        mark_batch(vec![json!(1)]),
      ],
    ))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::InputBinding { .. }));
  assert!(calls.lock().unwrap().is_empty());
  assert_eq!(dispatcher.errors().len(), 1);
}

#[tokio::test]
async fn test_batched_file_outputs_are_uploaded() {
  let op = Operator::builder("touch")
    .param("name", ParameterType::String)
    .handler(|ctx: OperatorContext, args: Vec<Argument>| async move {
      assert!(ctx.is_batched());
      let name = args[0].as_str().unwrap_or("file").to_string();
      tokio::fs::write(ctx.work_dir().join(&name), name.as_bytes()).await?;
      ok(Output::file(name))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  runtime
    .execute(request(
      &runtime,
      "touch",
      vec![mark_batch(vec![json!("a.txt"), json!("b.txt")])],
    ))
    .await
    .unwrap();

  assert_eq!(dispatcher.uploads.lock().unwrap().len(), 2);
  let output = &dispatcher.finished()[0].output;
  assert_eq!(output[0][0]["name"], "a.txt");
  assert_eq!(output[0][1]["name"], "b.txt");
}

#[tokio::test]
async fn test_argument_count_must_match_parameters() {
  let calls: Calls = Arc::default();
  let (runtime, dispatcher) = setup(vec![concat(calls.clone())]);

  let err = runtime
    .execute(request(&runtime, "concat", vec![json!(1)]))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::InputBinding { .. }));
  assert!(calls.lock().unwrap().is_empty());
  assert!(dispatcher.errors()[0].error.contains("takes 2 arguments, got 1"));
}

#[tokio::test]
async fn test_unknown_operator_reported() {
  let (runtime, dispatcher) = setup(vec![]);

  let err = runtime
    .execute(request(&runtime, "missing", vec![]))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::UnknownOperator { .. }));
  assert_eq!(dispatcher.errors().len(), 1);
}

#[tokio::test]
async fn test_handler_error_carries_trace() {
  let op = Operator::builder("fail")
    .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move {
      let parsed: anyhow::Result<i64> = "x".parse::<i64>().map_err(anyhow::Error::from);
      let n = anyhow::Context::context(parsed, "parsing the count")?;
      ok(json!(n))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  let err = runtime
    .execute(request(&runtime, "fail", vec![]))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::OperatorExecution { .. }));
  let trace = &dispatcher.errors()[0].error;
  assert!(trace.contains("parsing the count"));
  assert!(trace.contains("invalid digit"));
}

#[tokio::test]
async fn test_unreachable_error_endpoint_keeps_original_error() {
  let op = Operator::builder("fail")
    .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move {
      if true {
        anyhow::bail!("disk full");
      }
      ok(Value::Null)
    })
    .build()
    .unwrap();
  let registry = OperatorRegistry::new();
  registry.register(op);
  let dispatcher = Arc::new(RecordingDispatcher {
    fail_error: true,
    ..RecordingDispatcher::default()
  });
  let runtime = runtime(registry, dispatcher.clone());

  let err = runtime
    .execute(request(&runtime, "fail", vec![]))
    .await
    .unwrap_err();

  match err {
    PipelineError::OperatorExecution { trace } => assert!(trace.contains("disk full")),
    other => panic!("expected operator failure, got {:?}", other),
  }
  assert!(dispatcher.errors().is_empty());
  assert!(dispatcher.finished().is_empty());
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
  let op = Operator::builder("panic")
    .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move {
      if true {
        panic!("boom");
      }
      ok(Value::Null)
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  let err = runtime
    .execute(request(&runtime, "panic", vec![]))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::OperatorExecution { .. }));
  assert!(dispatcher.errors()[0].error.contains("boom"));
}

#[tokio::test]
async fn test_progress_is_best_effort() {
  let op = Operator::builder("chatty")
    .handler(|ctx: OperatorContext, _args: Vec<Argument>| async move {
      ctx.progress("halfway").await;
      ok(json!("done"))
    })
    .build()
    .unwrap();

  let registry = OperatorRegistry::new();
  registry.register(op);
  let dispatcher = Arc::new(RecordingDispatcher {
    fail_progress: true,
    ..RecordingDispatcher::default()
  });
  let runtime = runtime(registry, dispatcher.clone());

  runtime
    .execute(request(&runtime, "chatty", vec![]))
    .await
    .unwrap();

  assert_eq!(dispatcher.finished()[0].output, vec![json!("done")]);
}

#[tokio::test]
async fn test_progress_reaches_dispatcher() {
  let op = Operator::builder("chatty")
    .handler(|ctx: OperatorContext, _args: Vec<Argument>| async move {
      ctx.progress("halfway").await;
      ok(json!("done"))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  runtime
    .execute(request(&runtime, "chatty", vec![]))
    .await
    .unwrap();

  let progress = dispatcher.progress.lock().unwrap();
  assert_eq!(progress.len(), 1);
  assert_eq!(progress[0].node, "n1");
  assert_eq!(progress[0].message, "halfway");
}

#[tokio::test]
async fn test_func_argument_binds_without_network() {
  let op = Operator::builder("bind")
    .param("f", ParameterType::Func)
    .param("fs", ParameterType::Funcs)
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      let f = args[0].as_func().map(|f| f.graph()["id"].clone());
      let n = args[1].as_funcs().map(|fs| fs.len());
      ok(json!([f, n]))
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  runtime
    .execute(request(
      &runtime,
      "bind",
      vec![
        json!({ "id": "g1", "input_ids": [] }),
        json!([{ "id": "g2" }, { "id": "g3" }]),
      ],
    ))
    .await
    .unwrap();

  assert_eq!(dispatcher.finished()[0].output, vec![json!(["g1", 2])]);
}

#[tokio::test]
async fn test_remote_failure_surfaces_as_execution_error() {
  let op = Operator::builder("call")
    .param("f", ParameterType::Func)
    .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
      let f = args[0]
        .as_func()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing subgraph"))?;
      let value = f.call(vec![json!(1)]).await?;
      ok(value)
    })
    .build()
    .unwrap();
  let (runtime, dispatcher) = setup(vec![op]);

  let err = runtime
    .execute(request(
      &runtime,
      "call",
      vec![json!({ "id": "g", "input_ids": [{ "id": 1 }] })],
    ))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::OperatorExecution { .. }));
  assert!(dispatcher.errors()[0].error.contains("failed to connect"));
}
