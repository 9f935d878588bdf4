//! Demo operators served by the `tessera` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use tessera_runtime::{
  Argument, Operator, OperatorContext, OperatorRegistry, Output, Outputs, ParameterType,
  RegistrationError, map,
};

pub fn registry() -> Result<OperatorRegistry, RegistrationError> {
  let registry = OperatorRegistry::new();

  registry.register(
    Operator::builder("operation")
      .name("Operation")
      .description("Basic math operations on two numbers.")
      .param(
        "operation",
        ParameterType::choice(["Add", "Subtract", "Multiply", "Divide"]),
      )
      .param("a", ParameterType::num())
      .param("b", ParameterType::num())
      .handler(operation)
      .build()?,
  );

  registry.register(
    Operator::builder("add_one")
      .name("Add One")
      .param("num", ParameterType::num())
      .handler(add_one)
      .build()?,
  );

  registry.register(
    Operator::builder("num_list")
      .name("Number List")
      .handler(|_ctx: OperatorContext, _args: Vec<Argument>| async move {
        Ok::<Outputs, anyhow::Error>(json!([1, 2, 3, 4, 5]).into())
      })
      .build()?,
  );

  registry.register(
    Operator::builder("boolean")
      .name("Boolean")
      .param_with_default("b", ParameterType::option(ParameterType::Bool), json!(true))
      .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
        Ok::<Outputs, anyhow::Error>(json!(args[0].as_bool()).into())
      })
      .build()?,
  );

  registry.register(
    Operator::builder("twooutputs")
      .name("Two Outputs")
      .num_outputs(2)
      .param("s", ParameterType::String)
      .param("num", ParameterType::num())
      .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
        let s = args[0].as_value().cloned().unwrap_or_default();
        let num = args[1].as_value().cloned().unwrap_or_default();
        Ok::<Outputs, anyhow::Error>((s, num).into())
      })
      .build()?,
  );

  registry.register(
    Operator::builder("head")
      .name("Head")
      .description("First lines of a text file")
      .param("file", ParameterType::file_with_extensions(["csv", "tsv", "txt"]))
      .param_with_default("rows", ParameterType::integer(), json!(5))
      .handler(head)
      .build()?,
  );

  registry.register(
    Operator::builder("list_dir")
      .name("List Directory")
      .param("dir", ParameterType::Dir)
      .handler(list_dir)
      .build()?,
  );

  registry.register(
    Operator::builder("echo_json")
      .name("Echo JSON")
      .param("value", ParameterType::Json)
      .handler(|_ctx: OperatorContext, args: Vec<Argument>| async move {
        Ok::<Outputs, anyhow::Error>(args[0].as_value().cloned().unwrap_or_default().into())
      })
      .build()?,
  );

  registry.register(
    Operator::builder("map")
      .name("Map")
      .description("Apply a subgraph to every item of a list")
      .param("lst", ParameterType::Json)
      .param("fn", ParameterType::Func)
      .param("batch_size", ParameterType::option(ParameterType::integer()))
      .handler(map_items)
      .build()?,
  );

  Ok(registry)
}

fn apply(operation: &str, a: f64, b: f64) -> Result<f64> {
  match operation {
    "Add" => Ok(a + b),
    "Subtract" => Ok(a - b),
    "Multiply" => Ok(a * b),
    "Divide" if b == 0.0 => bail!("division by zero"),
    "Divide" => Ok(a / b),
    other => bail!("unknown operation '{}'", other),
  }
}

fn number(args: &[Argument], index: usize, name: &str) -> Result<f64> {
  args[index]
    .as_f64()
    .ok_or_else(|| anyhow!("'{}' must be a number", name))
}

async fn operation(_ctx: OperatorContext, args: Vec<Argument>) -> Result<Outputs> {
  let op = args[0].as_str().unwrap_or_default();
  let result = apply(op, number(&args, 1, "a")?, number(&args, 2, "b")?)?;
  Ok(json!(result).into())
}

async fn add_one(ctx: OperatorContext, args: Vec<Argument>) -> Result<Outputs> {
  let num = number(&args, 0, "num")?;
  ctx.progress(format!("num has value {}", num)).await;
  match args[0].as_i64() {
    Some(n) => Ok(json!(n + 1).into()),
    None => Ok(json!(num + 1.0).into()),
  }
}

async fn head(ctx: OperatorContext, args: Vec<Argument>) -> Result<Outputs> {
  let path = args[0].as_path().context("no input file")?;
  let rows = args[1].as_i64().unwrap_or(5).max(0) as usize;

  let text = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;
  let mut head: String = text.lines().take(rows).collect::<Vec<_>>().join("\n");
  head.push('\n');

  tokio::fs::write(ctx.work_dir().join("head.txt"), head).await?;
  Ok(Output::file("head.txt").into())
}

/// Relative paths of every file under `root`, sorted.
async fn walk(root: &Path) -> Result<Vec<String>> {
  let mut files = Vec::new();
  let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

  while let Some(dir) = pending.pop() {
    let mut entries = tokio::fs::read_dir(&dir)
      .await
      .with_context(|| format!("failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if entry.file_type().await?.is_dir() {
        pending.push(path);
      } else if let Ok(relative) = path.strip_prefix(root) {
        files.push(relative.to_string_lossy().replace('\\', "/"));
      }
    }
  }

  files.sort();
  Ok(files)
}

async fn list_dir(_ctx: OperatorContext, args: Vec<Argument>) -> Result<Outputs> {
  let dir = args[0].as_path().context("no input directory")?;
  Ok(json!(walk(dir).await?).into())
}

async fn map_items(ctx: OperatorContext, args: Vec<Argument>) -> Result<Outputs> {
  let items = match args[0].as_value() {
    Some(Value::Array(items)) => items.clone(),
    Some(other) => bail!("'lst' must be a list, got {}", other),
    None => bail!("'lst' is required"),
  };
  let f = args[1].as_func().context("'fn' must be a subgraph")?;
  let batch_size = args[2].as_i64().and_then(|n| usize::try_from(n).ok());

  ctx
    .progress(format!("mapping {} items", items.len()))
    .await;
  let results = map(items, f, batch_size).await?;
  Ok(Value::Array(results).into())
}
