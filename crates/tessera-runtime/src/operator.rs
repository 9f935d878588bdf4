//! Operators and their handlers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tessera_schema::{OperatorSchema, Parameter, ParameterType, RegistrationError};

use crate::argument::Argument;
use crate::context::OperatorContext;
use crate::output::Outputs;

/// The function behind an operator.
///
/// Any `Fn(OperatorContext, Vec<Argument>) -> impl Future<Output =
/// anyhow::Result<Outputs>>` closure is a handler.
#[async_trait]
pub trait OperatorHandler: Send + Sync {
  async fn call(&self, ctx: OperatorContext, args: Vec<Argument>) -> anyhow::Result<Outputs>;
}

#[async_trait]
impl<F, Fut> OperatorHandler for F
where
  F: Fn(OperatorContext, Vec<Argument>) -> Fut + Send + Sync,
  Fut: Future<Output = anyhow::Result<Outputs>> + Send,
{
  async fn call(&self, ctx: OperatorContext, args: Vec<Argument>) -> anyhow::Result<Outputs> {
    (self)(ctx, args).await
  }
}

/// A validated schema paired with its handler.
#[derive(Clone)]
pub struct Operator {
  schema: OperatorSchema,
  handler: Arc<dyn OperatorHandler>,
}

impl Operator {
  pub fn builder(operator_id: impl Into<String>) -> OperatorBuilder {
    OperatorBuilder::new(operator_id.into())
  }

  pub fn schema(&self) -> &OperatorSchema {
    &self.schema
  }

  pub fn id(&self) -> &str {
    &self.schema.operator_id
  }

  pub(crate) fn handler(&self) -> Arc<dyn OperatorHandler> {
    self.handler.clone()
  }
}

impl std::fmt::Debug for Operator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Operator")
      .field("schema", &self.schema)
      .finish_non_exhaustive()
  }
}

/// Builds an [`Operator`], validating its schema in [`build`](Self::build).
pub struct OperatorBuilder {
  operator_id: String,
  name: Option<String>,
  description: Option<String>,
  num_outputs: usize,
  parameters: Vec<Parameter>,
  handler: Option<Arc<dyn OperatorHandler>>,
}

impl OperatorBuilder {
  fn new(operator_id: String) -> Self {
    Self {
      operator_id,
      name: None,
      description: None,
      num_outputs: 1,
      parameters: Vec::new(),
      handler: None,
    }
  }

  /// Display name; defaults to the operator id.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn num_outputs(mut self, num_outputs: usize) -> Self {
    self.num_outputs = num_outputs;
    self
  }

  pub fn param(mut self, name: impl Into<String>, ty: ParameterType) -> Self {
    self.parameters.push(Parameter::new(name, ty));
    self
  }

  pub fn param_with_default(
    mut self,
    name: impl Into<String>,
    ty: ParameterType,
    default: Value,
  ) -> Self {
    self.parameters.push(Parameter::with_default(name, ty, default));
    self
  }

  pub fn handler<H: OperatorHandler + 'static>(mut self, handler: H) -> Self {
    self.handler = Some(Arc::new(handler));
    self
  }

  pub fn build(self) -> Result<Operator, RegistrationError> {
    let schema = OperatorSchema {
      name: self.name.unwrap_or_else(|| self.operator_id.clone()),
      operator_id: self.operator_id,
      description: self.description,
      parameters: self.parameters,
      num_outputs: self.num_outputs,
    };
    schema.validate()?;

    let handler = self.handler.ok_or_else(|| RegistrationError::MissingHandler {
      operator: schema.operator_id.clone(),
    })?;

    Ok(Operator { schema, handler })
  }
}
