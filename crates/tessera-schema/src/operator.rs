use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::parameter::Parameter;

/// Parameter names supplied by the runtime rather than the caller: the
/// progress logging callback and the batch-control flag.
pub const RESERVED_PARAMETER_NAMES: [&str; 2] = ["log", "batch"];

/// Metadata describing a registered operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSchema {
  /// Display name.
  pub name: String,
  /// Identifier used in `/operator/{operator}` routes.
  #[serde(rename = "operator")]
  pub operator_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Ordered parameters; positional inputs bind to them 1:1.
  #[serde(rename = "args")]
  pub parameters: Vec<Parameter>,
  pub num_outputs: usize,
}

impl OperatorSchema {
  /// Validate every parameter and the parameter list as a whole.
  pub fn validate(&self) -> Result<(), RegistrationError> {
    let mut seen = HashSet::new();

    for param in &self.parameters {
      if RESERVED_PARAMETER_NAMES.contains(&param.name.as_str()) {
        return Err(RegistrationError::ReservedName {
          operator: self.operator_id.clone(),
          parameter: param.name.clone(),
        });
      }

      if !seen.insert(param.name.as_str()) {
        return Err(RegistrationError::DuplicateParameter {
          operator: self.operator_id.clone(),
          parameter: param.name.clone(),
        });
      }

      param.validate(&self.operator_id)?;
    }

    Ok(())
  }
}
