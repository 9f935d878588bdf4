use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistrationError;

/// The closed set of parameter types an operator may declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterType {
  /// One of a fixed list of strings.
  Choice { choices: Vec<String> },
  /// A number, optionally restricted to integers and bounded.
  Num {
    floating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_value: Option<f64>,
  },
  String,
  Bool,
  /// A file reference, downloaded to a local path before the call.
  File {
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_extensions: Option<Vec<String>>,
  },
  /// A zip archive reference, extracted to a local directory before the call.
  Dir,
  /// Arbitrary JSON passed through untouched.
  Json,
  /// A subgraph bound to a remote callable.
  Func,
  /// A list of subgraphs, each bound to a remote callable.
  Funcs,
  /// A value that may be left unset by the caller.
  Option { inner: Box<ParameterType> },
}

impl ParameterType {
  pub fn choice<I, S>(choices: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::Choice {
      choices: choices.into_iter().map(Into::into).collect(),
    }
  }

  pub fn num() -> Self {
    Self::Num {
      floating: true,
      min_value: None,
      max_value: None,
    }
  }

  pub fn integer() -> Self {
    Self::Num {
      floating: false,
      min_value: None,
      max_value: None,
    }
  }

  pub fn bounded(min_value: Option<f64>, max_value: Option<f64>) -> Self {
    Self::Num {
      floating: true,
      min_value,
      max_value,
    }
  }

  pub fn file() -> Self {
    Self::File {
      allowed_extensions: None,
    }
  }

  pub fn file_with_extensions<I, S>(extensions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::File {
      allowed_extensions: Some(extensions.into_iter().map(Into::into).collect()),
    }
  }

  pub fn option(inner: ParameterType) -> Self {
    Self::Option {
      inner: Box::new(inner),
    }
  }

  /// The type with any `Option` wrapper removed.
  pub fn inner(&self) -> &ParameterType {
    match self {
      Self::Option { inner } => inner,
      other => other,
    }
  }

  pub fn is_option(&self) -> bool {
    matches!(self, Self::Option { .. })
  }

  /// Name of the type tag as it appears in metadata.
  pub fn tag(&self) -> &'static str {
    match self {
      Self::Choice { .. } => "Choice",
      Self::Num { .. } => "Num",
      Self::String => "String",
      Self::Bool => "Bool",
      Self::File { .. } => "File",
      Self::Dir => "Dir",
      Self::Json => "Json",
      Self::Func => "Func",
      Self::Funcs => "Funcs",
      Self::Option { .. } => "Option",
    }
  }

  /// Check that `value` is acceptable as a default for this type.
  ///
  /// Returns a human readable reason on mismatch.
  fn check_default(&self, value: &Value) -> Result<(), String> {
    match self {
      Self::Choice { choices } => match value.as_str() {
        Some(s) if choices.iter().any(|c| c == s) => Ok(()),
        Some(s) => Err(format!("'{}' is not one of {:?}", s, choices)),
        None => Err(format!("expected a string choice, got {}", value)),
      },
      Self::Num {
        floating,
        min_value,
        max_value,
      } => {
        let n = value
          .as_f64()
          .ok_or_else(|| format!("expected a number, got {}", value))?;
        if !floating && n.fract() != 0.0 {
          return Err(format!("expected an integer, got {}", n));
        }
        if let Some(min) = min_value
          && n < *min
        {
          return Err(format!("{} is below the minimum {}", n, min));
        }
        if let Some(max) = max_value
          && n > *max
        {
          return Err(format!("{} is above the maximum {}", n, max));
        }
        Ok(())
      }
      Self::String => value
        .is_string()
        .then_some(())
        .ok_or_else(|| format!("expected a string, got {}", value)),
      Self::Bool => value
        .is_boolean()
        .then_some(())
        .ok_or_else(|| format!("expected a boolean, got {}", value)),
      Self::Json => Ok(()),
      Self::File { .. } | Self::Dir | Self::Func | Self::Funcs => {
        Err(format!("{} parameters cannot declare a default", self.tag()))
      }
      Self::Option { inner } => inner.check_default(value),
    }
  }
}

/// A single declared operator parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
  pub name: String,
  pub ty: ParameterType,
  /// Used when the caller supplies the null sentinel.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
}

impl Parameter {
  pub fn new(name: impl Into<String>, ty: ParameterType) -> Self {
    Self {
      name: name.into(),
      ty,
      default: None,
    }
  }

  pub fn with_default(name: impl Into<String>, ty: ParameterType, default: Value) -> Self {
    Self {
      name: name.into(),
      ty,
      default: Some(default),
    }
  }

  pub fn is_optional(&self) -> bool {
    self.ty.is_option()
  }

  /// The value substituted for the null sentinel.
  ///
  /// An `Option<Bool>` without an explicit default resolves to `false`;
  /// everything else resolves to its declared default, which may be absent.
  pub fn null_substitute(&self) -> Option<Value> {
    match (&self.ty, &self.default) {
      (ParameterType::Option { inner }, None) if **inner == ParameterType::Bool => {
        Some(Value::Bool(false))
      }
      (_, default) => default.clone(),
    }
  }

  /// Validate the parameter for an operator named `operator`.
  pub(crate) fn validate(&self, operator: &str) -> Result<(), RegistrationError> {
    if let ParameterType::Option { inner } = &self.ty
      && inner.is_option()
    {
      return Err(RegistrationError::InvalidParameterType {
        operator: operator.to_string(),
        parameter: self.name.clone(),
        message: "Option must wrap a non-Option type".to_string(),
      });
    }

    if let Some(default) = &self.default {
      self
        .ty
        .check_default(default)
        .map_err(|message| RegistrationError::InvalidDefault {
          operator: operator.to_string(),
          parameter: self.name.clone(),
          message,
        })?;
    }

    Ok(())
  }
}
