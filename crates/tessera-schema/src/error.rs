use thiserror::Error;

/// Errors raised while validating an operator schema at registration time.
#[derive(Debug, Error, PartialEq)]
pub enum RegistrationError {
  /// The parameter type is not representable, e.g. an `Option` nested in an `Option`.
  #[error("parameter '{parameter}' of operator '{operator}' has an invalid type: {message}")]
  InvalidParameterType {
    operator: String,
    parameter: String,
    message: String,
  },

  /// The declared default does not match the parameter type.
  #[error("parameter '{parameter}' of operator '{operator}' has an invalid default: {message}")]
  InvalidDefault {
    operator: String,
    parameter: String,
    message: String,
  },

  /// The parameter name is reserved for context-supplied values.
  #[error("parameter name '{parameter}' of operator '{operator}' is reserved")]
  ReservedName { operator: String, parameter: String },

  /// Two parameters share the same name.
  #[error("operator '{operator}' declares parameter '{parameter}' more than once")]
  DuplicateParameter { operator: String, parameter: String },

  /// An operator was built without a handler.
  #[error("operator '{operator}' has no handler")]
  MissingHandler { operator: String },
}
