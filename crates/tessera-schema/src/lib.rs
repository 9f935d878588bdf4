//! Tessera Schema
//!
//! Typed parameter schemas for operators exposed by an extension node.
//!
//! An operator declares an ordered list of [`Parameter`]s, each tagged with a
//! closed [`ParameterType`]. The schema is validated once at registration and
//! is then used for two things:
//! - input coercion, which decides how a raw payload value becomes a call
//!   argument (file download, archive extraction, subgraph binding, ...)
//! - metadata, serialized for the dispatcher UI
//!
//! This crate also owns the reserved wire values shared by the dispatcher
//! protocol (see [`sentinel`]).

mod error;
mod operator;
mod parameter;
pub mod sentinel;

pub use error::RegistrationError;
pub use operator::{OperatorSchema, RESERVED_PARAMETER_NAMES};
pub use parameter::{Parameter, ParameterType};
