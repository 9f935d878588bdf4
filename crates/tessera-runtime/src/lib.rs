//! Tessera Runtime
//!
//! Executes operators on behalf of the dispatcher. An invocation flows
//! through:
//!
//! 1. **Lookup** of the operator in the [`OperatorRegistry`]
//! 2. **Coercion** of the request's values into [`Argument`]s (downloads,
//!    archive extraction, subgraph binding, null substitution)
//! 3. **Fan-out** when arguments are batch-marked
//! 4. **Execution** of the handler in a private work dir
//! 5. **Reporting** of outputs or failure to the dispatcher
//!
//! Requests are queued on an [`InvocationRunner`] so the transport can
//! acknowledge them before they run.

mod archive;
mod argument;
mod context;
mod error;
mod input;
mod operator;
mod output;
mod pipeline;
mod registry;
mod report;
mod request;
mod runner;
mod runtime;
mod sandbox;

pub use argument::Argument;
pub use context::OperatorContext;
pub use error::{PipelineError, QueueError};
pub use operator::{Operator, OperatorBuilder, OperatorHandler};
pub use output::{Output, OutputValue, Outputs};
pub use registry::OperatorRegistry;
pub use request::{InvocationBody, InvocationRequest, NodePayload};
pub use runner::{InvocationRunner, InvocationSender, RunnerConfig};
pub use runtime::{ExtensionRuntime, RuntimeConfig};

pub use tessera_remote::{Invocable, RemoteError, RemoteInvoker, invocable_fn, map};
pub use tessera_schema::{ParameterType, RegistrationError};
