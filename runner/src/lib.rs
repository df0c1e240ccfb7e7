pub mod adapter;
pub mod dispatch;
pub mod error;
pub mod executor;

pub use adapter::{Adapter, Invocation, SourceDelivery};
pub use dispatch::{Dispatcher, execute};
pub use error::{DispatchError, ExecError};
pub use executor::{
    CancelToken, ExecMode, ExecOptions, ExecOutcome, Executor, Job, PipelineExecutor, PtyExecutor,
    Termination,
};
