//! # Coronest Runtime
//!
//! An embeddable Lua 5.4 scripting runtime that lets a host expose
//! privileged, long-running operations to untrusted scripts as ordinary
//! synchronous calls.
//!
//! ## Features
//!
//! - **Suspendable host calls**: a script calls a wrapped host operation
//!   like any other function; under the hood the call yields a suspend
//!   token to a private system coroutine, and the supervisor awaits the
//!   host's future before resuming
//! - **Immediate invocations**: short script snippets run synchronously
//!   from any thread, concurrently with suspended scripts in flight
//! - **Two coroutine namespaces**: scripts keep a fully functional
//!   `coroutine` table of their own; the runtime's suspension machinery
//!   lives in a separate namespace that never collides with it
//! - **Sandboxed imports and files**: `require` resolves through the
//!   project's resource layer, `io.open` is confined to the project root
//! - **Value bridge**: total bidirectional conversion between host and
//!   script values, with opaque identity-preserving references for
//!   everything else
//!
//! ## Architecture
//!
//! - [`VmContainer`]: one interpreter behind a reentrant lock
//! - [`coronest`]: the bootstrap that splits the coroutine namespaces
//! - [`bridge`]: host/script value conversion
//! - [`HostSuspendable`] / [`HostCallable`]: host-function wrappers
//! - [`Runtime::invoke_immediate`] / [`Runtime::invoke_suspending`]: the
//!   invocation supervisor
//!
//! ## Example
//!
//! ```rust,no_run
//! use coronest_core::{DirectoryProject, InlineDispatcher, NullEvaluationSource, Project};
//! use coronest_runtime::{Runtime, RuntimeOptions};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = Arc::new(DirectoryProject::new("/path/to/project"));
//! let project = Project::new(
//!     dir.clone(),
//!     dir,
//!     Arc::new(InlineDispatcher),
//!     Arc::new(NullEvaluationSource),
//! );
//! let runtime = Runtime::make(project, RuntimeOptions::default())?;
//!
//! let code = runtime.read("return 1 + 1", None)?;
//! let value = runtime.eval(&code)?;
//! assert_eq!(value.as_int()?, 2);
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

/// Host/script value conversion
pub mod bridge;
/// Execution contexts and their dynamic binding
pub mod context;
/// The coroutine-namespace bootstrap
pub mod coronest;
/// Runtime error types and result handling
pub mod error;
/// Runtime assembly and code operations
pub mod runtime;
/// Invocation supervisor and the suspension drive loop
pub mod supervisor;
/// Suspendable and regular host-callable wrappers
pub mod suspend;
/// The locked VM container
pub mod vm;

mod sandbox;

pub use bridge::{from_lua, to_lua};
pub use context::{ExecutionContext, InvocationMode};
pub use coronest::{CoroutineNamespace, BOOTSTRAP, BOOTSTRAP_NAME};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{Code, OutputSink, Runtime, RuntimeOptions};
pub use supervisor::{ScriptFuture, IMMEDIATE_YIELD_ERROR};
pub use suspend::{
    HostCallable, HostSuspendable, SuspendFuture, IMMEDIATE_SUSPEND_ERROR,
};
pub use vm::VmContainer;

// The host value model and project interfaces, re-exported for embedders.
pub use coronest_core::{
    CoreError, CoreResult, DirectoryProject, EvalContext, EvaluationSource, Foreign,
    InlineDispatcher, Key, NullEvaluationSource, PathPolicy, Project, ResourceProvider,
    SuspendResult, UiDispatcher, Value,
};

// The embedded engine, re-exported so hosts can write suspendables over
// raw script values.
pub use mlua;
