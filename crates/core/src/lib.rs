//! # Coronest Core
//!
//! Engine-independent building blocks for the Coronest scripting runtime.
//!
//! This crate defines the host side of the host/script boundary:
//!
//! - **Value model**: the polymorphic [`Value`] type exchanged with the VM,
//!   with opaque [`Foreign`] references for objects that cross the boundary
//!   without a data representation
//! - **Suspend results**: how long-running host operations answer a
//!   suspended script call ([`SuspendResult`])
//! - **Project collaborators**: the interfaces the runtime uses to reach
//!   project resources, the filesystem sandbox, the UI thread, and the
//!   host's evaluation contexts ([`Project`])
//!
//! The script engine itself lives in `coronest-runtime`; nothing in this
//! crate depends on it.

#![warn(rustdoc::missing_crate_level_docs)]

/// Core error types and result handling
pub mod error;
/// Project collaborator interfaces and defaults
pub mod project;
/// Suspend results delivered by host operations
pub mod suspend;
/// Host value model
pub mod value;

pub use error::{CoreError, CoreResult};
pub use project::{
    confine_path, DirectoryProject, EvalContext, EvaluationSource, InlineDispatcher,
    NullEvaluationSource, PathPolicy, Project, ResourceProvider, UiDispatcher,
};
pub use suspend::SuspendResult;
pub use value::{Foreign, Key, Value};
