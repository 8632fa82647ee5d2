//! Project collaborator interfaces.
//!
//! The runtime never touches the filesystem, the UI thread, or the host's
//! data graph directly. It goes through the four interfaces defined here,
//! bundled into a [`Project`]. Hosts supply their own implementations; a
//! directory-backed default is provided for tools and tests.

use crate::error::{CoreError, CoreResult};
use crate::value::Foreign;
use path_clean::PathClean;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves project resource paths to their contents.
///
/// Used by the sandboxed module loader: `require` asks for
/// `"pkg/mod.lua"` and receives the resource bytes, or `None` when no such
/// resource exists.
pub trait ResourceProvider: Send + Sync {
    /// Returns the bytes of the resource at `path`, or `None`.
    fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// Decides whether a script may open a filesystem path.
///
/// Returns the resolved real path for allowed paths and a sandbox refusal
/// for paths escaping the project root.
pub trait PathPolicy: Send + Sync {
    /// Resolves `path` against the project root, refusing escapes.
    fn resolve(&self, path: &str) -> CoreResult<PathBuf>;
}

/// Submits work to the host's UI thread.
pub trait UiDispatcher: Send + Sync {
    /// Runs `job` on the UI thread. Ordering of submitted jobs follows the
    /// dispatcher's queue.
    fn submit(&self, job: Box<dyn FnOnce() + Send>);
}

/// Produces and commits evaluation contexts.
///
/// An evaluation context names a consistent snapshot of the host's data
/// graph. The supervisor acquires one per invocation and commits its
/// pending cache updates when a suspendable requests a refresh (or when an
/// immediate invocation derived the context itself).
pub trait EvaluationSource: Send + Sync {
    /// Acquires a fresh evaluation context.
    fn acquire(&self) -> EvalContext;

    /// Commits the pending cache updates derived from `ctx`. Called on the
    /// UI thread.
    fn commit(&self, ctx: &EvalContext);
}

/// An opaque host snapshot handle threaded through script invocations.
#[derive(Debug, Clone)]
pub struct EvalContext(Foreign);

impl EvalContext {
    /// Wraps a host snapshot object.
    pub fn new<T: std::any::Any + Send + Sync>(snapshot: T) -> Self {
        EvalContext(Foreign::new(snapshot))
    }

    /// Views the snapshot as `T`.
    pub fn downcast_ref<T: std::any::Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true when both handles name the same snapshot.
    pub fn same(&self, other: &EvalContext) -> bool {
        self.0.same(&other.0)
    }
}

/// The bundle of collaborators a runtime is constructed over.
#[derive(Clone)]
pub struct Project {
    resources: Arc<dyn ResourceProvider>,
    paths: Arc<dyn PathPolicy>,
    ui: Arc<dyn UiDispatcher>,
    graph: Arc<dyn EvaluationSource>,
}

impl Project {
    /// Bundles the four collaborators.
    pub fn new(
        resources: Arc<dyn ResourceProvider>,
        paths: Arc<dyn PathPolicy>,
        ui: Arc<dyn UiDispatcher>,
        graph: Arc<dyn EvaluationSource>,
    ) -> Self {
        Self {
            resources,
            paths,
            ui,
            graph,
        }
    }

    /// The resource layer scripts import from.
    pub fn resources(&self) -> &Arc<dyn ResourceProvider> {
        &self.resources
    }

    /// The filesystem sandbox predicate.
    pub fn paths(&self) -> &Arc<dyn PathPolicy> {
        &self.paths
    }

    /// The UI-thread scheduler.
    pub fn ui(&self) -> &Arc<dyn UiDispatcher> {
        &self.ui
    }

    /// The evaluation-context source.
    pub fn graph(&self) -> &Arc<dyn EvaluationSource> {
        &self.graph
    }
}

/// Confines `path` to `root`.
///
/// The path is interpreted relative to the root (a leading `/` means the
/// project root, not the filesystem root), lexically normalised, and
/// refused when the normal form escapes the root.
pub fn confine_path(root: &Path, path: &str) -> CoreResult<PathBuf> {
    let relative = path.trim_start_matches('/');
    let resolved = root.join(relative).clean();
    let root = root.to_path_buf().clean();
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(CoreError::path_outside_project(path))
    }
}

/// A project rooted in a directory: resources and file access both resolve
/// against the directory, confined to it.
pub struct DirectoryProject {
    root: PathBuf,
}

impl DirectoryProject {
    /// Creates a directory-backed project.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceProvider for DirectoryProject {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        let resolved = confine_path(&self.root, path).ok()?;
        std::fs::read(resolved).ok()
    }
}

impl PathPolicy for DirectoryProject {
    fn resolve(&self, path: &str) -> CoreResult<PathBuf> {
        confine_path(&self.root, path)
    }
}

/// A dispatcher that runs jobs inline on the calling thread.
///
/// Suitable for headless hosts and tests, where there is no UI thread to
/// hop to.
#[derive(Default)]
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// An evaluation source for hosts without a data graph: contexts carry no
/// state and commits are no-ops.
#[derive(Default)]
pub struct NullEvaluationSource;

impl EvaluationSource for NullEvaluationSource {
    fn acquire(&self) -> EvalContext {
        EvalContext::new(())
    }

    fn commit(&self, _ctx: &EvalContext) {}
}
