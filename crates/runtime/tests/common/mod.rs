#![allow(dead_code)]

use coronest_core::{
    DirectoryProject, InlineDispatcher, Key, NullEvaluationSource, Project, Value,
};
use coronest_runtime::{Runtime, RuntimeOptions};
use std::sync::Arc;

/// A runtime over a throwaway directory project, with inline UI dispatch
/// and stateless evaluation contexts.
pub fn make_runtime(env: Option<Value>) -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = Arc::new(DirectoryProject::new(std::env::temp_dir()));
    let project = Project::new(
        dir.clone(),
        dir,
        Arc::new(InlineDispatcher),
        Arc::new(NullEvaluationSource),
    );
    let mut options = RuntimeOptions::default();
    options.env = env;
    Runtime::make(project, options).unwrap()
}

/// Compiles and runs a chunk, returning its single result.
pub fn eval(runtime: &Runtime, chunk: &str) -> Value {
    let code = runtime.read(chunk, None).unwrap();
    runtime.eval(&code).unwrap()
}

/// Builds an environment overlay from name/value pairs.
pub fn env(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(name, value)| (Key::Name(name.to_string()), value))
            .collect(),
    )
}
