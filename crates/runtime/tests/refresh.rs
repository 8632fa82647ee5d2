//! Evaluation-context refresh: commits happen on the UI thread and
//! subsequent host lookups observe a fresh context.

mod common;

use common::{env, eval};
use coronest_core::{
    DirectoryProject, EvalContext, EvaluationSource, Project, SuspendResult, UiDispatcher, Value,
};
use coronest_runtime::{HostCallable, HostSuspendable, Runtime, RuntimeOptions};
use futures::executor::block_on;
use mlua::Value as LuaValue;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

/// A dedicated thread standing in for the host's UI thread.
struct UiThread {
    jobs: mpsc::Sender<Box<dyn FnOnce() + Send>>,
    thread_id: std::thread::ThreadId,
}

impl UiThread {
    fn start() -> Arc<UiThread> {
        let (jobs, queue) = mpsc::channel::<Box<dyn FnOnce() + Send>>();
        let (id_tx, id_rx) = mpsc::channel();
        std::thread::spawn(move || {
            id_tx.send(std::thread::current().id()).unwrap();
            while let Ok(job) = queue.recv() {
                job();
            }
        });
        Arc::new(UiThread {
            jobs,
            thread_id: id_rx.recv().unwrap(),
        })
    }
}

impl UiDispatcher for UiThread {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) {
        self.jobs.send(job).expect("UI thread is alive");
    }
}

/// A one-node data graph: evaluation contexts snapshot the node value at
/// acquisition; commits are counted and must land on the UI thread.
struct NodeGraph {
    node: AtomicI64,
    acquires: AtomicUsize,
    commits: AtomicUsize,
    ui_thread: std::thread::ThreadId,
}

impl EvaluationSource for NodeGraph {
    fn acquire(&self) -> EvalContext {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        EvalContext::new(self.node.load(Ordering::SeqCst))
    }

    fn commit(&self, _ctx: &EvalContext) {
        assert_eq!(
            std::thread::current().id(),
            self.ui_thread,
            "commit must run on the UI thread"
        );
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}

fn node_runtime(
    set_refreshes: bool,
) -> (Runtime, Arc<NodeGraph>) {
    let ui = UiThread::start();
    let graph = Arc::new(NodeGraph {
        node: AtomicI64::new(1),
        acquires: AtomicUsize::new(0),
        commits: AtomicUsize::new(0),
        ui_thread: ui.thread_id,
    });

    let get_value = HostCallable::new("get_value", |ctx, _| {
        let ctx = ctx.expect("host call outside an invocation");
        let snapshot = ctx
            .evaluation()
            .downcast_ref::<i64>()
            .expect("node snapshot");
        Ok(Value::Int(*snapshot))
    });

    let set_graph = graph.clone();
    let set_ui: Arc<dyn UiDispatcher> = ui.clone();
    let set_value = HostSuspendable::new("set_value", move |args| {
        let target = match args.first() {
            Some(LuaValue::Integer(i)) => *i,
            other => panic!("expected integer argument, got {other:?}"),
        };
        let graph = set_graph.clone();
        let ui = set_ui.clone();
        Box::pin(async move {
            ui.submit(Box::new(move || {
                graph.node.store(target, Ordering::SeqCst);
            }));
            Ok(SuspendResult::success(Value::Bool(true), set_refreshes))
        })
    });

    let node = env(vec![
        ("get_value", get_value.value()),
        ("set_value", set_value.value()),
    ]);

    let dir = Arc::new(DirectoryProject::new(std::env::temp_dir()));
    let project = Project::new(dir.clone(), dir, ui, graph.clone());
    let runtime = Runtime::make(
        project,
        RuntimeOptions::default().with_env(env(vec![("node", node)])),
    )
    .unwrap();
    (runtime, graph)
}

/// Waits until every UI job submitted so far has run.
fn ui_barrier(runtime: &Runtime) {
    let (tx, rx) = mpsc::channel();
    runtime.project().ui().submit(Box::new(move || {
        tx.send(()).unwrap();
    }));
    rx.recv().unwrap();
}

const READ_WRITE_READ: &str = r#"
return function()
  local before = node.get_value()
  local wrote = node.set_value(2)
  local after = node.get_value()
  return { before, wrote, after }
end
"#;

#[test]
fn refresh_commits_and_adopts_a_fresh_context() {
    let (runtime, graph) = node_runtime(true);
    let f = eval(&runtime, READ_WRITE_READ);
    let result = block_on(runtime.invoke_suspending(&f, &[])).unwrap();

    assert_eq!(
        result,
        Value::Seq(vec![Value::Int(1), Value::Bool(true), Value::Int(2)])
    );
    assert_eq!(graph.node.load(Ordering::SeqCst), 2);
    assert!(graph.commits.load(Ordering::SeqCst) >= 1);
    assert!(graph.acquires.load(Ordering::SeqCst) >= 2);
}

#[test]
fn without_refresh_the_context_stays_stale() {
    let (runtime, graph) = node_runtime(false);
    let f = eval(&runtime, READ_WRITE_READ);
    let result = block_on(runtime.invoke_suspending(&f, &[])).unwrap();

    // Same snapshot on both reads: the write is only visible after a
    // refresh-demanding suspension.
    assert_eq!(
        result,
        Value::Seq(vec![Value::Int(1), Value::Bool(true), Value::Int(1)])
    );
    ui_barrier(&runtime);
    assert_eq!(graph.node.load(Ordering::SeqCst), 2);
}
