//! Immediate invocations: evaluation, lock serialisation, and the
//! immediate-mode suspension rules.

mod common;

use common::{env, eval, make_runtime};
use coronest_core::{SuspendResult, Value};
use coronest_runtime::HostSuspendable;

#[test]
fn evaluates_literal_chunk() {
    let runtime = make_runtime(None);
    assert_eq!(eval(&runtime, "return 1"), Value::Int(1));
}

#[test]
fn compiled_chunks_are_reusable() {
    let runtime = make_runtime(None);
    let code = runtime.read("hits = (hits or 0) + 1; return hits", None).unwrap();
    assert_eq!(code.name(), "REPL");
    assert_eq!(runtime.eval(&code).unwrap(), Value::Int(1));
    assert_eq!(runtime.eval(&code).unwrap(), Value::Int(2));
}

#[test]
fn concurrent_immediate_invocations_serialise() {
    let runtime = make_runtime(None);
    eval(&runtime, "global = 1");
    let increment = eval(
        &runtime,
        "return function() global = global + 1; return global end",
    );

    const THREADS: usize = 10;
    const CALLS: usize = 100;

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let runtime = runtime.clone();
        let increment = increment.clone();
        handles.push(std::thread::spawn(move || {
            (0..CALLS)
                .map(|_| {
                    runtime
                        .invoke_immediate(&increment, &[], None)
                        .unwrap()
                        .as_int()
                        .unwrap()
                })
                .collect::<Vec<i64>>()
        }));
    }

    let mut observed: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    observed.sort_unstable();

    let expected: Vec<i64> = (2..=(THREADS * CALLS) as i64 + 1).collect();
    assert_eq!(observed, expected);
}

#[test]
fn non_suspending_invocation_completes_before_return() {
    let runtime = make_runtime(None);
    let fib = eval(
        &runtime,
        r#"
        return function(n)
          local function fib(k)
            if k < 2 then
              return k
            end
            return fib(k - 1) + fib(k - 2)
          end
          return fib(n)
        end
        "#,
    );

    let mut future = runtime.invoke_suspending(&fib, &[Value::Int(25)]);
    match future.try_take() {
        Some(Ok(value)) => assert_eq!(value, Value::Int(75025)),
        other => panic!("expected completed future, got {other:?}"),
    }
}

#[test]
fn immediate_rejects_suspendables() {
    let wait = HostSuspendable::new("wait", |_| {
        Box::pin(async { Ok(SuspendResult::success(Value::Nil, false)) })
    });
    let runtime = make_runtime(Some(env(vec![("wait", wait.value())])));

    let f = eval(&runtime, "return function() return wait() end");
    let error = runtime.invoke_immediate(&f, &[], None).unwrap_err();
    assert!(error
        .to_string()
        .contains("Cannot use long-running editor function in immediate context"));
}

#[test]
fn immediate_translates_main_thread_yield() {
    let runtime = make_runtime(None);
    let f = eval(&runtime, "return function() coroutine.yield(1) end");
    let error = runtime.invoke_immediate(&f, &[], None).unwrap_err();
    assert!(error
        .to_string()
        .contains("Cannot use long-running editor function in this context"));
}

#[test]
fn immediate_passes_arguments_and_rethrows_script_errors() {
    let runtime = make_runtime(None);
    let add = eval(&runtime, "return function(a, b) return a + b end");
    assert_eq!(
        runtime
            .invoke_immediate(&add, &[Value::Int(2), Value::Int(3)], None)
            .unwrap(),
        Value::Int(5)
    );

    let boom = eval(&runtime, "return function() error('kaboom') end");
    let error = runtime.invoke_immediate(&boom, &[], None).unwrap_err();
    assert!(error.to_string().contains("kaboom"));
}

#[test]
fn invoking_a_non_function_fails_cleanly() {
    let runtime = make_runtime(None);
    let error = runtime
        .invoke_immediate(&Value::Int(3), &[], None)
        .unwrap_err();
    assert!(error.to_string().contains("expected a script function"));
}
