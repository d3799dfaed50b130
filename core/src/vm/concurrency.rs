//! file: core/src/vm/concurrency.rs
//! description: task and wait-group handles.
//!
//! `spawn` runs a call on its own OS thread with a fresh execution context
//! that shares only the frozen registry, the options and the output sink.
//! The result travels back over a oneshot channel; joining blocks on it with
//! `futures::executor::block_on`. A failure escaping a task is kept until
//! somebody joins, and logged if nobody ever does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;

use crate::error::PhpvmErrorExt;

use super::context::ExecutionContext;
use super::error::VmError;
use super::frame::{Arg, PendingCall};
use super::object::ObjectRef;
use super::value::{next_handle_id, Value};

/// Why a task did not produce a value.
#[derive(Debug, Clone)]
pub enum TaskFailure {
    Exception(ObjectRef),
    Fatal(String),
}

impl TaskFailure {
    fn describe(&self) -> String {
        match self {
            TaskFailure::Exception(e) => {
                let message = match e.get_prop("message").flatten() {
                    Some(Value::String(s)) => s.to_string_lossy().into_owned(),
                    _ => String::new(),
                };
                format!("uncaught {}: {}", e.class().name, message)
            }
            TaskFailure::Fatal(m) => m.clone(),
        }
    }
}

type Outcome = Result<Value, TaskFailure>;

enum TaskState {
    Running(oneshot::Receiver<Outcome>),
    Joining,
    Finished(Outcome),
}

struct TaskInner {
    id: u64,
    state: Mutex<TaskState>,
    done: Arc<AtomicBool>,
    joined: AtomicBool,
}

impl Drop for TaskInner {
    fn drop(&mut self) {
        if self.joined.load(Ordering::SeqCst) {
            return;
        }
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let failure = match state {
            TaskState::Running(rx) => match rx.try_recv() {
                Ok(Some(Err(f))) => Some(f),
                _ => None,
            },
            TaskState::Finished(Err(f)) => Some(f.clone()),
            _ => None,
        };
        if let Some(f) = failure {
            log::error!("task {} failed and was never joined: {}", self.id, f.describe());
        }
    }
}

/// Handle to a launched task. Clones refer to the same task.
#[derive(Clone)]
pub struct TaskHandle(Arc<TaskInner>);

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task#{}", self.0.id)
    }
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_done(&self) -> bool {
        self.0.done.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Block until the task finishes. Every join observes the same outcome.
    pub fn join(&self) -> Outcome {
        let mut state = self.0.state.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = match std::mem::replace(&mut *state, TaskState::Joining) {
            TaskState::Running(rx) => futures::executor::block_on(rx)
                .unwrap_or_else(|_| Err(TaskFailure::Fatal("task ended without reporting a result".to_string()))),
            TaskState::Finished(outcome) => outcome,
            TaskState::Joining => Err(TaskFailure::Fatal("task is already being joined".to_string())),
        };
        *state = TaskState::Finished(outcome.clone());
        self.0.joined.store(true, Ordering::SeqCst);
        outcome
    }
}

/// Launch `call` as a task.
pub(crate) fn spawn(ctx: &ExecutionContext, call: PendingCall) -> Result<TaskHandle, VmError> {
    let id = next_handle_id();
    let (tx, rx) = oneshot::channel::<Outcome>();
    let done = Arc::new(AtomicBool::new(false));
    let thread_done = Arc::clone(&done);
    let registry = Arc::clone(&ctx.registry);
    let options = Arc::clone(&ctx.options);
    let output = Arc::clone(&ctx.output);
    let name = call.name.clone();

    std::thread::Builder::new()
        .name(format!("phpvm-task-{}", id))
        .stack_size(ctx.options.task_stack_size)
        .spawn(move || {
            log::info!("task {} launched: {}()", id, name);
            let mut task_ctx = ExecutionContext::new(registry, options, output);
            let outcome = match task_ctx.call_pending(call) {
                Ok(v) => Ok(v),
                Err(VmError::Thrown(e)) => Err(TaskFailure::Exception(e)),
                Err(VmError::Raise { class, message }) => match task_ctx.create_exception(&class, &message) {
                    Ok(e) => Err(TaskFailure::Exception(e)),
                    Err(e) => Err(TaskFailure::Fatal(e.message())),
                },
                Err(VmError::Exit(code)) => {
                    log::info!("task {} called exit({})", id, code);
                    Ok(Value::Null)
                }
                Err(e) => Err(TaskFailure::Fatal(e.message())),
            };
            match &outcome {
                Ok(_) => log::info!("task {} completed", id),
                Err(f) => log::info!("task {} failed: {}", id, f.describe()),
            }
            thread_done.store(true, Ordering::SeqCst);
            if let Err(Err(f)) = tx.send(outcome) {
                log::error!("task {} failed and nobody is waiting for it: {}", id, f.describe());
            }
        })
        .map_err(|e| VmError::error(format!("Unable to launch task: {}", e)))?;

    Ok(TaskHandle(Arc::new(TaskInner { id, state: Mutex::new(TaskState::Running(rx)), done, joined: AtomicBool::new(false) })))
}

/// Join a task, turning its failure into a guest exception in the joiner.
pub(crate) fn await_task(task: &TaskHandle) -> Result<Value, VmError> {
    match task.join() {
        Ok(v) => Ok(v),
        Err(TaskFailure::Exception(e)) => Err(VmError::Thrown(e)),
        Err(TaskFailure::Fatal(m)) => Err(VmError::error(format!("Task {} failed: {}", task.id(), m))),
    }
}

struct WaitGroupInner {
    id: u64,
    count: Mutex<i64>,
    cv: Condvar,
}

/// Counter that `wait()` blocks on until it drops to zero.
#[derive(Clone)]
pub struct WaitGroupHandle(Arc<WaitGroupInner>);

impl std::fmt::Debug for WaitGroupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WaitGroup#{}({})", self.0.id, self.count())
    }
}

impl WaitGroupHandle {
    pub fn new(initial: i64) -> Result<Self, VmError> {
        if initial < 0 {
            return Err(VmError::raise("ValueError", "WaitGroup counter cannot be negative"));
        }
        Ok(WaitGroupHandle(Arc::new(WaitGroupInner { id: next_handle_id(), count: Mutex::new(initial), cv: Condvar::new() })))
    }

    fn lock(&self) -> MutexGuard<'_, i64> {
        self.0.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &WaitGroupHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn add(&self, n: i64) -> Result<(), VmError> {
        let mut count = self.lock();
        let next = count.saturating_add(n);
        if next < 0 {
            return Err(VmError::raise("ValueError", "WaitGroup counter cannot be negative"));
        }
        *count = next;
        if next == 0 {
            self.0.cv.notify_all();
        }
        Ok(())
    }

    pub fn done(&self) -> Result<(), VmError> {
        self.add(-1)
    }

    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.0.cv.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn count(&self) -> i64 {
        *self.lock()
    }
}

fn int_arg(args: &[Value], i: usize, default: i64) -> i64 {
    args.get(i).map(super::convert::to_int).unwrap_or(default)
}

impl ExecutionContext {
    /// Built-in methods of values that are handles rather than objects.
    pub(crate) fn value_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value, VmError> {
        let lname = name.to_ascii_lowercase();
        match (receiver, lname.as_str()) {
            (Value::Task(t), "join") => await_task(t),
            (Value::Task(t), "isdone") => Ok(Value::Bool(t.is_done())),
            (Value::Task(t), "id") => Ok(Value::Int(t.id() as i64)),
            (Value::WaitGroup(wg), "add") => {
                wg.add(int_arg(&args, 0, 1))?;
                Ok(Value::Null)
            }
            (Value::WaitGroup(wg), "done") => {
                wg.done()?;
                Ok(Value::Null)
            }
            (Value::WaitGroup(wg), "wait") => {
                wg.wait();
                Ok(Value::Null)
            }
            (Value::WaitGroup(wg), "count") => Ok(Value::Int(wg.count())),
            (Value::Callable(_), "__invoke") => self.call_value(receiver, args),
            (Value::Callable(c), "call") => {
                let mut args = args.into_iter();
                let this = match args.next() {
                    Some(Value::Object(o)) => o,
                    _ => return Err(VmError::type_error("Closure::call(): Argument #1 ($newThis) must be of type object")),
                };
                let mut bound = (**c).clone();
                bound.scope = Some(Arc::clone(this.class()));
                bound.static_class = Some(Arc::clone(this.class()));
                bound.this = Some(this);
                let mut call = self.callable_to_call(&Value::Callable(Arc::new(bound)))?;
                call.args = args.map(Arg::Val).collect();
                self.call_pending(call)
            }
            (Value::Callable(c), "bindto") => {
                let mut bound = (**c).clone();
                bound.id = next_handle_id();
                match args.into_iter().next() {
                    Some(Value::Object(o)) => {
                        if bound.scope.is_none() {
                            bound.scope = Some(Arc::clone(o.class()));
                        }
                        bound.static_class = Some(Arc::clone(o.class()));
                        bound.this = Some(o);
                    }
                    _ => bound.this = None,
                }
                Ok(Value::Callable(Arc::new(bound)))
            }
            (other, _) => Err(VmError::error(format!("Call to undefined method {}::{}()", other.type_name(), name))),
        }
    }
}
