//! Single-threaded cooperative executor behind `launch` and `await`.
//!
//! Every logical thread of evaluation is a future. The executor polls them
//! one at a time from a ready queue; a task only re-enters the queue when a
//! waker fires, which happens when a [`Deferred`] it awaits settles. `await`
//! is therefore the only suspension point.

use crate::runtime::error::{RuntimeError, RuntimeErrorKind};
use crate::runtime::values::Value;
use futures::future::{poll_fn, LocalBoxFuture};
use futures::task::{waker, ArcWake};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

pub type TaskId = u64;

/// Id of the root evaluation driven by [`Executor::block_on`].
pub const MAIN_TASK: TaskId = 0;

#[derive(Default)]
struct ReadyQueue(Mutex<VecDeque<TaskId>>);

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push_back(id);
        }
    }

    fn pop(&self) -> Option<TaskId> {
        self.0.lock().ok().and_then(|mut queue| queue.pop_front())
    }
}

struct TaskWaker {
    id: TaskId,
    queue: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.queue.push(arc_self.id);
    }
}

struct ExecutorState {
    tasks: RefCell<HashMap<TaskId, LocalBoxFuture<'static, ()>>>,
    queue: Arc<ReadyQueue>,
    next_id: Cell<TaskId>,
}

impl ExecutorState {
    fn waker_for(&self, id: TaskId) -> Waker {
        waker(Arc::new(TaskWaker {
            id,
            queue: self.queue.clone(),
        }))
    }
}

pub struct Executor {
    state: Rc<ExecutorState>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            state: Rc::new(ExecutorState {
                tasks: RefCell::new(HashMap::new()),
                queue: Arc::new(ReadyQueue::default()),
                next_id: Cell::new(MAIN_TASK + 1),
            }),
        }
    }

    pub fn spawner(&self) -> Spawner {
        Spawner {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Number of launched tasks that have not finished.
    pub fn pending_tasks(&self) -> usize {
        self.state.tasks.borrow().len()
    }

    /// Drives `main` to completion, running launched tasks whenever it is
    /// suspended. Fails with `Deadlock` when `main` is pending and no task
    /// is ready to run.
    pub fn block_on<F: Future>(&self, main: F) -> Result<F::Output, RuntimeErrorKind> {
        let mut main = Box::pin(main);
        let main_waker = self.state.waker_for(MAIN_TASK);
        self.state.queue.push(MAIN_TASK);
        loop {
            match self.state.queue.pop() {
                Some(MAIN_TASK) => {
                    let mut cx = Context::from_waker(&main_waker);
                    if let Poll::Ready(output) = main.as_mut().poll(&mut cx) {
                        return Ok(output);
                    }
                }
                Some(id) => self.poll_task(id),
                None => {
                    log::warn!(
                        "deadlock: root evaluation suspended with {} task(s) waiting",
                        self.pending_tasks()
                    );
                    return Err(RuntimeErrorKind::Deadlock);
                }
            }
        }
    }

    /// Runs ready tasks until none is left and returns how many remain stalled.
    pub fn run_until_idle(&self) -> usize {
        while let Some(id) = self.state.queue.pop() {
            if id != MAIN_TASK {
                self.poll_task(id);
            }
        }
        let stalled = self.pending_tasks();
        if stalled > 0 {
            log::warn!("{} launched task(s) can never complete", stalled);
        }
        stalled
    }

    fn poll_task(&self, id: TaskId) {
        // The future leaves the map while it runs so it can spawn new tasks
        let task = self.state.tasks.borrow_mut().remove(&id);
        let Some(mut task) = task else {
            // Spurious wake of a finished task
            return;
        };
        let task_waker = self.state.waker_for(id);
        let mut cx = Context::from_waker(&task_waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Ready(()) => log::debug!("task {} finished", id),
            Poll::Pending => {
                self.state.tasks.borrow_mut().insert(id, task);
            }
        }
    }
}

/// Handle used by evaluators to launch tasks on the executor that runs them.
#[derive(Clone)]
pub struct Spawner {
    state: Weak<ExecutorState>,
}

impl Spawner {
    fn state(&self) -> Result<Rc<ExecutorState>, RuntimeErrorKind> {
        self.state.upgrade().ok_or(RuntimeErrorKind::ExecutorShutDown)
    }

    /// Allocates the id of a task about to be spawned.
    pub fn reserve(&self) -> Result<TaskId, RuntimeErrorKind> {
        let state = self.state()?;
        let id = state.next_id.get();
        state.next_id.set(id + 1);
        Ok(id)
    }

    pub fn spawn(
        &self,
        id: TaskId,
        future: impl Future<Output = ()> + 'static,
    ) -> Result<(), RuntimeErrorKind> {
        let state = self.state()?;
        state.tasks.borrow_mut().insert(id, future.boxed_local());
        state.queue.push(id);
        Ok(())
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner")
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

#[derive(Debug)]
enum DeferredState {
    Pending,
    Settled(Result<Value, RuntimeError>),
}

/// The handle `launch` returns: the eventual outcome of one task.
#[derive(Debug)]
pub struct Deferred {
    id: TaskId,
    state: RefCell<DeferredState>,
    waiters: RefCell<Vec<Waker>>,
}

impl Deferred {
    pub fn new(id: TaskId) -> Self {
        Deferred {
            id,
            state: RefCell::new(DeferredState::Pending),
            waiters: RefCell::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_settled(&self) -> bool {
        matches!(*self.state.borrow(), DeferredState::Settled(_))
    }

    /// Settles the computation and wakes every logical thread awaiting it.
    pub fn complete(&self, result: Result<Value, RuntimeError>) {
        *self.state.borrow_mut() = DeferredState::Settled(result);
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Suspends until the computation settles, then yields its outcome.
    pub async fn wait(&self) -> Result<Value, RuntimeError> {
        poll_fn(|cx| match &*self.state.borrow() {
            DeferredState::Settled(result) => Poll::Ready(result.clone()),
            DeferredState::Pending => {
                self.waiters.borrow_mut().push(cx.waker().clone());
                Poll::Pending
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_await_runs_launched_task() {
        let executor = Executor::new();
        let spawner = executor.spawner();
        let id = spawner.reserve().unwrap();
        let deferred = Rc::new(Deferred::new(id));
        let task_deferred = deferred.clone();
        spawner
            .spawn(id, async move { task_deferred.complete(Ok(Value::number(7.0))) })
            .unwrap();

        let result = executor.block_on(deferred.wait()).unwrap();
        assert_eq!(result, Ok(Value::number(7.0)));
        assert_eq!(executor.pending_tasks(), 0);
    }

    #[test]
    fn test_waiting_on_unsettled_deferred_deadlocks() {
        let executor = Executor::new();
        let deferred = Deferred::new(99);
        assert_eq!(
            executor.block_on(deferred.wait()),
            Err(RuntimeErrorKind::Deadlock)
        );
    }

    #[test]
    fn test_spawner_outliving_executor() {
        let spawner = Executor::new().spawner();
        assert_eq!(spawner.reserve(), Err(RuntimeErrorKind::ExecutorShutDown));
    }

    #[test]
    fn test_run_until_idle_reports_stalled_tasks() {
        let executor = Executor::new();
        let spawner = executor.spawner();
        let id = spawner.reserve().unwrap();
        let never = Rc::new(Deferred::new(1000));
        spawner
            .spawn(id, async move {
                let _ = never.wait().await;
            })
            .unwrap();
        assert_eq!(executor.run_until_idle(), 1);
    }
}
