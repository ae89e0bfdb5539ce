//! 多工作线程事件循环。
//!
//! # 设计综述（Why）
//! - 反应器在 I/O 任务中感知到连接建立、数据到达与断开后，需要把回调转交给若干工作线程处理，
//!   避免用户回调阻塞 I/O 驱动；
//! - 工作线程本身不执行任务，而是把任务交给共享的 [`Executor`]，执行策略由宿主决定。
//!
//! # 使用契约（What）
//! - [`threaded`] 是事件循环的构造函数：`(worker_count, executor) -> Arc<ThreadedEventLoop>`；
//! - 线程在首次提交任务时才会启动，构造本身不占用系统资源；
//! - [`ThreadedEventLoop::execute_keyed`] 按键固定工作线程，同一连接的回调因此保持提交顺序。
//!
//! # 风险提示（Trade-offs）
//! - 任务队列无界：回调处理速度长期低于事件产生速度时，内存会持续增长；
//! - 任务 panic 会被捕获并记录，工作线程继续运行，但 panic 的任务不会重试。

use core::fmt;
use core::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::EventLoopError;
use crate::executor::{Executor, Task};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

/// 事件循环构造函数。
///
/// 每次调用都返回一个全新的事件循环实例（拥有新的 [`id`](ThreadedEventLoop::id)）。
pub fn threaded(workers: NonZeroUsize, executor: Arc<dyn Executor>) -> Arc<ThreadedEventLoop> {
    Arc::new(ThreadedEventLoop::new(workers, executor))
}

/// `ThreadedEventLoop` 由 N 个独立工作线程组成，共享同一个执行资源。
///
/// # 教案级注释
/// - **意图 (Why)**：为反应器提供“回调离开 I/O 线程”的能力，并把并行度交给引导器的 `workers` 配置；
/// - **状态机 (How)**：`Idle` →（首次提交任务）→ `Running` →（`shutdown`/`Drop`）→ `Terminated`；
///   每个工作线程持有独立的无界队列，`execute` 轮询分配，`execute_keyed` 按键取模分配；
/// - **契约 (What)**：
///   - `Terminated` 之后提交任务返回 [`EventLoopError::Terminated`]；
///   - `shutdown` 会等待工作线程排空队列后退出，但不会等待调用 `shutdown` 的工作线程自身；
///   - 执行资源的生命周期不受事件循环管理。
pub struct ThreadedEventLoop {
    id: u64,
    workers: NonZeroUsize,
    executor: Arc<dyn Executor>,
    next: AtomicUsize,
    state: Mutex<LoopState>,
}

enum LoopState {
    Idle,
    Running(Vec<Worker>),
    Terminated,
}

struct Worker {
    queue: mpsc::UnboundedSender<Task>,
    thread: JoinHandle<()>,
}

impl ThreadedEventLoop {
    pub fn new(workers: NonZeroUsize, executor: Arc<dyn Executor>) -> Self {
        Self {
            id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
            workers,
            executor,
            next: AtomicUsize::new(0),
            state: Mutex::new(LoopState::Idle),
        }
    }

    /// 进程内唯一的实例编号。
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn worker_count(&self) -> NonZeroUsize {
        self.workers
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// 工作线程是否已经启动且尚未关闭。
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), LoopState::Running(_))
    }

    pub fn is_terminated(&self) -> bool {
        matches!(*self.state.lock(), LoopState::Terminated)
    }

    /// 轮询选择工作线程并提交任务。
    pub fn execute<F>(&self, task: F) -> Result<(), EventLoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = self.next.fetch_add(1, Ordering::Relaxed);
        self.submit(slot, Box::new(task))
    }

    /// 按 `key` 固定工作线程提交任务；相同 `key` 的任务按提交顺序执行。
    pub fn execute_keyed<F>(&self, key: u64, task: F) -> Result<(), EventLoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = (key % self.workers.get() as u64) as usize;
        self.submit(slot, Box::new(task))
    }

    /// 关闭队列并等待工作线程退出。重复调用无副作用。
    pub fn shutdown(&self) {
        let previous = core::mem::replace(&mut *self.state.lock(), LoopState::Terminated);
        let LoopState::Running(workers) = previous else {
            return;
        };

        let current = thread::current().id();
        for Worker { queue, thread } in workers {
            drop(queue);
            if thread.thread().id() == current {
                continue;
            }
            if thread.join().is_err() {
                error!(event_loop = self.id, "event loop worker exited abnormally");
            }
        }
        debug!(event_loop = self.id, "event loop shut down");
    }

    fn submit(&self, slot: usize, task: Task) -> Result<(), EventLoopError> {
        let mut state = self.state.lock();
        if matches!(*state, LoopState::Idle) {
            *state = LoopState::Running(self.spawn_workers()?);
        }

        match &*state {
            LoopState::Running(workers) => workers[slot % workers.len()]
                .queue
                .send(task)
                .map_err(|_| EventLoopError::Terminated { id: self.id }),
            _ => Err(EventLoopError::Terminated { id: self.id }),
        }
    }

    fn spawn_workers(&self) -> Result<Vec<Worker>, EventLoopError> {
        let mut workers = Vec::with_capacity(self.workers.get());
        for index in 0..self.workers.get() {
            let (queue, mut inbox) = mpsc::unbounded_channel::<Task>();
            let executor = Arc::clone(&self.executor);
            let loop_id = self.id;
            let thread = thread::Builder::new()
                .name(format!("spark-worker-{loop_id}-{index}"))
                .spawn(move || {
                    while let Some(task) = inbox.blocking_recv() {
                        let outcome =
                            panic::catch_unwind(AssertUnwindSafe(|| executor.execute(task)));
                        if outcome.is_err() {
                            error!(
                                event_loop = loop_id,
                                worker = index,
                                "event loop task panicked"
                            );
                        }
                    }
                })
                .map_err(|source| EventLoopError::Spawn {
                    id: self.id,
                    source,
                })?;
            workers.push(Worker { queue, thread });
        }
        debug!(
            event_loop = self.id,
            workers = self.workers.get(),
            executor = self.executor.name(),
            "event loop workers started"
        );
        Ok(workers)
    }
}

impl fmt::Debug for ThreadedEventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedEventLoop")
            .field("id", &self.id)
            .field("workers", &self.workers)
            .field("executor", &self.executor.name())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for ThreadedEventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::BasicExecutor;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    #[test]
    fn workers_start_lazily_on_first_task() {
        let event_loop = threaded(workers(2), BasicExecutor::shared());
        assert!(!event_loop.is_running());

        let (tx, rx) = std_mpsc::channel();
        event_loop
            .execute(move || {
                tx.send(thread::current().name().map(str::to_owned))
                    .expect("send");
            })
            .expect("execute");

        let name = rx.recv_timeout(WAIT).expect("task ran").expect("named");
        assert!(name.starts_with(&format!("spark-worker-{}-", event_loop.id())));
        assert!(event_loop.is_running());
    }

    #[test]
    fn keyed_tasks_keep_submission_order() {
        let event_loop = threaded(workers(4), BasicExecutor::shared());
        let (tx, rx) = std_mpsc::channel();
        for value in 0..64 {
            let tx = tx.clone();
            event_loop
                .execute_keyed(7, move || tx.send(value).expect("send"))
                .expect("execute");
        }
        let observed: Vec<i32> = (0..64).map(|_| rx.recv_timeout(WAIT).expect("value")).collect();
        assert_eq!(observed, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_rejects_new_tasks() {
        let event_loop = threaded(workers(1), BasicExecutor::shared());
        event_loop.execute(|| {}).expect("first task");
        event_loop.shutdown();

        assert!(event_loop.is_terminated());
        let err = event_loop.execute(|| {}).expect_err("terminated");
        assert!(matches!(err, EventLoopError::Terminated { id } if id == event_loop.id()));
    }

    #[test]
    fn panicking_task_does_not_kill_the_worker() {
        let event_loop = threaded(workers(1), BasicExecutor::shared());
        event_loop
            .execute(|| panic!("callback failure"))
            .expect("submit");

        let (tx, rx) = std_mpsc::channel();
        event_loop
            .execute(move || tx.send(()).expect("send"))
            .expect("submit after panic");
        rx.recv_timeout(WAIT).expect("worker still alive");
    }

    #[test]
    fn every_constructor_call_yields_a_new_loop() {
        let executor = BasicExecutor::shared();
        let first = threaded(workers(3), Arc::clone(&executor));
        let second = threaded(workers(3), Arc::clone(&executor));

        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(first.executor(), second.executor()));
        assert_eq!(first.worker_count().get(), 3);
    }
}
