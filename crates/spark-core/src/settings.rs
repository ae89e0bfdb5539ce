use core::fmt;
use core::num::NonZeroUsize;
use std::sync::Arc;

use crate::{
    address::Node,
    callback::{CallbackDispatcher, Callbacks},
    event_loop::{self, ThreadedEventLoop},
    executor::{BasicExecutor, Executor},
    options::SocketOptions,
};

/// `ServerSettings` 是引导器在构建时冻结出的只读配置快照。
///
/// # 教案级注释
/// - **意图 (Why)**：引导器是可变的构建器，工厂与反应器却需要稳定的输入；构建时复制一份快照，
///   之后再修改引导器不会影响已经产出的工厂；
/// - **契约 (What)**：
///   - 工作线程数以 `NonZeroUsize` 表达，非法值在类型层面即不可构造；
///   - 快照不记录传输类型，传输由持有它的工厂类型决定；
///   - [`event_loop`](Self::event_loop) 每次调用都派生新的事件循环，每个反应器独享一个；
/// - **风险 (Trade-offs)**：快照与引导器共享执行资源与回调闭包（`Arc`），闭包内部若有可变状态需自行同步。
#[derive(Clone)]
pub struct ServerSettings {
    local_address: Node,
    workers: NonZeroUsize,
    buffer_bytes: usize,
    use_proxies: bool,
    executor: Arc<dyn Executor>,
    options: SocketOptions,
    callbacks: Callbacks,
}

impl ServerSettings {
    /// 以默认的执行资源、空选项与空回调创建快照，回调默认经由事件循环派发。
    pub fn new(local_address: Node, workers: NonZeroUsize, buffer_bytes: usize) -> Self {
        Self {
            local_address,
            workers,
            buffer_bytes,
            use_proxies: true,
            executor: BasicExecutor::shared(),
            options: SocketOptions::default(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn with_proxies(mut self, use_proxies: bool) -> Self {
        self.use_proxies = use_proxies;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn local_address(&self) -> Node {
        self.local_address
    }

    pub fn workers(&self) -> NonZeroUsize {
        self.workers
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    pub fn use_proxies(&self) -> bool {
        self.use_proxies
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// 派生一个新的事件循环。
    pub fn event_loop(&self) -> Arc<ThreadedEventLoop> {
        event_loop::threaded(self.workers, Arc::clone(&self.executor))
    }

    /// 为一个反应器准备回调派发器；仅在代理模式下附带新派生的事件循环。
    pub fn dispatcher(&self) -> CallbackDispatcher {
        let event_loop = self.use_proxies.then(|| self.event_loop());
        CallbackDispatcher::new(self.callbacks.clone(), event_loop)
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("local_address", &self.local_address)
            .field("workers", &self.workers)
            .field("buffer_bytes", &self.buffer_bytes)
            .field("use_proxies", &self.use_proxies)
            .field("executor", &self.executor.name())
            .field("options", &self.options)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ServerSettings {
        ServerSettings::new(
            Node::loopback(0),
            NonZeroUsize::new(4).expect("non-zero"),
            crate::DEFAULT_BUFFER_SIZE,
        )
    }

    #[test]
    fn defaults_route_callbacks_through_workers() {
        let settings = settings();
        assert!(settings.use_proxies());
        assert_eq!(settings.executor().name(), "basic");
        assert!(settings.dispatcher().event_loop().is_some());
    }

    #[test]
    fn inline_mode_has_no_event_loop() {
        let settings = settings().with_proxies(false);
        assert!(settings.dispatcher().event_loop().is_none());
    }

    #[test]
    fn every_event_loop_access_is_fresh() {
        let settings = settings();
        let first = settings.event_loop();
        let second = settings.event_loop();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.worker_count().get(), 4);
        assert!(Arc::ptr_eq(first.executor(), settings.executor()));
    }
}
