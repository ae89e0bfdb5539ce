use core::fmt;
use core::num::NonZeroUsize;
use std::sync::Arc;

use spark_core::{
    ArgumentError, BasicExecutor, Bootstrap, BootstrapBase, BootstrapError, ConfigurationError,
    DEFAULT_BUFFER_SIZE, Executor, MIN_BUFFER_SIZE, ServerFactory, ServerSettings,
    ThreadedEventLoop, Transport, event_loop,
};
use spark_transport_tcp::TcpServerFactory;
use spark_transport_udp::UdpServerFactory;
use tracing::{debug, error, info};

/// 新建引导器时的默认工作线程数。
pub const DEFAULT_WORKERS: usize = 2;

/// `ServerBootstrap` 负责累积服务端构造参数并产出 [`ServerFactory`]。
///
/// # 教案级注释
///
/// ## 意图 (Why)
/// - 服务端的构造参数来自多处（代码、配置文件、测试夹具），需要一个可逐项修改、最后统一校验的载体；
/// - 构建产物是可复用的工厂而非单个服务端，同一份配置可以在多个地址上启动互不影响的反应器。
///
/// ## 逻辑 (How)
/// - setter 以 `&mut self` 原地修改并返回 `&mut Self`，可能失败的 setter 返回 `Result`，
///   拒绝时引导器保持调用前的状态；
/// - 通用 setter（地址、回调、套接字选项）来自 [`Bootstrap`] 的默认方法；
/// - [`build_internal`](Bootstrap::build_internal) 把当前状态冻结为 [`ServerSettings`]，
///   再按 [`Transport`] 分派到 TCP 或 UDP 工厂。
///
/// ## 契约 (What)
/// - 默认值：未设置地址与传输，`workers = 2`，`buffer_bytes = 8192`，`use_proxies = true`，执行资源为 [`BasicExecutor`]；
/// - [`Bootstrap::validate`] 依次检查地址、传输、工作线程数、缓冲大小，返回第一个违规；
/// - [`build`](Self::build) 不做校验：传输或地址未设置时返回 [`BootstrapError::InternalInvariant`]，
///   绝不回退到默认传输；
/// - 克隆后两份引导器的标量字段互不影响，执行资源与回调闭包按引用共享。
///
/// ## 注意事项 (Trade-offs)
/// - [`event_loop`](Self::event_loop) 每次访问都创建新的事件循环；线程在首次提交任务时才启动，
///   仅用于观察配置的访问不会占用系统线程。
#[derive(Clone)]
pub struct ServerBootstrap {
    base: BootstrapBase,
    transport: Option<Transport>,
    workers: usize,
    buffer_bytes: usize,
    use_proxies: bool,
    executor: Arc<dyn Executor>,
}

impl ServerBootstrap {
    pub fn new() -> Self {
        Self {
            base: BootstrapBase::default(),
            transport: None,
            workers: DEFAULT_WORKERS,
            buffer_bytes: DEFAULT_BUFFER_SIZE,
            use_proxies: true,
            executor: BasicExecutor::shared(),
        }
    }

    /// 选择传输类型，不做校验。
    pub fn transport(&mut self, transport: Transport) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    /// 设置工作线程数，`workers < 1` 时拒绝。
    pub fn worker_threads(&mut self, workers: usize) -> Result<&mut Self, ArgumentError> {
        if workers < 1 {
            return Err(ArgumentError::WorkerThreads { value: workers });
        }
        self.workers = workers;
        Ok(self)
    }

    /// 设置单次读缓冲大小，下限 1024 字节（含）。
    pub fn buffer_size(&mut self, bytes: usize) -> Result<&mut Self, ArgumentError> {
        if bytes < MIN_BUFFER_SIZE {
            return Err(ArgumentError::BufferSize {
                value: bytes,
                minimum: MIN_BUFFER_SIZE,
            });
        }
        self.buffer_bytes = bytes;
        Ok(self)
    }

    /// `true` 时回调经由派生的事件循环在工作线程上执行，`false` 时在 I/O 任务上直接执行。
    pub fn workers_are_proxies(&mut self, enabled: bool) -> &mut Self {
        self.use_proxies = enabled;
        self
    }

    /// 替换执行资源；传入 `None` 时拒绝。
    pub fn executor(
        &mut self,
        executor: impl Into<Option<Arc<dyn Executor>>>,
    ) -> Result<&mut Self, ArgumentError> {
        let executor = executor.into().ok_or(ArgumentError::MissingExecutor)?;
        debug!(executor = executor.name(), "bootstrap executor replaced");
        self.executor = executor;
        Ok(self)
    }

    pub fn transport_type(&self) -> Option<Transport> {
        self.transport
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    pub fn use_proxies(&self) -> bool {
        self.use_proxies
    }

    pub fn executor_handle(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// 以当前工作线程数与执行资源派生一个新的事件循环。
    pub fn event_loop(&self) -> Arc<ThreadedEventLoop> {
        // setter 保证 workers >= 1
        let workers = NonZeroUsize::new(self.workers).unwrap_or(NonZeroUsize::MIN);
        event_loop::threaded(workers, Arc::clone(&self.executor))
    }

    /// 不经校验直接构建，推荐改用 [`Bootstrap::validate_and_build`]。
    pub fn build(&self) -> Result<Arc<dyn ServerFactory>, BootstrapError> {
        self.build_internal()
    }

    fn freeze(&self) -> Result<(Transport, ServerSettings), BootstrapError> {
        let Some(transport) = self.transport else {
            return Err(invariant("build dispatched without a transport"));
        };
        let Some(local_address) = self.base.local_address() else {
            return Err(invariant("build dispatched without a local address"));
        };
        let Some(workers) = NonZeroUsize::new(self.workers) else {
            return Err(invariant("build dispatched with zero workers"));
        };

        let settings = ServerSettings::new(local_address, workers, self.buffer_bytes)
            .with_proxies(self.use_proxies)
            .with_executor(Arc::clone(&self.executor))
            .with_options(self.base.options().clone())
            .with_callbacks(self.base.callbacks().clone());
        Ok((transport, settings))
    }
}

impl Default for ServerBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap for ServerBootstrap {
    type Output = Arc<dyn ServerFactory>;

    fn base(&self) -> &BootstrapBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BootstrapBase {
        &mut self.base
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.base.local_address().is_none() {
            return Err(ConfigurationError::MissingAddress);
        }
        if self.transport.is_none() {
            return Err(ConfigurationError::MissingTransport);
        }
        if self.workers < 1 {
            return Err(ConfigurationError::WorkerThreads {
                value: self.workers,
            });
        }
        if self.buffer_bytes < MIN_BUFFER_SIZE {
            return Err(ConfigurationError::BufferSize {
                value: self.buffer_bytes,
                minimum: MIN_BUFFER_SIZE,
            });
        }
        Ok(())
    }

    fn build_internal(&self) -> Result<Arc<dyn ServerFactory>, BootstrapError> {
        let (transport, settings) = self.freeze()?;
        info!(
            transport = %transport,
            local = %settings.local_address(),
            workers = settings.workers().get(),
            buffer_bytes = settings.buffer_bytes(),
            proxies = settings.use_proxies(),
            executor = settings.executor().name(),
            "server factory built"
        );
        Ok(dispatch(transport, settings))
    }
}

impl fmt::Debug for ServerBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBootstrap")
            .field("base", &self.base)
            .field("transport", &self.transport)
            .field("workers", &self.workers)
            .field("buffer_bytes", &self.buffer_bytes)
            .field("use_proxies", &self.use_proxies)
            .field("executor", &self.executor.name())
            .finish()
    }
}

fn dispatch(transport: Transport, settings: ServerSettings) -> Arc<dyn ServerFactory> {
    match transport {
        Transport::Tcp => Arc::new(TcpServerFactory::new(settings)),
        Transport::Udp => Arc::new(UdpServerFactory::new(settings)),
    }
}

fn invariant(detail: &'static str) -> BootstrapError {
    error!(detail, "bootstrap invariant violated, validate() was skipped");
    BootstrapError::InternalInvariant { detail }
}
