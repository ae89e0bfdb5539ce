//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义引导链路的错误语义，区分“调用方传参错误”“配置未就绪”“内部契约被绕过”三类失败；
//! - 传输与事件循环的运行期错误也在此声明，便于 `Reactor` 等对象安全 trait 使用统一的错误类型。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 任何错误都直接上抛给调用方，本层不做重试或吞没。

use std::io;

use thiserror::Error;

use crate::{address::Node, transport::Transport};

/// setter 收到非法参数。
///
/// 在调用 setter 的当下同步返回，引导器状态保持调用前的值。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("worker thread count can't be below 1 (got {value})")]
    WorkerThreads { value: usize },

    #[error("buffer size can't be below {minimum} bytes (got {value})")]
    BufferSize { value: usize, minimum: usize },

    #[error("executor must be present")]
    MissingExecutor,

    /// 已知选项收到了类型不符的值，例如 `tcp_nodelay = "yes"`。
    #[error("option `{key}` expects a {expected} value, got {actual}")]
    OptionType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// `validate()` 发现的第一个配置缺陷。
///
/// # 教案式说明
/// - **意图 (Why)**：校验是构建前的闸门，按固定顺序检查并在首个违规处返回，不聚合多个错误；
/// - **契约 (What)**：文案保持稳定（`"address must be set"` 等），调用方可直接展示给运维。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("address must be set")]
    MissingAddress,

    #[error("transport must be set")]
    MissingTransport,

    #[error("workers must be at least 1 (got {value})")]
    WorkerThreads { value: usize },

    #[error("buffer size must be at least {minimum} bytes (got {value})")]
    BufferSize { value: usize, minimum: usize },
}

/// 引导器构建阶段的统一错误。
///
/// # 教案式说明
/// - **意图 (Why)**：`validate_and_build` 既可能因配置失败，也可能因内部不变量被破坏而失败，
///   调用方需要一个可以 `?` 传播的聚合类型；
/// - **契约 (What)**：
///   - `Argument`/`Configuration` 是面向用户的错误，修正配置后重试即可；
///   - `InternalInvariant` 表示构建分派在未校验的状态下被触达，属于编程缺陷，[`is_fatal`](Self::is_fatal) 返回 `true`；
/// - **风险 (Trade-offs)**：`InternalInvariant` 以错误值而非 panic 返回，调用方若选择忽略它，需自行承担后果。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("bootstrap invariant violated: {detail}")]
    InternalInvariant { detail: &'static str },
}

impl BootstrapError {
    /// 是否为不可恢复的内部缺陷。
    pub fn is_fatal(&self) -> bool {
        matches!(self, BootstrapError::InternalInvariant { .. })
    }
}

/// 反应器（监听器）在启动或运行期的失败。
///
/// 每个变体都携带传输类型，[`code`](Self::code) 据此给出稳定的错误码，例如 `spark.transport.tcp.bind_failed`。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{transport} bind {addr}: {source}")]
    Bind {
        transport: Transport,
        addr: Node,
        #[source]
        source: io::Error,
    },

    #[error("{transport} configure: {source}")]
    Configure {
        transport: Transport,
        #[source]
        source: io::Error,
    },

    #[error("{transport} reactor has already been started")]
    AlreadyStarted { transport: Transport },

    #[error("{transport} reactor requires a running Tokio runtime")]
    RuntimeUnavailable { transport: Transport },
}

impl TransportError {
    pub fn transport(&self) -> Transport {
        match self {
            TransportError::Bind { transport, .. }
            | TransportError::Configure { transport, .. }
            | TransportError::AlreadyStarted { transport }
            | TransportError::RuntimeUnavailable { transport } => *transport,
        }
    }

    /// 稳定错误码，供日志与告警聚合。
    pub fn code(&self) -> &'static str {
        match (self, self.transport()) {
            (TransportError::Bind { .. }, Transport::Tcp) => "spark.transport.tcp.bind_failed",
            (TransportError::Bind { .. }, Transport::Udp) => "spark.transport.udp.bind_failed",
            (TransportError::Configure { .. }, Transport::Tcp) => {
                "spark.transport.tcp.configure_failed"
            }
            (TransportError::Configure { .. }, Transport::Udp) => {
                "spark.transport.udp.configure_failed"
            }
            (TransportError::AlreadyStarted { .. }, Transport::Tcp) => {
                "spark.transport.tcp.already_started"
            }
            (TransportError::AlreadyStarted { .. }, Transport::Udp) => {
                "spark.transport.udp.already_started"
            }
            (TransportError::RuntimeUnavailable { .. }, Transport::Tcp) => {
                "spark.transport.tcp.runtime_unavailable"
            }
            (TransportError::RuntimeUnavailable { .. }, Transport::Udp) => {
                "spark.transport.udp.runtime_unavailable"
            }
        }
    }
}

/// 事件循环拒绝接收任务。
#[derive(Debug, Error)]
pub enum EventLoopError {
    #[error("event loop {id} has been shut down")]
    Terminated { id: u64 },

    #[error("event loop {id} failed to spawn worker thread: {source}")]
    Spawn {
        id: u64,
        #[source]
        source: io::Error,
    },
}

/// 对已关闭的连接执行出站操作。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection {id} is closed")]
    Closed { id: u64 },
}
