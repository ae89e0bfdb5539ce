#![deny(unsafe_code)]
#![doc = "spark-core: 服务端引导链路的核心契约。"]
#![doc = ""]
#![doc = "== 定位 =="]
#![doc = "- **Why**：引导器（`spark-bootstrap`）与各传输实现（`spark-transport-tcp`/`spark-transport-udp`）需要一套共同语言，"]
#![doc = "  用于描述绑定地址、执行资源、事件循环、连接回调以及冻结后的服务端配置。"]
#![doc = "- **What**：本 crate 提供 [`Node`]、[`Executor`]、[`ThreadedEventLoop`]、[`Callbacks`]、[`SocketOptions`]、"]
#![doc = "  基础引导契约 [`Bootstrap`]、配置快照 [`ServerSettings`] 以及 [`ServerFactory`]/[`Reactor`] 等抽象。"]
#![doc = "- **How**：传输实现只依赖本 crate，引导器再依赖传输实现，依赖方向保持单向，避免循环。"]

pub mod address;
pub mod bootstrap;
pub mod callback;
pub mod connection;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod options;
pub mod server;
pub mod settings;
pub mod transport;

pub use address::{AddressParseError, Node};
pub use bootstrap::{Bootstrap, BootstrapBase};
pub use callback::{
    CallbackDispatcher, Callbacks, ConnectionEstablishedCallback, ConnectionTerminatedCallback,
    ReceivedDataCallback,
};
pub use connection::{Connection, DisconnectReason, Outbound};
pub use error::{
    ArgumentError, BootstrapError, ConfigurationError, ConnectionError, EventLoopError,
    TransportError,
};
pub use event_loop::ThreadedEventLoop;
pub use executor::{BasicExecutor, Executor, Task};
pub use options::{OptionValue, SocketOptions};
pub use server::{ConnectionFactory, Reactor, ServerFactory};
pub use settings::ServerSettings;
pub use transport::Transport;

/// 默认的单次读缓冲大小（字节），由引导器作为 `buffer_bytes` 的初值。
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// `buffer_bytes` 的下限（含）。低于该值的配置在 setter 与校验阶段都会被拒绝。
pub const MIN_BUFFER_SIZE: usize = 1024;
