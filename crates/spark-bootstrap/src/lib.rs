#![deny(unsafe_code)]
#![doc = "spark-bootstrap: 服务端引导器。"]
#![doc = ""]
#![doc = "== 定位 =="]
#![doc = "- **Why**：服务端在启动前需要累积一组构造参数（绑定地址、传输类型、工作线程数、缓冲大小、回调与执行资源），"]
#![doc = "  并在构建时一次性校验、冻结并交给对应传输的工厂。"]
#![doc = "- **What**：[`ServerBootstrap`] 提供链式 setter、[`Bootstrap::validate`] 与构建入口；"]
#![doc = "  [`BootstrapSettings`] 支持从 TOML 载入同一组参数。"]
#![doc = "- **How**：构建时把可变配置冻结为 [`ServerSettings`](spark_core::ServerSettings)，"]
#![doc = "  再按传输类型分派到 `spark-transport-tcp` 或 `spark-transport-udp`。"]
#![doc = ""]
#![doc = "```no_run"]
#![doc = "use spark_bootstrap::{Bootstrap, ServerBootstrap, ServerFactory, Transport};"]
#![doc = ""]
#![doc = "# fn main() -> Result<(), Box<dyn std::error::Error>> {"]
#![doc = "let mut bootstrap = ServerBootstrap::new();"]
#![doc = "bootstrap"]
#![doc = "    .local_address(\"127.0.0.1:9000\".parse::<spark_bootstrap::Node>()?)"]
#![doc = "    .transport(Transport::Tcp)"]
#![doc = "    .worker_threads(4)?"]
#![doc = "    .on_receive(|conn, data| {"]
#![doc = "        let _ = conn.send(data);"]
#![doc = "    });"]
#![doc = "let factory = bootstrap.validate_and_build()?;"]
#![doc = "let _reactor = factory.new_reactor();"]
#![doc = "# Ok(())"]
#![doc = "# }"]
#![doc = "```"]

mod bootstrap;
mod settings;

pub use bootstrap::{DEFAULT_WORKERS, ServerBootstrap};
pub use settings::{BootstrapSettings, SettingsError};

pub use spark_core::{
    ArgumentError, BasicExecutor, Bootstrap, BootstrapError, ConfigurationError, Connection,
    DisconnectReason, Executor, Node, OptionValue, Reactor, ServerFactory, Transport,
};
