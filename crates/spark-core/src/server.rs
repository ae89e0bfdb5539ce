//! 服务端工厂与反应器契约。
//!
//! # 设计综述（Why）
//! - 引导器构建的产物是“可复用的服务端构造对象”：同一个工厂可以在不同地址上反复产出互不影响的反应器；
//! - 反应器负责绑定、接受连接与收发数据，具体实现位于 `spark-transport-tcp` 与 `spark-transport-udp`。
//!
//! # 契约（What）
//! - 工厂对象安全，引导器以 `Arc<dyn ServerFactory>` 返回；
//! - 反应器的 `start` 在 Tokio 运行时之外调用时返回 [`TransportError::RuntimeUnavailable`]；
//! - `stop` 幂等，返回时已释放套接字并为仍存活的连接派发断开回调。

use core::fmt;

use async_trait::async_trait;

use crate::{address::Node, error::TransportError, settings::ServerSettings, transport::Transport};

/// 连接工厂的公共部分：传输类型与冻结配置。
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    fn transport(&self) -> Transport;

    fn settings(&self) -> &ServerSettings;
}

/// 能够产出服务端反应器的连接工厂。
pub trait ServerFactory: ConnectionFactory {
    /// 在指定地址上创建反应器，创建本身不绑定套接字。
    fn new_reactor_at(&self, address: Node) -> Box<dyn Reactor>;

    /// 在配置快照中的地址上创建反应器。
    fn new_reactor(&self) -> Box<dyn Reactor> {
        self.new_reactor_at(self.settings().local_address())
    }
}

/// 一个可启动、可停止的服务端实例。
#[async_trait]
pub trait Reactor: Send + Sync + fmt::Debug {
    fn transport(&self) -> Transport;

    /// 创建时指定的地址（端口可能为 `0`）。
    fn configured_address(&self) -> Node;

    /// 实际绑定的地址，仅在运行期间可用。
    fn local_address(&self) -> Option<Node>;

    fn is_active(&self) -> bool;

    /// 绑定并开始服务，返回实际绑定的地址。
    async fn start(&self) -> Result<Node, TransportError>;

    async fn stop(&self);
}
