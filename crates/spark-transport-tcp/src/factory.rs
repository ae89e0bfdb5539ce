use spark_core::{ConnectionFactory, Node, Reactor, ServerFactory, ServerSettings, Transport};

use crate::reactor::TcpReactor;

/// TCP 服务端工厂。
///
/// 持有冻结的 [`ServerSettings`]，每次 [`new_reactor_at`](ServerFactory::new_reactor_at)
/// 都以快照的副本创建独立的 [`TcpReactor`]。
#[derive(Clone, Debug)]
pub struct TcpServerFactory {
    settings: ServerSettings,
}

impl TcpServerFactory {
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings }
    }
}

impl ConnectionFactory for TcpServerFactory {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

impl ServerFactory for TcpServerFactory {
    fn new_reactor_at(&self, address: Node) -> Box<dyn Reactor> {
        Box::new(TcpReactor::new(address, self.settings.clone()))
    }
}
