use spark_core::{ConnectionFactory, Node, Reactor, ServerFactory, ServerSettings, Transport};

use crate::reactor::UdpReactor;

/// UDP 服务端工厂，每次创建的反应器拥有独立的套接字与对端表。
#[derive(Clone, Debug)]
pub struct UdpServerFactory {
    settings: ServerSettings,
}

impl UdpServerFactory {
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings }
    }
}

impl ConnectionFactory for UdpServerFactory {
    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

impl ServerFactory for UdpServerFactory {
    fn new_reactor_at(&self, address: Node) -> Box<dyn Reactor> {
        Box::new(UdpReactor::new(address, self.settings.clone()))
    }
}
