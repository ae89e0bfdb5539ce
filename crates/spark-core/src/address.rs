use core::fmt;
use core::str::FromStr;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::Deserialize;
use thiserror::Error;

/// `Node` 描述服务端的绑定目标。
///
/// # 设计初衷（Why）
/// - 引导器只关心“绑定到哪里”，并不解析地址的语义；以独立类型承载，避免在配置层散落裸 `SocketAddr` 或字符串。
/// - 传输实现（TCP/UDP）在绑定时统一通过 [`Node::socket_addr`] 与标准库交互。
///
/// # 契约定义（What）
/// - 相等性与哈希完全由内部的 `SocketAddr` 决定，可直接用作 UDP 对端表的键；
/// - `Display` 输出与 `SocketAddr` 一致（IPv6 带方括号），适合作为日志字段；
/// - 反序列化接受 `"127.0.0.1:9000"` / `"[::1]:9000"` 形式的字符串。
///
/// # 风险提示（Trade-offs）
/// - 暂不支持主机名解析：DNS 查询属于 I/O，不应在配置阶段隐式发生，需要时由调用方先行解析。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct Node {
    addr: SocketAddr,
}

impl Node {
    /// 以标准库地址构造。
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// IPv4 回环地址上的指定端口；端口为 `0` 时由系统分配。
    pub const fn loopback(port: u16) -> Self {
        Self::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }

    /// IPv4 通配地址（`0.0.0.0`）上的指定端口。
    pub const fn any(port: u16) -> Self {
        Self::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
    }

    /// IPv6 回环地址上的指定端口。
    pub const fn loopback_v6(port: u16) -> Self {
        Self::new(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port))
    }

    pub const fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    pub const fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    pub const fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// 返回替换端口后的新地址，原值不变。
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.addr, f)
    }
}

impl From<SocketAddr> for Node {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl From<Node> for SocketAddr {
    fn from(node: Node) -> Self {
        node.addr
    }
}

/// 地址字符串无法解析为 [`Node`]。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid node address `{input}`: {source}")]
pub struct AddressParseError {
    input: String,
    #[source]
    source: AddrParseError,
}

impl AddressParseError {
    /// 触发失败的原始输入。
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl FromStr for Node {
    type Err = AddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .trim()
            .parse::<SocketAddr>()
            .map(Self::new)
            .map_err(|source| AddressParseError {
                input: input.to_owned(),
                source,
            })
    }
}

impl TryFrom<String> for Node {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_and_ipv6_forms() {
        let v4: Node = "127.0.0.1:9000".parse().expect("v4");
        assert_eq!(v4, Node::loopback(9000));
        assert!(v4.is_ipv4());

        let v6: Node = " [::1]:9001 ".parse().expect("v6");
        assert_eq!(v6, Node::loopback_v6(9001));
        assert_eq!(v6.to_string(), "[::1]:9001");
    }

    #[test]
    fn rejects_hostnames_and_keeps_the_input() {
        let err = "localhost:80".parse::<Node>().expect_err("hostname");
        assert_eq!(err.input(), "localhost:80");
        assert!(err.to_string().contains("localhost:80"));
    }

    #[test]
    fn with_port_leaves_original_untouched() {
        let base = Node::any(0);
        let moved = base.with_port(7000);
        assert_eq!(base.port(), 0);
        assert_eq!(moved.port(), 7000);
        assert_eq!(moved.ip(), base.ip());
    }
}
