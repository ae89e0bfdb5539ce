//! 基础引导契约。
//!
//! # 设计综述（Why）
//! - 所有引导器共享“绑定地址 + 套接字选项 + 连接回调”这组通用配置，以及“校验 → 构建”的模板流程；
//! - 具体引导器（如 `spark-bootstrap::ServerBootstrap`）只需暴露自身的 [`BootstrapBase`] 并实现
//!   [`Bootstrap::build_internal`]，其余 setter 以默认方法提供。
//!
//! # 链式调用（How）
//! - 默认方法返回 `&mut Self` 而非 `&mut BootstrapBase`，链式调用中途不会“退化”为基础类型，
//!   `bootstrap.local_address(addr).transport(Transport::Tcp)` 可以连续书写；
//! - 可能失败的 setter 返回 `Result<&mut Self, ArgumentError>`，与 `?` 搭配使用。

use bytes::Bytes;
use std::sync::Arc;

use crate::{
    address::Node,
    callback::Callbacks,
    connection::{Connection, DisconnectReason},
    error::{ArgumentError, BootstrapError, ConfigurationError},
    options::{OptionValue, SocketOptions},
};

/// 所有引导器共有的可变配置。
///
/// 克隆时地址按值复制、选项深拷贝、回调共享同一份闭包。
#[derive(Clone, Debug, Default)]
pub struct BootstrapBase {
    local_address: Option<Node>,
    options: SocketOptions,
    callbacks: Callbacks,
}

impl BootstrapBase {
    pub fn local_address(&self) -> Option<Node> {
        self.local_address
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }
}

/// `Bootstrap` 是引导器的基础契约。
///
/// # 教案级注释
/// - **意图 (Why)**：把通用 setter 与“先校验再构建”的流程固定在基类契约上，具体引导器只补充差异部分；
/// - **契约 (What)**：
///   - [`validate`](Self::validate) 是纯函数，按固定顺序检查并返回第一个违规；默认实现只检查地址，
///     具体引导器覆写时应先调用同样的地址检查以保持顺序；
///   - [`build_internal`](Self::build_internal) 假定配置已经校验通过；
///   - [`validate_and_build`](Self::validate_and_build) 是推荐入口，校验失败时不会触达构建分派；
/// - **风险 (Trade-offs)**：`Sized` 约束使该 trait 不能作为 trait object 使用，引导器本身也无此需求。
pub trait Bootstrap: Sized {
    /// 构建产物，例如服务端工厂。
    type Output;

    fn base(&self) -> &BootstrapBase;

    fn base_mut(&mut self) -> &mut BootstrapBase;

    /// 设置绑定地址。
    fn local_address(&mut self, address: impl Into<Node>) -> &mut Self {
        self.base_mut().local_address = Some(address.into());
        self
    }

    fn on_connect<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.base_mut().callbacks.set_on_connect(Arc::new(callback));
        self
    }

    fn on_disconnect<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&Connection, &DisconnectReason) + Send + Sync + 'static,
    {
        self.base_mut()
            .callbacks
            .set_on_disconnect(Arc::new(callback));
        self
    }

    fn on_receive<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&Connection, Bytes) + Send + Sync + 'static,
    {
        self.base_mut().callbacks.set_on_receive(Arc::new(callback));
        self
    }

    /// 写入套接字选项，已知键的类型不符时返回错误且不修改状态。
    fn set_option(
        &mut self,
        key: &str,
        value: impl Into<OptionValue>,
    ) -> Result<&mut Self, ArgumentError> {
        self.base_mut().options.set(key, value.into())?;
        Ok(self)
    }

    fn local_node(&self) -> Option<Node> {
        self.base().local_address
    }

    fn options(&self) -> &SocketOptions {
        &self.base().options
    }

    fn callbacks(&self) -> &Callbacks {
        &self.base().callbacks
    }

    /// 检查构建前置条件，返回第一个违规。
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.base().local_address.is_none() {
            return Err(ConfigurationError::MissingAddress);
        }
        Ok(())
    }

    /// 在已校验的配置上执行构建。
    fn build_internal(&self) -> Result<Self::Output, BootstrapError>;

    /// 模板流程：校验 → 构建。
    fn validate_and_build(&self) -> Result<Self::Output, BootstrapError> {
        self.validate()?;
        self.build_internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, Default)]
    struct Probe {
        base: BootstrapBase,
        builds: Arc<AtomicUsize>,
    }

    impl Bootstrap for Probe {
        type Output = Node;

        fn base(&self) -> &BootstrapBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut BootstrapBase {
            &mut self.base
        }

        fn build_internal(&self) -> Result<Node, BootstrapError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.local_node().ok_or(BootstrapError::InternalInvariant {
                detail: "probe built without an address",
            })
        }
    }

    #[test]
    fn chained_setters_keep_the_concrete_type() {
        let mut probe = Probe::default();
        probe
            .local_address(Node::loopback(7000))
            .on_connect(|_conn| {})
            .set_option("tcp_nodelay", true)
            .expect("option")
            .on_receive(|_conn, _data| {});

        assert_eq!(probe.local_node(), Some(Node::loopback(7000)));
        assert_eq!(probe.options().tcp_nodelay(), Some(true));
        assert!(probe.callbacks().on_connect().is_some());
        assert!(probe.callbacks().on_receive().is_some());
        assert!(probe.callbacks().on_disconnect().is_none());
    }

    #[test]
    fn validate_and_build_stops_at_the_first_violation() {
        let probe = Probe::default();
        assert_eq!(
            probe.validate_and_build(),
            Err(BootstrapError::Configuration(
                ConfigurationError::MissingAddress
            ))
        );
        assert_eq!(probe.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validate_and_build_returns_the_build_output() {
        let mut probe = Probe::default();
        probe.local_address(Node::any(8080));
        assert_eq!(probe.validate_and_build(), Ok(Node::any(8080)));
        assert_eq!(probe.builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mistyped_option_leaves_the_bootstrap_untouched() {
        let mut probe = Probe::default();
        let err = probe.set_option("ttl", "sixty-four").expect_err("string ttl");
        assert!(matches!(err, ArgumentError::OptionType { .. }));
        assert_eq!(probe.options(), &SocketOptions::default());
    }
}
