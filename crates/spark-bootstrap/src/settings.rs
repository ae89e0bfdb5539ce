//! 从 TOML 载入引导参数。
//!
//! # 设计目标（Why）
//! - 部署环境通常以配置文件而非代码决定绑定地址与并发度；本模块把同一组参数表达为可反序列化的结构，
//!   再经由引导器的 setter 落地，参数检查因此只有一处实现。
//!
//! # 契约（What）
//! - 缺省字段沿用引导器当前值，未知字段视为错误，避免拼写错误被静默忽略；
//! - [`ServerBootstrap::apply_settings`] 要么全部生效，要么在首个非法参数处返回错误且不修改引导器；
//! - `[options]` 表中的键按 [`SocketOptions`](spark_core::SocketOptions) 的规则处理，已知键同样做类型检查。
//!
//! ```toml
//! transport = "tcp"
//! local_address = "0.0.0.0:7000"
//! workers = 4
//! buffer_bytes = 16384
//! workers_are_proxies = false
//!
//! [options]
//! tcp_nodelay = true
//! "app.tag" = "edge"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use spark_core::{ArgumentError, Bootstrap, Node, OptionValue, Transport};
use thiserror::Error;

use crate::bootstrap::ServerBootstrap;

/// 可反序列化的引导参数。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapSettings {
    pub transport: Option<Transport>,
    pub local_address: Option<Node>,
    pub workers: Option<usize>,
    pub buffer_bytes: Option<usize>,
    pub workers_are_proxies: Option<bool>,
    pub options: BTreeMap<String, OptionValue>,
}

impl BootstrapSettings {
    pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(source)?)
    }
}

/// 载入或应用配置时的失败。
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid bootstrap settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Argument(#[from] ArgumentError),
}

impl ServerBootstrap {
    /// 以默认值为起点应用配置。
    pub fn from_settings(settings: &BootstrapSettings) -> Result<Self, SettingsError> {
        let mut bootstrap = Self::new();
        bootstrap.apply_settings(settings)?;
        Ok(bootstrap)
    }

    /// 把配置应用到当前引导器。
    pub fn apply_settings(
        &mut self,
        settings: &BootstrapSettings,
    ) -> Result<&mut Self, SettingsError> {
        let mut next = self.clone();
        if let Some(transport) = settings.transport {
            next.transport(transport);
        }
        if let Some(address) = settings.local_address {
            next.local_address(address);
        }
        if let Some(workers) = settings.workers {
            next.worker_threads(workers)?;
        }
        if let Some(bytes) = settings.buffer_bytes {
            next.buffer_size(bytes)?;
        }
        if let Some(enabled) = settings.workers_are_proxies {
            next.workers_are_proxies(enabled);
        }
        for (key, value) in &settings.options {
            next.set_option(key, value.clone())?;
        }
        *self = next;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        transport = "udp"
        local_address = "127.0.0.1:7000"
        workers = 4
        buffer_bytes = 16384
        workers_are_proxies = false

        [options]
        broadcast = true
        ttl = 32
        "app.tag" = "edge"
    "#;

    #[test]
    fn full_document_configures_every_field() {
        let settings = BootstrapSettings::from_toml_str(FULL).expect("parse");
        let bootstrap = ServerBootstrap::from_settings(&settings).expect("apply");

        assert_eq!(bootstrap.transport_type(), Some(Transport::Udp));
        assert_eq!(bootstrap.local_node(), Some(Node::loopback(7000)));
        assert_eq!(bootstrap.workers(), 4);
        assert_eq!(bootstrap.buffer_bytes(), 16384);
        assert!(!bootstrap.use_proxies());
        assert_eq!(bootstrap.options().broadcast(), Some(true));
        assert_eq!(bootstrap.options().ttl(), Some(32));
        assert_eq!(
            bootstrap.options().extension("app.tag"),
            Some(&OptionValue::from("edge"))
        );
        assert_eq!(bootstrap.validate(), Ok(()));
    }

    #[test]
    fn absent_fields_keep_defaults() {
        let settings = BootstrapSettings::from_toml_str("transport = \"tcp\"").expect("parse");
        let bootstrap = ServerBootstrap::from_settings(&settings).expect("apply");

        assert_eq!(bootstrap.transport_type(), Some(Transport::Tcp));
        assert_eq!(bootstrap.workers(), crate::DEFAULT_WORKERS);
        assert_eq!(bootstrap.buffer_bytes(), spark_core::DEFAULT_BUFFER_SIZE);
        assert!(bootstrap.use_proxies());
    }

    #[test]
    fn unknown_fields_and_bad_addresses_fail_to_parse() {
        assert!(matches!(
            BootstrapSettings::from_toml_str("wrokers = 4"),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            BootstrapSettings::from_toml_str("local_address = \"localhost\""),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            BootstrapSettings::from_toml_str("transport = \"sctp\""),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn rejected_argument_leaves_the_bootstrap_untouched() {
        let mut bootstrap = ServerBootstrap::new();
        bootstrap.worker_threads(3).expect("workers");

        let settings = BootstrapSettings {
            transport: Some(Transport::Tcp),
            workers: Some(8),
            buffer_bytes: Some(512),
            ..BootstrapSettings::default()
        };
        let err = bootstrap
            .apply_settings(&settings)
            .map(|_| ())
            .expect_err("buffer below minimum");

        assert!(matches!(
            err,
            SettingsError::Argument(ArgumentError::BufferSize { value: 512, .. })
        ));
        assert_eq!(bootstrap.workers(), 3);
        assert_eq!(bootstrap.transport_type(), None);
    }

    #[test]
    fn mistyped_known_option_is_an_argument_error() {
        let settings =
            BootstrapSettings::from_toml_str("[options]\ntcp_nodelay = \"yes\"").expect("parse");
        let err = ServerBootstrap::from_settings(&settings).expect_err("string nodelay");
        assert!(matches!(
            err,
            SettingsError::Argument(ArgumentError::OptionType { .. })
        ));
    }
}
