//! 结构化套接字选项。
//!
//! # 设计目标（Why）
//! - 引导器的 `set_option(key, value)` 需要保持“任意键值”的扩展性，同时避免无类型字典带来的拼写与类型错误；
//! - 因此常用选项落入具名、带类型的字段，未知键进入扩展表，由下游自行解释。
//!
//! # 契约（What）
//! - 已知键：`reuse_address`、`tcp_nodelay`、`keep_alive`、`broadcast`（布尔），`ttl`、`send_buffer_size`（整数）；
//! - 已知键收到类型不符的值时返回 [`ArgumentError::OptionType`]，原值保持不变；
//! - 同一键重复写入时后写覆盖先写。

use core::num::TryFromIntError;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ArgumentError;

/// 选项值。
///
/// 反序列化时按 `Bool → Int → Str → Duration` 的顺序尝试匹配。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Duration(Duration),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "integer",
            OptionValue::Str(_) => "string",
            OptionValue::Duration(_) => "duration",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            OptionValue::Duration(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

/// 超出 `i64` 范围的值返回错误，不做截断。
impl TryFrom<usize> for OptionValue {
    type Error = TryFromIntError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        i64::try_from(value).map(OptionValue::Int)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<Duration> for OptionValue {
    fn from(value: Duration) -> Self {
        OptionValue::Duration(value)
    }
}

/// 引导器持有的套接字选项集合，由传输实现在绑定与接受连接时应用。
///
/// # 教案级注释
/// - **意图 (Why)**：把“调用方声明的意图”与“传输实现的应用时机”解耦：引导阶段只记录，
///   `spark-transport-*` 在创建套接字时读取；
/// - **契约 (What)**：`None` 表示沿用操作系统默认值（`reuse_address` 例外，TCP/UDP 实现默认开启）；
///   扩展表按键排序，便于在日志与测试中得到稳定输出；
/// - **风险 (Trade-offs)**：与传输无关的选项（如 UDP 上的 `tcp_nodelay`）会被静默忽略。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketOptions {
    reuse_address: Option<bool>,
    tcp_nodelay: Option<bool>,
    keep_alive: Option<bool>,
    broadcast: Option<bool>,
    ttl: Option<u32>,
    send_buffer_size: Option<usize>,
    extensions: BTreeMap<String, OptionValue>,
}

impl SocketOptions {
    pub const REUSE_ADDRESS: &'static str = "reuse_address";
    pub const TCP_NODELAY: &'static str = "tcp_nodelay";
    pub const KEEP_ALIVE: &'static str = "keep_alive";
    pub const BROADCAST: &'static str = "broadcast";
    pub const TTL: &'static str = "ttl";
    pub const SEND_BUFFER_SIZE: &'static str = "send_buffer_size";

    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个选项。已知键做类型检查，未知键进入扩展表。
    pub fn set(&mut self, key: &str, value: OptionValue) -> Result<(), ArgumentError> {
        match key {
            Self::REUSE_ADDRESS => self.reuse_address = Some(expect_bool(key, &value)?),
            Self::TCP_NODELAY => self.tcp_nodelay = Some(expect_bool(key, &value)?),
            Self::KEEP_ALIVE => self.keep_alive = Some(expect_bool(key, &value)?),
            Self::BROADCAST => self.broadcast = Some(expect_bool(key, &value)?),
            Self::TTL => self.ttl = Some(expect_unsigned(key, &value, "u32 integer")?),
            Self::SEND_BUFFER_SIZE => {
                self.send_buffer_size = Some(expect_unsigned(key, &value, "usize integer")?);
            }
            _ => {
                self.extensions.insert(key.to_owned(), value);
            }
        }
        Ok(())
    }

    /// 读取任意键，已知键从具名字段回读。
    pub fn get(&self, key: &str) -> Option<OptionValue> {
        match key {
            Self::REUSE_ADDRESS => self.reuse_address.map(OptionValue::from),
            Self::TCP_NODELAY => self.tcp_nodelay.map(OptionValue::from),
            Self::KEEP_ALIVE => self.keep_alive.map(OptionValue::from),
            Self::BROADCAST => self.broadcast.map(OptionValue::from),
            Self::TTL => self.ttl.map(OptionValue::from),
            Self::SEND_BUFFER_SIZE => self
                .send_buffer_size
                .and_then(|bytes| OptionValue::try_from(bytes).ok()),
            _ => self.extensions.get(key).cloned(),
        }
    }

    pub fn reuse_address(&self) -> Option<bool> {
        self.reuse_address
    }

    pub fn tcp_nodelay(&self) -> Option<bool> {
        self.tcp_nodelay
    }

    pub fn keep_alive(&self) -> Option<bool> {
        self.keep_alive
    }

    pub fn broadcast(&self) -> Option<bool> {
        self.broadcast
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    pub fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer_size
    }

    pub fn extension(&self, key: &str) -> Option<&OptionValue> {
        self.extensions.get(key)
    }

    pub fn extensions(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.extensions.iter().map(|(key, value)| (key.as_str(), value))
    }
}

fn expect_bool(key: &str, value: &OptionValue) -> Result<bool, ArgumentError> {
    value.as_bool().ok_or_else(|| ArgumentError::OptionType {
        key: key.to_owned(),
        expected: "bool",
        actual: value.kind(),
    })
}

fn expect_unsigned<T>(key: &str, value: &OptionValue, expected: &'static str) -> Result<T, ArgumentError>
where
    T: TryFrom<i64>,
{
    value
        .as_int()
        .and_then(|raw| T::try_from(raw).ok())
        .ok_or_else(|| ArgumentError::OptionType {
            key: key.to_owned(),
            expected,
            actual: value.kind(),
        })
}
