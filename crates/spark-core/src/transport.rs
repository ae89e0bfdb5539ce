use core::fmt;

use serde::Deserialize;

/// 服务端可选的传输协议族。
///
/// # 教案级注释
/// - **意图 (Why)**：分派函数只接受这个封闭集合，因此“未设置传输类型”无法流入分派逻辑；
///   可变配置中的“未设置”状态由 `Option<Transport>` 的 `None` 表达。
/// - **契约 (What)**：`scheme()` 返回稳定的小写协议名，用作日志字段与错误码片段；
///   反序列化同样接受小写形式（`"tcp"`/`"udp"`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// 面向连接的字节流。
    Tcp,
    /// 无连接报文。
    Udp,
}

impl Transport {
    pub const fn scheme(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}
