use core::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{address::Node, error::ConnectionError, transport::Transport};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// 交给反应器写任务的出站指令。
///
/// TCP 实现中每个连接独享一条出站通道，`remote` 仅用于日志；UDP 实现共享一条通道，依赖 `remote` 决定目的地址。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Data { remote: Node, payload: Bytes },
    Close { remote: Node },
}

/// 连接终止的原因，随 `on_disconnect` 回调传递。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 对端关闭（TCP 读到 EOF）。
    PeerClosed,
    /// 本端通过 [`Connection::close`] 主动关闭。
    LocalClosed,
    /// 反应器停止，连接随之释放。
    ReactorStopped,
    /// 读写过程中出现 I/O 错误。
    Io(io::ErrorKind),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => f.write_str("peer closed"),
            DisconnectReason::LocalClosed => f.write_str("closed locally"),
            DisconnectReason::ReactorStopped => f.write_str("reactor stopped"),
            DisconnectReason::Io(kind) => write!(f, "io error: {kind}"),
        }
    }
}

/// 回调中可见的连接句柄。
///
/// # 教案级注释
/// - **意图 (Why)**：回调需要识别连接并回写数据，但不应直接触碰套接字；句柄只持有出站通道，
///   真正的写操作由反应器的写任务完成，回调线程因此永不阻塞在 I/O 上；
/// - **契约 (What)**：
///   - 句柄可廉价克隆，克隆体共享同一状态，相等性按 [`id`](Self::id) 判定；
///   - [`close`](Self::close) 之后 `send` 返回 [`ConnectionError::Closed`]；
///   - TCP 上 `close` 执行写方向半关闭，读方向继续直到对端关闭；UDP 上 `close` 从对端表中移除该对端；
/// - **风险 (Trade-offs)**：出站通道无界，持续向慢速对端写入会累积内存。
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: u64,
    transport: Transport,
    local: Node,
    remote: Node,
    outbound: mpsc::UnboundedSender<Outbound>,
    open: AtomicBool,
}

impl Connection {
    /// 由反应器在接受连接（或首次收到对端报文）时创建。
    pub fn new(
        transport: Transport,
        local: Node,
        remote: Node,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                transport,
                local,
                remote,
                outbound,
                open: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn transport(&self) -> Transport {
        self.inner.transport
    }

    pub fn local_address(&self) -> Node {
        self.inner.local
    }

    pub fn remote_address(&self) -> Node {
        self.inner.remote
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// 向对端发送数据。
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(self.closed());
        }
        self.inner
            .outbound
            .send(Outbound::Data {
                remote: self.inner.remote,
                payload: payload.into(),
            })
            .map_err(|_| self.closed())
    }

    /// 主动关闭连接。重复调用无副作用。
    pub fn close(&self) {
        if self.mark_closed() {
            let _ = self.inner.outbound.send(Outbound::Close {
                remote: self.inner.remote,
            });
        }
    }

    /// 仅翻转状态而不通知写任务，返回调用前是否处于打开状态。反应器在回收连接时使用。
    pub fn mark_closed(&self) -> bool {
        self.inner.open.swap(false, Ordering::AcqRel)
    }

    fn closed(&self) -> ConnectionError {
        ConnectionError::Closed { id: self.inner.id }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("transport", &self.inner.transport)
            .field("local", &self.inner.local)
            .field("remote", &self.inner.remote)
            .field("open", &self.is_open())
            .finish()
    }
}
