use core::fmt;
use core::mem;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use spark_core::{
    CallbackDispatcher, Connection, DisconnectReason, Node, Outbound, Reactor, ServerSettings,
    Transport, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::socket;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// TCP 反应器：一个监听套接字及其上的全部连接。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“绑定 → 接受 → 逐连接读写 → 停止”封装为可重复创建的独立对象，
///   同一工厂产出的多个反应器之间不共享任何运行期状态。
///
/// ## 逻辑 (How)
/// - `start` 同步完成绑定，随后在当前运行时上启动接受循环；
/// - 接受循环为每个连接派生一个读任务，读任务再派生写任务消费出站通道；
/// - 回调派发器由配置快照派生，代理模式下每个反应器独享一个事件循环；
/// - `stop` 广播停止信号并等待接受循环收尾，收尾阶段会等待所有连接任务结束并关闭事件循环。
///
/// ## 契约 (What)
/// - 运行中再次 `start` 返回 `AlreadyStarted`；停止后可以再次启动；
/// - 反应器被丢弃时停止信号的发送端随之释放，后台任务自行退出。
pub struct TcpReactor {
    address: Node,
    settings: ServerSettings,
    state: Mutex<ReactorState>,
}

enum ReactorState {
    Idle,
    Running(Running),
    Stopped,
}

struct Running {
    local: Node,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

impl TcpReactor {
    pub fn new(address: Node, settings: ServerSettings) -> Self {
        Self {
            address,
            settings,
            state: Mutex::new(ReactorState::Idle),
        }
    }
}

#[async_trait]
impl Reactor for TcpReactor {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn configured_address(&self) -> Node {
        self.address
    }

    fn local_address(&self) -> Option<Node> {
        match &*self.state.lock() {
            ReactorState::Running(running) => Some(running.local),
            _ => None,
        }
    }

    fn is_active(&self) -> bool {
        matches!(*self.state.lock(), ReactorState::Running(_))
    }

    async fn start(&self) -> Result<Node, TransportError> {
        if Handle::try_current().is_err() {
            return Err(TransportError::RuntimeUnavailable {
                transport: Transport::Tcp,
            });
        }

        let mut state = self.state.lock();
        if matches!(*state, ReactorState::Running(_)) {
            return Err(TransportError::AlreadyStarted {
                transport: Transport::Tcp,
            });
        }

        let listener = socket::bind_listener(self.address, self.settings.options())?;
        let local = listener
            .local_addr()
            .map(Node::from)
            .map_err(socket::configure_error)?;
        let (shutdown, signal) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, local, self.settings.clone(), signal));
        *state = ReactorState::Running(Running {
            local,
            shutdown,
            accept,
        });

        info!(
            transport = "tcp",
            local = %local,
            workers = self.settings.workers().get(),
            proxies = self.settings.use_proxies(),
            "reactor listening"
        );
        Ok(local)
    }

    async fn stop(&self) {
        let running = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, ReactorState::Stopped) {
                ReactorState::Running(running) => running,
                previous => {
                    *state = previous;
                    return;
                }
            }
        };

        let _ = running.shutdown.send(true);
        if let Err(error) = running.accept.await {
            warn!(transport = "tcp", local = %running.local, %error, "accept loop ended abnormally");
        }
        info!(transport = "tcp", local = %running.local, "reactor stopped");
    }
}

impl fmt::Debug for TcpReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpReactor")
            .field("address", &self.address)
            .field("local", &self.local_address())
            .field("settings", &self.settings)
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    local: Node,
    settings: ServerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let dispatcher = settings.dispatcher();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(error) = socket::configure_stream(&stream, settings.options()) {
                        warn!(transport = "tcp", peer = %peer, %error, "failed to apply socket options");
                    }
                    connections.spawn(serve(
                        stream,
                        local,
                        Node::from(peer),
                        settings.buffer_bytes(),
                        dispatcher.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(error) => {
                    warn!(transport = "tcp", local = %local, %error, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}

    if let Some(event_loop) = dispatcher.event_loop().cloned() {
        let _ = tokio::task::spawn_blocking(move || event_loop.shutdown()).await;
    }
}

async fn serve(
    stream: TcpStream,
    local: Node,
    remote: Node,
    buffer_bytes: usize,
    dispatcher: CallbackDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();
    let (outbound, inbox) = mpsc::unbounded_channel();
    let (finish, finished) = oneshot::channel();
    let connection = Connection::new(Transport::Tcp, local, remote, outbound);
    let writer = tokio::spawn(write_loop(writer, inbox, finished, shutdown.clone()));

    debug!(transport = "tcp", connection = connection.id(), remote = %remote, "connection accepted");
    dispatcher.connected(&connection);

    let mut buffer = vec![0u8; buffer_bytes];
    let reason = loop {
        tokio::select! {
            _ = shutdown.changed() => break DisconnectReason::ReactorStopped,
            read = reader.read(&mut buffer) => match read {
                Ok(0) if connection.is_open() => break DisconnectReason::PeerClosed,
                Ok(0) => break DisconnectReason::LocalClosed,
                Ok(n) => dispatcher.received(&connection, Bytes::copy_from_slice(&buffer[..n])),
                Err(error) => break DisconnectReason::Io(error.kind()),
            },
        }
    };

    connection.mark_closed();
    let _ = finish.send(());
    let _ = writer.await;

    debug!(transport = "tcp", connection = connection.id(), %reason, "connection closed");
    dispatcher.disconnected(&connection, reason);
}

/// 消费出站通道直到收到关闭指令或读循环结束；结束前冲刷已排队的数据并半关闭写方向。
///
/// 对端停止读取时写入会一直挂起，因此每次写入都与停止信号竞争，反应器停止后放弃剩余数据。
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut inbox: mpsc::UnboundedReceiver<Outbound>,
    mut finished: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            frame = inbox.recv() => match frame {
                Some(Outbound::Data { payload, .. }) => {
                    if !write_or_stop(&mut writer, &payload, &mut shutdown).await {
                        return;
                    }
                }
                Some(Outbound::Close { .. }) | None => break,
            },
            _ = &mut finished => {
                while let Ok(Outbound::Data { payload, .. }) = inbox.try_recv() {
                    if !write_or_stop(&mut writer, &payload, &mut shutdown).await {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// 写入成功返回 `true`；写入失败或反应器已停止返回 `false`。
async fn write_or_stop(
    writer: &mut OwnedWriteHalf,
    payload: &[u8],
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        written = writer.write_all(payload) => match written {
            Ok(()) => true,
            Err(error) => {
                debug!(transport = "tcp", %error, "write failed");
                false
            }
        },
        _ = shutdown.wait_for(|stopped| *stopped) => {
            debug!(transport = "tcp", pending = payload.len(), "write abandoned, reactor stopping");
            false
        }
    }
}
