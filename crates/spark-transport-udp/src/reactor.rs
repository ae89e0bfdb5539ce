use core::fmt;
use core::mem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use spark_core::{
    CallbackDispatcher, Connection, DisconnectReason, Node, Outbound, Reactor, ServerSettings,
    Transport, TransportError,
};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::socket;

const RECV_BACKOFF: Duration = Duration::from_millis(50);

type PeerTable = Arc<Mutex<HashMap<Node, Connection>>>;

/// UDP 反应器：一个数据报套接字与其对端表。
///
/// # 教案级注释
/// - **意图 (Why)**：让无连接的 UDP 也能以“连接”语义驱动回调，上层代码不必区分传输类型；
/// - **逻辑 (How)**：
///   - 接收循环按源地址查找对端表，未命中时创建 [`Connection`] 并派发 `on_connect`；
///   - 写任务消费共享出站通道：`Data` 经 `send_to` 发往目标地址，`Close` 移除对端并派发 `LocalClosed`；
///   - 停止时先让写任务冲刷排队报文，再对剩余对端派发 `ReactorStopped`，最后关闭事件循环；
/// - **契约 (What)**：运行中再次 `start` 返回 `AlreadyStarted`；`stop` 返回时所有断开回调均已执行；
/// - **风险 (Trade-offs)**：回调执行期间对端表锁已释放，回调内调用 `close` 不会死锁，
///   但 `close` 之后、写任务处理 `Close` 之前到达的报文会被丢弃。
pub struct UdpReactor {
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
    task: JoinHandle<()>,
}

impl UdpReactor {
    pub fn new(address: Node, settings: ServerSettings) -> Self {
        Self {
            address,
            settings,
            state: Mutex::new(ReactorState::Idle),
        }
    }
}

#[async_trait]
impl Reactor for UdpReactor {
    fn transport(&self) -> Transport {
        Transport::Udp
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
                transport: Transport::Udp,
            });
        }

        let mut state = self.state.lock();
        if matches!(*state, ReactorState::Running(_)) {
            return Err(TransportError::AlreadyStarted {
                transport: Transport::Udp,
            });
        }

        let socket = socket::bind_socket(self.address, self.settings.options())?;
        let local = socket
            .local_addr()
            .map(Node::from)
            .map_err(socket::configure_error)?;
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(serve(Arc::new(socket), local, self.settings.clone(), signal));
        *state = ReactorState::Running(Running {
            local,
            shutdown,
            task,
        });

        info!(
            transport = "udp",
            local = %local,
            workers = self.settings.workers().get(),
            proxies = self.settings.use_proxies(),
            "reactor bound"
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
        if let Err(error) = running.task.await {
            warn!(transport = "udp", local = %running.local, %error, "receive loop ended abnormally");
        }
        info!(transport = "udp", local = %running.local, "reactor stopped");
    }
}

impl fmt::Debug for UdpReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpReactor")
            .field("address", &self.address)
            .field("local", &self.local_address())
            .field("settings", &self.settings)
            .finish()
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    local: Node,
    settings: ServerSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let dispatcher = settings.dispatcher();
    let peers = PeerTable::default();
    let (outbound, inbox) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(
        Arc::clone(&socket),
        inbox,
        Arc::clone(&peers),
        dispatcher.clone(),
        shutdown.clone(),
    ));

    let mut buffer = vec![0u8; settings.buffer_bytes()];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, peer)) => {
                    let peer = Node::from(peer);
                    let (connection, fresh) = {
                        let mut peers = peers.lock();
                        match peers.get(&peer) {
                            Some(connection) => (connection.clone(), false),
                            None => {
                                let connection =
                                    Connection::new(Transport::Udp, local, peer, outbound.clone());
                                peers.insert(peer, connection.clone());
                                (connection, true)
                            }
                        }
                    };
                    if !connection.is_open() {
                        debug!(transport = "udp", peer = %peer, "dropping datagram for closing peer");
                        continue;
                    }
                    if fresh {
                        debug!(transport = "udp", connection = connection.id(), peer = %peer, "peer registered");
                        dispatcher.connected(&connection);
                    }
                    dispatcher.received(&connection, Bytes::copy_from_slice(&buffer[..len]));
                }
                Err(error) => {
                    warn!(transport = "udp", local = %local, %error, "receive failed");
                    if !back_off(&mut shutdown).await {
                        break;
                    }
                }
            },
        }
    }

    drop(outbound);
    if let Err(error) = writer.await {
        warn!(transport = "udp", local = %local, %error, "writer ended abnormally");
    }

    let remaining: Vec<Connection> = peers.lock().drain().map(|(_, connection)| connection).collect();
    for connection in remaining {
        if connection.mark_closed() {
            dispatcher.disconnected(&connection, DisconnectReason::ReactorStopped);
        }
    }

    if let Some(event_loop) = dispatcher.event_loop().cloned() {
        let _ = tokio::task::spawn_blocking(move || event_loop.shutdown()).await;
    }
}

/// 接收失败后退避，避免持续性错误占满 CPU；退避期间收到停止信号时返回 `false`。
async fn back_off(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(RECV_BACKOFF) => true,
    }
}

async fn write_loop(
    socket: Arc<UdpSocket>,
    mut inbox: mpsc::UnboundedReceiver<Outbound>,
    peers: PeerTable,
    dispatcher: CallbackDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            frame = inbox.recv() => match frame {
                Some(frame) => handle(&socket, &peers, &dispatcher, frame).await,
                None => break,
            },
            _ = shutdown.changed() => {
                while let Ok(frame) = inbox.try_recv() {
                    handle(&socket, &peers, &dispatcher, frame).await;
                }
                break;
            }
        }
    }
}

async fn handle(
    socket: &UdpSocket,
    peers: &Mutex<HashMap<Node, Connection>>,
    dispatcher: &CallbackDispatcher,
    frame: Outbound,
) {
    match frame {
        Outbound::Data { remote, payload } => {
            if let Err(error) = socket.send_to(&payload, remote.socket_addr()).await {
                warn!(transport = "udp", remote = %remote, %error, "send failed");
            }
        }
        Outbound::Close { remote } => {
            let removed = peers.lock().remove(&remote);
            if let Some(connection) = removed {
                dispatcher.disconnected(&connection, DisconnectReason::LocalClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::num::NonZeroUsize;
    use spark_core::{Callbacks, ServerFactory};
    use std::time::Instant;

    use crate::UdpServerFactory;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Connected(Node),
        Received(Vec<u8>),
        Disconnected(Node, DisconnectReason),
    }

    /// 回显收到的报文；收到 `bye` 时关闭该对端。
    fn settings(use_proxies: bool) -> (ServerSettings, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut callbacks = Callbacks::default();
        let on_connect = tx.clone();
        callbacks.set_on_connect(Arc::new(move |conn: &Connection| {
            let _ = on_connect.send(Event::Connected(conn.remote_address()));
        }));
        let on_receive = tx.clone();
        callbacks.set_on_receive(Arc::new(move |conn: &Connection, data: Bytes| {
            let _ = on_receive.send(Event::Received(data.to_vec()));
            if data.as_ref() == b"bye" {
                conn.close();
            } else {
                let _ = conn.send(data);
            }
        }));
        callbacks.set_on_disconnect(Arc::new(
            move |conn: &Connection, reason: &DisconnectReason| {
                let _ = tx.send(Event::Disconnected(conn.remote_address(), *reason));
            },
        ));
        let settings = ServerSettings::new(
            Node::loopback(0),
            NonZeroUsize::new(2).expect("non-zero"),
            spark_core::DEFAULT_BUFFER_SIZE,
        )
        .with_proxies(use_proxies)
        .with_callbacks(callbacks);
        (settings, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    async fn client() -> (UdpSocket, Node) {
        let socket = UdpSocket::bind(Node::loopback(0).socket_addr())
            .await
            .expect("client bind");
        let local = Node::from(socket.local_addr().expect("client addr"));
        (socket, local)
    }

    async fn echo(client: &UdpSocket, server: Node, payload: &[u8]) -> Vec<u8> {
        client
            .send_to(payload, server.socket_addr())
            .await
            .expect("send");
        let mut buffer = [0u8; 64];
        let (len, from) = tokio::time::timeout(WAIT, client.recv_from(&mut buffer))
            .await
            .expect("echo in time")
            .expect("recv");
        assert_eq!(Node::from(from), server);
        buffer[..len].to_vec()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_datagram_registers_the_peer_once() {
        let (settings, mut events) = settings(true);
        let reactor = UdpServerFactory::new(settings).new_reactor();
        let server = reactor.start().await.expect("start");
        let (client, peer) = client().await;

        assert_eq!(echo(&client, server, b"one").await, b"one");
        assert_eq!(next(&mut events).await, Event::Connected(peer));
        assert_eq!(next(&mut events).await, Event::Received(b"one".to_vec()));

        assert_eq!(echo(&client, server, b"two").await, b"two");
        assert_eq!(next(&mut events).await, Event::Received(b"two".to_vec()));

        reactor.stop().await;
        assert_eq!(
            next(&mut events).await,
            Event::Disconnected(peer, DisconnectReason::ReactorStopped)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_close_forgets_the_peer() {
        let (settings, mut events) = settings(false);
        let reactor = UdpServerFactory::new(settings).new_reactor();
        let server = reactor.start().await.expect("start");
        let (client, peer) = client().await;

        client
            .send_to(b"bye", server.socket_addr())
            .await
            .expect("send");
        assert_eq!(next(&mut events).await, Event::Connected(peer));
        assert_eq!(next(&mut events).await, Event::Received(b"bye".to_vec()));
        assert_eq!(
            next(&mut events).await,
            Event::Disconnected(peer, DisconnectReason::LocalClosed)
        );

        assert_eq!(echo(&client, server, b"again").await, b"again");
        assert_eq!(next(&mut events).await, Event::Connected(peer));
        assert_eq!(next(&mut events).await, Event::Received(b"again".to_vec()));

        reactor.stop().await;
        assert_eq!(
            events.try_recv().expect("stop fired disconnect inline"),
            Event::Disconnected(peer, DisconnectReason::ReactorStopped)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reactors_from_one_factory_are_independent() {
        let (settings, _events) = settings(false);
        let factory = UdpServerFactory::new(settings);
        let first = factory.new_reactor();
        let second = factory.new_reactor();

        let a = first.start().await.expect("first");
        let b = second.start().await.expect("second");
        assert_ne!(a, b);

        first.stop().await;
        assert!(!first.is_active());
        assert!(second.is_active());

        let (client, _) = client().await;
        assert_eq!(echo(&client, b, b"still up").await, b"still up");
        second.stop().await;
    }

    #[tokio::test]
    async fn receive_errors_back_off_until_stopped() {
        let (stop, mut signal) = watch::channel(false);

        let started = Instant::now();
        assert!(back_off(&mut signal).await);
        assert!(started.elapsed() >= RECV_BACKOFF);

        stop.send(true).expect("receiver alive");
        let started = Instant::now();
        assert!(!back_off(&mut signal).await);
        assert!(started.elapsed() < RECV_BACKOFF);
    }

    thread_local! {
        static EXIT_GUARD: std::cell::RefCell<Option<ExitGuard>> =
            const { std::cell::RefCell::new(None) };
    }

    /// 线程退出时析构，借此观察工作线程是否真正结束。
    struct ExitGuard(std::sync::mpsc::Sender<String>);

    impl Drop for ExitGuard {
        fn drop(&mut self) {
            let name = std::thread::current().name().unwrap_or_default().to_owned();
            let _ = self.0.send(name);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_shuts_down_the_derived_event_loop() {
        let (exited, exits) = std::sync::mpsc::channel();
        let (tx, mut workers) = mpsc::unbounded_channel();
        let mut callbacks = Callbacks::default();
        callbacks.set_on_receive(Arc::new(move |conn: &Connection, data: Bytes| {
            let name = std::thread::current().name().unwrap_or_default().to_owned();
            EXIT_GUARD.with(|guard| *guard.borrow_mut() = Some(ExitGuard(exited.clone())));
            let _ = tx.send(name);
            let _ = conn.send(data);
        }));
        let settings = ServerSettings::new(
            Node::loopback(0),
            NonZeroUsize::new(1).expect("non-zero"),
            spark_core::DEFAULT_BUFFER_SIZE,
        )
        .with_proxies(true)
        .with_callbacks(callbacks);
        let reactor = UdpServerFactory::new(settings).new_reactor();
        let server = reactor.start().await.expect("start");

        let (client, _) = client().await;
        assert_eq!(echo(&client, server, b"hello").await, b"hello");
        let worker = tokio::time::timeout(WAIT, workers.recv())
            .await
            .expect("receive in time")
            .expect("channel open");
        assert!(worker.starts_with("spark-worker-"), "ran on {worker}");

        reactor.stop().await;
        let exited = tokio::task::spawn_blocking(move || exits.recv_timeout(WAIT))
            .await
            .expect("join")
            .expect("worker thread exited");
        assert_eq!(exited, worker);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_start_is_rejected() {
        let (settings, _events) = settings(false);
        let reactor = UdpReactor::new(Node::loopback(0), settings);
        reactor.start().await.expect("first start");

        let err = reactor.start().await.expect_err("already running");
        assert_eq!(err.code(), "spark.transport.udp.already_started");
        reactor.stop().await;
        assert_eq!(reactor.local_address(), None);
    }

    #[test]
    fn start_outside_a_runtime_is_rejected() {
        let (settings, _events) = settings(false);
        let reactor = UdpReactor::new(Node::loopback(0), settings);
        let err = futures::executor::block_on(reactor.start()).expect_err("no runtime");
        assert_eq!(err.code(), "spark.transport.udp.runtime_unavailable");
    }
}
