//! 连接生命周期回调及其派发。

use core::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::connection::{Connection, DisconnectReason};
use crate::event_loop::ThreadedEventLoop;

/// 连接建立回调。
pub type ConnectionEstablishedCallback = Arc<dyn Fn(&Connection) + Send + Sync>;

/// 连接终止回调。
pub type ConnectionTerminatedCallback = Arc<dyn Fn(&Connection, &DisconnectReason) + Send + Sync>;

/// 数据到达回调。
pub type ReceivedDataCallback = Arc<dyn Fn(&Connection, Bytes) + Send + Sync>;

/// 三个回调槽位。克隆时共享回调本体（`Arc`），不复制闭包。
#[derive(Clone, Default)]
pub struct Callbacks {
    on_connect: Option<ConnectionEstablishedCallback>,
    on_disconnect: Option<ConnectionTerminatedCallback>,
    on_receive: Option<ReceivedDataCallback>,
}

impl Callbacks {
    pub fn set_on_connect(&mut self, callback: ConnectionEstablishedCallback) {
        self.on_connect = Some(callback);
    }

    pub fn set_on_disconnect(&mut self, callback: ConnectionTerminatedCallback) {
        self.on_disconnect = Some(callback);
    }

    pub fn set_on_receive(&mut self, callback: ReceivedDataCallback) {
        self.on_receive = Some(callback);
    }

    pub fn on_connect(&self) -> Option<&ConnectionEstablishedCallback> {
        self.on_connect.as_ref()
    }

    pub fn on_disconnect(&self) -> Option<&ConnectionTerminatedCallback> {
        self.on_disconnect.as_ref()
    }

    pub fn on_receive(&self) -> Option<&ReceivedDataCallback> {
        self.on_receive.as_ref()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

/// `CallbackDispatcher` 决定回调在哪个线程上运行。
///
/// # 教案式说明
/// - **意图 (Why)**：`workers_are_proxies` 为真时，I/O 任务只负责感知事件，回调经由事件循环交给工作线程；
///   为假时回调直接在 I/O 任务上执行，省去一次线程切换，但慢回调会拖住该连接的读循环；
/// - **执行逻辑 (How)**：代理模式下以连接 ID 作为键调用 [`ThreadedEventLoop::execute_keyed`]，
///   同一连接的 connect → receive → disconnect 因此保持顺序；
/// - **契约 (What)**：未注册的回调直接跳过，不会占用事件循环；事件循环已关闭时记录告警并丢弃该事件。
#[derive(Clone, Debug)]
pub struct CallbackDispatcher {
    callbacks: Callbacks,
    event_loop: Option<Arc<ThreadedEventLoop>>,
}

impl CallbackDispatcher {
    /// `event_loop` 为 `None` 时回调在调用线程上内联执行。
    pub fn new(callbacks: Callbacks, event_loop: Option<Arc<ThreadedEventLoop>>) -> Self {
        Self {
            callbacks,
            event_loop,
        }
    }

    pub fn event_loop(&self) -> Option<&Arc<ThreadedEventLoop>> {
        self.event_loop.as_ref()
    }

    pub fn connected(&self, connection: &Connection) {
        if let Some(callback) = self.callbacks.on_connect.clone() {
            let connection = connection.clone();
            self.dispatch(connection.id(), move || callback(&connection));
        }
    }

    pub fn disconnected(&self, connection: &Connection, reason: DisconnectReason) {
        if let Some(callback) = self.callbacks.on_disconnect.clone() {
            let connection = connection.clone();
            self.dispatch(connection.id(), move || callback(&connection, &reason));
        }
    }

    pub fn received(&self, connection: &Connection, data: Bytes) {
        if let Some(callback) = self.callbacks.on_receive.clone() {
            let connection = connection.clone();
            self.dispatch(connection.id(), move || callback(&connection, data));
        }
    }

    fn dispatch<F>(&self, connection: u64, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.event_loop {
            Some(event_loop) => {
                if let Err(error) = event_loop.execute_keyed(connection, task) {
                    warn!(
                        connection,
                        %error,
                        "dropping connection event, event loop unavailable"
                    );
                }
            }
            None => task(),
        }
    }
}
