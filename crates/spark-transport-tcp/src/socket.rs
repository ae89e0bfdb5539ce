use std::io;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use spark_core::{Node, SocketOptions, Transport, TransportError};
use tokio::net::{TcpListener, TcpStream};

const LISTEN_BACKLOG: i32 = 1024;

/// 按选项创建并绑定监听套接字。
///
/// `reuse_address` 未显式设置时默认开启，重启后可以立即复用处于 `TIME_WAIT` 的端口。
/// 调用方需处于 Tokio 运行时上下文中。
pub(crate) fn bind_listener(
    address: Node,
    options: &SocketOptions,
) -> Result<TcpListener, TransportError> {
    let addr = address.socket_addr();
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(configure_error)?;
    socket
        .set_reuse_address(options.reuse_address().unwrap_or(true))
        .map_err(configure_error)?;
    if let Some(size) = options.send_buffer_size() {
        socket.set_send_buffer_size(size).map_err(configure_error)?;
    }
    socket.set_nonblocking(true).map_err(configure_error)?;

    let bind_error = |source| TransportError::Bind {
        transport: Transport::Tcp,
        addr: address,
        source,
    };
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;

    TcpListener::from_std(socket.into()).map_err(configure_error)
}

/// 在已接受的连接上应用逐连接选项。
pub(crate) fn configure_stream(stream: &TcpStream, options: &SocketOptions) -> io::Result<()> {
    if let Some(nodelay) = options.tcp_nodelay() {
        stream.set_nodelay(nodelay)?;
    }
    if let Some(ttl) = options.ttl() {
        stream.set_ttl(ttl)?;
    }
    if let Some(keep_alive) = options.keep_alive() {
        SockRef::from(stream).set_keepalive(keep_alive)?;
    }
    Ok(())
}

pub(crate) fn configure_error(source: io::Error) -> TransportError {
    TransportError::Configure {
        transport: Transport::Tcp,
        source,
    }
}
