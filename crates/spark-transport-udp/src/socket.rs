use std::io;

use socket2::{Domain, Protocol, Socket, Type};
use spark_core::{Node, SocketOptions, Transport, TransportError};
use tokio::net::UdpSocket;

/// 按选项创建并绑定 UDP 套接字，`reuse_address` 未设置时默认开启。
pub(crate) fn bind_socket(
    address: Node,
    options: &SocketOptions,
) -> Result<UdpSocket, TransportError> {
    let addr = address.socket_addr();
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(configure_error)?;
    socket
        .set_reuse_address(options.reuse_address().unwrap_or(true))
        .map_err(configure_error)?;
    if let Some(size) = options.send_buffer_size() {
        socket.set_send_buffer_size(size).map_err(configure_error)?;
    }
    socket.set_nonblocking(true).map_err(configure_error)?;
    socket
        .bind(&addr.into())
        .map_err(|source| TransportError::Bind {
            transport: Transport::Udp,
            addr: address,
            source,
        })?;

    let socket = UdpSocket::from_std(socket.into()).map_err(configure_error)?;
    if let Some(broadcast) = options.broadcast() {
        socket.set_broadcast(broadcast).map_err(configure_error)?;
    }
    if let Some(ttl) = options.ttl() {
        socket.set_ttl(ttl).map_err(configure_error)?;
    }
    Ok(socket)
}

pub(crate) fn configure_error(source: io::Error) -> TransportError {
    TransportError::Configure {
        transport: Transport::Udp,
        source,
    }
}
