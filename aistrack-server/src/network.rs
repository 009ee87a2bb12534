use socket2::{Domain, Protocol, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

// this will be common for all our sockets
pub fn new_socket() -> io::Result<socket2::Socket> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_nonblocking(true)?;
    // A restarted listener must not fail on "address in use"
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    Ok(socket)
}

/// Bind a UDP listener on all interfaces at `port`.
///
/// Must be called from within a tokio runtime.
pub fn create_udp_listen(port: u16) -> io::Result<UdpSocket> {
    create_udp_listen_on(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

pub fn create_udp_listen_on(ip: IpAddr, port: u16) -> io::Result<UdpSocket> {
    let socket = new_socket()?;

    let socketaddr = SocketAddr::new(ip, port);
    socket.bind(&socket2::SockAddr::from(socketaddr))?;
    log::trace!("Binding socket to {}", socketaddr);

    UdpSocket::from_std(socket.into())
}
