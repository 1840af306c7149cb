use std::io::Result;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;

/// Splits a bound listener's local address into host and port, e.g. to build
/// the address a client dials.
pub fn tcp_listener_to_host_port(listener: &TcpListener) -> Result<(IpAddr, u16)> {
    let local: SocketAddr = listener.local_addr()?;

    Ok((local.ip(), local.port()))
}
