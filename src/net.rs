//! Multicast socket construction.
//!
//! Receive sockets bind the wildcard address on the configured port and join
//! the group on one interface; send sockets route through that interface
//! with loopback enabled so same-host consumers see the traffic.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};

/// Receive buffer sized for bursty open/close periods.
const RECV_BUFFER_BYTES: usize = 4 << 20;

/// Poll interval for shutdown checks in blocking receive loops.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Builds the ingest socket: bound to `0.0.0.0:port`, joined to `group` on
/// `iface`, with a read timeout so callers can poll a shutdown flag.
pub fn recv_socket(group: Ipv4Addr, iface: Ipv4Addr, port: u16) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket")?;
    socket.set_reuse_address(true).ok();

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    socket.bind(&bind_addr.into()).context("bind")?;

    let _ = socket.set_recv_buffer_size(RECV_BUFFER_BYTES);

    socket
        .join_multicast_v4(&group, &iface)
        .context("join_multicast_v4")?;

    let socket: UdpSocket = socket.into();
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .context("set_read_timeout")?;
    Ok(socket)
}

/// Builds a sender for the CLI and the generator.
pub fn send_socket(iface: Ipv4Addr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket")?;
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket.bind(&bind_addr.into()).context("bind")?;
    socket
        .set_multicast_if_v4(&iface)
        .context("set_multicast_if_v4")?;
    socket
        .set_multicast_loop_v4(true)
        .context("set_multicast_loop_v4")?;
    Ok(socket.into())
}
