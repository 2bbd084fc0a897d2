// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use plexus::PlexusError;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;

/// Minimal send/receive surface the multicast ganglion needs from a
/// socket. Exists so tests can swap in an in-memory transport instead of
/// binding real multicast sockets.
#[async_trait]
pub trait MulticastTransport: Send + Sync {
    async fn send(&self, payload: &[u8]) -> Result<(), PlexusError>;
    async fn recv(&self) -> Result<Vec<u8>, PlexusError>;
}

/// A bound UDP multicast socket joined to one group/port pair.
pub struct UdpMulticastTransport {
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
}

impl UdpMulticastTransport {
    /// Every channel's synapse, and all six control channels, share the
    /// same port across different group addresses, so the socket is
    /// built with `socket2` to set `SO_REUSEADDR` (and `SO_REUSEPORT` on
    /// unix) before binding — a plain `UdpSocket::bind` would fail with
    /// "address already in use" on the second and subsequent sockets.
    pub async fn bind(bind_interface: Ipv4Addr, group: Ipv4Addr, port: u16) -> Result<Self, PlexusError> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, None)
            .map_err(|e| PlexusError::Transport(format!("create socket: {e}")))?;
        raw.set_reuse_address(true)
            .map_err(|e| PlexusError::Transport(format!("set_reuse_address: {e}")))?;
        #[cfg(unix)]
        raw.set_reuse_port(true)
            .map_err(|e| PlexusError::Transport(format!("set_reuse_port: {e}")))?;
        raw.set_nonblocking(true)
            .map_err(|e| PlexusError::Transport(format!("set_nonblocking: {e}")))?;
        let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
        raw.bind(&bind_addr.into())
            .map_err(|e| PlexusError::Transport(format!("bind {port}: {e}")))?;

        let socket = UdpSocket::from_std(raw.into())
            .map_err(|e| PlexusError::Transport(format!("adopt socket for {port}: {e}")))?;
        socket
            .join_multicast_v4(group, bind_interface)
            .map_err(|e| PlexusError::Transport(format!("join {group}: {e}")))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| PlexusError::Transport(format!("set_multicast_loop_v4: {e}")))?;
        Ok(Self { socket, group, port })
    }
}

#[async_trait]
impl MulticastTransport for UdpMulticastTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), PlexusError> {
        self.socket
            .send_to(payload, (self.group, self.port))
            .await
            .map(|_| ())
            .map_err(|e| PlexusError::Transport(format!("send to {}: {e}", self.group)))
    }

    async fn recv(&self) -> Result<Vec<u8>, PlexusError> {
        let mut buf = vec![0u8; 65_536];
        let (n, _from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| PlexusError::Transport(format!("recv on {}: {e}", self.group)))?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Frame a channel name and payload into one datagram: a big-endian `u32`
/// length of the name, the name's UTF-8 bytes, then the payload — the
/// two pub-sub frames of a ZeroMQ-style transport collapsed into the
/// single message a UDP socket carries.
pub fn frame(channel_name: &str, payload: &[u8]) -> Vec<u8> {
    let name_bytes = channel_name.as_bytes();
    let mut out = Vec::with_capacity(4 + name_bytes.len() + payload.len());
    out.extend_from_slice(&(name_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(name_bytes);
    out.extend_from_slice(payload);
    out
}

/// Inverse of [`frame`].
pub fn unframe(datagram: &[u8]) -> Result<(String, Vec<u8>), PlexusError> {
    if datagram.len() < 4 {
        return Err(PlexusError::Transport("datagram shorter than length prefix".into()));
    }
    let name_len = u32::from_be_bytes(datagram[0..4].try_into().unwrap()) as usize;
    let rest = &datagram[4..];
    if rest.len() < name_len {
        return Err(PlexusError::Transport("datagram shorter than declared name length".into()));
    }
    let name = String::from_utf8(rest[..name_len].to_vec())
        .map_err(|e| PlexusError::Transport(format!("channel name is not utf-8: {e}")))?;
    Ok((name, rest[name_len..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let datagram = frame("orders.v2.Order.json", b"payload-bytes");
        let (name, payload) = unframe(&datagram).unwrap();
        assert_eq!(name, "orders.v2.Order.json");
        assert_eq!(payload, b"payload-bytes");
    }

    #[test]
    fn unframe_rejects_truncated_datagram() {
        assert!(unframe(&[0, 0, 0, 5]).is_err());
    }
}
