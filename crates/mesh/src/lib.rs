// SPDX-License-Identifier: PolyForm-Shield-1.0

//! Peer-to-peer multicast transport: heartbeat-based peer discovery and a
//! Paxos-style address allocator layered on top of it, wired in as an
//! [`plexus::ExternalGanglion`].

pub mod ganglion;
pub mod ip_lease;
pub mod synapse;
pub mod transport;

pub use ganglion::{MulticastGanglion, MulticastGanglionConfig};
pub use ip_lease::IpLeaseManager;
pub use synapse::MulticastSynapse;
pub use transport::{frame, unframe, MulticastTransport, UdpMulticastTransport};
