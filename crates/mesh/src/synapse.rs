// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::net::Ipv4Addr;
use std::sync::Arc;

use plexus::{PlexusError, RawReactant, ReactionId};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::transport::{frame, MulticastTransport};

/// One channel's worth of multicast state: the address it is currently
/// bound to, the socket, and the reactants interested in inbound bytes.
///
/// Deliberately bytes-only: decoding needs the payload's Rust type, which
/// this struct's owner (`MulticastGanglion`) never has at the point it
/// creates a synapse generically by channel name alone. Callers that want
/// decoded values wrap their typed reactant in a closure that decodes and
/// then calls through — see `MulticastGanglion::adapt`.
pub struct MulticastSynapse {
    channel_name: String,
    address: RwLock<Ipv4Addr>,
    transport: RwLock<Arc<dyn MulticastTransport>>,
    raw_reactants: RwLock<Vec<RawReactant>>,
    recv_task: RwLock<Option<JoinHandle<()>>>,
}

impl MulticastSynapse {
    pub fn new(channel_name: String, address: Ipv4Addr, transport: Arc<dyn MulticastTransport>) -> Self {
        Self {
            channel_name,
            address: RwLock::new(address),
            transport: RwLock::new(transport),
            raw_reactants: RwLock::new(Vec::new()),
            recv_task: RwLock::new(None),
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub async fn address(&self) -> Ipv4Addr {
        *self.address.read().await
    }

    pub async fn add_raw_reactant(&self, reactant: RawReactant) {
        self.raw_reactants.write().await.push(reactant);
    }

    pub async fn transmit_encoded(&self, bytes: Vec<u8>, _reaction_id: ReactionId) -> Result<(), PlexusError> {
        let datagram = frame(&self.channel_name, &bytes);
        self.transport.read().await.send(&datagram).await
    }

    /// Fan inbound bytes that have already had their channel-name prefix
    /// stripped out to every registered reactant, concurrently.
    pub async fn transduce(&self, bytes: Vec<u8>, reaction_id: ReactionId) {
        let reactants = self.raw_reactants.read().await.clone();
        let calls = reactants.iter().map(|r| r(bytes.clone(), reaction_id));
        futures::future::join_all(calls).await;
    }

    /// Re-bind to a new address after consensus updates it, releasing
    /// whatever receive loop was watching the old one.
    pub async fn rebind(&self, new_address: Ipv4Addr, transport: Arc<dyn MulticastTransport>) {
        *self.address.write().await = new_address;
        *self.transport.write().await = transport;
        if let Some(task) = self.recv_task.write().await.take() {
            task.abort();
        }
    }

    pub async fn set_recv_task(&self, task: JoinHandle<()>) {
        let mut guard = self.recv_task.write().await;
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    pub async fn close(&self) {
        if let Some(task) = self.recv_task.write().await.take() {
            task.abort();
            if tokio::time::timeout(plexus::synapse::CLOSE_TIMEOUT, task_quiet(task)).await.is_err() {
                warn!("recv task for {} did not stop within the close timeout", self.channel_name);
            }
        }
    }
}

async fn task_quiet(handle: JoinHandle<()>) {
    let _ = handle.await;
}
