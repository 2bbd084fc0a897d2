// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dendrite::{Reactant, ReactionId};
use crate::error::PlexusError;
use crate::neuron::Neuron;

/// How long [`close`] waits for in-flight tasks before giving up and
/// dropping them anyway.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// A transport endpoint for one channel: owns a dendrite, accepts
/// reactants, and moves values or bytes across one transport in either
/// direction.
#[async_trait]
pub trait Synapse<T: Send + Sync + 'static>: Send + Sync {
    fn neuron(&self) -> &Neuron<T>;
    async fn add_reactants(&self, reactants: Vec<Reactant<T>>);
    /// Outbound: hand a value to the transport.
    async fn transmit(&self, value: T, reaction_id: ReactionId) -> Result<(), PlexusError>;
    /// Inbound: deliver a value that arrived on the transport to this
    /// synapse's own dendrite.
    async fn transduce(&self, value: T, reaction_id: ReactionId);
    async fn close(&self) -> Result<(), PlexusError>;
}

/// Await a set of spawned tasks, bounded by [`CLOSE_TIMEOUT`], logging and
/// moving on rather than hanging `close()` forever on a stuck task. Shared
/// with `mesh`'s ganglion, whose background loops shut down the same way.
pub async fn close_tasks(label: &str, handles: Vec<JoinHandle<()>>) {
    let joined = futures::future::join_all(handles.into_iter().map(|h| async move {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, h).await;
    }));
    joined.await;
    debug!("{label}: close() completed (tasks cancelled or finished)");
}
