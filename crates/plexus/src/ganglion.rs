// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::dendrite::{RawReactant, ReactionId};
use crate::error::PlexusError;
use crate::neuron::Neuron;

/// Identifies one ganglion instance within a plexus, used as the element
/// type of the per-reaction "already visited" set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GanglionId(u64);

static NEXT_GANGLION_ID: AtomicU64 = AtomicU64::new(0);

impl GanglionId {
    pub fn fresh() -> Self {
        Self(NEXT_GANGLION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Capability filters a ganglion applies at `adapt` time. `None` for
/// `relevant_neurons`/`allowed_codecs` means "no restriction"; an empty
/// `ignored_neurons` means nothing is denied.
#[derive(Debug, Clone, Default)]
pub struct GanglionFilters {
    pub relevant_neurons: Option<HashSet<String>>,
    pub ignored_neurons: HashSet<String>,
    pub allowed_codecs: Option<HashSet<String>>,
}

impl GanglionFilters {
    pub fn capable<T>(&self, neuron: &Neuron<T>) -> bool {
        if self.ignored_neurons.contains(neuron.name()) {
            return false;
        }
        if let Some(relevant) = &self.relevant_neurons {
            if !relevant.contains(neuron.name()) {
                return false;
            }
        }
        if let Some(allowed) = &self.allowed_codecs {
            if !allowed.contains(neuron.codec_name()) {
                return false;
            }
        }
        true
    }
}

/// Lifecycle surface every internal ganglion exposes to the plexus. The
/// generic `adapt`/`transmit` operations live as inherent methods on the
/// concrete ganglion type instead of here, since a value's type is known
/// statically at every call site where the plexus wires a neuron in — a
/// dyn-compatible trait has no way to carry that generic parameter.
#[async_trait]
pub trait InternalGanglion: Send + Sync {
    fn id(&self) -> GanglionId;
    async fn close(&self) -> Result<(), PlexusError>;
}

/// Lifecycle and type-erased bytes-path surface every external ganglion
/// exposes to the plexus. Decoding never happens here: the plexus encodes
/// at the generic call site (where it still knows `T`) and hands already-
/// encoded bytes across this boundary.
#[async_trait]
pub trait ExternalGanglion: Send + Sync + Any {
    fn id(&self) -> GanglionId;
    fn as_any(&self) -> &dyn Any;

    /// True if this ganglion would accept a neuron with the given channel
    /// name and codec name, without needing the value type itself.
    fn capable_name(&self, channel_name: &str, codec_name: &str) -> bool;

    /// Forward an already-encoded payload to the synapse for
    /// `channel_name`, without decoding it. Used when the plexus forwards
    /// a value that originated on the inproc ganglion (encoded once at
    /// the wiring closure) or bytes that arrived from another external
    /// ganglion.
    async fn transmit_encoded(
        &self,
        channel_name: &str,
        bytes: Vec<u8>,
        reaction_id: ReactionId,
    ) -> Result<(), PlexusError>;

    /// Register a raw (undecoded) reactant for `channel_name`, used by the
    /// plexus to wire external-to-external forwarding.
    async fn adapt_raw(&self, channel_name: String, reactant: RawReactant) -> Result<(), PlexusError>;

    async fn close(&self) -> Result<(), PlexusError>;
}
