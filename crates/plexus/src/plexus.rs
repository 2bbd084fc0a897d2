// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::dendrite::{BoxFuture, Reactant, ReactionId};
use crate::dendrite::ReactionIdGenerator;
use crate::error::PlexusError;
use crate::ganglion::{ExternalGanglion, GanglionId, InternalGanglion};
use crate::inproc::InprocGanglion;
use crate::neuron::Neuron;

/// Replays a single adapted neuron's external wiring against one ganglion.
/// Captures the neuron itself, type-erased, so the registry that holds
/// these can stay non-generic.
type WireFn = Arc<dyn Fn(Arc<Plexus>, Arc<dyn ExternalGanglion>) -> BoxFuture<'static, Result<(), PlexusError>> + Send + Sync>;

struct AdaptedNeuron {
    wire: WireFn,
}

/// Composes an always-present inproc ganglion with any number of
/// additional external ganglia, routing events between them so each
/// attached transport sees a given emission exactly once.
///
/// Infusing a ganglion after neurons have already been adapted rewires
/// those existing neurons onto it too: every adapted neuron is kept in a
/// small registry purely so `infuse_external` can replay its wiring
/// against a newly infused ganglion, mirroring what `adapt` itself does
/// against the ganglia already present.
pub struct Plexus {
    inproc: Arc<InprocGanglion>,
    external: RwLock<Vec<Arc<dyn ExternalGanglion>>>,
    adapted: RwLock<Vec<AdaptedNeuron>>,
    reaction_ids: ReactionIdGenerator,
    reactions: RwLock<HashMap<ReactionId, HashSet<GanglionId>>>,
}

impl Plexus {
    pub fn new(inproc: Arc<InprocGanglion>) -> Arc<Self> {
        Arc::new(Self {
            inproc,
            external: RwLock::new(Vec::new()),
            adapted: RwLock::new(Vec::new()),
            reaction_ids: ReactionIdGenerator::default(),
            reactions: RwLock::new(HashMap::new()),
        })
    }

    pub fn inproc(&self) -> &Arc<InprocGanglion> {
        &self.inproc
    }

    /// Attach an external ganglion, then wire it to every neuron that has
    /// already been `adapt`ed so far (subject to that neuron's usual
    /// `capable_name` filtering on the newly infused ganglion).
    pub async fn infuse_external(self: &Arc<Self>, ganglion: Arc<dyn ExternalGanglion>) -> Result<(), PlexusError> {
        self.external.write().await.push(Arc::clone(&ganglion));

        let wires: Vec<WireFn> = self.adapted.read().await.iter().map(|a| Arc::clone(&a.wire)).collect();
        for wire in wires {
            wire(Arc::clone(self), Arc::clone(&ganglion)).await?;
        }
        Ok(())
    }

    /// Register a neuron's decoded-value handlers on the inproc ganglion,
    /// wire every currently infused, capable external ganglion to forward
    /// inbound bytes for this channel back through the plexus, and record
    /// the neuron so a ganglion infused later gets the same wiring.
    pub async fn adapt<T>(self: &Arc<Self>, neuron: Neuron<T>, reactants: Vec<Reactant<T>>) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.inproc.adapt(neuron.clone(), reactants).await?;

        for ext in self.external.read().await.iter() {
            self.wire_external_ganglion(&neuron, Arc::clone(ext)).await?;
        }

        let neuron_for_registry = neuron.clone();
        let wire: WireFn = Arc::new(move |plexus: Arc<Plexus>, ext: Arc<dyn ExternalGanglion>| {
            let neuron = neuron_for_registry.clone();
            let fut: BoxFuture<'static, Result<(), PlexusError>> =
                Box::pin(async move { plexus.wire_external_ganglion(&neuron, ext).await });
            fut
        });
        self.adapted.write().await.push(AdaptedNeuron { wire });

        Ok(())
    }

    /// Forward inbound bytes for `neuron`'s channel from `ext` back
    /// through the plexus, if `ext` is capable of carrying it. Shared by
    /// `adapt` (wiring ganglia already infused) and the registry replayed
    /// by `infuse_external` (wiring a ganglion infused afterward).
    async fn wire_external_ganglion<T>(
        self: &Arc<Self>,
        neuron: &Neuron<T>,
        ext: Arc<dyn ExternalGanglion>,
    ) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !ext.capable_name(neuron.name(), neuron.codec_name()) {
            return Ok(());
        }
        let plexus = Arc::clone(self);
        let origin_id = ext.id();
        let neuron_for_closure = neuron.clone();
        let raw = Arc::new(move |bytes: Vec<u8>, _incoming_reaction_id: ReactionId| {
            let plexus = Arc::clone(&plexus);
            let neuron = neuron_for_closure.clone();
            let fut: BoxFuture<'static, ()> = Box::pin(async move {
                if let Err(err) = plexus.deliver_from_external(origin_id, &neuron, bytes).await {
                    warn!("dropping inbound message for {}: {err}", neuron.name());
                }
            });
            fut
        });
        ext.adapt_raw(neuron.name().to_string(), raw).await
    }

    /// Local-origin emission: deliver to inproc's own reactants, then
    /// forward the freshly encoded payload to every infused external
    /// ganglion. This is `internal_reaction` from the routing rules.
    pub async fn transmit<T>(self: &Arc<Self>, neuron: &Neuron<T>, value: T) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let reaction_id = self.reaction_ids.next();
        let mut visited = HashSet::new();
        visited.insert(self.inproc.id());
        self.reactions.write().await.insert(reaction_id, visited);

        self.inproc.transmit(neuron, value.clone(), reaction_id).await?;

        let bytes = neuron.encode(&value)?;
        self.forward_encoded_to_external(neuron.name(), &bytes, reaction_id, None)
            .await;

        self.reactions.write().await.remove(&reaction_id);
        Ok(())
    }

    /// External-origin delivery: called by an external ganglion's raw
    /// reactant (installed by `adapt`) whenever bytes arrive for a
    /// channel name this plexus cares about. Delivers the decoded value
    /// to inproc's reactants (`external_internal_reaction`) and forwards
    /// the untouched bytes to every other external ganglion
    /// (`external_external_reaction`).
    async fn deliver_from_external<T>(
        self: &Arc<Self>,
        origin: GanglionId,
        neuron: &Neuron<T>,
        bytes: Vec<u8>,
    ) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let reaction_id = self.reaction_ids.next();
        let mut visited = HashSet::new();
        visited.insert(origin);
        self.reactions.write().await.insert(reaction_id, visited);

        let value = neuron.decode(&bytes)?;
        self.inproc.transmit(neuron, value, reaction_id).await?;

        self.forward_encoded_to_external(neuron.name(), &bytes, reaction_id, Some(origin))
            .await;

        self.reactions.write().await.remove(&reaction_id);
        Ok(())
    }

    async fn forward_encoded_to_external(
        &self,
        channel_name: &str,
        bytes: &[u8],
        reaction_id: ReactionId,
        skip: Option<GanglionId>,
    ) {
        let targets = self.external.read().await;
        let mut visited = self.reactions.write().await;
        let visited_set = visited.entry(reaction_id).or_default();

        for ext in targets.iter() {
            if Some(ext.id()) == skip || visited_set.contains(&ext.id()) {
                continue;
            }
            visited_set.insert(ext.id());
            if let Err(err) = ext.transmit_encoded(channel_name, bytes.to_vec(), reaction_id).await {
                warn!("failed to forward {channel_name} to an external ganglion: {err}");
            }
        }
    }

    pub async fn close_all(&self) -> Result<(), PlexusError> {
        self.inproc.close().await?;
        for g in self.external.read().await.iter() {
            g.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ganglion::GanglionFilters;
    use async_trait::async_trait;
    use protocol::{JsonCodec, Namespace};
    use serde::{Deserialize, Serialize};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample(u32);

    struct RecordingExternalGanglion {
        id: GanglionId,
        sent: Mutex<Vec<Vec<u8>>>,
        raw_reactants: Mutex<Vec<(String, crate::dendrite::RawReactant)>>,
    }

    impl RecordingExternalGanglion {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: GanglionId::fresh(),
                sent: Mutex::new(Vec::new()),
                raw_reactants: Mutex::new(Vec::new()),
            })
        }

        /// Simulate bytes arriving on this ganglion for `channel_name`,
        /// as if a peer had just sent them.
        async fn deliver_inbound(&self, channel_name: &str, bytes: Vec<u8>) {
            let reactants = self.raw_reactants.lock().await;
            for (name, reactant) in reactants.iter() {
                if name == channel_name {
                    reactant(bytes.clone(), 0).await;
                }
            }
        }
    }

    #[async_trait]
    impl ExternalGanglion for RecordingExternalGanglion {
        fn id(&self) -> GanglionId {
            self.id
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn capable_name(&self, _channel_name: &str, _codec_name: &str) -> bool {
            true
        }

        async fn transmit_encoded(
            &self,
            _channel_name: &str,
            bytes: Vec<u8>,
            _reaction_id: ReactionId,
        ) -> Result<(), PlexusError> {
            self.sent.lock().await.push(bytes);
            Ok(())
        }

        async fn adapt_raw(&self, channel_name: String, reactant: crate::dendrite::RawReactant) -> Result<(), PlexusError> {
            self.raw_reactants.lock().await.push((channel_name, reactant));
            Ok(())
        }

        async fn close(&self) -> Result<(), PlexusError> {
            Ok(())
        }
    }

    fn sample_neuron() -> Neuron<Sample> {
        Neuron::new(Namespace::new(["t"]), Arc::new(JsonCodec::new("json")), "Sample")
    }

    #[tokio::test]
    async fn local_emit_reaches_inproc_and_forwards_once_to_external() {
        let plexus = Plexus::new(Arc::new(InprocGanglion::new(GanglionFilters::default())));
        let external = RecordingExternalGanglion::new();
        plexus.infuse_external(external.clone()).await.unwrap();

        let neuron = sample_neuron();
        let local_calls = Arc::new(AtomicUsize::new(0));
        {
            let local_calls = Arc::clone(&local_calls);
            plexus
                .adapt(
                    neuron.clone(),
                    vec![Arc::new(move |_v, _n, _r| {
                        let local_calls = Arc::clone(&local_calls);
                        Box::pin(async move {
                            local_calls.fetch_add(1, Ordering::SeqCst);
                        })
                    })],
                )
                .await
                .unwrap();
        }

        plexus.transmit(&neuron, Sample(7)).await.unwrap();

        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(external.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn infusing_a_ganglion_after_adapt_still_wires_existing_neurons() {
        let plexus = Plexus::new(Arc::new(InprocGanglion::new(GanglionFilters::default())));
        let neuron = sample_neuron();

        let local_calls = Arc::new(AtomicUsize::new(0));
        {
            let local_calls = Arc::clone(&local_calls);
            // Adapt before any external ganglion exists.
            plexus
                .adapt(
                    neuron.clone(),
                    vec![Arc::new(move |_v, _n, _r| {
                        let local_calls = Arc::clone(&local_calls);
                        Box::pin(async move {
                            local_calls.fetch_add(1, Ordering::SeqCst);
                        })
                    })],
                )
                .await
                .unwrap();
        }

        let external = RecordingExternalGanglion::new();
        plexus.infuse_external(external.clone()).await.unwrap();

        // If infusing had not retroactively wired the already-adapted
        // neuron, this ganglion would hold no raw reactant for "t.Sample"
        // and the inbound delivery below would be silently dropped.
        let bytes = neuron.encode(&Sample(3)).unwrap();
        external.deliver_inbound(neuron.name(), bytes).await;

        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
    }
}
