// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::dendrite::{Reactant, ReactionId, ValueDendrite};
use crate::error::PlexusError;
use crate::ganglion::{GanglionFilters, GanglionId, InternalGanglion};
use crate::neuron::Neuron;
use crate::synapse::Synapse;

/// The in-process synapse: transmit and transduce are the same operation,
/// since there is no transport between the two.
pub struct InprocSynapse<T> {
    neuron: Neuron<T>,
    dendrite: ValueDendrite<T>,
}

impl<T: Clone + Send + Sync + 'static> InprocSynapse<T> {
    pub fn new(neuron: Neuron<T>) -> Self {
        Self {
            neuron,
            dendrite: ValueDendrite::new(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Synapse<T> for InprocSynapse<T> {
    fn neuron(&self) -> &Neuron<T> {
        &self.neuron
    }

    async fn add_reactants(&self, reactants: Vec<Reactant<T>>) {
        self.dendrite.add_reactants(reactants).await;
    }

    async fn transmit(&self, value: T, reaction_id: ReactionId) -> Result<(), PlexusError> {
        self.dendrite.transduce(value, self.neuron.clone(), reaction_id).await;
        Ok(())
    }

    async fn transduce(&self, value: T, reaction_id: ReactionId) {
        self.dendrite.transduce(value, self.neuron.clone(), reaction_id).await;
    }

    async fn close(&self) -> Result<(), PlexusError> {
        Ok(())
    }
}

/// The always-present internal ganglion a plexus uses for in-process
/// fan-out. A plexus may hold only one of these, but nothing here
/// prevents constructing more than one for isolated local sub-graphs.
pub struct InprocGanglion {
    id: GanglionId,
    filters: GanglionFilters,
    synapses: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl InprocGanglion {
    pub fn new(filters: GanglionFilters) -> Self {
        Self {
            id: GanglionId::fresh(),
            filters,
            synapses: RwLock::new(HashMap::new()),
        }
    }

    pub fn capable<T>(&self, neuron: &Neuron<T>) -> bool {
        self.filters.capable(neuron)
    }

    async fn get_or_create_synapse<T: Clone + Send + Sync + 'static>(
        &self,
        neuron: &Neuron<T>,
    ) -> Arc<InprocSynapse<T>> {
        if let Some(existing) = self.synapses.read().await.get(neuron.name()) {
            if let Some(synapse) = existing.clone().downcast::<InprocSynapse<T>>().ok() {
                return synapse;
            }
        }

        let mut guard = self.synapses.write().await;
        if let Some(existing) = guard.get(neuron.name()) {
            if let Some(synapse) = existing.clone().downcast::<InprocSynapse<T>>().ok() {
                return synapse;
            }
        }
        let synapse = Arc::new(InprocSynapse::new(neuron.clone()));
        guard.insert(neuron.name().to_string(), synapse.clone());
        synapse
    }

    /// Register reactants for `neuron`, creating its synapse if this is
    /// the first registration for that channel name.
    pub async fn adapt<T: Clone + Send + Sync + 'static>(
        &self,
        neuron: Neuron<T>,
        reactants: Vec<Reactant<T>>,
    ) -> Result<(), PlexusError> {
        if !self.capable(&neuron) {
            warn!("inproc ganglion not capable of neuron {}", neuron.name());
            return Ok(());
        }
        let synapse = self.get_or_create_synapse(&neuron).await;
        synapse.add_reactants(reactants).await;
        Ok(())
    }

    pub async fn transmit<T: Clone + Send + Sync + 'static>(
        &self,
        neuron: &Neuron<T>,
        value: T,
        reaction_id: ReactionId,
    ) -> Result<(), PlexusError> {
        let synapse = self
            .synapses
            .read()
            .await
            .get(neuron.name())
            .cloned()
            .and_then(|s| s.downcast::<InprocSynapse<T>>().ok())
            .ok_or_else(|| PlexusError::TransmitterNotFound(neuron.name().to_string()))?;
        synapse.transmit(value, reaction_id).await
    }
}

#[async_trait]
impl InternalGanglion for InprocGanglion {
    fn id(&self) -> GanglionId {
        self.id
    }

    async fn close(&self) -> Result<(), PlexusError> {
        self.synapses.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{JsonCodec, Namespace};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample(u32);

    fn sample_neuron() -> Neuron<Sample> {
        Neuron::new(Namespace::new(["t"]), Arc::new(JsonCodec::new("json")), "Sample")
    }

    #[tokio::test]
    async fn adapt_then_transmit_reaches_every_reactant() {
        let ganglion = InprocGanglion::new(GanglionFilters::default());
        let neuron = sample_neuron();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            ganglion
                .adapt(
                    neuron.clone(),
                    vec![Arc::new(move |_v, _n, _r| {
                        let calls = Arc::clone(&calls);
                        Box::pin(async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                        })
                    })],
                )
                .await
                .unwrap();
        }

        ganglion.transmit(&neuron, Sample(1), 0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transmit_without_adapt_fails() {
        let ganglion = InprocGanglion::new(GanglionFilters::default());
        let neuron = sample_neuron();
        assert!(ganglion.transmit(&neuron, Sample(1), 0).await.is_err());
    }
}
