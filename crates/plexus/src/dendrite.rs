// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::neuron::Neuron;

pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Identifies one originating emission as it is forwarded across ganglia,
/// so the plexus can recognise "already seen this" and suppress loops.
/// Only ever meaningful within the process that minted it; it is never
/// placed on the wire.
pub type ReactionId = u64;

#[derive(Default)]
pub(crate) struct ReactionIdGenerator(AtomicU64);

impl ReactionIdGenerator {
    pub(crate) fn next(&self) -> ReactionId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A handler invoked with a decoded value.
pub type Reactant<T> = Arc<dyn Fn(T, Neuron<T>, ReactionId) -> BoxFuture<'static, ()> + Send + Sync>;

/// A handler invoked with the still-encoded bytes of a value, bypassing
/// decode. Used by ganglion-to-ganglion forwarding so a payload already
/// encoded by one external ganglion is never decoded and re-encoded on
/// its way to another.
pub type RawReactant = Arc<dyn Fn(Vec<u8>, ReactionId) -> BoxFuture<'static, ()> + Send + Sync>;

fn dedup_push<F>(existing: &mut Vec<Arc<F>>, incoming: Vec<Arc<F>>)
where
    F: ?Sized,
{
    for candidate in incoming {
        if !existing.iter().any(|r| Arc::ptr_eq(r, &candidate)) {
            existing.push(candidate);
        }
    }
}

fn remove_matching<F>(existing: &mut Vec<Arc<F>>, to_remove: &[Arc<F>])
where
    F: ?Sized,
{
    existing.retain(|r| !to_remove.iter().any(|victim| Arc::ptr_eq(r, victim)));
}

/// Fan-out engine for a synapse whose transport always carries decoded
/// values (the inproc case).
pub struct ValueDendrite<T> {
    reactants: RwLock<Vec<Reactant<T>>>,
}

impl<T> Default for ValueDendrite<T> {
    fn default() -> Self {
        Self {
            reactants: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ValueDendrite<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_reactants(&self, incoming: Vec<Reactant<T>>) {
        let mut guard = self.reactants.write().await;
        dedup_push(&mut guard, incoming);
    }

    pub async fn remove_reactants(&self, victims: &[Reactant<T>]) {
        let mut guard = self.reactants.write().await;
        remove_matching(&mut guard, victims);
    }

    pub async fn transduce(&self, value: T, neuron: Neuron<T>, reaction_id: ReactionId) {
        let snapshot = self.reactants.read().await.clone();
        let calls = snapshot
            .iter()
            .map(|reactant| reactant(value.clone(), neuron.clone(), reaction_id));
        futures::future::join_all(calls).await;
    }
}

/// Fan-out engine for a synapse whose transport carries encoded bytes:
/// decodes at most once per inbound message, then dispatches the decoded
/// value to `reactants` and the original bytes to `raw_reactants`
/// concurrently.
pub struct BytesDendrite<T> {
    neuron: Neuron<T>,
    reactants: RwLock<Vec<Reactant<T>>>,
    raw_reactants: RwLock<Vec<RawReactant>>,
}

impl<T: Clone + Send + Sync + 'static> BytesDendrite<T> {
    pub fn new(neuron: Neuron<T>) -> Self {
        Self {
            neuron,
            reactants: RwLock::new(Vec::new()),
            raw_reactants: RwLock::new(Vec::new()),
        }
    }

    pub fn neuron(&self) -> &Neuron<T> {
        &self.neuron
    }

    pub async fn add_reactants(&self, incoming: Vec<Reactant<T>>) {
        let mut guard = self.reactants.write().await;
        dedup_push(&mut guard, incoming);
    }

    pub async fn remove_reactants(&self, victims: &[Reactant<T>]) {
        let mut guard = self.reactants.write().await;
        remove_matching(&mut guard, victims);
    }

    pub async fn add_raw_reactants(&self, incoming: Vec<RawReactant>) {
        let mut guard = self.raw_reactants.write().await;
        dedup_push(&mut guard, incoming);
    }

    pub async fn remove_raw_reactants(&self, victims: &[RawReactant]) {
        let mut guard = self.raw_reactants.write().await;
        remove_matching(&mut guard, victims);
    }

    /// Decode once, then fan the decoded value and the raw bytes out to
    /// their respective reactant lists in a single concurrent gather.
    pub async fn transduce(&self, bytes: Vec<u8>, reaction_id: ReactionId) -> Result<(), crate::error::PlexusError> {
        let value = self.neuron.decode(&bytes)?;

        let reactants = self.reactants.read().await.clone();
        let raw_reactants = self.raw_reactants.read().await.clone();

        let value_calls = reactants
            .iter()
            .map(|reactant| reactant(value.clone(), self.neuron.clone(), reaction_id));
        let raw_calls = raw_reactants
            .iter()
            .map(|reactant| reactant(bytes.clone(), reaction_id));

        futures::future::join_all(value_calls.chain(raw_calls).collect::<Vec<_>>()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{JsonCodec, Namespace};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample(u32);

    fn sample_neuron() -> Neuron<Sample> {
        let ns = Namespace::new(["t"]);
        Neuron::new(ns, Arc::new(JsonCodec::new("json")), "Sample")
    }

    #[tokio::test]
    async fn value_dendrite_invokes_every_reactant_once() {
        let dendrite = ValueDendrite::<Sample>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            dendrite
                .add_reactants(vec![Arc::new(move |_v, _n, _r| {
                    let calls = Arc::clone(&calls);
                    Box::pin(async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                    })
                })])
                .await;
        }

        dendrite.transduce(Sample(1), sample_neuron(), 0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn bytes_dendrite_decodes_once_and_fans_to_both_lists() {
        let neuron = sample_neuron();
        let dendrite = BytesDendrite::new(neuron.clone());
        let decoded_calls = Arc::new(AtomicUsize::new(0));
        let raw_calls = Arc::new(AtomicUsize::new(0));

        {
            let decoded_calls = Arc::clone(&decoded_calls);
            dendrite
                .add_reactants(vec![Arc::new(move |_v, _n, _r| {
                    let decoded_calls = Arc::clone(&decoded_calls);
                    Box::pin(async move {
                        decoded_calls.fetch_add(1, Ordering::SeqCst);
                    })
                })])
                .await;
        }
        {
            let raw_calls = Arc::clone(&raw_calls);
            dendrite
                .add_raw_reactants(vec![Arc::new(move |_bytes, _r| {
                    let raw_calls = Arc::clone(&raw_calls);
                    Box::pin(async move {
                        raw_calls.fetch_add(1, Ordering::SeqCst);
                    })
                })])
                .await;
        }

        let bytes = neuron.encode(&Sample(42)).unwrap();
        dendrite.transduce(bytes, 0).await.unwrap();

        assert_eq!(decoded_calls.load(Ordering::SeqCst), 1);
        assert_eq!(raw_calls.load(Ordering::SeqCst), 1);
    }
}
