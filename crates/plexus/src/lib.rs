// SPDX-License-Identifier: PolyForm-Shield-1.0

//! Core event-fabric primitives: neurons, dendrites, synapses, ganglia,
//! and the plexus that composes and routes between them.

pub mod dendrite;
pub mod error;
pub mod ganglion;
pub mod inproc;
pub mod neuron;
#[allow(clippy::module_inception)]
pub mod plexus;
pub mod synapse;

pub use dendrite::{BoxFuture, BytesDendrite, Reactant, ReactionId, RawReactant, ValueDendrite};
pub use error::PlexusError;
pub use ganglion::{ExternalGanglion, GanglionFilters, GanglionId, InternalGanglion};
pub use inproc::{InprocGanglion, InprocSynapse};
pub use neuron::Neuron;
pub use plexus::Plexus;
pub use synapse::Synapse;
