// SPDX-License-Identifier: PolyForm-Shield-1.0

use thiserror::Error;

use protocol::CodecError;

/// Error taxonomy shared by the core fabric and its transport ganglia.
///
/// `mesh` reuses this enum for its own lease- and consensus-related
/// failures rather than defining a parallel one, matching how the
/// upstream project keeps a single flat exception module.
#[derive(Debug, Error)]
pub enum PlexusError {
    #[error("neuron not found: {0}")]
    NeuronNotFound(String),

    #[error("neuron not available for: {0}")]
    NeuronNotAvailable(String),

    #[error("synapse already exists for: {0}")]
    SynapseExists(String),

    #[error("synapse does not exist for: {0}")]
    SynapseDoesNotExist(String),

    #[error("no transmitter registered for: {0}")]
    TransmitterNotFound(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("ip address is not multicast: {0}")]
    IpAddressIsNotMulticast(String),

    #[error("ip address already leased: {0}")]
    IpLeaseExists(String),

    #[error("ip address not found in managed range: {0}")]
    IpNotFound(String),

    #[error("ip address is not currently leased: {0}")]
    IpNotLeased(String),

    #[error("no ip addresses remain in the managed range")]
    IpsExhausted,

    #[error("preparation rejected for {type_name}")]
    PreparationRejection { type_name: String },

    #[error("no promise was made for the proposal on {type_name}")]
    ProposalPromiseNotMade { type_name: String },

    #[error("proposal is not the latest one promised for {type_name}")]
    ProposalNotLatest { type_name: String },

    #[error("consensus not reached for {type_name}")]
    ConsensusNotReached { type_name: String },

    #[error("transport error: {0}")]
    Transport(String),
}
