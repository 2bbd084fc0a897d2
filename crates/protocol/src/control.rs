// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Periodic liveness announcement broadcast by every peer on the reserved
/// heartbeat address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub instance_id: u64,
}

/// Phase-1a Paxos message: a peer asking to become the proposer for
/// `type_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preparation {
    pub instance_id: u64,
    pub proposal_id: u64,
    pub type_name: String,
}

/// Phase-1b response: a peer promising not to accept any proposal older
/// than `proposal_id`, carrying the most recently accepted value it knows
/// of (if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promise {
    pub instance_id: u64,
    pub proposal_id: u64,
    pub type_name: String,
    pub accepted_instance_id: u64,
    pub accepted_proposal_id: u64,
    /// Absent, never defaulted to an address, when no value has been
    /// accepted yet for this type name.
    pub multicast_ip: Option<Ipv4Addr>,
}

/// Phase-1b response: a peer declining a stale preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub instance_id: u64,
    pub proposal_id: u64,
    pub type_name: String,
}

/// Phase-2a Paxos message: the proposer asking peers to accept a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub instance_id: u64,
    pub proposal_id: u64,
    pub type_name: String,
    pub multicast_ip: Option<Ipv4Addr>,
}

/// Phase-2b response: a peer accepting a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub instance_id: u64,
    pub proposal_id: u64,
    pub type_name: String,
    pub multicast_ip: Ipv4Addr,
}

/// Orders two (proposal_id, instance_id) pairs the way every consensus
/// comparison in the multicast ganglion must: lexicographically, with the
/// instance id breaking ties between colliding timestamps.
pub fn proposal_is_newer(
    candidate_proposal_id: u64,
    candidate_instance_id: u64,
    reference_proposal_id: u64,
    reference_instance_id: u64,
) -> bool {
    (candidate_proposal_id, candidate_instance_id) > (reference_proposal_id, reference_instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_broken_by_instance_id() {
        assert!(proposal_is_newer(10, 2, 10, 1));
        assert!(!proposal_is_newer(10, 1, 10, 2));
    }

    #[test]
    fn later_proposal_id_always_wins() {
        assert!(proposal_is_newer(11, 0, 10, u64::MAX));
    }
}
