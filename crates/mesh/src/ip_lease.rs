// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use plexus::PlexusError;
use tokio::sync::Mutex;

struct State {
    available: HashSet<Ipv4Addr>,
    leased: HashSet<Ipv4Addr>,
}

/// Tracks which addresses of a multicast CIDR block are currently leased
/// to a channel. All three operations below take the same lock, so the
/// manager is atomic with respect to itself regardless of how many
/// consensus rounds are running concurrently.
pub struct IpLeaseManager {
    network: Ipv4Net,
    state: Mutex<State>,
}

impl IpLeaseManager {
    pub fn new(network: Ipv4Net) -> Self {
        let available = network.hosts().collect();
        Self {
            network,
            state: Mutex::new(State {
                available,
                leased: HashSet::new(),
            }),
        }
    }

    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    pub async fn lease(&self, addr: Ipv4Addr) -> Result<(), PlexusError> {
        let mut state = self.state.lock().await;
        if state.leased.contains(&addr) {
            return Err(PlexusError::IpLeaseExists(addr.to_string()));
        }
        if !state.available.remove(&addr) {
            return Err(PlexusError::IpNotFound(addr.to_string()));
        }
        state.leased.insert(addr);
        Ok(())
    }

    pub async fn release(&self, addr: Ipv4Addr) -> Result<(), PlexusError> {
        let mut state = self.state.lock().await;
        if !state.leased.remove(&addr) {
            return Err(PlexusError::IpNotLeased(addr.to_string()));
        }
        state.available.insert(addr);
        Ok(())
    }

    pub async fn is_leased(&self, addr: Ipv4Addr) -> bool {
        self.state.lock().await.leased.contains(&addr)
    }

    /// Pop an arbitrary available address and lease it in one step.
    pub async fn get(&self) -> Result<Ipv4Addr, PlexusError> {
        let mut state = self.state.lock().await;
        let addr = *state.available.iter().next().ok_or(PlexusError::IpsExhausted)?;
        state.available.remove(&addr);
        state.leased.insert(addr);
        Ok(addr)
    }

    /// Carve an address out of the available pool without leasing it,
    /// used once at startup to set aside the reserved control-plane
    /// block before any consensus round can claim it.
    pub async fn reserve(&self, addr: Ipv4Addr) {
        self.state.lock().await.available.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> IpLeaseManager {
        IpLeaseManager::new("239.1.0.0/28".parse().unwrap())
    }

    #[tokio::test]
    async fn lease_then_release_restores_prior_state() {
        let mgr = manager();
        let addr: Ipv4Addr = "239.1.0.2".parse().unwrap();

        mgr.lease(addr).await.unwrap();
        assert!(mgr.is_leased(addr).await);

        mgr.release(addr).await.unwrap();
        assert!(!mgr.is_leased(addr).await);
    }

    #[tokio::test]
    async fn double_lease_is_rejected() {
        let mgr = manager();
        let addr: Ipv4Addr = "239.1.0.2".parse().unwrap();
        mgr.lease(addr).await.unwrap();
        assert!(matches!(mgr.lease(addr).await, Err(PlexusError::IpLeaseExists(_))));
    }

    #[tokio::test]
    async fn release_without_lease_is_rejected() {
        let mgr = manager();
        let addr: Ipv4Addr = "239.1.0.2".parse().unwrap();
        assert!(matches!(mgr.release(addr).await, Err(PlexusError::IpNotLeased(_))));
    }

    #[tokio::test]
    async fn get_exhausts_eventually() {
        let mgr = IpLeaseManager::new("239.1.0.0/30".parse().unwrap());
        // a /30 host range leaves two usable host addresses.
        mgr.get().await.unwrap();
        mgr.get().await.unwrap();
        assert!(matches!(mgr.get().await, Err(PlexusError::IpsExhausted)));
    }

    #[tokio::test]
    async fn reserved_addresses_cannot_be_leased() {
        let mgr = manager();
        let addr: Ipv4Addr = "239.1.0.2".parse().unwrap();
        mgr.reserve(addr).await;
        assert!(matches!(mgr.lease(addr).await, Err(PlexusError::IpNotFound(_))));
    }
}
