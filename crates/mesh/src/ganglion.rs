// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use plexus::ganglion::{ExternalGanglion, GanglionFilters, GanglionId};
use plexus::{PlexusError, RawReactant, ReactionId};
use protocol::control::proposal_is_newer;
use protocol::{Approval, Heartbeat, Preparation, Promise, Proposal, Rejection};
use rand::Rng;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ip_lease::IpLeaseManager;
use crate::synapse::MulticastSynapse;
use crate::transport::{unframe, MulticastTransport, UdpMulticastTransport};

/// Configuration the ganglion needs at construction time, mirroring the
/// options in the project's TOML configuration surface.
#[derive(Debug, Clone)]
pub struct MulticastGanglionConfig {
    pub bind_interface: Ipv4Addr,
    pub multicast_cidr: ipnet::Ipv4Net,
    pub port: u16,
    pub heartbeat_interval: Duration,
    pub proposal_timeout: Duration,
    pub filters: GanglionFilters,
}

impl Default for MulticastGanglionConfig {
    fn default() -> Self {
        Self {
            bind_interface: Ipv4Addr::UNSPECIFIED,
            multicast_cidr: "239.0.0.0/16".parse().unwrap(),
            port: 9301,
            heartbeat_interval: Duration::from_secs(30),
            proposal_timeout: Duration::from_secs(5),
            filters: GanglionFilters::default(),
        }
    }
}

/// The six addresses carved permanently out of the reserved block, one
/// per control-plane message kind.
struct ControlChannels {
    heartbeat: (Ipv4Addr, Arc<dyn MulticastTransport>),
    preparation: (Ipv4Addr, Arc<dyn MulticastTransport>),
    promise: (Ipv4Addr, Arc<dyn MulticastTransport>),
    rejection: (Ipv4Addr, Arc<dyn MulticastTransport>),
    proposal: (Ipv4Addr, Arc<dyn MulticastTransport>),
    approval: (Ipv4Addr, Arc<dyn MulticastTransport>),
}

#[derive(Default)]
enum RoundState {
    #[default]
    Idle,
    Preparing {
        proposal_id: u64,
        promises: Vec<Promise>,
        rejections: u32,
    },
    Proposing { proposal_id: u64 },
}

struct Round {
    notify: Notify,
    state: Mutex<RoundState>,
}

impl Round {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            state: Mutex::new(RoundState::default()),
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as u64
}

/// Peer-to-peer multicast transport: discovers peers by heartbeat and
/// negotiates a unique multicast address per channel name with a
/// Paxos-style two-phase protocol.
pub struct MulticastGanglion {
    id: GanglionId,
    instance_id: u64,
    filters: GanglionFilters,
    heartbeat_interval: Duration,
    proposal_timeout: Duration,
    lease_manager: Arc<IpLeaseManager>,
    control: ControlChannels,
    bind_interface: Ipv4Addr,
    port: u16,
    peer_heartbeats: RwLock<HashMap<u64, Instant>>,
    peer_count: AtomicUsize,
    promised: RwLock<HashMap<String, (u64, u64)>>,
    accepted: RwLock<HashMap<String, (u64, u64, Ipv4Addr)>>,
    rounds: RwLock<HashMap<String, Arc<Round>>>,
    /// Approvals observed for each type name's current proposal round,
    /// tracked independent of whether this peer is the proposer, so any
    /// peer can reach quorum and commit a synapse once it has seen enough
    /// matching approvals — not only the instance that sent the proposal.
    approval_tallies: RwLock<HashMap<String, (u64, HashSet<u64>)>>,
    synapses: RwLock<HashMap<String, Arc<MulticastSynapse>>>,
    started_at: Instant,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl MulticastGanglion {
    /// Reserve the first 32 addresses of the CIDR, bind the six
    /// control-plane sockets out of that block, and start the background
    /// heartbeat, peer-count, and control receive loops.
    pub async fn start(config: MulticastGanglionConfig) -> Result<Arc<Self>, PlexusError> {
        if !config.multicast_cidr.network().is_multicast() {
            return Err(PlexusError::IpAddressIsNotMulticast(config.multicast_cidr.to_string()));
        }

        let lease_manager = Arc::new(IpLeaseManager::new(config.multicast_cidr));
        let reserved = lease_manager.network().hosts().take(32);

        let mut reserved_addrs = Vec::with_capacity(32);
        for addr in reserved {
            lease_manager.reserve(addr).await;
            reserved_addrs.push(addr);
        }
        if reserved_addrs.len() < 32 {
            return Err(PlexusError::IpsExhausted);
        }

        let mut sockets = Vec::with_capacity(6);
        for addr in &reserved_addrs[0..6] {
            let transport = UdpMulticastTransport::bind(config.bind_interface, *addr, config.port).await?;
            sockets.push((*addr, Arc::new(transport) as Arc<dyn MulticastTransport>));
        }
        let control = ControlChannels {
            heartbeat: sockets[0].clone(),
            preparation: sockets[1].clone(),
            promise: sockets[2].clone(),
            rejection: sockets[3].clone(),
            proposal: sockets[4].clone(),
            approval: sockets[5].clone(),
        };

        let instance_id = {
            let uuid = Uuid::now_v7();
            u64::from_be_bytes(uuid.as_bytes()[0..8].try_into().unwrap())
        };

        let ganglion = Arc::new(Self {
            id: GanglionId::fresh(),
            instance_id,
            filters: config.filters,
            heartbeat_interval: config.heartbeat_interval,
            proposal_timeout: config.proposal_timeout,
            lease_manager,
            control,
            bind_interface: config.bind_interface,
            port: config.port,
            peer_heartbeats: RwLock::new(HashMap::new()),
            peer_count: AtomicUsize::new(0),
            promised: RwLock::new(HashMap::new()),
            accepted: RwLock::new(HashMap::new()),
            rounds: RwLock::new(HashMap::new()),
            approval_tallies: RwLock::new(HashMap::new()),
            synapses: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
            background: Mutex::new(Vec::new()),
        });

        ganglion.spawn_control_receive_loops().await;
        ganglion.spawn_heartbeat_loop().await;
        ganglion.spawn_peer_count_loop().await;

        info!(
            instance_id = instance_id,
            "multicast ganglion started on {}:{}", config.bind_interface, config.port
        );
        Ok(ganglion)
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn quorum(&self) -> usize {
        let peers = self.peer_count.load(Ordering::Relaxed);
        if peers == 0 {
            0
        } else {
            peers / 2 + 1
        }
    }

    async fn round_for(&self, type_name: &str) -> Arc<Round> {
        if let Some(round) = self.rounds.read().await.get(type_name) {
            return Arc::clone(round);
        }
        let mut guard = self.rounds.write().await;
        Arc::clone(guard.entry(type_name.to_string()).or_insert_with(|| Arc::new(Round::new())))
    }

    /// Wait out one heartbeat interval so the peer count has a chance to
    /// settle before the first consensus round starts.
    pub async fn wait_startup(&self) {
        let elapsed = self.started_at.elapsed();
        if elapsed < self.heartbeat_interval {
            tokio::time::sleep(self.heartbeat_interval - elapsed).await;
        }
    }

    async fn spawn_heartbeat_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let half_millis = (this.heartbeat_interval.as_millis() as u64 / 2).max(1);
                let full_millis = this.heartbeat_interval.as_millis() as u64;
                let jitter_millis = rand::thread_rng().gen_range(half_millis..=full_millis);
                tokio::time::sleep(Duration::from_millis(jitter_millis)).await;
                let payload = serde_json::to_vec(&Heartbeat {
                    instance_id: this.instance_id,
                })
                .expect("heartbeat is always serializable");
                if let Err(e) = this.control.heartbeat.1.send(&payload).await {
                    warn!("failed to send heartbeat: {e}");
                }
            }
        });
        self.background.lock().await.push(handle);
    }

    async fn spawn_peer_count_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(this.heartbeat_interval / 2).await;
                let now = Instant::now();
                let window = this.heartbeat_interval;
                let mut heartbeats = this.peer_heartbeats.write().await;
                heartbeats.retain(|_, last_seen| now.duration_since(*last_seen) <= window);
                this.peer_count.store(heartbeats.len(), Ordering::Relaxed);
            }
        });
        self.background.lock().await.push(handle);
    }

    async fn spawn_control_receive_loops(self: &Arc<Self>) {
        self.spawn_receive_loop(Arc::clone(&self.control.heartbeat.1), ControlKind::Heartbeat)
            .await;
        self.spawn_receive_loop(Arc::clone(&self.control.preparation.1), ControlKind::Preparation)
            .await;
        self.spawn_receive_loop(Arc::clone(&self.control.promise.1), ControlKind::Promise)
            .await;
        self.spawn_receive_loop(Arc::clone(&self.control.rejection.1), ControlKind::Rejection)
            .await;
        self.spawn_receive_loop(Arc::clone(&self.control.proposal.1), ControlKind::Proposal)
            .await;
        self.spawn_receive_loop(Arc::clone(&self.control.approval.1), ControlKind::Approval)
            .await;
    }

    async fn spawn_receive_loop(self: &Arc<Self>, transport: Arc<dyn MulticastTransport>, kind: ControlKind) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(bytes) => this.dispatch_control(kind, &bytes).await,
                    Err(e) => {
                        warn!("control receive loop for {kind:?} errored: {e}");
                    }
                }
            }
        });
        self.background.lock().await.push(handle);
    }

    async fn dispatch_control(&self, kind: ControlKind, bytes: &[u8]) {
        match kind {
            ControlKind::Heartbeat => {
                if let Ok(msg) = serde_json::from_slice::<Heartbeat>(bytes) {
                    self.peer_heartbeats.write().await.insert(msg.instance_id, Instant::now());
                }
            }
            ControlKind::Preparation => {
                if let Ok(msg) = serde_json::from_slice::<Preparation>(bytes) {
                    self.handle_preparation(msg).await;
                }
            }
            ControlKind::Promise => {
                if let Ok(msg) = serde_json::from_slice::<Promise>(bytes) {
                    self.handle_promise(msg).await;
                }
            }
            ControlKind::Rejection => {
                if let Ok(msg) = serde_json::from_slice::<Rejection>(bytes) {
                    self.handle_rejection(msg).await;
                }
            }
            ControlKind::Proposal => {
                if let Ok(msg) = serde_json::from_slice::<Proposal>(bytes) {
                    self.handle_proposal(msg).await;
                }
            }
            ControlKind::Approval => {
                if let Ok(msg) = serde_json::from_slice::<Approval>(bytes) {
                    self.handle_approval(msg).await;
                }
            }
        }
    }

    async fn handle_preparation(&self, msg: Preparation) {
        let is_newer = {
            let promised = self.promised.read().await;
            match promised.get(&msg.type_name) {
                None => true,
                Some((pid, iid)) => proposal_is_newer(msg.proposal_id, msg.instance_id, *pid, *iid),
            }
        };

        if !is_newer {
            let rejection = Rejection {
                instance_id: msg.instance_id,
                proposal_id: msg.proposal_id,
                type_name: msg.type_name,
            };
            self.send(&self.control.rejection.1, &rejection).await;
            return;
        }

        self.promised
            .write()
            .await
            .insert(msg.type_name.clone(), (msg.proposal_id, msg.instance_id));

        let accepted = self.accepted.read().await.get(&msg.type_name).cloned();
        let promise = Promise {
            instance_id: msg.instance_id,
            proposal_id: msg.proposal_id,
            type_name: msg.type_name,
            accepted_proposal_id: accepted.map(|(pid, _, _)| pid).unwrap_or(0),
            accepted_instance_id: accepted.map(|(_, iid, _)| iid).unwrap_or(0),
            multicast_ip: accepted.map(|(_, _, ip)| ip),
        };
        self.send(&self.control.promise.1, &promise).await;
    }

    async fn handle_promise(&self, msg: Promise) {
        if msg.instance_id != self.instance_id {
            return;
        }
        let round = self.round_for(&msg.type_name).await;
        let mut state = round.state.lock().await;
        if let RoundState::Preparing { proposal_id, promises, .. } = &mut *state {
            if *proposal_id == msg.proposal_id {
                promises.push(msg);
                round.notify.notify_waiters();
            }
        }
    }

    async fn handle_rejection(&self, msg: Rejection) {
        if msg.instance_id != self.instance_id {
            return;
        }
        let round = self.round_for(&msg.type_name).await;
        let mut state = round.state.lock().await;
        if let RoundState::Preparing { proposal_id, rejections, .. } = &mut *state {
            if *proposal_id == msg.proposal_id {
                *rejections += 1;
                round.notify.notify_waiters();
            }
        }
    }

    async fn handle_proposal(&self, msg: Proposal) {
        let promised = self.promised.read().await.get(&msg.type_name).copied();
        match promised {
            Some((pid, iid)) if pid == msg.proposal_id && iid == msg.instance_id => {
                let Some(multicast_ip) = msg.multicast_ip else {
                    warn!("proposal for {} carried no address", msg.type_name);
                    return;
                };
                self.accepted
                    .write()
                    .await
                    .insert(msg.type_name.clone(), (msg.proposal_id, msg.instance_id, multicast_ip));
                let approval = Approval {
                    instance_id: msg.instance_id,
                    proposal_id: msg.proposal_id,
                    type_name: msg.type_name,
                    multicast_ip,
                };
                self.send(&self.control.approval.1, &approval).await;
            }
            Some(_) => {
                debug!(
                    "{}",
                    PlexusError::ProposalNotLatest {
                        type_name: msg.type_name,
                    }
                );
            }
            None => {
                debug!(
                    "{}",
                    PlexusError::ProposalPromiseNotMade {
                        type_name: msg.type_name,
                    }
                );
            }
        }
    }

    async fn handle_approval(&self, msg: Approval) {
        let quorum = self.quorum();

        // Tally approvals per (type_name, proposal_id) regardless of
        // whether this peer itself proposed the round, so a bystander that
        // only observes the wire can still commit once quorum is reached.
        // A newer proposal_id for the same type name discards the stale
        // tally rather than letting two rounds' approvals mix.
        let commit = {
            let mut tallies = self.approval_tallies.write().await;
            let entry = tallies
                .entry(msg.type_name.clone())
                .or_insert_with(|| (msg.proposal_id, HashSet::new()));
            if msg.proposal_id > entry.0 {
                *entry = (msg.proposal_id, HashSet::new());
            }
            if msg.proposal_id == entry.0 {
                entry.1.insert(msg.instance_id);
                entry.1.len() >= quorum
            } else {
                false
            }
        };

        // Wake the proposer's own wait loop, if this peer is the proposer.
        let round = self.round_for(&msg.type_name).await;
        {
            let state = round.state.lock().await;
            if let RoundState::Proposing { proposal_id, .. } = &*state {
                if *proposal_id == msg.proposal_id {
                    round.notify.notify_waiters();
                }
            }
        }

        if commit {
            if let Err(e) = self.commit_synapse(&msg.type_name, msg.multicast_ip).await {
                warn!("failed to commit synapse for {}: {e}", msg.type_name);
            }
        }
    }

    async fn send<T: serde::Serialize>(&self, transport: &Arc<dyn MulticastTransport>, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Err(e) = transport.send(&bytes).await {
                    warn!("failed to send control message: {e}");
                }
            }
            Err(e) => warn!("failed to encode control message: {e}"),
        }
    }

    /// Run the full prepare/promise → propose/approve round once,
    /// retrying on rejection or a failed quorum until it commits.
    pub async fn acquire_address_for_type(&self, type_name: &str) -> Result<Ipv4Addr, PlexusError> {
        self.wait_startup().await;
        loop {
            match self.try_acquire_once(type_name).await {
                Ok(addr) => return Ok(addr),
                Err(PlexusError::PreparationRejection { .. }) | Err(PlexusError::ConsensusNotReached { .. }) => {
                    let backoff = Duration::from_millis(rand::thread_rng().gen_range(50..250));
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_acquire_once(&self, type_name: &str) -> Result<Ipv4Addr, PlexusError> {
        let proposal_id = now_nanos();
        let round = self.round_for(type_name).await;

        *round.state.lock().await = RoundState::Preparing {
            proposal_id,
            promises: Vec::new(),
            rejections: 0,
        };
        self.send(
            &self.control.preparation.1,
            &Preparation {
                instance_id: self.instance_id,
                proposal_id,
                type_name: type_name.to_string(),
            },
        )
        .await;

        let quorum = self.quorum();
        let _ = tokio::time::timeout(self.proposal_timeout, async {
            loop {
                {
                    let state = round.state.lock().await;
                    if let RoundState::Preparing { promises, rejections, .. } = &*state {
                        if promises.len() >= quorum || *rejections as usize > quorum {
                            return;
                        }
                    }
                }
                round.notify.notified().await;
            }
        })
        .await;

        let (promises, rejections) = {
            let state = round.state.lock().await;
            match &*state {
                RoundState::Preparing { promises, rejections, .. } => (promises.clone(), *rejections),
                _ => (Vec::new(), 0),
            }
        };

        if promises.len() < quorum || rejections as usize > quorum {
            return Err(PlexusError::PreparationRejection {
                type_name: type_name.to_string(),
            });
        }

        let inherited = promises
            .iter()
            .filter_map(|p| p.multicast_ip.map(|ip| (p.accepted_proposal_id, p.accepted_instance_id, ip)))
            .max_by_key(|(pid, iid, _)| (*pid, *iid))
            .map(|(_, _, ip)| ip);

        let multicast_ip = match inherited {
            Some(ip) => ip,
            None => self.lease_manager.get().await?,
        };

        *round.state.lock().await = RoundState::Proposing { proposal_id };
        self.send(
            &self.control.proposal.1,
            &Proposal {
                instance_id: self.instance_id,
                proposal_id,
                type_name: type_name.to_string(),
                multicast_ip: Some(multicast_ip),
            },
        )
        .await;

        let _ = tokio::time::timeout(self.proposal_timeout, async {
            loop {
                if self.approvals_for(type_name, proposal_id).await >= quorum {
                    return;
                }
                round.notify.notified().await;
            }
        })
        .await;

        let approvals = self.approvals_for(type_name, proposal_id).await;

        if approvals >= quorum {
            self.commit_synapse(type_name, multicast_ip).await?;
            Ok(multicast_ip)
        } else {
            Err(PlexusError::ConsensusNotReached {
                type_name: type_name.to_string(),
            })
        }
    }

    /// Count of distinct instances that have approved `type_name`'s
    /// current proposal round, or 0 if `proposal_id` is no longer the
    /// latest round tallied for that type name.
    async fn approvals_for(&self, type_name: &str, proposal_id: u64) -> usize {
        match self.approval_tallies.read().await.get(type_name) {
            Some((tallied_id, approvals)) if *tallied_id == proposal_id => approvals.len(),
            _ => 0,
        }
    }

    async fn commit_synapse(&self, type_name: &str, multicast_ip: Ipv4Addr) -> Result<(), PlexusError> {
        let existing = self.synapses.read().await.get(type_name).cloned();
        let already_current = match &existing {
            Some(synapse) => synapse.address().await == multicast_ip,
            None => false,
        };

        match existing {
            Some(_) if already_current => Ok(()),
            Some(synapse) => {
                let old_address = synapse.address().await;
                let transport = Arc::new(UdpMulticastTransport::bind(self.bind_interface, multicast_ip, self.port).await?);
                synapse.rebind(multicast_ip, transport.clone()).await;
                self.spawn_synapse_recv_loop(Arc::clone(&synapse), transport).await;
                if self.lease_manager.is_leased(old_address).await {
                    let _ = self.lease_manager.release(old_address).await;
                }
                info!("rebound synapse for {type_name} from {old_address} to {multicast_ip}");
                Ok(())
            }
            None => {
                let transport = Arc::new(UdpMulticastTransport::bind(self.bind_interface, multicast_ip, self.port).await?);
                let synapse = Arc::new(MulticastSynapse::new(type_name.to_string(), multicast_ip, transport.clone()));
                self.spawn_synapse_recv_loop(Arc::clone(&synapse), transport).await;
                self.synapses.write().await.insert(type_name.to_string(), synapse);
                info!("created synapse for {type_name} on {multicast_ip}");
                Ok(())
            }
        }
    }

    async fn spawn_synapse_recv_loop(&self, synapse: Arc<MulticastSynapse>, transport: Arc<dyn MulticastTransport>) {
        let handle = tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(datagram) => match unframe(&datagram) {
                        Ok((_name, payload)) => synapse.transduce(payload, 0).await,
                        Err(e) => warn!("malformed datagram on {}: {e}", synapse.channel_name()),
                    },
                    Err(e) => {
                        warn!("receive loop for {} errored: {e}", synapse.channel_name());
                    }
                }
            }
        });
        synapse.set_recv_task(handle).await;
    }

    async fn get_or_create_synapse(&self, channel_name: &str) -> Result<Arc<MulticastSynapse>, PlexusError> {
        if let Some(existing) = self.synapses.read().await.get(channel_name) {
            return Ok(Arc::clone(existing));
        }
        let address = self.acquire_address_for_type(channel_name).await?;
        self.synapses
            .read()
            .await
            .get(channel_name)
            .cloned()
            .ok_or(PlexusError::SynapseDoesNotExist(address.to_string()))
    }

    /// Standalone registration path: decode bytes via `neuron`'s codec
    /// before handing them to `reactants`, in addition to any
    /// already-bytes `raw_reactants`. Used by callers that talk to this
    /// ganglion directly rather than through a plexus.
    pub async fn adapt<T>(
        &self,
        neuron: plexus::Neuron<T>,
        reactants: Vec<plexus::Reactant<T>>,
        raw_reactants: Vec<RawReactant>,
    ) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !self.filters.capable(&neuron) {
            warn!("multicast ganglion not capable of neuron {}", neuron.name());
            return Ok(());
        }
        let synapse = self.get_or_create_synapse(neuron.name()).await?;
        for r in raw_reactants {
            synapse.add_raw_reactant(r).await;
        }
        if !reactants.is_empty() {
            let wrapped: RawReactant = Arc::new(move |bytes, reaction_id| {
                let neuron = neuron.clone();
                let reactants = reactants.clone();
                let fut: plexus::BoxFuture<'static, ()> = Box::pin(async move {
                    match neuron.decode(&bytes) {
                        Ok(value) => {
                            let calls = reactants.iter().map(|r| r(value.clone(), neuron.clone(), reaction_id));
                            futures::future::join_all(calls).await;
                        }
                        Err(e) => warn!("failed to decode inbound message for {}: {e}", neuron.name()),
                    }
                });
                fut
            });
            synapse.add_raw_reactant(wrapped).await;
        }
        Ok(())
    }

    pub async fn transmit<T>(&self, neuron: &plexus::Neuron<T>, value: T) -> Result<(), PlexusError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let synapse = self.get_or_create_synapse(neuron.name()).await?;
        let bytes = neuron.encode(&value)?;
        synapse.transmit_encoded(bytes, 0).await
    }
}

#[derive(Debug, Clone, Copy)]
enum ControlKind {
    Heartbeat,
    Preparation,
    Promise,
    Rejection,
    Proposal,
    Approval,
}

#[async_trait]
impl ExternalGanglion for MulticastGanglion {
    fn id(&self) -> GanglionId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn capable_name(&self, channel_name: &str, codec_name: &str) -> bool {
        if self.filters.ignored_neurons.contains(channel_name) {
            return false;
        }
        if let Some(relevant) = &self.filters.relevant_neurons {
            if !relevant.contains(channel_name) {
                return false;
            }
        }
        if let Some(allowed) = &self.filters.allowed_codecs {
            if !allowed.contains(codec_name) {
                return false;
            }
        }
        true
    }

    async fn transmit_encoded(&self, channel_name: &str, bytes: Vec<u8>, reaction_id: ReactionId) -> Result<(), PlexusError> {
        let synapse = self.get_or_create_synapse(channel_name).await?;
        synapse.transmit_encoded(bytes, reaction_id).await
    }

    async fn adapt_raw(&self, channel_name: String, reactant: RawReactant) -> Result<(), PlexusError> {
        let synapse = self.get_or_create_synapse(&channel_name).await?;
        synapse.add_raw_reactant(reactant).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), PlexusError> {
        for (_, synapse) in self.synapses.write().await.drain() {
            synapse.close().await;
        }
        let handles: Vec<_> = self.background.lock().await.drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        plexus::synapse::close_tasks("multicast ganglion background loops", handles).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_rejects_a_non_multicast_cidr() {
        let config = MulticastGanglionConfig {
            multicast_cidr: "10.0.0.0/24".parse().unwrap(),
            ..MulticastGanglionConfig::default()
        };
        let result = MulticastGanglion::start(config).await;
        assert!(matches!(result, Err(PlexusError::IpAddressIsNotMulticast(_))));
    }

    #[test]
    fn proposal_comparison_never_uses_proposal_id_alone() {
        // Equal proposal ids must fall through to the instance-id tie-break
        // rather than reporting a tie.
        assert!(proposal_is_newer(10, 2, 10, 1));
        assert!(!proposal_is_newer(10, 1, 10, 1));
    }

    async fn test_ganglion(cidr: &str) -> Arc<MulticastGanglion> {
        let config = MulticastGanglionConfig {
            multicast_cidr: cidr.parse().unwrap(),
            port: 0,
            ..MulticastGanglionConfig::default()
        };
        MulticastGanglion::start(config).await.unwrap()
    }

    #[tokio::test]
    async fn bystander_commits_on_exact_majority_without_proposing_itself() {
        let ganglion = test_ganglion("239.77.0.0/24").await;
        // Three peers means a majority is 2, not 3: `approvals.len() > quorum`
        // would wrongly demand all three.
        ganglion.peer_count.store(3, Ordering::Relaxed);
        assert_eq!(ganglion.quorum(), 2);

        let multicast_ip: Ipv4Addr = "239.77.0.5".parse().unwrap();
        let approval = |instance_id: u64| Approval {
            instance_id,
            proposal_id: 1,
            type_name: "ns.Foo".to_string(),
            multicast_ip,
        };

        // This ganglion never called `try_acquire_once` for "ns.Foo", so its
        // own `Round` stays `Idle` the whole time: only the approval tally
        // drives the commit.
        ganglion.handle_approval(approval(111)).await;
        assert!(!ganglion.synapses.read().await.contains_key("ns.Foo"));

        ganglion.handle_approval(approval(222)).await;
        assert!(ganglion.synapses.read().await.contains_key("ns.Foo"));
    }

    #[tokio::test]
    async fn stale_proposal_approvals_do_not_combine_with_a_newer_round() {
        let ganglion = test_ganglion("239.77.1.0/24").await;
        ganglion.peer_count.store(3, Ordering::Relaxed);
        let multicast_ip: Ipv4Addr = "239.77.1.5".parse().unwrap();

        ganglion
            .handle_approval(Approval {
                instance_id: 111,
                proposal_id: 1,
                type_name: "ns.Bar".to_string(),
                multicast_ip,
            })
            .await;

        // A newer proposal id for the same type name must discard the
        // stale tally rather than letting it contribute toward quorum.
        ganglion
            .handle_approval(Approval {
                instance_id: 222,
                proposal_id: 2,
                type_name: "ns.Bar".to_string(),
                multicast_ip,
            })
            .await;
        assert!(!ganglion.synapses.read().await.contains_key("ns.Bar"));

        ganglion
            .handle_approval(Approval {
                instance_id: 333,
                proposal_id: 2,
                type_name: "ns.Bar".to_string(),
                multicast_ip,
            })
            .await;
        assert!(ganglion.synapses.read().await.contains_key("ns.Bar"));
    }
}
