//! UE contexts
//!
//! One [`UeContext`] per UE known to the AMF, each behind its own async
//! mutex so that procedures for one UE are serialized while different UEs
//! proceed independently. [`UeStore`] only indexes the contexts; its lock
//! is never held across an await.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use ngc_nas::common::types::{SNssai, UeSecurityCapability};
use ngc_nas::fiveg::FiveGGuti;
use ngc_ngap::transfer::GtpTunnel;
use ngc_ngap::{GlobalRanNodeId, Tai};

use crate::auth::AuthChallenge;
use crate::gmm_sm::{GmmFsm, GmmState};
use crate::nas_security::NasSecurityContext;
use crate::subscriber::Policy;
use crate::transport::ConnectionHandle;
use crate::{read_lock, write_lock};

pub type UeHandle = Arc<tokio::sync::Mutex<UeContext>>;

/// Lookup key of the RAN serving a UE. Must be revalidated against the
/// registry before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingRan {
    pub handle: ConnectionHandle,
    pub ran_id: GlobalRanNodeId,
    pub ran_ue_ngap_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduSessionState {
    /// User plane reserved, waiting for the RAN
    Establishing,
    Active,
    Releasing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSession {
    pub id: u8,
    pub pti: u8,
    pub state: PduSessionState,
    pub dnn: String,
    pub s_nssai: SNssai,
    pub ue_address: Ipv4Addr,
    pub upf_handle: u64,
    pub ul_tunnel: GtpTunnel,
    pub dl_tunnel: Option<GtpTunnel>,
}

/// Policy fetched at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub policy: Policy,
    pub subscribed_nssai: Vec<SNssai>,
}

#[derive(Debug)]
pub struct UeContext {
    pub amf_ue_ngap_id: u64,
    /// `imsi-<digits>`
    pub supi: Option<String>,
    pub guti: Option<FiveGGuti>,
    pub fsm: GmmFsm,
    pub serving_ran: Option<ServingRan>,
    /// Association that last served the UE, kept after it is detached
    pub last_ran: Option<ConnectionHandle>,
    pub last_tai: Option<Tai>,

    pub ue_security_capability: Option<UeSecurityCapability>,
    pub requested_nssai: Vec<SNssai>,
    pub allowed_nssai: Vec<SNssai>,

    /// Outstanding 5G-AKA challenge; dropped once answered
    pub auth: Option<AuthChallenge>,
    pub auth_failures: u32,
    pub resynced: bool,
    pub ngksi: u8,
    pub security: Option<NasSecurityContext>,
    pub kgnb: Option<[u8; 32]>,
    pub nh: Option<[u8; 32]>,
    pub ncc: u8,

    pub subscription: Option<Subscription>,
    pub sessions: BTreeMap<u8, PduSession>,
    pub last_activity: Instant,
}

impl UeContext {
    pub fn new(amf_ue_ngap_id: u64, now: Instant) -> Self {
        Self {
            amf_ue_ngap_id,
            supi: None,
            guti: None,
            fsm: GmmFsm::new(amf_ue_ngap_id),
            serving_ran: None,
            last_ran: None,
            last_tai: None,
            ue_security_capability: None,
            requested_nssai: Vec::new(),
            allowed_nssai: Vec::new(),
            auth: None,
            auth_failures: 0,
            resynced: false,
            ngksi: 0,
            security: None,
            kgnb: None,
            nh: None,
            ncc: 0,
            subscription: None,
            sessions: BTreeMap::new(),
            last_activity: now,
        }
    }

    pub fn state(&self) -> GmmState {
        self.fsm.state
    }

    /// SUPI when known, else the AMF UE NGAP ID
    pub fn label(&self) -> String {
        match &self.supi {
            Some(supi) => supi.clone(),
            None => format!("amf-ue-{}", self.amf_ue_ngap_id),
        }
    }

    pub fn ran_ue_ngap_id(&self) -> Option<u32> {
        self.serving_ran.map(|r| r.ran_ue_ngap_id)
    }

    pub fn attach_ran(&mut self, serving: ServingRan) {
        self.last_ran = Some(serving.handle);
        self.serving_ran = Some(serving);
    }

    /// Drop the RAN key; the association is remembered for error reporting
    pub fn detach_ran(&mut self) -> Option<ServingRan> {
        let serving = self.serving_ran.take();
        if let Some(serving) = serving {
            self.last_ran = Some(serving.handle);
        }
        serving
    }

    /// Forget everything bound to the current registration attempt
    pub fn reset_security(&mut self) {
        self.auth = None;
        self.resynced = false;
        self.security = None;
        self.kgnb = None;
        self.nh = None;
        self.ncc = 0;
    }

    /// State once the last PDU session changed
    pub fn session_state(&self) -> GmmState {
        if self.sessions.values().any(|s| s.state == PduSessionState::Establishing) {
            GmmState::PduSessionEstablishing
        } else if self.sessions.values().any(|s| s.state == PduSessionState::Active) {
            GmmState::PduSessionActive
        } else {
            GmmState::Registered
        }
    }
}

#[derive(Debug, Default)]
struct UeIndex {
    contexts: HashMap<u64, UeHandle>,
    by_supi: HashMap<String, u64>,
    by_tmsi: HashMap<u32, u64>,
}

/// UE contexts by AMF UE NGAP ID, with SUPI and 5G-TMSI indices
#[derive(Debug, Default)]
pub struct UeStore {
    index: RwLock<UeIndex>,
}

impl UeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ue: UeContext) -> UeHandle {
        let id = ue.amf_ue_ngap_id;
        let handle = Arc::new(tokio::sync::Mutex::new(ue));
        write_lock(&self.index).contexts.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, amf_ue_ngap_id: u64) -> Option<UeHandle> {
        read_lock(&self.index).contexts.get(&amf_ue_ngap_id).cloned()
    }

    pub fn contains(&self, amf_ue_ngap_id: u64) -> bool {
        read_lock(&self.index).contexts.contains_key(&amf_ue_ngap_id)
    }

    pub fn find_by_supi(&self, supi: &str) -> Option<(u64, UeHandle)> {
        let index = read_lock(&self.index);
        let id = *index.by_supi.get(supi)?;
        index.contexts.get(&id).map(|h| (id, h.clone()))
    }

    pub fn find_by_tmsi(&self, tmsi: u32) -> Option<(u64, UeHandle)> {
        let index = read_lock(&self.index);
        let id = *index.by_tmsi.get(&tmsi)?;
        index.contexts.get(&id).map(|h| (id, h.clone()))
    }

    pub fn bind_supi(&self, supi: &str, amf_ue_ngap_id: u64) {
        write_lock(&self.index).by_supi.insert(supi.to_string(), amf_ue_ngap_id);
    }

    /// Point `tmsi` at a context, dropping any older TMSI of that context
    pub fn bind_tmsi(&self, tmsi: u32, amf_ue_ngap_id: u64) {
        let mut index = write_lock(&self.index);
        index.by_tmsi.retain(|_, id| *id != amf_ue_ngap_id);
        index.by_tmsi.insert(tmsi, amf_ue_ngap_id);
    }

    /// Move a context to a new AMF UE NGAP ID. The caller holds the
    /// context's lock and updates its own copy of the ID.
    pub fn rekey(&self, old: u64, new: u64) -> bool {
        let mut guard = write_lock(&self.index);
        let index = &mut *guard;
        let Some(handle) = index.contexts.remove(&old) else {
            return false;
        };
        index.contexts.insert(new, handle);
        for id in index.by_supi.values_mut().chain(index.by_tmsi.values_mut()) {
            if *id == old {
                *id = new;
            }
        }
        true
    }

    /// Remove a context and every index entry still pointing at it
    pub fn remove(&self, amf_ue_ngap_id: u64) -> Option<UeHandle> {
        let mut index = write_lock(&self.index);
        let handle = index.contexts.remove(&amf_ue_ngap_id)?;
        index.by_supi.retain(|_, id| *id != amf_ue_ngap_id);
        index.by_tmsi.retain(|_, id| *id != amf_ue_ngap_id);
        Some(handle)
    }

    /// Snapshot of every context, ordered by AMF UE NGAP ID
    pub fn handles(&self) -> Vec<(u64, UeHandle)> {
        let mut handles: Vec<_> = read_lock(&self.index).contexts.iter().map(|(id, h)| (*id, h.clone())).collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }

    pub fn len(&self) -> usize {
        read_lock(&self.index).contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
