//! RAN node registry
//!
//! One entry per association that completed NG Setup. The registry is keyed
//! by [`ConnectionHandle`]; UE contexts refer to their serving RAN by handle
//! and identity, never by a pointer into this map.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use ngc_nas::common::types::PlmnId;
use ngc_ngap::{GlobalRanNodeId, PagingDrx, SupportedTaItem, Tai};

use crate::transport::ConnectionHandle;
use crate::{read_lock, write_lock};

/// A gNB (or ng-eNB) that completed NG Setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RanContext {
    pub handle: ConnectionHandle,
    pub global_ran_node_id: GlobalRanNodeId,
    pub name: Option<String>,
    pub address: SocketAddr,
    pub supported_ta_list: Vec<SupportedTaItem>,
    pub default_paging_drx: PagingDrx,
}

impl RanContext {
    /// Name for log lines: the RAN node name when it sent one
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.identifier())
    }

    /// Stable textual form of the global RAN node ID
    pub fn identifier(&self) -> String {
        ran_identifier(&self.global_ran_node_id)
    }

    /// True when any broadcast PLMN of any supported TA matches `tai`
    pub fn serves(&self, tai: &Tai) -> bool {
        self.supported_ta_list.iter().any(|ta| {
            ta.tac == tai.tac && ta.broadcast_plmn_list.iter().any(|p| p.plmn_identity == tai.plmn_identity)
        })
    }
}

pub fn ran_identifier(id: &GlobalRanNodeId) -> String {
    match id {
        GlobalRanNodeId::GlobalGnbId { plmn_identity, gnb_id, .. } => {
            format!("gnb-{:06x}@{}", gnb_id, PlmnId::from_bytes(*plmn_identity))
        }
        GlobalRanNodeId::GlobalNgEnbId { plmn_identity, ng_enb_id } => {
            format!("ngenb-{:05x}@{}", ng_enb_id, PlmnId::from_bytes(*plmn_identity))
        }
    }
}

/// Point-in-time view of the registry. Iterating it does not touch the
/// registry, so it can be walked any number of times.
#[derive(Debug, Clone, Default)]
pub struct RanSnapshot {
    entries: Vec<Arc<RanContext>>,
}

impl RanSnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &RanContext> + '_ {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// RAN contexts by association
#[derive(Debug, Default)]
pub struct RanRegistry {
    entries: RwLock<HashMap<ConnectionHandle, Arc<RanContext>>>,
}

impl RanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the context for its connection; returns the previous one
    pub fn upsert(&self, ran: RanContext) -> Option<Arc<RanContext>> {
        let mut entries = write_lock(&self.entries);
        if let Some(other) = entries
            .values()
            .find(|r| r.handle != ran.handle && r.global_ran_node_id == ran.global_ran_node_id)
        {
            log::warn!("[{}] RAN identity also in use on {}", ran.identifier(), other.handle);
        }
        entries.insert(ran.handle, Arc::new(ran))
    }

    /// Drop the context of a connection; removing twice is harmless
    pub fn remove(&self, handle: ConnectionHandle) -> Option<Arc<RanContext>> {
        write_lock(&self.entries).remove(&handle)
    }

    pub fn get(&self, handle: ConnectionHandle) -> Option<Arc<RanContext>> {
        read_lock(&self.entries).get(&handle).cloned()
    }

    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        read_lock(&self.entries).contains_key(&handle)
    }

    /// True while `handle` is registered under `identity`
    pub fn is_live(&self, handle: ConnectionHandle, identity: &GlobalRanNodeId) -> bool {
        read_lock(&self.entries)
            .get(&handle)
            .map(|r| r.global_ran_node_id == *identity)
            .unwrap_or(false)
    }

    pub fn list(&self) -> RanSnapshot {
        let mut entries: Vec<_> = read_lock(&self.entries).values().cloned().collect();
        entries.sort_by_key(|r| r.handle);
        RanSnapshot { entries }
    }

    pub fn find_by_identity(&self, identity: &GlobalRanNodeId) -> Option<Arc<RanContext>> {
        read_lock(&self.entries).values().find(|r| r.global_ran_node_id == *identity).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<RanContext>> {
        read_lock(&self.entries).values().find(|r| r.name.as_deref() == Some(name)).cloned()
    }

    /// Every RAN whose supported TAs include `tai`
    pub fn serving(&self, tai: &Tai) -> Vec<Arc<RanContext>> {
        let mut rans: Vec<_> = read_lock(&self.entries).values().filter(|r| r.serves(tai)).cloned().collect();
        rans.sort_by_key(|r| r.handle);
        rans
    }

    /// Run `commit` only if every handle is still registered, with removals
    /// held off until it returns.
    pub fn commit_if_live<R>(&self, handles: &[ConnectionHandle], commit: impl FnOnce() -> R) -> Option<R> {
        let entries = read_lock(&self.entries);
        if handles.iter().all(|h| entries.contains_key(h)) {
            Some(commit())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
