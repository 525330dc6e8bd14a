//! Reporting views for the administrative surface
//!
//! Read-only summaries of the RAN registry and UE store. They are built from
//! snapshots, so walking them never holds a registry lock.

use std::net::SocketAddr;

use ngc_nas::common::types::PlmnId;
use ngc_ngap::GlobalRanNodeId;

use crate::context::AmfContext;
use crate::gmm_sm::GmmState;
use crate::ran::{RanContext, RanSnapshot};

/// One connected RAN node as reported to operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RanSummary {
    pub name: Option<String>,
    pub identifier: String,
    pub address: SocketAddr,
    /// `<mcc>/<mnc>:<tac>` per broadcast PLMN of each supported TA
    pub supported_tracking_areas: Vec<String>,
}

impl From<&RanContext> for RanSummary {
    fn from(ran: &RanContext) -> Self {
        let mut supported_tracking_areas = Vec::new();
        for ta in &ran.supported_ta_list {
            let tac = u32::from_be_bytes([0, ta.tac[0], ta.tac[1], ta.tac[2]]);
            for plmn in &ta.broadcast_plmn_list {
                supported_tracking_areas.push(format!("{}:{:06x}", PlmnId::from_bytes(plmn.plmn_identity), tac));
            }
        }
        Self {
            name: ran.name.clone(),
            identifier: ran.identifier(),
            address: ran.address,
            supported_tracking_areas,
        }
    }
}

/// Snapshot of the RAN registry. Each call to [`RanSummaries::iter`]
/// starts over and yields the same entries.
#[derive(Debug, Clone)]
pub struct RanSummaries {
    snapshot: RanSnapshot,
}

impl RanSummaries {
    pub fn iter(&self) -> impl Iterator<Item = RanSummary> + '_ {
        self.snapshot.iter().map(RanSummary::from)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeSummary {
    pub amf_ue_ngap_id: u64,
    pub supi: Option<String>,
    pub state: GmmState,
    pub ran_ue_ngap_id: Option<u32>,
    pub pdu_sessions: usize,
}

impl AmfContext {
    pub fn list_ran_contexts(&self) -> RanSummaries {
        RanSummaries { snapshot: self.ran.list() }
    }

    pub fn find_ran_by_identity(&self, identity: &GlobalRanNodeId) -> Option<RanSummary> {
        self.ran.find_by_identity(identity).map(|ran| RanSummary::from(ran.as_ref()))
    }

    pub fn find_ran_by_name(&self, name: &str) -> Option<RanSummary> {
        self.ran.find_by_name(name).map(|ran| RanSummary::from(ran.as_ref()))
    }

    /// UE contexts ordered by AMF UE NGAP ID
    pub async fn ue_summaries(&self) -> Vec<UeSummary> {
        let mut summaries = Vec::new();
        for (_, handle) in self.ues.handles() {
            let ue = handle.lock().await;
            summaries.push(UeSummary {
                amf_ue_ngap_id: ue.amf_ue_ngap_id,
                supi: ue.supi.clone(),
                state: ue.state(),
                ran_ue_ngap_id: ue.ran_ue_ngap_id(),
                pdu_sessions: ue.sessions.len(),
            });
        }
        summaries
    }
}
