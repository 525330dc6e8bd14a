//! AMF Context
//!
//! The one piece of shared state of the daemon. It is built once at
//! startup and handed by reference to the transport, the NGAP layer and the
//! procedure handlers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ngc_core::{Clock, TimerSupervisor};
use ngc_crypt::kdf;
use ngc_nas::common::types::{PlmnId, SNssai};
use ngc_nas::fiveg::FiveGGuti;
use ngc_ngap::{Guami, PlmnSupportItem, Tai};

use crate::config::AmfConfig;
use crate::error::{AmfError, AmfResult};
use crate::ngap_build::to_ngap_snssai;
use crate::ran::RanRegistry;
use crate::subscriber::SubscriberStore;
use crate::timer::{TimerKey, TimerPayload};
use crate::transport::ConnectionTable;
use crate::ue::UeStore;
use crate::upf::UpfControl;

/// Frames queued per association before senders see back-pressure
const OUTBOUND_QUEUE_DEPTH: usize = 1024;

// ============================================================================
// Served network
// ============================================================================

/// Configuration in wire form: what NG Setup advertises and checks against
#[derive(Debug, Clone)]
pub struct ServedNetwork {
    pub guamis: Vec<Guami>,
    pub tais: Vec<Tai>,
    pub plmn_support: Vec<PlmnSupportItem>,
    /// Preference order, most preferred first
    pub integrity_order: Vec<u8>,
    pub ciphering_order: Vec<u8>,
    pub home_plmn: PlmnId,
    pub serving_network_name: String,
}

impl ServedNetwork {
    pub fn from_config(config: &AmfConfig) -> AmfResult<Self> {
        let mut guamis = Vec::with_capacity(config.guami.len());
        for guami in &config.guami {
            guamis.push(Guami {
                plmn_identity: guami.plmn_id.to_plmn()?.to_bytes(),
                amf_region_id: guami.amf_id.region,
                amf_set_id: guami.amf_id.set,
                amf_pointer: guami.amf_id.pointer,
            });
        }
        let mut tais = Vec::with_capacity(config.tai.len());
        for tai in &config.tai {
            tais.push(Tai { plmn_identity: tai.plmn_id.to_plmn()?.to_bytes(), tac: tai.tac_bytes() });
        }
        let mut plmn_support = Vec::with_capacity(config.plmn_support.len());
        for support in &config.plmn_support {
            let slices = support
                .s_nssai
                .iter()
                .map(|s| s.to_snssai().map(|s| to_ngap_snssai(&s)))
                .collect::<AmfResult<Vec<_>>>()?;
            plmn_support.push(PlmnSupportItem {
                plmn_identity: support.plmn_id.to_plmn()?.to_bytes(),
                slice_support_list: slices,
            });
        }

        let home = config.guami.first().ok_or_else(|| AmfError::Config("no GUAMI configured".into()))?;
        let home_plmn = home.plmn_id.to_plmn()?;
        Ok(Self {
            guamis,
            tais,
            plmn_support,
            integrity_order: config.security.integrity_algorithms()?,
            ciphering_order: config.security.ciphering_algorithms()?,
            home_plmn,
            serving_network_name: kdf::serving_network_name(&home.plmn_id.mcc, &home.plmn_id.mnc),
        })
    }

    pub fn primary_guami(&self) -> Option<&Guami> {
        self.guamis.first()
    }

    pub fn serves_tai(&self, tai: &Tai) -> bool {
        self.tais.iter().any(|t| t == tai)
    }

    /// Every slice offered in any supported PLMN
    pub fn supported_nssai(&self) -> Vec<SNssai> {
        let mut slices: Vec<SNssai> = Vec::new();
        for support in &self.plmn_support {
            for slice in &support.slice_support_list {
                let slice = SNssai { sst: slice.sst, sd: slice.sd };
                if !slices.contains(&slice) {
                    slices.push(slice);
                }
            }
        }
        slices
    }
}

// ============================================================================
// AMF Context
// ============================================================================

pub struct AmfContext {
    pub config: AmfConfig,
    pub served: ServedNetwork,
    pub ran: RanRegistry,
    pub ues: UeStore,
    pub connections: ConnectionTable,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub upf: Arc<dyn UpfControl>,
    pub timers: TimerSupervisor<TimerKey, TimerPayload>,
    pub clock: Arc<dyn Clock>,
    next_amf_ue_ngap_id: AtomicU64,
    next_tmsi: AtomicU32,
}

impl AmfContext {
    pub fn new(
        config: AmfConfig,
        subscribers: Arc<dyn SubscriberStore>,
        upf: Arc<dyn UpfControl>,
        clock: Arc<dyn Clock>,
    ) -> AmfResult<Self> {
        let served = ServedNetwork::from_config(&config)?;
        log::info!(
            "[{}] serving {} TAI(s), {} slice(s), SNN {}",
            config.amf_name,
            served.tais.len(),
            served.supported_nssai().len(),
            served.serving_network_name
        );
        Ok(Self {
            served,
            ran: RanRegistry::new(),
            ues: UeStore::new(),
            connections: ConnectionTable::new(OUTBOUND_QUEUE_DEPTH),
            subscribers,
            upf,
            timers: TimerSupervisor::new(clock.clone()),
            clock,
            next_amf_ue_ngap_id: AtomicU64::new(1),
            next_tmsi: AtomicU32::new(1),
            config,
        })
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn allocate_amf_ue_ngap_id(&self) -> u64 {
        self.next_amf_ue_ngap_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fresh 5G-GUTI under the primary GUAMI
    pub fn allocate_guti(&self) -> AmfResult<FiveGGuti> {
        let guami = self
            .served
            .primary_guami()
            .ok_or_else(|| AmfError::Config("no GUAMI configured".into()))?;
        let mut tmsi = self.next_tmsi.fetch_add(1, Ordering::Relaxed);
        if tmsi == 0 {
            tmsi = self.next_tmsi.fetch_add(1, Ordering::Relaxed);
        }
        Ok(FiveGGuti {
            plmn_id: PlmnId::from_bytes(guami.plmn_identity),
            amf_region_id: guami.amf_region_id,
            amf_set_id: guami.amf_set_id,
            amf_pointer: guami.amf_pointer,
            tmsi,
        })
    }

    /// True when a GUTI was issued by this AMF
    pub fn owns_guti(&self, guti: &FiveGGuti) -> bool {
        self.served.guamis.iter().any(|g| {
            g.plmn_identity == guti.plmn_id.to_bytes()
                && g.amf_region_id == guti.amf_region_id
                && g.amf_set_id == guti.amf_set_id
                && g.amf_pointer == guti.amf_pointer
        })
    }
}

impl std::fmt::Debug for AmfContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmfContext")
            .field("amf_name", &self.config.amf_name)
            .field("rans", &self.ran.len())
            .field("ues", &self.ues.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::MemorySubscriberStore;
    use crate::upf::PoolUpf;
    use ngc_core::FakeClock;
    use std::net::Ipv4Addr;

    fn test_context() -> AmfContext {
        let config = AmfConfig::from_yaml_str(
            r#"
amf:
  guami:
    - plmn_id: { mcc: "001", mnc: "01" }
      amf_id: { region: 2, set: 1, pointer: 0 }
  tai:
    - plmn_id: { mcc: "001", mnc: "01" }
      tac: 1
  plmn_support:
    - plmn_id: { mcc: "001", mnc: "01" }
      s_nssai:
        - { sst: 1, sd: "010203" }
        - { sst: 1, sd: "010203" }
"#,
        )
        .unwrap();
        AmfContext::new(
            config,
            Arc::new(MemorySubscriberStore::new(None)),
            Arc::new(PoolUpf::new(Ipv4Addr::new(10, 45, 0, 0), 24, Ipv4Addr::new(127, 0, 0, 7), vec![])),
            Arc::new(FakeClock::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_served_network() {
        let ctx = test_context();
        assert_eq!(ctx.served.home_plmn.to_string(), "001/01");
        assert_eq!(ctx.served.serving_network_name, "5G:mnc001.mcc001.3gppnetwork.org");
        assert!(ctx.served.serves_tai(&Tai { plmn_identity: [0x00, 0xf1, 0x10], tac: [0, 0, 1] }));
        assert!(!ctx.served.serves_tai(&Tai { plmn_identity: [0x00, 0xf1, 0x10], tac: [0, 0, 2] }));
        // duplicates collapse
        assert_eq!(ctx.served.supported_nssai(), vec![SNssai::with_sd(1, [1, 2, 3])]);
    }

    #[test]
    fn test_id_allocation() {
        let ctx = test_context();
        let a = ctx.allocate_amf_ue_ngap_id();
        let b = ctx.allocate_amf_ue_ngap_id();
        assert_ne!(a, b);

        let guti = ctx.allocate_guti().unwrap();
        assert_eq!(guti.amf_region_id, 2);
        assert_eq!(guti.amf_set_id, 1);
        assert!(ctx.owns_guti(&guti));
        assert_ne!(guti.tmsi, ctx.allocate_guti().unwrap().tmsi);

        let foreign = FiveGGuti { amf_region_id: 9, ..guti };
        assert!(!ctx.owns_guti(&foreign));
    }
}
