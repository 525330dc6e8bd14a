//! User plane control
//!
//! PDU session user plane resources are reserved through [`UpfControl`].
//! [`PoolUpf`] stands in for a UPF reached over N4: it hands out UE
//! addresses from a configured pool and uplink tunnel endpoints on a fixed
//! GTP-U address.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use crate::config::UpfConfig;
use crate::error::{AmfError, AmfResult};
use crate::subscriber::Policy;

/// User plane resources reserved for one PDU session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpfSession {
    pub handle: u64,
    pub ue_address: Ipv4Addr,
    /// Uplink N3 endpoint the gNB sends to
    pub upf_address: Ipv4Addr,
    pub ul_teid: u32,
}

pub trait UpfControl: Send + Sync {
    fn establish_session(&self, supi: &str, dnn: &str, policy: &Policy) -> AmfResult<UpfSession>;

    /// Release by handle; unknown handles are not an error
    fn release_session(&self, handle: u64) -> AmfResult<()>;
}

#[derive(Debug)]
struct PoolState {
    next_handle: u64,
    next_host: u32,
    allocated: HashSet<u32>,
    sessions: BTreeMap<u64, u32>,
}

/// Address-pool backed user plane
#[derive(Debug)]
pub struct PoolUpf {
    network: u32,
    host_count: u32,
    gtpu_address: Ipv4Addr,
    dnns: Vec<String>,
    state: Mutex<PoolState>,
}

impl PoolUpf {
    /// `prefix` must leave at least two usable hosts; .1 is kept for the gateway
    pub fn new(network: Ipv4Addr, prefix: u8, gtpu_address: Ipv4Addr, dnns: Vec<String>) -> Self {
        let prefix = prefix.clamp(8, 30);
        let mask = u32::MAX << (32 - u32::from(prefix));
        let host_count = !mask - 1;
        Self {
            network: u32::from(network) & mask,
            host_count,
            gtpu_address,
            dnns,
            state: Mutex::new(PoolState {
                next_handle: 1,
                next_host: 2,
                allocated: HashSet::new(),
                sessions: BTreeMap::new(),
            }),
        }
    }

    pub fn from_config(config: &UpfConfig) -> AmfResult<Self> {
        let (network, prefix) = config.ue_pool()?;
        Ok(Self::new(network, prefix, config.gtpu_addr, config.dnn.clone()))
    }

    pub fn active_sessions(&self) -> usize {
        self.state.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }
}

impl UpfControl for PoolUpf {
    fn establish_session(&self, supi: &str, dnn: &str, policy: &Policy) -> AmfResult<UpfSession> {
        if !self.dnns.iter().any(|d| d == dnn) {
            return Err(AmfError::ConfigurationRejected(format!("DNN '{}' is not served", dnn)));
        }
        let mut state = self.state.lock().map_err(|_| AmfError::ResourceExhausted("UPF state poisoned".into()))?;

        // hosts 2..=host_count; .1 is the gateway
        let usable = self.host_count.saturating_sub(1);
        if state.allocated.len() as u32 >= usable {
            return Err(AmfError::ResourceExhausted(format!("UE address pool for '{}' is exhausted", dnn)));
        }
        let mut host = state.next_host;
        while state.allocated.contains(&host) {
            host = if host >= self.host_count { 2 } else { host + 1 };
        }
        state.next_host = if host >= self.host_count { 2 } else { host + 1 };
        state.allocated.insert(host);

        let handle = state.next_handle;
        state.next_handle += 1;
        state.sessions.insert(handle, host);

        let session = UpfSession {
            handle,
            ue_address: Ipv4Addr::from(self.network + host),
            upf_address: self.gtpu_address,
            ul_teid: handle as u32,
        };
        log::debug!(
            "[{}] UPF session {} on '{}': UE {} (5QI {})",
            supi,
            handle,
            dnn,
            session.ue_address,
            policy.qos_class
        );
        Ok(session)
    }

    fn release_session(&self, handle: u64) -> AmfResult<()> {
        let mut state = self.state.lock().map_err(|_| AmfError::ResourceExhausted("UPF state poisoned".into()))?;
        if let Some(host) = state.sessions.remove(&handle) {
            state.allocated.remove(&host);
            log::debug!("UPF session {} released", handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            id: "default".into(),
            data_network: "internet".into(),
            uplink_bitrate: 1,
            downlink_bitrate: 1,
            qos_class: 9,
        }
    }

    fn pool(prefix: u8) -> PoolUpf {
        PoolUpf::new(Ipv4Addr::new(10, 45, 0, 0), prefix, Ipv4Addr::new(127, 0, 0, 7), vec!["internet".into()])
    }

    #[test]
    fn test_allocates_distinct_addresses() {
        let upf = pool(24);
        let a = upf.establish_session("imsi-1", "internet", &policy()).unwrap();
        let b = upf.establish_session("imsi-2", "internet", &policy()).unwrap();
        assert_eq!(a.ue_address, Ipv4Addr::new(10, 45, 0, 2));
        assert_eq!(b.ue_address, Ipv4Addr::new(10, 45, 0, 3));
        assert_ne!(a.ul_teid, b.ul_teid);
        assert_eq!(upf.active_sessions(), 2);
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        // /30: hosts .1 and .2, .1 reserved
        let upf = pool(30);
        let first = upf.establish_session("imsi-1", "internet", &policy()).unwrap();
        assert!(matches!(
            upf.establish_session("imsi-2", "internet", &policy()),
            Err(AmfError::ResourceExhausted(_))
        ));
        upf.release_session(first.handle).unwrap();
        let again = upf.establish_session("imsi-2", "internet", &policy()).unwrap();
        assert_eq!(again.ue_address, first.ue_address);
    }

    #[test]
    fn test_unknown_dnn_is_rejected() {
        let upf = pool(24);
        assert!(matches!(
            upf.establish_session("imsi-1", "ims", &policy()),
            Err(AmfError::ConfigurationRejected(_))
        ));
    }

    #[test]
    fn test_release_unknown_handle() {
        let upf = pool(24);
        assert!(upf.release_session(99).is_ok());
    }
}
