//! AMF configuration
//!
//! Loaded from the `amf:` section of a YAML file. Every field has a default,
//! so a partial file (or none at all) yields a runnable test network.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ngc_nas::common::types::{PlmnId, SNssai, SecurityAlgorithms};
use serde::Deserialize;

use crate::error::{AmfError, AmfResult};

/// Top-level document: `amf:` plus whatever other NFs keep in the same file
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    amf: AmfConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmfConfig {
    pub ngap: NgapConfig,
    pub amf_name: String,
    pub relative_capacity: u8,
    pub guami: Vec<GuamiConfig>,
    pub tai: Vec<TaiConfig>,
    pub plmn_support: Vec<PlmnSupportConfig>,
    pub security: SecurityConfig,
    pub network_name: NetworkNameConfig,
    pub timers: TimersConfig,
    pub auth: AuthConfig,
    pub workers: WorkersConfig,
    /// Idle time after which a deregistered or RAN-less UE context is dropped
    pub ue_inactivity_secs: u64,
    /// Network-wide OP, hex. Used for subscribers that carry no OPc.
    pub operator_code: Option<String>,
    pub subscribers: Vec<SubscriberConfig>,
    pub policies: Vec<PolicyConfig>,
    pub upf: UpfConfig,
}

impl Default for AmfConfig {
    fn default() -> Self {
        let plmn_id = PlmnConfig { mcc: "999".into(), mnc: "70".into() };
        Self {
            ngap: NgapConfig::default(),
            amf_name: "ngc-amf0".into(),
            relative_capacity: 255,
            guami: vec![GuamiConfig { plmn_id: plmn_id.clone(), amf_id: AmfIdConfig { region: 2, set: 1, pointer: 0 } }],
            tai: vec![TaiConfig { plmn_id: plmn_id.clone(), tac: 1 }],
            plmn_support: vec![PlmnSupportConfig { plmn_id, s_nssai: vec![SliceConfig { sst: 1, sd: None }] }],
            security: SecurityConfig::default(),
            network_name: NetworkNameConfig::default(),
            timers: TimersConfig::default(),
            auth: AuthConfig::default(),
            workers: WorkersConfig::default(),
            ue_inactivity_secs: 3600,
            operator_code: None,
            subscribers: Vec::new(),
            policies: vec![PolicyConfig::default()],
            upf: UpfConfig::default(),
        }
    }
}

impl AmfConfig {
    /// Read and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> AmfResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AmfError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> AmfResult<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(text).map_err(|e| AmfError::Config(format!("invalid YAML: {}", e)))?;
        file.amf.validate()?;
        Ok(file.amf)
    }

    /// Reject anything that would only fail later, at first use
    pub fn validate(&self) -> AmfResult<()> {
        if self.guami.is_empty() {
            return Err(AmfError::Config("at least one GUAMI is required".into()));
        }
        if self.tai.is_empty() {
            return Err(AmfError::Config("at least one TAI is required".into()));
        }
        for guami in &self.guami {
            guami.plmn_id.to_plmn()?;
            if guami.amf_id.set > 0x3ff || guami.amf_id.pointer > 0x3f {
                return Err(AmfError::Config(format!(
                    "AMF set {} / pointer {} out of range",
                    guami.amf_id.set, guami.amf_id.pointer
                )));
            }
        }
        for tai in &self.tai {
            tai.plmn_id.to_plmn()?;
            if tai.tac > 0xff_ffff {
                return Err(AmfError::Config(format!("TAC {} exceeds 24 bits", tai.tac)));
            }
        }
        for support in &self.plmn_support {
            support.plmn_id.to_plmn()?;
            for slice in &support.s_nssai {
                slice.to_snssai()?;
            }
        }
        self.security.integrity_algorithms()?;
        self.security.ciphering_algorithms()?;
        if self.workers.pool_size == 0 || self.workers.queue_depth == 0 {
            return Err(AmfError::Config("worker pool size and queue depth must be non-zero".into()));
        }
        if let Some(op) = &self.operator_code {
            parse_key(op, "operator_code")?;
        }
        for subscriber in &self.subscribers {
            subscriber.validate()?;
            if !self.policies.iter().any(|p| p.id == subscriber.policy) {
                return Err(AmfError::Config(format!(
                    "subscriber {} refers to unknown policy '{}'",
                    subscriber.imsi, subscriber.policy
                )));
            }
        }
        self.upf.ue_pool()?;
        Ok(())
    }

    pub fn ngap_addr(&self) -> AmfResult<SocketAddr> {
        let ip: IpAddr = self
            .ngap
            .addr
            .parse()
            .map_err(|_| AmfError::Config(format!("invalid NGAP address '{}'", self.ngap.addr)))?;
        Ok(SocketAddr::new(ip, self.ngap.port))
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NgapConfig {
    pub addr: String,
    pub port: u16,
    pub outbound_streams: u16,
    pub inbound_streams: u16,
}

impl Default for NgapConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".into(),
            port: ngc_sctp::NGAP_PORT,
            outbound_streams: ngc_sctp::DEFAULT_NUM_STREAMS,
            inbound_streams: ngc_sctp::DEFAULT_NUM_STREAMS,
        }
    }
}

/// MCC/MNC as digit strings; quote them in YAML so "01" keeps its zero
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlmnConfig {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnConfig {
    pub fn to_plmn(&self) -> AmfResult<PlmnId> {
        PlmnId::from_digits(&self.mcc, &self.mnc)
            .map_err(|e| AmfError::Config(format!("invalid PLMN {}/{}: {}", self.mcc, self.mnc, e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmfIdConfig {
    pub region: u8,
    pub set: u16,
    pub pointer: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuamiConfig {
    pub plmn_id: PlmnConfig,
    pub amf_id: AmfIdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaiConfig {
    pub plmn_id: PlmnConfig,
    pub tac: u32,
}

impl TaiConfig {
    pub fn tac_bytes(&self) -> [u8; 3] {
        tac_to_bytes(self.tac)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SliceConfig {
    pub sst: u8,
    /// Slice differentiator, six hex digits
    #[serde(default)]
    pub sd: Option<String>,
}

impl SliceConfig {
    pub fn to_snssai(&self) -> AmfResult<SNssai> {
        match &self.sd {
            None => Ok(SNssai::new(self.sst)),
            Some(sd) => {
                let bytes = parse_hex(sd)?;
                let sd: [u8; 3] = bytes
                    .try_into()
                    .map_err(|_| AmfError::Config(format!("slice differentiator '{}' must be 3 bytes", sd)))?;
                Ok(SNssai::with_sd(self.sst, sd))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlmnSupportConfig {
    pub plmn_id: PlmnConfig,
    #[serde(default)]
    pub s_nssai: Vec<SliceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub integrity_order: Vec<String>,
    pub ciphering_order: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            integrity_order: vec!["NIA2".into(), "NIA0".into()],
            ciphering_order: vec!["NEA0".into(), "NEA2".into()],
        }
    }
}

impl SecurityConfig {
    /// Preference-ordered integrity algorithm identifiers
    pub fn integrity_algorithms(&self) -> AmfResult<Vec<u8>> {
        self.integrity_order.iter().map(|name| parse_algorithm(name, "NIA")).collect()
    }

    /// Preference-ordered ciphering algorithm identifiers
    pub fn ciphering_algorithms(&self) -> AmfResult<Vec<u8>> {
        self.ciphering_order.iter().map(|name| parse_algorithm(name, "NEA")).collect()
    }
}

/// Only the null and AES-based algorithms are implemented
fn parse_algorithm(name: &str, prefix: &str) -> AmfResult<u8> {
    let id = name
        .strip_prefix(prefix)
        .and_then(|n| n.parse::<u8>().ok())
        .ok_or_else(|| AmfError::Config(format!("unknown {} algorithm '{}'", prefix, name)))?;
    match id {
        SecurityAlgorithms::NIA0 | SecurityAlgorithms::NIA2 => Ok(id),
        _ => Err(AmfError::Config(format!("{} is not supported", name))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkNameConfig {
    pub full: String,
    pub short: Option<String>,
}

impl Default for NetworkNameConfig {
    fn default() -> Self {
        Self { full: "NextGCore".into(), short: None }
    }
}

/// One NAS timer: how long to wait and how many retransmissions to try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimerConfig {
    pub duration_ms: u64,
    pub max_count: u32,
}

impl TimerConfig {
    pub const fn new(duration_ms: u64, max_count: u32) -> Self {
        Self { duration_ms, max_count }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimersConfig {
    pub t3513: TimerConfig,
    pub t3522: TimerConfig,
    pub t3550: TimerConfig,
    pub t3560: TimerConfig,
    pub t3570: TimerConfig,
    pub ng_holding: TimerConfig,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            t3513: TimerConfig::new(2_000, 2),
            t3522: TimerConfig::new(3_000, 4),
            t3550: TimerConfig::new(6_000, 4),
            t3560: TimerConfig::new(6_000, 4),
            t3570: TimerConfig::new(6_000, 4),
            ng_holding: TimerConfig::new(30_000, 0),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// RES* mismatches tolerated before Authentication Reject; 0 rejects on the first
    pub max_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub pool_size: usize,
    /// Pending jobs allowed per UE before new work is refused
    pub queue_depth: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { pool_size: 4, queue_depth: 64 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    pub imsi: String,
    pub k: String,
    #[serde(default)]
    pub opc: Option<String>,
    #[serde(default)]
    pub sqn: u64,
    #[serde(default = "default_auth_amf")]
    pub amf: String,
    #[serde(default = "default_policy_id")]
    pub policy: String,
    /// Subscribed slices; empty means every slice the AMF supports
    #[serde(default)]
    pub s_nssai: Vec<SliceConfig>,
}

fn default_auth_amf() -> String {
    "8000".into()
}

fn default_policy_id() -> String {
    "default".into()
}

impl SubscriberConfig {
    fn validate(&self) -> AmfResult<()> {
        if self.imsi.len() < 6 || self.imsi.len() > 15 || !self.imsi.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmfError::Config(format!("invalid IMSI '{}'", self.imsi)));
        }
        parse_key(&self.k, "k")?;
        if let Some(opc) = &self.opc {
            parse_key(opc, "opc")?;
        }
        self.authentication_amf()?;
        if self.sqn > 0xffff_ffff_ffff {
            return Err(AmfError::Config(format!("SQN of {} exceeds 48 bits", self.imsi)));
        }
        for slice in &self.s_nssai {
            slice.to_snssai()?;
        }
        Ok(())
    }

    pub fn authentication_amf(&self) -> AmfResult<[u8; 2]> {
        parse_hex(&self.amf)?
            .try_into()
            .map_err(|_| AmfError::Config(format!("authentication AMF '{}' must be 2 bytes", self.amf)))
    }

    pub fn sqn_bytes(&self) -> [u8; 6] {
        let be = self.sqn.to_be_bytes();
        let mut sqn = [0u8; 6];
        sqn.copy_from_slice(&be[2..]);
        sqn
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub id: String,
    pub dnn: String,
    pub uplink_bps: u64,
    pub downlink_bps: u64,
    /// 5QI of the default QoS flow
    pub qos_class: u8,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            id: default_policy_id(),
            dnn: "internet".into(),
            uplink_bps: 1_000_000_000,
            downlink_bps: 1_000_000_000,
            qos_class: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpfConfig {
    /// UE address pool in CIDR notation
    pub ue_pool: String,
    pub gtpu_addr: Ipv4Addr,
    pub dnn: Vec<String>,
}

impl Default for UpfConfig {
    fn default() -> Self {
        Self {
            ue_pool: "10.45.0.0/16".into(),
            gtpu_addr: Ipv4Addr::new(127, 0, 0, 7),
            dnn: vec!["internet".into()],
        }
    }
}

impl UpfConfig {
    pub fn ue_pool(&self) -> AmfResult<(Ipv4Addr, u8)> {
        let (addr, prefix) = self
            .ue_pool
            .split_once('/')
            .ok_or_else(|| AmfError::Config(format!("UE pool '{}' is not CIDR", self.ue_pool)))?;
        let addr: Ipv4Addr =
            addr.parse().map_err(|_| AmfError::Config(format!("invalid UE pool address '{}'", addr)))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| (8..=30).contains(p))
            .ok_or_else(|| AmfError::Config(format!("UE pool prefix '{}' must be 8..=30", prefix)))?;
        Ok((addr, prefix))
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn tac_to_bytes(tac: u32) -> [u8; 3] {
    let be = tac.to_be_bytes();
    [be[1], be[2], be[3]]
}

pub fn parse_hex(text: &str) -> AmfResult<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(AmfError::Config(format!("odd-length hex string '{}'", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| AmfError::Config(format!("invalid hex string '{}'", text)))
        })
        .collect()
}

/// Parse a 128-bit key; anything else is unusable key material
pub fn parse_key(text: &str, field: &str) -> AmfResult<[u8; 16]> {
    let bytes = parse_hex(text).map_err(|_| AmfError::InvalidKeyMaterial(format!("{} is not hex", field)))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| AmfError::InvalidKeyMaterial(format!("{} must be 16 bytes, got {}", field, len)))
}
