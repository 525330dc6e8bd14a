//! Subscriber data
//!
//! The AMF reads authentication credentials and policy through the
//! [`SubscriberStore`] trait. [`MemorySubscriberStore`] is filled from the
//! `subscribers:` and `policies:` sections of the configuration.

use std::collections::HashMap;
use std::sync::RwLock;

use ngc_crypt::milenage;
use ngc_nas::common::types::SNssai;

use crate::config::{parse_key, AmfConfig};
use crate::error::{AmfError, AmfResult};
use crate::{read_lock, write_lock};

/// Credentials and subscription of one IMSI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberRecord {
    /// IMSI digits, without the `imsi-` prefix
    pub imsi: String,
    pub permanent_key: [u8; 16],
    pub opc: Option<[u8; 16]>,
    /// Last SQN used towards this subscriber
    pub sequence_number: [u8; 6],
    pub authentication_amf: [u8; 2],
    pub policy_id: String,
    /// Subscribed slices; empty means every slice the AMF supports
    pub s_nssai: Vec<SNssai>,
}

impl SubscriberRecord {
    pub fn supi(&self) -> String {
        format!("imsi-{}", self.imsi)
    }
}

/// Session policy applied to every PDU session of a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub id: String,
    pub data_network: String,
    pub uplink_bitrate: u64,
    pub downlink_bitrate: u64,
    /// 5QI of the default QoS flow
    pub qos_class: u8,
}

pub trait SubscriberStore: Send + Sync {
    /// Look up by IMSI, with or without the `imsi-` prefix
    fn subscriber_by_identity(&self, imsi: &str) -> AmfResult<SubscriberRecord>;

    /// Network-wide OP for records that carry no OPc
    fn operator_code(&self) -> Option<[u8; 16]>;

    fn policy(&self, id: &str) -> AmfResult<Policy>;

    /// Persist the SQN recovered on resync
    fn update_sequence_number(&self, imsi: &str, sqn: [u8; 6]) -> AmfResult<()>;

    /// Advance the subscriber's SQN and return the record carrying it.
    /// Concurrent callers never receive the same SQN.
    fn next_sqn(&self, imsi: &str) -> AmfResult<SubscriberRecord>;
}

fn imsi_digits(identity: &str) -> &str {
    identity.strip_prefix("imsi-").unwrap_or(identity)
}

/// Subscriber store held in memory
#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    operator_code: Option<[u8; 16]>,
    subscribers: RwLock<HashMap<String, SubscriberRecord>>,
    policies: RwLock<HashMap<String, Policy>>,
}

impl MemorySubscriberStore {
    pub fn new(operator_code: Option<[u8; 16]>) -> Self {
        Self { operator_code, ..Self::default() }
    }

    pub fn from_config(config: &AmfConfig) -> AmfResult<Self> {
        let operator_code = config.operator_code.as_deref().map(|op| parse_key(op, "operator_code")).transpose()?;
        let store = Self::new(operator_code);
        for policy in &config.policies {
            store.insert_policy(Policy {
                id: policy.id.clone(),
                data_network: policy.dnn.clone(),
                uplink_bitrate: policy.uplink_bps,
                downlink_bitrate: policy.downlink_bps,
                qos_class: policy.qos_class,
            });
        }
        for subscriber in &config.subscribers {
            let s_nssai = subscriber.s_nssai.iter().map(|s| s.to_snssai()).collect::<AmfResult<Vec<_>>>()?;
            store.insert(SubscriberRecord {
                imsi: subscriber.imsi.clone(),
                permanent_key: parse_key(&subscriber.k, "k")?,
                opc: subscriber.opc.as_deref().map(|opc| parse_key(opc, "opc")).transpose()?,
                sequence_number: subscriber.sqn_bytes(),
                authentication_amf: subscriber.authentication_amf()?,
                policy_id: subscriber.policy.clone(),
                s_nssai,
            });
        }
        log::info!("{} subscriber(s), {} policy(ies) loaded", store.len(), read_lock(&store.policies).len());
        Ok(store)
    }

    pub fn insert(&self, record: SubscriberRecord) {
        write_lock(&self.subscribers).insert(record.imsi.clone(), record);
    }

    pub fn insert_policy(&self, policy: Policy) {
        write_lock(&self.policies).insert(policy.id.clone(), policy);
    }

    pub fn len(&self) -> usize {
        read_lock(&self.subscribers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubscriberStore for MemorySubscriberStore {
    fn subscriber_by_identity(&self, imsi: &str) -> AmfResult<SubscriberRecord> {
        read_lock(&self.subscribers)
            .get(imsi_digits(imsi))
            .cloned()
            .ok_or_else(|| AmfError::not_found(format!("subscriber {}", imsi)))
    }

    fn operator_code(&self) -> Option<[u8; 16]> {
        self.operator_code
    }

    fn policy(&self, id: &str) -> AmfResult<Policy> {
        read_lock(&self.policies)
            .get(id)
            .cloned()
            .ok_or_else(|| AmfError::not_found(format!("policy {}", id)))
    }

    fn update_sequence_number(&self, imsi: &str, sqn: [u8; 6]) -> AmfResult<()> {
        let mut subscribers = write_lock(&self.subscribers);
        let record = subscribers
            .get_mut(imsi_digits(imsi))
            .ok_or_else(|| AmfError::not_found(format!("subscriber {}", imsi)))?;
        record.sequence_number = sqn;
        Ok(())
    }

    fn next_sqn(&self, imsi: &str) -> AmfResult<SubscriberRecord> {
        let mut subscribers = write_lock(&self.subscribers);
        let record = subscribers
            .get_mut(imsi_digits(imsi))
            .ok_or_else(|| AmfError::not_found(format!("subscriber {}", imsi)))?;
        record.sequence_number = milenage::sqn_increment(&record.sequence_number);
        Ok(record.clone())
    }
}
