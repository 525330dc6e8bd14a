//! NGAP IE Encoding/Decoding Helpers
//!
//! Functions for encoding individual Information Elements into raw APER bytes
//! suitable for ProtocolIeField values, and decoding them back. The inline
//! helpers for nested SEQUENCEs (S-NSSAI, GUAMI, TAI, ...) are shared with
//! the transfer containers in [`crate::transfer`].

use ngc_asn1c::ngap::cause::Cause;
use ngc_asn1c::ngap::ies::{
    AmfUeNgapId, NasPdu, PagingDrx, ProtocolIeContainer, ProtocolIeField, RanUeNgapId,
    RelativeAmfCapacity, ResetAll, RrcEstablishmentCause, TimeToWait, UeContextRequest,
};
use ngc_asn1c::ngap::types::{Criticality, ProtocolIeId};
use ngc_asn1c::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerError};

use crate::error::{NgapError, NgapResult};
use crate::types::*;

/// Upper bound of PrintableString names (AMFName, RANNodeName)
const MAX_NAME_LEN: usize = 150;
const MAX_TACS: usize = 256;
const MAX_BPLMNS: usize = 12;
const MAX_SLICE_ITEMS: usize = 1024;
const MAX_SERVED_GUAMIS: usize = 256;
const MAX_ALLOWED_SLICES: usize = 8;
const MAX_PDU_SESSIONS: usize = 256;
const MAX_TAI_FOR_PAGING: usize = 16;
const MAX_NG_CONNECTIONS_TO_RESET: usize = 65536;
const MAX_BIT_RATE: i64 = 4_000_000_000_000;

// ============================================================================
// IE Encoding Helpers
// ============================================================================

/// Run `f` against a fresh encoder and return the aligned bytes
pub(crate) fn encode_with<F>(f: F) -> NgapResult<Vec<u8>>
where
    F: FnOnce(&mut AperEncoder) -> NgapResult<()>,
{
    let mut encoder = AperEncoder::new();
    f(&mut encoder)?;
    encoder.align();
    Ok(encoder.into_bytes().to_vec())
}

/// Run `f` against a decoder over `raw`
pub(crate) fn decode_with<T, F>(raw: &[u8], f: F) -> NgapResult<T>
where
    F: FnOnce(&mut AperDecoder<'_>) -> NgapResult<T>,
{
    let mut decoder = AperDecoder::new(raw);
    f(&mut decoder)
}

fn push_with<F>(
    container: &mut ProtocolIeContainer,
    id: ProtocolIeId,
    criticality: Criticality,
    f: F,
) -> NgapResult<()>
where
    F: FnOnce(&mut AperEncoder) -> NgapResult<()>,
{
    container.push(ProtocolIeField {
        id,
        criticality,
        value: encode_with(f)?,
    });
    Ok(())
}

/// Create a ProtocolIeField with the given ID, criticality, and encoded value
fn make_ie_field<T: AperEncode>(
    id: ProtocolIeId,
    criticality: Criticality,
    value: &T,
) -> NgapResult<ProtocolIeField> {
    Ok(ProtocolIeField {
        id,
        criticality,
        value: encode_with(|enc| Ok(value.encode_aper(enc)?))?,
    })
}

/// Decode a value from raw APER bytes in a ProtocolIeField.value
fn decode_ie_value<T: AperDecode>(raw: &[u8]) -> NgapResult<T> {
    decode_with(raw, |dec| Ok(T::decode_aper(dec)?))
}

/// Extension bit (always clear) followed by the optional-component bitmap
pub(crate) fn write_preamble(enc: &mut AperEncoder, optionals: &[bool]) {
    enc.write_bit(false);
    for present in optionals {
        enc.write_bit(*present);
    }
}

/// Read the extension bit and `N` optional-component presence bits
pub(crate) fn read_preamble<const N: usize>(dec: &mut AperDecoder<'_>) -> NgapResult<[bool; N]> {
    if dec.read_bit()? {
        return Err(PerError::UnsupportedExtension.into());
    }
    let mut bits = [false; N];
    for bit in bits.iter_mut() {
        *bit = dec.read_bit()?;
    }
    Ok(bits)
}

/// Skip a ProtocolExtensionContainer; private extensions are not interpreted
pub(crate) fn skip_ie_extensions(dec: &mut AperDecoder<'_>) -> NgapResult<()> {
    let count = dec.decode_constrained_length(1, 65535)?;
    for _ in 0..count {
        ProtocolIeField::decode_aper(dec)?;
    }
    Ok(())
}

pub(crate) fn encode_list<T, F>(
    enc: &mut AperEncoder,
    ie_name: &'static str,
    items: &[T],
    max: usize,
    mut f: F,
) -> NgapResult<()>
where
    F: FnMut(&mut AperEncoder, &T) -> NgapResult<()>,
{
    if items.is_empty() || items.len() > max {
        return Err(NgapError::ListSize {
            ie_name,
            len: items.len(),
            min: 1,
            max,
        });
    }
    enc.encode_constrained_length(items.len(), 1, max)?;
    for item in items {
        f(enc, item)?;
    }
    Ok(())
}

pub(crate) fn decode_list<T, F>(dec: &mut AperDecoder<'_>, max: usize, mut f: F) -> NgapResult<Vec<T>>
where
    F: FnMut(&mut AperDecoder<'_>) -> NgapResult<T>,
{
    let count = dec.decode_constrained_length(1, max)?;
    let mut items = Vec::with_capacity(count.min(dec.remaining_bits() / 8 + 1));
    for _ in 0..count {
        items.push(f(dec)?);
    }
    Ok(items)
}

// ============================================================================
// Inline SEQUENCE helpers
// ============================================================================

pub(crate) fn encode_plmn(enc: &mut AperEncoder, plmn: &[u8; 3]) -> NgapResult<()> {
    Ok(enc.encode_octet_string(plmn, Some(3), Some(3))?)
}

pub(crate) fn decode_plmn(dec: &mut AperDecoder<'_>) -> NgapResult<[u8; 3]> {
    Ok(dec.decode_fixed_octets::<3>()?)
}

/// S-NSSAI ::= SEQUENCE { sST, sD OPTIONAL, iE-Extensions OPTIONAL, ... }
pub(crate) fn encode_s_nssai(enc: &mut AperEncoder, s_nssai: &SNssai) -> NgapResult<()> {
    write_preamble(enc, &[s_nssai.sd.is_some(), false]);
    enc.encode_octet_string(&[s_nssai.sst], Some(1), Some(1))?;
    if let Some(sd) = s_nssai.sd {
        enc.encode_octet_string(&sd, Some(3), Some(3))?;
    }
    Ok(())
}

pub(crate) fn decode_s_nssai(dec: &mut AperDecoder<'_>) -> NgapResult<SNssai> {
    let [sd_present, ext_present] = read_preamble::<2>(dec)?;
    let [sst] = dec.decode_fixed_octets::<1>()?;
    let sd = if sd_present {
        Some(dec.decode_fixed_octets::<3>()?)
    } else {
        None
    };
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(SNssai { sst, sd })
}

/// SliceSupportList ::= SEQUENCE (SIZE(1..1024)) OF SliceSupportItem
fn encode_slice_support_list(enc: &mut AperEncoder, slices: &[SNssai]) -> NgapResult<()> {
    encode_list(enc, "SliceSupportList", slices, MAX_SLICE_ITEMS, |enc, s| {
        write_preamble(enc, &[false]);
        encode_s_nssai(enc, s)
    })
}

fn decode_slice_support_list(dec: &mut AperDecoder<'_>) -> NgapResult<Vec<SNssai>> {
    decode_list(dec, MAX_SLICE_ITEMS, decode_s_nssai_item)
}

/// `SEQUENCE { s-NSSAI, iE-Extensions OPTIONAL, ... }`, shared by
/// SliceSupportItem and AllowedNSSAI-Item
fn decode_s_nssai_item(dec: &mut AperDecoder<'_>) -> NgapResult<SNssai> {
    let [ext_present] = read_preamble::<1>(dec)?;
    let s_nssai = decode_s_nssai(dec)?;
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(s_nssai)
}

/// GUAMI ::= SEQUENCE { pLMNIdentity, aMFRegionID, aMFSetID, aMFPointer, ... }
fn encode_guami_inline(enc: &mut AperEncoder, guami: &Guami) -> NgapResult<()> {
    write_preamble(enc, &[false]);
    encode_plmn(enc, &guami.plmn_identity)?;
    enc.encode_bit_string_u64(guami.amf_region_id as u64, 8, Some(8), Some(8))?;
    enc.encode_bit_string_u64(guami.amf_set_id as u64, 10, Some(10), Some(10))?;
    enc.encode_bit_string_u64(guami.amf_pointer as u64, 6, Some(6), Some(6))?;
    Ok(())
}

fn decode_guami_inline(dec: &mut AperDecoder<'_>) -> NgapResult<Guami> {
    let [ext_present] = read_preamble::<1>(dec)?;
    let plmn_identity = decode_plmn(dec)?;
    let (amf_region_id, _) = dec.decode_bit_string_u64(Some(8), Some(8))?;
    let (amf_set_id, _) = dec.decode_bit_string_u64(Some(10), Some(10))?;
    let (amf_pointer, _) = dec.decode_bit_string_u64(Some(6), Some(6))?;
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(Guami {
        plmn_identity,
        amf_region_id: amf_region_id as u8,
        amf_set_id: amf_set_id as u16,
        amf_pointer: amf_pointer as u8,
    })
}

/// TAI ::= SEQUENCE { pLMNIdentity, tAC, iE-Extensions OPTIONAL, ... }
pub(crate) fn encode_tai(enc: &mut AperEncoder, tai: &Tai) -> NgapResult<()> {
    write_preamble(enc, &[false]);
    encode_plmn(enc, &tai.plmn_identity)?;
    Ok(enc.encode_octet_string(&tai.tac, Some(3), Some(3))?)
}

pub(crate) fn decode_tai(dec: &mut AperDecoder<'_>) -> NgapResult<Tai> {
    let [ext_present] = read_preamble::<1>(dec)?;
    let plmn_identity = decode_plmn(dec)?;
    let tac = dec.decode_fixed_octets::<3>()?;
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(Tai { plmn_identity, tac })
}

/// BitRate ::= INTEGER (0..4000000000000, ...)
pub(crate) fn encode_bit_rate(enc: &mut AperEncoder, rate: u64) -> NgapResult<()> {
    let value = i64::try_from(rate).map_err(|_| NgapError::InvalidIeValue {
        ie_name: "BitRate",
        reason: format!("{rate} out of range"),
    })?;
    let in_root = value <= MAX_BIT_RATE;
    enc.write_bit(!in_root);
    if in_root {
        enc.encode_constrained_whole_number(value, &Constraint::new(0, MAX_BIT_RATE))?;
    } else {
        enc.encode_unconstrained_whole_number(value)?;
    }
    Ok(())
}

pub(crate) fn decode_bit_rate(dec: &mut AperDecoder<'_>) -> NgapResult<u64> {
    let value = if dec.read_bit()? {
        dec.decode_unconstrained_whole_number()?
    } else {
        dec.decode_constrained_whole_number(&Constraint::new(0, MAX_BIT_RATE))?
    };
    u64::try_from(value).map_err(|_| NgapError::InvalidIeValue {
        ie_name: "BitRate",
        reason: format!("negative value {value}"),
    })
}

/// `SEQUENCE { dL, uL, iE-Extensions OPTIONAL, ... }`, shared by
/// UEAggregateMaximumBitRate and PDUSessionAggregateMaximumBitRate
pub(crate) fn encode_bit_rates(enc: &mut AperEncoder, rates: &BitRates) -> NgapResult<()> {
    write_preamble(enc, &[false]);
    encode_bit_rate(enc, rates.dl)?;
    encode_bit_rate(enc, rates.ul)
}

pub(crate) fn decode_bit_rates(dec: &mut AperDecoder<'_>) -> NgapResult<BitRates> {
    let [ext_present] = read_preamble::<1>(dec)?;
    let dl = decode_bit_rate(dec)?;
    let ul = decode_bit_rate(dec)?;
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(BitRates { dl, ul })
}

/// Fixed 256-bit BIT STRING: octet aligned, no length
fn encode_security_key_inline(enc: &mut AperEncoder, key: &[u8; 32]) {
    enc.align();
    enc.write_bytes(key);
}

fn decode_security_key_inline(dec: &mut AperDecoder<'_>) -> NgapResult<[u8; 32]> {
    dec.align();
    Ok(dec.read_array::<32>()?)
}

/// FiveG-S-TMSI ::= SEQUENCE { aMFSetID, aMFPointer, fiveG-TMSI, ... }
fn encode_five_g_s_tmsi_inline(enc: &mut AperEncoder, tmsi: &FiveGSTmsi) -> NgapResult<()> {
    write_preamble(enc, &[false]);
    enc.encode_bit_string_u64(tmsi.amf_set_id as u64, 10, Some(10), Some(10))?;
    enc.encode_bit_string_u64(tmsi.amf_pointer as u64, 6, Some(6), Some(6))?;
    Ok(enc.encode_octet_string(&tmsi.five_g_tmsi, Some(4), Some(4))?)
}

fn decode_five_g_s_tmsi_inline(dec: &mut AperDecoder<'_>) -> NgapResult<FiveGSTmsi> {
    let [ext_present] = read_preamble::<1>(dec)?;
    let (amf_set_id, _) = dec.decode_bit_string_u64(Some(10), Some(10))?;
    let (amf_pointer, _) = dec.decode_bit_string_u64(Some(6), Some(6))?;
    let five_g_tmsi = dec.decode_fixed_octets::<4>()?;
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(FiveGSTmsi {
        amf_set_id: amf_set_id as u16,
        amf_pointer: amf_pointer as u8,
        five_g_tmsi,
    })
}

/// PDU session resource items: `{ pDUSessionID, transfer, iE-Extensions OPTIONAL, ... }`
fn encode_pdu_session_items(
    enc: &mut AperEncoder,
    ie_name: &'static str,
    items: &[PduSessionResourceItem],
) -> NgapResult<()> {
    encode_list(enc, ie_name, items, MAX_PDU_SESSIONS, |enc, item| {
        write_preamble(enc, &[false]);
        enc.encode_constrained_whole_number(item.pdu_session_id as i64, &Constraint::new(0, 255))?;
        Ok(enc.encode_octet_string(&item.transfer, None, None)?)
    })
}

fn decode_pdu_session_items(dec: &mut AperDecoder<'_>) -> NgapResult<Vec<PduSessionResourceItem>> {
    decode_list(dec, MAX_PDU_SESSIONS, |dec| {
        let [ext_present] = read_preamble::<1>(dec)?;
        let pdu_session_id = dec.decode_constrained_whole_number(&Constraint::new(0, 255))? as u8;
        let transfer = dec.decode_octet_string(None, None)?;
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(PduSessionResourceItem {
            pdu_session_id,
            transfer,
        })
    })
}

fn encode_ng_connection_list(
    enc: &mut AperEncoder,
    items: &[UeAssociatedLogicalNgConnection],
) -> NgapResult<()> {
    encode_list(
        enc,
        "UE-associatedLogicalNG-connectionList",
        items,
        MAX_NG_CONNECTIONS_TO_RESET,
        |enc, item| {
            write_preamble(
                enc,
                &[item.amf_ue_ngap_id.is_some(), item.ran_ue_ngap_id.is_some(), false],
            );
            if let Some(id) = item.amf_ue_ngap_id {
                AmfUeNgapId(id).encode_aper(enc)?;
            }
            if let Some(id) = item.ran_ue_ngap_id {
                RanUeNgapId(id).encode_aper(enc)?;
            }
            Ok(())
        },
    )
}

fn decode_ng_connection_list(
    dec: &mut AperDecoder<'_>,
) -> NgapResult<Vec<UeAssociatedLogicalNgConnection>> {
    decode_list(dec, MAX_NG_CONNECTIONS_TO_RESET, |dec| {
        let [amf_present, ran_present, ext_present] = read_preamble::<3>(dec)?;
        let amf_ue_ngap_id = if amf_present {
            Some(AmfUeNgapId::decode_aper(dec)?.0)
        } else {
            None
        };
        let ran_ue_ngap_id = if ran_present {
            Some(RanUeNgapId::decode_aper(dec)?.0)
        } else {
            None
        };
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(UeAssociatedLogicalNgConnection {
            amf_ue_ngap_id,
            ran_ue_ngap_id,
        })
    })
}

// ============================================================================
// AMF-UE-NGAP-ID / RAN-UE-NGAP-ID IEs
// ============================================================================

pub fn encode_amf_ue_ngap_id(container: &mut ProtocolIeContainer, id: u64) -> NgapResult<()> {
    encode_amf_ue_ngap_id_as(container, ProtocolIeId::AMF_UE_NGAP_ID, id)
}

/// AMF-UE-NGAP-ID under a different IE id, e.g. SourceAMF-UE-NGAP-ID
pub fn encode_amf_ue_ngap_id_as(
    container: &mut ProtocolIeContainer,
    ie_id: ProtocolIeId,
    id: u64,
) -> NgapResult<()> {
    if id > AmfUeNgapId::MAX {
        return Err(NgapError::InvalidIeValue {
            ie_name: "AMF-UE-NGAP-ID",
            reason: format!("{id} exceeds 40 bits"),
        });
    }
    container.push(make_ie_field(ie_id, Criticality::Reject, &AmfUeNgapId(id))?);
    Ok(())
}

pub fn decode_amf_ue_ngap_id(field: &ProtocolIeField) -> NgapResult<u64> {
    let id: AmfUeNgapId = decode_ie_value(&field.value)?;
    Ok(id.0)
}

pub fn encode_ran_ue_ngap_id(container: &mut ProtocolIeContainer, id: u32) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::RAN_UE_NGAP_ID,
        Criticality::Reject,
        &RanUeNgapId(id),
    )?);
    Ok(())
}

pub fn decode_ran_ue_ngap_id(field: &ProtocolIeField) -> NgapResult<u32> {
    let id: RanUeNgapId = decode_ie_value(&field.value)?;
    Ok(id.0)
}

// ============================================================================
// NAS-PDU / Cause / small scalar IEs
// ============================================================================

pub fn encode_nas_pdu(container: &mut ProtocolIeContainer, pdu: &[u8]) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::NAS_PDU,
        Criticality::Reject,
        &NasPdu(pdu.to_vec()),
    )?);
    Ok(())
}

pub fn decode_nas_pdu(field: &ProtocolIeField) -> NgapResult<Vec<u8>> {
    let pdu: NasPdu = decode_ie_value(&field.value)?;
    Ok(pdu.0)
}

pub fn encode_cause(container: &mut ProtocolIeContainer, cause: &Cause) -> NgapResult<()> {
    container.push(make_ie_field(ProtocolIeId::CAUSE, Criticality::Ignore, cause)?);
    Ok(())
}

pub fn decode_cause(field: &ProtocolIeField) -> NgapResult<Cause> {
    decode_ie_value(&field.value)
}

pub fn encode_relative_amf_capacity(
    container: &mut ProtocolIeContainer,
    capacity: u8,
) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::RELATIVE_AMF_CAPACITY,
        Criticality::Ignore,
        &RelativeAmfCapacity(capacity),
    )?);
    Ok(())
}

pub fn decode_relative_amf_capacity(field: &ProtocolIeField) -> NgapResult<u8> {
    let cap: RelativeAmfCapacity = decode_ie_value(&field.value)?;
    Ok(cap.0)
}

pub fn encode_time_to_wait(container: &mut ProtocolIeContainer, ttw: TimeToWait) -> NgapResult<()> {
    container.push(make_ie_field(ProtocolIeId::TIME_TO_WAIT, Criticality::Ignore, &ttw)?);
    Ok(())
}

pub fn decode_time_to_wait(field: &ProtocolIeField) -> NgapResult<TimeToWait> {
    decode_ie_value(&field.value)
}

pub fn encode_default_paging_drx(
    container: &mut ProtocolIeContainer,
    drx: PagingDrx,
) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::DEFAULT_PAGING_DRX,
        Criticality::Ignore,
        &drx,
    )?);
    Ok(())
}

pub fn encode_paging_drx(container: &mut ProtocolIeContainer, drx: PagingDrx) -> NgapResult<()> {
    container.push(make_ie_field(ProtocolIeId::PAGING_DRX, Criticality::Ignore, &drx)?);
    Ok(())
}

pub fn decode_paging_drx(field: &ProtocolIeField) -> NgapResult<PagingDrx> {
    decode_ie_value(&field.value)
}

pub fn encode_rrc_establishment_cause(
    container: &mut ProtocolIeContainer,
    cause: RrcEstablishmentCause,
) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::RRC_ESTABLISHMENT_CAUSE,
        Criticality::Ignore,
        &cause,
    )?);
    Ok(())
}

pub fn decode_rrc_establishment_cause(field: &ProtocolIeField) -> NgapResult<RrcEstablishmentCause> {
    decode_ie_value(&field.value)
}

pub fn encode_ue_context_request(container: &mut ProtocolIeContainer) -> NgapResult<()> {
    container.push(make_ie_field(
        ProtocolIeId::UE_CONTEXT_REQUEST,
        Criticality::Ignore,
        &UeContextRequest::Requested,
    )?);
    Ok(())
}

pub fn decode_ue_context_request(field: &ProtocolIeField) -> NgapResult<bool> {
    let value: UeContextRequest = decode_ie_value(&field.value)?;
    Ok(value == UeContextRequest::Requested)
}

// ============================================================================
// Name IEs (AMFName, RANNodeName)
// ============================================================================

fn encode_name(
    container: &mut ProtocolIeContainer,
    id: ProtocolIeId,
    name: &str,
) -> NgapResult<()> {
    push_with(container, id, Criticality::Ignore, |enc| {
        Ok(enc.encode_char_string(name, 1, MAX_NAME_LEN, true)?)
    })
}

fn decode_name(field: &ProtocolIeField) -> NgapResult<String> {
    decode_with(&field.value, |dec| {
        Ok(dec.decode_char_string(1, MAX_NAME_LEN, true)?)
    })
}

pub fn encode_amf_name(container: &mut ProtocolIeContainer, name: &str) -> NgapResult<()> {
    encode_name(container, ProtocolIeId::AMF_NAME, name)
}

pub fn decode_amf_name(field: &ProtocolIeField) -> NgapResult<String> {
    decode_name(field)
}

pub fn encode_ran_node_name(container: &mut ProtocolIeContainer, name: &str) -> NgapResult<()> {
    encode_name(container, ProtocolIeId::RAN_NODE_NAME, name)
}

pub fn decode_ran_node_name(field: &ProtocolIeField) -> NgapResult<String> {
    decode_name(field)
}

// ============================================================================
// GlobalRANNodeID IE
// ============================================================================

/// GlobalRANNodeID ::= CHOICE { globalGNB-ID, globalNgENB-ID, globalN3IWF-ID, choice-Extensions }
pub fn encode_global_ran_node_id(
    container: &mut ProtocolIeContainer,
    id: &GlobalRanNodeId,
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::GLOBAL_RAN_NODE_ID, Criticality::Reject, |enc| {
        match id {
            GlobalRanNodeId::GlobalGnbId {
                plmn_identity,
                gnb_id,
                gnb_id_len,
            } => {
                enc.encode_choice_index(0, 4, false)?;
                write_preamble(enc, &[false]);
                encode_plmn(enc, plmn_identity)?;
                // GNB-ID ::= CHOICE { gNB-ID, choice-Extensions }
                enc.encode_choice_index(0, 2, false)?;
                enc.encode_bit_string_u64(*gnb_id as u64, *gnb_id_len as usize, Some(22), Some(32))?;
            }
            GlobalRanNodeId::GlobalNgEnbId {
                plmn_identity,
                ng_enb_id,
            } => {
                enc.encode_choice_index(1, 4, false)?;
                write_preamble(enc, &[false]);
                encode_plmn(enc, plmn_identity)?;
                // NgENB-ID ::= CHOICE { macroNgENB-ID, shortMacro, longMacro, choice-Extensions }
                enc.encode_choice_index(0, 4, false)?;
                enc.encode_bit_string_u64(*ng_enb_id as u64, 20, Some(20), Some(20))?;
            }
        }
        Ok(())
    })
}

pub fn decode_global_ran_node_id(field: &ProtocolIeField) -> NgapResult<GlobalRanNodeId> {
    decode_with(&field.value, |dec| {
        let unsupported = |what: &str| NgapError::InvalidIeValue {
            ie_name: "GlobalRANNodeID",
            reason: format!("{what} not supported"),
        };
        match dec.decode_choice_index(4, false)? {
            0 => {
                let [ext_present] = read_preamble::<1>(dec)?;
                let plmn_identity = decode_plmn(dec)?;
                if dec.decode_choice_index(2, false)? != 0 {
                    return Err(unsupported("gNB-ID extension"));
                }
                let (gnb_id, len) = dec.decode_bit_string_u64(Some(22), Some(32))?;
                if ext_present {
                    skip_ie_extensions(dec)?;
                }
                Ok(GlobalRanNodeId::GlobalGnbId {
                    plmn_identity,
                    gnb_id: gnb_id as u32,
                    gnb_id_len: len as u8,
                })
            }
            1 => {
                let [ext_present] = read_preamble::<1>(dec)?;
                let plmn_identity = decode_plmn(dec)?;
                if dec.decode_choice_index(4, false)? != 0 {
                    return Err(unsupported("non-macro ngeNB-ID"));
                }
                let (ng_enb_id, _) = dec.decode_bit_string_u64(Some(20), Some(20))?;
                if ext_present {
                    skip_ie_extensions(dec)?;
                }
                Ok(GlobalRanNodeId::GlobalNgEnbId {
                    plmn_identity,
                    ng_enb_id: ng_enb_id as u32,
                })
            }
            2 => Err(unsupported("globalN3IWF-ID")),
            _ => Err(unsupported("choice extension")),
        }
    })
}

// ============================================================================
// SupportedTAList IE
// ============================================================================

pub fn encode_supported_ta_list(
    container: &mut ProtocolIeContainer,
    list: &[SupportedTaItem],
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::SUPPORTED_TA_LIST, Criticality::Reject, |enc| {
        encode_list(enc, "SupportedTAList", list, MAX_TACS, |enc, item| {
            write_preamble(enc, &[false]);
            enc.encode_octet_string(&item.tac, Some(3), Some(3))?;
            encode_list(
                enc,
                "BroadcastPLMNList",
                &item.broadcast_plmn_list,
                MAX_BPLMNS,
                |enc, bplmn| {
                    write_preamble(enc, &[false]);
                    encode_plmn(enc, &bplmn.plmn_identity)?;
                    encode_slice_support_list(enc, &bplmn.tai_slice_support_list)
                },
            )
        })
    })
}

pub fn decode_supported_ta_list(field: &ProtocolIeField) -> NgapResult<Vec<SupportedTaItem>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_TACS, |dec| {
            let [ext_present] = read_preamble::<1>(dec)?;
            let tac = dec.decode_fixed_octets::<3>()?;
            let broadcast_plmn_list = decode_list(dec, MAX_BPLMNS, |dec| {
                let [ext_present] = read_preamble::<1>(dec)?;
                let plmn_identity = decode_plmn(dec)?;
                let tai_slice_support_list = decode_slice_support_list(dec)?;
                if ext_present {
                    skip_ie_extensions(dec)?;
                }
                Ok(BroadcastPlmnItem {
                    plmn_identity,
                    tai_slice_support_list,
                })
            })?;
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(SupportedTaItem {
                tac,
                broadcast_plmn_list,
            })
        })
    })
}

// ============================================================================
// ServedGUAMIList / PLMNSupportList / GUAMI / AllowedNSSAI IEs
// ============================================================================

pub fn encode_served_guami_list(
    container: &mut ProtocolIeContainer,
    list: &[ServedGuamiItem],
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::SERVED_GUAMI_LIST, Criticality::Reject, |enc| {
        encode_list(enc, "ServedGUAMIList", list, MAX_SERVED_GUAMIS, |enc, item| {
            write_preamble(enc, &[item.backup_amf_name.is_some(), false]);
            encode_guami_inline(enc, &item.guami)?;
            if let Some(ref name) = item.backup_amf_name {
                enc.encode_char_string(name, 1, MAX_NAME_LEN, true)?;
            }
            Ok(())
        })
    })
}

pub fn decode_served_guami_list(field: &ProtocolIeField) -> NgapResult<Vec<ServedGuamiItem>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_SERVED_GUAMIS, |dec| {
            let [backup_present, ext_present] = read_preamble::<2>(dec)?;
            let guami = decode_guami_inline(dec)?;
            let backup_amf_name = if backup_present {
                Some(dec.decode_char_string(1, MAX_NAME_LEN, true)?)
            } else {
                None
            };
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(ServedGuamiItem {
                guami,
                backup_amf_name,
            })
        })
    })
}

pub fn encode_plmn_support_list(
    container: &mut ProtocolIeContainer,
    list: &[PlmnSupportItem],
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::PLMN_SUPPORT_LIST, Criticality::Reject, |enc| {
        encode_list(enc, "PLMNSupportList", list, MAX_BPLMNS, |enc, item| {
            write_preamble(enc, &[false]);
            encode_plmn(enc, &item.plmn_identity)?;
            encode_slice_support_list(enc, &item.slice_support_list)
        })
    })
}

pub fn decode_plmn_support_list(field: &ProtocolIeField) -> NgapResult<Vec<PlmnSupportItem>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_BPLMNS, |dec| {
            let [ext_present] = read_preamble::<1>(dec)?;
            let plmn_identity = decode_plmn(dec)?;
            let slice_support_list = decode_slice_support_list(dec)?;
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(PlmnSupportItem {
                plmn_identity,
                slice_support_list,
            })
        })
    })
}

pub fn encode_guami(container: &mut ProtocolIeContainer, guami: &Guami) -> NgapResult<()> {
    push_with(container, ProtocolIeId::GUAMI, Criticality::Reject, |enc| {
        encode_guami_inline(enc, guami)
    })
}

pub fn decode_guami(field: &ProtocolIeField) -> NgapResult<Guami> {
    decode_with(&field.value, decode_guami_inline)
}

pub fn encode_allowed_nssai(
    container: &mut ProtocolIeContainer,
    slices: &[SNssai],
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::ALLOWED_NSSAI, Criticality::Reject, |enc| {
        encode_list(enc, "AllowedNSSAI", slices, MAX_ALLOWED_SLICES, |enc, s| {
            write_preamble(enc, &[false]);
            encode_s_nssai(enc, s)
        })
    })
}

pub fn decode_allowed_nssai(field: &ProtocolIeField) -> NgapResult<Vec<SNssai>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_ALLOWED_SLICES, decode_s_nssai_item)
    })
}

// ============================================================================
// UserLocationInformation IE
// ============================================================================

/// UserLocationInformation ::= CHOICE { eUTRA, nR, n3IWF, choice-Extensions }
pub fn encode_user_location_info(
    container: &mut ProtocolIeContainer,
    uli: &UserLocationInformation,
) -> NgapResult<()> {
    push_with(
        container,
        ProtocolIeId::USER_LOCATION_INFORMATION,
        Criticality::Ignore,
        |enc| {
            let UserLocationInformation::Nr { nr_cgi, tai } = uli;
            enc.encode_choice_index(1, 4, false)?;
            // timeStamp, iE-Extensions
            write_preamble(enc, &[false, false]);
            write_preamble(enc, &[false]);
            encode_plmn(enc, &nr_cgi.plmn_identity)?;
            enc.encode_bit_string_u64(nr_cgi.nr_cell_identity, 36, Some(36), Some(36))?;
            encode_tai(enc, tai)
        },
    )
}

pub fn decode_user_location_info(field: &ProtocolIeField) -> NgapResult<UserLocationInformation> {
    decode_with(&field.value, |dec| {
        let index = dec.decode_choice_index(4, false)?;
        if index != 1 {
            return Err(NgapError::InvalidIeValue {
                ie_name: "UserLocationInformation",
                reason: format!("alternative {index} not supported"),
            });
        }
        let [time_stamp_present, ext_present] = read_preamble::<2>(dec)?;
        let [cgi_ext_present] = read_preamble::<1>(dec)?;
        let plmn_identity = decode_plmn(dec)?;
        let (nr_cell_identity, _) = dec.decode_bit_string_u64(Some(36), Some(36))?;
        if cgi_ext_present {
            skip_ie_extensions(dec)?;
        }
        let tai = decode_tai(dec)?;
        if time_stamp_present {
            dec.decode_fixed_octets::<4>()?;
        }
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(UserLocationInformation::Nr {
            nr_cgi: NrCgi {
                plmn_identity,
                nr_cell_identity,
            },
            tai,
        })
    })
}

// ============================================================================
// FiveG-S-TMSI / UEPagingIdentity / TAIListForPaging IEs
// ============================================================================

pub fn encode_five_g_s_tmsi(
    container: &mut ProtocolIeContainer,
    tmsi: &FiveGSTmsi,
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::FIVE_G_S_TMSI, Criticality::Reject, |enc| {
        encode_five_g_s_tmsi_inline(enc, tmsi)
    })
}

pub fn decode_five_g_s_tmsi(field: &ProtocolIeField) -> NgapResult<FiveGSTmsi> {
    decode_with(&field.value, decode_five_g_s_tmsi_inline)
}

/// UEPagingIdentity ::= CHOICE { fiveG-S-TMSI, choice-Extensions }
pub fn encode_ue_paging_identity(
    container: &mut ProtocolIeContainer,
    tmsi: &FiveGSTmsi,
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::UE_PAGING_IDENTITY, Criticality::Ignore, |enc| {
        enc.encode_choice_index(0, 2, false)?;
        encode_five_g_s_tmsi_inline(enc, tmsi)
    })
}

pub fn decode_ue_paging_identity(field: &ProtocolIeField) -> NgapResult<FiveGSTmsi> {
    decode_with(&field.value, |dec| {
        if dec.decode_choice_index(2, false)? != 0 {
            return Err(PerError::UnsupportedExtension.into());
        }
        decode_five_g_s_tmsi_inline(dec)
    })
}

pub fn encode_tai_list_for_paging(
    container: &mut ProtocolIeContainer,
    tais: &[Tai],
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::TAI_LIST_FOR_PAGING, Criticality::Ignore, |enc| {
        encode_list(enc, "TAIListForPaging", tais, MAX_TAI_FOR_PAGING, |enc, tai| {
            write_preamble(enc, &[false]);
            encode_tai(enc, tai)
        })
    })
}

pub fn decode_tai_list_for_paging(field: &ProtocolIeField) -> NgapResult<Vec<Tai>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_TAI_FOR_PAGING, |dec| {
            let [ext_present] = read_preamble::<1>(dec)?;
            let tai = decode_tai(dec)?;
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(tai)
        })
    })
}

// ============================================================================
// Security IEs
// ============================================================================

/// Each algorithm mask is `BIT STRING (SIZE(16, ...))`
pub fn encode_ue_security_capabilities(
    container: &mut ProtocolIeContainer,
    caps: &UeSecurityCapabilities,
) -> NgapResult<()> {
    push_with(
        container,
        ProtocolIeId::UE_SECURITY_CAPABILITIES,
        Criticality::Reject,
        |enc| {
            write_preamble(enc, &[false]);
            for mask in [
                caps.nr_encryption_algorithms,
                caps.nr_integrity_algorithms,
                caps.eutra_encryption_algorithms,
                caps.eutra_integrity_algorithms,
            ] {
                enc.write_bit(false);
                enc.encode_bit_string_u64(mask as u64, 16, Some(16), Some(16))?;
            }
            Ok(())
        },
    )
}

pub fn decode_ue_security_capabilities(
    field: &ProtocolIeField,
) -> NgapResult<UeSecurityCapabilities> {
    decode_with(&field.value, |dec| {
        let [ext_present] = read_preamble::<1>(dec)?;
        let mut masks = [0u16; 4];
        for mask in masks.iter_mut() {
            if dec.read_bit()? {
                return Err(PerError::UnsupportedExtension.into());
            }
            let (value, _) = dec.decode_bit_string_u64(Some(16), Some(16))?;
            *mask = value as u16;
        }
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(UeSecurityCapabilities {
            nr_encryption_algorithms: masks[0],
            nr_integrity_algorithms: masks[1],
            eutra_encryption_algorithms: masks[2],
            eutra_integrity_algorithms: masks[3],
        })
    })
}

pub fn encode_security_key(container: &mut ProtocolIeContainer, key: &[u8; 32]) -> NgapResult<()> {
    push_with(container, ProtocolIeId::SECURITY_KEY, Criticality::Reject, |enc| {
        encode_security_key_inline(enc, key);
        Ok(())
    })
}

pub fn decode_security_key(field: &ProtocolIeField) -> NgapResult<[u8; 32]> {
    decode_with(&field.value, decode_security_key_inline)
}

/// SecurityContext ::= SEQUENCE { nextHopChainingCount INTEGER (0..7), nextHopNH, ... }
pub fn encode_security_context(
    container: &mut ProtocolIeContainer,
    ctx: &SecurityContext,
) -> NgapResult<()> {
    push_with(container, ProtocolIeId::SECURITY_CONTEXT, Criticality::Reject, |enc| {
        write_preamble(enc, &[false]);
        enc.encode_constrained_whole_number(
            ctx.next_hop_chaining_count as i64,
            &Constraint::new(0, 7),
        )?;
        encode_security_key_inline(enc, &ctx.next_hop_nh);
        Ok(())
    })
}

pub fn decode_security_context(field: &ProtocolIeField) -> NgapResult<SecurityContext> {
    decode_with(&field.value, |dec| {
        let [ext_present] = read_preamble::<1>(dec)?;
        let ncc = dec.decode_constrained_whole_number(&Constraint::new(0, 7))?;
        let next_hop_nh = decode_security_key_inline(dec)?;
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(SecurityContext {
            next_hop_chaining_count: ncc as u8,
            next_hop_nh,
        })
    })
}

pub fn encode_ue_ambr(container: &mut ProtocolIeContainer, ambr: &BitRates) -> NgapResult<()> {
    push_with(
        container,
        ProtocolIeId::UE_AGGREGATE_MAXIMUM_BIT_RATE,
        Criticality::Reject,
        |enc| encode_bit_rates(enc, ambr),
    )
}

pub fn decode_ue_ambr(field: &ProtocolIeField) -> NgapResult<BitRates> {
    decode_with(&field.value, decode_bit_rates)
}

// ============================================================================
// UE-NGAP-IDs / ResetType / connection list IEs
// ============================================================================

/// UE-NGAP-IDs ::= CHOICE { uE-NGAP-ID-pair, aMF-UE-NGAP-ID, choice-Extensions }
pub fn encode_ue_ngap_ids(container: &mut ProtocolIeContainer, ids: &UeNgapIds) -> NgapResult<()> {
    push_with(container, ProtocolIeId::UE_NGAP_IDS, Criticality::Reject, |enc| {
        match ids {
            UeNgapIds::Pair {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
            } => {
                enc.encode_choice_index(0, 3, false)?;
                write_preamble(enc, &[false]);
                AmfUeNgapId(*amf_ue_ngap_id).encode_aper(enc)?;
                RanUeNgapId(*ran_ue_ngap_id).encode_aper(enc)?;
            }
            UeNgapIds::AmfOnly(id) => {
                enc.encode_choice_index(1, 3, false)?;
                AmfUeNgapId(*id).encode_aper(enc)?;
            }
        }
        Ok(())
    })
}

pub fn decode_ue_ngap_ids(field: &ProtocolIeField) -> NgapResult<UeNgapIds> {
    decode_with(&field.value, |dec| match dec.decode_choice_index(3, false)? {
        0 => {
            let [ext_present] = read_preamble::<1>(dec)?;
            let amf_ue_ngap_id = AmfUeNgapId::decode_aper(dec)?.0;
            let ran_ue_ngap_id = RanUeNgapId::decode_aper(dec)?.0;
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(UeNgapIds::Pair {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
            })
        }
        1 => Ok(UeNgapIds::AmfOnly(AmfUeNgapId::decode_aper(dec)?.0)),
        _ => Err(PerError::UnsupportedExtension.into()),
    })
}

/// ResetType ::= CHOICE { nG-Interface, partOfNG-Interface, choice-Extensions }
pub fn encode_reset_type(container: &mut ProtocolIeContainer, reset: &ResetType) -> NgapResult<()> {
    push_with(container, ProtocolIeId::RESET_TYPE, Criticality::Reject, |enc| {
        match reset {
            ResetType::NgInterface => {
                enc.encode_choice_index(0, 3, false)?;
                ResetAll::ResetAll.encode_aper(enc)?;
            }
            ResetType::PartOfNgInterface(list) => {
                enc.encode_choice_index(1, 3, false)?;
                encode_ng_connection_list(enc, list)?;
            }
        }
        Ok(())
    })
}

pub fn decode_reset_type(field: &ProtocolIeField) -> NgapResult<ResetType> {
    decode_with(&field.value, |dec| match dec.decode_choice_index(3, false)? {
        0 => {
            ResetAll::decode_aper(dec)?;
            Ok(ResetType::NgInterface)
        }
        1 => Ok(ResetType::PartOfNgInterface(decode_ng_connection_list(dec)?)),
        _ => Err(PerError::UnsupportedExtension.into()),
    })
}

pub fn encode_ng_connection_list_ie(
    container: &mut ProtocolIeContainer,
    list: &[UeAssociatedLogicalNgConnection],
) -> NgapResult<()> {
    push_with(
        container,
        ProtocolIeId::UE_ASSOCIATED_LOGICAL_NG_CONNECTION_LIST,
        Criticality::Ignore,
        |enc| encode_ng_connection_list(enc, list),
    )
}

pub fn decode_ng_connection_list_ie(
    field: &ProtocolIeField,
) -> NgapResult<Vec<UeAssociatedLogicalNgConnection>> {
    decode_with(&field.value, decode_ng_connection_list)
}

// ============================================================================
// PDU Session Resource list IEs
// ============================================================================

/// PDUSessionResourceSetupListSUReq or PDUSessionResourceSetupListCxtReq:
/// items also carry an optional NAS-PDU and the S-NSSAI
pub fn encode_pdu_session_setup_list(
    container: &mut ProtocolIeContainer,
    id: ProtocolIeId,
    items: &[PduSessionResourceSetupItem],
) -> NgapResult<()> {
    push_with(container, id, Criticality::Reject, |enc| {
        encode_list(
            enc,
            "PDUSessionResourceSetupList",
            items,
            MAX_PDU_SESSIONS,
            |enc, item| {
                write_preamble(enc, &[item.nas_pdu.is_some(), false]);
                enc.encode_constrained_whole_number(
                    item.pdu_session_id as i64,
                    &Constraint::new(0, 255),
                )?;
                if let Some(ref nas) = item.nas_pdu {
                    enc.encode_octet_string(nas, None, None)?;
                }
                encode_s_nssai(enc, &item.s_nssai)?;
                Ok(enc.encode_octet_string(&item.transfer, None, None)?)
            },
        )
    })
}

pub fn decode_pdu_session_setup_list(
    field: &ProtocolIeField,
) -> NgapResult<Vec<PduSessionResourceSetupItem>> {
    decode_with(&field.value, |dec| {
        decode_list(dec, MAX_PDU_SESSIONS, |dec| {
            let [nas_present, ext_present] = read_preamble::<2>(dec)?;
            let pdu_session_id =
                dec.decode_constrained_whole_number(&Constraint::new(0, 255))? as u8;
            let nas_pdu = if nas_present {
                Some(dec.decode_octet_string(None, None)?)
            } else {
                None
            };
            let s_nssai = decode_s_nssai(dec)?;
            let transfer = dec.decode_octet_string(None, None)?;
            if ext_present {
                skip_ie_extensions(dec)?;
            }
            Ok(PduSessionResourceSetupItem {
                pdu_session_id,
                nas_pdu,
                s_nssai,
                transfer,
            })
        })
    })
}

/// Any list IE whose items are `{ pDUSessionID, transfer }`
pub fn encode_pdu_session_item_list(
    container: &mut ProtocolIeContainer,
    id: ProtocolIeId,
    items: &[PduSessionResourceItem],
) -> NgapResult<()> {
    push_with(container, id, Criticality::Ignore, |enc| {
        encode_pdu_session_items(enc, "PDUSessionResourceList", items)
    })
}

pub fn decode_pdu_session_item_list(
    field: &ProtocolIeField,
) -> NgapResult<Vec<PduSessionResourceItem>> {
    decode_with(&field.value, decode_pdu_session_items)
}
