//! IE framing helpers (TS 24.007 Section 11.2)
//!
//! Optional IEs are recognised by their IEI. Type 1 IEIs (`0x8-` to `0xF-`)
//! carry their value in the low nibble of the IEI octet, IEIs `0x70`-`0x7F`
//! carry a two-octet length (TLV-E) and everything else is a TLV or TV.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::error::{need, NasError, NasResult};

/// Returns true for half-octet (type 1) IEIs
pub fn is_half_octet_iei(iei: u8) -> bool {
    iei >= 0x80
}

/// Returns true for IEIs whose length is two octets
pub fn is_extended_length_iei(iei: u8) -> bool {
    (0x70..=0x7F).contains(&iei)
}

/// Read an LV value
pub fn get_lv(buf: &mut Bytes) -> NasResult<Bytes> {
    need(buf, 1)?;
    let len = buf.get_u8() as usize;
    need(buf, len)?;
    Ok(buf.split_to(len))
}

/// Read an LV-E value
pub fn get_lve(buf: &mut Bytes) -> NasResult<Bytes> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    Ok(buf.split_to(len))
}

/// Write an LV value
pub fn put_lv(buf: &mut BytesMut, ie: &'static str, value: &[u8]) -> NasResult<()> {
    if value.len() > u8::MAX as usize {
        return Err(NasError::InvalidIeLength { ie, len: value.len() });
    }
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
    Ok(())
}

/// Write an LV-E value
pub fn put_lve(buf: &mut BytesMut, ie: &'static str, value: &[u8]) -> NasResult<()> {
    if value.len() > u16::MAX as usize {
        return Err(NasError::InvalidIeLength { ie, len: value.len() });
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

/// Read exactly `N` octets
pub fn get_array<const N: usize>(buf: &mut Bytes) -> NasResult<[u8; N]> {
    need(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Skip one optional IE the receiver does not understand.
///
/// `iei` has already been consumed from `buf`.
pub fn skip_ie(iei: u8, buf: &mut Bytes) -> NasResult<()> {
    if is_half_octet_iei(iei) {
        return Ok(());
    }
    if is_extended_length_iei(iei) {
        get_lve(buf)?;
    } else {
        get_lv(buf)?;
    }
    Ok(())
}

/// Iterate optional IEs until `buf` is empty, handing each IEI to `f`.
///
/// For half-octet IEIs `f` receives the full octet with the high nibble as
/// the key; `f` returns false when it did not handle the IE, which is then
/// skipped.
pub fn for_each_optional_ie<F>(buf: &mut Bytes, mut f: F) -> NasResult<()>
where
    F: FnMut(u8, u8, &mut Bytes) -> NasResult<bool>,
{
    while buf.has_remaining() {
        let octet = buf.get_u8();
        let key = if is_half_octet_iei(octet) { octet & 0xF0 } else { octet };
        if !f(key, octet, buf)? {
            skip_ie(octet, buf)?;
        }
    }
    Ok(())
}
