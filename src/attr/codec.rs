//! Serialization of attribute tuples to and from capture buffers.
//!
//! The buffer layout mirrors the kernel's netlink TLV framing: a fixed
//! offset-table prefix with one 4-byte entry per slot (zero marks an absent
//! slot), followed by the present attributes, each as a 2-byte length,
//! 2-byte type tag and the value bytes, padded to a 4-byte boundary.
//!
//! Encoding runs in two pure passes, a size pass and a write pass, so the
//! output buffer is allocated once and never grows mid-write. The round trip
//! is exact: `decode(&encode(t)?)? == t` for every valid tuple.

use bytes::Bytes;

use super::{align4, AttributeTuple, ATTR_HDR_LEN, MAX_ATTR_LEN, NFULA_MAX};
use crate::error::DecodeError;

/// Byte length of the offset-table prefix.
pub const OFFSET_TABLE_LEN: usize = 4 * NFULA_MAX;

/// Serialize a tuple into a capture buffer.
///
/// Rejects any slot longer than [`MAX_ATTR_LEN`] bytes.
pub fn encode(tuple: &AttributeTuple) -> Result<Vec<u8>, DecodeError> {
    // Size pass.
    let mut size = OFFSET_TABLE_LEN;
    for (slot, value) in tuple.iter() {
        if let Some(v) = value {
            if v.len() > MAX_ATTR_LEN {
                return Err(DecodeError::AttributeTooLarge {
                    slot,
                    len: v.len(),
                });
            }
            size += align4(ATTR_HDR_LEN + v.len());
        }
    }

    // Write pass.
    let mut buf = vec![0u8; size];
    let mut off = OFFSET_TABLE_LEN;
    for (slot, value) in tuple.iter() {
        let Some(v) = value else { continue };

        buf[slot * 4..slot * 4 + 4].copy_from_slice(&(off as u32).to_ne_bytes());

        buf[off..off + 2].copy_from_slice(&(v.len() as u16).to_ne_bytes());
        buf[off + 2..off + 4].copy_from_slice(&(slot as u16 + 1).to_ne_bytes());
        buf[off + 4..off + 4 + v.len()].copy_from_slice(v);

        // padding bytes stay zero
        off += align4(ATTR_HDR_LEN + v.len());
    }
    debug_assert_eq!(off, size);

    Ok(buf)
}

/// Deserialize a capture buffer back into a tuple.
pub fn decode(buf: &[u8]) -> Result<AttributeTuple, DecodeError> {
    if buf.len() < OFFSET_TABLE_LEN {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: OFFSET_TABLE_LEN,
            have: buf.len(),
        });
    }

    let mut tuple = AttributeTuple::new();
    for slot in 0..NFULA_MAX {
        let entry: [u8; 4] = buf[slot * 4..slot * 4 + 4].try_into().unwrap();
        let off = u32::from_ne_bytes(entry) as usize;
        if off == 0 {
            continue;
        }
        if off < OFFSET_TABLE_LEN || off + ATTR_HDR_LEN > buf.len() {
            return Err(DecodeError::BadOffset { slot, offset: off });
        }

        let len = u16::from_ne_bytes(buf[off..off + 2].try_into().unwrap()) as usize;
        let ty = u16::from_ne_bytes(buf[off + 2..off + 4].try_into().unwrap());
        if ty != slot as u16 + 1 {
            return Err(DecodeError::TypeMismatch {
                slot,
                found: ty,
                expected: slot as u16 + 1,
            });
        }
        if off + ATTR_HDR_LEN + len > buf.len() {
            return Err(DecodeError::Truncated {
                offset: off,
                needed: ATTR_HDR_LEN + len,
                have: buf.len() - off,
            });
        }

        let value = Bytes::copy_from_slice(&buf[off + ATTR_HDR_LEN..off + ATTR_HDR_LEN + len]);
        tuple.set_slot(slot, Some(value));
    }

    Ok(tuple)
}
