//! Structured records decoded from packet attribute tuples.

use std::fmt;

use bytes::Bytes;

use crate::attr::{AttributeTuple, NfLogAttr, ATTR_HDR_LEN};
use crate::device::{DeviceNameCache, DeviceNameTable};
use crate::error::DecodeError;

/// A raw attribute dump plus the device names resolved while it was taken.
///
/// This is the replayable form of a packet: feeding it back through
/// [`LogRecord::from_capture`] reproduces the record without any live
/// interface lookups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCapture {
    pub devices: DeviceNameTable,
    pub attrs: AttributeTuple,
}

/// Immutable snapshot of one logged packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogRecord {
    /// EtherType in host order, 0 when the kernel sent no packet header.
    pub protocol: u16,
    /// ARPHRD hardware type, 0 when absent.
    pub hardware_type: u16,
    /// Netfilter mark, 0 when absent.
    pub mark: u32,
    /// Kernel receive time in microseconds since the epoch.
    pub timestamp_us: u64,
    pub in_device: Option<String>,
    pub phys_in_device: Option<String>,
    pub out_device: Option<String>,
    pub phys_out_device: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Link-layer source address, when the kernel captured one.
    pub hw_addr: Option<Bytes>,
    /// Link-layer header bytes, possibly empty.
    pub hardware_header: Bytes,
    /// Packet payload starting at the network layer.
    pub payload: Bytes,
    /// Log prefix from the netfilter rule, possibly empty.
    pub prefix: String,
    /// The capture this record was decoded from, kept only in raw mode.
    pub raw: Option<RawCapture>,
}

fn be16(v: &Bytes) -> Result<u16, DecodeError> {
    let bytes = v.get(..2).ok_or(DecodeError::Truncated {
        offset: 0,
        needed: 2,
        have: v.len(),
    })?;
    Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
}

fn be32(v: &Bytes) -> Result<u32, DecodeError> {
    let bytes = v.get(..4).ok_or(DecodeError::Truncated {
        offset: 0,
        needed: 4,
        have: v.len(),
    })?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

/// Resolve a device index slot, consulting the capture's own table before the
/// session cache. Resolutions are recorded back into `table` when the record
/// keeps its capture.
fn resolve_device(
    attrs: &AttributeTuple,
    attr: NfLogAttr,
    table: &mut DeviceNameTable,
    cache: &mut DeviceNameCache,
    keep_raw: bool,
) -> Result<Option<String>, DecodeError> {
    let Some(v) = attrs.get(attr) else {
        return Ok(None);
    };
    let index = be32(v)?;
    if index == 0 {
        return Ok(None);
    }
    if let Some(name) = table.get(&index) {
        return Ok(Some(name.clone()));
    }
    let name = cache.resolve(index);
    if keep_raw {
        if let Some(name) = &name {
            table.insert(index, name.clone());
        }
    }
    Ok(name)
}

impl LogRecord {
    /// Decode an attribute tuple into a record.
    ///
    /// `devices` is the name table a replayed capture carries; live decoding
    /// passes `None` and resolves through `cache`. With `keep_raw` the record
    /// retains the tuple and the device names it touched as [`RawCapture`].
    pub fn from_capture(
        attrs: AttributeTuple,
        devices: Option<&DeviceNameTable>,
        cache: &mut DeviceNameCache,
        keep_raw: bool,
    ) -> Result<LogRecord, DecodeError> {
        let mut table = devices.cloned().unwrap_or_default();

        let protocol = match attrs.get(NfLogAttr::PacketHdr) {
            Some(v) => be16(v)?,
            None => 0,
        };
        let hardware_type = match attrs.get(NfLogAttr::Hwtype) {
            Some(v) => be16(v)?,
            None => 0,
        };
        let mark = match attrs.get(NfLogAttr::Mark) {
            Some(v) => be32(v)?,
            None => 0,
        };

        // A packet message without a timestamp is malformed.
        let ts = attrs
            .get(NfLogAttr::Timestamp)
            .ok_or(DecodeError::MissingTimestamp)?;
        if ts.len() < 16 {
            return Err(DecodeError::Truncated {
                offset: 0,
                needed: 16,
                have: ts.len(),
            });
        }
        let sec = u64::from_be_bytes(ts[0..8].try_into().unwrap());
        let usec = u64::from_be_bytes(ts[8..16].try_into().unwrap()).min(999_999);
        let timestamp_us = sec
            .checked_mul(1_000_000)
            .and_then(|v| v.checked_add(usec))
            .ok_or(DecodeError::TimestampOutOfRange(sec))?;

        let in_device =
            resolve_device(&attrs, NfLogAttr::IfindexIndev, &mut table, cache, keep_raw)?;
        let phys_in_device = resolve_device(
            &attrs,
            NfLogAttr::IfindexPhyindev,
            &mut table,
            cache,
            keep_raw,
        )?;
        let out_device = resolve_device(
            &attrs,
            NfLogAttr::IfindexOutdev,
            &mut table,
            cache,
            keep_raw,
        )?;
        let phys_out_device = resolve_device(
            &attrs,
            NfLogAttr::IfindexPhyoutdev,
            &mut table,
            cache,
            keep_raw,
        )?;

        let uid = match attrs.get(NfLogAttr::Uid) {
            Some(v) => Some(be32(v)?),
            None => None,
        };
        let gid = match attrs.get(NfLogAttr::Gid) {
            Some(v) => Some(be32(v)?),
            None => None,
        };

        // Hardware address is a fixed struct: 2-byte length, 2 pad bytes,
        // then up to 8 address bytes.
        let hw_addr = match attrs.get(NfLogAttr::Hwaddr) {
            Some(v) => {
                let addrlen = be16(v)? as usize;
                if addrlen > 8 {
                    return Err(DecodeError::HwAddrTooLarge(addrlen));
                }
                if v.len() < 4 + addrlen {
                    return Err(DecodeError::Truncated {
                        offset: 0,
                        needed: 4 + addrlen,
                        have: v.len(),
                    });
                }
                Some(v.slice(4..4 + addrlen))
            }
            None => None,
        };

        let hardware_header = attrs
            .get(NfLogAttr::Hwheader)
            .cloned()
            .unwrap_or_default();

        // The payload slot carries one attribute-header's worth of trailing
        // bytes past the value; strip them here.
        let payload = match attrs.get(NfLogAttr::Payload) {
            Some(v) => v.slice(..v.len().saturating_sub(ATTR_HDR_LEN)),
            None => Bytes::new(),
        };

        let prefix = match attrs.get(NfLogAttr::Prefix) {
            Some(v) => {
                let end = v.iter().position(|&b| b == 0).unwrap_or(v.len());
                String::from_utf8_lossy(&v[..end]).into_owned()
            }
            None => String::new(),
        };

        let raw = keep_raw.then(|| RawCapture {
            devices: table,
            attrs,
        });

        Ok(LogRecord {
            protocol,
            hardware_type,
            mark,
            timestamp_us,
            in_device,
            phys_in_device,
            out_device,
            phys_out_device,
            uid,
            gid,
            hw_addr,
            hardware_header,
            payload,
            prefix,
            raw,
        })
    }

    /// Kernel receive time as floating-point seconds since the epoch.
    pub fn timestamp(&self) -> f64 {
        if self.timestamp_us % 1_000_000 == 0 {
            (self.timestamp_us / 1_000_000) as f64
        } else {
            self.timestamp_us as f64 / 1e6
        }
    }

    /// Obtain a replayable capture of this record.
    ///
    /// `None` prefers the capture saved in raw mode and synthesizes one
    /// otherwise; `Some(true)` returns only a saved capture (or `None`);
    /// `Some(false)` always synthesizes.
    pub fn raw_capture(&self, useraw: Option<bool>) -> Result<Option<RawCapture>, DecodeError> {
        match useraw {
            Some(true) => Ok(self.raw.clone()),
            Some(false) => Ok(Some(self.synthesize_capture()?)),
            None => match &self.raw {
                Some(raw) => Ok(Some(raw.clone())),
                None => Ok(Some(self.synthesize_capture()?)),
            },
        }
    }

    /// Reconstruct a capture from the decoded fields.
    ///
    /// The reconstruction is inexact: interfaces are renumbered from 1 in
    /// encounter order, the payload is re-padded with zero bytes in place of
    /// the trailing attribute header, and sequence counters are not restored.
    pub fn synthesize_capture(&self) -> Result<RawCapture, DecodeError> {
        let mut devices = DeviceNameTable::new();
        let mut attrs = AttributeTuple::new();

        // Renumber interfaces from 1 in encounter order, deduplicated by
        // name so the same interface keeps one index.
        let mut next_index = 1u32;
        let mut number = |name: &Option<String>, devices: &mut DeviceNameTable| -> Option<u32> {
            let name = name.as_ref()?;
            if let Some((&idx, _)) = devices.iter().find(|(_, n)| n.as_str() == name.as_str()) {
                return Some(idx);
            }
            let idx = next_index;
            next_index += 1;
            devices.insert(idx, name.clone());
            Some(idx)
        };

        let indexes = [
            (NfLogAttr::IfindexIndev, number(&self.in_device, &mut devices)),
            (
                NfLogAttr::IfindexPhyindev,
                number(&self.phys_in_device, &mut devices),
            ),
            (
                NfLogAttr::IfindexOutdev,
                number(&self.out_device, &mut devices),
            ),
            (
                NfLogAttr::IfindexPhyoutdev,
                number(&self.phys_out_device, &mut devices),
            ),
        ];
        for (attr, idx) in indexes {
            if let Some(idx) = idx {
                attrs.set(attr, idx.to_be_bytes().to_vec());
            }
        }

        if self.protocol != 0 {
            let mut hdr = [0u8; 4];
            hdr[0..2].copy_from_slice(&self.protocol.to_be_bytes());
            attrs.set(NfLogAttr::PacketHdr, hdr.to_vec());
        }

        attrs.set(NfLogAttr::Mark, self.mark.to_be_bytes().to_vec());

        let mut ts = [0u8; 16];
        ts[0..8].copy_from_slice(&(self.timestamp_us / 1_000_000).to_be_bytes());
        ts[8..16].copy_from_slice(&(self.timestamp_us % 1_000_000).to_be_bytes());
        attrs.set(NfLogAttr::Timestamp, ts.to_vec());

        if let Some(uid) = self.uid {
            attrs.set(NfLogAttr::Uid, uid.to_be_bytes().to_vec());
        }
        if let Some(gid) = self.gid {
            attrs.set(NfLogAttr::Gid, gid.to_be_bytes().to_vec());
        }

        if let Some(addr) = &self.hw_addr {
            if addr.len() > 8 {
                return Err(DecodeError::HwAddrTooLarge(addr.len()));
            }
            let mut hw = [0u8; 12];
            hw[0..2].copy_from_slice(&(addr.len() as u16).to_be_bytes());
            hw[4..4 + addr.len()].copy_from_slice(addr);
            attrs.set(NfLogAttr::Hwaddr, hw.to_vec());
        }

        attrs.set(
            NfLogAttr::Hwtype,
            self.hardware_type.to_be_bytes().to_vec(),
        );
        attrs.set(NfLogAttr::Hwheader, self.hardware_header.clone());
        attrs.set(
            NfLogAttr::Hwlen,
            (self.hardware_header.len() as u16).to_be_bytes().to_vec(),
        );

        // Re-pad the payload with zeros where the trailing attribute header
        // used to be.
        let mut payload = Vec::with_capacity(self.payload.len() + ATTR_HDR_LEN);
        payload.extend_from_slice(&self.payload);
        payload.extend_from_slice(&[0u8; ATTR_HDR_LEN]);
        attrs.set(NfLogAttr::Payload, payload);

        let mut prefix = Vec::with_capacity(self.prefix.len() + 1);
        prefix.extend_from_slice(self.prefix.as_bytes());
        prefix.push(0);
        attrs.set(NfLogAttr::Prefix, prefix);

        Ok(RawCapture { devices, attrs })
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.6}]", self.timestamp())?;
        if !self.prefix.is_empty() {
            write!(f, " {}", self.prefix)?;
        }
        write!(
            f,
            " proto=0x{:04x} mark={}",
            self.protocol, self.mark
        )?;
        if let Some(dev) = &self.in_device {
            write!(f, " in={dev}")?;
        }
        if let Some(dev) = &self.out_device {
            write!(f, " out={dev}")?;
        }
        if let Some(uid) = self.uid {
            write!(f, " uid={uid}")?;
        }
        write!(f, " len={}", self.payload.len())
    }
}
