//! NFLOG attribute tuple representation and codec.
//!
//! The kernel delivers each logged packet as an array of type-length-value
//! (TLV) netlink attributes. [`AttributeTuple`] is the in-memory form of that
//! array: exactly [`NFULA_MAX`] positional slots, each holding the raw value
//! bytes of one attribute or nothing. The [`codec`] module serializes a tuple
//! to and from an opaque byte buffer for capture dumps and replay.

pub mod codec;

use bytes::Bytes;

/// Number of attribute slots in a packet message (`NFULA_HWLEN` is 17).
pub const NFULA_MAX: usize = 17;

/// Size of a netlink attribute header: 2-byte length plus 2-byte type.
pub const ATTR_HDR_LEN: usize = 4;

/// Largest value a single attribute slot may hold.
pub const MAX_ATTR_LEN: usize = 65535;

/// Round up to the netlink 4-byte attribute alignment.
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Attribute types inside a netfilter log packet message.
///
/// The numeric values are the kernel's `NFULA_*` enumeration; a tuple slot
/// index is the attribute value minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NfLogAttr {
    PacketHdr = 1,
    Mark = 2,
    Timestamp = 3,
    IfindexIndev = 4,
    IfindexOutdev = 5,
    IfindexPhyindev = 6,
    IfindexPhyoutdev = 7,
    Hwaddr = 8,
    Payload = 9,
    Prefix = 10,
    Uid = 11,
    Seq = 12,
    SeqGlobal = 13,
    Gid = 14,
    Hwtype = 15,
    Hwheader = 16,
    Hwlen = 17,
}

impl NfLogAttr {
    /// Tuple slot index for this attribute type.
    pub const fn slot(self) -> usize {
        self as usize - 1
    }

    /// Map a wire type tag back to an attribute, if it is one we carry.
    pub fn from_type(ty: u16) -> Option<Self> {
        use NfLogAttr::*;
        Some(match ty {
            1 => PacketHdr,
            2 => Mark,
            3 => Timestamp,
            4 => IfindexIndev,
            5 => IfindexOutdev,
            6 => IfindexPhyindev,
            7 => IfindexPhyoutdev,
            8 => Hwaddr,
            9 => Payload,
            10 => Prefix,
            11 => Uid,
            12 => Seq,
            13 => SeqGlobal,
            14 => Gid,
            15 => Hwtype,
            16 => Hwheader,
            17 => Hwlen,
            _ => return None,
        })
    }
}

/// Ordered set of [`NFULA_MAX`] optional byte-attributes for one packet.
///
/// Slots hold exact attribute values, with one convention inherited from the
/// capture format: the [`NfLogAttr::Payload`] slot carries the value plus one
/// attribute-header's worth ([`ATTR_HDR_LEN`]) of trailing bytes, which the
/// record layer strips again. See [`crate::record::LogRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTuple {
    slots: [Option<Bytes>; NFULA_MAX],
}

impl Default for AttributeTuple {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTuple {
    /// An empty tuple with every slot unset.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Value of the slot for `attr`, if present.
    pub fn get(&self, attr: NfLogAttr) -> Option<&Bytes> {
        self.slots[attr.slot()].as_ref()
    }

    /// Set the slot for `attr`.
    pub fn set(&mut self, attr: NfLogAttr, value: impl Into<Bytes>) {
        self.slots[attr.slot()] = Some(value.into());
    }

    /// Clear the slot for `attr`.
    pub fn unset(&mut self, attr: NfLogAttr) {
        self.slots[attr.slot()] = None;
    }

    /// Raw slot access by index. Panics if `slot >= NFULA_MAX`.
    pub fn slot(&self, slot: usize) -> Option<&Bytes> {
        self.slots[slot].as_ref()
    }

    /// Set a slot by index. Panics if `slot >= NFULA_MAX`.
    pub fn set_slot(&mut self, slot: usize, value: Option<Bytes>) {
        self.slots[slot] = value;
    }

    /// Iterate over `(slot_index, value)` pairs, absent slots included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&Bytes>)> {
        self.slots.iter().enumerate().map(|(i, v)| (i, v.as_ref()))
    }

    /// Number of present slots.
    pub fn present(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no slot is set.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}
