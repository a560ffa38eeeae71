//! Walks receive buffers and extracts packet attribute tuples.
//!
//! A receive buffer holds a chain of netlink messages, each aligned to 4
//! bytes. Only `NFULNL_MSG_PACKET` messages carry packet attributes; anything
//! else in the chain is skipped. Malformed headers end the walk without
//! error, matching the kernel parser's tolerance of trailing garbage.

use crate::attr::{align4, AttributeTuple, NfLogAttr, ATTR_HDR_LEN};

use super::{NFGENMSG_LEN, NFULNL_MSG_PACKET, NLA_TYPE_MASK, NLMSG_HDRLEN};

/// Walk the netlink message chain in `buf`, invoking `callback` once per
/// packet message. Returns the number of messages dispatched.
///
/// The callback runs synchronously inside this call and may enqueue records
/// re-entrantly; nothing is retained across messages.
pub fn parse_and_dispatch(buf: &[u8], mut callback: impl FnMut(AttributeTuple)) -> usize {
    let mut off = 0;
    let mut dispatched = 0;

    while buf.len().saturating_sub(off) >= NLMSG_HDRLEN {
        let nl_len = u32::from_ne_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
        let nl_type = u16::from_ne_bytes(buf[off + 4..off + 6].try_into().unwrap());
        if nl_len < NLMSG_HDRLEN || off + nl_len > buf.len() {
            break;
        }

        if nl_type == NFULNL_MSG_PACKET {
            callback(parse_packet(&buf[off..off + nl_len]));
            dispatched += 1;
        }

        off += align4(nl_len);
    }

    dispatched
}

/// Extract the attribute TLV array of one packet message.
fn parse_packet(msg: &[u8]) -> AttributeTuple {
    let mut tuple = AttributeTuple::new();
    let mut off = NLMSG_HDRLEN + NFGENMSG_LEN;

    while msg.len().saturating_sub(off) >= ATTR_HDR_LEN {
        let nfa_len = u16::from_ne_bytes(msg[off..off + 2].try_into().unwrap()) as usize;
        let nfa_type =
            u16::from_ne_bytes(msg[off + 2..off + 4].try_into().unwrap()) & NLA_TYPE_MASK;
        if nfa_len < ATTR_HDR_LEN || off + nfa_len > msg.len() {
            break;
        }

        if let Some(attr) = NfLogAttr::from_type(nfa_type) {
            let value = &msg[off + ATTR_HDR_LEN..off + nfa_len];
            if attr == NfLogAttr::Payload {
                // The payload slot keeps one attribute-header's worth of the
                // bytes that follow the value, zero-filled at the buffer end.
                let mut v = Vec::with_capacity(value.len() + ATTR_HDR_LEN);
                v.extend_from_slice(value);
                let tail = off + nfa_len;
                v.extend_from_slice(&msg[tail..(tail + ATTR_HDR_LEN).min(msg.len())]);
                v.resize(value.len() + ATTR_HDR_LEN, 0);
                tuple.set(attr, v);
            } else {
                tuple.set(attr, value.to_vec());
            }
        }

        off += align4(nfa_len);
    }

    tuple
}
