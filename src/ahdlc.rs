//! AHDLC framing (RFC 1662): delimiter stripping, byte-stuffing, and the
//! CRC-16/X.25 trailer. Grounded on `rnet-ahdlc.h`'s API surface and the
//! checksum routines in `raging-utils-crc.c`, expressed over [`Packet`]
//! instead of a raw `rnet_buf_t`/`nsvc_pcl_t` pair.

use crate::error::{DiscardCode, DiscardResult};
use crate::packet::Packet;
use crate::util::{crc16_buffer, CRC16_GOOD_FCS};

pub const FLAG_SEQUENCE: u8 = 0x7E;
pub const CONTROL_ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;

/// Remove a leading and/or trailing `0x7E` flag byte from the window.
pub fn strip_delimiters(pkt: &mut Packet) -> DiscardResult<()> {
    if pkt.meta.length == 0 {
        return Ok(());
    }
    let mut first = [0u8; 1];
    pkt.read(0, &mut first)?;
    if first[0] == FLAG_SEQUENCE {
        pkt.advance_offset(1)?;
    }
    if pkt.meta.length == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    pkt.read(pkt.meta.length - 1, &mut last)?;
    if last[0] == FLAG_SEQUENCE {
        pkt.shrink(1)?;
    }
    Ok(())
}

/// Remove byte-stuffing in place: every `0x7D b` pair becomes `b XOR 0x20`.
/// The result is always shorter than or equal to the input, so this can be
/// done as a single forward pass writing back into the same window.
pub fn strip_control_chars(pkt: &mut Packet) -> DiscardResult<()> {
    let raw = pkt.to_vec();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == CONTROL_ESCAPE {
            let next = raw.get(i + 1).copied().ok_or(DiscardCode::AhdlcRxCc)?;
            out.push(next ^ ESCAPE_XOR);
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    pkt.shrink(pkt.meta.length - out.len() as u16)?;
    pkt.write_window(&out)
}

/// Verify the trailing CRC-16/X.25 and, on success, drop it from the window.
pub fn verify_crc(pkt: &mut Packet) -> DiscardResult<()> {
    let body = pkt.to_vec();
    if crc16_buffer(&body, false) != CRC16_GOOD_FCS {
        return Err(DiscardCode::AhdlcRxBadCrc);
    }
    pkt.shrink(2)
}

/// Append the two-byte CRC-16/X.25 trailer (little-endian), growing `length`
/// by 2. Must run before [`encode_control_chars`] so the CRC bytes
/// themselves get a chance to be stuffed.
pub fn append_crc(pkt: &mut Packet) -> DiscardResult<()> {
    let body = pkt.to_vec();
    let crc = crc16_buffer(&body, true);
    pkt.append(2)?;
    pkt.write(pkt.meta.length - 2, &crc.to_le_bytes())
}

/// Count how many extra bytes stuffing this window would add — every
/// `0x7E`/`0x7D` byte costs one extra escape byte. Callers must grow the
/// packet's headroom/tailroom by this amount before calling
/// [`encode_control_chars`].
pub fn translation_count(pkt: &Packet) -> usize {
    pkt.to_vec()
        .iter()
        .filter(|&&b| b == FLAG_SEQUENCE || b == CONTROL_ESCAPE)
        .count()
}

/// Stuff the window in place. `pkt` must already have been grown by
/// [`Packet::append`] to `original_length + translation_count`; this writes
/// the stuffed bytes back into that widened window.
pub fn encode_control_chars(pkt: &mut Packet, translation_count: usize) -> DiscardResult<()> {
    let raw = pkt.to_vec();
    let original_len = raw.len() - translation_count;
    let mut out = Vec::with_capacity(raw.len());
    for &b in &raw[..original_len] {
        if b == FLAG_SEQUENCE || b == CONTROL_ESCAPE {
            out.push(CONTROL_ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    if out.len() != raw.len() {
        return Err(DiscardCode::AhdlcTxCc);
    }
    pkt.write_window(&out)
}

/// Wrap the window with leading and trailing `0x7E` flag bytes.
pub fn encode_delimiters(pkt: &mut Packet) -> DiscardResult<()> {
    pkt.prepend(1)?;
    pkt.write(0, &[FLAG_SEQUENCE])?;
    pkt.append(1)?;
    pkt.write(pkt.meta.length - 1, &[FLAG_SEQUENCE])
}

/// Full Rx pipeline: strip delimiters, destuff, verify CRC. On success the
/// window holds the de-framed PPP payload and is ready for
/// [`crate::ppp::rx`].
pub fn rx_deframe(pkt: &mut Packet) -> DiscardResult<()> {
    strip_delimiters(pkt)?;
    if pkt.meta.length < 2 {
        return Err(DiscardCode::AhdlcRxBadCrc);
    }
    strip_control_chars(pkt)?;
    verify_crc(pkt)
}

/// Full Tx pipeline: append CRC, stuff, add delimiters. `pkt` must already
/// carry enough headroom/tailroom (the caller sizes the allocation to the
/// worst-case doubled frame before reaching this step).
pub fn tx_frame(pkt: &mut Packet) -> DiscardResult<()> {
    append_crc(pkt)?;
    let count = translation_count(pkt);
    if count > 0 {
        pkt.append(count as u16)?;
        encode_control_chars(pkt, count)?;
    }
    encode_delimiters(pkt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed_packet(payload: &[u8]) -> Packet {
        let mut pkt = Packet::new_buf(256);
        pkt.meta.offset = 64;
        pkt.meta.length = payload.len() as u16;
        pkt.write(0, payload).unwrap();
        pkt
    }

    #[test]
    fn tx_then_rx_round_trips_payload() {
        let payload = [0xFF, 0x03, 0xC0, 0x21, 0x01, 0x02, 0x7E, 0x7D, 0x55];
        let mut pkt = framed_packet(&payload);
        tx_frame(&mut pkt).unwrap();
        rx_deframe(&mut pkt).unwrap();
        assert_eq!(pkt.to_vec(), payload);
    }

    #[test]
    fn strip_control_chars_destuffs_escaped_bytes() {
        let mut pkt = framed_packet(&[0x01, CONTROL_ESCAPE, 0x7E ^ ESCAPE_XOR, 0x02]);
        strip_control_chars(&mut pkt).unwrap();
        assert_eq!(pkt.to_vec(), vec![0x01, 0x7E, 0x02]);
    }

    #[test]
    fn dangling_escape_at_end_is_rx_cc_error() {
        let mut pkt = framed_packet(&[0x01, CONTROL_ESCAPE]);
        assert_eq!(strip_control_chars(&mut pkt), Err(DiscardCode::AhdlcRxCc));
    }

    #[test]
    fn verify_crc_rejects_corrupted_body() {
        let payload = [0x01, 0x02, 0x03];
        let mut pkt = framed_packet(&payload);
        append_crc(&mut pkt).unwrap();
        let last = pkt.meta.length - 1;
        pkt.write(last, &[0xAA]).unwrap();
        assert_eq!(verify_crc(&mut pkt), Err(DiscardCode::AhdlcRxBadCrc));
    }

    #[test]
    fn strip_delimiters_trims_both_flags() {
        let mut pkt = framed_packet(&[FLAG_SEQUENCE, 0x01, 0x02, FLAG_SEQUENCE]);
        strip_delimiters(&mut pkt).unwrap();
        assert_eq!(pkt.to_vec(), vec![0x01, 0x02]);
    }
}
