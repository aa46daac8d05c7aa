//! Stream splitter: turns arbitrary datagram chunks into complete frames.
//!
//! A chunk may hold zero, one or several frames, or end mid-frame. Bytes
//! are buffered until a whole frame is available. On garbage or a bad
//! checksum the splitter reports a [`DecodeError`] and resynchronizes on
//! the next sentinel byte instead of giving up on the stream.

use crate::error::DecodeError;
use crate::protocol::{
    self, RawFrame, CHECKSUM_LEN, HEADER_LEN_LEGACY, HEADER_LEN_V2, INCOMPAT_SIGNED,
    SIGNATURE_LEN, STX_LEGACY, STX_V2,
};
use crate::types::ProtocolVariant;

/// Upper bound on buffered bytes. Older bytes are discarded on overflow.
pub const MAX_BUFFERED: usize = 4096;

#[inline]
fn is_sentinel(b: u8) -> bool {
    b == STX_LEGACY || b == STX_V2
}

/// Incremental frame splitter.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_BUFFERED),
        }
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > MAX_BUFFERED {
            let excess = self.buf.len() - MAX_BUFFERED;
            log::warn!("Frame buffer overflow, discarding {} bytes", excess);
            self.buf.drain(..excess);
        }
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Returns `None` when more data is needed. A declared length larger
    /// than what is buffered is not an error; the bytes stay put until the
    /// next [`push`](Self::push).
    pub fn next_frame(&mut self) -> Option<Result<RawFrame, DecodeError>> {
        if self.buf.is_empty() {
            return None;
        }

        match self.buf.iter().position(|&b| is_sentinel(b)) {
            Some(0) => {}
            Some(skip) => {
                self.buf.drain(..skip);
                return Some(Err(DecodeError::Garbage(skip)));
            }
            None => {
                let skip = self.buf.len();
                self.buf.clear();
                return Some(Err(DecodeError::Garbage(skip)));
            }
        }

        let variant = if self.buf[0] == STX_V2 {
            ProtocolVariant::V2
        } else {
            ProtocolVariant::Legacy
        };
        let header_len = match variant {
            ProtocolVariant::Legacy => HEADER_LEN_LEGACY,
            ProtocolVariant::V2 => HEADER_LEN_V2,
        };
        if self.buf.len() < header_len {
            return None;
        }

        let payload_len = self.buf[1] as usize;
        let mut signature_len = 0;
        if variant == ProtocolVariant::V2 {
            let incompat = self.buf[2];
            if incompat & !INCOMPAT_SIGNED != 0 {
                self.buf.drain(..1);
                return Some(Err(DecodeError::IncompatFlags(incompat)));
            }
            if incompat & INCOMPAT_SIGNED != 0 {
                signature_len = SIGNATURE_LEN;
            }
        }

        let (sequence, system_id, component_id, msg_id) = match variant {
            ProtocolVariant::Legacy => (
                self.buf[2],
                self.buf[3],
                self.buf[4],
                self.buf[5] as u32,
            ),
            ProtocolVariant::V2 => (
                self.buf[4],
                self.buf[5],
                self.buf[6],
                u32::from_le_bytes([self.buf[7], self.buf[8], self.buf[9], 0]),
            ),
        };

        let crc_at = header_len + payload_len;
        let total = crc_at + CHECKSUM_LEN + signature_len;
        let complete = self.buf.len() >= total;
        let extra = protocol::crc_extra(msg_id);

        // A candidate we cannot verify yet, or ever, must not hide a
        // checked frame starting inside it.
        if !complete || extra.is_none() {
            let end = self.buf.len().min(total);
            if let Some(start) = self.verified_frame_within(end) {
                self.buf.drain(..start);
                return Some(Err(DecodeError::Garbage(start)));
            }
        }
        if !complete {
            return None;
        }

        match extra {
            Some(extra) => {
                let expected = protocol::frame_checksum(&self.buf[1..crc_at], extra);
                let actual = u16::from_le_bytes([self.buf[crc_at], self.buf[crc_at + 1]]);
                if expected != actual {
                    // Sentinel was likely a stray byte; rescan from the next one.
                    self.buf.drain(..1);
                    return Some(Err(DecodeError::Checksum {
                        msg_id,
                        expected,
                        actual,
                    }));
                }
            }
            None => {
                if self.buf.len() > total && !is_sentinel(self.buf[total]) {
                    self.buf.drain(..1);
                    return Some(Err(DecodeError::Unframed { msg_id }));
                }
            }
        }

        let frame = RawFrame {
            variant,
            sequence,
            system_id,
            component_id,
            msg_id,
            payload: self.buf[header_len..crc_at].to_vec(),
        };
        self.buf.drain(..total);
        Some(Ok(frame))
    }

    /// First offset in `1..end` holding a complete frame whose checksum
    /// verifies.
    fn verified_frame_within(&self, end: usize) -> Option<usize> {
        (1..end).find(|&i| is_sentinel(self.buf[i]) && self.verifies_at(i))
    }

    fn verifies_at(&self, start: usize) -> bool {
        let b = &self.buf[start..];
        let (header_len, msg_id) = match b[0] {
            STX_LEGACY if b.len() >= HEADER_LEN_LEGACY => (HEADER_LEN_LEGACY, b[5] as u32),
            STX_V2 if b.len() >= HEADER_LEN_V2 => {
                if b[2] & !INCOMPAT_SIGNED != 0 {
                    return false;
                }
                (HEADER_LEN_V2, u32::from_le_bytes([b[7], b[8], b[9], 0]))
            }
            _ => return false,
        };
        let Some(extra) = protocol::crc_extra(msg_id) else {
            return false;
        };
        let crc_at = header_len + b[1] as usize;
        if b.len() < crc_at + CHECKSUM_LEN {
            return false;
        }
        protocol::frame_checksum(&b[1..crc_at], extra)
            == u16::from_le_bytes([b[crc_at], b[crc_at + 1]])
    }

    /// Iterate over every frame (and decode error) currently available.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { splitter: self }
    }
}

/// Draining iterator returned by [`FrameSplitter::frames`].
pub struct Frames<'a> {
    splitter: &'a mut FrameSplitter,
}

impl Iterator for Frames<'_> {
    type Item = Result<RawFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.splitter.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, encode_heartbeat, FrameHeader, MSG_HEARTBEAT};

    fn header(variant: ProtocolVariant, sequence: u8) -> FrameHeader {
        FrameHeader {
            variant,
            sequence,
            system_id: 1,
            component_id: 1,
        }
    }

    fn vehicle_heartbeat(variant: ProtocolVariant, sequence: u8, base_mode: u8) -> Vec<u8> {
        let payload = [0, 0, 0, 0, 2, 3, base_mode, 4, 3];
        encode_frame(&header(variant, sequence), MSG_HEARTBEAT, &payload)
    }

    fn collect(splitter: &mut FrameSplitter) -> Vec<Result<RawFrame, DecodeError>> {
        splitter.frames().collect()
    }

    #[test]
    fn test_two_concatenated_frames() {
        let mut chunk = vehicle_heartbeat(ProtocolVariant::V2, 1, 0x80);
        chunk.extend(vehicle_heartbeat(ProtocolVariant::V2, 2, 0x00));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        let frames = collect(&mut splitter);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().sequence, 1);
        assert_eq!(frames[1].as_ref().unwrap().sequence, 2);
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let bytes = vehicle_heartbeat(ProtocolVariant::Legacy, 9, 0x80);
        let (a, b) = bytes.split_at(5);

        let mut splitter = FrameSplitter::new();
        splitter.push(a);
        assert!(splitter.next_frame().is_none());
        assert_eq!(splitter.buffered(), 5);

        splitter.push(b);
        let frame = splitter.next_frame().unwrap().unwrap();
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.variant, ProtocolVariant::Legacy);
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn test_frame_split_inside_header() {
        let bytes = vehicle_heartbeat(ProtocolVariant::V2, 3, 0);
        let mut splitter = FrameSplitter::new();
        splitter.push(&bytes[..1]);
        assert!(splitter.next_frame().is_none());
        splitter.push(&bytes[1..]);
        assert_eq!(splitter.next_frame().unwrap().unwrap().sequence, 3);
    }

    #[test]
    fn test_dispatch_on_sentinel() {
        let mut chunk = vehicle_heartbeat(ProtocolVariant::Legacy, 1, 0);
        chunk.extend(vehicle_heartbeat(ProtocolVariant::V2, 2, 0));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        let variants: Vec<ProtocolVariant> = splitter
            .frames()
            .map(|f| f.unwrap().variant)
            .collect();
        assert_eq!(variants, vec![ProtocolVariant::Legacy, ProtocolVariant::V2]);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut chunk = vec![0x00, 0x11, 0x22];
        chunk.extend(vehicle_heartbeat(ProtocolVariant::V2, 5, 0x80));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        assert_eq!(splitter.next_frame(), Some(Err(DecodeError::Garbage(3))));
        assert_eq!(splitter.next_frame().unwrap().unwrap().sequence, 5);
    }

    #[test]
    fn test_resync_after_bad_checksum() {
        let mut corrupt = vehicle_heartbeat(ProtocolVariant::V2, 1, 0x80);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        let mut chunk = corrupt;
        chunk.extend(vehicle_heartbeat(ProtocolVariant::V2, 2, 0x80));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        let results = collect(&mut splitter);

        assert!(matches!(
            results[0],
            Err(DecodeError::Checksum { msg_id: 0, .. })
        ));
        let good: Vec<u8> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|f| f.sequence)
            .collect();
        assert_eq!(good, vec![2]);
    }

    #[test]
    fn test_unknown_incompat_flags_rejected() {
        let mut bytes = encode_heartbeat(&header(ProtocolVariant::V2, 0));
        bytes[2] = 0x02;
        let mut splitter = FrameSplitter::new();
        splitter.push(&bytes);
        assert_eq!(
            splitter.next_frame(),
            Some(Err(DecodeError::IncompatFlags(0x02)))
        );
    }

    #[test]
    fn test_signed_frame_skips_signature() {
        let mut bytes = vehicle_heartbeat(ProtocolVariant::V2, 4, 0);
        bytes[2] = INCOMPAT_SIGNED;
        // Checksum covers the incompat flags byte, so recompute it.
        let crc_at = bytes.len() - CHECKSUM_LEN;
        let crc = protocol::frame_checksum(&bytes[1..crc_at], 50);
        bytes[crc_at..].copy_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&[0xAA; SIGNATURE_LEN]);
        bytes.extend(vehicle_heartbeat(ProtocolVariant::V2, 5, 0));

        let mut splitter = FrameSplitter::new();
        splitter.push(&bytes);
        let seqs: Vec<u8> = splitter.frames().map(|f| f.unwrap().sequence).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn test_unknown_id_passes_through() {
        let bytes = encode_frame(&header(ProtocolVariant::V2, 0), 11_000, &[7, 7]);
        let mut splitter = FrameSplitter::new();
        splitter.push(&bytes);
        let frame = splitter.next_frame().unwrap().unwrap();
        assert_eq!(frame.msg_id, 11_000);
        assert_eq!(frame.payload, vec![7, 7]);
    }

    #[test]
    fn test_stray_sentinel_does_not_swallow_frames() {
        let mut splitter = FrameSplitter::new();
        let mut first = vec![STX_LEGACY];
        first.extend(vehicle_heartbeat(ProtocolVariant::Legacy, 0, 0x80));
        splitter.push(&first);

        let mut seqs = Vec::new();
        let mut errors = Vec::new();
        for r in splitter.frames() {
            match r {
                Ok(f) => seqs.push(f.sequence),
                Err(e) => errors.push(e),
            }
        }
        assert_eq!(seqs, vec![0]);
        assert_eq!(errors, vec![DecodeError::Garbage(1)]);

        for seq in 1..16 {
            splitter.push(&vehicle_heartbeat(ProtocolVariant::Legacy, seq, 0x80));
            for r in splitter.frames() {
                seqs.push(r.unwrap().sequence);
            }
        }
        assert_eq!(seqs, (0..16).collect::<Vec<u8>>());
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_unverifiable_frame_needs_sentinel_after_it() {
        // Legacy-looking frame with an id we have no checksum seed for,
        // followed by a non-sentinel byte, then a real heartbeat.
        let mut chunk = vec![STX_LEGACY, 2, 0, 0, 0, 99, 0, 0, 0x10, 0x20, 0x11];
        chunk.extend(vehicle_heartbeat(ProtocolVariant::Legacy, 7, 0));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        let results = collect(&mut splitter);

        assert_eq!(results[0], Err(DecodeError::Unframed { msg_id: 99 }));
        let good: Vec<u32> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|f| f.msg_id)
            .collect();
        assert_eq!(good, vec![MSG_HEARTBEAT]);
    }

    #[test]
    fn test_unknown_id_followed_by_frame_passes_through() {
        let mut chunk = encode_frame(&header(ProtocolVariant::V2, 0), 11_000, &[7, 7]);
        chunk.extend(vehicle_heartbeat(ProtocolVariant::V2, 1, 0));

        let mut splitter = FrameSplitter::new();
        splitter.push(&chunk);
        let ids: Vec<u32> = splitter.frames().map(|f| f.unwrap().msg_id).collect();
        assert_eq!(ids, vec![11_000, MSG_HEARTBEAT]);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut splitter = FrameSplitter::new();
        splitter.push(&[STX_V2, 0xFF]);
        splitter.push(&vec![0u8; MAX_BUFFERED]);
        assert_eq!(splitter.buffered(), MAX_BUFFERED);
    }
}
