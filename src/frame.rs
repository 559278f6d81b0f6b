/// Wire framing for the dongle's serial protocol: sync byte, length, message type,
/// channel number, payload, and a running XOR checksum, with an optional extended
/// channel-ID suffix appended to broadcast/ack payloads longer than 8 bytes.
use std::time::Instant;

use crate::error::FrameDecodeError;

pub const SYNC: u8 = 0xA4;

const HEADER_LEN: usize = 4; // SYNC, LEN, TYPE, CHAN
const MIN_FRAME_LEN: usize = 5; // SYNC, LEN, TYPE, CHAN, XCRC (empty data)

const EXT_FLAG_CHAN_ID: u8 = 0x80;
const EXT_FLAG_RSSI: u8 = 0x40;
const EXT_FLAG_TIMESTAMP: u8 = 0x20;
const EXT_CHAN_ID_SUFFIX_LEN: usize = 5; // flags + id_lo + id_hi + dev_type + trans_type

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub msg_type: u8,
    pub channel: u8,
    pub payload: Vec<u8>,
    pub device_id: Option<(u16, u8)>,
    pub timestamp: Instant,
}

impl Frame {
    /// Builds a frame for encoding, stamped with the current time. Outbound frames never
    /// carry an extended device id; only the dongle attaches that suffix to broadcasts.
    pub fn new(msg_type: u8, channel: u8, payload: &[u8]) -> Self {
        Frame {
            msg_type,
            channel,
            payload: payload.to_vec(),
            device_id: None,
            timestamp: Instant::now(),
        }
    }

    /// Encodes the frame into its wire representation. `LEN` counts the channel byte plus
    /// the payload; `XCRC` is the running XOR of every byte from `SYNC` through the last
    /// payload byte.
    pub fn encode(&self) -> Vec<u8> {
        let data_len = self.payload.len() + 1; // + CHAN byte
        let mut buf = Vec::with_capacity(HEADER_LEN + data_len + 1);
        buf.push(SYNC);
        buf.push(data_len as u8);
        buf.push(self.msg_type);
        buf.push(self.channel);
        buf.extend_from_slice(&self.payload);

        let mut checksum = 0u8;
        for b in &buf {
            checksum ^= b;
        }
        buf.push(checksum);
        buf
    }

    /// Decodes a single frame from the start of `buf`. `buf` must contain exactly one
    /// frame's worth of bytes, as already delimited by [`scan_stream`].
    fn decode(buf: &[u8]) -> Result<Frame, FrameDecodeError> {
        if buf.len() < MIN_FRAME_LEN {
            return Err(FrameDecodeError::ShortFrame);
        }
        if buf[0] != SYNC {
            return Err(FrameDecodeError::BadSync);
        }
        let data_len = buf[1] as usize;
        if data_len != buf.len() - HEADER_LEN {
            return Err(FrameDecodeError::LenMismatch);
        }

        let mut checksum = 0u8;
        for b in &buf[..buf.len() - 1] {
            checksum ^= b;
        }
        if checksum != buf[buf.len() - 1] {
            return Err(FrameDecodeError::BadCrc);
        }

        let msg_type = buf[2];
        let channel = buf[3];
        let data = &buf[HEADER_LEN..HEADER_LEN + data_len - 1];
        let (payload, device_id) = split_extended_suffix(data);

        Ok(Frame {
            msg_type,
            channel,
            payload,
            device_id,
            timestamp: Instant::now(),
        })
    }
}

/// Splits a trailing extended channel-ID suffix (if present) off of a decoded payload.
/// The flags byte is located by counting back from the end of the payload rather than
/// assuming a fixed base length, since device pages vary in width.
fn split_extended_suffix(data: &[u8]) -> (Vec<u8>, Option<(u16, u8)>) {
    if data.len() <= 8 {
        return (data.to_vec(), None);
    }

    let flags_pos = data.len() - EXT_CHAN_ID_SUFFIX_LEN;
    let flags = data[flags_pos];
    if flags & EXT_FLAG_CHAN_ID != 0 {
        let suffix = &data[flags_pos + 1..];
        let id_lo = suffix[0] as u16;
        let id_hi = suffix[1] as u16;
        let dev_type = suffix[2];
        let device_id = (id_lo | (id_hi << 8), dev_type);
        return (data[..flags_pos].to_vec(), Some(device_id));
    }
    // RSSI/timestamp-only extensions carry no device id; drop the flags byte but keep
    // the base page intact for the caller.
    if flags & (EXT_FLAG_RSSI | EXT_FLAG_TIMESTAMP) != 0 {
        return (data[..flags_pos].to_vec(), None);
    }
    (data.to_vec(), None)
}

/// Scans a raw read buffer for frames. A single USB bulk read may coalesce several
/// frames; malformed prefixes are skipped byte-by-byte until the next sync byte.
pub fn scan_stream(buf: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut index = 0;
    while index < buf.len() {
        if buf[index] != SYNC {
            index += 1;
            continue;
        }
        if index + 1 >= buf.len() {
            break;
        }
        let data_len = buf[index + 1] as usize;
        let frame_len = HEADER_LEN + data_len + 1;
        if index + frame_len > buf.len() {
            break;
        }
        match Frame::decode(&buf[index..index + frame_len]) {
            Ok(frame) => {
                frames.push(frame);
                index += frame_len;
            }
            Err(_) => index += 1,
        }
    }
    frames
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_sanity() {
        let frame = Frame::new(0x4A, 0, &[0x00]);
        let buf = frame.encode();
        assert_eq!(buf[0], SYNC);
        assert_eq!(buf[1], 2); // CHAN + one payload byte
        assert_eq!(buf[2], 0x4A);
        assert_eq!(buf[3], 0);
        assert_eq!(buf[4], 0x00);
        let mut checksum = 0u8;
        for b in &buf[..5] {
            checksum ^= b;
        }
        assert_eq!(buf[5], checksum);
    }

    #[test]
    fn round_trip_standard_payload() {
        let frame = Frame::new(0x4E, 3, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let buf = frame.encode();
        let decoded = Frame::decode(&buf).unwrap();
        assert_eq!(decoded.msg_type, frame.msg_type);
        assert_eq!(decoded.channel, frame.channel);
        assert_eq!(decoded.payload, frame.payload);
        assert_eq!(decoded.device_id, None);
    }

    #[test]
    fn xor_of_encoded_bytes_is_zero() {
        let frame = Frame::new(0x42, 1, &[0, 0, 0]);
        let buf = frame.encode();
        let xor = buf.iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(xor, 0);
    }

    #[test]
    fn decode_short_frame() {
        assert_eq!(Frame::decode(&[0xA4, 0, 0]), Err(FrameDecodeError::ShortFrame));
    }

    #[test]
    fn decode_bad_sync() {
        let frame = Frame::new(0x4A, 0, &[0x00]);
        let mut buf = frame.encode();
        buf[0] = 0x00;
        assert_eq!(Frame::decode(&buf), Err(FrameDecodeError::BadSync));
    }

    #[test]
    fn decode_len_mismatch() {
        let frame = Frame::new(0x4A, 0, &[0x00]);
        let mut buf = frame.encode();
        buf[1] = 0xFF;
        assert_eq!(Frame::decode(&buf), Err(FrameDecodeError::LenMismatch));
    }

    #[test]
    fn decode_bad_crc() {
        let frame = Frame::new(0x4A, 0, &[0x00]);
        let mut buf = frame.encode();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert_eq!(Frame::decode(&buf), Err(FrameDecodeError::BadCrc));
    }

    #[test]
    fn decode_extended_channel_id() {
        // Base page [0x04, 0, 0, 0, 0xA1, 0xA2] (6 bytes) followed by an EXT_CHAN_ID
        // suffix: flags=0x80, id_lo=0x2D, id_hi=0xD4, dev_type=0x0B, trans_type=0x00.
        let data = [0x04u8, 0x00, 0x00, 0x00, 0xA1, 0xA2, 0x80, 0x2D, 0xD4, 0x0B, 0x00];
        let frame = Frame::new(0x4E, 2, &data);
        let buf = frame.encode();
        let decoded = Frame::decode(&buf).unwrap();
        assert_eq!(decoded.msg_type, 0x4E);
        assert_eq!(decoded.channel, 2);
        assert_eq!(decoded.payload, vec![0x04, 0x00, 0x00, 0x00, 0xA1, 0xA2]);
        assert_eq!(decoded.device_id, Some((0xD42D, 0x0B)));
    }

    #[test]
    fn scan_stream_skips_malformed_prefix() {
        let good = Frame::new(0x6F, 0, &[0x00]).encode();
        let mut stream = vec![0x00, 0x01, 0x02];
        stream.extend_from_slice(&good);
        stream.extend_from_slice(&good);
        let frames = scan_stream(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].msg_type, 0x6F);
        assert_eq!(frames[1].msg_type, 0x6F);
    }

    #[test]
    fn scan_stream_truncated_frame_yields_nothing() {
        let good = Frame::new(0x6F, 0, &[0x00]).encode();
        let truncated = &good[..good.len() - 2];
        let frames = scan_stream(truncated);
        assert!(frames.is_empty());
    }
}
