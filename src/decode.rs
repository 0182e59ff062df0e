//! Sample decoding
//!
//! Frame stripping and conversion of raw capture buffers into per-axis
//! readings. Pure functions, no device interaction.

use alloc::vec::Vec;
use core::fmt::{self, Display};

use crate::{Range, G};

/// Payload bytes per sample: X/Y/Z as little-endian i16 pairs
pub const SAMPLE_LEN: usize = 6;
/// Wire frame per sample: address-phase artifact byte plus payload
pub const FRAME_LEN: usize = SAMPLE_LEN + 1;

/// Buffer length is not a multiple of the expected chunk size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MalformedBuffer {
    pub len:   usize,
    pub chunk: usize,
}

impl Display for MalformedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer of {} bytes is not a multiple of {}", self.len, self.chunk)
    }
}

/// Drop the leading artifact byte of each raw transaction frame, preserving
/// sample order. Input must be whole frames.
pub fn strip_frames(raw: &[u8]) -> Result<Vec<u8>, MalformedBuffer> {
    if raw.len() % FRAME_LEN != 0 {
        return Err(MalformedBuffer { len: raw.len(), chunk: FRAME_LEN });
    }

    let mut out = Vec::with_capacity(raw.len() / FRAME_LEN * SAMPLE_LEN);
    for frame in raw.chunks_exact(FRAME_LEN) {
        out.extend_from_slice(&frame[1..]);
    }
    Ok(out)
}

/// Decode a stripped sample buffer into x, y, z readings in LSB units.
///
/// Each 6-byte group holds three little-endian 16-bit words; values above
/// 32767 are the two's-complement negatives, which is exactly what
/// `i16::from_le_bytes` yields.
pub fn decode_xyz(buf: &[u8]) -> Result<(Vec<i16>, Vec<i16>, Vec<i16>), MalformedBuffer> {
    if buf.len() % SAMPLE_LEN != 0 {
        return Err(MalformedBuffer { len: buf.len(), chunk: SAMPLE_LEN });
    }

    let n = buf.len() / SAMPLE_LEN;
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    let mut zs = Vec::with_capacity(n);

    for s in buf.chunks_exact(SAMPLE_LEN) {
        xs.push(i16::from_le_bytes([s[0], s[1]]));
        ys.push(i16::from_le_bytes([s[2], s[3]]));
        zs.push(i16::from_le_bytes([s[4], s[5]]));
    }

    Ok((xs, ys, zs))
}

/// Convert a raw reading to m/s^2 for the 10-bit right-justified data format
/// this driver programs.
#[inline]
pub fn lsb_to_ms2(lsb: i16, range: Range) -> f32 {
    lsb as f32 / range.lsb_per_g() as f32 * G
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_splits_into_three_equal_sequences() {
        let buf = [1u8, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0];
        let (xs, ys, zs) = decode_xyz(&buf).unwrap();
        assert_eq!(xs, vec![1, 4]);
        assert_eq!(ys, vec![2, 5]);
        assert_eq!(zs, vec![3, 6]);
    }

    #[test]
    fn decode_of_empty_buffer_is_empty() {
        let (xs, ys, zs) = decode_xyz(&[]).unwrap();
        assert!(xs.is_empty() && ys.is_empty() && zs.is_empty());
    }

    #[test]
    fn decode_rejects_lengths_not_divisible_by_six() {
        for len in [1usize, 2, 3, 4, 5, 7, 11, 13] {
            let buf = vec![0u8; len];
            assert_eq!(
                decode_xyz(&buf),
                Err(MalformedBuffer { len, chunk: SAMPLE_LEN })
            );
        }
    }

    #[test]
    fn twos_complement_corner_values() {
        // FF FF -> -1, 00 80 -> -32768, FF 7F -> 32767, 00 00 -> 0
        let buf = [0xFF, 0xFF, 0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x01, 0x00, 0xFE, 0xFF];
        let (xs, ys, zs) = decode_xyz(&buf).unwrap();
        assert_eq!(xs, vec![-1, 0]);
        assert_eq!(ys, vec![-32768, 1]);
        assert_eq!(zs, vec![32767, -2]);
    }

    #[test]
    fn strip_frames_drops_exactly_the_leading_byte_of_each_frame() {
        let mut raw = Vec::new();
        for i in 0..4u8 {
            raw.push(0xAA); // artifact
            raw.extend_from_slice(&[i, i + 10, i + 20, i + 30, i + 40, i + 50]);
        }
        let stripped = strip_frames(&raw).unwrap();
        assert_eq!(stripped.len(), 4 * SAMPLE_LEN);
        for (i, s) in stripped.chunks_exact(SAMPLE_LEN).enumerate() {
            let i = i as u8;
            assert_eq!(s, [i, i + 10, i + 20, i + 30, i + 40, i + 50]);
        }
    }

    #[test]
    fn strip_frames_rejects_partial_frames() {
        let raw = vec![0u8; FRAME_LEN * 2 + 3];
        assert_eq!(
            strip_frames(&raw),
            Err(MalformedBuffer { len: raw.len(), chunk: FRAME_LEN })
        );
    }

    #[test]
    fn lsb_conversion_uses_the_range_scale() {
        // 10-bit mode: 256 LSB/g at 2g full scale
        let ms2 = lsb_to_ms2(256, Range::R2G);
        assert!((ms2 - G).abs() < 1e-4);
        let ms2 = lsb_to_ms2(-32, Range::R16G);
        assert!((ms2 + G).abs() < 1e-4);
    }
}
