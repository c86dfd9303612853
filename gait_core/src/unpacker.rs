//! Stage 1: parse a raw binary session file into a typed sample sequence.
//!
//! Record layout (little-endian, packed, no padding), 61 bytes per sample:
//! `u8 header`, `f64 timestamp`, then four `f32[3]` triplets in the fixed
//! channel order `acc_thigh, gyro_thigh, acc_shank, gyro_shank`.

use crate::error::{GaitError, Result};
use crate::types::SensorSample;

/// Size in bytes of one packed sample record.
pub const RECORD_SIZE: usize = 1 + 8 + 4 * 3 * 4;

/// Parse a packed binary buffer into a contiguous sample sequence.
///
/// Empty input yields an empty array and is not an error. A nonzero byte
/// count that is not an exact multiple of [`RECORD_SIZE`] is a truncated
/// trailing record and fails with `GaitError::MalformedInput`.
#[tracing::instrument(level = "debug", skip(data), fields(len = data.len()))]
pub fn unpack(data: &[u8]) -> Result<Vec<SensorSample>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() % RECORD_SIZE != 0 {
        return Err(GaitError::MalformedInput {
            reason: format!(
                "buffer length {} is not a multiple of the {}-byte record size",
                data.len(),
                RECORD_SIZE
            ),
            offset: (data.len() / RECORD_SIZE) * RECORD_SIZE,
        }
        .into());
    }

    let n = data.len() / RECORD_SIZE;
    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let rec = &data[i * RECORD_SIZE..(i + 1) * RECORD_SIZE];
        samples.push(parse_record(rec));
    }
    tracing::debug!(sample_count = samples.len(), "unpacked session");
    Ok(samples)
}

fn parse_record(rec: &[u8]) -> SensorSample {
    debug_assert_eq!(rec.len(), RECORD_SIZE);
    // rec[0] is the header byte; unused beyond framing, the record shape is fixed.
    let mut ts_bytes = [0u8; 8];
    ts_bytes.copy_from_slice(&rec[1..9]);
    let timestamp = f64::from_le_bytes(ts_bytes);

    let mut offset = 9;
    let mut read_vec3 = || -> [f32; 3] {
        let mut v = [0.0f32; 3];
        for item in v.iter_mut() {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&rec[offset..offset + 4]);
            *item = f32::from_le_bytes(bytes);
            offset += 4;
        }
        v
    };

    let acc_thigh = read_vec3();
    let gyro_thigh = read_vec3();
    let acc_shank = read_vec3();
    let gyro_shank = read_vec3();

    SensorSample {
        timestamp,
        acc_thigh,
        gyro_thigh,
        acc_shank,
        gyro_shank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_record(header: u8, timestamp: f64, channels: [[f32; 3]; 4]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        buf.push(header);
        buf.extend_from_slice(&timestamp.to_le_bytes());
        for ch in channels {
            for v in ch {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let out = unpack(&[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_trailing_record_is_malformed() {
        let mut buf = encode_record(1, 0.0, [[0.0; 3]; 4]);
        buf.truncate(RECORD_SIZE - 3);
        let err = unpack(&buf).unwrap_err();
        assert!(err.to_string().contains("malformed input"));
    }

    #[test]
    fn round_trips_a_single_record() {
        let channels = [
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [10.0, 11.0, 12.0],
        ];
        let buf = encode_record(7, 1.5, channels);
        let samples = unpack(&buf).unwrap();
        assert_eq!(samples.len(), 1);
        let s = samples[0];
        assert_eq!(s.timestamp, 1.5);
        assert_eq!(s.acc_thigh, channels[0]);
        assert_eq!(s.gyro_thigh, channels[1]);
        assert_eq!(s.acc_shank, channels[2]);
        assert_eq!(s.gyro_shank, channels[3]);
    }

    #[test]
    fn parses_multiple_records_in_order() {
        let mut buf = Vec::new();
        for i in 0..5 {
            buf.extend(encode_record(0, i as f64 * 0.008, [[i as f32; 3]; 4]));
        }
        let samples = unpack(&buf).unwrap();
        assert_eq!(samples.len(), 5);
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.timestamp, i as f64 * 0.008);
        }
    }
}
