//! Shared fixtures: a big-endian, uncompressed miniSEED 2 record encoder
//! for writing waveform files the decoder reads back.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use chrono::{Datelike, Duration, Timelike};
use growxcor_engine::WaveformTrace;

pub const INT16: u8 = 1;
pub const INT32: u8 = 3;
pub const FLOAT32: u8 = 4;
pub const FLOAT64: u8 = 5;

const DATA_OFFSET: usize = 64;
const TIME_CORRECTED: u8 = 0x02;

/// Writes traces as data records with blockettes 1000 and 1001. Panics on
/// samples or rates the chosen layout cannot hold.
#[derive(Debug, Clone, Copy)]
pub struct RecordEncoder {
    encoding: u8,
    record_len: usize,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self {
            encoding: FLOAT64,
            record_len: 512,
        }
    }

    pub fn with_encoding(mut self, encoding: u8) -> Self {
        assert!(matches!(encoding, INT16 | INT32 | FLOAT32 | FLOAT64));
        self.encoding = encoding;
        self
    }

    pub fn with_record_exponent(mut self, exponent: u8) -> Self {
        self.record_len = 1 << exponent;
        self
    }

    pub fn encode(&self, traces: &[WaveformTrace]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut sequence = 1u32;
        for trace in traces {
            self.encode_trace(trace, &mut sequence, &mut out);
        }
        out
    }

    pub fn write(&self, path: &Path, traces: &[WaveformTrace]) {
        fs::write(path, self.encode(traces)).unwrap();
    }

    fn width(&self) -> usize {
        match self.encoding {
            INT16 => 2,
            INT32 | FLOAT32 => 4,
            _ => 8,
        }
    }

    fn encode_trace(&self, trace: &WaveformTrace, sequence: &mut u32, out: &mut Vec<u8>) {
        let (factor, multiplier) = rate_factor(trace.sampling_rate);
        let width = self.width();
        let per_record = (self.record_len - DATA_OFFSET) / width;

        for (chunk_index, chunk) in trace.samples.chunks(per_record).enumerate() {
            let first_sample = chunk_index * per_record;
            let offset_ns = (first_sample as f64 / trace.sampling_rate * 1e9).round() as i64;
            let start = trace.start + Duration::nanoseconds(offset_ns);

            let mut record = vec![0u8; self.record_len];
            record[0..6].copy_from_slice(format!("{:06}", *sequence).as_bytes());
            record[6] = b'D';
            record[7] = b' ';
            record[8..13].copy_from_slice(format!("{:<5}", trace.station.as_str()).as_bytes());
            record[13..15].copy_from_slice(format!("{:<2}", trace.location).as_bytes());
            record[15..18].copy_from_slice(format!("{:<3}", trace.channel.as_str()).as_bytes());
            record[18..20].copy_from_slice(format!("{:<2}", trace.network).as_bytes());

            let micros = i64::from(start.timestamp_subsec_micros());
            let tenth_ms = micros / 100;
            record[20..22].copy_from_slice(&(start.year() as u16).to_be_bytes());
            record[22..24].copy_from_slice(&(start.ordinal() as u16).to_be_bytes());
            record[24] = start.hour() as u8;
            record[25] = start.minute() as u8;
            record[26] = start.second() as u8;
            record[28..30].copy_from_slice(&(tenth_ms as u16).to_be_bytes());
            record[30..32].copy_from_slice(&(chunk.len() as u16).to_be_bytes());
            record[32..34].copy_from_slice(&factor.to_be_bytes());
            record[34..36].copy_from_slice(&multiplier.to_be_bytes());
            record[36] = TIME_CORRECTED;
            record[39] = 2;
            record[44..46].copy_from_slice(&(DATA_OFFSET as u16).to_be_bytes());
            record[46..48].copy_from_slice(&48u16.to_be_bytes());

            // blockette 1000 at 48, 1001 at 56 for the microsecond remainder
            record[48..50].copy_from_slice(&1000u16.to_be_bytes());
            record[50..52].copy_from_slice(&56u16.to_be_bytes());
            record[52] = self.encoding;
            record[53] = 1;
            record[54] = self.record_len.trailing_zeros() as u8;
            record[56..58].copy_from_slice(&1001u16.to_be_bytes());
            record[61] = (micros - tenth_ms * 100) as i8 as u8;

            for (k, &value) in chunk.iter().enumerate() {
                let at = DATA_OFFSET + k * width;
                let slot = &mut record[at..at + width];
                match self.encoding {
                    INT16 => slot.copy_from_slice(&(value as i16).to_be_bytes()),
                    INT32 => slot.copy_from_slice(&(value as i32).to_be_bytes()),
                    FLOAT32 => slot.copy_from_slice(&(value as f32).to_be_bytes()),
                    _ => slot.copy_from_slice(&value.to_be_bytes()),
                }
            }
            out.extend_from_slice(&record);
            *sequence += 1;
        }
    }
}

/// SEED rate factor and multiplier for integral rates or periods.
fn rate_factor(rate: f64) -> (i16, i16) {
    if rate.fract() == 0.0 {
        return (rate as i16, 1);
    }
    let period = 1.0 / rate;
    assert_eq!(period.fract(), 0.0, "rate {rate} has no integral form");
    (-(period as i16), 1)
}
