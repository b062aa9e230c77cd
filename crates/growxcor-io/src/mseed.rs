//! miniSEED 2 record decoder.
//!
//! Decodes data records carrying blockette 1000 into [`WaveformTrace`]s,
//! merging contiguous records of one channel. Supported encodings are
//! int16, int32, float32, float64, Steim-1 and Steim-2.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use growxcor_engine::{Channel, Station, WaveformTrace, seconds_between};
use tracing::{debug, instrument, warn};

use crate::{IoError, MseedError};

const FIXED_HEADER_LEN: usize = 48;
const STEIM_FRAME_LEN: usize = 64;
const ACTIVITY_TIME_CORRECTED: u8 = 0x02;

/// Data encodings understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleEncoding {
    Int16,
    Int32,
    Float32,
    Float64,
    Steim1,
    Steim2,
}

impl SampleEncoding {
    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Float32,
            5 => Self::Float64,
            10 => Self::Steim1,
            11 => Self::Steim2,
            _ => return None,
        })
    }

    /// Bytes per sample of an uncompressed encoding.
    fn sample_width(self) -> Option<usize> {
        match self {
            Self::Int16 => Some(2),
            Self::Int32 | Self::Float32 => Some(4),
            Self::Float64 => Some(8),
            Self::Steim1 | Self::Steim2 => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

/// Cursor-free reads at fixed offsets with a runtime byte order.
struct Bytes<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl Bytes<'_> {
    fn array<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[at..at + N]);
        if self.order == ByteOrder::Little {
            out.reverse();
        }
        out
    }

    fn u8(&self, at: usize) -> u8 {
        self.data[at]
    }

    fn u16(&self, at: usize) -> u16 {
        u16::from_be_bytes(self.array(at))
    }

    fn i16(&self, at: usize) -> i16 {
        i16::from_be_bytes(self.array(at))
    }

    fn u32(&self, at: usize) -> u32 {
        u32::from_be_bytes(self.array(at))
    }

    fn i32(&self, at: usize) -> i32 {
        i32::from_be_bytes(self.array(at))
    }

    fn f32(&self, at: usize) -> f32 {
        f32::from_be_bytes(self.array(at))
    }

    fn f64(&self, at: usize) -> f64 {
        f64::from_be_bytes(self.array(at))
    }
}

/// One decoded data record.
#[derive(Debug, Clone)]
struct Record {
    network: String,
    station: String,
    location: String,
    channel: String,
    start: DateTime<Utc>,
    sampling_rate: f64,
    samples: Vec<f64>,
}

/// Reads every trace from a miniSEED file.
pub struct MseedReader {
    path: PathBuf,
}

impl MseedReader {
    /// Create a reader for the given file.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Decode the file into traces, in order of first appearance.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
    /// | [`IoError::MiniSeed`] | A record cannot be decoded |
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Vec<WaveformTrace>, IoError> {
        let bytes = fs::read(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        decode(&bytes).map_err(|source| IoError::MiniSeed {
            path: self.path.clone(),
            source,
        })
    }
}

/// Decode a byte buffer of concatenated miniSEED 2 records.
///
/// Records of the same channel and sampling rate whose start time falls
/// within half a sample of the previous record's end are merged.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`MseedError::Truncated`] | A record is cut short |
/// | [`MseedError::InvalidHeader`] | A header field is out of range |
/// | [`MseedError::MissingBlockette1000`] | A record lacks blockette 1000 |
/// | [`MseedError::UnsupportedEncoding`] | The data encoding is not supported |
/// | [`MseedError::SampleCountMismatch`] | Compressed frames end early |
pub fn decode(bytes: &[u8]) -> Result<Vec<WaveformTrace>, MseedError> {
    let mut traces: Vec<WaveformTrace> = Vec::new();
    let mut offset = 0;
    let mut n_records = 0;

    while offset < bytes.len() {
        // Trailing zero padding is not a record.
        if bytes[offset..].iter().all(|&b| b == 0) {
            break;
        }
        let (record, record_len) = decode_record(bytes, offset)?;
        offset += record_len;
        n_records += 1;
        if let Some(record) = record {
            merge(&mut traces, record);
        }
    }

    debug!(n_records, n_traces = traces.len(), "miniSEED decoded");
    Ok(traces)
}

fn merge(traces: &mut Vec<WaveformTrace>, record: Record) {
    let target = traces.iter_mut().rev().find(|t| {
        t.network == record.network
            && t.station.as_str() == record.station
            && t.location == record.location
            && t.channel.as_str() == record.channel
            && t.sampling_rate == record.sampling_rate
    });
    if let Some(trace) = target {
        let expected = trace.len() as f64 / trace.sampling_rate;
        let gap = seconds_between(record.start, trace.start) - expected;
        if gap.abs() <= 0.5 / trace.sampling_rate {
            trace.samples.extend(record.samples);
            return;
        }
        debug!(trace = %trace.nslc(), gap, "non-contiguous record starts a new trace");
    }
    traces.push(WaveformTrace {
        network: record.network,
        station: Station::new(record.station),
        location: record.location,
        channel: Channel::new(record.channel),
        start: record.start,
        sampling_rate: record.sampling_rate,
        samples: record.samples,
    });
}

/// Decode the record at `offset`. Returns `None` for records without
/// samples, together with the record length.
fn decode_record(bytes: &[u8], offset: usize) -> Result<(Option<Record>, usize), MseedError> {
    let rest = &bytes[offset..];
    if rest.len() < FIXED_HEADER_LEN {
        return Err(MseedError::Truncated { offset });
    }
    let invalid = |reason: String| MseedError::InvalidHeader { offset, reason };

    let quality = rest[6];
    if !matches!(quality, b'D' | b'R' | b'Q' | b'M') {
        return Err(invalid(format!("unknown quality indicator {quality:#04x}")));
    }

    // The BTIME year decides the header byte order.
    let year_be = u16::from_be_bytes([rest[20], rest[21]]);
    let order = if (1900..=2500).contains(&year_be) {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
    let header = Bytes { data: rest, order };

    let mut start = btime(&header, 20).ok_or_else(|| invalid("invalid start time".into()))?;
    let n_samples = usize::from(header.u16(30));
    let mut sampling_rate = nominal_rate(header.i16(32), header.i16(34));
    let activity = header.u8(36);
    let n_blockettes = header.u8(39);
    let correction = header.i32(40);
    let data_offset = usize::from(header.u16(44));
    let mut blockette_offset = usize::from(header.u16(46));

    let mut b1000: Option<(u8, ByteOrder, usize)> = None;
    let mut micros: i64 = 0;
    for _ in 0..n_blockettes {
        if blockette_offset == 0 {
            break;
        }
        if blockette_offset + 4 > rest.len() {
            return Err(MseedError::Truncated { offset });
        }
        let kind = header.u16(blockette_offset);
        let next = usize::from(header.u16(blockette_offset + 2));
        match kind {
            1000 => {
                if blockette_offset + 8 > rest.len() {
                    return Err(MseedError::Truncated { offset });
                }
                let encoding = header.u8(blockette_offset + 4);
                let word_order = if header.u8(blockette_offset + 5) == 0 {
                    ByteOrder::Little
                } else {
                    ByteOrder::Big
                };
                let exponent = header.u8(blockette_offset + 6);
                if !(7..=20).contains(&exponent) {
                    return Err(invalid(format!("record length exponent {exponent}")));
                }
                b1000 = Some((encoding, word_order, 1usize << exponent));
            }
            100 => {
                if blockette_offset + 8 > rest.len() {
                    return Err(MseedError::Truncated { offset });
                }
                sampling_rate = f64::from(header.f32(blockette_offset + 4));
            }
            1001 => {
                if blockette_offset + 8 > rest.len() {
                    return Err(MseedError::Truncated { offset });
                }
                micros = i64::from(rest[blockette_offset + 5] as i8);
            }
            other => debug!(blockette = other, "blockette ignored"),
        }
        blockette_offset = next;
    }

    let (encoding_code, word_order, record_len) =
        b1000.ok_or(MseedError::MissingBlockette1000 { offset })?;
    if rest.len() < record_len {
        return Err(MseedError::Truncated { offset });
    }
    if n_samples == 0 {
        return Ok((None, record_len));
    }
    if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        return Err(invalid(format!("sampling rate {sampling_rate}")));
    }
    if data_offset < FIXED_HEADER_LEN || data_offset >= record_len {
        return Err(invalid(format!("data offset {data_offset}")));
    }

    if activity & ACTIVITY_TIME_CORRECTED == 0 {
        start += Duration::microseconds(i64::from(correction) * 100);
    }
    start += Duration::microseconds(micros);

    let encoding = SampleEncoding::from_code(encoding_code).ok_or(
        MseedError::UnsupportedEncoding {
            offset,
            encoding: encoding_code,
        },
    )?;
    let data = Bytes {
        data: &rest[data_offset..record_len],
        order: word_order,
    };
    let samples = decode_samples(&data, encoding, n_samples, offset)?;

    let text = |range: std::ops::Range<usize>| {
        String::from_utf8_lossy(&rest[range]).trim().to_string()
    };
    Ok((
        Some(Record {
            station: text(8..13),
            location: text(13..15),
            channel: text(15..18),
            network: text(18..20),
            start,
            sampling_rate,
            samples,
        }),
        record_len,
    ))
}

/// SEED BTIME at `at`: year, day of year, hour, minute, second, unused,
/// ten-thousandths of a second.
fn btime(b: &Bytes<'_>, at: usize) -> Option<DateTime<Utc>> {
    let year = i32::from(b.u16(at));
    let doy = u32::from(b.u16(at + 2));
    let hour = u32::from(b.u8(at + 4));
    let minute = u32::from(b.u8(at + 5));
    let second = u32::from(b.u8(at + 6));
    let fract = i64::from(b.u16(at + 8));
    if fract > 9999 || second > 60 {
        return None;
    }
    // A leap second is carried into the next minute.
    let time = NaiveDate::from_yo_opt(year, doy)?.and_hms_opt(hour, minute, second.min(59))?;
    let leap = i64::from(second == 60);
    Some(time.and_utc() + Duration::seconds(leap) + Duration::microseconds(fract * 100))
}

fn nominal_rate(factor: i16, multiplier: i16) -> f64 {
    let f = f64::from(factor);
    let m = f64::from(multiplier);
    match (factor.signum(), multiplier.signum()) {
        (0, _) | (_, 0) => 0.0,
        (1, 1) => f * m,
        (1, _) => -f / m,
        (_, 1) => -m / f,
        _ => 1.0 / (f * m),
    }
}

fn decode_samples(
    data: &Bytes<'_>,
    encoding: SampleEncoding,
    n: usize,
    offset: usize,
) -> Result<Vec<f64>, MseedError> {
    if let Some(width) = encoding.sample_width() {
        if n * width > data.data.len() {
            return Err(MseedError::Truncated { offset });
        }
        let samples = (0..n)
            .map(|i| {
                let at = i * width;
                match encoding {
                    SampleEncoding::Int16 => f64::from(data.i16(at)),
                    SampleEncoding::Int32 => f64::from(data.i32(at)),
                    SampleEncoding::Float32 => f64::from(data.f32(at)),
                    _ => data.f64(at),
                }
            })
            .collect();
        return Ok(samples);
    }

    let ints = decode_steim(data, encoding == SampleEncoding::Steim2, n, offset)?;
    Ok(ints.into_iter().map(f64::from).collect())
}

/// Sign-extend the low `bits` bits of `value`.
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Unpack Steim-1 or Steim-2 frames into `n` integer samples.
fn decode_steim(
    data: &Bytes<'_>,
    steim2: bool,
    n: usize,
    offset: usize,
) -> Result<Vec<i32>, MseedError> {
    let n_frames = data.data.len() / STEIM_FRAME_LEN;
    let mut diffs: Vec<i32> = Vec::with_capacity(n);
    let mut first = 0i32;
    let mut last = 0i32;

    'frames: for frame in 0..n_frames {
        let base = frame * STEIM_FRAME_LEN;
        let nibbles = data.u32(base);
        for word in 1..16 {
            let at = base + word * 4;
            if frame == 0 && word == 1 {
                first = data.i32(at);
                continue;
            }
            if frame == 0 && word == 2 {
                last = data.i32(at);
                continue;
            }
            let code = (nibbles >> (30 - 2 * word)) & 0b11;
            let w = data.u32(at);
            match (code, steim2) {
                (0, _) => {}
                (1, _) => {
                    diffs.extend(data.data[at..at + 4].iter().map(|&b| i32::from(b as i8)));
                }
                (2, false) => {
                    diffs.push(i32::from(data.i16(at)));
                    diffs.push(i32::from(data.i16(at + 2)));
                }
                (3, false) => diffs.push(data.i32(at)),
                (2, true) => {
                    let (count, bits) = match w >> 30 {
                        0b01 => (1, 30),
                        0b10 => (2, 15),
                        0b11 => (3, 10),
                        _ => {
                            return Err(MseedError::InvalidHeader {
                                offset,
                                reason: format!("invalid Steim-2 sub-code in frame {frame}"),
                            });
                        }
                    };
                    unpack(w, count, bits, &mut diffs);
                }
                (3, true) => {
                    let (count, bits) = match w >> 30 {
                        0b00 => (5, 6),
                        0b01 => (6, 5),
                        0b10 => (7, 4),
                        _ => {
                            return Err(MseedError::InvalidHeader {
                                offset,
                                reason: format!("invalid Steim-2 sub-code in frame {frame}"),
                            });
                        }
                    };
                    unpack(w, count, bits, &mut diffs);
                }
                _ => unreachable!("nibble codes are two bits"),
            }
            if diffs.len() >= n {
                break 'frames;
            }
        }
    }

    if diffs.len() < n {
        return Err(MseedError::SampleCountMismatch {
            offset,
            expected: n,
            decoded: diffs.len(),
        });
    }

    // The first difference refers to the previous record; the integration
    // constant replaces it.
    let mut samples = Vec::with_capacity(n);
    let mut current = first;
    samples.push(current);
    for &d in &diffs[1..n] {
        current = current.wrapping_add(d);
        samples.push(current);
    }
    if current != last {
        warn!(offset, decoded = current, expected = last, "Steim reverse integration constant mismatch");
    }
    Ok(samples)
}

/// Push `count` sign-extended `bits`-wide values packed high to low in the
/// low 30 bits of `word`.
fn unpack(word: u32, count: u32, bits: u32, diffs: &mut Vec<i32>) {
    let mask = (1u32 << bits) - 1;
    for k in (0..count).rev() {
        diffs.push(sign_extend((word >> (k * bits)) & mask, bits));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_rate_follows_factor_and_multiplier_signs() {
        assert_eq!(nominal_rate(1000, 1), 1000.0);
        assert_eq!(nominal_rate(-10, 1), 0.1);
        assert_eq!(nominal_rate(10, -2), 5.0);
        assert_eq!(nominal_rate(-2, -5), 0.1);
        assert_eq!(nominal_rate(0, 1), 0.0);
    }

    #[test]
    fn sign_extension_of_narrow_fields() {
        assert_eq!(sign_extend(0b11_1111, 6), -1);
        assert_eq!(sign_extend(0b01_1111, 6), 31);
        assert_eq!(sign_extend(0x7fff, 15), -1);
        assert_eq!(sign_extend(1000, 15), 1000);
    }

    #[test]
    fn unpack_reads_high_to_low() {
        let six = |v: i32| (v as u32) & 0x3f;
        let word = (six(1) << 24) | (six(-1) << 18) | (six(2) << 12) | (six(-2) << 6) | six(3);
        let mut diffs = Vec::new();
        unpack(word, 5, 6, &mut diffs);
        assert_eq!(diffs, vec![1, -1, 2, -2, 3]);
    }

    #[test]
    fn btime_carries_leap_second() {
        let mut raw = vec![0u8; 10];
        raw[0..2].copy_from_slice(&2016u16.to_be_bytes());
        raw[2..4].copy_from_slice(&366u16.to_be_bytes());
        raw[4] = 23;
        raw[5] = 59;
        raw[6] = 60;
        let b = Bytes {
            data: &raw,
            order: ByteOrder::Big,
        };
        let time = btime(&b, 0).unwrap();
        assert_eq!(time.to_rfc3339(), "2017-01-01T00:00:00+00:00");

        raw[8..10].copy_from_slice(&10_000u16.to_be_bytes());
        let b = Bytes {
            data: &raw,
            order: ByteOrder::Big,
        };
        assert!(btime(&b, 0).is_none());
    }
}
