//! Intel HEX records.
//!
//! Each line is `:BBAAAATT<data>CC`: byte count, 16-bit address, record type,
//! `BB` payload bytes and a checksum that brings the sum of every field to
//! zero modulo 256. Data records written here carry at most 16 bytes.

use log::{debug, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum::Display;

use crate::error::Error;
use crate::image::MemoryImage;

pub const RECORD_MARK: char = ':';
pub const EOF_RECORD: &str = ":00000001FF";
pub const MAX_DATA_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, Display)]
#[repr(u8)]
pub enum RecordType {
    Data = 0x00,
    EndOfFile = 0x01,
    ExtendedLinearAddress = 0x04,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub byte_count: u8,
    pub address: u16,
    pub record_type: RecordType,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

/// Two's complement of the byte sum of every field preceding the checksum.
pub fn checksum(address: u16, record_type: RecordType, payload: &[u8]) -> u8 {
    let [high, low] = address.to_be_bytes();
    let sum = payload
        .iter()
        .fold(payload.len() as u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_add(high)
        .wrapping_add(low)
        .wrapping_add(record_type.into());
    sum.wrapping_neg()
}

/// Data record lines for `bytes` at the record-local `address`.
///
/// Payloads longer than [`MAX_DATA_LEN`] are split into consecutive records
/// joined by `\n`.
pub fn format_record(address: u16, bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return HexRecord::new(RecordType::Data, address, vec![]).to_string();
    }
    bytes
        .chunks(MAX_DATA_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let offset = (i * MAX_DATA_LEN) as u16;
            HexRecord::new(RecordType::Data, address.wrapping_add(offset), chunk.to_vec())
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl HexRecord {
    /// Build a record with a matching byte count and checksum.
    /// Callers keep `payload` within [`MAX_DATA_LEN`] bytes.
    pub(crate) fn new(record_type: RecordType, address: u16, payload: Vec<u8>) -> Self {
        Self {
            byte_count: payload.len() as u8,
            address,
            record_type,
            checksum: checksum(address, record_type, &payload),
            payload,
        }
    }

    pub fn end_of_file() -> Self {
        Self::new(RecordType::EndOfFile, 0, vec![])
    }

    pub fn extended_linear_address(upper: u16) -> Self {
        Self::new(
            RecordType::ExtendedLinearAddress,
            0,
            upper.to_be_bytes().to_vec(),
        )
    }

    pub fn computed_checksum(&self) -> u8 {
        checksum(self.address, self.record_type, &self.payload)
    }

    /// All fields, checksum included, sum to zero modulo 256.
    pub fn is_valid(&self) -> bool {
        let [high, low] = self.address.to_be_bytes();
        let sum = self
            .payload
            .iter()
            .fold(self.byte_count, |acc, b| acc.wrapping_add(*b))
            .wrapping_add(high)
            .wrapping_add(low)
            .wrapping_add(self.record_type.into())
            .wrapping_add(self.checksum);
        sum == 0 && self.byte_count as usize == self.payload.len()
    }

    /// Parse one line. Lines not starting with `:` yield `Ok(None)`.
    /// `line_no` is only used for error context.
    pub fn parse(line: &str, line_no: usize) -> Result<Option<Self>, Error> {
        let line = line.trim_end();
        let Some(body) = line.strip_prefix(RECORD_MARK) else {
            return Ok(None);
        };
        if !body.is_ascii() {
            return Err(Error::format(line_no, "non-ASCII characters in record"));
        }
        if body.len() < 10 {
            return Err(Error::format(line_no, format!("truncated record `{}`", line)));
        }

        let byte_count = hex_byte(body, 0, line_no)?;
        let expected = 10 + byte_count as usize * 2;
        if body.len() < expected {
            return Err(Error::format(
                line_no,
                format!(
                    "truncated record: {} payload bytes declared, {} hex digits present",
                    byte_count,
                    body.len()
                ),
            ));
        }
        if body.len() > expected {
            return Err(Error::format(
                line_no,
                format!("trailing characters `{}`", &body[expected..]),
            ));
        }

        let address = (hex_byte(body, 2, line_no)? as u16) << 8 | hex_byte(body, 4, line_no)? as u16;
        let raw_type = hex_byte(body, 6, line_no)?;
        let record_type = RecordType::try_from(raw_type).map_err(|_| {
            Error::format(line_no, format!("unsupported record type 0x{:02X}", raw_type))
        })?;
        let payload = (0..byte_count as usize)
            .map(|i| hex_byte(body, 8 + i * 2, line_no))
            .collect::<Result<Vec<u8>, Error>>()?;
        let stored = hex_byte(body, expected - 2, line_no)?;

        let record = Self {
            byte_count,
            address,
            record_type,
            payload,
            checksum: stored,
        };
        let computed = record.computed_checksum();
        if computed != stored {
            return Err(Error::Checksum {
                line: line_no,
                stored,
                computed,
            });
        }
        Ok(Some(record))
    }
}

impl fmt::Display for HexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02X}{:04X}{:02X}",
            RECORD_MARK,
            self.byte_count,
            self.address,
            u8::from(self.record_type)
        )?;
        for b in &self.payload {
            write!(f, "{:02X}", b)?;
        }
        write!(f, "{:02X}", self.checksum)
    }
}

fn hex_byte(body: &str, at: usize, line_no: usize) -> Result<u8, Error> {
    let digits = body
        .get(at..at + 2)
        .ok_or_else(|| Error::format(line_no, "truncated record"))?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::format(
            line_no,
            format!("invalid hex digits `{}` at column {}", digits, at + 2),
        ));
    }
    u8::from_str_radix(digits, 16)
        .map_err(|_| Error::format(line_no, format!("invalid hex digits `{}`", digits)))
}

/// Parse the text of a HEX file into a fresh image.
///
/// Parsing stops at the first end-of-file record. Extended linear address
/// records set the upper 16 bits of the addresses that follow.
pub fn parse_str(text: &str) -> Result<MemoryImage, Error> {
    parse_bytes(text.as_bytes())
}

/// Like [`parse_str`], for raw file contents. Lines not starting with `:` may
/// hold any bytes; record lines must be ASCII.
pub fn parse_bytes(data: &[u8]) -> Result<MemoryImage, Error> {
    let mut image = MemoryImage::new();
    let mut upper: u32 = 0;
    let mut terminated = false;

    for (idx, raw) in data.split(|b| *b == b'\n').enumerate() {
        let line_no = idx + 1;
        if raw.first() != Some(&(RECORD_MARK as u8)) {
            continue;
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| Error::format(line_no, "non-ASCII characters in record"))?;
        let Some(record) = HexRecord::parse(line, line_no)? else {
            continue;
        };
        match record.record_type {
            RecordType::Data => {
                let base = upper + record.address as u32;
                for (offset, byte) in record.payload.iter().enumerate() {
                    let address = base.checked_add(offset as u32).ok_or_else(|| {
                        Error::format(line_no, "record extends past the 32-bit address space")
                    })?;
                    image.set(address, *byte);
                }
            }
            RecordType::EndOfFile => {
                debug!("End of file record at line {}", line_no);
                terminated = true;
                break;
            }
            RecordType::ExtendedLinearAddress => {
                let [high, low] = record.payload.as_slice() else {
                    return Err(Error::format(
                        line_no,
                        format!(
                            "extended linear address record carries {} bytes, expected 2",
                            record.byte_count
                        ),
                    ));
                };
                let segment = u16::from_be_bytes([*high, *low]);
                debug!("Segment 0x{:04X} at line {}", segment, line_no);
                image.push_segment(segment);
                upper = (segment as u32) << 16;
            }
        }
    }

    if !terminated {
        warn!("HEX data has no end of file record");
    }
    Ok(image)
}

/// Render an image as HEX text, terminated by [`EOF_RECORD`].
///
/// Each maximal run of mapped bytes becomes consecutive data records of at
/// most [`MAX_DATA_LEN`] bytes. Runs above 64 KiB are preceded by an extended
/// linear address record; no record crosses a 64 KiB boundary.
pub fn serialize(image: &MemoryImage) -> String {
    let mut out = String::new();
    let mut segment: u16 = 0;

    for (start, bytes) in image.runs() {
        let mut offset = 0;
        while offset < bytes.len() {
            let address = start + offset as u32;
            let upper = (address >> 16) as u16;
            if upper != segment {
                out.push_str(&HexRecord::extended_linear_address(upper).to_string());
                out.push('\n');
                segment = upper;
            }
            let room = 0x1_0000 - (address & 0xFFFF) as usize;
            let len = (bytes.len() - offset).min(MAX_DATA_LEN).min(room);
            out.push_str(&format_record(address as u16, &bytes[offset..offset + len]));
            out.push('\n');
            offset += len;
        }
    }

    out.push_str(EOF_RECORD);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = ":10010000214601360121470136007EFE09D2190140";

    #[test]
    fn format_known_record() {
        let bytes = [
            0x21, 0x46, 0x01, 0x36, 0x01, 0x21, 0x47, 0x01, 0x36, 0x00, 0x7E, 0xFE, 0x09, 0xD2,
            0x19, 0x01,
        ];
        assert_eq!(format_record(0x0100, &bytes), SAMPLE);
    }

    #[test]
    fn long_payload_is_split() {
        let bytes: Vec<u8> = (0..300u32).map(|b| b as u8).collect();
        let text = format_record(0x0200, &bytes);
        let records: Vec<HexRecord> = text
            .lines()
            .map(|l| HexRecord::parse(l, 1).unwrap().unwrap())
            .collect();
        assert_eq!(records.len(), 19);
        assert!(records.iter().all(|r| r.is_valid() && r.payload.len() <= MAX_DATA_LEN));
        assert_eq!(records[1].address, 0x0210);
        assert_eq!(records[18].payload.len(), 300 - 18 * 16);
        assert_eq!(parse_str(&text).unwrap().get(0x0200 + 299), Some(43));
    }

    #[test]
    fn comment_lines_need_not_be_text() {
        let data = b"; firmware \xE9t\xE9 build\r\n:020000003412B8\r\n:00000001FF\r\n";
        let image = parse_bytes(data).unwrap();
        assert_eq!(image.word(0), Some(0x1234));

        let bad = b":02000000\xE912B8\n:00000001FF\n";
        assert!(matches!(parse_bytes(bad), Err(Error::Format { line: 1, .. })));
    }

    #[test]
    fn parse_known_record() {
        let record = HexRecord::parse(SAMPLE, 1).unwrap().unwrap();
        assert_eq!(record.byte_count, 0x10);
        assert_eq!(record.address, 0x0100);
        assert_eq!(record.record_type, RecordType::Data);
        assert_eq!(record.payload[0], 0x21);
        assert_eq!(record.checksum, 0x40);
        assert!(record.is_valid());
    }

    #[test]
    fn special_records() {
        assert_eq!(HexRecord::end_of_file().to_string(), EOF_RECORD);
        assert_eq!(
            HexRecord::extended_linear_address(0x0001).to_string(),
            ":020000040001F9"
        );
    }

    #[test]
    fn non_record_lines_are_skipped() {
        assert_eq!(HexRecord::parse("", 1).unwrap(), None);
        assert_eq!(HexRecord::parse("; comment", 1).unwrap(), None);
        assert_eq!(HexRecord::parse("  :00000001FF", 1).unwrap(), None);
    }

    #[test]
    fn crlf_is_tolerated() {
        let record = HexRecord::parse(":00000001FF\r", 3).unwrap().unwrap();
        assert_eq!(record.record_type, RecordType::EndOfFile);
    }

    #[test]
    fn checksum_mismatch() {
        let err = HexRecord::parse(":10010000214601360121470136007EFE09D2190141", 7).unwrap_err();
        assert!(matches!(
            err,
            Error::Checksum { line: 7, stored: 0x41, computed: 0x40 }
        ));
    }

    #[test]
    fn malformed_lines() {
        for line in [
            ":1001000021460136",
            ":0000",
            ":02000000ZZ00FE",
            ":0200000000+1FD",
            ":00000001FF00",
            ":00000002FE",
        ] {
            let err = HexRecord::parse(line, 2).unwrap_err();
            assert!(matches!(err, Error::Format { line: 2, .. }), "{}: {:?}", line, err);
        }
    }

    #[test]
    fn parse_stops_at_end_of_file() {
        let text = ":020000003412B8\n:00000001FF\n:02000200AABB97\n";
        let image = parse_str(text).unwrap();
        assert_eq!(image.word(0), Some(0x1234));
        assert_eq!(image.get(0x0001), Some(0x12));
        assert_eq!(image.get(0x0002), None);
    }

    #[test]
    fn extended_linear_address_offsets_data() {
        let text = ":020000040001F9\n:04000E00E43FFF1FAD\n:00000001FF\n";
        let image = parse_str(text).unwrap();
        assert_eq!(image.segments(), &[0x0001]);
        assert_eq!(image.get(0x000E), None);
        assert_eq!(image.get(0x1000E), Some(0xE4));
        assert_eq!(image.word(0x8007), Some(0x3FE4));
        assert_eq!(image.word(0x8008), Some(0x1FFF));
    }

    #[test]
    fn serialize_chunks_runs() {
        let image: MemoryImage = (0..20u32).map(|a| (0x0100 + a, a as u8)).collect();
        let text = serialize(&image);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(":10010000"));
        assert!(lines[1].starts_with(":04011000"));
        assert_eq!(lines[2], EOF_RECORD);
    }

    #[test]
    fn serialize_splits_at_segment_boundary() {
        let image: MemoryImage = (0xFFFEu32..0x10003).map(|a| (a, 0xA5)).collect();
        let text = serialize(&image);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                ":02FFFE00A5A5B7",
                ":020000040001F9",
                ":03000000A5A5A50E",
                EOF_RECORD,
            ]
        );
        assert_eq!(parse_str(&text).unwrap(), image);
    }

    #[test]
    fn empty_image_is_just_end_of_file() {
        assert_eq!(serialize(&MemoryImage::new()), format!("{}\n", EOF_RECORD));
    }
}
