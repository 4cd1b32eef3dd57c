use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use arrayref::array_ref;
use bitvec::prelude::*;
use icecfg_geom::DeviceGeometry;
use serde::{Deserialize, Serialize};

use crate::banks::{Bank, Banks, NUM_BANKS};
use crate::config::{Configuration, FreqRange};
use crate::crc::Crc16;

pub const PREAMBLE: [u8; 4] = [0x7e, 0xaa, 0x99, 0x7e];

const COMMENT_START: [u8; 2] = [0xff, 0x00];
const COMMENT_END: [u8; 2] = [0x00, 0xff];

const OP_COMMAND: u8 = 0;
const OP_BANK: u8 = 1;
const OP_CRC_CHECK: u8 = 2;
const OP_FREQ_RANGE: u8 = 5;
const OP_WIDTH: u8 = 6;
const OP_HEIGHT: u8 = 7;
const OP_OFFSET: u8 = 8;
const OP_FLAGS: u8 = 9;

const CMD_LOAD_CRAM: u32 = 1;
const CMD_LOAD_BRAM: u32 = 3;
const CMD_CRC_RESET: u32 = 5;
const CMD_WAKEUP: u32 = 6;
const CMD_REBOOT: u32 = 8;

const FLAG_NOSLEEP: u32 = 0x01;
const FLAG_WARMBOOT: u32 = 0x20;

/// Rows of a BRAM bank sent per load command.
const BRAM_CHUNK_ROWS: usize = 128;

#[derive(Debug)]
pub enum BinError {
    MissingPreamble,
    UnexpectedEof,
    CrcMismatch,
    UnknownOpcode(u8),
    UnknownCommand(u32),
    Reboot,
    NonZeroTrailer,
    BankOutOfRange(u32),
    BankGeometry {
        width: usize,
        height: usize,
        offset: usize,
    },
    BadFreqRange(u32),
    PayloadTooLong(u8),
    IoError(std::io::Error),
}

impl BinError {
    /// True when the stream ended before the wakeup command.
    pub fn is_truncation(&self) -> bool {
        matches!(self, BinError::UnexpectedEof)
    }

    /// True when the bytes themselves are wrong, as opposed to missing or unreadable.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, BinError::UnexpectedEof | BinError::IoError(_))
    }
}

impl From<std::io::Error> for BinError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl std::fmt::Display for BinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinError::MissingPreamble => write!(f, "preamble missing"),
            BinError::UnexpectedEof => write!(f, "unexpected end of bitstream"),
            BinError::CrcMismatch => write!(f, "CRC mismatch"),
            BinError::UnknownOpcode(op) => write!(f, "unknown opcode {op:#x}"),
            BinError::UnknownCommand(cmd) => write!(f, "unknown command {cmd:#x}"),
            BinError::Reboot => write!(f, "reboot command not supported"),
            BinError::NonZeroTrailer => write!(f, "non-zero trailer after bank data"),
            BinError::BankOutOfRange(bank) => write!(f, "bank {bank} out of range"),
            BinError::BankGeometry {
                width,
                height,
                offset,
            } => write!(
                f,
                "bank load of {width}x{height} at offset {offset} does not fit the bank"
            ),
            BinError::BadFreqRange(val) => write!(f, "bad frequency range {val}"),
            BinError::PayloadTooLong(len) => write!(f, "command payload of {len} bytes"),
            BinError::IoError(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for BinError {}

/// Output shaping for the binary writer.  Reading accepts every shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinOptions {
    /// Leave out the comment block.
    pub skip_comment: bool,
    /// Leave out BRAM banks with no bits set.
    pub detect_used_bram: bool,
    /// BRAM banks to send; `None` sends all of them.
    pub bram_banks: Option<Vec<usize>>,
    /// Compaction level, 0 to 4.  Each level includes the ones below it:
    ///
    /// 1. width, height and offset commands repeating the last value are elided
    /// 2. banks with no bits set are skipped
    /// 3. CRAM banks are trimmed to their used rows, empty BRAM chunks are skipped
    /// 4. default frequency and flags commands and the pad byte are left out
    pub optimize: u8,
}

impl BinOptions {
    pub const MAX_OPTIMIZE: u8 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_comment(self) -> Self {
        Self {
            skip_comment: true,
            ..self
        }
    }

    pub fn detect_used_bram(self) -> Self {
        Self {
            detect_used_bram: true,
            ..self
        }
    }

    pub fn bram_banks(self, banks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            bram_banks: Some(banks.into_iter().collect()),
            ..self
        }
    }

    pub fn optimize(self, level: u8) -> Self {
        assert!(level <= Self::MAX_OPTIMIZE);
        Self {
            optimize: level,
            ..self
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&s)?)
    }

    fn sends_bram_bank(&self, bank: usize) -> bool {
        self.bram_banks
            .as_ref()
            .is_none_or(|banks| banks.contains(&bank))
    }
}

fn pack_bits(bits: &BitSlice) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .by_vals()
                .enumerate()
                .fold(0, |acc, (i, bit)| acc | (bit as u8) << (7 - i))
        })
        .collect()
}

fn unpack_bits(data: &[u8], bits: &mut BitSlice) {
    for i in 0..bits.len() {
        bits.set(i, (data[i / 8] >> (7 - i % 8) & 1) != 0);
    }
}

/// Records `value` as the register contents; true if sending it can be skipped.
fn elided(elide: bool, last: &mut Option<usize>, value: usize) -> bool {
    let same = elide && *last == Some(value);
    *last = Some(value);
    same
}

struct BinWriter {
    out: Vec<u8>,
    crc: Crc16,
    elide: bool,
    width: Option<usize>,
    height: Option<usize>,
    offset: Option<usize>,
}

impl BinWriter {
    fn new(elide: bool) -> Self {
        Self {
            out: vec![],
            crc: Crc16::new(),
            elide,
            width: None,
            height: None,
            offset: None,
        }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.out.extend_from_slice(data);
    }

    fn cmd(&mut self, op: u8, value: u32, len: u8) {
        self.bytes(&[op << 4 | len]);
        let value = value.to_be_bytes();
        self.bytes(&value[4 - len as usize..]);
    }

    fn comment(&mut self, comment: &str) {
        assert!(!comment.contains('\0'), "NUL in bitstream comment");
        self.out.extend_from_slice(&COMMENT_START);
        for line in comment.split('\n') {
            self.out.extend_from_slice(line.as_bytes());
            self.out.push(0);
        }
        self.out.extend_from_slice(&COMMENT_END);
    }

    fn width(&mut self, width: usize) {
        if !elided(self.elide, &mut self.width, width) {
            self.cmd(OP_WIDTH, (width - 1) as u32, 2);
        }
    }

    fn height(&mut self, height: usize) {
        if !elided(self.elide, &mut self.height, height) {
            self.cmd(OP_HEIGHT, height as u32, 2);
        }
    }

    fn offset(&mut self, offset: usize) {
        if !elided(self.elide, &mut self.offset, offset) {
            self.cmd(OP_OFFSET, offset as u32, 2);
        }
    }

    fn load(&mut self, cmd: u32, bits: &BitSlice) {
        self.cmd(OP_COMMAND, cmd, 1);
        self.bytes(&pack_bits(bits));
        self.bytes(&[0, 0]);
    }

    fn crc_check(&mut self) {
        self.bytes(&[OP_CRC_CHECK << 4 | 2]);
        let crc = self.crc.get();
        self.bytes(&crc.to_be_bytes());
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Packet {
    Cmd(u32),
    Bank(u32),
    CrcCheck,
    FreqRange(u32),
    Width(u32),
    Height(u32),
    Offset(u32),
    Flags(u32),
}

struct BinReader<'d> {
    data: &'d [u8],
    pos: usize,
    crc: Crc16,
}

impl<'d> BinReader<'d> {
    fn take(&mut self, len: usize) -> Result<&'d [u8], BinError> {
        if self.data.len() - self.pos < len {
            return Err(BinError::UnexpectedEof);
        }
        let res = &self.data[self.pos..self.pos + len];
        self.pos += len;
        self.crc.update(res);
        Ok(res)
    }

    fn packet(&mut self) -> Result<Packet, BinError> {
        let ctrl = self.take(1)?[0];
        let (op, len) = (ctrl >> 4, ctrl & 0xf);
        if len > 4 {
            return Err(BinError::PayloadTooLong(len));
        }
        let value = self
            .take(len as usize)?
            .iter()
            .fold(0u32, |acc, &byte| acc << 8 | byte as u32);
        Ok(match op {
            OP_COMMAND => Packet::Cmd(value),
            OP_BANK => Packet::Bank(value),
            OP_CRC_CHECK => Packet::CrcCheck,
            OP_FREQ_RANGE => Packet::FreqRange(value),
            OP_WIDTH => Packet::Width(value),
            OP_HEIGHT => Packet::Height(value),
            OP_OFFSET => Packet::Offset(value),
            OP_FLAGS => Packet::Flags(value),
            _ => return Err(BinError::UnknownOpcode(op)),
        })
    }
}

/// Splits a comment block into lines.  Also returns the length of the block
/// up to and including its end marker, or `None` if the marker never came.
///
/// `00 FF` normally ends the block.  Some producers forget the line
/// terminator before it, so when a line is still open the pair only closes
/// that line and parsing goes on.
fn parse_comment(region: &[u8]) -> (String, Option<usize>) {
    let mut lines = vec![];
    let mut line = vec![];
    let mut pos = 0;
    let mut end = None;
    while pos < region.len() {
        let byte = region[pos];
        if byte == 0 && region.get(pos + 1) == Some(&0xff) {
            if line.is_empty() {
                end = Some(pos + 2);
                break;
            }
            log::warn!("unterminated comment line before comment end marker");
            lines.push(std::mem::take(&mut line));
            pos += 2;
        } else if byte == 0 {
            lines.push(std::mem::take(&mut line));
            pos += 1;
        } else {
            line.push(byte);
            pos += 1;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    let text = lines
        .iter()
        .map(|line| String::from_utf8_lossy(line))
        .collect::<Vec<_>>()
        .join("\n");
    (text, end)
}

/// True if a buffer with no preamble could still become a valid stream
/// given more bytes.
fn header_truncated(data: &[u8]) -> bool {
    let rest = match data.strip_prefix(&COMMENT_START) {
        Some(region) => match parse_comment(region).1 {
            Some(end) => &region[end..],
            None => return true,
        },
        None if COMMENT_START.starts_with(data) => return true,
        None => data,
    };
    rest.is_empty() || (1..PREAMBLE.len()).any(|len| rest.ends_with(&PREAMBLE[..len]))
}

#[derive(Debug, Default)]
struct LoadState {
    bank: u32,
    width: usize,
    height: usize,
    offset: usize,
}

impl LoadState {
    /// Checks the pending load against the bank size and returns its row range.
    fn rows(&self, banks: &Banks) -> Result<(usize, Range<usize>), BinError> {
        let bank = self.bank as usize;
        if bank >= NUM_BANKS {
            return Err(BinError::BankOutOfRange(self.bank));
        }
        let target: &Bank = &banks[bank];
        if self.width != target.width() || self.offset + self.height > target.height() {
            return Err(BinError::BankGeometry {
                width: self.width,
                height: self.height,
                offset: self.offset,
            });
        }
        Ok((bank, self.offset..self.offset + self.height))
    }
}

impl<'a> Configuration<'a> {
    /// Serializes into the binary bitstream format.
    pub fn get_bitstream(&self, options: &BinOptions) -> Vec<u8> {
        let level = options.optimize.min(BinOptions::MAX_OPTIMIZE);
        let mut w = BinWriter::new(level >= 1);
        if !options.skip_comment && !self.comment.is_empty() {
            w.comment(&self.comment);
        }
        w.out.extend_from_slice(&PREAMBLE);

        if level < 4 || self.freq_range != FreqRange::default() {
            w.cmd(OP_FREQ_RANGE, self.freq_range.code().into(), 1);
        }
        w.cmd(OP_COMMAND, CMD_CRC_RESET, 1);
        w.crc.reset();
        let mut flags = 0;
        if self.warmboot {
            flags |= FLAG_WARMBOOT;
        }
        if self.nosleep {
            flags |= FLAG_NOSLEEP;
        }
        if level < 4 || flags != FLAG_WARMBOOT {
            w.cmd(OP_FLAGS, flags, 2);
        }

        let mut cram = self.blank_cram_banks();
        self.write_cram_banks(&mut cram);
        for (num, bank) in cram.iter().enumerate() {
            let rows = if level >= 2 {
                match bank.used_rows() {
                    None => {
                        log::debug!("skipping empty CRAM bank {num}");
                        continue;
                    }
                    Some(used) if level >= 3 => used,
                    Some(_) => 0..bank.height(),
                }
            } else {
                0..bank.height()
            };
            w.width(bank.width());
            w.height(rows.len());
            w.offset(rows.start);
            w.cmd(OP_BANK, num as u32, 1);
            w.load(CMD_LOAD_CRAM, bank.rows(rows));
        }

        let mut bram = self.blank_bram_banks();
        self.write_bram_banks(&mut bram);
        for (num, bank) in bram.iter().enumerate() {
            if !options.sends_bram_bank(num) {
                continue;
            }
            if (options.detect_used_bram || level >= 2) && bank.is_empty() {
                log::debug!("skipping empty BRAM bank {num}");
                continue;
            }
            w.width(bank.width());
            w.height(BRAM_CHUNK_ROWS);
            w.cmd(OP_BANK, num as u32, 1);
            for start in (0..bank.height()).step_by(BRAM_CHUNK_ROWS) {
                let rows = bank.rows(start..start + BRAM_CHUNK_ROWS);
                if level >= 3 && rows.not_any() {
                    log::debug!("skipping empty BRAM bank {num} rows {start}+");
                    continue;
                }
                w.offset(start);
                w.load(CMD_LOAD_BRAM, rows);
            }
        }

        w.crc_check();
        w.cmd(OP_COMMAND, CMD_WAKEUP, 1);
        if level < 4 {
            w.out.push(0);
        }
        w.out
    }

    pub fn write_bin(&self, mut writer: impl Write, options: &BinOptions) -> std::io::Result<()> {
        writer.write_all(&self.get_bitstream(options))
    }

    /// Replaces the whole configuration with the contents of a bitstream.
    pub fn parse_bin(&mut self, data: &[u8]) -> Result<(), BinError> {
        self.clear();
        let Some(start) = data
            .windows(PREAMBLE.len())
            .position(|window| window == PREAMBLE)
        else {
            return Err(if header_truncated(data) {
                BinError::UnexpectedEof
            } else {
                BinError::MissingPreamble
            });
        };
        let header = &data[..start];
        if let Some(region) = header.strip_prefix(&COMMENT_START) {
            self.comment = parse_comment(region).0;
        } else if !header.is_empty() {
            log::debug!("ignoring {start} bytes before preamble");
        }

        let mut cram = self.blank_cram_banks();
        let mut bram = self.blank_bram_banks();
        let mut load = LoadState::default();
        let mut reader = BinReader {
            data,
            pos: start + PREAMBLE.len(),
            crc: Crc16::new(),
        };
        loop {
            match reader.packet()? {
                Packet::Cmd(CMD_LOAD_CRAM) => {
                    let (bank, rows) = load.rows(&cram)?;
                    read_payload(&mut reader, cram[bank].rows_mut(rows))?;
                }
                Packet::Cmd(CMD_LOAD_BRAM) => {
                    let (bank, rows) = load.rows(&bram)?;
                    read_payload(&mut reader, bram[bank].rows_mut(rows))?;
                }
                Packet::Cmd(CMD_CRC_RESET) => reader.crc.reset(),
                Packet::Cmd(CMD_WAKEUP) => break,
                Packet::Cmd(CMD_REBOOT) => return Err(BinError::Reboot),
                Packet::Cmd(cmd) => return Err(BinError::UnknownCommand(cmd)),
                Packet::Bank(bank) => load.bank = bank,
                Packet::CrcCheck => {
                    if reader.crc.get() != 0 {
                        return Err(BinError::CrcMismatch);
                    }
                }
                Packet::FreqRange(val) => {
                    self.freq_range =
                        FreqRange::from_code(val).ok_or(BinError::BadFreqRange(val))?;
                }
                Packet::Width(width) => load.width = width as usize + 1,
                Packet::Height(height) => load.height = height as usize,
                Packet::Offset(offset) => load.offset = offset as usize,
                Packet::Flags(flags) => {
                    self.warmboot = flags & FLAG_WARMBOOT != 0;
                    self.nosleep = flags & FLAG_NOSLEEP != 0;
                }
            }
        }
        let rest = data.len() - reader.pos;
        if rest != 0 {
            log::debug!("ignoring {rest} bytes after wakeup");
        }

        self.read_cram_banks(&cram);
        self.read_bram_banks(&bram);
        Ok(())
    }

    pub fn read_bin(&mut self, mut reader: impl Read) -> Result<(), BinError> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;
        self.parse_bin(&data)
    }

    pub fn from_bin(geom: &'a DeviceGeometry, data: &[u8]) -> Result<Self, BinError> {
        let mut config = Configuration::new(geom);
        config.parse_bin(data)?;
        Ok(config)
    }
}

fn read_payload(reader: &mut BinReader, bits: &mut BitSlice) -> Result<(), BinError> {
    let data = reader.take(bits.len().div_ceil(8))?;
    unpack_bits(data, bits);
    let trailer = reader.take(2)?;
    if *array_ref!(trailer, 0, 2) != [0, 0] {
        return Err(BinError::NonZeroTrailer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use icecfg_geom::{BramMode, ExtraBit, TilePos};

    use super::*;

    fn geom() -> &'static DeviceGeometry {
        DeviceGeometry::by_name("8k").unwrap()
    }

    fn header_end(data: &[u8]) -> usize {
        data.windows(4).position(|w| w == PREAMBLE).unwrap() + 4
    }

    #[test]
    fn test_blank_layout() {
        let config = Configuration::new(geom());
        let data = config.get_bitstream(&BinOptions::new());
        assert_eq!(
            data[..20],
            [
                0x7e, 0xaa, 0x99, 0x7e, // preamble
                0x51, 0x00, // low frequency
                0x01, 0x05, // CRC reset
                0x92, 0x00, 0x20, // warmboot
                0x62, 0x03, 0x67, // width 872
                0x72, 0x01, 0x10, // height 272
                0x82, 0x00, 0x00, // offset 0
            ]
        );
        assert_eq!(data[20..24], [0x11, 0x00, 0x01, 0x01]);
        let cram_bank = 872 * 272 / 8;
        let per_cram = 3 * 3 + 2 + 2 + cram_bank + 2;
        let per_chunk = 3 + 2 + 128 * 128 / 8 + 2;
        let per_bram = 3 + 3 + 2 + 2 * per_chunk;
        assert_eq!(data.len(), 4 + 2 + 2 + 3 + 4 * per_cram + 4 * per_bram + 3 + 2 + 1);
        assert_eq!(data[data.len() - 6..][3..], [0x01, 0x06, 0x00]);
        let mut copy = Configuration::new(geom());
        copy.parse_bin(&data).unwrap();
        assert_eq!(copy, config);
    }

    #[test]
    fn test_roundtrip_fields() {
        let mut config = Configuration::new(geom());
        config.comment = "first\n\nlast\n".into();
        config.freq_range = FreqRange::High;
        config.warmboot = false;
        config.nosleep = true;
        config.set_bit(1, 1, 0, 0, true);
        config.set_bit(32, 32, 15, 53, true);
        config.set_bit(16, 0, 3, 17, true);
        config.set_extra_bit(ExtraBit::new(1, 871, 271), true);
        config.set_bram_values(TilePos::new(25, 17), 100, &[0xbeef], BramMode::Bram256x16);
        let data = config.get_bitstream(&BinOptions::new());
        assert_eq!(data[..2], COMMENT_START);
        let mut copy = Configuration::new(geom());
        copy.parse_bin(&data).unwrap();
        assert_eq!(copy, config);

        let data = config.get_bitstream(&BinOptions::new().skip_comment());
        assert_eq!(data[..4], PREAMBLE);
        let copy = Configuration::from_bin(geom(), &data).unwrap();
        assert_eq!(copy.comment, "");
        config.comment.clear();
        assert_eq!(copy, config);
    }

    #[test]
    fn test_comment_quirk() {
        assert_eq!(parse_comment(b"abc\0def\0\0\xff"), (String::from("abc\ndef"), Some(10)));
        assert_eq!(parse_comment(b"abc\0\0def\0\0\xff").0, "abc\n\ndef");
        // missing terminator before the end marker
        assert_eq!(parse_comment(b"abc\0def\0\xff"), (String::from("abc\ndef"), None));
        assert_eq!(parse_comment(b"abc\0\xffdef\0\0\xff"), (String::from("abc\ndef"), Some(11)));
        assert_eq!(parse_comment(b"abc\0de"), (String::from("abc\nde"), None));
        assert_eq!(parse_comment(b"\0\xff\x7e"), (String::new(), Some(2)));

        let mut data = vec![0xff, 0x00];
        data.extend_from_slice(b"Lattice\0iCEcube2\0\xff");
        data.extend(Configuration::new(geom()).get_bitstream(&BinOptions::new()));
        let config = Configuration::from_bin(geom(), &data).unwrap();
        assert_eq!(config.comment, "Lattice\niCEcube2");
    }

    #[test]
    fn test_header_truncated() {
        assert!(header_truncated(b""));
        assert!(header_truncated(b"\xff"));
        assert!(header_truncated(b"\xff\0abc\0"));
        assert!(header_truncated(b"\xff\0abc\0\0\xff"));
        assert!(header_truncated(b"\xff\0abc\0\0\xff\x7e\xaa\x99"));
        assert!(header_truncated(b"junk\x7e"));
        assert!(!header_truncated(b"junk"));
        assert!(!header_truncated(b"\xff\0abc\0\0\xffjunk"));
        assert!(!header_truncated(b"\x7e\xaa\x99\x00"));
    }

    #[test]
    #[should_panic = "NUL in bitstream comment"]
    fn test_nul_comment() {
        let mut config = Configuration::new(geom());
        config.comment = "a\0b".into();
        config.get_bitstream(&BinOptions::new());
    }

    #[test]
    fn test_errors() {
        let config = Configuration::new(geom());
        let data = config.get_bitstream(&BinOptions::new().optimize(4));
        let mut copy = Configuration::new(geom());

        assert_matches!(copy.parse_bin(&[0, 1, 2, 3, 4]), Err(BinError::MissingPreamble));
        assert_matches!(
            copy.parse_bin(&[0xff, 0x00, b'a', 0x00, 0x00, 0xff, 0x12]),
            Err(BinError::MissingPreamble)
        );

        let err = copy.parse_bin(&data[..data.len() - 2]).unwrap_err();
        assert!(err.is_truncation());
        assert!(!err.is_malformed());

        let body = header_end(&data);
        let mut bad = data.clone();
        bad[body] = 0xf1;
        assert_matches!(copy.parse_bin(&bad), Err(BinError::UnknownOpcode(0xf)));
        bad[body] = 0x07;
        assert_matches!(copy.parse_bin(&bad), Err(BinError::PayloadTooLong(7)));

        let mut stream = PREAMBLE.to_vec();
        stream.extend([0x01, 0x08]);
        assert_matches!(copy.parse_bin(&stream), Err(BinError::Reboot));
        stream[5] = 0x09;
        assert_matches!(copy.parse_bin(&stream), Err(BinError::UnknownCommand(9)));
        stream.truncate(4);
        stream.extend([0x51, 0x03]);
        assert_matches!(copy.parse_bin(&stream), Err(BinError::BadFreqRange(3)));
        stream.truncate(4);
        stream.extend([0x11, 0x04, 0x01, 0x01]);
        assert_matches!(copy.parse_bin(&stream), Err(BinError::BankOutOfRange(4)));
        stream.truncate(4);
        stream.extend([0x62, 0x03, 0x67, 0x72, 0x01, 0x10, 0x82, 0x00, 0x01, 0x01, 0x01]);
        assert_matches!(
            copy.parse_bin(&stream),
            Err(BinError::BankGeometry { offset: 1, .. })
        );
        stream.truncate(4);
        stream.extend([0x62, 0x00, 0x7f, 0x72, 0x00, 0x01, 0x01, 0x03, 0xff]);
        stream.extend([0; 15]);
        stream.extend([0x00, 0x01]);
        assert_matches!(copy.parse_bin(&stream), Err(BinError::NonZeroTrailer));
    }

    #[test]
    fn test_crc_enforced() {
        let mut config = Configuration::new(geom());
        config.set_bit(5, 5, 5, 5, true);
        let data = config.get_bitstream(&BinOptions::new());
        // first CRAM payload byte follows the 24 command bytes
        for pos in [24, 25, 24 + 1000, 24 + 872 * 272 / 8 - 1] {
            let mut bad = data.clone();
            bad[pos] ^= 0x10;
            let err = Configuration::from_bin(geom(), &bad).unwrap_err();
            assert_matches!(err, BinError::CrcMismatch);
            assert!(err.is_malformed());
        }
    }

    #[test]
    fn test_optimize_blank() {
        let config = Configuration::new(geom());
        let data = config.get_bitstream(&BinOptions::new().optimize(4));
        assert_eq!(
            data,
            [0x7e, 0xaa, 0x99, 0x7e, 0x01, 0x05, 0x22, 0xe5, 0xd0, 0x01, 0x06]
        );
        assert_eq!(Configuration::from_bin(geom(), &data).unwrap(), config);
    }

    #[test]
    fn test_options_toml() {
        let options = BinOptions::from_toml(
            "skip_comment = true\nbram_banks = [0, 2]\noptimize = 3\n",
        )
        .unwrap();
        assert_eq!(
            options,
            BinOptions::new().skip_comment().bram_banks([0, 2]).optimize(3)
        );
        assert_eq!(BinOptions::from_toml("").unwrap(), BinOptions::default());
        assert!(BinOptions::from_toml("optimise = 1\n").is_err());
    }
}
