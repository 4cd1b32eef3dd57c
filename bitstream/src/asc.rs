use std::fmt::Write as _;
use std::io::{BufRead, Write};

use bitvec::prelude::*;
use icecfg_geom::{
    BRAM_GROUPS, BRAM_INDICES, BramId, DeviceGeometry, ExtraBit, GeomError, TileId, TileKind,
    TilePos,
};
use itertools::Itertools;

use crate::config::Configuration;

#[derive(Debug)]
pub enum AscError {
    UnknownDirective(String),
    UnexpectedLine(usize),
    BadDataLine(usize),
    BadArguments(usize),
    NoTile(TilePos),
    TileKindMismatch(TilePos, TileKind),
    NoBram(TilePos),
    BadExtraBit(ExtraBit),
    BadWarmboot(String),
    DeviceMismatch { expected: String, found: String },
    MissingDevice,
    Geom(GeomError),
    UnexpectedEof,
    IoError(std::io::Error),
}

impl AscError {
    /// True when the input simply ended too early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, AscError::UnexpectedEof)
    }
}

impl From<std::io::Error> for AscError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<GeomError> for AscError {
    fn from(value: GeomError) -> Self {
        Self::Geom(value)
    }
}

impl std::fmt::Display for AscError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AscError::UnknownDirective(name) => write!(f, "unknown directive .{name}"),
            AscError::UnexpectedLine(line) => write!(f, "line {line}: unexpected data"),
            AscError::BadDataLine(line) => write!(f, "line {line}: malformed data line"),
            AscError::BadArguments(line) => write!(f, "line {line}: bad directive arguments"),
            AscError::NoTile(pos) => write!(f, "no tile at {pos}"),
            AscError::TileKindMismatch(pos, kind) => {
                write!(f, "tile {pos} is not a {kind}", kind = kind.asc_name())
            }
            AscError::NoBram(pos) => write!(f, "no block memory at {pos}"),
            AscError::BadExtraBit(bit) => write!(
                f,
                "no extra bit {bank} {x} {y}",
                bank = bit.bank,
                x = bit.x,
                y = bit.y
            ),
            AscError::BadWarmboot(arg) => write!(f, "bad warmboot setting {arg:?}"),
            AscError::DeviceMismatch { expected, found } => {
                write!(f, "device {found:?} does not match {expected:?}")
            }
            AscError::MissingDevice => write!(f, "no .device directive"),
            AscError::Geom(error) => write!(f, "{error}"),
            AscError::UnexpectedEof => write!(f, "unexpected end of file"),
            AscError::IoError(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for AscError {}

#[derive(Copy, Clone, Debug)]
enum Target {
    Tile(TileId),
    Bram(BramId),
}

#[derive(Copy, Clone, Debug)]
enum State {
    FindEntry,
    ReadLine { target: Target, row: usize },
    ReadToNextDirective,
}

fn parse_num(arg: &str, line: usize) -> Result<usize, AscError> {
    arg.parse().map_err(|_| AscError::BadArguments(line))
}

fn parse_pos<'s>(args: impl Iterator<Item = &'s str>, line: usize) -> Result<TilePos, AscError> {
    let (x, y) = args.collect_tuple().ok_or(AscError::BadArguments(line))?;
    Ok(TilePos::new(parse_num(x, line)?, parse_num(y, line)?))
}

/// Finds the device named by the first `.device` line.
pub fn device_from_asc(reader: impl BufRead) -> Result<String, AscError> {
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let mut args = line.split_whitespace();
        if args.next() == Some(".device") {
            let (name,) = args
                .collect_tuple()
                .ok_or(AscError::BadArguments(lineno + 1))?;
            return Ok(name.to_string());
        }
    }
    Err(AscError::MissingDevice)
}

struct AscReader<'c, 'a> {
    config: &'c mut Configuration<'a>,
    state: State,
    comment: Vec<String>,
}

impl AscReader<'_, '_> {
    fn finish_comment_block(&mut self) {
        while self.comment.last().is_some_and(|line| line.is_empty()) {
            self.comment.pop();
        }
    }

    fn data_line(
        &mut self,
        target: Target,
        row: usize,
        line: &str,
        lineno: usize,
    ) -> Result<(), AscError> {
        match target {
            Target::Tile(id) => {
                let width = self.config.tiles[id].len() / self.config.geom().tile_height;
                let bits = &mut self.config.tiles[id];
                if line.len() != width {
                    return Err(AscError::BadDataLine(lineno));
                }
                for (i, c) in line.bytes().enumerate() {
                    let value = match c {
                        b'0' => false,
                        b'1' => true,
                        _ => return Err(AscError::BadDataLine(lineno)),
                    };
                    bits.set(row * width + i, value);
                }
            }
            Target::Bram(id) => {
                if line.len() != BRAM_INDICES / 4 {
                    return Err(AscError::BadDataLine(lineno));
                }
                let bits = &mut self.config.bram[id][row * BRAM_INDICES..][..BRAM_INDICES];
                for (i, c) in line.chars().enumerate() {
                    let digit = c.to_digit(16).ok_or(AscError::BadDataLine(lineno))?;
                    let base = (BRAM_INDICES / 4 - 1 - i) * 4;
                    for k in 0..4 {
                        bits.set(base + k, (digit >> k & 1) != 0);
                    }
                }
            }
        }
        Ok(())
    }

    fn tile_directive<'s>(
        &mut self,
        kind: TileKind,
        args: impl Iterator<Item = &'s str>,
        lineno: usize,
    ) -> Result<(), AscError> {
        let geom = self.config.geom();
        let pos = parse_pos(args, lineno)?;
        match geom.tile_kind(pos) {
            None => return Err(AscError::NoTile(pos)),
            Some(actual) if actual != kind => return Err(AscError::TileKindMismatch(pos, kind)),
            Some(_) => (),
        }
        let id = geom.tile_id(pos).ok_or(AscError::NoTile(pos))?;
        self.state = State::ReadLine {
            target: Target::Tile(id),
            row: 0,
        };
        Ok(())
    }

    fn directive(&mut self, line: &str, lineno: usize) -> Result<(), AscError> {
        let geom = self.config.geom();
        let mut args = line[1..].split_whitespace();
        let name = args.next().unwrap_or("");
        if let Some(kind) = TileKind::from_asc_name(name) {
            return self.tile_directive(kind, args, lineno);
        }
        match name {
            "comment" => {
                let first = line[1..].trim_start()[name.len()..].trim();
                if !first.is_empty() {
                    self.comment.push(first.to_string());
                }
                self.state = State::ReadToNextDirective;
            }
            "device" => {
                let (found,) = args.collect_tuple().ok_or(AscError::BadArguments(lineno))?;
                if found != geom.name {
                    return Err(AscError::DeviceMismatch {
                        expected: geom.name.clone(),
                        found: found.to_string(),
                    });
                }
            }
            "ram_data" => {
                let pos = parse_pos(args, lineno)?;
                let id = geom.bram_id(pos).ok_or(AscError::NoBram(pos))?;
                self.state = State::ReadLine {
                    target: Target::Bram(id),
                    row: 0,
                };
            }
            "extra_bit" => {
                let (bank, x, y) = args.collect_tuple().ok_or(AscError::BadArguments(lineno))?;
                let bit = ExtraBit::new(
                    parse_num(bank, lineno)?,
                    parse_num(x, lineno)?,
                    parse_num(y, lineno)?,
                );
                if !geom.is_extra_bit(bit) {
                    return Err(AscError::BadExtraBit(bit));
                }
                self.config.extra_bits.insert(bit);
            }
            "warmboot" => {
                let (arg,) = args.collect_tuple().ok_or(AscError::BadArguments(lineno))?;
                self.config.warmboot = match arg {
                    "enabled" => true,
                    "disabled" => false,
                    _ => return Err(AscError::BadWarmboot(arg.to_string())),
                };
            }
            "sym" => (),
            _ => return Err(AscError::UnknownDirective(name.to_string())),
        }
        Ok(())
    }

    fn line(&mut self, line: &str, lineno: usize) -> Result<(), AscError> {
        match self.state {
            State::ReadLine { target, row } => {
                self.data_line(target, row, line, lineno)?;
                let rows = match target {
                    Target::Tile(_) => self.config.geom().tile_height,
                    Target::Bram(_) => BRAM_GROUPS,
                };
                self.state = if row + 1 == rows {
                    State::FindEntry
                } else {
                    State::ReadLine {
                        target,
                        row: row + 1,
                    }
                };
            }
            State::ReadToNextDirective => {
                if line.starts_with('.') {
                    self.finish_comment_block();
                    self.state = State::FindEntry;
                    self.directive(line, lineno)?;
                } else {
                    self.comment.push(line.to_string());
                }
            }
            State::FindEntry => {
                if line.is_empty() {
                    return Ok(());
                }
                if !line.starts_with('.') {
                    return Err(AscError::UnexpectedLine(lineno));
                }
                self.directive(line, lineno)?;
            }
        }
        Ok(())
    }
}

impl<'a> Configuration<'a> {
    /// Replaces the whole configuration with the contents of an asc file.
    pub fn read_asc(&mut self, reader: impl BufRead) -> Result<(), AscError> {
        self.clear();
        let mut asc = AscReader {
            config: &mut *self,
            state: State::FindEntry,
            comment: vec![],
        };
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            asc.line(line.trim(), lineno + 1)?;
        }
        match asc.state {
            State::ReadLine { .. } => return Err(AscError::UnexpectedEof),
            State::ReadToNextDirective => asc.finish_comment_block(),
            State::FindEntry => (),
        }
        self.comment = asc.comment.join("\n");
        Ok(())
    }

    pub fn parse_asc(&mut self, text: &str) -> Result<(), AscError> {
        self.read_asc(text.as_bytes())
    }

    /// Parses an asc file against the geometry its `.device` line names.
    pub fn from_asc(text: &str) -> Result<Configuration<'static>, AscError> {
        let name = device_from_asc(text.as_bytes())?;
        let mut config = Configuration::new(DeviceGeometry::by_name(&name)?);
        config.parse_asc(text)?;
        Ok(config)
    }

    pub fn emit_asc(&self) -> String {
        let geom = self.geom();
        let mut out = String::new();
        if !self.comment.is_empty() {
            writeln!(out, ".comment").unwrap();
            for line in self.comment.lines() {
                writeln!(out, "{line}").unwrap();
            }
        }
        writeln!(out, ".device {name}", name = geom.name).unwrap();
        if !self.warmboot {
            writeln!(out, ".warmboot disabled").unwrap();
        }
        for (id, pos, kind) in geom.tiles().sorted_by_key(|&(_, pos, _)| pos) {
            let bits = &self.tiles[id];
            writeln!(out, ".{kind} {x} {y}", kind = kind.asc_name(), x = pos.x, y = pos.y)
                .unwrap();
            for row in bits.chunks(geom.tile_width[kind]) {
                for bit in row {
                    out.push(if *bit { '1' } else { '0' });
                }
                out.push('\n');
            }
        }
        for (id, pos) in geom.brams().sorted_by_key(|&(_, pos)| pos) {
            let bits = &self.bram[id];
            if bits.not_any() {
                continue;
            }
            writeln!(out, ".ram_data {x} {y}", x = pos.x, y = pos.y).unwrap();
            for row in bits.chunks(BRAM_INDICES) {
                for nibble in row.chunks(4).rev() {
                    write!(out, "{digit:x}", digit = nibble.load_le::<u8>()).unwrap();
                }
                out.push('\n');
            }
        }
        for bit in &self.extra_bits {
            writeln!(out, ".extra_bit {bank} {x} {y}", bank = bit.bank, x = bit.x, y = bit.y)
                .unwrap();
        }
        out
    }

    pub fn write_asc(&self, mut writer: impl Write) -> std::io::Result<()> {
        writer.write_all(self.emit_asc().as_bytes())
    }
}
