use std::collections::BTreeSet;

use bitvec::prelude::*;
use icecfg_geom::{
    BRAM_GROUPS, BRAM_INDICES, BitAddr, BramId, BramMode, DeviceGeometry, ExtraBit, TileId,
    TileKind, TilePos,
};
use serde::{Deserialize, Serialize};
use unnamed_entity::EntityVec;

/// Internal oscillator speed class selected by the bitstream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FreqRange {
    #[default]
    Low,
    Medium,
    High,
}

impl FreqRange {
    pub fn code(self) -> u8 {
        match self {
            FreqRange::Low => 0,
            FreqRange::Medium => 1,
            FreqRange::High => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(FreqRange::Low),
            1 => Some(FreqRange::Medium),
            2 => Some(FreqRange::High),
            _ => None,
        }
    }
}

/// Complete configuration image of one device.
///
/// Tile bits are stored row-major, `group * width + index`; block memories
/// are 16 x 256 bits each.  All accessors treat an address outside the
/// geometry as a caller bug and panic.
#[derive(Clone, Debug)]
pub struct Configuration<'a> {
    geom: &'a DeviceGeometry,
    pub(crate) tiles: EntityVec<TileId, BitVec>,
    pub(crate) bram: EntityVec<BramId, BitVec>,
    pub(crate) extra_bits: BTreeSet<ExtraBit>,
    pub comment: String,
    pub freq_range: FreqRange,
    pub warmboot: bool,
    pub nosleep: bool,
}

impl PartialEq for Configuration<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.geom.name == other.geom.name
            && self.tiles == other.tiles
            && self.bram == other.bram
            && self.extra_bits == other.extra_bits
            && self.comment == other.comment
            && self.freq_range == other.freq_range
            && self.warmboot == other.warmboot
            && self.nosleep == other.nosleep
    }
}

impl Eq for Configuration<'_> {}

impl<'a> Configuration<'a> {
    pub fn new(geom: &'a DeviceGeometry) -> Self {
        Self {
            geom,
            tiles: geom
                .tiles()
                .map(|(_, _, kind)| BitVec::repeat(false, geom.tile_height * geom.tile_width[kind]))
                .collect(),
            bram: geom
                .brams()
                .map(|_| BitVec::repeat(false, BRAM_GROUPS * BRAM_INDICES))
                .collect(),
            extra_bits: BTreeSet::new(),
            comment: String::new(),
            freq_range: FreqRange::default(),
            warmboot: true,
            nosleep: false,
        }
    }

    pub fn geom(&self) -> &'a DeviceGeometry {
        self.geom
    }

    /// Resets to the blank state of the bound geometry.
    pub fn clear(&mut self) {
        *self = Self::new(self.geom);
    }

    pub fn tile_kind(&self, pos: TilePos) -> TileKind {
        self.geom
            .tile_kind(pos)
            .unwrap_or_else(|| panic!("no tile at {pos}"))
    }

    fn tile_id(&self, pos: TilePos) -> TileId {
        self.geom
            .tile_id(pos)
            .unwrap_or_else(|| panic!("no tile at {pos}"))
    }

    fn bit_index(&self, pos: TilePos, bit: BitAddr) -> usize {
        let width = self.geom.tile_width[self.tile_kind(pos)];
        assert!(
            bit.group < self.geom.tile_height && bit.index < width,
            "bit {bit:?} out of range for tile {pos}"
        );
        bit.group * width + bit.index
    }

    pub fn tile_bits(&self, pos: TilePos) -> &BitSlice {
        &self.tiles[self.tile_id(pos)]
    }

    pub fn get_bit(&self, x: usize, y: usize, group: usize, index: usize) -> bool {
        let pos = TilePos::new(x, y);
        let idx = self.bit_index(pos, BitAddr::new(group, index));
        self.tiles[self.tile_id(pos)][idx]
    }

    pub fn set_bit(&mut self, x: usize, y: usize, group: usize, index: usize, value: bool) {
        let pos = TilePos::new(x, y);
        let idx = self.bit_index(pos, BitAddr::new(group, index));
        let id = self.tile_id(pos);
        self.tiles[id].set(idx, value);
    }

    pub fn get_bits(&self, pos: TilePos, bits: &[BitAddr]) -> Vec<bool> {
        let tile = &self.tiles[self.tile_id(pos)];
        bits.iter()
            .map(|&bit| tile[self.bit_index(pos, bit)])
            .collect()
    }

    pub fn set_bits(&mut self, pos: TilePos, bits: &[BitAddr], values: &[bool]) {
        assert_eq!(bits.len(), values.len());
        let id = self.tile_id(pos);
        for (&bit, &value) in bits.iter().zip(values) {
            let idx = self.bit_index(pos, bit);
            self.tiles[id].set(idx, value);
        }
    }

    pub fn extra_bits(&self) -> &BTreeSet<ExtraBit> {
        &self.extra_bits
    }

    pub fn set_extra_bit(&mut self, bit: ExtraBit, value: bool) {
        assert!(self.geom.is_extra_bit(bit), "{bit:?} is not an extra bit");
        if value {
            self.extra_bits.insert(bit);
        } else {
            self.extra_bits.remove(&bit);
        }
    }

    fn bram_id(&self, pos: TilePos) -> BramId {
        self.geom
            .bram_id(pos)
            .unwrap_or_else(|| panic!("no block memory at {pos}"))
    }

    pub fn bram_bits(&self, pos: TilePos) -> &BitSlice {
        &self.bram[self.bram_id(pos)]
    }

    pub fn bram_is_empty(&self, pos: TilePos) -> bool {
        self.bram_bits(pos).not_any()
    }

    pub(crate) fn bram_get(&self, id: BramId, bit: BitAddr) -> bool {
        self.bram[id][bit.group * BRAM_INDICES + bit.index]
    }

    pub(crate) fn bram_set(&mut self, id: BramId, bit: BitAddr, value: bool) {
        self.bram[id].set(bit.group * BRAM_INDICES + bit.index, value);
    }

    pub fn get_bram_values(
        &self,
        pos: TilePos,
        address: usize,
        count: usize,
        mode: BramMode,
    ) -> Vec<u16> {
        let id = self.bram_id(pos);
        (address..address + count)
            .map(|addr| {
                let loc = mode.decompose(addr);
                (0..mode.width()).fold(0, |acc, bit| {
                    acc | (self.bram_get(id, mode.bit_addr(loc, bit)) as u16) << bit
                })
            })
            .collect()
    }

    pub fn set_bram_values(&mut self, pos: TilePos, address: usize, values: &[u16], mode: BramMode) {
        let id = self.bram_id(pos);
        for (addr, &value) in (address..).zip(values) {
            assert!(
                value <= mode.max_value(),
                "value {value:#x} does not fit {mode:?}"
            );
            let loc = mode.decompose(addr);
            for bit in 0..mode.width() {
                self.bram_set(id, mode.bit_addr(loc, bit), (value >> bit & 1) != 0);
            }
        }
    }
}
