use std::ops::Range;

use bitvec::prelude::*;
use icecfg_geom::{
    BRAM_GROUPS, BRAM_INDICES, BitAddr, BramId, DeviceGeometry, TileId, TileKind, TilePos,
};

use crate::{config::Configuration, span::Span};

pub const NUM_BANKS: usize = 4;

/// Bank row used for each group of an I/O tile on the top or bottom edge.
const IO_ROW_PERM: [usize; 16] = [0, 1, 3, 2, 4, 5, 7, 6, 8, 9, 11, 10, 12, 13, 15, 14];
/// Column within the grid column used for each index of such a tile.
const IO_COL_PERM: [usize; 18] = [
    23, 25, 26, 27, 16, 17, 18, 19, 20, 14, 32, 33, 34, 35, 36, 37, 4, 5,
];

/// One quadrant of CRAM or BRAM as it travels on the wire, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bank {
    width: usize,
    height: usize,
    bits: BitVec,
}

pub type Banks = [Bank; NUM_BANKS];

impl Bank {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: BitVec::repeat(false, width * height),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        assert!(row < self.height && col < self.width);
        self.bits[row * self.width + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        assert!(row < self.height && col < self.width);
        self.bits.set(row * self.width + col, value);
    }

    pub fn rows(&self, rows: Range<usize>) -> &BitSlice {
        &self.bits[rows.start * self.width..rows.end * self.width]
    }

    pub fn rows_mut(&mut self, rows: Range<usize>) -> &mut BitSlice {
        &mut self.bits[rows.start * self.width..rows.end * self.width]
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Smallest row range holding every asserted bit.
    pub fn used_rows(&self) -> Option<Range<usize>> {
        let used = |row: &usize| self.rows(*row..*row + 1).any();
        let first = (0..self.height).find(used)?;
        let last = (0..self.height).rfind(used)?;
        Some(first..last + 1)
    }
}

fn blank_banks(width: usize, height: usize) -> Banks {
    std::array::from_fn(|_| Bank::new(width, height))
}

fn check_banks(banks: &Banks, width: usize, height: usize) {
    for bank in banks {
        assert_eq!((bank.width, bank.height), (width, height), "bank size mismatch");
    }
}

/// Where a tile lands in the CRAM banks.
struct CramPlacement {
    bank: usize,
    rows: Span,
    cols: Span,
    io_row: bool,
}

impl CramPlacement {
    fn new(geom: &DeviceGeometry, pos: TilePos, kind: TileKind) -> Self {
        let (col_mid, row_mid) = (geom.col_mid(), geom.row_mid());
        let top = pos.y >= row_mid;
        let right = pos.x >= col_mid;
        let (row_lo, row_hi) = if top {
            (row_mid, geom.max_y + 1)
        } else {
            (0, row_mid)
        };
        let (col_lo, col_hi) = if right {
            (col_mid, geom.max_x + 1)
        } else {
            (0, col_mid)
        };

        let th = geom.tile_height;
        let mut rows = Span::new((pos.y - row_lo) * th, th);
        if top {
            rows = rows.mirror((row_hi - row_lo) * th);
        }
        let col_off = (col_lo..pos.x).map(|x| geom.col_width(x)).sum();
        let half_width = (col_lo..col_hi).map(|x| geom.col_width(x)).sum();
        let mut cols = Span::new(col_off, geom.col_width(pos.x));
        if right {
            cols = cols.mirror(half_width);
        }

        Self {
            bank: top as usize | (right as usize) << 1,
            rows,
            cols,
            io_row: kind == TileKind::Io && (pos.y == 0 || pos.y == geom.max_y),
        }
    }

    fn locate(&self, bit: BitAddr) -> (usize, usize) {
        if self.io_row {
            (
                self.rows.get(IO_ROW_PERM[bit.group]),
                self.cols.get(IO_COL_PERM[bit.index]),
            )
        } else {
            (self.rows.get(bit.group), self.cols.get(bit.index))
        }
    }
}

/// Calls `f(tile, bit_index, bank, row, col)` for every tile bit.
fn walk_cram(geom: &DeviceGeometry, mut f: impl FnMut(TileId, usize, usize, usize, usize)) {
    for (tile, pos, kind) in geom.tiles() {
        let place = CramPlacement::new(geom, pos, kind);
        let width = geom.tile_width[kind];
        for group in 0..geom.tile_height {
            for index in 0..width {
                let (row, col) = place.locate(BitAddr::new(group, index));
                f(tile, group * width + index, place.bank, row, col);
            }
        }
    }
}

/// Calls `f(bram, bit, bank, row, col)` for every block memory bit.
fn walk_bram(geom: &DeviceGeometry, mut f: impl FnMut(BramId, BitAddr, usize, usize, usize)) {
    let row_mid = geom.row_mid();
    for (bram, pos) in geom.brams() {
        let top = pos.y >= row_mid;
        let right = pos.x >= geom.col_mid();
        let bank = top as usize | (right as usize) << 1;
        let first = if top { row_mid | 1 } else { 1 };
        let block = (pos.y - first) / 2;
        let stripe = Span::new(block * 16, 16).rev();
        for group in 0..BRAM_GROUPS {
            for index in 0..BRAM_INDICES {
                let row = group * 16 + index / 16;
                let col = stripe.get(index % 16);
                f(bram, BitAddr::new(group, index), bank, row, col);
            }
        }
    }
}

impl Configuration<'_> {
    pub fn blank_cram_banks(&self) -> Banks {
        blank_banks(self.geom().cram_width, self.geom().cram_height)
    }

    pub fn blank_bram_banks(&self) -> Banks {
        blank_banks(self.geom().bram_width, self.geom().bram_height)
    }

    /// Stores every tile bit and extra bit at its bank position.
    pub fn write_cram_banks(&self, banks: &mut Banks) {
        let geom = self.geom();
        check_banks(banks, geom.cram_width, geom.cram_height);
        walk_cram(geom, |tile, idx, bank, row, col| {
            banks[bank].set(row, col, self.tiles[tile][idx]);
        });
        for &bit in &geom.extra_bits {
            banks[bit.bank].set(bit.y, bit.x, self.extra_bits.contains(&bit));
        }
    }

    /// Replaces every tile bit and extra bit with the bank contents.
    pub fn read_cram_banks(&mut self, banks: &Banks) {
        let geom = self.geom();
        check_banks(banks, geom.cram_width, geom.cram_height);
        walk_cram(geom, |tile, idx, bank, row, col| {
            self.tiles[tile].set(idx, banks[bank].get(row, col));
        });
        self.extra_bits = geom
            .extra_bits
            .iter()
            .copied()
            .filter(|bit| banks[bit.bank].get(bit.y, bit.x))
            .collect();
    }

    pub fn write_bram_banks(&self, banks: &mut Banks) {
        let geom = self.geom();
        check_banks(banks, geom.bram_width, geom.bram_height);
        walk_bram(geom, |bram, bit, bank, row, col| {
            banks[bank].set(row, col, self.bram_get(bram, bit));
        });
    }

    pub fn read_bram_banks(&mut self, banks: &Banks) {
        let geom = self.geom();
        check_banks(banks, geom.bram_width, geom.bram_height);
        walk_bram(geom, |bram, bit, bank, row, col| {
            self.bram_set(bram, bit, banks[bank].get(row, col));
        });
    }
}
