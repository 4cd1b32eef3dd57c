use enum_map::Enum;
use serde::{Deserialize, Serialize};

use crate::BitAddr;

/// Rows of a block memory as stored in asc files.
pub const BRAM_GROUPS: usize = 16;
/// Bits per block memory row.
pub const BRAM_INDICES: usize = 256;

/// Data width a block memory is viewed through.
///
/// Every mode covers the same 4096 bits.  Narrower modes interleave several
/// values into each 16-bit word: value bit `j` at sub-offset `o` sits at word
/// bit `j * (16 / width) + o`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Enum)]
pub enum BramMode {
    Bram256x16,
    Bram512x8,
    Bram1024x4,
    Bram2048x2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BramLoc {
    pub row: usize,
    /// 16-bit word within the row.
    pub column: usize,
    /// Which of the interleaved values within the word.
    pub offset: usize,
}

impl BramMode {
    pub const ALL: [BramMode; 4] = [
        BramMode::Bram256x16,
        BramMode::Bram512x8,
        BramMode::Bram1024x4,
        BramMode::Bram2048x2,
    ];

    /// Bits per value.
    pub fn width(self) -> usize {
        match self {
            BramMode::Bram256x16 => 16,
            BramMode::Bram512x8 => 8,
            BramMode::Bram1024x4 => 4,
            BramMode::Bram2048x2 => 2,
        }
    }

    /// Number of addressable values.
    pub fn values(self) -> usize {
        BRAM_GROUPS * BRAM_INDICES / self.width()
    }

    pub fn max_value(self) -> u16 {
        ((1u32 << self.width()) - 1) as u16
    }

    fn spread(self) -> usize {
        16 / self.width()
    }

    pub fn decompose(self, address: usize) -> BramLoc {
        assert!(
            address < self.values(),
            "address {address} out of range for {self:?}"
        );
        let word = address % 256;
        BramLoc {
            row: word / 16,
            column: word % 16,
            offset: address / 256,
        }
    }

    pub fn recompose(self, loc: BramLoc) -> usize {
        assert!(loc.row < 16 && loc.column < 16 && loc.offset < self.spread());
        loc.offset * 256 + loc.row * 16 + loc.column
    }

    /// Location of bit `bit` of the value stored at `loc`.
    pub fn bit_addr(self, loc: BramLoc, bit: usize) -> BitAddr {
        assert!(bit < self.width());
        BitAddr {
            group: loc.row,
            index: loc.column * 16 + bit * self.spread() + loc.offset,
        }
    }
}

#[test]
fn test_decompose() {
    for mode in BramMode::ALL {
        for address in 0..mode.values() {
            let loc = mode.decompose(address);
            assert_eq!(mode.recompose(loc), address);
        }
    }
    assert_eq!(
        BramMode::Bram512x8.decompose(0x123),
        BramLoc {
            row: 2,
            column: 3,
            offset: 1
        }
    );
}

#[test]
fn test_bits_cover_block() {
    for mode in BramMode::ALL {
        let mut seen = vec![false; BRAM_GROUPS * BRAM_INDICES];
        for address in 0..mode.values() {
            let loc = mode.decompose(address);
            for bit in 0..mode.width() {
                let addr = mode.bit_addr(loc, bit);
                let idx = addr.group * BRAM_INDICES + addr.index;
                assert!(!seen[idx]);
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|&x| x));
    }
}

#[test]
#[should_panic]
fn test_decompose_out_of_range() {
    BramMode::Bram256x16.decompose(256);
}
