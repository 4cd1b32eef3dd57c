use std::sync::LazyLock;

use enum_map::{Enum, EnumMap, enum_map};
use jzon::JsonValue;
use serde::{Deserialize, Serialize};
use unnamed_entity::{EntityId, entity_id};

mod bram;

pub use bram::{BRAM_GROUPS, BRAM_INDICES, BramLoc, BramMode};

entity_id! {
    pub id TileId u16;
    pub id BramId u16;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Enum)]
pub enum TileKind {
    Io,
    Logic,
    RamT,
    RamB,
}

impl TileKind {
    /// The directive name used for this tile kind in asc files.
    pub fn asc_name(self) -> &'static str {
        match self {
            TileKind::Io => "io_tile",
            TileKind::Logic => "logic_tile",
            TileKind::RamT => "ramt_tile",
            TileKind::RamB => "ramb_tile",
        }
    }

    pub fn from_asc_name(name: &str) -> Option<Self> {
        match name {
            "io_tile" => Some(TileKind::Io),
            "logic_tile" => Some(TileKind::Logic),
            "ramt_tile" => Some(TileKind::RamT),
            "ramb_tile" => Some(TileKind::RamB),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: usize,
    pub y: usize,
}

impl TilePos {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for TilePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X{x}Y{y}", x = self.x, y = self.y)
    }
}

/// One bit of a tile: `group` is the row, `index` the column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BitAddr {
    pub group: usize,
    pub index: usize,
}

impl BitAddr {
    pub fn new(group: usize, index: usize) -> Self {
        Self { group, index }
    }
}

/// A CRAM bit that belongs to no tile, addressed directly in bank coordinates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExtraBit {
    pub bank: usize,
    pub x: usize,
    pub y: usize,
}

impl ExtraBit {
    pub fn new(bank: usize, x: usize, y: usize) -> Self {
        Self { bank, x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeomError {
    UnknownDevice(String),
}

impl std::fmt::Display for GeomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeomError::UnknownDevice(name) => write!(f, "unknown device {name:?}"),
        }
    }
}

impl std::error::Error for GeomError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGeometry {
    pub name: String,
    pub max_x: usize,
    pub max_y: usize,
    pub tile_height: usize,
    pub tile_width: EnumMap<TileKind, usize>,
    pub cram_width: usize,
    pub cram_height: usize,
    pub bram_width: usize,
    pub bram_height: usize,
    pub bram_cols: Vec<usize>,
    pub extra_bits: Vec<ExtraBit>,
}

static GEOMETRIES: LazyLock<Vec<DeviceGeometry>> = LazyLock::new(|| vec![hx8k()]);

fn hx8k() -> DeviceGeometry {
    DeviceGeometry {
        name: "8k".into(),
        max_x: 33,
        max_y: 33,
        tile_height: 16,
        tile_width: enum_map! {
            TileKind::Io => 18,
            TileKind::Logic => 54,
            TileKind::RamT => 42,
            TileKind::RamB => 42,
        },
        cram_width: 872,
        cram_height: 272,
        bram_width: 128,
        bram_height: 256,
        bram_cols: vec![8, 25],
        extra_bits: vec![
            ExtraBit::new(0, 870, 270),
            ExtraBit::new(0, 871, 270),
            ExtraBit::new(1, 870, 271),
            ExtraBit::new(1, 871, 271),
            ExtraBit::new(1, 870, 270),
            ExtraBit::new(1, 871, 270),
            ExtraBit::new(0, 870, 271),
            ExtraBit::new(0, 871, 271),
        ],
    }
}

impl DeviceGeometry {
    pub fn by_name(name: &str) -> Result<&'static DeviceGeometry, GeomError> {
        GEOMETRIES
            .iter()
            .find(|geom| geom.name == name)
            .ok_or_else(|| GeomError::UnknownDevice(name.to_string()))
    }

    pub fn all() -> &'static [DeviceGeometry] {
        &GEOMETRIES
    }

    pub fn is_bram_col(&self, x: usize) -> bool {
        self.bram_cols.contains(&x)
    }

    /// First column of the right half.
    pub fn col_mid(&self) -> usize {
        self.max_x.div_ceil(2)
    }

    /// First row of the top half.
    pub fn row_mid(&self) -> usize {
        self.max_y.div_ceil(2)
    }

    pub fn tile_kind(&self, pos: TilePos) -> Option<TileKind> {
        let TilePos { x, y } = pos;
        if x > self.max_x || y > self.max_y {
            return None;
        }
        let border_x = x == 0 || x == self.max_x;
        let border_y = y == 0 || y == self.max_y;
        if border_x && border_y {
            None
        } else if border_x || border_y {
            Some(TileKind::Io)
        } else if self.is_bram_col(x) {
            if y % 2 == 0 {
                Some(TileKind::RamT)
            } else {
                Some(TileKind::RamB)
            }
        } else {
            Some(TileKind::Logic)
        }
    }

    /// Every tile of the device: border I/O first (bottom, top, left, right),
    /// then the interior row by row.
    pub fn tile_positions(&self) -> impl Iterator<Item = (TilePos, TileKind)> + '_ {
        let (mx, my) = (self.max_x, self.max_y);
        let bottom = (1..mx).map(|x| TilePos::new(x, 0));
        let top = (1..mx).map(move |x| TilePos::new(x, my));
        let left = (1..my).map(|y| TilePos::new(0, y));
        let right = (1..my).map(move |y| TilePos::new(mx, y));
        let interior = (1..my).flat_map(move |y| (1..mx).map(move |x| TilePos::new(x, y)));
        bottom
            .chain(top)
            .chain(left)
            .chain(right)
            .chain(interior)
            .map(|pos| (pos, self.tile_kind(pos).unwrap()))
    }

    pub fn num_tiles(&self) -> usize {
        let (w, h) = (self.max_x - 1, self.max_y - 1);
        2 * w + 2 * h + w * h
    }

    /// Dense index of a tile, in `tile_positions` order.
    pub fn tile_id(&self, pos: TilePos) -> Option<TileId> {
        self.tile_kind(pos)?;
        let TilePos { x, y } = pos;
        let (w, h) = (self.max_x - 1, self.max_y - 1);
        let idx = if y == 0 {
            x - 1
        } else if y == self.max_y {
            w + x - 1
        } else if x == 0 {
            2 * w + y - 1
        } else if x == self.max_x {
            2 * w + h + y - 1
        } else {
            2 * w + 2 * h + (y - 1) * w + x - 1
        };
        Some(TileId::from_idx(idx))
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileId, TilePos, TileKind)> + '_ {
        self.tile_positions()
            .enumerate()
            .map(|(idx, (pos, kind))| (TileId::from_idx(idx), pos, kind))
    }

    /// Width of the CRAM column occupied by grid column `x`.
    pub fn col_width(&self, x: usize) -> usize {
        if x == 0 || x == self.max_x {
            self.tile_width[TileKind::Io]
        } else if self.is_bram_col(x) {
            self.tile_width[TileKind::RamB]
        } else {
            self.tile_width[TileKind::Logic]
        }
    }

    fn bram_rows(&self) -> usize {
        self.max_y / 2
    }

    /// Block memories live at the `RamB` tiles.
    pub fn bram_positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.bram_cols.iter().flat_map(move |&x| {
            (0..self.bram_rows()).map(move |i| TilePos::new(x, 1 + 2 * i))
        })
    }

    pub fn num_brams(&self) -> usize {
        self.bram_cols.len() * self.bram_rows()
    }

    pub fn bram_id(&self, pos: TilePos) -> Option<BramId> {
        if self.tile_kind(pos) != Some(TileKind::RamB) {
            return None;
        }
        let col = self.bram_cols.iter().position(|&x| x == pos.x)?;
        Some(BramId::from_idx(col * self.bram_rows() + (pos.y - 1) / 2))
    }

    pub fn brams(&self) -> impl Iterator<Item = (BramId, TilePos)> + '_ {
        self.bram_positions()
            .enumerate()
            .map(|(idx, pos)| (BramId::from_idx(idx), pos))
    }

    pub fn is_extra_bit(&self, bit: ExtraBit) -> bool {
        self.extra_bits.contains(&bit)
    }
}

impl From<&DeviceGeometry> for JsonValue {
    fn from(geom: &DeviceGeometry) -> Self {
        jzon::object! {
            name: geom.name.as_str(),
            max_x: geom.max_x,
            max_y: geom.max_y,
            tile_height: geom.tile_height,
            tile_width: jzon::object! {
                io: geom.tile_width[TileKind::Io],
                logic: geom.tile_width[TileKind::Logic],
                ramt: geom.tile_width[TileKind::RamT],
                ramb: geom.tile_width[TileKind::RamB],
            },
            cram: jzon::array![geom.cram_width, geom.cram_height],
            bram: jzon::array![geom.bram_width, geom.bram_height],
            bram_cols: geom.bram_cols.clone(),
            extra_bits: Vec::from_iter(
                geom.extra_bits.iter().map(|bit| jzon::array![bit.bank, bit.x, bit.y])
            ),
        }
    }
}

#[test]
fn test_lookup() {
    let geom = DeviceGeometry::by_name("8k").unwrap();
    assert_eq!(geom.max_x, 33);
    assert_eq!(
        DeviceGeometry::by_name("1k"),
        Err(GeomError::UnknownDevice("1k".into()))
    );
}

#[test]
fn test_tile_ids() {
    for geom in DeviceGeometry::all() {
        let mut count = 0;
        for (id, pos, kind) in geom.tiles() {
            assert_eq!(geom.tile_id(pos), Some(id));
            assert_eq!(geom.tile_kind(pos), Some(kind));
            count += 1;
        }
        assert_eq!(count, geom.num_tiles());
        assert_eq!(geom.tile_id(TilePos::new(0, 0)), None);
        assert_eq!(geom.tile_id(TilePos::new(geom.max_x, geom.max_y)), None);
        assert_eq!(geom.tile_id(TilePos::new(geom.max_x + 1, 1)), None);
    }
}

#[test]
fn test_tile_kinds() {
    let geom = DeviceGeometry::by_name("8k").unwrap();
    assert_eq!(geom.tile_kind(TilePos::new(0, 1)), Some(TileKind::Io));
    assert_eq!(geom.tile_kind(TilePos::new(5, 33)), Some(TileKind::Io));
    assert_eq!(geom.tile_kind(TilePos::new(8, 1)), Some(TileKind::RamB));
    assert_eq!(geom.tile_kind(TilePos::new(25, 2)), Some(TileKind::RamT));
    assert_eq!(geom.tile_kind(TilePos::new(15, 16)), Some(TileKind::Logic));
    let order: Vec<_> = geom.tile_positions().take(2).map(|(pos, _)| pos).collect();
    assert_eq!(order, [TilePos::new(1, 0), TilePos::new(2, 0)]);
}

#[test]
fn test_brams() {
    let geom = DeviceGeometry::by_name("8k").unwrap();
    assert_eq!(geom.num_brams(), 32);
    for (id, pos) in geom.brams() {
        assert_eq!(geom.bram_id(pos), Some(id));
        assert_eq!(geom.tile_kind(pos), Some(TileKind::RamB));
    }
    assert_eq!(geom.bram_id(TilePos::new(8, 2)), None);
    assert_eq!(geom.bram_id(TilePos::new(9, 1)), None);
}

#[test]
fn test_bank_sizes() {
    for geom in DeviceGeometry::all() {
        let left: usize = (0..geom.col_mid()).map(|x| geom.col_width(x)).sum();
        let right: usize = (geom.col_mid()..=geom.max_x).map(|x| geom.col_width(x)).sum();
        assert_eq!(left, right);
        assert_eq!(left + 2, geom.cram_width);
        assert_eq!(geom.row_mid() * geom.tile_height, geom.cram_height);
        assert_eq!((geom.max_y + 1 - geom.row_mid()) * geom.tile_height, geom.cram_height);
        for bit in &geom.extra_bits {
            assert!(bit.bank < 4 && bit.x < geom.cram_width && bit.y < geom.cram_height);
            assert!(bit.x >= left);
        }
        let blocks_per_bank = geom.bram_rows() / 2;
        assert_eq!(blocks_per_bank * 16, geom.bram_width);
        assert_eq!(BRAM_GROUPS * BRAM_INDICES / 16, geom.bram_height);
    }
}

#[test]
fn test_json() {
    let geom = DeviceGeometry::by_name("8k").unwrap();
    let json = JsonValue::from(geom);
    assert_eq!(json["name"], "8k");
    assert_eq!(json["cram"][0], 872);
    assert_eq!(json["bram_cols"][1], 25);
    assert_eq!(json["extra_bits"].len(), 8);
}
