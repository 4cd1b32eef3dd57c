use assert_matches::assert_matches;
use icecfg_bitstream::{
    BinError, BinOptions, BramMode, Configuration, DeviceGeometry, FreqRange, PREAMBLE,
    Programmer, TilePos,
};
use rand::prelude::*;
use rand::rngs::SmallRng;

fn geom() -> &'static DeviceGeometry {
    DeviceGeometry::by_name("8k").unwrap()
}

fn random_config(rng: &mut SmallRng, density: f64) -> Configuration<'static> {
    let geom = geom();
    let mut config = Configuration::new(geom);
    for (pos, kind) in geom.tile_positions() {
        for group in 0..geom.tile_height {
            for index in 0..geom.tile_width[kind] {
                if rng.random_bool(density) {
                    config.set_bit(pos.x, pos.y, group, index, true);
                }
            }
        }
    }
    for pos in geom.bram_positions() {
        if rng.random_bool(0.5) {
            let values: Vec<u16> = (0..256).map(|_| rng.random()).collect();
            config.set_bram_values(pos, 0, &values, BramMode::Bram256x16);
        }
    }
    for &bit in &geom.extra_bits {
        if rng.random() {
            config.set_extra_bit(bit, true);
        }
    }
    config.freq_range =
        [FreqRange::Low, FreqRange::Medium, FreqRange::High][rng.random_range(0..3)];
    config.warmboot = rng.random();
    config.nosleep = rng.random();
    config
}

fn bram_bank(pos: TilePos) -> usize {
    let geom = geom();
    (pos.y >= geom.row_mid()) as usize | ((pos.x >= geom.col_mid()) as usize) << 1
}

#[test]
fn test_asc_roundtrip() {
    let mut rng = SmallRng::seed_from_u64(1);
    for density in [0.01, 0.5] {
        let mut config = random_config(&mut rng, density);
        config.comment = "generated\nby a test".into();
        // not carried by the text format
        config.freq_range = FreqRange::Low;
        config.nosleep = false;
        let text = config.emit_asc();
        let copy = Configuration::from_asc(&text).unwrap();
        assert_eq!(copy, config);

        let mut out = vec![];
        copy.write_asc(&mut out).unwrap();
        assert_eq!(out, text.as_bytes());
    }
}

#[test]
fn test_bin_roundtrip() {
    let mut rng = SmallRng::seed_from_u64(2);
    for (seed, density) in [0.0, 0.001, 0.1, 0.5, 0.9].into_iter().enumerate() {
        let mut config = random_config(&mut rng, density);
        config.comment = format!("round {seed}");
        let mut data = vec![];
        config.write_bin(&mut data, &BinOptions::new()).unwrap();
        let mut copy = Configuration::new(geom());
        copy.read_bin(&data[..]).unwrap();
        assert_eq!(copy, config);
    }
}

#[test]
fn test_bank_symmetry() {
    let mut rng = SmallRng::seed_from_u64(3);
    for density in [0.05, 0.5] {
        let config = random_config(&mut rng, density);
        let mut cram = config.blank_cram_banks();
        let mut bram = config.blank_bram_banks();
        config.write_cram_banks(&mut cram);
        config.write_bram_banks(&mut bram);
        let mut copy = Configuration::new(geom());
        copy.read_cram_banks(&cram);
        copy.read_bram_banks(&bram);
        copy.comment = config.comment.clone();
        copy.freq_range = config.freq_range;
        copy.warmboot = config.warmboot;
        copy.nosleep = config.nosleep;
        assert_eq!(copy, config);
    }
}

#[test]
fn test_crc_flip() {
    let mut rng = SmallRng::seed_from_u64(4);
    let config = random_config(&mut rng, 0.2);
    let data = config.get_bitstream(&BinOptions::new());
    let start = data.windows(4).position(|w| w == PREAMBLE).unwrap() + 24;
    let payload = 872 * 272 / 8;
    for _ in 0..32 {
        let pos = start + rng.random_range(0..payload);
        let mut bad = data.clone();
        bad[pos] ^= 1 << rng.random_range(0..8);
        let err = Configuration::from_bin(geom(), &bad).unwrap_err();
        assert_matches!(err, BinError::CrcMismatch);
        assert!(err.is_malformed() && !err.is_truncation());
    }
}

#[test]
fn test_truncation() {
    let mut rng = SmallRng::seed_from_u64(5);
    let config = random_config(&mut rng, 0.2);
    let data = config.get_bitstream(&BinOptions::new());
    for len in [10, 100, data.len() / 2, data.len() - 4] {
        let err = Configuration::from_bin(geom(), &data[..len]).unwrap_err();
        assert!(err.is_truncation(), "{len}: {err}");
    }

    let mut config = config;
    config.comment = "Lattice\niCEcube2".into();
    let data = config.get_bitstream(&BinOptions::new());
    // comment block is 21 bytes, the preamble follows
    assert_eq!(data[21..25], PREAMBLE);
    for len in [0, 1, 5, 20, 21, 22, 24, 26] {
        let err = Configuration::from_bin(geom(), &data[..len]).unwrap_err();
        assert!(err.is_truncation(), "{len}: {err}");
        assert!(!err.is_malformed());
    }
}

#[test]
fn test_optimize() {
    let mut rng = SmallRng::seed_from_u64(6);
    let mut sparse = Configuration::new(geom());
    sparse.set_bit(5, 5, 0, 3, true);
    sparse.set_bit(30, 20, 15, 0, true);
    sparse.set_bram_values(TilePos::new(8, 3), 7, &[0x1234], BramMode::Bram256x16);
    let configs = [
        Configuration::new(geom()),
        sparse,
        random_config(&mut rng, 0.001),
        random_config(&mut rng, 0.3),
    ];
    for config in configs {
        let mut last = usize::MAX;
        for level in 0..=BinOptions::MAX_OPTIMIZE {
            let data = config.get_bitstream(&BinOptions::new().optimize(level));
            assert!(data.len() <= last, "level {level}: {} > {last}", data.len());
            last = data.len();
            assert_eq!(Configuration::from_bin(geom(), &data).unwrap(), config);
        }
    }
}

#[test]
fn test_optimize_trims_rows() {
    let mut config = Configuration::new(geom());
    config.set_bit(5, 5, 0, 3, true);
    let full = config.get_bitstream(&BinOptions::new().optimize(2));
    let trimmed = config.get_bitstream(&BinOptions::new().optimize(3));
    // one bank cut down to a single row
    assert_eq!(full.len() - trimmed.len(), 872 * (272 - 1) / 8);
}

#[test]
fn test_bram_selection() {
    let mut rng = SmallRng::seed_from_u64(7);
    let config = random_config(&mut rng, 0.1);
    let data = config.get_bitstream(&BinOptions::new().bram_banks([1, 2]));
    let copy = Configuration::from_bin(geom(), &data).unwrap();
    let mut expected = config.clone();
    for pos in geom().bram_positions() {
        if ![1, 2].contains(&bram_bank(pos)) {
            expected.set_bram_values(pos, 0, &[0; 256], BramMode::Bram256x16);
        }
    }
    assert_eq!(copy, expected);

    let none = config.get_bitstream(&BinOptions::new().bram_banks([]));
    let copy = Configuration::from_bin(geom(), &none).unwrap();
    assert!(geom().bram_positions().all(|pos| copy.bram_is_empty(pos)));
    assert!(none.len() < data.len());
}

#[test]
fn test_detect_used_bram() {
    let mut config = Configuration::new(geom());
    config.set_bram_values(TilePos::new(25, 5), 0, &[0xff; 4], BramMode::Bram512x8);
    assert_eq!(bram_bank(TilePos::new(25, 5)), 2);
    let all = config.get_bitstream(&BinOptions::new());
    let used = config.get_bitstream(&BinOptions::new().detect_used_bram());
    let bram_bank_bytes = 3 + 3 + 2 + 2 * (3 + 2 + 128 * 128 / 8 + 2);
    assert_eq!(all.len() - used.len(), 3 * bram_bank_bytes);
    assert_eq!(Configuration::from_bin(geom(), &used).unwrap(), config);
}

#[derive(Default)]
struct Recorder {
    flashed: Vec<Vec<u8>>,
}

impl Programmer for Recorder {
    type Error = String;

    fn flash_bitstream(&mut self, bitstream: &[u8]) -> Result<(), String> {
        if bitstream.is_empty() {
            return Err("empty bitstream".into());
        }
        self.flashed.push(bitstream.to_vec());
        Ok(())
    }
}

#[test]
fn test_configure() {
    let mut rng = SmallRng::seed_from_u64(8);
    let config = random_config(&mut rng, 0.05);
    let options = BinOptions::new().optimize(4).skip_comment();
    let mut programmer = Recorder::default();
    config.configure(&mut programmer, &options).unwrap();
    assert_eq!(programmer.flashed, [config.get_bitstream(&options)]);
}
