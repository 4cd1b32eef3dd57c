mod asc;
mod banks;
mod bin;
mod config;
mod crc;
mod span;

pub use asc::{AscError, device_from_asc};
pub use banks::{Bank, Banks, NUM_BANKS};
pub use bin::{BinError, BinOptions, PREAMBLE};
pub use config::{Configuration, FreqRange};
pub use crc::Crc16;
pub use icecfg_geom::{
    BitAddr, BramMode, DeviceGeometry, ExtraBit, GeomError, TileKind, TilePos,
};
pub use span::Span;

/// Something that can push a finished bitstream into a device.
pub trait Programmer {
    type Error;

    fn flash_bitstream(&mut self, bitstream: &[u8]) -> Result<(), Self::Error>;
}

impl Configuration<'_> {
    /// Serializes with `options` and hands the result to `programmer`.
    pub fn configure<P: Programmer>(
        &self,
        programmer: &mut P,
        options: &BinOptions,
    ) -> Result<(), P::Error> {
        let bitstream = self.get_bitstream(options);
        log::debug!("flashing {len} byte bitstream", len = bitstream.len());
        programmer.flash_bitstream(&bitstream)
    }
}
