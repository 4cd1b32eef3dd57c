/// CRC-16-CCITT as used by the bitstream command stream: polynomial 0x1021,
/// initial value 0xffff, MSB first, no final xor.
#[derive(Debug, Clone)]
pub struct Crc16 {
    crc: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub const INIT: u16 = 0xffff;
    const POLY: u16 = 0x1021;

    pub fn new() -> Self {
        Self { crc: Self::INIT }
    }

    pub fn reset(&mut self) {
        self.crc = Self::INIT;
    }

    pub fn update_byte(&mut self, byte: u8) {
        for i in (0..8).rev() {
            let bit = (self.crc >> 15) ^ (byte as u16 >> i & 1);
            self.crc <<= 1;
            if bit != 0 {
                self.crc ^= Self::POLY;
            }
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.update_byte(byte);
        }
    }

    pub fn get(&self) -> u16 {
        self.crc
    }
}

#[test]
fn test_check_value() {
    // CRC-16/CCITT-FALSE check value.
    let mut crc = Crc16::new();
    crc.update(b"123456789");
    assert_eq!(crc.get(), 0x29b1);
}

#[test]
fn test_append_zeroes() {
    let mut crc = Crc16::new();
    crc.update(&[0x51, 0x00, 0x01, 0x05, 0x92, 0x00, 0x20]);
    let val = crc.get();
    crc.update(&val.to_be_bytes());
    assert_eq!(crc.get(), 0);
}

#[test]
fn test_reset() {
    let mut crc = Crc16::new();
    crc.update(&[0xde, 0xad]);
    assert_ne!(crc.get(), Crc16::INIT);
    crc.reset();
    assert_eq!(crc.get(), Crc16::INIT);
    crc.update(&[]);
    assert_eq!(crc.get(), Crc16::INIT);
}
