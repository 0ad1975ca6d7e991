//! NES cartridge implementation (mapper 0 / NROM only)
//!
//! This module handles the iNES cartridge format: a 16-byte header,
//! an optional trainer, PRG ROM, and CHR ROM/RAM. Only the simplest
//! fixed-mapping cartridge is supported here — 16 KiB or 32 KiB of PRG
//! ROM and 8 KiB of CHR ROM or RAM. Broader mapper support is explicitly
//! out of scope for this core.

use log::info;
use thiserror::Error;

/// Size of the iNES header.
const INES_HEADER_SIZE: usize = 16;

/// Size of a PRG ROM bank (16 KiB).
const PRG_ROM_BANK_SIZE: usize = 16 * 1024;

/// Size of a CHR ROM/RAM bank (8 KiB).
const CHR_BANK_SIZE: usize = 8 * 1024;

/// Size of the trainer block, when present.
const TRAINER_SIZE: usize = 512;

/// Errors that can occur when parsing a ROM image.
#[derive(Error, Debug)]
pub enum RomError {
    #[error("invalid iNES header")]
    InvalidHeader,

    #[error("unsupported mapper: {0} (only mapper 0 is supported)")]
    UnsupportedMapper(u8),

    #[error("unsupported PRG ROM size: {0} x 16KiB banks (expected 1 or 2)")]
    UnsupportedPrgSize(u8),

    #[error("truncated ROM image: expected at least {expected} bytes, found {found}")]
    TruncatedImage { expected: usize, found: usize },
}

/// Nametable mirroring layout, selected by the cartridge header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// `$2000`/`$2400` share a nametable, as do `$2800`/`$2C00`.
    Horizontal,
    /// `$2000`/`$2800` share a nametable, as do `$2400`/`$2C00`.
    Vertical,
}

/// An immutable mapper-0 (NROM) cartridge image.
///
/// PRG ROM is either 16 KiB (mirrored across both halves of
/// `$8000-$FFFF`) or 32 KiB (mapped linearly). CHR storage is either ROM
/// (read-only) or, when the header reports zero CHR banks, 8 KiB of RAM.
pub struct Cartridge {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    mirroring: Mirroring,
    /// Mask applied to `$8000-$FFFF`-relative addresses: `0x3FFF` for a
    /// 16 KiB image (mirrors the bank across both halves), `0x7FFF` for
    /// a 32 KiB image (maps linearly).
    prg_mask: u16,
}

impl Cartridge {
    /// Parse a cartridge image from raw iNES bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < INES_HEADER_SIZE || data[0..4] != [0x4E, 0x45, 0x53, 0x1A] {
            return Err(RomError::InvalidHeader);
        }

        let prg_banks = data[4];
        let chr_banks = data[5];
        let flags6 = data[6];
        let flags7 = data[7];

        if !(1..=2).contains(&prg_banks) {
            return Err(RomError::UnsupportedPrgSize(prg_banks));
        }

        let mapper_low = (flags6 >> 4) & 0x0F;
        let mapper_high = flags7 & 0xF0;
        let mapper = mapper_high | mapper_low;
        if mapper != 0 {
            return Err(RomError::UnsupportedMapper(mapper));
        }

        let mirroring = if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let has_trainer = (flags6 & 0x04) != 0;
        let trainer_size = if has_trainer { TRAINER_SIZE } else { 0 };

        let prg_rom_size = prg_banks as usize * PRG_ROM_BANK_SIZE;
        let chr_rom_size = chr_banks as usize * CHR_BANK_SIZE;

        let expected = INES_HEADER_SIZE + trainer_size + prg_rom_size + chr_rom_size;
        if data.len() < expected {
            return Err(RomError::TruncatedImage {
                expected,
                found: data.len(),
            });
        }

        let prg_start = INES_HEADER_SIZE + trainer_size;
        let prg_end = prg_start + prg_rom_size;
        let prg_rom = data[prg_start..prg_end].to_vec();

        let (chr, chr_is_ram) = if chr_rom_size == 0 {
            (vec![0u8; CHR_BANK_SIZE], true)
        } else {
            (data[prg_end..prg_end + chr_rom_size].to_vec(), false)
        };

        let prg_mask = if prg_rom.len() <= PRG_ROM_BANK_SIZE {
            0x3FFF
        } else {
            0x7FFF
        };

        info!(
            "loaded cartridge: PRG {}KiB, CHR {} {}KiB, mirroring {:?}",
            prg_rom_size / 1024,
            if chr_is_ram { "RAM" } else { "ROM" },
            chr.len() / 1024,
            mirroring,
        );

        Ok(Cartridge {
            prg_rom,
            chr,
            chr_is_ram,
            mirroring,
            prg_mask,
        })
    }

    /// Read a byte from `$8000-$FFFF`. `addr` is the full CPU address;
    /// only the low bits selected by `prg_mask` are significant, so
    /// callers may pass the address unmasked.
    #[inline]
    pub fn read_prg(&self, addr: u16) -> u8 {
        let mapped = (addr & self.prg_mask) as usize;
        self.prg_rom[mapped]
    }

    /// Read a byte from the 8 KiB CHR pattern-table space (`$0000-$1FFF`
    /// in PPU address space).
    #[inline]
    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr[(addr & 0x1FFF) as usize]
    }

    /// Write a byte to CHR space. A no-op when CHR is ROM-backed.
    #[inline]
    pub fn write_chr(&mut self, addr: u16, value: u8) {
        if self.chr_is_ram {
            self.chr[(addr & 0x1FFF) as usize] = value;
        }
    }

    /// The cartridge's nametable mirroring layout.
    #[inline]
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
        let mut data = vec![0u8; INES_HEADER_SIZE];
        data[0..4].copy_from_slice(&[0x4E, 0x45, 0x53, 0x1A]);
        data[4] = prg_banks;
        data[5] = chr_banks;
        data[6] = flags6;
        data.extend(vec![0u8; prg_banks as usize * PRG_ROM_BANK_SIZE]);
        data.extend(vec![0u8; chr_banks as usize * CHR_BANK_SIZE]);
        data
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = rom(1, 1, 0);
        data[0] = b'X';
        assert!(matches!(
            Cartridge::from_bytes(&data),
            Err(RomError::InvalidHeader)
        ));
    }

    #[test]
    fn rejects_unsupported_mapper() {
        let data = rom(1, 1, 0x10); // mapper low nibble = 1
        assert!(matches!(
            Cartridge::from_bytes(&data),
            Err(RomError::UnsupportedMapper(1))
        ));
    }

    #[test]
    fn rejects_truncated_image() {
        let mut data = rom(2, 1, 0);
        data.truncate(INES_HEADER_SIZE + PRG_ROM_BANK_SIZE);
        assert!(matches!(
            Cartridge::from_bytes(&data),
            Err(RomError::TruncatedImage { .. })
        ));
    }

    #[test]
    fn mirrors_16kib_prg_across_both_halves() {
        let mut data = rom(1, 1, 0);
        data[INES_HEADER_SIZE] = 0xAB;
        let cart = Cartridge::from_bytes(&data).unwrap();
        assert_eq!(cart.read_prg(0x8000), 0xAB);
        assert_eq!(cart.read_prg(0xC000), 0xAB);
    }

    #[test]
    fn maps_32kib_prg_linearly() {
        let mut data = rom(2, 1, 0);
        data[INES_HEADER_SIZE] = 0x11;
        data[INES_HEADER_SIZE + PRG_ROM_BANK_SIZE] = 0x22;
        let cart = Cartridge::from_bytes(&data).unwrap();
        assert_eq!(cart.read_prg(0x8000), 0x11);
        assert_eq!(cart.read_prg(0xC000), 0x22);
    }

    #[test]
    fn chr_ram_when_zero_chr_banks() {
        let data = rom(1, 0, 0);
        let mut cart = Cartridge::from_bytes(&data).unwrap();
        assert_eq!(cart.read_chr(0x0000), 0);
        cart.write_chr(0x0010, 0x42);
        assert_eq!(cart.read_chr(0x0010), 0x42);
    }

    #[test]
    fn chr_rom_rejects_writes() {
        let mut data = rom(1, 1, 0);
        data[INES_HEADER_SIZE + PRG_ROM_BANK_SIZE] = 0x99;
        let mut cart = Cartridge::from_bytes(&data).unwrap();
        cart.write_chr(0x0000, 0x00);
        assert_eq!(cart.read_chr(0x0000), 0x99);
    }

    #[test]
    fn mirroring_flag_selects_layout() {
        let horizontal = Cartridge::from_bytes(&rom(1, 1, 0)).unwrap();
        assert_eq!(horizontal.mirroring(), Mirroring::Horizontal);
        let vertical = Cartridge::from_bytes(&rom(1, 1, 0x01)).unwrap();
        assert_eq!(vertical.mirroring(), Mirroring::Vertical);
    }
}
