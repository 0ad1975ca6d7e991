//! Core bus-coupled CPU, PPU, and cartridge emulation for an 8-bit home
//! console (mapper 0 only). Host windowing, audio, and savestates are
//! deliberately out of scope; see `src/main.rs` for a minimal headless
//! driver that runs a ROM for a fixed number of frames and dumps the
//! result to a PNG.

pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod ppu;
pub mod system;
pub mod util;

pub use cartridge::{Cartridge, RomError};
pub use controller::Button;
pub use system::System;
