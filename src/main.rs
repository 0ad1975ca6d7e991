//! Headless driver: load a ROM, run it for a fixed number of frames,
//! and dump the final frame to a PNG. There is no windowing, input, or
//! audio backend here — see `SPEC_FULL.md` for what this core omits
//! and why.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::{ImageBuffer, Rgb};
use log::info;

use nes_core::cartridge::Cartridge;
use nes_core::ppu::{FRAME_HEIGHT, FRAME_WIDTH};
use nes_core::System;

/// Run a mapper-0 NES ROM headlessly and dump the last rendered frame.
#[derive(Parser, Debug)]
#[command(name = "nes-core", version, about)]
struct Cli {
    /// Path to an iNES (.nes) ROM image.
    rom: PathBuf,

    /// Number of frames to emulate before dumping the final frame.
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Where to write the rendered PNG.
    #[arg(long, default_value = "frame.png")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let data = fs::read(&cli.rom)
        .with_context(|| format!("reading ROM file {}", cli.rom.display()))?;
    let cartridge = Cartridge::from_bytes(&data)
        .with_context(|| format!("parsing ROM file {}", cli.rom.display()))?;

    let mut system = System::new(cartridge);
    info!("running {} frames", cli.frames);
    for _ in 0..cli.frames {
        system.step_frame();
    }

    let frame = system.frame_buffer();
    let image: ImageBuffer<Rgb<u8>, _> =
        ImageBuffer::from_raw(FRAME_WIDTH as u32, FRAME_HEIGHT as u32, frame.to_vec())
            .context("frame buffer had unexpected size")?;
    image
        .save(&cli.out)
        .with_context(|| format!("writing output frame {}", cli.out.display()))?;
    info!("wrote {}", cli.out.display());

    Ok(())
}
