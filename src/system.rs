//! Top-level console: owns the CPU and bus, and drives one frame at a
//! time.
//!
//! Real hardware interleaves CPU and PPU work every cycle; this core
//! instead runs the CPU for a whole frame's worth of cycles and then
//! renders the PPU's current state in one batch (see
//! [`crate::ppu::Ppu::render_frame`]). `CYCLES_PER_FRAME` mirrors the
//! NTSC budget the teacher's cycle-stepped main loop targets.

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::controller::Button;
use crate::cpu::{Cpu, CpuBus};
use log::debug;

/// Approximate NTSC CPU cycles per frame (1.789773 MHz / 60.0988 Hz).
const CYCLES_PER_FRAME: u32 = 29_780;

pub struct System {
    cpu: Cpu,
    bus: Bus,
}

impl System {
    pub fn new(cartridge: Cartridge) -> Self {
        let mut bus = Bus::new(cartridge);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        System { cpu, bus }
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
    }

    pub fn set_button(&mut self, controller: u8, button: Button, pressed: bool) {
        match controller {
            0 => self.bus.controller1.set_button(button, pressed),
            _ => self.bus.controller2.set_button(button, pressed),
        }
    }

    /// Run approximately one frame's worth of CPU cycles, draining any
    /// staged OAM DMA transfer, then render the resulting frame and
    /// raise NMI to mark VBlank for the next call. This core does not
    /// track scanlines, so NMI is raised unconditionally after every
    /// frame's render, per the spec's vblank/NMI handshake.
    ///
    /// Returns the rendered frame as packed RGB bytes
    /// (`FRAME_WIDTH * FRAME_HEIGHT * 3`).
    pub fn step_frame(&mut self) -> &[u8] {
        let mut cycles_run: u32 = 0;
        while cycles_run < CYCLES_PER_FRAME {
            cycles_run += self.cpu.step(&mut self.bus);
            if self.bus.dma_pending() {
                self.bus.drain_dma();
                cycles_run += 513;
            }
        }

        self.bus.ppu.render_frame(&self.bus.cartridge);
        self.bus.raise_nmi();
        debug!("frame complete after {} cpu cycles", cycles_run);

        self.bus.ppu.frame_buffer()
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu.frame_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop_cartridge() -> Cartridge {
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&[0x4E, 0x45, 0x53, 0x1A]);
        data[4] = 1;
        data[5] = 1;
        let mut prg = vec![0xEAu8; 16 * 1024]; // all NOPs
        // Reset vector -> $8000.
        prg[0x3FFC] = 0x00;
        prg[0x3FFD] = 0x80;
        data.extend(prg);
        data.extend(vec![0u8; 8 * 1024]);
        Cartridge::from_bytes(&data).unwrap()
    }

    #[test]
    fn step_frame_produces_a_full_size_frame() {
        let mut system = System::new(nop_cartridge());
        let frame = system.step_frame();
        assert_eq!(frame.len(), 256 * 240 * 3);
    }

    #[test]
    fn reset_reinitializes_cpu_program_counter() {
        let mut system = System::new(nop_cartridge());
        system.step_frame();
        system.reset();
        assert_eq!(system.cpu.pc, 0x8000);
    }

    #[test]
    fn button_presses_are_forwarded_to_the_correct_controller() {
        let mut system = System::new(nop_cartridge());
        system.set_button(0, Button::A, true);
        system.bus.controller1.write(0x01);
        assert_eq!(system.bus.controller1.read() & 0x01, 1);
    }
}
