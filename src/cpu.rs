//! CPU core: Ricoh 2A03-style 6502 (no decimal mode).
//!
//! Implements the full documented instruction set, all standard
//! addressing modes (including the page-wrap bug in indirect `JMP`),
//! and the RESET/NMI/IRQ/BRK interrupt sequence. Unofficial opcodes are
//! not decoded — per the fail-mode in the spec, an unrecognized opcode
//! is treated as a 2-cycle no-op without consuming operand bytes it
//! never decoded.
//!
//! The CPU holds no references of its own; every access goes through
//! the [`CpuBus`] passed into [`Cpu::step`], so ownership of RAM,
//! cartridge, and PPU state lives entirely in the caller's bus type.

use crate::util::page_crossed;
use log::trace;

/// Status register flag bits.
pub mod flags {
    pub const CARRY: u8 = 0x01;
    pub const ZERO: u8 = 0x02;
    pub const INTERRUPT_DISABLE: u8 = 0x04;
    pub const DECIMAL: u8 = 0x08; // settable, but arithmetic ignores it
    pub const BREAK: u8 = 0x10;
    pub const UNUSED: u8 = 0x20; // always 1 when pushed
    pub const OVERFLOW: u8 = 0x40;
    pub const NEGATIVE: u8 = 0x80;
}

/// Addressing modes understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
}

/// The bus a [`Cpu`] is stepped against. Implementors decide address
/// decoding, mirroring, and side effects (DMA, controller shifting).
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);

    /// Returns true exactly once per pending NMI, clearing the
    /// pending flag as a side effect of being observed.
    fn take_nmi(&mut self) -> bool {
        false
    }

    /// Level-sensitive IRQ line. This core has no IRQ source (the APU
    /// is out of scope and mapper 0 never asserts one), so the default
    /// always reports none pending.
    fn irq_pending(&mut self) -> bool {
        false
    }
}

/// Registers and free-running cycle counter of the 6502 core.
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: u8,
    /// Total cycles executed since construction or the last reset.
    pub total_cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0,
            p: flags::UNUSED | flags::INTERRUPT_DISABLE,
            total_cycles: 0,
        }
    }

    /// Reset sequence: `SP = 0xFD`, `P = 0x24`, `PC` loaded from the
    /// reset vector at `$FFFC/$FFFD`.
    pub fn reset(&mut self, bus: &mut impl CpuBus) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.p = flags::UNUSED | flags::INTERRUPT_DISABLE;
        self.total_cycles = 0;
        let low = bus.read(0xFFFC);
        let high = bus.read(0xFFFD);
        self.pc = crate::util::combine_bytes(low, high);
    }

    #[inline]
    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
    }

    #[inline]
    fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    #[inline]
    fn set_zn(&mut self, value: u8) {
        self.set_flag(flags::ZERO, value == 0);
        self.set_flag(flags::NEGATIVE, (value & 0x80) != 0);
    }

    fn push(&mut self, bus: &mut impl CpuBus, value: u8) {
        bus.write(0x0100 + self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 + self.sp as u16)
    }

    fn push_word(&mut self, bus: &mut impl CpuBus, value: u16) {
        let (low, high) = crate::util::split_bytes(value);
        self.push(bus, high);
        self.push(bus, low);
    }

    fn pull_word(&mut self, bus: &mut impl CpuBus) -> u16 {
        let low = self.pull(bus);
        let high = self.pull(bus);
        crate::util::combine_bytes(low, high)
    }

    /// Execute one instruction (servicing a pending interrupt instead,
    /// if one is outstanding) and return the number of cycles it took.
    pub fn step(&mut self, bus: &mut impl CpuBus) -> u32 {
        if bus.take_nmi() {
            self.service_nmi(bus);
            self.total_cycles += 7;
            return 7;
        }
        if bus.irq_pending() && !self.flag(flags::INTERRUPT_DISABLE) {
            self.service_irq(bus);
            self.total_cycles += 7;
            return 7;
        }

        let opcode = bus.read(self.pc);
        trace!(
            "${:04X}: ${:02X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
            self.pc, opcode, self.a, self.x, self.y, self.p, self.sp
        );
        self.pc = self.pc.wrapping_add(1);

        let cycles = self.execute(bus, opcode);
        self.total_cycles += cycles as u64;
        cycles as u32
    }

    fn service_nmi(&mut self, bus: &mut impl CpuBus) {
        self.push_word(bus, self.pc);
        self.push(bus, (self.p & !flags::BREAK) | flags::UNUSED);
        self.set_flag(flags::INTERRUPT_DISABLE, true);
        let low = bus.read(0xFFFA);
        let high = bus.read(0xFFFB);
        self.pc = crate::util::combine_bytes(low, high);
    }

    fn service_irq(&mut self, bus: &mut impl CpuBus) {
        self.push_word(bus, self.pc);
        self.push(bus, (self.p & !flags::BREAK) | flags::UNUSED);
        self.set_flag(flags::INTERRUPT_DISABLE, true);
        let low = bus.read(0xFFFE);
        let high = bus.read(0xFFFF);
        self.pc = crate::util::combine_bytes(low, high);
    }

    /// Resolve the effective address for `mode`, consuming operand
    /// bytes from the instruction stream. Returns the address and
    /// whether resolving it crossed a page boundary (meaningful only
    /// for the indexed modes that charge an extra cycle on reads).
    fn operand_address(&mut self, bus: &mut impl CpuBus, mode: AddressingMode) -> (u16, bool) {
        match mode {
            AddressingMode::Implied | AddressingMode::Accumulator => (0, false),
            AddressingMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            AddressingMode::ZeroPage => {
                let addr = bus.read(self.pc) as u16;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            AddressingMode::ZeroPageX => {
                let base = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                (base.wrapping_add(self.x) as u16, false)
            }
            AddressingMode::ZeroPageY => {
                let base = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                (base.wrapping_add(self.y) as u16, false)
            }
            AddressingMode::Relative => {
                let offset = bus.read(self.pc) as i8;
                self.pc = self.pc.wrapping_add(1);
                let target = self.pc.wrapping_add(offset as u16);
                (target, page_crossed(self.pc, target))
            }
            AddressingMode::Absolute => {
                let low = bus.read(self.pc);
                let high = bus.read(self.pc.wrapping_add(1));
                self.pc = self.pc.wrapping_add(2);
                (crate::util::combine_bytes(low, high), false)
            }
            AddressingMode::AbsoluteX => {
                let low = bus.read(self.pc);
                let high = bus.read(self.pc.wrapping_add(1));
                self.pc = self.pc.wrapping_add(2);
                let base = crate::util::combine_bytes(low, high);
                let addr = base.wrapping_add(self.x as u16);
                (addr, page_crossed(base, addr))
            }
            AddressingMode::AbsoluteY => {
                let low = bus.read(self.pc);
                let high = bus.read(self.pc.wrapping_add(1));
                self.pc = self.pc.wrapping_add(2);
                let base = crate::util::combine_bytes(low, high);
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddressingMode::Indirect => {
                let low = bus.read(self.pc);
                let high = bus.read(self.pc.wrapping_add(1));
                self.pc = self.pc.wrapping_add(2);
                let ptr = crate::util::combine_bytes(low, high);
                // Reproduce the 6502 page-wrap bug: the high byte is
                // fetched from the start of the same page, not the next.
                let target_low = bus.read(ptr);
                let target_high = if low == 0xFF {
                    bus.read(ptr & 0xFF00)
                } else {
                    bus.read(ptr.wrapping_add(1))
                };
                (crate::util::combine_bytes(target_low, target_high), false)
            }
            AddressingMode::IndexedIndirect => {
                let base = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let ptr = base.wrapping_add(self.x);
                let low = bus.read(ptr as u16);
                let high = bus.read(ptr.wrapping_add(1) as u16);
                (crate::util::combine_bytes(low, high), false)
            }
            AddressingMode::IndirectIndexed => {
                let ptr = bus.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let low = bus.read(ptr as u16);
                let high = bus.read(ptr.wrapping_add(1) as u16);
                let base = crate::util::combine_bytes(low, high);
                let addr = base.wrapping_add(self.y as u16);
                (addr, page_crossed(base, addr))
            }
        }
    }

    fn execute(&mut self, bus: &mut impl CpuBus, opcode: u8) -> u8 {
        use AddressingMode::*;
        match opcode {
            // LDA
            0xA9 => self.lda(bus, Immediate, 2, false),
            0xA5 => self.lda(bus, ZeroPage, 3, false),
            0xB5 => self.lda(bus, ZeroPageX, 4, false),
            0xAD => self.lda(bus, Absolute, 4, false),
            0xBD => self.lda(bus, AbsoluteX, 4, true),
            0xB9 => self.lda(bus, AbsoluteY, 4, true),
            0xA1 => self.lda(bus, IndexedIndirect, 6, false),
            0xB1 => self.lda(bus, IndirectIndexed, 5, true),

            // LDX
            0xA2 => self.ldx(bus, Immediate, 2, false),
            0xA6 => self.ldx(bus, ZeroPage, 3, false),
            0xB6 => self.ldx(bus, ZeroPageY, 4, false),
            0xAE => self.ldx(bus, Absolute, 4, false),
            0xBE => self.ldx(bus, AbsoluteY, 4, true),

            // LDY
            0xA0 => self.ldy(bus, Immediate, 2, false),
            0xA4 => self.ldy(bus, ZeroPage, 3, false),
            0xB4 => self.ldy(bus, ZeroPageX, 4, false),
            0xAC => self.ldy(bus, Absolute, 4, false),
            0xBC => self.ldy(bus, AbsoluteX, 4, true),

            // STA
            0x85 => self.sta(bus, ZeroPage, 3),
            0x95 => self.sta(bus, ZeroPageX, 4),
            0x8D => self.sta(bus, Absolute, 4),
            0x9D => self.sta(bus, AbsoluteX, 5),
            0x99 => self.sta(bus, AbsoluteY, 5),
            0x81 => self.sta(bus, IndexedIndirect, 6),
            0x91 => self.sta(bus, IndirectIndexed, 6),

            // STX / STY
            0x86 => self.stx(bus, ZeroPage, 3),
            0x96 => self.stx(bus, ZeroPageY, 4),
            0x8E => self.stx(bus, Absolute, 4),
            0x84 => self.sty(bus, ZeroPage, 3),
            0x94 => self.sty(bus, ZeroPageX, 4),
            0x8C => self.sty(bus, Absolute, 4),

            // Transfers
            0xAA => {
                self.x = self.a;
                self.set_zn(self.x);
                2
            }
            0xA8 => {
                self.y = self.a;
                self.set_zn(self.y);
                2
            }
            0x8A => {
                self.a = self.x;
                self.set_zn(self.a);
                2
            }
            0x98 => {
                self.a = self.y;
                self.set_zn(self.a);
                2
            }
            0xBA => {
                self.x = self.sp;
                self.set_zn(self.x);
                2
            }
            0x9A => {
                self.sp = self.x;
                2
            }

            // ADC / SBC
            0x69 => self.adc(bus, Immediate, 2, false),
            0x65 => self.adc(bus, ZeroPage, 3, false),
            0x75 => self.adc(bus, ZeroPageX, 4, false),
            0x6D => self.adc(bus, Absolute, 4, false),
            0x7D => self.adc(bus, AbsoluteX, 4, true),
            0x79 => self.adc(bus, AbsoluteY, 4, true),
            0x61 => self.adc(bus, IndexedIndirect, 6, false),
            0x71 => self.adc(bus, IndirectIndexed, 5, true),

            0xE9 => self.sbc(bus, Immediate, 2, false),
            0xE5 => self.sbc(bus, ZeroPage, 3, false),
            0xF5 => self.sbc(bus, ZeroPageX, 4, false),
            0xED => self.sbc(bus, Absolute, 4, false),
            0xFD => self.sbc(bus, AbsoluteX, 4, true),
            0xF9 => self.sbc(bus, AbsoluteY, 4, true),
            0xE1 => self.sbc(bus, IndexedIndirect, 6, false),
            0xF1 => self.sbc(bus, IndirectIndexed, 5, true),

            // AND / ORA / EOR
            0x29 => self.and(bus, Immediate, 2, false),
            0x25 => self.and(bus, ZeroPage, 3, false),
            0x35 => self.and(bus, ZeroPageX, 4, false),
            0x2D => self.and(bus, Absolute, 4, false),
            0x3D => self.and(bus, AbsoluteX, 4, true),
            0x39 => self.and(bus, AbsoluteY, 4, true),
            0x21 => self.and(bus, IndexedIndirect, 6, false),
            0x31 => self.and(bus, IndirectIndexed, 5, true),

            0x09 => self.ora(bus, Immediate, 2, false),
            0x05 => self.ora(bus, ZeroPage, 3, false),
            0x15 => self.ora(bus, ZeroPageX, 4, false),
            0x0D => self.ora(bus, Absolute, 4, false),
            0x1D => self.ora(bus, AbsoluteX, 4, true),
            0x19 => self.ora(bus, AbsoluteY, 4, true),
            0x01 => self.ora(bus, IndexedIndirect, 6, false),
            0x11 => self.ora(bus, IndirectIndexed, 5, true),

            0x49 => self.eor(bus, Immediate, 2, false),
            0x45 => self.eor(bus, ZeroPage, 3, false),
            0x55 => self.eor(bus, ZeroPageX, 4, false),
            0x4D => self.eor(bus, Absolute, 4, false),
            0x5D => self.eor(bus, AbsoluteX, 4, true),
            0x59 => self.eor(bus, AbsoluteY, 4, true),
            0x41 => self.eor(bus, IndexedIndirect, 6, false),
            0x51 => self.eor(bus, IndirectIndexed, 5, true),

            // Shifts / rotates
            0x0A => self.asl_acc(),
            0x06 => self.asl(bus, ZeroPage, 5),
            0x16 => self.asl(bus, ZeroPageX, 6),
            0x0E => self.asl(bus, Absolute, 6),
            0x1E => self.asl(bus, AbsoluteX, 7),

            0x4A => self.lsr_acc(),
            0x46 => self.lsr(bus, ZeroPage, 5),
            0x56 => self.lsr(bus, ZeroPageX, 6),
            0x4E => self.lsr(bus, Absolute, 6),
            0x5E => self.lsr(bus, AbsoluteX, 7),

            0x2A => self.rol_acc(),
            0x26 => self.rol(bus, ZeroPage, 5),
            0x36 => self.rol(bus, ZeroPageX, 6),
            0x2E => self.rol(bus, Absolute, 6),
            0x3E => self.rol(bus, AbsoluteX, 7),

            0x6A => self.ror_acc(),
            0x66 => self.ror(bus, ZeroPage, 5),
            0x76 => self.ror(bus, ZeroPageX, 6),
            0x6E => self.ror(bus, Absolute, 6),
            0x7E => self.ror(bus, AbsoluteX, 7),

            // INC / DEC
            0xE6 => self.inc(bus, ZeroPage, 5),
            0xF6 => self.inc(bus, ZeroPageX, 6),
            0xEE => self.inc(bus, Absolute, 6),
            0xFE => self.inc(bus, AbsoluteX, 7),
            0xC6 => self.dec(bus, ZeroPage, 5),
            0xD6 => self.dec(bus, ZeroPageX, 6),
            0xCE => self.dec(bus, Absolute, 6),
            0xDE => self.dec(bus, AbsoluteX, 7),

            0xE8 => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
                2
            }
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
                2
            }
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
                2
            }
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
                2
            }

            // Compares
            0xC9 => self.cmp(bus, Immediate, 2, false),
            0xC5 => self.cmp(bus, ZeroPage, 3, false),
            0xD5 => self.cmp(bus, ZeroPageX, 4, false),
            0xCD => self.cmp(bus, Absolute, 4, false),
            0xDD => self.cmp(bus, AbsoluteX, 4, true),
            0xD9 => self.cmp(bus, AbsoluteY, 4, true),
            0xC1 => self.cmp(bus, IndexedIndirect, 6, false),
            0xD1 => self.cmp(bus, IndirectIndexed, 5, true),

            0xE0 => self.cpx(bus, Immediate, 2),
            0xE4 => self.cpx(bus, ZeroPage, 3),
            0xEC => self.cpx(bus, Absolute, 4),
            0xC0 => self.cpy(bus, Immediate, 2),
            0xC4 => self.cpy(bus, ZeroPage, 3),
            0xCC => self.cpy(bus, Absolute, 4),

            // BIT
            0x24 => self.bit(bus, ZeroPage, 3),
            0x2C => self.bit(bus, Absolute, 4),

            // Stack
            0x48 => {
                self.push(bus, self.a);
                3
            }
            0x68 => {
                self.a = self.pull(bus);
                self.set_zn(self.a);
                4
            }
            0x08 => {
                self.push(bus, self.p | flags::BREAK | flags::UNUSED);
                3
            }
            0x28 => {
                self.p = (self.pull(bus) & !flags::BREAK) | flags::UNUSED;
                4
            }

            // Jumps
            0x4C => self.jmp(bus, Absolute),
            0x6C => self.jmp(bus, Indirect),
            0x20 => self.jsr(bus),
            0x60 => self.rts(bus),

            // Interrupts
            0x00 => self.brk(bus),
            0x40 => self.rti(bus),

            // Branches
            0x10 => self.branch(bus, !self.flag(flags::NEGATIVE)),
            0x30 => self.branch(bus, self.flag(flags::NEGATIVE)),
            0x50 => self.branch(bus, !self.flag(flags::OVERFLOW)),
            0x70 => self.branch(bus, self.flag(flags::OVERFLOW)),
            0x90 => self.branch(bus, !self.flag(flags::CARRY)),
            0xB0 => self.branch(bus, self.flag(flags::CARRY)),
            0xD0 => self.branch(bus, !self.flag(flags::ZERO)),
            0xF0 => self.branch(bus, self.flag(flags::ZERO)),

            // Flags
            0x18 => {
                self.set_flag(flags::CARRY, false);
                2
            }
            0x38 => {
                self.set_flag(flags::CARRY, true);
                2
            }
            0x58 => {
                self.set_flag(flags::INTERRUPT_DISABLE, false);
                2
            }
            0x78 => {
                self.set_flag(flags::INTERRUPT_DISABLE, true);
                2
            }
            0xD8 => {
                self.set_flag(flags::DECIMAL, false);
                2
            }
            0xF8 => {
                self.set_flag(flags::DECIMAL, true);
                2
            }
            0xB8 => {
                self.set_flag(flags::OVERFLOW, false);
                2
            }

            0xEA => 2, // NOP

            _ => {
                trace!("unimplemented opcode ${:02X} treated as NOP", opcode);
                2
            }
        }
    }

    fn lda(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.a = bus.read(addr);
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn ldx(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.x = bus.read(addr);
        self.set_zn(self.x);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn ldy(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.y = bus.read(addr);
        self.set_zn(self.y);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn sta(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        bus.write(addr, self.a);
        cycles
    }

    fn stx(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        bus.write(addr, self.x);
        cycles
    }

    fn sty(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        bus.write(addr, self.y);
        cycles
    }

    fn adc(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        let m = bus.read(addr);
        let carry_in = self.flag(flags::CARRY) as u16;
        let sum = self.a as u16 + m as u16 + carry_in;
        let result = sum as u8;
        self.set_flag(flags::CARRY, sum > 0xFF);
        self.set_flag(flags::OVERFLOW, (self.a ^ result) & (m ^ result) & 0x80 != 0);
        self.a = result;
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn sbc(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        let m = bus.read(addr) ^ 0xFF;
        let carry_in = self.flag(flags::CARRY) as u16;
        let sum = self.a as u16 + m as u16 + carry_in;
        let result = sum as u8;
        self.set_flag(flags::CARRY, sum > 0xFF);
        self.set_flag(flags::OVERFLOW, (self.a ^ result) & (m ^ result) & 0x80 != 0);
        self.a = result;
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn and(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.a &= bus.read(addr);
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn ora(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.a |= bus.read(addr);
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn eor(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        self.a ^= bus.read(addr);
        self.set_zn(self.a);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn asl_acc(&mut self) -> u8 {
        self.set_flag(flags::CARRY, (self.a & 0x80) != 0);
        self.a <<= 1;
        self.set_zn(self.a);
        2
    }

    fn asl(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let mut v = bus.read(addr);
        self.set_flag(flags::CARRY, (v & 0x80) != 0);
        v <<= 1;
        bus.write(addr, v);
        self.set_zn(v);
        cycles
    }

    fn lsr_acc(&mut self) -> u8 {
        self.set_flag(flags::CARRY, (self.a & 0x01) != 0);
        self.a >>= 1;
        self.set_zn(self.a);
        2
    }

    fn lsr(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let mut v = bus.read(addr);
        self.set_flag(flags::CARRY, (v & 0x01) != 0);
        v >>= 1;
        bus.write(addr, v);
        self.set_zn(v);
        cycles
    }

    fn rol_acc(&mut self) -> u8 {
        let carry_in = self.flag(flags::CARRY) as u8;
        self.set_flag(flags::CARRY, (self.a & 0x80) != 0);
        self.a = (self.a << 1) | carry_in;
        self.set_zn(self.a);
        2
    }

    fn rol(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let v = bus.read(addr);
        let carry_in = self.flag(flags::CARRY) as u8;
        self.set_flag(flags::CARRY, (v & 0x80) != 0);
        let result = (v << 1) | carry_in;
        bus.write(addr, result);
        self.set_zn(result);
        cycles
    }

    fn ror_acc(&mut self) -> u8 {
        let carry_in = self.flag(flags::CARRY) as u8;
        self.set_flag(flags::CARRY, (self.a & 0x01) != 0);
        self.a = (self.a >> 1) | (carry_in << 7);
        self.set_zn(self.a);
        2
    }

    fn ror(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let v = bus.read(addr);
        let carry_in = self.flag(flags::CARRY) as u8;
        self.set_flag(flags::CARRY, (v & 0x01) != 0);
        let result = (v >> 1) | (carry_in << 7);
        bus.write(addr, result);
        self.set_zn(result);
        cycles
    }

    fn inc(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let v = bus.read(addr).wrapping_add(1);
        bus.write(addr, v);
        self.set_zn(v);
        cycles
    }

    fn dec(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let v = bus.read(addr).wrapping_sub(1);
        bus.write(addr, v);
        self.set_zn(v);
        cycles
    }

    fn compare(&mut self, reg: u8, operand: u8) {
        let result = reg.wrapping_sub(operand);
        self.set_flag(flags::CARRY, reg >= operand);
        self.set_zn(result);
    }

    fn cmp(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8, chargeable: bool) -> u8 {
        let (addr, crossed) = self.operand_address(bus, mode);
        let operand = bus.read(addr);
        self.compare(self.a, operand);
        cycles + if chargeable && crossed { 1 } else { 0 }
    }

    fn cpx(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let operand = bus.read(addr);
        self.compare(self.x, operand);
        cycles
    }

    fn cpy(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let operand = bus.read(addr);
        self.compare(self.y, operand);
        cycles
    }

    fn bit(&mut self, bus: &mut impl CpuBus, mode: AddressingMode, cycles: u8) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        let operand = bus.read(addr);
        self.set_flag(flags::ZERO, (self.a & operand) == 0);
        self.set_flag(flags::OVERFLOW, (operand & 0x40) != 0);
        self.set_flag(flags::NEGATIVE, (operand & 0x80) != 0);
        cycles
    }

    fn jmp(&mut self, bus: &mut impl CpuBus, mode: AddressingMode) -> u8 {
        let (addr, _) = self.operand_address(bus, mode);
        self.pc = addr;
        match mode {
            AddressingMode::Absolute => 3,
            AddressingMode::Indirect => 5,
            _ => unreachable!("JMP only uses Absolute/Indirect"),
        }
    }

    fn jsr(&mut self, bus: &mut impl CpuBus) -> u8 {
        let (target, _) = self.operand_address(bus, AddressingMode::Absolute);
        // operand_address already advanced PC past both operand bytes;
        // the pushed return address is the last byte of the JSR itself.
        self.push_word(bus, self.pc.wrapping_sub(1));
        self.pc = target;
        6
    }

    fn rts(&mut self, bus: &mut impl CpuBus) -> u8 {
        let addr = self.pull_word(bus);
        self.pc = addr.wrapping_add(1);
        6
    }

    fn brk(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.pc = self.pc.wrapping_add(1);
        self.push_word(bus, self.pc);
        self.push(bus, self.p | flags::BREAK | flags::UNUSED);
        self.set_flag(flags::INTERRUPT_DISABLE, true);
        let low = bus.read(0xFFFE);
        let high = bus.read(0xFFFF);
        self.pc = crate::util::combine_bytes(low, high);
        7
    }

    fn rti(&mut self, bus: &mut impl CpuBus) -> u8 {
        self.p = (self.pull(bus) & !flags::BREAK) | flags::UNUSED;
        self.pc = self.pull_word(bus);
        6
    }

    fn branch(&mut self, bus: &mut impl CpuBus, condition: bool) -> u8 {
        let (target, crossed) = self.operand_address(bus, AddressingMode::Relative);
        if !condition {
            return 2;
        }
        self.pc = target;
        if crossed {
            4
        } else {
            3
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A flat 64 KiB bus for CPU unit tests, with no NMI/IRQ sources.
    struct FlatBus {
        mem: [u8; 0x10000],
    }

    impl FlatBus {
        fn new() -> Self {
            FlatBus { mem: [0; 0x10000] }
        }

        fn load(&mut self, addr: u16, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.mem[addr as usize + i] = *b;
            }
        }
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn write(&mut self, addr: u16, value: u8) {
            self.mem[addr as usize] = value;
        }
    }

    fn reset_at(bus: &mut FlatBus, entry: u16) -> Cpu {
        let (low, high) = crate::util::split_bytes(entry);
        bus.load(0xFFFC, &[low, high]);
        let mut cpu = Cpu::new();
        cpu.reset(bus);
        cpu
    }

    #[test]
    fn reset_vector_sets_pc_sp_and_status() {
        let mut bus = FlatBus::new();
        let cpu = reset_at(&mut bus, 0xC000);
        assert_eq!(cpu.pc, 0xC000);
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.p, 0x24);
    }

    #[test]
    fn lda_immediate_then_sta_absolute() {
        let mut bus = FlatBus::new();
        bus.load(0x8000, &[0xA9, 0x42, 0x8D, 0x00, 0x02, 0x00]);
        let mut cpu = reset_at(&mut bus, 0x8000);

        let c1 = cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x42);
        assert_eq!(cpu.pc, 0x8002);
        assert_eq!(c1, 2);
        assert!(!cpu.flag(flags::ZERO));
        assert!(!cpu.flag(flags::NEGATIVE));

        let c2 = cpu.step(&mut bus);
        assert_eq!(bus.read(0x0200), 0x42);
        assert_eq!(cpu.pc, 0x8005);
        assert_eq!(c2, 4);
    }

    #[test]
    fn stack_roundtrip_leaves_upper_stack_untouched() {
        let mut bus = FlatBus::new();
        bus.load(0x8000, &[0xA2, 0xFF, 0x9A, 0xA9, 0x01, 0x48, 0x68]);
        let mut cpu = reset_at(&mut bus, 0x8000);
        for _ in 0..5 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.a, 0x01);
    }

    #[test]
    fn adc_sets_overflow_and_negative_on_signed_overflow() {
        let mut bus = FlatBus::new();
        bus.load(0x8000, &[0xA9, 0x50, 0x69, 0x50]);
        let mut cpu = reset_at(&mut bus, 0x8000);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0xA0);
        assert!(!cpu.flag(flags::CARRY));
        assert!(cpu.flag(flags::OVERFLOW));
        assert!(cpu.flag(flags::NEGATIVE));
        assert!(!cpu.flag(flags::ZERO));
    }

    #[test]
    fn jsr_then_rts_returns_to_instruction_after_jsr() {
        let mut bus = FlatBus::new();
        bus.load(0x8000, &[0x20, 0x23, 0xC1, 0xEA]); // JSR $C123; NOP
        bus.load(0xC123, &[0x60]); // RTS
        let mut cpu = reset_at(&mut bus, 0x8000);
        cpu.step(&mut bus); // JSR
        assert_eq!(cpu.pc, 0xC123);
        cpu.step(&mut bus); // RTS
        assert_eq!(cpu.pc, 0x8003);
    }

    #[test]
    fn jmp_indirect_reproduces_page_wrap_bug() {
        let mut bus = FlatBus::new();
        bus.load(0x10FF, &[0x34]);
        bus.load(0x1000, &[0x12]);
        bus.load(0x1100, &[0xFF]); // must NOT be read
        bus.load(0x8000, &[0x6C, 0xFF, 0x10]);
        let mut cpu = reset_at(&mut bus, 0x8000);
        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn branch_timing_matches_spec() {
        let mut bus = FlatBus::new();
        // BNE not taken (Z set via LDA #0 first)
        bus.load(0x8000, &[0xA9, 0x00, 0xD0, 0x02]);
        let mut cpu = reset_at(&mut bus, 0x8000);
        cpu.step(&mut bus); // LDA #0
        let cycles = cpu.step(&mut bus); // BNE not taken
        assert_eq!(cycles, 2);

        // BEQ taken, same page
        let mut bus2 = FlatBus::new();
        bus2.load(0x8000, &[0xA9, 0x00, 0xF0, 0x02]);
        let mut cpu2 = reset_at(&mut bus2, 0x8000);
        cpu2.step(&mut bus2);
        let cycles2 = cpu2.step(&mut bus2);
        assert_eq!(cycles2, 3);

        // BEQ taken, crossing a page: the branch sits at the end of page
        // $80 and jumps backward past the start of that same page, so
        // the target ($8081) falls in a different page than the byte
        // after the branch instruction ($8101).
        let mut bus3 = FlatBus::new();
        bus3.load(0x80FD, &[0xA9, 0x00]);
        bus3.load(0x80FF, &[0xF0, 0x80]);
        let mut cpu3 = reset_at(&mut bus3, 0x80FD);
        cpu3.step(&mut bus3);
        let cycles3 = cpu3.step(&mut bus3);
        assert_eq!(cycles3, 4);
    }

    #[test]
    fn unknown_opcode_is_two_cycle_nop() {
        let mut bus = FlatBus::new();
        bus.load(0x8000, &[0x02]); // not a documented opcode
        let mut cpu = reset_at(&mut bus, 0x8000);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 2);
        assert_eq!(cpu.pc, 0x8001);
    }
}
