//! The secondary interpreter: a 6502 instruction set sharing the vCPU's
//! register file.
//!
//! PC is vLR, A is vAC.lo and S is vSP; everything else lives in sysArgs.
//! Each instruction runs as a decode step (fetch plus addressing mode) and an
//! execute step, each charged separately so either can be carried over into
//! the next slice.

use log::debug;
use crate::context::{addr, Context, EmuPhase, Interpreter};
use crate::scheduler::{Exit, TickBudget};
use crate::timing::CYCLES_PER_TICK;

mod execute;

pub use execute::{ExecInfo, EXECUTE};

/// Register slots in sysArgs.
pub mod reg {
    pub const ADL: u8 = 0;
    pub const ADH: u8 = 1;
    pub const IR: u8 = 2;
    pub const P: u8 = 3;
    /// Zero when the last result was zero.
    pub const QZ: u8 = 4;
    /// Bit 7 is the sign of the last result.
    pub const QN: u8 = 5;
    pub const X: u8 = 6;
    pub const Y: u8 = 7;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Column 0: BRK, JSR, RTI, RTS and the index immediates.
    Implicit,
    Immediate,
    /// Operates on A, addressed through vAC.
    Accumulator,
    Implied,
    Illegal,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    IndexedIndirect,
    IndirectIndexed,
    Absolute,
    AbsoluteX,
    AbsoluteY,
}

impl Mode {
    pub const fn ticks(self) -> u16 {
        let cycles = match self {
            Mode::Implicit => 26,
            Mode::Immediate => 36,
            Mode::Accumulator => 28,
            Mode::Implied | Mode::Illegal => 24,
            Mode::ZeroPage | Mode::ZeroPageX | Mode::ZeroPageY | Mode::Relative => 36,
            Mode::IndexedIndirect => 38,
            Mode::IndirectIndexed => 54,
            Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY => 64,
        };
        cycles / CYCLES_PER_TICK
    }

    /// Operand bytes following the opcode.
    pub const fn operand_bytes(self) -> u8 {
        match self {
            Mode::Accumulator | Mode::Implied | Mode::Illegal => 0,
            Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY => 2,
            _ => 1,
        }
    }
}

const MODES: [Mode; 32] = [
    Mode::Implicit, Mode::IndexedIndirect, Mode::Immediate, Mode::Illegal,
    Mode::ZeroPage, Mode::ZeroPage, Mode::ZeroPage, Mode::Illegal,
    Mode::Implied, Mode::Immediate, Mode::Accumulator, Mode::Illegal,
    Mode::Absolute, Mode::Absolute, Mode::Absolute, Mode::Illegal,
    Mode::Relative, Mode::IndirectIndexed, Mode::Illegal, Mode::Illegal,
    Mode::ZeroPageX, Mode::ZeroPageX, Mode::ZeroPageX, Mode::Illegal,
    Mode::Implied, Mode::AbsoluteY, Mode::Implied, Mode::Illegal,
    Mode::AbsoluteX, Mode::AbsoluteX, Mode::AbsoluteX, Mode::Illegal,
];

/// Addressing mode of `opcode`. STX/LDX zp,Y and LDX abs,Y index with Y
/// where the column says X.
pub fn mode_of(opcode: u8) -> Mode {
    match opcode {
        0x96 | 0xb6 => Mode::ZeroPageY,
        0xbe => Mode::AbsoluteY,
        _ => MODES[(opcode & 31) as usize],
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decode {
    /// The effective address is in ADL/ADH and IR holds the opcode.
    Ready,
    /// Nothing was consumed; decode again next slice.
    Retry,
}

#[inline(always)]
pub(crate) fn pc(ctx: &Context) -> u16 {
    ctx.vlr()
}

#[inline(always)]
pub(crate) fn set_pc(ctx: &mut Context, v: u16) {
    ctx.set_vlr(v)
}

/// Ticks held back from every slice the v6502 runs in.
#[inline(always)]
fn headroom(ctx: &Context) -> u16 {
    ctx.timing.v6502_adjust.div_ceil(CYCLES_PER_TICK)
}

/// Fetches the next opcode and resolves its operand address.
///
/// Cheap and medium modes are admitted as soon as the worst of them fits.
/// The expensive ones (absolute family, (zp),Y) are checked again once the
/// opcode is known and give the fetch back if their full cost does not fit.
pub fn decode(ctx: &mut Context, budget: &mut TickBudget) -> Decode {
    let reserve = headroom(ctx);
    if !budget.fits(ctx.timing.v6502_max_ticks + reserve) {
        return Decode::Retry;
    }

    let start = pc(ctx);
    let opcode = ctx.peek(start);
    let mode = mode_of(opcode);
    if !budget.fits(mode.ticks() + reserve) {
        return Decode::Retry;
    }

    let operand_at = start.wrapping_add(1);
    let x = ctx.sys_arg(reg::X);
    let y = ctx.sys_arg(reg::Y);
    let zp = ctx.peek(operand_at);

    let address = match mode {
        Mode::Accumulator => addr::V_AC,
        Mode::Implied | Mode::Illegal => operand_at,
        Mode::Implicit | Mode::Immediate => operand_at,
        Mode::ZeroPage => zp as u16,
        Mode::ZeroPageX => zp.wrapping_add(x) as u16,
        Mode::ZeroPageY => zp.wrapping_add(y) as u16,
        Mode::Relative => {
            let next = operand_at.wrapping_add(1);
            next.wrapping_add(zp as i8 as u16)
        }
        Mode::IndexedIndirect => ctx.peek_word(zp.wrapping_add(x) as u16),
        Mode::IndirectIndexed => ctx.peek_word(zp as u16).wrapping_add(y as u16),
        Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY => {
            let base = u16::from_le_bytes([zp, ctx.peek(operand_at.wrapping_add(1))]);
            match mode {
                Mode::AbsoluteX => base.wrapping_add(x as u16),
                Mode::AbsoluteY => base.wrapping_add(y as u16),
                _ => base,
            }
        }
    };

    ctx.set_sys_arg(reg::IR, opcode);
    ctx.set_sys_word(reg::ADL, address);
    set_pc(ctx, operand_at.wrapping_add(mode.operand_bytes() as u16));
    budget.charge(mode.ticks());
    Decode::Ready
}

/// What an execute handler wants next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Next,
    /// BRK or an illegal opcode handed control back to the vCPU.
    Leave,
}

/// Runs v6502 instructions starting in `phase` until the next step does not
/// fit or the program leaves for the vCPU.
pub fn run(ctx: &mut Context, budget: &mut TickBudget, mut phase: EmuPhase) -> Exit {
    let reserve = headroom(ctx);
    loop {
        if phase == EmuPhase::Fetch {
            match decode(ctx, budget) {
                Decode::Ready => phase = EmuPhase::Execute,
                Decode::Retry => {
                    ctx.set_interpreter(Interpreter::V6502(EmuPhase::Fetch));
                    return Exit::Exhausted;
                }
            }
        }

        let ir = ctx.sys_arg(reg::IR);
        let info = &EXECUTE[ir as usize];
        if !budget.fits(info.ticks + reserve) {
            ctx.set_interpreter(Interpreter::V6502(EmuPhase::Execute));
            return Exit::Exhausted;
        }

        let step = (info.handler)(ctx, ir);
        budget.charge(info.ticks);
        phase = EmuPhase::Fetch;

        if step == Step::Leave {
            debug!("v6502 left for the vCPU on {:#04x} at {:#06x}", ir, pc(ctx));
            ctx.set_interpreter(Interpreter::Vcpu);
            return Exit::Switched;
        }
    }
}
