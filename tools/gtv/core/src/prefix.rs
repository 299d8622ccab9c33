//! The page of extended vCPU instructions behind the 0x35 escape byte.
//!
//! The second byte selects the instruction; operands, if any, follow. Lengths
//! here count the escape byte.

use log::debug;
use crate::context::{page_add, Context};
use crate::interrupt;
use crate::machine;
use crate::scheduler::TickBudget;
use crate::sys::arith::{Divide, Multiply};
use crate::sys::{resume, suspend, TaskState};
use crate::vcpu::Flow;

pub const PREFIX: u8 = 0x35;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtOpcode {
    Beq,
    Bgt,
    Blt,
    Bge,
    Ble,
    Bne,
    Rdivu,
    Mulw,
    Reset,
    Dokei,
    Rti,
    Negw,
    Unknown,
}

type ExtHandler = fn(&mut Context, u8, &TickBudget) -> Flow;

#[derive(Copy, Clone)]
pub struct ExtInfo {
    pub opcode: ExtOpcode,
    pub length: u8,
    pub ticks: u16,
    handler: ExtHandler,
}

impl ExtInfo {
    const fn new(opcode: ExtOpcode, length: u8, cycles: u16, handler: ExtHandler) -> Self {
        ExtInfo { opcode, length, ticks: cycles / 2, handler }
    }
}

const UNKNOWN: ExtInfo = ExtInfo::new(ExtOpcode::Unknown, 2, 14, unknown);

const fn build_table() -> [ExtInfo; 256] {
    let mut t = [UNKNOWN; 256];
    t[0x3b] = ExtInfo::new(ExtOpcode::Rdivu, 3, 28, rdivu);
    t[0x3d] = ExtInfo::new(ExtOpcode::Mulw, 3, 28, mulw);
    t[0x3f] = ExtInfo::new(ExtOpcode::Beq, 3, 26, branch);
    t[0x4d] = ExtInfo::new(ExtOpcode::Bgt, 3, 26, branch);
    t[0x50] = ExtInfo::new(ExtOpcode::Blt, 3, 26, branch);
    t[0x53] = ExtInfo::new(ExtOpcode::Bge, 3, 26, branch);
    t[0x56] = ExtInfo::new(ExtOpcode::Ble, 3, 26, branch);
    t[0x5c] = ExtInfo::new(ExtOpcode::Reset, 2, 88, reset);
    t[0x62] = ExtInfo::new(ExtOpcode::Dokei, 4, 30, dokei);
    t[0x72] = ExtInfo::new(ExtOpcode::Bne, 3, 26, branch);
    t[0x7a] = ExtInfo::new(ExtOpcode::Rti, 2, 32, rti);
    t[0x7e] = ExtInfo::new(ExtOpcode::Negw, 2, 28, negw);
    t
}

pub static EXTENDED: [ExtInfo; 256] = build_table();

/// Cost the vCPU dispatcher checks for `35 ext`.
#[inline(always)]
pub fn declared_ticks(ext: u8) -> u16 {
    EXTENDED[ext as usize].ticks
}

/// Handler for the escape byte. `ext` is the second byte of the instruction;
/// vPC points at the escape byte.
pub fn execute(ctx: &mut Context, ext: u8, budget: &TickBudget) -> Flow {
    (EXTENDED[ext as usize].handler)(ctx, ext, budget)
}

/// Moves vPC over operand bytes beyond the usual two.
#[inline(always)]
fn skip(ctx: &mut Context, n: u8) {
    let pc = ctx.vpc();
    ctx.set_vpc(page_add(pc, n));
}

#[inline(always)]
fn operand(ctx: &Context, n: u8) -> u8 {
    ctx.peek(page_add(ctx.vpc(), 1 + n))
}

fn unknown(ctx: &mut Context, ext: u8, _budget: &TickBudget) -> Flow {
    debug!("undefined extended opcode {:#04x} at {:#06x}", ext, ctx.vpc());
    Flow::Done
}

fn condition_holds(ext: u8, value: i16) -> bool {
    match ext {
        0x3f => value == 0,
        0x4d => value > 0,
        0x50 => value < 0,
        0x53 => value >= 0,
        0x56 => value <= 0,
        _ => value != 0,
    }
}

fn branch(ctx: &mut Context, ext: u8, _budget: &TickBudget) -> Flow {
    if condition_holds(ext, ctx.vac() as i16) {
        let target = operand(ctx, 1);
        let pc = ctx.vpc();
        ctx.set_vpc((pc & 0xff00) | target as u16);
    } else {
        skip(ctx, 1);
    }
    Flow::Done
}

/// `35 62 ih il`: stores the immediate word big-end-first at [vAC].
fn dokei(ctx: &mut Context, _ext: u8, _budget: &TickBudget) -> Flow {
    let high = operand(ctx, 1);
    let low = operand(ctx, 2);
    let target = ctx.vac();
    ctx.poke(target, low);
    ctx.poke(page_add(target, 1), high);
    skip(ctx, 2);
    Flow::Done
}

/// `35 7e`: vAC := -vAC.
fn negw(ctx: &mut Context, _ext: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac().wrapping_neg();
    ctx.set_vac(v);
    Flow::Done
}

fn reset(ctx: &mut Context, _ext: u8, _budget: &TickBudget) -> Flow {
    machine::warm_boot(ctx);
    Flow::Done
}

fn rti(ctx: &mut Context, _ext: u8, budget: &TickBudget) -> Flow {
    interrupt::return_from_interrupt(ctx, budget)
}

const STEP_TICKS: u16 = 28 / 2;
const BITS_PER_STEP: u8 = 4;

/// `35 3d dd`: vAC *= [dd], four multiplier bits per step.
fn mulw(ctx: &mut Context, ext: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    let owner = (PREFIX as u16) << 8 | ext as u16;
    let mut m = match resume(ctx, pc, owner) {
        Some(TaskState::Multiply(m)) => m,
        _ => Multiply::new(ctx.vac(), ctx.peek_word(operand(ctx, 1) as u16), 0),
    };
    if m.step(BITS_PER_STEP) {
        ctx.set_vac(m.acc);
        skip(ctx, 1);
        Flow::Spent(STEP_TICKS)
    } else {
        suspend(ctx, pc, owner, TaskState::Multiply(m));
        Flow::Repeat(STEP_TICKS)
    }
}

/// `35 3b dd`: vAC = [dd] / vAC, unsigned. The remainder lands in
/// sysArgs[4:5].
fn rdivu(ctx: &mut Context, ext: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    let owner = (PREFIX as u16) << 8 | ext as u16;
    let mut d = match resume(ctx, pc, owner) {
        Some(TaskState::Divide(d)) => d,
        _ => Divide::new(ctx.peek_word(operand(ctx, 1) as u16), ctx.vac()),
    };
    if d.step(BITS_PER_STEP) {
        ctx.set_vac(d.quotient);
        ctx.set_sys_word(4, d.remainder);
        skip(ctx, 1);
        Flow::Spent(STEP_TICKS)
    } else {
        suspend(ctx, pc, owner, TaskState::Divide(d));
        Flow::Repeat(STEP_TICKS)
    }
}
