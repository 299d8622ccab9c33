//! The primary 16-bit interpreter.
//!
//! The program counter points two bytes before the next instruction. Each
//! step advances its low byte by two, so execution never leaves the page on
//! its own; one- and three-byte instructions fix the low byte up themselves.

use log::debug;
use crate::context::{addr, page_add, page_sub, Context};
use crate::rom::Lookup;
use crate::scheduler::{Exit, TickBudget};
use crate::{interrupt, prefix, sys};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Ldwi,
    Ld,
    Cmphs,
    Ldw,
    Stw,
    Prefix,
    Movqb,
    Movqw,
    Deeka,
    Jeq,
    Deekv,
    Dokeq,
    Pokeq,
    Pokea,
    Jgt,
    Jlt,
    Jge,
    Jle,
    Ldi,
    St,
    Pop,
    Addv,
    Subv,
    Jne,
    Push,
    Ldni,
    Dokea,
    Lup,
    Andi,
    Calli,
    Ori,
    Xori,
    Bra,
    Inc,
    Cmphu,
    Addw,
    Peek,
    Sys,
    Subw,
    Def,
    Call,
    Cmpws,
    Cmpwu,
    Cmpis,
    Cmpiu,
    Peekv,
    Alloc,
    Addi,
    Subi,
    Lslw,
    Stlw,
    Ldlw,
    Poke,
    Doke,
    Deek,
    Andw,
    Orw,
    Xorw,
    Ret,
    Unknown,
}

/// What a handler asks the dispatch loop to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Finished; charge the declared cost.
    Done,
    /// Finished; charge this many ticks instead of the declared cost.
    Spent(u16),
    /// Charge the ticks and run the same instruction again.
    Repeat(u16),
    /// Nothing happened; leave the program counter on this instruction and
    /// end the slice.
    Defer,
    /// Charge the ticks and hand the rest of the slice to whichever
    /// interpreter is now selected.
    Switch(u16),
}

pub type Handler = fn(&mut Context, u8, &TickBudget) -> Flow;

#[derive(Copy, Clone)]
pub struct OpInfo {
    pub opcode: Opcode,
    pub length: u8,
    pub ticks: u16,
    pub handler: Handler,
}

impl OpInfo {
    const fn new(opcode: Opcode, length: u8, cycles: u16, handler: Handler) -> Self {
        OpInfo { opcode, length, ticks: cycles / 2, handler }
    }
}

const UNKNOWN: OpInfo = OpInfo::new(Opcode::Unknown, 2, 14, unknown);

const fn build_dispatch() -> [OpInfo; 256] {
    let mut t = [UNKNOWN; 256];
    t[0x11] = OpInfo::new(Opcode::Ldwi, 3, 20, ldwi);
    t[0x1a] = OpInfo::new(Opcode::Ld, 2, 22, ld);
    t[0x1f] = OpInfo::new(Opcode::Cmphs, 2, 28, cmphs);
    t[0x21] = OpInfo::new(Opcode::Ldw, 2, 20, ldw);
    t[0x2b] = OpInfo::new(Opcode::Stw, 2, 20, stw);
    t[0x35] = OpInfo::new(Opcode::Prefix, 2, 0, prefix::execute);
    t[0x39] = OpInfo::new(Opcode::Movqb, 3, 28, movqb);
    t[0x3b] = OpInfo::new(Opcode::Movqw, 3, 30, movqw);
    t[0x3d] = OpInfo::new(Opcode::Deeka, 2, 30, deeka);
    t[0x3f] = OpInfo::new(Opcode::Jeq, 3, 26, jeq);
    t[0x41] = OpInfo::new(Opcode::Deekv, 2, 28, deekv);
    t[0x44] = OpInfo::new(Opcode::Dokeq, 2, 22, dokeq);
    t[0x46] = OpInfo::new(Opcode::Pokeq, 2, 20, pokeq);
    t[0x48] = OpInfo::new(Opcode::Pokea, 2, 22, pokea);
    t[0x4d] = OpInfo::new(Opcode::Jgt, 3, 26, jgt);
    t[0x50] = OpInfo::new(Opcode::Jlt, 3, 26, jlt);
    t[0x53] = OpInfo::new(Opcode::Jge, 3, 26, jge);
    t[0x56] = OpInfo::new(Opcode::Jle, 3, 26, jle);
    t[0x59] = OpInfo::new(Opcode::Ldi, 2, 16, ldi);
    t[0x5e] = OpInfo::new(Opcode::St, 2, 16, st);
    t[0x63] = OpInfo::new(Opcode::Pop, 1, 26, pop);
    t[0x66] = OpInfo::new(Opcode::Addv, 2, 30, addv);
    t[0x68] = OpInfo::new(Opcode::Subv, 2, 30, subv);
    t[0x72] = OpInfo::new(Opcode::Jne, 3, 26, jne);
    t[0x75] = OpInfo::new(Opcode::Push, 1, 26, push);
    t[0x78] = OpInfo::new(Opcode::Ldni, 2, 16, ldni);
    t[0x7d] = OpInfo::new(Opcode::Dokea, 2, 28, dokea);
    t[0x7f] = OpInfo::new(Opcode::Lup, 2, 26, lup);
    t[0x82] = OpInfo::new(Opcode::Andi, 2, 22, andi);
    t[0x85] = OpInfo::new(Opcode::Calli, 3, 28, calli);
    t[0x88] = OpInfo::new(Opcode::Ori, 2, 14, ori);
    t[0x8c] = OpInfo::new(Opcode::Xori, 2, 14, xori);
    t[0x90] = OpInfo::new(Opcode::Bra, 2, 14, bra);
    t[0x93] = OpInfo::new(Opcode::Inc, 2, 20, inc);
    t[0x97] = OpInfo::new(Opcode::Cmphu, 2, 28, cmphu);
    t[0x99] = OpInfo::new(Opcode::Addw, 2, 28, addw);
    t[0xad] = OpInfo::new(Opcode::Peek, 1, 26, peek);
    t[0xb4] = OpInfo::new(Opcode::Sys, 2, 28, sys::dispatch);
    t[0xb8] = OpInfo::new(Opcode::Subw, 2, 28, subw);
    t[0xcd] = OpInfo::new(Opcode::Def, 2, 24, def);
    t[0xcf] = OpInfo::new(Opcode::Call, 2, 26, call);
    t[0xd3] = OpInfo::new(Opcode::Cmpws, 2, 30, cmpws);
    t[0xd6] = OpInfo::new(Opcode::Cmpwu, 2, 30, cmpwu);
    t[0xd9] = OpInfo::new(Opcode::Cmpis, 2, 30, cmpis);
    t[0xdb] = OpInfo::new(Opcode::Cmpiu, 2, 30, cmpiu);
    t[0xdd] = OpInfo::new(Opcode::Peekv, 2, 28, peekv);
    t[0xdf] = OpInfo::new(Opcode::Alloc, 2, 14, alloc);
    t[0xe3] = OpInfo::new(Opcode::Addi, 2, 28, addi);
    t[0xe6] = OpInfo::new(Opcode::Subi, 2, 28, subi);
    t[0xe9] = OpInfo::new(Opcode::Lslw, 1, 28, lslw);
    t[0xec] = OpInfo::new(Opcode::Stlw, 2, 26, stlw);
    t[0xee] = OpInfo::new(Opcode::Ldlw, 2, 26, ldlw);
    t[0xf0] = OpInfo::new(Opcode::Poke, 2, 28, poke);
    t[0xf3] = OpInfo::new(Opcode::Doke, 2, 28, doke);
    t[0xf6] = OpInfo::new(Opcode::Deek, 1, 28, deek);
    t[0xf8] = OpInfo::new(Opcode::Andw, 2, 28, andw);
    t[0xfa] = OpInfo::new(Opcode::Orw, 2, 28, orw);
    t[0xfc] = OpInfo::new(Opcode::Xorw, 2, 26, xorw);
    t[0xff] = OpInfo::new(Opcode::Ret, 1, 20, ret);
    t
}

pub static DISPATCH: [OpInfo; 256] = build_dispatch();

/// Cost the dispatcher checks before committing to the instruction at `at`.
#[inline(always)]
pub fn declared_ticks(ctx: &Context, at: u16) -> u16 {
    let info = &DISPATCH[ctx.peek(at) as usize];
    match info.opcode {
        Opcode::Prefix => prefix::declared_ticks(ctx.peek(page_add(at, 1))),
        _ => info.ticks,
    }
}

/// Runs instructions until the next one does not fit or the interpreter
/// changes.
pub fn run(ctx: &mut Context, budget: &mut TickBudget) -> Exit {
    loop {
        let pc = ctx.vpc();
        let at = page_add(pc, 2);
        let info = &DISPATCH[ctx.peek(at) as usize];
        let operand = ctx.peek(page_add(at, 1));

        let ticks = declared_ticks(ctx, at);
        if !budget.fits(ticks) {
            return Exit::Exhausted;
        }

        ctx.set_vpc(at);
        match (info.handler)(ctx, operand, budget) {
            Flow::Done => budget.charge(ticks),
            Flow::Spent(t) => budget.charge(t),
            Flow::Repeat(t) => {
                budget.charge(t);
                ctx.set_vpc(pc);
            }
            Flow::Defer => {
                ctx.set_vpc(pc);
                return Exit::Exhausted;
            }
            Flow::Switch(t) => {
                budget.charge(t);
                return Exit::Switched;
            }
        }
    }
}

/// 16-bit add where the carry out of the low byte is read off bit 7 of the
/// operands and the partial sum.
#[inline(always)]
pub fn add_words(a: u16, b: u16) -> u16 {
    let [al, ah] = a.to_le_bytes();
    let [bl, bh] = b.to_le_bytes();
    let lo = al.wrapping_add(bl);
    let carry = (if lo & 0x80 != 0 { al & bl } else { al | bl }) >> 7;
    u16::from_le_bytes([lo, ah.wrapping_add(bh).wrapping_add(carry)])
}

/// 16-bit subtract with the borrow read off bit 7 the same way.
#[inline(always)]
pub fn sub_words(a: u16, b: u16) -> u16 {
    let [al, ah] = a.to_le_bytes();
    let [bl, bh] = b.to_le_bytes();
    let lo = al.wrapping_sub(bl);
    let borrow = (if al & 0x80 == 0 { lo | bl } else { lo & bl }) >> 7;
    u16::from_le_bytes([lo, ah.wrapping_sub(bh).wrapping_sub(borrow)])
}

#[inline(always)]
fn hi(v: u16) -> u8 {
    (v >> 8) as u8
}

#[inline(always)]
fn lo(v: u16) -> u8 {
    v as u8
}

/// One-byte instructions give back the byte the dispatcher skipped.
#[inline(always)]
fn rewind_one(ctx: &mut Context) {
    let pc = ctx.vpc();
    ctx.set_vpc(page_sub(pc, 1));
}

/// Three-byte instructions skip their extra operand.
#[inline(always)]
fn skip_one(ctx: &mut Context) {
    let pc = ctx.vpc();
    ctx.set_vpc(page_add(pc, 1));
}

/// Word at a zero-page address, wrapping inside page zero.
#[inline(always)]
fn zp_word(ctx: &Context, d: u8) -> u16 {
    ctx.peek_word(d as u16)
}

fn unknown(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    debug!("undefined vCPU opcode {:#04x} at {:#06x}", ctx.peek(ctx.vpc()), ctx.vpc());
    Flow::Done
}

fn ldwi(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let high = ctx.peek(page_add(ctx.vpc(), 2));
    ctx.set_vac(u16::from_le_bytes([d, high]));
    skip_one(ctx);
    Flow::Done
}

fn ld(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek(d as u16);
    ctx.set_vac(v as u16);
    Flow::Done
}

fn ldw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = zp_word(ctx, d);
    ctx.set_vac(v);
    Flow::Done
}

fn stw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac();
    ctx.poke_word(d as u16, v);
    Flow::Done
}

fn ldi(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    ctx.set_vac(d as u16);
    Flow::Done
}

fn st(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = lo(ctx.vac());
    ctx.poke(d as u16, v);
    Flow::Done
}

/// Fixes up vAC.hi so that a following SUBW yields the right sign for a
/// comparison that would otherwise overflow.
fn compare_high(ctx: &mut Context, d: u8, signed: bool) {
    let ac_high = hi(ctx.vac());
    let var_high = ctx.peek(page_add(d as u16, 1));
    let adjusted = match (ac_high & 0x80 != 0, var_high & 0x80 != 0) {
        (false, true) if signed => Some(var_high.wrapping_add(1)),
        (false, true) => Some(var_high.wrapping_sub(1)),
        (true, false) if signed => Some(var_high.wrapping_sub(1)),
        (true, false) => Some(var_high.wrapping_add(1)),
        _ => None,
    };
    if let Some(h) = adjusted {
        ctx.poke(addr::V_AC + 1, h);
    }
}

fn cmphs(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    compare_high(ctx, d, true);
    Flow::Done
}

fn cmphu(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    compare_high(ctx, d, false);
    Flow::Done
}

fn pop(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let sp = ctx.vsp();
    let v = zp_word(ctx, sp);
    ctx.set_vlr(v);
    ctx.set_vsp(sp.wrapping_add(2));
    rewind_one(ctx);
    Flow::Done
}

fn push(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let sp = ctx.vsp().wrapping_sub(2);
    ctx.set_vsp(sp);
    let v = ctx.vlr();
    ctx.poke_word(sp as u16, v);
    rewind_one(ctx);
    Flow::Done
}

fn lup(ctx: &mut Context, d: u8, budget: &TickBudget) -> Flow {
    let address = page_add(ctx.vac(), d);
    match ctx.rom.lookup(address) {
        Lookup::Byte(v) => {
            ctx.set_vac(v as u16);
            Flow::Done
        }
        Lookup::ReturnFromInterrupt => interrupt::return_from_interrupt(ctx, budget),
    }
}

fn andi(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = lo(ctx.vac()) & d;
    ctx.set_vac(v as u16);
    Flow::Done
}

fn ori(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() | d as u16;
    ctx.set_vac(v);
    Flow::Done
}

fn xori(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() ^ d as u16;
    ctx.set_vac(v);
    Flow::Done
}

fn bra(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    ctx.set_vpc((pc & 0xff00) | d as u16);
    Flow::Done
}

fn inc(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek(d as u16).wrapping_add(1);
    ctx.poke(d as u16, v);
    Flow::Done
}

fn addw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = add_words(ctx.vac(), zp_word(ctx, d));
    ctx.set_vac(v);
    Flow::Done
}

fn subw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = sub_words(ctx.vac(), zp_word(ctx, d));
    ctx.set_vac(v);
    Flow::Done
}

fn addi(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = add_words(ctx.vac(), d as u16);
    ctx.set_vac(v);
    Flow::Done
}

fn subi(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = sub_words(ctx.vac(), d as u16);
    ctx.set_vac(v);
    Flow::Done
}

fn lslw(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let v = add_words(ctx.vac(), ctx.vac());
    ctx.set_vac(v);
    rewind_one(ctx);
    Flow::Done
}

fn peek(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek(ctx.vac());
    ctx.set_vac(v as u16);
    rewind_one(ctx);
    Flow::Done
}

fn poke(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = zp_word(ctx, d);
    let v = lo(ctx.vac());
    ctx.poke(target, v);
    Flow::Done
}

fn doke(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = zp_word(ctx, d);
    let v = ctx.vac();
    ctx.poke_word(target, v);
    Flow::Done
}

fn deek(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek_word(ctx.vac());
    ctx.set_vac(v);
    rewind_one(ctx);
    Flow::Done
}

fn andw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() & zp_word(ctx, d);
    ctx.set_vac(v);
    Flow::Done
}

fn orw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() | zp_word(ctx, d);
    ctx.set_vac(v);
    Flow::Done
}

fn xorw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() ^ zp_word(ctx, d);
    ctx.set_vac(v);
    Flow::Done
}

fn def(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    ctx.set_vac(page_add(pc, 2));
    ctx.set_vpc((pc & 0xff00) | d as u16);
    Flow::Done
}

fn call(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    ctx.set_vlr(page_add(pc, 2));
    let target = zp_word(ctx, d);
    ctx.set_vpc(page_sub(target, 2));
    Flow::Done
}

fn calli(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let pc = ctx.vpc();
    let target = u16::from_le_bytes([d, ctx.peek(page_add(pc, 2))]);
    ctx.set_vlr(page_add(pc, 3));
    ctx.set_vpc(page_sub(target, 2));
    Flow::Done
}

fn ret(ctx: &mut Context, _d: u8, _budget: &TickBudget) -> Flow {
    let lr = ctx.vlr();
    ctx.set_vpc(page_sub(lr, 2));
    Flow::Done
}

fn alloc(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let sp = ctx.vsp().wrapping_add(d);
    ctx.set_vsp(sp);
    Flow::Done
}

fn stlw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let slot = ctx.vsp().wrapping_add(d);
    let v = ctx.vac();
    ctx.poke_word(slot as u16, v);
    Flow::Done
}

fn ldlw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let slot = ctx.vsp().wrapping_add(d);
    let v = zp_word(ctx, slot);
    ctx.set_vac(v);
    Flow::Done
}

fn movqb(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = ctx.peek(page_add(ctx.vpc(), 2));
    ctx.poke(target as u16, d);
    skip_one(ctx);
    Flow::Done
}

fn movqw(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = ctx.peek(page_add(ctx.vpc(), 2));
    ctx.poke_word(target as u16, d as u16);
    skip_one(ctx);
    Flow::Done
}

fn deeka(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek_word(ctx.vac());
    ctx.poke_word(d as u16, v);
    Flow::Done
}

fn deekv(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek_word(zp_word(ctx, d));
    ctx.set_vac(v);
    Flow::Done
}

fn peekv(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek(zp_word(ctx, d));
    ctx.set_vac(v as u16);
    Flow::Done
}

fn dokeq(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = ctx.vac();
    ctx.poke_word(target, d as u16);
    Flow::Done
}

fn pokeq(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let target = ctx.vac();
    ctx.poke(target, d);
    Flow::Done
}

fn pokea(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.peek(d as u16);
    let target = ctx.vac();
    ctx.poke(target, v);
    Flow::Done
}

fn dokea(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = zp_word(ctx, d);
    let target = ctx.vac();
    ctx.poke_word(target, v);
    Flow::Done
}

fn ldni(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    ctx.set_vac(0xff00 | d as u16);
    Flow::Done
}

/// Adds vAC into a zero-page word; vAC itself is untouched.
fn addv(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = add_words(zp_word(ctx, d), ctx.vac());
    ctx.poke_word(d as u16, v);
    Flow::Done
}

fn subv(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = sub_words(zp_word(ctx, d), ctx.vac());
    ctx.poke_word(d as u16, v);
    Flow::Done
}

/// Long branches land on `hhll`, which is already two before the target.
/// Not-taken paths cost the given number of cycles.
fn branch_if(ctx: &mut Context, d: u8, taken: bool, pass_cycles: u16) -> Flow {
    let pc = ctx.vpc();
    if taken {
        let high = ctx.peek(page_add(pc, 2));
        ctx.set_vpc(u16::from_le_bytes([d, high]));
        Flow::Done
    } else {
        skip_one(ctx);
        Flow::Spent(pass_cycles / 2)
    }
}

fn jeq(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let taken = ctx.vac() == 0;
    branch_if(ctx, d, taken, 24)
}

fn jne(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let taken = ctx.vac() != 0;
    branch_if(ctx, d, taken, 24)
}

fn jlt(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let taken = (ctx.vac() as i16) < 0;
    branch_if(ctx, d, taken, 22)
}

fn jge(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let taken = (ctx.vac() as i16) >= 0;
    branch_if(ctx, d, taken, 22)
}

fn jgt(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let v = ctx.vac() as i16;
    branch_if(ctx, d, v > 0, if v < 0 { 22 } else { 26 })
}

fn jle(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    let taken = (ctx.vac() as i16) <= 0;
    branch_if(ctx, d, taken, 26)
}

/// Compares low bytes once the high bytes agree. Leaves vAC zero on equal,
/// otherwise with the sign of an unsigned `vACL - other`.
fn compare_low(ctx: &mut Context, other: u8) -> Flow {
    let low = lo(ctx.vac());
    if (low ^ other) & 0x80 == 0 {
        let diff = low.wrapping_sub(other);
        ctx.set_vac(u16::from_le_bytes([diff, diff]));
    } else {
        ctx.poke(addr::V_AC + 1, (low ^ 0x80) | 1);
    }
    Flow::Done
}

/// Word compare that leaves vAC negative, zero or positive. The low byte
/// is only meaningful as part of that sign.
fn compare_words(ctx: &mut Context, d: u8, signed: bool) -> Flow {
    let ac_high = hi(ctx.vac());
    let other = zp_word(ctx, d);
    let diff = ac_high ^ hi(other);
    if diff == 0 {
        return compare_low(ctx, lo(other));
    }
    let high = if diff & 0x80 == 0 {
        ac_high.wrapping_sub(hi(other))
    } else if signed {
        ac_high | 1
    } else {
        (ac_high ^ 0x80) | 1
    };
    ctx.poke(addr::V_AC + 1, high);
    Flow::Spent(26 / 2)
}

fn cmpws(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    compare_words(ctx, d, true)
}

fn cmpwu(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    compare_words(ctx, d, false)
}

/// With a nonzero high byte vAC already has the sign of the comparison.
fn cmpis(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    if hi(ctx.vac()) != 0 {
        return Flow::Spent(22 / 2);
    }
    compare_low(ctx, d)
}

fn cmpiu(ctx: &mut Context, d: u8, _budget: &TickBudget) -> Flow {
    if hi(ctx.vac()) != 0 {
        ctx.poke(addr::V_AC + 1, 1);
        return Flow::Spent(24 / 2);
    }
    compare_low(ctx, d)
}
