use bit_field::BitField;
use crate::context::{addr, Context};
use super::{pc, reg, set_pc, Step};

mod flag {
    pub const C: usize = 0;
    pub const Z: usize = 1;
    pub const I: usize = 2;
    pub const D: usize = 3;
    pub const B: usize = 4;
    pub const U: usize = 5;
    pub const V: usize = 6;
    pub const N: usize = 7;
}

pub type ExecHandler = fn(&mut Context, u8) -> Step;

#[derive(Copy, Clone)]
pub struct ExecInfo {
    pub ticks: u16,
    pub handler: ExecHandler,
}

impl ExecInfo {
    const fn new(cycles: u16, handler: ExecHandler) -> Self {
        ExecInfo { ticks: cycles / 2, handler }
    }
}

const ILLEGAL: ExecInfo = ExecInfo::new(22, brk);

macro_rules! fill {
    ($t:ident, [$($op:expr),* $(,)?], $info:expr) => {
        $( $t[$op] = $info; )*
    };
}

const fn build_execute() -> [ExecInfo; 256] {
    let mut t = [ILLEGAL; 256];
    fill!(t, [0x01, 0x05, 0x09, 0x0d, 0x11, 0x15, 0x19, 0x1d], ExecInfo::new(24, ora));
    fill!(t, [0x21, 0x25, 0x29, 0x2d, 0x31, 0x35, 0x39, 0x3d], ExecInfo::new(24, and));
    fill!(t, [0x41, 0x45, 0x49, 0x4d, 0x51, 0x55, 0x59, 0x5d], ExecInfo::new(24, eor));
    fill!(t, [0x61, 0x65, 0x69, 0x6d, 0x71, 0x75, 0x79, 0x7d], ExecInfo::new(38, adc));
    fill!(t, [0x81, 0x85, 0x8d, 0x91, 0x95, 0x99, 0x9d], ExecInfo::new(18, sta));
    fill!(t, [0xa1, 0xa5, 0xa9, 0xad, 0xb1, 0xb5, 0xb9, 0xbd], ExecInfo::new(22, lda));
    fill!(t, [0xc1, 0xc5, 0xc9, 0xcd, 0xd1, 0xd5, 0xd9, 0xdd], ExecInfo::new(34, cmp));
    fill!(t, [0xe1, 0xe5, 0xe9, 0xed, 0xf1, 0xf5, 0xf9, 0xfd], ExecInfo::new(40, sbc));

    fill!(t, [0x06, 0x0a, 0x0e, 0x16, 0x1e], ExecInfo::new(30, asl));
    fill!(t, [0x26, 0x2a, 0x2e, 0x36, 0x3e], ExecInfo::new(34, rol));
    fill!(t, [0x46, 0x4a, 0x4e, 0x56, 0x5e], ExecInfo::new(30, lsr));
    fill!(t, [0x66, 0x6a, 0x6e, 0x76, 0x7e], ExecInfo::new(46, ror));
    fill!(t, [0x86, 0x8e, 0x96], ExecInfo::new(18, stx));
    fill!(t, [0xa2, 0xa6, 0xae, 0xb6, 0xbe], ExecInfo::new(22, ldx));
    fill!(t, [0xc6, 0xce, 0xd6, 0xde], ExecInfo::new(28, dec));
    fill!(t, [0xe6, 0xee, 0xf6, 0xfe], ExecInfo::new(28, inc));
    fill!(t, [0x84, 0x8c, 0x94], ExecInfo::new(18, sty));
    fill!(t, [0xa0, 0xa4, 0xac, 0xb4, 0xbc], ExecInfo::new(22, ldy));
    fill!(t, [0xc0, 0xc4, 0xcc], ExecInfo::new(34, cpy));
    fill!(t, [0xe0, 0xe4, 0xec], ExecInfo::new(34, cpx));
    fill!(t, [0x24, 0x2c], ExecInfo::new(30, bit));
    fill!(t, [0x10, 0x30, 0x50, 0x70, 0x90, 0xb0, 0xd0, 0xf0], ExecInfo::new(28, branch));

    t[0x4c] = ExecInfo::new(22, jmp);
    t[0x6c] = ExecInfo::new(30, jmp_indirect);
    t[0x20] = ExecInfo::new(40, jsr);
    t[0x60] = ExecInfo::new(30, rts);
    t[0x40] = ExecInfo::new(40, rti);

    t[0x08] = ExecInfo::new(36, php);
    t[0x28] = ExecInfo::new(32, plp);
    t[0x48] = ExecInfo::new(24, pha);
    t[0x68] = ExecInfo::new(26, pla);

    t[0x88] = ExecInfo::new(18, dey);
    t[0xc8] = ExecInfo::new(18, iny);
    t[0xca] = ExecInfo::new(18, dex);
    t[0xe8] = ExecInfo::new(18, inx);
    t[0xa8] = ExecInfo::new(18, tay);
    t[0x98] = ExecInfo::new(18, tya);
    t[0xaa] = ExecInfo::new(18, tax);
    t[0x8a] = ExecInfo::new(18, txa);
    t[0xba] = ExecInfo::new(18, tsx);
    t[0x9a] = ExecInfo::new(16, txs);

    fill!(t, [0x18, 0x38, 0x58, 0x78, 0xb8, 0xd8, 0xf8], ExecInfo::new(16, set_flag));
    t[0xea] = ExecInfo::new(12, nop);
    t
}

/// Execute step for every opcode. Anything not a documented instruction
/// behaves like BRK.
pub static EXECUTE: [ExecInfo; 256] = build_execute();

// Register access.

#[inline(always)]
fn a(ctx: &Context) -> u8 {
    ctx.peek(addr::V_AC)
}

#[inline(always)]
fn set_a(ctx: &mut Context, v: u8) {
    ctx.poke(addr::V_AC, v)
}

#[inline(always)]
fn p(ctx: &Context) -> u8 {
    ctx.sys_arg(reg::P)
}

#[inline(always)]
fn address(ctx: &Context) -> u16 {
    ctx.sys_word(reg::ADL)
}

#[inline(always)]
fn operand(ctx: &Context) -> u8 {
    ctx.peek(address(ctx))
}

#[inline(always)]
fn flag(ctx: &Context, bit: usize) -> bool {
    p(ctx).get_bit(bit)
}

#[inline(always)]
fn set_flag_bit(ctx: &mut Context, bit: usize, value: bool) {
    let mut p = p(ctx);
    p.set_bit(bit, value);
    ctx.set_sys_arg(reg::P, p);
}

/// Z and N are kept as the last result rather than as bits.
#[inline(always)]
fn set_nz(ctx: &mut Context, v: u8) {
    ctx.set_sys_arg(reg::QZ, v);
    ctx.set_sys_arg(reg::QN, v);
}

/// Folds Qz/Qn into P for pushing.
fn packed_flags(ctx: &Context) -> u8 {
    let mut p = p(ctx);
    p.set_bit(flag::Z, ctx.sys_arg(reg::QZ) == 0);
    p.set_bit(flag::N, ctx.sys_arg(reg::QN).get_bit(7));
    p.set_bit(flag::B, true);
    p.set_bit(flag::U, true);
    p
}

fn unpack_flags(ctx: &mut Context, v: u8) {
    ctx.set_sys_arg(reg::P, v);
    ctx.set_sys_arg(reg::QZ, if v.get_bit(flag::Z) { 0 } else { 1 });
    ctx.set_sys_arg(reg::QN, v & 0x80);
}

// The stack lives in page zero and grows down, S pointing at the last byte
// pushed.

fn push(ctx: &mut Context, v: u8) {
    let s = ctx.vsp().wrapping_sub(1);
    ctx.set_vsp(s);
    ctx.poke(s as u16, v);
}

fn pull(ctx: &mut Context) -> u8 {
    let s = ctx.vsp();
    let v = ctx.peek(s as u16);
    ctx.set_vsp(s.wrapping_add(1));
    v
}

/// 8-bit add with carry in. Carry out comes from bit 7 of the operands and
/// the sum; overflow when both operands agree in sign and the sum does not.
#[inline(always)]
fn add(a: u8, m: u8, carry: bool) -> (u8, bool, bool) {
    let r = a.wrapping_add(m).wrapping_add(carry as u8);
    let carry = ((a & m) | ((a | m) & !r)) & 0x80 != 0;
    let overflow = (!(a ^ m) & (a ^ r)) & 0x80 != 0;
    (r, carry, overflow)
}

fn compare(ctx: &mut Context, register: u8) {
    let (r, carry, _) = add(register, !operand(ctx), true);
    set_flag_bit(ctx, flag::C, carry);
    set_nz(ctx, r);
}

fn brk(ctx: &mut Context, _ir: u8) -> Step {
    ctx.poke(addr::V_AC + 1, 0);
    Step::Leave
}

fn nop(_ctx: &mut Context, _ir: u8) -> Step {
    Step::Next
}

fn ora(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx) | operand(ctx);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn and(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx) & operand(ctx);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn eor(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx) ^ operand(ctx);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn adc(ctx: &mut Context, _ir: u8) -> Step {
    let (r, carry, overflow) = add(a(ctx), operand(ctx), flag(ctx, flag::C));
    set_a(ctx, r);
    set_flag_bit(ctx, flag::C, carry);
    set_flag_bit(ctx, flag::V, overflow);
    set_nz(ctx, r);
    Step::Next
}

fn sbc(ctx: &mut Context, _ir: u8) -> Step {
    let (r, carry, overflow) = add(a(ctx), !operand(ctx), flag(ctx, flag::C));
    set_a(ctx, r);
    set_flag_bit(ctx, flag::C, carry);
    set_flag_bit(ctx, flag::V, overflow);
    set_nz(ctx, r);
    Step::Next
}

fn cmp(ctx: &mut Context, _ir: u8) -> Step {
    compare(ctx, a(ctx));
    Step::Next
}

fn cpx(ctx: &mut Context, _ir: u8) -> Step {
    compare(ctx, ctx.sys_arg(reg::X));
    Step::Next
}

fn cpy(ctx: &mut Context, _ir: u8) -> Step {
    compare(ctx, ctx.sys_arg(reg::Y));
    Step::Next
}

fn bit(ctx: &mut Context, _ir: u8) -> Step {
    let m = operand(ctx);
    ctx.set_sys_arg(reg::QZ, a(ctx) & m);
    ctx.set_sys_arg(reg::QN, m);
    set_flag_bit(ctx, flag::V, m.get_bit(6));
    Step::Next
}

fn lda(ctx: &mut Context, _ir: u8) -> Step {
    let v = operand(ctx);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn ldx(ctx: &mut Context, _ir: u8) -> Step {
    let v = operand(ctx);
    ctx.set_sys_arg(reg::X, v);
    set_nz(ctx, v);
    Step::Next
}

fn ldy(ctx: &mut Context, _ir: u8) -> Step {
    let v = operand(ctx);
    ctx.set_sys_arg(reg::Y, v);
    set_nz(ctx, v);
    Step::Next
}

fn sta(ctx: &mut Context, _ir: u8) -> Step {
    let at = address(ctx);
    ctx.poke(at, a(ctx));
    Step::Next
}

fn stx(ctx: &mut Context, _ir: u8) -> Step {
    let at = address(ctx);
    ctx.poke(at, ctx.sys_arg(reg::X));
    Step::Next
}

fn sty(ctx: &mut Context, _ir: u8) -> Step {
    let at = address(ctx);
    ctx.poke(at, ctx.sys_arg(reg::Y));
    Step::Next
}

/// Read-modify-write at the effective address, which is vAC itself in
/// accumulator mode.
fn modify(ctx: &mut Context, f: impl FnOnce(u8, bool) -> (u8, bool)) {
    let at = address(ctx);
    let (r, carry) = f(ctx.peek(at), flag(ctx, flag::C));
    ctx.poke(at, r);
    set_flag_bit(ctx, flag::C, carry);
    set_nz(ctx, r);
}

fn asl(ctx: &mut Context, _ir: u8) -> Step {
    modify(ctx, |m, _| (m << 1, m.get_bit(7)));
    Step::Next
}

fn rol(ctx: &mut Context, _ir: u8) -> Step {
    modify(ctx, |m, c| (m << 1 | c as u8, m.get_bit(7)));
    Step::Next
}

fn lsr(ctx: &mut Context, _ir: u8) -> Step {
    modify(ctx, |m, _| (m >> 1, m.get_bit(0)));
    Step::Next
}

fn ror(ctx: &mut Context, _ir: u8) -> Step {
    modify(ctx, |m, c| (m >> 1 | (c as u8) << 7, m.get_bit(0)));
    Step::Next
}

fn inc(ctx: &mut Context, _ir: u8) -> Step {
    let at = address(ctx);
    let v = ctx.peek(at).wrapping_add(1);
    ctx.poke(at, v);
    set_nz(ctx, v);
    Step::Next
}

fn dec(ctx: &mut Context, _ir: u8) -> Step {
    let at = address(ctx);
    let v = ctx.peek(at).wrapping_sub(1);
    ctx.poke(at, v);
    set_nz(ctx, v);
    Step::Next
}

fn step_register(ctx: &mut Context, slot: u8, delta: i8) {
    let v = ctx.sys_arg(slot).wrapping_add_signed(delta);
    ctx.set_sys_arg(slot, v);
    set_nz(ctx, v);
}

fn inx(ctx: &mut Context, _ir: u8) -> Step {
    step_register(ctx, reg::X, 1);
    Step::Next
}

fn dex(ctx: &mut Context, _ir: u8) -> Step {
    step_register(ctx, reg::X, -1);
    Step::Next
}

fn iny(ctx: &mut Context, _ir: u8) -> Step {
    step_register(ctx, reg::Y, 1);
    Step::Next
}

fn dey(ctx: &mut Context, _ir: u8) -> Step {
    step_register(ctx, reg::Y, -1);
    Step::Next
}

fn tax(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx);
    ctx.set_sys_arg(reg::X, v);
    set_nz(ctx, v);
    Step::Next
}

fn tay(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx);
    ctx.set_sys_arg(reg::Y, v);
    set_nz(ctx, v);
    Step::Next
}

fn txa(ctx: &mut Context, _ir: u8) -> Step {
    let v = ctx.sys_arg(reg::X);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn tya(ctx: &mut Context, _ir: u8) -> Step {
    let v = ctx.sys_arg(reg::Y);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}

fn tsx(ctx: &mut Context, _ir: u8) -> Step {
    let v = ctx.vsp();
    ctx.set_sys_arg(reg::X, v);
    set_nz(ctx, v);
    Step::Next
}

fn txs(ctx: &mut Context, _ir: u8) -> Step {
    let v = ctx.sys_arg(reg::X);
    ctx.set_vsp(v);
    Step::Next
}

/// CLC/SEC/CLI/SEI/CLV/CLD/SED. Bits 6 and 7 of the opcode pick the flag,
/// bit 5 the new value; CLV has no set counterpart.
fn set_flag(ctx: &mut Context, ir: u8) -> Step {
    let (bit, value) = match ir {
        0xb8 => (flag::V, false),
        _ => {
            let bit = match ir >> 6 {
                0 => flag::C,
                1 => flag::I,
                _ => flag::D,
            };
            (bit, ir.get_bit(5))
        }
    };
    set_flag_bit(ctx, bit, value);
    Step::Next
}

/// BPL/BMI/BVC/BVS/BCC/BCS/BNE/BEQ. Bits 6 and 7 pick N, V, C or Z; bit 5
/// is the value that takes the branch.
fn branch(ctx: &mut Context, ir: u8) -> Step {
    let actual = match ir >> 6 {
        0 => ctx.sys_arg(reg::QN).get_bit(7),
        1 => flag(ctx, flag::V),
        2 => flag(ctx, flag::C),
        _ => ctx.sys_arg(reg::QZ) == 0,
    };
    if actual == ir.get_bit(5) {
        let target = address(ctx);
        set_pc(ctx, target);
    }
    Step::Next
}

fn jmp(ctx: &mut Context, _ir: u8) -> Step {
    let target = address(ctx);
    set_pc(ctx, target);
    Step::Next
}

/// The pointer's high byte comes from the same page as its low byte.
fn jmp_indirect(ctx: &mut Context, _ir: u8) -> Step {
    let target = ctx.peek_word(address(ctx));
    set_pc(ctx, target);
    Step::Next
}

/// Decoded like an immediate: ADL/ADH points at the target's low byte and PC
/// at its high byte, which is also the return address pushed.
fn jsr(ctx: &mut Context, _ir: u8) -> Step {
    let back = pc(ctx);
    let target = u16::from_le_bytes([operand(ctx), ctx.peek(back)]);
    let [lo, hi] = back.to_le_bytes();
    push(ctx, hi);
    push(ctx, lo);
    set_pc(ctx, target);
    Step::Next
}

fn rts(ctx: &mut Context, _ir: u8) -> Step {
    let lo = pull(ctx);
    let hi = pull(ctx);
    set_pc(ctx, u16::from_le_bytes([lo, hi]).wrapping_add(1));
    Step::Next
}

fn rti(ctx: &mut Context, _ir: u8) -> Step {
    let p = pull(ctx);
    unpack_flags(ctx, p);
    let lo = pull(ctx);
    let hi = pull(ctx);
    set_pc(ctx, u16::from_le_bytes([lo, hi]));
    Step::Next
}

fn php(ctx: &mut Context, _ir: u8) -> Step {
    let p = packed_flags(ctx);
    push(ctx, p);
    Step::Next
}

fn plp(ctx: &mut Context, _ir: u8) -> Step {
    let p = pull(ctx);
    unpack_flags(ctx, p);
    Step::Next
}

fn pha(ctx: &mut Context, _ir: u8) -> Step {
    let v = a(ctx);
    push(ctx, v);
    Step::Next
}

fn pla(ctx: &mut Context, _ir: u8) -> Step {
    let v = pull(ctx);
    set_a(ctx, v);
    set_nz(ctx, v);
    Step::Next
}
