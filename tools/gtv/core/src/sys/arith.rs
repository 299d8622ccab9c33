use crate::context::Context;
use crate::sys::{SysResult, TaskState};

/// Shift-and-add multiplication, a few multiplier bits at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Multiply {
    pub multiplicand: u16,
    pub multiplier: u16,
    pub acc: u16,
    bit: u16,
}

impl Multiply {
    pub fn new(multiplicand: u16, multiplier: u16, acc: u16) -> Self {
        Multiply { multiplicand, multiplier, acc, bit: 1 }
    }

    /// Consumes up to `bits` multiplier bits. True once the product is final.
    pub fn step(&mut self, bits: u8) -> bool {
        for _ in 0..bits {
            if self.done() {
                break;
            }
            if self.multiplier & self.bit != 0 {
                self.acc = self.acc.wrapping_add(self.multiplicand);
            }
            self.multiplicand <<= 1;
            self.bit <<= 1;
        }
        self.done()
    }

    fn done(&self) -> bool {
        self.bit == 0 || self.multiplier & self.bit.wrapping_neg() == 0
    }
}

/// Restoring division, one quotient bit per step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Divide {
    pub quotient: u16,
    pub remainder: u16,
    pub divisor: u16,
    steps: u8,
}

impl Divide {
    pub fn new(dividend: u16, divisor: u16) -> Self {
        Divide { quotient: dividend, remainder: 0, divisor, steps: 0 }
    }

    /// Runs up to `n` steps. True once all 16 quotient bits are in.
    ///
    /// Dividing by zero yields a quotient of 0xffff and leaves the dividend
    /// as the remainder.
    pub fn step(&mut self, n: u8) -> bool {
        for _ in 0..n {
            if self.steps == 16 {
                break;
            }
            let mut r = (self.remainder as u32) << 1 | (self.quotient >> 15) as u32;
            self.quotient <<= 1;
            if r >= self.divisor as u32 {
                r -= self.divisor as u32;
                self.quotient |= 1;
            }
            self.remainder = r as u16;
            self.steps += 1;
        }
        self.steps == 16
    }
}

const MULTIPLY_TICKS: u16 = 66 / 2;
const DIVIDE_TICKS: u16 = 80 / 2;

/// C += A * B with A, B, C in sysArgs[0:1], [2:3], [4:5]. The product is
/// also left in vAC.
pub fn multiply_s16(ctx: &mut Context, state: Option<TaskState>) -> SysResult {
    let mut m = match state {
        Some(TaskState::Multiply(m)) => m,
        _ => Multiply::new(ctx.sys_word(0), ctx.sys_word(2), ctx.sys_word(4)),
    };
    if m.step(8) {
        ctx.set_sys_word(4, m.acc);
        ctx.set_vac(m.acc);
        SysResult::Done(MULTIPLY_TICKS)
    } else {
        SysResult::Again(MULTIPLY_TICKS, TaskState::Multiply(m))
    }
}

/// Unsigned division of sysArgs[0:1] by sysArgs[2:3]. The quotient replaces
/// the dividend and goes to vAC; the remainder goes to sysArgs[4:5].
pub fn divide_u16(ctx: &mut Context, state: Option<TaskState>) -> SysResult {
    let mut d = match state {
        Some(TaskState::Divide(d)) => d,
        _ => Divide::new(ctx.sys_word(0), ctx.sys_word(2)),
    };
    if d.step(8) {
        ctx.set_sys_word(0, d.quotient);
        ctx.set_sys_word(4, d.remainder);
        ctx.set_vac(d.quotient);
        SysResult::Done(DIVIDE_TICKS)
    } else {
        SysResult::Again(DIVIDE_TICKS, TaskState::Divide(d))
    }
}

fn shift_right(ctx: &mut Context, n: u32, cycles: u16) -> SysResult {
    let v = ctx.vac() >> n;
    ctx.set_vac(v);
    SysResult::Done(cycles / 2)
}

fn shift_left(ctx: &mut Context, n: u32, cycles: u16) -> SysResult {
    let v = ctx.vac() << n;
    ctx.set_vac(v);
    SysResult::Done(cycles / 2)
}

pub fn lsrw1(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 1, 48)
}

pub fn lsrw2(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 2, 52)
}

pub fn lsrw3(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 3, 52)
}

pub fn lsrw4(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 4, 50)
}

pub fn lsrw5(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 5, 50)
}

pub fn lsrw6(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 6, 48)
}

pub fn lsrw7(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 7, 30)
}

pub fn lsrw8(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_right(ctx, 8, 24)
}

pub fn lslw4(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_left(ctx, 4, 46)
}

pub fn lslw8(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    shift_left(ctx, 8, 24)
}
