use log::{debug, warn};
use crate::context::{addr, Context, Interpreter};
use crate::timing::CYCLES_PER_TICK;
use crate::{v6502, vcpu};

/// Signed countdown of the ticks left in a slice.
///
/// The countdown starts at minus the granted ticks and climbs towards zero
/// as instructions are charged; it never goes above zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TickBudget {
    granted: u16,
    countdown: i16,
}

impl TickBudget {
    pub fn new(ticks: u16) -> Self {
        let granted = ticks.min(i16::MAX as u16);
        TickBudget { granted, countdown: -(granted as i16) }
    }

    #[inline(always)]
    pub fn fits(&self, ticks: u16) -> bool {
        self.countdown as i32 + ticks as i32 <= 0
    }

    /// Charges `ticks`. Callers check `fits` first; anything beyond the
    /// budget is dropped rather than allowed to overrun.
    #[inline(always)]
    pub fn charge(&mut self, ticks: u16) {
        let next = self.countdown as i32 + ticks as i32;
        if next > 0 {
            warn!("charge of {} ticks overruns the slice by {}", ticks, next);
            self.countdown = 0;
        } else {
            self.countdown = next as i16;
        }
    }

    #[inline(always)]
    pub fn remaining(&self) -> u16 {
        (-self.countdown) as u16
    }

    #[inline(always)]
    pub fn used(&self) -> u16 {
        self.granted - self.remaining()
    }

    #[inline(always)]
    pub fn countdown(&self) -> i16 {
        self.countdown
    }
}

/// Why an interpreter handed control back to the scheduler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The next step does not fit; resume here next slice.
    Exhausted,
    /// The selector changed; the other interpreter continues this slice.
    Switched,
}

/// Runs the active interpreter for at most `cycle_budget` cycles and returns
/// the cycles actually consumed. `u16::MAX` asks for the widest slice.
pub fn run_slice(ctx: &mut Context, cycle_budget: u16) -> u16 {
    let timing = ctx.timing;
    let cycles = if cycle_budget == u16::MAX { timing.max_slice_cycles() } else { cycle_budget };

    if cycles < timing.min_slice_cycles() {
        warn!(
            "slice of {} cycles cannot hold the {} cycle overhead plus one instruction",
            cycles,
            timing.min_slice_cycles()
        );
        return 0;
    }

    let available = cycles - timing.slice_overhead;
    let parity = available % CYCLES_PER_TICK;
    let mut budget = TickBudget::new((available / CYCLES_PER_TICK).min(timing.max_slice_ticks));

    loop {
        let before = budget.remaining();
        let exit = match ctx.interpreter {
            Interpreter::Vcpu => vcpu::run(ctx, &mut budget),
            Interpreter::V6502(phase) => v6502::run(ctx, &mut budget, phase),
        };
        match exit {
            Exit::Exhausted => break,
            Exit::Switched if budget.remaining() == before => {
                debug!("interpreter switch made no progress, ending slice");
                break;
            }
            Exit::Switched => continue,
        }
    }

    ctx.poke(addr::V_TICKS, budget.countdown() as u8);
    timing.slice_overhead + parity + budget.used() * CYCLES_PER_TICK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_never_crosses_zero() {
        let mut b = TickBudget::new(10);
        assert!(b.fits(10));
        assert!(!b.fits(11));
        b.charge(7);
        assert_eq!(b.remaining(), 3);
        b.charge(9);
        assert_eq!(b.remaining(), 0);
        assert_eq!(b.used(), 10);
    }
}
