//! Single-level vertical-blank interrupt.
//!
//! The save area holds vPC, vAC and the interpreter selector. A handler
//! returns either with the RTI extended opcode or with a LUP into the
//! interrupt-return page of the ROM lookup space.

use log::{debug, warn};
use crate::context::{addr, page_sub, Context, Interpreter};
use crate::scheduler::TickBudget;
use crate::timing::CYCLES_PER_TICK;
use crate::vcpu::Flow;

/// Cycles the frame driver loses on the line where the handler is entered.
pub const ENTRY_CYCLES: u16 = 16;
pub const RETURN_TICKS: u16 = 32 / 2;

const SAVE_PC: u16 = addr::V_IRQ_SAVE;
const SAVE_AC: u16 = addr::V_IRQ_SAVE + 2;
const SAVE_SELECT: u16 = addr::V_IRQ_SAVE + 4;

/// Enters the handler at vIRQ if one is installed and none is running.
/// Returns the cycles spent.
pub fn poll(ctx: &mut Context) -> u16 {
    let vector = ctx.peek_word(addr::V_IRQ);
    if vector == 0 || ctx.irq_active {
        return 0;
    }

    let (pc, ac) = (ctx.vpc(), ctx.vac());
    ctx.poke_word(SAVE_PC, pc);
    ctx.poke_word(SAVE_AC, ac);
    ctx.poke(SAVE_SELECT, ctx.interpreter.selector());

    ctx.parked_task = ctx.sys_task.take();
    ctx.set_vpc(page_sub(vector, 2));
    ctx.set_interpreter(Interpreter::Vcpu);
    ctx.irq_active = true;
    debug!("entering interrupt handler at {:#06x} from {:#06x}", vector, pc);
    ENTRY_CYCLES
}

/// Restores the interrupted state. Defers, like a SYS call that does not
/// fit, when the slice cannot cover the return.
pub fn return_from_interrupt(ctx: &mut Context, budget: &TickBudget) -> Flow {
    let resumed = Interpreter::from_selector(ctx.peek(SAVE_SELECT));
    let ticks = match resumed {
        Interpreter::Vcpu => RETURN_TICKS,
        Interpreter::V6502(_) => RETURN_TICKS + ctx.timing.v6502_adjust.div_ceil(CYCLES_PER_TICK),
    };
    if !budget.fits(ticks) {
        return Flow::Defer;
    }
    if !ctx.irq_active {
        warn!("return from interrupt at {:#06x} with no handler active", ctx.vpc());
    }

    let (pc, ac) = (ctx.peek_word(SAVE_PC), ctx.peek_word(SAVE_AC));
    ctx.set_vpc(pc);
    ctx.set_vac(ac);
    ctx.sys_task = ctx.parked_task.take();
    ctx.irq_active = false;
    ctx.set_interpreter(resumed);

    match resumed {
        Interpreter::Vcpu => Flow::Spent(ticks),
        Interpreter::V6502(_) => Flow::Switch(ticks),
    }
}
