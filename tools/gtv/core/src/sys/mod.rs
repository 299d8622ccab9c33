//! Native routines reachable from the SYS instruction.
//!
//! A SYS operand carries minus the extra ticks the routine may need on top
//! of the base cost. The call only starts when the whole declared cost fits
//! the slice; otherwise the instruction is retried next slice. Routines that
//! cannot finish in one go return `SysResult::Again`, which keeps the program
//! counter on the SYS and parks their private state in `Context::sys_task`.

use core::fmt::{Debug, Formatter};
use heapless::FnvIndexMap;
use log::{debug, warn};
use crate::context::Context;
use crate::scheduler::TickBudget;
use crate::vcpu::Flow;

pub mod arith;
pub mod memory;
pub mod control;

/// Ticks charged by SYS itself, before any extra declared by the operand.
pub const BASE_TICKS: u16 = 28 / 2;
/// Cost of calling a slot that has no routine behind it.
pub const PLACEHOLDER_TICKS: u16 = 20 / 2;

pub const SLOTS: usize = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SysResult {
    Done(u16),
    /// Charge the ticks and run the same SYS again with this state.
    Again(u16, TaskState),
    /// Charge the ticks; the routine changed the active interpreter.
    Switch(u16),
}

/// Private state a multi-slice routine carries between invocations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Progress lives entirely in registers and sysArgs.
    Restart,
    Multiply(arith::Multiply),
    Divide(arith::Divide),
    /// A stream is being read; the phase is kept in sysArgs[7].
    Streaming,
}

/// A suspended multi-slice routine and the instruction it belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SysTask {
    pub pc: u16,
    /// `sysFn` for SYS routines, `0x35xx` for extended opcodes.
    pub owner: u16,
    pub state: TaskState,
}

/// Takes the continuation for (`pc`, `owner`) if there is one. A
/// continuation for any other instruction is stale and dropped.
pub fn resume(ctx: &mut Context, pc: u16, owner: u16) -> Option<TaskState> {
    match ctx.sys_task.take() {
        Some(task) if task.pc == pc && task.owner == owner => Some(task.state),
        Some(stale) => {
            debug!("dropping stale continuation {:?}", stale);
            None
        }
        None => None,
    }
}

pub fn suspend(ctx: &mut Context, pc: u16, owner: u16, state: TaskState) {
    ctx.sys_task = Some(SysTask { pc, owner, state });
}

pub type SysRoutine = fn(&mut Context, Option<TaskState>) -> SysResult;

#[derive(Copy, Clone)]
pub struct SysEntry {
    pub name: &'static str,
    /// Cycles the routine is published with, as in its name.
    pub cycles: u16,
    pub routine: SysRoutine,
}

impl SysEntry {
    pub const fn new(name: &'static str, cycles: u16, routine: SysRoutine) -> Self {
        SysEntry { name, cycles, routine }
    }

    /// The operand a program should pass to SYS for this routine.
    pub fn operand(&self) -> u8 {
        let extra = (self.cycles.saturating_sub(BASE_TICKS * 2) / 2).min(128) as u8;
        extra.wrapping_neg()
    }
}

impl Debug for SysEntry {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        f.debug_struct("SysEntry")
            .field("name", &self.name)
            .field("cycles", &self.cycles)
            .finish()
    }
}

/// Rewritable map from slot address to routine.
#[derive(Clone, Debug)]
pub struct SysTable {
    slots: FnvIndexMap<u16, SysEntry, SLOTS>,
}

impl SysTable {
    pub fn empty() -> Self {
        SysTable { slots: FnvIndexMap::new() }
    }

    pub fn with_defaults() -> Self {
        let mut table = SysTable::empty();
        for (address, entry) in DEFAULT_SLOTS {
            if table.register(*address, *entry).is_err() {
                warn!("no room for {} at {:#06x}", entry.name, address);
            }
        }
        table
    }

    /// Installs `entry` at `address`, returning what was there before. Fails
    /// with the entry when the table is full.
    pub fn register(&mut self, address: u16, entry: SysEntry) -> Result<Option<SysEntry>, SysEntry> {
        self.slots.insert(address, entry).map_err(|(_, entry)| entry)
    }

    pub fn remove(&mut self, address: u16) -> Option<SysEntry> {
        self.slots.remove(&address)
    }

    pub fn get(&self, address: u16) -> Option<&SysEntry> {
        self.slots.get(&address)
    }

    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.slots.iter().find(|(_, e)| e.name == name).map(|(a, _)| *a)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u16, &SysEntry)> {
        self.slots.iter()
    }
}

impl Default for SysTable {
    fn default() -> Self {
        SysTable::with_defaults()
    }
}

/// Extra ticks a SYS operand asks for. Positive operands ask for nothing.
#[inline(always)]
pub fn extra_ticks(operand: u8) -> u16 {
    let signed = operand as i8;
    if signed < 0 { signed.unsigned_abs() as u16 } else { 0 }
}

/// The SYS instruction.
pub fn dispatch(ctx: &mut Context, operand: u8, budget: &TickBudget) -> Flow {
    let declared = BASE_TICKS + extra_ticks(operand);
    if !budget.fits(declared) {
        return Flow::Defer;
    }

    let pc = ctx.vpc();
    let address = ctx.sys_fn();
    let resumed = resume(ctx, pc, address);

    let Some(entry) = ctx.sys_table.get(address).copied() else {
        debug!("SYS to empty slot {:#06x}", address);
        return Flow::Spent(PLACEHOLDER_TICKS);
    };

    let clamp = |ticks: u16| {
        if ticks > declared {
            warn!(
                "{} took {} ticks but the call declared {}; clamping",
                entry.name, ticks, declared
            );
            declared
        } else {
            ticks
        }
    };

    match (entry.routine)(ctx, resumed) {
        SysResult::Done(ticks) => Flow::Spent(clamp(ticks)),
        SysResult::Again(ticks, state) => {
            suspend(ctx, pc, address, state);
            Flow::Repeat(clamp(ticks))
        }
        SysResult::Switch(ticks) => Flow::Switch(clamp(ticks)),
    }
}

macro_rules! slot {
    ($addr:expr, $name:expr, $cycles:expr, $routine:path) => {
        ($addr, SysEntry::new($name, $cycles, $routine))
    };
}

/// Default slot layout. Programs find routines through these addresses.
pub static DEFAULT_SLOTS: &[(u16, SysEntry)] = &[
    slot!(0x0088, "SYS_Reset_88", 88, control::reset),
    slot!(0x009e, "SYS_Multiply_s16_v6_66", 66, arith::multiply_s16),
    slot!(0x00a1, "SYS_Divide_u16_v6_80", 80, arith::divide_u16),
    slot!(0x00ad, "SYS_Exec_88", 88, control::exec),
    slot!(0x00e6, "SYS_ScanMemory_v6_50", 50, memory::scan_memory),
    slot!(0x00e9, "SYS_CopyMemory_v6_80", 80, memory::copy_memory),
    slot!(0x00ef, "SYS_Out_22", 22, control::out),
    slot!(0x00f2, "SYS_In_24", 24, control::input),
    slot!(0x04a7, "SYS_Random_34", 34, control::random),
    slot!(0x04b9, "SYS_LSRW7_30", 30, arith::lsrw7),
    slot!(0x04c6, "SYS_LSRW8_24", 24, arith::lsrw8),
    slot!(0x04cd, "SYS_LSLW8_24", 24, arith::lslw8),
    slot!(0x04d4, "SYS_Draw4_30", 30, memory::draw4),
    slot!(0x04e1, "SYS_VDrawBits_134", 134, memory::vdraw_bits),
    slot!(0x0600, "SYS_LSRW1_48", 48, arith::lsrw1),
    slot!(0x0619, "SYS_LSRW2_52", 52, arith::lsrw2),
    slot!(0x0636, "SYS_LSRW3_52", 52, arith::lsrw3),
    slot!(0x0652, "SYS_LSRW4_50", 50, arith::lsrw4),
    slot!(0x066d, "SYS_LSRW5_50", 50, arith::lsrw5),
    slot!(0x0687, "SYS_LSRW6_48", 48, arith::lsrw6),
    slot!(0x06a0, "SYS_LSLW4_46", 46, arith::lslw4),
    slot!(0x06c0, "SYS_Read3_40", 40, memory::read3),
    slot!(0x06e7, "SYS_Unpack_56", 56, memory::unpack),
    slot!(0x0b00, "SYS_SetMode_v2_80", 80, control::set_mode),
    slot!(0x0b03, "SYS_SetMemory_v2_54", 54, memory::set_memory),
    slot!(0x0b0c, "SYS_Run6502_v4_80", 80, control::run6502),
    slot!(0x0b0f, "SYS_ResetWaveforms_v4_50", 50, control::reset_waveforms),
    slot!(0x0b12, "SYS_ShuffleNoise_v4_46", 46, control::shuffle_noise),
    slot!(0x0b18, "SYS_ReceiveSerial1_v6_32", 32, control::receive_serial1),
    slot!(0x0c00, "SYS_Sprite6_v3_64", 64, memory::sprite6),
    slot!(0x0c40, "SYS_Sprite6x_v3_64", 64, memory::sprite6x),
    slot!(0x0c80, "SYS_Sprite6y_v3_64", 64, memory::sprite6y),
    slot!(0x0cc0, "SYS_Sprite6xy_v3_64", 64, memory::sprite6xy),
];
