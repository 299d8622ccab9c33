//! Routines that reach outside plain memory: I/O ports, video mode, sound
//! tables, the second interpreter, program loading and reset.

use log::debug;
use crate::audio;
use crate::context::{addr, page_add, page_sub, Context, EmuPhase, Interpreter};
use crate::entropy::EntropyPool;
use crate::frame::VideoMode;
use crate::machine;
use crate::sys::{SysResult, TaskState};

/// Puts sysArgs[0] on the output port.
pub fn out(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    ctx.out_latch = Some(ctx.sys_arg(0));
    SysResult::Done(22 / 2)
}

/// Reads the input port into vAC.
pub fn input(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    ctx.set_vac(ctx.in_port as u16);
    SysResult::Done(24 / 2)
}

/// Runs the entropy mixer once with the slice's tick counter as input and
/// returns the pool in vAC.
pub fn random(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let ticks = ctx.peek(addr::V_TICKS);
    let word = EntropyPool::new(ctx).mix(ticks);
    ctx.set_vac(word);
    SysResult::Done(34 / 2)
}

pub const ZOMBIE: u16 = 1975;

/// vAC 0..=3 selects a video mode, 1975 stops all signal generation, and
/// anything else only brings the signals back.
pub fn set_mode(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let request = ctx.vac();
    let mut mode = ctx.video_mode;
    mode.set_zombie(false);

    let ticks = if request >> 8 == 0 {
        mode = VideoMode::from_number(request as u8 & 3);
        50 / 2
    } else {
        if request == ZOMBIE {
            mode.set_zombie(true);
        }
        34 / 2
    };

    mode.store(ctx);
    SysResult::Done(ticks)
}

/// Hands the rest of the slice to the v6502, starting at vLR.
pub fn run6502(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    ctx.set_interpreter(Interpreter::V6502(EmuPhase::Fetch));
    SysResult::Switch(22 / 2)
}

/// Writes the four waveforms for index vAC.lo and steps vAC.lo, until all
/// 64 entries are done.
pub fn reset_waveforms(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let i = ctx.peek(addr::V_AC);
    let entry = audio::waveform_entry(i & 63);
    let at = addr::SOUND_TABLE + 4 * (i & 63) as u16;
    for (k, v) in entry.iter().enumerate() {
        ctx.poke(at + k as u16, *v);
    }

    let next = i.wrapping_add(1);
    ctx.poke(addr::V_AC, next);
    if next == 64 {
        SysResult::Done(50 / 2)
    } else {
        SysResult::Again(50 / 2, TaskState::Restart)
    }
}

/// One swap of a 6-bit RC4-style shuffle over the noise waveform.
/// vAC.lo holds 4j, vAC.hi holds 4i; runs until i wraps around.
pub fn shuffle_noise(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let [j4, i4] = ctx.vac().to_le_bytes();
    let tj = addr::SOUND_TABLE + j4 as u16;
    let ti = addr::SOUND_TABLE + i4 as u16;

    let tmp = ctx.peek(tj);
    let vi = ctx.peek(ti);
    ctx.poke(tj, vi);
    ctx.poke(ti, tmp);

    let j4 = j4.wrapping_add(vi.wrapping_mul(4));
    let i4 = i4.wrapping_add(4);
    ctx.set_vac(u16::from_le_bytes([j4, i4]));

    if i4 == 0 {
        SysResult::Done(44 / 2)
    } else {
        SysResult::Again(44 / 2, TaskState::Restart)
    }
}

/// Waits for videoY to reach sysArgs[3], then stores the input byte at
/// sysArgs[0:1], adds it to the checksum in sysArgs[2] and steps the address.
pub fn receive_serial1(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    if ctx.video_y() != ctx.sys_arg(3) {
        return SysResult::Again(28 / 2, TaskState::Restart);
    }
    let byte = ctx.in_port;
    let at = ctx.sys_word(0);
    ctx.poke(at, byte);
    ctx.set_sys_arg(2, ctx.sys_arg(2).wrapping_add(byte));
    ctx.set_sys_arg(0, (at as u8).wrapping_add(1));
    SysResult::Done(32 / 2)
}

/// Phases of a GT1 stream, kept in sysArgs[7] between invocations.
mod phase {
    pub const FIRST_SEGMENT: u8 = 0;
    pub const SEGMENT: u8 = 1;
    pub const ADDRESS_LOW: u8 = 2;
    pub const LENGTH: u8 = 3;
    pub const DATA: u8 = 4;
    pub const EXEC_HIGH: u8 = 5;
    pub const EXEC_LOW: u8 = 6;
}

const EXEC_BYTES_PER_CALL: usize = 24;
const EXEC_TICKS: u16 = 88 / 2;

/// Loads a GT1 stream from the ROM lookup space at sysArgs[0:1].
///
/// Segment bytes go through sysArgs[2:3] (RAM pointer) and sysArgs[4]
/// (count). Afterwards the vCPU continues at vLR, or at the stream's
/// execution address when vLR is zero.
pub fn exec(ctx: &mut Context, state: Option<TaskState>) -> SysResult {
    let mut phase = match state {
        Some(TaskState::Streaming) => ctx.sys_arg(7),
        _ => phase::FIRST_SEGMENT,
    };

    for _ in 0..EXEC_BYTES_PER_CALL {
        let rom = ctx.sys_word(0);
        let byte = ctx.rom.byte(rom);
        ctx.set_sys_word(0, rom.wrapping_add(1));

        phase = match phase {
            phase::SEGMENT if byte == 0 => phase::EXEC_HIGH,
            phase::FIRST_SEGMENT | phase::SEGMENT => {
                ctx.set_sys_arg(3, byte);
                phase::ADDRESS_LOW
            }
            phase::ADDRESS_LOW => {
                ctx.set_sys_arg(2, byte);
                phase::LENGTH
            }
            phase::LENGTH => {
                ctx.set_sys_arg(4, byte);
                phase::DATA
            }
            phase::DATA => {
                let at = ctx.sys_word(2);
                ctx.poke(at, byte);
                ctx.set_sys_word(2, page_add(at, 1));
                let left = ctx.sys_arg(4).wrapping_sub(1);
                ctx.set_sys_arg(4, left);
                if left == 0 { phase::SEGMENT } else { phase::DATA }
            }
            phase::EXEC_HIGH => {
                ctx.set_sys_arg(3, byte);
                phase::EXEC_LOW
            }
            _ => {
                ctx.set_sys_arg(2, byte);
                let entry = ctx.sys_word(2);
                if ctx.vlr() == 0 {
                    ctx.set_vlr(entry);
                }
                let lr = ctx.vlr();
                ctx.set_vpc(page_sub(lr, 2));
                debug!("SYS_Exec done, continuing at {:#06x}", lr);
                return SysResult::Done(EXEC_TICKS);
            }
        };
    }

    ctx.set_sys_arg(7, phase);
    SysResult::Again(EXEC_TICKS, TaskState::Streaming)
}

/// Soft reset: reinitialises the system variables and restarts the boot
/// program.
pub fn reset(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    machine::warm_boot(ctx);
    SysResult::Done(88 / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::tests::{calling, run_to_completion};

    #[test]
    fn exec_streams_a_program_from_rom() {
        let mut ctx = calling("SYS_Exec_88");
        let mut stream = alloc::vec::Vec::new();
        stream.extend_from_slice(&[0x30, 0x00, 40]);
        stream.extend((0..40).map(|i| i as u8 + 1));
        stream.extend_from_slice(&[0x31, 0x80, 0]);
        stream.extend((0..256).map(|i| i as u8));
        // BRA to itself
        stream.extend_from_slice(&[0x50, 0x00, 2, 0x90, 0xfe]);
        stream.extend_from_slice(&[0x00, 0x50, 0x00]);
        ctx.rom.place(0x2000, &stream).unwrap();
        ctx.set_sys_word(0, 0x2000);
        ctx.set_vlr(0);

        let mut slices = 0;
        while ctx.vpc() == page_sub(0x0200, 2) && slices < 100 {
            let mut budget = crate::scheduler::TickBudget::new(60);
            crate::vcpu::run(&mut ctx, &mut budget);
            slices += 1;
        }
        assert!(slices > 1);
        assert_eq!(ctx.peek(0x3000), 1);
        assert_eq!(ctx.peek(0x3027), 40);
        // a 256-byte segment wraps inside its page
        assert_eq!(ctx.peek(0x3180), 0);
        assert_eq!(ctx.peek(0x317f), 255);
        assert_eq!(ctx.vlr(), 0x5000);
        assert_eq!(ctx.vpc(), 0x50fe);
    }

    #[test]
    fn set_mode_and_zombie() {
        let mut ctx = calling("SYS_SetMode_v2_80");
        ctx.set_vac(2);
        run_to_completion(&mut ctx, 60);
        assert!(!ctx.video_mode.b() && ctx.video_mode.c() && !ctx.video_mode.d());

        let mut ctx = calling("SYS_SetMode_v2_80");
        ctx.set_vac(ZOMBIE);
        run_to_completion(&mut ctx, 60);
        assert!(ctx.video_mode.zombie());
    }

    #[test]
    fn waveforms_are_written_in_64_calls() {
        let mut ctx = calling("SYS_ResetWaveforms_v4_50");
        ctx.set_vac(0);
        run_to_completion(&mut ctx, 30);
        assert_eq!(ctx.peek(addr::SOUND_TABLE + 4 * 40 + 1), 127 - 80);
        assert_eq!(ctx.peek(addr::SOUND_TABLE + 4 * 40 + 2), 63);
        assert_eq!(ctx.peek(addr::SOUND_TABLE + 4 * 40 + 3), 40);
    }

    #[test]
    fn receive_waits_for_its_scanline() {
        let mut ctx = calling("SYS_ReceiveSerial1_v6_32");
        ctx.set_sys_word(0, 0x4000);
        ctx.set_sys_arg(2, 0);
        ctx.set_sys_arg(3, 6);
        ctx.in_port = 0x5a;
        ctx.poke(addr::VIDEO_Y, 2);

        let mut budget = crate::scheduler::TickBudget::new(40);
        crate::vcpu::run(&mut ctx, &mut budget);
        assert_eq!(ctx.peek(0x4000), 0);

        ctx.poke(addr::VIDEO_Y, 6);
        let mut budget = crate::scheduler::TickBudget::new(40);
        crate::vcpu::run(&mut ctx, &mut budget);
        assert_eq!(ctx.peek(0x4000), 0x5a);
        assert_eq!(ctx.sys_arg(2), 0x5a);
        assert_eq!(ctx.sys_arg(0), 0x01);
    }
}
