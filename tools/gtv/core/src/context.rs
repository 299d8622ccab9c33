use alloc::boxed::Box;
use alloc::vec;
use core::fmt::{Debug, Formatter};
use log::debug;
use crate::frame::VideoMode;
use crate::gt1::Gt1;
use crate::rom::Rom;
use crate::sys::{SysTable, SysTask};
use crate::timing::Timing;

/// Canonical RAM locations. Programs address these as plain memory, so the
/// register file lives here and nowhere else.
pub mod addr {
    pub const ZERO_CONST: u16 = 0x00;
    pub const MEM_SIZE: u16 = 0x01;
    pub const CHANNEL: u16 = 0x02;
    pub const SAMPLE: u16 = 0x03;
    pub const V_CPU_SELECT: u16 = 0x05;
    pub const ENTROPY: u16 = 0x06;
    pub const VIDEO_Y: u16 = 0x09;
    pub const VIDEO_MODE_B: u16 = 0x0a;
    pub const VIDEO_MODE_C: u16 = 0x0b;
    pub const VIDEO_MODE_D: u16 = 0x0c;
    pub const NEXT_VIDEO: u16 = 0x0d;
    pub const FRAME_COUNT: u16 = 0x0e;
    pub const SERIAL_RAW: u16 = 0x0f;
    pub const SERIAL_LAST: u16 = 0x10;
    pub const BUTTON_STATE: u16 = 0x11;
    pub const RESET_TIMER: u16 = 0x12;
    pub const XOUT: u16 = 0x13;
    pub const XOUT_MASK: u16 = 0x14;
    pub const V_TICKS: u16 = 0x15;
    pub const V_PC: u16 = 0x16;
    pub const V_AC: u16 = 0x18;
    pub const V_LR: u16 = 0x1a;
    pub const V_SP: u16 = 0x1c;
    pub const V_TMP: u16 = 0x1d;
    pub const V_RETURN: u16 = 0x1e;
    pub const FRAME_X: u16 = 0x1f;
    pub const FRAME_Y: u16 = 0x20;
    pub const CHANNEL_MASK: u16 = 0x21;
    pub const SYS_FN: u16 = 0x22;
    pub const SYS_ARGS: u16 = 0x24;
    pub const SOUND_TIMER: u16 = 0x2c;
    pub const LED_STATE: u16 = 0x2e;
    pub const LED_TEMPO: u16 = 0x2f;
    pub const V_IRQ_SAVE: u16 = 0x30;
    pub const ONE_CONST: u16 = 0x80;

    pub const VIDEO_TABLE: u16 = 0x0100;
    pub const V_RESET: u16 = 0x01f0;
    pub const LED_TIMER: u16 = 0x01f2;
    pub const ENTROPY2: u16 = 0x01f3;
    pub const V_IRQ: u16 = 0x01f6;
    pub const CTRL_BITS: u16 = 0x01f8;
    pub const VIDEO_TOP: u16 = 0x01f9;

    pub const USER_CODE: u16 = 0x0200;
    pub const SOUND_TABLE: u16 = 0x0700;
    pub const SCREEN: u16 = 0x0800;
}

/// Adds to the low byte of an address without carrying into the page.
#[inline(always)]
pub fn page_add(address: u16, delta: u8) -> u16 {
    (address & 0xff00) | (address as u8).wrapping_add(delta) as u16
}

/// Subtracts from the low byte of an address without borrowing from the page.
#[inline(always)]
pub fn page_sub(address: u16, delta: u8) -> u16 {
    (address & 0xff00) | (address as u8).wrapping_sub(delta) as u16
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmuPhase {
    /// Next step is fetching and decoding an opcode.
    Fetch,
    /// Operands are resolved; the opcode in IR still has to execute.
    Execute,
}

/// Which instruction set the next slice runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interpreter {
    Vcpu,
    V6502(EmuPhase),
}

impl Interpreter {
    /// The byte stored in `vCpuSelect` and in the interrupt save area.
    pub fn selector(self) -> u8 {
        match self {
            Interpreter::Vcpu => 0x02,
            Interpreter::V6502(EmuPhase::Fetch) => 0x0d,
            Interpreter::V6502(EmuPhase::Execute) => 0x10,
        }
    }

    pub fn from_selector(byte: u8) -> Self {
        match byte {
            0x0d => Interpreter::V6502(EmuPhase::Fetch),
            0x10 => Interpreter::V6502(EmuPhase::Execute),
            0x02 => Interpreter::Vcpu,
            other => {
                debug!("unknown interpreter selector {:#04x}, falling back to vCPU", other);
                Interpreter::Vcpu
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RamSize {
    K32,
    K64,
}

impl RamSize {
    pub fn mask(self) -> u16 {
        match self {
            RamSize::K32 => 0x7fff,
            RamSize::K64 => 0xffff,
        }
    }

    /// Value of the `memSize` byte: number of pages, 0 meaning 256.
    pub fn pages(self) -> u8 {
        match self {
            RamSize::K32 => 0x80,
            RamSize::K64 => 0x00,
        }
    }
}

/// The execution context shared by every part of the core.
pub struct Context {
    ram: Box<[u8]>,
    ram_mask: u16,

    pub rom: Rom,
    pub sys_table: SysTable,
    pub timing: Timing,

    pub interpreter: Interpreter,
    pub sys_task: Option<SysTask>,
    /// Continuation put aside while an interrupt handler runs.
    pub parked_task: Option<SysTask>,
    pub irq_active: bool,

    /// Level on the input port for the scanline being generated.
    pub in_port: u8,
    /// Last value written to the output port by a program, if any.
    pub out_latch: Option<u8>,
    pub video_mode: VideoMode,

    /// Program reinstalled by a soft reset.
    pub boot: Option<Gt1>,
}

impl Context {
    pub fn new(timing: Timing, ram_size: RamSize, rom: Rom, sys_table: SysTable) -> Self {
        Context {
            ram: vec![0u8; 0x10000].into_boxed_slice(),
            ram_mask: ram_size.mask(),
            rom,
            sys_table,
            timing,
            interpreter: Interpreter::Vcpu,
            sys_task: None,
            parked_task: None,
            irq_active: false,
            in_port: 0xff,
            out_latch: None,
            video_mode: VideoMode::default(),
            boot: None,
        }
    }

    pub fn ram_size(&self) -> RamSize {
        if self.ram_mask == 0x7fff { RamSize::K32 } else { RamSize::K64 }
    }

    #[inline(always)]
    pub fn peek(&self, address: u16) -> u8 {
        self.ram[(address & self.ram_mask) as usize]
    }

    #[inline(always)]
    pub fn poke(&mut self, address: u16, value: u8) {
        self.ram[(address & self.ram_mask) as usize] = value;
    }

    /// Little-endian word; the high byte comes from the same page.
    #[inline(always)]
    pub fn peek_word(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.peek(address), self.peek(page_add(address, 1))])
    }

    #[inline(always)]
    pub fn poke_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.poke(address, lo);
        self.poke(page_add(address, 1), hi);
    }

    /// Raw view of all 64K, including the mirrored half on 32K machines.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn page(&self, page: u8) -> &[u8] {
        let start = ((page as u16) << 8 & self.ram_mask) as usize;
        &self.ram[start..start + 256]
    }

    // Register file.

    #[inline(always)]
    pub fn vpc(&self) -> u16 { self.peek_word(addr::V_PC) }
    #[inline(always)]
    pub fn set_vpc(&mut self, v: u16) { self.poke_word(addr::V_PC, v) }

    #[inline(always)]
    pub fn vac(&self) -> u16 { self.peek_word(addr::V_AC) }
    #[inline(always)]
    pub fn set_vac(&mut self, v: u16) { self.poke_word(addr::V_AC, v) }

    #[inline(always)]
    pub fn vlr(&self) -> u16 { self.peek_word(addr::V_LR) }
    #[inline(always)]
    pub fn set_vlr(&mut self, v: u16) { self.poke_word(addr::V_LR, v) }

    #[inline(always)]
    pub fn vsp(&self) -> u8 { self.peek(addr::V_SP) }
    #[inline(always)]
    pub fn set_vsp(&mut self, v: u8) { self.poke(addr::V_SP, v) }

    #[inline(always)]
    pub fn vtmp(&self) -> u8 { self.peek(addr::V_TMP) }
    #[inline(always)]
    pub fn set_vtmp(&mut self, v: u8) { self.poke(addr::V_TMP, v) }

    #[inline(always)]
    pub fn sys_fn(&self) -> u16 { self.peek_word(addr::SYS_FN) }
    #[inline(always)]
    pub fn set_sys_fn(&mut self, v: u16) { self.poke_word(addr::SYS_FN, v) }

    #[inline(always)]
    pub fn sys_arg(&self, i: u8) -> u8 { self.peek(addr::SYS_ARGS + (i & 7) as u16) }
    #[inline(always)]
    pub fn set_sys_arg(&mut self, i: u8, v: u8) { self.poke(addr::SYS_ARGS + (i & 7) as u16, v) }

    /// Word made of sysArgs[i] and sysArgs[i + 1].
    #[inline(always)]
    pub fn sys_word(&self, i: u8) -> u16 {
        u16::from_le_bytes([self.sys_arg(i), self.sys_arg(i + 1)])
    }

    #[inline(always)]
    pub fn set_sys_word(&mut self, i: u8, v: u16) {
        let [lo, hi] = v.to_le_bytes();
        self.set_sys_arg(i, lo);
        self.set_sys_arg(i + 1, hi);
    }

    #[inline(always)]
    pub fn video_y(&self) -> u8 { self.peek(addr::VIDEO_Y) }

    #[inline(always)]
    pub fn frame_count(&self) -> u8 { self.peek(addr::FRAME_COUNT) }

    /// Switches the active interpreter, mirrored into `vCpuSelect`.
    pub fn set_interpreter(&mut self, interpreter: Interpreter) {
        if self.interpreter != interpreter {
            debug!("interpreter {:?} -> {:?}", self.interpreter, interpreter);
        }
        self.interpreter = interpreter;
        self.poke(addr::V_CPU_SELECT, interpreter.selector());
    }

    pub fn take_out_latch(&mut self) -> Option<u8> {
        self.out_latch.take()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("vPC", &self.vpc())
            .field("vAC", &self.vac())
            .field("vLR", &self.vlr())
            .field("vSP", &self.vsp())
            .field("interpreter", &self.interpreter)
            .field("sys_task", &self.sys_task)
            .field("irq_active", &self.irq_active)
            .finish()
    }
}
