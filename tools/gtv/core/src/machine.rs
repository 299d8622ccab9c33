use alloc::boxed::Box;
use core::fmt::{Display, Formatter};
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rtrb::Consumer;
use crate::audio::{self, SampleQueue};
use crate::context::{addr, page_add, page_sub, Context, Interpreter, RamSize};
use crate::frame::{self, FrameDriver, LineReport, VideoMode, VideoSink};
use crate::gt1::{Gt1, Gt1Error};
use crate::input::{self, SerialLine, SteadyLine};
use crate::prefix::PREFIX;
use crate::rom::Rom;
use crate::sys::SysTable;
use crate::timing::{Timing, PIXELS_PER_LINE};

/// The extended opcode placed at vReset.
const RESET_OPCODE: u8 = 0x5c;

#[derive(Clone)]
pub struct Config {
    pub timing: Timing,
    pub ram: RamSize,
    /// Seeds the power-on RAM contents.
    pub seed: u64,
    /// Video mode 0..=3 at power-on.
    pub video_mode: u8,
    /// Samples the audio queue holds before it starts dropping.
    pub audio_capacity: usize,
    pub rom: Rom,
    pub sys_table: SysTable,
    /// Program started at power-on and by every soft reset.
    pub boot: Option<Gt1>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timing: Timing::default(),
            ram: RamSize::K32,
            seed: 0,
            video_mode: 3,
            audio_capacity: 4096,
            rom: Rom::new(),
            sys_table: SysTable::with_defaults(),
            boot: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The pixel burst does not fit in a line.
    LineTooShort { cycles: u16, needed: u16 },
    /// Some line hands the scheduler less than one instruction's worth.
    SliceTooSmall { cycles: u16, needed: u16 },
    /// Vertical blank needs a first line, a capture line and a last line.
    BlankTooShort { lines: u16 },
    VisibleRows(u16),
    VideoMode(u8),
    NoAudioQueue,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::LineTooShort { cycles, needed } => {
                write!(f, "a line of {} cycles cannot hold the {} cycles of sync and pixels", cycles, needed)
            }
            ConfigError::SliceTooSmall { cycles, needed } => {
                write!(f, "smallest slice is {} cycles, the interpreter needs at least {}", cycles, needed)
            }
            ConfigError::BlankTooShort { lines } => write!(f, "{} vertical blank lines are not enough", lines),
            ConfigError::VisibleRows(rows) => write!(f, "{} visible rows, expected 1 to 120", rows),
            ConfigError::VideoMode(mode) => write!(f, "no video mode {}", mode),
            ConfigError::NoAudioQueue => write!(f, "the audio queue needs room for at least one sample"),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        let needed = t.pixel_start + PIXELS_PER_LINE;
        if t.cycles_per_line < needed || t.h_pulse.1 > t.pixel_start {
            return Err(ConfigError::LineTooShort { cycles: t.cycles_per_line, needed });
        }
        let smallest = frame::smallest_slice(t).unwrap_or(0);
        if smallest < t.min_slice_cycles() {
            return Err(ConfigError::SliceTooSmall { cycles: smallest, needed: t.min_slice_cycles() });
        }
        if t.v_back < 2 || t.blank_lines() < 3 {
            return Err(ConfigError::BlankTooShort { lines: t.blank_lines() });
        }
        if t.visible_rows == 0 || t.visible_rows > 120 {
            return Err(ConfigError::VisibleRows(t.visible_rows));
        }
        if self.video_mode > 3 {
            return Err(ConfigError::VideoMode(self.video_mode));
        }
        if self.audio_capacity == 0 {
            return Err(ConfigError::NoAudioQueue);
        }
        Ok(())
    }
}

/// Totals for one frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub lines: u16,
    /// Cycles offered to the interpreters.
    pub offered: u32,
    /// Cycles they used.
    pub used: u32,
}

pub struct Machine {
    ctx: Context,
    driver: FrameDriver,
    serial: Box<dyn SerialLine>,
    audio: Option<Consumer<u8>>,
}

impl Machine {
    /// Powers the machine on: noisy RAM, system variables set up, and the
    /// boot program (if any) started.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let Config { timing, ram, seed, video_mode, audio_capacity, rom, sys_table, boot } = config;

        let mut ctx = Context::new(timing, ram, rom, sys_table);
        SmallRng::seed_from_u64(seed).fill_bytes(ctx.ram_mut());
        cold_boot(&mut ctx, VideoMode::from_number(video_mode));
        ctx.boot = boot;
        warm_boot(&mut ctx);

        let (queue, consumer) = SampleQueue::new(audio_capacity);
        info!(
            "powered on: {:?} RAM, {} lines of {} cycles, {:.2} frames per second",
            ram,
            timing.lines_per_frame(),
            timing.cycles_per_line,
            timing.frames_per_second()
        );

        Ok(Machine {
            driver: FrameDriver::new(&timing, queue),
            ctx,
            serial: Box::new(SteadyLine::default()),
            audio: Some(consumer),
        })
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Makes `gt1` the boot program and restarts into it.
    pub fn load_gt1(&mut self, gt1: Gt1) -> Result<(), Gt1Error> {
        gt1.check(&self.ctx)?;
        info!("loading GT1 image with {} segments, entry {:#06x}", gt1.segments.len(), gt1.exec);
        self.ctx.boot = Some(gt1);
        warm_boot(&mut self.ctx);
        Ok(())
    }

    /// Restarts the boot program without touching the video loop.
    pub fn soft_reset(&mut self) {
        warm_boot(&mut self.ctx);
    }

    /// The byte the controller port shows from now on.
    pub fn set_serial_input(&mut self, raw: u8) {
        self.serial = Box::new(SteadyLine(raw));
    }

    pub fn set_serial_line(&mut self, line: Box<dyn SerialLine>) {
        self.serial = line;
    }

    /// Hands out the audio consumer. Only the first call gets it.
    pub fn take_audio(&mut self) -> Option<Consumer<u8>> {
        self.audio.take()
    }

    /// LED and audio output register.
    pub fn xout(&self) -> u8 {
        self.ctx.peek(addr::XOUT)
    }

    pub fn run_line(&mut self, sink: &mut dyn VideoSink) -> LineReport {
        self.driver.run_line(&mut self.ctx, sink, self.serial.as_mut())
    }

    /// Runs lines until the current frame is complete.
    pub fn run_frame(&mut self, sink: &mut dyn VideoSink) -> FrameStats {
        let mut stats = FrameStats::default();
        loop {
            let report = self.run_line(sink);
            stats.lines += 1;
            stats.offered += report.budget as u32;
            stats.used += report.used as u32;
            if report.frame_done {
                return stats;
            }
        }
    }
}

/// Power-on setup of everything a soft reset leaves alone.
fn cold_boot(ctx: &mut Context, mode: VideoMode) {
    let timing = ctx.timing;
    ctx.poke(addr::ZERO_CONST, 0);
    ctx.poke(addr::ONE_CONST, 1);
    ctx.poke(addr::MEM_SIZE, ctx.ram_size().pages());
    ctx.poke(addr::FRAME_COUNT, 0);

    frame::init_video_table(ctx, timing.visible_rows);
    mode.store(ctx);
    audio::init_waveforms(ctx);

    ctx.poke(addr::SERIAL_RAW, 0xff);
    ctx.poke(addr::SERIAL_LAST, 0xff);
    ctx.poke(addr::BUTTON_STATE, 0xff);
    ctx.poke(addr::RESET_TIMER, input::RESET_HOLD_FRAMES);

    ctx.poke(addr::LED_STATE, 0x0f);
    ctx.poke(addr::LED_TEMPO, 3);
    ctx.poke(addr::XOUT, 0x0f);
    ctx.poke(addr::XOUT_MASK, 0x0f);

    ctx.poke(addr::V_RESET, PREFIX);
    ctx.poke(addr::V_RESET + 1, RESET_OPCODE);
}

/// Soft reset: puts the system variables back, silences the sound, and
/// reinstalls and restarts the boot program. Without one the vCPU idles in
/// a loop at 0x0200.
pub fn warm_boot(ctx: &mut Context) {
    ctx.set_vsp(0);
    ctx.set_vlr(0);
    ctx.poke(addr::VIDEO_TOP, 0);
    ctx.poke_word(addr::V_IRQ, 0);
    ctx.poke(addr::SOUND_TIMER, 0);
    audio::reset_channels(ctx);

    ctx.irq_active = false;
    ctx.sys_task = None;
    ctx.parked_task = None;
    ctx.out_latch = None;

    let mut mode = ctx.video_mode;
    mode.set_zombie(false);
    mode.store(ctx);
    ctx.set_interpreter(Interpreter::Vcpu);

    match ctx.boot.take() {
        Some(boot) => {
            if let Err(e) = boot.load(ctx) {
                warn!("boot program not loaded: {}", e);
            }
            ctx.boot = Some(boot);
        }
        None => {
            let at = addr::USER_CODE;
            ctx.poke(at, 0x90);
            ctx.poke(at + 1, (at as u8).wrapping_sub(2));
            ctx.set_vpc(page_sub(at, 2));
        }
    }
    debug!("warm boot, vCPU continues at {:#06x}", page_add(ctx.vpc(), 2));
}
