//! The video loop.
//!
//! Every scanline starts with the horizontal pulse and one audio channel
//! update, then either streams 160 pixels or hands the rest of the line to
//! the scheduler. The first 41 lines of a frame are vertical blank and carry
//! the per-frame housekeeping; the remaining 480 show 120 pixel rows, each
//! repeated over four sub-lines A, B, C and D.

use alloc::vec;
use alloc::vec::Vec;
use bitfield::bitfield;
use bytemuck::{Pod, Zeroable};
use log::debug;
use crate::audio::{self, SampleQueue};
use crate::context::{addr, Context};
use crate::entropy::EntropyPool;
use crate::input::{self, Button, Buttons, SerialLine};
use crate::{interrupt, machine};
use crate::scheduler;
use crate::timing::{Timing, PIXELS_PER_LINE};

/// Sync bits of the output byte, both active low.
pub mod sync {
    pub const H: u8 = 0x40;
    pub const V: u8 = 0x80;
    pub const IDLE: u8 = H | V;
}

/// Cycle positions inside a line, counted from the start of the horizontal
/// front porch.
mod cycle {
    pub const BLANK_SLICE: u16 = 51;
    pub const BLANK_SAMPLE_SLICE: u16 = 55;
    pub const FIRST_SLICE: u16 = 79;
    /// Channel mask and sound timer upkeep after the first slice.
    pub const FIRST_TAIL: u16 = 9;
    pub const LAST_SLICE: u16 = 70;
    /// Frame pointer reset after the last slice.
    pub const LAST_TAIL: u16 = 10;
    pub const SELECT: u16 = 10;
    pub const BLACK_SLICE: u16 = 38;
}

bitfield! {
    /// Which of the B, C and D sub-lines carry pixels. Sub-line A always
    /// does. A zombie machine generates no signals at all and only runs
    /// the interpreter.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct VideoMode(u8);
    impl Debug;
    pub b, set_b: 0;
    pub c, set_c: 1;
    pub d, set_d: 2;
    pub zombie, set_zombie: 7;
}

const PIXELS: u8 = 0xff;
const NO_PIXELS: u8 = 0x00;

impl VideoMode {
    /// Mode 0 shows every sub-line, mode 3 only A.
    pub fn from_number(n: u8) -> Self {
        let mut mode = VideoMode(0);
        match n & 3 {
            0 => {
                mode.set_b(true);
                mode.set_c(true);
                mode.set_d(true);
            }
            1 => {
                mode.set_b(true);
                mode.set_c(true);
            }
            2 => mode.set_c(true),
            _ => {}
        }
        mode
    }

    pub fn number(&self) -> u8 {
        match (self.b(), self.c(), self.d()) {
            (_, _, true) => 0,
            (true, _, false) => 1,
            (false, true, false) => 2,
            _ => 3,
        }
    }

    /// The mode Select switches to: 0 → 1 → 2 → 3 → 0.
    pub fn cycled(&self) -> Self {
        VideoMode::from_number(self.number() + 1)
    }

    /// Installs the mode and mirrors it into the videoMode bytes.
    pub fn store(self, ctx: &mut Context) {
        ctx.video_mode = self;
        let flag = |on: bool| if on { PIXELS } else { NO_PIXELS };
        ctx.poke(addr::VIDEO_MODE_B, flag(self.b()));
        ctx.poke(addr::VIDEO_MODE_C, flag(self.c()));
        ctx.poke(addr::VIDEO_MODE_D, flag(self.d()));
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        VideoMode::from_number(3)
    }
}

/// One row of the video table at 0x0100: the RAM page the row is read
/// from and its horizontal offset relative to the row above.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct VideoTableEntry {
    pub page: u8,
    pub dx: u8,
}

impl VideoTableEntry {
    /// The entry at byte offset `y`, read the way the loop reads it: two
    /// bytes in page 1, wrapping in the page.
    pub fn at(ctx: &Context, y: u8) -> Self {
        let bytes = [
            ctx.peek(addr::VIDEO_TABLE | y as u16),
            ctx.peek(addr::VIDEO_TABLE | y.wrapping_add(1) as u16),
        ];
        bytemuck::cast(bytes)
    }
}

/// Points row i at screen page 8 + i with no offset.
pub fn init_video_table(ctx: &mut Context, rows: u16) {
    let start = addr::VIDEO_TABLE as usize;
    let bytes = &mut ctx.ram_mut()[start..start + 2 * rows.min(128) as usize];
    let table: &mut [VideoTableEntry] = bytemuck::cast_slice_mut(bytes);
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = VideoTableEntry { page: (addr::SCREEN >> 8) as u8 + i as u8, dx: 0 };
    }
}

/// Receives the output register, one byte per CPU cycle.
pub trait VideoSink {
    /// `line` counts from the first vertical blank line of the frame.
    fn scanline(&mut self, line: u16, bytes: &[u8]);

    fn frame_done(&mut self) {}
}

/// Drops everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn scanline(&mut self, _line: u16, _bytes: &[u8]) {}
}

/// The 24 LED states the sequencer steps through, indexed by ledState + 24.
pub const LED_PATTERN: [u8; 24] = [
    0b1111, 0b0111, 0b0011, 0b0001, 0b0010, 0b0100, 0b1000, 0b0100,
    0b0010, 0b0001, 0b0011, 0b0111, 0b1111, 0b1110, 0b1100, 0b1000,
    0b0100, 0b0010, 0b0001, 0b0010, 0b0100, 0b1000, 0b1100, 0b1110,
];

/// Once per frame. Every `ledTempo` + 1 frames ledState steps through
/// -24..-1 and the matching pattern goes to the low nibble of `xoutMask`.
/// A positive ledState stops the sequence and leaves the LEDs alone. The
/// audio nibble is always cleared here; the sound timer sets it again.
pub fn step_leds(ctx: &mut Context) {
    let timer = ctx.peek(addr::LED_TIMER).wrapping_sub(1);
    let state = match timer as i8 {
        0 => ctx.peek(addr::LED_STATE).wrapping_add(1),
        t if t > 0 => ctx.peek(addr::LED_STATE),
        _ => {
            ctx.poke(addr::LED_TIMER, ctx.peek(addr::LED_TEMPO));
            let mask = ctx.peek(addr::XOUT_MASK) & 0x0f;
            ctx.poke(addr::XOUT_MASK, mask);
            return;
        }
    };
    ctx.poke(addr::LED_TIMER, timer);

    let state = match state as i8 {
        0 => -24,
        s if s < -24 => -24,
        s => s,
    };
    if state > 0 {
        ctx.poke(addr::LED_STATE, 0x0f);
        let mask = ctx.peek(addr::XOUT_MASK) & 0x0f;
        ctx.poke(addr::XOUT_MASK, mask);
    } else {
        ctx.poke(addr::LED_STATE, state as u8);
        ctx.poke(addr::XOUT_MASK, LED_PATTERN[(state + 24) as usize]);
    }
}

/// The narrowest slice the loop ever hands out, or `None` when a line is
/// too short to hold its fixed work.
pub fn smallest_slice(timing: &Timing) -> Option<u16> {
    let end = timing.cycles_per_line.checked_sub(1)?;
    [
        end.checked_sub(cycle::FIRST_TAIL + cycle::FIRST_SLICE + interrupt::ENTRY_CYCLES),
        end.checked_sub(cycle::LAST_TAIL + cycle::LAST_SLICE + cycle::SELECT),
        end.checked_sub(cycle::BLANK_SAMPLE_SLICE),
        end.checked_sub(timing.pixel_start),
    ]
    .into_iter()
    .collect::<Option<Vec<u16>>>()?
    .into_iter()
    .min()
}

/// videoY on the first vertical blank line. It climbs by two per line and
/// turns positive on the last one.
pub fn first_blank_video_y(timing: &Timing) -> u8 {
    (1i32 - 2 * (timing.blank_lines() as i32 - 2)) as u8
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NextVideo {
    A,
    B,
    C,
    D,
    /// Blacked-out line above the first shown row.
    Black,
}

/// What happened on one scanline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineReport {
    pub line: u16,
    /// Cycles handed to the scheduler; zero on pixel lines.
    pub budget: u16,
    pub used: u16,
    pub frame_done: bool,
}

pub struct FrameDriver {
    line: u16,
    next: NextVideo,
    black_toggle: bool,
    was_zombie: bool,
    buffer: Vec<u8>,
    samples: SampleQueue,
}

impl FrameDriver {
    pub fn new(timing: &Timing, samples: SampleQueue) -> Self {
        FrameDriver {
            line: 0,
            next: NextVideo::A,
            black_toggle: false,
            was_zombie: false,
            buffer: vec![sync::IDLE; timing.cycles_per_line as usize],
            samples,
        }
    }

    /// Line of the frame the next call to `run_line` produces.
    pub fn line(&self) -> u16 {
        self.line
    }

    /// Starts over at the first vertical blank line.
    pub fn restart(&mut self) {
        self.line = 0;
        self.next = NextVideo::A;
    }

    pub fn run_line(&mut self, ctx: &mut Context, sink: &mut dyn VideoSink, serial: &mut dyn SerialLine) -> LineReport {
        let timing = ctx.timing;

        if ctx.video_mode.zombie() {
            self.was_zombie = true;
            return self.zombie_line(ctx, sink, serial);
        }
        if self.was_zombie {
            debug!("video signals back, restarting at vertical blank");
            self.was_zombie = false;
            self.restart();
        }

        audio::update_channel(ctx);

        let line = self.line;
        let (budget, used) = if line < timing.blank_lines() {
            self.blank_line(ctx, serial, line)
        } else {
            self.visible_line(ctx, serial)
        };

        sink.scanline(line, &self.buffer);
        self.finish_line(sink, line, budget, used, timing.lines_per_frame())
    }

    fn finish_line(&mut self, sink: &mut dyn VideoSink, line: u16, budget: u16, used: u16, lines: u16) -> LineReport {
        self.line += 1;
        let frame_done = self.line >= lines;
        if frame_done {
            self.line = 0;
            sink.frame_done();
        }
        LineReport { line, budget, used, frame_done }
    }

    /// Builds the sync skeleton of a line: horizontal pulse on `sync0`.
    fn frame_line(&mut self, timing: &Timing, sync0: u8) {
        let (from, to) = timing.h_pulse;
        for (i, out) in self.buffer.iter_mut().enumerate() {
            let i = i as u16;
            *out = if (from..to).contains(&i) { sync0 ^ sync::H } else { sync0 };
        }
    }

    /// Streams 160 bytes from `page`, starting at `x` and wrapping in the
    /// page, with the idle sync bits forced on.
    fn pixels(&mut self, ctx: &Context, timing: &Timing, page: u8, x: u8) {
        let start = timing.pixel_start as usize;
        let end = (start + PIXELS_PER_LINE as usize).min(self.buffer.len());
        let base = (page as u16) << 8;
        for (i, out) in self.buffer[start..end].iter_mut().enumerate() {
            *out = ctx.peek(base | x.wrapping_add(i as u8) as u16) | sync::IDLE;
        }
    }

    /// Runs the scheduler from cycle `from` to `to` of the line. A byte a
    /// program writes to the output port stays there for the rest of the
    /// slice.
    fn slice(&mut self, ctx: &mut Context, from: u16, to: u16) -> (u16, u16) {
        let budget = to.saturating_sub(from);
        let used = scheduler::run_slice(ctx, budget);
        if let Some(out) = ctx.take_out_latch() {
            let start = (from as usize).min(self.buffer.len());
            let end = (to as usize).min(self.buffer.len());
            self.buffer[start..end].fill(out);
        }
        (budget, used)
    }

    fn line_end(timing: &Timing) -> u16 {
        timing.cycles_per_line - 1
    }

    fn latch_sample(&mut self, ctx: &mut Context) {
        let xout = audio::finalize(ctx);
        self.samples.push(xout & 0xf0);
    }

    fn blank_line(&mut self, ctx: &mut Context, serial: &mut dyn SerialLine, k: u16) -> (u16, u16) {
        let timing = ctx.timing;
        let pulse = timing.v_front..timing.v_front + timing.v_pulse;
        let sync0 = if pulse.contains(&k) { sync::IDLE ^ sync::V } else { sync::IDLE };
        self.frame_line(&timing, sync0);

        if k == 0 {
            return self.first_blank_line(ctx, serial);
        }
        if k + 1 == timing.blank_lines() {
            return self.last_blank_line(ctx, serial);
        }

        let y = ctx.video_y().wrapping_add(2);
        ctx.poke(addr::VIDEO_Y, y);
        ctx.in_port = serial.sample(y);

        // the controller shift register has all eight bits on the first back
        // porch line
        if k == pulse.end {
            ctx.poke(addr::SERIAL_RAW, ctx.in_port);
        }

        let from = if y & 6 == 0 {
            self.latch_sample(ctx);
            cycle::BLANK_SAMPLE_SLICE
        } else {
            cycle::BLANK_SLICE
        };
        self.slice(ctx, from, Self::line_end(&timing))
    }

    fn first_blank_line(&mut self, ctx: &mut Context, serial: &mut dyn SerialLine) -> (u16, u16) {
        let timing = ctx.timing;
        ctx.poke(addr::VIDEO_Y, first_blank_video_y(&timing));
        ctx.in_port = serial.sample(ctx.video_y());

        let frame = ctx.frame_count().wrapping_add(1);
        ctx.poke(addr::FRAME_COUNT, frame);
        let input = frame ^ ctx.peek(addr::SERIAL_RAW);
        EntropyPool::new(ctx).mix(input);
        step_leds(ctx);

        let from = cycle::FIRST_SLICE + interrupt::poll(ctx);
        let result = self.slice(ctx, from, Self::line_end(&timing) - cycle::FIRST_TAIL);

        let mask = ctx.peek(addr::CHANNEL_MASK) & 0b1111_1011;
        ctx.poke(addr::CHANNEL_MASK, mask);
        audio::tick_sound_timer(ctx);
        result
    }

    fn last_blank_line(&mut self, ctx: &mut Context, serial: &mut dyn SerialLine) -> (u16, u16) {
        let timing = ctx.timing;
        ctx.in_port = serial.sample(ctx.video_y());
        let buttons = input::decode(ctx);

        if input::reset_held(ctx) {
            debug!("soft reset from a long Start press");
            machine::warm_boot(ctx);
        }

        let mut from = cycle::LAST_SLICE;
        if buttons == Buttons::pressing(&[Button::Select]) {
            let mode = ctx.video_mode.cycled();
            debug!("select pressed, video mode {}", mode.number());
            mode.store(ctx);
            ctx.poke(addr::BUTTON_STATE, Buttons::RELEASED.bits());
            from += cycle::SELECT;
        }
        let result = self.slice(ctx, from, Self::line_end(&timing) - cycle::LAST_TAIL);

        let top = ctx.peek(addr::VIDEO_TOP);
        ctx.poke(addr::VIDEO_Y, top);
        ctx.poke(addr::FRAME_X, top);
        self.next = if top == 0 { NextVideo::A } else { NextVideo::Black };
        self.black_toggle = false;
        let channel = ctx.peek(addr::CHANNEL) & 3;
        ctx.poke(addr::CHANNEL, channel);
        result
    }

    fn visible_line(&mut self, ctx: &mut Context, serial: &mut dyn SerialLine) -> (u16, u16) {
        let timing = ctx.timing;
        self.frame_line(&timing, sync::IDLE);
        ctx.in_port = serial.sample(ctx.video_y());
        let mode = ctx.video_mode;
        let y = ctx.video_y();

        let show = match self.next {
            NextVideo::A => {
                self.next = NextVideo::B;
                let entry = VideoTableEntry::at(ctx, y);
                ctx.poke(addr::FRAME_Y, entry.page);
                let x = entry.dx.wrapping_add(ctx.peek(addr::FRAME_X));
                self.pixels(ctx, &timing, entry.page, x);
                return (0, 0);
            }
            NextVideo::B => {
                self.next = NextVideo::C;
                let entry = VideoTableEntry::at(ctx, y);
                let x = ctx.peek(addr::FRAME_X).wrapping_add(entry.dx);
                ctx.poke(addr::FRAME_X, x);
                mode.b()
            }
            NextVideo::C => {
                self.next = NextVideo::D;
                self.latch_sample(ctx);
                mode.c()
            }
            NextVideo::D => {
                self.next = NextVideo::A;
                let last = 2 * (timing.visible_rows.min(128) as u8 - 1);
                if y < last {
                    ctx.poke(addr::VIDEO_Y, y + 2);
                }
                mode.d()
            }
            NextVideo::Black => {
                self.black_toggle = !self.black_toggle;
                if !self.black_toggle {
                    let x = ctx.peek(addr::FRAME_X).wrapping_sub(1);
                    ctx.poke(addr::FRAME_X, x);
                    if x == 0 {
                        self.next = NextVideo::A;
                    }
                }
                return self.slice(ctx, cycle::BLACK_SLICE, Self::line_end(&timing));
            }
        };

        if show {
            let page = ctx.peek(addr::FRAME_Y);
            let x = ctx.peek(addr::FRAME_X);
            self.pixels(ctx, &timing, page, x);
            (0, 0)
        } else {
            self.slice(ctx, timing.pixel_start, Self::line_end(&timing))
        }
    }

    /// No sync, no sound, no housekeeping: the whole line is one unbounded
    /// slice.
    fn zombie_line(&mut self, ctx: &mut Context, sink: &mut dyn VideoSink, serial: &mut dyn SerialLine) -> LineReport {
        let timing = ctx.timing;
        self.buffer.fill(sync::IDLE);
        ctx.in_port = serial.sample(ctx.video_y());
        let budget = timing.max_slice_cycles();
        let used = scheduler::run_slice(ctx, u16::MAX);
        ctx.take_out_latch();

        let line = self.line;
        sink.scanline(line, &self.buffer);
        self.finish_line(sink, line, budget, used, timing.lines_per_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio;
    use crate::context::{Interpreter, RamSize};
    use crate::input::SteadyLine;
    use crate::rom::Rom;
    use crate::sys::{SysTable, SysTask, TaskState};

    fn context() -> Context {
        let mut ctx = Context::new(Timing::default(), RamSize::K64, Rom::new(), SysTable::empty());
        init_video_table(&mut ctx, 120);
        audio::reset_channels(&mut ctx);
        // BRA to itself at 0x0200
        ctx.ram_mut()[0x0200..0x0202].copy_from_slice(&[0x90, 0xfe]);
        ctx.set_vpc(0x02fe);
        ctx
    }

    fn driver(ctx: &Context) -> (FrameDriver, rtrb::Consumer<u8>) {
        let (queue, consumer) = SampleQueue::new(1024);
        (FrameDriver::new(&ctx.timing, queue), consumer)
    }

    struct Recorder {
        lines: Vec<(u16, Vec<u8>)>,
        frames: usize,
    }

    impl VideoSink for Recorder {
        fn scanline(&mut self, line: u16, bytes: &[u8]) {
            self.lines.push((line, bytes.to_vec()));
        }

        fn frame_done(&mut self) {
            self.frames += 1;
        }
    }

    fn run_frame(driver: &mut FrameDriver, ctx: &mut Context, sink: &mut dyn VideoSink, raw: u8) -> Vec<LineReport> {
        let mut line = SteadyLine(raw);
        let mut reports = Vec::new();
        loop {
            let report = driver.run_line(ctx, sink, &mut line);
            reports.push(report);
            if report.frame_done {
                return reports;
            }
        }
    }

    #[test]
    fn video_modes() {
        assert_eq!(VideoMode::from_number(0).number(), 0);
        let m1 = VideoMode::from_number(1);
        assert!(m1.b() && m1.c() && !m1.d());
        let m3 = VideoMode::from_number(3);
        assert!(!m3.b() && !m3.c() && !m3.d());
        assert_eq!(m3.cycled(), VideoMode::from_number(0));
        assert_eq!(VideoMode::from_number(2).cycled(), m3);
    }

    #[test]
    fn frame_has_521_lines_of_200_bytes() {
        let mut ctx = context();
        let (mut driver, _audio) = driver(&ctx);
        let mut sink = Recorder { lines: Vec::new(), frames: 0 };
        let reports = run_frame(&mut driver, &mut ctx, &mut sink, 0xff);
        assert_eq!(reports.len(), 521);
        assert_eq!(sink.frames, 1);
        assert!(sink.lines.iter().all(|(_, b)| b.len() == 200));
        assert!(reports.iter().all(|r| r.used <= r.budget));
        assert_eq!(ctx.frame_count(), 1);
    }

    #[test]
    fn vertical_pulse_lines() {
        let mut ctx = context();
        let (mut driver, _audio) = driver(&ctx);
        let mut sink = Recorder { lines: Vec::new(), frames: 0 };
        run_frame(&mut driver, &mut ctx, &mut sink, 0xff);
        let vsync: Vec<u16> = sink.lines.iter()
            .filter(|(_, b)| b[0] & sync::V == 0)
            .map(|(l, _)| *l)
            .collect();
        assert_eq!(vsync, (6..14).collect::<Vec<_>>());
        // horizontal pulse on every line
        assert!(sink.lines.iter().all(|(_, b)| b[10] & sync::H == 0 && b[30] & sync::H != 0));
    }

    #[test]
    fn pixels_follow_the_video_table() {
        let mut ctx = context();
        for x in 0..160u16 {
            ctx.poke(0x0800 + x, (x & 0x3f) as u8);
        }
        // row 1 shows page 8 shifted by 2
        ctx.poke(addr::VIDEO_TABLE + 2, 0x08);
        ctx.poke(addr::VIDEO_TABLE + 3, 2);
        let (mut driver, _audio) = driver(&ctx);
        let mut sink = Recorder { lines: Vec::new(), frames: 0 };
        run_frame(&mut driver, &mut ctx, &mut sink, 0xff);

        let row0 = &sink.lines[41].1;
        assert_eq!(row0[40], 0xc0);
        assert_eq!(row0[41], 0xc1);
        let row1 = &sink.lines[45].1;
        assert_eq!(row1[40], 0xc2);
        // mode 3: only sub-line A carries pixels
        assert!(sink.lines[42].1[40..].iter().all(|b| *b == 0xc0));
    }

    #[test]
    fn select_cycles_the_mode() {
        let mut ctx = context();
        let (mut driver, _audio) = driver(&ctx);
        let select = Buttons::pressing(&[Button::Select]).bits();
        run_frame(&mut driver, &mut ctx, &mut NullSink, select);
        assert_eq!(ctx.video_mode.number(), 0);
        assert_eq!(ctx.peek(addr::BUTTON_STATE), 0xff);
        // held select does not register again
        run_frame(&mut driver, &mut ctx, &mut NullSink, select);
        assert_eq!(ctx.video_mode.number(), 0);
    }

    #[test]
    fn long_start_press_is_a_warm_boot() {
        let mut ctx = context();
        let (mut driver, _audio) = driver(&ctx);
        ctx.irq_active = true;
        ctx.parked_task = Some(SysTask { pc: 0x1236, owner: 0x00e9, state: TaskState::Restart });
        ctx.set_vsp(0x40);
        ctx.poke(addr::RESET_TIMER, input::RESET_HOLD_FRAMES);

        let start = Buttons::pressing(&[Button::Start]).bits();
        for _ in 1..input::RESET_HOLD_FRAMES {
            run_frame(&mut driver, &mut ctx, &mut NullSink, start);
        }
        assert!(ctx.irq_active);
        run_frame(&mut driver, &mut ctx, &mut NullSink, start);
        assert!(!ctx.irq_active);
        assert!(ctx.parked_task.is_none());
        assert_eq!(ctx.vsp(), 0);
        assert_eq!(ctx.interpreter, Interpreter::Vcpu);
    }

    #[test]
    fn one_sample_per_four_lines() {
        let mut ctx = context();
        let (mut driver, mut audio) = driver(&ctx);
        run_frame(&mut driver, &mut ctx, &mut NullSink, 0xff);
        let mut n = 0;
        while audio.pop().is_ok() {
            n += 1;
        }
        // 120 C lines plus the blank lines where videoY is a multiple of 8
        assert!((125..=131).contains(&n), "{n}");
    }

    #[test]
    fn led_sequence_runs_and_stops() {
        let mut ctx = context();
        ctx.poke(addr::LED_TEMPO, 0);
        ctx.poke(addr::LED_STATE, 0);
        ctx.poke(addr::LED_TIMER, 3);
        step_leds(&mut ctx);
        assert_eq!(ctx.peek(addr::LED_STATE) as i8, -24);
        assert_eq!(ctx.peek(addr::XOUT_MASK), 0b1111);

        ctx.poke(addr::LED_STATE, 5);
        ctx.poke(addr::LED_TIMER, 3);
        ctx.poke(addr::XOUT_MASK, 0xf5);
        step_leds(&mut ctx);
        assert_eq!(ctx.peek(addr::LED_STATE), 0x0f);
        assert_eq!(ctx.peek(addr::XOUT_MASK), 0x05);
    }

    #[test]
    fn interrupt_is_entered_on_the_first_line() {
        let mut ctx = context();
        // handler: BRA to itself at 0x0300
        ctx.ram_mut()[0x0300..0x0302].copy_from_slice(&[0x90, 0xfe]);
        ctx.poke_word(addr::V_IRQ, 0x0300);
        let (mut driver, _audio) = driver(&ctx);
        let report = driver.run_line(&mut ctx, &mut NullSink, &mut SteadyLine::default());
        assert!(ctx.irq_active);
        assert_eq!(report.budget, 199 - cycle::FIRST_TAIL - cycle::FIRST_SLICE - interrupt::ENTRY_CYCLES);
        assert_eq!(smallest_slice(&ctx.timing), Some(report.budget));
        assert_eq!(ctx.peek_word(addr::V_IRQ_SAVE), 0x02fe);
    }

    #[test]
    fn zombie_lines_carry_no_sync() {
        let mut ctx = context();
        let mut mode = ctx.video_mode;
        mode.set_zombie(true);
        mode.store(&mut ctx);
        let (mut driver, _audio) = driver(&ctx);
        let mut sink = Recorder { lines: Vec::new(), frames: 0 };
        driver.run_line(&mut ctx, &mut sink, &mut SteadyLine::default());
        assert!(sink.lines[0].1.iter().all(|b| *b == sync::IDLE));
        assert_eq!(ctx.frame_count(), 0);

        mode.set_zombie(false);
        mode.store(&mut ctx);
        driver.run_line(&mut ctx, &mut sink, &mut SteadyLine::default());
        assert_eq!(ctx.frame_count(), 1);
    }
}
