//! Clock description and every per-line constant derived from it.
//!
//! Nothing in here is a magic number copied from a firmware image: the
//! defaults come out of the 6.25 MHz CPU clock racing a 25.175 MHz VGA dot
//! clock, four pixels per CPU cycle.

/// Ticks are two CPU cycles. All interpreter costs are expressed in ticks.
pub const CYCLES_PER_TICK: u16 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    pub cpu_clock_hz: u32,
    pub cycles_per_line: u16,

    pub v_front: u16,
    pub v_pulse: u16,
    pub v_back: u16,
    pub visible_rows: u16,

    /// Largest instruction the vCPU dispatch has to fit, in ticks.
    pub max_ticks: u16,
    /// Largest decode step the v6502 has to fit, in ticks.
    pub v6502_max_ticks: u16,
    /// Fixed cycles spent entering and leaving a vCPU slice.
    pub slice_overhead: u16,
    /// Extra cycles the v6502 dispatcher needs on top of the vCPU's.
    pub v6502_adjust: u16,
    /// The widest slice ever handed out, in ticks.
    pub max_slice_ticks: u16,

    /// First and last cycle of the horizontal sync pulse.
    pub h_pulse: (u16, u16),
    /// First cycle of the pixel burst; the burst is 160 cycles wide.
    pub pixel_start: u16,
}

const VGA_CLOCK_HZ: u64 = 25_175_000;
const VGA_LINES: u64 = 525;
const VGA_FRONT: u16 = 10;
const VGA_PULSE: u16 = 2;
const VGA_BACK: u16 = 33;
const MIN_PULSE: u16 = 8;

pub const PIXELS_PER_LINE: u16 = 160;

impl Timing {
    /// Derives the line and frame geometry for a CPU clock.
    ///
    /// The CPU runs slower than a quarter of the VGA dot clock, so a frame
    /// holds fewer lines than VGA's 525; the difference is taken out of the
    /// front porch. The sync pulse is widened to 8 lines for the controller
    /// shift register, taken out of the back porch.
    pub fn derive(cpu_clock_hz: u32) -> Self {
        let lines = 4 * cpu_clock_hz as u64 * VGA_LINES / VGA_CLOCK_HZ;
        let front_adjust = (VGA_LINES - lines) as u16;
        let extension = MIN_PULSE.saturating_sub(VGA_PULSE);

        let max_ticks = 30 / CYCLES_PER_TICK;
        let slice_overhead = 5 + 9;

        Timing {
            cpu_clock_hz,
            cycles_per_line: 200,
            v_front: VGA_FRONT.saturating_sub(front_adjust),
            v_pulse: VGA_PULSE + extension,
            v_back: VGA_BACK - extension,
            visible_rows: 120,
            max_ticks,
            v6502_max_ticks: 38 / CYCLES_PER_TICK,
            slice_overhead,
            v6502_adjust: 5,
            max_slice_ticks: 127 + max_ticks,
            h_pulse: (4, 28),
            pixel_start: 40,
        }
    }

    #[inline(always)]
    pub fn blank_lines(&self) -> u16 {
        self.v_front + self.v_pulse + self.v_back
    }

    #[inline(always)]
    pub fn visible_lines(&self) -> u16 {
        self.visible_rows * 4
    }

    #[inline(always)]
    pub fn lines_per_frame(&self) -> u16 {
        self.blank_lines() + self.visible_lines()
    }

    /// Cycles for an unbounded slice: the full tick allowance plus overhead.
    #[inline(always)]
    pub fn max_slice_cycles(&self) -> u16 {
        self.max_slice_ticks * CYCLES_PER_TICK + self.slice_overhead
    }

    /// The smallest cycle budget that can run anything at all.
    #[inline(always)]
    pub fn min_slice_cycles(&self) -> u16 {
        self.slice_overhead + self.max_ticks * CYCLES_PER_TICK
    }

    pub fn frames_per_second(&self) -> f64 {
        self.cpu_clock_hz as f64 / (self.cycles_per_line as f64 * self.lines_per_frame() as f64)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::derive(6_250_000)
    }
}
