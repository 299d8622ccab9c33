//! Controller decoding.
//!
//! Once per frame the raw serial byte is turned into `buttonState`. Two
//! kinds of input device share the line: game controllers that report one
//! bit per button, and keyboards that send a code that is held while a key is
//! down. The all-ones byte is "nothing pressed" for both.

use bitfield::bitfield;
use log::debug;
use crate::context::{addr, Context};

bitfield! {
    /// Button bits, active low.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Buttons(u8);
    impl Debug;
    pub right, set_right: 0;
    pub left, set_left: 1;
    pub down, set_down: 2;
    pub up, set_up: 3;
    pub start, set_start: 4;
    pub select, set_select: 5;
    pub b, set_b: 6;
    pub a, set_a: 7;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Down,
    Up,
    Start,
    Select,
    B,
    A,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right, Button::Left, Button::Down, Button::Up,
        Button::Start, Button::Select, Button::B, Button::A,
    ];

    #[inline(always)]
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

impl Buttons {
    pub const RELEASED: Buttons = Buttons(0xff);

    /// The raw byte a controller sends while `held` are down.
    pub fn pressing(held: &[Button]) -> Self {
        Buttons(held.iter().fold(0xff, |raw, b| raw & !b.mask()))
    }

    #[inline(always)]
    pub fn is_pressed(&self, button: Button) -> bool {
        self.0 & button.mask() == 0
    }

    #[inline(always)]
    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl Default for Buttons {
    fn default() -> Self {
        Buttons::RELEASED
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// One bit per button; a press registers on the falling edge.
    Change,
    /// A held code of the form 0b0..01..1.
    Level,
}

impl Protocol {
    pub fn detect(raw: u8) -> Self {
        if raw.wrapping_add(1) & raw == 0 {
            Protocol::Level
        } else {
            Protocol::Change
        }
    }
}

/// Folds one frame's raw byte into the previous button state.
pub fn next_state(raw: u8, last: u8, state: u8) -> u8 {
    match Protocol::detect(raw) {
        Protocol::Change => ((!last | raw) & state) | raw,
        // a new code starts over from all-released
        Protocol::Level if raw != last => 254u8.wrapping_sub(raw) | raw,
        Protocol::Level => state,
    }
}

/// Decodes `serialRaw` into `buttonState` and remembers it as `serialLast`.
pub fn decode(ctx: &mut Context) -> Buttons {
    let raw = ctx.peek(addr::SERIAL_RAW);
    let last = ctx.peek(addr::SERIAL_LAST);
    let state = next_state(raw, last, ctx.peek(addr::BUTTON_STATE));
    ctx.poke(addr::BUTTON_STATE, state);
    ctx.poke(addr::SERIAL_LAST, raw);
    Buttons(state)
}

/// Frames Start has to be held for a soft reset.
pub const RESET_HOLD_FRAMES: u8 = 128;

/// Counts down while Start, and only Start, is held. True on the frame the
/// hold completes.
pub fn reset_held(ctx: &mut Context) -> bool {
    if ctx.peek(addr::BUTTON_STATE) != Buttons::pressing(&[Button::Start]).bits() {
        ctx.poke(addr::RESET_TIMER, RESET_HOLD_FRAMES);
        return false;
    }
    let timer = ctx.peek(addr::RESET_TIMER).wrapping_sub(1);
    ctx.poke(addr::RESET_TIMER, timer);
    if timer & 127 == 0 {
        debug!("start held for {} frames", RESET_HOLD_FRAMES);
        ctx.poke(addr::RESET_TIMER, RESET_HOLD_FRAMES);
        true
    } else {
        false
    }
}

/// The level on the input port, asked for once per scanline.
pub trait SerialLine {
    fn sample(&mut self, video_y: u8) -> u8;
}

/// A line that reads the same byte every time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SteadyLine(pub u8);

impl Default for SteadyLine {
    fn default() -> Self {
        SteadyLine(0xff)
    }
}

impl SerialLine for SteadyLine {
    fn sample(&mut self, _video_y: u8) -> u8 {
        self.0
    }
}

/// A line driven by a closure of the current videoY.
pub struct FnLine<F>(pub F);

impl<F: FnMut(u8) -> u8> SerialLine for FnLine<F> {
    fn sample(&mut self, video_y: u8) -> u8 {
        (self.0)(video_y)
    }
}
