//! Four-channel wavetable synthesis, one channel per scanline.
//!
//! Channel n keeps its registers in the top six bytes of page n. Every
//! scanline the next channel's phase accumulator advances and its waveform
//! sample is added into `sample`; the sum is latched into XOUT once per four
//! lines.

use log::warn;
use rtrb::{Consumer, Producer, RingBuffer};
use crate::context::{addr, Context};

pub const CHANNELS: u8 = 4;

/// Register offsets inside a channel page.
pub mod channel {
    pub const WAV_A: u16 = 0xfa;
    pub const WAV_X: u16 = 0xfb;
    pub const KEY_L: u16 = 0xfc;
    pub const KEY_H: u16 = 0xfd;
    pub const OSC_L: u16 = 0xfe;
    pub const OSC_H: u16 = 0xff;
}

/// Value `sample` is reset to after each latch.
pub const SAMPLE_BIAS: u8 = 3;

/// Selects a channel register.
#[inline(always)]
pub fn register(ch: u8, offset: u16) -> u16 {
    (ch as u16) << 8 | offset
}

/// Advances the next channel in the rotation and mixes its output into
/// `sample`. Returns the channel that ran, 1..=4.
pub fn update_channel(ctx: &mut Context) -> u8 {
    let mask = ctx.peek(addr::CHANNEL_MASK);
    let ch = (ctx.peek(addr::CHANNEL) & mask & (CHANNELS - 1)) + 1;
    ctx.poke(addr::CHANNEL, ch);

    let osc_l = (ctx.peek(register(ch, channel::OSC_L)) & 0x7f)
        .wrapping_add(ctx.peek(register(ch, channel::KEY_L)));
    ctx.poke(register(ch, channel::OSC_L), osc_l);
    let carry = osc_l >> 7;

    let osc_h = ctx.peek(register(ch, channel::OSC_H))
        .wrapping_add(ctx.peek(register(ch, channel::KEY_H)))
        .wrapping_add(carry);
    ctx.poke(register(ch, channel::OSC_H), osc_h);

    let index = (osc_h & 0xfc) ^ ctx.peek(register(ch, channel::WAV_X));
    let v = ctx.peek(register(ch, channel::WAV_A))
        .wrapping_add(ctx.peek(addr::SOUND_TABLE + index as u16));
    let contribution = if v & 0x80 != 0 { 63 } else { v & 63 };

    let sample = ctx.peek(addr::SAMPLE).wrapping_add(contribution);
    ctx.poke(addr::SAMPLE, sample);
    ch
}

/// Latches the mixed sample into XOUT, masked by `xoutMask`, and restarts
/// the mix. The low nibble of XOUT drives the LEDs.
pub fn finalize(ctx: &mut Context) -> u8 {
    let xout = (ctx.peek(addr::SAMPLE) | 0x0f) & ctx.peek(addr::XOUT_MASK);
    ctx.poke(addr::XOUT, xout);
    ctx.poke(addr::SAMPLE, SAMPLE_BIAS);
    xout
}

/// Once per frame: while `soundTimer` runs, the audio bits of `xoutMask`
/// are switched on.
pub fn tick_sound_timer(ctx: &mut Context) {
    let timer = ctx.peek(addr::SOUND_TIMER);
    if timer != 0 {
        ctx.poke(addr::SOUND_TIMER, timer - 1);
        let mask = ctx.peek(addr::XOUT_MASK) | 0xf0;
        ctx.poke(addr::XOUT_MASK, mask);
    }
}

/// Entry `i` of the four interleaved waveforms: noise (seeded as a ramp and
/// shuffled later), triangle, pulse and sawtooth.
pub fn waveform_entry(i: u8) -> [u8; 4] {
    let i = i & 63;
    let triangle = if i < 32 { 2 * i } else { 127 - 2 * i };
    let pulse = if i < 32 { 0 } else { 63 };
    [i, triangle, pulse, i]
}

pub fn init_waveforms(ctx: &mut Context) {
    for i in 0..64u8 {
        let at = addr::SOUND_TABLE + 4 * i as u16;
        for (k, v) in waveform_entry(i).into_iter().enumerate() {
            ctx.poke(at + k as u16, v);
        }
    }
}

/// Silences every channel and puts its waveform selectors back to noise.
pub fn reset_channels(ctx: &mut Context) {
    for ch in 1..=CHANNELS {
        for offset in channel::WAV_A..=channel::OSC_H {
            ctx.poke(register(ch, offset), 0);
        }
    }
    ctx.poke(addr::CHANNEL, 0);
    ctx.poke(addr::CHANNEL_MASK, CHANNELS - 1);
    ctx.poke(addr::SAMPLE, SAMPLE_BIAS);
}

/// Producer side of the audio sample stream. One 8-bit unsigned sample per
/// four scanlines; the consumer is handed to the host.
pub struct SampleQueue {
    producer: Producer<u8>,
    dropped: u64,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> (Self, Consumer<u8>) {
        let (producer, consumer) = RingBuffer::new(capacity);
        (SampleQueue { producer, dropped: 0 }, consumer)
    }

    /// Never blocks. A full queue drops the sample.
    pub fn push(&mut self, sample: u8) {
        if self.producer.push(sample).is_err() {
            if self.dropped == 0 {
                warn!("audio queue full, dropping samples until it drains");
            }
            self.dropped += 1;
        } else {
            self.dropped = 0;
        }
    }

    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}
