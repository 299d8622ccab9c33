use gtv_core::frame::sync;
use gtv_core::timing::PIXELS_PER_LINE;
use gtv_core::{Timing, VideoSink};
use image::{Rgb, RgbImage};

/// Expands a 2-bit-per-channel output byte (bits 0-5, red lowest) to RGB.
pub fn rgb(byte: u8) -> Rgb<u8> {
    let level = |shift: u8| ((byte >> shift) & 3) * 85;
    Rgb([level(0), level(2), level(4)])
}

/// Keeps the pixel area of the most recent complete frame.
pub struct FrameCapture {
    first_line: u16,
    pixel_start: usize,
    pending: RgbImage,
    last: Option<RgbImage>,
    frames: usize,
}

impl FrameCapture {
    pub fn new(timing: &Timing) -> Self {
        let height = (timing.lines_per_frame() - timing.blank_lines()) as u32;
        FrameCapture {
            first_line: timing.blank_lines(),
            pixel_start: timing.pixel_start as usize,
            pending: RgbImage::new(PIXELS_PER_LINE as u32, height),
            last: None,
            frames: 0,
        }
    }

    pub fn last_frame(&self) -> Option<&RgbImage> {
        self.last.as_ref()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl VideoSink for FrameCapture {
    fn scanline(&mut self, line: u16, bytes: &[u8]) {
        let Some(y) = line.checked_sub(self.first_line).map(u32::from) else {
            return;
        };
        if y >= self.pending.height() {
            return;
        }
        for x in 0..self.pending.width() {
            let byte = bytes.get(self.pixel_start + x as usize).copied().unwrap_or(sync::IDLE);
            self.pending.put_pixel(x, y, rgb(byte));
        }
    }

    fn frame_done(&mut self) {
        self.last = Some(self.pending.clone());
        self.frames += 1;
    }
}
