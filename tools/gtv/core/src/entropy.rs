use rand_core::{impls, Error, RngCore};
use crate::context::{addr, Context};

/// The three-byte entropy pool: entropy[0..2] in page zero plus a hidden
/// byte in page one.
///
/// The same mixing step runs once per frame with the frame counter and the
/// serial input as input, and on demand from SYS_Random with the slice's
/// remaining ticks.
pub struct EntropyPool<'a> {
    ctx: &'a mut Context,
}

impl<'a> EntropyPool<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        EntropyPool { ctx }
    }

    /// Folds `input` into the pool and returns the fresh entropy word.
    pub fn mix(&mut self, input: u8) -> u16 {
        let e1 = self.ctx.peek(addr::ENTROPY + 1);
        let e0 = (input ^ e1).wrapping_add(self.ctx.peek(addr::ENTROPY));
        self.ctx.poke(addr::ENTROPY, e0);

        let e2 = e0.wrapping_add(self.ctx.peek(addr::ENTROPY2));
        self.ctx.poke(addr::ENTROPY2, e2);

        let scrambled = if e2 & 0x80 != 0 { e2 ^ 0x6c } else { e2 ^ 0x53 };
        let e1 = scrambled.wrapping_add(e1);
        self.ctx.poke(addr::ENTROPY + 1, e1);

        u16::from_le_bytes([e0, e1])
    }

    pub fn word(&self) -> u16 {
        self.ctx.peek_word(addr::ENTROPY)
    }
}

impl RngCore for EntropyPool<'_> {
    fn next_u32(&mut self) -> u32 {
        let lo = self.mix(0) as u32;
        let hi = self.mix(0) as u32;
        hi << 16 | lo
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
