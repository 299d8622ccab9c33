//! Block memory routines. None of them cross a page: addresses wrap in the
//! low byte. Counts of zero mean 256, which falls out of 8-bit wrapping.

use crate::context::{addr, page_add, Context};
use crate::sys::{SysResult, TaskState};

/// Copies 1..=256 bytes from sysArgs[2:3] to sysArgs[0:1], count in vAC.lo.
///
/// Each invocation moves a burst of 6, 3 or 1 bytes and advances both
/// pointers and the count, so the call can be interrupted between bursts.
pub fn copy_memory(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let count = ctx.peek(addr::V_AC);
    let (burst, cycles) = match count {
        0 | 6..=255 => (6u8, 68),
        3..=5 => (3, 58),
        _ => (1, 48),
    };

    let dst = ctx.sys_word(0);
    let src = ctx.sys_word(2);
    let mut buffer = [0u8; 6];
    for i in 0..burst {
        buffer[i as usize] = ctx.peek(page_add(src, i));
    }
    for i in 0..burst {
        ctx.poke(page_add(dst, i), buffer[i as usize]);
    }

    ctx.set_sys_word(0, page_add(dst, burst));
    ctx.set_sys_word(2, page_add(src, burst));
    let left = count.wrapping_sub(burst);
    ctx.poke(addr::V_AC, left);

    if left == 0 {
        SysResult::Done(cycles / 2)
    } else {
        SysResult::Again(cycles / 2, TaskState::Restart)
    }
}

/// Fills sysArgs[0] bytes (0 meaning 256) with sysArgs[1], starting at
/// sysArgs[2:3]. Sets up to eight bytes per invocation.
pub fn set_memory(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let count = ctx.sys_arg(0);
    let value = ctx.sys_arg(1);
    let dst = ctx.sys_word(2);

    if count == 0 || count >= 8 {
        for i in 0..8 {
            ctx.poke(page_add(dst, i), value);
        }
        let left = count.wrapping_sub(8);
        ctx.set_sys_arg(0, left);
        ctx.set_sys_word(2, page_add(dst, 8));
        if left == 0 {
            SysResult::Done(46 / 2)
        } else {
            SysResult::Again(46 / 2, TaskState::Restart)
        }
    } else {
        for i in 0..count {
            ctx.poke(page_add(dst, i), value);
        }
        ctx.set_sys_arg(0, 0);
        SysResult::Done(48 / 2)
    }
}

const SCAN_CHUNK: u8 = 8;

/// Looks for either sysArgs[2] or sysArgs[3] in the vAC.lo bytes starting at
/// sysArgs[0:1]. vAC ends up pointing at the first match, or zero.
pub fn scan_memory(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let targets = [ctx.sys_arg(2), ctx.sys_arg(3)];
    let mut at = ctx.sys_word(0);
    let mut left = ctx.peek(addr::V_AC);

    for _ in 0..SCAN_CHUNK {
        if targets.contains(&ctx.peek(at)) {
            ctx.set_vac(at);
            return SysResult::Done(50 / 2);
        }
        at = page_add(at, 1);
        left = left.wrapping_sub(1);
        ctx.set_sys_word(0, at);
        ctx.poke(addr::V_AC, left);
        if left == 0 {
            ctx.set_vac(0);
            return SysResult::Done(50 / 2);
        }
    }
    SysResult::Again(50 / 2, TaskState::Restart)
}

/// Four pixels from sysArgs[0..4] side by side at sysArgs[4:5].
pub fn draw4(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let at = ctx.sys_word(4);
    for i in 0..4 {
        let pixel = ctx.sys_arg(i);
        ctx.poke(page_add(at, i), pixel);
    }
    SysResult::Done(30 / 2)
}

/// Eight pixels stacked downwards from sysArgs[4:5], one per bit of
/// sysArgs[2] starting with the highest. Set bits get sysArgs[1], clear bits
/// sysArgs[0].
pub fn vdraw_bits(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let [x, y] = ctx.sys_word(4).to_le_bytes();
    let background = ctx.sys_arg(0);
    let pen = ctx.sys_arg(1);
    let mut bits = ctx.sys_arg(2);

    for row in 0..8u8 {
        let color = if bits & 0x80 != 0 { pen } else { background };
        ctx.poke(u16::from_le_bytes([x, y.wrapping_add(row)]), color);
        bits <<= 1;
    }
    ctx.set_sys_arg(2, bits);
    SysResult::Done(134 / 2)
}

/// Three consecutive ROM bytes from sysArgs[6:7] into sysArgs[0..3]. The
/// pointer wraps inside its page.
pub fn read3(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let at = ctx.sys_word(6);
    for i in 0..3 {
        let byte = ctx.rom.byte(page_add(at, i));
        ctx.set_sys_arg(i, byte);
    }
    SysResult::Done(40 / 2)
}

/// Spreads the 24 bits in sysArgs[0..3] over four 6-bit pixels in
/// sysArgs[0..4], lowest bits first.
pub fn unpack(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    let [a0, a1, a2] = [ctx.sys_arg(0), ctx.sys_arg(1), ctx.sys_arg(2)];
    let pixels = [
        a0 & 0x3f,
        (a1 & 0x0f) << 2 | a0 >> 6,
        (a2 & 0x03) << 4 | a1 >> 4,
        a2 >> 2,
    ];
    for (i, pixel) in pixels.into_iter().enumerate() {
        ctx.set_sys_arg(i as u8, pixel);
    }
    SysResult::Done(56 / 2)
}

/// How a sprite stripe lands on screen.
#[derive(Copy, Clone, Debug)]
struct Stripe {
    mirrored: bool,
    upwards: bool,
}

/// Draws one row of a 6-pixel-wide sprite per invocation.
///
/// Rows come from sysArgs[0:1] and go to vAC, one screen line further down
/// (or up) each time. A negative byte N ends the sprite: vAC moves N lines
/// back and one stripe over, and the source pointer steps past N, so the
/// next stripe can be drawn with the same arguments.
fn draw_stripe(ctx: &mut Context, stripe: Stripe) -> SysResult {
    let src = ctx.sys_word(0);
    let [dst_low, dst_high] = ctx.vac().to_le_bytes();
    let first = ctx.peek(src);

    if first & 0x80 != 0 {
        let high = if stripe.upwards { dst_high.wrapping_sub(first) } else { dst_high.wrapping_add(first) };
        let low = if stripe.mirrored { dst_low.wrapping_sub(6) } else { dst_low.wrapping_add(6) };
        ctx.set_vac(u16::from_le_bytes([low, high]));
        ctx.set_sys_word(0, page_add(src, 1));
        let cycles = if stripe.upwards { 36 } else { 34 };
        return SysResult::Done(cycles / 2);
    }

    let mut row: [u8; 6] = core::array::from_fn(|i| ctx.peek(page_add(src, i as u8)));
    if stripe.mirrored {
        row.reverse();
    }
    let dst = ctx.vac();
    for (i, pixel) in row.into_iter().enumerate() {
        ctx.set_sys_arg(2 + i as u8, pixel);
        ctx.poke(page_add(dst, i as u8), pixel);
    }

    ctx.set_sys_word(0, page_add(src, 6));
    let high = if stripe.upwards { dst_high.wrapping_sub(1) } else { dst_high.wrapping_add(1) };
    ctx.set_vac(u16::from_le_bytes([dst_low, high]));
    let cycles = if stripe.mirrored { 62 } else { 64 };
    SysResult::Again(cycles / 2, TaskState::Restart)
}

pub fn sprite6(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    draw_stripe(ctx, Stripe { mirrored: false, upwards: false })
}

/// Mirrored left to right; successive stripes go leftwards.
pub fn sprite6x(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    draw_stripe(ctx, Stripe { mirrored: true, upwards: false })
}

/// Upside down.
pub fn sprite6y(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    draw_stripe(ctx, Stripe { mirrored: false, upwards: true })
}

pub fn sprite6xy(ctx: &mut Context, _state: Option<TaskState>) -> SysResult {
    draw_stripe(ctx, Stripe { mirrored: true, upwards: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::tests::{calling, run_to_completion};

    #[test]
    fn copy_of_a_full_page_stays_in_page() {
        let mut ctx = calling("SYS_CopyMemory_v6_80");
        for i in 0..=255u8 {
            ctx.poke(0x3000 + i as u16, i);
        }
        ctx.set_sys_word(0, 0x4010);
        ctx.set_sys_word(2, 0x3000);
        ctx.set_vac(0);
        run_to_completion(&mut ctx, 72);
        for i in 0..=255u8 {
            assert_eq!(ctx.peek(0x4000 + page_add(0x10, i)), i);
        }
        assert_eq!(ctx.peek(0x4110), 0);
    }

    #[test]
    fn copy_under_a_small_budget_takes_many_slices() {
        let mut ctx = calling("SYS_CopyMemory_v6_80");
        ctx.ram_mut()[0x3000..0x3014].copy_from_slice(b"the quick brown fox!");
        ctx.set_sys_word(0, 0x5000);
        ctx.set_sys_word(2, 0x3000);
        ctx.set_vac(20);
        let slices = run_to_completion(&mut ctx, 40);
        assert_eq!(&ctx.ram()[0x5000..0x5014], b"the quick brown fox!");
        assert!(slices >= 4, "{slices}");
        assert_eq!(ctx.vac() & 0xff, 0);
    }

    #[test]
    fn set_memory_handles_remainders() {
        let mut ctx = calling("SYS_SetMemory_v2_54");
        ctx.set_sys_arg(0, 13);
        ctx.set_sys_arg(1, 0xaa);
        ctx.set_sys_word(2, 0x6000);
        run_to_completion(&mut ctx, 30);
        assert!(ctx.ram()[0x6000..0x600d].iter().all(|b| *b == 0xaa));
        assert_eq!(ctx.peek(0x600d), 0);
    }

    #[test]
    fn scan_finds_either_byte() {
        let mut ctx = calling("SYS_ScanMemory_v6_50");
        ctx.ram_mut()[0x3000..0x3010].copy_from_slice(b"abcdefghijklmnop");
        ctx.set_sys_word(0, 0x3000);
        ctx.set_sys_arg(2, b'z');
        ctx.set_sys_arg(3, b'l');
        ctx.set_vac(16);
        run_to_completion(&mut ctx, 30);
        assert_eq!(ctx.vac(), 0x300b);
    }

    #[test]
    fn scan_returns_zero_when_absent() {
        let mut ctx = calling("SYS_ScanMemory_v6_50");
        ctx.set_sys_word(0, 0x3000);
        ctx.set_sys_arg(2, 1);
        ctx.set_sys_arg(3, 2);
        ctx.set_vac(10);
        run_to_completion(&mut ctx, 30);
        assert_eq!(ctx.vac(), 0);
    }

    #[test]
    fn vertical_bits() {
        let mut ctx = calling("SYS_VDrawBits_134");
        ctx.set_sys_arg(0, 1);
        ctx.set_sys_arg(1, 2);
        ctx.set_sys_arg(2, 0b1010_0000);
        ctx.set_sys_word(4, 0x0820);
        run_to_completion(&mut ctx, 70);
        let column: [u8; 8] = core::array::from_fn(|i| ctx.peek(0x0820 + 0x100 * i as u16));
        assert_eq!(column, [2, 1, 2, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn read3_stays_in_the_rom_page() {
        let mut ctx = calling("SYS_Read3_40");
        ctx.rom.place(0x21fe, &[0x11, 0x22]).unwrap();
        ctx.rom.place(0x2100, &[0x33]).unwrap();
        ctx.rom.place(0x2200, &[0x99]).unwrap();
        ctx.set_sys_word(6, 0x21fe);
        run_to_completion(&mut ctx, 20);
        assert_eq!([ctx.sys_arg(0), ctx.sys_arg(1), ctx.sys_arg(2)], [0x11, 0x22, 0x33]);
        assert_eq!(ctx.sys_word(6), 0x21fe);
    }

    #[test]
    fn unpack_splits_three_bytes_into_four_pixels() {
        let pixels = [0x01u8, 0x2a, 0x15, 0x3f];
        let packed = pixels[0] as u32 | (pixels[1] as u32) << 6 | (pixels[2] as u32) << 12 | (pixels[3] as u32) << 18;
        let mut ctx = calling("SYS_Unpack_56");
        for (i, byte) in packed.to_le_bytes()[..3].iter().enumerate() {
            ctx.set_sys_arg(i as u8, *byte);
        }
        run_to_completion(&mut ctx, 28);
        assert_eq!([ctx.sys_arg(0), ctx.sys_arg(1), ctx.sys_arg(2), ctx.sys_arg(3)], pixels);
    }

    const TWO_ROWS: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0xfe];

    fn sprite(name: &str, dst: u16) -> Context {
        let mut ctx = calling(name);
        ctx.ram_mut()[0x3000..0x3000 + TWO_ROWS.len()].copy_from_slice(&TWO_ROWS);
        ctx.set_sys_word(0, 0x3000);
        ctx.set_vac(dst);
        ctx
    }

    fn row_at(ctx: &Context, at: u16) -> [u8; 6] {
        core::array::from_fn(|i| ctx.peek(at + i as u16))
    }

    #[test]
    fn sprite6_draws_a_row_per_invocation() {
        let mut ctx = sprite("SYS_Sprite6_v3_64", 0x0810);
        let slices = run_to_completion(&mut ctx, 32);
        assert_eq!(slices, 3);
        assert_eq!(row_at(&ctx, 0x0810), [1, 2, 3, 4, 5, 6]);
        assert_eq!(row_at(&ctx, 0x0910), [7, 8, 9, 10, 11, 12]);
        assert_eq!(ctx.peek(0x0a10), 0);
        // back up two lines and over to the next stripe
        assert_eq!(ctx.vac(), 0x0816);
        assert_eq!(ctx.sys_word(0), 0x300d);
    }

    #[test]
    fn mirrored_and_flipped_sprites() {
        let mut ctx = sprite("SYS_Sprite6x_v3_64", 0x0810);
        run_to_completion(&mut ctx, 32);
        assert_eq!(row_at(&ctx, 0x0810), [6, 5, 4, 3, 2, 1]);
        assert_eq!(row_at(&ctx, 0x0910), [12, 11, 10, 9, 8, 7]);
        assert_eq!(ctx.vac(), 0x080a);

        let mut ctx = sprite("SYS_Sprite6y_v3_64", 0x0910);
        run_to_completion(&mut ctx, 32);
        assert_eq!(row_at(&ctx, 0x0910), [1, 2, 3, 4, 5, 6]);
        assert_eq!(row_at(&ctx, 0x0810), [7, 8, 9, 10, 11, 12]);
        assert_eq!(ctx.vac(), 0x0916);

        let mut ctx = sprite("SYS_Sprite6xy_v3_64", 0x0910);
        run_to_completion(&mut ctx, 32);
        assert_eq!(row_at(&ctx, 0x0810), [12, 11, 10, 9, 8, 7]);
        assert_eq!(ctx.vac(), 0x090a);
    }

    #[test]
    fn sprite_rows_wrap_in_the_screen_line() {
        let mut ctx = sprite("SYS_Sprite6_v3_64", 0x08fd);
        run_to_completion(&mut ctx, 32);
        assert_eq!([ctx.peek(0x08fd), ctx.peek(0x08ff), ctx.peek(0x0800)], [1, 3, 4]);
        assert_eq!(ctx.vac(), 0x0803);
    }
}
