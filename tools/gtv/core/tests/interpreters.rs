use gtv_core::context::{addr, page_sub, EmuPhase, Interpreter, RamSize};
use gtv_core::rom::Rom;
use gtv_core::scheduler::{run_slice, TickBudget};
use gtv_core::sys::SysTable;
use gtv_core::v6502::{self, reg, Decode};
use gtv_core::{vcpu, Context, Timing};
use proptest::prelude::*;
use std::cmp::Ordering;

fn blank() -> Context {
    Context::new(Timing::default(), RamSize::K64, Rom::new(), SysTable::empty())
}

fn program(code: &[u8]) -> Context {
    let mut ctx = blank();
    ctx.ram_mut()[0x0200..0x0200 + code.len()].copy_from_slice(code);
    ctx.set_vpc(page_sub(0x0200, 2));
    ctx
}

/// Runs vCPU code with a budget in cycles and returns the cycles used.
fn step(ctx: &mut Context, cycles: u16) -> u16 {
    let mut budget = TickBudget::new(cycles / 2);
    vcpu::run(ctx, &mut budget);
    budget.used() * 2
}

/// Either word, or one close to the first so the high bytes often agree.
fn word_pair() -> impl Strategy<Value = (u16, u16)> {
    prop_oneof![
        (any::<u16>(), any::<u16>()),
        (any::<u16>(), -300i32..300).prop_map(|(a, d)| (a, a.wrapping_add(d as u16))),
    ]
}

fn sign_of(v: u16) -> Ordering {
    (v as i16).cmp(&0)
}

fn interpreter() -> impl Strategy<Value = Interpreter> {
    prop_oneof![
        Just(Interpreter::Vcpu),
        Just(Interpreter::V6502(EmuPhase::Fetch)),
        Just(Interpreter::V6502(EmuPhase::Execute)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn slices_never_overrun(
        code in proptest::collection::vec(any::<u8>(), 0x0600),
        zero_page in proptest::collection::vec(any::<u8>(), 0x100),
        pc in 0x0200u16..0x0800,
        selected in interpreter(),
        budget in any::<u16>(),
    ) {
        let mut ctx = blank();
        ctx.ram_mut()[0x0200..0x0800].copy_from_slice(&code);
        ctx.ram_mut()[0x0030..0x0100].copy_from_slice(&zero_page[0x30..]);
        ctx.set_vpc(pc);
        ctx.set_vlr(pc);
        ctx.set_interpreter(selected);

        let timing = ctx.timing;
        let used = run_slice(&mut ctx, budget);
        let granted = if budget == u16::MAX { timing.max_slice_cycles() } else { budget };
        prop_assert!(used <= granted, "used {} of {}", used, granted);
        if granted < timing.min_slice_cycles() {
            prop_assert_eq!(used, 0);
        }
    }

    #[test]
    fn v6502_decode_retry_changes_nothing(
        code in proptest::array::uniform3(any::<u8>()),
        zero_page in proptest::collection::vec(any::<u8>(), 0x100),
        x in any::<u8>(),
        y in any::<u8>(),
        first in 0u16..60,
    ) {
        let setup = || {
            let mut ctx = blank();
            ctx.ram_mut()[0x0040..0x0100].copy_from_slice(&zero_page[0x40..]);
            ctx.ram_mut()[0x0300..0x0303].copy_from_slice(&code);
            ctx.set_sys_arg(reg::X, x);
            ctx.set_sys_arg(reg::Y, y);
            ctx.set_vlr(0x0300);
            ctx
        };

        let mut reference = setup();
        let mut wide = TickBudget::new(60);
        prop_assert_eq!(v6502::decode(&mut reference, &mut wide), Decode::Ready);

        let mut ctx = setup();
        let before = ctx.ram().to_vec();
        let mut narrow = TickBudget::new(first);
        let used = match v6502::decode(&mut ctx, &mut narrow) {
            Decode::Ready => narrow.used(),
            Decode::Retry => {
                prop_assert_eq!(narrow.used(), 0);
                prop_assert_eq!(ctx.ram(), &before[..]);
                let mut again = TickBudget::new(60);
                prop_assert_eq!(v6502::decode(&mut ctx, &mut again), Decode::Ready);
                again.used()
            }
        };

        prop_assert_eq!(used, wide.used());
        prop_assert_eq!(ctx.sys_word(reg::ADL), reference.sys_word(reg::ADL));
        prop_assert_eq!(ctx.ram(), reference.ram());
    }

    #[test]
    fn word_compares_leave_the_sign_of_the_order((a, b) in word_pair()) {
        for (op, expected) in [(0xd3u8, (a as i16).cmp(&(b as i16))), (0xd6, a.cmp(&b))] {
            let mut ctx = program(&[op, 0x40]);
            ctx.set_vac(a);
            ctx.poke_word(0x40, b);
            let used = step(&mut ctx, 30);
            prop_assert!(used == 26 || used == 30, "used {}", used);
            prop_assert_eq!(ctx.vpc(), 0x0200);
            prop_assert_eq!(sign_of(ctx.vac()), expected, "op {:#04x} {:#06x} vs {:#06x}", op, a, b);
        }
    }

    #[test]
    fn immediate_compares_leave_the_sign_of_the_order(a in prop_oneof![any::<u16>(), 0u16..0x100], i in any::<u8>()) {
        for (op, expected) in [(0xd9u8, (a as i16).cmp(&(i as i16))), (0xdb, a.cmp(&(i as u16)))] {
            let mut ctx = program(&[op, i]);
            ctx.set_vac(a);
            prop_assert!(step(&mut ctx, 30) <= 30);
            prop_assert_eq!(sign_of(ctx.vac()), expected, "op {:#04x} {:#06x} vs {:#04x}", op, a, i);
        }
    }
}

#[test]
fn long_branches_jump_anywhere() {
    // op, vAC, taken, cycles
    for (op, ac, taken, cycles) in [
        (0x3f, 0x0000, true, 26),
        (0x3f, 0x0100, false, 24),
        (0x72, 0x0100, true, 26),
        (0x72, 0x0000, false, 24),
        (0x50, 0x8000, true, 26),
        (0x50, 0x0000, false, 22),
        (0x53, 0x0000, true, 26),
        (0x53, 0xffff, false, 22),
        (0x4d, 0x0001, true, 26),
        (0x4d, 0x0000, false, 26),
        (0x4d, 0x8000, false, 22),
        (0x56, 0x0000, true, 26),
        (0x56, 0xff00, true, 26),
        (0x56, 0x0001, false, 26),
    ] {
        let mut ctx = program(&[op, 0xfe, 0x04]);
        ctx.set_vac(ac);
        assert_eq!(step(&mut ctx, 26), cycles, "op {op:#04x} vAC {ac:#06x}");
        let expected = if taken { 0x04fe } else { 0x0201 };
        assert_eq!(ctx.vpc(), expected, "op {op:#04x} vAC {ac:#06x}");
        assert_eq!(ctx.vac(), ac);
    }
}

#[test]
fn long_branch_then_falls_into_the_next_instruction() {
    let mut ctx = program(&[
        0x72, 0x10, 0x03, // JNE $0312
        0x59, 0x01,       // LDI 1
    ]);
    ctx.ram_mut()[0x0312..0x0314].copy_from_slice(&[0x59, 0x02]);
    step(&mut ctx, 26 + 16);
    assert_eq!(ctx.vac(), 1);
    assert_eq!(ctx.vpc(), 0x0203);

    ctx.set_vpc(page_sub(0x0200, 2));
    ctx.set_vac(7);
    step(&mut ctx, 26 + 16);
    assert_eq!(ctx.vac(), 2);
    assert_eq!(ctx.vpc(), 0x0312);
}

#[test]
fn quick_moves_into_zero_page() {
    let mut ctx = program(&[
        0x39, 0x7b, 0x40, // MOVQB [$40] := $7b
        0x3b, 0x05, 0x42, // MOVQW [$42] := 5
        0x78, 0x05,       // LDNI 5
    ]);
    ctx.poke_word(0x42, 0xffff);
    assert_eq!(step(&mut ctx, 28 + 30 + 16), 28 + 30 + 16);
    assert_eq!(ctx.peek(0x40), 0x7b);
    assert_eq!(ctx.peek_word(0x42), 5);
    assert_eq!(ctx.vac(), 0xff05);
    assert_eq!(ctx.vpc(), 0x0206);
}

#[test]
fn stores_through_vac() {
    let mut ctx = program(&[0x46, 0x99]); // POKEQ $99
    ctx.set_vac(0x3000);
    assert_eq!(step(&mut ctx, 20), 20);
    assert_eq!(ctx.peek(0x3000), 0x99);

    let mut ctx = program(&[0x44, 0x21]); // DOKEQ $21
    ctx.set_vac(0x3000);
    ctx.poke(0x3001, 0xee);
    assert_eq!(step(&mut ctx, 22), 22);
    assert_eq!(ctx.peek_word(0x3000), 0x0021);

    let mut ctx = program(&[0x48, 0x40]); // POKEA $40
    ctx.set_vac(0x3000);
    ctx.poke(0x40, 0x5a);
    assert_eq!(step(&mut ctx, 22), 22);
    assert_eq!(ctx.peek(0x3000), 0x5a);

    // the high byte stays in vAC's page
    let mut ctx = program(&[0x7d, 0x42]); // DOKEA $42
    ctx.set_vac(0x30ff);
    ctx.poke_word(0x42, 0xbeef);
    assert_eq!(step(&mut ctx, 28), 28);
    assert_eq!(ctx.peek(0x30ff), 0xef);
    assert_eq!(ctx.peek(0x3000), 0xbe);
    assert_eq!(ctx.vac(), 0x30ff);
}

#[test]
fn loads_through_pointers() {
    let mut ctx = program(&[
        0x41, 0x40, // DEEKV $40
        0x2b, 0x46, // STW $46
        0xdd, 0x40, // PEEKV $40
    ]);
    ctx.poke_word(0x40, 0x3000);
    ctx.poke_word(0x3000, 0x1234);
    assert_eq!(step(&mut ctx, 28 + 20 + 28), 28 + 20 + 28);
    assert_eq!(ctx.peek_word(0x46), 0x1234);
    assert_eq!(ctx.vac(), 0x0034);

    let mut ctx = program(&[0x3d, 0x44]); // DEEKA $44
    ctx.set_vac(0x3000);
    ctx.poke_word(0x3000, 0xcafe);
    assert_eq!(step(&mut ctx, 30), 30);
    assert_eq!(ctx.peek_word(0x44), 0xcafe);
    assert_eq!(ctx.vac(), 0x3000);
}

#[test]
fn add_and_subtract_into_variables() {
    let mut ctx = program(&[
        0x66, 0x40, // ADDV $40
        0x68, 0x42, // SUBV $42
    ]);
    ctx.set_vac(0x0101);
    ctx.poke_word(0x40, 0x00ff);
    ctx.poke_word(0x42, 0x0001);
    assert_eq!(step(&mut ctx, 60), 60);
    assert_eq!(ctx.peek_word(0x40), 0x0200);
    assert_eq!(ctx.peek_word(0x42), 0xff00);
    assert_eq!(ctx.vac(), 0x0101);
}

fn calling(name: &str, code_after: &[u8]) -> Context {
    let table = SysTable::with_defaults();
    let address = table.address_of(name).unwrap();
    let operand = table.get(address).unwrap().operand();
    let mut ctx = Context::new(Timing::default(), RamSize::K64, Rom::new(), table);
    ctx.ram_mut()[0x0200..0x0204].copy_from_slice(&[0xb4, operand, 0x90, 0x00]);
    ctx.ram_mut()[0x0300..0x0300 + code_after.len()].copy_from_slice(code_after);
    ctx.set_sys_fn(address);
    ctx.set_vpc(page_sub(0x0200, 2));
    ctx
}

#[test]
fn run6502_keeps_the_accumulator_and_stack() {
    // ADC #$01, BRK
    let mut ctx = calling("SYS_Run6502_v4_80", &[0x69, 0x01, 0x00]);
    ctx.set_vac(0x1142);
    ctx.set_vlr(0x0300);
    ctx.set_vsp(0x80);

    for _ in 0..4 {
        run_slice(&mut ctx, u16::MAX);
        if ctx.interpreter == Interpreter::Vcpu && ctx.vac() == 0x0043 {
            break;
        }
    }
    assert_eq!(ctx.interpreter, Interpreter::Vcpu);
    assert_eq!(ctx.vac(), 0x0043);
    assert_eq!(ctx.vsp(), 0x80);
    assert_eq!(ctx.vpc(), 0x0200);
}

#[test]
fn multiply_finishes_over_narrow_slices() {
    let mut ctx = calling("SYS_Multiply_s16_v6_66", &[]);
    ctx.set_sys_word(0, 1234);
    ctx.set_sys_word(2, 0x1234);
    ctx.set_sys_word(4, 0);

    // one SYS call per slice at most
    let narrow = ctx.timing.min_slice_cycles().max(14 + 2 * 40);
    let mut slices = 0;
    while ctx.vpc() == page_sub(0x0200, 2) {
        slices += 1;
        assert!(slices < 10, "multiply never finished");
        let used = run_slice(&mut ctx, narrow);
        assert!(used <= narrow);
    }
    assert!(slices >= 2);
    assert_eq!(ctx.sys_word(4), 0xbea8);
    assert_eq!(ctx.vac(), 0xbea8);
    assert!(ctx.sys_task.is_none());
}

#[test]
fn empty_slot_costs_the_placeholder() {
    let mut ctx = blank();
    ctx.ram_mut()[0x0200..0x0204].copy_from_slice(&[0xb4, 0x00, 0x90, 0x00]);
    ctx.set_sys_fn(0x1234);
    ctx.set_vpc(page_sub(0x0200, 2));
    ctx.poke(addr::V_AC, 0x55);
    run_slice(&mut ctx, 200);
    assert_eq!(ctx.vpc(), 0x0200);
    assert_eq!(ctx.peek(addr::V_AC), 0x55);
}

#[test]
fn multiply_result_does_not_depend_on_slicing() {
    let timing = Timing::default();
    let smallest = gtv_core::frame::smallest_slice(&timing).unwrap();
    for budget in [smallest, 120, 160, u16::MAX] {
        let mut ctx = calling("SYS_Multiply_s16_v6_66", &[]);
        ctx.set_sys_word(0, 300);
        ctx.set_sys_word(2, 7);
        ctx.set_sys_word(4, 0);
        for _ in 0..10 {
            run_slice(&mut ctx, budget);
            if ctx.vpc() != page_sub(0x0200, 2) {
                break;
            }
        }
        assert_eq!(ctx.sys_word(4), 2100, "budget {}", budget);
        assert_eq!(ctx.vac(), 2100);
    }
}
