use gtv_core::context::addr;
use gtv_core::gt1::{Gt1, Segment};
use gtv_core::input::{Button, Buttons};
use gtv_core::sys::SysTable;
use gtv_core::{Config, Machine, NullSink, VideoSink};
use proptest::prelude::*;

fn program(address: u16, code: &[u8]) -> Gt1 {
    Gt1 { segments: vec![Segment { address, data: code.to_vec() }], exec: address }
}

/// LDWI $1234, then loop on the BRA.
fn idle_with_ac() -> Gt1 {
    program(0x0300, &[0x11, 0x34, 0x12, 0x90, 0x01])
}

#[test]
fn interrupt_runs_once_per_frame_and_returns() {
    let mut machine = Machine::new(Config::default()).unwrap();
    machine.load_gt1(idle_with_ac()).unwrap();

    // LDI $77, INC $50, RTI
    let handler = [0x59, 0x77, 0x93, 0x50, 0x35, 0x7a];
    let ctx = machine.context_mut();
    ctx.ram_mut()[0x0400..0x0406].copy_from_slice(&handler);
    ctx.poke_word(addr::V_IRQ, 0x0400);
    ctx.poke(0x50, 0);

    for _ in 0..3 {
        machine.run_frame(&mut NullSink);
    }
    let ctx = machine.context();
    assert_eq!(ctx.peek(0x50), 3);
    assert_eq!(ctx.vac(), 0x1234);
    assert!(!ctx.irq_active);
}

#[test]
fn multiply_through_a_program() {
    let table = SysTable::with_defaults();
    let operand = table.get(0x009e).unwrap().operand();
    #[rustfmt::skip]
    let code = [
        0x11, 0x9e, 0x00, 0x2b, 0x22, // sysFn = SYS_Multiply_s16
        0x11, 0xd2, 0x04, 0x2b, 0x24, // A = 1234
        0x11, 0x34, 0x12, 0x2b, 0x26, // B = $1234
        0x11, 0x00, 0x00, 0x2b, 0x28, // C = 0
        0xb4, operand,
        0x90, 0x14,
    ];
    let mut machine = Machine::new(Config::default()).unwrap();
    machine.load_gt1(program(0x0300, &code)).unwrap();
    machine.run_frame(&mut NullSink);
    assert_eq!(machine.context().sys_word(4), 0xbea8);
}

#[test]
fn holding_start_restarts_the_program() {
    // LDI 7, ST $40, loop
    let mut machine = Machine::new(Config::default()).unwrap();
    machine.load_gt1(program(0x0300, &[0x59, 0x07, 0x5e, 0x40, 0x90, 0x02])).unwrap();
    machine.run_frame(&mut NullSink);
    assert_eq!(machine.context().peek(0x40), 7);

    machine.context_mut().poke(0x40, 0);
    machine.set_serial_input(Buttons::pressing(&[Button::Start]).bits());
    for _ in 0..100 {
        machine.run_frame(&mut NullSink);
    }
    assert_eq!(machine.context().peek(0x40), 0);
    for _ in 0..30 {
        machine.run_frame(&mut NullSink);
    }
    assert_eq!(machine.context().peek(0x40), 7);
}

#[test]
fn one_sample_every_four_lines() {
    let mut machine = Machine::new(Config::default()).unwrap();
    let mut audio = machine.take_audio().unwrap();
    machine.run_frame(&mut NullSink);
    let mut samples = 0;
    while let Ok(sample) = audio.pop() {
        assert_eq!(sample & 0x0f, 0);
        samples += 1;
    }
    assert!((125..=131).contains(&samples), "{} samples", samples);
}

struct Counting {
    lines: usize,
    frames: usize,
    widths: Vec<usize>,
}

impl VideoSink for Counting {
    fn scanline(&mut self, _line: u16, bytes: &[u8]) {
        self.lines += 1;
        self.widths.push(bytes.len());
    }

    fn frame_done(&mut self) {
        self.frames += 1;
    }
}

#[test]
fn frames_are_whole() {
    let mut machine = Machine::new(Config::default()).unwrap();
    let mut sink = Counting { lines: 0, frames: 0, widths: Vec::new() };
    for _ in 0..2 {
        let stats = machine.run_frame(&mut sink);
        assert_eq!(stats.lines, 521);
    }
    assert_eq!(sink.frames, 2);
    assert_eq!(sink.lines, 2 * 521);
    assert!(sink.widths.iter().all(|w| *w == 200));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn lines_never_overrun(code in proptest::collection::vec(any::<u8>(), 256), seed in any::<u64>()) {
        let config = Config { seed, sys_table: SysTable::empty(), ..Config::default() };
        let mut machine = Machine::new(config).unwrap();
        machine.load_gt1(program(0x0300, &code)).unwrap();
        for _ in 0..521 {
            let report = machine.run_line(&mut NullSink);
            prop_assert!(report.used <= report.budget, "line {}: {} of {}", report.line, report.used, report.budget);
        }
    }
}
