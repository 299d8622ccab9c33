mod sink;

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, ValueEnum};
use gtv_core::context::RamSize;
use gtv_core::gt1::Gt1;
use gtv_core::{Config, Machine};
use tracing::{info, Level};
use tracing_subscriber::util::SubscriberInitExt;

use crate::sink::FrameCapture;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Ram {
    #[value(name = "32k")]
    K32,
    #[value(name = "64k")]
    K64,
}

impl From<Ram> for RamSize {
    fn from(ram: Ram) -> Self {
        match ram {
            Ram::K32 => RamSize::K32,
            Ram::K64 => RamSize::K64,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gtv")]
#[command(version, about = "Runs a gtv program headless and dumps what it produced", long_about = None)]
struct Cli {
    /// GT1 program to boot (idles at 0x0200 without one)
    program: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 60)]
    frames: u32,

    /// Write the last frame as a PNG
    #[arg(long)]
    png: Option<PathBuf>,

    /// Write the audio stream as raw unsigned 8-bit samples
    #[arg(long)]
    pcm: Option<PathBuf>,

    /// Seed for the power-on RAM contents
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = Ram::K32)]
    ram: Ram,

    /// Video mode at power-on, 0 (all lines) to 3 (every fourth line)
    #[arg(long, default_value_t = 3)]
    mode: u8,

    /// Byte held on the controller port, e.g. 0xef for Start
    #[arg(long, value_parser = parse_byte)]
    input: Option<u8>,

    /// Log debug output from the core
    #[arg(short, long)]
    verbose: bool,
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("{s:?} is not a byte: {e}"))
}

/// What a run left behind.
#[derive(Debug, Default)]
struct Summary {
    frames: usize,
    cycles_offered: u64,
    cycles_used: u64,
    samples: usize,
}

fn run(cli: &Cli) -> Result<Summary> {
    let boot = match &cli.program {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let gt1 = Gt1::parse(&bytes).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
            Some(gt1)
        }
        None => None,
    };

    let config = Config {
        ram: cli.ram.into(),
        seed: cli.seed,
        video_mode: cli.mode,
        boot,
        ..Config::default()
    };
    let timing = config.timing;
    let mut machine = Machine::new(config).map_err(|e| anyhow!("bad machine configuration: {}", e))?;
    if let Some(raw) = cli.input {
        machine.set_serial_input(raw);
    }

    let mut audio = machine.take_audio().ok_or_else(|| anyhow!("audio stream already taken"))?;
    let mut capture = FrameCapture::new(&timing);
    let mut pcm = Vec::new();
    let mut summary = Summary::default();

    for _ in 0..cli.frames {
        let stats = machine.run_frame(&mut capture);
        summary.cycles_offered += stats.offered as u64;
        summary.cycles_used += stats.used as u64;
        while let Ok(sample) = audio.pop() {
            pcm.push(sample);
        }
    }
    summary.frames = capture.frames();
    summary.samples = pcm.len();

    if let Some(path) = &cli.png {
        let frame = capture.last_frame().ok_or_else(|| anyhow!("no complete frame to write"))?;
        frame.save(path).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    if let Some(path) = &cli.pcm {
        fs::write(path, &pcm).with_context(|| format!("writing {}", path.display()))?;
        let rate = timing.cpu_clock_hz as f64 / timing.cycles_per_line as f64 / 4.0;
        info!("wrote {} samples at {:.0} Hz to {}", pcm.len(), rate, path.display());
    }
    Ok(summary)
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .compact()
        .finish()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let summary = run(&cli)?;
    let busy = if summary.cycles_offered == 0 {
        0.0
    } else {
        100.0 * summary.cycles_used as f64 / summary.cycles_offered as f64
    };
    println!(
        "{} frames, {:.1}% of {} offered cycles used, {} audio samples",
        summary.frames, busy, summary.cycles_offered, summary.samples
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtv_core::gt1::Segment;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gtv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn bytes_parse_in_decimal_and_hex() {
        assert_eq!(parse_byte("239"), Ok(0xef));
        assert_eq!(parse_byte("0xef"), Ok(0xef));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("start").is_err());
    }

    #[test]
    fn arguments() {
        let parsed = cli(&["prog.gt1", "-f", "2", "--ram", "64k", "--input", "0xfe"]);
        assert_eq!(parsed.program, Some(PathBuf::from("prog.gt1")));
        assert_eq!(parsed.frames, 2);
        assert_eq!(parsed.ram, Ram::K64);
        assert_eq!(parsed.input, Some(0xfe));
        assert_eq!(parsed.mode, 3);
    }

    #[test]
    fn writes_a_frame_and_audio() {
        let dir = tempfile::tempdir().unwrap();
        // fill the first visible row with white, then loop
        let gt1 = Gt1 {
            segments: vec![
                Segment { address: 0x0800, data: vec![0x3f; 160] },
                Segment { address: 0x0300, data: vec![0x90, 0xfe] },
            ],
            exec: 0x0300,
        };
        let program = dir.path().join("white.gt1");
        fs::write(&program, gt1.to_bytes()).unwrap();
        let png = dir.path().join("frame.png");
        let pcm = dir.path().join("audio.pcm");

        let args = cli(&[
            program.to_str().unwrap(),
            "--frames", "2",
            "--png", png.to_str().unwrap(),
            "--pcm", pcm.to_str().unwrap(),
        ]);
        let summary = run(&args).unwrap();
        assert_eq!(summary.frames, 2);
        assert!(summary.cycles_used <= summary.cycles_offered);

        let frame = image::open(&png).unwrap().to_rgb8();
        assert_eq!(frame.dimensions(), (160, 480));
        assert_eq!(frame.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(fs::read(&pcm).unwrap().len(), summary.samples);
        assert!(summary.samples > 0);
    }

    #[test]
    fn bad_programs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("short.gt1");
        fs::write(&program, [0x02, 0x00, 4, 1]).unwrap();

        let err = run(&cli(&[program.to_str().unwrap(), "-f", "1"])).unwrap_err();
        assert!(err.to_string().contains("truncated"), "{err}");

        let missing = dir.path().join("missing.gt1");
        assert!(run(&cli(&[missing.to_str().unwrap()])).is_err());
    }
}
