#![no_std]
#![allow(clippy::new_without_default)]
extern crate alloc;

pub mod timing;
pub mod context;
pub mod rom;
pub mod scheduler;
pub mod vcpu;
pub mod prefix;
pub mod sys;
pub mod v6502;
pub mod interrupt;
pub mod input;
pub mod audio;
pub mod entropy;
pub mod frame;
pub mod gt1;
pub mod machine;

pub use context::{Context, Interpreter, EmuPhase};
pub use frame::{NullSink, VideoSink};
pub use machine::{Config, ConfigError, Machine};
pub use timing::Timing;
