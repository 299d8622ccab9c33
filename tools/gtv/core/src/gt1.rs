//! GT1 program images.
//!
//! ```text
//! [addrH addrL len payload...]* 0 execH execL
//! ```
//!
//! A length byte of 0 means 256. Segments stay inside their page. The list
//! ends at the first zero address-high byte after the first segment, which
//! is allowed to load into page zero.

use alloc::vec::Vec;
use core::fmt::{Display, Formatter};
use log::debug;
use crate::context::{page_sub, Context};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub address: u16,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gt1 {
    pub segments: Vec<Segment>,
    /// Where execution starts once the segments are in place.
    pub exec: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Gt1Error {
    /// The image ended at `offset` in the middle of a header or payload.
    Truncated { offset: usize },
    CrossesPage { address: u16, len: usize },
    TrailingBytes { offset: usize },
    /// The segment lands past the end of the machine's RAM.
    OutOfRam { address: u16 },
}

impl Display for Gt1Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Gt1Error::Truncated { offset } => write!(f, "image truncated at byte {}", offset),
            Gt1Error::CrossesPage { address, len } => {
                write!(f, "segment of {} bytes at {:#06x} crosses a page boundary", len, address)
            }
            Gt1Error::TrailingBytes { offset } => write!(f, "unexpected data after the execution address at byte {}", offset),
            Gt1Error::OutOfRam { address } => write!(f, "segment at {:#06x} is outside RAM", address),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8, Gt1Error> {
        let b = *self.bytes.get(self.at).ok_or(Gt1Error::Truncated { offset: self.at })?;
        self.at += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&[u8], Gt1Error> {
        let end = self.at + n;
        let slice = self.bytes.get(self.at..end).ok_or(Gt1Error::Truncated { offset: self.bytes.len() })?;
        self.at = end;
        Ok(slice)
    }
}

impl Gt1 {
    pub fn parse(bytes: &[u8]) -> Result<Gt1, Gt1Error> {
        let mut r = Reader { bytes, at: 0 };
        let mut segments = Vec::new();

        loop {
            let hi = r.byte()?;
            if hi == 0 && !segments.is_empty() {
                break;
            }
            let address = u16::from_be_bytes([hi, r.byte()?]);
            let len = match r.byte()? {
                0 => 256,
                n => n as usize,
            };
            if (address & 0xff) as usize + len > 256 {
                return Err(Gt1Error::CrossesPage { address, len });
            }
            let data = r.take(len)?.to_vec();
            segments.push(Segment { address, data });
        }

        let exec = u16::from_be_bytes([r.byte()?, r.byte()?]);
        if r.at != bytes.len() {
            return Err(Gt1Error::TrailingBytes { offset: r.at });
        }
        debug!("parsed GT1 image: {} segments, entry {:#06x}", segments.len(), exec);
        Ok(Gt1 { segments, exec })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for s in &self.segments {
            out.extend_from_slice(&s.address.to_be_bytes());
            out.push(s.data.len() as u8);
            out.extend_from_slice(&s.data);
        }
        out.push(0);
        out.extend_from_slice(&self.exec.to_be_bytes());
        out
    }

    /// Checks every segment fits the RAM the context has.
    pub fn check(&self, ctx: &Context) -> Result<(), Gt1Error> {
        let mask = ctx.ram_size().mask();
        match self.segments.iter().find(|s| s.address & !mask != 0) {
            Some(s) => Err(Gt1Error::OutOfRam { address: s.address }),
            None => Ok(()),
        }
    }

    /// Writes the segments into RAM and points the vCPU at the entry, with
    /// vLR holding it as well.
    pub fn load(&self, ctx: &mut Context) -> Result<(), Gt1Error> {
        self.check(ctx)?;
        for s in &self.segments {
            let start = s.address as usize;
            ctx.ram_mut()[start..start + s.data.len()].copy_from_slice(&s.data);
        }
        ctx.set_vlr(self.exec);
        ctx.set_vpc(page_sub(self.exec, 2));
        Ok(())
    }
}
