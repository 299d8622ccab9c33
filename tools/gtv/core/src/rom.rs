use alloc::boxed::Box;
use alloc::vec;
use core::fmt::{Display, Formatter};

/// The lookup page that doubles as the interrupt-return entry.
pub const RTI_PAGE: u8 = 4;

/// What a LUP into the ROM lookup space resolves to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Byte(u8),
    ReturnFromInterrupt,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RomOverflow {
    pub address: u16,
    pub len: usize,
}

impl Display for RomOverflow {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} bytes at {:#06x} run past the end of the lookup space", self.len, self.address)
    }
}

/// Read-only data the vCPU can reach through LUP and SYS_Exec.
#[derive(Clone)]
pub struct Rom {
    data: Box<[u8]>,
    rti_page: u8,
}

impl Rom {
    pub fn new() -> Self {
        Rom {
            data: vec![0u8; 0x10000].into_boxed_slice(),
            rti_page: RTI_PAGE,
        }
    }

    /// Copies `bytes` into the lookup space starting at `address`.
    pub fn place(&mut self, address: u16, bytes: &[u8]) -> Result<(), RomOverflow> {
        let start = address as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(RomOverflow { address, len: bytes.len() });
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    #[inline(always)]
    pub fn byte(&self, address: u16) -> u8 {
        self.data[address as usize]
    }

    pub fn lookup(&self, address: u16) -> Lookup {
        if (address >> 8) as u8 == self.rti_page {
            Lookup::ReturnFromInterrupt
        } else {
            Lookup::Byte(self.byte(address))
        }
    }

    pub fn rti_page(&self) -> u8 {
        self.rti_page
    }
}

impl Default for Rom {
    fn default() -> Self {
        Rom::new()
    }
}
