//! Byte-addressable memory with little-endian word access, bounds checking,
//! and a small `read_block`/`load_program` surface for bulk loads.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryError {
    pub address: u32,
    pub size: usize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out of bounds access at address {:#010x} (memory size {})",
            self.address, self.size
        )
    }
}

impl std::error::Error for MemoryError {}

/// A fixed-size byte array. `size` must be a power of two.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "memory size must be a power of two");
        Memory {
            bytes: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn resolve(&self, address: u32, cyclic: bool) -> Result<usize, MemoryError> {
        let addr = address as usize;
        if cyclic {
            return Ok(addr % self.bytes.len());
        }
        if addr + 4 > self.bytes.len() {
            return Err(MemoryError {
                address,
                size: self.bytes.len(),
            });
        }
        Ok(addr)
    }

    /// Reads a little-endian word. `cyclic` wraps the address modulo the
    /// memory size instead of failing out of range.
    pub fn read_word(&self, address: u32, cyclic: bool) -> Result<u32, MemoryError> {
        let addr = self.resolve(address, cyclic)?;
        if cyclic {
            let b = [
                self.bytes[addr % self.bytes.len()],
                self.bytes[(addr + 1) % self.bytes.len()],
                self.bytes[(addr + 2) % self.bytes.len()],
                self.bytes[(addr + 3) % self.bytes.len()],
            ];
            return Ok(u32::from_le_bytes(b));
        }
        let b: [u8; 4] = self.bytes[addr..addr + 4].try_into().unwrap();
        Ok(u32::from_le_bytes(b))
    }

    pub fn write_word(&mut self, address: u32, value: u32, cyclic: bool) -> Result<(), MemoryError> {
        let addr = self.resolve(address, cyclic)?;
        let b = value.to_le_bytes();
        if cyclic {
            let len = self.bytes.len();
            for (i, byte) in b.iter().enumerate() {
                self.bytes[(addr + i) % len] = *byte;
            }
            return Ok(());
        }
        self.bytes[addr..addr + 4].copy_from_slice(&b);
        Ok(())
    }

    /// Copies `n` contiguous bytes starting at `base`.
    pub fn read_block(&self, base: u32, n: usize) -> Result<Vec<u8>, MemoryError> {
        let addr = base as usize;
        if addr + n > self.bytes.len() {
            return Err(MemoryError {
                address: base,
                size: self.bytes.len(),
            });
        }
        Ok(self.bytes[addr..addr + n].to_vec())
    }

    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }

    /// Loads a byte stream starting at `base`. Fails with `OutOfBounds` if it
    /// doesn't fit. An empty program clears memory instead.
    pub fn load_program(&mut self, program: &[u8], base: u32) -> Result<(), MemoryError> {
        if program.is_empty() {
            self.clear();
            return Ok(());
        }
        let addr = base as usize;
        if addr + program.len() > self.bytes.len() {
            return Err(MemoryError {
                address: base,
                size: self.bytes.len(),
            });
        }
        self.bytes[addr..addr + program.len()].copy_from_slice(program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_access_is_little_endian() {
        let mut mem = Memory::new(256);
        mem.write_word(0, 0x0102_0304, false).unwrap();
        assert_eq!(mem.read_block(0, 4).unwrap(), vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(mem.read_word(0, false).unwrap(), 0x0102_0304);
    }

    #[test]
    fn boundary_access_at_size_minus_4_succeeds() {
        let mem = Memory::new(256);
        assert!(mem.read_word(252, false).is_ok());
        assert!(mem.read_word(253, false).is_err());
    }

    #[test]
    fn load_program_out_of_bounds_fails() {
        let mut mem = Memory::new(16);
        assert!(mem.load_program(&[0; 20], 0).is_err());
    }

    #[test]
    fn cyclic_read_wraps() {
        let mut mem = Memory::new(16);
        mem.write_word(12, 0xDEAD_BEEF, false).unwrap();
        assert_eq!(mem.read_word(12, true).unwrap(), 0xDEAD_BEEF);
        // address 16 wraps to 0, which is still zero
        assert_eq!(mem.read_word(16, true).unwrap(), 0);
    }

    #[test]
    fn empty_program_clears_memory() {
        let mut mem = Memory::new(16);
        mem.write_word(0, 0xFFFF_FFFF, false).unwrap();
        mem.load_program(&[], 0).unwrap();
        assert_eq!(mem.read_word(0, false).unwrap(), 0);
    }
}
