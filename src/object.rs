//! Assembled object representation: the little-endian byte stream plus the
//! symbol table, built around a growable byte vector since a program isn't
//! bounded to any fixed image size.

use std::collections::BTreeMap;
use std::fmt;

pub type SymbolMap = BTreeMap<String, u32>;

#[derive(Debug, Default)]
pub struct Object {
    pub binary: Vec<u8>,
    pub symbols: SymbolMap,
}

impl Object {
    pub fn write_word(&mut self, addr: u32, word: u32) {
        let addr = addr as usize;
        if self.binary.len() < addr + 4 {
            self.binary.resize(addr + 4, 0);
        }
        self.binary[addr..addr + 4].copy_from_slice(&word.to_le_bytes());
    }
}

/// One assembled line, retained for the `.yo`-style listing the CLI driver
/// prints (teacher: `ObjectExt`'s `Display` impl).
#[derive(Debug)]
pub struct SourceInfo {
    pub line_no: usize,
    pub addr: Option<u32>,
    pub word: Option<u32>,
    pub label: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ObjectExt {
    pub obj: Object,
    pub source: Vec<SourceInfo>,
}

impl fmt::Display for ObjectExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for src in &self.source {
            if let Some(addr) = src.addr {
                write!(f, "{addr:#010x}: ")?;
                if let Some(word) = src.word {
                    write!(f, "{word:08x}")?;
                } else {
                    write!(f, "        ")?;
                }
            } else {
                write!(f, "            ")?;
            }
            writeln!(f, "  | {}", src.text)?;
        }
        Ok(())
    }
}
