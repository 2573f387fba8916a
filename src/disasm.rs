//! Dynamic disassembly from raw words: a pure function of `(word,
//! InstructionInfo)`. Unknown words render as a hex literal; the bubble
//! encoding `0x00000013` (`addi x0, x0, 0`) always renders as `nop`.

use crate::isa::{self, Format, ImmSrc};
use crate::sign_extend;

pub const NOP_WORD: u32 = 0x0000_0013;

pub fn disassemble(word: u32) -> String {
    if word == NOP_WORD {
        return "nop".to_string();
    }
    let Some(info) = isa::decode(word) else {
        return format!("0x{word:08x}");
    };
    let rd = (word >> 7) & 0x1f;
    let rs1 = (word >> 15) & 0x1f;
    let rs2 = (word >> 20) & 0x1f;
    match info.format {
        Format::R => format!("{} x{}, x{}, x{}", info.mnemonic, rd, rs1, rs2),
        Format::I => {
            let imm = sign_extend::extend(word, ImmSrc::I) as i32;
            if info.mnemonic == "jalr" {
                format!("{} x{}, {}(x{})", info.mnemonic, rd, imm, rs1)
            } else if matches!(info.mnemonic, "lb" | "lh" | "lw" | "lbu" | "lhu") {
                format!("{} x{}, {}(x{})", info.mnemonic, rd, imm, rs1)
            } else if matches!(info.mnemonic, "slli" | "srli" | "srai") {
                format!("{} x{}, x{}, {}", info.mnemonic, rd, rs1, rs2)
            } else {
                format!("{} x{}, x{}, {}", info.mnemonic, rd, rs1, imm)
            }
        }
        Format::S => {
            let imm = sign_extend::extend(word, ImmSrc::S) as i32;
            format!("{} x{}, {}(x{})", info.mnemonic, rs2, imm, rs1)
        }
        Format::B => {
            let imm = sign_extend::extend(word, ImmSrc::B) as i32;
            format!("{} x{}, x{}, {}", info.mnemonic, rs1, rs2, imm)
        }
        Format::U => {
            let imm = sign_extend::extend(word, ImmSrc::U) >> 12;
            format!("{} x{}, 0x{:x}", info.mnemonic, rd, imm)
        }
        Format::J => {
            let imm = sign_extend::extend(word, ImmSrc::J) as i32;
            format!("{} x{}, {}", info.mnemonic, rd, imm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_word_renders_as_nop() {
        assert_eq!(disassemble(NOP_WORD), "nop");
    }

    #[test]
    fn unknown_word_renders_as_hex() {
        assert_eq!(disassemble(0xFFFF_FFFF), "0xffffffff");
    }

    #[test]
    fn r_type_disassembles() {
        // add x1, x2, x3
        let word = (0b0000000 << 25) | (3 << 20) | (2 << 15) | (0 << 12) | (1 << 7) | 0b0110011;
        assert_eq!(disassemble(word), "add x1, x2, x3");
    }
}
