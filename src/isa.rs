//! RV32I instruction set definition: register names, instruction formats,
//! and the static decode table consulted by [`crate::control::ControlDecoder`].

use std::fmt;

/// One of the 32 architectural integer registers. `X0` is hardwired to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reg(pub u8);

impl Reg {
    pub const ZERO: Reg = Reg(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Parses either an architectural name (`x0`..`x31`) or an ABI alias
    /// (`zero, ra, sp, gp, tp, t0..t6, s0/fp, s1..s11, a0..a7`).
    pub fn parse(s: &str) -> Option<Reg> {
        if let Some(rest) = s.strip_prefix('x') {
            let n: u8 = rest.parse().ok()?;
            return (n < 32).then_some(Reg(n));
        }
        let n = match s {
            "zero" => 0,
            "ra" => 1,
            "sp" => 2,
            "gp" => 3,
            "tp" => 4,
            "t0" => 5,
            "t1" => 6,
            "t2" => 7,
            "s0" | "fp" => 8,
            "s1" => 9,
            "a0" => 10,
            "a1" => 11,
            "a2" => 12,
            "a3" => 13,
            "a4" => 14,
            "a5" => 15,
            "a6" => 16,
            "a7" => 17,
            "s2" => 18,
            "s3" => 19,
            "s4" => 20,
            "s5" => 21,
            "s6" => 22,
            "s7" => 23,
            "s8" => 24,
            "s9" => 25,
            "s10" => 26,
            "s11" => 27,
            "t3" => 28,
            "t4" => 29,
            "t5" => 30,
            "t6" => 31,
            _ => return None,
        };
        Some(Reg(n))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Instruction format, as in the RISC-V manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

/// Selector consulted by [`crate::sign_extend`]; matches `ImmSrc` in the data
/// model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmSrc {
    I = 0,
    S = 1,
    B = 2,
    J = 3,
    U = 4,
}

/// The 3-bit ALU function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add = 0b000,
    Sub = 0b001,
    And = 0b010,
    Or = 0b011,
    Slt = 0b100,
    Srl = 0b101,
    Sll = 0b110,
    Sra = 0b111,
}

impl AluOp {
    pub fn from_bits(bits: u8) -> AluOp {
        match bits & 0b111 {
            0b000 => AluOp::Add,
            0b001 => AluOp::Sub,
            0b010 => AluOp::And,
            0b011 => AluOp::Or,
            0b100 => AluOp::Slt,
            0b101 => AluOp::Srl,
            0b110 => AluOp::Sll,
            _ => AluOp::Sra,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Where the write-back mux draws its value from (step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResSrc {
    MemRead = 0,
    AluResult = 1,
    PcPlus4 = 2,
    Indeterminate = 3,
}

impl ResSrc {
    pub fn from_bits(bits: u8) -> ResSrc {
        match bits & 0b11 {
            0 => ResSrc::MemRead,
            1 => ResSrc::AluResult,
            2 => ResSrc::PcPlus4,
            _ => ResSrc::Indeterminate,
        }
    }
}

/// Static per-opcode descriptor consulted by the decode table.
///
/// `alu_unsigned` is not part of the packed [`crate::control::ControlWord`]
/// (which carries exactly seven named control signals); it is extra
/// static information the execute stage reads directly off the matched
/// `InstructionInfo`, the same way `cycles` is — see the open-question
/// resolution in `DESIGN.md` for why `sltu`/`bltu`/`bgeu` need it even though
/// the ALU's 3-bit function table has no separate unsigned-compare slot.
#[derive(Debug, Clone, Copy)]
pub struct InstructionInfo {
    pub mnemonic: &'static str,
    pub format: Format,
    pub mask: u32,
    pub value: u32,
    pub pc_src: u8,
    pub br_wr: bool,
    pub alu_src: bool,
    pub alu_ctr: AluOp,
    pub mem_wr: bool,
    pub res_src: ResSrc,
    pub imm_src: ImmSrc,
    pub cycles: u8,
    pub alu_unsigned: bool,
}

impl InstructionInfo {
    pub fn is_branch(&self) -> bool {
        self.format == Format::B
    }

    pub fn is_jalr(&self) -> bool {
        self.pc_src == 2
    }

    /// JAL: always-taken jump that is not JALR and writes a link register.
    pub fn is_jal(&self) -> bool {
        self.pc_src == 1 && self.br_wr
    }
}

const OP_R: u32 = 0b0110011;
const OP_I: u32 = 0b0010011;
const OP_LOAD: u32 = 0b0000011;
const OP_STORE: u32 = 0b0100011;
const OP_BRANCH: u32 = 0b1100011;
const OP_JALR: u32 = 0b1100111;
const OP_JAL: u32 = 0b1101111;
const OP_LUI: u32 = 0b0110111;
const OP_AUIPC: u32 = 0b0010111;

const MASK_OPCODE: u32 = 0x7f;
const MASK_OP_F3: u32 = 0x7f | (0x7 << 12);
const MASK_OP_F3_F7: u32 = MASK_OP_F3 | (0x7f << 25);

fn val_op_f3(opcode: u32, funct3: u32) -> u32 {
    opcode | (funct3 << 12)
}

fn val_op_f3_f7(opcode: u32, funct3: u32, funct7: u32) -> u32 {
    val_op_f3(opcode, funct3) | (funct7 << 25)
}

/// The full RV32I base-integer control table: no RV64 (`*w`, `ld/sd/lwu`),
/// no M-extension (`mul*/div*/rem*`), no CSR/`ecall`/`ebreak`/`fence*`
/// (privilege and I/O are out of scope).
pub fn control_table() -> &'static [InstructionInfo] {
    use ImmSrc::*;
    use ResSrc::*;
    static TABLE: std::sync::OnceLock<Vec<InstructionInfo>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        vec![
            // R-type ALU
            InstructionInfo { mnemonic: "add", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b000, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "sub", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b000, 0b0100000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "sll", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b001, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Sll, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "slt", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b010, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Slt, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "sltu", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b011, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Slt, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: true },
            // xor has no dedicated AluOp slot (the literal 8-entry ALU table
            // is fully assigned to add/sub/and/or/slt/srl/sll/sra);
            // execute special-cases mnemonic "xor"/"xori" directly, see
            // `is_xor` below and DESIGN.md.
            InstructionInfo { mnemonic: "xor", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b100, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "srl", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b101, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Srl, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "sra", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b101, 0b0100000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Sra, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "or", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b110, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::Or, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "and", format: Format::R, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_R, 0b111, 0b0000000), pc_src: 0, br_wr: true, alu_src: false, alu_ctr: AluOp::And, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            // I-type ALU
            InstructionInfo { mnemonic: "addi", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b000), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "slti", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b010), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Slt, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "sltiu", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b011), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Slt, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: true },
            InstructionInfo { mnemonic: "xori", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b100), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "ori", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b110), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Or, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "andi", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_I, 0b111), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::And, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "slli", format: Format::I, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_I, 0b001, 0b0000000), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Sll, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "srli", format: Format::I, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_I, 0b101, 0b0000000), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Srl, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "srai", format: Format::I, mask: MASK_OP_F3_F7, value: val_op_f3_f7(OP_I, 0b101, 0b0100000), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Sra, mem_wr: false, res_src: AluResult, imm_src: I, cycles: 3, alu_unsigned: false },
            // Loads
            InstructionInfo { mnemonic: "lb", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_LOAD, 0b000), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: MemRead, imm_src: I, cycles: 5, alu_unsigned: false },
            InstructionInfo { mnemonic: "lh", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_LOAD, 0b001), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: MemRead, imm_src: I, cycles: 5, alu_unsigned: false },
            InstructionInfo { mnemonic: "lw", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_LOAD, 0b010), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: MemRead, imm_src: I, cycles: 5, alu_unsigned: false },
            InstructionInfo { mnemonic: "lbu", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_LOAD, 0b100), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: MemRead, imm_src: I, cycles: 5, alu_unsigned: false },
            InstructionInfo { mnemonic: "lhu", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_LOAD, 0b101), pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: MemRead, imm_src: I, cycles: 5, alu_unsigned: false },
            // Stores
            InstructionInfo { mnemonic: "sb", format: Format::S, mask: MASK_OP_F3, value: val_op_f3(OP_STORE, 0b000), pc_src: 0, br_wr: false, alu_src: true, alu_ctr: AluOp::Add, mem_wr: true, res_src: Indeterminate, imm_src: S, cycles: 4, alu_unsigned: false },
            InstructionInfo { mnemonic: "sh", format: Format::S, mask: MASK_OP_F3, value: val_op_f3(OP_STORE, 0b001), pc_src: 0, br_wr: false, alu_src: true, alu_ctr: AluOp::Add, mem_wr: true, res_src: Indeterminate, imm_src: S, cycles: 4, alu_unsigned: false },
            InstructionInfo { mnemonic: "sw", format: Format::S, mask: MASK_OP_F3, value: val_op_f3(OP_STORE, 0b010), pc_src: 0, br_wr: false, alu_src: true, alu_ctr: AluOp::Add, mem_wr: true, res_src: Indeterminate, imm_src: S, cycles: 4, alu_unsigned: false },
            // Branches
            InstructionInfo { mnemonic: "beq", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b000), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "bne", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b001), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "blt", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b100), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "bge", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b101), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "bltu", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b110), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: true },
            InstructionInfo { mnemonic: "bgeu", format: Format::B, mask: MASK_OP_F3, value: val_op_f3(OP_BRANCH, 0b111), pc_src: 1, br_wr: false, alu_src: false, alu_ctr: AluOp::Sub, mem_wr: false, res_src: Indeterminate, imm_src: B, cycles: 3, alu_unsigned: true },
            // Jumps
            InstructionInfo { mnemonic: "jalr", format: Format::I, mask: MASK_OP_F3, value: val_op_f3(OP_JALR, 0b000), pc_src: 2, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: PcPlus4, imm_src: I, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "jal", format: Format::J, mask: MASK_OPCODE, value: OP_JAL, pc_src: 1, br_wr: true, alu_src: false, alu_ctr: AluOp::Add, mem_wr: false, res_src: PcPlus4, imm_src: J, cycles: 3, alu_unsigned: false },
            // Upper-immediate
            InstructionInfo { mnemonic: "lui", format: Format::U, mask: MASK_OPCODE, value: OP_LUI, pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: U, cycles: 3, alu_unsigned: false },
            InstructionInfo { mnemonic: "auipc", format: Format::U, mask: MASK_OPCODE, value: OP_AUIPC, pc_src: 0, br_wr: true, alu_src: true, alu_ctr: AluOp::Add, mem_wr: false, res_src: AluResult, imm_src: U, cycles: 3, alu_unsigned: false },
        ]
    })
}

/// `rd = rs1 ^ rs2` / `rd = rs1 ^ imm` is computed by a dedicated XOR op
/// alongside the eight-entry [`AluOp`] table: RV32I's `xor`/`xori` have no
/// free 3-bit code left in that table, so the execute stage special-cases
/// these two mnemonics by name instead. See `DESIGN.md`.
pub fn is_xor(mnemonic: &str) -> bool {
    mnemonic == "xor" || mnemonic == "xori"
}

/// `auipc` shares `lui`'s U-type layout and `AluOp::Add` control word, but
/// adds the immediate to the current PC rather than to zero. The decode
/// table can't express "operand A is PC, not a register" on its own, so the
/// execute stage special-cases this mnemonic the same way it special-cases
/// `is_xor`.
pub fn is_auipc(mnemonic: &str) -> bool {
    mnemonic == "auipc"
}

pub fn decode(instruction: u32) -> Option<&'static InstructionInfo> {
    control_table()
        .iter()
        .find(|info| (instruction & info.mask) == info.value)
}

pub fn lookup_mnemonic(mnemonic: &str) -> Option<&'static InstructionInfo> {
    control_table().iter().find(|info| info.mnemonic == mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_parses_numeric_and_abi_names() {
        assert_eq!(Reg::parse("x5"), Some(Reg(5)));
        assert_eq!(Reg::parse("t0"), Some(Reg(5)));
        assert_eq!(Reg::parse("zero"), Some(Reg(0)));
        assert_eq!(Reg::parse("a0"), Some(Reg(10)));
        assert_eq!(Reg::parse("s0"), Some(Reg(8)));
        assert_eq!(Reg::parse("fp"), Some(Reg(8)));
        assert_eq!(Reg::parse("x32"), None);
        assert_eq!(Reg::parse("bogus"), None);
    }

    #[test]
    fn decode_finds_every_table_entry_by_round_trip() {
        // each control-table entry's own (mask, value) must self-match
        for info in control_table() {
            assert_eq!((info.value & info.mask), info.value, "{}", info.mnemonic);
            let decoded = decode(info.value).unwrap_or_else(|| panic!("{} failed to decode", info.mnemonic));
            assert_eq!(decoded.mnemonic, info.mnemonic);
        }
    }

    #[test]
    fn unknown_word_has_no_match() {
        assert!(decode(0xFFFF_FFFF).is_none());
    }
}
