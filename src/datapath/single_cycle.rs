//! Single-cycle datapath
//!
//! One instruction completes every `step`; `ready_at` stamps on each
//! [`Signal`] report cumulative combinational delay (`crate::config::delay`)
//! so a renderer can draw the critical path.

use crate::alu;
use crate::config::delay;
use crate::control::ControlWord;
use crate::disasm;
use crate::isa::{self, Format, ImmSrc, Reg, ResSrc};
use crate::memory::Memory;
use crate::register_file::RegisterFile;
use crate::sign_extend::{self, INDETERMINADO};
use crate::signal::{Signal, SignalRecord};

/// Runs one instruction through the single-cycle datapath, mutating `dmem`
/// and `regs` in place. Returns the populated [`SignalRecord`] and the next
/// PC. Unrecognized instructions and out-of-bounds accesses are recovered
/// locally per logged, PC still advances by 4.
pub fn step(pc: u32, imem: &Memory, dmem: &mut Memory, regs: &mut RegisterFile) -> SignalRecord {
    let mut rec = SignalRecord::default();
    let mut t = delay::PC;
    rec.bus_pc = Signal::new(pc, t);
    t += delay::ADDER;
    let pc_plus4 = pc.wrapping_add(4);
    rec.bus_pc_plus4 = Signal::new(pc_plus4, t);

    t += delay::MEMORY;
    let instr = match imem.read_word(pc, false) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(pc, error = %e, "single-cycle: instruction fetch out of bounds, treating as NOP");
            rec.bus_instr = Signal::new(INDETERMINADO, t);
            rec.bus_pc_next = Signal::new(pc_plus4, t);
            rec.current_instruction = "nop".to_string();
            return rec;
        }
    };
    rec.bus_instr = Signal::new(instr, t);
    rec.current_instruction = disasm::disassemble(instr);

    let opcode = (instr & 0x7f) as u8;
    let funct3 = ((instr >> 12) & 0x7) as u8;
    let funct7 = ((instr >> 25) & 0x7f) as u8;
    let rd_idx = ((instr >> 7) & 0x1f) as u8;
    let rs1_idx = ((instr >> 15) & 0x1f) as u8;
    let rs2_idx = ((instr >> 20) & 0x1f) as u8;
    rec.bus_opcode = Signal::new(opcode, t);
    rec.bus_funct3 = Signal::new(funct3, t);
    rec.bus_funct7 = Signal::new(funct7, t);
    rec.bus_da = Signal::new(rs1_idx, t);
    rec.bus_db = Signal::new(rs2_idx, t);
    rec.bus_dc = Signal::new(rd_idx, t);

    t += delay::CONTROL;
    let Some(info) = isa::decode(instr) else {
        tracing::warn!(pc, instr = format!("{instr:#010x}"), "single-cycle: unrecognized instruction, treating as NOP");
        rec.bus_pc_next = Signal::new(pc_plus4, t);
        rec.current_instruction = "unrecognized".to_string();
        return rec;
    };
    let control = ControlWord::from_info(info);
    rec.bus_control = Signal::new(control, t);
    rec.bus_pc_src = Signal::new(control.pc_src, t);

    t += delay::REGS;
    let a = if control.is_auipc {
        pc
    } else if info.format == Format::U {
        0
    } else {
        regs.read_a(Reg(rs1_idx))
    };
    let b = regs.read_b(Reg(rs2_idx));
    rec.bus_a = Signal::new(a, t);
    rec.bus_b = Signal::new(b, t);

    let t_imm = t + delay::IMM_EXT;
    let imm = sign_extend::extend(instr, control.imm_src);
    rec.bus_imm = Signal::new(instr & imm_raw_mask(control.imm_src), t_imm);
    rec.bus_imm_ext = Signal::new(imm, t_imm);

    t = t.max(t_imm) + delay::MUX;
    let alu_a = a;
    let alu_b = if control.alu_src { imm } else { b };
    rec.bus_alu_a = Signal::new(alu_a, t);
    rec.bus_alu_b = Signal::new(alu_b, t);

    t += delay::ALU;
    let (alu_result, alu_zero) = if control.is_xor {
        alu::xor(alu_a, alu_b)
    } else {
        alu::alu(control.alu_ctr, alu_a, alu_b, control.alu_unsigned)
    };
    rec.bus_alu_result = Signal::new(alu_result, t);
    rec.bus_alu_zero = Signal::inactive(alu_zero, t);
    rec.bus_alu_zero.is_active = info.is_branch();

    let is_store = control.mem_wr;
    let is_load = !is_store && matches!(control.res_src, ResSrc::MemRead);
    let t_mem = t + delay::MEMORY;
    rec.bus_mem_address = Signal {
        value: alu_result,
        ready_at: t_mem,
        is_active: is_load || is_store,
    };
    let mut mem_read = 0u32;
    if is_store {
        rec.bus_mem_write_data = Signal::new(b, t_mem);
        if let Err(e) = dmem.write_word(alu_result, b, false) {
            tracing::warn!(pc, address = alu_result, error = %e, "single-cycle: store out of bounds");
        }
    } else {
        rec.bus_mem_write_data = Signal::inactive(0, t_mem);
    }
    if is_load {
        mem_read = match dmem.read_word(alu_result, false) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(pc, address = alu_result, error = %e, "single-cycle: load out of bounds");
                INDETERMINADO
            }
        };
    }
    rec.bus_mem_read_data = Signal {
        value: mem_read,
        ready_at: t_mem,
        is_active: is_load,
    };

    t = t_mem.max(t) + delay::MUX;
    let wb_value = match control.res_src {
        ResSrc::MemRead => mem_read,
        ResSrc::AluResult => alu_result,
        ResSrc::PcPlus4 => pc_plus4,
        ResSrc::Indeterminate => INDETERMINADO,
    };
    rec.bus_c = Signal::new(wb_value, t);

    t += delay::REG_WR;
    if control.br_wr {
        regs.write(Reg(rd_idx), wb_value);
    }
    let take_branch = if info.is_branch() {
        branch_condition(funct3, a, b)
    } else {
        info.is_jal() || info.is_jalr()
    };
    let branch_target = pc.wrapping_add(imm);
    let pc_dest = if info.is_jalr() { alu_result } else { branch_target };
    rec.bus_pc_dest = Signal {
        value: pc_dest,
        ready_at: t,
        is_active: take_branch,
    };
    rec.bus_branch_taken = Signal::new(take_branch, t);
    let next_pc = if take_branch { pc_dest } else { pc_plus4 };
    rec.bus_pc_next = Signal::new(next_pc, t);

    rec.critical_time = t;
    rec
}

/// Evaluates a conditional branch's `funct3`-selected predicate directly off
/// `rs1`/`rs2`: "Conditional branches decode `funct3` to
/// distinguish `beq`, `bne`, and optionally `blt/bge/bltu/bgeu`." The ALU's
/// `zero` flag (computed from `rs1 - rs2`, `alu_ctr = Sub` for every branch
/// in the control table) would answer `beq`/`bne` alone; the signed/unsigned
/// ordering comparisons for `blt`/`bge`/`bltu`/`bgeu` are evaluated here
/// instead so the same function handles the full funct3 space uniformly.
pub(crate) fn branch_condition(funct3: u8, a: u32, b: u32) -> bool {
    match funct3 {
        0b000 => a == b,                 // beq
        0b001 => a != b,                 // bne
        0b100 => (a as i32) < (b as i32), // blt
        0b101 => (a as i32) >= (b as i32), // bge
        0b110 => a < b,                   // bltu
        0b111 => a >= b,                  // bgeu
        _ => false,
    }
}

fn imm_raw_mask(imm_src: ImmSrc) -> u32 {
    match imm_src {
        ImmSrc::I => 0xFFF0_0000,
        ImmSrc::S => 0xFE00_0F80,
        ImmSrc::B => 0xFE00_0F80,
        ImmSrc::J => 0xFFFF_F000,
        ImmSrc::U => 0xFFFF_F000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DMEM_SIZE, DEFAULT_IMEM_SIZE};

    fn assemble(src: &str) -> Memory {
        let obj = crate::asm::assemble(src, crate::asm::AssembleOption::default()).unwrap();
        let mut imem = Memory::new(DEFAULT_IMEM_SIZE);
        imem.load_program(&obj.obj.binary, 0).unwrap();
        imem
    }

    #[test]
    fn addi_chain_scenario_a() {
        let imem = assemble("addi x1, x0, 5\naddi x2, x1, 7\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let mut pc = 0u32;
        let r1 = step(pc, &imem, &mut dmem, &mut regs);
        pc = r1.bus_pc_next.value;
        let r2 = step(pc, &imem, &mut dmem, &mut regs);
        pc = r2.bus_pc_next.value;
        assert_eq!(pc, 8);
        assert_eq!(regs.read(Reg(1)), 5);
        assert_eq!(regs.read(Reg(2)), 12);
    }

    #[test]
    fn store_load_round_trip_scenario_b() {
        let imem = assemble("addi x1, x0, 42\nsw x1, 0(x0)\nlw x2, 0(x0)\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let mut pc = 0u32;
        for _ in 0..3 {
            let r = step(pc, &imem, &mut dmem, &mut regs);
            pc = r.bus_pc_next.value;
        }
        assert_eq!(regs.read(Reg(1)), 42);
        assert_eq!(regs.read(Reg(2)), 42);
        assert_eq!(dmem.read_block(0, 4).unwrap(), vec![0x2A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn beq_taken_and_not_taken_scenario_c() {
        let src = "addi x1, x0, 3\naddi x2, x0, 3\nbeq x1, x2, 8\naddi x3, x0, 99\naddi x4, x0, 7\n";
        let imem = assemble(src);
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let mut pc = 0u32;
        for _ in 0..4 {
            let r = step(pc, &imem, &mut dmem, &mut regs);
            pc = r.bus_pc_next.value;
        }
        assert_eq!(regs.read(Reg(1)), 3);
        assert_eq!(regs.read(Reg(2)), 3);
        assert_eq!(regs.read(Reg(3)), 0);
        assert_eq!(regs.read(Reg(4)), 7);
        assert_eq!(pc, 20);
    }

    #[test]
    fn branch_offset_of_minus4_reexecutes() {
        // an infinite self-loop: after one step PC returns to itself
        let imem = assemble("beq x0, x0, -4\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let r = step(0, &imem, &mut dmem, &mut regs);
        assert_eq!(r.bus_pc_next.value, 0);
    }

    #[test]
    fn auipc_adds_its_own_pc_unlike_lui() {
        let imem = assemble("addi x1, x0, 0\nauipc x2, 0\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let r1 = step(0, &imem, &mut dmem, &mut regs);
        let pc = r1.bus_pc_next.value;
        assert_eq!(pc, 4);
        step(pc, &imem, &mut dmem, &mut regs);
        assert_eq!(regs.read(Reg(2)), 4);
    }

    #[test]
    fn lui_ignores_pc() {
        let imem = assemble("addi x1, x0, 0\naddi x1, x0, 0\nlui x2, 0\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let mut pc = 0u32;
        for _ in 0..3 {
            let r = step(pc, &imem, &mut dmem, &mut regs);
            pc = r.bus_pc_next.value;
        }
        assert_eq!(regs.read(Reg(2)), 0);
    }
}
