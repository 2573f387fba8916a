//! Multi-cycle datapath
//!
//! One instruction still completes per `step` call — "One
//! instruction per invocation" — but each bus is stamped with the
//! micro-cycle index (0..4: IF, ID, EX, MEM, WB) in which its value becomes
//! valid, instead of an abstract delay sum, and the pipeline-register
//! shadows are filled as if a single instruction were flowing through so a
//! renderer can animate it stage by stage. Reuses `super::single_cycle`'s
//! combinational logic verbatim and only re-labels `ready_at`/fills the
//! pipeline shadows, since the architectural result of one instruction is
//! identical in both backends (table just renames the
//! single-cycle stages as named micro-cycles).

use crate::memory::Memory;
use crate::register_file::RegisterFile;
use crate::signal::{ExMem, IdEx, IfId, MemWb, Signal, SignalRecord};

const IF: u32 = 0;
const ID: u32 = 1;
const EX: u32 = 2;
const MEM: u32 = 3;
const WB: u32 = 4;

/// Runs one instruction through the multi-cycle datapath. Delegates the
/// combinational computation to [`super::single_cycle::step`] and relabels
/// every bus's `ready_at` to the micro-cycle (0..4) it belongs to per the
/// stage table, then mirrors the final values into the
/// pipeline-register `_out` shadows so the stage-by-stage animation has
/// something to show.
pub fn step(pc: u32, imem: &Memory, dmem: &mut Memory, regs: &mut RegisterFile) -> SignalRecord {
    let mut rec = super::single_cycle::step(pc, imem, dmem, regs);

    rec.bus_pc.ready_at = IF;
    rec.bus_instr.ready_at = IF;
    rec.bus_pc_plus4.ready_at = IF;

    rec.bus_opcode.ready_at = ID;
    rec.bus_funct3.ready_at = ID;
    rec.bus_funct7.ready_at = ID;
    rec.bus_da.ready_at = ID;
    rec.bus_db.ready_at = ID;
    rec.bus_dc.ready_at = ID;
    rec.bus_control.ready_at = ID;
    rec.bus_pc_src.ready_at = ID;
    rec.bus_a.ready_at = ID;
    rec.bus_b.ready_at = ID;
    rec.bus_imm.ready_at = ID;
    rec.bus_imm_ext.ready_at = ID;

    rec.bus_alu_a.ready_at = EX;
    rec.bus_alu_b.ready_at = EX;
    rec.bus_alu_result.ready_at = EX;
    rec.bus_alu_zero.ready_at = EX;
    rec.bus_pc_dest.ready_at = EX;
    rec.bus_branch_taken.ready_at = EX;

    rec.bus_mem_address.ready_at = MEM;
    rec.bus_mem_write_data.ready_at = MEM;
    rec.bus_mem_read_data.ready_at = MEM;

    rec.bus_c.ready_at = WB;
    rec.bus_pc_next.ready_at = WB;

    // the number of active micro-cycles for this instruction; only used by
    // the renderer, not by any architectural computation
    let cycles = crate::isa::decode(rec.bus_instr.value)
        .map(|info| info.cycles as u32)
        .unwrap_or(3);
    rec.critical_time = cycles.saturating_sub(1);

    // Animate the instruction as if it had flowed through a single-stage
    // pipeline this cycle: the `_out` shadows hold its final per-stage
    // values, matching "fills the pipeline-register
    // shadows as if a single instruction were flowing through".
    rec.pipe.if_id_out = IfId {
        instr: Signal::new(rec.bus_instr.value, IF),
        npc: Signal::new(rec.bus_pc_plus4.value, IF),
        pc: Signal::new(pc, IF),
    };
    rec.pipe.id_ex_out = IdEx {
        control: Signal::new(rec.bus_control.value, ID),
        npc: Signal::new(rec.bus_pc_plus4.value, ID),
        pc: Signal::new(pc, ID),
        a: Signal::new(rec.bus_a.value, ID),
        b: Signal::new(rec.bus_b.value, ID),
        rd: Signal::new(rec.bus_dc.value as u8, ID),
        rs1: Signal::new(rec.bus_da.value, ID),
        rs2: Signal::new(rec.bus_db.value, ID),
        imm: Signal::new(rec.bus_imm_ext.value, ID),
        instr: Signal::new(rec.bus_instr.value, ID),
    };
    rec.pipe.ex_mem_out = ExMem {
        control: Signal::new(rec.bus_control.value, EX),
        npc: Signal::new(rec.bus_pc_plus4.value, EX),
        alu_result: Signal::new(rec.bus_alu_result.value, EX),
        b: Signal::new(rec.bus_b.value, EX),
        rd: Signal::new(rec.bus_dc.value as u8, EX),
        instr: Signal::new(rec.bus_instr.value, EX),
    };
    rec.pipe.mem_wb_out = MemWb {
        control: Signal::new(rec.bus_control.value, MEM),
        npc: Signal::new(rec.bus_pc_plus4.value, MEM),
        alu_result: Signal::new(rec.bus_alu_result.value, MEM),
        rm: Signal::new(rec.bus_mem_read_data.value, MEM),
        rd: Signal::new(rec.bus_dc.value as u8, MEM),
        instr: Signal::new(rec.bus_instr.value, MEM),
    };

    rec.if_instruction = rec.current_instruction.clone();
    rec.id_instruction = rec.current_instruction.clone();
    rec.ex_instruction = rec.current_instruction.clone();
    rec.mem_instruction = rec.current_instruction.clone();
    rec.wb_instruction = rec.current_instruction.clone();

    rec
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
    fn buses_are_labelled_by_micro_cycle() {
        let imem = assemble("addi x1, x0, 5\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let rec = step(0, &imem, &mut dmem, &mut regs);
        assert_eq!(rec.bus_pc.ready_at, IF);
        assert_eq!(rec.bus_a.ready_at, ID);
        assert_eq!(rec.bus_alu_result.ready_at, EX);
        assert_eq!(rec.bus_c.ready_at, WB);
    }

    #[test]
    fn load_takes_five_cycles() {
        let imem = assemble("lw x1, 0(x0)\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let rec = step(0, &imem, &mut dmem, &mut regs);
        assert_eq!(rec.critical_time, 4); // 5 cycles, 0-indexed critical_time
    }

    #[test]
    fn r_type_completes_in_three_cycles() {
        let imem = assemble("add x1, x0, x0\n");
        let mut dmem = Memory::new(DEFAULT_DMEM_SIZE);
        let mut regs = RegisterFile::new();
        let rec = step(0, &imem, &mut dmem, &mut regs);
        assert_eq!(rec.critical_time, 2);
    }
}
