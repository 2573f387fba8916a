//! 5-stage pipelined datapath with forwarding, hazard, and flush — the only
//! component where correctness is non-trivial.
//!
//! Every clock recomputes all five stages in reverse order, WB → MEM → EX →
//! ID → IF, reading only the `_out` shadow of each pipeline register (the
//! value latched on the *previous* rising edge) and writing only the input
//! side of the register one stage ahead. Running WB before ID also gives the
//! write-first register file policy for free: by the time ID reads `regs`,
//! WB's write for this cycle has already landed.

use crate::alu;
use crate::config::SimConfig;
use crate::control::ControlWord;
use crate::disasm;
use crate::isa::{self, Format, Reg, ResSrc};
use crate::memory::Memory;
use crate::register_file::RegisterFile;
use crate::sign_extend::{self, INDETERMINADO};
use crate::signal::{ExMem, IdEx, IfId, MemWb, PipeRegs, Signal, SignalRecord};

/// Forward from `EX/MEM.ALU_result`.
const FWD_EX_MEM: u8 = 0;
/// No forwarding: operand comes straight off `ID/EX`.
const FWD_NONE: u8 = 1;
/// Forward from the value `MEM/WB` is writing back this cycle.
const FWD_MEM_WB: u8 = 2;

/// Runs one clock of the pipelined datapath. `pipe` is the simulator's
/// persistent set of pipeline registers, mutated in place; its `_out` shadows
/// going in hold what was latched on the previous edge, and `pipe.latch()` is
/// called at the end of this function to produce the shadows the *next* call
/// will read. Returns the populated [`SignalRecord`] and the PC the next
/// clock should fetch from.
pub fn step(
    pc: u32,
    pipe: &mut PipeRegs,
    imem: &Memory,
    dmem: &mut Memory,
    regs: &mut RegisterFile,
    config: &SimConfig,
) -> (SignalRecord, u32) {
    let mut rec = SignalRecord::default();

    // ---------------------------------------------------------------- WB --
    let mem_wb = pipe.mem_wb_out.clone();
    let wb_ctrl = mem_wb.control.value;
    let wb_value = match wb_ctrl.res_src {
        ResSrc::MemRead => mem_wb.rm.value,
        ResSrc::AluResult => mem_wb.alu_result.value,
        ResSrc::PcPlus4 => mem_wb.npc.value,
        ResSrc::Indeterminate => INDETERMINADO,
    };
    let wb_writes = mem_wb.control.is_active && wb_ctrl.br_wr && mem_wb.rd.value != 0;
    if wb_writes && config.write_first {
        regs.write(Reg(mem_wb.rd.value), wb_value);
    }
    rec.bus_c = Signal {
        value: wb_value,
        ready_at: 1,
        is_active: wb_writes,
    };
    rec.wb_instruction = if mem_wb.control.is_active {
        disasm::disassemble(mem_wb.instr.value)
    } else {
        "nop".to_string()
    };

    // --------------------------------------------------------------- MEM --
    let ex_mem = pipe.ex_mem_out.clone();
    let mem_ctrl = ex_mem.control.value;
    let is_store = ex_mem.control.is_active && mem_ctrl.mem_wr;
    let is_load = ex_mem.control.is_active && !mem_ctrl.mem_wr && matches!(mem_ctrl.res_src, ResSrc::MemRead);
    if is_store {
        if let Err(e) = dmem.write_word(ex_mem.alu_result.value, ex_mem.b.value, false) {
            tracing::warn!(address = ex_mem.alu_result.value, error = %e, "pipelined: store out of bounds");
        }
    }
    let mem_read = if is_load {
        match dmem.read_word(ex_mem.alu_result.value, false) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(address = ex_mem.alu_result.value, error = %e, "pipelined: load out of bounds");
                INDETERMINADO
            }
        }
    } else {
        0
    };
    rec.bus_mem_address = Signal {
        value: ex_mem.alu_result.value,
        ready_at: 1,
        is_active: is_store || is_load,
    };
    rec.bus_mem_write_data = Signal {
        value: ex_mem.b.value,
        ready_at: 1,
        is_active: is_store,
    };
    rec.bus_mem_read_data = Signal {
        value: mem_read,
        ready_at: 1,
        is_active: is_load,
    };
    rec.mem_instruction = if ex_mem.control.is_active {
        disasm::disassemble(ex_mem.instr.value)
    } else {
        "nop".to_string()
    };

    pipe.mem_wb = MemWb {
        control: Signal {
            value: mem_ctrl,
            ready_at: 1,
            is_active: ex_mem.control.is_active,
        },
        npc: Signal::new(ex_mem.npc.value, 1),
        alu_result: Signal::new(ex_mem.alu_result.value, 1),
        rm: Signal::new(mem_read, 1),
        rd: Signal::new(ex_mem.rd.value, 1),
        instr: Signal::new(ex_mem.instr.value, 1),
    };

    // ---------------------------------------------------------------- EX --
    let id_ex = pipe.id_ex_out.clone();
    let ex_ctrl = id_ex.control.value;
    let ex_active = id_ex.control.is_active;

    let (fwd_a_sel, forwarded_a) = forward(config, &ex_mem, &mem_wb, id_ex.rs1.value, id_ex.a.value, wb_value);
    let (fwd_b_sel, forwarded_b) = forward(config, &ex_mem, &mem_wb, id_ex.rs2.value, id_ex.b.value, wb_value);
    rec.bus_control_forward_a = Signal::new(fwd_a_sel, 1);
    rec.bus_control_forward_b = Signal::new(fwd_b_sel, 1);
    rec.bus_forward_a = Signal::new(forwarded_a, 1);
    rec.bus_forward_b = Signal::new(forwarded_b, 1);

    // `auipc`'s ALU operand A is the instruction's own PC, not a register
    // value, so it bypasses the forwarding mux entirely (its `rs1` bits
    // are immediate bits, not a real source register).
    let alu_a = if ex_ctrl.is_auipc { id_ex.pc.value } else { forwarded_a };
    let alu_b = if ex_ctrl.alu_src { id_ex.imm.value } else { forwarded_b };
    let (alu_result, alu_zero) = if ex_ctrl.is_xor {
        alu::xor(alu_a, alu_b)
    } else {
        alu::alu(ex_ctrl.alu_ctr, alu_a, alu_b, ex_ctrl.alu_unsigned)
    };
    rec.bus_alu_a = Signal::new(alu_a, 1);
    rec.bus_alu_b = Signal::new(alu_b, 1);
    rec.bus_alu_result = Signal::new(alu_result, 1);

    let is_branch_fmt = ex_ctrl.is_branch_format();
    rec.bus_alu_zero = Signal {
        value: alu_zero,
        ready_at: 1,
        is_active: is_branch_fmt,
    };
    let take_branch = ex_active
        && if is_branch_fmt {
            super::single_cycle::branch_condition(id_ex.rd.value, forwarded_a, forwarded_b)
        } else {
            ex_ctrl.is_jal() || ex_ctrl.is_jalr()
        };
    let branch_target = id_ex.pc.value.wrapping_add(id_ex.imm.value);
    let pc_dest = if ex_ctrl.is_jalr() { alu_result } else { branch_target };
    rec.bus_pc_dest = Signal {
        value: pc_dest,
        ready_at: 1,
        is_active: take_branch,
    };
    rec.bus_branch_taken = Signal::new(take_branch, 1);
    rec.ex_instruction = if ex_active {
        disasm::disassemble(id_ex.instr.value)
    } else {
        "nop".to_string()
    };

    let flush = config.branch_flush && take_branch;

    pipe.ex_mem = ExMem {
        control: Signal {
            value: ex_ctrl,
            ready_at: 1,
            is_active: ex_active,
        },
        npc: Signal::new(id_ex.npc.value, 1),
        alu_result: Signal::new(alu_result, 1),
        b: Signal::new(forwarded_b, 1),
        rd: Signal::new(id_ex.rd.value, 1),
        instr: Signal::new(id_ex.instr.value, 1),
    };

    // ---------------------------------------------------------------- ID --
    let if_id = pipe.if_id_out.clone();
    let fetched = if_id.instr.value;
    let rs1_idx = ((fetched >> 15) & 0x1f) as u8;
    let rs2_idx = ((fetched >> 20) & 0x1f) as u8;

    let load_use_hazard = config.load_use_hazard
        && ex_active
        && !ex_ctrl.mem_wr
        && matches!(ex_ctrl.res_src, ResSrc::MemRead)
        && id_ex.rd.value != 0
        && (id_ex.rd.value == rs1_idx || id_ex.rd.value == rs2_idx);
    let stall = load_use_hazard && !flush;
    rec.bus_stall = Signal::new(stall, 1);
    rec.bus_flush = Signal::new(flush, 1);

    let decoded = if flush || stall {
        IdEx::default()
    } else {
        match isa::decode(fetched) {
            None => {
                if if_id.instr.is_active {
                    tracing::warn!(instr = format!("{fetched:#010x}"), "pipelined: unrecognized instruction, treating as NOP");
                }
                IdEx::default()
            }
            Some(info) => {
                let control = ControlWord::from_info(info);
                let a = if info.format == Format::U { 0 } else { regs.read_a(Reg(rs1_idx)) };
                let b = regs.read_b(Reg(rs2_idx));
                let imm = sign_extend::extend(fetched, control.imm_src);
                let rd_or_funct3 = if info.format == Format::B {
                    ((fetched >> 12) & 0x7) as u8
                } else {
                    ((fetched >> 7) & 0x1f) as u8
                };
                IdEx {
                    control: Signal {
                        value: control,
                        ready_at: 1,
                        is_active: if_id.instr.is_active,
                    },
                    npc: Signal::new(if_id.npc.value, 1),
                    pc: Signal::new(if_id.pc.value, 1),
                    a: Signal::new(a, 1),
                    b: Signal::new(b, 1),
                    rd: Signal::new(rd_or_funct3, 1),
                    rs1: Signal::new(rs1_idx, 1),
                    rs2: Signal::new(rs2_idx, 1),
                    imm: Signal::new(imm, 1),
                    instr: Signal::new(fetched, 1),
                }
            }
        }
    };
    pipe.id_ex = decoded;

    // write-after-read policy: perform the WB write only now, after ID's
    // register-file reads above have already run.
    if wb_writes && !config.write_first {
        regs.write(Reg(mem_wb.rd.value), wb_value);
    }

    rec.id_instruction = if flush {
        "nop".to_string()
    } else if stall {
        format!("{} (stalled)", disasm::disassemble(fetched))
    } else if if_id.instr.is_active {
        disasm::disassemble(fetched)
    } else {
        "nop".to_string()
    };

    // ---------------------------------------------------------------- IF --
    let pc_plus4 = pc.wrapping_add(4);
    let next_pc = if stall {
        pc
    } else if take_branch {
        pc_dest
    } else {
        pc_plus4
    };
    rec.bus_pc = Signal::new(pc, 1);
    rec.bus_pc_plus4 = Signal::new(pc_plus4, 1);
    rec.bus_pc_next = Signal::new(next_pc, 1);

    if stall {
        rec.if_instruction = if pipe.if_id.instr.is_active {
            disasm::disassemble(pipe.if_id.instr.value)
        } else {
            "nop".to_string()
        };
        rec.bus_instr = pipe.if_id.instr;
    } else if flush {
        pipe.if_id = IfId::default();
        rec.if_instruction = "nop".to_string();
        rec.bus_instr = Signal::inactive(disasm::NOP_WORD, 1);
    } else {
        match imem.read_word(pc, false) {
            Ok(w) => {
                pipe.if_id = IfId {
                    instr: Signal::new(w, 1),
                    npc: Signal::new(pc_plus4, 1),
                    pc: Signal::new(pc, 1),
                };
                rec.if_instruction = disasm::disassemble(w);
                rec.bus_instr = Signal::new(w, 1);
            }
            Err(e) => {
                tracing::warn!(pc, error = %e, "pipelined: instruction fetch out of bounds, treating as NOP");
                pipe.if_id = IfId::default();
                rec.if_instruction = "nop".to_string();
                rec.bus_instr = Signal::inactive(INDETERMINADO, 1);
            }
        }
    }

    rec.current_instruction = rec.wb_instruction.clone();
    rec.critical_time = 1;

    if config.debug_info {
        tracing::debug!(
            pc,
            if_ = %rec.if_instruction,
            id = %rec.id_instruction,
            ex = %rec.ex_instruction,
            mem = %rec.mem_instruction,
            wb = %rec.wb_instruction,
            stall = stall,
            flush = flush,
            "pipelined: cycle retired"
        );
    }

    pipe.latch();
    // Snapshot the fully latched register state into the record itself so a
    // simulator-level history snapshot ("Snapshot") can restore
    // `pipe` from `SignalRecord` alone on `step_back`, without a separate
    // pipeline-register field in the snapshot tuple.
    rec.pipe = pipe.clone();
    (rec, next_pc)
}

/// 3-way forward-select mux for one ALU operand: `EX/MEM.ALU_result` beats
/// `MEM/WB`'s write-back value beats the unforwarded `ID/EX` latch, matching
/// forwarding-unit priority (the closer producer wins).
fn forward(config: &SimConfig, ex_mem: &ExMem, mem_wb: &MemWb, rs: u8, unforwarded: u32, wb_value: u32) -> (u8, u32) {
    if !config.forwarding {
        return (FWD_NONE, unforwarded);
    }
    if ex_mem.control.is_active && ex_mem.control.value.br_wr && ex_mem.rd.value != 0 && ex_mem.rd.value == rs {
        return (FWD_EX_MEM, ex_mem.alu_result.value);
    }
    if mem_wb.control.is_active && mem_wb.control.value.br_wr && mem_wb.rd.value != 0 && mem_wb.rd.value == rs {
        return (FWD_MEM_WB, wb_value);
    }
    (FWD_NONE, unforwarded)
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

    struct Harness {
        imem: Memory,
        dmem: Memory,
        regs: RegisterFile,
        pipe: PipeRegs,
        config: SimConfig,
        pc: u32,
    }

    impl Harness {
        fn new(src: &str) -> Self {
            Harness {
                imem: assemble(src),
                dmem: Memory::new(DEFAULT_DMEM_SIZE),
                regs: RegisterFile::new(),
                pipe: PipeRegs::default(),
                config: SimConfig::default(),
                pc: 0,
            }
        }

        fn tick(&mut self) -> SignalRecord {
            let (rec, next_pc) = step(self.pc, &mut self.pipe, &self.imem, &mut self.dmem, &mut self.regs, &self.config);
            self.pc = next_pc;
            rec
        }
    }

    #[test]
    fn independent_instructions_drain_through_five_cycles() {
        let mut h = Harness::new("addi x1, x0, 5\naddi x2, x0, 7\naddi x3, x0, 9\n");
        for _ in 0..8 {
            h.tick();
        }
        assert_eq!(h.regs.read(Reg(1)), 5);
        assert_eq!(h.regs.read(Reg(2)), 7);
        assert_eq!(h.regs.read(Reg(3)), 9);
    }

    #[test]
    fn ex_mem_forwarding_resolves_back_to_back_dependency() {
        // add depends on the immediately preceding addi's result.
        let mut h = Harness::new("addi x1, x0, 4\nadd x2, x1, x1\naddi x3, x0, 0\naddi x4, x0, 0\naddi x5, x0, 0\n");
        let mut saw_ex_mem_forward = false;
        for _ in 0..8 {
            let rec = h.tick();
            if rec.bus_control_forward_a.value == FWD_EX_MEM {
                saw_ex_mem_forward = true;
            }
        }
        assert!(saw_ex_mem_forward);
        assert_eq!(h.regs.read(Reg(2)), 8);
    }

    #[test]
    fn load_use_hazard_stalls_one_cycle() {
        let mut h = Harness::new("lw x1, 0(x0)\nadd x2, x1, x1\naddi x3, x0, 0\naddi x4, x0, 0\n");
        let mut stalls = 0;
        for _ in 0..10 {
            let rec = h.tick();
            if rec.bus_stall.value {
                stalls += 1;
            }
        }
        assert_eq!(stalls, 1);
    }

    #[test]
    fn taken_branch_flushes_two_fetched_instructions() {
        let src = "beq x0, x0, 12\naddi x1, x0, 111\naddi x2, x0, 222\naddi x3, x0, 333\n";
        let mut h = Harness::new(src);
        let mut flushes = 0;
        for _ in 0..10 {
            let rec = h.tick();
            if rec.bus_flush.value {
                flushes += 1;
            }
        }
        assert_eq!(flushes, 1);
        assert_eq!(h.regs.read(Reg(1)), 0);
        assert_eq!(h.regs.read(Reg(2)), 0);
        assert_eq!(h.regs.read(Reg(3)), 333);
    }

    #[test]
    fn disabling_forwarding_still_converges_with_enough_padding() {
        let mut h = Harness::new("addi x1, x0, 4\naddi x9, x0, 0\naddi x9, x0, 0\naddi x9, x0, 0\nadd x2, x1, x1\n");
        h.config.forwarding = false;
        for _ in 0..10 {
            h.tick();
        }
        assert_eq!(h.regs.read(Reg(2)), 8);
    }

    #[test]
    fn auipc_uses_its_own_pc_through_the_pipeline() {
        // auipc x1, 0 sits at PC 4, so x1 should come out as 4, not 0.
        let mut h = Harness::new("addi x9, x0, 0\nauipc x1, 0\n");
        for _ in 0..8 {
            h.tick();
        }
        assert_eq!(h.regs.read(Reg(1)), 4);
    }
}
