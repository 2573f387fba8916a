//! Signal-timed state record: `Signal<T>` pairs a value with the cycle time
//! it became valid, and `SignalRecord` collects every named bus for one
//! cycle, including the pipeline registers' `_out` shadows for stage-by-stage
//! animation.

use crate::control::ControlWord;

/// `(value, ready_at, is_active)`. `ready_at` is in the units the active
/// backend uses: abstract delay units for single-cycle, micro-cycle index
/// 0..4 for multi-cycle, or simply 1 for pipelined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal<T> {
    pub value: T,
    pub ready_at: u32,
    pub is_active: bool,
}

impl<T> Signal<T> {
    pub fn new(value: T, ready_at: u32) -> Self {
        Signal {
            value,
            ready_at,
            is_active: true,
        }
    }

    pub fn inactive(value: T, ready_at: u32) -> Self {
        Signal {
            value,
            ready_at,
            is_active: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U> {
        Signal {
            value: f(self.value),
            ready_at: self.ready_at,
            is_active: self.is_active,
        }
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Signal {
            value: T::default(),
            ready_at: 0,
            is_active: true,
        }
    }
}

/// A pipeline-register input side plus its bubble-safe zero value;
/// `is_active = false` marks a bubble, the same way a flushed IF/ID input
/// is marked inactive.
fn bubble<T: Default>() -> Signal<T> {
    Signal::inactive(T::default(), 1)
}

#[derive(Debug, Clone)]
pub struct IfId {
    pub instr: Signal<u32>,
    pub npc: Signal<u32>,
    pub pc: Signal<u32>,
}

impl Default for IfId {
    fn default() -> Self {
        IfId {
            instr: bubble(),
            npc: bubble(),
            pc: bubble(),
        }
    }
}

/// `rd` doubles as the branch `funct3` for B-type instructions, so the
/// struct doesn't need a separate field for it.
#[derive(Debug, Clone)]
pub struct IdEx {
    pub control: Signal<ControlWord>,
    pub npc: Signal<u32>,
    pub pc: Signal<u32>,
    pub a: Signal<u32>,
    pub b: Signal<u32>,
    pub rd: Signal<u8>,
    pub rs1: Signal<u8>,
    pub rs2: Signal<u8>,
    pub imm: Signal<u32>,
    /// Carried along purely for stage-mnemonic labelling; not part of any
    /// architectural bus.
    pub instr: Signal<u32>,
}

impl Default for IdEx {
    fn default() -> Self {
        IdEx {
            control: bubble(),
            npc: bubble(),
            pc: bubble(),
            a: bubble(),
            b: bubble(),
            rd: bubble(),
            rs1: bubble(),
            rs2: bubble(),
            imm: bubble(),
            instr: bubble(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExMem {
    pub control: Signal<ControlWord>,
    pub npc: Signal<u32>,
    pub alu_result: Signal<u32>,
    pub b: Signal<u32>,
    pub rd: Signal<u8>,
    pub instr: Signal<u32>,
}

impl Default for ExMem {
    fn default() -> Self {
        ExMem {
            control: bubble(),
            npc: bubble(),
            alu_result: bubble(),
            b: bubble(),
            rd: bubble(),
            instr: bubble(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemWb {
    pub control: Signal<ControlWord>,
    pub npc: Signal<u32>,
    pub alu_result: Signal<u32>,
    pub rm: Signal<u32>,
    pub rd: Signal<u8>,
    pub instr: Signal<u32>,
}

impl Default for MemWb {
    fn default() -> Self {
        MemWb {
            control: bubble(),
            npc: bubble(),
            alu_result: bubble(),
            rm: bubble(),
            rd: bubble(),
            instr: bubble(),
        }
    }
}

impl Default for Signal<ControlWord> {
    fn default() -> Self {
        Signal::inactive(ControlWord::bubble(), 1)
    }
}

/// The four pipeline registers, each with an `_out` shadow holding the value
/// latched on the previous clock edge: stages read only the `_out` shadows
/// and write only the plain fields, so one `step` call never reads a value
/// it just wrote.
#[derive(Debug, Clone, Default)]
pub struct PipeRegs {
    pub if_id: IfId,
    pub if_id_out: IfId,
    pub id_ex: IdEx,
    pub id_ex_out: IdEx,
    pub ex_mem: ExMem,
    pub ex_mem_out: ExMem,
    pub mem_wb: MemWb,
    pub mem_wb_out: MemWb,
}

impl PipeRegs {
    /// The "rising edge": copy every input field to its `_out` shadow.
    /// "At end of cycle, copy every pipeline-register input
    /// to its `_out` shadow".
    pub fn latch(&mut self) {
        self.if_id_out = self.if_id.clone();
        self.id_ex_out = self.id_ex.clone();
        self.ex_mem_out = self.ex_mem.clone();
        self.mem_wb_out = self.mem_wb.clone();
    }
}

/// Tagged snapshot of every bus in the datapath
/// "SignalRecord (aka DatapathState)".
#[derive(Debug, Clone, Default)]
pub struct SignalRecord {
    pub bus_pc: Signal<u32>,
    pub bus_instr: Signal<u32>,

    pub bus_opcode: Signal<u8>,
    pub bus_funct3: Signal<u8>,
    pub bus_funct7: Signal<u8>,
    pub bus_da: Signal<u8>,
    pub bus_db: Signal<u8>,
    pub bus_dc: Signal<u8>,

    pub bus_a: Signal<u32>,
    pub bus_b: Signal<u32>,
    pub bus_imm: Signal<u32>,
    pub bus_imm_ext: Signal<u32>,

    pub bus_alu_a: Signal<u32>,
    pub bus_alu_b: Signal<u32>,
    pub bus_alu_result: Signal<u32>,
    pub bus_alu_zero: Signal<bool>,

    pub bus_control: Signal<ControlWord>,
    pub bus_pc_src: Signal<u8>,

    pub bus_mem_address: Signal<u32>,
    pub bus_mem_write_data: Signal<u32>,
    pub bus_mem_read_data: Signal<u32>,

    pub bus_c: Signal<u32>,

    pub bus_pc_plus4: Signal<u32>,
    pub bus_pc_dest: Signal<u32>,
    pub bus_pc_next: Signal<u32>,

    pub bus_branch_taken: Signal<bool>,

    // Pipelined-backend-only hazard/forwarding signals.
    pub bus_stall: Signal<bool>,
    pub bus_flush: Signal<bool>,
    pub bus_control_forward_a: Signal<u8>,
    pub bus_control_forward_b: Signal<u8>,
    pub bus_forward_a: Signal<u32>,
    pub bus_forward_b: Signal<u32>,

    pub pipe: PipeRegs,

    pub if_instruction: String,
    pub id_instruction: String,
    pub ex_instruction: String,
    pub mem_instruction: String,
    pub wb_instruction: String,
    pub current_instruction: String,

    pub critical_time: u32,
}
