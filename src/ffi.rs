//! C-style FFI surface. Gated behind the `ffi` Cargo feature (see
//! `Cargo.toml`): the core crate is consumed as a Rust library first, and
//! this module is the thin boundary adaptation for a foreign (GUI/renderer)
//! caller — buffer-filling functions return the required size and truncate
//! if the caller's buffer is smaller.
//!
//! Every object exposed across the boundary is a copy, never a borrow.
//! Every function here either returns a plain scalar, copies into a
//! caller-owned buffer, or returns a thread-local JSON string valid only
//! until the next FFI call from the same thread.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use serde_json::json;

use crate::config::{DEFAULT_DMEM_SIZE, DEFAULT_IMEM_SIZE};
use crate::datapath::PipelineModel;
use crate::signal::{ExMem, IdEx, IfId, MemWb, Signal, SignalRecord};
use crate::simulator::Simulator;

thread_local! {
    /// Backing storage for the `const char*` returned by the JSON-producing
    /// functions below. Valid until the next call from the same thread.
    static LAST_JSON: RefCell<CString> = RefCell::new(CString::new("{}").unwrap());
}

fn bus<T: Copy + Into<serde_json::Value>>(s: &Signal<T>) -> serde_json::Value {
    json!({ "value": s.value, "ready_at": s.ready_at, "is_active": s.is_active })
}

fn bool_bus(s: &Signal<bool>) -> serde_json::Value {
    json!({ "value": s.value, "ready_at": s.ready_at, "is_active": s.is_active })
}

fn if_id_json(reg: &IfId) -> serde_json::Value {
    json!({
        "instr": bus(&reg.instr),
        "NPC": bus(&reg.npc),
        "PC": bus(&reg.pc),
    })
}

fn id_ex_json(reg: &IdEx) -> serde_json::Value {
    json!({
        "Control": json!({"value": reg.control.value.pack(), "ready_at": reg.control.ready_at, "is_active": reg.control.is_active}),
        "NPC": bus(&reg.npc),
        "PC": bus(&reg.pc),
        "A": bus(&reg.a),
        "B": bus(&reg.b),
        "RD": bus(&reg.rd),
        "RS1": bus(&reg.rs1),
        "RS2": bus(&reg.rs2),
        "Imm": bus(&reg.imm),
    })
}

fn ex_mem_json(reg: &ExMem) -> serde_json::Value {
    json!({
        "Control": json!({"value": reg.control.value.pack(), "ready_at": reg.control.ready_at, "is_active": reg.control.is_active}),
        "NPC": bus(&reg.npc),
        "ALU_result": bus(&reg.alu_result),
        "B": bus(&reg.b),
        "RD": bus(&reg.rd),
    })
}

fn mem_wb_json(reg: &MemWb) -> serde_json::Value {
    json!({
        "Control": json!({"value": reg.control.value.pack(), "ready_at": reg.control.ready_at, "is_active": reg.control.is_active}),
        "NPC": bus(&reg.npc),
        "ALU_result": bus(&reg.alu_result),
        "RM": bus(&reg.rm),
        "RD": bus(&reg.rd),
    })
}

/// Builds the SignalRecord JSON schema: every named bus as `{value,
/// ready_at, is_active}`, plus the scalar
/// `Pipe_*`/`criticalTime`/`totalMicroCycles` keys.
pub fn state_to_json(state: &SignalRecord) -> serde_json::Value {
    json!({
        "PC": bus(&state.bus_pc),
        "Instr": bus(&state.bus_instr),
        "opcode": bus(&state.bus_opcode),
        "funct3": bus(&state.bus_funct3),
        "funct7": bus(&state.bus_funct7),
        "DA": bus(&state.bus_da),
        "DB": bus(&state.bus_db),
        "DC": bus(&state.bus_dc),
        "A": bus(&state.bus_a),
        "B": bus(&state.bus_b),
        "imm": bus(&state.bus_imm),
        "immExt": bus(&state.bus_imm_ext),
        "ALU_A": bus(&state.bus_alu_a),
        "ALU_B": bus(&state.bus_alu_b),
        "ALU_result": bus(&state.bus_alu_result),
        "ALU_zero": bool_bus(&state.bus_alu_zero),
        "Control": json!({"value": state.bus_control.value.pack(), "ready_at": state.bus_control.ready_at, "is_active": state.bus_control.is_active}),
        "PCsrc": bus(&state.bus_pc_src),
        "Mem_address": bus(&state.bus_mem_address),
        "Mem_write_data": bus(&state.bus_mem_write_data),
        "Mem_read_data": bus(&state.bus_mem_read_data),
        "C": bus(&state.bus_c),
        "PC_plus4": bus(&state.bus_pc_plus4),
        "PC_dest": bus(&state.bus_pc_dest),
        "PC_next": bus(&state.bus_pc_next),
        "branch_taken": bool_bus(&state.bus_branch_taken),
        "bus_stall": bool_bus(&state.bus_stall),
        "bus_flush": bool_bus(&state.bus_flush),
        "bus_ControlForwardA": bus(&state.bus_control_forward_a),
        "bus_ControlForwardB": bus(&state.bus_control_forward_b),
        "bus_ForwardA": bus(&state.bus_forward_a),
        "bus_ForwardB": bus(&state.bus_forward_b),
        "criticalTime": state.critical_time,

        "Pipe_IF_instruction": state.if_instruction,
        "Pipe_ID_instruction": state.id_instruction,
        "Pipe_EX_instruction": state.ex_instruction,
        "Pipe_MEM_instruction": state.mem_instruction,
        "Pipe_WB_instruction": state.wb_instruction,
        "instruction_cptr": state.current_instruction,

        "Pipe_IF_ID": if_id_json(&state.pipe.if_id),
        "Pipe_IF_ID_out": if_id_json(&state.pipe.if_id_out),
        "Pipe_ID_EX": id_ex_json(&state.pipe.id_ex),
        "Pipe_ID_EX_out": id_ex_json(&state.pipe.id_ex_out),
        "Pipe_EX_MEM": ex_mem_json(&state.pipe.ex_mem),
        "Pipe_EX_MEM_out": ex_mem_json(&state.pipe.ex_mem_out),
        "Pipe_MEM_WB": mem_wb_json(&state.pipe.mem_wb),
        "Pipe_MEM_WB_out": mem_wb_json(&state.pipe.mem_wb_out),
    })
}

fn store_json(value: serde_json::Value) -> *const c_char {
    let s = CString::new(value.to_string()).unwrap_or_else(|_| CString::new("{}").unwrap());
    LAST_JSON.with(|cell| {
        *cell.borrow_mut() = s;
        cell.borrow().as_ptr()
    })
}

/// Constructs a simulator and hands back an opaque pointer across the FFI
/// boundary.
#[no_mangle]
pub extern "C" fn rv32i_sim_new(mem_size: usize, model: c_int) -> *mut Simulator {
    let mem_size = if mem_size == 0 {
        DEFAULT_IMEM_SIZE.max(DEFAULT_DMEM_SIZE)
    } else {
        mem_size
    };
    let sim = Box::new(Simulator::new(mem_size, PipelineModel::from_i32(model)));
    Box::into_raw(sim)
}

/// Frees a simulator previously returned by [`rv32i_sim_new`].
///
/// # Safety
/// `sim` must be a pointer previously returned by [`rv32i_sim_new`] and not
/// already freed.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_delete(sim: *mut Simulator) {
    if !sim.is_null() {
        drop(Box::from_raw(sim));
    }
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`]; `program` must point
/// to at least `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_load_program(sim: *mut Simulator, program: *const u8, len: usize, model: c_int) {
    let Some(sim) = sim.as_mut() else { return };
    let bytes = if program.is_null() || len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(program, len)
    };
    sim.load_program(bytes, PipelineModel::from_i32(model));
}

/// # Safety
/// `sim` and `assembly` must be valid, non-dangling pointers; `assembly` must
/// be a NUL-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_load_program_from_text(sim: *mut Simulator, assembly: *const c_char, model: c_int) {
    let (Some(sim), false) = (sim.as_mut(), assembly.is_null()) else {
        return;
    };
    let Ok(text) = CStr::from_ptr(assembly).to_str() else {
        return;
    };
    if let Err(e) = sim.load_program_from_text(text, PipelineModel::from_i32(model)) {
        tracing::warn!(error = %e, "ffi: load_program_from_text failed, program not loaded");
    }
}

/// Assembles `assembly` and copies the resulting bytes into `out_buf`,
/// returning the required size; truncates if `out_buf` is smaller than
/// that.
///
/// # Safety
/// `sim` and `assembly` must be valid; if `cap > 0`, `out_buf` must point to
/// at least `cap` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_assemble(sim: *const Simulator, assembly: *const c_char, out_buf: *mut u8, cap: usize) -> usize {
    let (Some(sim), false) = (sim.as_ref(), assembly.is_null()) else {
        return 0;
    };
    let Ok(text) = CStr::from_ptr(assembly).to_str() else {
        return 0;
    };
    let Ok(obj) = sim.assemble(text) else {
        return 0;
    };
    let bytes = &obj.obj.binary;
    if !out_buf.is_null() && cap > 0 {
        let n = bytes.len().min(cap);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out_buf, n);
    }
    bytes.len()
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_reset(sim: *mut Simulator) -> *const c_char {
    let Some(sim) = sim.as_mut() else { return store_json(json!({})) };
    sim.reset();
    store_json(state_to_json(sim.signal_record()))
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_reset_with_model(sim: *mut Simulator, model: c_int, initial_pc: u32) -> *const c_char {
    let Some(sim) = sim.as_mut() else { return store_json(json!({})) };
    sim.reset_with_model(PipelineModel::from_i32(model), initial_pc);
    store_json(state_to_json(sim.signal_record()))
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_step(sim: *mut Simulator) -> *const c_char {
    let Some(sim) = sim.as_mut() else { return store_json(json!({})) };
    sim.step();
    store_json(state_to_json(sim.signal_record()))
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_step_back(sim: *mut Simulator) -> *const c_char {
    let Some(sim) = sim.as_mut() else { return store_json(json!({})) };
    sim.step_back();
    store_json(state_to_json(sim.signal_record()))
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_pc(sim: *const Simulator) -> u32 {
    sim.as_ref().map(Simulator::get_pc).unwrap_or(0)
}

/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_status_register(sim: *const Simulator) -> u32 {
    sim.as_ref().map(Simulator::get_status_register).unwrap_or(0)
}

/// # Safety
/// `sim` must be a live pointer; `out_buf` must point to 32 writable `u32`s.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_all_registers(sim: *const Simulator, out_buf: *mut u32) {
    let (Some(sim), false) = (sim.as_ref(), out_buf.is_null()) else {
        return;
    };
    let regs = sim.registers().all();
    std::ptr::copy_nonoverlapping(regs.as_ptr(), out_buf, 32);
}

/// # Safety
/// `sim` must be a live pointer; if `cap > 0`, `out_buf` must point to at
/// least `cap` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_d_mem(sim: *const Simulator, out_buf: *mut u8, cap: usize) -> usize {
    let Some(sim) = sim.as_ref() else { return 0 };
    let size = sim.d_mem().size();
    if !out_buf.is_null() && cap > 0 {
        if let Ok(bytes) = sim.d_mem().read_block(0, size.min(cap)) {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), out_buf, bytes.len());
        }
    }
    size
}

/// One disassembled instruction-memory entry: the raw word plus a
/// fixed-size, NUL-terminated mnemonic buffer.
#[repr(C)]
pub struct InstructionEntry {
    pub value: u32,
    pub instruction: [c_char; 256],
}

/// Disassembles every word of instruction memory into `entries_out`,
/// returning the total entry count (truncated the same way as
/// [`rv32i_sim_assemble`]).
///
/// # Safety
/// `sim` must be a live pointer; if `cap_entries > 0`, `entries_out` must
/// point to at least `cap_entries` writable [`InstructionEntry`]s.
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_i_mem(sim: *const Simulator, entries_out: *mut InstructionEntry, cap_entries: usize) -> usize {
    let Some(sim) = sim.as_ref() else { return 0 };
    let entries = sim.get_i_mem();
    if !entries_out.is_null() && cap_entries > 0 {
        let n = entries.len().min(cap_entries);
        for (i, (word, mnemonic)) in entries.iter().take(n).enumerate() {
            let slot = &mut *entries_out.add(i);
            slot.value = *word;
            let bytes = mnemonic.as_bytes();
            let copy_len = bytes.len().min(255);
            for (j, b) in bytes.iter().take(copy_len).enumerate() {
                slot.instruction[j] = *b as c_char;
            }
            slot.instruction[copy_len] = 0;
        }
    }
    entries.len()
}

/// Returns the full signal-record JSON snapshot as a C string.
///
/// # Safety
/// `sim` must be a live pointer from [`rv32i_sim_new`].
#[no_mangle]
pub unsafe extern "C" fn rv32i_sim_get_state_json(sim: *const Simulator) -> *const c_char {
    let Some(sim) = sim.as_ref() else { return store_json(json!({})) };
    store_json(state_to_json(sim.signal_record()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_delete_round_trips_without_leaking_or_crashing() {
        let sim = rv32i_sim_new(DEFAULT_IMEM_SIZE, 0);
        assert!(!sim.is_null());
        unsafe { rv32i_sim_delete(sim) };
    }

    #[test]
    fn step_returns_nonempty_json() {
        unsafe {
            let sim = rv32i_sim_new(DEFAULT_IMEM_SIZE, PipelineModel::SingleCycle as c_int);
            let text = CString::new("addi x1, x0, 5\n").unwrap();
            rv32i_sim_load_program_from_text(sim, text.as_ptr(), PipelineModel::SingleCycle as c_int);
            rv32i_sim_reset(sim);
            let json_ptr = rv32i_sim_step(sim);
            let s = CStr::from_ptr(json_ptr).to_str().unwrap();
            assert!(s.contains("\"PC\""));
            let mut regs = [0u32; 32];
            rv32i_sim_get_all_registers(sim, regs.as_mut_ptr());
            assert_eq!(regs[1], 5);
            rv32i_sim_delete(sim);
        }
    }

    #[test]
    fn assemble_reports_required_size_and_truncates() {
        unsafe {
            let sim = rv32i_sim_new(DEFAULT_IMEM_SIZE, 0);
            let text = CString::new("addi x1, x0, 5\naddi x2, x0, 6\n").unwrap();
            let mut small_buf = [0u8; 4];
            let total = rv32i_sim_assemble(sim, text.as_ptr(), small_buf.as_mut_ptr(), small_buf.len());
            assert_eq!(total, 8);
            rv32i_sim_delete(sim);
        }
    }
}
