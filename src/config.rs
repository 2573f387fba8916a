//! Runtime configuration: toggles and timing constants carried by the
//! simulator instead of baked in at compile time.

/// Toggles consulted by the pipelined backend.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub load_use_hazard: bool,
    pub forwarding: bool,
    pub branch_flush: bool,
    /// Write-first same-cycle RAW policy on the register file, chosen
    /// because the forwarding unit assumes it; kept configurable for the
    /// non-pipelined backends, where no forwarding exists to break.
    pub write_first: bool,
    pub debug_info: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            load_use_hazard: true,
            forwarding: true,
            branch_flush: true,
            write_first: true,
            debug_info: false,
        }
    }
}

/// Abstract propagation-delay constants for the single-cycle/multi-cycle
/// backends' `ready_at` bookkeeping.
pub mod delay {
    pub const PC: u32 = 1;
    pub const ADDER: u32 = 10;
    pub const MUX: u32 = 5;
    pub const ALU: u32 = 20;
    pub const CONTROL: u32 = 5;
    pub const MEMORY: u32 = 50;
    pub const REGS: u32 = 20;
    pub const REG_WR: u32 = 5;
    pub const IMM_EXT: u32 = 10;
}

/// Default instruction/data memory sizes.
pub const DEFAULT_IMEM_SIZE: usize = 4096;
pub const DEFAULT_DMEM_SIZE: usize = 4096;
