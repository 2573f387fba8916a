//! Thin CLI test driver: assembles a file and steps the
//! simulator, printing the register file and current instruction each
//! cycle with an `ansi_term`-colored per-cycle dump.

use ansi_term::Colour::{Green, Red, Yellow};
use anyhow::{Context, Result};
use clap::Parser;
use rv32i_sim::{PipelineModel, Simulator};

/// RV32I pipeline simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// input assembly file path
    input: String,
    /// pipeline model: 0=single-cycle, 1=multi-cycle, 2=pipelined, 3=general
    #[arg(short = 'm', long, default_value_t = 0)]
    model: i32,
    /// number of cycles to run; 0 means run until the fetched word is all
    /// zero (an unassembled tail)
    #[arg(short = 'c', long, default_value_t = 0)]
    cycles: usize,
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn print_cycle(sim: &Simulator, cycle: usize) {
    let rec = sim.signal_record();
    println!(
        "{}",
        Yellow.paint(format!(
            "-- cycle {cycle:<4} pc={:#010x} instr=\"{}\" --",
            sim.get_pc(),
            rec.current_instruction
        ))
    );
    if rec.bus_branch_taken.value {
        println!("  {}", Green.paint("branch/jump taken"));
    }
    if rec.bus_stall.value {
        println!("  {}", Red.bold().paint("stall"));
    }
    if rec.bus_flush.value {
        println!("  {}", Red.bold().paint("flush"));
    }
    let regs = sim.registers().all();
    for row in 0..8 {
        let mut line = String::new();
        for col in 0..4 {
            let i = row + col * 8;
            line.push_str(&format!("x{i:<2}={:#010x}  ", regs[i]));
        }
        println!("  {line}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;

    let model = PipelineModel::from_i32(args.model);
    let mut sim = Simulator::with_defaults(model);
    sim.config_mut().debug_info = args.verbose;
    sim.load_program_from_text(&text, model)
        .with_context(|| format!("failed to assemble `{}`", &args.input))?;
    sim.reset();

    let mut cycle = 0usize;
    loop {
        print_cycle(&sim, cycle);
        cycle += 1;
        if args.cycles != 0 {
            if cycle >= args.cycles {
                break;
            }
        } else if sim.signal_record().bus_instr.value == 0 {
            break;
        }
        sim.step();
    }

    Ok(())
}
