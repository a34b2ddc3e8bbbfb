use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use warpsim::asm::encoder::assemble;
use warpsim::sim::driver::{set_kernel_config, simulate};
use warpsim::sim::memory::{DataMemory, InstructionMemory};
use warpsim::sim::model::Core;

#[derive(Parser, Debug)]
#[command(name = "warpsim")]
#[command(about = "Assemble a kernel and run it on the behavioral GPU core")]
struct Args {
    /// Assembly source file.
    input: PathBuf,

    /// Cycle budget for the run.
    #[clap(long, default_value = "10000")]
    max_cycles: u32,
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let program = match assemble(&source) {
        Ok(program) => program,
        Err(errors) => {
            for error in &errors {
                eprintln!("{}:{error}", args.input.display());
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut core = Core::new();
    let mut instruction_mem = InstructionMemory::new();
    let mut data_mem = DataMemory::new();
    instruction_mem.load_program(program.config.base_instructions_addr, &program);
    set_kernel_config(
        &mut core,
        program.config.base_instructions_addr,
        program.config.base_data_addr,
        program.config.num_blocks,
        program.config.num_warps_per_block,
    );

    let done = simulate(&mut core, &mut instruction_mem, &mut data_mem, args.max_cycles);

    for (addr, word) in data_mem.iter() {
        println!("data[{addr}] = {word}");
    }

    if done {
        println!("halted within {} cycles", args.max_cycles);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("cycle budget of {} exhausted", args.max_cycles);
        Ok(ExitCode::FAILURE)
    }
}
