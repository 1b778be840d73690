use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

use ridge_emulator::{logging, machine_config, Emulator};

#[derive(Parser)]
#[command(name = "ridge-emulator", about = "Ridge 32 minicomputer emulator")]
struct Args {
    /// Flat boot image copied to the reset entry point.
    image: PathBuf,

    /// Physical memory size in kilobytes.
    #[arg(long, default_value_t = machine_config::DEFAULT_MEMORY_KB)]
    memory_kb: u32,

    /// Stop after this many instructions; 0 runs until a machine fault.
    #[arg(long, default_value_t = 0)]
    steps: u64,

    #[arg(long, value_enum, default_value = "warn")]
    log_level: logging::LogLevel,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _logger_handle = logging::init(args.log_level);

    let mut emu = match Emulator::from_image(&args.image, args.memory_kb) {
        Ok(emu) => emu,
        Err(err) => {
            log::error!("cannot load {}: {}", args.image.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let limit = if args.steps == 0 { u64::MAX } else { args.steps };
    match emu.run(limit) {
        Ok(steps) => {
            log::info!("ran {} steps to the step limit", steps);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("machine fault at pc {:#x}: {}", emu.cpu().pc(), err);
            ExitCode::FAILURE
        }
    }
}
