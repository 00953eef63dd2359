use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use curtin::cli::{BlockMetaAction, Cli, Commands};
use curtin::context::EngineContext;
use curtin::engine;
use curtin::holders;
use curtin_api::error::{CurtinError, HoldersError, ReportError};

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new().filter_level(cli.verbosity).init();

    let result = match cli.command {
        Commands::BlockMeta {
            action: BlockMetaAction::Custom,
        } => EngineContext::from_env().and_then(|ctx| engine::run_custom(&ctx)),
        Commands::ClearHolders {
            shutdown_plan,
            devices,
        } => run_clear_holders(shutdown_plan, &devices),
        Commands::AssertClear { devices } => run_assert_clear(&devices),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run_clear_holders(shutdown_plan: bool, devices: &[PathBuf]) -> Result<(), CurtinError> {
    for device in devices {
        if shutdown_plan {
            let holders = holders::discover(device)
                .structured(HoldersError::TeardownFailed(device.display().to_string()))?;
            for holder in holders {
                println!("{:?} {} (level {})", holder.kind, holder.name, holder.level);
            }
        } else {
            holders::clear(device)?;
        }
    }
    Ok(())
}

fn run_assert_clear(devices: &[PathBuf]) -> Result<(), CurtinError> {
    for device in devices {
        holders::assert_clear(device)?;
    }
    Ok(())
}
