use rust_dump::cli::{Cli, Commands};
use rust_dump::error::Result;
use rust_dump::{commands, logger};
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let args = Cli::parse_args();

    // Initialize logging system
    logger::init(args.verbose)?;

    debug!("rustdump starting");

    match run(args) {
        Ok(_) => {
            info!("Operation completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Operation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<()> {
    match args.command {
        Commands::Dump(dump) => commands::dump::execute(dump, args.config),

        Commands::Checksum { image, algorithms } => {
            commands::checksum::execute(image, algorithms, args.config)
        }

        Commands::ResumeInfo { file } => commands::resume::execute(file),
    }
}
