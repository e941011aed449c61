// CLI binary entry point for speexogg

mod cli;

use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

use cli::{Commands, Config, OutputFormatter};

fn main() {
    let config = Config::parse();
    init_logging(config.verbose);

    let formatter = OutputFormatter::new(config.format, config.quiet);
    let result = match &config.command {
        Commands::Info { files } => cli::commands::command_info(files, &formatter).map(|failures| {
            if failures > 0 {
                process::exit(1);
            }
        }),
        Commands::Pages { file } => cli::commands::command_pages(file, &formatter),
        #[cfg(feature = "native-speex")]
        Commands::Encode(args) => cli::commands::command_encode(args, &formatter),
    };

    if let Err(e) = result {
        formatter.print_error(&format!("{:#}", e));
        process::exit(1);
    }
}

/// Logs go to stderr; RUST_LOG wins over --verbose
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
