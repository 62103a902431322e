use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod core;
mod index;
mod output;
mod parsing;
mod pipeline;
mod utils;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("hicbin=debug,info")
    } else {
        EnvFilter::new("hicbin=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        cli::Commands::Digest(args) => {
            cli::digest::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Pairs(args) => {
            cli::pairs::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Sort(args) => {
            cli::sort::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Build(args) => {
            cli::build::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
