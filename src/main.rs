use clap::Parser;
use colored::Colorize;

use tandem::cli;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    if let Err(e) = cli::run(args) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}
