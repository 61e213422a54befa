use anyhow::Result;
use clap::Parser;
use rotwatch::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}
