use anyhow::Result;
use clap::Parser;

mod cli;
mod compile_cmd;
mod inspect_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Compile(args) => compile_cmd::run_compile(args),
        Command::Inspect(args) => inspect_cmd::run_inspect(args),
    }
}
