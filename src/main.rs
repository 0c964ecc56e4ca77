use clap::Parser;
use equifactor::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
