mod cli;
mod dashboard;
mod html;

use clap::Parser;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    dashboard::init_cli_logging();
    cli::handle_command(cli::Cli::parse())
}
