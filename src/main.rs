use std::env;
use std::process;

use colored::Colorize;
use log::Level;

use footdata::{CliArgs, Config};

fn main() {
    simple_logger::init_with_level(Level::Info).unwrap();

    // credential is checked up front, before any command runs
    let config = Config::build().unwrap_or_else(|err| {
        eprintln!("{} {err}", "error:".red().bold());
        process::exit(1);
    });

    let args = CliArgs::build(env::args());

    let rt = tokio::runtime::Runtime::new().unwrap();

    if let Err(err) = rt.block_on(footdata::run(args, config)) {
        eprintln!("{} {err}", "error:".red().bold());
        process::exit(1);
    }
}
