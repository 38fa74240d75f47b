mod commands;
mod display_bytes;
mod error;
mod opt;
mod print;
mod table;

use self::opt::Opt;
use clap::Parser;

fn main() {
    let opt = Opt::parse();

    env_logger::init();

    if let Err(err) = commands::execute(&opt) {
        eprintln!("{}", err);
        std::process::exit(err.exit_code());
    }
}
