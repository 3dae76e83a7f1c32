//! Client binary: watch a directory and replicate it to a `dsyncd` server.

use std::env;
use std::process;

fn main() {
    process::exit(cli::run(env::args_os()));
}
