//! Server binary: mirror the operations streamed by a `dsync` client.

use std::env;
use std::process;

fn main() {
    process::exit(daemon::cli::run(env::args_os()));
}
