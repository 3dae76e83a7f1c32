//! Command-line front-end for the `dsync` client.
//!
//! `dsync <port> <server-ip> <main-directory> <duration-seconds>`: validates
//! the arguments, connects to the server, and hands the connection to the
//! monitoring loop. A duration of `0` monitors forever. The main directory
//! must exist and must not itself be a symbolic link (its watches would
//! otherwise track a tree outside the given root); ports below the dynamic
//! range are accepted with a warning.

use std::ffi::OsString;
use std::fs;
use std::net::{Ipv4Addr, TcpStream};
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};
use engine::{ClientConfig, Monitor};
use tracing::{error, info, warn};

/// First port of the dynamic/private range; lower ports draw a warning.
const RECOMMENDED_PORT_FLOOR: u16 = 49152;

fn command() -> Command {
    Command::new("dsync")
        .about("Watches a directory tree and replicates it to a dsyncd server")
        .arg(
            Arg::new("port")
                .help("Server TCP port (1024-65535)")
                .required(true)
                .value_parser(value_parser!(u16).range(1024..=65535)),
        )
        .arg(
            Arg::new("server-ip")
                .help("Server IPv4 address in dotted-quad form")
                .required(true),
        )
        .arg(
            Arg::new("directory")
                .help("Main directory to replicate")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("duration")
                .help("Monitoring lifetime in seconds; 0 runs forever")
                .required(true)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log detail (repeatable)")
                .action(ArgAction::Count),
        )
}

/// Checks that `path` is an existing directory and not itself a symlink.
fn validate_root(path: &PathBuf) -> Result<(), String> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| format!("cannot inspect '{}': {}", path.display(), e))?;
    if meta.file_type().is_symlink() {
        return Err(format!(
            "'{}' is a symbolic link; give the real directory",
            path.display()
        ));
    }
    if !meta.is_dir() {
        return Err(format!("'{}' is not a directory", path.display()));
    }
    Ok(())
}

/// Parses arguments and runs the client. Returns the process exit code.
pub fn run<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };

    logging::init(matches.get_count("verbose"));

    let port = *matches.get_one::<u16>("port").expect("required argument");
    if port < RECOMMENDED_PORT_FLOOR {
        warn!(
            port,
            "port is below the dynamic range; {RECOMMENDED_PORT_FLOOR}-65535 is recommended"
        );
    }

    let server: Ipv4Addr = match matches
        .get_one::<String>("server-ip")
        .expect("required argument")
        .parse()
    {
        Ok(addr) => addr,
        Err(_) => {
            error!("server address must be a dotted-quad IPv4 address");
            return 1;
        }
    };

    let root = matches
        .get_one::<PathBuf>("directory")
        .expect("required argument")
        .clone();
    if let Err(reason) = validate_root(&root) {
        error!("{reason}");
        return 1;
    }

    let duration = *matches.get_one::<u64>("duration").expect("required argument");
    let config = ClientConfig::new(port, server, root, duration);

    info!(server = %config.server, port = config.port, "connecting");
    let mut stream = match TcpStream::connect((config.server, config.port)) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "could not connect to the server");
            return 1;
        }
    };
    info!("connected; starting replication");

    let mut monitor = match Monitor::new(&config.root) {
        Ok(monitor) => monitor,
        Err(e) => {
            error!(error = %e, "could not initialise watches");
            return 1;
        }
    };
    match monitor.run(&mut stream, &config) {
        Ok(()) => {
            info!("monitoring lifetime elapsed; exiting");
            0
        }
        Err(e) => {
            error!(error = %e, "replication failed");
            1
        }
    }
}
