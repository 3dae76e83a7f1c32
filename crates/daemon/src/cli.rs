//! Command-line front-end for `dsyncd`.
//!
//! `dsyncd <port> <main-directory>`: validates the arguments, initialises
//! logging, and hands over to the accept loop. The mirror directory must
//! exist and must not itself be a symbolic link; ports below the dynamic
//! range are accepted with a warning.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};
use tracing::{error, warn};

use crate::server::{self, ServerConfig};

/// First port of the dynamic/private range; lower ports draw a warning.
const RECOMMENDED_PORT_FLOOR: u16 = 49152;

fn command() -> Command {
    Command::new("dsyncd")
        .about("Mirror-side daemon of the dsync directory replicator")
        .arg(
            Arg::new("port")
                .help("TCP port to listen on (1024-65535)")
                .required(true)
                .value_parser(value_parser!(u16).range(1024..=65535)),
        )
        .arg(
            Arg::new("directory")
                .help("Mirror root the received operations are applied under")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
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

/// Parses arguments and runs the daemon. Returns the process exit code.
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

    let root = matches
        .get_one::<PathBuf>("directory")
        .expect("required argument")
        .clone();
    if let Err(reason) = validate_root(&root) {
        error!("{reason}");
        return 1;
    }

    let config = ServerConfig { port, root };
    match server::run(&config) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "daemon terminated");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_ports() {
        assert!(command()
            .try_get_matches_from(["dsyncd", "80", "/tmp"])
            .is_err());
        assert!(command()
            .try_get_matches_from(["dsyncd", "70000", "/tmp"])
            .is_err());
        assert!(command()
            .try_get_matches_from(["dsyncd", "49200", "/tmp"])
            .is_ok());
    }

    #[test]
    fn requires_both_positional_arguments() {
        assert!(command().try_get_matches_from(["dsyncd", "49200"]).is_err());
    }

    #[test]
    fn validate_root_rejects_files_and_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plain");
        fs::write(&file, b"x").expect("write");
        assert!(validate_root(&file).is_err());

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).expect("symlink");
        assert!(validate_root(&link).is_err());

        assert!(validate_root(&dir.path().to_path_buf()).is_ok());
    }
}
