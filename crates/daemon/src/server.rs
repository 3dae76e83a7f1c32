//! Listening socket and session loop.

use std::fs;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::applier::Applier;
use crate::hash_index::HashIndex;
use crate::DaemonError;

/// Validated server-side configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Mirror root, as given on the command line.
    pub root: PathBuf,
}

/// Indexes the mirror, binds, and serves one client at a time, forever.
///
/// The content index survives across client sessions but not across server
/// restarts; every boot re-hashes the tree.
pub fn run(config: &ServerConfig) -> Result<(), DaemonError> {
    let root = fs::canonicalize(&config.root)?;

    info!(root = %root.display(), "indexing mirror content");
    let index = HashIndex::build(&root)?;
    info!(files = index.len(), "content index built");

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))?;
    info!(port = config.port, "listening for a client");

    let mut applier = Applier::new(root, index);
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed; retrying");
                continue;
            }
        };
        info!(%peer, "client connected");
        serve_client(&mut applier, stream);
        info!(%peer, "client disconnected; accepting again");
    }
}

/// Applies operations from one connection until it ends.
///
/// A failed operation is logged and the session continues, unless the error
/// says the stream itself can no longer be trusted.
fn serve_client(applier: &mut Applier, mut stream: TcpStream) {
    let mut applied = 0u64;
    loop {
        match applier.apply_next(&mut stream) {
            Ok(Some(tag)) => {
                applied += 1;
                debug!(op = applied, ?tag, "operation applied");
            }
            Ok(None) => break,
            Err(e) if e.is_connection_fatal() => {
                error!(error = %e, "connection unusable; ending session");
                break;
            }
            Err(e) => {
                error!(error = %e, "operation failed; continuing session");
            }
        }
    }
    debug!(operations = applied, "session finished");
}
