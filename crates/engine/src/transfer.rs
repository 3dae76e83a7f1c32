//! Client side of the wire dialogue.
//!
//! Each planned operation becomes one header-plus-tail exchange. A modify
//! additionally probes the server with the content digest and streams the
//! file body only when the server does not already hold that content.
//! Transient filesystem anomalies (the file vanished between aggregation
//! and transmission) degrade to logged warnings, never to a desynced
//! stream: whenever the peer has been promised a body, at least a lone EOF
//! chunk is sent.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use protocol::{
    read_reply, write_chunk, write_digest, write_file_size, write_path, OpHeader, OpTag, Reply,
    CHUNK_DATA_LEN,
};
use tracing::{debug, info, warn};

use crate::aggregate::rel_to_abs;
use crate::schedule::Outgoing;
use crate::EngineError;

/// Sends planned operations over one connection.
pub(crate) struct Sender<'a, S> {
    stream: &'a mut S,
    root: &'a Path,
    seq: &'a mut u64,
}

impl<'a, S: Read + Write> Sender<'a, S> {
    pub(crate) fn new(stream: &'a mut S, root: &'a Path, seq: &'a mut u64) -> Self {
        Self { stream, root, seq }
    }

    /// Transmits one operation, including any digest dialogue and body.
    pub(crate) fn send_operation(&mut self, op: &Outgoing) -> Result<(), EngineError> {
        *self.seq += 1;
        info!(
            op = *self.seq,
            tag = ?op.tag,
            kind = ?op.kind,
            path = %op.rel,
            "sending operation"
        );

        match op.tag {
            OpTag::Delete | OpTag::MovedFrom => {
                self.write_op(op, 0, 0)?;
            }
            OpTag::Move | OpTag::FilMove => {
                let Some(old) = op.old.as_deref() else {
                    warn!(path = %op.rel, "move without an origin; skipping");
                    return Ok(());
                };
                self.write_op(op, 0, old.len() as u16)?;
                write_path(self.stream, old)?;
            }
            OpTag::Create => {
                let target = op.link_target.as_deref().filter(|_| op.kind == protocol::FileKind::Symlink);
                self.write_op(op, target.map_or(0, |t| t.len() as u16), 0)?;
                if let Some(target) = target {
                    write_path(self.stream, target)?;
                }
            }
            OpTag::Modify | OpTag::FilMovedTo => {
                self.send_modify(op)?;
            }
            OpTag::MovedTo => {
                warn!(path = %op.rel, "planner produced a bare moved-to; skipping");
            }
        }
        Ok(())
    }

    fn write_op(&mut self, op: &Outgoing, link_len: u16, old_len: u16) -> Result<(), EngineError> {
        let header = OpHeader::new(op.tag, op.kind, op.rel.len() as u16, link_len, old_len);
        header.write_to(self.stream)?;
        write_path(self.stream, &op.rel)?;
        Ok(())
    }

    /// The digest dialogue: header, path, digest, peer verdict, maybe body.
    fn send_modify(&mut self, op: &Outgoing) -> Result<(), EngineError> {
        let abs = rel_to_abs(self.root, &op.rel);
        let (digest, size) = match checksums::hash_file(&abs) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(path = %op.rel, error = %e, "file vanished before hashing; modify skipped");
                return Ok(());
            }
        };

        self.write_op(op, 0, 0)?;
        write_digest(self.stream, &digest)?;
        debug!(path = %op.rel, %digest, bytes = size, "digest sent; awaiting verdict");

        match read_reply(self.stream)? {
            Reply::OnServer => {
                info!(path = %op.rel, "content already on server; no body transferred");
            }
            Reply::NotOnServer => {
                info!(path = %op.rel, bytes = size, "content unknown to server; streaming body");
                self.send_file(&abs, size)?;
            }
        }
        Ok(())
    }

    /// Streams the file body as fixed-size chunks.
    ///
    /// The size hint went out first in network byte order; the chunk EOF flag
    /// is what actually terminates the body, so a file that shrank or grew
    /// mid-transfer still frames correctly.
    fn send_file(&mut self, abs: &Path, size: u64) -> Result<(), EngineError> {
        write_file_size(self.stream, u32::try_from(size).unwrap_or(u32::MAX))?;

        let mut file = match File::open(abs) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %abs.display(), error = %e, "file vanished mid-transfer; sending empty body");
                write_chunk(self.stream, true, &[])?;
                return Ok(());
            }
        };

        let mut buf = [0u8; CHUNK_DATA_LEN];
        let mut sent = 0u64;
        loop {
            let filled = match fill_chunk(&mut file, &mut buf) {
                Ok(filled) => filled,
                Err(e) => {
                    warn!(path = %abs.display(), error = %e, "read failed mid-transfer; terminating body");
                    write_chunk(self.stream, true, &[])?;
                    return Ok(());
                }
            };
            sent += filled as u64;
            if filled < CHUNK_DATA_LEN {
                write_chunk(self.stream, true, &buf[..filled])?;
                break;
            }
            write_chunk(self.stream, false, &buf)?;
        }
        debug!(bytes = sent, "file body sent");
        Ok(())
    }
}

/// Fills `buf` as far as the reader allows; short only at end of file.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{read_chunk, read_digest, read_file_size, read_path, FileKind};
    use std::io::Cursor;

    /// Test stream: scripted input, captured output.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Scripted {
        fn replying(reply: Reply) -> Self {
            Self {
                input: Cursor::new(reply.encode().to_vec()),
                output: Vec::new(),
            }
        }

        fn silent() -> Self {
            Self {
                input: Cursor::new(Vec::new()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn outgoing(tag: OpTag, kind: FileKind, rel: &str) -> Outgoing {
        Outgoing {
            tag,
            kind,
            rel: rel.to_owned(),
            old: None,
            link_target: None,
        }
    }

    #[test]
    fn modify_with_content_on_server_sends_no_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), b"hello\n").expect("write");

        let mut stream = Scripted::replying(Reply::OnServer);
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        sender
            .send_operation(&outgoing(OpTag::Modify, FileKind::NonDir, "./f.txt"))
            .expect("send");

        let mut wire = Cursor::new(stream.output);
        let header = OpHeader::read_from(&mut wire).expect("header");
        assert_eq!(header.op, OpTag::Modify);
        assert_eq!(
            read_path(&mut wire, header.rel_path_len).expect("path"),
            "./f.txt"
        );
        let digest = read_digest(&mut wire).expect("digest");
        assert_eq!(digest.to_string(), "b1946ac92492d2347c6235b4d2611184");
        // Nothing after the digest: no size, no chunks.
        let mut rest = Vec::new();
        wire.read_to_end(&mut rest).expect("rest");
        assert!(rest.is_empty());
    }

    #[test]
    fn modify_with_unknown_content_streams_chunked_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = vec![0x42u8; CHUNK_DATA_LEN + 100];
        std::fs::write(dir.path().join("big.bin"), &content).expect("write");

        let mut stream = Scripted::replying(Reply::NotOnServer);
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        sender
            .send_operation(&outgoing(OpTag::Modify, FileKind::NonDir, "./big.bin"))
            .expect("send");

        let mut wire = Cursor::new(stream.output);
        let header = OpHeader::read_from(&mut wire).expect("header");
        read_path(&mut wire, header.rel_path_len).expect("path");
        read_digest(&mut wire).expect("digest");
        assert_eq!(
            read_file_size(&mut wire).expect("size"),
            content.len() as u32
        );

        let first = read_chunk(&mut wire).expect("first chunk");
        assert!(!first.eof);
        assert_eq!(first.data().len(), CHUNK_DATA_LEN);
        let last = read_chunk(&mut wire).expect("last chunk");
        assert!(last.eof);
        assert_eq!(last.data().len(), 100);

        let mut received = first.data().to_vec();
        received.extend_from_slice(last.data());
        assert_eq!(received, content);
    }

    #[test]
    fn exact_multiple_body_terminates_with_empty_eof_chunk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = vec![7u8; 2 * CHUNK_DATA_LEN];
        std::fs::write(dir.path().join("even.bin"), &content).expect("write");

        let mut stream = Scripted::replying(Reply::NotOnServer);
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        sender
            .send_operation(&outgoing(OpTag::Modify, FileKind::NonDir, "./even.bin"))
            .expect("send");

        let mut wire = Cursor::new(stream.output);
        let header = OpHeader::read_from(&mut wire).expect("header");
        read_path(&mut wire, header.rel_path_len).expect("path");
        read_digest(&mut wire).expect("digest");
        read_file_size(&mut wire).expect("size");

        assert!(!read_chunk(&mut wire).expect("chunk 1").eof);
        assert!(!read_chunk(&mut wire).expect("chunk 2").eof);
        let terminator = read_chunk(&mut wire).expect("terminator");
        assert!(terminator.eof);
        assert!(terminator.data().is_empty());
    }

    #[test]
    fn vanished_file_skips_the_modify_entirely() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut stream = Scripted::silent();
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        sender
            .send_operation(&outgoing(OpTag::Modify, FileKind::NonDir, "./missing.txt"))
            .expect("send");
        assert!(stream.output.is_empty());
    }

    #[test]
    fn move_sends_new_then_old_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut stream = Scripted::silent();
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        let mut op = outgoing(OpTag::Move, FileKind::Directory, "./a2");
        op.old = Some("./a".to_owned());
        sender.send_operation(&op).expect("send");

        let mut wire = Cursor::new(stream.output);
        let header = OpHeader::read_from(&mut wire).expect("header");
        assert_eq!(header.op, OpTag::Move);
        assert_eq!(header.old_path_len, 3);
        assert_eq!(read_path(&mut wire, header.rel_path_len).expect("new"), "./a2");
        assert_eq!(read_path(&mut wire, header.old_path_len).expect("old"), "./a");
    }

    #[test]
    fn symlink_create_carries_its_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut stream = Scripted::silent();
        let mut seq = 0;
        let mut sender = Sender::new(&mut stream, dir.path(), &mut seq);
        let mut op = outgoing(OpTag::Create, FileKind::Symlink, "./link");
        op.link_target = Some("./real.txt".to_owned());
        sender.send_operation(&op).expect("send");

        let mut wire = Cursor::new(stream.output);
        let header = OpHeader::read_from(&mut wire).expect("header");
        assert_eq!(header.link_target_len, 10);
        assert_eq!(
            read_path(&mut wire, header.rel_path_len).expect("path"),
            "./link"
        );
        assert_eq!(
            read_path(&mut wire, header.link_target_len).expect("target"),
            "./real.txt"
        );
    }
}
