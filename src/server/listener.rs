//! Trace collection listener.
//!
//! Each accepted connection is one session, named after the peer
//! address. Lines are read until the peer closes the stream or the
//! connection fails; either way the session is finalized and its
//! artifacts are written.

use super::{write_artifacts, CollectorConfig};
use crate::output::ArtifactPaths;
use crate::session::Session;
use crate::utils::config::MAX_LINE_BYTES;
use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Session id for a peer, `<ip>-<port>`
pub fn session_id(peer: &SocketAddr) -> String {
    format!("{}-{}", peer.ip(), peer.port())
}

/// Feed every line of `reader` into `session`
///
/// Invalid UTF-8 is replaced rather than rejected; such lines then fail
/// to decode like any other malformed line. Lines longer than
/// `MAX_LINE_BYTES` are discarded unbuffered and counted as malformed.
///
/// # Errors
/// The I/O error that ended the stream early. Lines read before it have
/// already been pushed.
pub fn read_session<R: BufRead>(session: &mut Session, reader: R) -> io::Result<()> {
    read_lines(session, reader, MAX_LINE_BYTES)
}

fn read_lines<R: BufRead>(session: &mut Session, mut reader: R, max_line: usize) -> io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let limit = max_line as u64 + 1;
        if (&mut reader).take(limit).read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }

        if buf.len() > max_line && buf.last() != Some(&b'\n') {
            let rest = discard_line(&mut reader)?;
            session.push_oversized_line((buf.len() + rest) as u64);
            continue;
        }
        session.push_line(&String::from_utf8_lossy(&buf));
    }
}

/// Skip to just past the next newline, returning the bytes skipped before it
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(skipped);
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(skipped + end);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

/// Blocking TCP listener for trace connections
pub struct CollectionServer {
    listener: TcpListener,
    config: Arc<CollectorConfig>,
}

impl CollectionServer {
    /// Bind the listener
    ///
    /// # Errors
    /// The bind error, e.g. address in use
    pub fn bind(addr: impl ToSocketAddrs, config: CollectorConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(
            "Collecting traces on {} ({} mode) into {}",
            listener.local_addr()?,
            config.mode,
            config.output_dir.display()
        );
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever
    ///
    /// A failed accept or thread spawn is logged and the listener keeps
    /// going.
    pub fn run(&self) {
        for stream in self.listener.incoming() {
            let spawned = stream.and_then(|stream| self.spawn_session(stream));
            if let Err(e) = spawned {
                warn!("dropping connection: {}", e);
            }
        }
    }

    /// Accept a single connection and start its session thread
    ///
    /// The handle yields the artifact paths, or `None` when they could
    /// not be written.
    pub fn accept_one(&self) -> io::Result<JoinHandle<Option<ArtifactPaths>>> {
        let (stream, _) = self.listener.accept()?;
        self.spawn_session(stream)
    }

    fn spawn_session(&self, stream: TcpStream) -> io::Result<JoinHandle<Option<ArtifactPaths>>> {
        let peer = stream.peer_addr()?;
        let id = session_id(&peer);
        debug!("accepted connection from {}", peer);

        let config = Arc::clone(&self.config);
        thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || handle_connection(id, stream, &config))
    }
}

fn handle_connection(id: String, stream: TcpStream, config: &CollectorConfig) -> Option<ArtifactPaths> {
    let mut session = config.new_session(&id);

    if let Err(e) = read_session(&mut session, BufReader::new(stream)) {
        warn!("[{}] connection failed, finalizing what was received: {}", id, e);
    }

    let report = session.finish();
    match write_artifacts(&report, config) {
        Ok(paths) => Some(paths),
        Err(e) => {
            error!("[{}] failed to write artifacts: {}", id, e);
            None
        }
    }
}
