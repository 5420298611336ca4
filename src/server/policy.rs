//! Flash cross-domain policy responder.
//!
//! The Flash player asks for a socket policy with
//! `<policy-file-request/>\0` before it may open the trace connection.
//! The responder answers every request with the same policy document and
//! closes the connection.

use crate::utils::config::DEFAULT_POLICY;
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest request read before answering anyway
const MAX_REQUEST_BYTES: usize = 1024;

/// How long a peer may take to send its request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the policy document, NUL-terminated as the player expects
///
/// Without a path the built-in permissive policy is used.
///
/// # Errors
/// Reading the policy file failed
pub fn load_policy(path: Option<&Path>) -> io::Result<Vec<u8>> {
    let mut policy = match path {
        Some(path) => {
            debug!("Loading policy from {}", path.display());
            std::fs::read(path)?
        }
        None => DEFAULT_POLICY.as_bytes().to_vec(),
    };
    if policy.last() != Some(&0) {
        policy.push(0);
    }
    Ok(policy)
}

/// Read one request, terminated by NUL, newline or end of stream
fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut request = Vec::new();
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        if let Some(end) = chunk.iter().position(|&b| b == 0 || b == b'\n') {
            request.extend_from_slice(&chunk[..end]);
            reader.consume(end + 1);
            break;
        }
        let len = chunk.len();
        request.extend_from_slice(chunk);
        reader.consume(len);
        if request.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(request)
}

/// Blocking TCP listener serving the policy document
pub struct PolicyServer {
    listener: TcpListener,
    policy: Arc<Vec<u8>>,
}

impl PolicyServer {
    /// Bind the listener
    ///
    /// # Errors
    /// The bind error, e.g. address in use
    pub fn bind(addr: impl ToSocketAddrs, policy: Vec<u8>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!("Serving cross-domain policy on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            policy: Arc::new(policy),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Answer requests forever
    pub fn run(&self) {
        for stream in self.listener.incoming() {
            if let Err(e) = stream.and_then(|stream| self.spawn_responder(stream)) {
                warn!("dropping policy connection: {}", e);
            }
        }
    }

    /// Accept a single connection and answer it on its own thread
    pub fn accept_one(&self) -> io::Result<JoinHandle<io::Result<()>>> {
        let (stream, _) = self.listener.accept()?;
        self.spawn_responder(stream)
    }

    fn spawn_responder(&self, stream: TcpStream) -> io::Result<JoinHandle<io::Result<()>>> {
        let policy = Arc::clone(&self.policy);
        thread::Builder::new()
            .name("policy".to_string())
            .spawn(move || {
                let result = respond(stream, &policy);
                if let Err(e) = &result {
                    warn!("policy response failed: {}", e);
                }
                result
            })
    }
}

fn respond(stream: TcpStream, policy: &[u8]) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let request = read_request(&mut reader)?;
    debug!(
        "policy request from {}: {:?}",
        peer,
        String::from_utf8_lossy(&request)
    );

    let mut stream = stream;
    stream.write_all(policy)?;
    stream.flush()?;
    debug!("sent {} byte policy to {}", policy.len(), peer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_default_policy_is_nul_terminated() {
        let policy = load_policy(None).unwrap();
        assert_eq!(policy.last(), Some(&0));
        assert_eq!(policy.iter().filter(|&&b| b == 0).count(), 1);
        assert!(String::from_utf8_lossy(&policy).contains("<cross-domain-policy>"));
    }

    #[test]
    fn test_policy_file_gets_terminator() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("policy.xml");
        std::fs::write(&path, "<cross-domain-policy/>").unwrap();

        let policy = load_policy(Some(path.as_path())).unwrap();
        assert_eq!(policy, b"<cross-domain-policy/>\0".to_vec());
    }

    #[test]
    fn test_read_request_stops_at_nul() {
        let mut reader = Cursor::new(b"<policy-file-request/>\0trailing".to_vec());
        let request = read_request(&mut reader).unwrap();
        assert_eq!(request, b"<policy-file-request/>".to_vec());
    }

    #[test]
    fn test_read_request_at_eof() {
        let mut reader = Cursor::new(b"partial".to_vec());
        assert_eq!(read_request(&mut reader).unwrap(), b"partial".to_vec());
    }

    #[test]
    fn test_serves_policy() {
        let policy = load_policy(None).unwrap();
        let server = PolicyServer::bind("127.0.0.1:0", policy.clone()).unwrap();
        let addr = server.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"<policy-file-request/>\0").unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            response
        });

        server.accept_one().unwrap().join().unwrap().unwrap();
        assert_eq!(client.join().unwrap(), policy);
    }
}
