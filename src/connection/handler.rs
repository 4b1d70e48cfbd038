//! Per-client connection handling.
//!
//! Each accepted socket gets its own task running a read loop:
//!
//! 1. Read a chunk from the socket (up to [`READ_CHUNK_SIZE`] bytes).
//! 2. Feed it to the connection's decoder slice by slice. Every complete
//!    value is resolved to a command, executed under the keyspace lock, and
//!    its encoded reply appended to the batch buffer.
//! 3. Flush the whole batch in a single write, so pipelined requests get
//!    pipelined replies in order.
//!
//! A protocol violation resets the decoder and discards the rest of the
//! current chunk, but keeps the connection; the client simply loses that
//! frame. Expiration housekeeping piggybacks on traffic: every
//! [`SWEEP_INTERVAL`] executed commands the handler runs one bounded
//! keyspace sweep.

use crate::commands;
use crate::protocol::{encoder, Outcome, RespDecoder};
use crate::storage::Keyspace;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// The keyspace shared by every connection. A std mutex is deliberate:
/// commands never await while holding it, so execution is strictly serial.
pub type SharedKeyspace = Arc<Mutex<Keyspace>>;

/// Bytes read from the socket per iteration.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Initial capacity of the per-connection reply batch buffer.
const REPLY_BUFFER_SIZE: usize = 8192;

/// Capacity above which an idle connection gives batch memory back.
const REPLY_BUFFER_RETAIN: usize = 64 * 1024;

/// Executed commands between amortized expiration sweeps.
const SWEEP_INTERVAL: usize = 100;

/// Entries probed per sweep.
const SWEEP_CHECKS: usize = 20;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    fn add_commands(&self, count: usize) {
        self.commands_processed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn add_bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Why a connection ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client disconnected")]
    ClientDisconnected,
}

/// State owned by one client connection.
pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    keyspace: SharedKeyspace,
    decoder: RespDecoder,
    reply_buf: BytesMut,
    commands_since_sweep: usize,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        keyspace: SharedKeyspace,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream,
            addr,
            keyspace,
            decoder: RespDecoder::new(),
            reply_buf: BytesMut::with_capacity(REPLY_BUFFER_SIZE),
            commands_since_sweep: 0,
            stats,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::Io(e))
                if e.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "connection error"),
            Ok(()) => {}
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ConnectionError::ClientDisconnected);
            }
            self.stats.add_bytes_read(n);

            self.execute_chunk(&chunk[..n]);

            // All replies from this read go out in one write, preserving
            // pipelining order.
            if !self.reply_buf.is_empty() {
                self.stream.write_all(&self.reply_buf).await?;
                self.stats.add_bytes_written(self.reply_buf.len());
            }

            // Per-batch memory is reclaimed in one step. An oversized
            // buffer is only given back while no partial value is buffered.
            self.reply_buf.clear();
            if self.decoder.is_idle() && self.reply_buf.capacity() > REPLY_BUFFER_RETAIN {
                self.reply_buf = BytesMut::with_capacity(REPLY_BUFFER_SIZE);
            }
        }
    }

    /// Decodes and executes every complete request in `input`, batching the
    /// encoded replies.
    fn execute_chunk(&mut self, mut input: &[u8]) {
        let mut executed = 0usize;

        while !input.is_empty() {
            let result = self.decoder.feed(input);
            input = &input[result.consumed..];

            match result.outcome {
                Outcome::NeedMore => break,
                Outcome::Cancelled => {
                    warn!(client = %self.addr, "protocol violation, dropping rest of chunk");
                    self.decoder.reset();
                    break;
                }
                Outcome::Value(request) => {
                    trace!(client = %self.addr, request = %request, "request");
                    let reply = {
                        let mut store = self.keyspace.lock().unwrap();
                        commands::execute(&request, &mut store)
                    };
                    encoder::serialize_into(&reply, &mut self.reply_buf);
                    self.decoder.reset();
                    executed += 1;
                }
            }
        }

        self.stats.add_commands(executed);
        self.commands_since_sweep += executed;
        if self.commands_since_sweep >= SWEEP_INTERVAL {
            self.keyspace.lock().unwrap().sweep(SWEEP_CHECKS);
            self.commands_since_sweep = 0;
        }
    }
}

/// Accepts one connection's lifecycle: build the handler, run it, log the
/// non-routine endings.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    keyspace: SharedKeyspace,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, keyspace, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %e, "connection ended with error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, SharedKeyspace, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let keyspace: SharedKeyspace = Arc::new(Mutex::new(Keyspace::new()));
        let stats = Arc::new(ConnectionStats::new());

        let keyspace_clone = Arc::clone(&keyspace);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let keyspace = Arc::clone(&keyspace_clone);
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, keyspace, stats));
            }
        });

        (addr, keyspace, stats)
    }

    async fn read_exactly(client: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .expect("read failed");
        buf
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], expected: &[u8]) {
        client.write_all(request).await.unwrap();
        let reply = read_exactly(client, expected.len()).await;
        assert_eq!(
            reply,
            expected,
            "reply {:?} != expected {:?}",
            String::from_utf8_lossy(&reply),
            String::from_utf8_lossy(expected)
        );
    }

    #[tokio::test]
    async fn ping_pong() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn set_then_get() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(&mut client, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$1\r\nv\r\n").await;
    }

    #[tokio::test]
    async fn get_missing_key_is_nil_bulk() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*2\r\n$3\r\nGET\r\n$3\r\nnil\r\n",
            b"$5\r\n(nil)\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn rpush_then_lrange_pipelined() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*4\r\n$5\r\nRPUSH\r\n$1\r\nl\r\n$1\r\na\r\n$1\r\nb\r\n\
              *4\r\n$6\r\nLRANGE\r\n$1\r\nl\r\n$1\r\n0\r\n$2\r\n-1\r\n",
            b":2\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn sadd_twice_pipelined() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*3\r\n$4\r\nSADD\r\n$1\r\ns\r\n$1\r\nx\r\n\
              *3\r\n$4\r\nSADD\r\n$1\r\ns\r\n$1\r\nx\r\n",
            b":1\r\n:0\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn wrong_type_error_on_the_wire() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$4\r\nLLEN\r\n$1\r\nk\r\n",
            b"+OK\r\n-WRONGTYPE Operation against a key holding the wrong kind of value\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn unknown_and_lowercase_commands() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*1\r\n$3\r\nFOO\r\n",
            b"-ERR unknown command 'FOO'\r\n",
        )
        .await;
        roundtrip(
            &mut client,
            b"*1\r\n$4\r\nping\r\n",
            b"-ERR unknown command 'ping'\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn pipelined_batch_keeps_order() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut request = Vec::new();
        let mut expected = Vec::new();
        for i in 0..150 {
            let key = format!("k{}", i);
            request.extend_from_slice(
                format!(
                    "*3\r\n$3\r\nSET\r\n${}\r\n{}\r\n$1\r\nv\r\n",
                    key.len(),
                    key
                )
                .as_bytes(),
            );
            expected.extend_from_slice(b"+OK\r\n");
        }

        client.write_all(&request).await.unwrap();
        let reply = read_exactly(&mut client, expected.len()).await;
        assert_eq!(reply, expected);
    }

    #[tokio::test]
    async fn request_split_across_writes() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPI").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"NG\r\n").await.unwrap();

        let reply = read_exactly(&mut client, 7).await;
        assert_eq!(reply, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn protocol_violation_keeps_the_connection() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"@not resp\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    }

    #[tokio::test]
    async fn envelope_errors_on_the_wire() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // bare integer where a command array belongs
        roundtrip(
            &mut client,
            b":1\r\n",
            b"-ERR invalid command format\r\n",
        )
        .await;
        // array whose first element is not a bulk string
        roundtrip(
            &mut client,
            b"*1\r\n:1\r\n",
            b"-ERR command name must be a bulk string\r\n",
        )
        .await;
    }

    #[tokio::test]
    async fn expire_ttl_on_the_wire() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut client,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
            b"+OK\r\n",
        )
        .await;
        roundtrip(
            &mut client,
            b"*3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$3\r\n100\r\n",
            b":1\r\n",
        )
        .await;

        client
            .write_all(b"*2\r\n$3\r\nTTL\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        let reply = read_exactly(&mut client, 2).await;
        assert_eq!(&reply, b":9"); // 99 or 100 seconds remain
    }

    #[tokio::test]
    async fn connection_stats_track_activity() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn keyspace_is_shared_between_connections() {
        let (addr, _, _) = create_test_server().await;

        let mut writer = TcpStream::connect(addr).await.unwrap();
        roundtrip(
            &mut writer,
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n",
            b"+OK\r\n",
        )
        .await;

        let mut reader = TcpStream::connect(addr).await.unwrap();
        roundtrip(&mut reader, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", b"$1\r\nv\r\n").await;
    }
}
