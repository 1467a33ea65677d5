//! Blocking TCP front end: one worker per connection behind a bounded gate.
//!
//! All engine work is synchronous and runs to completion, so the transport
//! is plain threads over a blocking listener. A fatal error in any worker
//! flips the shutdown flag and nudges the accept loop awake; the loop then
//! returns the error for orderly process shutdown instead of continuing
//! past structural corruption.

pub mod dispatch;
pub mod protocol;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::db::DatabasePool;
use crate::error::{Result, StoreError};

const READ_CHUNK: usize = 1024;
const BIND_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Transport settings fixed at process start.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Handle connections on the accept thread instead of spawning workers.
    pub mono: bool,
    /// Maximum concurrently running workers; 0 means unbounded.
    pub max_workers: usize,
    /// Keep retrying the bind while the port is taken.
    pub bind_retry: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7212,
            mono: false,
            max_workers: 20,
            bind_retry: false,
        }
    }
}

/// Gate bounding how many connection workers run at once.
///
/// Admission polls on a fixed interval rather than parking on a wakeup
/// primitive; the interval keeps the retry from spinning.
struct WorkerGate {
    active: Mutex<usize>,
    limit: usize,
}

impl WorkerGate {
    const RETRY_INTERVAL: Duration = Duration::from_millis(100);

    fn new(limit: usize) -> Self {
        Self {
            active: Mutex::new(0),
            limit,
        }
    }

    fn admit(&self) {
        if self.limit == 0 {
            return;
        }
        loop {
            {
                let mut active = self.active.lock();
                if *active < self.limit {
                    *active += 1;
                    return;
                }
            }
            thread::sleep(Self::RETRY_INTERVAL);
        }
    }

    fn release(&self) {
        if self.limit == 0 {
            return;
        }
        let mut active = self.active.lock();
        *active = active.saturating_sub(1);
    }
}

/// Shared flag a worker raises when it hits a fatal error.
#[derive(Default)]
struct FatalSignal {
    raised: AtomicBool,
    cause: Mutex<Option<StoreError>>,
}

impl FatalSignal {
    fn raise(&self, err: StoreError, port: u16) {
        error!(%err, "fatal error; shutting down");
        *self.cause.lock() = Some(err);
        self.raised.store(true, Ordering::SeqCst);
        // Nudge the blocking accept loop awake so it can observe the flag.
        let _ = TcpStream::connect(("127.0.0.1", port));
    }

    fn take(&self) -> Option<StoreError> {
        if self.raised.load(Ordering::SeqCst) {
            self.cause.lock().take()
        } else {
            None
        }
    }
}

/// The serving loop over one pool.
pub struct TcpServer {
    pool: Arc<DatabasePool>,
    config: ServerConfig,
}

impl TcpServer {
    /// A server over `pool` with `config`.
    pub fn new(pool: Arc<DatabasePool>, config: ServerConfig) -> Self {
        Self { pool, config }
    }

    /// Bind and serve until a fatal error stops the process.
    pub fn serve(&self) -> Result<()> {
        let listener = self.bind()?;
        info!(port = self.config.port, mono = self.config.mono, "listening");

        let gate = Arc::new(WorkerGate::new(self.config.max_workers));
        let fatal = Arc::new(FatalSignal::default());

        for incoming in listener.incoming() {
            if let Some(err) = fatal.take() {
                return Err(err);
            }
            let stream = match incoming {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            if self.config.mono {
                if let Err(err) = handle_connection(&self.pool, stream) {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(%err, "connection failed");
                }
                continue;
            }
            gate.admit();
            let pool = Arc::clone(&self.pool);
            let gate = Arc::clone(&gate);
            let fatal = Arc::clone(&fatal);
            let port = self.config.port;
            thread::spawn(move || {
                if let Err(err) = handle_connection(&pool, stream) {
                    if err.is_fatal() {
                        fatal.raise(err, port);
                    } else {
                        warn!(%err, "connection failed");
                    }
                }
                gate.release();
            });
        }
        Ok(())
    }

    fn bind(&self) -> Result<TcpListener> {
        loop {
            match TcpListener::bind(("0.0.0.0", self.config.port)) {
                Ok(listener) => return Ok(listener),
                Err(err) if self.config.bind_retry => {
                    warn!(port = self.config.port, %err, "bind failed; retrying");
                    thread::sleep(BIND_RETRY_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Serve one connection: extract frames, dispatch each, answer in place.
/// Returns when the peer closes or the connection poisons itself.
fn handle_connection(pool: &DatabasePool, mut stream: TcpStream) -> Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        loop {
            match protocol::next_frame(&mut buffer) {
                Ok(Some(payload)) => {
                    let reply = dispatch::handle_payload(pool, &payload)?;
                    stream.write_all(reply.as_bytes())?;
                }
                Ok(None) => break,
                Err(StoreError::ParseFault(reason)) => {
                    warn!(%reason, "dropping connection");
                    let _ = stream.write_all(protocol::SENTINEL_PARSE_FAULT.as_bytes());
                    return Ok(());
                }
                Err(err) => {
                    warn!(%err, "dropping connection");
                    let _ = stream.write_all(protocol::SENTINEL_MALFORMED.as_bytes());
                    return Ok(());
                }
            }
        }
    }
}
