//! Bidirectional byte relay between two established connections.
//!
//! # Data Flow
//! ```text
//!            ┌──────── upstream pump ────────┐
//! side A  ───┤                               ├───  side B
//! (client)   └─────── downstream pump ───────┘     (backend)
//!                      │            │
//!                      └── mpsc(2) ─┴──▶ splice() returns on first arrival
//! ```
//!
//! # Design Decisions
//! - Protocol-agnostic: bytes are copied verbatim, FIFO per direction
//! - The tunnel dies with its first direction; a half-open relay is
//!   torn down rather than kept alive
//! - Each pump owns one read half and one write half; the connections are
//!   released when the last half is dropped, so a second close cannot happen
//! - The losing pump is aborted and joined before `splice` returns, so no
//!   task outlives the tunnel

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const BUF_SIZE: usize = 16 * 1024;

/// Copy direction relative to the arguments of [`splice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From side A to side B (client to backend).
    Upstream,
    /// From side B to side A (backend to client).
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one pump reports when it stops.
#[derive(Debug)]
struct PumpResult {
    direction: Direction,
    error: Option<io::Error>,
}

/// How a tunnel ended.
#[derive(Debug)]
pub struct SpliceOutcome {
    /// Direction that stopped first; `None` if a pump panicked before reporting.
    pub first: Option<Direction>,
    /// I/O error that stopped the first direction; `None` on clean EOF.
    pub error: Option<io::Error>,
    /// Bytes copied from A to B.
    pub upstream_bytes: u64,
    /// Bytes copied from B to A.
    pub downstream_bytes: u64,
    /// Tunnel lifetime.
    pub elapsed: Duration,
}

/// Relay bytes between `a` and `b` until either direction stops.
///
/// Both streams are consumed and dropped before this returns.
pub async fn splice<A, B>(a: A, b: B) -> SpliceOutcome
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let started = Instant::now();
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let upstream = Arc::new(AtomicU64::new(0));
    let downstream = Arc::new(AtomicU64::new(0));
    let (done_tx, mut done_rx) = mpsc::channel(2);

    let mut pumps = JoinSet::new();
    pumps.spawn(pump(
        Direction::Upstream,
        a_read,
        b_write,
        Arc::clone(&upstream),
        done_tx.clone(),
    ));
    pumps.spawn(pump(
        Direction::Downstream,
        b_read,
        a_write,
        Arc::clone(&downstream),
        done_tx,
    ));

    // A pump that panics never reports, so also wake on task exit.
    let first = tokio::select! {
        result = done_rx.recv() => result,
        _ = pumps.join_next() => done_rx.try_recv().ok(),
    };

    // Abort the other pump and wait for it; its halves drop here.
    pumps.shutdown().await;

    let (first, error) = match first {
        Some(result) => (Some(result.direction), result.error),
        None => (None, None),
    };

    SpliceOutcome {
        first,
        error,
        upstream_bytes: upstream.load(Ordering::Relaxed),
        downstream_bytes: downstream.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    }
}

async fn pump<R, W>(
    direction: Direction,
    mut src: R,
    mut dst: W,
    copied: Arc<AtomicU64>,
    done: mpsc::Sender<PumpResult>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUF_SIZE];
    let error = loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) => break Some(e),
        };
        if let Err(e) = write_chunk(&mut dst, &buf[..n]).await {
            break Some(e);
        }
        copied.fetch_add(n as u64, Ordering::Relaxed);
    };

    if error.is_none() {
        let _ = dst.shutdown().await;
    }

    tracing::trace!(%direction, error = ?error, "Pump stopped");
    // Capacity 2 with two senders: never blocks.
    let _ = done.send(PumpResult { direction, error }).await;
}

async fn write_chunk<W: AsyncWrite + Unpin>(dst: &mut W, chunk: &[u8]) -> io::Result<()> {
    dst.write_all(chunk).await?;
    dst.flush().await
}
