//! Receiving side: connection acceptor and per-connection sessions.
//!
//! The acceptor runs as one task. Every accepted connection gets its
//! own session task with its own [`DecoderSession`]; a failing session
//! ends only itself. Decoded frames and lifecycle changes are handed
//! to the renderer over a bounded channel of [`ViewerEvent`]s:
//!
//! - `FrameRendered` uses `try_send`; a full channel drops the frame
//!   (counted in [`ServerStats::events_dropped`]) so a slow renderer
//!   never stalls decoding.
//! - lifecycle events wait for capacity.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{CodecKind, DecoderSession};
use crate::error::LumenError;
use crate::frame::{PixelFormat, RawFrame, Resolution};
use crate::metrics::MetricsSink;
use crate::status::StatusBoard;
use crate::wire::WireReceiver;

/// Pause after an unexpected accept error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ── ServerConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// 0 picks an ephemeral port, see [`ScreenServer::local_addr`].
    pub port: u16,
    /// Codec name the sender is expected to use.
    pub codec: String,
    /// Packed layout of rendered frames.
    pub output_format: PixelFormat,
    /// Capacity of the event channel.
    pub event_buffer: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            codec: CodecKind::PlanarZstd.name().to_string(),
            output_format: PixelFormat::Bgra8,
            event_buffer: 8,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// One decoded frame ready for display, with the metrics at render time.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: RawFrame,
    pub fps: u32,
    pub frame_size_kb: u32,
}

/// Everything the renderer is told about.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    ClientConnected { peer: SocketAddr },
    /// The header was parsed; resolution is fixed for the session.
    SessionStarted { peer: SocketAddr, resolution: Resolution },
    FrameRendered(RenderedFrame),
    /// `reason` is `None` for a clean close.
    ClientDisconnected { peer: SocketAddr, reason: Option<String> },
}

// ── ServerStats ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ServerStats {
    pub sessions: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub events_dropped: AtomicU64,
}

impl ServerStats {
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }
}

// ── Shared session state ─────────────────────────────────────────

/// State every session of one server shares.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub kind: CodecKind,
    pub output_format: PixelFormat,
    pub metrics: Arc<MetricsSink>,
    pub status: Arc<StatusBoard>,
    pub stats: Arc<ServerStats>,
    pub events: mpsc::Sender<ViewerEvent>,
    pub cancel: CancellationToken,
}

impl SessionContext {
    /// Lifecycle event: waits for room, gives up on cancel or a
    /// dropped receiver.
    async fn emit(&self, event: ViewerEvent) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.events.send(event) => {}
        }
    }

    /// Frame event: never waits.
    fn emit_frame(&self, frame: RenderedFrame) {
        if self.events.try_send(ViewerEvent::FrameRendered(frame)).is_err() {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ── ScreenServer ─────────────────────────────────────────────────

/// A listening receiver. Dropping it stops the acceptor.
pub struct ScreenServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    acceptor: Option<JoinHandle<()>>,
    metrics: Arc<MetricsSink>,
    status: Arc<StatusBoard>,
    stats: Arc<ServerStats>,
    shutdown_timeout: Duration,
}

impl ScreenServer {
    /// `startListening(port)`.
    ///
    /// Returns the server and the receiving end of its event channel.
    /// Dropping the receiver is allowed; events are then discarded.
    pub async fn listen(
        config: ServerConfig,
    ) -> Result<(Self, mpsc::Receiver<ViewerEvent>), LumenError> {
        Self::listen_with_status(config, Arc::new(StatusBoard::new("idle"))).await
    }

    pub async fn listen_with_status(
        config: ServerConfig,
        status: Arc<StatusBoard>,
    ) -> Result<(Self, mpsc::Receiver<ViewerEvent>), LumenError> {
        let kind = match CodecKind::from_name(&config.codec) {
            Ok(kind) => kind,
            Err(e) => {
                status.error(e.to_string());
                return Err(e);
            }
        };

        let listener = match TcpListener::bind((config.bind_address.as_str(), config.port)).await {
            Ok(listener) => listener,
            Err(source) => {
                let e = LumenError::Bind {
                    port: config.port,
                    source,
                };
                status.error(e.to_string());
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let metrics = Arc::new(MetricsSink::new());
        let stats = Arc::new(ServerStats::default());

        let ctx = SessionContext {
            kind,
            output_format: config.output_format,
            metrics: metrics.clone(),
            status: status.clone(),
            stats: stats.clone(),
            events: tx,
            cancel: cancel.clone(),
        };

        status.info(format!("listening on port {}", local_addr.port()));
        info!(%local_addr, codec = %kind, "listening");

        let acceptor = tokio::spawn(accept_loop(listener, ctx));

        Ok((
            Self {
                local_addr,
                cancel,
                acceptor: Some(acceptor),
                metrics,
                status,
                stats,
                shutdown_timeout: config.shutdown_timeout,
            },
            rx,
        ))
    }

    /// `stopListening()`: stops accepting and ends every session.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(mut acceptor) = self.acceptor.take() {
            if tokio::time::timeout(self.shutdown_timeout, &mut acceptor)
                .await
                .is_err()
            {
                warn!("acceptor did not stop in time");
                acceptor.abort();
            }
        }
        self.metrics.reset();
        self.status.info("stopped");
        info!("server stopped");
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> Arc<MetricsSink> {
        self.metrics.clone()
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        self.status.clone()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }
}

impl Drop for ScreenServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Acceptor ─────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, ctx: SessionContext) {
    let mut sessions = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        // Reap finished sessions.
        while sessions.try_join_next().is_some() {}

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, "set_nodelay failed: {e}");
                }
                ctx.metrics.reset();
                let session = ctx.stats.sessions.fetch_add(1, Ordering::Relaxed) + 1;
                ctx.status.active(format!("client connected: {peer}"));
                info!(%peer, "client connected");
                ctx.emit(ViewerEvent::ClientConnected { peer }).await;

                sessions.spawn(run_session(stream, peer, session, ctx.clone()));
            }
            Err(e) => {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                warn!("accept failed: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
    debug!("acceptor stopped");
}

/// `session` is the acceptor's running count at accept time; shared
/// metrics and status belong to whichever session was accepted last.
async fn run_session<R>(io: R, peer: SocketAddr, session: u64, ctx: SessionContext)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let result = handle_session(io, peer, &ctx).await;
    let reason = match &result {
        Ok(frames) => {
            info!(%peer, frames, "client disconnected");
            None
        }
        Err(e) => {
            warn!(%peer, "session ended: {e}");
            Some(e.to_string())
        }
    };

    let latest = ctx.stats.sessions() == session;
    if latest {
        ctx.metrics.reset();
    }
    if latest && !ctx.cancel.is_cancelled() {
        match &reason {
            None => ctx.status.info("client disconnected"),
            Some(r) => ctx.status.warning(format!("client disconnected: {r}")),
        }
    }
    ctx.emit(ViewerEvent::ClientDisconnected { peer, reason }).await;
}

// ── Session handler ──────────────────────────────────────────────

/// Serve one inbound stream until it closes, fails or is cancelled.
///
/// Returns the number of frames rendered. Per-packet decode failures,
/// including packets whose size differs from the header, are logged and
/// skipped; header, framing and transport failures end the session with
/// an error.
pub async fn handle_session<R>(io: R, peer: SocketAddr, ctx: &SessionContext) -> Result<u64, LumenError>
where
    R: AsyncRead + Unpin,
{
    let mut rx = WireReceiver::new(io);
    let resolution = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(0),
        header = rx.read_header() => header?,
    };
    info!(%peer, %resolution, "session started");
    ctx.emit(ViewerEvent::SessionStarted { peer, resolution }).await;

    let decoder = DecoderSession::open(ctx.kind, resolution)?.with_output_format(ctx.output_format);
    let mut rendered = 0u64;

    loop {
        let payload = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            next = rx.next_packet() => match next {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => {
                    decoder.close();
                    return Err(e);
                }
            },
        };

        let size = payload.len();
        let session_decoder = decoder.clone();
        let frames = match tokio::task::spawn_blocking(move || session_decoder.decode(&payload)).await? {
            Ok(frames) => frames,
            Err(e) => {
                ctx.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, size, "packet dropped: {e}");
                continue;
            }
        };

        for frame in frames {
            let snapshot = ctx.metrics.record_frame(size);
            ctx.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
            rendered += 1;
            ctx.emit_frame(RenderedFrame {
                frame,
                fps: snapshot.fps,
                frame_size_kb: snapshot.last_frame_size_kb,
            });
        }
    }

    decoder.close();
    Ok(rendered)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ScreenSource, TestPattern};
    use crate::codec::{EncoderSession, EncoderSettings};
    use tokio_test::io::Builder;

    fn context(buffer: usize) -> (SessionContext, mpsc::Receiver<ViewerEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            SessionContext {
                kind: CodecKind::PlanarZstd,
                output_format: PixelFormat::Bgra8,
                metrics: Arc::new(MetricsSink::new()),
                status: Arc::new(StatusBoard::new("idle")),
                stats: Arc::new(ServerStats::default()),
                events: tx,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn encoded_stream(w: u32, h: u32, count: i64) -> Vec<u8> {
        let enc = EncoderSession::open(w, h, &EncoderSettings::default()).unwrap();
        let mut src = TestPattern::new(w, h);
        let mut wire = format!("{w}x{h}\n").into_bytes();
        for pts in 0..count {
            for p in enc.encode(&src.capture().unwrap(), pts).unwrap() {
                wire.extend_from_slice(&(p.len() as i32).to_le_bytes());
                wire.extend_from_slice(&p.data);
            }
        }
        wire
    }

    #[tokio::test]
    async fn renders_every_frame_in_order() {
        let (ctx, mut events) = context(16);
        let io = Builder::new().read(&encoded_stream(24, 16, 5)).build();

        let rendered = handle_session(io, peer(), &ctx).await.unwrap();
        assert_eq!(rendered, 5);
        assert_eq!(ctx.metrics.snapshot().frames, 5);

        match events.recv().await.unwrap() {
            ViewerEvent::SessionStarted { resolution, .. } => {
                assert_eq!(resolution, Resolution::new(24, 16))
            }
            other => panic!("unexpected {other:?}"),
        }
        for expected in 0..5u64 {
            match events.recv().await.unwrap() {
                ViewerEvent::FrameRendered(r) => {
                    assert_eq!(r.frame.sequence, expected);
                    assert_eq!((r.frame.width, r.frame.height), (24, 16));
                    assert!(r.fps >= 1);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn corrupt_packet_is_skipped() {
        let (ctx, _events) = context(16);
        let mut wire = encoded_stream(8, 8, 1);
        wire.extend_from_slice(&5i32.to_le_bytes());
        wire.extend_from_slice(b"junk!");
        let io = Builder::new().read(&wire).build();

        assert_eq!(handle_session(io, peer(), &ctx).await.unwrap(), 1);
        assert_eq!(ctx.stats.decode_errors(), 1);
    }

    #[tokio::test]
    async fn invalid_length_ends_session() {
        let (ctx, _events) = context(16);
        let mut wire = b"8x8\n".to_vec();
        wire.extend_from_slice(&(-1i32).to_le_bytes());
        let io = Builder::new().read(&wire).build();

        assert!(matches!(
            handle_session(io, peer(), &ctx).await,
            Err(LumenError::MalformedFrameLength(-1))
        ));
    }

    #[tokio::test]
    async fn bad_header_ends_session() {
        let (ctx, _events) = context(16);
        let io = Builder::new().read(b"hello world\n").build();
        assert!(matches!(
            handle_session(io, peer(), &ctx).await,
            Err(LumenError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn full_channel_drops_frames_not_session() {
        let (ctx, _events) = context(1);
        let io = Builder::new().read(&encoded_stream(8, 8, 4)).build();

        // SessionStarted takes the only slot; every frame is dropped.
        assert_eq!(handle_session(io, peer(), &ctx).await.unwrap(), 4);
        assert_eq!(ctx.stats.events_dropped(), 4);
    }

    #[tokio::test]
    async fn packet_with_forged_size_is_skipped() {
        let (ctx, _events) = context(16);
        let mut forged = vec![1u8, 0];
        forged.extend_from_slice(&u32::MAX.to_le_bytes());
        forged.extend_from_slice(&u32::MAX.to_le_bytes());
        forged.extend_from_slice(&0i64.to_le_bytes());
        forged.extend_from_slice(&zstd::encode_all(&[][..], 0).unwrap());

        let valid = encoded_stream(8, 8, 1);
        let mut wire = b"8x8\n".to_vec();
        wire.extend_from_slice(&(forged.len() as i32).to_le_bytes());
        wire.extend_from_slice(&forged);
        wire.extend_from_slice(&valid[4..]);
        let io = Builder::new().read(&wire).build();

        assert_eq!(handle_session(io, peer(), &ctx).await.unwrap(), 1);
        assert_eq!(ctx.stats.decode_errors(), 1);
    }

    #[tokio::test]
    async fn stale_session_leaves_newer_metrics_alone() {
        let (ctx, _events) = context(16);
        ctx.stats.sessions.store(2, Ordering::Relaxed);
        ctx.status.active("client connected: 127.0.0.1:40001");
        ctx.metrics.record_frame(2048);

        let io = Builder::new().read(b"8x8\n").build();
        run_session(io, peer(), 1, ctx.clone()).await;
        assert_eq!(ctx.metrics.snapshot().frames, 1);
        assert_eq!(ctx.status.current().text, "client connected: 127.0.0.1:40001");

        let io = Builder::new().read(b"8x8\n").build();
        run_session(io, peer(), 2, ctx.clone()).await;
        assert_eq!(ctx.metrics.snapshot().frames, 0);
        assert_eq!(ctx.status.current().text, "client disconnected");
    }
}
