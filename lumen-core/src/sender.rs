//! Sending pipeline: capture → queue → encode → wire.
//!
//! Two concurrency domains per [`ScreenSender`]:
//!
//! 1. **Capture**: [`spawn_capture`] opens the source on a blocking
//!    thread and produces into the shared [`FrameQueue`]. It never
//!    touches the codec or the network.
//! 2. **Encode/send**: one tokio task that polls the queue, runs each
//!    frame through the [`EncoderSession`] on the blocking pool and
//!    writes the packets. It is the only writer of the stream, so wire
//!    order is encode order is pop order.
//!
//! One [`CancellationToken`] stops both. Shutdown waits (bounded) for
//! the worker's in-flight encode before the codec context is closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureStats, DEFAULT_CAPTURE_INTERVAL, ScreenSource, spawn_capture};
use crate::codec::{EncoderSession, EncoderSettings};
use crate::error::LumenError;
use crate::frame::{EncodedPacket, Resolution};
use crate::metrics::ThroughputMeter;
use crate::queue::{DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK, FrameQueue};
use crate::status::{Severity, StatusBoard};
use crate::wire::WireSender;

/// How long the worker sleeps when the queue is empty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long a stopping worker may spend flushing the codec into the
/// stream before the stream is dropped unflushed.
pub const FLUSH_GRACE: Duration = Duration::from_millis(250);

// ── SenderConfig ─────────────────────────────────────────────────

/// Configuration for [`ScreenSender`].
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Viewer host name or IP.
    pub address: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Target time between capture starts.
    pub capture_interval: Duration,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub encoder: EncoderSettings,
    /// Upper bound on waiting for the worker during [`ScreenSender::stop`].
    pub shutdown_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
            connect_timeout: Duration::from_secs(5),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
            encoder: EncoderSettings::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

// ── SenderStats ──────────────────────────────────────────────────

/// Encode/send counters, updated by the worker.
#[derive(Debug, Default)]
pub struct SenderStats {
    pub frames_encoded: AtomicU64,
    pub encode_errors: AtomicU64,
    pub keyframes_forced: AtomicU64,
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    /// Outbound bytes/s over the last second.
    pub throughput_bps: AtomicU64,
}

/// Point-in-time copy of every sender counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStatsSnapshot {
    pub captured: u64,
    pub dropped: u64,
    pub capture_errors: u64,
    pub encoded: u64,
    pub encode_errors: u64,
    pub keyframes_forced: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub throughput_bps: u64,
}

// ── ScreenSender ─────────────────────────────────────────────────

/// A running sending pipeline.
pub struct ScreenSender {
    cancel: CancellationToken,
    queue: Arc<FrameQueue>,
    encoder: EncoderSession,
    capture_task: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<Result<(), LumenError>>>,
    capture_stats: Arc<CaptureStats>,
    stats: Arc<SenderStats>,
    status: Arc<StatusBoard>,
    peer: Option<SocketAddr>,
    shutdown_timeout: Duration,
}

impl ScreenSender {
    /// `startSending(address, port)`.
    ///
    /// Opens the source (on the capture thread) and the encoder at its
    /// resolution, connects, sends the header and starts both loops.
    /// Source, codec and connect failures are returned here and nothing
    /// keeps running.
    pub async fn start<F, S>(config: SenderConfig, open: F) -> Result<Self, LumenError>
    where
        F: FnOnce() -> Result<S, LumenError> + Send + 'static,
        S: ScreenSource,
    {
        Self::start_with_status(config, open, Arc::new(StatusBoard::new("idle"))).await
    }

    /// Like [`start`](Self::start), publishing progress to `status`.
    pub async fn start_with_status<F, S>(
        config: SenderConfig,
        open: F,
        status: Arc<StatusBoard>,
    ) -> Result<Self, LumenError>
    where
        F: FnOnce() -> Result<S, LumenError> + Send + 'static,
        S: ScreenSource,
    {
        let target = format!("{}:{}", config.address, config.port);
        status.info(format!("connecting to {target}"));

        let parts = Pipeline::prepare(&config, open, &status).await?;
        let stream = match connect(&config).await {
            Ok(stream) => stream,
            Err(e) => {
                status.error(format!("connect to {target} failed: {e}"));
                parts.abandon().await;
                return Err(e);
            }
        };
        let peer = stream.peer_addr().ok();
        info!(%target, resolution = %parts.resolution, "connected");

        let mut sender = Self::launch(config, parts, stream, status).await?;
        sender.peer = peer;
        Ok(sender)
    }

    /// Run the pipeline over an already connected stream.
    pub async fn with_stream<F, S, W>(
        config: SenderConfig,
        open: F,
        stream: W,
        status: Arc<StatusBoard>,
    ) -> Result<Self, LumenError>
    where
        F: FnOnce() -> Result<S, LumenError> + Send + 'static,
        S: ScreenSource,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let parts = Pipeline::prepare(&config, open, &status).await?;
        Self::launch(config, parts, stream, status).await
    }

    async fn launch<W>(
        config: SenderConfig,
        parts: Pipeline,
        stream: W,
        status: Arc<StatusBoard>,
    ) -> Result<Self, LumenError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut wire = WireSender::new(stream);
        if let Err(e) = wire.send_header(parts.resolution).await {
            status.error(format!("handshake failed: {e}"));
            parts.abandon().await;
            return Err(e);
        }

        let stats = Arc::new(SenderStats::default());
        let worker = tokio::spawn(encode_worker(
            wire,
            EncodeWorker {
                queue: parts.queue.clone(),
                encoder: parts.encoder.clone(),
                stats: stats.clone(),
                status: status.clone(),
                cancel: parts.cancel.clone(),
            },
        ));

        status.active(format!("streaming {}", parts.resolution));

        Ok(Self {
            cancel: parts.cancel,
            queue: parts.queue,
            encoder: parts.encoder,
            capture_task: Some(parts.capture_task),
            worker: Some(worker),
            capture_stats: parts.capture_stats,
            stats,
            status,
            peer: None,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// `stopSending()`.
    ///
    /// Cancels both loops, discards queued frames, waits up to
    /// `shutdown_timeout` for the worker and then closes the codec.
    /// A write blocked on a slow peer is abandoned on cancel and the
    /// stream dropped.
    /// Returns the worker's error if the pipeline had already failed.
    pub async fn stop(&mut self) -> Result<(), LumenError> {
        self.cancel.cancel();
        let discarded = self.queue.drain();
        debug!(discarded, "sender stopping");

        if let Some(capture) = self.capture_task.take() {
            if let Err(e) = capture.await {
                warn!("capture thread ended abnormally: {e}");
            }
        }

        let result = match self.worker.take() {
            Some(mut worker) => match tokio::time::timeout(self.shutdown_timeout, &mut worker).await {
                Ok(joined) => joined.map_err(LumenError::from).and_then(|r| r),
                Err(_) => {
                    worker.abort();
                    warn!(timeout = ?self.shutdown_timeout, "encode worker did not stop in time");
                    Err(LumenError::Timeout(self.shutdown_timeout))
                }
            },
            None => Ok(()),
        };

        self.queue.drain();
        let encoder = self.encoder.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || encoder.close()).await {
            warn!("closing encoder failed: {e}");
        }

        if self.status.current().severity != Severity::Error {
            self.status.info("stopped");
        }
        info!(stats = ?self.stats(), "sender stopped");
        result
    }

    /// Resolves once the pipeline is cancelled, by `stop` or by a
    /// fatal transport error.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn status(&self) -> Arc<StatusBoard> {
        self.status.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SenderStatsSnapshot {
        SenderStatsSnapshot {
            captured: self.capture_stats.captured(),
            dropped: self.capture_stats.dropped(),
            capture_errors: self.capture_stats.errors(),
            encoded: self.stats.frames_encoded.load(Ordering::Relaxed),
            encode_errors: self.stats.encode_errors.load(Ordering::Relaxed),
            keyframes_forced: self.stats.keyframes_forced.load(Ordering::Relaxed),
            packets_sent: self.stats.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            throughput_bps: self.stats.throughput_bps.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ScreenSender {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Capture thread and codec, both running before the stream is up.
struct Pipeline {
    cancel: CancellationToken,
    queue: Arc<FrameQueue>,
    capture_stats: Arc<CaptureStats>,
    capture_task: JoinHandle<()>,
    encoder: EncoderSession,
    resolution: Resolution,
}

impl Pipeline {
    async fn prepare<F, S>(
        config: &SenderConfig,
        open: F,
        status: &StatusBoard,
    ) -> Result<Self, LumenError>
    where
        F: FnOnce() -> Result<S, LumenError> + Send + 'static,
        S: ScreenSource,
    {
        let cancel = CancellationToken::new();
        let queue = Arc::new(FrameQueue::with_watermarks(
            config.high_watermark,
            config.low_watermark,
        ));
        let capture_stats = Arc::new(CaptureStats::default());

        let (capture_task, resolution) = match spawn_capture(
            open,
            queue.clone(),
            capture_stats.clone(),
            config.capture_interval,
            cancel.clone(),
        )
        .await
        {
            Ok(started) => started,
            Err(e) => {
                status.error(format!("capture: {e}"));
                return Err(e);
            }
        };

        let encoder = match EncoderSession::open(resolution.width, resolution.height, &config.encoder) {
            Ok(encoder) => encoder,
            Err(e) => {
                status.error(format!("encoder: {e}"));
                cancel.cancel();
                if let Err(join) = capture_task.await {
                    warn!("capture thread ended abnormally: {join}");
                }
                return Err(e);
            }
        };

        Ok(Self {
            cancel,
            queue,
            capture_stats,
            capture_task,
            encoder,
            resolution,
        })
    }

    /// Tear down after the stream failed to come up.
    async fn abandon(self) {
        self.cancel.cancel();
        if let Err(e) = self.capture_task.await {
            warn!("capture thread ended abnormally: {e}");
        }
        self.queue.drain();
        self.encoder.close();
    }
}

async fn connect(config: &SenderConfig) -> Result<TcpStream, LumenError> {
    let stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.address.as_str(), config.port)),
    )
    .await
    .map_err(|_| LumenError::Timeout(config.connect_timeout))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

// ── Encode worker ────────────────────────────────────────────────

struct EncodeWorker {
    queue: Arc<FrameQueue>,
    encoder: EncoderSession,
    stats: Arc<SenderStats>,
    status: Arc<StatusBoard>,
    cancel: CancellationToken,
}

impl EncodeWorker {
    async fn send<W: AsyncWrite + Unpin>(
        &self,
        wire: &mut WireSender<W>,
        meter: &mut ThroughputMeter,
        packet: &EncodedPacket,
    ) -> Result<(), LumenError> {
        match wire.send_packet(packet).await {
            Ok(written) => {
                meter.record(written as u64);
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
                self.stats
                    .throughput_bps
                    .store(meter.bytes_per_sec(), Ordering::Relaxed);
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                // The receiver's reference no longer matches ours.
                warn!(pts = packet.pts, "packet skipped: {e}");
                self.encoder.request_keyframe();
                self.stats.keyframes_forced.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run codec work on the blocking pool. A failed join stops the
    /// pipeline like any other fatal error.
    async fn blocking<T, F>(&self, f: F) -> Result<T, LumenError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            let e = LumenError::from(e);
            self.fail(&e);
            e
        })
    }

    /// Drain the codec into the stream and close it.
    async fn finish<W: AsyncWrite + Unpin>(
        &self,
        wire: &mut WireSender<W>,
        meter: &mut ThroughputMeter,
    ) -> Result<(), LumenError> {
        let encoder = self.encoder.clone();
        match self.blocking(move || encoder.flush()).await? {
            Ok(packets) => {
                for packet in &packets {
                    if let Err(e) = self.send(wire, meter, packet).await {
                        debug!("flushed packets not delivered: {e}");
                        return Ok(());
                    }
                }
            }
            Err(e) => warn!("encoder flush failed: {e}"),
        }

        if let Err(e) = wire.close().await {
            debug!("closing stream: {e}");
        }
        Ok(())
    }

    fn fail(&self, e: &LumenError) {
        warn!("sending pipeline stopped: {e}");
        match e {
            LumenError::TransportClosed(_) => self.status.error(format!("connection lost: {e}")),
            _ => self.status.error(format!("sending stopped: {e}")),
        }
        self.cancel.cancel();
    }
}

async fn encode_worker<W>(mut wire: WireSender<W>, ctx: EncodeWorker) -> Result<(), LumenError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut meter = ThroughputMeter::new();
    let mut last_sequence: Option<u64> = None;

    loop {
        let Some(frame) = ctx.queue.try_pop() else {
            if ctx.cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        };

        // A gap means the queue dropped frames; restart prediction.
        if let Some(prev) = last_sequence {
            if frame.sequence > prev + 1 {
                ctx.encoder.request_keyframe();
                ctx.stats.keyframes_forced.fetch_add(1, Ordering::Relaxed);
                debug!(from = prev, to = frame.sequence, "sequence gap, forcing keyframe");
            }
        }
        last_sequence = Some(frame.sequence);

        let pts = frame.sequence as i64;
        let encoder = ctx.encoder.clone();
        let packets = match ctx.blocking(move || encoder.encode(&frame, pts)).await? {
            Ok(packets) => packets,
            Err(e) => {
                ctx.stats.encode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(pts, "encode failed: {e}");
                continue;
            }
        };
        ctx.stats.frames_encoded.fetch_add(1, Ordering::Relaxed);

        for packet in &packets {
            // A stop must not wait on a peer that stopped reading.
            let sent = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    debug!(pts = packet.pts, "stopped mid-send, dropping stream");
                    return Ok(());
                }
                sent = ctx.send(&mut wire, &mut meter, packet) => sent,
            };
            if let Err(e) = sent {
                ctx.fail(&e);
                return Err(e);
            }
        }
    }

    match tokio::time::timeout(FLUSH_GRACE, ctx.finish(&mut wire, &mut meter)).await {
        Ok(finished) => finished?,
        Err(_) => debug!(grace = ?FLUSH_GRACE, "peer not reading, stream dropped unflushed"),
    }
    debug!(packets = wire.packets_sent(), "encode worker finished");
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TestPattern;
    use crate::codec::{CodecKind, DecoderSession};
    use crate::wire::WireReceiver;

    fn fast_config() -> SenderConfig {
        SenderConfig {
            capture_interval: Duration::from_millis(5),
            ..SenderConfig::default()
        }
    }

    fn open_encoder(w: u32, h: u32) -> EncoderSession {
        EncoderSession::open(w, h, &EncoderSettings::default()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn streams_decodable_packets_in_order() {
        let (client, server) = tokio::io::duplex(1 << 20);
        let status = Arc::new(StatusBoard::new("idle"));
        let mut sender = ScreenSender::with_stream(
            fast_config(),
            || Ok(TestPattern::new(48, 32)),
            client,
            status.clone(),
        )
        .await
        .unwrap();
        assert_eq!(status.current().severity, Severity::Active);

        let mut rx = WireReceiver::new(server);
        assert_eq!(rx.read_header().await.unwrap(), Resolution::new(48, 32));

        let decoder = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(48, 32)).unwrap();
        let mut last: Option<u64> = None;
        for _ in 0..10 {
            let payload = tokio::time::timeout(Duration::from_secs(5), rx.next_packet())
                .await
                .expect("no packet within 5s")
                .unwrap()
                .expect("stream ended early");
            let frames = decoder.decode(&payload).unwrap();
            assert_eq!(frames.len(), 1);
            if let Some(prev) = last {
                assert!(frames[0].sequence > prev);
            }
            last = Some(frames[0].sequence);
        }

        sender.stop().await.unwrap();
        assert!(!sender.is_running());
        assert_eq!(status.current().text, "stopped");
        assert!(sender.stats().packets_sent >= 10);

        // Flushed tail, then a clean end of stream.
        while let Some(payload) = rx.next_packet().await.unwrap() {
            decoder.decode(&payload).unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn peer_gone_ends_pipeline() {
        let (client, server) = tokio::io::duplex(1 << 16);
        let mut sender = ScreenSender::with_stream(
            fast_config(),
            || Ok(TestPattern::new(16, 16)),
            client,
            Arc::new(StatusBoard::new("idle")),
        )
        .await
        .unwrap();

        drop(server);
        tokio::time::timeout(Duration::from_secs(5), sender.closed())
            .await
            .expect("pipeline did not notice the closed stream");

        assert!(matches!(sender.stop().await, Err(LumenError::TransportClosed(_))));
        assert_eq!(sender.status().current().severity, Severity::Error);
    }

    #[tokio::test]
    async fn unknown_codec_fails_to_start() {
        let config = SenderConfig {
            encoder: EncoderSettings {
                codec: "h264".into(),
                ..EncoderSettings::default()
            },
            port: 1,
            ..fast_config()
        };
        let status = Arc::new(StatusBoard::new("idle"));
        let res = ScreenSender::start_with_status(config, || Ok(TestPattern::new(16, 16)), status.clone()).await;
        assert!(matches!(res, Err(LumenError::CodecUnavailable(_))));
        assert_eq!(status.current().severity, Severity::Error);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_does_not_wait_on_stalled_peer() {
        let (client, _server) = tokio::io::duplex(64);
        let mut sender = ScreenSender::with_stream(
            fast_config(),
            || Ok(TestPattern::new(64, 64)),
            client,
            Arc::new(StatusBoard::new("idle")),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = std::time::Instant::now();
        sender.stop().await.unwrap();
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "stop took {:?}",
            started.elapsed()
        );
    }

    fn worker_context(queue: Arc<FrameQueue>, encoder: EncoderSession) -> EncodeWorker {
        EncodeWorker {
            queue,
            encoder,
            stats: Arc::new(SenderStats::default()),
            status: Arc::new(StatusBoard::new("idle")),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn sequence_gap_forces_keyframe() {
        let resolution = Resolution::new(32, 32);
        let (client, server) = tokio::io::duplex(1 << 20);
        let mut wire = WireSender::new(client);
        wire.send_header(resolution).await.unwrap();

        let queue = Arc::new(FrameQueue::new());
        let mut src = TestPattern::new(32, 32);
        for sequence in [0, 1, 5] {
            let mut frame = src.capture().unwrap();
            frame.sequence = sequence;
            queue.push(frame);
        }

        let ctx = worker_context(queue, open_encoder(32, 32));
        let stats = ctx.stats.clone();
        let cancel = ctx.cancel.clone();
        let worker = tokio::spawn(encode_worker(wire, ctx));

        let mut rx = WireReceiver::new(server);
        rx.read_header().await.unwrap();
        let mut packets = Vec::new();
        for _ in 0..3 {
            let payload = tokio::time::timeout(Duration::from_secs(5), rx.next_packet())
                .await
                .expect("no packet within 5s")
                .unwrap()
                .expect("stream ended early");
            packets.push(payload);
        }
        cancel.cancel();
        worker.await.unwrap().unwrap();

        assert_eq!(stats.keyframes_forced.load(Ordering::Relaxed), 1);

        // A decoder joining mid-stream needs an intra frame to start.
        let late = DecoderSession::open(CodecKind::PlanarZstd, resolution).unwrap();
        assert!(late.decode(&packets[1]).is_err());
        let frames = late.decode(&packets[2]).unwrap();
        assert_eq!(frames[0].sequence, 5);
    }

    #[tokio::test]
    async fn skipped_packet_forces_keyframe() {
        let (client, _server) = tokio::io::duplex(1 << 16);
        let mut wire = WireSender::new(client);
        wire.send_header(Resolution::new(16, 16)).await.unwrap();
        let ctx = worker_context(Arc::new(FrameQueue::new()), open_encoder(16, 16));
        let mut meter = ThroughputMeter::new();

        let mut src = TestPattern::new(16, 16);
        assert!(ctx.encoder.encode(&src.capture().unwrap(), 0).unwrap()[0].keyframe);
        let oversized = EncodedPacket {
            data: bytes::Bytes::from(vec![0u8; crate::wire::MAX_PAYLOAD_SIZE + 1]),
            pts: 1,
            keyframe: false,
        };
        ctx.send(&mut wire, &mut meter, &oversized).await.unwrap();
        assert_eq!(ctx.stats.keyframes_forced.load(Ordering::Relaxed), 1);
        assert_eq!(ctx.stats.packets_sent.load(Ordering::Relaxed), 0);

        let packets = ctx.encoder.encode(&src.capture().unwrap(), 2).unwrap();
        assert!(packets[0].keyframe);
    }

    #[tokio::test]
    async fn panicked_codec_call_stops_pipeline() {
        let ctx = worker_context(Arc::new(FrameQueue::new()), open_encoder(16, 16));
        let res = ctx.blocking(|| -> u32 { panic!("codec blew up") }).await;

        assert!(matches!(res, Err(LumenError::Other(_))));
        assert!(ctx.cancel.is_cancelled());
        assert_eq!(ctx.status.current().severity, Severity::Error);
    }
}
