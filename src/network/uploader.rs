//! Per-channel upstream uploader
//!
//! Reads the encoder's output in chunks and forwards each chunk to the
//! ingest server while a session is up. Nothing is buffered across an
//! outage: chunks read while disconnected are counted and discarded, and
//! reconnects are rate-limited by a fixed cooldown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connector::Connector;
use crate::config::IngestConfig;
use crate::constants::{CHUNK_SIZE, DEFAULT_SEND_TIMEOUT, POLL_INTERVAL, RECONNECT_COOLDOWN};
use crate::error::{EncoderError, UploadError};

/// Connection state of one channel
#[derive(Debug)]
pub enum SessionState<S> {
    Disconnected,
    Connecting,
    Connected(S),
}

/// Exclusively owned by one uploader
#[derive(Debug)]
pub struct UploadSession<S> {
    state: SessionState<S>,
    last_attempt: Option<Instant>,
}

impl<S> Default for UploadSession<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> UploadSession<S> {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            last_attempt: None,
        }
    }

    pub fn state(&self) -> &SessionState<S> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected(_))
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Disconnected, and the previous attempt is at least `cooldown` old
    pub fn may_attempt(&self, now: Instant, cooldown: Duration) -> bool {
        matches!(self.state, SessionState::Disconnected)
            && self
                .last_attempt
                .map_or(true, |last| now.saturating_duration_since(last) >= cooldown)
    }

    pub fn begin_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
        self.state = SessionState::Connecting;
    }

    pub fn connected(&mut self, conn: S) {
        self.state = SessionState::Connected(conn);
    }

    pub fn failed(&mut self) {
        self.state = SessionState::Disconnected;
    }

    pub fn connection_mut(&mut self) -> Option<&mut S> {
        match &mut self.state {
            SessionState::Connected(conn) => Some(conn),
            _ => None,
        }
    }

    /// Back to Disconnected, handing out the connection if there was one
    pub fn drop_connection(&mut self) -> Option<S> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Connected(conn) => Some(conn),
            _ => None,
        }
    }
}

/// Uploader timing and sizing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadSettings {
    pub chunk_size: usize,
    pub poll_interval: Duration,
    pub cooldown: Duration,
    /// Bound on connect+handshake and on each send; `None` waits forever
    pub send_timeout: Option<Duration>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            poll_interval: POLL_INTERVAL,
            cooldown: RECONNECT_COOLDOWN,
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }
}

impl From<&IngestConfig> for UploadSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            poll_interval: config.poll_interval(),
            cooldown: config.reconnect_cooldown(),
            send_timeout: config.send_timeout(),
        }
    }
}

/// Upload counters, written by the uploader only
#[derive(Debug, Default)]
pub struct UploadStats {
    pub bytes_sent: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub connect_attempts: AtomicU64,
    pub connects: AtomicU64,
    pub failures: AtomicU64,
}

impl UploadStats {
    pub fn snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`UploadStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSnapshot {
    pub bytes_sent: u64,
    pub chunks_sent: u64,
    pub chunks_dropped: u64,
    pub connect_attempts: u64,
    pub connects: u64,
    pub failures: u64,
}

pub struct Uploader<C: Connector> {
    label: String,
    connector: C,
    session: UploadSession<C::Conn>,
    settings: UploadSettings,
    stats: Arc<UploadStats>,
    cancel: CancellationToken,
}

impl<C: Connector> Uploader<C> {
    pub fn new(
        label: impl Into<String>,
        connector: C,
        settings: UploadSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: label.into(),
            connector,
            session: UploadSession::new(),
            settings,
            stats: Arc::new(UploadStats::default()),
            cancel,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn session(&self) -> &UploadSession<C::Conn> {
        &self.session
    }

    pub fn stats(&self) -> Arc<UploadStats> {
        self.stats.clone()
    }

    /// Pump `reader` until it ends or the uploader is cancelled.
    ///
    /// Upload failures never leave this loop. The only errors returned are
    /// about the encoder stream itself; the session is kept so a new stream
    /// can be pumped through the same connection.
    pub async fn run<R>(&mut self, reader: &mut R) -> Result<(), EncoderError>
    where
        R: AsyncRead + Unpin + Send,
    {
        loop {
            if self.cancel.is_cancelled() {
                self.close().await;
                return Ok(());
            }

            let mut buf = BytesMut::zeroed(self.settings.chunk_size);
            let read = tokio::select! {
                _ = self.cancel.cancelled() => None,
                read = timeout(self.settings.poll_interval, reader.read(&mut buf)) => Some(read),
            };
            let Some(read) = read else {
                self.close().await;
                return Ok(());
            };

            match read {
                Err(_) => {
                    trace!("[{}] poll timeout", self.label);
                }
                Ok(Ok(0)) => return Err(EncoderError::StreamEnded),
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    self.step(buf.freeze(), Instant::now()).await;
                }
                Ok(Err(e)) => return Err(EncoderError::Read(e)),
            }
        }
    }

    /// One loop iteration for a chunk read at `now`: reconnect if allowed,
    /// then send or discard.
    pub async fn step(&mut self, chunk: Bytes, now: Instant) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.session.may_attempt(now, self.settings.cooldown) {
            self.connect(now).await;
        }
        if self.cancel.is_cancelled() {
            return;
        }

        let Some(conn) = self.session.connection_mut() else {
            self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let sent = tokio::select! {
            _ = self.cancel.cancelled() => None,
            sent = send_chunk(conn, &chunk, self.settings.send_timeout) => Some(sent),
        };
        let Some(sent) = sent else {
            // A half-written chunk leaves the stream unusable
            self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            self.session.drop_connection();
            debug!("[{}] send abandoned on shutdown", self.label);
            return;
        };

        match sent {
            Ok(()) => {
                self.stats.chunks_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("[{}] upload failed: {}", self.label, e);
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                self.session.drop_connection();
            }
        }
    }

    async fn connect(&mut self, now: Instant) {
        self.session.begin_attempt(now);
        self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        info!("[{}] connecting to {}", self.label, self.connector.target());

        let connector = &self.connector;
        let limit = self.settings.send_timeout;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = async move {
                match limit {
                    Some(limit) => timeout(limit, connector.connect())
                        .await
                        .unwrap_or(Err(UploadError::Timeout("connect"))),
                    None => connector.connect().await,
                }
            } => Some(result),
        };
        let Some(result) = result else {
            debug!("[{}] connect abandoned on shutdown", self.label);
            self.session.failed();
            return;
        };

        match result {
            Ok(conn) => {
                info!("[{}] connected", self.label);
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                self.session.connected(conn);
            }
            Err(e) => {
                warn!("[{}] connect failed: {}", self.label, e);
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.session.failed();
            }
        }
    }

    /// Shut the connection down, if any
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.session.drop_connection() {
            if let Err(e) = conn.shutdown().await {
                debug!("[{}] shutdown: {}", self.label, e);
            }
            info!("[{}] disconnected", self.label);
        }
    }
}

async fn send_chunk<W>(conn: &mut W, chunk: &[u8], limit: Option<Duration>) -> Result<(), UploadError>
where
    W: AsyncWrite + Unpin,
{
    match limit {
        Some(limit) => match timeout(limit, conn.write_all(chunk)).await {
            Ok(result) => result.map_err(UploadError::from),
            Err(_) => Err(UploadError::Timeout("send")),
        },
        None => conn.write_all(chunk).await.map_err(UploadError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// Records every write call; can be switched to failing
    #[derive(Clone, Default)]
    struct Recorder {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<AtomicBool>,
        shut_down: Arc<AtomicBool>,
    }

    impl AsyncWrite for Recorder {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail.load(Ordering::SeqCst) {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            self.writes.lock().unwrap().push(buf.to_vec());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shut_down.store(true, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    /// Never accepts a byte
    struct Stalled;

    impl AsyncWrite for Stalled {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct MockConnector {
        recorder: Recorder,
        refuse: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new() -> Self {
            Self {
                recorder: Recorder::default(),
                refuse: Arc::new(AtomicBool::new(false)),
                attempts: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn refusing() -> Self {
            let connector = Self::new();
            connector.refuse.store(true, Ordering::SeqCst);
            connector
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Conn = Recorder;

        async fn connect(&self) -> Result<Recorder, UploadError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                Err(crate::error::HandshakeFailure::NoResponse.into())
            } else {
                Ok(self.recorder.clone())
            }
        }

        fn target(&self) -> String {
            "mock".into()
        }
    }

    struct StalledConnector;

    #[async_trait]
    impl Connector for StalledConnector {
        type Conn = Stalled;

        async fn connect(&self) -> Result<Stalled, UploadError> {
            Ok(Stalled)
        }

        fn target(&self) -> String {
            "stalled".into()
        }
    }

    /// Connect never completes
    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        type Conn = Recorder;

        async fn connect(&self) -> Result<Recorder, UploadError> {
            std::future::pending().await
        }

        fn target(&self) -> String {
            "hanging".into()
        }
    }

    fn unbounded() -> UploadSettings {
        UploadSettings {
            send_timeout: None,
            ..UploadSettings::default()
        }
    }

    fn uploader<C: Connector>(connector: C) -> Uploader<C> {
        Uploader::new("TEST", connector, UploadSettings::default(), CancellationToken::new())
    }

    fn chunk(n: usize) -> Bytes {
        Bytes::from(vec![0xAB; n])
    }

    #[tokio::test]
    async fn test_first_chunk_connects_and_sends() {
        let connector = MockConnector::new();
        let writes = connector.recorder.writes.clone();
        let mut up = uploader(connector);

        up.step(chunk(10), Instant::now()).await;
        assert!(up.session().is_connected());
        assert_eq!(writes.lock().unwrap().len(), 1);
        assert_eq!(up.stats().snapshot().bytes_sent, 10);
    }

    #[tokio::test]
    async fn test_cooldown_after_failed_attempt() {
        let connector = MockConnector::refusing();
        let attempts = connector.attempts.clone();
        let mut up = uploader(connector);
        let t0 = Instant::now();

        up.step(chunk(1), t0).await;
        up.step(chunk(1), t0 + Duration::from_millis(3_999)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        up.step(chunk(1), t0 + Duration::from_secs(4)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let stats = up.stats().snapshot();
        assert_eq!(stats.chunks_dropped, 3);
        assert_eq!(stats.failures, 2);
    }

    #[tokio::test]
    async fn test_send_failure_disconnects_and_waits() {
        let connector = MockConnector::new();
        let recorder = connector.recorder.clone();
        let attempts = connector.attempts.clone();
        let mut up = uploader(connector);
        let t0 = Instant::now();

        up.step(chunk(4), t0).await;
        recorder.fail.store(true, Ordering::SeqCst);
        up.step(chunk(4), t0 + Duration::from_secs(1)).await;
        assert!(!up.session().is_connected());

        // Heals, but the cooldown from the first attempt still applies
        recorder.fail.store(false, Ordering::SeqCst);
        up.step(chunk(4), t0 + Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.writes.lock().unwrap().len(), 1);

        up.step(chunk(4), t0 + Duration::from_secs(4)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.writes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_sent_while_disconnected() {
        let connector = MockConnector::new();
        let recorder = connector.recorder.clone();
        let mut up = uploader(connector);
        let t0 = Instant::now();

        up.step(chunk(4), t0).await;
        recorder.fail.store(true, Ordering::SeqCst);
        up.step(chunk(4), t0).await;
        recorder.fail.store(false, Ordering::SeqCst);
        for i in 1..4 {
            up.step(chunk(4), t0 + Duration::from_secs(i)).await;
        }

        // Only the chunk from the first session reached the socket
        assert_eq!(recorder.writes.lock().unwrap().as_slice(), &[vec![0xAB; 4]]);
    }

    #[tokio::test]
    async fn test_uploaders_are_isolated() {
        let healthy = MockConnector::new();
        let writes = healthy.recorder.writes.clone();
        let mut a = uploader(healthy);
        let mut b = uploader(MockConnector::refusing());
        let t0 = Instant::now();

        for i in 0..10 {
            let now = t0 + Duration::from_secs(i);
            b.step(chunk(8), now).await;
            a.step(chunk(8), now).await;
        }

        assert!(a.session().is_connected());
        assert!(!b.session().is_connected());
        assert_eq!(writes.lock().unwrap().len(), 10);
        assert_eq!(a.stats().snapshot().failures, 0);
        assert_eq!(b.stats().snapshot().chunks_dropped, 10);
    }

    #[tokio::test]
    async fn test_full_chunk_is_one_send() {
        let connector = MockConnector::new();
        let writes = connector.recorder.writes.clone();
        let mut up = uploader(connector);

        let payload: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let (mut tx, mut rx) = tokio::io::duplex(8192);
        tx.write_all(&payload).await.unwrap();
        drop(tx);

        let result = up.run(&mut rx).await;
        assert!(matches!(result, Err(EncoderError::StreamEnded)));

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], payload);
        // The session outlives the encoder stream
        assert!(up.session().is_connected());
    }

    #[tokio::test]
    async fn test_cancel_closes_connection() {
        let connector = MockConnector::new();
        let recorder = connector.recorder.clone();
        let cancel = CancellationToken::new();
        let mut up = Uploader::new("TEST", connector, UploadSettings::default(), cancel.clone());

        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"abc").await.unwrap();

        let task = tokio::spawn(async move {
            let result = up.run(&mut rx).await;
            (result.is_ok(), up.session().is_connected())
        });
        while recorder.writes.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let (ok, connected) = task.await.unwrap();
        assert!(ok);
        assert!(!connected);
        assert!(recorder.shut_down.load(Ordering::SeqCst));
        drop(tx);
    }

    #[tokio::test]
    async fn test_no_connect_after_cancel() {
        let connector = MockConnector::new();
        let attempts = connector.attempts.clone();
        let cancel = CancellationToken::new();
        let mut up = Uploader::new("TEST", connector, UploadSettings::default(), cancel.clone());

        cancel.cancel();
        up.step(chunk(4), Instant::now()).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out() {
        let mut up = uploader(StalledConnector);
        up.step(chunk(4), Instant::now()).await;
        assert!(!up.session().is_connected());
        assert_eq!(up.stats().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_send() {
        let cancel = CancellationToken::new();
        let mut up = Uploader::new("TEST", StalledConnector, unbounded(), cancel.clone());
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(b"abc").await.unwrap();

        let task = tokio::spawn(async move {
            let result = up.run(&mut rx).await;
            (result.is_ok(), up.session().is_connected(), up.stats().snapshot())
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let (ok, connected, stats) = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("uploader kept waiting on the stalled send")
            .unwrap();
        assert!(ok);
        assert!(!connected);
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.chunks_sent, 0);
        assert_eq!(stats.chunks_dropped, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hanging_connect() {
        let cancel = CancellationToken::new();
        let mut up = Uploader::new("TEST", HangingConnector, unbounded(), cancel.clone());

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };
        tokio::time::timeout(Duration::from_secs(2), up.step(chunk(4), Instant::now()))
            .await
            .expect("uploader kept waiting on the connect");
        canceller.await.unwrap();

        assert!(matches!(up.session().state(), SessionState::Disconnected));
        let stats = up.stats().snapshot();
        assert_eq!(stats.connect_attempts, 1);
        assert_eq!(stats.connects, 0);
        assert_eq!(stats.chunks_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_keeps_waiting() {
        let mut up = uploader(MockConnector::new());
        let (tx, mut rx) = tokio::io::duplex(64);

        // Nothing arrives for several poll intervals, then the stream ends
        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tx);
        });
        let result = up.run(&mut rx).await;
        assert!(matches!(result, Err(EncoderError::StreamEnded)));
        assert_eq!(up.stats().snapshot().connect_attempts, 0);
        closer.await.unwrap();
    }

    proptest! {
        #[test]
        fn prop_attempts_respect_cooldown(gaps in prop::collection::vec(0u64..6_000, 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut up = uploader(MockConnector::refusing());
                let t0 = Instant::now();
                let mut now = t0;
                let mut attempt_times = Vec::new();

                for gap in gaps {
                    now += Duration::from_millis(gap);
                    let before = up.session().last_attempt();
                    up.step(chunk(1), now).await;
                    if up.session().last_attempt() != before {
                        attempt_times.push(now);
                    }
                }

                for pair in attempt_times.windows(2) {
                    prop_assert!(pair[1] - pair[0] >= RECONNECT_COOLDOWN);
                }
                Ok(())
            })?;
        }
    }
}
