use crate::camera::FrameSource;
use crate::config::ProcessingConfig;
use crate::detector::PersonDetector;
use crate::frame_buffer::FrameBuffer;
use crate::timeline::{BlockKind, TimeBlock, TimeTracker};
use chrono::{DateTime, Local};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Current state of a monitoring session, queryable at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub is_running: bool,
    pub is_initialized: bool,
    /// Last observed presence, absent until the first detection
    pub person_detected: Option<bool>,
    pub current_block: Option<CurrentBlock>,
    pub total_records: usize,
}

/// The block currently accumulating time, measured against wall-clock now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentBlock {
    pub kind: BlockKind,
    pub duration_minutes: f64,
    pub started_at: String,
}

/// Aggregated focus/leave totals over closed blocks plus the open block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_focus_minutes: f64,
    pub total_leave_minutes: f64,
    pub focus_blocks: usize,
    pub leave_blocks: usize,
}

struct TrackingState {
    tracker: TimeTracker,
    records: Vec<TimeBlock>,
}

/// One independently monitored camera with its own time-tracking state.
///
/// Owns a frame source, a drop-oldest frame buffer, and two loops: a
/// capture loop that drains the camera at full speed and a processing loop
/// paced to the configured detection rate. Closed blocks land in an
/// append-only log readable while detection continues, and are additionally
/// offered once through a single-consumer notification channel.
pub struct MonitorSession {
    id: String,
    config: ProcessingConfig,
    source: Arc<tokio::sync::Mutex<Box<dyn FrameSource>>>,
    detector: Arc<dyn PersonDetector>,
    buffer: Arc<FrameBuffer>,
    state: Arc<RwLock<TrackingState>>,
    record_tx: Sender<TimeBlock>,
    record_rx: Receiver<TimeBlock>,
    cancel: Mutex<CancellationToken>,
    running: AtomicBool,
    show_overlay: AtomicBool,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSession")
            .field("id", &self.id)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("show_overlay", &self.show_overlay.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MonitorSession {
    pub fn new(
        id: impl Into<String>,
        config: ProcessingConfig,
        source: Box<dyn FrameSource>,
        detector: Arc<dyn PersonDetector>,
    ) -> Self {
        let (record_tx, record_rx) = unbounded();

        Self {
            id: id.into(),
            buffer: Arc::new(FrameBuffer::new(config.frame_buffer_size)),
            config,
            source: Arc::new(tokio::sync::Mutex::new(source)),
            detector,
            state: Arc::new(RwLock::new(TrackingState {
                tracker: TimeTracker::new(),
                records: Vec::new(),
            })),
            record_tx,
            record_rx,
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            show_overlay: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_overlay_enabled(&self) -> bool {
        self.show_overlay.load(Ordering::Relaxed)
    }

    /// Start monitoring. No-op when already running.
    ///
    /// A frame source that fails to open leaves the session in a logged,
    /// non-running state rather than surfacing the error to the registry.
    pub async fn start(&self, show_overlay: bool) {
        if self.running.load(Ordering::Relaxed) {
            warn!(session = %self.id, "monitoring already running");
            return;
        }

        {
            let mut source = self.source.lock().await;
            if let Err(e) = source.open().await {
                error!(session = %self.id, "failed to open frame source: {}", e);
                return;
            }
        }

        self.show_overlay.store(show_overlay, Ordering::Relaxed);

        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();

        let capture = tokio::spawn(Self::capture_loop(
            self.id.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.buffer),
            token.clone(),
        ));

        let processing = tokio::spawn(Self::processing_loop(
            self.id.clone(),
            Arc::clone(&self.buffer),
            Arc::clone(&self.detector),
            Arc::clone(&self.state),
            self.record_tx.clone(),
            token,
            self.config.frame_interval(),
            self.config.pop_timeout(),
        ));

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(capture);
            tasks.push(processing);
        }

        self.running.store(true, Ordering::Relaxed);
        info!(session = %self.id, "monitoring started");
    }

    /// Stop monitoring: signal both loops, join them with a bounded
    /// timeout, finalize any open block, and release the camera. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!(session = %self.id, "stop requested but monitoring not running");
            return;
        }

        self.cancel.lock().cancel();

        let handles = {
            let mut tasks = self.tasks.lock().await;
            std::mem::take(&mut *tasks)
        };
        for mut handle in handles {
            if timeout(self.config.stop_timeout(), &mut handle).await.is_err() {
                warn!(session = %self.id, "loop did not stop within timeout, aborting");
                handle.abort();
            }
        }

        let closed = {
            let mut state = self.state.write();
            let closed = state.tracker.finalize(SystemTime::now());
            if let Some(block) = &closed {
                state.records.push(block.clone());
            }
            closed
        };
        if let Some(block) = closed {
            info!(session = %self.id, "final record: {}", block.format_human());
            let _ = self.record_tx.send(block);
        }

        // Camera is released even if a loop outlived its join timeout
        self.source.lock().await.release().await;

        info!(session = %self.id, "monitoring stopped");
    }

    /// Next unclaimed closed block, delivered at most once across all
    /// callers. Use [`all_records`](Self::all_records) for full history.
    pub fn latest_record(&self) -> Option<TimeBlock> {
        self.record_rx.try_recv().ok()
    }

    /// Snapshot of the closed-block log.
    pub fn all_records(&self) -> Vec<TimeBlock> {
        self.state.read().records.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.read();
        let now = SystemTime::now();

        SessionStatus {
            session_id: self.id.clone(),
            is_running: self.is_running(),
            is_initialized: state.tracker.is_initialized(),
            person_detected: state.tracker.previous_presence(),
            current_block: state.tracker.open_block().map(|open| {
                let started: DateTime<Local> = open.start.into();
                CurrentBlock {
                    kind: open.kind,
                    duration_minutes: open.elapsed(now).as_secs_f64() / 60.0,
                    started_at: started.format("%Y-%m-%d %H:%M:%S").to_string(),
                }
            }),
            total_records: state.records.len(),
        }
    }

    /// Totals over closed blocks plus the currently open block, using now
    /// as its virtual end.
    pub fn summary(&self) -> SummaryStats {
        let state = self.state.read();
        let now = SystemTime::now();

        let mut focus = Duration::ZERO;
        let mut leave = Duration::ZERO;
        let mut focus_blocks = 0;
        let mut leave_blocks = 0;

        for record in &state.records {
            match record.kind {
                BlockKind::Focus => {
                    focus += record.duration();
                    focus_blocks += 1;
                }
                BlockKind::Leave => {
                    leave += record.duration();
                    leave_blocks += 1;
                }
            }
        }

        if let Some(open) = state.tracker.open_block() {
            match open.kind {
                BlockKind::Focus => focus += open.elapsed(now),
                BlockKind::Leave => leave += open.elapsed(now),
            }
        }

        SummaryStats {
            total_focus_minutes: focus.as_secs_f64() / 60.0,
            total_leave_minutes: leave.as_secs_f64() / 60.0,
            focus_blocks,
            leave_blocks,
        }
    }

    /// Ratio of focus time to total tracked time, scaled to 0-5 and
    /// rounded to two decimals. 0.0 until the session initializes.
    pub fn focus_score(&self) -> f64 {
        let state = self.state.read();
        if !state.tracker.is_initialized() {
            return 0.0;
        }

        let now = SystemTime::now();
        let mut total = Duration::ZERO;
        let mut focus = Duration::ZERO;

        for record in &state.records {
            total += record.duration();
            if record.kind == BlockKind::Focus {
                focus += record.duration();
            }
        }

        if let Some(open) = state.tracker.open_block() {
            let elapsed = open.elapsed(now);
            total += elapsed;
            if open.kind == BlockKind::Focus {
                focus += elapsed;
            }
        }

        if total.is_zero() {
            return if state.tracker.previous_presence() == Some(true) {
                5.0
            } else {
                0.0
            };
        }

        let score = (focus.as_secs_f64() / total.as_secs_f64() * 5.0).clamp(0.0, 5.0);
        (score * 100.0).round() / 100.0
    }

    pub fn buffer_stats(&self) -> crate::frame_buffer::FrameBufferStatsSnapshot {
        self.buffer.stats()
    }

    /// Drains the frame source into the buffer until cancelled. Performs no
    /// processing, keeping device latency away from the pacing logic.
    async fn capture_loop(
        id: String,
        source: Arc<tokio::sync::Mutex<Box<dyn FrameSource>>>,
        buffer: Arc<FrameBuffer>,
        cancel: CancellationToken,
    ) {
        debug!(session = %id, "capture loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let frame = {
                let mut source = source.lock().await;
                source.read_frame().await
            };

            match frame {
                Some(frame) => buffer.push(frame),
                None => {
                    // No frame in time; back off briefly before retrying
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(Duration::from_millis(50)) => {}
                    }
                }
            }
        }

        debug!(session = %id, "capture loop stopped");
    }

    /// Pops frames at the target cadence, runs detection, and feeds the
    /// time tracker. A detector error aborts this loop only; the capture
    /// loop and other sessions are unaffected.
    #[allow(clippy::too_many_arguments)]
    async fn processing_loop(
        id: String,
        buffer: Arc<FrameBuffer>,
        detector: Arc<dyn PersonDetector>,
        state: Arc<RwLock<TrackingState>>,
        record_tx: Sender<TimeBlock>,
        cancel: CancellationToken,
        interval: Duration,
        pop_timeout: Duration,
    ) {
        debug!(session = %id, "processing loop started");
        let mut last_processed: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Some(last) = last_processed {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(interval - elapsed) => {}
                    }
                    continue;
                }
            }

            let Some(frame) = buffer.pop(pop_timeout).await else {
                continue;
            };

            let detection = match detector.detect(&frame).await {
                Ok(detection) => detection,
                Err(e) => {
                    error!(
                        session = %id,
                        "detection failed, aborting processing loop: {}", e
                    );
                    break;
                }
            };

            trace!(
                session = %id,
                "frame {} presence={} confidence={:.2}",
                frame.id,
                detection.present,
                detection.confidence
            );

            let closed = {
                let mut state = state.write();
                let closed = state.tracker.observe(detection.present, SystemTime::now());
                if let Some(block) = &closed {
                    state.records.push(block.clone());
                }
                closed
            };

            if let Some(block) = closed {
                info!(session = %id, "{}", block.format_human());
                let _ = record_tx.send(block);
            }

            last_processed = Some(Instant::now());
        }

        debug!(session = %id, "processing loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticSource;
    use crate::config::ProcessingConfig;
    use crate::detector::{FailingDetector, SequenceDetector, StaticDetector};
    use crate::error::{FocuscamError, Result};
    use crate::frame::FrameData;
    use async_trait::async_trait;

    fn test_config() -> ProcessingConfig {
        ProcessingConfig {
            target_fps: 100,
            frame_buffer_size: 2,
            pop_timeout_ms: 50,
            stop_timeout_secs: 2,
        }
    }

    fn test_source() -> Box<dyn FrameSource> {
        Box::new(SyntheticSource::with_rate(8, 8, 200))
    }

    struct FailingSource;

    #[async_trait]
    impl FrameSource for FailingSource {
        async fn open(&mut self) -> Result<()> {
            Err(FocuscamError::camera(9, "device busy"))
        }

        async fn read_frame(&mut self) -> Option<FrameData> {
            None
        }

        async fn release(&mut self) {}
    }

    async fn wait_until<F: Fn() -> bool>(deadline: Duration, check: F) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_session_records_transitions_and_finalizes_on_stop() {
        let detector = Arc::new(SequenceDetector::new([true, false, true]));
        let session = MonitorSession::new("test", test_config(), test_source(), detector);

        session.start(false).await;
        assert!(session.is_running());

        // Focus block closes on the false observation, leave block closes
        // on the return to presence
        assert!(
            wait_until(Duration::from_secs(2), || session.all_records().len() >= 2).await,
            "expected two closed blocks, got {:?}",
            session.all_records()
        );

        session.stop().await;
        assert!(!session.is_running());

        // Stop finalized the open focus block
        let records = session.all_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, BlockKind::Focus);
        assert_eq!(records[1].kind, BlockKind::Leave);
        assert_eq!(records[2].kind, BlockKind::Focus);

        // Contiguous, non-overlapping timeline
        for pair in records.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[tokio::test]
    async fn test_latest_record_is_delivered_once() {
        let detector = Arc::new(SequenceDetector::new([true, false]));
        let session = MonitorSession::new("one-shot", test_config(), test_source(), detector);

        session.start(false).await;

        assert!(
            wait_until(Duration::from_secs(2), || !session.all_records().is_empty()).await
        );

        let record = session.latest_record().expect("one closed block");
        assert_eq!(record.kind, BlockKind::Focus);

        // Channel drained; the same block is not delivered again
        assert!(session.latest_record().is_none());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_session_stays_uninitialized_without_presence() {
        let detector = Arc::new(StaticDetector::absent());
        let session = MonitorSession::new("idle", test_config(), test_source(), detector);

        session.start(false).await;
        sleep(Duration::from_millis(200)).await;
        session.stop().await;

        let status = session.status();
        assert!(!status.is_initialized);
        assert!(session.all_records().is_empty());
        assert_eq!(session.focus_score(), 0.0);
    }

    #[tokio::test]
    async fn test_status_reflects_open_block() {
        let detector = Arc::new(StaticDetector::present());
        let session = MonitorSession::new("status", test_config(), test_source(), detector);

        session.start(true).await;
        assert!(session.is_overlay_enabled());

        assert!(
            wait_until(Duration::from_secs(2), || session.status().is_initialized).await
        );

        let status = session.status();
        assert!(status.is_running);
        assert_eq!(status.person_detected, Some(true));
        let current = status.current_block.expect("focus block open");
        assert_eq!(current.kind, BlockKind::Focus);
        assert_eq!(status.total_records, 0);

        session.stop().await;

        // Stop converts the open block into the final record
        assert_eq!(session.all_records().len(), 1);
        assert!(session.status().current_block.is_none());
    }

    #[tokio::test]
    async fn test_summary_matches_records() {
        let detector = Arc::new(SequenceDetector::new([true, false, true, false]));
        let session = MonitorSession::new("summary", test_config(), test_source(), detector);

        session.start(false).await;
        assert!(
            wait_until(Duration::from_secs(2), || session.all_records().len() >= 3).await
        );
        session.stop().await;

        // After stop there is no open block: the summary must equal sums
        // recomputed over the record log
        let records = session.all_records();
        let summary = session.summary();

        let focus_minutes: f64 = records
            .iter()
            .filter(|r| r.kind == BlockKind::Focus)
            .map(|r| r.duration_minutes())
            .sum();
        let leave_minutes: f64 = records
            .iter()
            .filter(|r| r.kind == BlockKind::Leave)
            .map(|r| r.duration_minutes())
            .sum();

        assert!((summary.total_focus_minutes - focus_minutes).abs() < 1e-9);
        assert!((summary.total_leave_minutes - leave_minutes).abs() < 1e-9);
        assert_eq!(
            summary.focus_blocks,
            records.iter().filter(|r| r.kind == BlockKind::Focus).count()
        );
        assert_eq!(
            summary.leave_blocks,
            records.iter().filter(|r| r.kind == BlockKind::Leave).count()
        );
    }

    #[tokio::test]
    async fn test_focus_score_bounds() {
        let detector = Arc::new(StaticDetector::present());
        let session = MonitorSession::new("score", test_config(), test_source(), detector);

        assert_eq!(session.focus_score(), 0.0);

        session.start(false).await;
        assert!(
            wait_until(Duration::from_secs(2), || session.status().is_initialized).await
        );
        sleep(Duration::from_millis(100)).await;

        // All tracked time is focus time
        let score = session.focus_score();
        assert!((0.0..=5.0).contains(&score));
        assert!(score > 4.9);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_failed_camera_open_leaves_session_not_running() {
        let detector = Arc::new(StaticDetector::present());
        let session = MonitorSession::new(
            "no-camera",
            test_config(),
            Box::new(FailingSource),
            detector,
        );

        session.start(false).await;
        assert!(!session.is_running());
        assert!(session.all_records().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let detector = Arc::new(StaticDetector::present());
        let session = MonitorSession::new("stop-twice", test_config(), test_source(), detector);

        session.start(false).await;
        assert!(
            wait_until(Duration::from_secs(2), || session.status().is_initialized).await
        );

        session.stop().await;
        let records_after_first_stop = session.all_records().len();

        session.stop().await;
        assert_eq!(session.all_records().len(), records_after_first_stop);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_start_is_noop_when_running() {
        let detector = Arc::new(StaticDetector::present());
        let session = MonitorSession::new("start-twice", test_config(), test_source(), detector);

        session.start(false).await;
        session.start(false).await;
        assert!(session.is_running());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_detection_error_aborts_processing_but_session_stays_running() {
        let session = MonitorSession::new(
            "failing-detector",
            test_config(),
            test_source(),
            Arc::new(FailingDetector),
        );

        session.start(false).await;
        sleep(Duration::from_millis(200)).await;

        // The processing loop died on the first detection error, but the
        // session is still marked running and must still stop cleanly
        assert!(session.is_running());
        assert!(session.all_records().is_empty());

        session.stop().await;
        assert!(!session.is_running());
    }
}
