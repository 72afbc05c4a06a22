use crate::error::Result;
use crate::frame::FrameData;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Instant;

/// Result of running person detection on a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub present: bool,
    pub confidence: f32,
}

impl Detection {
    pub fn new(present: bool, confidence: f32) -> Self {
        Self {
            present,
            confidence,
        }
    }
}

/// External capability boundary for person detection.
///
/// The engine treats the detector as opaque: given a frame, report whether a
/// person is present and with what confidence. Implementations must not
/// block indefinitely; an error aborts the calling session's processing
/// loop without affecting its capture loop or any other session.
#[async_trait]
pub trait PersonDetector: Send + Sync {
    async fn detect(&self, frame: &FrameData) -> Result<Detection>;
}

/// Detector that reports a fixed result for every frame.
///
/// Stands in for the real model when none is wired up, and pins sessions to
/// a known presence state in tests.
pub struct StaticDetector {
    result: Detection,
}

impl StaticDetector {
    pub fn new(present: bool, confidence: f32) -> Self {
        Self {
            result: Detection::new(present, confidence),
        }
    }

    pub fn present() -> Self {
        Self::new(true, 1.0)
    }

    pub fn absent() -> Self {
        Self::new(false, 1.0)
    }
}

#[async_trait]
impl PersonDetector for StaticDetector {
    async fn detect(&self, _frame: &FrameData) -> Result<Detection> {
        Ok(self.result)
    }
}

/// Detector that replays a scripted presence sequence, one value per frame,
/// then keeps reporting the last value.
pub struct SequenceDetector {
    script: Mutex<ScriptState>,
}

struct ScriptState {
    pending: VecDeque<bool>,
    last: Option<bool>,
}

impl SequenceDetector {
    pub fn new<I: IntoIterator<Item = bool>>(script: I) -> Self {
        Self {
            script: Mutex::new(ScriptState {
                pending: script.into_iter().collect(),
                last: None,
            }),
        }
    }

    /// Number of scripted observations not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().pending.len()
    }
}

#[async_trait]
impl PersonDetector for SequenceDetector {
    async fn detect(&self, _frame: &FrameData) -> Result<Detection> {
        let mut state = self.script.lock();
        let present = match state.pending.pop_front() {
            Some(value) => {
                state.last = Some(value);
                value
            }
            None => state.last.unwrap_or(false),
        };
        Ok(Detection::new(present, 1.0))
    }
}

/// Detector that flips between present and absent every `period`.
///
/// Useful for demo runs without a real model: the session produces
/// alternating focus and leave blocks at a predictable cadence.
pub struct AlternatingDetector {
    period: std::time::Duration,
    origin: Instant,
}

impl AlternatingDetector {
    pub fn new(period: std::time::Duration) -> Self {
        Self {
            period,
            origin: Instant::now(),
        }
    }
}

#[async_trait]
impl PersonDetector for AlternatingDetector {
    async fn detect(&self, _frame: &FrameData) -> Result<Detection> {
        let windows = self.origin.elapsed().as_secs_f64() / self.period.as_secs_f64();
        let present = (windows as u64) % 2 == 0;
        Ok(Detection::new(present, 1.0))
    }
}

/// Detector that fails on every frame; exercises the processing loop's
/// abort-on-detection-error policy.
pub struct FailingDetector;

#[async_trait]
impl PersonDetector for FailingDetector {
    async fn detect(&self, _frame: &FrameData) -> Result<Detection> {
        Err(crate::error::FocuscamError::detection(
            "detector backend unavailable",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use std::time::SystemTime;

    fn test_frame() -> FrameData {
        FrameData::new(
            0,
            SystemTime::now(),
            vec![0u8; 64],
            8,
            8,
            FrameFormat::Mjpeg,
        )
    }

    #[tokio::test]
    async fn test_static_detector() {
        let frame = test_frame();

        let detector = StaticDetector::present();
        let detection = detector.detect(&frame).await.unwrap();
        assert!(detection.present);

        let detector = StaticDetector::absent();
        assert!(!detector.detect(&frame).await.unwrap().present);
    }

    #[tokio::test]
    async fn test_sequence_detector_replays_then_holds_last() {
        let frame = test_frame();
        let detector = SequenceDetector::new([true, false, true]);

        assert!(detector.detect(&frame).await.unwrap().present);
        assert!(!detector.detect(&frame).await.unwrap().present);
        assert!(detector.detect(&frame).await.unwrap().present);
        assert_eq!(detector.remaining(), 0);

        // Script exhausted: last value repeats
        assert!(detector.detect(&frame).await.unwrap().present);
        assert!(detector.detect(&frame).await.unwrap().present);
    }

    #[tokio::test]
    async fn test_empty_sequence_reports_absent() {
        let detector = SequenceDetector::new([]);
        let detection = detector.detect(&test_frame()).await.unwrap();
        assert!(!detection.present);
    }

    #[tokio::test]
    async fn test_failing_detector_errors() {
        let detector = FailingDetector;
        assert!(detector.detect(&test_frame()).await.is_err());
    }
}
