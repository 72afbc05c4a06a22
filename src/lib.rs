pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod frame_buffer;
pub mod manager;
pub mod session;
pub mod timeline;

pub use camera::{default_source, FrameSource, SyntheticSource};
pub use config::{CameraConfig, DetectionConfig, FocuscamConfig, ProcessingConfig};
pub use detector::{
    AlternatingDetector, Detection, FailingDetector, PersonDetector, SequenceDetector,
    StaticDetector,
};
pub use error::{FocuscamError, Result};
pub use frame::{FrameData, FrameFormat};
pub use frame_buffer::{FrameBuffer, FrameBufferStatsSnapshot};
pub use manager::SessionManager;
pub use session::{CurrentBlock, MonitorSession, SessionStatus, SummaryStats};
pub use timeline::{BlockKind, OpenBlock, TimeBlock, TimeTracker};

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::CameraSource;
