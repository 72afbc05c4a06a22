use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:2 format - uncompressed YUV data
    Yuyv,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 => 3,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true, // Compressed formats have variable size
        }
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Check if frame is older than specified duration
    pub fn is_older_than(&self, duration: std::time::Duration) -> bool {
        SystemTime::now()
            .duration_since(self.timestamp)
            .map(|age| age > duration)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Yuyv.bytes_per_pixel(), 2);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);

        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Yuyv.is_compressed());
        assert!(!FrameFormat::Rgb24.is_compressed());
    }

    #[test]
    fn test_frame_data_creation() {
        let data = vec![0u8; 640 * 480 * 3];
        let frame = FrameData::new(1, SystemTime::now(), data, 640, 480, FrameFormat::Rgb24);

        assert_eq!(frame.id, 1);
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert_eq!(frame.format, FrameFormat::Rgb24);
        assert!(frame.validate_size());
    }

    #[test]
    fn test_frame_size_validation() {
        // Valid YUYV frame
        let valid_frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![0u8; 640 * 480 * 2],
            640,
            480,
            FrameFormat::Yuyv,
        );
        assert!(valid_frame.validate_size());

        // Invalid YUYV frame (wrong size)
        let invalid_frame = FrameData::new(
            2,
            SystemTime::now(),
            vec![0u8; 100],
            640,
            480,
            FrameFormat::Yuyv,
        );
        assert!(!invalid_frame.validate_size());

        // MJPEG frame (compressed, always valid)
        let mjpeg_frame = FrameData::new(
            3,
            SystemTime::now(),
            vec![0u8; 5000],
            640,
            480,
            FrameFormat::Mjpeg,
        );
        assert!(mjpeg_frame.validate_size());
    }

    #[test]
    fn test_frame_age() {
        let past_time = SystemTime::now() - Duration::from_millis(100);
        let frame = FrameData::new(1, past_time, vec![0u8; 100], 640, 480, FrameFormat::Mjpeg);

        assert!(frame.is_older_than(Duration::from_millis(50)));
        assert!(!frame.is_older_than(Duration::from_millis(200)));
    }
}
