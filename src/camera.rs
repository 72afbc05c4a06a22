use crate::config::CameraConfig;
use crate::error::{FocuscamError, Result};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use tracing::debug;

#[cfg(all(feature = "camera", target_os = "linux"))]
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
#[cfg(all(feature = "camera", target_os = "linux"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(feature = "camera", target_os = "linux"))]
use std::sync::Arc;
#[cfg(all(feature = "camera", target_os = "linux"))]
use std::time::{Duration, SystemTime};
#[cfg(all(feature = "camera", target_os = "linux"))]
use tracing::{error, info, trace, warn};

#[cfg(all(feature = "camera", target_os = "linux"))]
use v4l::buffer::Type;
#[cfg(all(feature = "camera", target_os = "linux"))]
use v4l::io::mmap::Stream;
#[cfg(all(feature = "camera", target_os = "linux"))]
use v4l::io::traits::CaptureStream;
#[cfg(all(feature = "camera", target_os = "linux"))]
use v4l::prelude::*;

/// Exclusive handle on a camera-like device.
///
/// `open` claims the device, `read_frame` blocks until the next frame (or a
/// bounded internal timeout) and `release` gives the device back. A source
/// assumes a single reader; callers serialize open/release against
/// concurrent start/stop externally.
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self) -> Result<()>;

    /// Next frame from the device, or `None` when no frame arrived in time
    /// or the source is not open.
    async fn read_frame(&mut self) -> Option<FrameData>;

    async fn release(&mut self);
}

/// Build the platform default source for a camera config: V4L2 when
/// compiled in, the synthetic generator otherwise.
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn default_source(config: &CameraConfig) -> Box<dyn FrameSource> {
    Box::new(CameraSource::new(config.clone()))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn default_source(config: &CameraConfig) -> Box<dyn FrameSource> {
    debug!("camera feature disabled or unsupported platform, using synthetic source");
    Box::new(SyntheticSource::new(config))
}

/// V4L2-backed camera source.
///
/// `open` configures the device and hands it to a dedicated capture worker
/// thread that owns the memory-mapped stream; frames cross to `read_frame`
/// over a small bounded channel that drops on overflow, matching the
/// freshness-first policy of the frame buffer downstream.
#[cfg(all(feature = "camera", target_os = "linux"))]
pub struct CameraSource {
    config: CameraConfig,
    frames: Option<Receiver<FrameData>>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

#[cfg(all(feature = "camera", target_os = "linux"))]
impl CameraSource {
    const CHANNEL_CAPACITY: usize = 4;
    const READ_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frames: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn parse_format(format: &str) -> Result<v4l::FourCC> {
        match format.to_uppercase().as_str() {
            "MJPG" | "MJPEG" => Ok(v4l::FourCC::new(b"MJPG")),
            "YUYV" => Ok(v4l::FourCC::new(b"YUYV")),
            "RGB24" => Ok(v4l::FourCC::new(b"RGB3")),
            _ => Err(FocuscamError::system(format!(
                "Unsupported camera format: {}",
                format
            ))),
        }
    }

    fn fourcc_to_frame_format(fourcc: v4l::FourCC) -> FrameFormat {
        match fourcc.str() {
            Ok("MJPG") => FrameFormat::Mjpeg,
            Ok("YUYV") => FrameFormat::Yuyv,
            Ok("RGB3") => FrameFormat::Rgb24,
            _ => {
                warn!("Unknown FourCC format: {:?}, defaulting to MJPEG", fourcc);
                FrameFormat::Mjpeg
            }
        }
    }

    fn configure_device(&self) -> Result<(Device, u32, u32, FrameFormat)> {
        let index = self.config.index;
        let device_path = format!("/dev/video{}", index);
        debug!("Opening V4L2 device: {}", device_path);

        let device = Device::new(index as usize)
            .map_err(|e| FocuscamError::camera(index, e.to_string()))?;

        let mut fmt = device
            .format()
            .map_err(|e| FocuscamError::camera(index, format!("Failed to get format: {}", e)))?;

        fmt.width = self.config.resolution.0;
        fmt.height = self.config.resolution.1;
        fmt.fourcc = Self::parse_format(&self.config.format)?;

        device
            .set_format(&fmt)
            .map_err(|e| FocuscamError::camera(index, format!("Failed to set format: {}", e)))?;

        let actual_fmt = device
            .format()
            .map_err(|e| FocuscamError::camera(index, format!("Failed to verify format: {}", e)))?;

        if actual_fmt.width != self.config.resolution.0
            || actual_fmt.height != self.config.resolution.1
        {
            warn!(
                "Camera resolution adjusted by driver: requested {}x{}, got {}x{}",
                self.config.resolution.0,
                self.config.resolution.1,
                actual_fmt.width,
                actual_fmt.height
            );
        }

        let mut params = device
            .params()
            .map_err(|e| FocuscamError::camera(index, format!("Failed to get params: {}", e)))?;

        params.interval = v4l::Fraction::new(1, self.config.fps);

        device.set_params(&params).map_err(|e| {
            FocuscamError::camera(index, format!("Failed to set frame rate: {}", e))
        })?;

        info!(
            "Camera configured: {}x{} @ {}fps, format: {:?}",
            actual_fmt.width, actual_fmt.height, self.config.fps, actual_fmt.fourcc
        );

        let frame_format = Self::fourcc_to_frame_format(actual_fmt.fourcc);
        Ok((device, actual_fmt.width, actual_fmt.height, frame_format))
    }

    fn capture_worker(
        device: Device,
        tx: Sender<FrameData>,
        stop: Arc<AtomicBool>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) {
        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: Duration = Duration::from_secs(1);

        let mut frame_counter: u64 = 0;
        let mut retry = 0;

        'outer: while !stop.load(Ordering::Relaxed) && retry < MAX_RETRIES {
            let mut stream = match Stream::with_buffers(&device, Type::VideoCapture, 4) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to create capture stream: {}", e);
                    retry += 1;
                    std::thread::sleep(RETRY_DELAY * retry);
                    continue;
                }
            };

            loop {
                if stop.load(Ordering::Relaxed) {
                    break 'outer;
                }

                match stream.next() {
                    Ok((buffer, _meta)) => {
                        retry = 0;
                        let frame = FrameData::new(
                            frame_counter,
                            SystemTime::now(),
                            buffer.to_vec(),
                            width,
                            height,
                            format,
                        );
                        frame_counter += 1;

                        match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                trace!("Capture channel full, dropping frame");
                            }
                            Err(TrySendError::Disconnected(_)) => break 'outer,
                        }
                    }
                    Err(e) => {
                        error!("Frame capture error: {}", e);
                        retry += 1;
                        std::thread::sleep(RETRY_DELAY * retry);
                        continue 'outer;
                    }
                }
            }
        }

        debug!("Camera capture worker exited");
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
#[async_trait]
impl FrameSource for CameraSource {
    async fn open(&mut self) -> Result<()> {
        if self.frames.is_some() {
            debug!("Camera device {} already open", self.config.index);
            return Ok(());
        }

        let (device, width, height, format) = self.configure_device()?;

        let (tx, rx) = bounded(Self::CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let worker = std::thread::spawn(move || {
            Self::capture_worker(device, tx, worker_stop, width, height, format);
        });

        self.frames = Some(rx);
        self.stop = stop;
        self.worker = Some(worker);
        Ok(())
    }

    async fn read_frame(&mut self) -> Option<FrameData> {
        let rx = self.frames.as_ref()?;
        rx.recv_timeout(Self::READ_TIMEOUT).ok()
    }

    async fn release(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.frames = None;

        // The worker finishes its current blocking read before it can
        // observe the stop flag.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        info!("Camera device {} released", self.config.index);
    }
}

/// Frame source that generates pattern frames at the configured rate.
///
/// Substitutes for real hardware in tests, demos, and on platforms without
/// V4L2 support.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: u32,
    frame_counter: u64,
    opened: bool,
}

impl SyntheticSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self::with_rate(config.resolution.0, config.resolution.1, config.fps)
    }

    pub fn with_rate(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            frame_counter: 0,
            opened: false,
        }
    }

    fn generate_frame(&mut self) -> FrameData {
        let id = self.frame_counter;
        self.frame_counter += 1;

        // Solid color pattern that varies with the frame id
        let frame_size = (self.width * self.height * 3) as usize;
        let mut data = vec![0u8; frame_size];
        let color = ((id % 256) as u8, 128u8, (255 - id % 256) as u8);
        for chunk in data.chunks_mut(3) {
            chunk[0] = color.0;
            chunk[1] = color.1;
            chunk[2] = color.2;
        }

        FrameData::new(
            id,
            std::time::SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Rgb24,
        )
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn open(&mut self) -> Result<()> {
        self.opened = true;
        debug!(
            "Synthetic source opened ({}x{} @ {}fps)",
            self.width, self.height, self.fps
        );
        Ok(())
    }

    async fn read_frame(&mut self) -> Option<FrameData> {
        if !self.opened {
            return None;
        }

        let interval = std::time::Duration::from_millis(1000 / u64::from(self.fps));
        tokio::time::sleep(interval).await;
        Some(self.generate_frame())
    }

    async fn release(&mut self) {
        self.opened = false;
        debug!("Synthetic source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_source_requires_open() {
        let mut source = SyntheticSource::with_rate(8, 8, 100);
        assert!(source.read_frame().await.is_none());

        source.open().await.unwrap();
        let frame = source.read_frame().await.unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 8);
        assert_eq!(frame.format, FrameFormat::Rgb24);
        assert!(frame.validate_size());

        source.release().await;
        assert!(source.read_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_synthetic_source_ids_increase() {
        let mut source = SyntheticSource::with_rate(8, 8, 200);
        source.open().await.unwrap();

        let first = source.read_frame().await.unwrap();
        let second = source.read_frame().await.unwrap();
        assert!(second.id > first.id);
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    #[test]
    fn test_format_parsing() {
        assert!(CameraSource::parse_format("MJPG").is_ok());
        assert!(CameraSource::parse_format("mjpg").is_ok());
        assert!(CameraSource::parse_format("YUYV").is_ok());
        assert!(CameraSource::parse_format("RGB24").is_ok());
        assert!(CameraSource::parse_format("INVALID").is_err());
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(
            CameraSource::fourcc_to_frame_format(v4l::FourCC::new(b"MJPG")),
            FrameFormat::Mjpeg
        );
        assert_eq!(
            CameraSource::fourcc_to_frame_format(v4l::FourCC::new(b"YUYV")),
            FrameFormat::Yuyv
        );
    }
}
