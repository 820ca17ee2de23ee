use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use session_zero_core::error::DeviceError;
use session_zero_core::recorder::{AudioCapture, CaptureStream};
use session_zero_native_utils::audio::{self, PcmFramer};
use session_zero_native_utils::device;
use tokio::sync::{mpsc, oneshot};

/// Samples per frame sent to the recognizer (256 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 4096;

/// Microphone capture through cpal.
///
/// A cpal stream cannot leave the thread that built it, so every capture gets
/// its own thread that holds the stream until the `CaptureStream` is dropped.
pub struct CpalCapture;

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn open(&self, device: Option<&str>) -> Result<CaptureStream, DeviceError> {
        let device = device.map(str::to_string);
        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (release_tx, release_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture(device, frames_tx, release_rx, ready_tx))
            .map_err(|e| DeviceError::Denied(e.to_string()))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureStream::new(frames_rx, release_tx)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Denied(
                "capture thread exited before the stream started".to_string(),
            )),
        }
    }
}

fn run_capture(
    device: Option<String>,
    frames_tx: mpsc::Sender<Vec<i16>>,
    release_rx: oneshot::Receiver<()>,
    ready_tx: oneshot::Sender<Result<(), DeviceError>>,
) {
    let stream = match build_stream(device.as_deref(), frames_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(DeviceError::Denied(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Either an explicit release or the handle being dropped ends the capture.
    let _ = release_rx.blocking_recv();
    drop(stream);
    tracing::debug!("Audio input released");
}

fn build_stream(
    device_name: Option<&str>,
    frames_tx: mpsc::Sender<Vec<i16>>,
) -> Result<cpal::Stream, DeviceError> {
    let input = match device_name {
        Some(name) => device::find_input(name)
            .map_err(|e| DeviceError::Denied(format!("{e:#}")))?
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))?,
        None => device::default_input().ok_or(DeviceError::NoDefault)?,
    };
    let name = input.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = input
        .default_input_config()
        .map_err(|e| DeviceError::Denied(e.to_string()))?;
    let channels = supported.channels() as usize;
    let sample_rate = supported.sample_rate().0 as f64;
    let stream_config = supported.config();
    tracing::info!(
        "Capturing from {} ({}ch, {}hz)",
        name,
        channels,
        stream_config.sample_rate.0
    );

    let mut framer = PcmFramer::new(sample_rate, FRAME_SAMPLES)
        .map_err(|e| DeviceError::Denied(format!("{e:#}")))?;

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = audio::mix_to_mono(data, channels);
        match framer.push(&mono) {
            Ok(frames) => {
                for frame in frames {
                    if let Err(e) = frames_tx.try_send(frame) {
                        tracing::warn!("Dropping audio frame: {}", e);
                    }
                }
            }
            Err(e) => tracing::error!("Failed to resample audio: {}", e),
        }
    };

    input
        .build_input_stream(
            &stream_config,
            input_data_fn,
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Denied(e.to_string()))
}
