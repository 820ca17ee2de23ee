//! Push-to-talk capture: one recording span per press.
//!
//! `start` opens the microphone and the recognition channel and spawns a pump
//! that forwards frames out and folds recognition events in. `stop` tells the
//! pump to drain: it sends end-of-stream, keeps folding events for the grace
//! period, then hands the span back for reconciliation. Events that arrive
//! while draining still land in the same span.

use crate::error::{ChannelError, DeviceError};
use crate::transcript::{RecognitionEvent, Reconciled, RecordingSpan};
use crate::{Command, Input, Status};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long to keep listening for trailing finals after end-of-stream.
pub const DRAIN_GRACE: Duration = Duration::from_millis(1000);

/// Live microphone audio as fixed-size 16 kHz mono PCM frames.
///
/// Dropping the stream releases the device.
pub struct CaptureStream {
    frames: mpsc::Receiver<Vec<i16>>,
    _release: oneshot::Sender<()>,
}

impl CaptureStream {
    /// `release` is dropped together with the stream; the capture side waits on its receiver.
    pub fn new(frames: mpsc::Receiver<Vec<i16>>, release: oneshot::Sender<()>) -> Self {
        Self {
            frames,
            _release: release,
        }
    }
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Opens the named input device, or the default device when `device` is `None`.
    async fn open(&self, device: Option<&str>) -> Result<CaptureStream, DeviceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelInput {
    Audio(Vec<i16>),
    /// No more audio will follow; the recognizer should flush what it has.
    EndOfStream,
}

/// An open duplex channel to the recognizer.
///
/// Dropping `audio` closes the channel. `events` ends when the recognizer
/// closes or fails.
pub struct RecognitionStream {
    pub audio: mpsc::Sender<ChannelInput>,
    pub events: mpsc::Receiver<RecognitionEvent>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn open(&self) -> Result<RecognitionStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    Idle,
    Capturing,
    Draining,
}

struct ActiveSpan {
    stop_tx: oneshot::Sender<()>,
    pump: JoinHandle<RecordingSpan>,
}

pub struct RecordingController<A: AudioCapture, T: Transcriber> {
    capture: A,
    transcriber: T,
    device: Option<String>,
    grace: Duration,
    session_started: watch::Receiver<bool>,
    input_tx: mpsc::Sender<Input>,
    command_tx: mpsc::Sender<Command>,
    state: SpanState,
    active: Option<ActiveSpan>,
}

impl<A: AudioCapture, T: Transcriber> RecordingController<A, T> {
    pub fn new(
        capture: A,
        transcriber: T,
        session_started: watch::Receiver<bool>,
        input_tx: mpsc::Sender<Input>,
        command_tx: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            capture,
            transcriber,
            device: None,
            grace: DRAIN_GRACE,
            session_started,
            input_tx,
            command_tx,
            state: SpanState::Idle,
            active: None,
        }
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> SpanState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SpanState::Capturing
    }

    /// Begins a span. A no-op while a span is open or before the session has started.
    pub async fn start(&mut self) -> Result<(), DeviceError> {
        if self.state != SpanState::Idle {
            tracing::debug!("Ignoring start while {:?}", self.state);
            return Ok(());
        }
        if !*self.session_started.borrow() {
            tracing::debug!("Ignoring start before the session has started");
            return Ok(());
        }

        let capture = match self.capture.open(self.device.as_deref()).await {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!("Microphone error: {}", e);
                self.notify(Command::Status(Status::CaptureDenied)).await;
                return Err(e);
            }
        };

        // Without a channel the span still runs; it just reconciles to nothing.
        let channel = match self.transcriber.open().await {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::error!("{}", ChannelError::Connect(e));
                None
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_span(capture, channel, stop_rx, self.grace));
        self.active = Some(ActiveSpan { stop_tx, pump });
        self.state = SpanState::Capturing;
        tracing::info!("Recording started");
        self.notify(Command::Status(Status::Listening)).await;
        Ok(())
    }

    /// Ends the span, drains trailing events and forwards the reconciled utterance.
    ///
    /// Returns `None` when nothing was being captured.
    pub async fn stop(&mut self) -> Option<Reconciled> {
        if self.state != SpanState::Capturing {
            tracing::debug!("Ignoring stop while {:?}", self.state);
            return None;
        }
        let active = self.active.take()?;
        self.state = SpanState::Draining;
        self.notify(Command::Status(Status::Processing)).await;

        // The pump may already have finished on its own; a closed receiver is fine.
        let _ = active.stop_tx.send(());
        let span = match active.pump.await {
            Ok(span) => span,
            Err(e) => {
                tracing::error!("Recording pump failed: {}", e);
                RecordingSpan::new()
            }
        };
        self.state = SpanState::Idle;

        let events = span.events_seen();
        let outcome = span.finalize();
        match &outcome {
            Reconciled::Utterance(text) => {
                tracing::info!("Player said: \"{}\" ({} events)", text, events);
                if self
                    .input_tx
                    .send(Input::PlayerUtterance(text.clone()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Session input channel closed, dropping utterance");
                }
            }
            Reconciled::Empty => {
                tracing::info!("No speech detected");
                self.notify(Command::Status(Status::NoSpeech)).await;
            }
        }
        Some(outcome)
    }

    async fn notify(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command).await {
            tracing::warn!("Failed to send command to runtime: {:?}", e.0);
        }
    }
}

enum Step {
    Stop,
    Frame(Option<Vec<i16>>),
    Event(Option<RecognitionEvent>),
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn pump_span(
    capture: CaptureStream,
    channel: Option<RecognitionStream>,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
) -> RecordingSpan {
    let CaptureStream { frames, _release } = capture;
    let mut frames = Some(frames);
    let (mut audio_tx, mut events) = match channel {
        Some(channel) => (Some(channel.audio), Some(channel.events)),
        None => (None, None),
    };
    let mut span = RecordingSpan::new();

    // Capturing
    loop {
        let step = tokio::select! {
            _ = &mut stop_rx => Step::Stop,
            frame = recv_or_pending(&mut frames) => Step::Frame(frame),
            event = recv_or_pending(&mut events) => Step::Event(event),
        };
        match step {
            Step::Stop => break,
            Step::Frame(Some(frame)) => {
                if let Some(tx) = &audio_tx {
                    if tx.send(ChannelInput::Audio(frame)).await.is_err() {
                        tracing::warn!("Recognition channel stopped accepting audio");
                        audio_tx = None;
                    }
                }
            }
            Step::Frame(None) => {
                tracing::warn!("Audio capture ended before release");
                frames = None;
            }
            Step::Event(Some(event)) => span.apply(&event),
            Step::Event(None) => {
                tracing::warn!("{}", ChannelError::Closed);
                events = None;
            }
        }
    }

    // Draining
    if let Some(tx) = &audio_tx {
        if tx.send(ChannelInput::EndOfStream).await.is_err() {
            tracing::debug!("Recognition channel already closed at end of stream");
        }
    }
    let deadline = Instant::now() + grace;
    while events.is_some() {
        let step = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            // Frames still arriving before the device is released are discarded.
            frame = recv_or_pending(&mut frames) => Step::Frame(frame),
            event = recv_or_pending(&mut events) => Step::Event(event),
        };
        match step {
            Step::Frame(None) => frames = None,
            Step::Event(Some(event)) => span.apply(&event),
            Step::Event(None) => {
                tracing::debug!("Recognition channel closed while draining");
                events = None;
            }
            Step::Frame(Some(_)) | Step::Stop => {}
        }
    }

    drop(audio_tx);
    drop(events);
    drop(frames);
    drop(_release);
    span
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GRACE: Duration = Duration::from_millis(200);

    #[derive(Default)]
    struct FakeCapture {
        frames: Vec<Vec<i16>>,
        deny: bool,
        opens: AtomicUsize,
        releases: Mutex<Vec<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl AudioCapture for FakeCapture {
        async fn open(&self, device: Option<&str>) -> Result<CaptureStream, DeviceError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(DeviceError::Denied(device.unwrap_or("default").to_string()));
            }
            let (tx, rx) = mpsc::channel(16);
            for frame in &self.frames {
                tx.try_send(frame.clone()).unwrap();
            }
            let (release_tx, release_rx) = oneshot::channel();
            self.releases.lock().unwrap().push(release_rx);
            // Keep the sender alive inside the spawned task so the stream stays open.
            tokio::spawn(async move {
                tx.closed().await;
            });
            Ok(CaptureStream::new(rx, release_tx))
        }
    }

    /// The recognizer side of a fake channel, driven by the test.
    struct RecognizerEnd {
        audio: mpsc::Receiver<ChannelInput>,
        events: mpsc::Sender<RecognitionEvent>,
    }

    struct FakeTranscriber {
        channel: Mutex<Option<RecognitionStream>>,
        opens: AtomicUsize,
    }

    impl FakeTranscriber {
        fn new() -> (Self, RecognizerEnd) {
            let (audio_tx, audio_rx) = mpsc::channel(16);
            let (events_tx, events_rx) = mpsc::channel(16);
            let fake = Self {
                channel: Mutex::new(Some(RecognitionStream {
                    audio: audio_tx,
                    events: events_rx,
                })),
                opens: AtomicUsize::new(0),
            };
            let end = RecognizerEnd {
                audio: audio_rx,
                events: events_tx,
            };
            (fake, end)
        }

        fn unreachable() -> Self {
            Self {
                channel: Mutex::new(None),
                opens: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn open(&self) -> Result<RecognitionStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.channel
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    struct Harness {
        input_rx: mpsc::Receiver<Input>,
        command_rx: mpsc::Receiver<Command>,
        _started_tx: watch::Sender<bool>,
    }

    fn controller(
        capture: FakeCapture,
        transcriber: FakeTranscriber,
        started: bool,
    ) -> (RecordingController<FakeCapture, FakeTranscriber>, Harness) {
        let (started_tx, started_rx) = watch::channel(started);
        let (input_tx, input_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(32);
        let controller =
            RecordingController::new(capture, transcriber, started_rx, input_tx, command_tx)
                .with_grace(GRACE);
        (
            controller,
            Harness {
                input_rx,
                command_rx,
                _started_tx: started_tx,
            },
        )
    }

    fn statuses(rx: &mut mpsc::Receiver<Command>) -> Vec<Status> {
        let mut out = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let Command::Status(status) = command {
                out.push(status);
            }
        }
        out
    }

    #[tokio::test]
    async fn final_arriving_while_draining_wins_over_partial() {
        let capture = FakeCapture {
            frames: vec![vec![1; 4096], vec![2; 4096]],
            ..Default::default()
        };
        let (transcriber, mut end) = FakeTranscriber::new();

        // Plays the recognizer: a partial while audio flows, the final only after end-of-stream.
        let recognizer = tokio::spawn(async move {
            let mut frames = 0;
            while let Some(input) = end.audio.recv().await {
                match input {
                    ChannelInput::Audio(_) => {
                        frames += 1;
                        if frames == 1 {
                            end.events
                                .send(RecognitionEvent::partial("I open", 0))
                                .await
                                .unwrap();
                        }
                    }
                    ChannelInput::EndOfStream => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        end.events
                            .send(RecognitionEvent::final_("I open the door.", 1))
                            .await
                            .unwrap();
                    }
                }
            }
            frames
        });

        let (mut controller, mut harness) = controller(capture, transcriber, true);
        controller.start().await.unwrap();
        assert!(controller.is_recording());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = controller.stop().await;

        assert_eq!(
            outcome,
            Some(Reconciled::Utterance("I open the door.".to_string()))
        );
        assert_eq!(controller.state(), SpanState::Idle);
        assert_eq!(recognizer.await.unwrap(), 2);
        assert_eq!(
            harness.input_rx.try_recv().unwrap(),
            Input::PlayerUtterance("I open the door.".to_string())
        );
        assert_eq!(
            statuses(&mut harness.command_rx),
            vec![Status::Listening, Status::Processing]
        );
    }

    #[tokio::test]
    async fn channel_closing_mid_capture_keeps_buffered_text() {
        let capture = FakeCapture {
            frames: vec![vec![1; 4096], vec![2; 4096]],
            ..Default::default()
        };
        let (transcriber, mut end) = FakeTranscriber::new();

        // The recognizer hangs up right after its first partial.
        tokio::spawn(async move {
            if let Some(ChannelInput::Audio(_)) = end.audio.recv().await {
                end.events
                    .send(RecognitionEvent::partial("hold on", 0))
                    .await
                    .unwrap();
            }
            drop(end);
        });

        let (mut controller, mut harness) = controller(capture, transcriber, true);
        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stopped_at = Instant::now();
        let outcome = controller.stop().await;

        assert_eq!(outcome, Some(Reconciled::Utterance("hold on".to_string())));
        // Nothing left to drain, so the grace period is skipped.
        assert!(stopped_at.elapsed() < GRACE);
        assert_eq!(controller.state(), SpanState::Idle);
        assert_eq!(
            harness.input_rx.try_recv().unwrap(),
            Input::PlayerUtterance("hold on".to_string())
        );
    }

    #[tokio::test]
    async fn device_is_released_after_stop() {
        let capture = FakeCapture::default();
        let (mut controller, _harness) =
            controller(capture, FakeTranscriber::unreachable(), true);

        controller.start().await.unwrap();
        controller.stop().await;

        let mut releases = controller.capture.releases.lock().unwrap();
        assert_eq!(releases.len(), 1);
        assert!(matches!(
            releases[0].try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn denied_capture_stays_idle_without_opening_channel() {
        let capture = FakeCapture {
            deny: true,
            ..Default::default()
        };
        let (transcriber, _end) = FakeTranscriber::new();
        let (mut controller, mut harness) = controller(capture, transcriber, true);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, DeviceError::Denied(_)));
        assert_eq!(controller.state(), SpanState::Idle);
        assert_eq!(controller.transcriber.opens.load(Ordering::SeqCst), 0);
        assert_eq!(statuses(&mut harness.command_rx), vec![Status::CaptureDenied]);
        assert_eq!(controller.stop().await, None);
    }

    #[tokio::test]
    async fn silence_reports_no_speech_and_sends_nothing() {
        let (mut controller, mut harness) =
            controller(FakeCapture::default(), FakeTranscriber::unreachable(), true);

        controller.start().await.unwrap();
        assert_eq!(controller.stop().await, Some(Reconciled::Empty));

        assert!(harness.input_rx.try_recv().is_err());
        assert_eq!(
            statuses(&mut harness.command_rx),
            vec![Status::Listening, Status::Processing, Status::NoSpeech]
        );
    }

    #[tokio::test]
    async fn overlapping_gestures_are_no_ops() {
        let (mut controller, mut harness) =
            controller(FakeCapture::default(), FakeTranscriber::unreachable(), false);

        // Before the session starts nothing opens.
        controller.start().await.unwrap();
        assert_eq!(controller.capture.opens.load(Ordering::SeqCst), 0);
        assert_eq!(controller.stop().await, None);

        harness._started_tx.send(true).unwrap();
        controller.start().await.unwrap();
        controller.start().await.unwrap();
        assert_eq!(controller.capture.opens.load(Ordering::SeqCst), 1);

        assert!(controller.stop().await.is_some());
        assert_eq!(controller.stop().await, None);
        assert!(harness.input_rx.try_recv().is_err());
    }
}
