// Internal video engine using ffmpeg-next
// Requires FFmpeg libraries: libavcodec, libavformat, libavutil, libswscale
//
// To install FFmpeg development libraries:
// - Ubuntu/Debian: sudo apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev libavdevice-dev
// - Fedora: sudo dnf install ffmpeg-devel
// - macOS: brew install ffmpeg
// - Windows: Download from https://ffmpeg.org and set FFMPEG_DIR environment variable

#[cfg(feature = "internal-player")]
mod engine_impl {
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    extern crate ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
    use ffmpeg::util::frame::video::Video as DecodedVideo;
    use parking_lot::Mutex;
    use tracing::{debug, info, warn};

    use crate::playback::{
        Capabilities, Engine, EngineError, EngineEvent, EngineKind, LaunchRequest, MetricsUpdate,
        StreamQuality, Teardown, TeardownSignal, VideoFrame,
    };

    /// Commands sent to the decode thread
    enum DecoderCommand {
        Stop,
        Pause,
        Resume,
        Seek(Duration),
    }

    /// Initialize the FFmpeg libraries
    pub fn load() -> Result<(), String> {
        ffmpeg::init().map_err(|e| format!("FFmpeg initialization failed: {}", e))
    }

    /// Built-in decoder rendering frames into the application window
    pub struct InternalEngine {
        commands: Option<Sender<DecoderCommand>>,
        events: Option<Receiver<EngineEvent>>,
        current_frame: Arc<Mutex<Option<VideoFrame>>>,
        teardown: Option<Teardown>,
        volume: f32,
        muted: bool,
    }

    impl InternalEngine {
        pub fn new() -> Self {
            Self {
                commands: None,
                events: None,
                current_frame: Arc::new(Mutex::new(None)),
                teardown: None,
                volume: 1.0,
                muted: false,
            }
        }

        fn send(&self, command: DecoderCommand) -> Result<(), EngineError> {
            let sender = self.commands.as_ref().ok_or(EngineError::NotRunning {
                engine: EngineKind::Internal,
            })?;
            sender.send(command).map_err(|_| EngineError::NotRunning {
                engine: EngineKind::Internal,
            })
        }
    }

    /// Bandwidth advertised by an HLS variant playlist, 0 when unknown
    fn variant_bitrate(stream: &ffmpeg::format::stream::Stream) -> u64 {
        stream
            .metadata()
            .get("variant_bitrate")
            .and_then(|bitrate| bitrate.parse().ok())
            .unwrap_or(0)
    }

    struct DecodeJob {
        url: String,
        quality: StreamQuality,
        user_agent: Option<String>,
        autoplay: bool,
        timeout: Duration,
        resource_retries: u32,
        current_frame: Arc<Mutex<Option<VideoFrame>>>,
        commands: Receiver<DecoderCommand>,
        events: Sender<EngineEvent>,
    }

    impl DecodeJob {
        fn fail(&self, message: String) {
            warn!(%message, "internal decoder failed");
            let _ = self.events.send(EngineEvent::Error {
                message,
                fatal: true,
            });
        }

        fn run(self, signal: TeardownSignal) {
            self.decode();
            *self.current_frame.lock() = None;
            signal.complete();
        }

        fn decode(&self) {
            let mut options = ffmpeg::Dictionary::new();
            if let Some(ref agent) = self.user_agent {
                options.set("user_agent", agent);
            }
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_max_retries", &self.resource_retries.to_string());
            options.set("timeout", &self.timeout.as_micros().to_string());

            let mut ictx = match ffmpeg::format::input_with_dictionary(&self.url, options) {
                Ok(ctx) => ctx,
                Err(e) => return self.fail(format!("Failed to open stream: {}", e)),
            };

            let video_stream = match self.quality {
                StreamQuality::Auto => ictx.streams().best(Type::Video),
                quality => {
                    let variants = ictx
                        .streams()
                        .filter(|stream| stream.parameters().medium() == Type::Video);
                    let picked = if quality == StreamQuality::Highest {
                        variants.max_by_key(|stream| variant_bitrate(stream))
                    } else {
                        variants.min_by_key(|stream| variant_bitrate(stream))
                    };
                    picked.or_else(|| ictx.streams().best(Type::Video))
                }
            };
            let (video_stream_index, parameters, frame_rate, time_base) = match video_stream {
                Some(stream) => (stream.index(), stream.parameters(), stream.avg_frame_rate(), f64::from(stream.time_base())),
                None => return self.fail("No video stream found".to_string()),
            };

            let context_decoder = match ffmpeg::codec::context::Context::from_parameters(parameters) {
                Ok(ctx) => ctx,
                Err(e) => return self.fail(format!("Failed to create decoder: {}", e)),
            };
            let mut decoder = match context_decoder.decoder().video() {
                Ok(d) => d,
                Err(e) => return self.fail(format!("Failed to create decoder: {}", e)),
            };

            let width = decoder.width();
            let height = decoder.height();

            // Scale to reasonable size if too large
            let (target_width, target_height) = if width > 1280 || height > 720 {
                let scale = f64::min(1280.0 / width as f64, 720.0 / height as f64);
                ((width as f64 * scale) as u32, (height as f64 * scale) as u32)
            } else {
                (width, height)
            };

            let mut scaler = match ScalingContext::get(
                decoder.format(),
                width,
                height,
                Pixel::RGB24,
                target_width,
                target_height,
                Flags::BILINEAR,
            ) {
                Ok(s) => s,
                Err(e) => return self.fail(format!("Failed to create scaler: {}", e)),
            };

            let fps = (frame_rate.denominator() != 0)
                .then(|| frame_rate.numerator() as f32 / frame_rate.denominator() as f32)
                .filter(|fps| *fps > 0.0);
            let bitrate = u64::try_from(ictx.bit_rate()).ok().filter(|b| *b > 0);
            let _ = self.events.send(EngineEvent::Metrics(MetricsUpdate {
                resolution: Some((width, height)),
                bitrate,
                fps,
                buffer_seconds: None,
            }));
            let _ = self.events.send(EngineEvent::Ready);
            info!(width, height, ?fps, "internal decoder ready");

            let mut paused = !self.autoplay;
            if !paused {
                let _ = self.events.send(EngineEvent::Playing);
            }

            let frame_duration = Duration::from_secs_f64(1.0 / 30.0); // Target 30fps display
            let mut last_frame_time = Instant::now();

            loop {
                match self.commands.try_recv() {
                    Ok(DecoderCommand::Stop) | Err(TryRecvError::Disconnected) => return,
                    Ok(DecoderCommand::Pause) => {
                        paused = true;
                        let _ = self.events.send(EngineEvent::Paused);
                    }
                    Ok(DecoderCommand::Resume) => {
                        paused = false;
                        let _ = self.events.send(EngineEvent::Playing);
                    }
                    Ok(DecoderCommand::Seek(position)) => {
                        let ts = position.as_micros() as i64;
                        match ictx.seek(ts, ..ts) {
                            Ok(()) => decoder.flush(),
                            Err(e) => debug!(error = %e, "seek rejected"),
                        }
                    }
                    Err(TryRecvError::Empty) => {}
                }

                if paused {
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }

                let mut packet = ffmpeg::Packet::empty();
                match packet.read(&mut ictx) {
                    Ok(()) => {}
                    Err(ffmpeg::Error::Eof) => break,
                    Err(e) => return self.fail(e.to_string()),
                }

                if packet.stream() != video_stream_index {
                    continue;
                }
                if decoder.send_packet(&packet).is_err() {
                    continue;
                }

                let mut decoded = DecodedVideo::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    let mut rgb_frame = DecodedVideo::empty();
                    if scaler.run(&decoded, &mut rgb_frame).is_err() {
                        continue;
                    }
                    let data = rgb_frame.data(0);
                    let stride = rgb_frame.stride(0);

                    // Copy frame data (handling stride)
                    let row_len = target_width as usize * 3;
                    let mut frame_data = Vec::with_capacity(row_len * target_height as usize);
                    for y in 0..target_height as usize {
                        let row_start = y * stride;
                        frame_data.extend_from_slice(&data[row_start..row_start + row_len]);
                    }

                    *self.current_frame.lock() = Some(VideoFrame {
                        width: target_width,
                        height: target_height,
                        data: frame_data,
                        position: Duration::from_secs_f64(
                            (decoded.pts().unwrap_or(0) as f64 * time_base).max(0.0),
                        ),
                    });

                    // Rate limiting to avoid overwhelming the UI
                    let elapsed = last_frame_time.elapsed();
                    if elapsed < frame_duration {
                        thread::sleep(frame_duration - elapsed);
                    }
                    last_frame_time = Instant::now();
                }
            }

            info!("internal decoder reached end of stream");
            let _ = self.events.send(EngineEvent::Ended);
        }
    }

    impl Engine for InternalEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Internal
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                volume: false,
                ..Capabilities::ALL
            }
        }

        fn init(&mut self, request: &LaunchRequest) -> Result<(), EngineError> {
            let (cmd_tx, cmd_rx) = channel();
            let (event_tx, event_rx) = channel();
            let (teardown, signal) = Teardown::pending();

            let job = DecodeJob {
                url: request.url.clone(),
                quality: request.quality,
                user_agent: request.user_agent.clone(),
                autoplay: request.autoplay,
                timeout: request.buffering.network_timeout,
                resource_retries: request.buffering.resource_retries,
                current_frame: Arc::clone(&self.current_frame),
                commands: cmd_rx,
                events: event_tx,
            };
            thread::Builder::new()
                .name("internal-decoder".to_string())
                .spawn(move || job.run(signal))
                .map_err(|source| EngineError::Launch {
                    engine: EngineKind::Internal,
                    source,
                })?;

            self.volume = request.volume;
            self.muted = request.muted;
            self.commands = Some(cmd_tx);
            self.events = Some(event_rx);
            self.teardown = Some(teardown);
            Ok(())
        }

        fn play(&mut self) -> Result<(), EngineError> {
            self.send(DecoderCommand::Resume)
        }

        fn pause(&mut self) -> Result<(), EngineError> {
            self.send(DecoderCommand::Pause)
        }

        fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
            self.send(DecoderCommand::Seek(position))
        }

        /// Video only; the values are kept for the next audio-capable build
        fn set_volume(&mut self, volume: f32, muted: bool) -> Result<(), EngineError> {
            self.volume = volume;
            self.muted = muted;
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<EngineEvent> {
            let mut events = Vec::new();
            if let Some(ref receiver) = self.events {
                loop {
                    match receiver.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            self.events = None;
                            break;
                        }
                    }
                }
            }
            events
        }

        fn take_frame(&mut self) -> Option<VideoFrame> {
            self.current_frame.lock().take()
        }

        fn destroy(mut self: Box<Self>) -> Teardown {
            if let Some(sender) = self.commands.take() {
                let _ = sender.send(DecoderCommand::Stop);
            }
            self.teardown.take().unwrap_or_else(Teardown::completed)
        }
    }

    impl Drop for InternalEngine {
        fn drop(&mut self) {
            if let Some(ref sender) = self.commands {
                let _ = sender.send(DecoderCommand::Stop);
            }
        }
    }
}

// Stub implementation when internal-player feature is disabled
#[cfg(not(feature = "internal-player"))]
mod engine_impl {
    use std::time::Duration;

    use crate::playback::{
        Capabilities, Engine, EngineError, EngineEvent, EngineKind, LaunchRequest, Teardown,
    };

    pub const NOT_ENABLED: &str = "Internal player not enabled. Build with --features internal-player";

    pub fn load() -> Result<(), String> {
        Err(NOT_ENABLED.to_string())
    }

    pub struct InternalEngine;

    impl InternalEngine {
        pub fn new() -> Self {
            Self
        }
    }

    impl Engine for InternalEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::Internal
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }

        fn init(&mut self, _request: &LaunchRequest) -> Result<(), EngineError> {
            Err(EngineError::Failed(NOT_ENABLED.to_string()))
        }

        fn play(&mut self) -> Result<(), EngineError> {
            Err(EngineError::NotRunning { engine: EngineKind::Internal })
        }

        fn pause(&mut self) -> Result<(), EngineError> {
            Err(EngineError::NotRunning { engine: EngineKind::Internal })
        }

        fn seek(&mut self, _position: Duration) -> Result<(), EngineError> {
            Err(EngineError::NotRunning { engine: EngineKind::Internal })
        }

        fn set_volume(&mut self, _volume: f32, _muted: bool) -> Result<(), EngineError> {
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<EngineEvent> {
            Vec::new()
        }

        fn destroy(self: Box<Self>) -> Teardown {
            Teardown::completed()
        }
    }
}

pub use engine_impl::*;

#[cfg(all(test, not(feature = "internal-player")))]
mod tests {
    use super::*;
    use crate::playback::{
        BufferingConfig, Engine, EngineError, LaunchRequest, StreamKind, StreamQuality,
    };

    #[test]
    fn test_stub_reports_missing_feature() {
        assert_eq!(load().unwrap_err(), NOT_ENABLED);

        let mut engine = InternalEngine::new();
        let request = LaunchRequest {
            channel_name: "Movies".to_string(),
            url: "https://cdn.example.com/movie.mp4".to_string(),
            stream_kind: StreamKind::Direct,
            autoplay: true,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            picture_in_picture: false,
            buffering: BufferingConfig::default(),
            quality: StreamQuality::Auto,
            user_agent: None,
            hw_accel: true,
        };
        assert!(matches!(engine.init(&request), Err(EngineError::Failed(_))));
        assert_eq!(engine.capabilities(), crate::playback::Capabilities::NONE);
        assert!(engine.take_frame().is_none());
        assert!(Box::new(engine).destroy().is_complete());
    }
}
