//! External player process engines (mpv, VLC, ffplay)

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::playback::{
    Capabilities, Engine, EngineError, EngineEvent, EngineKind, LaunchRequest, MetricsUpdate,
    PlaybackError, StreamKind, StreamQuality, Teardown,
};

static RESOLUTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3,5})x(\d{3,5})\b").unwrap());
static FPS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s?fps").unwrap());
static BITRATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s?kb/s").unwrap());
static CACHE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Cache:\s*(\d+(?:\.\d+)?)s").unwrap());
static TIME_POS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AV:\s*(?:(\d+):)?(\d{1,2}):(\d{2}(?:\.\d+)?)").unwrap());

static NEXT_IPC_ID: AtomicU64 = AtomicU64::new(1);

/// Pull whatever metrics a player diagnostic line carries
pub fn parse_metrics(line: &str) -> MetricsUpdate {
    let resolution = RESOLUTION_REGEX.captures(line).and_then(|caps| {
        let width = caps[1].parse().ok()?;
        let height = caps[2].parse().ok()?;
        Some((width, height))
    });
    let fps = FPS_REGEX
        .captures(line)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .filter(|fps| *fps > 0.0);
    let bitrate = BITRATE_REGEX
        .captures(line)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(|kbps| kbps * 1000);
    let buffer_seconds = CACHE_REGEX
        .captures(line)
        .and_then(|caps| caps[1].parse::<f64>().ok());

    MetricsUpdate {
        resolution,
        bitrate,
        fps,
        buffer_seconds,
    }
}

/// Playhead from an mpv status line (`AV: 00:01:02`)
pub fn parse_position(line: &str) -> Option<Duration> {
    let caps = TIME_POS_REGEX.captures(line)?;
    let hours: u64 = caps.get(1).map_or(Ok(0), |h| h.as_str().parse()).ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

/// Command line for one external player launch
pub fn launch_args(kind: EngineKind, request: &LaunchRequest) -> Vec<String> {
    let buffering = &request.buffering;
    let cache_secs = buffering.cache_secs;
    let timeout_secs = buffering.network_timeout.as_secs().max(1);
    let title = request.title();
    let is_http = request.url.starts_with("http");

    let mut args = Vec::new();
    match kind {
        EngineKind::Mpv => {
            args.extend([
                request.url.clone(),
                format!("--title={}", title),
                "--cache=yes".to_string(),
                format!("--cache-secs={}", cache_secs * 2),
                format!("--demuxer-readahead-secs={}", cache_secs * 2),
                format!("--demuxer-max-bytes={}M", cache_secs * 4),
                "--cache-pause=yes".to_string(),
                format!("--cache-pause-wait={}", buffering.live_sync_secs),
                "--cache-pause-initial=yes".to_string(),
                format!("--network-timeout={}", timeout_secs),
                "--stream-lavf-o=reconnect=1".to_string(),
                "--stream-lavf-o=reconnect_streamed=1".to_string(),
                format!(
                    "--stream-lavf-o=reconnect_max_retries={}",
                    buffering.resource_retries
                ),
                "--demuxer-lavf-o=fflags=+genpts+discardcorrupt".to_string(),
                "--keep-open=no".to_string(),
                "--ytdl=no".to_string(),
                "--term-status-msg=AV: ${time-pos} Cache: ${demuxer-cache-duration}s ${?paused-for-cache==yes:(Buffering)}".to_string(),
                format!("--volume={}", volume_percent(request)),
            ]);
            if request.muted {
                args.push("--mute=yes".to_string());
            }
            if !request.autoplay {
                args.push("--pause".to_string());
            }
            if request.fullscreen {
                args.push("--fullscreen".to_string());
            }
            if request.picture_in_picture {
                args.push("--ontop".to_string());
            }
            match request.quality {
                StreamQuality::Auto => {}
                StreamQuality::Highest => args.push("--hls-bitrate=max".to_string()),
                StreamQuality::Lowest => args.push("--hls-bitrate=min".to_string()),
            }
            if request.hw_accel {
                args.push("--hwdec=auto-safe".to_string());
            } else {
                args.push("--hwdec=no".to_string());
            }
            if let Some(ref agent) = request.user_agent {
                args.push(format!("--user-agent={}", agent));
            }
        }
        EngineKind::Vlc => {
            let cache_ms = cache_secs * 1000 * 2;
            args.extend([
                request.url.clone(),
                format!("--meta-title={}", title),
                format!("--network-caching={}", cache_ms),
                format!("--live-caching={}", cache_ms),
                "--http-reconnect".to_string(),
                format!("--gain={:.2}", if request.muted { 0.0 } else { request.volume }),
                // input debug messages announce when the stream opened
                "--verbose=2".to_string(),
            ]);
            match request.quality {
                StreamQuality::Auto => {}
                StreamQuality::Highest => args.push("--adaptive-logic=highest".to_string()),
                StreamQuality::Lowest => args.push("--adaptive-logic=lowest".to_string()),
            }
            if !request.autoplay {
                args.push("--start-paused".to_string());
            }
            if request.fullscreen {
                args.push("--fullscreen".to_string());
            }
            if request.picture_in_picture {
                args.push("--video-on-top".to_string());
            }
            if request.hw_accel {
                args.push("--avcodec-hw=any".to_string());
            }
            if let Some(ref agent) = request.user_agent {
                args.push(format!("--http-user-agent={}", agent));
            }
        }
        EngineKind::Ffplay => {
            if request.hw_accel {
                #[cfg(target_os = "macos")]
                args.extend(["-hwaccel".to_string(), "videotoolbox".to_string()]);
                #[cfg(target_os = "linux")]
                args.extend(["-hwaccel".to_string(), "auto".to_string()]);
            }
            args.extend([
                request.url.clone(),
                "-autoexit".to_string(),
                "-window_title".to_string(),
                title,
                "-rw_timeout".to_string(),
                (timeout_secs * 1_000_000).to_string(),
                "-sync".to_string(),
                "audio".to_string(),
                "-framedrop".to_string(),
                "-volume".to_string(),
                (if request.muted { 0 } else { volume_percent(request) }).to_string(),
            ]);
            if is_http {
                args.extend([
                    "-reconnect".to_string(),
                    "1".to_string(),
                    "-reconnect_streamed".to_string(),
                    "1".to_string(),
                    "-reconnect_max_retries".to_string(),
                    buffering.resource_retries.to_string(),
                ]);
            }
            if request.stream_kind == StreamKind::Hls {
                args.extend([
                    "-live_start_index".to_string(),
                    format!("-{}", buffering.live_sync_secs.max(1)),
                ]);
            }
            if cache_secs >= 15 {
                args.push("-infbuf".to_string());
            }
            if request.fullscreen {
                args.push("-fs".to_string());
            }
            if request.picture_in_picture {
                args.push("-alwaysontop".to_string());
            }
            if let Some(ref agent) = request.user_agent {
                args.extend(["-user_agent".to_string(), agent.clone()]);
            }
        }
        EngineKind::Internal => {}
    }
    args
}

fn volume_percent(request: &LaunchRequest) -> u32 {
    (request.volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Status lines repeat several times a second
fn is_status_line(line: &str) -> bool {
    line.starts_with("AV:") || line.starts_with("A:") || line.starts_with("V:") || line.contains("M-V:")
}

/// First sign that the player got past connecting and opened the media
fn is_stream_open_line(line: &str) -> bool {
    is_status_line(line)
        || line.contains("Video --vid=")
        || line.contains("Audio --aid=")
        || (line.contains("Stream #") && (line.contains("Video:") || line.contains("Audio:")))
        || line.contains("successfully opened")
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    [
        "error", "fail", "cannot", "can't", "unable", "refused", "timed out", "timeout",
        "denied", "forbidden", "not found", "invalid",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Turns player output into engine events and remembers what explains an exit
#[derive(Debug)]
pub struct OutputMonitor {
    kind: EngineKind,
    autoplay: bool,
    opened: bool,
    buffering: bool,
    buffered: Option<f64>,
    position: Option<Duration>,
    diagnostic: Option<String>,
    last_error: Option<String>,
}

impl OutputMonitor {
    pub fn new(kind: EngineKind, autoplay: bool) -> Self {
        Self {
            kind,
            autoplay,
            opened: false,
            buffering: false,
            buffered: None,
            position: None,
            diagnostic: None,
            last_error: None,
        }
    }

    pub fn feed(&mut self, line: &str) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        if !self.opened && is_stream_open_line(line) {
            self.opened = true;
            debug!(engine = ?self.kind, "stream opened");
            events.push(EngineEvent::Ready);
            if self.autoplay {
                events.push(EngineEvent::Playing);
            }
        }

        let metrics = parse_metrics(line);
        if let Some(seconds) = metrics.buffer_seconds {
            self.buffered = Some(seconds);
        }

        if is_status_line(line) {
            if let Some(position) = parse_position(line) {
                self.position = Some(position);
            }
            let now_buffering = line.contains("(Buffering)");
            if now_buffering != self.buffering {
                self.buffering = now_buffering;
                events.push(EngineEvent::Buffering(now_buffering));
            }
        } else {
            debug!(engine = ?self.kind, "[PLAYER] {}", line);
            if is_error_line(line) {
                if self.diagnostic.is_none() && PlaybackError::recognize(line).is_some() {
                    self.diagnostic = Some(line.to_string());
                }
                self.last_error = Some(line.to_string());
            }
        }

        // buffered-ahead is sampled by the session, not pushed
        let update = MetricsUpdate {
            buffer_seconds: None,
            ..metrics
        };
        if !update.is_empty() {
            events.push(EngineEvent::Metrics(update));
        }
        events
    }

    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Event for a finished process. `status` is the exit status as text.
    pub fn exit_event(&self, success: bool, status: &str) -> EngineEvent {
        if success && self.opened {
            return EngineEvent::Ended;
        }
        let message = if success {
            format!("{} closed before the stream opened", self.kind.label())
        } else {
            self.diagnostic
                .clone()
                .or_else(|| self.last_error.clone())
                .unwrap_or_else(|| format!("{} exited with {}", self.kind.label(), status))
        };
        EngineEvent::Error {
            message,
            fatal: true,
        }
    }
}

/// mpv JSON IPC endpoint; one connection per command
struct MpvIpc {
    path: PathBuf,
}

impl MpvIpc {
    fn new() -> Self {
        let name = format!(
            "iptv-deck-mpv-{}-{}",
            std::process::id(),
            NEXT_IPC_ID.fetch_add(1, Ordering::Relaxed)
        );
        #[cfg(windows)]
        let path = PathBuf::from(format!(r"\\.\pipe\{}", name));
        #[cfg(not(windows))]
        let path = std::env::temp_dir().join(format!("{}.sock", name));
        Self { path }
    }

    fn arg(&self) -> String {
        format!("--input-ipc-server={}", self.path.display())
    }

    fn send(&self, command: Value) -> std::io::Result<()> {
        use std::io::Write;

        let mut line = serde_json::to_vec(&json!({ "command": command }))?;
        line.push(b'\n');

        #[cfg(unix)]
        {
            let mut stream = std::os::unix::net::UnixStream::connect(&self.path)?;
            stream.write_all(&line)
        }
        #[cfg(windows)]
        {
            let mut pipe = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)?;
            pipe.write_all(&line)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = line;
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "no IPC transport on this platform",
            ))
        }
    }
}

impl Drop for MpvIpc {
    fn drop(&mut self) {
        #[cfg(unix)]
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Engine backed by an external player process
pub struct ProcessEngine {
    kind: EngineKind,
    program: PathBuf,
    child: Option<Child>,
    events: Option<Receiver<EngineEvent>>,
    queued: Vec<EngineEvent>,
    monitor: Arc<Mutex<OutputMonitor>>,
    ipc: Option<MpvIpc>,
    output_closed: bool,
}

impl ProcessEngine {
    pub fn new(kind: EngineKind, program: PathBuf) -> Self {
        Self {
            kind,
            program,
            child: None,
            events: None,
            queued: Vec::new(),
            monitor: Arc::new(Mutex::new(OutputMonitor::new(kind, true))),
            ipc: None,
            output_closed: false,
        }
    }

    fn unsupported(&self, operation: &'static str) -> Result<(), EngineError> {
        Err(EngineError::Unsupported {
            engine: self.kind,
            operation,
        })
    }

    /// Send commands over the control channel of a running mpv
    fn command(&self, operation: &'static str, commands: &[Value]) -> Result<(), EngineError> {
        if self.kind != EngineKind::Mpv {
            return self.unsupported(operation);
        }
        let (Some(ipc), Some(_)) = (self.ipc.as_ref(), self.child.as_ref()) else {
            return Err(EngineError::NotRunning { engine: self.kind });
        };
        for command in commands {
            ipc.send(command.clone()).map_err(|source| EngineError::Ipc {
                engine: self.kind,
                source,
            })?;
        }
        debug!(engine = ?self.kind, operation, "player command sent");
        Ok(())
    }

    fn spawn_output_reader<R>(&self, stream: &str, output: R, sender: Sender<EngineEvent>) -> std::io::Result<()>
    where
        R: Read + Send + 'static,
    {
        let monitor = Arc::clone(&self.monitor);
        thread::Builder::new()
            .name(format!("{}-{}", self.kind.label().to_lowercase(), stream))
            .spawn(move || {
                let reader = BufReader::new(output);
                for chunk in reader.split(b'\n').map_while(Result::ok) {
                    let text = String::from_utf8_lossy(&chunk);
                    for line in text.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
                        let events = monitor.lock().feed(line);
                        for event in events {
                            let _ = sender.send(event);
                        }
                    }
                }
            })
            .map(|_| ())
    }

    fn check_exit(&mut self) -> Option<EngineEvent> {
        let child = self.child.as_mut()?;
        let status = match child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(e) => {
                warn!(engine = ?self.kind, error = %e, "failed to query player process");
                return None;
            }
        };
        self.child = None;

        let event = self.monitor.lock().exit_event(status.success(), &status.to_string());
        match event {
            EngineEvent::Error { ref message, .. } => {
                warn!(engine = ?self.kind, code = ?status.code(), %message, "player exited with error")
            }
            _ => info!(engine = ?self.kind, "player exited"),
        }
        Some(event)
    }
}

impl Engine for ProcessEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Only mpv exposes a control channel
    fn capabilities(&self) -> Capabilities {
        match self.kind {
            EngineKind::Mpv => Capabilities {
                embedded_video: false,
                ..Capabilities::ALL
            },
            _ => Capabilities::NONE,
        }
    }

    fn init(&mut self, request: &LaunchRequest) -> Result<(), EngineError> {
        let mut args = launch_args(self.kind, request);
        let ipc = (self.kind == EngineKind::Mpv).then(MpvIpc::new);
        if let Some(ref ipc) = ipc {
            args.push(ipc.arg());
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref agent) = request.user_agent {
            cmd.env("USER_AGENT", agent);
        }

        // Hide the console window ffplay would otherwise open
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            if self.kind == EngineKind::Ffplay {
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
        }

        info!(
            engine = ?self.kind,
            program = %self.program.display(),
            cache_secs = request.buffering.cache_secs,
            quality = request.quality.label(),
            hw_accel = request.hw_accel,
            "launching player"
        );
        let mut child = cmd.spawn().map_err(|source| EngineError::Launch {
            engine: self.kind,
            source,
        })?;
        info!(engine = ?self.kind, pid = child.id(), "player launched");

        *self.monitor.lock() = OutputMonitor::new(self.kind, request.autoplay);
        let (sender, receiver) = channel();
        if let Some(stdout) = child.stdout.take() {
            if let Err(e) = self.spawn_output_reader("stdout", stdout, sender.clone()) {
                warn!(engine = ?self.kind, error = %e, "failed to start stdout reader");
            }
        }
        if let Some(stderr) = child.stderr.take() {
            if let Err(e) = self.spawn_output_reader("stderr", stderr, sender) {
                warn!(engine = ?self.kind, error = %e, "failed to start stderr reader");
            }
        }

        self.child = Some(child);
        self.events = Some(receiver);
        self.queued.clear();
        self.ipc = ipc;
        self.output_closed = false;
        Ok(())
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.command("play", &[json!(["set_property", "pause", false])])?;
        self.queued.push(EngineEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.command("pause", &[json!(["set_property", "pause", true])])?;
        self.queued.push(EngineEvent::Paused);
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        self.command("seek", &[json!(["seek", position.as_secs_f64(), "absolute"])])
    }

    fn set_volume(&mut self, volume: f32, muted: bool) -> Result<(), EngineError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.command(
            "volume control",
            &[
                json!(["set_property", "volume", percent]),
                json!(["set_property", "mute", muted]),
            ],
        )
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events = std::mem::take(&mut self.queued);
        if let Some(ref receiver) = self.events {
            loop {
                match receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.output_closed = true;
                        break;
                    }
                }
            }
        }
        if self.output_closed {
            self.events = None;
            events.extend(self.check_exit());
        }
        events
    }

    fn buffered_ahead(&self) -> Option<f64> {
        self.monitor.lock().buffered
    }

    fn position(&self) -> Option<Duration> {
        self.monitor.lock().position
    }

    fn destroy(mut self: Box<Self>) -> Teardown {
        let Some(mut child) = self.child.take() else {
            return Teardown::completed();
        };
        let kind = self.kind;
        let ipc = self.ipc.take();
        let (teardown, signal) = Teardown::pending();
        let spawned = thread::Builder::new()
            .name("player-teardown".to_string())
            .spawn(move || {
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => debug!(engine = ?kind, %status, "player process reaped"),
                    Err(e) => warn!(engine = ?kind, error = %e, "failed to reap player process"),
                }
                drop(ipc);
                signal.complete();
            });
        if let Err(e) = spawned {
            warn!(engine = ?kind, error = %e, "failed to spawn teardown thread");
        }
        teardown
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
