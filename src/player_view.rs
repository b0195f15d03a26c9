//! Player surface: video area, status overlays and the controls bar

use std::time::{Duration, Instant};

use eframe::egui;

use crate::playback::session::BUFFER_SAMPLE_INTERVAL;
use crate::playback::{
    Capabilities, ConnectionQuality, EngineProvider, Player, SessionState, StreamStatus,
};

/// Controls hide after this long without pointer movement
pub const CONTROLS_IDLE_TIMEOUT: Duration = Duration::from_secs(3);
const SEEK_STEP: Duration = Duration::from_secs(10);

/// Tracks pointer inactivity over the player surface
#[derive(Debug, Clone)]
pub struct IdleTimer {
    timeout: Duration,
    last_activity: Option<Instant>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        match self.last_activity {
            Some(at) => now.saturating_duration_since(at) >= self.timeout,
            None => true,
        }
    }

    /// Time until the timer goes idle, for scheduling a repaint
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let at = self.last_activity?;
        self.timeout.checked_sub(now.saturating_duration_since(at)).filter(|d| !d.is_zero())
    }
}

/// "n/max" while within the automatic budget; manual attempts beyond it have no ceiling
pub fn retry_progress(status: &StreamStatus) -> String {
    if status.retry_attempt > status.max_retries {
        status.retry_attempt.to_string()
    } else {
        format!("{}/{}", status.retry_attempt, status.max_retries)
    }
}

/// Text under the loading spinner
pub fn loading_message(status: &StreamStatus) -> String {
    if status.retry_attempt > 0 {
        format!("Retry attempt {}", retry_progress(status))
    } else {
        "Connecting to stream...".to_string()
    }
}

/// When the next frame should be drawn. Engines drawing into the window need every
/// frame; external players only need their events drained.
pub fn repaint_interval(status: &StreamStatus, capabilities: Capabilities) -> Option<Duration> {
    let active = matches!(
        status.state,
        SessionState::Initializing | SessionState::Ready | SessionState::Playing
    ) || status.retry_pending
        || status.is_loading;
    if !active {
        None
    } else if capabilities.embedded_video && status.state == SessionState::Playing {
        Some(Duration::ZERO)
    } else {
        Some(BUFFER_SAMPLE_INTERVAL)
    }
}

/// Badge shown in the corner of the video area
pub fn badge(status: &StreamStatus) -> Option<&'static str> {
    match status.state {
        SessionState::Idle | SessionState::Error => None,
        _ if status.is_live => Some("LIVE"),
        _ => Some("VIDEO"),
    }
}

pub fn quality_color(quality: ConnectionQuality) -> egui::Color32 {
    match quality {
        ConnectionQuality::Excellent => egui::Color32::GREEN,
        ConnectionQuality::Good => egui::Color32::LIGHT_GREEN,
        ConnectionQuality::Poor => egui::Color32::YELLOW,
        ConnectionQuality::Offline => egui::Color32::RED,
    }
}

pub struct PlayerView {
    texture: Option<egui::TextureHandle>,
    position: Duration,
    idle: IdleTimer,
}

impl Default for PlayerView {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerView {
    pub fn new() -> Self {
        Self {
            texture: None,
            position: Duration::ZERO,
            idle: IdleTimer::new(CONTROLS_IDLE_TIMEOUT),
        }
    }

    /// Drop the last frame, e.g. when the channel changes
    pub fn reset(&mut self) {
        self.texture = None;
        self.position = Duration::ZERO;
    }

    pub fn show<P: EngineProvider>(
        &mut self,
        ctx: &egui::Context,
        ui: &mut egui::Ui,
        player: &mut Player<P>,
    ) {
        let now = Instant::now();

        if let Some(frame) = player.take_frame() {
            let image = egui::ColorImage::from_rgb(
                [frame.width as usize, frame.height as usize],
                &frame.data,
            );
            self.position = frame.position;
            match self.texture {
                Some(ref mut texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.texture = Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
                }
            }
        }

        let status = player.status();
        if status.state == SessionState::Idle {
            self.texture = None;
        }

        let pip = player.settings().picture_in_picture;
        let available = ui.available_size();
        let video_height = (available.y - 40.0).max(120.0);
        let (rect, response) = ui.allocate_exact_size(
            egui::vec2(available.x, video_height),
            egui::Sense::click(),
        );
        if response.hovered() && ui.input(|i| i.pointer.is_moving()) {
            self.idle.touch(now);
        }
        if response.double_clicked() {
            let fullscreen = !player.settings().fullscreen;
            self.set_fullscreen(ctx, player, fullscreen);
        }

        ui.painter().rect_filled(rect, 4.0, egui::Color32::BLACK);
        if !pip {
            self.paint_frame(ui, rect);
        }

        ui.scope_builder(egui::UiBuilder::new().max_rect(rect.shrink(12.0)), |ui| {
            if let Some(text) = badge(&status) {
                let color = if status.is_live { egui::Color32::RED } else { egui::Color32::DARK_GRAY };
                ui.label(
                    egui::RichText::new(format!(" {} ", text))
                        .strong()
                        .color(egui::Color32::WHITE)
                        .background_color(color),
                );
            }
            ui.vertical_centered(|ui| {
                ui.add_space(rect.height() * 0.3);
                self.show_overlay(ui, player, &status, pip, now);
            });
        });

        if pip {
            self.show_pip_window(ctx, player);
        }

        let controls_visible = !self.idle.is_idle(now)
            || matches!(status.state, SessionState::Paused | SessionState::Error | SessionState::Idle);
        if controls_visible {
            self.show_controls(ctx, ui, player, &status, now);
        } else {
            // keep the row height so the layout does not jump
            ui.add_space(ui.spacing().interact_size.y);
        }

        if let Some(remaining) = self.idle.remaining(now) {
            ctx.request_repaint_after(remaining);
        }
        if let Some(interval) = repaint_interval(&status, player.capabilities()) {
            ctx.request_repaint_after(interval);
        }
    }

    fn paint_frame(&self, ui: &egui::Ui, rect: egui::Rect) {
        let Some(ref texture) = self.texture else {
            return;
        };
        let tex_size = texture.size_vec2();
        if tex_size.y <= 0.0 || rect.height() <= 0.0 {
            return;
        }
        let aspect = tex_size.x / tex_size.y;
        let size = if rect.width() / rect.height() > aspect {
            egui::vec2(rect.height() * aspect, rect.height())
        } else {
            egui::vec2(rect.width(), rect.width() / aspect)
        };
        let target = egui::Rect::from_center_size(rect.center(), size);
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        ui.painter().image(texture.id(), target, uv, egui::Color32::WHITE);
    }

    fn show_overlay<P: EngineProvider>(
        &mut self,
        ui: &mut egui::Ui,
        player: &mut Player<P>,
        status: &StreamStatus,
        pip: bool,
        now: Instant,
    ) {
        match status.state {
            SessionState::Idle => {
                ui.label(egui::RichText::new("Select a channel to start watching").color(egui::Color32::GRAY));
            }
            SessionState::Error => {
                let message = status.error.as_deref().unwrap_or("Playback failed");
                ui.colored_label(egui::Color32::RED, egui::RichText::new(format!("⚠ {}", message)).strong());

                if status.retry_pending {
                    ui.add_space(6.0);
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(egui::RichText::new(loading_message(status)).color(egui::Color32::LIGHT_GRAY));
                    });
                } else {
                    let guidance = player
                        .session()
                        .and_then(|s| s.error())
                        .map(|e| e.guidance())
                        .unwrap_or_default();
                    if !guidance.is_empty() {
                        ui.add_space(6.0);
                        for tip in guidance {
                            ui.label(egui::RichText::new(format!("• {}", tip)).color(egui::Color32::LIGHT_GRAY));
                        }
                    }
                    ui.add_space(8.0);
                    if ui.button("🔄 Retry").clicked() {
                        player.retry(now);
                    }
                }
            }
            _ if status.is_loading => {
                ui.spinner();
                ui.label(egui::RichText::new(loading_message(status)).color(egui::Color32::LIGHT_GRAY));
            }
            SessionState::Ended => {
                ui.label(egui::RichText::new("Stream ended").color(egui::Color32::GRAY));
            }
            _ if pip => {
                ui.label(egui::RichText::new("Playing in picture-in-picture").color(egui::Color32::GRAY));
            }
            _ if self.texture.is_none() && !player.capabilities().embedded_video && status.engine.is_some() => {
                let engine = status.engine.map(|e| e.label()).unwrap_or_default();
                ui.label(
                    egui::RichText::new(format!("Playing in external {} window", engine))
                        .color(egui::Color32::GRAY),
                );
            }
            _ => {}
        }
    }

    fn show_pip_window<P: EngineProvider>(&mut self, ctx: &egui::Context, player: &mut Player<P>) {
        let mut open = true;
        egui::Window::new("📺 Picture in picture")
            .open(&mut open)
            .resizable(true)
            .default_size([320.0, 180.0])
            .anchor(egui::Align2::RIGHT_BOTTOM, [-16.0, -16.0])
            .show(ctx, |ui| {
                let size = ui.available_size().max(egui::vec2(160.0, 90.0));
                let (rect, _) = ui.allocate_exact_size(size, egui::Sense::hover());
                ui.painter().rect_filled(rect, 2.0, egui::Color32::BLACK);
                self.paint_frame(ui, rect);
            });
        if !open {
            player.set_picture_in_picture(false);
        }
    }

    fn set_fullscreen<P: EngineProvider>(&self, ctx: &egui::Context, player: &mut Player<P>, fullscreen: bool) {
        player.set_fullscreen(fullscreen);
        ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
    }

    fn show_controls<P: EngineProvider>(
        &mut self,
        ctx: &egui::Context,
        ui: &mut egui::Ui,
        player: &mut Player<P>,
        status: &StreamStatus,
        now: Instant,
    ) {
        let caps = player.capabilities();
        let unsupported = "Not available with this engine";
        ui.horizontal(|ui| {
            let pause_text = if status.state == SessionState::Playing { "⏸" } else { "▶" };
            if ui
                .add_enabled(caps.pause, egui::Button::new(pause_text))
                .on_hover_text("Play / Pause")
                .on_disabled_hover_text(unsupported)
                .clicked()
            {
                player.toggle_pause();
            }

            let position = player.position().unwrap_or(self.position);
            if ui
                .add_enabled(caps.seek, egui::Button::new("⏪"))
                .on_hover_text("Back 10s")
                .on_disabled_hover_text(unsupported)
                .clicked()
            {
                player.seek(position.saturating_sub(SEEK_STEP));
            }
            if ui
                .add_enabled(caps.seek, egui::Button::new("⏩"))
                .on_hover_text("Forward 10s")
                .on_disabled_hover_text(unsupported)
                .clicked()
            {
                player.seek(position + SEEK_STEP);
            }

            ui.separator();

            // Volume set while no engine runs still applies at the next launch
            let volume_enabled = caps.volume || player.session().is_none_or(|s| s.state() == SessionState::Error);
            let settings = player.settings().clone();
            let mute_text = if settings.muted || settings.volume == 0.0 { "🔇" } else { "🔊" };
            if ui
                .add_enabled(volume_enabled, egui::Button::new(mute_text))
                .on_hover_text("Mute")
                .on_disabled_hover_text(unsupported)
                .clicked()
            {
                player.toggle_mute();
            }
            let mut volume = settings.volume;
            if ui
                .add_enabled(volume_enabled, egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false))
                .changed()
            {
                player.set_volume(volume);
            }

            ui.separator();

            if status.state == SessionState::Error && ui.button("🔄 Retry").on_hover_text("Retry now").clicked() {
                player.retry(now);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let fullscreen_text = if settings.fullscreen { "🗗 Exit fullscreen" } else { "⛶ Fullscreen" };
                if ui.button(fullscreen_text).clicked() {
                    self.set_fullscreen(ctx, player, !settings.fullscreen);
                }
                if ui
                    .selectable_label(settings.picture_in_picture, "📺 PiP")
                    .on_hover_text("Picture in picture")
                    .clicked()
                {
                    player.set_picture_in_picture(!settings.picture_in_picture);
                }
                if let Some(channel) = player.current_channel() {
                    ui.label(egui::RichText::new(&channel.name).strong());
                }
            });
        });
    }
}

/// Engine, protocol and live metrics of the current stream
pub fn show_stream_info(ui: &mut egui::Ui, status: &StreamStatus) {
    egui::Grid::new("stream_info_grid")
        .num_columns(2)
        .spacing([20.0, 6.0])
        .show(ui, |ui| {
            ui.label("Status:");
            ui.label(status.state.label());
            ui.end_row();

            ui.label("Engine:");
            ui.label(status.engine.map(|e| e.label()).unwrap_or("-"));
            ui.end_row();

            ui.label("Protocol:");
            ui.label(status.stream_kind.map(|k| k.label()).unwrap_or("-"));
            ui.end_row();

            ui.label("Quality:");
            ui.label(&status.quality);
            ui.end_row();

            ui.label("Resolution:");
            ui.label(status.resolution_label().unwrap_or_else(|| "-".to_string()));
            ui.end_row();

            ui.label("Bitrate:");
            ui.label(status.bitrate_label().unwrap_or_else(|| "-".to_string()));
            ui.end_row();

            ui.label("FPS:");
            ui.label(status.fps.map(|fps| format!("{:.0}", fps)).unwrap_or_else(|| "-".to_string()));
            ui.end_row();

            ui.label("Buffer:");
            ui.label(format!("{:.1}s", status.buffer_seconds));
            ui.end_row();

            ui.label("Connection:");
            ui.colored_label(
                quality_color(status.connection_quality),
                format!("● {}", status.connection_quality.label()),
            );
            ui.end_row();

            if status.retry_attempt > 0 {
                ui.label("Retries:");
                ui.label(retry_progress(status));
                ui.end_row();
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::StreamKind;

    #[test]
    fn test_idle_timer() {
        let start = Instant::now();
        let mut timer = IdleTimer::new(CONTROLS_IDLE_TIMEOUT);
        assert!(timer.is_idle(start));
        assert_eq!(timer.remaining(start), None);

        timer.touch(start);
        assert!(!timer.is_idle(start + Duration::from_secs(2)));
        assert_eq!(timer.remaining(start + Duration::from_secs(2)), Some(Duration::from_secs(1)));
        assert!(timer.is_idle(start + Duration::from_secs(3)));
        assert_eq!(timer.remaining(start + Duration::from_secs(3)), None);

        timer.touch(start + Duration::from_secs(4));
        assert!(!timer.is_idle(start + Duration::from_secs(5)));
    }

    #[test]
    fn test_loading_message_shows_retry_progress() {
        let mut status = StreamStatus::idle();
        assert_eq!(loading_message(&status), "Connecting to stream...");
        status.retry_attempt = 2;
        status.max_retries = 3;
        assert_eq!(loading_message(&status), "Retry attempt 2/3");
    }

    #[test]
    fn test_manual_attempts_past_ceiling_drop_the_limit() {
        let mut status = StreamStatus::idle();
        status.max_retries = 3;
        status.retry_attempt = 3;
        assert_eq!(loading_message(&status), "Retry attempt 3/3");
        status.retry_attempt = 4;
        assert_eq!(loading_message(&status), "Retry attempt 4");
        assert_eq!(retry_progress(&status), "4");
    }

    #[test]
    fn test_repaint_interval() {
        let mut status = StreamStatus::idle();
        assert_eq!(repaint_interval(&status, Capabilities::ALL), None);

        status.state = SessionState::Playing;
        assert_eq!(repaint_interval(&status, Capabilities::ALL), Some(Duration::ZERO));
        let external = Capabilities {
            embedded_video: false,
            ..Capabilities::ALL
        };
        assert_eq!(repaint_interval(&status, external), Some(BUFFER_SAMPLE_INTERVAL));

        status.state = SessionState::Error;
        status.retry_pending = true;
        assert_eq!(repaint_interval(&status, Capabilities::ALL), Some(BUFFER_SAMPLE_INTERVAL));

        status.retry_pending = false;
        status.is_loading = false;
        assert_eq!(repaint_interval(&status, Capabilities::NONE), None);
    }

    #[test]
    fn test_badge() {
        let mut status = StreamStatus::idle();
        assert_eq!(badge(&status), None);

        status.state = SessionState::Playing;
        status.stream_kind = Some(StreamKind::Hls);
        status.is_live = true;
        assert_eq!(badge(&status), Some("LIVE"));

        status.is_live = false;
        assert_eq!(badge(&status), Some("VIDEO"));

        status.state = SessionState::Error;
        assert_eq!(badge(&status), None);
    }
}
