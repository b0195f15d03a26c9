//! IPTV Deck
//! Desktop channel directory with pluggable playback engines

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use eframe::egui;
use tracing::{error, info, warn};

mod config;
mod directory;
mod engines;
mod logging;
mod m3u_parser;
mod models;
mod playback;
mod player_view;

use config::{AppConfig, BufferProfile};
use directory::{ChannelDirectory, ALL_CATEGORIES};
use engines::SystemEngines;
use logging::ConsoleLog;
use models::{Channel, Tab};
use playback::{EngineKind, EngineOverride, Player, PlayerNotice, SessionState, StreamQuality};
use player_view::PlayerView;

/// Purple TV icon drawn at startup
fn load_icon() -> egui::IconData {
    let size: usize = 64;
    let mut rgba = vec![0u8; size * size * 4];

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 4;

            // Normalize coordinates to 0.0-1.0
            let nx = x as f32 / size as f32;
            let ny = y as f32 / size as f32;

            let corner_radius = 0.125;
            let in_rounded_rect = {
                let dx = if nx < corner_radius { corner_radius - nx }
                         else if nx > 1.0 - corner_radius { nx - (1.0 - corner_radius) }
                         else { 0.0 };
                let dy = if ny < corner_radius { corner_radius - ny }
                         else if ny > 1.0 - corner_radius { ny - (1.0 - corner_radius) }
                         else { 0.0 };
                dx * dx + dy * dy <= corner_radius * corner_radius
            };
            if !in_rounded_rect {
                continue;
            }

            let in_screen = (0.15..=0.85).contains(&nx) && (0.18..=0.70).contains(&ny);
            let in_play = {
                let px = nx - 0.43;
                let py = ny - 0.44;
                (0.0..=0.16).contains(&px) && py.abs() <= px * 0.8
            };
            let in_stand = (0.35..=0.65).contains(&nx) && (0.76..=0.82).contains(&ny);

            let (r, g, b) = if in_play {
                (102, 126, 234)
            } else if in_screen {
                (26, 26, 46)
            } else if in_stand {
                (45, 55, 72)
            } else {
                // #667eea to #764ba2
                let t = nx * 0.5 + ny * 0.5;
                (
                    (102.0 + 16.0 * t) as u8,
                    (126.0 - 51.0 * t) as u8,
                    (234.0 - 72.0 * t) as u8,
                )
            };
            rgba[idx] = r;
            rgba[idx + 1] = g;
            rgba[idx + 2] = b;
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData {
        rgba,
        width: size as u32,
        height: size as u32,
    }
}

/// Add a system emoji font so the button glyphs render
fn install_emoji_font(ctx: &egui::Context) {
    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "linux")]
    let candidates: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];
    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    let candidates: &[&str] = &[];

    let mut fonts = egui::FontDefinitions::default();
    if let Some(font_data) = candidates.iter().find_map(|path| std::fs::read(path).ok()) {
        fonts.font_data.insert(
            "emoji".to_owned(),
            egui::FontData::from_owned(font_data).into(),
        );
        fonts.families
            .entry(egui::FontFamily::Proportional)
            .or_default()
            .push("emoji".to_owned());
    }
    ctx.set_fonts(fonts);
}

/// User directory from the config, falling back to the built-in list
fn load_directory(config: &AppConfig) -> ChannelDirectory {
    if let Some(ref path) = config.channels_path {
        match ChannelDirectory::load(path) {
            Ok(directory) => return directory,
            Err(e) => warn!(error = %e, "falling back to built-in channels"),
        }
    }
    ChannelDirectory::builtin().unwrap_or_else(|e| {
        error!(error = %e, "no channel directory available");
        ChannelDirectory::default()
    })
}

fn main() -> Result<(), eframe::Error> {
    // Force X11 backend on Linux before any windowing code runs
    #[cfg(target_os = "linux")]
    {
        std::env::set_var("WINIT_UNIX_BACKEND", "x11");
        std::env::remove_var("WAYLAND_DISPLAY");
    }

    let console = ConsoleLog::new();
    logging::init(console.clone());
    info!(version = env!("CARGO_PKG_VERSION"), "IPTV Deck started");

    let config = AppConfig::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1250.0, 720.0])
            .with_min_inner_size([900.0, 550.0])
            .with_icon(load_icon()),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "IPTV Deck",
        options,
        Box::new(move |cc| {
            install_emoji_font(&cc.egui_ctx);
            // Channel logos are remote images
            egui_extras::install_image_loaders(&cc.egui_ctx);
            Ok(Box::new(IptvDeckApp::new(config, console)))
        }),
    )
}

const CHANNEL_LOGO_SIZE: f32 = 28.0;

struct IptvDeckApp {
    config: AppConfig,
    directory: ChannelDirectory,
    player: Player<SystemEngines>,
    view: PlayerView,
    console: ConsoleLog,

    current_tab: Tab,
    search_query: String,
    selected_category: String,
    status_message: String,
    suggested_engine: Option<EngineKind>,

    // Settings form
    player_path_inputs: HashMap<EngineKind, String>,
}

impl IptvDeckApp {
    fn new(config: AppConfig, console: ConsoleLog) -> Self {
        let directory = load_directory(&config);
        info!(channels = directory.len(), "channel directory ready");

        let player = Player::new(
            SystemEngines::new(config.player_paths.clone()),
            config.player_options(),
            config.player_settings(),
            config.engine_override,
        );
        let player_path_inputs = config
            .player_paths
            .iter()
            .map(|(kind, path)| (*kind, path.display().to_string()))
            .collect();

        Self {
            config,
            directory,
            player,
            view: PlayerView::new(),
            console,
            current_tab: Tab::Channels,
            search_query: String::new(),
            selected_category: ALL_CATEGORIES.to_string(),
            status_message: "Ready".to_string(),
            suggested_engine: None,
            player_path_inputs,
        }
    }

    fn save_config(&mut self) {
        self.config.store_settings(self.player.settings());
        self.config.engine_override = self.player.engine_override();
        match self.config.save() {
            Ok(()) => info!("settings saved"),
            Err(e) => {
                error!(error = %e, "failed to save settings");
                self.status_message = format!("Error: {}", e);
            }
        }
    }

    /// Push policy changes to the player; they apply from the next initialization
    fn apply_config(&mut self) {
        self.player.set_options(self.config.player_options());
        self.player
            .provider()
            .set_player_paths(self.config.player_paths.clone());
        self.save_config();
    }

    fn play_channel(&mut self, channel: Channel) {
        self.view.reset();
        self.suggested_engine = None;
        self.status_message = format!("Connecting to {}...", channel.name);
        self.player.select_channel(channel, Instant::now());
    }

    fn set_quality(&mut self, quality: StreamQuality) {
        self.view.reset();
        self.config.stream_quality = quality;
        self.player.set_quality(quality, Instant::now());
        self.save_config();
    }

    fn set_engine_override(&mut self, choice: EngineOverride) {
        self.view.reset();
        self.suggested_engine = None;
        self.player.set_engine_override(choice, Instant::now());
        self.save_config();
    }

    fn load_channels_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_title("Open channel list")
            .add_filter("Channel lists", &["json", "m3u", "m3u8"])
            .add_filter("All Files", &["*"])
            .pick_file()
        else {
            return;
        };

        match ChannelDirectory::load(&path) {
            Ok(directory) => {
                self.status_message = format!("Loaded {} channels", directory.len());
                self.directory = directory;
                self.selected_category = ALL_CATEGORIES.to_string();
                self.config.channels_path = Some(path);
                self.save_config();
            }
            Err(e) => {
                warn!(error = %e, "channel list rejected");
                self.status_message = format!("Error: {}", e);
            }
        }
    }

    fn use_builtin_channels(&mut self) {
        match ChannelDirectory::builtin() {
            Ok(directory) => {
                self.status_message = format!("Loaded {} built-in channels", directory.len());
                self.directory = directory;
                self.selected_category = ALL_CATEGORIES.to_string();
                self.config.channels_path = None;
                self.save_config();
            }
            Err(e) => error!(error = %e, "built-in channel list unavailable"),
        }
    }

    fn handle_notice(&mut self, notice: PlayerNotice) {
        match notice {
            PlayerNotice::Started { channel, engine, stream_kind } => {
                info!(%channel, engine = engine.label(), protocol = stream_kind.label(), "[PLAY] playback started");
                self.status_message = format!("Playing {} via {} ({})", channel, engine.label(), stream_kind.label());
            }
            PlayerNotice::RetryScheduled { attempt, max_retries, delay } => {
                self.status_message = format!(
                    "Connection lost, retrying in {:.1}s ({}/{})",
                    delay.as_secs_f32(),
                    attempt,
                    max_retries
                );
            }
            PlayerNotice::RetriesExhausted { channel } => {
                self.status_message = format!("{} appears to be offline", channel);
            }
            PlayerNotice::ChannelEnded { channel } => {
                info!(%channel, "stream ended");
                self.status_message = format!("{} ended", channel);
            }
            PlayerNotice::EngineUnavailable { engine, reason, fallback } => {
                self.status_message = format!("{} unavailable: {}", engine.label(), reason);
                self.suggested_engine = fallback;
            }
        }
    }

    /// Persist volume/mute/autoplay when they changed through the player controls
    fn sync_settings(&mut self) {
        let settings = self.player.settings();
        let changed = self.config.volume != settings.volume
            || self.config.muted != settings.muted
            || self.config.autoplay != settings.autoplay;
        if changed {
            self.config.store_settings(settings);
            if let Err(e) = self.config.save() {
                warn!(error = %e, "failed to persist player settings");
            }
        }
    }
}

impl eframe::App for IptvDeckApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        for notice in self.player.tick(now) {
            self.handle_notice(notice);
        }

        ctx.set_visuals(if self.config.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });

        if self.player.settings().fullscreen && ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.player.set_fullscreen(false);
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false));
        }
        // Wait for slider drags to finish before writing the config
        if !ctx.input(|i| i.pointer.any_down()) {
            self.sync_settings();
        }

        // Top panel - engine and buffering
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_space(5.0);
            ui.horizontal(|ui| {
                ui.heading("📺 IPTV Deck");
                ui.separator();

                ui.label("🎬 Engine:");
                let mut choice = self.player.engine_override();
                egui::ComboBox::from_id_salt("engine_override")
                    .selected_text(choice.to_string())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut choice, EngineOverride::Auto, "Auto");
                        for kind in EngineKind::ALL {
                            ui.selectable_value(&mut choice, EngineOverride::Engine(kind), kind.label());
                        }
                    });
                if choice != self.player.engine_override() {
                    self.set_engine_override(choice);
                }

                ui.separator();

                ui.label("📶 Connection:");
                let profile_before = (self.config.buffer_profile, self.config.buffer_seconds);
                egui::ComboBox::from_id_salt("buffer_profile")
                    .selected_text(self.config.buffer_profile.label())
                    .show_ui(ui, |ui| {
                        for profile in BufferProfile::ALL {
                            let text = match profile {
                                BufferProfile::Custom => "⚙️ Custom".to_string(),
                                _ => format!("{} ({}s)", profile.label(), profile.buffer_seconds(0)),
                            };
                            ui.selectable_value(&mut self.config.buffer_profile, profile, text);
                        }
                    });
                if self.config.buffer_profile == BufferProfile::Custom {
                    ui.label("Buffer:");
                    ui.add(egui::DragValue::new(&mut self.config.buffer_seconds)
                        .range(1..=120)
                        .suffix("s"));
                }
                ui.label(format!("({}s)", self.config.effective_buffer()));
                if profile_before != (self.config.buffer_profile, self.config.buffer_seconds) {
                    self.player.update_buffering(self.config.buffering());
                    self.save_config();
                }

                ui.separator();

                ui.label("🎞 Quality:");
                let mut quality = self.config.stream_quality;
                egui::ComboBox::from_id_salt("stream_quality")
                    .selected_text(quality.label())
                    .show_ui(ui, |ui| {
                        for option in StreamQuality::ALL {
                            ui.selectable_value(&mut quality, option, option.label());
                        }
                    })
                    .response
                    .on_hover_text("Variant picked for adaptive streams");
                if quality != self.config.stream_quality {
                    self.set_quality(quality);
                }

                ui.separator();

                let mut autoplay = self.player.settings().autoplay;
                if ui.checkbox(&mut autoplay, "▶ Autoplay").changed() {
                    self.player.set_autoplay(autoplay);
                    self.save_config();
                }
                if ui.checkbox(&mut self.config.hw_accel, "HW Acceleration")
                    .on_hover_text("GPU Decoding\n\nDisable if you experience playback issues")
                    .changed()
                {
                    self.apply_config();
                }
                if ui.checkbox(&mut self.config.dark_mode, "🌙 Dark").changed() {
                    self.save_config();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("📂 Open list").on_hover_text("Load a .json or .m3u channel list").clicked() {
                        self.load_channels_file();
                    }
                    if self.config.channels_path.is_some() && ui.button("↺ Built-in").clicked() {
                        self.use_builtin_channels();
                    }
                });
            });
            ui.add_space(5.0);
        });

        // Bottom panel - Status
        egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let status = self.player.status();
                if status.is_loading {
                    ui.spinner();
                }
                ui.label(&self.status_message);

                if let Some(engine) = self.suggested_engine {
                    if ui.button(format!("Try {}", engine.label())).clicked() {
                        self.set_engine_override(EngineOverride::Engine(engine));
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if status.state != SessionState::Idle {
                        ui.colored_label(
                            player_view::quality_color(status.connection_quality),
                            format!("● {}", status.connection_quality.label()),
                        );
                        ui.label(status.state.label());
                    }
                });
            });
        });

        egui::SidePanel::left("channels_panel")
            .resizable(true)
            .default_width(320.0)
            .min_width(240.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.current_tab, Tab::Channels, "📺 CHANNELS");
                    ui.selectable_value(&mut self.current_tab, Tab::Info, "ℹ️ INFO");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.selectable_value(&mut self.current_tab, Tab::Console, "🖥 CONSOLE");
                    });
                });
                ui.separator();

                match self.current_tab {
                    Tab::Channels => self.show_channels_tab(ui),
                    Tab::Info => self.show_info_tab(ui),
                    Tab::Console => self.show_console_tab(ui),
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.view.show(ctx, ui, &mut self.player);
        });
    }
}

impl IptvDeckApp {
    fn show_channels_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("🔍");
            ui.add(egui::TextEdit::singleline(&mut self.search_query)
                .hint_text("Search...")
                .desired_width(f32::INFINITY));
        });

        ui.horizontal_wrapped(|ui| {
            for category in self.directory.categories() {
                let selected = self.selected_category == category;
                if ui.selectable_label(selected, &category).clicked() {
                    self.selected_category = category;
                }
            }
        });
        ui.separator();

        let current_id = self.player.current_channel().map(|c| c.id.clone());
        let mut clicked: Option<Channel> = None;
        let channels = self.directory.filter(&self.search_query, &self.selected_category);
        ui.label(egui::RichText::new(format!("{} channels", channels.len())).small().color(egui::Color32::GRAY));

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for channel in channels {
                    let selected = current_id.as_deref() == Some(channel.id.as_str());
                    let response = ui
                        .horizontal(|ui| {
                            match channel.logo {
                                Some(ref logo) => {
                                    ui.add(
                                        egui::Image::new(logo.as_str())
                                            .fit_to_exact_size(egui::vec2(CHANNEL_LOGO_SIZE, CHANNEL_LOGO_SIZE))
                                            .maintain_aspect_ratio(true),
                                    );
                                }
                                None => {
                                    ui.add_sized([CHANNEL_LOGO_SIZE, CHANNEL_LOGO_SIZE], egui::Label::new("📺"));
                                }
                            }
                            ui.selectable_label(selected, egui::RichText::new(&channel.name).strong())
                        })
                        .inner;
                    let details = [channel.category.as_str(), channel.country.as_str(), channel.language.as_str()]
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(" · ");
                    if !details.is_empty() {
                        ui.label(egui::RichText::new(details).small().color(egui::Color32::GRAY));
                    }
                    if response.clicked() {
                        clicked = Some(channel.clone());
                    }
                    ui.add_space(2.0);
                }
            });

        if let Some(channel) = clicked {
            self.play_channel(channel);
        }
    }

    fn show_info_tab(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if let Some(channel) = self.player.current_channel() {
                    ui.heading(&channel.name);
                    if let Some(ref description) = channel.description {
                        ui.label(description);
                    }
                    ui.add_space(4.0);
                    egui::Grid::new("channel_grid")
                        .num_columns(2)
                        .spacing([20.0, 6.0])
                        .show(ui, |ui| {
                            ui.label("Category:");
                            ui.label(&channel.category);
                            ui.end_row();

                            ui.label("Country:");
                            ui.label(&channel.country);
                            ui.end_row();

                            ui.label("Language:");
                            ui.label(&channel.language);
                            ui.end_row();

                            ui.label("URL:");
                            ui.label(egui::RichText::new(&channel.url).small().monospace());
                            ui.end_row();
                        });
                } else {
                    ui.label("No channel selected");
                }

                ui.add_space(8.0);
                ui.heading("Stream");
                ui.separator();
                player_view::show_stream_info(ui, &self.player.status());

                ui.add_space(8.0);
                egui::CollapsingHeader::new("⚙ Playback settings").show(ui, |ui| {
                    self.show_settings(ui);
                });
            });
    }

    fn show_settings(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Default engine:");
                egui::ComboBox::from_id_salt("preferred_engine")
                    .selected_text(self.config.preferred_engine.label())
                    .show_ui(ui, |ui| {
                        for kind in EngineKind::ALL {
                            ui.selectable_value(&mut self.config.preferred_engine, kind, kind.label());
                        }
                    });
                ui.end_row();

                ui.label("Max retries:");
                ui.add(egui::DragValue::new(&mut self.config.max_retries).range(0..=10));
                ui.end_row();

                ui.label("Retry delay:");
                ui.add(egui::DragValue::new(&mut self.config.retry_base_delay_ms)
                    .range(250..=30000)
                    .suffix(" ms"));
                ui.end_row();

                ui.label("Network timeout:");
                ui.add(egui::DragValue::new(&mut self.config.network_timeout_secs)
                    .range(1..=120)
                    .suffix("s"));
                ui.end_row();

                ui.label("User agent:");
                ui.add(egui::TextEdit::singleline(&mut self.config.user_agent)
                    .hint_text(config::DEFAULT_USER_AGENT));
                ui.end_row();

                ui.label("");
                ui.checkbox(&mut self.config.pass_user_agent_to_player, "Pass user agent to player");
                ui.end_row();

                for kind in EngineKind::ALL {
                    let Some(program) = kind.program() else {
                        continue;
                    };
                    ui.label(format!("{} path:", kind.label()));
                    let input = self.player_path_inputs.entry(kind).or_default();
                    ui.add(egui::TextEdit::singleline(input).hint_text(program));
                    ui.end_row();
                }
            });

        ui.add_space(4.0);
        if ui.button("💾 Apply").on_hover_text("Applies from the next channel start").clicked() {
            self.config.player_paths = self
                .player_path_inputs
                .iter()
                .filter(|(_, path)| !path.trim().is_empty())
                .map(|(kind, path)| (*kind, PathBuf::from(path.trim())))
                .collect();
            self.apply_config();
            self.status_message = "Settings applied".to_string();
        }
    }

    fn show_console_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Console Log");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.console.clear();
                    info!("console cleared");
                }
            });
        });
        ui.separator();

        // Display log entries with monospace font
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in self.console.snapshot() {
                    let color = if line.contains("[ERROR]") {
                        egui::Color32::RED
                    } else if line.contains("[WARN]") {
                        egui::Color32::YELLOW
                    } else if line.contains("[PLAY]") {
                        egui::Color32::GREEN
                    } else if line.contains("[INFO]") {
                        egui::Color32::LIGHT_BLUE
                    } else {
                        egui::Color32::GRAY
                    };

                    ui.label(egui::RichText::new(line).monospace().color(color));
                }
            });
    }
}
