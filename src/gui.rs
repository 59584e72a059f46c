use crate::app::{App, RunState, StatusTone};
use crate::config::{APP_NAME, APP_VERSION};
use crate::panel::{Action, ModelKind};
use crate::runner::RunPhase;
use eframe::egui;
use rfd::FileDialog;
use std::time::Duration;

// ── Color palette ──

const ACCENT_BLUE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const ACCENT_GREEN: egui::Color32 = egui::Color32::from_rgb(34, 197, 94);
const ACCENT_RED: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const ACCENT_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);
const ACCENT_CYAN: egui::Color32 = egui::Color32::from_rgb(34, 211, 238);

const BG_DARK: egui::Color32 = egui::Color32::from_rgb(15, 15, 20);
const BG_CARD: egui::Color32 = egui::Color32::from_rgb(24, 24, 32);
const BG_ELEVATED: egui::Color32 = egui::Color32::from_rgb(32, 32, 44);
const TEXT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(226, 232, 240);
const TEXT_SECONDARY: egui::Color32 = egui::Color32::from_rgb(148, 163, 184);
const BORDER_SUBTLE: egui::Color32 = egui::Color32::from_rgb(51, 51, 68);

const DATE_HINT: &str = "YYYY-MM-DD";
const LOG_REPAINT_INTERVAL: Duration = Duration::from_millis(50);

pub struct GuiApp {
    app: App,
}

impl GuiApp {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    fn apply_theme(ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        style.visuals.window_rounding = egui::Rounding::same(8.0);
        style.visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);

        style.visuals.dark_mode = true;
        style.visuals.panel_fill = BG_DARK;
        style.visuals.window_fill = BG_CARD;
        style.visuals.faint_bg_color = BG_ELEVATED;

        style.visuals.widgets.noninteractive.bg_fill = BG_CARD;
        style.visuals.widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, TEXT_SECONDARY);
        style.visuals.widgets.inactive.bg_fill = BG_ELEVATED;
        style.visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, TEXT_PRIMARY);
        style.visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(45, 45, 60);
        style.visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.active.bg_fill = ACCENT_BLUE;
        style.visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);

        style.visuals.selection.bg_fill = ACCENT_BLUE.linear_multiply(0.4);
        style.visuals.selection.stroke = egui::Stroke::new(1.0, ACCENT_BLUE);

        style.spacing.item_spacing = egui::vec2(8.0, 6.0);

        ctx.set_style(style);
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        Self::apply_theme(ctx);
        self.app.tick();

        if ctx.input(|i| i.viewport().close_requested()) {
            self.app.cancel_run();
        }

        if self.app.is_running() {
            ctx.request_repaint_after(LOG_REPAINT_INTERVAL);
        }

        // ── Top Bar ──
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add_space(8.0);
                ui.label(egui::RichText::new(APP_NAME)
                    .size(18.0)
                    .strong()
                    .color(ACCENT_BLUE));
                ui.label(egui::RichText::new(format!("v{}", APP_VERSION))
                    .size(11.0)
                    .color(TEXT_SECONDARY));

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_space(8.0);
                    let color = match self.app.status_tone {
                        StatusTone::Ok => ACCENT_GREEN,
                        StatusTone::Busy => ACCENT_CYAN,
                        StatusTone::Error => ACCENT_RED,
                    };
                    ui.label(egui::RichText::new(&self.app.status).size(13.0).strong().color(color));
                    ui.label(egui::RichText::new("Status:").size(12.0).color(TEXT_SECONDARY));
                    if let RunState::Active(phase) = &self.app.run_state {
                        ui.spinner();
                        ui.label(egui::RichText::new(phase_text(*phase)).size(11.0).color(ACCENT_YELLOW));
                    }
                });
            });
            ui.add_space(4.0);
        });

        // ── Bottom action bar ──
        egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
            ui.add_space(6.0);
            self.render_actions(ui, ctx);
            ui.add_space(6.0);
        });

        // ── Configuration ──
        egui::SidePanel::left("configuration")
            .resizable(true)
            .default_width(430.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.add_space(6.0);
                    self.render_paths_card(ui);
                    ui.add_space(6.0);
                    self.render_action_card(ui);
                    ui.add_space(6.0);
                    self.render_options_card(ui);
                    ui.add_space(6.0);
                    self.render_dates_card(ui);
                });
            });

        // ── Console ──
        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_log(ui);
        });

        self.render_notice(ctx);
    }
}

fn phase_text(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Validating => "validating",
        RunPhase::Building => "building command",
        RunPhase::Launching => "launching",
        RunPhase::Streaming => "streaming output",
    }
}

fn card<R>(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui) -> R) -> R {
    egui::Frame::none()
        .fill(BG_CARD)
        .rounding(egui::Rounding::same(8.0))
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            section_header(ui, title);
            add_contents(ui)
        })
        .inner
}

fn section_header(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text)
        .size(13.0)
        .strong()
        .color(TEXT_PRIMARY));
    ui.add_space(4.0);
}

fn hint(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text).size(10.0).color(TEXT_SECONDARY));
}

fn path_row(ui: &mut egui::Ui, label: &str, value: &mut String, browse: impl FnOnce() -> Option<std::path::PathBuf>) {
    ui.horizontal(|ui| {
        ui.add_sized([72.0, 18.0], egui::Label::new(egui::RichText::new(label).color(TEXT_SECONDARY)));
        ui.add(egui::TextEdit::singleline(value).desired_width(ui.available_width() - 80.0));
        if ui.button("Browse...").clicked() {
            if let Some(path) = browse() {
                *value = path.display().to_string();
            }
        }
    });
}

fn date_row(ui: &mut egui::Ui, label: &str, value: &mut String) {
    ui.horizontal(|ui| {
        ui.add_sized([80.0, 18.0], egui::Label::new(egui::RichText::new(label).color(TEXT_SECONDARY)));
        ui.add(egui::TextEdit::singleline(value).desired_width(100.0).hint_text(DATE_HINT));
        if ui.small_button("✕").on_hover_text("Clear (no limit)").clicked() {
            value.clear();
        }
    });
}

impl GuiApp {
    fn render_paths_card(&mut self, ui: &mut egui::Ui) {
        let cfg = &mut self.app.config;
        card(ui, "Python & Script Configuration", |ui| {
            path_row(ui, "Python exe:", &mut cfg.python_executable, || {
                FileDialog::new().set_title("Select Python executable").pick_file()
            });
            path_row(ui, "Predictor:", &mut cfg.script_path, || {
                FileDialog::new()
                    .set_title("Select predictor script")
                    .add_filter("Python files", &["py"])
                    .pick_file()
            });
            path_row(ui, "MT5 Files:", &mut cfg.mt5_files_path, || {
                FileDialog::new().set_title("Select MT5 Files Directory").pick_folder()
            });
            hint(ui, "(MT5 Terminal\\...\\MQL5\\Files directory)");
        });
    }

    fn render_action_card(&mut self, ui: &mut egui::Ui) {
        let cfg = &mut self.app.config;
        card(ui, "Basic Settings", |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Symbol:").color(TEXT_SECONDARY));
                ui.add(egui::TextEdit::singleline(&mut cfg.symbol).desired_width(90.0));
            });
            ui.add_space(4.0);
            ui.label(egui::RichText::new("Training").size(11.0).color(ACCENT_CYAN));
            for action in [Action::TrainMultiTf, Action::Train, Action::Tune] {
                ui.radio_value(&mut cfg.action, action, action.label());
            }
            ui.add_space(4.0);
            ui.label(egui::RichText::new("Prediction / Backtest").size(11.0).color(ACCENT_CYAN));
            for action in [
                Action::PredictOnce,
                Action::PredictContinuous,
                Action::Backtest,
                Action::SafeBacktest,
            ] {
                ui.radio_value(&mut cfg.action, action, action.label());
            }
        });
    }

    fn render_options_card(&mut self, ui: &mut egui::Ui) {
        let cfg = &mut self.app.config;
        card(ui, "Model & Prediction Options", |ui| {
            ui.checkbox(&mut cfg.force_retrain, "Force retrain (ignore existing models)");
            ui.horizontal_wrapped(|ui| {
                ui.label(egui::RichText::new("Models:").color(TEXT_SECONDARY));
                for model in ModelKind::ALL {
                    let mut on = cfg.has_model(model);
                    if ui.checkbox(&mut on, model.label()).changed() {
                        cfg.toggle_model(model);
                    }
                }
            });
            hint(ui, "LSTM+Transformer+LightGBM recommended for best results");
            ui.add_space(6.0);
            ui.checkbox(&mut cfg.use_kalman, "Use Kalman smoothing");
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Continuous interval (mins):").color(TEXT_SECONDARY));
                ui.add(egui::DragValue::new(&mut cfg.continuous_interval_minutes).range(1..=10_080));
            });
            hint(ui, "Interval applies to continuous mode only.");
        });
    }

    fn render_dates_card(&mut self, ui: &mut egui::Ui) {
        let cfg = &mut self.app.config;
        card(ui, "Date Range Settings", |ui| {
            ui.label(egui::RichText::new("Training window").size(11.0).strong().color(ACCENT_CYAN));
            date_row(ui, "Start date:", &mut cfg.train_start);
            date_row(ui, "End date:", &mut cfg.train_end);
            ui.add_space(4.0);
            ui.label(egui::RichText::new("Prediction / Backtest window").size(11.0).strong().color(ACCENT_CYAN));
            date_row(ui, "Start date:", &mut cfg.predict_start);
            date_row(ui, "End date:", &mut cfg.predict_end);
            ui.add_space(4.0);
            hint(ui, "Format: YYYY-MM-DD   |   Leave blank = no limit");
            ui.label(egui::RichText::new(
                "Clean out-of-sample test: set Train End = e.g. 2023-12-31, Predict Start = 2024-01-01")
                .size(10.0)
                .color(ACCENT_BLUE));
        });
    }

    fn render_actions(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let is_running = self.app.is_running();
        ui.horizontal(|ui| {
            ui.add_space(8.0);
            let run_btn = ui.add_enabled(
                !is_running,
                egui::Button::new(
                    egui::RichText::new(if is_running { "Running..." } else { "▶ Run" })
                        .size(13.0)
                        .strong()
                        .color(egui::Color32::WHITE),
                )
                .fill(if is_running { BG_ELEVATED } else { ACCENT_GREEN })
                .rounding(egui::Rounding::same(6.0)),
            );
            if run_btn.clicked() {
                self.app.trigger_run();
            }

            let cancel_btn = ui.add_enabled(
                is_running,
                egui::Button::new(egui::RichText::new("Cancel").size(13.0))
                    .fill(if is_running { ACCENT_RED } else { BG_ELEVATED })
                    .rounding(egui::Rounding::same(6.0)),
            );
            if cancel_btn.clicked() {
                self.app.cancel_run();
            }

            if ui.button("Save MT5 Path").clicked() {
                self.app.save_mt5_path();
            }
            if ui.button("Clear Log").clicked() {
                self.app.clear_log();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.add_space(8.0);
                if ui.button("Exit").clicked() {
                    self.app.cancel_run();
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }

    fn render_log(&self, ui: &mut egui::Ui) {
        section_header(ui, "Console Output");
        let row_height = ui.text_style_height(&egui::TextStyle::Monospace);
        let total = self.app.log.len();
        egui::Frame::none()
            .fill(BG_CARD)
            .rounding(egui::Rounding::same(8.0))
            .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
            .inner_margin(egui::Margin::same(8.0))
            .show(ui, |ui| {
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false, false])
                    .show_rows(ui, row_height, total, |ui, rows| {
                        for line in self.app.log.range(rows) {
                            let color = if line.starts_with("[ERR]") {
                                ACCENT_RED
                            } else if line.starts_with("[OK]") {
                                ACCENT_GREEN
                            } else if line.starts_with("[WARN]") {
                                ACCENT_YELLOW
                            } else {
                                TEXT_PRIMARY
                            };
                            ui.label(egui::RichText::new(line).monospace().size(12.0).color(color));
                        }
                    });
            });
    }

    fn render_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.app.notice.clone() else {
            return;
        };
        let color = if notice.is_error { ACCENT_RED } else { ACCENT_YELLOW };
        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_max_width(420.0);
                ui.label(egui::RichText::new(&notice.message).color(color));
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.app.notice = None;
        }
    }
}
