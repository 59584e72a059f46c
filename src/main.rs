mod app;
mod command;
mod config;
mod error;
mod gui;
mod panel;
mod runner;
mod settings;
mod tui;
mod ui;
mod validation;

use anyhow::{bail, Context, Result};
use app::{banner_lines, footer_lines, App};
use clap::{Parser, ValueEnum};
use panel::{Action, ModelKind, PanelConfig};
use runner::{start_run, RunMessage, RunOutcome, RunSlot};
use settings::SettingsStore;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum GuiRendererChoice {
    Auto,
    Wgpu,
    Glow,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Predictor Panel: configure, launch and watch an external prediction/training script",
    after_help = "EXAMPLES:
    # Terminal control panel (default)
    predictor-panel

    # Desktop control panel
    predictor-panel --gui

    # One-shot run, streaming the script output to stdout
    predictor-panel --headless --action train-multitf --symbol eurusd --models lstm,lgbm \\
        --train-end 2023-12-31 --mt5-path ~/MQL5/Files

    # Remember the MT5 Files directory
    predictor-panel --headless --mt5-path ~/MQL5/Files --save-mt5-path"
)]
struct Args {
    /// Launch the desktop (egui) panel
    #[arg(long, conflicts_with = "headless")]
    gui: bool,

    /// Run once from the flags below without any UI and exit with the script's status
    #[arg(long)]
    headless: bool,

    /// GUI renderer backend (auto|wgpu|glow). Useful for RDP compatibility.
    #[arg(long, value_enum, default_value_t = GuiRendererChoice::Wgpu)]
    gui_renderer: GuiRendererChoice,

    /// Enable GUI safe mode for remote desktop (disables vsync/MSAA and hardware acceleration).
    #[arg(long)]
    gui_safe_mode: bool,

    /// Trading symbol, e.g. EURUSD (upper-cased before use)
    #[arg(long)]
    symbol: Option<String>,

    /// train | train-multitf | tune | predict-mtf-once | predict-mtf-cont | backtest | safe-backtest
    #[arg(long, value_parser = parse_action)]
    action: Option<Action>,

    /// Comma-separated models: lstm,gru,transformer,tcn,lgbm (default: all)
    #[arg(long, value_delimiter = ',', value_parser = parse_model)]
    models: Option<Vec<ModelKind>>,

    /// Do not pass --force to training runs
    #[arg(long)]
    no_force: bool,

    /// Disable Kalman smoothing for prediction runs
    #[arg(long)]
    no_kalman: bool,

    /// Minutes between predictions in continuous mode (minimum 1)
    #[arg(long)]
    interval: Option<u32>,

    #[arg(long)]
    train_start: Option<String>,

    #[arg(long)]
    train_end: Option<String>,

    #[arg(long)]
    predict_start: Option<String>,

    #[arg(long)]
    predict_end: Option<String>,

    /// Python interpreter (default: PREDICTOR_PANEL_PYTHON or the first python on PATH)
    #[arg(long)]
    python: Option<PathBuf>,

    /// Predictor script (default: PREDICTOR_PANEL_SCRIPT or a known script next to the binary)
    #[arg(long)]
    script: Option<PathBuf>,

    /// MT5 terminal's MQL5\Files directory (default: the saved setting)
    #[arg(long)]
    mt5_path: Option<PathBuf>,

    /// Persist --mt5-path to the settings file
    #[arg(long, requires = "mt5_path")]
    save_mt5_path: bool,

    /// Settings file (default: PREDICTOR_PANEL_SETTINGS or ./config.json)
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn parse_action(s: &str) -> Result<Action, String> {
    s.parse::<Action>().map_err(|e| e.to_string())
}

fn parse_model(s: &str) -> Result<ModelKind, String> {
    s.parse::<ModelKind>()
}

impl Args {
    fn panel_config(&self) -> PanelConfig {
        let mut cfg = PanelConfig::default();
        if let Some(symbol) = &self.symbol {
            cfg.symbol = symbol.clone();
        }
        if let Some(action) = self.action {
            cfg.action = action;
        }
        if let Some(models) = &self.models {
            cfg.models = models.iter().copied().collect();
        }
        cfg.force_retrain = !self.no_force;
        cfg.use_kalman = !self.no_kalman;
        if let Some(interval) = self.interval {
            cfg.continuous_interval_minutes = interval;
        }
        for (value, target) in [
            (&self.train_start, &mut cfg.train_start),
            (&self.train_end, &mut cfg.train_end),
            (&self.predict_start, &mut cfg.predict_start),
            (&self.predict_end, &mut cfg.predict_end),
        ] {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        if let Some(python) = &self.python {
            cfg.python_executable = python.display().to_string();
        }
        if let Some(script) = &self.script {
            cfg.script_path = script.display().to_string();
        }
        if let Some(mt5) = &self.mt5_path {
            cfg.mt5_files_path = mt5.display().to_string();
        }
        cfg
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    Stdout,
    Stderr,
    File,
}

fn init_logging(target: LogTarget) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("predictor_panel=info,wgpu_core=error,wgpu_hal=error")
    });
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    match target {
        LogTarget::Stdout => builder.init(),
        LogTarget::Stderr => builder.with_writer(std::io::stderr).init(),
        LogTarget::File => {
            // The terminal UI owns the screen, so diagnostics go to a file.
            let path = config::log_file_path();
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
    }
    Ok(())
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Succeeded => 0,
        RunOutcome::Failed { code } => code.unwrap_or(1),
        RunOutcome::Cancelled => 130,
    }
}

async fn run_headless(cfg: PanelConfig) -> Result<i32> {
    let slot = RunSlot::default();
    let mut handle = start_run(cfg, &slot)?;

    loop {
        tokio::select! {
            msg = handle.rx.recv() => match msg {
                Some(RunMessage::Phase(_)) => {}
                Some(RunMessage::Warning(w)) => eprintln!("WARNING: {}", w),
                Some(RunMessage::Started { command_line }) => {
                    for line in banner_lines(&command_line) {
                        println!("{}", line);
                    }
                }
                Some(RunMessage::Line(line)) => println!("{}", line),
                Some(RunMessage::Finished(outcome)) => {
                    for line in footer_lines(&outcome) {
                        println!("{}", line);
                    }
                    return Ok(exit_code(&outcome));
                }
                Some(RunMessage::Error { title, message }) => {
                    eprintln!("{}: {}", title, message);
                    return Ok(1);
                }
                None => bail!("run worker stopped without reporting a result"),
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; stopping the script");
                handle.cancel.cancel();
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let target = if args.headless {
        LogTarget::Stderr
    } else if args.gui {
        LogTarget::Stdout
    } else {
        LogTarget::File
    };
    init_logging(target)?;

    let store = SettingsStore::new(args.settings.clone().unwrap_or_else(config::settings_file_path));

    if args.save_mt5_path {
        let raw = args.panel_config().mt5_files_path;
        match store.save_mt5_path(&raw) {
            Ok(path) => info!("MT5 path saved: {}", path.display()),
            Err(e) => {
                error!("Failed to save MT5 path: {:#}", e);
                std::process::exit(1);
            }
        }
        if args.headless && args.action.is_none() {
            return Ok(());
        }
    }

    if args.headless {
        let mut cfg = args.panel_config();
        if cfg.mt5_files_path.trim().is_empty() {
            match store.load() {
                Ok(saved) => cfg.mt5_files_path = saved.mt5_files_path,
                Err(e) => warn!("Could not load MT5 path from settings: {:#}", e),
            }
        }
        let code = run_headless(cfg).await?;
        std::process::exit(code);
    }

    let app = App::new(args.panel_config(), store);

    if args.gui {
        let mut options = eframe::NativeOptions::default();
        options.renderer = match args.gui_renderer {
            GuiRendererChoice::Auto => eframe::Renderer::Wgpu,
            GuiRendererChoice::Wgpu => eframe::Renderer::Wgpu,
            GuiRendererChoice::Glow => eframe::Renderer::Glow,
        };

        if args.gui_safe_mode {
            options.vsync = false;
            options.multisampling = 0;
            options.depth_buffer = 0;
            options.stencil_buffer = 0;
            options.hardware_acceleration = eframe::HardwareAcceleration::Off;
        }

        info!(
            "Launching GUI with renderer: {:?}, safe_mode={}",
            args.gui_renderer,
            args.gui_safe_mode
        );
        eframe::run_native(
            config::APP_NAME,
            options,
            Box::new(|_cc| Ok(Box::new(gui::GuiApp::new(app)))),
        )
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        return Ok(());
    }

    let mut terminal = tui::init()?;
    let mut app = app;
    let res = app.run(&mut terminal).await;

    tui::restore()?;

    if let Err(e) = res {
        error!("Error: {:?}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_overlay_defaults() {
        let args = Args::try_parse_from([
            "predictor-panel",
            "--headless",
            "--action",
            "predict-mtf-cont",
            "--symbol",
            "eurusd",
            "--models",
            "lgbm,lstm",
            "--no-kalman",
            "--interval",
            "30",
            "--predict-start",
            "2024-01-01",
        ])
        .unwrap();
        let cfg = args.panel_config();
        assert_eq!(cfg.action, Action::PredictContinuous);
        assert_eq!(cfg.symbol, "eurusd");
        assert_eq!(cfg.models.iter().copied().collect::<Vec<_>>(), vec![ModelKind::Lstm, ModelKind::Lgbm]);
        assert!(!cfg.use_kalman);
        assert!(cfg.force_retrain);
        assert_eq!(cfg.continuous_interval_minutes, 30);
        assert_eq!(cfg.predict_start, "2024-01-01");
        assert!(cfg.train_end.is_empty());
    }

    #[test]
    fn test_unknown_action_rejected_by_cli() {
        let err = Args::try_parse_from(["predictor-panel", "--action", "predict"]).unwrap_err();
        assert!(err.to_string().contains("Unknown action: predict"));
    }

    #[test]
    fn test_save_flag_requires_path() {
        assert!(Args::try_parse_from(["predictor-panel", "--save-mt5-path"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&RunOutcome::Succeeded), 0);
        assert_eq!(exit_code(&RunOutcome::Failed { code: Some(2) }), 2);
        assert_eq!(exit_code(&RunOutcome::Failed { code: None }), 1);
        assert_eq!(exit_code(&RunOutcome::Cancelled), 130);
    }
}
