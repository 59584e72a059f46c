use crate::config;
use crate::error::{AdvisoryWarning, ConfigurationError};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

/// High-level operation picked in the panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Action {
    Train,
    #[default]
    TrainMultiTf,
    Tune,
    PredictOnce,
    PredictContinuous,
    Backtest,
    SafeBacktest,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::TrainMultiTf,
        Action::Train,
        Action::Tune,
        Action::PredictOnce,
        Action::PredictContinuous,
        Action::Backtest,
        Action::SafeBacktest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Train => "train",
            Action::TrainMultiTf => "train-multitf",
            Action::Tune => "tune",
            Action::PredictOnce => "predict-mtf-once",
            Action::PredictContinuous => "predict-mtf-cont",
            Action::Backtest => "backtest",
            Action::SafeBacktest => "safe-backtest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::TrainMultiTf => "Train ALL models (multi-TF) [RECOMMENDED]",
            Action::Train => "Train main ensemble (single config)",
            Action::Tune => "Hyperparameter tuning",
            Action::PredictOnce => "Predict ONCE for EA (multi-TF JSON)",
            Action::PredictContinuous => "Predict CONTINUOUSLY (multi-TF JSON)",
            Action::Backtest => "Generate backtest predictions",
            Action::SafeBacktest => "Safe backtest (walk-forward, anti-leakage)",
        }
    }

    pub fn is_training(self) -> bool {
        matches!(self, Action::Train | Action::TrainMultiTf)
    }

    pub fn is_backtest(self) -> bool {
        matches!(self, Action::Backtest | Action::SafeBacktest)
    }

    pub fn is_prediction(self) -> bool {
        matches!(self, Action::PredictOnce | Action::PredictContinuous)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| ConfigurationError::UnknownAction(wanted.to_string()))
    }
}

/// Model families understood by the predictor script. Variant order is the
/// order tokens are emitted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKind {
    Lstm,
    Gru,
    Transformer,
    Tcn,
    Lgbm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Lstm,
        ModelKind::Gru,
        ModelKind::Transformer,
        ModelKind::Tcn,
        ModelKind::Lgbm,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ModelKind::Lstm => "lstm",
            ModelKind::Gru => "gru",
            ModelKind::Transformer => "transformer",
            ModelKind::Tcn => "tcn",
            ModelKind::Lgbm => "lgbm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Lstm => "LSTM",
            ModelKind::Gru => "GRU",
            ModelKind::Transformer => "Transformer",
            ModelKind::Tcn => "TCN",
            ModelKind::Lgbm => "LightGBM",
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ModelKind::ALL
            .into_iter()
            .find(|m| m.token() == wanted)
            .ok_or_else(|| format!("unknown model '{}' (expected lstm, gru, transformer, tcn or lgbm)", s.trim()))
    }
}

/// Editable form state. Text fields hold exactly what the user typed; nothing
/// here is validated until a run is requested.
#[derive(Clone, Debug)]
pub struct PanelConfig {
    pub symbol: String,
    pub action: Action,
    pub models: BTreeSet<ModelKind>,
    pub force_retrain: bool,
    pub use_kalman: bool,
    pub continuous_interval_minutes: u32,
    pub train_start: String,
    pub train_end: String,
    pub predict_start: String,
    pub predict_end: String,
    pub python_executable: String,
    pub script_path: String,
    pub mt5_files_path: String,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            symbol: config::DEFAULT_SYMBOL.to_string(),
            action: Action::default(),
            models: ModelKind::ALL.into_iter().collect(),
            force_retrain: true,
            use_kalman: true,
            continuous_interval_minutes: config::DEFAULT_INTERVAL_MINUTES,
            train_start: String::new(),
            train_end: String::new(),
            predict_start: String::new(),
            predict_end: String::new(),
            python_executable: config::default_python_executable()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            script_path: config::default_script_path().display().to_string(),
            mt5_files_path: String::new(),
        }
    }
}

impl PanelConfig {
    pub fn toggle_model(&mut self, model: ModelKind) {
        if !self.models.remove(&model) {
            self.models.insert(model);
        }
    }

    pub fn has_model(&self, model: ModelKind) -> bool {
        self.models.contains(&model)
    }
}

/// A configuration that passed every check. Only this type can be turned into
/// a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub python_executable: PathBuf,
    pub script_path: PathBuf,
    pub symbol: String,
    pub action: Action,
    pub models: Vec<ModelKind>,
    pub force_retrain: bool,
    pub use_kalman: bool,
    pub interval_minutes: NonZeroU32,
    pub train_start: Option<NaiveDate>,
    pub train_end: Option<NaiveDate>,
    pub predict_start: Option<NaiveDate>,
    pub predict_end: Option<NaiveDate>,
    pub warnings: Vec<AdvisoryWarning>,
}
