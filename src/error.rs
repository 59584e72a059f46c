use std::path::PathBuf;
use thiserror::Error;

/// Input that cannot be turned into a command. Raised before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be in YYYY-MM-DD format (e.g. 2024-01-01). You entered: '{value}'")]
    DateFormat { field: String, value: String },

    #[error("{field} '{value}' is not a valid calendar date.")]
    CalendarDate { field: String, value: String },

    #[error("Symbol cannot be empty.")]
    EmptySymbol,

    #[error("{start} must be earlier than {end}.")]
    DateOrder { start: &'static str, end: &'static str },

    #[error("Please select at least one model type to train.")]
    NoModelsSelected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Python executable path is invalid: {}", .0.display())]
    InvalidExecutable(PathBuf),

    #[error("Predictor script path is invalid: {}", .0.display())]
    InvalidScript(PathBuf),

    #[error("MT5 Files directory is not set.")]
    Mt5PathNotSet,

    #[error("MT5 Files directory does not exist: {}", .0.display())]
    Mt5PathMissing(PathBuf),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("FAILED to start process: {0}")]
    Launch(#[source] std::io::Error),

    #[error("a run is already in progress")]
    AlreadyRunning,
}

impl PanelError {
    /// Short title for dialogs and status lines.
    pub fn title(&self) -> &'static str {
        match self {
            PanelError::Validation(_) => "Validation error",
            PanelError::Configuration(_) => "Configuration error",
            PanelError::Launch(_) => "Launch error",
            PanelError::AlreadyRunning => "Busy",
        }
    }
}

/// Non-blocking findings surfaced to the user alongside a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryWarning {
    LookAheadBias { predict_start: String, train_end: String },
}

impl std::fmt::Display for AdvisoryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisoryWarning::LookAheadBias { predict_start, train_end } => write!(
                f,
                "Look-ahead bias: Predict Start ({}) is BEFORE Training End ({}). \
                 The model has already seen the data it is predicting on, which produces \
                 unrealistically good backtest results. For a clean out-of-sample test, \
                 set Predict Start >= Training End.",
                predict_start, train_end
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_name_field_and_value() {
        let err = ValidationError::DateFormat {
            field: "Training Start".to_string(),
            value: "2024/01/01".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Training Start"));
        assert!(msg.contains("2024/01/01"));
    }

    #[test]
    fn test_panel_error_titles() {
        let err: PanelError = ValidationError::EmptySymbol.into();
        assert_eq!(err.title(), "Validation error");
        let err: PanelError = ConfigurationError::UnknownAction("fly".into()).into();
        assert_eq!(err.title(), "Configuration error");
        assert_eq!(err.to_string(), "Unknown action: fly");
    }
}
