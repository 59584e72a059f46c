use crate::error::ValidationError;
use crate::panel::{Action, ModelKind, ValidatedConfig};
use crate::validation::DATE_FORMAT;
use chrono::NaiveDate;
use std::ffi::OsString;
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;

/// Subcommand token understood by the predictor script.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Train,
    TrainMultiTf,
    Tune,
    PredictMultiTf,
    Backtest,
    SafeBacktest,
}

impl Mode {
    pub fn token(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::TrainMultiTf => "train-multitf",
            Mode::Tune => "tune",
            Mode::PredictMultiTf => "predict-multitf",
            Mode::Backtest => "backtest",
            Mode::SafeBacktest => "safe-backtest",
        }
    }
}

impl From<Action> for Mode {
    fn from(action: Action) -> Self {
        match action {
            Action::Train => Mode::Train,
            Action::TrainMultiTf => Mode::TrainMultiTf,
            Action::Tune => Mode::Tune,
            Action::PredictOnce | Action::PredictContinuous => Mode::PredictMultiTf,
            Action::Backtest => Mode::Backtest,
            Action::SafeBacktest => Mode::SafeBacktest,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptArg {
    Symbol(String),
    TrainStart(NaiveDate),
    TrainEnd(NaiveDate),
    PredictStart(NaiveDate),
    PredictEnd(NaiveDate),
    Models(Vec<ModelKind>),
    Force,
    NoKalman,
    Continuous,
    Interval(NonZeroU32),
}

impl ScriptArg {
    fn push_tokens(&self, out: &mut Vec<String>) {
        let date = |d: &NaiveDate| d.format(DATE_FORMAT).to_string();
        match self {
            ScriptArg::Symbol(s) => out.extend(["--symbol".to_string(), s.clone()]),
            ScriptArg::TrainStart(d) => out.extend(["--train-start".to_string(), date(d)]),
            ScriptArg::TrainEnd(d) => out.extend(["--train-end".to_string(), date(d)]),
            ScriptArg::PredictStart(d) => out.extend(["--predict-start".to_string(), date(d)]),
            ScriptArg::PredictEnd(d) => out.extend(["--predict-end".to_string(), date(d)]),
            ScriptArg::Models(models) => {
                out.push("--models".to_string());
                out.extend(models.iter().map(|m| m.token().to_string()));
            }
            ScriptArg::Force => out.push("--force".to_string()),
            ScriptArg::NoKalman => out.push("--no-kalman".to_string()),
            ScriptArg::Continuous => out.push("--continuous".to_string()),
            ScriptArg::Interval(n) => out.extend(["--interval".to_string(), n.to_string()]),
        }
    }
}

/// A fully built invocation: `<python> -u <script> <mode> <args...>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptCommand {
    program: PathBuf,
    script: PathBuf,
    mode: Mode,
    args: Vec<ScriptArg>,
}

impl ScriptCommand {
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Everything after the program name.
    pub fn arguments(&self) -> Vec<OsString> {
        let mut out: Vec<OsString> = vec!["-u".into(), self.script.clone().into_os_string()];
        out.extend(self.script_tokens().into_iter().map(OsString::from));
        out
    }

    fn script_tokens(&self) -> Vec<String> {
        let mut out = vec![self.mode.token().to_string()];
        for arg in &self.args {
            arg.push_tokens(&mut out);
        }
        out
    }

    /// Program plus arguments as display strings.
    pub fn tokens(&self) -> Vec<String> {
        let mut out = vec![
            self.program.display().to_string(),
            "-u".to_string(),
            self.script.display().to_string(),
        ];
        out.extend(self.script_tokens());
        out
    }
}

impl fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self
            .tokens()
            .into_iter()
            .map(|t| {
                if t.is_empty() || t.contains(char::is_whitespace) {
                    format!("\"{}\"", t)
                } else {
                    t
                }
            })
            .collect();
        f.write_str(&quoted.join(" "))
    }
}

/// Maps a validated configuration to the script invocation. Pure: the same
/// input always produces the same command.
pub fn build_command(cfg: &ValidatedConfig) -> Result<ScriptCommand, ValidationError> {
    let action = cfg.action;
    let mut args = vec![ScriptArg::Symbol(cfg.symbol.clone())];

    if action.is_training() {
        args.extend(cfg.train_start.map(ScriptArg::TrainStart));
        args.extend(cfg.train_end.map(ScriptArg::TrainEnd));
    }

    if action.is_backtest() {
        args.extend(cfg.predict_start.map(ScriptArg::PredictStart));
        args.extend(cfg.predict_end.map(ScriptArg::PredictEnd));
    }

    if action.is_training() {
        if cfg.models.is_empty() {
            return Err(ValidationError::NoModelsSelected);
        }
        args.push(ScriptArg::Models(cfg.models.clone()));
        if cfg.force_retrain {
            args.push(ScriptArg::Force);
        }
    }

    if action.is_prediction() {
        if !cfg.models.is_empty() {
            args.push(ScriptArg::Models(cfg.models.clone()));
        }
        if !cfg.use_kalman {
            args.push(ScriptArg::NoKalman);
        }
        if action == Action::PredictContinuous {
            args.push(ScriptArg::Continuous);
            args.push(ScriptArg::Interval(cfg.interval_minutes));
        }
    }

    Ok(ScriptCommand {
        program: cfg.python_executable.clone(),
        script: cfg.script_path.clone(),
        mode: action.into(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn validated(action: Action) -> ValidatedConfig {
        ValidatedConfig {
            python_executable: PathBuf::from("/usr/bin/python3"),
            script_path: PathBuf::from("/opt/predictor/predictor.py"),
            symbol: "EURUSD".to_string(),
            action,
            models: ModelKind::ALL.to_vec(),
            force_retrain: false,
            use_kalman: true,
            interval_minutes: NonZeroU32::new(60).unwrap(),
            train_start: None,
            train_end: None,
            predict_start: None,
            predict_end: None,
            warnings: Vec::new(),
        }
    }

    fn contains_seq(tokens: &[String], seq: &[&str]) -> bool {
        tokens.windows(seq.len()).any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
    }

    #[test]
    fn test_prefix_is_interpreter_unbuffered_script_mode_symbol() {
        let cmd = build_command(&validated(Action::Tune)).unwrap();
        assert_eq!(
            cmd.tokens(),
            vec!["/usr/bin/python3", "-u", "/opt/predictor/predictor.py", "tune", "--symbol", "EURUSD"]
        );
    }

    #[test]
    fn test_action_to_mode_table() {
        let expected = [
            (Action::Train, "train"),
            (Action::TrainMultiTf, "train-multitf"),
            (Action::Tune, "tune"),
            (Action::PredictOnce, "predict-multitf"),
            (Action::PredictContinuous, "predict-multitf"),
            (Action::Backtest, "backtest"),
            (Action::SafeBacktest, "safe-backtest"),
        ];
        for (action, mode) in expected {
            let cmd = build_command(&validated(action)).unwrap();
            assert_eq!(cmd.tokens()[3], mode, "mode for {action}");
        }
    }

    #[test]
    fn test_train_multitf_with_selected_models_and_force() {
        let mut cfg = validated(Action::TrainMultiTf);
        cfg.symbol = "EURUSD".to_string();
        cfg.models = vec![ModelKind::Lstm, ModelKind::Lgbm];
        cfg.force_retrain = true;
        let tokens = build_command(&cfg).unwrap().tokens();
        assert_eq!(tokens[3], "train-multitf");
        assert!(contains_seq(&tokens, &["--symbol", "EURUSD"]));
        assert!(contains_seq(&tokens, &["--models", "lstm", "lgbm", "--force"]));
    }

    #[test]
    fn test_training_requires_a_model() {
        let mut cfg = validated(Action::Train);
        cfg.models.clear();
        assert_eq!(build_command(&cfg), Err(ValidationError::NoModelsSelected));

        // Prediction modes simply omit the flag.
        let mut cfg = validated(Action::PredictOnce);
        cfg.models.clear();
        let tokens = build_command(&cfg).unwrap().tokens();
        assert!(!tokens.contains(&"--models".to_string()));
    }

    #[test]
    fn test_force_only_when_requested() {
        let tokens = build_command(&validated(Action::Train)).unwrap().tokens();
        assert!(!tokens.contains(&"--force".to_string()));
    }

    #[test]
    fn test_continuous_prediction_flags() {
        let mut cfg = validated(Action::PredictContinuous);
        cfg.use_kalman = false;
        cfg.interval_minutes = NonZeroU32::new(30).unwrap();
        let tokens = build_command(&cfg).unwrap().tokens();
        assert!(contains_seq(&tokens, &["--continuous", "--interval", "30"]));
        assert!(tokens.contains(&"--no-kalman".to_string()));

        cfg.use_kalman = true;
        let tokens = build_command(&cfg).unwrap().tokens();
        assert!(!tokens.contains(&"--no-kalman".to_string()));
        assert!(contains_seq(&tokens, &["--interval", "30"]));
    }

    #[test]
    fn test_one_shot_prediction_has_no_interval() {
        let tokens = build_command(&validated(Action::PredictOnce)).unwrap().tokens();
        assert!(!tokens.contains(&"--continuous".to_string()));
        assert!(!tokens.contains(&"--interval".to_string()));
    }

    #[test]
    fn test_dates_only_for_matching_action_family() {
        let mut cfg = validated(Action::Train);
        cfg.train_start = Some(date("2020-01-01"));
        cfg.train_end = Some(date("2023-12-31"));
        cfg.predict_start = Some(date("2024-01-01"));
        let tokens = build_command(&cfg).unwrap().tokens();
        assert!(contains_seq(&tokens, &["--train-start", "2020-01-01", "--train-end", "2023-12-31"]));
        assert!(!tokens.contains(&"--predict-start".to_string()));

        cfg.action = Action::SafeBacktest;
        let tokens = build_command(&cfg).unwrap().tokens();
        assert!(contains_seq(&tokens, &["--predict-start", "2024-01-01"]));
        assert!(!tokens.contains(&"--predict-end".to_string()));
        assert!(!tokens.contains(&"--train-start".to_string()));
        assert!(!tokens.contains(&"--models".to_string()));

        cfg.action = Action::Tune;
        assert_eq!(build_command(&cfg).unwrap().tokens().len(), 6);
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut cfg = validated(Action::PredictContinuous);
        cfg.models = vec![ModelKind::Gru, ModelKind::Tcn];
        let a = build_command(&cfg).unwrap();
        let b = build_command(&cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tokens(), b.tokens());
    }

    #[test]
    fn test_display_quotes_paths_with_spaces() {
        let mut cfg = validated(Action::Tune);
        cfg.script_path = PathBuf::from("/opt/my scripts/predictor.py");
        let line = build_command(&cfg).unwrap().to_string();
        assert!(line.contains("\"/opt/my scripts/predictor.py\""));
    }

    #[test]
    fn test_arguments_skip_program() {
        let cmd = build_command(&validated(Action::Tune)).unwrap();
        let args = cmd.arguments();
        assert_eq!(args[0], OsString::from("-u"));
        assert_eq!(args.len(), cmd.tokens().len() - 1);
    }
}
