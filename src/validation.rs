use crate::error::{AdvisoryWarning, ConfigurationError, PanelError, ValidationError};
use crate::panel::{PanelConfig, ValidatedConfig};
use chrono::NaiveDate;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const TRAIN_START_FIELD: &str = "Training Start";
pub const TRAIN_END_FIELD: &str = "Training End";
pub const PREDICT_START_FIELD: &str = "Predict Start";
pub const PREDICT_END_FIELD: &str = "Predict End";

/// Strict `YYYY-MM-DD`. chrono alone accepts single-digit months and days.
fn matches_date_pattern(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Returns the trimmed date, or an empty string for "no limit".
pub fn validate_date(value: &str, field: &str) -> Result<String, ValidationError> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(String::new());
    }
    if !matches_date_pattern(v) {
        return Err(ValidationError::DateFormat {
            field: field.to_string(),
            value: v.to_string(),
        });
    }
    NaiveDate::parse_from_str(v, DATE_FORMAT).map_err(|_| ValidationError::CalendarDate {
        field: field.to_string(),
        value: v.to_string(),
    })?;
    Ok(v.to_string())
}

fn parse_date_field(value: &str, field: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let v = validate_date(value, field)?;
    if v.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(&v, DATE_FORMAT)
        .map(Some)
        .map_err(|_| ValidationError::CalendarDate {
            field: field.to_string(),
            value: v,
        })
}

fn ensure_ordered(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    start_field: &'static str,
    end_field: &'static str,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(s), Some(e)) if s >= e => Err(ValidationError::DateOrder {
            start: start_field,
            end: end_field,
        }),
        _ => Ok(()),
    }
}

fn existing_file(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = PathBuf::from(trimmed);
    path.is_file().then_some(path)
}

/// Checks everything needed to build a command, in a fixed order so the first
/// problem reported is always the same one.
pub fn validate_configuration(config: &PanelConfig) -> Result<ValidatedConfig, PanelError> {
    let python_executable = existing_file(&config.python_executable).ok_or_else(|| {
        ConfigurationError::InvalidExecutable(PathBuf::from(config.python_executable.trim()))
    })?;
    let script_path = existing_file(&config.script_path)
        .ok_or_else(|| ConfigurationError::InvalidScript(PathBuf::from(config.script_path.trim())))?;

    let symbol = config.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ValidationError::EmptySymbol.into());
    }

    let train_start = parse_date_field(&config.train_start, TRAIN_START_FIELD)?;
    let train_end = parse_date_field(&config.train_end, TRAIN_END_FIELD)?;
    let predict_start = parse_date_field(&config.predict_start, PREDICT_START_FIELD)?;
    let predict_end = parse_date_field(&config.predict_end, PREDICT_END_FIELD)?;

    ensure_ordered(train_start, train_end, TRAIN_START_FIELD, TRAIN_END_FIELD)?;
    ensure_ordered(predict_start, predict_end, PREDICT_START_FIELD, PREDICT_END_FIELD)?;

    let mut warnings = Vec::new();
    if let (Some(te), Some(ps)) = (train_end, predict_start) {
        if ps < te {
            let warning = AdvisoryWarning::LookAheadBias {
                predict_start: ps.format(DATE_FORMAT).to_string(),
                train_end: te.format(DATE_FORMAT).to_string(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
    }

    Ok(ValidatedConfig {
        python_executable,
        script_path,
        symbol,
        action: config.action,
        models: config.models.iter().copied().collect(),
        force_retrain: config.force_retrain,
        use_kalman: config.use_kalman,
        interval_minutes: NonZeroU32::new(config.continuous_interval_minutes.max(1))
            .unwrap_or(NonZeroU32::MIN),
        train_start,
        train_end,
        predict_start,
        predict_end,
        warnings,
    })
}

/// The MT5 files directory has to be configured before any run.
pub fn check_mt5_path(raw: &str) -> Result<PathBuf, ConfigurationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::Mt5PathNotSet);
    }
    let path = Path::new(trimmed);
    if !path.is_dir() {
        return Err(ConfigurationError::Mt5PathMissing(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::panel::Action;
    use std::path::PathBuf;

    /// Creates a scratch directory holding fake interpreter and script files.
    pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "predictor_panel_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn valid_config(tag: &str) -> (PanelConfig, PathBuf) {
        let dir = scratch_dir(tag);
        let python = dir.join("python");
        let script = dir.join("predictor.py");
        std::fs::write(&python, "").unwrap();
        std::fs::write(&script, "").unwrap();
        let cfg = PanelConfig {
            python_executable: python.display().to_string(),
            script_path: script.display().to_string(),
            mt5_files_path: dir.display().to_string(),
            ..PanelConfig::default()
        };
        (cfg, dir)
    }

    #[test]
    fn test_validate_date_accepts_real_dates_unchanged() {
        for d in ["2024-01-01", "2023-12-31", "2024-02-29", "1999-07-15"] {
            assert_eq!(validate_date(d, "Field").unwrap(), d);
        }
    }

    #[test]
    fn test_validate_date_empty_means_no_limit() {
        assert_eq!(validate_date("", "Field").unwrap(), "");
        assert_eq!(validate_date("   \t", "Field").unwrap(), "");
    }

    #[test]
    fn test_validate_date_rejects_bad_pattern() {
        for bad in ["2024/01/01", "24-01-01", "2024-1-01", "2024-01-1", "abcd-ef-gh", "2024-01-01x", "20240101"] {
            match validate_date(bad, "Predict End") {
                Err(ValidationError::DateFormat { field, value }) => {
                    assert_eq!(field, "Predict End");
                    assert_eq!(value, bad);
                }
                other => panic!("expected format error for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_date_rejects_impossible_calendar_dates() {
        for bad in ["2023-02-29", "2024-13-01", "2024-04-31", "2024-00-10"] {
            assert!(matches!(
                validate_date(bad, "Training End"),
                Err(ValidationError::CalendarDate { .. })
            ));
        }
    }

    #[test]
    fn test_validate_date_trims_surrounding_whitespace() {
        assert_eq!(validate_date("  2024-01-01 ", "Field").unwrap(), "2024-01-01");
    }

    #[test]
    fn test_paths_checked_before_everything_else() {
        let (mut cfg, dir) = valid_config("paths");
        cfg.symbol = String::new();
        cfg.python_executable = dir.join("missing-python").display().to_string();
        assert!(matches!(
            validate_configuration(&cfg),
            Err(PanelError::Configuration(ConfigurationError::InvalidExecutable(_)))
        ));

        let (mut cfg, dir) = valid_config("script");
        cfg.script_path = dir.display().to_string();
        assert!(matches!(
            validate_configuration(&cfg),
            Err(PanelError::Configuration(ConfigurationError::InvalidScript(_)))
        ));
    }

    #[test]
    fn test_symbol_is_trimmed_and_upper_cased() {
        let (mut cfg, _dir) = valid_config("symbol");
        cfg.symbol = "  gbpjpy ".to_string();
        assert_eq!(validate_configuration(&cfg).unwrap().symbol, "GBPJPY");

        cfg.symbol = "   ".to_string();
        assert!(matches!(
            validate_configuration(&cfg),
            Err(PanelError::Validation(ValidationError::EmptySymbol))
        ));
    }

    #[test]
    fn test_date_pairs_must_be_strictly_ordered() {
        let (mut cfg, _dir) = valid_config("order");
        cfg.train_start = "2024-01-01".to_string();
        cfg.train_end = "2024-01-01".to_string();
        assert!(matches!(
            validate_configuration(&cfg),
            Err(PanelError::Validation(ValidationError::DateOrder { start: TRAIN_START_FIELD, .. }))
        ));

        cfg.train_end = "2023-06-01".to_string();
        assert!(validate_configuration(&cfg).is_err());

        cfg.train_end = String::new();
        assert!(validate_configuration(&cfg).is_ok());

        cfg.predict_start = "2024-05-02".to_string();
        cfg.predict_end = "2024-05-01".to_string();
        assert!(matches!(
            validate_configuration(&cfg),
            Err(PanelError::Validation(ValidationError::DateOrder { start: PREDICT_START_FIELD, .. }))
        ));
    }

    #[test]
    fn test_look_ahead_bias_is_only_a_warning() {
        let (mut cfg, _dir) = valid_config("lookahead");
        cfg.action = Action::Backtest;
        cfg.train_end = "2023-12-31".to_string();
        cfg.predict_start = "2023-06-01".to_string();
        let validated = validate_configuration(&cfg).unwrap();
        assert_eq!(
            validated.warnings,
            vec![AdvisoryWarning::LookAheadBias {
                predict_start: "2023-06-01".to_string(),
                train_end: "2023-12-31".to_string(),
            }]
        );

        let command = crate::command::build_command(&validated).unwrap();
        let tokens = command.tokens();
        assert!(tokens.windows(2).any(|w| w == ["--predict-start", "2023-06-01"]));
        assert!(!tokens.iter().any(|t| t == "--train-end"));
        assert_eq!(tokens[3], "backtest");

        cfg.predict_start = "2024-01-01".to_string();
        assert!(validate_configuration(&cfg).unwrap().warnings.is_empty());
    }

    #[test]
    fn test_interval_is_clamped_to_one() {
        let (mut cfg, _dir) = valid_config("interval");
        cfg.continuous_interval_minutes = 0;
        assert_eq!(validate_configuration(&cfg).unwrap().interval_minutes.get(), 1);
    }

    #[test]
    fn test_check_mt5_path() {
        assert_eq!(check_mt5_path("  "), Err(ConfigurationError::Mt5PathNotSet));
        let dir = scratch_dir("mt5");
        assert_eq!(check_mt5_path(&dir.display().to_string()), Ok(dir.clone()));
        let missing = dir.join("nope");
        assert_eq!(
            check_mt5_path(&missing.display().to_string()),
            Err(ConfigurationError::Mt5PathMissing(missing))
        );
    }
}
