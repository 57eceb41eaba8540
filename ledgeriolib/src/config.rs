//! Конфигурация движка, слоями через figment.
//!
//! Источники по приоритету (старший побеждает):
//! 1. Переменные окружения с префиксом `LEDGERIO_`
//!    (`LEDGERIO_STREAMING_VALIDATE=true` -> `streaming_validate`)
//! 2. Необязательный TOML (`ledgerio.toml` в рабочем каталоге или явный путь)
//! 3. Встроенные значения по умолчанию

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "LEDGERIO_";
pub const DEFAULT_CONFIG_FILE: &str = "ledgerio.toml";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Ошибка извлечения или слияния figment.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// Недопустимое значение поля конфигурации.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Всегда читать проводки потоково, даже для маленьких документов.
    pub streaming_enabled: bool,
    /// Запускать структурную валидацию рядом с накоплением.
    pub streaming_validate: bool,
    /// Не урезать число воркеров для документов выше порога.
    pub heavy_parallel: bool,
    /// Документы от этого размера «тяжёлые»: читаются потоково, бюджет
    /// воркеров урезается.
    pub size_threshold_bytes: u64,
    /// Суммарный размер пакета, с которого бюджет пакета урезается.
    pub batch_total_threshold_bytes: u64,
    pub default_workers: usize,
    pub clamped_workers: usize,
    pub heavy_parallel_workers: usize,
    pub default_batch_workers: usize,
    /// Абсолютный допуск при сравнении остатков.
    pub tolerance: Decimal,
    /// Знаков после запятой при округлении для показа.
    pub fractional_digits: u32,
    pub progress_every_entries: u64,
    pub progress_interval_ms: u64,
    /// Проводок между двумя проверками отмены в цикле накопления.
    pub cancel_check_every: u64,
    pub max_validation_findings: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            streaming_enabled: false,
            streaming_validate: false,
            heavy_parallel: false,
            size_threshold_bytes: 25 * MIB,
            batch_total_threshold_bytes: 150 * MIB,
            default_workers: 3,
            clamped_workers: 2,
            heavy_parallel_workers: 4,
            default_batch_workers: 4,
            tolerance: Decimal::new(1, 2),
            fractional_digits: 2,
            progress_every_entries: 10_000,
            progress_interval_ms: 250,
            cancel_check_every: 256,
            max_validation_findings: 200,
        }
    }
}

impl EngineConfig {
    /// Умолчания, `ledgerio.toml` (если есть) и окружение.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Как [`EngineConfig::load`], но читает `path` вместо файла по умолчанию.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Цепочка провайдеров; публичная, чтобы можно было добавить свои слои.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("default_workers", self.default_workers),
            ("heavy_parallel_workers", self.heavy_parallel_workers),
            ("default_batch_workers", self.default_batch_workers),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1".into(),
                });
            }
        }
        // при двух воркерах валидация идёт параллельно с накоплением
        if self.clamped_workers < 2 {
            return Err(ConfigError::InvalidValue {
                field: "clamped_workers",
                reason: format!("must be at least 2, got {}", self.clamped_workers),
            });
        }
        if self.tolerance.is_sign_negative() {
            return Err(ConfigError::InvalidValue {
                field: "tolerance",
                reason: format!("must not be negative, got {}", self.tolerance),
            });
        }
        if self.fractional_digits > 10 {
            return Err(ConfigError::InvalidValue {
                field: "fractional_digits",
                reason: format!("at most 10 supported, got {}", self.fractional_digits),
            });
        }
        let intervals = [
            ("cancel_check_every", self.cancel_check_every),
            ("progress_every_entries", self.progress_every_entries),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "entry interval must be at least 1".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.tolerance, dec!(0.01));
        assert_eq!(config.size_threshold_bytes, 25 * 1024 * 1024);
        assert!(!config.streaming_enabled);
    }

    #[test]
    fn env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("LEDGERIO_STREAMING_VALIDATE", "true");
            jail.set_env("LEDGERIO_SIZE_THRESHOLD_BYTES", "1024");
            let config = EngineConfig::load().expect("config loads");
            assert!(config.streaming_validate);
            assert_eq!(config.size_threshold_bytes, 1024);
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_layered_below_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ledgerio.toml",
                r#"
                heavy_parallel = true
                tolerance = "0.05"
                default_workers = 5
                "#,
            )?;
            jail.set_env("LEDGERIO_DEFAULT_WORKERS", "6");
            let config = EngineConfig::load().expect("config loads");
            assert!(config.heavy_parallel);
            assert_eq!(config.tolerance, dec!(0.05));
            assert_eq!(config.default_workers, 6);
            Ok(())
        });
    }

    #[test]
    fn clamp_below_two_is_rejected() {
        let config = EngineConfig {
            clamped_workers: 1,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("clamped_workers"));
    }

    #[rstest::rstest]
    #[case::cancel("cancel_check_every")]
    #[case::progress("progress_every_entries")]
    fn zero_interval_names_its_field(#[case] name: &str) {
        let mut config = EngineConfig::default();
        match name {
            "cancel_check_every" => config.cancel_check_every = 0,
            _ => config.progress_every_entries = 0,
        }
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, name),
            other => panic!("expected an invalid value, got {other:?}"),
        }
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let config = EngineConfig {
            tolerance: dec!(-0.01),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
