use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::LoggingError;

/// Формат консольного вывода.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный человекочитаемый формат
    Pretty,
    /// Однострочный формат
    #[default]
    Compact,
    /// JSON, одно событие на строку
    Json,
}

/// Настройки консольного вывода.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки файлового вывода с ежедневной ротацией.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Префикс имени файла: `{prefix}.YYYY-MM-DD`
    pub prefix: String,
    /// Писать в файл JSON вместо текста
    pub json: bool,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень или директива `EnvFilter` (`"info"`, `"busline=debug,info"`)
    pub level: String,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl LoggingConfig {
    /// Применяет переменные окружения `BUSLINE_LOG_LEVEL`,
    /// `BUSLINE_LOG_FORMAT` и `BUSLINE_LOG_DIR`.
    ///
    /// `BUSLINE_LOG_DIR` заодно включает файловый вывод.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BUSLINE_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.level = level;
            }
        }
        if let Some(format) = std::env::var("BUSLINE_LOG_FORMAT")
            .ok()
            .as_deref()
            .and_then(LogFormat::parse)
        {
            self.console.format = format;
        }
        if let Ok(dir) = std::env::var("BUSLINE_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.file.dir = PathBuf::from(dir);
                self.file.enabled = true;
            }
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if self.level.trim().is_empty() {
            return Err(LoggingError::InvalidConfig(
                "log level must not be empty".to_string(),
            ));
        }
        if self.file.enabled && self.file.prefix.trim().is_empty() {
            return Err(LoggingError::InvalidConfig(
                "log file prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Создаёт каталог логов, если файловый вывод включён.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if self.file.enabled {
            fs::create_dir_all(&self.file.dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`. Голый уровень применяется ко всему.
    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_string()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::default(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            prefix: "busline.log".to_string(),
            json: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        for var in ["BUSLINE_LOG_LEVEL", "BUSLINE_LOG_FORMAT", "BUSLINE_LOG_DIR"] {
            std::env::remove_var(var);
        }
    }

    /// Тест проверяет значения по умолчанию.
    #[test]
    fn test_defaults() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.level, "info");
        assert!(cfg.console.enabled);
        assert_eq!(cfg.console.format, LogFormat::Compact);
        assert!(!cfg.file.enabled);
        assert!(cfg.validate().is_ok());
    }

    /// Тест проверяет переопределения из окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("BUSLINE_LOG_LEVEL", "debug");
        std::env::set_var("BUSLINE_LOG_FORMAT", "JSON");
        std::env::set_var("BUSLINE_LOG_DIR", "/tmp/busline-logs");

        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        clear_env();

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.console.format, LogFormat::Json);
        assert!(cfg.file.enabled);
        assert_eq!(cfg.file.dir, PathBuf::from("/tmp/busline-logs"));
    }

    /// Тест проверяет, что неизвестный формат игнорируется.
    #[test]
    #[serial]
    fn test_unknown_format_ignored() {
        clear_env();
        std::env::set_var("BUSLINE_LOG_FORMAT", "xml");
        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        clear_env();
        assert_eq!(cfg.console.format, LogFormat::Compact);
    }

    /// Тест проверяет отказ на пустом уровне и пустом префиксе файла.
    #[test]
    fn test_validate() {
        let mut cfg = LoggingConfig {
            level: " ".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg.level = "warn".into();
        cfg.file.enabled = true;
        cfg.file.prefix = String::new();
        assert!(cfg.validate().is_err());
    }

    /// Тест проверяет создание каталога логов.
    #[test]
    fn test_ensure_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig::default();
        cfg.file.enabled = true;
        cfg.file.dir = tmp.path().join("nested/logs");
        cfg.ensure_log_dir().unwrap();
        assert!(cfg.file.dir.is_dir());
    }
}
