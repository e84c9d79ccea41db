use std::path::Path;

use busline_error::ConnectionError;
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "BUSLINE";

/// Политика переподключения транспорта.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Сколько раз пытаться переподключиться; `None` означает без ограничения.
    pub max_reconnects: Option<usize>,
    /// Пауза между попытками, мс.
    pub wait_ms: u64,
}

/// Конфигурация подключения к шине.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Адреса брокеров.
    pub address: Vec<String>,
    /// Имя соединения.
    pub name: String,
    pub account: Option<String>,
    pub password: Option<String>,
    /// Явный идентификатор клиента. Если пуст, генерируется.
    pub client_id: Option<String>,
    /// Префикс для сгенерированного идентификатора клиента.
    pub app_id: Option<String>,
    /// Общее имя долговременной подписки для транспортов, которые
    /// запоминают позицию чтения.
    pub durable_name: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Таймаут установления соединения, мс.
    pub connect_timeout_ms: u64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BusConfig {
    /// Загружает конфигурацию из переменных окружения `BUSLINE_*`.
    ///
    /// Вложенные ключи разделяются `__` (`BUSLINE_RECONNECT__WAIT_MS`),
    /// адреса перечисляются через запятую (`BUSLINE_ADDRESS=a,b`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder(None)?.build()?.try_deserialize()
    }

    /// Загружает конфигурацию из файла (TOML/YAML/JSON по расширению);
    /// переменные окружения имеют приоритет над файлом.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::builder(Some(path.as_ref()))?
            .build()?
            .try_deserialize()
    }

    fn builder(file: Option<&Path>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default("reconnect.wait_ms", DEFAULT_RECONNECT_WAIT_MS as i64)?
            .set_default("connect_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        // Переменные окружения с префиксом BUSLINE_
        Ok(builder.add_source(env_source()))
    }

    /// Проверяет, что конфигурацией можно воспользоваться для подключения.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.address.iter().all(|a| a.trim().is_empty()) {
            return Err(ConnectionError::InvalidConfig {
                reason: "at least one broker address is required".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(ConnectionError::InvalidConfig {
                reason: "connection name must not be empty".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConnectionError::InvalidConfig {
                reason: "connect_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Идентификатор клиента: явный `client_id`, иначе новый UUID с
    /// префиксом `"{app_id}_"`, если задан `app_id`.
    pub fn resolve_client_id(&self) -> String {
        if let Some(id) = self.client_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let generated = Uuid::new_v4().to_string();
        match self.app_id.as_deref().filter(|app| !app.is_empty()) {
            Some(app) => format!("{app}_{generated}"),
            None => generated,
        }
    }

    /// Адреса без пустых элементов.
    pub fn addresses(&self) -> Vec<String> {
        self.address
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RECONNECT_WAIT_MS: u64 = 2_000;

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("address")
        .try_parsing(true)
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_reconnects: None,
            wait_ms: DEFAULT_RECONNECT_WAIT_MS,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: Vec::new(),
            name: String::new(),
            account: None,
            password: None,
            client_id: None,
            app_id: None,
            durable_name: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
