//! Configuración del clasificador y del streaming (TOML)

use crate::types::{HIDDEN_LEN, SAMPLE_INTERVAL, WINDOW_SIZE};
use crate::window_assembler::StallPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Modelo ONNX y nombres de sus tensores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// JSON con `index_to_class`
    pub classes: PathBuf,
    pub features_input: String,
    pub hidden_input: String,
    pub cell_input: String,
    pub probabilities_output: String,
    pub hidden_output: String,
    pub cell_output: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("activity_classifier.onnx"),
            classes: PathBuf::from("classes.json"),
            features_input: "features".to_string(),
            hidden_input: "hidden_in".to_string(),
            cell_input: "cell_in".to_string(),
            probabilities_output: "probabilities".to_string(),
            hidden_output: "hidden_out".to_string(),
            cell_output: "cell_out".to_string(),
        }
    }
}

/// Forma de la ventana y ritmo de muestreo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub window_len: usize,
    pub hidden_len: usize,
    pub sample_interval_ms: u64,
    pub stall_timeout_ms: Option<u64>,
    /// Capacidad del canal fuente → ingesta
    pub channel_capacity: usize,
    /// Con inferencia ocupada, descarta la ventana nueva en vez de esperar
    pub drop_when_busy: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_len: WINDOW_SIZE,
            hidden_len: HIDDEN_LEN,
            sample_interval_ms: SAMPLE_INTERVAL.as_millis() as u64,
            stall_timeout_ms: None,
            channel_capacity: 256,
            drop_when_busy: false,
        }
    }
}

impl StreamConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn stall_policy(&self) -> StallPolicy {
        match self.stall_timeout_ms {
            Some(ms) => StallPolicy::with_timeout(Duration::from_millis(ms)),
            None => StallPolicy::disabled(),
        }
    }
}

impl Config {
    /// Comprueba rangos; una forma inválida es error de configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = &self.stream;
        if stream.window_len == 0 {
            return Err(ConfigError::Invalid("window_len must be > 0".to_string()));
        }
        if stream.hidden_len == 0 {
            return Err(ConfigError::Invalid("hidden_len must be > 0".to_string()));
        }
        if stream.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_ms must be > 0".to_string(),
            ));
        }
        if stream.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be > 0".to_string(),
            ));
        }
        if let Some(timeout) = stream.stall_timeout_ms {
            if timeout <= stream.sample_interval_ms {
                return Err(ConfigError::Invalid(format!(
                    "stall_timeout_ms ({}) must be longer than sample_interval_ms ({})",
                    timeout, stream.sample_interval_ms
                )));
            }
        }

        let model = &self.model;
        let names = [
            &model.features_input,
            &model.hidden_input,
            &model.cell_input,
            &model.probabilities_output,
            &model.hidden_output,
            &model.cell_output,
        ];
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "tensor names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Carga el fichero si se indica; si no, valores por defecto
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
