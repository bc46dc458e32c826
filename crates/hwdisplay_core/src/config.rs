//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável. Campos ausentes usam o
//! valor padrão de cada seção.

use crate::protocol::FrameShape;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Configuração da conexão serial.
///
/// Imutável durante a vida de uma conexão.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Nome da porta (`COM3`, `/dev/ttyUSB0`). Vazio = detecção automática
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Intervalo entre ticks (ms)
    pub poll_interval_ms: u32,
    /// Timeout de escrita (ms); estourar equivale a falha de escrita
    pub write_timeout_ms: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            poll_interval_ms: 1000,
            write_timeout_ms: 500,
        }
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.write_timeout_ms))
    }
}

/// Formato do frame esperado pelo firmware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// "extended" ou "legacy"
    pub shape: FrameShape,
}

/// Fontes de sensores opcionais.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// LibreHardwareMonitor via WMI (Windows)
    pub lhm: bool,
    /// GPUs NVIDIA via NVML
    pub nvml: bool,
    /// FPS via RivaTuner Statistics Server (Windows)
    pub rtss: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            lhm: true,
            nvml: true,
            rtss: true,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub display: DisplayConfig,
    pub sources: SourcesConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let serial = &self.serial;

        if serial.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if !(100..=60_000).contains(&serial.poll_interval_ms) {
            errors.push(format!(
                "Intervalo de poll inválido: {} ms (100–60000)",
                serial.poll_interval_ms
            ));
        }
        if !(10..=5_000).contains(&serial.write_timeout_ms) {
            errors.push(format!(
                "Timeout de escrita inválido: {} ms (10–5000)",
                serial.write_timeout_ms
            ));
        }

        errors
    }
}
