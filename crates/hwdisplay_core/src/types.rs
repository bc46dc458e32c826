//! Definição de tipos/structs do snapshot de sensores.
//!
//! O [`SensorSnapshot`] é recriado a cada tick a partir do snapshot anterior
//! (carry-forward) e descartado depois de codificado em frame.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Quantidade de slots de carga por core no frame estendido.
pub const CORE_LOAD_SLOTS: usize = 16;

/// Quantidade de slots de clock por core usados na média de GHz.
pub const CORE_CLOCK_SLOTS: usize = 8;

// ──────────────────────────────────────────────
// Hardware / sensores do provider
// ──────────────────────────────────────────────

/// Categoria de uma unidade de hardware exposta pelo provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareCategory {
    Cpu,
    Gpu,
    Ram,
    Other,
}

impl HardwareCategory {
    /// Converte o `HardwareType` do LHM/OHM (`Cpu`, `GpuNvidia`, `RAM`…).
    pub fn from_provider_type(raw: &str) -> Self {
        let t = raw.trim().to_ascii_lowercase();
        if t == "cpu" {
            Self::Cpu
        } else if t.starts_with("gpu") {
            Self::Gpu
        } else if t == "memory" || t == "ram" {
            Self::Ram
        } else {
            Self::Other
        }
    }
}

/// Tipo de sensor (`SensorType` do LHM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Temperature,
    Load,
    Clock,
    Power,
    /// Volume de dados em GB
    Data,
    /// Volume de dados em MB (VRAM)
    SmallData,
    Other,
}

impl FromStr for SensorKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "Temperature" => Self::Temperature,
            "Load" => Self::Load,
            "Clock" => Self::Clock,
            "Power" => Self::Power,
            "Data" => Self::Data,
            "SmallData" => Self::SmallData,
            _ => Self::Other,
        })
    }
}

/// Unidade de hardware (CPU, GPU, RAM…) com zero ou mais sensores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareUnit {
    /// Identificador único no provider (ex: `/amdcpu/0`)
    pub id: String,
    /// Nome amigável (ex: "AMD Ryzen 7 5800X")
    pub name: String,
    pub category: HardwareCategory,
}

/// Uma leitura de sensor, na ordem reportada pelo provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub kind: SensorKind,
    /// Nome exibido (ex: "CPU Core #3")
    pub name: String,
    /// `None` quando o provider não tem valor para o sensor
    pub value: Option<f64>,
}

impl SensorReading {
    pub fn new(kind: SensorKind, name: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            value: Some(value),
        }
    }
}

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// Valores resolvidos em um poll.
///
/// Os campos até `vram_used_pct` seguem exatamente a ordem do frame
/// estendido; os demais são estado auxiliar (média de clock, VRAM,
/// frame legado). Não reordenar: o parser do firmware depende disso.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Carga por core (%), slots `a`..`q`
    pub core_loads: [i64; CORE_LOAD_SLOTS],
    /// Frames por segundo da aplicação em foco
    pub fps: i64,
    /// Temperatura do pacote da CPU (°C)
    pub cpu_temp_c: f64,
    /// Temperatura do GPU core (°C)
    pub gpu_temp_c: f64,
    /// Carga total da CPU (%)
    pub cpu_load_pct: f64,
    /// Média dos clocks por core (GHz, 1 casa decimal)
    pub avg_clock_ghz: f64,
    /// Clock do GPU core (MHz)
    pub gpu_core_clock_mhz: f64,
    /// Clock da memória da GPU (MHz)
    pub gpu_mem_clock_mhz: f64,
    /// Carga do GPU core (%)
    pub gpu_load_pct: f64,
    /// VRAM em uso (%, truncado)
    pub vram_used_pct: i64,

    /// Clock por core (MHz)
    pub core_clocks_mhz: [i64; CORE_CLOCK_SLOTS],
    /// VRAM total (MB)
    pub vram_total_mb: f64,
    /// VRAM em uso (MB)
    pub vram_used_mb: f64,
    /// Potência do pacote da CPU (W)
    pub cpu_power_w: f64,
    /// Uso de RAM (%)
    pub ram_load_pct: f64,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
