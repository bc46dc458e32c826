//! Leitura de snapshots: resolve o sensor certo entre vários por unidade.
//!
//! Para cada unidade CPU/GPU/RAM o provider é atualizado e cada campo
//! do snapshot é procurado por tipo + nome do sensor. O primeiro sensor
//! que casa vence. Campo sem sensor mantém o valor anterior.

use crate::fps::FrameRateSource;
use hwdisplay_core::types::{
    CORE_CLOCK_SLOTS, CORE_LOAD_SLOTS, HardwareCategory, HardwareUnit, SensorKind, SensorReading,
    SensorSnapshot,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Erros de sensores. Nunca são fatais: o campo fica com o valor anterior.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Provider de sensores indisponível: {0}")]
    Unavailable(String),

    #[error("Falha ao consultar {unit}: {reason}")]
    Query { unit: String, reason: String },
}

/// Fonte de unidades de hardware e seus sensores.
pub trait SensorProvider {
    /// Lista as unidades de hardware conhecidas.
    fn hardware(&mut self) -> Result<Vec<HardwareUnit>, SensorError>;

    /// Atualiza os sensores de uma unidade e retorna as leituras
    /// na ordem do provider.
    fn refresh(&mut self, unit: &HardwareUnit) -> Result<Vec<SensorReading>, SensorError>;
}

// ──────────────────────────────────────────────
// Busca de sensores
// ──────────────────────────────────────────────

/// Regra de nome para casar um sensor.
#[derive(Debug, Clone, Copy)]
pub enum NameMatch<'a> {
    /// Nome exato (sensores indexados por core)
    Exact(&'a str),
    /// Substring (sensores agregados)
    Contains(&'a str),
}

impl NameMatch<'_> {
    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(target) => name == *target,
            Self::Contains(target) => name.contains(target),
        }
    }
}

/// Primeiro sensor do tipo e nome pedidos, na ordem do provider.
///
/// Sensor encontrado sem valor conta como ausente.
pub fn find_sensor(readings: &[SensorReading], kind: SensorKind, name: NameMatch<'_>) -> Option<f64> {
    readings
        .iter()
        .find(|r| r.kind == kind && name.matches(&r.name))
        .and_then(|r| r.value)
        .filter(|v| v.is_finite())
}

/// Tenta cada alvo em ordem; o primeiro que existir vence.
fn find_any(readings: &[SensorReading], kind: SensorKind, targets: &[&str]) -> Option<f64> {
    targets
        .iter()
        .find_map(|t| find_sensor(readings, kind, NameMatch::Contains(*t)))
}

/// Arredondamento half-to-even com `decimals` casas.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Média dos slots de clock (MHz → GHz, 1 casa). Slots vazios contam como zero.
pub fn average_clock_ghz(clocks_mhz: &[i64]) -> f64 {
    if clocks_mhz.is_empty() {
        return 0.0;
    }
    let sum: i64 = clocks_mhz.iter().sum();
    let mean_mhz = sum as f64 / clocks_mhz.len() as f64;
    round_to(mean_mhz / 1000.0, 1)
}

/// Percentual de VRAM em uso, truncado. Total zero resulta em 0.
pub fn vram_percentage(used_mb: f64, total_mb: f64) -> i64 {
    if total_mb <= 0.0 || !total_mb.is_finite() || !used_mb.is_finite() {
        return 0;
    }
    (used_mb * 100.0 / total_mb).trunc() as i64
}

// ──────────────────────────────────────────────
// Reader
// ──────────────────────────────────────────────

/// Constrói snapshots a partir de um provider e de uma fonte de FPS.
pub struct SnapshotReader<P, F> {
    provider: P,
    fps: F,
}

/// Campo do snapshot alimentado por sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    CoreLoad(usize),
    CoreClock(usize),
    CpuTemp,
    CpuLoad,
    CpuPower,
    GpuTemp,
    GpuCoreClock,
    GpuMemClock,
    GpuLoad,
    VramTotal,
    VramUsed,
    RamLoad,
}

/// Campos já resolvidos neste poll (primeira unidade que fornece vence).
#[derive(Default)]
struct Filled(HashSet<Field>);

impl Filled {
    fn set<T>(&mut self, field: Field, slot: &mut T, value: Option<T>) {
        if self.0.contains(&field) {
            return;
        }
        match value {
            Some(v) => {
                *slot = v;
                self.0.insert(field);
            }
            None => debug!("SensorUnavailable: {field:?} (mantendo valor anterior)"),
        }
    }

    #[cfg(test)]
    fn is_filled(&self, field: Field) -> bool {
        self.0.contains(&field)
    }
}

impl<P: SensorProvider, F: FrameRateSource> SnapshotReader<P, F> {
    pub fn new(provider: P, fps: F) -> Self {
        Self { provider, fps }
    }

    /// Lê um novo snapshot partindo do anterior (carry-forward).
    pub fn poll(&mut self, previous: &SensorSnapshot) -> SensorSnapshot {
        let mut snap = previous.clone();
        let mut filled = Filled::default();

        match self.provider.hardware() {
            Ok(units) => {
                for unit in &units {
                    if unit.category == HardwareCategory::Other {
                        continue;
                    }
                    let readings = match self.provider.refresh(unit) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("Sensores de {} mantidos do último poll: {e}", unit.name);
                            continue;
                        }
                    };
                    match unit.category {
                        HardwareCategory::Cpu => apply_cpu(&readings, &mut snap, &mut filled),
                        HardwareCategory::Gpu => apply_gpu(&readings, &mut snap, &mut filled),
                        HardwareCategory::Ram => apply_ram(&readings, &mut snap, &mut filled),
                        HardwareCategory::Other => {}
                    }
                }
            }
            Err(e) => warn!("Snapshot mantido do último poll: {e}"),
        }

        // Derivados sempre recalculados a partir dos valores atuais
        snap.avg_clock_ghz = average_clock_ghz(&snap.core_clocks_mhz);
        snap.vram_used_pct = vram_percentage(snap.vram_used_mb, snap.vram_total_mb);
        snap.fps = self.fps.current_fps();

        debug!(
            "Snapshot: CPU {:.0}°C {:.0}% {:.1}GHz | GPU {:.0}°C {:.0}% | VRAM {}% | {} fps",
            snap.cpu_temp_c,
            snap.cpu_load_pct,
            snap.avg_clock_ghz,
            snap.gpu_temp_c,
            snap.gpu_load_pct,
            snap.vram_used_pct,
            snap.fps
        );

        snap
    }
}

fn apply_cpu(readings: &[SensorReading], snap: &mut SensorSnapshot, filled: &mut Filled) {
    for i in 0..CORE_LOAD_SLOTS {
        let name = format!("CPU Core #{}", i + 1);
        let value = find_sensor(readings, SensorKind::Load, NameMatch::Exact(&name));
        filled.set(Field::CoreLoad(i), &mut snap.core_loads[i], value.map(|v| round_to(v, 0) as i64));
    }
    for i in 0..CORE_CLOCK_SLOTS {
        let name = format!("Core #{}", i + 1);
        let value = find_sensor(readings, SensorKind::Clock, NameMatch::Exact(&name));
        filled.set(Field::CoreClock(i), &mut snap.core_clocks_mhz[i], value.map(|v| round_to(v, 0) as i64));
    }

    let temp = find_any(readings, SensorKind::Temperature, &["CPU Package", "Core (Tctl/Tdie)"]);
    filled.set(Field::CpuTemp, &mut snap.cpu_temp_c, temp.map(|v| round_to(v, 0)));

    let load = find_sensor(readings, SensorKind::Load, NameMatch::Contains("CPU Total"));
    filled.set(Field::CpuLoad, &mut snap.cpu_load_pct, load.map(|v| round_to(v, 0)));

    let power = find_sensor(readings, SensorKind::Power, NameMatch::Contains("CPU Package"));
    filled.set(Field::CpuPower, &mut snap.cpu_power_w, power.map(|v| round_to(v, 0)));
}

fn apply_gpu(readings: &[SensorReading], snap: &mut SensorSnapshot, filled: &mut Filled) {
    let gpu_core = NameMatch::Contains("GPU Core");

    let temp = find_sensor(readings, SensorKind::Temperature, gpu_core);
    filled.set(Field::GpuTemp, &mut snap.gpu_temp_c, temp.map(|v| round_to(v, 0)));

    let clock = find_sensor(readings, SensorKind::Clock, gpu_core);
    filled.set(Field::GpuCoreClock, &mut snap.gpu_core_clock_mhz, clock.map(|v| round_to(v, 0)));

    let mem_clock = find_sensor(readings, SensorKind::Clock, NameMatch::Contains("GPU Memory"));
    filled.set(Field::GpuMemClock, &mut snap.gpu_mem_clock_mhz, mem_clock.map(|v| round_to(v, 0)));

    let load = find_sensor(readings, SensorKind::Load, gpu_core);
    filled.set(Field::GpuLoad, &mut snap.gpu_load_pct, load.map(|v| round_to(v, 0)));

    let total = find_sensor(readings, SensorKind::SmallData, NameMatch::Contains("GPU Memory Total"));
    filled.set(Field::VramTotal, &mut snap.vram_total_mb, total);

    let used = find_sensor(readings, SensorKind::SmallData, NameMatch::Contains("GPU Memory Used"));
    filled.set(Field::VramUsed, &mut snap.vram_used_mb, used);
}

fn apply_ram(readings: &[SensorReading], snap: &mut SensorSnapshot, filled: &mut Filled) {
    let load = find_sensor(readings, SensorKind::Load, NameMatch::Contains("Memory"));
    filled.set(Field::RamLoad, &mut snap.ram_load_pct, load.map(|v| round_to(v, 0)));
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
