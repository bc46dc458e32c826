//! Hardware Monitor – provider de sensores com fallback chain.
//!
//! **Prioridade 1: LibreHardwareMonitor WMI (Windows):**
//! todas as unidades CPU/GPU/RAM com os nomes de sensor originais.
//!
//! **Prioridade 2: Pure Rust (sempre disponível):**
//! - `sysinfo`: CPU (carga total/por core, clock por core, temperatura) e RAM
//! - `nvml-wrapper`: GPUs NVIDIA: temp, carga, clocks, VRAM
//!
//! As fontes da prioridade 2 sintetizam os nomes no padrão do LHM.

use hwdisplay_core::config::SourcesConfig;
use hwdisplay_core::types::{HardwareCategory, HardwareUnit, SensorKind, SensorReading};
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::info;

use crate::nvml_gpu::NvmlMonitor;
use crate::reader::{SensorError, SensorProvider};

#[cfg(windows)]
use {
    crate::lhm_sensors,
    tracing::warn,
    wmi::{COMLibrary, WMIConnection},
};

const CPU_UNIT_ID: &str = "sysinfo/cpu";
const RAM_UNIT_ID: &str = "sysinfo/memory";
const NVML_UNIT_PREFIX: &str = "nvml/gpu/";

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Monitor de hardware principal.
pub struct HardwareMonitor {
    sys: System,
    components: Components,
    nvml: Option<NvmlMonitor>,

    // ── Fontes avançadas (Windows) ──
    #[cfg(windows)]
    wmi_lhm: Option<WMIConnection>,
}

impl HardwareMonitor {
    /// Cria um novo monitor e detecta fontes de sensores disponíveis.
    pub fn new(sources: &SourcesConfig) -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        #[cfg(windows)]
        let wmi_lhm = if sources.lhm { init_lhm() } else { None };

        let nvml = if sources.nvml { NvmlMonitor::try_new() } else { None };
        if nvml.is_none() && sources.nvml {
            info!("✗ NVML: sem GPU NVIDIA, sensores de GPU dependem do LHM");
        }

        Self {
            sys,
            components: Components::new_with_refreshed_list(),
            nvml,
            #[cfg(windows)]
            wmi_lhm,
        }
    }

    /// Unidades das fontes pure Rust.
    fn local_units(&self) -> Vec<HardwareUnit> {
        let cpu_name = self
            .sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "CPU".into());

        let mut units = vec![HardwareUnit {
            id: CPU_UNIT_ID.into(),
            name: cpu_name,
            category: HardwareCategory::Cpu,
        }];

        if let Some(ref nvml) = self.nvml {
            for index in 0..nvml.device_count() {
                units.push(HardwareUnit {
                    id: format!("{NVML_UNIT_PREFIX}{index}"),
                    name: nvml.device_name(index),
                    category: HardwareCategory::Gpu,
                });
            }
        }

        units.push(HardwareUnit {
            id: RAM_UNIT_ID.into(),
            name: "Generic Memory".into(),
            category: HardwareCategory::Ram,
        });

        units
    }

    // ──────────────────────────────────────────
    // Coleta básica via sysinfo
    // ──────────────────────────────────────────

    fn cpu_readings(&mut self) -> Vec<SensorReading> {
        self.sys.refresh_cpu_all();
        self.components.refresh(true);

        let cpus = self.sys.cpus();
        let mut out = Vec::with_capacity(cpus.len() * 2 + 2);

        out.push(SensorReading::new(
            SensorKind::Load,
            "CPU Total",
            f64::from(self.sys.global_cpu_usage()),
        ));
        for (i, cpu) in cpus.iter().enumerate() {
            out.push(SensorReading::new(
                SensorKind::Load,
                format!("CPU Core #{}", i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        for (i, cpu) in cpus.iter().enumerate() {
            out.push(SensorReading::new(
                SensorKind::Clock,
                format!("Core #{}", i + 1),
                cpu.frequency() as f64,
            ));
        }
        if let Some(temp) = self.cpu_temp_from_components() {
            out.push(SensorReading::new(SensorKind::Temperature, "CPU Package", f64::from(temp)));
        }

        out
    }

    /// Temperatura da CPU nos components do sysinfo.
    ///
    /// Prefere Tctl/Tdie/Package; senão o maior valor entre labels de CPU/core.
    fn cpu_temp_from_components(&self) -> Option<f32> {
        let mut preferred = None;
        let mut fallback: Option<f32> = None;

        for comp in self.components.iter() {
            let label = comp.label().to_lowercase();
            let Some(t) = comp.temperature() else {
                continue;
            };
            if !(t > 0.0 && t < 150.0) {
                continue;
            }
            if label.contains("tctl") || label.contains("tdie") || label.contains("package") {
                preferred.get_or_insert(t);
            } else if label.contains("cpu") || label.contains("core") {
                fallback = Some(fallback.map_or(t, |f| f.max(t)));
            }
        }

        preferred.or(fallback)
    }

    fn ram_readings(&mut self) -> Vec<SensorReading> {
        self.sys.refresh_memory();

        let total = self.sys.total_memory() as f64;
        let used = self.sys.used_memory() as f64;
        let available = self.sys.available_memory() as f64;

        let mut out = Vec::with_capacity(3);
        if total > 0.0 {
            out.push(SensorReading::new(SensorKind::Load, "Memory", used / total * 100.0));
        }
        out.push(SensorReading::new(SensorKind::Data, "Memory Used", used / GB));
        out.push(SensorReading::new(SensorKind::Data, "Memory Available", available / GB));
        out
    }
}

impl SensorProvider for HardwareMonitor {
    fn hardware(&mut self) -> Result<Vec<HardwareUnit>, SensorError> {
        #[cfg(windows)]
        {
            if let Some(ref wmi) = self.wmi_lhm {
                return lhm_sensors::list_hardware(wmi);
            }
        }

        Ok(self.local_units())
    }

    fn refresh(&mut self, unit: &HardwareUnit) -> Result<Vec<SensorReading>, SensorError> {
        if unit.id == CPU_UNIT_ID {
            return Ok(self.cpu_readings());
        }
        if unit.id == RAM_UNIT_ID {
            return Ok(self.ram_readings());
        }
        if let Some(index) = unit.id.strip_prefix(NVML_UNIT_PREFIX) {
            let nvml = self
                .nvml
                .as_ref()
                .ok_or_else(|| SensorError::Unavailable(format!("NVML não inicializado ({})", unit.name)))?;
            let index = index.parse().map_err(|_| SensorError::Query {
                unit: unit.name.clone(),
                reason: format!("índice inválido: {index}"),
            })?;
            return nvml.readings(index);
        }

        #[cfg(windows)]
        {
            if let Some(ref wmi) = self.wmi_lhm {
                return lhm_sensors::query_sensors(wmi, unit);
            }
        }

        Err(SensorError::Query {
            unit: unit.name.clone(),
            reason: "nenhuma fonte reconhece esta unidade".into(),
        })
    }
}

// ──────────────────────────────────────────────
// Inicialização do LHM WMI
// ──────────────────────────────────────────────

#[cfg(windows)]
fn init_lhm() -> Option<WMIConnection> {
    let wmi_lhm = COMLibrary::new()
        .ok()
        .and_then(|com| WMIConnection::with_namespace_path("root\\LibreHardwareMonitor", com).ok())
        .and_then(|wmi| {
            if lhm_sensors::check_available(&wmi) {
                let count = lhm_sensors::sensor_count(&wmi);
                info!("✓ LHM WMI: {count} sensores disponíveis");
                Some(wmi)
            } else {
                None
            }
        });

    if wmi_lhm.is_none() {
        warn!("✗ LHM WMI: não detectado, usando sysinfo/NVML");
        warn!("  → Para sensores completos (CPU package/power, GPU, VRAM):");
        warn!("    Instale LibreHardwareMonitor e rode como admin ou serviço Windows");
    }

    wmi_lhm
}
