//! NVIDIA GPU monitoring via NVML (nvidia-ml).
//!
//! Carrega a biblioteca NVML dinamicamente; funciona com qualquer driver NVIDIA.
//! Sem GPU NVIDIA? `try_new()` retorna `None` e a fonte é desativada.
//!
//! Os sensores usam os nomes do LHM (`GPU Core`, `GPU Memory Used`…) para
//! que a mesma tabela de busca sirva para todas as fontes.

use hwdisplay_core::types::{SensorKind, SensorReading};
use nvml_wrapper::Nvml;
use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use tracing::{debug, info};

use crate::reader::SensorError;

/// Monitor de GPU NVIDIA via NVML.
pub struct NvmlMonitor {
    nvml: Nvml,
    count: u32,
}

impl NvmlMonitor {
    /// Tenta inicializar NVML. Retorna `None` se não houver GPU NVIDIA.
    pub fn try_new() -> Option<Self> {
        match Nvml::init() {
            Ok(nvml) => {
                let count = nvml.device_count().unwrap_or(0);
                if count > 0 {
                    if let Ok(dev) = nvml.device_by_index(0) {
                        let name = dev.name().unwrap_or_else(|_| "Unknown".into());
                        info!("✓ NVML: {name} ({count} GPU(s))");
                    } else {
                        info!("✓ NVML: {count} GPU(s) NVIDIA");
                    }
                    Some(Self { nvml, count })
                } else {
                    debug!("NVML init OK mas nenhuma GPU encontrada");
                    None
                }
            }
            Err(e) => {
                debug!("NVML não disponível: {e}");
                None
            }
        }
    }

    pub fn device_count(&self) -> u32 {
        self.count
    }

    /// Nome da GPU no índice especificado.
    pub fn device_name(&self, index: u32) -> String {
        self.nvml
            .device_by_index(index)
            .and_then(|d| d.name())
            .unwrap_or_else(|_| format!("NVIDIA GPU #{index}"))
    }

    /// Lê os sensores da GPU no índice especificado.
    ///
    /// Cada métrica que o driver não fornece é simplesmente omitida.
    pub fn readings(&self, index: u32) -> Result<Vec<SensorReading>, SensorError> {
        let device = self.nvml.device_by_index(index).map_err(|e| SensorError::Query {
            unit: format!("NVML GPU #{index}"),
            reason: e.to_string(),
        })?;

        let mut out = Vec::with_capacity(7);

        // Temperatura (°C)
        if let Ok(temp) = device.temperature(TemperatureSensor::Gpu) {
            out.push(SensorReading::new(SensorKind::Temperature, "GPU Core", f64::from(temp)));
        }

        // Clocks (MHz)
        if let Ok(clock) = device.clock_info(Clock::Graphics) {
            out.push(SensorReading::new(SensorKind::Clock, "GPU Core", f64::from(clock)));
        }
        if let Ok(clock) = device.clock_info(Clock::Memory) {
            out.push(SensorReading::new(SensorKind::Clock, "GPU Memory", f64::from(clock)));
        }

        // Utilização (%)
        if let Ok(util) = device.utilization_rates() {
            out.push(SensorReading::new(SensorKind::Load, "GPU Core", f64::from(util.gpu)));
        }

        // VRAM (bytes → MB)
        if let Ok(mem) = device.memory_info() {
            let mb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0);
            out.push(SensorReading::new(SensorKind::SmallData, "GPU Memory Total", mb(mem.total)));
            out.push(SensorReading::new(SensorKind::SmallData, "GPU Memory Used", mb(mem.used)));
        }

        // Potência (mW → W)
        if let Ok(mw) = device.power_usage() {
            out.push(SensorReading::new(SensorKind::Power, "GPU Package", f64::from(mw) / 1000.0));
        }

        Ok(out)
    }
}
