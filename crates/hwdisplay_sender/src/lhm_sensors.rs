//! Sensores via LibreHardwareMonitor WMI.
//!
//! Quando o LHM roda como admin ou serviço Windows, ele expõe **todos** os
//! sensores de hardware via WMI em `root\LibreHardwareMonitor`.
//!
//! Cada `Hardware` vira uma [`HardwareUnit`]; os sensores de uma unidade
//! são os `Sensor` cujo `Parent` é o identificador dela, na ordem do WMI.
//!
//! ## Instalação do LHM como serviço
//! 1. Baixe LibreHardwareMonitor: <https://github.com/LibreHardwareMonitor/LibreHardwareMonitor>
//! 2. Execute como admin → Options → "Run On Windows Startup"
//!    **OU** instale como serviço via `sc create` / tarefa agendada.

use hwdisplay_core::types::{HardwareCategory, HardwareUnit, SensorKind, SensorReading};
use serde::Deserialize;
use tracing::debug;
use wmi::WMIConnection;

use crate::reader::SensorError;

// ──────────────────────────────────────────────
// WMI structs de deserialização
// ──────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct LhmSensor {
    sensor_type: String,
    value: Option<f32>,
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct LhmHardware {
    identifier: String,
    name: String,
    hardware_type: String,
}

// ──────────────────────────────────────────────
// API pública
// ──────────────────────────────────────────────

/// Verifica se o LHM WMI está acessível e possui dados.
pub fn check_available(wmi: &WMIConnection) -> bool {
    match wmi.raw_query::<LhmHardware>("SELECT Identifier, Name, HardwareType FROM Hardware") {
        Ok(hw) => !hw.is_empty(),
        Err(_) => false,
    }
}

/// Conta o número de sensores disponíveis (para logging).
pub fn sensor_count(wmi: &WMIConnection) -> usize {
    wmi.raw_query::<LhmSensor>("SELECT SensorType, Value, Name FROM Sensor")
        .map(|v| v.len())
        .unwrap_or(0)
}

/// Lista as unidades de hardware na ordem do LHM.
pub fn list_hardware(wmi: &WMIConnection) -> Result<Vec<HardwareUnit>, SensorError> {
    let hardware: Vec<LhmHardware> = wmi
        .raw_query("SELECT Identifier, Name, HardwareType FROM Hardware")
        .map_err(|e| SensorError::Unavailable(format!("LHM Hardware query: {e}")))?;

    Ok(hardware
        .into_iter()
        .map(|h| HardwareUnit {
            category: HardwareCategory::from_provider_type(&h.hardware_type),
            id: h.identifier,
            name: h.name,
        })
        .collect())
}

/// Consulta os sensores de uma unidade. O LHM atualiza os valores no WMI
/// a cada intervalo próprio; a consulta lê o estado mais recente.
pub fn query_sensors(wmi: &WMIConnection, unit: &HardwareUnit) -> Result<Vec<SensorReading>, SensorError> {
    let query = format!(
        "SELECT SensorType, Value, Name FROM Sensor WHERE Parent = '{}'",
        escape_wql(&unit.id)
    );
    let sensors: Vec<LhmSensor> = wmi.raw_query(&query).map_err(|e| SensorError::Query {
        unit: unit.name.clone(),
        reason: e.to_string(),
    })?;

    debug!("LHM: {} sensores em {}", sensors.len(), unit.id);

    Ok(sensors.into_iter().map(to_reading).collect())
}

fn to_reading(s: LhmSensor) -> SensorReading {
    SensorReading {
        kind: s.sensor_type.parse().unwrap_or(SensorKind::Other),
        name: s.name,
        value: s.value.map(f64::from),
    }
}

/// Escapa aspas simples e barras invertidas em literais WQL.
fn escape_wql(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}
