//! Protocolo serial texto para o display do microcontrolador.
//!
//! Cada campo é seguido imediatamente por uma letra delimitadora única.
//! Não há newline: o firmware separa campos pelos delimitadores.
//!
//! ```text
//! 12a5b...0q60r54s47t23u3.9v1800w7000x35y41z
//! └──┘
//! valor + delimitador
//! ```
//!
//! Dois formatos independentes existem:
//! - [`FrameShape::Extended`] – 16 cargas por core + FPS + CPU/GPU (25 campos)
//! - [`FrameShape::Legacy`] – 6 campos (temp/carga/potência CPU, GPU, RAM)

use crate::types::SensorSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Delimitadores do frame estendido, na ordem dos campos.
///
/// `i` não é usado e `k` vem antes de `j`: o firmware espera exatamente isso.
pub const EXTENDED_DELIMITERS: [char; 25] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'k', 'j', 'l', 'm', 'n', 'o', 'p', 'q', // cores
    'r', // fps
    's', // CPU temp
    't', // GPU temp
    'u', // CPU load
    'v', // GHz médio
    'w', // GPU core clock
    'x', // GPU mem clock
    'y', // GPU load
    'z', // VRAM %
];

/// Delimitadores do frame legado.
pub const LEGACY_DELIMITERS: [char; 6] = ['a', 'b', 'c', 'd', 'e', 'f'];

/// Sentinela de desconexão do frame estendido.
pub const EXTENDED_DISCONNECT: &str = "DISa";

/// Sentinela de desconexão do frame legado.
pub const LEGACY_DISCONNECT: &str = "DIS*";

/// Formato do frame aceito pelo firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameShape {
    #[default]
    Extended,
    Legacy,
}

impl FrameShape {
    /// Sequência de delimitadores do formato.
    pub fn delimiters(self) -> &'static [char] {
        match self {
            Self::Extended => &EXTENDED_DELIMITERS,
            Self::Legacy => &LEGACY_DELIMITERS,
        }
    }

    /// Frame fora de banda enviado uma única vez na desconexão manual.
    pub fn disconnect_sentinel(self) -> &'static str {
        match self {
            Self::Extended => EXTENDED_DISCONNECT,
            Self::Legacy => LEGACY_DISCONNECT,
        }
    }
}

impl std::str::FromStr for FrameShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extended" => Ok(Self::Extended),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("formato de frame desconhecido: {other}")),
        }
    }
}

/// Erros do decodificador (lado firmware).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("Delimitador '{delimiter}' ausente (campo {index})")]
    MissingDelimiter { delimiter: char, index: usize },

    #[error("Campo vazio antes de '{0}'")]
    EmptyField(char),

    #[error("Valor inválido antes de '{delimiter}': {raw:?}")]
    InvalidNumber { delimiter: char, raw: String },

    #[error("{0} bytes sobrando após o último campo")]
    TrailingBytes(usize),
}

// ──────────────────────────────────────────────
// Encoder
// ──────────────────────────────────────────────

/// Codifica o snapshot no formato pedido.
pub fn encode_frame(snapshot: &SensorSnapshot, shape: FrameShape) -> String {
    match shape {
        FrameShape::Extended => encode_extended(snapshot),
        FrameShape::Legacy => encode_legacy(snapshot),
    }
}

/// Frame estendido: `load0a…load15q fps r cpuTemp s gpuTemp t cpuLoad u ghz v
/// gpuClk w memClk x gpuLoad y vram% z`.
pub fn encode_extended(s: &SensorSnapshot) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(EXTENDED_DELIMITERS.len());
    fields.extend(s.core_loads.iter().map(|v| v.to_string()));
    fields.push(s.fps.to_string());
    fields.push(whole(s.cpu_temp_c));
    fields.push(whole(s.gpu_temp_c));
    fields.push(whole(s.cpu_load_pct));
    fields.push(tenths(s.avg_clock_ghz));
    fields.push(whole(s.gpu_core_clock_mhz));
    fields.push(whole(s.gpu_mem_clock_mhz));
    fields.push(whole(s.gpu_load_pct));
    fields.push(s.vram_used_pct.to_string());

    join_fields(&fields, &EXTENDED_DELIMITERS)
}

/// Frame legado: `cpuTemp a cpuLoad b cpuPower c gpuTemp d gpuLoad e ram f`.
pub fn encode_legacy(s: &SensorSnapshot) -> String {
    let fields = [
        whole(s.cpu_temp_c),
        whole(s.cpu_load_pct),
        whole(s.cpu_power_w),
        whole(s.gpu_temp_c),
        whole(s.gpu_load_pct),
        whole(s.ram_load_pct),
    ];

    join_fields(&fields, &LEGACY_DELIMITERS)
}

fn join_fields(fields: &[String], delimiters: &[char]) -> String {
    debug_assert_eq!(fields.len(), delimiters.len());
    let mut frame = String::with_capacity(fields.len() * 4);
    for (value, delim) in fields.iter().zip(delimiters) {
        let _ = write!(frame, "{value}{delim}");
    }
    frame
}

/// Inteiro arredondado; valores não finitos viram 0.
fn whole(value: f64) -> String {
    if !value.is_finite() {
        return "0".into();
    }
    (value.round_ties_even() as i64).to_string()
}

/// Uma casa decimal; valores não finitos viram 0.0.
fn tenths(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".into();
    }
    let rounded = (value * 10.0).round_ties_even() / 10.0;
    // Evita "-0.0"
    format!("{:.1}", rounded + 0.0)
}

// ──────────────────────────────────────────────
// Decoder (espelho do parser do firmware)
// ──────────────────────────────────────────────

/// Decodifica um frame como o firmware faz: lê até cada delimitador esperado.
///
/// Retorna os valores na ordem dos campos do formato.
pub fn decode_frame(frame: &str, shape: FrameShape) -> Result<Vec<f64>, ProtocolError> {
    let mut rest = frame;
    let mut values = Vec::with_capacity(shape.delimiters().len());

    for (index, &delimiter) in shape.delimiters().iter().enumerate() {
        let Some(pos) = rest.find(delimiter) else {
            return Err(ProtocolError::MissingDelimiter { delimiter, index });
        };
        let raw = &rest[..pos];
        if raw.is_empty() {
            return Err(ProtocolError::EmptyField(delimiter));
        }
        let value = raw.parse::<f64>().map_err(|_| ProtocolError::InvalidNumber {
            delimiter,
            raw: raw.to_string(),
        })?;
        values.push(value);
        rest = &rest[pos + delimiter.len_utf8()..];
    }

    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes(rest.len()));
    }

    Ok(values)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CORE_CLOCK_SLOTS, CORE_LOAD_SLOTS};

    fn sample_snapshot() -> SensorSnapshot {
        let mut core_loads = [0; CORE_LOAD_SLOTS];
        for (i, load) in core_loads.iter_mut().enumerate() {
            *load = (i as i64) * 5;
        }
        SensorSnapshot {
            core_loads,
            fps: 144,
            cpu_temp_c: 62.0,
            gpu_temp_c: 55.0,
            cpu_load_pct: 37.0,
            avg_clock_ghz: 4.2,
            gpu_core_clock_mhz: 1905.0,
            gpu_mem_clock_mhz: 7001.0,
            gpu_load_pct: 88.0,
            vram_used_pct: 41,
            core_clocks_mhz: [4200; CORE_CLOCK_SLOTS],
            vram_total_mb: 8192.0,
            vram_used_mb: 3400.0,
            cpu_power_w: 95.0,
            ram_load_pct: 48.0,
        }
    }

    #[test]
    fn extended_frame_matches_firmware_layout() {
        let frame = encode_extended(&sample_snapshot());
        assert_eq!(
            frame,
            "0a5b10c15d20e25f30g35h40k45j50l55m60n65o70p75q\
             144r62s55t37u4.2v1905w7001x88y41z"
        );
    }

    #[test]
    fn default_snapshot_extended_frame() {
        let frame = encode_extended(&SensorSnapshot::default());
        assert_eq!(frame, "0a0b0c0d0e0f0g0h0k0j0l0m0n0o0p0q0r0s0t0u0.0v0w0x0y0z");
    }

    #[test]
    fn legacy_frame_has_six_fields() {
        let frame = encode_legacy(&sample_snapshot());
        assert_eq!(frame, "62a37b95c55d88e48f");
    }

    #[test]
    fn decoder_recovers_every_extended_field() {
        let snap = sample_snapshot();
        let values = decode_frame(&encode_extended(&snap), FrameShape::Extended).unwrap();
        assert_eq!(values.len(), 25);
        for (i, load) in snap.core_loads.iter().enumerate() {
            assert_eq!(values[i], *load as f64);
        }
        assert_eq!(values[16], 144.0);
        assert_eq!(values[17], snap.cpu_temp_c);
        assert_eq!(values[18], snap.gpu_temp_c);
        assert_eq!(values[19], snap.cpu_load_pct);
        assert!((values[20] - snap.avg_clock_ghz).abs() < 0.05);
        assert_eq!(values[21], snap.gpu_core_clock_mhz);
        assert_eq!(values[22], snap.gpu_mem_clock_mhz);
        assert_eq!(values[23], snap.gpu_load_pct);
        assert_eq!(values[24], 41.0);
    }

    #[test]
    fn decoder_recovers_rounded_values() {
        let snap = SensorSnapshot {
            cpu_temp_c: 61.6,
            gpu_load_pct: 12.4,
            avg_clock_ghz: 3.86,
            ..Default::default()
        };
        let values = decode_frame(&encode_extended(&snap), FrameShape::Extended).unwrap();
        assert!((values[17] - snap.cpu_temp_c).abs() <= 0.5);
        assert!((values[23] - snap.gpu_load_pct).abs() <= 0.5);
        assert!((values[20] - snap.avg_clock_ghz).abs() <= 0.05);
    }

    #[test]
    fn encoding_is_deterministic() {
        let snap = sample_snapshot();
        assert_eq!(encode_frame(&snap, FrameShape::Extended), encode_frame(&snap, FrameShape::Extended));
        assert_eq!(encode_frame(&snap, FrameShape::Legacy), encode_frame(&snap, FrameShape::Legacy));
    }

    #[test]
    fn non_finite_values_encode_as_zero() {
        let snap = SensorSnapshot {
            cpu_temp_c: f64::NAN,
            avg_clock_ghz: f64::INFINITY,
            ..Default::default()
        };
        let values = decode_frame(&encode_extended(&snap), FrameShape::Extended).unwrap();
        assert_eq!(values[17], 0.0);
        assert_eq!(values[20], 0.0);
    }

    #[test]
    fn sentinels_are_distinct_four_byte_frames() {
        assert_eq!(FrameShape::Extended.disconnect_sentinel(), "DISa");
        assert_eq!(FrameShape::Legacy.disconnect_sentinel(), "DIS*");
        assert!(decode_frame("DISa", FrameShape::Extended).is_err());
    }

    #[test]
    fn decoder_rejects_truncated_frame() {
        assert_eq!(
            decode_frame("62a37b95c", FrameShape::Legacy),
            Err(ProtocolError::MissingDelimiter { delimiter: 'd', index: 3 })
        );
    }

    #[test]
    fn decoder_rejects_empty_and_garbage_fields() {
        assert_eq!(decode_frame("a1b2c3d4e5f", FrameShape::Legacy), Err(ProtocolError::EmptyField('a')));
        assert!(matches!(
            decode_frame("1a2b3c4d5e6f7", FrameShape::Legacy),
            Err(ProtocolError::TrailingBytes(1))
        ));
        assert!(matches!(
            decode_frame("1a2b3c4d5e6.6.6f", FrameShape::Legacy),
            Err(ProtocolError::InvalidNumber { delimiter: 'f', .. })
        ));
    }

    #[test]
    fn frame_shape_parses_from_text() {
        assert_eq!("extended".parse::<FrameShape>(), Ok(FrameShape::Extended));
        assert_eq!("Legacy".parse::<FrameShape>(), Ok(FrameShape::Legacy));
        assert!("v3".parse::<FrameShape>().is_err());
    }
}
