//! # HW Display Core
//!
//! Crate compartilhada que define o snapshot de sensores, o protocolo
//! texto delimitado do display serial e a configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Snapshot, unidades de hardware e leituras de sensores
//! - [`protocol`] – Encode/decode dos frames estendido e legado
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod config;

// Re-exports convenientes
pub use types::{HardwareCategory, HardwareUnit, SensorKind, SensorReading, SensorSnapshot};
pub use protocol::{FrameShape, decode_frame, encode_frame};
pub use config::{AppConfig, SerialConfig};
