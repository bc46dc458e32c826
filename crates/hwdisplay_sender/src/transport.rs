//! Transporte serial para o microcontrolador.
//!
//! Configuração fixa 8N1, sem handshake de software, RTS ativo.
//! Só o baud rate e o timeout de escrita vêm da configuração.

use hwdisplay_core::config::SerialConfig;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::io::Write;
use tracing::{debug, info, warn};

/// Erros do transporte serial.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Porta inexistente, em uso ou sem permissão. Exige ação do usuário.
    #[error("Porta {port} indisponível: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// Falha do link em runtime (dispositivo removido, timeout, overrun).
    #[error("Falha ao enviar frame: {0}")]
    WriteFailed(String),
}

/// Conexão aberta capaz de enviar frames.
pub trait Transport {
    /// Envia um frame completo.
    fn write_frame(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Fecha a conexão. Idempotente; erros são ignorados.
    fn close(&mut self);
}

/// Abre conexões a partir da configuração.
pub trait Connector {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn Transport>, TransportError>;
}

// ──────────────────────────────────────────────
// Porta serial real
// ──────────────────────────────────────────────

/// Conector para portas seriais do sistema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SerialTransport::open(config)?))
    }
}

/// Conexão serial aberta.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Abre a porta configurada (ou a detectada, se o nome estiver vazio).
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let name = if config.port_name.is_empty() {
            let ports = available_ports();
            resolve_port_name(&ports).ok_or_else(|| TransportError::PortUnavailable {
                port: "(auto)".into(),
                reason: "nenhuma porta serial encontrada".into(),
            })?
        } else {
            config.port_name.clone()
        };

        let mut port = serialport::new(&name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout())
            .open()
            .map_err(|e| TransportError::PortUnavailable {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        // Portas virtuais (pty, Bluetooth) não têm linhas de modem
        if let Err(e) = port.write_request_to_send(true) {
            warn!("RTS não suportado em {name}, seguindo sem: {e}");
        }

        info!("Porta {name} aberta ({} baud, 8N1)", config.baud_rate);

        Ok(Self {
            port: Some(port),
            name,
        })
    }
}

impl Transport for SerialTransport {
    fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::WriteFailed(format!("{} fechada", self.name)))?;

        port.write_all(frame.as_bytes())
            .and_then(|()| port.flush())
            .map_err(|e| TransportError::WriteFailed(format!("{}: {e}", self.name)))
    }

    fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush() {
                debug!("Flush ao fechar {} ignorado: {e}", self.name);
            }
            info!("Porta {} fechada", self.name);
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ──────────────────────────────────────────────
// Descoberta de portas
// ──────────────────────────────────────────────

/// Lista as portas seriais do sistema. Falha de enumeração resulta em lista vazia.
pub fn available_ports() -> Vec<SerialPortInfo> {
    match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Falha ao listar portas seriais: {e}");
            Vec::new()
        }
    }
}

fn looks_like_usb(port: &SerialPortInfo) -> bool {
    matches!(port.port_type, SerialPortType::UsbPort(_))
        || port.port_name.contains("ttyUSB")
        || port.port_name.contains("ttyACM")
}

/// Escolhe a porta do display: USB serial primeiro, depois qualquer porta.
pub fn resolve_port_name(ports: &[SerialPortInfo]) -> Option<String> {
    let chosen = ports
        .iter()
        .find(|p| looks_like_usb(p))
        .or_else(|| ports.first())
        .map(|p| p.port_name.clone());

    if let Some(ref name) = chosen {
        info!("Porta detectada automaticamente: {name}");
    }
    chosen
}

/// Descrição curta do tipo da porta (para `--list-ports`).
pub fn describe_port(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "USB {:04x}:{:04x} {}",
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        SerialPortType::PciPort => "PCI".into(),
        SerialPortType::BluetoothPort => "Bluetooth".into(),
        SerialPortType::Unknown => "desconhecido".into(),
    }
}
