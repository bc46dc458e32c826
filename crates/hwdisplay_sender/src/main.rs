//! # HW Display Sender
//!
//! Lê sensores de hardware e envia frames delimitados para um display
//! serial (Arduino/ESP) em intervalo fixo.
//!
//! ## Uso
//! ```bash
//! hwdisplay_sender                         # porta do config.toml (ou auto)
//! hwdisplay_sender --port COM5 --baud 115200
//! hwdisplay_sender --shape legacy          # firmware antigo de 6 campos
//! hwdisplay_sender --list-ports
//! hwdisplay_sender --probe                 # um frame no stdout, sem serial
//! ```
//!
//! Enter ou Ctrl+C enviam a sentinela de desconexão e encerram. Com stdin
//! fechado (serviço, `nohup`) só o Ctrl+C/término do processo para o loop.

mod fps;
#[cfg(windows)]
pub(crate) mod lhm_sensors;
mod monitor;
mod nvml_gpu;
mod poll_loop;
mod reader;
mod transport;

use clap::Parser;
use crossbeam_channel::Sender;
use fps::{FrameRateSource, NoFrameRate};
use hwdisplay_core::config::{AppConfig, SourcesConfig};
use hwdisplay_core::protocol::{FrameShape, encode_frame};
use hwdisplay_core::types::SensorSnapshot;
use monitor::HardwareMonitor;
use poll_loop::{Control, PollLoop, stop_requester};
use reader::SnapshotReader;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use transport::SerialConnector;

/// Envia telemetria de hardware para um display serial.
#[derive(Parser, Debug)]
#[command(name = "hwdisplay_sender", version, about)]
struct Args {
    /// Arquivo de configuração TOML (padrão: config.toml ao lado do executável).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Porta serial (ex.: COM3, /dev/ttyUSB0). Vazio = detecção automática.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Intervalo de polling em milissegundos.
    #[arg(short, long)]
    interval: Option<u32>,

    /// Formato do frame: extended ou legacy.
    #[arg(short, long)]
    shape: Option<FrameShape>,

    /// Lista as portas seriais e sai.
    #[arg(long)]
    list_ports: bool,

    /// Lê um snapshot, imprime o frame e sai (sem I/O serial).
    #[arg(long)]
    probe: bool,
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    if args.list_ports {
        list_ports();
        return ExitCode::SUCCESS;
    }

    // ── Carregar config ──
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    apply_overrides(&mut config, &args);

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config: {e}");
        }
        return ExitCode::from(2);
    }

    // ── Hardware Monitor ──
    let hw = HardwareMonitor::new(&config.sources);
    info!("Hardware monitor inicializado");
    let mut reader = SnapshotReader::new(hw, frame_rate_source(&config.sources));

    // Primeira leitura para inicializar contadores de carga
    let warmup = reader.poll(&SensorSnapshot::default());

    if args.probe {
        let snapshot = reader.poll(&warmup);
        println!("{}", encode_frame(&snapshot, config.display.shape));
        return ExitCode::SUCCESS;
    }

    let serial = &config.serial;
    let shape = config.display.shape;
    let mut poll = PollLoop::new(SerialConnector, reader, shape);

    if let Err(e) = poll.start(serial) {
        error!("Não foi possível iniciar: {e}");
        return ExitCode::FAILURE;
    }

    // ── Banner ──
    let port_label = if serial.port_name.is_empty() {
        "(auto)"
    } else {
        serial.port_name.as_str()
    };
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ HW DISPLAY SENDER – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Porta:     {port_label} @ {} baud", serial.baud_rate);
    println!("  Intervalo: {} ms", serial.poll_interval_ms);
    println!("  Frame:     {shape:?} (sentinela {})", shape.disconnect_sentinel());
    println!("  Enter ou Ctrl+C para desconectar");
    println!("══════════════════════════════════════════════");
    println!();

    let (control_tx, control_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(stop_requester(control_tx.clone())) {
        warn!("Handler de Ctrl+C não instalado: {e}");
    }
    spawn_stdin_watcher(control_tx);

    let result = poll.run(&control_rx);

    let last = poll.last_snapshot();
    info!(
        "Estado final {:?} | último frame: CPU {:.0}°C {:.0}% | GPU {:.0}°C {:.0}% | {} fps",
        poll.state(),
        last.cpu_temp_c,
        last.cpu_load_pct,
        last.gpu_temp_c,
        last.gpu_load_pct,
        last.fps
    );

    match result {
        Ok(()) => {
            info!("Encerrado");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Loop encerrado por falha do link: {e}");
            ExitCode::from(3)
        }
    }
}

/// Valores da linha de comando sobrepõem os do arquivo.
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(ref port) = args.port {
        config.serial.port_name = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(interval) = args.interval {
        config.serial.poll_interval_ms = interval;
    }
    if let Some(shape) = args.shape {
        config.display.shape = shape;
    }
}

fn frame_rate_source(sources: &SourcesConfig) -> Box<dyn FrameRateSource> {
    #[cfg(windows)]
    {
        if sources.rtss {
            info!("FPS via RTSS (0 enquanto o RTSS não estiver rodando)");
            return Box::new(fps::RtssFrameRate);
        }
    }
    #[cfg(not(windows))]
    {
        if sources.rtss {
            info!("RTSS indisponível nesta plataforma, FPS = 0");
        }
    }

    Box::new(NoFrameRate)
}

/// Bloqueia até uma linha no stdin. `false` em EOF ou erro de leitura.
fn wait_for_enter(mut input: impl BufRead) -> bool {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            warn!("Erro lendo stdin: {e}");
            false
        }
    }
}

/// Enter no stdin pede a parada do loop. EOF não para.
fn spawn_stdin_watcher(control: Sender<Control>) {
    std::thread::spawn(move || {
        let mut request_stop = stop_requester(control);
        if wait_for_enter(std::io::stdin().lock()) {
            request_stop();
            return;
        }

        info!("stdin fechado, use Ctrl+C para parar");
        // Sender vivo: canal fechado também pararia o loop
        loop {
            std::thread::park();
        }
    });
}

fn list_ports() {
    let ports = transport::available_ports();
    if ports.is_empty() {
        println!("Nenhuma porta serial encontrada");
        return;
    }
    for port in &ports {
        println!("{:<16} {}", port.port_name, transport::describe_port(port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_config() {
        let args = Args::parse_from([
            "hwdisplay_sender",
            "--port",
            "COM7",
            "--baud",
            "115200",
            "--interval",
            "250",
            "--shape",
            "legacy",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.serial.port_name, "COM7");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.poll_interval_ms, 250);
        assert_eq!(config.display.shape, FrameShape::Legacy);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let args = Args::parse_from(["hwdisplay_sender"]);
        let mut config = AppConfig::default();
        config.serial.port_name = "/dev/ttyACM0".into();
        apply_overrides(&mut config, &args);

        assert_eq!(config.serial.port_name, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.display.shape, FrameShape::Extended);
    }

    #[test]
    fn out_of_range_interval_fails_validation() {
        let args = Args::parse_from(["hwdisplay_sender", "--interval", "5"]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn enter_requests_stop_but_eof_does_not() {
        assert!(wait_for_enter(std::io::Cursor::new(b"\n".as_slice())));
        assert!(wait_for_enter(std::io::Cursor::new(b"q\n".as_slice())));
        assert!(!wait_for_enter(std::io::Cursor::new(b"".as_slice())));
    }

    #[test]
    fn frame_rate_source_without_rtss_reports_zero() {
        let sources = SourcesConfig {
            lhm: false,
            nvml: false,
            rtss: false,
        };
        assert_eq!(frame_rate_source(&sources).current_fps(), 0);
    }
}
