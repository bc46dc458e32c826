//! Loop de polling: máquina de estados `Idle` ⇄ `Connected`.
//!
//! ```text
//!          start(config) ok
//!   Idle ───────────────────▶ Connected ──┐ tick: poll → encode → write
//!    ▲                            │  ▲    │
//!    │  stop() / falha de escrita │  └────┘
//!    └────────────────────────────┘
//! ```
//!
//! Um único timer (`crossbeam_channel::tick`) e o canal de controle são
//! atendidos pelo mesmo `select!`, então ticks nunca se sobrepõem e um
//! `stop` só é processado entre ticks.

use crossbeam_channel::{Receiver, Sender, TrySendError, select, tick};
use hwdisplay_core::config::SerialConfig;
use hwdisplay_core::protocol::{FrameShape, encode_frame};
use hwdisplay_core::types::SensorSnapshot;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::fps::FrameRateSource;
use crate::reader::{SensorProvider, SnapshotReader};
use crate::transport::{Connector, Transport, TransportError};

/// Mensagens de controle vindas do colaborador externo (CLI/UI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Envia a sentinela, fecha a porta e volta a `Idle`.
    Stop,
}

/// Closure que pede a parada do loop (Ctrl+C, Enter, fechamento do console).
///
/// Nunca bloqueia: com um `Stop` já pendente os pedidos seguintes são
/// descartados, e depois do loop encerrado não fazem nada.
pub fn stop_requester(control: Sender<Control>) -> impl FnMut() + Send + 'static {
    move || match control.try_send(Control::Stop) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("Parada já pendente"),
        Err(TrySendError::Disconnected(_)) => debug!("Loop já encerrado"),
    }
}

/// Estado observável do loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Sem transporte aberto, timer desarmado
    Idle,
    /// Transporte aberto, timer armado
    Connected,
}

enum Session {
    Idle,
    Connected {
        transport: Box<dyn Transport>,
        timer: Receiver<Instant>,
    },
}

/// Orquestrador: dono do provider, do transporte e do último snapshot.
pub struct PollLoop<C, P, F> {
    connector: C,
    reader: SnapshotReader<P, F>,
    shape: FrameShape,
    last: SensorSnapshot,
    session: Session,
}

impl<C, P, F> PollLoop<C, P, F>
where
    C: Connector,
    P: SensorProvider,
    F: FrameRateSource,
{
    pub fn new(connector: C, reader: SnapshotReader<P, F>, shape: FrameShape) -> Self {
        Self {
            connector,
            reader,
            shape,
            last: SensorSnapshot::default(),
            session: Session::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        match self.session {
            Session::Idle => LoopState::Idle,
            Session::Connected { .. } => LoopState::Connected,
        }
    }

    /// Último snapshot lido (carry-forward do próximo tick).
    pub fn last_snapshot(&self) -> &SensorSnapshot {
        &self.last
    }

    /// Abre o transporte e arma o timer. Em `Connected` não faz nada.
    pub fn start(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        if let Session::Connected { .. } = self.session {
            debug!("start ignorado: já conectado");
            return Ok(());
        }

        let transport = self.connector.open(config).inspect_err(|e| {
            error!("{e}");
        })?;
        let timer = tick(config.poll_interval());
        self.session = Session::Connected { transport, timer };

        info!(
            "Conectado – enviando frames {:?} a cada {} ms",
            self.shape, config.poll_interval_ms
        );
        Ok(())
    }

    /// Um tick do timer: lê snapshot, codifica e envia.
    ///
    /// Em `Idle` não faz nada. Falha de escrita desarma o timer, fecha o
    /// transporte e volta a `Idle`; não há nova tentativa automática.
    pub fn on_tick(&mut self) -> Result<(), TransportError> {
        let Session::Connected { transport, .. } = &mut self.session else {
            trace!("tick ignorado: Idle");
            return Ok(());
        };

        let snapshot = self.reader.poll(&self.last);
        let frame = encode_frame(&snapshot, self.shape);
        self.last = snapshot;

        match transport.write_frame(&frame) {
            Ok(()) => {
                debug!("→ {} bytes: {frame}", frame.len());
                Ok(())
            }
            Err(e) => {
                error!("{e} – polling interrompido");
                self.disconnect();
                Err(e)
            }
        }
    }

    /// Envia a sentinela de desconexão (best-effort), fecha e volta a `Idle`.
    ///
    /// Em `Idle` é um no-op.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => debug!("stop ignorado: já em Idle"),
            Session::Connected { mut transport, .. } => {
                let sentinel = self.shape.disconnect_sentinel();
                if let Err(e) = transport.write_frame(sentinel) {
                    warn!("Sentinela {sentinel} não enviada: {e}");
                }
                transport.close();
                info!("Desconectado");
            }
        }
    }

    /// Fecha sem sentinela (o link já falhou).
    fn disconnect(&mut self) {
        if let Session::Connected { mut transport, .. } =
            std::mem::replace(&mut self.session, Session::Idle)
        {
            transport.close();
        }
    }

    /// Atende timer e controle até voltar a `Idle`.
    ///
    /// `Ok(())` após um stop (ou canal de controle fechado);
    /// `Err(WriteFailed)` após um tick com falha de escrita.
    pub fn run(&mut self, control: &Receiver<Control>) -> Result<(), TransportError> {
        loop {
            let timer = match &self.session {
                Session::Connected { timer, .. } => timer.clone(),
                Session::Idle => return Ok(()),
            };

            select! {
                recv(timer) -> _ => self.on_tick()?,
                recv(control) -> msg => {
                    match msg {
                        Ok(Control::Stop) => info!("Parada solicitada"),
                        Err(_) => info!("Canal de controle fechado, parando"),
                    }
                    self.stop();
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fps::NoFrameRate;
    use crate::reader::SensorError;
    use crate::transport::SerialConnector;
    use crossbeam_channel::{bounded, unbounded};
    use hwdisplay_core::protocol::encode_extended;
    use hwdisplay_core::types::{HardwareCategory, HardwareUnit, SensorKind, SensorReading};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Estado compartilhado entre o teste e o transporte falso.
    #[derive(Default)]
    struct Wire {
        frames: Mutex<Vec<String>>,
        fail_writes: AtomicBool,
        refuse_open: AtomicBool,
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl Wire {
        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    struct FakeConnector(Arc<Wire>);

    struct FakeTransport {
        wire: Arc<Wire>,
        open: bool,
    }

    impl Connector for FakeConnector {
        fn open(&self, config: &SerialConfig) -> Result<Box<dyn Transport>, TransportError> {
            if self.0.refuse_open.load(Ordering::SeqCst) {
                return Err(TransportError::PortUnavailable {
                    port: config.port_name.clone(),
                    reason: "em uso".into(),
                });
            }
            self.0.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeTransport {
                wire: Arc::clone(&self.0),
                open: true,
            }))
        }
    }

    impl Transport for FakeTransport {
        fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
            if !self.open || self.wire.fail_writes.load(Ordering::SeqCst) {
                return Err(TransportError::WriteFailed("dispositivo removido".into()));
            }
            self.wire.frames.lock().unwrap().push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.wire.closes.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Provider com uma CPU de temperatura fixa.
    struct StaticCpu;

    impl SensorProvider for StaticCpu {
        fn hardware(&mut self) -> Result<Vec<HardwareUnit>, SensorError> {
            Ok(vec![HardwareUnit {
                id: "/intelcpu/0".into(),
                name: "CPU".into(),
                category: HardwareCategory::Cpu,
            }])
        }

        fn refresh(&mut self, _unit: &HardwareUnit) -> Result<Vec<SensorReading>, SensorError> {
            Ok(vec![SensorReading::new(SensorKind::Temperature, "CPU Package", 50.0)])
        }
    }

    type TestLoop = PollLoop<FakeConnector, StaticCpu, NoFrameRate>;

    fn test_loop(shape: FrameShape) -> (TestLoop, Arc<Wire>) {
        let wire = Arc::new(Wire::default());
        let reader = SnapshotReader::new(StaticCpu, NoFrameRate);
        (PollLoop::new(FakeConnector(Arc::clone(&wire)), reader, shape), wire)
    }

    fn config(interval_ms: u32) -> SerialConfig {
        SerialConfig {
            port_name: "COM3".into(),
            poll_interval_ms: interval_ms,
            ..SerialConfig::default()
        }
    }

    fn expected_frame() -> String {
        encode_extended(&SensorSnapshot {
            cpu_temp_c: 50.0,
            ..Default::default()
        })
    }

    #[test]
    fn start_with_unopenable_port_stays_idle() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        wire.refuse_open.store(true, Ordering::SeqCst);

        let result = poll.start(&config(1000));
        assert!(matches!(result, Err(TransportError::PortUnavailable { .. })));
        assert_eq!(poll.state(), LoopState::Idle);

        // Timer nunca armado: tick não envia nada
        poll.on_tick().unwrap();
        assert!(wire.frames().is_empty());
    }

    #[test]
    fn real_serial_connector_reports_missing_port() {
        let reader = SnapshotReader::new(StaticCpu, NoFrameRate);
        let mut poll = PollLoop::new(SerialConnector, reader, FrameShape::Extended);
        let cfg = SerialConfig {
            port_name: "/dev/hwdisplay-no-such-port".into(),
            ..SerialConfig::default()
        };
        assert!(matches!(poll.start(&cfg), Err(TransportError::PortUnavailable { .. })));
        assert_eq!(poll.state(), LoopState::Idle);
    }

    #[test]
    fn tick_writes_encoded_snapshot() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        assert_eq!(poll.state(), LoopState::Connected);

        poll.on_tick().unwrap();
        assert_eq!(wire.frames(), vec![expected_frame()]);
        assert_eq!(poll.last_snapshot().cpu_temp_c, 50.0);
    }

    #[test]
    fn start_while_connected_is_a_noop() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        poll.start(&config(1000)).unwrap();
        assert_eq!(wire.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn write_failure_goes_idle_and_later_stop_is_noop() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        wire.fail_writes.store(true, Ordering::SeqCst);

        assert!(matches!(poll.on_tick(), Err(TransportError::WriteFailed(_))));
        assert_eq!(poll.state(), LoopState::Idle);
        assert_eq!(wire.closes.load(Ordering::SeqCst), 1);

        wire.fail_writes.store(false, Ordering::SeqCst);
        poll.stop();
        assert!(wire.frames().is_empty(), "stop em Idle não envia sentinela");
        assert_eq!(wire.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_sends_sentinel_once_then_nothing() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        poll.on_tick().unwrap();
        poll.stop();

        assert_eq!(poll.state(), LoopState::Idle);
        assert_eq!(wire.frames(), vec![expected_frame(), "DISa".to_string()]);

        // Tick tardio e stop repetido não escrevem mais nada
        poll.on_tick().unwrap();
        poll.stop();
        assert_eq!(wire.frames().len(), 2);
        assert_eq!(wire.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn legacy_shape_uses_its_own_sentinel() {
        let (mut poll, wire) = test_loop(FrameShape::Legacy);
        poll.start(&config(1000)).unwrap();
        poll.on_tick().unwrap();
        poll.stop();
        assert_eq!(wire.frames(), vec!["50a0b0c0d0e0f".to_string(), "DIS*".to_string()]);
    }

    #[test]
    fn stop_succeeds_even_if_sentinel_write_fails() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        wire.fail_writes.store(true, Ordering::SeqCst);
        poll.stop();
        assert_eq!(poll.state(), LoopState::Idle);
        assert_eq!(wire.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_after_failure_keeps_last_snapshot() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(1000)).unwrap();
        poll.on_tick().unwrap();
        wire.fail_writes.store(true, Ordering::SeqCst);
        assert!(poll.on_tick().is_err());

        wire.fail_writes.store(false, Ordering::SeqCst);
        poll.start(&config(1000)).unwrap();
        assert_eq!(poll.state(), LoopState::Connected);
        assert_eq!(poll.last_snapshot().cpu_temp_c, 50.0);
        assert_eq!(wire.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_in_idle_returns_immediately() {
        let (mut poll, _wire) = test_loop(FrameShape::Extended);
        let (_tx, rx) = unbounded();
        assert!(poll.run(&rx).is_ok());
    }

    #[test]
    fn run_stops_on_control_message() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        // Intervalo longo: o único evento pronto é o Stop
        poll.start(&config(60_000)).unwrap();
        let (tx, rx) = unbounded();
        tx.send(Control::Stop).unwrap();

        assert!(poll.run(&rx).is_ok());
        assert_eq!(poll.state(), LoopState::Idle);
        assert_eq!(wire.frames(), vec!["DISa".to_string()]);
    }

    #[test]
    fn interrupt_stop_ends_wire_with_sentinel() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(60_000)).unwrap();
        poll.on_tick().unwrap();

        let (tx, rx) = bounded(1);
        let mut request_stop = stop_requester(tx);
        // Dois sinais seguidos: o segundo não pode bloquear o handler
        std::thread::spawn(move || {
            request_stop();
            request_stop();
        })
        .join()
        .unwrap();

        assert!(poll.run(&rx).is_ok());
        assert_eq!(wire.frames(), vec![expected_frame(), "DISa".to_string()]);
        assert_eq!(wire.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_request_after_loop_ended_is_harmless() {
        let (tx, rx) = bounded(1);
        let mut request_stop = stop_requester(tx);
        drop(rx);
        request_stop();
    }

    #[test]
    fn run_stops_when_control_channel_closes() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(60_000)).unwrap();
        let (tx, rx) = unbounded::<Control>();
        drop(tx);

        assert!(poll.run(&rx).is_ok());
        assert_eq!(wire.frames(), vec!["DISa".to_string()]);
    }

    #[test]
    fn run_ticks_until_write_fails() {
        let (mut poll, wire) = test_loop(FrameShape::Extended);
        poll.start(&config(5)).unwrap();
        let (_tx, rx) = unbounded();

        let failer = {
            let wire = Arc::clone(&wire);
            std::thread::spawn(move || {
                while wire.frames().len() < 3 {
                    std::thread::sleep(Duration::from_millis(1));
                }
                wire.fail_writes.store(true, Ordering::SeqCst);
            })
        };

        let result = poll.run(&rx);
        failer.join().unwrap();

        assert!(matches!(result, Err(TransportError::WriteFailed(_))));
        assert_eq!(poll.state(), LoopState::Idle);
        assert!(wire.frames().len() >= 3);
        assert!(wire.frames().iter().all(|f| f == &expected_frame()));
    }
}
