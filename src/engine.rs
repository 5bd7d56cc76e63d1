// src/engine.rs
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crate::drivers::{
    AcquisitionBridge, BridgeEvent, ExtractionDispatcher, FilterBands, RadarSource, RythmError,
    SampleBatch, SerialSource, SimulatedRadar,
};
use crate::recorder::{self, RecordingMode, SessionRecorder};
use crate::types::*;

pub type BoxedSource = Box<dyn RadarSource + Send>;
pub type SourceFactory = Box<dyn FnMut(&SessionConfig) -> anyhow::Result<BoxedSource> + Send>;

const ACTIVE_POLL: Duration = Duration::from_millis(5);
const IDLE_POLL: Duration = Duration::from_millis(50);

struct Session {
    bridge: AcquisitionBridge<BoxedSource>,
    started: Instant,
    duration_ms: u64,
    interval_secs: f64,
}

/// Owns the acquisition side of a session: source, bridge, recorder appends
/// and submission to the extraction worker.
pub struct Engine {
    tx: Sender<PipelineMessage>,
    recorder: Arc<Mutex<SessionRecorder>>,
    dispatcher: ExtractionDispatcher,
    open_source: SourceFactory,
    bands: FilterBands,
    session: Option<Session>,
}

/// Opens the device named by the session config.
pub fn open_source(config: &SessionConfig) -> anyhow::Result<BoxedSource> {
    match config.mode {
        ConnectionMode::Simulation => Ok(Box::new(SimulatedRadar::new())),
        ConnectionMode::Hardware => Ok(Box::new(SerialSource::open(&config.port)?)),
    }
}

impl Engine {
    pub fn new(
        tx: Sender<PipelineMessage>,
        recorder: Arc<Mutex<SessionRecorder>>,
        dispatcher: ExtractionDispatcher,
    ) -> Self {
        Self::with_source_factory(tx, recorder, dispatcher, Box::new(open_source))
    }

    pub fn with_source_factory(
        tx: Sender<PipelineMessage>,
        recorder: Arc<Mutex<SessionRecorder>>,
        dispatcher: ExtractionDispatcher,
        open_source: SourceFactory,
    ) -> Self {
        Self {
            tx,
            recorder,
            dispatcher,
            open_source,
            bands: FilterBands::default(),
            session: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    fn log(&self, msg: impl Into<String>) {
        self.tx.send(PipelineMessage::Log(msg.into())).ok();
    }

    fn recorder(&self) -> MutexGuard<'_, SessionRecorder> {
        recorder::lock(&self.recorder)
    }

    pub fn handle(&mut self, cmd: GuiCommand) {
        match cmd {
            GuiCommand::StartSession(config) => self.start(config),
            GuiCommand::StopSession => self.stop("stopped by user"),
            GuiCommand::SetFilterBands(bands) => match bands.validate() {
                Ok(()) => self.bands = bands,
                Err(e) => {
                    log::warn!("{e}");
                    self.log(e.to_string());
                }
            },
        }
    }

    fn start(&mut self, config: SessionConfig) {
        if self.is_running() {
            self.stop("restarted");
        }
        let source = match (self.open_source)(&config) {
            Ok(source) => source,
            Err(e) => {
                log::error!("failed to open source: {e:#}");
                self.log(format!("Connect failed: {e:#}"));
                return;
            }
        };
        self.bands = config.bands;
        let spill_path = {
            let mut recorder = self.recorder();
            recorder.reset(config.duration_min, SessionRecorder::spill_name_now());
            match recorder.mode() {
                RecordingMode::Spill { path } => Some(path.clone()),
                RecordingMode::Accumulate => None,
            }
        };
        let interval = Duration::from_secs(u64::from(config.interval_s));
        let duration_ms = u64::from(config.duration_min) * 60_000;
        self.session = Some(Session {
            bridge: AcquisitionBridge::new(source, interval),
            started: Instant::now(),
            duration_ms,
            interval_secs: interval.as_secs_f64(),
        });
        log::info!(
            "session started: {:?}, {} min, {} s interval",
            config.mode,
            config.duration_min,
            config.interval_s
        );
        self.tx
            .send(PipelineMessage::SessionStarted {
                duration_ms,
                spill_path,
            })
            .ok();
        self.log(format!(
            "Recording {} min ({} s interval)",
            config.duration_min, config.interval_s
        ));
    }

    /// Ends submissions now. Work already queued keeps draining and its
    /// results still reach the UI.
    fn stop(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };
        log::info!(
            "session {reason}: {} batches still queued, {} unbatched samples dropped",
            self.dispatcher.pending(),
            session.bridge.buffered()
        );
        self.tx.send(PipelineMessage::SessionFinished).ok();
        self.log(format!("Recording {reason}"));
    }

    /// Advances the running session to wall-clock time.
    pub fn step(&mut self) {
        if let Some(elapsed) = self.session.as_ref().map(|s| s.started.elapsed()) {
            self.pump_at(elapsed);
        }
    }

    /// Advances the running session to `elapsed` session time.
    pub fn pump_at(&mut self, elapsed: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let events = match session.bridge.pump(elapsed) {
            Ok(events) => events,
            Err(e) => {
                log::error!("acquisition failed: {e}");
                self.log(format!("Acquisition failed: {e}"));
                self.stop("aborted");
                return;
            }
        };
        let interval_secs = session.interval_secs;
        let finished = elapsed.as_millis() as u64 >= session.duration_ms;
        for event in events {
            match event {
                BridgeEvent::Batch(batch) => {
                    if let Err(e) = self.record(&batch) {
                        log::error!("{e}");
                        self.log(format!("Save failed: {e}"));
                    }
                    self.dispatcher
                        .submit(Arc::new(batch), self.bands, interval_secs);
                }
                BridgeEvent::Locator(reading) => {
                    self.tx.send(PipelineMessage::Locator(reading)).ok();
                }
                BridgeEvent::Tick(ms) => {
                    self.tx.send(PipelineMessage::TimeUpdate(ms)).ok();
                }
            }
        }
        if finished {
            self.stop("finished");
        }
    }

    fn record(&self, batch: &SampleBatch) -> Result<(), RythmError> {
        self.recorder().append(batch)
    }
}

pub fn spawn_thread(
    tx: Sender<PipelineMessage>,
    rx_cmd: Receiver<GuiCommand>,
    recorder: Arc<Mutex<SessionRecorder>>,
    dispatcher: ExtractionDispatcher,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tx.send(PipelineMessage::Log("Engine ready.".to_owned())).ok();
        let mut engine = Engine::new(tx, recorder, dispatcher);
        loop {
            for _ in 0..10 {
                match rx_cmd.try_recv() {
                    Ok(cmd) => engine.handle(cmd),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        log::debug!("command channel closed, engine exiting");
                        // dropping the engine drains the extraction queue
                        return;
                    }
                }
            }
            if engine.is_running() {
                engine.step();
                thread::sleep(ACTIVE_POLL);
            } else {
                thread::sleep(IDLE_POLL);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::error::ExtractionError;
    use crate::drivers::extractor::Extraction;
    use crate::drivers::source::{LocatorReading, ManualSource, SourceEvent};
    use crate::drivers::ExtractionResult;
    use std::sync::mpsc::channel;

    fn config() -> SessionConfig {
        SessionConfig {
            mode: ConnectionMode::Simulation,
            port: String::new(),
            duration_min: 1,
            interval_s: 10,
            bands: FilterBands::default(),
        }
    }

    fn sample(v: f64) -> SourceEvent {
        SourceEvent::Sample { ch0: v, ch1: -v }
    }

    fn constant_rate(
        ch0: &[f64],
        _ch1: &[f64],
        _interval: f64,
        _bands: &FilterBands,
    ) -> Result<Extraction, ExtractionError> {
        Ok(Extraction {
            heart_rate: ch0.len() as f64,
            ..Extraction::default()
        })
    }

    fn engine_with(
        polls: Vec<Vec<SourceEvent>>,
    ) -> (Engine, Receiver<PipelineMessage>, Arc<Mutex<SessionRecorder>>) {
        let (tx, rx) = channel();
        let recorder = Arc::new(Mutex::new(SessionRecorder::new()));
        let dispatcher = ExtractionDispatcher::spawn(constant_rate, tx.clone());
        let mut polls = Some(polls);
        let factory: SourceFactory = Box::new(move |_config: &SessionConfig| {
            let polls = polls.take().unwrap_or_default();
            Ok(Box::new(ManualSource::new(polls)) as BoxedSource)
        });
        let engine = Engine::with_source_factory(tx, Arc::clone(&recorder), dispatcher, factory);
        (engine, rx, recorder)
    }

    #[test]
    fn batches_are_recorded_and_submitted_then_session_auto_stops() {
        let locator = SourceEvent::Locator(LocatorReading {
            signal: 1.0,
            quadrature: 2.0,
        });
        let (mut engine, rx, recorder) = engine_with(vec![
            vec![sample(1.0), sample(2.0), locator],
            vec![sample(3.0)],
            vec![],
        ]);
        engine.handle(GuiCommand::StartSession(config()));
        assert!(engine.is_running());
        engine.pump_at(Duration::from_millis(500));
        engine.pump_at(Duration::from_secs(10));
        assert_eq!(recorder.lock().unwrap().len(), 3);
        engine.pump_at(Duration::from_secs(60));
        assert!(!engine.is_running());
        drop(engine);
        let messages: Vec<PipelineMessage> = rx.try_iter().collect();
        assert!(matches!(
            messages[0],
            PipelineMessage::SessionStarted {
                duration_ms: 60_000,
                spill_path: None
            }
        ));
        assert!(messages
            .iter()
            .any(|m| matches!(m, PipelineMessage::Locator(r) if r.quadrature == 2.0)));
        assert!(messages
            .iter()
            .any(|m| matches!(m, PipelineMessage::TimeUpdate(10_000))));
        assert!(messages
            .iter()
            .any(|m| matches!(m, PipelineMessage::SessionFinished)));
        let rates: Vec<f64> = messages
            .iter()
            .filter_map(|m| match m {
                PipelineMessage::Extraction(ExtractionResult { heart_rate, .. }) => {
                    Some(*heart_rate)
                }
                _ => None,
            })
            .collect();
        assert_eq!(rates, vec![3.0]);
    }

    #[test]
    fn stop_halts_submissions() {
        let (mut engine, rx, recorder) =
            engine_with(vec![vec![sample(1.0)], vec![sample(2.0)]]);
        engine.handle(GuiCommand::StartSession(config()));
        engine.handle(GuiCommand::StopSession);
        engine.pump_at(Duration::from_secs(10));
        assert!(recorder.lock().unwrap().is_empty());
        drop(engine);
        assert!(!rx
            .try_iter()
            .any(|m| matches!(m, PipelineMessage::Extraction(_))));
    }

    #[test]
    fn invalid_bands_are_ignored_with_a_log_line() {
        let (mut engine, rx, _recorder) = engine_with(vec![]);
        let bad = FilterBands {
            low_breath_hz: 1.0,
            high_breath_hz: 0.5,
            ..FilterBands::default()
        };
        engine.handle(GuiCommand::SetFilterBands(bad));
        assert_eq!(engine.bands, FilterBands::default());
        assert!(matches!(rx.try_recv(), Ok(PipelineMessage::Log(_))));
    }

    #[test]
    fn pending_save_prompt_does_not_stall_acquisition() {
        let (mut engine, _rx, shared) = engine_with(vec![
            vec![sample(1.0), sample(2.0)],
            vec![sample(3.0)],
            vec![sample(4.0)],
        ]);
        engine.handle(GuiCommand::StartSession(config()));
        engine.pump_at(Duration::from_millis(500));
        engine.pump_at(Duration::from_secs(10));
        let (entered_tx, entered_rx) = channel();
        let prompt = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                recorder::save_if_needed(
                    &shared,
                    move || {
                        entered_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(800));
                        false
                    },
                    || None,
                )
            })
        };
        entered_rx.recv().unwrap();
        let started = Instant::now();
        engine.pump_at(Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(shared.lock().unwrap().len(), 4);
        assert_eq!(prompt.join().unwrap().unwrap(), None);
    }

    #[test]
    fn long_sessions_announce_their_spill_file() {
        let (mut engine, rx, _recorder) = engine_with(vec![]);
        let long = SessionConfig {
            duration_min: 5,
            ..config()
        };
        engine.handle(GuiCommand::StartSession(long));
        engine.handle(GuiCommand::StopSession);
        let started = rx.try_iter().find_map(|m| match m {
            PipelineMessage::SessionStarted { spill_path, .. } => Some(spill_path),
            _ => None,
        });
        let Some(Some(path)) = started else {
            panic!("expected a spill path");
        };
        assert_eq!(path.extension().unwrap(), "txt");
    }

    #[test]
    fn source_failure_keeps_engine_idle() {
        let (tx, rx) = channel();
        let dispatcher = ExtractionDispatcher::spawn(constant_rate, tx.clone());
        let factory: SourceFactory =
            Box::new(|_config: &SessionConfig| Err::<BoxedSource, _>(anyhow::anyhow!("port busy")));
        let mut engine = Engine::with_source_factory(
            tx,
            Arc::new(Mutex::new(SessionRecorder::new())),
            dispatcher,
            factory,
        );
        engine.handle(GuiCommand::StartSession(config()));
        assert!(!engine.is_running());
        let Ok(PipelineMessage::Log(line)) = rx.try_recv() else {
            panic!("expected a log line");
        };
        assert!(line.contains("port busy"));
    }
}
