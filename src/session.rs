//! Sesión de streaming con hilos separados para ingesta e inferencia.
//!
//! ```text
//! fuente ──SensorEvent──▶ ingesta (WindowAssembler) ──Window──▶ inferencia (motor)
//!                                   ▲                                │
//!                                   └────────── reciclado ◀──────────┘
//! ```
//!
//! El canal de ventanas tiene capacidad 1: como mucho hay una inferencia
//! en curso y una ventana esperando. Si ambos huecos están ocupados la
//! ingesta espera a que se libere uno, así cada ventana completa tiene
//! exactamente una inferencia. Con `drop_when_busy` la ventana nueva se
//! descarta y se cuenta, y la ingesta nunca se bloquea.
//! Cada ventana lleva la generación de la sesión; `stop()` incrementa la
//! generación, espera a los hilos y descarta cualquier resultado antiguo.

use crate::classifier::InferenceEngine;
use crate::config::StreamConfig;
use crate::prediction::PredictionState;
use crate::source::{SampleSource, SourceError};
use crate::types::{Channel, PredictionResult, SensorEvent, Window, NUM_FEATURES};
use crate::window_assembler::{RowOutcome, WindowAssembler};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(Channel),

    #[error("Session already streaming")]
    AlreadyStreaming,

    #[error("Sample source error: {0}")]
    Source(#[from] SourceError),

    #[error("Session lost its worker state after a thread panic")]
    WorkerLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

/// Contadores acumulados desde la creación de la sesión
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub events: u64,
    pub sample_errors: u64,
    pub stalled_rows: u64,
    pub windows_completed: u64,
    pub windows_dropped: u64,
    pub inferences: u64,
    pub failures: u64,
    pub discarded_results: u64,
}

#[derive(Default)]
struct Counters {
    events: AtomicU64,
    sample_errors: AtomicU64,
    stalled_rows: AtomicU64,
    windows_completed: AtomicU64,
    windows_dropped: AtomicU64,
    inferences: AtomicU64,
    failures: AtomicU64,
    discarded_results: AtomicU64,
}

type PredictionCallback = Box<dyn FnMut(Option<&PredictionResult>) + Send>;

struct Shared {
    prediction: Mutex<PredictionState>,
    generation: AtomicU64,
    counters: Counters,
    callback: Mutex<Option<PredictionCallback>>,
}

impl Shared {
    fn prediction(&self) -> MutexGuard<'_, PredictionState> {
        self.prediction.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Qué hace la ingesta cuando la inferencia está ocupada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    Wait,
    DropWhenBusy,
}

struct PendingWindow {
    generation: u64,
    window: Window,
}

/// Ensamblador y motor mientras la sesión está parada
struct IdleParts<E> {
    assembler: WindowAssembler,
    engine: E,
}

struct Running<E> {
    shutdown_tx: Sender<()>,
    ingest: JoinHandle<WindowAssembler>,
    worker: JoinHandle<E>,
}

/// Sesión explícita (sin estado global): `Idle → Streaming → Idle`
pub struct ActivitySession<E: InferenceEngine + 'static> {
    config: StreamConfig,
    source: Box<dyn SampleSource>,
    shared: Arc<Shared>,
    idle: Option<IdleParts<E>>,
    running: Option<Running<E>>,
}

impl<E: InferenceEngine + 'static> ActivitySession<E> {
    pub fn new(engine: E, source: Box<dyn SampleSource>, config: StreamConfig) -> Self {
        let shared = Arc::new(Shared {
            prediction: Mutex::new(PredictionState::new(config.hidden_len)),
            generation: AtomicU64::new(0),
            counters: Counters::default(),
            callback: Mutex::new(None),
        });

        Self {
            idle: Some(IdleParts {
                assembler: WindowAssembler::new(config.window_len, config.stall_policy()),
                engine,
            }),
            config,
            source,
            shared,
            running: None,
        }
    }

    /// Callback que se ejecuta tras cada ventana inferida (éxito o fallo).
    /// Recibe `None` cuando no hay predicción disponible.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Option<&PredictionResult>) + Send + 'static,
    {
        *self
            .shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Arranca la fuente y los hilos. Si falta algún canal no se arranca nada.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            return Err(SessionError::AlreadyStreaming);
        }
        for channel in [Channel::Acceleration, Channel::AngularRate] {
            if !self.source.is_available(channel) {
                warn!(%channel, "canal no disponible, la sesión no arranca");
                return Err(SessionError::SensorUnavailable(channel));
            }
        }

        let IdleParts { assembler, engine } = self.idle.take().ok_or(SessionError::WorkerLost)?;
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let (event_tx, event_rx) = bounded::<SensorEvent>(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (window_tx, window_rx) = bounded::<PendingWindow>(1);
        let (recycle_tx, recycle_rx) = bounded::<Window>(2);

        let shared = Arc::clone(&self.shared);
        let worker = std::thread::spawn(move || inference_loop(engine, window_rx, recycle_tx, shared));

        let shared = Arc::clone(&self.shared);
        let handoff = if self.config.drop_when_busy {
            Handoff::DropWhenBusy
        } else {
            Handoff::Wait
        };
        let ingest = std::thread::spawn(move || {
            ingest_loop(
                assembler,
                generation,
                handoff,
                event_rx,
                shutdown_rx,
                window_tx,
                recycle_rx,
                shared,
            )
        });

        self.running = Some(Running {
            shutdown_tx,
            ingest,
            worker,
        });

        if let Err(e) = self.source.start(self.config.sample_interval(), event_tx) {
            error!(error = %e, "no se pudo arrancar la fuente");
            self.stop();
            return Err(e.into());
        }

        info!(generation, "sesión iniciada");
        Ok(())
    }

    /// Para la fuente, espera a los hilos (incluida una inferencia en curso,
    /// cuyo resultado se descarta) y vuelve al estado inicial
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            self.source.stop();
            drop(running.shutdown_tx);
            self.join(running.ingest, running.worker);
            self.shared.prediction().reset();
            info!("sesión detenida");
        }
    }

    /// Espera a que la fuente se agote y a que se infieran las ventanas
    /// pendientes; devuelve la última predicción y vuelve a `Idle`.
    /// Bloquea indefinidamente si la fuente nunca termina.
    pub fn drain(&mut self) -> Option<PredictionResult> {
        let running = self.running.take()?;

        // La ingesta termina cuando la fuente suelta su emisor
        let assembler = running.ingest.join();
        drop(running.shutdown_tx);
        let engine = running.worker.join();

        let latest = self.shared.prediction().latest().cloned();

        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.source.stop();
        self.restore(assembler, engine);
        self.shared.prediction().reset();
        info!(?latest, "sesión drenada");
        latest
    }

    fn join(&mut self, ingest: JoinHandle<WindowAssembler>, worker: JoinHandle<E>) {
        let assembler = ingest.join();
        let engine = worker.join();
        self.restore(assembler, engine);
    }

    fn restore(
        &mut self,
        assembler: std::thread::Result<WindowAssembler>,
        engine: std::thread::Result<E>,
    ) {
        match (assembler, engine) {
            (Ok(mut assembler), Ok(engine)) => {
                assembler.reset();
                self.idle = Some(IdleParts { assembler, engine });
            }
            _ => error!("un hilo de la sesión terminó con pánico"),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.running.is_some() {
            SessionState::Streaming
        } else {
            SessionState::Idle
        }
    }

    /// Última predicción, o `None` si no hay ninguna disponible
    pub fn latest(&self) -> Option<PredictionResult> {
        self.shared.prediction().latest().cloned()
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.shared.counters;
        SessionStats {
            events: c.events.load(Ordering::Relaxed),
            sample_errors: c.sample_errors.load(Ordering::Relaxed),
            stalled_rows: c.stalled_rows.load(Ordering::Relaxed),
            windows_completed: c.windows_completed.load(Ordering::Relaxed),
            windows_dropped: c.windows_dropped.load(Ordering::Relaxed),
            inferences: c.inferences.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            discarded_results: c.discarded_results.load(Ordering::Relaxed),
        }
    }

    /// Para la sesión y devuelve el motor
    pub fn into_engine(mut self) -> Option<E> {
        self.stop();
        self.idle.take().map(|parts| parts.engine)
    }
}

impl<E: InferenceEngine + 'static> Drop for ActivitySession<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hilo de ingesta: único dueño del ensamblador
#[allow(clippy::too_many_arguments)]
fn ingest_loop(
    mut assembler: WindowAssembler,
    generation: u64,
    handoff: Handoff,
    events: Receiver<SensorEvent>,
    shutdown: Receiver<()>,
    windows: Sender<PendingWindow>,
    recycle: Receiver<Window>,
    shared: Arc<Shared>,
) -> WindowAssembler {
    let counters = &shared.counters;
    let mut stalled_reported = assembler.stalled_rows();

    loop {
        // Parada explícita o fuente agotada: en ambos casos termina la ingesta
        let event = select! {
            recv(shutdown) -> _ => None,
            recv(events) -> msg => msg.ok(),
        };
        let Some(event) = event else {
            break;
        };
        counters.events.fetch_add(1, Ordering::Relaxed);

        match assembler.on_event(event) {
            Ok(RowOutcome::WindowCompleted) => {
                counters.windows_completed.fetch_add(1, Ordering::Relaxed);

                let mut window = recycle
                    .try_recv()
                    .unwrap_or_else(|_| Window::zeros(assembler.window_len(), NUM_FEATURES));
                assembler.buffer().copy_into(&mut window);
                let pending = PendingWindow { generation, window };

                let delivered = match handoff {
                    Handoff::DropWhenBusy => match windows.try_send(pending) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            counters.windows_dropped.fetch_add(1, Ordering::Relaxed);
                            warn!("inferencia ocupada, ventana descartada");
                            true
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            error!("hilo de inferencia terminado");
                            false
                        }
                    },
                    // Espera a la inferencia sin dejar de atender a `stop()`
                    Handoff::Wait => select! {
                        send(windows, pending) -> res => {
                            if res.is_err() {
                                error!("hilo de inferencia terminado");
                            }
                            res.is_ok()
                        }
                        recv(shutdown) -> _ => false,
                    },
                };
                if !delivered {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                counters.sample_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "muestra descartada");
            }
        }

        let stalled = assembler.stalled_rows();
        if stalled > stalled_reported {
            counters
                .stalled_rows
                .fetch_add(stalled - stalled_reported, Ordering::Relaxed);
            stalled_reported = stalled;
        }
    }

    debug!("ingesta terminada");
    assembler
}

/// Hilo de inferencia: único dueño del motor. Termina cuando la ingesta
/// suelta su emisor y la cola queda vacía.
fn inference_loop<E: InferenceEngine>(
    mut engine: E,
    windows: Receiver<PendingWindow>,
    recycle: Sender<Window>,
    shared: Arc<Shared>,
) -> E {
    let counters = &shared.counters;

    for pending in windows.iter() {
        let hidden = {
            let prediction = shared.prediction();
            if shared.generation.load(Ordering::SeqCst) != pending.generation {
                counters.discarded_results.fetch_add(1, Ordering::Relaxed);
                let _ = recycle.try_send(pending.window);
                continue;
            }
            prediction.hidden_input()
        };

        let outcome = engine.predict(&pending.window, &hidden);

        let latest = {
            let mut prediction = shared.prediction();
            if shared.generation.load(Ordering::SeqCst) != pending.generation {
                debug!("resultado de una sesión anterior descartado");
                counters.discarded_results.fetch_add(1, Ordering::Relaxed);
                let _ = recycle.try_send(pending.window);
                continue;
            }
            let latest = prediction.apply(outcome).cloned();
            if latest.is_some() {
                counters.inferences.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
            latest
        };

        if let Some(callback) = shared
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            callback(latest.as_ref());
        }

        let _ = recycle.try_send(pending.window);
    }

    engine
}
