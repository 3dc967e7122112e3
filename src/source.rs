use crate::types::{Channel, SensorEvent};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source already running")]
    AlreadyRunning,
}

/// Fuente externa de muestras: dos canales independientes que se
/// entregan por un único `Sender`
pub trait SampleSource {
    fn is_available(&self, channel: Channel) -> bool;

    /// Empieza a emitir; el `Sender` se suelta cuando la fuente se agota
    fn start(&mut self, interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError>;

    fn stop(&mut self);
}

/// Ritmo de reproducción de una grabación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Respeta las marcas de tiempo grabadas
    Realtime,
    /// Emite todo sin esperas
    AsFastAsPossible,
}

/// Reproduce una grabación (ver `csv_loader`) en un hilo propio
pub struct CsvReplaySource {
    events: Arc<Vec<SensorEvent>>,
    pacing: Pacing,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CsvReplaySource {
    pub fn new(events: Vec<SensorEvent>, pacing: Pacing) -> Self {
        Self {
            events: Arc::new(events),
            pacing,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl SampleSource for CsvReplaySource {
    /// Un canal está disponible si la grabación tiene al menos una muestra suya
    fn is_available(&self, channel: Channel) -> bool {
        self.events.iter().any(|event| event.channel == channel)
    }

    fn start(&mut self, interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        // Un hilo anterior puede seguir bloqueado en un `send`; termina solo
        // cuando su receptor se suelta, así que no se espera por él
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }

        // Bandera nueva por reproducción: el hilo anterior solo ve la suya
        self.running = Arc::new(AtomicBool::new(true));
        let events = Arc::clone(&self.events);
        let running = Arc::clone(&self.running);
        let pacing = self.pacing;
        info!(
            events = events.len(),
            nominal_interval_ms = interval.as_millis() as u64,
            ?pacing,
            "reproduciendo grabación"
        );

        self.handle = Some(std::thread::spawn(move || {
            let started = Instant::now();
            let t0 = events.first().map(|e| e.sample.timestamp).unwrap_or(0.0);

            for event in events.iter() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if pacing == Pacing::Realtime {
                    let offset = Duration::from_secs_f64((event.sample.timestamp - t0).max(0.0));
                    if let Some(wait) = offset.checked_sub(started.elapsed()) {
                        std::thread::sleep(wait);
                    }
                }
                if sink.send(*event).is_err() {
                    break;
                }
            }

            running.store(false, Ordering::SeqCst);
            debug!("grabación terminada");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for CsvReplaySource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
