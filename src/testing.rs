//! Motor de inferencia y fuente de muestras simulados para los tests

use crate::classifier::{InferenceEngine, InferenceError, ModelOutput};
use crate::source::{SampleSource, SourceError};
use crate::types::{Channel, HiddenState, Sample, SensorEvent, Window};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Una invocación registrada del motor
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub window: Window,
    pub state_in: HiddenState,
}

/// Devuelve como estado `hidden = [n; H]`, `cell = [-n; H]` en la llamada n
/// (1-based) y falla en las llamadas indicadas
pub struct ScriptedEngine {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_on: HashSet<usize>,
    gate: Option<Receiver<()>>,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on: HashSet::new(),
            gate: None,
            delay: None,
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.iter().copied().collect();
        self
    }

    /// Cada llamada se bloquea hasta recibir por `gate` o hasta que se
    /// suelte el emisor
    pub fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Simula un modelo lento
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

impl InferenceEngine for ScriptedEngine {
    fn predict(
        &mut self,
        window: &Window,
        state: &HiddenState,
    ) -> Result<ModelOutput, InferenceError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                window: window.clone(),
                state_in: state.clone(),
            });
            calls.len()
        };

        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.fail_on.contains(&n) {
            return Err(InferenceError::NoPrediction(format!("scripted failure {}", n)));
        }

        let len = state.len();
        Ok(ModelOutput {
            state: HiddenState {
                hidden: vec![n as f32; len],
                cell: vec![-(n as f32); len],
            },
            label: "walking".to_string(),
            probabilities: HashMap::from([
                ("walking".to_string(), 0.75),
                ("running".to_string(), 0.25),
            ]),
        })
    }
}

/// Fuente controlada desde el test mediante `ManualHandle`
pub struct ManualSource {
    accel_available: bool,
    gyro_available: bool,
    sink: Arc<Mutex<Option<Sender<SensorEvent>>>>,
    starts: Arc<Mutex<usize>>,
}

#[derive(Clone)]
pub struct ManualHandle {
    sink: Arc<Mutex<Option<Sender<SensorEvent>>>>,
    starts: Arc<Mutex<usize>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualHandle) {
        Self::with_availability(true, true)
    }

    pub fn with_availability(accel: bool, gyro: bool) -> (Self, ManualHandle) {
        let sink = Arc::new(Mutex::new(None));
        let starts = Arc::new(Mutex::new(0));
        let handle = ManualHandle {
            sink: Arc::clone(&sink),
            starts: Arc::clone(&starts),
        };
        (
            Self {
                accel_available: accel,
                gyro_available: gyro,
                sink,
                starts,
            },
            handle,
        )
    }
}

impl SampleSource for ManualSource {
    fn is_available(&self, channel: Channel) -> bool {
        match channel {
            Channel::Acceleration => self.accel_available,
            Channel::AngularRate => self.gyro_available,
        }
    }

    fn start(&mut self, _interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError> {
        *self.sink.lock().unwrap() = Some(sink);
        *self.starts.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.lock().unwrap().take();
    }
}

impl ManualHandle {
    pub fn send(&self, event: SensorEvent) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref()
            .expect("source not started")
            .send(event)
            .unwrap();
    }

    /// Envía `rows` filas completas (acc + gyro) con valor = índice de fila
    pub fn send_rows(&self, start: usize, rows: usize) {
        for i in start..start + rows {
            let t = i as f64 * 0.02;
            let v = i as f32;
            self.send(SensorEvent::acceleration(Sample::new(t, v, v, v)));
            self.send(SensorEvent::angular_rate(Sample::new(t, -v, -v, -v)));
        }
    }

    /// Simula el fin de la fuente (se suelta el emisor)
    pub fn close(&self) {
        self.sink.lock().unwrap().take();
    }

    pub fn starts(&self) -> usize {
        *self.starts.lock().unwrap()
    }
}

/// Espera activa con límite para condiciones que dependen de otros hilos
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
