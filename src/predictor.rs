use crate::classifier::InferenceEngine;
use crate::config::StreamConfig;
use crate::frame_buffer::BufferError;
use crate::prediction::PredictionState;
use crate::types::{PredictionResult, Sample, SensorEvent, Window, NUM_FEATURES};
use crate::window_assembler::{RowOutcome, StallPolicy, WindowAssembler};
use std::collections::HashMap;

/// Núcleo síncrono: ensambla ventanas y ejecuta la inferencia en el mismo
/// contexto que entrega las muestras (una llamada por ventana completa).
pub struct StreamingPredictor<E> {
    assembler: WindowAssembler,
    engine: E,
    state: PredictionState,
    window: Window,
    last_scores: HashMap<String, f32>,
}

impl<E: InferenceEngine> StreamingPredictor<E> {
    pub fn new(engine: E, window_len: usize, hidden_len: usize, stall_policy: StallPolicy) -> Self {
        Self {
            assembler: WindowAssembler::new(window_len, stall_policy),
            engine,
            state: PredictionState::new(hidden_len),
            window: Window::zeros(window_len, NUM_FEATURES),
            last_scores: HashMap::new(),
        }
    }

    pub fn from_config(engine: E, config: &StreamConfig) -> Self {
        Self::new(
            engine,
            config.window_len,
            config.hidden_len,
            config.stall_policy(),
        )
    }

    pub fn on_acceleration_sample(&mut self, sample: Sample) -> Result<RowOutcome, BufferError> {
        self.on_event(SensorEvent::acceleration(sample))
    }

    pub fn on_angular_rate_sample(&mut self, sample: Sample) -> Result<RowOutcome, BufferError> {
        self.on_event(SensorEvent::angular_rate(sample))
    }

    pub fn on_event(&mut self, event: SensorEvent) -> Result<RowOutcome, BufferError> {
        let outcome = self.assembler.on_event(event)?;
        if outcome == RowOutcome::WindowCompleted {
            self.assembler.buffer().copy_into(&mut self.window);
            let hidden = self.state.hidden_input();
            let result = self.engine.predict(&self.window, &hidden);
            self.last_scores = match &result {
                Ok(output) => output.probabilities.clone(),
                Err(_) => HashMap::new(),
            };
            self.state.apply(result);
        }
        Ok(outcome)
    }

    /// Última ventana entregada al modelo
    pub fn last_window(&self) -> &Window {
        &self.window
    }

    /// Probabilidades de la última ventana, de mayor a menor
    pub fn last_scores(&self) -> Vec<(String, f32)> {
        let mut scores: Vec<(String, f32)> = self
            .last_scores
            .iter()
            .map(|(label, &p)| (label.clone(), p))
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }

    pub fn latest(&self) -> Option<&PredictionResult> {
        self.state.latest()
    }

    pub fn state(&self) -> &PredictionState {
        &self.state
    }

    pub fn assembler(&self) -> &WindowAssembler {
        &self.assembler
    }

    /// Reinicio completo: cursor, máscara y estado recurrente
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.state.reset();
        self.last_scores.clear();
    }

    pub fn into_engine(self) -> E {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use crate::types::{HiddenState, HIDDEN_LEN, WINDOW_SIZE};

    fn predictor(engine: ScriptedEngine) -> StreamingPredictor<ScriptedEngine> {
        StreamingPredictor::new(engine, WINDOW_SIZE, HIDDEN_LEN, StallPolicy::disabled())
    }

    fn feed_rows(p: &mut StreamingPredictor<ScriptedEngine>, rows: usize, start: usize) {
        for i in start..start + rows {
            let t = i as f64 * 0.02;
            let v = i as f32;
            p.on_acceleration_sample(Sample::new(t, v, v + 0.1, v + 0.2))
                .unwrap();
            p.on_angular_rate_sample(Sample::new(t, -v, -v - 0.1, -v - 0.2))
                .unwrap();
        }
    }

    #[test]
    fn test_49_rows_no_inference() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 49, 0);
        assert!(calls.lock().unwrap().is_empty());
        assert!(p.latest().is_none());
    }

    #[test]
    fn test_50_rows_one_inference_with_full_window() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 50, 0);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let window = &calls[0].window;
        assert_eq!(window.shape(), [1, 50, 6]);
        assert_eq!(window.row(0).unwrap(), &[0.0, 0.1, 0.2, -0.0, -0.1, -0.2]);
        assert_eq!(window.row(49).unwrap()[0], 49.0);
        assert_eq!(window.row(49).unwrap()[3], -49.0);

        assert_eq!(p.assembler().cursor(), 0);
        let latest = p.latest().unwrap();
        assert_eq!(latest.label, "walking");
        assert_eq!(latest.probability, 0.75);
        assert_eq!(
            p.last_scores(),
            vec![("walking".to_string(), 0.75), ("running".to_string(), 0.25)]
        );
    }

    #[test]
    fn test_first_call_gets_zero_state_then_chains() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 150, 0);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].state_in, HiddenState::zeros(HIDDEN_LEN));
        assert_eq!(calls[1].state_in.hidden, vec![1.0; HIDDEN_LEN]);
        assert_eq!(calls[1].state_in.cell, vec![-1.0; HIDDEN_LEN]);
        assert_eq!(calls[2].state_in.hidden, vec![2.0; HIDDEN_LEN]);
        assert_eq!(p.state().hidden_state().unwrap().hidden, vec![3.0; HIDDEN_LEN]);
    }

    #[test]
    fn test_failed_inference_keeps_state_and_clears_result() {
        let engine = ScriptedEngine::new().failing_on(&[2]);
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 50, 0);
        assert!(p.latest().is_some());

        feed_rows(&mut p, 50, 50);
        assert!(p.latest().is_none());
        assert!(p.last_scores().is_empty());
        assert_eq!(p.state().hidden_state().unwrap().hidden, vec![1.0; HIDDEN_LEN]);

        // La llamada 3 recibe el estado de la 1
        feed_rows(&mut p, 50, 100);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[2].state_in.hidden, vec![1.0; HIDDEN_LEN]);
        assert!(p.latest().is_some());
        assert_eq!(p.state().failures(), 1);
        assert_eq!(p.state().successes(), 2);
    }

    #[test]
    fn test_second_window_overwrites_first() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 100, 0);
        let calls = calls.lock().unwrap();
        assert_eq!(calls[1].window.row(0).unwrap()[0], 50.0);
        assert_eq!(calls[1].window.row(49).unwrap()[0], 99.0);
    }

    #[test]
    fn test_gyro_first_order_independent() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        for i in 0..50 {
            let t = i as f64 * 0.02;
            let v = i as f32;
            if i % 2 == 0 {
                p.on_angular_rate_sample(Sample::new(t, 10.0 + v, 0.0, 0.0)).unwrap();
                p.on_acceleration_sample(Sample::new(t, v, 0.0, 0.0)).unwrap();
            } else {
                p.on_acceleration_sample(Sample::new(t, v, 0.0, 0.0)).unwrap();
                p.on_angular_rate_sample(Sample::new(t, 10.0 + v, 0.0, 0.0)).unwrap();
            }
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        for i in 0..50 {
            let row = calls[0].window.row(i).unwrap();
            assert_eq!(row[0], i as f32);
            assert_eq!(row[3], 10.0 + i as f32);
        }
    }

    #[test]
    fn test_reset_starts_fresh() {
        let engine = ScriptedEngine::new();
        let calls = engine.call_log();
        let mut p = predictor(engine);

        feed_rows(&mut p, 60, 0);
        p.on_acceleration_sample(Sample::new(2.0, 1.0, 1.0, 1.0)).unwrap();
        p.reset();

        assert_eq!(p.assembler().cursor(), 0);
        assert_eq!(p.assembler().fill_mask(), &[false; NUM_FEATURES]);
        assert!(p.latest().is_none());

        feed_rows(&mut p, 50, 1000);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].state_in, HiddenState::zeros(HIDDEN_LEN));
        assert_eq!(calls[1].window.row(0).unwrap()[0], 1000.0);
    }
}
