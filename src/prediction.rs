use crate::classifier::{InferenceError, ModelOutput};
use crate::types::{HiddenState, PredictionResult};
use tracing::{debug, warn};

/// Estado que sobrevive entre ventanas: hidden/cell del modelo y la
/// última predicción.
///
/// Antes de la primera inferencia no hay estado; el modelo recibe
/// entonces vectores a cero de longitud `hidden_len`.
#[derive(Debug, Clone)]
pub struct PredictionState {
    hidden_len: usize,
    hidden_state: Option<HiddenState>,
    latest: Option<PredictionResult>,
    successes: u64,
    failures: u64,
}

impl PredictionState {
    pub fn new(hidden_len: usize) -> Self {
        Self {
            hidden_len,
            hidden_state: None,
            latest: None,
            successes: 0,
            failures: 0,
        }
    }

    /// Estado que se pasa a la siguiente inferencia
    pub fn hidden_input(&self) -> HiddenState {
        self.hidden_state
            .clone()
            .unwrap_or_else(|| HiddenState::zeros(self.hidden_len))
    }

    /// Aplica el resultado de una inferencia. Cualquier fallo (del modelo,
    /// sin etiqueta utilizable o con estado de longitud incorrecta) deja la
    /// predicción como no disponible sin tocar el estado recurrente.
    pub fn apply(
        &mut self,
        outcome: Result<ModelOutput, InferenceError>,
    ) -> Option<&PredictionResult> {
        let checked = outcome.and_then(|output| {
            for (kind, len) in [
                ("hidden_out", output.state.hidden.len()),
                ("cell_out", output.state.cell.len()),
            ] {
                if len != self.hidden_len {
                    return Err(InferenceError::InvalidStateSize {
                        kind,
                        expected: self.hidden_len,
                        actual: len,
                    });
                }
            }
            let top = output.top_prediction()?;
            Ok((output, top))
        });

        match checked {
            Ok((output, top)) => {
                debug!(label = %top.label, probability = top.probability, "predicción");
                self.apply_success(output, top);
            }
            Err(e) => {
                warn!(error = %e, "inferencia fallida, predicción no disponible");
                self.apply_failure();
            }
        }
        self.latest()
    }

    /// Sustituye estado y predicción de una vez
    pub fn apply_success(&mut self, output: ModelOutput, result: PredictionResult) {
        self.hidden_state = Some(output.state);
        self.latest = Some(result);
        self.successes += 1;
    }

    /// La predicción pasa a "no disponible"; el estado recurrente se conserva
    pub fn apply_failure(&mut self) {
        self.latest = None;
        self.failures += 1;
    }

    /// Fin de sesión: sin estado ni predicción
    pub fn reset(&mut self) {
        self.hidden_state = None;
        self.latest = None;
    }

    pub fn latest(&self) -> Option<&PredictionResult> {
        self.latest.as_ref()
    }

    pub fn hidden_state(&self) -> Option<&HiddenState> {
        self.hidden_state.as_ref()
    }

    pub fn hidden_len(&self) -> usize {
        self.hidden_len
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}
