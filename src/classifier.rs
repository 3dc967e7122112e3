use crate::config::ModelConfig;
use crate::types::{HiddenState, PredictionResult, Window};
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ONNX Runtime error: {0}")]
    OnnxError(#[from] ort::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid {kind} size: expected {expected}, got {actual}")]
    InvalidStateSize {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Missing ONNX {kind} '{name}'")]
    MissingIo { kind: &'static str, name: String },

    #[error("Model returned no usable prediction: {0}")]
    NoPrediction(String),
}

/// Lo que devuelve el modelo para una ventana
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub state: HiddenState,
    pub label: String,
    pub probabilities: HashMap<String, f32>,
}

impl ModelOutput {
    /// Etiqueta principal con su probabilidad; falla si la etiqueta no
    /// aparece en el mapa de probabilidades
    pub fn top_prediction(&self) -> Result<PredictionResult, InferenceError> {
        let probability = self
            .probabilities
            .get(&self.label)
            .copied()
            .ok_or_else(|| {
                InferenceError::NoPrediction(format!("label '{}' without probability", self.label))
            })?;

        Ok(PredictionResult {
            label: self.label.clone(),
            probability,
        })
    }
}

/// Modelo recurrente con estado: ventana + estado anterior → etiqueta + estado nuevo
pub trait InferenceEngine: Send {
    fn predict(
        &mut self,
        window: &Window,
        state: &HiddenState,
    ) -> Result<ModelOutput, InferenceError>;
}

#[derive(Debug, Deserialize)]
struct ClassesJson {
    index_to_class: HashMap<String, String>,
}

/// Clasificador de actividad sobre ONNX Runtime
pub struct OnnxActivityClassifier {
    session: Session,
    labels: Vec<String>,
    config: ModelConfig,
}

impl OnnxActivityClassifier {
    pub fn new(config: &ModelConfig) -> Result<Self, InferenceError> {
        let labels = load_classes(&config.classes)?;

        let session = Session::builder()?.commit_from_file(&config.path)?;

        for name in [&config.features_input, &config.hidden_input, &config.cell_input] {
            if !session.inputs.iter().any(|input| &input.name == name) {
                return Err(InferenceError::MissingIo {
                    kind: "input",
                    name: name.clone(),
                });
            }
        }
        for name in [
            &config.probabilities_output,
            &config.hidden_output,
            &config.cell_output,
        ] {
            if !session.outputs.iter().any(|output| &output.name == name) {
                return Err(InferenceError::MissingIo {
                    kind: "output",
                    name: name.clone(),
                });
            }
        }

        info!(model = %config.path.display(), classes = ?labels, "modelo ONNX cargado");

        Ok(Self {
            session,
            labels,
            config: config.clone(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl InferenceEngine for OnnxActivityClassifier {
    fn predict(
        &mut self,
        window: &Window,
        state: &HiddenState,
    ) -> Result<ModelOutput, InferenceError> {
        let hidden_len = state.len();
        if state.cell.len() != hidden_len {
            return Err(InferenceError::InvalidStateSize {
                kind: "cell_in",
                expected: hidden_len,
                actual: state.cell.len(),
            });
        }

        // Entradas: features [1, W, F], hidden/cell [1, H]
        let features = Tensor::from_array((window.shape().to_vec(), window.as_slice().to_vec()))?;
        let hidden_in = Tensor::from_array((vec![1_usize, hidden_len], state.hidden.clone()))?;
        let cell_in = Tensor::from_array((vec![1_usize, hidden_len], state.cell.clone()))?;

        let outputs = self.session.run(ort::inputs![
            self.config.features_input.as_str() => features,
            self.config.hidden_input.as_str() => hidden_in,
            self.config.cell_input.as_str() => cell_in,
        ])?;

        let extract = |name: &str| -> Result<Vec<f32>, InferenceError> {
            let value = outputs.get(name).ok_or_else(|| InferenceError::MissingIo {
                kind: "output",
                name: name.to_string(),
            })?;
            let (_, data) = value.try_extract_tensor::<f32>()?;
            Ok(data.to_vec())
        };

        let probs = extract(&self.config.probabilities_output)?;
        let hidden = extract(&self.config.hidden_output)?;
        let cell = extract(&self.config.cell_output)?;

        for (kind, values) in [("hidden_out", &hidden), ("cell_out", &cell)] {
            if values.len() != hidden_len {
                return Err(InferenceError::InvalidStateSize {
                    kind,
                    expected: hidden_len,
                    actual: values.len(),
                });
            }
        }

        let probabilities: HashMap<String, f32> = self
            .labels
            .iter()
            .zip(probs.iter())
            .map(|(label, &p)| (label.clone(), p))
            .collect();

        let label = argmax_label(&probabilities)
            .ok_or_else(|| InferenceError::NoPrediction("empty probability output".to_string()))?;

        Ok(ModelOutput {
            state: HiddenState { hidden, cell },
            label,
            probabilities,
        })
    }
}

/// Etiquetas en el orden de salida del modelo (claves no numéricas se ignoran)
pub fn load_classes(path: impl AsRef<Path>) -> Result<Vec<String>, InferenceError> {
    let classes: ClassesJson = serde_json::from_reader(BufReader::new(File::open(path)?))?;

    let by_index: BTreeMap<usize, String> = classes
        .index_to_class
        .into_iter()
        .filter_map(|(index, label)| Some((index.parse().ok()?, label)))
        .collect();

    Ok(by_index.into_values().collect())
}

/// Etiqueta con la probabilidad más alta (NaN se trata como empate)
pub fn argmax_label(probabilities: &HashMap<String, f32>) -> Option<String> {
    probabilities
        .iter()
        .max_by(|(la, a), (lb, b)| {
            a.partial_cmp(b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| lb.cmp(la))
        })
        .map(|(label, _)| label.clone())
}
