use std::fmt;
use std::time::Duration;

/// Constantes del contrato con el modelo
pub const NUM_FEATURES: usize = 6; // ax, ay, az, gx, gy, gz
pub const AXES_PER_CHANNEL: usize = 3;
pub const WINDOW_SIZE: usize = 50; // filas por ventana
pub const HIDDEN_LEN: usize = 200; // longitud de hidden y cell
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(20); // 50 Hz

/// Etiqueta mostrada cuando no hay predicción disponible
pub const UNAVAILABLE_LABEL: &str = "🤷";

/// Canal de sensor independiente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Aceleración lineal (features 0, 1, 2)
    Acceleration,
    /// Velocidad angular (features 3, 4, 5)
    AngularRate,
}

impl Channel {
    /// Índice de la primera feature que ocupa el canal dentro de la fila
    pub fn feature_offset(self) -> usize {
        match self {
            Channel::Acceleration => 0,
            Channel::AngularRate => AXES_PER_CHANNEL,
        }
    }

    /// Nombre corto usado en las grabaciones CSV
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Acceleration => "acc",
            Channel::AngularRate => "gyro",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "acc" | "accel" | "acceleration" => Some(Channel::Acceleration),
            "gyro" | "rot" | "angular_rate" => Some(Channel::AngularRate),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lectura de 3 ejes con marca de tiempo (segundos, reloj de la fuente)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    pub fn new(timestamp: f64, x: f32, y: f32, z: f32) -> Self {
        Self { timestamp, x, y, z }
    }

    pub fn axes(&self) -> [f32; AXES_PER_CHANNEL] {
        [self.x, self.y, self.z]
    }
}

/// Muestra etiquetada con su canal, tal como viaja por los canales de la sesión
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub channel: Channel,
    pub sample: Sample,
}

impl SensorEvent {
    pub fn acceleration(sample: Sample) -> Self {
        Self {
            channel: Channel::Acceleration,
            sample,
        }
    }

    pub fn angular_rate(sample: Sample) -> Self {
        Self {
            channel: Channel::AngularRate,
            sample,
        }
    }
}

/// Ventana completa [filas x features] en layout fila-mayor
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    rows: usize,
    features: usize,
    data: Vec<f32>,
}

impl Window {
    pub fn zeros(rows: usize, features: usize) -> Self {
        Self {
            rows,
            features,
            data: vec![0.0; rows * features],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn features(&self) -> usize {
        self.features
    }

    /// Forma del tensor de entrada del modelo: [1, filas, features]
    pub fn shape(&self) -> [usize; 3] {
        [1, self.rows, self.features]
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.features;
        Some(&self.data[start..start + self.features])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Estado recurrente (hidden + cell) que se arrastra entre ventanas
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenState {
    pub hidden: Vec<f32>,
    pub cell: Vec<f32>,
}

impl HiddenState {
    /// Estado inicial explícito: vectores a cero
    pub fn zeros(len: usize) -> Self {
        Self {
            hidden: vec![0.0; len],
            cell: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hidden.is_empty()
    }
}

/// Última actividad predicha y su probabilidad
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub probability: f32,
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1}%)", self.label, self.probability * 100.0)
    }
}
