use crate::frame_buffer::{BufferError, FeatureFrameBuffer};
use crate::types::{Channel, Sample, SensorEvent, NUM_FEATURES, WINDOW_SIZE};
use std::time::Duration;
use tracing::{debug, warn};

/// Política ante un canal que deja de entregar muestras
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StallPolicy {
    /// Tiempo máximo que una fila parcial puede esperar (None = esperar siempre)
    pub timeout: Option<Duration>,
}

impl StallPolicy {
    pub fn disabled() -> Self {
        Self { timeout: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Resultado de procesar una muestra
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// La fila actual sigue incompleta
    Pending,
    /// Se completó una fila, la ventana aún no
    RowCompleted,
    /// Se completó la última fila: la ventana está lista en el buffer
    /// y el cursor ya volvió a 0
    WindowCompleted,
}

/// Ensambla las muestras de los dos canales en filas alineadas y
/// detecta los límites de fila y de ventana.
///
/// La fila se da por completa cuando la máscara tiene las 6 features,
/// sin suponer ningún orden de llegada entre canales. Si un canal entrega
/// dos muestras para la misma fila, gana la última.
pub struct WindowAssembler {
    buffer: FeatureFrameBuffer,
    cursor: usize,
    stall_policy: StallPolicy,
    row_started_at: Option<f64>,
    stalled_rows: u64,
    windows_completed: u64,
}

impl WindowAssembler {
    pub fn new(window_len: usize, stall_policy: StallPolicy) -> Self {
        Self {
            buffer: FeatureFrameBuffer::new(window_len),
            cursor: 0,
            stall_policy,
            row_started_at: None,
            stalled_rows: 0,
            windows_completed: 0,
        }
    }

    pub fn on_acceleration_sample(&mut self, sample: Sample) -> Result<RowOutcome, BufferError> {
        self.on_sample(Channel::Acceleration, sample)
    }

    pub fn on_angular_rate_sample(&mut self, sample: Sample) -> Result<RowOutcome, BufferError> {
        self.on_sample(Channel::AngularRate, sample)
    }

    pub fn on_event(&mut self, event: SensorEvent) -> Result<RowOutcome, BufferError> {
        self.on_sample(event.channel, event.sample)
    }

    fn on_sample(&mut self, channel: Channel, sample: Sample) -> Result<RowOutcome, BufferError> {
        self.apply_stall_policy(sample.timestamp);

        let offset = channel.feature_offset();
        for (axis, value) in sample.axes().into_iter().enumerate() {
            self.buffer.write(self.cursor, offset + axis, value)?;
        }

        if self.row_started_at.is_none() {
            self.row_started_at = Some(sample.timestamp);
        }

        Ok(self.check_row_complete())
    }

    /// Si la máscara está completa: limpia la máscara, avanza el cursor y,
    /// al llegar al final de la ventana, vuelve a 0
    pub fn check_row_complete(&mut self) -> RowOutcome {
        if !self.buffer.is_row_complete() {
            return RowOutcome::Pending;
        }

        self.buffer.clear_fill_mask();
        self.row_started_at = None;
        self.cursor += 1;

        if self.cursor == self.buffer.rows() {
            self.cursor = 0;
            self.windows_completed += 1;
            debug!(windows = self.windows_completed, "ventana completa");
            RowOutcome::WindowCompleted
        } else {
            RowOutcome::RowCompleted
        }
    }

    /// Descarta la fila parcial si lleva demasiado tiempo esperando al otro canal
    fn apply_stall_policy(&mut self, now: f64) {
        let (Some(timeout), Some(started)) = (self.stall_policy.timeout, self.row_started_at) else {
            return;
        };

        if now - started > timeout.as_secs_f64() && self.buffer.has_partial_row() {
            warn!(
                row = self.cursor,
                mask = ?self.buffer.fill_mask(),
                waited_s = now - started,
                "canal detenido: se descarta la fila parcial"
            );
            self.buffer.clear_fill_mask();
            self.row_started_at = None;
            self.stalled_rows += 1;
        }
    }

    /// Vuelve al estado inicial (cursor 0, máscara vacía, buffer a cero)
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.cursor = 0;
        self.row_started_at = None;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn fill_mask(&self) -> &[bool; NUM_FEATURES] {
        self.buffer.fill_mask()
    }

    pub fn buffer(&self) -> &FeatureFrameBuffer {
        &self.buffer
    }

    pub fn window_len(&self) -> usize {
        self.buffer.rows()
    }

    pub fn stalled_rows(&self) -> u64 {
        self.stalled_rows
    }

    pub fn windows_completed(&self) -> u64 {
        self.windows_completed
    }
}

impl Default for WindowAssembler {
    fn default() -> Self {
        Self::new(WINDOW_SIZE, StallPolicy::disabled())
    }
}
