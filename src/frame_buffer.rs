use crate::types::{Window, NUM_FEATURES};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Index out of range: row {row} (max {rows}), feature {feature} (max {features})")]
    IndexOutOfRange {
        row: usize,
        feature: usize,
        rows: usize,
        features: usize,
    },
}

/// Buffer fijo [filas x features] que se sobrescribe fila a fila.
/// Lleva la máscara de features escritas de la fila en curso.
pub struct FeatureFrameBuffer {
    data: Vec<f32>,
    fill_mask: [bool; NUM_FEATURES],
    rows: usize,
}

impl FeatureFrameBuffer {
    /// Crea un buffer de `rows` filas; no se realoca durante la sesión
    pub fn new(rows: usize) -> Self {
        Self {
            data: vec![0.0; rows * NUM_FEATURES],
            fill_mask: [false; NUM_FEATURES],
            rows,
        }
    }

    /// Escribe un valor y marca la feature como rellenada.
    /// Fuera de rango falla sin tocar el buffer ni la máscara.
    pub fn write(&mut self, row: usize, feature: usize, value: f32) -> Result<(), BufferError> {
        if row >= self.rows || feature >= NUM_FEATURES {
            return Err(BufferError::IndexOutOfRange {
                row,
                feature,
                rows: self.rows,
                features: NUM_FEATURES,
            });
        }

        self.data[row * NUM_FEATURES + feature] = value;
        self.fill_mask[feature] = true;
        Ok(())
    }

    /// La fila está completa cuando las 6 features se han escrito
    pub fn is_row_complete(&self) -> bool {
        self.fill_mask.iter().all(|&filled| filled)
    }

    pub fn has_partial_row(&self) -> bool {
        self.fill_mask.iter().any(|&filled| filled)
    }

    pub fn fill_mask(&self) -> &[bool; NUM_FEATURES] {
        &self.fill_mask
    }

    pub fn clear_fill_mask(&mut self) {
        self.fill_mask = [false; NUM_FEATURES];
    }

    /// Limpia datos y máscara (reinicio de sesión)
    pub fn reset(&mut self) {
        self.data.fill(0.0);
        self.clear_fill_mask();
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * NUM_FEATURES;
        Some(&self.data[start..start + NUM_FEATURES])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copia el contenido a una ventana externa (doble buffer).
    /// Si la forma no coincide se redimensiona el destino.
    pub fn copy_into(&self, dst: &mut Window) {
        if dst.rows() != self.rows || dst.features() != NUM_FEATURES {
            *dst = Window::zeros(self.rows, NUM_FEATURES);
        }
        dst.as_mut_slice().copy_from_slice(&self.data);
    }

    /// Exporta la ventana a CSV: row,ax,ay,az,gx,gy,gz
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("row,ax,ay,az,gx,gy,gz\n");

        for (row_idx, row) in self.data.chunks(NUM_FEATURES).enumerate() {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                row_idx, row[0], row[1], row[2], row[3], row[4], row[5]
            ));
        }

        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_incomplete_initially() {
        let buffer = FeatureFrameBuffer::new(50);
        assert!(!buffer.is_row_complete());
        assert!(!buffer.has_partial_row());
        assert_eq!(buffer.as_slice().len(), 300);
    }

    #[test]
    fn test_write_marks_feature() {
        let mut buffer = FeatureFrameBuffer::new(50);
        buffer.write(3, 4, 1.5).unwrap();

        assert_eq!(buffer.row(3).unwrap()[4], 1.5);
        assert_eq!(
            buffer.fill_mask(),
            &[false, false, false, false, true, false]
        );
        assert!(buffer.has_partial_row());
    }

    #[test]
    fn test_row_complete_after_all_features() {
        let mut buffer = FeatureFrameBuffer::new(50);
        for feature in (0..NUM_FEATURES).rev() {
            assert!(!buffer.is_row_complete());
            buffer.write(0, feature, feature as f32).unwrap();
        }
        assert!(buffer.is_row_complete());

        buffer.clear_fill_mask();
        assert!(!buffer.is_row_complete());
        // Los datos sobreviven al limpiar la máscara
        assert_eq!(buffer.row(0).unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut buffer = FeatureFrameBuffer::new(50);

        let err = buffer.write(50, 0, 1.0).unwrap_err();
        assert_eq!(
            err,
            BufferError::IndexOutOfRange {
                row: 50,
                feature: 0,
                rows: 50,
                features: 6
            }
        );
        assert!(buffer.write(0, 6, 1.0).is_err());
        assert!(!buffer.has_partial_row());
        assert!(buffer.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_last_write_wins() {
        let mut buffer = FeatureFrameBuffer::new(4);
        buffer.write(1, 2, 1.0).unwrap();
        buffer.write(1, 2, 9.0).unwrap();
        assert_eq!(buffer.row(1).unwrap()[2], 9.0);
    }

    #[test]
    fn test_copy_into_resizes_destination() {
        let mut buffer = FeatureFrameBuffer::new(2);
        buffer.write(1, 5, 3.0).unwrap();

        let mut dst = Window::zeros(1, 1);
        buffer.copy_into(&mut dst);
        assert_eq!(dst.shape(), [1, 2, 6]);
        assert_eq!(dst.row(1).unwrap()[5], 3.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut buffer = FeatureFrameBuffer::new(2);
        buffer.write(0, 0, 2.0).unwrap();
        buffer.reset();
        assert!(!buffer.has_partial_row());
        assert!(buffer.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_to_csv_format() {
        let mut buffer = FeatureFrameBuffer::new(2);
        buffer.write(0, 0, 1.0).unwrap();
        let csv = buffer.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "row,ax,ay,az,gx,gy,gz");
        assert_eq!(lines[1], "0,1,0,0,0,0,0");
        assert_eq!(lines.len(), 3);
    }
}
