//! Clasificación de actividad en streaming.
//!
//! Las muestras de acelerómetro y giroscopio llegan por canales
//! independientes, se alinean en filas de 6 features y, cada 50 filas,
//! la ventana completa pasa por un modelo recurrente que arrastra su
//! estado (hidden + cell) de una ventana a la siguiente.

pub mod classifier;
pub mod config;
pub mod csv_loader;
pub mod frame_buffer;
pub mod prediction;
pub mod predictor;
pub mod session;
pub mod source;
pub mod types;
pub mod window_assembler;

#[cfg(test)]
pub(crate) mod testing;
