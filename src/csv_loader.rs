use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};

use crate::types::{Channel, Sample, SensorEvent};

/// Carga una grabación en formato timestamp,channel,x,y,z.
/// `channel` es `acc` o `gyro`; las filas se ordenan por timestamp.
pub fn load_events_from_csv(path: impl AsRef<Path>) -> Result<Vec<SensorEvent>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut events = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let line = row_idx + 2;
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", line, path))?;
        if record.len() < 5 {
            bail!("La fila {} no tiene 5 columnas", line);
        }

        let timestamp: f64 = record[0]
            .parse()
            .with_context(|| format!("timestamp inválido en fila {}", line))?;
        let channel = Channel::parse(&record[1])
            .ok_or_else(|| anyhow!("canal '{}' desconocido en fila {}", &record[1], line))?;

        let mut axes = [0.0f32; 3];
        for (axis, value) in axes.iter_mut().enumerate() {
            *value = record[2 + axis]
                .parse()
                .with_context(|| format!("eje {} inválido en fila {}", axis, line))?;
        }

        events.push(SensorEvent {
            channel,
            sample: Sample::new(timestamp, axes[0], axes[1], axes[2]),
        });
    }

    if events.is_empty() {
        return Err(anyhow!("El CSV {:?} no contiene datos", path));
    }

    // Orden estable: a igual timestamp se respeta el orden del fichero
    events.sort_by(|a, b| {
        a.sample
            .timestamp
            .partial_cmp(&b.sample.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(events)
}

/// Escribe eventos en el mismo formato que lee `load_events_from_csv`
pub fn write_events_csv(path: impl AsRef<Path>, events: &[SensorEvent]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("No se pudo crear el CSV {:?}", path))?;

    writer.write_record(["timestamp", "channel", "x", "y", "z"])?;
    for event in events {
        let s = &event.sample;
        writer.write_record([
            s.timestamp.to_string(),
            event.channel.as_str().to_string(),
            s.x.to_string(),
            s.y.to_string(),
            s.z.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
