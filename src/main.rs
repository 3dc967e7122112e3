/*
Clasificación de actividad en tiempo real

Reproduce una grabación de acelerómetro + giroscopio (CSV
timestamp,channel,x,y,z) a través de una sesión de streaming:
ventanas de 50 filas a 50 Hz → modelo recurrente ONNX → etiqueta.

Para ejecutar:
    ./target/release/actividad --config actividad.toml --realtime grabacion.csv
*/

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use actividad::classifier::OnnxActivityClassifier;
use actividad::config::Config;
use actividad::csv_loader::load_events_from_csv;
use actividad::session::ActivitySession;
use actividad::source::{CsvReplaySource, Pacing};
use actividad::types::UNAVAILABLE_LABEL;

/// Reproduce una grabación de sensores y muestra la actividad predicha
#[derive(Parser, Debug)]
#[command(name = "actividad", version, about)]
struct Cli {
    /// Grabación CSV (timestamp,channel,x,y,z)
    recording: PathBuf,

    /// Fichero de configuración TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Respetar las marcas de tiempo de la grabación
    #[arg(long)]
    realtime: bool,

    /// Log a nivel debug
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load_or_default(cli.config.as_deref())
        .context("No se pudo cargar la configuración")?;

    let classifier = OnnxActivityClassifier::new(&config.model)
        .with_context(|| format!("No se pudo cargar el modelo {:?}", config.model.path))?;
    println!("🏷️  Clases: {}", classifier.labels().join(", "));

    let events = load_events_from_csv(&cli.recording)?;
    let pacing = if cli.realtime {
        Pacing::Realtime
    } else {
        Pacing::AsFastAsPossible
    };
    let source = CsvReplaySource::new(events, pacing);
    println!("🎞️  Reproduciendo {} muestras de {:?}", source.len(), cli.recording);

    let mut session = ActivitySession::new(classifier, Box::new(source), config.stream.clone());
    session.set_callback(|result| match result {
        Some(prediction) => println!("🏃 {}", prediction),
        None => println!("{} {}", UNAVAILABLE_LABEL, UNAVAILABLE_LABEL),
    });

    session.start()?;
    let last = session.drain();

    let stats = session.stats();
    println!(
        "\n📊 {} muestras, {} ventanas ({} descartadas), {} predicciones, {} fallos",
        stats.events,
        stats.windows_completed,
        stats.windows_dropped,
        stats.inferences,
        stats.failures
    );
    match last {
        Some(prediction) => println!("🥇 Última actividad: {}", prediction),
        None => println!("🥇 Última actividad: {}", UNAVAILABLE_LABEL),
    }

    Ok(())
}
