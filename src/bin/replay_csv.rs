use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use actividad::classifier::OnnxActivityClassifier;
use actividad::config::Config;
use actividad::csv_loader::load_events_from_csv;
use actividad::predictor::StreamingPredictor;
use actividad::window_assembler::RowOutcome;

/// Pasa una grabación por el modelo sin hilos ni esperas y muestra el
/// top-5 de cada ventana
#[derive(Parser, Debug)]
#[command(name = "replay_csv")]
struct Cli {
    recording: PathBuf,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Imprime cada ventana completa como CSV
    #[arg(long)]
    dump_window: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;
    let classifier = OnnxActivityClassifier::new(&config.model)
        .with_context(|| format!("No se pudo cargar el modelo {:?}", config.model.path))?;

    let events = load_events_from_csv(&cli.recording)?;
    println!("🎞️  Reproduciendo {} muestras de {:?}", events.len(), cli.recording);

    let mut predictor = StreamingPredictor::from_config(classifier, &config.stream);
    let mut window_idx = 0usize;

    for event in events {
        if predictor.on_event(event)? != RowOutcome::WindowCompleted {
            continue;
        }

        match predictor.latest() {
            Some(top) => println!("\n🪟 Ventana {}: {}", window_idx, top),
            None => println!("\n🪟 Ventana {}: sin predicción", window_idx),
        }
        for (idx, (label, score)) in predictor.last_scores().iter().take(5).enumerate() {
            println!("  {:>2}. {:<20} {:>6.2}%", idx + 1, label, score * 100.0);
        }

        if cli.dump_window {
            print!("{}", predictor.assembler().buffer().to_csv());
        }
        window_idx += 1;
    }

    println!(
        "\n✅ {} ventanas, {} filas descartadas por canal detenido",
        window_idx,
        predictor.assembler().stalled_rows()
    );
    Ok(())
}
