// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   — Siamese tower + classifier on an AD/NC dataset
//   2. `predict` — loads a checkpoint and labels images
//   3. `plot`    — redraws training curves from metrics.csv
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::Path;

use commands::{Commands, PlotArgs, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "adni-siamese",
    version = "0.1.0",
    about = "Train a triplet Siamese network on ADNI AD/NC slices, then classify scans."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; the CLI only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Plot(args)    => run_plot(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.data_dir);
    let checkpoint_dir = args.checkpoint_dir.clone();

    let report = TrainUseCase::new(args.into()).execute()?;

    match report {
        Some(report) => println!("\nTest set:\n{report}"),
        None => println!("\nNo test split; skipped test evaluation."),
    }
    println!("Training complete. Checkpoints saved to '{checkpoint_dir}'.");
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let report = PredictUseCase::new(&args.checkpoint_dir)?.execute(&args.input)?;

    for p in &report.predictions {
        println!("{}\t{}\tP(AD)={:.4}", p.path.display(), p.label, p.ad_probability);
    }
    if let Some(c) = report.confusion {
        println!(
            "\nAccuracy: {:.2}% ({}/{})  sensitivity={:.2}%  specificity={:.2}%",
            c.accuracy() * 100.0, c.correct(), c.total(),
            c.sensitivity() * 100.0, c.specificity() * 100.0,
        );
    }
    Ok(())
}

fn run_plot(args: PlotArgs) -> Result<()> {
    use crate::infra::{metrics::MetricsLogger, plot::plot_curves};

    let dir  = Path::new(&args.checkpoint_dir);
    let rows = MetricsLogger::read(dir.join("metrics.csv"))?;
    let out  = args.output_dir.unwrap_or_else(|| dir.join("plots"));

    for path in plot_curves(&rows, &out)? {
        println!("{}", path.display());
    }
    Ok(())
}
