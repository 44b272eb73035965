// ============================================================
// Layer 6 — Training Curves
// ============================================================
// Draws per-stage loss and accuracy curves from metrics.csv:
//
//   plots/siamese_loss.png        train (blue) vs validation (red)
//   plots/siamese_accuracy.png
//   plots/classifier_loss.png
//   plots/classifier_accuracy.png
//
// The charts carry no text, so rendering needs no system fonts.

use anyhow::{anyhow, Context, Result};
use plotters::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::metrics::{EpochMetrics, Stage};

const SIZE: (u32, u32) = (1024, 768);

fn plot_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("plotting failed: {e}")
}

/// Render every stage present in `metrics`; returns the files written.
pub fn plot_curves(metrics: &[EpochMetrics], out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create '{}'", out_dir.display()))?;

    let mut written = Vec::new();
    for stage in Stage::ALL {
        let rows: Vec<&EpochMetrics> = metrics.iter().filter(|m| m.stage == stage).collect();
        if rows.is_empty() {
            continue;
        }

        let loss = out_dir.join(format!("{stage}_loss.png"));
        draw(&loss, &rows, |m| (m.train_loss, m.val_loss))?;
        written.push(loss);

        let acc = out_dir.join(format!("{stage}_accuracy.png"));
        draw(&acc, &rows, |m| (m.train_acc, m.val_acc))?;
        written.push(acc);
    }

    tracing::info!("Wrote {} plots to '{}'", written.len(), out_dir.display());
    Ok(written)
}

fn draw(path: &Path, rows: &[&EpochMetrics], pick: impl Fn(&EpochMetrics) -> (f64, f64)) -> Result<()> {
    let train: Vec<(f64, f64)> = rows.iter().map(|m| (m.epoch as f64, pick(m).0)).collect();
    // NaN marks epochs without validation
    let val: Vec<(f64, f64)> = rows
        .iter()
        .map(|m| (m.epoch as f64, pick(m).1))
        .filter(|(_, v)| v.is_finite())
        .collect();

    let x_max = rows.iter().map(|m| m.epoch).max().unwrap_or(1) as f64;
    let y_max = train
        .iter()
        .chain(&val)
        .map(|&(_, y)| y)
        .filter(|y| y.is_finite())
        .fold(0.0f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0..x_max.max(1.0), 0.0..y_max)
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(train.into_iter().filter(|(_, y)| y.is_finite()), &BLUE))
        .map_err(plot_err)?;
    if !val.is_empty() {
        chart.draw_series(LineSeries::new(val, &RED)).map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}
