//! # Convergence statistics
//!
//! The solver records how far the disparity moved during every warp of every level. With the
//! `statistics` feature these records can be plotted.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

#[cfg(feature = "statistics")]
use std::path::Path;

#[cfg(feature = "statistics")]
use plotters::prelude::*;

#[cfg(feature = "statistics")]
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Progress of a single warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpStats {
    pub level: usize,
    pub warp: usize,

    /// Mean absolute disparity change over the warp, in pixels of the level.
    pub mean_update: f32,
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Plot the mean update of every warp, one series per pyramid level, in solve order.
#[cfg(feature = "statistics")]
pub fn plot_stats<P: AsRef<Path>>(stats: &[WarpStats], path: P) -> Result<()> {
    if stats.is_empty() {
        return Err(Error::Statistics("no solve has been recorded".into()));
    }

    let max_update = stats
        .iter()
        .map(|s| s.mean_update)
        .fold(f32::EPSILON, f32::max);

    let root = BitMapBackend::new(path.as_ref(), (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Mean disparity update per warp", ("sans-serif", 20).into_font())
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_ranged(0f32..stats.len() as f32, 0f32..max_update * 1.1)
        .map_err(plot_error)?;

    chart.configure_mesh().draw().map_err(plot_error)?;

    let mut levels: Vec<usize> = stats.iter().map(|s| s.level).collect();
    levels.dedup();

    for level in levels {
        let colour = Palette99::pick(level).to_rgba();
        let series = stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.level == level)
            .map(|(i, s)| (i as f32, s.mean_update));

        chart
            .draw_series(LineSeries::new(series, &colour))
            .map_err(plot_error)?
            .label(format!("Level {}", level))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &colour));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;

    Ok(())
}

#[cfg(feature = "statistics")]
fn plot_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Statistics(e.to_string())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
