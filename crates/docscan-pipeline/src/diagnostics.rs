//! Scan diagnostics: timing and counts for each stage of one scan.
//!
//! Collected by [`Scanner::process`](crate::Scanner::process) alongside
//! the output artifact, for tuning detector parameters against real
//! captures. Timestamps come from `web-time`, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detect::DetectionMetrics;
use crate::types::{Dimensions, ProcessingMode};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single scan.
///
/// Stages that did not run are `None`: detection is skipped when the
/// caller supplies corners, signing when there is no signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDiagnostics {
    pub detection: Option<StageDiagnostics>,
    pub rectification: StageDiagnostics,
    pub enhancement: StageDiagnostics,
    pub signature: Option<StageDiagnostics>,
    /// Wall-clock duration of the whole scan (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub summary: ScanSummary,
}

/// Diagnostics for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Detection(DetectionMetrics),
    Rectification {
        /// Output raster width in pixels.
        width: u32,
        /// Output raster height in pixels.
        height: u32,
    },
    Enhancement {
        mode: ProcessingMode,
        /// `true` when a stage failed and the rectified raster was kept.
        fell_back: bool,
    },
    Signature {
        /// Layer pixels with non-zero alpha.
        stroke_pixels: u64,
    },
}

/// Whole-scan summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub frame: Dimensions,
    pub output: Dimensions,
    pub mode: ProcessingMode,
    /// Whether the corners came from auto-detection.
    pub detected: bool,
}

impl ScanDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Scan Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Frame: {} -> output {} ({})",
            self.summary.frame, self.summary.output, self.summary.mode,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages: Vec<(&str, &StageDiagnostics)> = Vec::new();
        if let Some(ref d) = self.detection {
            stages.push(("Detection", d));
        }
        stages.push(("Rectification", &self.rectification));
        stages.push(("Enhancement", &self.enhancement));
        if let Some(ref s) = self.signature {
            stages.push(("Signature", s));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Corners: {}",
            if self.summary.detected {
                "auto-detected"
            } else {
                "supplied"
            },
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Detection(m) => {
            let working = m
                .working
                .map_or_else(|| "-".to_owned(), |d| d.to_string());
            let winner = match (m.winning_score, m.winning_area) {
                (Some(score), Some(area)) => format!("score={score:.3} area={area:.0}"),
                _ => "none".to_owned(),
            };
            format!(
                "{working} edges={} contours={} quads={} rejected={} failed={} winner: {winner}",
                m.edge_pixels, m.contours, m.quadrilaterals, m.area_rejected, m.failed_candidates,
            )
        }
        StageMetrics::Rectification { width, height } => format!("{width}x{height}"),
        StageMetrics::Enhancement { mode, fell_back } => {
            if *fell_back {
                format!("{mode} (fell back to rectified)")
            } else {
                mode.to_string()
            }
        }
        StageMetrics::Signature { stroke_pixels } => format!("{stroke_pixels} stroke pixels"),
    }
}

/// Count pixels with non-zero alpha.
pub(crate) fn count_stroke_pixels(layer: &image::RgbaImage) -> u64 {
    layer.pixels().map(|p| u64::from(p.0[3] > 0)).sum()
}
