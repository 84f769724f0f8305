//! Tick input sources for the CLI.
//!
//! - [`ReplayReader`] – recorded sessions, one JSON [`TickInput`] per line.
//! - [`WanderingBall`] – a synthetic treadmill for dry runs without a rig.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ballnav_hal::MotionSensor;
use ballnav_runtime::TickInput;
use ballnav_types::{SensorReading, SensorSample};

// ────────────────────────────────────────────────────────────────────────────
// Replay
// ────────────────────────────────────────────────────────────────────────────

/// Streams [`TickInput`]s from a JSON-lines reader.
///
/// Blank lines and lines starting with `#` are skipped.  Errors carry the
/// 1-based line number.
pub struct ReplayReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl ReplayReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open replay {}: {}", path.display(), e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for ReplayReader<R> {
    type Item = Result<TickInput, String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(format!("line {}: {}", self.line_no, e))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed)
                    .map_err(|e| format!("line {}: {}", self.line_no, e)),
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Synthetic treadmill
// ────────────────────────────────────────────────────────────────────────────

/// An animal that keeps running forward while slowly weaving left and right.
///
/// Both sensors see the same forward (`dy`) roll; the sideways (`dx`)
/// component follows a sine so the heading oscillates.
pub struct WanderingBall {
    tick_period_ms: u64,
    forward_counts: f64,
    weave_counts: f64,
    ticks: u64,
}

impl WanderingBall {
    pub fn new(tick_period_ms: u64) -> Self {
        Self {
            tick_period_ms,
            forward_counts: 40.0,
            weave_counts: 25.0,
            ticks: 0,
        }
    }
}

impl MotionSensor for WanderingBall {
    fn id(&self) -> &str {
        "wandering_ball"
    }

    fn read(&mut self) -> Option<SensorSample> {
        self.ticks += 1;
        let phase = self.ticks as f64 * 0.01;
        let dx = self.weave_counts * phase.sin();
        let reading = SensorReading::new(dx, self.forward_counts);
        Some(SensorSample::new(
            self.ticks * self.tick_period_ms,
            reading,
            reading,
        ))
    }
}
