//! Latency taxonomy: time buckets, counters, and config overlay
//!
//! Every timed read lands in one of eight categories. The first six are
//! ordered latency buckets; `Suspect` marks a read slow enough to enter the
//! retest pipeline, and `Damaged` is reserved for I/O errors and retests
//! that confirm a bad sector. Thresholds default by device class and can be
//! overlaid from a `key=value` config file.

use crate::device::{DeviceClass, DeviceDescriptor};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Latency recorded for reads that failed outright, used only for the
/// min/max/total aggregates.
pub const DAMAGED_SENTINEL_MS: u64 = 30_000;

/// Upper bound for any configured threshold, in milliseconds.
pub const THRESHOLD_MAX_MS: u64 = 30_000;

/// Read categories, ordered from best to worst
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Category {
    /// Latency at or under the excellent threshold
    Excellent,
    /// Under the good threshold
    Good,
    /// Under the normal threshold
    Normal,
    /// Under the general threshold
    General,
    /// Under the poor threshold
    Poor,
    /// Under (or beyond) the severe threshold
    Severe,
    /// At or over the suspect threshold; scheduled for retest
    Suspect,
    /// I/O error, or confirmed bad by retest
    Damaged,
}

impl Category {
    /// All categories, best first.
    pub const ALL: [Category; 8] = [
        Category::Excellent,
        Category::Good,
        Category::Normal,
        Category::General,
        Category::Poor,
        Category::Severe,
        Category::Suspect,
        Category::Damaged,
    ];

    /// Stable name used in log records and reports.
    pub fn name(self) -> &'static str {
        match self {
            Category::Excellent => "Excellent",
            Category::Good => "Good",
            Category::Normal => "Normal",
            Category::General => "General",
            Category::Poor => "Poor",
            Category::Severe => "Severe",
            Category::Suspect => "Suspect",
            Category::Damaged => "Damaged",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Latency thresholds plus the running distribution of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyTaxonomy {
    /// Upper bound for Excellent (ms)
    pub excellent_max: u64,
    /// Upper bound for Good (ms)
    pub good_max: u64,
    /// Upper bound for Normal (ms)
    pub normal_max: u64,
    /// Upper bound for General (ms)
    pub general_max: u64,
    /// Upper bound for Poor (ms)
    pub poor_max: u64,
    /// Upper bound for Severe (ms)
    pub severe_max: u64,
    /// At or above this a read is Suspect and gets retested (ms)
    pub suspect_threshold: u64,

    counts: [u64; 8],
    total_reads: u64,
    total_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

impl LatencyTaxonomy {
    /// Default thresholds for a device class.
    pub fn for_class(class: DeviceClass) -> Self {
        let (excellent, good, normal, general, poor, severe, suspect) = match class {
            DeviceClass::NvmeSsd => (1, 3, 8, 20, 50, 200, 8),
            DeviceClass::SataSsd | DeviceClass::UnknownSsd => (2, 8, 20, 50, 150, 500, 20),
            DeviceClass::Hdd => (8, 20, 40, 80, 200, 1000, 40),
            DeviceClass::UsbStorage => (5, 15, 40, 100, 300, 1500, 40),
            DeviceClass::Unknown => (5, 15, 35, 80, 200, 800, 35),
        };
        LatencyTaxonomy {
            excellent_max: excellent,
            good_max: good,
            normal_max: normal,
            general_max: general,
            poor_max: poor,
            severe_max: severe,
            suspect_threshold: suspect,
            counts: [0; 8],
            total_reads: 0,
            total_ms: 0,
            min_ms: 0,
            max_ms: 0,
        }
    }

    /// Defaults for the class of `descriptor`.
    pub fn for_device(descriptor: &DeviceDescriptor) -> Self {
        Self::for_class(descriptor.class)
    }

    /// Classify a read and record it in the distribution. Suspect wins
    /// before the six buckets are consulted; the caller routes Suspect
    /// results through the retest pipeline and books the confirmed category
    /// with [`bump`](Self::bump).
    pub fn classify(&mut self, time_ms: u64) -> Category {
        let category = if time_ms >= self.suspect_threshold {
            Category::Suspect
        } else {
            self.bucket(time_ms)
        };
        self.record(time_ms);
        self.counts[category as usize] += 1;
        category
    }

    /// Classify without touching counters or aggregates. Never returns
    /// Suspect or Damaged; latencies beyond the severe threshold stay
    /// Severe.
    pub fn classify_quiet(&self, time_ms: u64) -> Category {
        self.bucket(time_ms)
    }

    fn bucket(&self, time_ms: u64) -> Category {
        if time_ms <= self.excellent_max {
            Category::Excellent
        } else if time_ms <= self.good_max {
            Category::Good
        } else if time_ms <= self.normal_max {
            Category::Normal
        } else if time_ms <= self.general_max {
            Category::General
        } else if time_ms <= self.poor_max {
            Category::Poor
        } else {
            Category::Severe
        }
    }

    /// Book a failed read: one Damaged count, aggregates at the sentinel
    /// latency.
    pub fn record_damaged(&mut self) {
        self.record(DAMAGED_SENTINEL_MS);
        self.counts[Category::Damaged as usize] += 1;
    }

    /// Increment a category count without recording a new read. Used for
    /// the confirmed category after a retest.
    pub fn bump(&mut self, category: Category) {
        self.counts[category as usize] += 1;
    }

    fn record(&mut self, time_ms: u64) {
        self.total_reads += 1;
        self.total_ms += time_ms;
        if self.total_reads == 1 {
            self.min_ms = time_ms;
            self.max_ms = time_ms;
        } else {
            self.min_ms = self.min_ms.min(time_ms);
            self.max_ms = self.max_ms.max(time_ms);
        }
    }

    /// Count for one category.
    pub fn count(&self, category: Category) -> u64 {
        self.counts[category as usize]
    }

    /// Number of reads recorded.
    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// Sum of recorded latencies (ms).
    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    /// Fastest recorded read (ms).
    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    /// Slowest recorded read (ms).
    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    /// Mean recorded latency (ms).
    pub fn average_ms(&self) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.total_reads as f64
        }
    }

    /// Fraction of reads in `category`, in [0, 1].
    pub fn fraction(&self, category: Category) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            self.count(category) as f64 / self.total_reads as f64
        }
    }

    /// Overlay thresholds from a config file. Returns the number of
    /// recognized settings applied; the caller should re-validate after.
    pub fn load_overlay(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let applied = self.apply_overlay_text(&text)?;
        if applied == 0 {
            return Err(Error::Config(format!(
                "no recognized settings in {}",
                path.display()
            )));
        }
        Ok(applied)
    }

    /// Overlay thresholds from config text (`#` comments, blank lines
    /// skipped, `key=value` otherwise).
    pub fn apply_overlay_text(&mut self, text: &str) -> Result<usize> {
        let mut applied = 0;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Config(format!("line {}: expected key=value: {:?}", lineno + 1, raw))
            })?;
            let key = key.trim();
            let value: u64 = value.trim().parse().map_err(|_| {
                Error::Config(format!("line {}: bad value in {:?}", lineno + 1, raw))
            })?;
            if value > THRESHOLD_MAX_MS {
                return Err(Error::Config(format!(
                    "line {}: {} ms outside 0-{} ms",
                    lineno + 1,
                    value,
                    THRESHOLD_MAX_MS
                )));
            }
            match key {
                "excellent_max" => self.excellent_max = value,
                "good_max" => self.good_max = value,
                "normal_max" => self.normal_max = value,
                "general_max" => self.general_max = value,
                "poor_max" => self.poor_max = value,
                "severe_max" => self.severe_max = value,
                "suspect_threshold" => self.suspect_threshold = value,
                other => {
                    log::warn!("ignoring unknown config key {:?}", other);
                    continue;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Write the thresholds as a commented config file that `load_overlay`
    /// round-trips.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_config_text())
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Render the thresholds in config-file form.
    pub fn to_config_text(&self) -> String {
        format!(
            "# Latency taxonomy thresholds, all values in milliseconds\n\
             excellent_max={}\n\
             good_max={}\n\
             normal_max={}\n\
             general_max={}\n\
             poor_max={}\n\
             severe_max={}\n\
             # Reads at or above this trigger a retest\n\
             suspect_threshold={}\n",
            self.excellent_max,
            self.good_max,
            self.normal_max,
            self.general_max,
            self.poor_max,
            self.severe_max,
            self.suspect_threshold
        )
    }

    /// Check the threshold ordering invariants.
    pub fn validate(&self) -> Result<()> {
        let ladder = [
            self.excellent_max,
            self.good_max,
            self.normal_max,
            self.general_max,
            self.poor_max,
            self.severe_max,
        ];
        if !ladder.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::Config(format!(
                "thresholds must strictly increase: {}/{}/{}/{}/{}/{}",
                ladder[0], ladder[1], ladder[2], ladder[3], ladder[4], ladder[5]
            )));
        }
        if self.suspect_threshold < self.normal_max {
            return Err(Error::Config(format!(
                "suspect threshold ({}) must be at least the normal bound ({})",
                self.suspect_threshold, self.normal_max
            )));
        }
        if self.excellent_max == 0
            || self.severe_max > THRESHOLD_MAX_MS
            || self.suspect_threshold > THRESHOLD_MAX_MS
        {
            return Err(Error::Config(format!(
                "thresholds outside 1-{} ms",
                THRESHOLD_MAX_MS
            )));
        }
        Ok(())
    }
}
