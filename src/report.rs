//! End-of-scan report and health verdict

use crate::taxonomy::{Category, LatencyTaxonomy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Overall device health judgment derived from the category distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthVerdict {
    /// At least 80% of reads excellent
    Excellent,
    /// At least 70% excellent or good
    Good,
    /// At least 60% in the top three buckets
    Normal,
    /// Bad reads at or under 10%
    Poor,
    /// Bad reads at or under 30%
    Bad,
    /// Worse than all of the above
    Critical,
}

impl HealthVerdict {
    /// Short advice string matching the verdict.
    pub fn advice(self) -> &'static str {
        match self {
            HealthVerdict::Excellent => "device performs like new",
            HealthVerdict::Good => "device performs normally",
            HealthVerdict::Normal => "device performance is acceptable",
            HealthVerdict::Poor => "performance is degrading; monitor the device",
            HealthVerdict::Bad => "back up your data",
            HealthVerdict::Critical => "replace the device as soon as possible",
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthVerdict::Excellent => "excellent",
            HealthVerdict::Good => "good",
            HealthVerdict::Normal => "normal",
            HealthVerdict::Poor => "poor",
            HealthVerdict::Bad => "bad",
            HealthVerdict::Critical => "critical",
        };
        write!(f, "{}", label)
    }
}

/// Aggregate results of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Scanned device path
    pub device: PathBuf,
    /// Samples the schedule would have yielded
    pub planned_samples: u64,
    /// Samples actually read (lower when cancelled)
    pub total_reads: u64,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
    /// Average throughput in bytes per second
    pub avg_bytes_per_sec: f64,
    /// Per-category read counts
    pub counts: BTreeMap<Category, u64>,
    /// Per-category fractions of `total_reads`, in [0, 1]
    pub fractions: BTreeMap<Category, f64>,
    /// Fastest read (ms)
    pub min_ms: u64,
    /// Slowest read (ms)
    pub max_ms: u64,
    /// Mean latency (ms)
    pub avg_ms: f64,
    /// Suspect threshold in effect during the scan (ms)
    pub suspect_threshold_ms: u64,
    /// Derived health judgment
    pub verdict: HealthVerdict,
    /// Damaged sectors were found; points at hardware trouble
    pub hardware_fault: bool,
    /// The scan stopped early on a cancellation request
    pub cancelled: bool,
    /// O_DIRECT was unavailable and buffered reads were used
    pub direct_io_degraded: bool,
}

impl RunReport {
    /// Build the report from the scan's final taxonomy state.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_taxonomy(
        device: PathBuf,
        taxonomy: &LatencyTaxonomy,
        planned_samples: u64,
        elapsed_secs: f64,
        block_size: u64,
        cancelled: bool,
        direct_io_degraded: bool,
    ) -> Self {
        let total_reads = taxonomy.total_reads();
        let counts: BTreeMap<Category, u64> = Category::ALL
            .iter()
            .map(|&c| (c, taxonomy.count(c)))
            .collect();
        let fractions: BTreeMap<Category, f64> = Category::ALL
            .iter()
            .map(|&c| (c, taxonomy.fraction(c)))
            .collect();
        let avg_bytes_per_sec = if elapsed_secs > 0.0 {
            total_reads as f64 * block_size as f64 / elapsed_secs
        } else {
            0.0
        };

        RunReport {
            device,
            planned_samples,
            total_reads,
            elapsed_secs,
            avg_bytes_per_sec,
            counts,
            fractions,
            min_ms: taxonomy.min_ms(),
            max_ms: taxonomy.max_ms(),
            avg_ms: taxonomy.average_ms(),
            suspect_threshold_ms: taxonomy.suspect_threshold,
            verdict: verdict_for(taxonomy),
            hardware_fault: taxonomy.count(Category::Damaged) > 0,
            cancelled,
            direct_io_degraded,
        }
    }

    /// Count for one category.
    pub fn count(&self, category: Category) -> u64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }
}

/// The verdict ladder over category fractions.
fn verdict_for(taxonomy: &LatencyTaxonomy) -> HealthVerdict {
    let excellent = taxonomy.fraction(Category::Excellent);
    let good = taxonomy.fraction(Category::Good);
    let normal = taxonomy.fraction(Category::Normal);
    let bad = taxonomy.fraction(Category::Poor)
        + taxonomy.fraction(Category::Severe)
        + taxonomy.fraction(Category::Suspect)
        + taxonomy.fraction(Category::Damaged);

    if excellent >= 0.8 {
        HealthVerdict::Excellent
    } else if excellent + good >= 0.7 {
        HealthVerdict::Good
    } else if excellent + good + normal >= 0.6 {
        HealthVerdict::Normal
    } else if bad <= 0.1 {
        HealthVerdict::Poor
    } else if bad <= 0.3 {
        HealthVerdict::Bad
    } else {
        HealthVerdict::Critical
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan summary for {}", self.device.display())?;
        writeln!(
            f,
            "  reads: {} of {} planned{}",
            self.total_reads,
            self.planned_samples,
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        writeln!(
            f,
            "  elapsed: {}  throughput: {}",
            crate::progress::format_duration(self.elapsed_secs as u64),
            crate::progress::format_rate(self.avg_bytes_per_sec)
        )?;
        writeln!(
            f,
            "  latency: min {} ms / avg {:.2} ms / max {} ms",
            self.min_ms, self.avg_ms, self.max_ms
        )?;
        for category in Category::ALL {
            writeln!(
                f,
                "  {:<10} {:>10} ({:6.2}%)",
                category.name(),
                self.count(category),
                self.fractions.get(&category).copied().unwrap_or(0.0) * 100.0
            )?;
        }
        writeln!(f, "  verdict: {} - {}", self.verdict, self.verdict.advice())?;
        if self.hardware_fault {
            writeln!(
                f,
                "  warning: {} damaged sector(s); the device may have a hardware fault",
                self.count(Category::Damaged)
            )?;
        }
        if self.direct_io_degraded {
            writeln!(f, "  note: O_DIRECT unavailable, latencies include cache effects")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;

    fn taxonomy_with(reads: &[(u64, u64)]) -> LatencyTaxonomy {
        // (latency_ms, repeat)
        let mut t = LatencyTaxonomy::for_class(DeviceClass::Hdd);
        // Keep every fixture latency below the suspect threshold so the
        // ladder sees the plain six-bucket distribution.
        t.suspect_threshold = 2000;
        for &(ms, repeat) in reads {
            for _ in 0..repeat {
                t.classify(ms);
            }
        }
        t
    }

    #[test]
    fn test_verdict_excellent() {
        let t = taxonomy_with(&[(5, 90), (15, 10)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Excellent);
    }

    #[test]
    fn test_verdict_good() {
        let t = taxonomy_with(&[(5, 40), (15, 35), (30, 25)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Good);
    }

    #[test]
    fn test_verdict_normal() {
        let t = taxonomy_with(&[(5, 20), (15, 20), (30, 25), (70, 35)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Normal);
    }

    #[test]
    fn test_verdict_poor_bad_critical() {
        // Mostly General keeps top-three share low while bad stays small.
        let t = taxonomy_with(&[(70, 95), (150, 5)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Poor);

        let t = taxonomy_with(&[(70, 80), (150, 20)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Bad);

        let t = taxonomy_with(&[(70, 50), (150, 50)]);
        assert_eq!(verdict_for(&t), HealthVerdict::Critical);
    }

    #[test]
    fn test_report_flags_and_throughput() {
        let mut t = taxonomy_with(&[(5, 99)]);
        t.record_damaged();
        let report = RunReport::from_taxonomy(
            PathBuf::from("/dev/sda"),
            &t,
            100,
            10.0,
            4096,
            false,
            false,
        );
        assert!(report.hardware_fault);
        assert_eq!(report.total_reads, 100);
        assert!((report.avg_bytes_per_sec - 100.0 * 4096.0 / 10.0).abs() < 1e-9);
        let text = report.to_string();
        assert!(text.contains("damaged sector"));
        assert!(text.contains("verdict"));
    }
}
