//! Suspect-sector retest protocol
//!
//! A single slow read is weak evidence: queue contention, thermal
//! recalibration, or a background flush can all stall one request. A
//! suspect sector is therefore re-read several times with pauses in
//! between, and judged on the trimmed mean of the attempts. An I/O error
//! during any attempt confirms the sector as damaged immediately.

use super::io::SectorReader;
use super::scan_log::ScanLog;
use crate::taxonomy::{Category, LatencyTaxonomy};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Fewest retest attempts allowed
pub const MIN_ATTEMPTS: u32 = 3;
/// Most retest attempts allowed
pub const MAX_ATTEMPTS: u32 = 10;

/// Retest parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetestConfig {
    /// Number of re-reads per suspect sector (3..=10)
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds; 0 disables the pause
    pub interval_ms: u64,
}

impl Default for RetestConfig {
    fn default() -> Self {
        RetestConfig {
            max_attempts: MAX_ATTEMPTS,
            interval_ms: 100,
        }
    }
}

impl RetestConfig {
    /// Clamp the attempt count into the supported range.
    pub fn clamped(self) -> Self {
        RetestConfig {
            max_attempts: self.max_attempts.clamp(MIN_ATTEMPTS, MAX_ATTEMPTS),
            interval_ms: self.interval_ms,
        }
    }
}

/// Result of retesting one suspect sector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetestOutcome {
    /// Sector that was retested
    pub sector: u64,
    /// Latencies of the successful attempts, in order (ms)
    pub attempts: Vec<u64>,
    /// Trimmed mean of the attempts (ms); 0 when no attempt succeeded
    pub trimmed_mean_ms: u64,
    /// Confirmed category for the sector
    pub final_category: Category,
    /// An attempt hit an I/O error and the retest was cut short
    pub io_error: bool,
}

/// Re-read `sector` per `config` and compute the confirmed category,
/// annotating every attempt and the conclusion in the scan log.
///
/// The reader is the engine's own descriptor, borrowed under the
/// single-threaded scan discipline; reads here use single-logical-block
/// granularity.
pub fn run_retest(
    reader: &mut dyn SectorReader,
    sector: u64,
    config: RetestConfig,
    taxonomy: &LatencyTaxonomy,
    log: &mut ScanLog,
) -> RetestOutcome {
    let config = config.clamped();
    let mut attempts = Vec::with_capacity(config.max_attempts as usize);

    for attempt in 0..config.max_attempts {
        if attempt > 0 && config.interval_ms > 0 {
            thread::sleep(Duration::from_millis(config.interval_ms));
        }
        match reader.read_single(sector) {
            Ok(latency_ms) => {
                log.record(
                    sector,
                    Some(latency_ms),
                    taxonomy.classify_quiet(latency_ms),
                    &format!("retest #{}/{}", attempt + 1, config.max_attempts),
                );
                attempts.push(latency_ms);
            }
            Err(_) => {
                // An error on re-read is a confirmed bad sector.
                log.record(sector, None, Category::Damaged, "retest failed");
                return RetestOutcome {
                    sector,
                    attempts,
                    trimmed_mean_ms: 0,
                    final_category: Category::Damaged,
                    io_error: true,
                };
            }
        }
    }

    let trimmed_mean_ms = trimmed_mean(&attempts);
    let final_category = confirm_category(taxonomy, trimmed_mean_ms);
    let note = if final_category == Category::Damaged {
        "retest failed".to_string()
    } else {
        format!("retest passed mean={}", trimmed_mean_ms)
    };
    log.record(sector, Some(trimmed_mean_ms), final_category, &note);

    RetestOutcome {
        sector,
        attempts,
        trimmed_mean_ms,
        final_category,
        io_error: false,
    }
}

/// Mean after discarding exactly one minimum and one maximum, when at
/// least three samples are present; plain mean otherwise.
pub fn trimmed_mean(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    if samples.len() < 3 {
        return samples.iter().sum::<u64>() / samples.len() as u64;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let trimmed = &sorted[1..sorted.len() - 1];
    trimmed.iter().sum::<u64>() / trimmed.len() as u64
}

/// Map a retest mean to its confirmed category: the six-bucket mapping,
/// except that a mean still past twice the severe bound counts as damage.
fn confirm_category(taxonomy: &LatencyTaxonomy, mean_ms: u64) -> Category {
    if mean_ms >= taxonomy.suspect_threshold && mean_ms > taxonomy.severe_max * 2 {
        Category::Damaged
    } else {
        taxonomy.classify_quiet(mean_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;
    use std::collections::HashMap;
    use std::io;

    /// Scripted reader: each sector yields its queued latencies in order.
    struct ScriptedReader {
        script: HashMap<u64, Vec<Option<u64>>>,
    }

    impl ScriptedReader {
        fn new(sector: u64, reads: Vec<Option<u64>>) -> Self {
            let mut script = HashMap::new();
            script.insert(sector, reads);
            ScriptedReader { script }
        }
    }

    impl SectorReader for ScriptedReader {
        fn read_block(&mut self, sector: u64) -> io::Result<u64> {
            self.read_single(sector)
        }

        fn read_single(&mut self, sector: u64) -> io::Result<u64> {
            let reads = self.script.get_mut(&sector).expect("unscripted sector");
            match reads.remove(0) {
                Some(ms) => Ok(ms),
                None => Err(io::Error::new(io::ErrorKind::Other, "scripted I/O error")),
            }
        }
    }

    fn nvme_taxonomy() -> LatencyTaxonomy {
        LatencyTaxonomy::for_class(DeviceClass::NvmeSsd)
    }

    #[test]
    fn test_trimmed_mean_drops_one_min_one_max() {
        assert_eq!(trimmed_mean(&[10, 2, 2, 2, 100]), 2);
        assert_eq!(trimmed_mean(&[5, 1, 9]), 5);
        // Fewer than three: plain mean.
        assert_eq!(trimmed_mean(&[4, 8]), 6);
        assert_eq!(trimmed_mean(&[7]), 7);
        assert_eq!(trimmed_mean(&[]), 0);
    }

    #[test]
    fn test_retest_resolves_to_good() {
        let config = RetestConfig {
            max_attempts: 5,
            interval_ms: 0,
        };
        let mut reader =
            ScriptedReader::new(4, vec![Some(2), Some(2), Some(2), Some(2), Some(2)]);
        let outcome = run_retest(&mut reader, 4, config, &nvme_taxonomy(), &mut ScanLog::disabled());
        assert_eq!(outcome.attempts.len(), 5);
        assert_eq!(outcome.trimmed_mean_ms, 2);
        assert_eq!(outcome.final_category, Category::Good);
    }

    #[test]
    fn test_retest_confirms_damaged_when_far_past_severe() {
        let config = RetestConfig {
            max_attempts: 5,
            interval_ms: 0,
        };
        let mut reader = ScriptedReader::new(4, vec![Some(1000); 5]);
        let outcome = run_retest(&mut reader, 4, config, &nvme_taxonomy(), &mut ScanLog::disabled());
        // 1000 ms > 2 * severe_max (400 ms) on NVMe thresholds.
        assert_eq!(outcome.trimmed_mean_ms, 1000);
        assert_eq!(outcome.final_category, Category::Damaged);
    }

    #[test]
    fn test_slow_but_not_extreme_keeps_bucket() {
        let config = RetestConfig {
            max_attempts: 3,
            interval_ms: 0,
        };
        let mut reader = ScriptedReader::new(9, vec![Some(300); 3]);
        let outcome = run_retest(&mut reader, 9, config, &nvme_taxonomy(), &mut ScanLog::disabled());
        // 300 ms is past severe_max (200) but under 2x: stays Severe.
        assert_eq!(outcome.final_category, Category::Severe);
    }

    #[test]
    fn test_io_error_short_circuits() {
        let config = RetestConfig {
            max_attempts: 5,
            interval_ms: 0,
        };
        let mut reader = ScriptedReader::new(4, vec![Some(3), None, Some(3), Some(3), Some(3)]);
        let outcome = run_retest(&mut reader, 4, config, &nvme_taxonomy(), &mut ScanLog::disabled());
        assert_eq!(outcome.final_category, Category::Damaged);
        assert_eq!(outcome.attempts, vec![3]);
        assert!(outcome.io_error);
    }

    #[test]
    fn test_attempt_count_clamped() {
        let config = RetestConfig {
            max_attempts: 50,
            interval_ms: 0,
        }
        .clamped();
        assert_eq!(config.max_attempts, MAX_ATTEMPTS);
        let config = RetestConfig {
            max_attempts: 1,
            interval_ms: 0,
        }
        .clamped();
        assert_eq!(config.max_attempts, MIN_ATTEMPTS);
    }
}
