//! Scan engine: the timed-read loop and its collaborators
//!
//! The engine drives one pass over a [`SampleSchedule`](crate::schedule::SampleSchedule):
//! each scheduled sector gets one timed direct read, the latency is
//! classified, suspects are routed through the retest protocol, counters
//! and the progress display are updated, and a CSV record is appended when
//! the log policy asks for it. Everything runs on a single execution
//! context; the only shared mutable state is the cancellation flag.

pub mod io;
pub mod retest;
pub mod scan_log;

pub use io::{DirectReader, SectorReader};
pub use retest::{RetestConfig, RetestOutcome};
pub use scan_log::ScanLog;

use crate::device::{probe, DeviceDescriptor};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::report::RunReport;
use crate::schedule::SampleSchedule;
use crate::taxonomy::{Category, LatencyTaxonomy};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Process-wide cancellation flag. The signal glue in the host binary is
/// the single writer; the engine's loop guard is the single reader.
static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Ask the running scan to stop at the next loop boundary. Safe to call
/// from a signal handler.
pub fn request_cancel() {
    CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

/// Whether a cancellation request is pending.
pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::SeqCst)
}

fn clear_cancel() {
    CANCEL_REQUESTED.store(false, Ordering::SeqCst);
}

/// One endpoint of the scan range: an absolute sector or a percentage of
/// the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RangeSpec {
    /// Absolute sector index, in logical blocks
    Sector(u64),
    /// Percentage of the device's logical sector count
    Percent(f64),
}

impl RangeSpec {
    /// Resolve to a sector index on a device of `total_sectors` logical
    /// blocks.
    pub fn resolve(self, total_sectors: u64) -> u64 {
        match self {
            RangeSpec::Sector(sector) => sector,
            RangeSpec::Percent(percent) => (percent / 100.0 * total_sectors as f64) as u64,
        }
    }
}

impl FromStr for RangeSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(number) = s.strip_suffix('%') {
            let percent: f64 = number
                .parse()
                .map_err(|_| Error::InvalidParameter(format!("bad percentage {:?}", s)))?;
            if !(0.0..=100.0).contains(&percent) {
                return Err(Error::InvalidParameter(format!(
                    "percentage {:?} outside 0%-100%",
                    s
                )));
            }
            Ok(RangeSpec::Percent(percent))
        } else {
            let sector: u64 = s
                .parse()
                .map_err(|_| Error::InvalidParameter(format!("bad sector index {:?}", s)))?;
            Ok(RangeSpec::Sector(sector))
        }
    }
}

impl std::fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeSpec::Sector(sector) => write!(f, "{}", sector),
            RangeSpec::Percent(percent) => write!(f, "{}%", percent),
        }
    }
}

/// Everything a scan needs to know, before device resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Block device to scan
    pub device: PathBuf,
    /// Start of the range
    pub start: RangeSpec,
    /// End of the range (half-open)
    pub end: RangeSpec,
    /// Bytes per read; must be a multiple of the logical block size
    pub block_size: usize,
    /// Scan log path; `None` disables logging
    pub log_path: Option<PathBuf>,
    /// Only log reads at or above this latency; 0 logs every read (ms)
    pub log_threshold_ms: u64,
    /// Taxonomy overlay config file
    pub config_path: Option<PathBuf>,
    /// Fraction of the range to sample, in (0.0, 1.0]
    pub sample_ratio: f64,
    /// Randomize sample positions within each stride
    pub random_sampling: bool,
    /// Seed for randomized sampling
    pub seed: u64,
    /// Sleep this percentage of the previous latency before each read;
    /// 0 disables pacing
    pub wait_factor: u32,
    /// Suspect threshold in ms; 0 picks the recommended value by class
    pub suspect_threshold_ms: u64,
    /// Retest attempts per suspect sector (3..=10)
    pub retest_attempts: u32,
    /// Pause between retest attempts (ms)
    pub retest_interval_ms: u64,
    /// Suppress the live progress display
    pub quiet: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            device: PathBuf::new(),
            start: RangeSpec::Sector(0),
            end: RangeSpec::Percent(100.0),
            block_size: 4096,
            log_path: None,
            log_threshold_ms: 0,
            config_path: None,
            sample_ratio: 1.0,
            random_sampling: false,
            seed: 0,
            wait_factor: 0,
            suspect_threshold_ms: 0,
            retest_attempts: retest::MAX_ATTEMPTS,
            retest_interval_ms: 100,
            quiet: false,
        }
    }
}

impl ScanOptions {
    /// Check the device-independent constraints.
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 512 {
            return Err(Error::InvalidParameter(format!(
                "block size {} under 512 bytes",
                self.block_size
            )));
        }
        if self.block_size > 1024 * 1024 {
            return Err(Error::InvalidParameter(format!(
                "block size {} over 1 MiB",
                self.block_size
            )));
        }
        if !(self.sample_ratio > 0.0 && self.sample_ratio <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "sample ratio {} outside (0.0, 1.0]",
                self.sample_ratio
            )));
        }
        if !(retest::MIN_ATTEMPTS..=retest::MAX_ATTEMPTS).contains(&self.retest_attempts) {
            return Err(Error::InvalidParameter(format!(
                "retest attempts {} outside {}..={}",
                self.retest_attempts,
                retest::MIN_ATTEMPTS,
                retest::MAX_ATTEMPTS
            )));
        }
        Ok(())
    }
}

/// One scan, resolved against a concrete device
pub struct ScanEngine {
    descriptor: DeviceDescriptor,
    options: ScanOptions,
    taxonomy: LatencyTaxonomy,
    schedule: SampleSchedule,
    log: ScanLog,
}

impl ScanEngine {
    /// Resolve `options` against `descriptor`: derive the taxonomy, apply
    /// the config overlay, resolve the suspect threshold and the sector
    /// range, and build the sample schedule.
    pub fn new(descriptor: DeviceDescriptor, options: ScanOptions) -> Result<Self> {
        options.validate()?;

        let logical = descriptor.logical_block_size as u64;
        if logical == 0 || options.block_size as u64 % logical != 0 {
            return Err(Error::InvalidParameter(format!(
                "block size {} is not a multiple of the logical block size {}",
                options.block_size, logical
            )));
        }

        let mut taxonomy = LatencyTaxonomy::for_device(&descriptor);
        taxonomy.suspect_threshold = if options.suspect_threshold_ms > 0 {
            options.suspect_threshold_ms
        } else {
            descriptor.recommended_suspect_threshold()
        };
        if let Some(config_path) = &options.config_path {
            let applied = taxonomy.load_overlay(config_path)?;
            debug!("applied {} taxonomy settings from {}", applied, config_path.display());
        }
        taxonomy.validate()?;

        let total_sectors = descriptor.logical_sectors();
        if total_sectors == 0 {
            return Err(Error::InvalidParameter(format!(
                "device {} reports zero sectors",
                descriptor.device_path.display()
            )));
        }
        let start = options.start.resolve(total_sectors);
        let end = options.end.resolve(total_sectors);
        if start >= total_sectors {
            return Err(Error::InvalidParameter(format!(
                "start sector {} beyond device end {}",
                start, total_sectors
            )));
        }
        if end > total_sectors {
            return Err(Error::InvalidParameter(format!(
                "end sector {} beyond device end {}",
                end, total_sectors
            )));
        }
        if start >= end {
            return Err(Error::InvalidParameter(format!(
                "start sector {} not below end sector {}",
                start, end
            )));
        }

        let sectors_per_block = options.block_size as u64 / logical;
        let schedule = if options.sample_ratio >= 1.0 {
            SampleSchedule::dense(start, end, sectors_per_block)?
        } else {
            SampleSchedule::sampled(
                start,
                end,
                options.sample_ratio,
                options.random_sampling,
                options.seed,
            )?
        };

        let log = match &options.log_path {
            Some(path) => ScanLog::create(path),
            None => ScanLog::disabled(),
        };

        Ok(ScanEngine {
            descriptor,
            options,
            taxonomy,
            schedule,
            log,
        })
    }

    /// The device this engine scans.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// The schedule the loop will follow.
    pub fn schedule(&self) -> &SampleSchedule {
        &self.schedule
    }

    /// The taxonomy in effect (thresholds resolved, overlay applied).
    pub fn taxonomy(&self) -> &LatencyTaxonomy {
        &self.taxonomy
    }

    /// Run the scan loop over `reader` and produce the report.
    ///
    /// Per-sector read failures classify the sector as Damaged and
    /// continue; only setup problems surface as errors. The report is
    /// produced on every exit path, including cancellation.
    pub fn run(&mut self, reader: &mut dyn SectorReader) -> Result<RunReport> {
        clear_cancel();

        let retest_config = RetestConfig {
            max_attempts: self.options.retest_attempts,
            interval_ms: self.options.retest_interval_ms,
        }
        .clamped();

        let planned = self.schedule.planned_count();
        let schedule = self.schedule.clone();
        let mut progress =
            ProgressReporter::new(planned, self.options.block_size as u64, !self.options.quiet);

        let started = Instant::now();
        let mut previous_latency_ms: u64 = 0;
        let mut scanned: u64 = 0;
        let mut cancelled = false;

        for sector in schedule.iter() {
            if cancel_requested() {
                cancelled = true;
                break;
            }

            if self.options.wait_factor > 0 && previous_latency_ms > 0 {
                let pause = previous_latency_ms * self.options.wait_factor as u64 / 100;
                if pause > 0 {
                    thread::sleep(Duration::from_millis(pause));
                }
            }

            let final_category = match reader.read_block(sector) {
                Ok(latency_ms) => {
                    let initial = self.taxonomy.classify(latency_ms);
                    let final_category = if initial == Category::Suspect {
                        let outcome = retest::run_retest(
                            reader,
                            sector,
                            retest_config,
                            &self.taxonomy,
                            &mut self.log,
                        );
                        self.taxonomy.bump(outcome.final_category);
                        outcome.final_category
                    } else {
                        // Retested sectors are fully annotated by the
                        // retest path; everything else follows the log
                        // policy.
                        if self.should_log(latency_ms, initial) {
                            self.log.record(sector, Some(latency_ms), initial, "");
                        }
                        initial
                    };
                    previous_latency_ms = latency_ms;
                    final_category
                }
                Err(e) => {
                    debug!("read error at sector {}: {}", sector, e);
                    self.taxonomy.record_damaged();
                    self.log
                        .record(sector, None, Category::Damaged, "read failed");
                    previous_latency_ms = 0;
                    Category::Damaged
                }
            };

            scanned += 1;
            progress.update(scanned, sector, final_category, &self.taxonomy);
        }

        progress.finish();
        self.log.finish();

        Ok(RunReport::from_taxonomy(
            self.descriptor.device_path.clone(),
            &self.taxonomy,
            planned,
            started.elapsed().as_secs_f64(),
            self.options.block_size as u64,
            cancelled,
            !reader.is_direct(),
        ))
    }

    fn should_log(&self, latency_ms: u64, category: Category) -> bool {
        self.options.log_threshold_ms == 0
            || latency_ms >= self.options.log_threshold_ms
            || category >= Category::Poor
    }
}

/// Probe the device, open it for direct reads, and run the scan.
pub fn scan(options: &ScanOptions) -> Result<RunReport> {
    let descriptor = probe(&options.device)?;
    let logical = descriptor.logical_block_size as u64;
    let mut engine = ScanEngine::new(descriptor, options.clone())?;
    let mut reader = DirectReader::open(&options.device, options.block_size, logical)?;
    engine.run(&mut reader)
}
