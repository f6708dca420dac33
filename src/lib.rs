//! # blockscan
//!
//! A block-device health scanner for Linux. blockscan performs timed
//! `O_DIRECT` reads over a chosen sector range, classifies every read by
//! latency into a device-class-aware taxonomy, re-tests marginal sectors to
//! separate transient slowness from true bad blocks, and produces a live
//! progress display plus a structured end-of-scan report.
//!
//! ## Quick start
//!
//! ```no_run
//! use blockscan::{probe, scan, RangeSpec, ScanOptions};
//!
//! # fn main() -> blockscan::Result<()> {
//! let descriptor = probe("/dev/sda")?;
//! println!(
//!     "{} ({}, {:.1} GB)",
//!     descriptor.main_name,
//!     descriptor.class,
//!     descriptor.capacity_gb()
//! );
//!
//! let options = ScanOptions {
//!     device: "/dev/sda".into(),
//!     start: RangeSpec::Sector(0),
//!     end: RangeSpec::Percent(100.0),
//!     sample_ratio: 0.01,
//!     ..ScanOptions::default()
//! };
//! let report = scan(&options)?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Structure
//!
//! - [`device`] probes sysfs, udev, smartctl, and nvme-cli into a
//!   [`DeviceDescriptor`].
//! - [`taxonomy`] maps read latencies into eight health categories.
//! - [`schedule`] plans which sectors a scan visits.
//! - [`scanner`] owns the read loop, the retest protocol, and the scan log.
//! - [`progress`] renders the live status block.
//! - [`report`] aggregates the final counts into a health verdict.
//!
//! The library never prints to the terminal on its own error paths; it
//! returns structured errors for the host binary to render. Scanning is
//! read-only by construction: the device is opened `O_RDONLY` and nothing
//! is ever written back.

pub mod device;
pub mod error;
pub mod progress;
pub mod report;
pub mod schedule;
pub mod scanner;
pub mod taxonomy;

pub use device::{
    probe, probe_with_sources, BusType, Completeness, DeviceClass, DeviceDescriptor, InfoSource,
    Rotational,
};
pub use error::{Error, Result};
pub use report::{HealthVerdict, RunReport};
pub use schedule::{SampleMode, SampleSchedule};
pub use scanner::{
    cancel_requested, request_cancel, scan, DirectReader, RangeSpec, RetestConfig, RetestOutcome,
    ScanEngine, ScanOptions, SectorReader,
};
pub use taxonomy::{Category, LatencyTaxonomy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
