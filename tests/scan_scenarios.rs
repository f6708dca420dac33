//! End-to-end scan scenarios over a scripted fixture device

use blockscan::device::{DeviceClass, DeviceDescriptor, Rotational};
use blockscan::{
    Category, HealthVerdict, RangeSpec, ScanEngine, ScanOptions, SectorReader,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// The cancellation flag is process-wide, so scans must not overlap across
/// test threads.
static SCAN_GUARD: Mutex<()> = Mutex::new(());

/// Scripted read result
#[derive(Clone, Copy)]
enum Read {
    Ok(u64),
    Error,
}

impl Read {
    fn resolve(self) -> io::Result<u64> {
        match self {
            Read::Ok(ms) => Ok(ms),
            Read::Error => Err(io::Error::new(io::ErrorKind::Other, "scripted I/O error")),
        }
    }
}

/// Fake device: block reads and retest reads resolve from per-sector
/// scripts, everything else at a fixed latency.
struct FixtureDevice {
    default_ms: u64,
    block_script: HashMap<u64, Read>,
    single_script: HashMap<u64, Read>,
    visited: Vec<u64>,
    cancel_after_reads: Option<u64>,
}

impl FixtureDevice {
    fn uniform(default_ms: u64) -> Self {
        FixtureDevice {
            default_ms,
            block_script: HashMap::new(),
            single_script: HashMap::new(),
            visited: Vec::new(),
            cancel_after_reads: None,
        }
    }

    fn with_block(mut self, sector: u64, read: Read) -> Self {
        self.block_script.insert(sector, read);
        self
    }

    fn with_single(mut self, sector: u64, read: Read) -> Self {
        self.single_script.insert(sector, read);
        self
    }

    fn cancel_after(mut self, reads: u64) -> Self {
        self.cancel_after_reads = Some(reads);
        self
    }
}

impl SectorReader for FixtureDevice {
    fn read_block(&mut self, sector: u64) -> io::Result<u64> {
        self.visited.push(sector);
        if self.cancel_after_reads == Some(self.visited.len() as u64) {
            blockscan::request_cancel();
        }
        self.block_script
            .get(&sector)
            .copied()
            .unwrap_or(Read::Ok(self.default_ms))
            .resolve()
    }

    fn read_single(&mut self, sector: u64) -> io::Result<u64> {
        self.single_script
            .get(&sector)
            .copied()
            .unwrap_or(Read::Ok(self.default_ms))
            .resolve()
    }
}

fn descriptor(class: DeviceClass, total_sectors_512: u64, logical: u32) -> DeviceDescriptor {
    let mut descriptor = DeviceDescriptor::new("/dev/fixture");
    descriptor.main_name = "fixture".into();
    descriptor.class = class;
    descriptor.is_rotational = match class {
        DeviceClass::Hdd => Rotational::Yes,
        _ => Rotational::No,
    };
    if class == DeviceClass::Hdd {
        descriptor.rotation_rpm = 7200;
    }
    descriptor.logical_block_size = logical;
    descriptor.physical_block_size = logical;
    descriptor.optimal_io_size = 4096;
    descriptor.total_sectors_512 = total_sectors_512;
    descriptor.capacity_bytes = total_sectors_512 * 512;
    descriptor
}

fn base_options() -> ScanOptions {
    ScanOptions {
        device: PathBuf::from("/dev/fixture"),
        quiet: true,
        ..ScanOptions::default()
    }
}

#[test]
fn pristine_ssd_dense_scan() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let descriptor = descriptor(DeviceClass::SataSsd, 2048, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Percent(100.0),
        block_size: 4096,
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    assert_eq!(engine.schedule().planned_count(), 256);

    let mut device = FixtureDevice::uniform(1);
    let report = engine.run(&mut device).unwrap();

    assert_eq!(report.total_reads, 256);
    assert_eq!(report.count(Category::Excellent), 256);
    assert_eq!(report.count(Category::Damaged), 0);
    assert_eq!(report.verdict, HealthVerdict::Excellent);
    assert!(!report.cancelled);
    assert!(!report.hardware_fault);
}

#[test]
fn hdd_with_three_bad_sectors() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("scan.log");

    let descriptor = descriptor(DeviceClass::Hdd, 1000, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Sector(1000),
        block_size: 512,
        log_path: Some(log_path.clone()),
        // Log only the failures for this scenario.
        log_threshold_ms: 30_000,
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    let mut device = FixtureDevice::uniform(5)
        .with_block(100, Read::Error)
        .with_block(500, Read::Error)
        .with_block(900, Read::Error);
    let report = engine.run(&mut device).unwrap();

    assert_eq!(report.total_reads, 1000);
    assert_eq!(report.count(Category::Excellent), 997);
    assert_eq!(report.count(Category::Damaged), 3);
    assert_eq!(report.count(Category::Suspect), 0);
    assert!(report.hardware_fault);
    assert!(!report.cancelled);

    let log_text = std::fs::read_to_string(&log_path).unwrap();
    let damaged_lines: Vec<&str> = log_text
        .lines()
        .filter(|line| line.contains(",-1,Damaged,"))
        .collect();
    assert_eq!(damaged_lines.len(), 3);
    for (line, sector) in damaged_lines.iter().zip([100u64, 500, 900]) {
        assert!(line.contains(&format!("sector_{}", sector)));
    }
}

#[test]
fn suspect_resolves_on_retest() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let descriptor = descriptor(DeviceClass::NvmeSsd, 10, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Sector(10),
        block_size: 512,
        suspect_threshold_ms: 8,
        retest_attempts: 5,
        retest_interval_ms: 0,
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    assert_eq!(engine.schedule().planned_count(), 10);

    // Sector 4 stalls once at 25 ms, then re-reads clean at 2 ms.
    let mut device = FixtureDevice::uniform(1)
        .with_block(4, Read::Ok(25))
        .with_single(4, Read::Ok(2));
    let report = engine.run(&mut device).unwrap();

    assert_eq!(report.total_reads, 10);
    assert_eq!(report.count(Category::Suspect), 1);
    assert_eq!(report.count(Category::Good), 1);
    assert_eq!(report.count(Category::Excellent), 9);
    assert_eq!(report.count(Category::Damaged), 0);
    assert!(!report.hardware_fault);
}

#[test]
fn suspect_confirms_as_damaged() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let descriptor = descriptor(DeviceClass::NvmeSsd, 10, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Sector(10),
        block_size: 512,
        suspect_threshold_ms: 8,
        retest_attempts: 5,
        retest_interval_ms: 0,
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    // Retests stay pinned at 1000 ms: past twice the severe bound (400 ms).
    let mut device = FixtureDevice::uniform(1)
        .with_block(4, Read::Ok(25))
        .with_single(4, Read::Ok(1000));
    let report = engine.run(&mut device).unwrap();

    assert_eq!(report.count(Category::Suspect), 1);
    assert_eq!(report.count(Category::Damaged), 1);
    assert!(report.hardware_fault);
}

#[test]
fn uniform_strided_one_percent() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let descriptor = descriptor(DeviceClass::SataSsd, 1_000_000, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Sector(1_000_000),
        block_size: 512,
        sample_ratio: 0.01,
        random_sampling: false,
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    assert_eq!(engine.schedule().planned_count(), 10_000);

    let mut device = FixtureDevice::uniform(1);
    let report = engine.run(&mut device).unwrap();

    assert_eq!(report.total_reads, 10_000);
    assert_eq!(device.visited.len(), 10_000);
    for (i, &sector) in device.visited.iter().enumerate() {
        assert_eq!(sector, i as u64 * 100);
    }
    assert!(*device.visited.last().unwrap() < 1_000_000);
    let mut deduped = device.visited.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), device.visited.len());
}

#[test]
fn cancellation_mid_scan() {
    let _guard = SCAN_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("cancelled.log");

    let descriptor = descriptor(DeviceClass::Hdd, 1000, 512);
    let options = ScanOptions {
        start: RangeSpec::Sector(0),
        end: RangeSpec::Sector(1000),
        block_size: 512,
        log_path: Some(log_path.clone()),
        ..base_options()
    };

    let mut engine = ScanEngine::new(descriptor, options).unwrap();
    let mut device = FixtureDevice::uniform(5).cancel_after(500);
    let report = engine.run(&mut device).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.total_reads, 500);
    assert_eq!(report.count(Category::Excellent), 500);
    assert_eq!(report.planned_samples, 1000);

    // The log is closed and well-formed: header plus one record per read.
    let log_text = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log_text.lines().collect();
    assert_eq!(lines.len(), 501);
    assert_eq!(lines[0], "timestamp,sector,latency_ms,category,notes");
    assert!(lines[1..].iter().all(|line| line.contains(",Excellent,")));
}
