//! Device characterization: descriptor types and the probing pipeline
//!
//! A scan starts by resolving the target path into a [`DeviceDescriptor`]:
//! normalized geometry, device class, bus type, and identifying strings,
//! fused from sysfs, udev properties, and (when the tools are installed)
//! smartctl and nvme-cli output. The descriptor then parameterizes the
//! latency taxonomy defaults.

pub mod nvme;
pub mod parse;
pub mod probe;
pub mod smart;
pub mod sysfs;
pub mod udev;

pub use probe::{probe, probe_with_sources, InfoSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Device class, inferred from bus type, rotational state, and model hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Could not be determined
    Unknown,
    /// Rotational hard disk
    Hdd,
    /// SATA-attached SSD
    SataSsd,
    /// NVMe SSD
    NvmeSsd,
    /// USB-attached storage (flash stick or enclosure)
    UsbStorage,
    /// Solid-state device on an unidentified interface
    UnknownSsd,
}

impl DeviceClass {
    /// True for any solid-state class
    pub fn is_ssd(self) -> bool {
        matches!(
            self,
            DeviceClass::SataSsd | DeviceClass::NvmeSsd | DeviceClass::UnknownSsd
        )
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceClass::Unknown => "unknown device",
            DeviceClass::Hdd => "HDD",
            DeviceClass::SataSsd => "SATA SSD",
            DeviceClass::NvmeSsd => "NVMe SSD",
            DeviceClass::UsbStorage => "USB storage",
            DeviceClass::UnknownSsd => "SSD (unknown interface)",
        };
        write!(f, "{}", label)
    }
}

/// Host-side bus the device is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    /// Could not be determined
    Unknown,
    /// Generic ATA
    Ata,
    /// Serial ATA
    Sata,
    /// Parallel ATA
    Pata,
    /// SCSI / SAS
    Scsi,
    /// USB
    Usb,
    /// NVMe
    Nvme,
    /// MMC / SD
    Mmc,
    /// Virtio (virtual machine disk)
    Virtio,
}

impl std::fmt::Display for BusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BusType::Unknown => "unknown",
            BusType::Ata => "ATA",
            BusType::Sata => "SATA",
            BusType::Pata => "PATA",
            BusType::Scsi => "SCSI/SAS",
            BusType::Usb => "USB",
            BusType::Nvme => "NVMe",
            BusType::Mmc => "MMC",
            BusType::Virtio => "Virtio",
        };
        write!(f, "{}", label)
    }
}

/// Tri-state rotational flag (sysfs `queue/rotational` may be absent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotational {
    /// Spinning platters
    Yes,
    /// Solid state
    No,
    /// Not reported
    Unknown,
}

/// How much of the descriptor could be populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Completeness {
    /// At least 80% of the key fields filled
    Full,
    /// At least 50% filled
    Partial,
    /// Probing mostly failed; defaults in effect
    Minimal,
}

impl std::fmt::Display for Completeness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Completeness::Full => "full",
            Completeness::Partial => "partial",
            Completeness::Minimal => "minimal",
        };
        write!(f, "{}", label)
    }
}

/// Normalized facts about one block device, immutable after probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Path the scan was asked to open (may be a partition)
    pub device_path: PathBuf,
    /// Whole-disk name backing the path (e.g. `nvme0n1` for `nvme0n1p5`)
    pub main_name: String,
    /// Device class
    pub class: DeviceClass,
    /// Bus type
    pub bus: BusType,
    /// Rotational state
    pub is_rotational: Rotational,
    /// Spindle speed in RPM; 0 for non-rotational or unknown
    pub rotation_rpm: u32,
    /// Logical block size in bytes
    pub logical_block_size: u32,
    /// Physical block size in bytes
    pub physical_block_size: u32,
    /// Optimal I/O size in bytes
    pub optimal_io_size: u32,
    /// Device size in 512-byte units (Linux BLKGETSIZE convention)
    pub total_sectors_512: u64,
    /// Capacity in bytes, always `total_sectors_512 * 512`
    pub capacity_bytes: u64,
    /// Model string; empty when unknown
    pub model: String,
    /// Vendor string; empty when unknown
    pub vendor: String,
    /// Serial number; empty when unknown
    pub serial: String,
    /// Firmware revision; empty when unknown
    pub firmware: String,
    /// Vendor-printed capacity label (e.g. `500 GB`), from smartctl
    pub nominal_capacity_str: Option<String>,
    /// Data-quality grade of this descriptor
    pub completeness: Completeness,
}

impl DeviceDescriptor {
    /// Empty descriptor for `path`; every field starts unknown.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DeviceDescriptor {
            device_path: path.into(),
            main_name: String::new(),
            class: DeviceClass::Unknown,
            bus: BusType::Unknown,
            is_rotational: Rotational::Unknown,
            rotation_rpm: 0,
            logical_block_size: 0,
            physical_block_size: 0,
            optimal_io_size: 0,
            total_sectors_512: 0,
            capacity_bytes: 0,
            model: String::new(),
            vendor: String::new(),
            serial: String::new(),
            firmware: String::new(),
            nominal_capacity_str: None,
            completeness: Completeness::Minimal,
        }
    }

    /// Capacity in gigabytes
    pub fn capacity_gb(&self) -> f64 {
        self.capacity_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Device size in logical blocks (derived from the 512-normalized count)
    pub fn logical_sectors(&self) -> u64 {
        if self.logical_block_size == 0 {
            0
        } else {
            self.total_sectors_512 * 512 / self.logical_block_size as u64
        }
    }

    /// True for any solid-state class
    pub fn is_ssd(&self) -> bool {
        self.class.is_ssd()
            || (self.class == DeviceClass::UsbStorage && self.is_rotational == Rotational::No)
    }

    /// True for rotational devices
    pub fn is_hdd(&self) -> bool {
        self.class == DeviceClass::Hdd || self.is_rotational == Rotational::Yes
    }

    /// True for NVMe devices
    pub fn is_nvme(&self) -> bool {
        self.class == DeviceClass::NvmeSsd || self.bus == BusType::Nvme
    }

    /// Conservative suspect threshold in milliseconds for this device class
    pub fn recommended_suspect_threshold(&self) -> u64 {
        if self.is_nvme() {
            10
        } else if self.is_ssd() && !matches!(self.class, DeviceClass::UsbStorage) {
            20
        } else if self.is_hdd() {
            if self.rotation_rpm >= 10_000 {
                60
            } else if self.rotation_rpm >= 7200 || self.rotation_rpm == 0 {
                100
            } else {
                150
            }
        } else if self.class == DeviceClass::UsbStorage {
            200
        } else {
            100
        }
    }

    /// Apply the final classification rules after all sources have
    /// contributed: decide the class from bus + rotational state + model
    /// hints, then enforce class/rotational consistency.
    pub(crate) fn finalize_class(&mut self) {
        if self.class == DeviceClass::Unknown {
            self.class = match (self.bus, self.is_rotational) {
                (BusType::Nvme, _) => DeviceClass::NvmeSsd,
                (BusType::Usb, _) => DeviceClass::UsbStorage,
                (BusType::Sata | BusType::Ata, Rotational::No) => DeviceClass::SataSsd,
                (_, Rotational::No) => DeviceClass::UnknownSsd,
                (_, Rotational::Yes) => DeviceClass::Hdd,
                _ => self.class_from_model_hints(),
            };
        }

        match self.class {
            DeviceClass::NvmeSsd => {
                self.bus = BusType::Nvme;
                self.is_rotational = Rotational::No;
                self.rotation_rpm = 0;
            }
            DeviceClass::SataSsd | DeviceClass::UnknownSsd => {
                self.is_rotational = Rotational::No;
                self.rotation_rpm = 0;
            }
            DeviceClass::UsbStorage => {
                if self.is_rotational == Rotational::Unknown {
                    self.is_rotational = self.usb_media_guess();
                }
                if self.is_rotational != Rotational::Yes {
                    self.rotation_rpm = 0;
                }
            }
            DeviceClass::Hdd => {
                self.is_rotational = Rotational::Yes;
                if self.rotation_rpm == 0 {
                    self.rotation_rpm = self.default_hdd_rpm();
                }
            }
            DeviceClass::Unknown => {}
        }
    }

    /// Keyword classification when neither bus nor rotational state decided.
    fn class_from_model_hints(&self) -> DeviceClass {
        let model = self.model.to_lowercase();
        if model.contains("ssd")
            || model.contains("solid state")
            || model.contains("nvme")
            || model.contains("flash")
            || model.contains("stick")
        {
            if self.bus == BusType::Usb {
                DeviceClass::UsbStorage
            } else {
                DeviceClass::UnknownSsd
            }
        } else if model.contains("hdd") || model.contains("disk") {
            DeviceClass::Hdd
        } else if self.bus == BusType::Usb {
            DeviceClass::UsbStorage
        } else {
            DeviceClass::Unknown
        }
    }

    /// Rotational guess for USB media that did not report the flag. Flash
    /// keywords win; small capacities lean flash, large enclosures spinning.
    fn usb_media_guess(&self) -> Rotational {
        let model = self.model.to_lowercase();
        if model.contains("flash")
            || model.contains("stick")
            || model.contains("ssd")
            || model.contains("drive")
        {
            Rotational::No
        } else if model.contains("disk") || model.contains("hdd") {
            Rotational::Yes
        } else if self.capacity_bytes > 0 && self.capacity_gb() < 256.0 {
            Rotational::No
        } else {
            Rotational::Unknown
        }
    }

    /// Typical spindle speed when SMART did not report one.
    fn default_hdd_rpm(&self) -> u32 {
        if self.capacity_gb() >= 1000.0 || self.capacity_bytes == 0 {
            7200
        } else {
            5400
        }
    }

    /// Fill geometry defaults for fields no source populated.
    pub(crate) fn apply_defaults(&mut self) {
        if self.logical_block_size == 0 {
            self.logical_block_size = 512;
        }
        if self.physical_block_size == 0 {
            self.physical_block_size = if self.class == DeviceClass::Hdd
                && self.capacity_gb() >= 500.0
            {
                4096
            } else {
                self.logical_block_size
            };
        }
        if self.optimal_io_size == 0 {
            self.optimal_io_size = match self.class {
                DeviceClass::Hdd => self.physical_block_size,
                _ => 4096,
            };
        }
        self.capacity_bytes = self.total_sectors_512 * 512;
    }

    /// Grade how much of the descriptor was populated.
    pub(crate) fn grade_completeness(&mut self) {
        let filled = [
            !self.model.is_empty(),
            !self.vendor.is_empty(),
            self.capacity_bytes > 0,
            self.total_sectors_512 > 0,
            self.logical_block_size > 0,
            self.class != DeviceClass::Unknown,
        ]
        .iter()
        .filter(|&&f| f)
        .count();

        let total = 6;
        self.completeness = if filled * 10 >= total * 8 {
            Completeness::Full
        } else if filled * 10 >= total * 5 {
            Completeness::Partial
        } else {
            Completeness::Minimal
        };
    }
}
