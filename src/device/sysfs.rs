//! sysfs attribute source
//!
//! Authoritative for numeric geometry: `size` (512-byte units),
//! `queue/{logical_block_size,physical_block_size,optimal_io_size,rotational}`.
//! Identity strings under `device/` act as fallbacks only.

use super::{DeviceDescriptor, Rotational};
use log::debug;
use std::fs;
use std::path::Path;

/// Read one sysfs attribute as a trimmed string.
pub fn read_attr(block_dir: &Path, attribute: &str) -> Option<String> {
    let path = block_dir.join(attribute);
    match fs::read_to_string(&path) {
        Ok(s) => {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
        Err(e) => {
            debug!("sysfs attribute {} unreadable: {}", path.display(), e);
            None
        }
    }
}

/// Read one sysfs attribute as a u64.
pub fn read_attr_u64(block_dir: &Path, attribute: &str) -> Option<u64> {
    read_attr(block_dir, attribute)?.parse().ok()
}

/// Fill `descriptor` from the whole-disk sysfs directory
/// (`<sysfs_block_root>/<main_name>`). Missing attributes are soft
/// failures; whatever is present is taken.
pub fn apply(descriptor: &mut DeviceDescriptor, sysfs_block_root: &Path) {
    let dir = sysfs_block_root.join(&descriptor.main_name);
    if !dir.is_dir() {
        debug!("no sysfs block entry at {}", dir.display());
        return;
    }

    if let Some(sectors) = read_attr_u64(&dir, "size") {
        descriptor.total_sectors_512 = sectors;
        descriptor.capacity_bytes = sectors * 512;
    }
    if let Some(lbs) = read_attr_u64(&dir, "queue/logical_block_size") {
        descriptor.logical_block_size = lbs as u32;
    }
    if let Some(pbs) = read_attr_u64(&dir, "queue/physical_block_size") {
        descriptor.physical_block_size = pbs as u32;
    }
    if let Some(opt) = read_attr_u64(&dir, "queue/optimal_io_size") {
        if opt > 0 {
            descriptor.optimal_io_size = opt as u32;
        }
    }
    if let Some(rot) = read_attr_u64(&dir, "queue/rotational") {
        descriptor.is_rotational = if rot == 1 {
            Rotational::Yes
        } else {
            Rotational::No
        };
    }

    // Identity strings are fallbacks; udev and the vendor tools override.
    if descriptor.model.is_empty() {
        if let Some(model) = read_attr(&dir, "device/model") {
            descriptor.model = model;
        }
    }
    if descriptor.vendor.is_empty() {
        if let Some(vendor) = read_attr(&dir, "device/vendor") {
            descriptor.vendor = vendor;
        }
    }
    if descriptor.serial.is_empty() {
        if let Some(serial) = read_attr(&dir, "device/serial") {
            descriptor.serial = serial;
        }
    }
    if descriptor.firmware.is_empty() {
        let firmware = read_attr(&dir, "device/firmware_rev").or_else(|| read_attr(&dir, "device/rev"));
        if let Some(firmware) = firmware {
            descriptor.firmware = firmware;
        }
    }
}
