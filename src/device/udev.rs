//! udev property source
//!
//! Parses `udevadm info --query=property` output (`KEY=VALUE` lines).
//! Authoritative for the bus type; identity keys fill what sysfs left empty.

use super::parse::{value_for_keys, Separator};
use super::{BusType, DeviceClass, DeviceDescriptor, Rotational};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Run udevadm for `path` and return its property output, if the tool is
/// present and succeeds.
pub fn query(path: &Path) -> Option<String> {
    let output = Command::new("udevadm")
        .args(["info", "--query=property", "--name"])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        debug!("udevadm exited with {}", output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fill `descriptor` from udev property text.
pub fn apply(descriptor: &mut DeviceDescriptor, properties: &str) {
    // SATA/PATA flags are more specific than ID_BUS and win over it.
    if value_for_keys(properties, &["ID_ATA_SATA"], Separator::Equals).as_deref() == Some("1") {
        descriptor.bus = BusType::Sata;
    } else if value_for_keys(properties, &["ID_ATA_PATA"], Separator::Equals).as_deref() == Some("1")
    {
        descriptor.bus = BusType::Pata;
    } else if let Some(bus) = value_for_keys(properties, &["ID_BUS"], Separator::Equals) {
        if let Some(bus) = bus_from_str(&bus) {
            descriptor.bus = bus;
        }
    }

    if descriptor.model.is_empty() {
        if let Some(model) = value_for_keys(properties, &["ID_MODEL"], Separator::Equals) {
            descriptor.model = model;
        }
    }
    if descriptor.serial.is_empty() {
        if let Some(serial) =
            value_for_keys(properties, &["ID_SERIAL_SHORT", "ID_SERIAL"], Separator::Equals)
        {
            descriptor.serial = serial;
        }
    }
    if descriptor.firmware.is_empty() {
        if let Some(firmware) = value_for_keys(properties, &["ID_REVISION"], Separator::Equals) {
            descriptor.firmware = firmware;
        }
    }
    if descriptor.vendor.is_empty() {
        if let Some(vendor) = value_for_keys(
            properties,
            &["ID_VENDOR_FROM_DATABASE", "ID_VENDOR"],
            Separator::Equals,
        ) {
            descriptor.vendor = vendor;
        }
    }

    if value_for_keys(properties, &["SUBSYSTEM"], Separator::Equals).as_deref() == Some("nvme") {
        descriptor.bus = BusType::Nvme;
        descriptor.class = DeviceClass::NvmeSsd;
        descriptor.is_rotational = Rotational::No;
    }

    // DEVPATH substrings only break a tie that nothing else resolved.
    if descriptor.bus == BusType::Unknown {
        if let Some(devpath) = value_for_keys(properties, &["DEVPATH"], Separator::Equals) {
            descriptor.bus = bus_from_devpath(&devpath);
        }
    }
}

fn bus_from_str(bus: &str) -> Option<BusType> {
    match bus.to_ascii_lowercase().as_str() {
        "ata" => Some(BusType::Ata),
        "sata" => Some(BusType::Sata),
        "scsi" => Some(BusType::Scsi),
        "usb" => Some(BusType::Usb),
        "nvme" => Some(BusType::Nvme),
        "mmc" => Some(BusType::Mmc),
        "virtio" => Some(BusType::Virtio),
        _ => None,
    }
}

fn bus_from_devpath(devpath: &str) -> BusType {
    if devpath.contains("/ata") {
        BusType::Ata
    } else if devpath.contains("/usb") {
        BusType::Usb
    } else if devpath.contains("/nvme") {
        BusType::Nvme
    } else if devpath.contains("/mmc") {
        BusType::Mmc
    } else {
        BusType::Unknown
    }
}
