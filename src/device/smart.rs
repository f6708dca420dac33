//! smartctl output source
//!
//! Parses `smartctl -a` text (`Key: Value` lines). Supplies the spindle
//! speed for HDDs, identity fallbacks, the bracketed vendor capacity label,
//! and an ATA bus hint from the interface version lines.

use super::parse::{bracketed_for_keys, first_word, value_for_keys, Separator};
use super::{BusType, DeviceDescriptor, Rotational};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Run `smartctl -a` for `path`, if the tool is present.
pub fn query(path: &Path) -> Option<String> {
    let output = Command::new("smartctl").arg("-a").arg(path).output().ok()?;
    // smartctl uses non-zero exits for device warnings while still printing
    // the attribute dump, so take whatever came out.
    if output.stdout.is_empty() {
        debug!("smartctl produced no output ({})", output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fill `descriptor` from smartctl output text.
pub fn apply(descriptor: &mut DeviceDescriptor, output: &str) {
    if descriptor.is_rotational != Rotational::No && descriptor.rotation_rpm == 0 {
        if let Some(rate) = value_for_keys(output, &["Rotation Rate"], Separator::Colon) {
            if let Some(rpm) = leading_number(&rate) {
                descriptor.rotation_rpm = rpm as u32;
                descriptor.is_rotational = Rotational::Yes;
            }
        }
    }

    if descriptor.serial.is_empty() {
        if let Some(serial) =
            value_for_keys(output, &["Serial Number", "Serial number"], Separator::Colon)
        {
            if let Some(word) = first_word(&serial) {
                descriptor.serial = word.to_string();
            }
        }
    }

    if descriptor.model.is_empty() {
        if let Some(model) = value_for_keys(
            output,
            &["Device Model", "Model Number", "Product"],
            Separator::Colon,
        ) {
            descriptor.model = model;
        }
    }

    if descriptor.vendor.is_empty() {
        if let Some(vendor) = value_for_keys(output, &["Model Family", "Vendor"], Separator::Colon)
        {
            if let Some(word) = first_word(&vendor) {
                descriptor.vendor = word.to_string();
            }
        }
    }

    if descriptor.firmware.is_empty() {
        if let Some(firmware) = value_for_keys(
            output,
            &["Firmware Version", "FW Revision", "Revision"],
            Separator::Colon,
        ) {
            descriptor.firmware = firmware;
        }
    }

    if descriptor.nominal_capacity_str.is_none() {
        descriptor.nominal_capacity_str = bracketed_for_keys(
            output,
            &[
                "User Capacity",
                "Total NVM Capacity",
                "Namespace 1 Size/Capacity",
            ],
        );
    }

    if descriptor.bus == BusType::Unknown
        && (output.contains("SATA Version is:") || output.contains("ATA Version is:"))
    {
        descriptor.bus = BusType::Ata;
    }
}

/// Leading decimal number of a string like `7200 rpm`.
fn leading_number(s: &str) -> Option<u64> {
    let digits: String = s.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HDD_OUTPUT: &str = "\
Model Family:     Western Digital Blue
Device Model:     WDC WD10EZEX-08WN4A0
Serial Number:    WD-WCC6Y4FAL3N7
Firmware Version: 01.01A01
User Capacity:    1,000,204,886,016 bytes [1.00 TB]
Rotation Rate:    7200 rpm
SATA Version is:  SATA 3.1, 6.0 Gb/s (current: 6.0 Gb/s)
";

    #[test]
    fn test_hdd_fields() {
        let mut d = DeviceDescriptor::new("/dev/sda");
        apply(&mut d, HDD_OUTPUT);
        assert_eq!(d.rotation_rpm, 7200);
        assert_eq!(d.is_rotational, Rotational::Yes);
        assert_eq!(d.model, "WDC WD10EZEX-08WN4A0");
        assert_eq!(d.vendor, "Western");
        assert_eq!(d.serial, "WD-WCC6Y4FAL3N7");
        assert_eq!(d.firmware, "01.01A01");
        assert_eq!(d.nominal_capacity_str.as_deref(), Some("1.00 TB"));
        assert_eq!(d.bus, BusType::Ata);
    }

    #[test]
    fn test_ssd_rotation_rate_not_numeric() {
        let mut d = DeviceDescriptor::new("/dev/sdb");
        apply(&mut d, "Rotation Rate:    Solid State Device\n");
        assert_eq!(d.rotation_rpm, 0);
        assert_eq!(d.is_rotational, Rotational::Unknown);
    }

    #[test]
    fn test_existing_fields_kept() {
        let mut d = DeviceDescriptor::new("/dev/sda");
        d.model = "FromUdev".into();
        d.bus = BusType::Sata;
        apply(&mut d, HDD_OUTPUT);
        assert_eq!(d.model, "FromUdev");
        assert_eq!(d.bus, BusType::Sata);
    }

    #[test]
    fn test_nvme_capacity_label() {
        let mut d = DeviceDescriptor::new("/dev/nvme0n1");
        apply(
            &mut d,
            "Total NVM Capacity:       500,107,862,016 [500 GB]\n",
        );
        assert_eq!(d.nominal_capacity_str.as_deref(), Some("500 GB"));
    }
}
