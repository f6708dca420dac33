//! nvme-cli identify source
//!
//! Parses `nvme id-ctrl` and `nvme id-ns` output (`key : value` lines).
//! The namespace dump gives the in-use LBA format (`lbads`) and size
//! (`nsze`); the controller dump gives identity plus the PCI vendor id.

use super::parse::{first_word, line_containing, value_for_keys, Separator};
use super::{BusType, DeviceClass, DeviceDescriptor, Rotational};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Run `nvme id-ctrl` for `path`, if nvme-cli is present.
pub fn query_controller(path: &Path) -> Option<String> {
    run_nvme("id-ctrl", path)
}

/// Run `nvme id-ns` for `path`, if nvme-cli is present.
pub fn query_namespace(path: &Path) -> Option<String> {
    run_nvme("id-ns", path)
}

fn run_nvme(subcommand: &str, path: &Path) -> Option<String> {
    let output = Command::new("nvme").arg(subcommand).arg(path).output().ok()?;
    if !output.status.success() {
        debug!("nvme {} exited with {}", subcommand, output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Fill geometry from `nvme id-ns` output.
pub fn apply_namespace(descriptor: &mut DeviceDescriptor, output: &str) {
    // The in-use LBA format line looks like:
    // `lbaf  1 : ms:0   lbads:12 rp:0 (in use)`
    if let Some(line) = line_containing(output, "(in use)") {
        if let Some(lbads) = lbads_on_line(line) {
            if lbads <= 16 {
                let lba_size = 1u32 << lbads;
                descriptor.logical_block_size = lba_size;
                descriptor.physical_block_size = lba_size;
            }
        }
    }

    if let Some(nsze) = value_for_keys(output, &["nsze", "Namespace Size"], Separator::Colon) {
        if let Some(nsze) = parse_number(&nsze) {
            if nsze > 0 && descriptor.logical_block_size > 0 {
                let lba = descriptor.logical_block_size as u64;
                descriptor.total_sectors_512 = nsze * lba / 512;
                descriptor.capacity_bytes = descriptor.total_sectors_512 * 512;
            }
        }
    }
}

/// Fill identity from `nvme id-ctrl` output.
pub fn apply_controller(descriptor: &mut DeviceDescriptor, output: &str) {
    descriptor.bus = BusType::Nvme;
    descriptor.class = DeviceClass::NvmeSsd;
    descriptor.is_rotational = Rotational::No;

    if descriptor.model.is_empty() {
        if let Some(mn) = value_for_keys(output, &["mn", "Model Number"], Separator::Colon) {
            descriptor.model = mn;
        }
    }
    if descriptor.serial.is_empty() {
        if let Some(sn) = value_for_keys(output, &["sn", "Serial Number"], Separator::Colon) {
            if let Some(word) = first_word(&sn) {
                descriptor.serial = word.to_string();
            }
        }
    }
    if descriptor.firmware.is_empty() {
        if let Some(fr) = value_for_keys(output, &["fr", "Firmware Revision"], Separator::Colon) {
            if let Some(word) = first_word(&fr) {
                descriptor.firmware = word.to_string();
            }
        }
    }
    if descriptor.vendor.is_empty() {
        if let Some(vid) = value_for_keys(output, &["vid", "Vendor ID"], Separator::Colon) {
            if let Some(vid) = parse_number(&vid) {
                descriptor.vendor = match pci_vendor_name(vid as u32) {
                    Some(name) => name.to_string(),
                    None => format!("VID_0x{:04X}", vid),
                };
            }
        }
    }
}

fn lbads_on_line(line: &str) -> Option<u32> {
    let idx = line.find("lbads:")?;
    let rest = &line[idx + "lbads:".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// nvme-cli prints numbers in decimal or `0x` hex depending on the field.
fn parse_number(s: &str) -> Option<u64> {
    let s = first_word(s)?;
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// PCI vendor id to vendor name, for the ids seen on consumer NVMe drives.
fn pci_vendor_name(vid: u32) -> Option<&'static str> {
    match vid {
        0x8086 => Some("Intel"),
        0x144d => Some("Samsung"),
        0x15b7 => Some("SanDisk"),
        0x1179 => Some("Toshiba"),
        0x1c5c => Some("SK Hynix"),
        0x1987 => Some("Phison"),
        0x126f => Some("Silicon Motion"),
        0x1cc1 => Some("ADATA"),
        0x1344 => Some("Micron"),
        0xc0a9 => Some("Crucial"),
        0x1e0f => Some("KIOXIA"),
        0x1bb1 => Some("Seagate"),
        0x1c58 => Some("HGST"),
        0x1b96 => Some("Western Digital"),
        0x1f40 => Some("Netac"),
        0x1d97 => Some("Shenzhen Longsys"),
        0x1e49 => Some("Yangtze Memory"),
        0x1e95 => Some("Solid State Storage"),
        0x1f03 => Some("Corsair"),
        0x1b4b => Some("Marvell"),
        0x14a4 => Some("Lite-On"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_NS: &str = "\
nsze    : 0x1dcf32b0
ncap    : 0x1dcf32b0
nuse    : 0x1dcf32b0
lbaf  0 : ms:0   lbads:9  rp:0
lbaf  1 : ms:0   lbads:12 rp:0 (in use)
";

    const ID_CTRL: &str = "\
vid       : 0x144d
ssvid     : 0x144d
sn        : S649NX0T123456
mn        : Samsung SSD 980 PRO 1TB
fr        : 5B2QGXA7
frmw      : 0x16
";

    #[test]
    fn test_namespace_lba_and_size() {
        let mut d = DeviceDescriptor::new("/dev/nvme0n1");
        apply_namespace(&mut d, ID_NS);
        assert_eq!(d.logical_block_size, 4096);
        assert_eq!(d.physical_block_size, 4096);
        let nsze = 0x1dcf32b0u64;
        assert_eq!(d.total_sectors_512, nsze * 4096 / 512);
        assert_eq!(d.capacity_bytes, d.total_sectors_512 * 512);
    }

    #[test]
    fn test_controller_identity() {
        let mut d = DeviceDescriptor::new("/dev/nvme0n1");
        apply_controller(&mut d, ID_CTRL);
        assert_eq!(d.model, "Samsung SSD 980 PRO 1TB");
        assert_eq!(d.serial, "S649NX0T123456");
        assert_eq!(d.firmware, "5B2QGXA7");
        assert_eq!(d.vendor, "Samsung");
        assert_eq!(d.class, DeviceClass::NvmeSsd);
    }

    #[test]
    fn test_unknown_vendor_id_rendered_as_hex() {
        let mut d = DeviceDescriptor::new("/dev/nvme1n1");
        apply_controller(&mut d, "vid : 0xabcd\n");
        assert_eq!(d.vendor, "VID_0xABCD");
    }

    #[test]
    fn test_in_use_format_selected() {
        // Only the "(in use)" lbaf line decides the block size.
        let mut d = DeviceDescriptor::new("/dev/nvme0n1");
        apply_namespace(
            &mut d,
            "lbaf  0 : ms:0 lbads:9 rp:0 (in use)\nlbaf  1 : ms:0 lbads:12 rp:0\n",
        );
        assert_eq!(d.logical_block_size, 512);
    }
}
