//! Probing pipeline: path to [`DeviceDescriptor`]
//!
//! Sources run in a fixed order, each filling fields the previous ones left
//! empty (udev additionally owns the bus type). A source that is missing or
//! fails only lowers the descriptor's completeness; the only hard errors are
//! a path that is not a block device, not found, or not accessible.

use super::{nvme, smart, sysfs, udev, BusType, DeviceClass, DeviceDescriptor, Rotational};
use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// One probing information source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoSource {
    /// sysfs block attributes (geometry, rotational flag)
    Sysfs,
    /// udevadm properties (bus type, identity)
    Udev,
    /// smartctl output (spindle speed, nominal capacity, identity)
    Smart,
    /// nvme-cli identify dumps (LBA format, namespace size, identity)
    NvmeIdentify,
}

/// All sources, in fusion order.
pub const ALL_SOURCES: [InfoSource; 4] = [
    InfoSource::Sysfs,
    InfoSource::Udev,
    InfoSource::Smart,
    InfoSource::NvmeIdentify,
];

/// Probe `path` with every available source.
pub fn probe(path: impl AsRef<Path>) -> Result<DeviceDescriptor> {
    probe_with_sources(path.as_ref(), &ALL_SOURCES)
}

/// Probe `path` with an explicit source set, in the given order.
pub fn probe_with_sources(path: &Path, sources: &[InfoSource]) -> Result<DeviceDescriptor> {
    let (major, minor) = stat_block_device(path)?;

    let mut descriptor = DeviceDescriptor::new(path);
    descriptor.main_name = resolve_main_name(major, minor).unwrap_or_else(|| {
        let fallback = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("main-name resolution failed, falling back to {:?}", fallback);
        fallback
    });

    seed_from_name(&mut descriptor);

    for source in sources {
        match source {
            InfoSource::Sysfs => sysfs::apply(&mut descriptor, Path::new("/sys/block")),
            InfoSource::Udev => {
                if let Some(properties) = udev::query(path) {
                    udev::apply(&mut descriptor, &properties);
                }
            }
            InfoSource::Smart => {
                if let Some(output) = smart::query(path) {
                    smart::apply(&mut descriptor, &output);
                }
            }
            InfoSource::NvmeIdentify => {
                if descriptor.bus == BusType::Nvme {
                    if let Some(output) = nvme::query_namespace(path) {
                        nvme::apply_namespace(&mut descriptor, &output);
                    }
                    if let Some(output) = nvme::query_controller(path) {
                        nvme::apply_controller(&mut descriptor, &output);
                    }
                }
            }
        }
    }

    descriptor.finalize_class();
    descriptor.apply_defaults();
    descriptor.grade_completeness();
    Ok(descriptor)
}

/// Seed bus and class from the whole-disk name prefix before any source
/// runs. Later sources may refine but not contradict the NVMe case.
fn seed_from_name(descriptor: &mut DeviceDescriptor) {
    let name = descriptor.main_name.as_str();
    if name.starts_with("nvme") {
        descriptor.bus = BusType::Nvme;
        descriptor.class = DeviceClass::NvmeSsd;
        descriptor.is_rotational = Rotational::No;
    } else if name.starts_with("mmcblk") {
        descriptor.bus = BusType::Mmc;
        descriptor.class = DeviceClass::UnknownSsd;
        descriptor.is_rotational = Rotational::No;
    } else if name.starts_with("vd") {
        descriptor.bus = BusType::Virtio;
    } else if name.starts_with("hd") {
        descriptor.bus = BusType::Pata;
    }
    // "sd" names stay undecided: SATA, SCSI, and USB all surface as sd*.
}

/// Stat `path` and return its `(major, minor)` device numbers, verifying it
/// is a block device.
#[cfg(unix)]
fn stat_block_device(path: &Path) -> Result<(u64, u64)> {
    use nix::sys::stat::{major, minor, stat, SFlag};

    let st = stat(path).map_err(|errno| {
        Error::from_device_io(path, std::io::Error::from_raw_os_error(errno as i32))
    })?;
    let mode = SFlag::from_bits_truncate(st.st_mode);
    if !mode.contains(SFlag::S_IFBLK) {
        return Err(Error::NotABlockDevice(path.to_path_buf()));
    }
    Ok((major(st.st_rdev), minor(st.st_rdev)))
}

#[cfg(not(unix))]
fn stat_block_device(path: &Path) -> Result<(u64, u64)> {
    Err(Error::InvalidParameter(format!(
        "block device probing is unix-only: {}",
        path.display()
    )))
}

/// Resolve the whole-disk name for a `(major, minor)` pair through the
/// sysfs block-number symlink.
fn resolve_main_name(major: u64, minor: u64) -> Option<String> {
    let link = PathBuf::from(format!("/sys/dev/block/{}:{}", major, minor));
    let target = fs::read_link(&link).ok()?;
    main_name_from_target(&target, Path::new("/sys/block"))
}

/// Walk the symlink target from the leaf upward; the first ancestor whose
/// basename also exists directly under the sysfs block root is the
/// whole-disk name. Partition targets live one level below their disk, so
/// `.../block/sda/sda1` resolves to `sda`.
fn main_name_from_target(target: &Path, sys_block_root: &Path) -> Option<String> {
    for ancestor in target.ancestors() {
        let name = match ancestor.file_name() {
            Some(name) => name,
            None => continue,
        };
        if sys_block_root.join(name).is_dir() {
            return Some(name.to_string_lossy().into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_main_name_for_partition() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("nvme0n1")).unwrap();

        let target = Path::new(
            "../../devices/pci0000:00/0000:00:1d.0/nvme/nvme0/block/nvme0n1/nvme0n1p5",
        );
        let name = main_name_from_target(target, root.path());
        assert_eq!(name.as_deref(), Some("nvme0n1"));
    }

    #[test]
    fn test_main_name_for_whole_disk() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("sda")).unwrap();

        let target = Path::new("../../devices/pci0000:00/ata3/host2/block/sda");
        let name = main_name_from_target(target, root.path());
        assert_eq!(name.as_deref(), Some("sda"));
    }

    #[test]
    fn test_main_name_unresolvable() {
        let root = tempfile::tempdir().unwrap();
        let target = Path::new("../../devices/virtual/block/loop0");
        assert_eq!(main_name_from_target(target, root.path()), None);
    }

    #[test]
    fn test_seed_from_name() {
        let mut d = DeviceDescriptor::new("/dev/nvme0n1p2");
        d.main_name = "nvme0n1".into();
        seed_from_name(&mut d);
        assert_eq!(d.bus, BusType::Nvme);
        assert_eq!(d.class, DeviceClass::NvmeSsd);

        let mut d = DeviceDescriptor::new("/dev/mmcblk0");
        d.main_name = "mmcblk0".into();
        seed_from_name(&mut d);
        assert_eq!(d.bus, BusType::Mmc);
        assert_eq!(d.is_rotational, Rotational::No);

        let mut d = DeviceDescriptor::new("/dev/vda");
        d.main_name = "vda".into();
        seed_from_name(&mut d);
        assert_eq!(d.bus, BusType::Virtio);

        let mut d = DeviceDescriptor::new("/dev/sda");
        d.main_name = "sda".into();
        seed_from_name(&mut d);
        assert_eq!(d.bus, BusType::Unknown);
    }
}
