//! Host disk usage.
//!
//! One trait, [`DiskSpaceProbe`], with a single native implementation picked
//! at compile time. A failed query yields `(0, 0)`, which callers must read as
//! "unknown" and never as an empty disk.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Used and total bytes of one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskUsage {
    pub used: u64,
    pub total: u64,
}

impl DiskUsage {
    pub fn is_known(&self) -> bool {
        self.total > 0
    }
}

/// One host volume (or shared root) with its usage totals.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub path: String,
    pub used: u64,
    pub total: u64,
}

pub trait DiskSpaceProbe: Send + Sync {
    /// Usage of the volume containing `path`.
    fn query(&self, path: &Path) -> DiskUsage;

    /// Mount points (or drive roots) to report as host volumes, with display names.
    fn volumes(&self) -> Vec<(String, PathBuf)>;
}

/// The probe for the platform this binary was built for.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProbe;

/// Collects usage for every host volume.
pub fn host_volumes(probe: &dyn DiskSpaceProbe) -> Vec<VolumeInfo> {
    probe
        .volumes()
        .into_iter()
        .map(|(name, path)| {
            let usage = probe.query(&path);
            VolumeInfo {
                name,
                path: path.to_string_lossy().into_owned(),
                used: usage.used,
                total: usage.total,
            }
        })
        .collect()
}

#[cfg(unix)]
mod unix {
    use super::*;
    use nix::sys::statvfs::statvfs;
    use tracing::warn;

    impl DiskSpaceProbe for NativeProbe {
        fn query(&self, path: &Path) -> DiskUsage {
            let stat = match statvfs(path) {
                Ok(stat) => stat,
                Err(e) => {
                    warn!("Failed to get disk space for {}: {}", path.display(), e);
                    return DiskUsage::default();
                }
            };

            let block = stat.fragment_size() as u64;
            let total = (stat.blocks() as u64).saturating_mul(block);
            let free = (stat.blocks_free() as u64).saturating_mul(block);
            DiskUsage {
                used: total.saturating_sub(free),
                total,
            }
        }

        fn volumes(&self) -> Vec<(String, PathBuf)> {
            vec![("Root".to_string(), PathBuf::from("/"))]
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use tracing::warn;
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    impl DiskSpaceProbe for NativeProbe {
        fn query(&self, path: &Path) -> DiskUsage {
            let wide: Vec<u16> = OsStr::new(path)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            let mut free_to_caller = 0u64;
            let mut total = 0u64;
            let mut total_free = 0u64;
            let ok = unsafe {
                GetDiskFreeSpaceExW(
                    wide.as_ptr(),
                    &mut free_to_caller,
                    &mut total,
                    &mut total_free,
                )
            };
            if ok == 0 {
                warn!(
                    "Failed to get disk space for {}: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                );
                return DiskUsage::default();
            }

            DiskUsage {
                used: total.saturating_sub(free_to_caller),
                total,
            }
        }

        fn volumes(&self) -> Vec<(String, PathBuf)> {
            (b'A'..=b'Z')
                .map(|letter| letter as char)
                .filter_map(|drive| {
                    let root = PathBuf::from(format!("{}:\\", drive));
                    root.exists().then(|| (format!("{}:", drive), root))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe;

    impl DiskSpaceProbe for FixedProbe {
        fn query(&self, path: &Path) -> DiskUsage {
            if path == Path::new("/broken") {
                DiskUsage::default()
            } else {
                DiskUsage { used: 40, total: 100 }
            }
        }

        fn volumes(&self) -> Vec<(String, PathBuf)> {
            vec![
                ("Root".to_string(), PathBuf::from("/")),
                ("Broken".to_string(), PathBuf::from("/broken")),
            ]
        }
    }

    #[test]
    fn test_host_volumes_reports_unknown_as_zero() {
        let volumes = host_volumes(&FixedProbe);
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].used, 40);
        assert_eq!(volumes[0].total, 100);
        assert_eq!((volumes[1].used, volumes[1].total), (0, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_native_probe_root() {
        let usage = NativeProbe.query(Path::new("/"));
        assert!(usage.is_known());
        assert!(usage.used <= usage.total);
    }

    #[cfg(unix)]
    #[test]
    fn test_native_probe_missing_path_is_unknown() {
        let usage = NativeProbe.query(Path::new("/no/such/mount/point/here"));
        assert_eq!(usage, DiskUsage::default());
        assert!(!usage.is_known());
    }
}
