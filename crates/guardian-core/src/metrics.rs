//! Host metrics — CPU, RAM and battery percentages.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

use crate::error::{GuardianError, Result};
use crate::types::ResourceSample;

/// Battery level assumed when no battery can be read.
pub const DEFAULT_BATTERY: f64 = 100.0;

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// Raw OS readings. Implementations may block (CPU load is averaged over a window).
pub trait SystemMetrics: Send + Sync {
    fn cpu_percent(&self) -> Result<f64>;
    fn ram_percent(&self) -> Result<f64>;
    /// `None` when the host has no battery or it cannot be read.
    fn battery_percent(&self) -> Option<f64>;
}

/// [`SystemMetrics`] backed by `sysinfo`.
pub struct SysinfoMetrics {
    system: Mutex<System>,
    window: Duration,
}

impl SysinfoMetrics {
    pub fn new(window: Duration) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            system: Mutex::new(system),
            window: window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, System>> {
        self.system
            .lock()
            .map_err(|_| GuardianError::SensorUnavailable("system handle poisoned".into()))
    }
}

impl SystemMetrics for SysinfoMetrics {
    fn cpu_percent(&self) -> Result<f64> {
        let mut system = self.lock()?;
        system.refresh_cpu_usage();
        std::thread::sleep(self.window);
        system.refresh_cpu_usage();
        if system.cpus().is_empty() {
            return Err(GuardianError::SensorUnavailable("no CPUs reported".into()));
        }
        Ok(system.global_cpu_info().cpu_usage() as f64)
    }

    fn ram_percent(&self) -> Result<f64> {
        let mut system = self.lock()?;
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(GuardianError::SensorUnavailable("total memory is zero".into()));
        }
        Ok(system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn battery_percent(&self) -> Option<f64> {
        read_battery(Path::new(POWER_SUPPLY_DIR))
    }
}

/// Average `capacity` over every `type == Battery` entry under a power_supply class dir.
fn read_battery(dir: &Path) -> Option<f64> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut levels = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let kind = std::fs::read_to_string(path.join("type")).unwrap_or_default();
        if kind.trim() != "Battery" {
            continue;
        }
        match std::fs::read_to_string(path.join("capacity")) {
            Ok(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => levels.push(v),
                Ok(v) => debug!("Ignoring battery capacity {} in {}", v, path.display()),
                Err(e) => debug!("Unparseable battery capacity in {}: {}", path.display(), e),
            },
            Err(e) => debug!("No battery capacity in {}: {}", path.display(), e),
        }
    }
    if levels.is_empty() {
        None
    } else {
        Some(levels.iter().sum::<f64>() / levels.len() as f64)
    }
}

/// Turns raw readings into a [`ResourceSample`], substituting defaults for missing sensors.
pub struct MetricsProbe {
    source: Box<dyn SystemMetrics>,
}

impl MetricsProbe {
    pub fn new(source: Box<dyn SystemMetrics>) -> Self {
        Self { source }
    }

    /// Probe backed by the real host, averaging CPU over `window`.
    pub fn system(window: Duration) -> Self {
        Self::new(Box::new(SysinfoMetrics::new(window)))
    }

    /// Blocks for the CPU sampling window. Never fails.
    pub fn sample(&self) -> ResourceSample {
        let cpu = self.source.cpu_percent().unwrap_or_else(|e| {
            warn!("CPU reading unavailable, assuming 0%: {}", e);
            0.0
        });
        let ram = self.source.ram_percent().unwrap_or_else(|e| {
            warn!("RAM reading unavailable, assuming 0%: {}", e);
            0.0
        });
        let battery = self
            .source
            .battery_percent()
            .filter(|v| v.is_finite())
            .unwrap_or_else(|| {
                debug!("No battery detected, assuming {}%", DEFAULT_BATTERY);
                DEFAULT_BATTERY
            });
        ResourceSample::new(cpu, ram, battery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMetrics(f64, f64, Option<f64>);

    impl SystemMetrics for FixedMetrics {
        fn cpu_percent(&self) -> Result<f64> {
            Ok(self.0)
        }
        fn ram_percent(&self) -> Result<f64> {
            Ok(self.1)
        }
        fn battery_percent(&self) -> Option<f64> {
            self.2
        }
    }

    struct BrokenMetrics;

    impl SystemMetrics for BrokenMetrics {
        fn cpu_percent(&self) -> Result<f64> {
            Err(GuardianError::SensorUnavailable("cpu".into()))
        }
        fn ram_percent(&self) -> Result<f64> {
            Err(GuardianError::SensorUnavailable("ram".into()))
        }
        fn battery_percent(&self) -> Option<f64> {
            None
        }
    }

    #[test]
    fn test_probe_passes_readings_through() {
        let probe = MetricsProbe::new(Box::new(FixedMetrics(42.0, 61.5, Some(77.0))));
        let s = probe.sample();
        assert_eq!(s.cpu_percent, 42.0);
        assert_eq!(s.ram_percent, 61.5);
        assert_eq!(s.battery_percent, 77.0);
    }

    #[test]
    fn test_probe_defaults_missing_sensors() {
        let probe = MetricsProbe::new(Box::new(BrokenMetrics));
        let s = probe.sample();
        assert_eq!(s.cpu_percent, 0.0);
        assert_eq!(s.ram_percent, 0.0);
        assert_eq!(s.battery_percent, DEFAULT_BATTERY);
    }

    #[test]
    fn test_probe_clamps_out_of_range() {
        let probe = MetricsProbe::new(Box::new(FixedMetrics(250.0, -1.0, Some(101.0))));
        let s = probe.sample();
        assert_eq!(s.cpu_percent, 100.0);
        assert_eq!(s.ram_percent, 0.0);
        assert_eq!(s.battery_percent, 100.0);
    }

    #[test]
    fn test_read_battery_from_sysfs_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT0");
        std::fs::create_dir(&bat).unwrap();
        std::fs::write(bat.join("type"), "Battery\n").unwrap();
        std::fs::write(bat.join("capacity"), "64\n").unwrap();
        let ac = dir.path().join("AC");
        std::fs::create_dir(&ac).unwrap();
        std::fs::write(ac.join("type"), "Mains\n").unwrap();

        assert_eq!(read_battery(dir.path()), Some(64.0));
    }

    #[test]
    fn test_non_numeric_battery_reads_as_default() {
        let probe = MetricsProbe::new(Box::new(FixedMetrics(10.0, 10.0, Some(f64::NAN))));
        assert_eq!(probe.sample().battery_percent, DEFAULT_BATTERY);

        let dir = tempfile::tempdir().unwrap();
        let bat = dir.path().join("BAT0");
        std::fs::create_dir(&bat).unwrap();
        std::fs::write(bat.join("type"), "Battery\n").unwrap();
        std::fs::write(bat.join("capacity"), "nan\n").unwrap();
        assert_eq!(read_battery(dir.path()), None);
    }

    #[test]
    fn test_read_battery_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_battery(&dir.path().join("nope")), None);
    }
}
