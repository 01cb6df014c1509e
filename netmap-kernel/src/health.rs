use crate::publish::SnapshotHandle;
use crate::scheduler::{Phase, SchedulerControl};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub snapshot_version: u64,
    pub locations_tracked: u32,
    pub sites_tracked: u32,
    pub error_rows: u32,
    pub scheduler_phase: Phase,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub memory_usage_mb: f32,
    /// "disabled" quand aucun broker n'est configuré
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("disabled".to_string())),
        }
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = "connecting".to_string();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, snapshots: &SnapshotHandle, scheduler: &SchedulerControl) -> KernelHealth {
        let snapshot = snapshots.get_snapshot();
        let status = scheduler.status();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            snapshot_version: snapshot.version,
            locations_tracked: snapshot.locations.len() as u32,
            sites_tracked: snapshot.sites.len() as u32,
            error_rows: snapshot.errors.len() as u32,
            scheduler_phase: status.phase,
            cycles_completed: status.cycles_completed,
            cycles_failed: status.cycles_failed,
            consecutive_failures: status.consecutive_failures,
            last_error: status.last_error,
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        let rss_kb = std::fs::read_to_string("/proc/self/status").ok().and_then(|status| {
            status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
        });
        if let Some(kb) = rss_kb {
            return kb as f32 / 1024.0;
        }
    }
    0.0
}
