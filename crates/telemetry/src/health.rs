//! Reachability of the importer's two dependencies.
//!
//! Each dependency is probed once at start-up and then tracked from the
//! outcome of every backend query and every insert statement, so a stalled
//! import shows up here without a separate poller.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Aggregate status over all dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Last known state of one dependency.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    healthy: AtomicBool,
    consecutive_failures: AtomicU64,
    last_error: RwLock<Option<String>>,
    last_checked: RwLock<Option<DateTime<Utc>>>,
}

impl ComponentHealth {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            healthy: AtomicBool::new(false),
            consecutive_failures: AtomicU64::new(0),
            last_error: RwLock::new(None),
            last_checked: RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_error.write() = None;
        *self.last_checked.write() = Some(Utc::now());
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(msg.into());
        *self.last_checked.write() = Some(Utc::now());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        *self.last_checked.read()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<&ComponentHealth> for ComponentHealthReport {
    fn from(component: &ComponentHealth) -> Self {
        Self {
            name: component.name().to_string(),
            healthy: component.is_healthy(),
            consecutive_failures: component.consecutive_failures(),
            last_error: component.last_error(),
            last_checked: component.last_checked(),
        }
    }
}

/// The metrics backend and ClickHouse.
pub struct HealthRegistry {
    pub prometheus: ComponentHealth,
    pub clickhouse: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            prometheus: ComponentHealth::new("prometheus"),
            clickhouse: ComponentHealth::new("clickhouse"),
        }
    }

    fn components(&self) -> [&ComponentHealth; 2] {
        [&self.prometheus, &self.clickhouse]
    }

    pub fn status(&self) -> HealthStatus {
        let healthy = self.components().iter().filter(|c| c.is_healthy()).count();
        match healthy {
            2 => HealthStatus::Healthy,
            0 => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.status(),
            components: self
                .components()
                .into_iter()
                .map(ComponentHealthReport::from)
                .collect(),
        }
    }

    /// Imports can only make progress when both ends are reachable.
    pub fn is_ready(&self) -> bool {
        self.status() == HealthStatus::Healthy
    }

    /// The process is serving; dependencies do not matter here.
    pub fn is_alive(&self) -> bool {
        true
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
