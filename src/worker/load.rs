//! Host load sampling for the worker's `/load` endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use sysinfo::System;

/// One CPU/memory reading, both in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    pub cpu: f64,
    pub memory: f64,
}

impl LoadSample {
    /// Combined load reported to the router: the larger of the two
    pub fn combined(&self) -> f64 {
        self.cpu.max(self.memory)
    }
}

/// Source of load samples
#[async_trait]
pub trait LoadSampler: Send + Sync {
    async fn sample(&self) -> LoadSample;
}

/// Samples the host with `sysinfo`
///
/// CPU usage needs two refreshes separated by the minimum update interval, so
/// each sample takes at least that long; it runs on the blocking pool.
pub struct SystemLoadSampler {
    system: std::sync::Arc<Mutex<System>>,
}

impl Default for SystemLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemLoadSampler {
    pub fn new() -> Self {
        Self {
            system: std::sync::Arc::new(Mutex::new(System::new())),
        }
    }
}

#[async_trait]
impl LoadSampler for SystemLoadSampler {
    async fn sample(&self) -> LoadSample {
        let system = self.system.clone();

        let join = tokio::task::spawn_blocking(move || {
            let mut sys = system.lock().ok()?;

            sys.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu_usage();
            sys.refresh_memory();

            let cpu = f64::from(sys.global_cpu_usage());
            let total = sys.total_memory();
            let memory = if total == 0 {
                0.0
            } else {
                sys.used_memory() as f64 / total as f64 * 100.0
            };

            Some(LoadSample { cpu, memory })
        });

        match join.await {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                tracing::warn!("Load sampler lock poisoned; reporting full load");
                LoadSample {
                    cpu: 100.0,
                    memory: 100.0,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Load sampling task failed; reporting full load");
                LoadSample {
                    cpu: 100.0,
                    memory: 100.0,
                }
            }
        }
    }
}

/// Sampler returning a constant reading
#[derive(Debug, Clone, Copy)]
pub struct FixedLoadSampler(pub LoadSample);

impl FixedLoadSampler {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self(LoadSample { cpu, memory })
    }
}

#[async_trait]
impl LoadSampler for FixedLoadSampler {
    async fn sample(&self) -> LoadSample {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_is_max() {
        assert_eq!(LoadSample { cpu: 12.0, memory: 64.0 }.combined(), 64.0);
        assert_eq!(LoadSample { cpu: 90.0, memory: 10.0 }.combined(), 90.0);
    }

    #[tokio::test]
    async fn test_system_sampler_in_range() {
        let sample = SystemLoadSampler::new().sample().await;
        assert!((0.0..=100.0).contains(&sample.memory));
        assert!(sample.cpu >= 0.0);
    }

    #[tokio::test]
    async fn test_fixed_sampler() {
        let sample = FixedLoadSampler::new(5.0, 7.5).sample().await;
        assert_eq!(sample.combined(), 7.5);
    }
}
