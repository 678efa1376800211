//! # Calendar Scheduler
//!
//! Wakes on a fixed interval, works out which devices should be lit today and
//! broadcasts the commands needed to get them there.
//!
//! ## Pass Workflow:
//! 1.  Take the registry lock once via [`Registry::for_each_mut`].
//! 2.  For every record, evaluate [`is_active_on`] against the local date.
//! 3.  Look up the [`transition`] for `(active, last_state)`.
//! 4.  On a transition, broadcast the command and set `last_state` to match.
//!     If the broadcast fails the record is left as it was, so the next pass
//!     tries again.
//! 5.  The registry saves all changes before releasing the lock.
//!
//! The sleep between passes is a plain delay, not aligned to the wall clock.

use crate::calendar::{is_active_on, transition};
use crate::error::RegistryError;
use crate::model::{Command, PowerState};
use crate::registry::Registry;
use crate::transport::CommandTransport;
use crate::utils::{defaults, local_today};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// What a single pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Records visited.
    pub evaluated: usize,
    /// Commands successfully broadcast, in visit order.
    pub sent: Vec<(String, Command)>,
    /// Commands whose broadcast failed.
    pub failed: Vec<(String, Command)>,
}

pub struct CalendarScheduler {
    registry: Arc<Registry>,
    transport: Arc<dyn CommandTransport>,
    interval: Duration,
}

impl CalendarScheduler {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn CommandTransport>) -> Self {
        Self {
            registry,
            transport,
            interval: Duration::from_secs(defaults::SCHEDULER_INTERVAL_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs passes forever, sleeping `interval` between them, until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        log::info!("Calendar scheduler started, interval {:?}.", self.interval);
        loop {
            let today = local_today();
            match self.run_pass(today).await {
                Ok(report) if !report.sent.is_empty() || !report.failed.is_empty() => {
                    log::info!(
                        "Scheduler pass for {}: {} device(s), {} command(s) sent, {} failed.",
                        today,
                        report.evaluated,
                        report.sent.len(),
                        report.failed.len()
                    );
                }
                Ok(report) => {
                    log::debug!("Scheduler pass for {}: {} device(s), nothing to do.", today, report.evaluated);
                }
                Err(e) => {
                    log::error!("Scheduler pass failed to persist: {}", e);
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Calendar scheduler received shutdown signal.");
                    break;
                }
                _ = sleep(self.interval) => {}
            }
        }
    }

    /// One evaluation pass against `today`.
    pub async fn run_pass(&self, today: NaiveDate) -> Result<PassReport, RegistryError> {
        let mut report = PassReport::default();
        let transport = &self.transport;

        self.registry
            .for_each_mut(|id, record| {
                report.evaluated += 1;
                let active = is_active_on(record, today);
                let Some(cmd) = transition(active, &record.last_state) else {
                    return false;
                };

                match transport.send(id, cmd) {
                    Ok(()) => {
                        log::info!("Device '{}' {} -> {}", id, record.last_state, cmd);
                        record.last_state = PowerState::from(cmd);
                        report.sent.push((id.to_string(), cmd));
                        true
                    }
                    Err(e) => {
                        log::warn!("Failed to send {} to '{}': {}", cmd, id, e);
                        report.failed.push((id.to_string(), cmd));
                        false
                    }
                }
            })
            .await?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Command)>>,
        fail: Mutex<bool>,
    }

    impl CommandTransport for RecordingTransport {
        fn send(&self, device_id: &str, cmd: Command) -> Result<(), TransportError> {
            if *self.fail.lock().unwrap() {
                return Err(TransportError::Io {
                    target: "test".to_string(),
                    source: std::io::Error::other("network down"),
                });
            }
            self.sent.lock().unwrap().push((device_id.to_string(), cmd));
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<Registry>, Arc<RecordingTransport>, CalendarScheduler) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::open(store.clone()).unwrap());
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = CalendarScheduler::new(registry.clone(), transport.clone());
        (store, registry, transport, scheduler)
    }

    #[tokio::test]
    async fn interval_defaults_and_can_be_overridden() {
        let (_store, _registry, _transport, scheduler) = setup().await;
        assert_eq!(scheduler.interval(), Duration::from_secs(defaults::SCHEDULER_INTERVAL_SECS));
        let scheduler = scheduler.with_interval(Duration::from_secs(5));
        assert_eq!(scheduler.interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn active_device_gets_one_on_then_nothing() {
        let (store, registry, transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
        registry.set_dates("lamp-1", Some("2026-10-14".to_string()), None).await.unwrap();

        let first = scheduler.run_pass(today()).await.unwrap();
        assert_eq!(first.sent, vec![("lamp-1".to_string(), Command::On)]);
        assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::On);
        assert_eq!(store.saved()["lamp-1"].last_state, PowerState::On);

        let second = scheduler.run_pass(today()).await.unwrap();
        assert!(second.sent.is_empty());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn device_left_on_after_its_day_is_turned_off() {
        let (_store, registry, transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::On, 1).await.unwrap();
        registry.set_dates("lamp-1", Some("2026-10-13".to_string()), None).await.unwrap();

        scheduler.run_pass(today()).await.unwrap();

        assert_eq!(*transport.sent.lock().unwrap(), vec![("lamp-1".to_string(), Command::Off)]);
        assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::Off);
    }

    #[tokio::test]
    async fn external_manual_off_is_healed_while_active() {
        let (_store, registry, transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
        registry.set_dates("lamp-1", None, Some("2026-10-14".to_string())).await.unwrap();
        scheduler.run_pass(today()).await.unwrap();

        registry
            .set_state("lamp-1", PowerState::Reported("MANUAL_OFF".to_string()))
            .await
            .unwrap();
        let report = scheduler.run_pass(today()).await.unwrap();

        assert_eq!(report.sent, vec![("lamp-1".to_string(), Command::On)]);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::On);
    }

    #[tokio::test]
    async fn inactive_devices_in_other_states_are_left_alone() {
        let (store, registry, transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
        registry
            .upsert("lamp-2", PowerState::Reported("MANUAL_OFF".to_string()), 1)
            .await
            .unwrap();
        registry.set_dates("lamp-2", Some("not-a-date".to_string()), None).await.unwrap();
        let saves = store.save_count();

        let report = scheduler.run_pass(today()).await.unwrap();

        assert_eq!(report.evaluated, 2);
        assert!(report.sent.is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(store.save_count(), saves);
    }

    #[tokio::test]
    async fn failed_broadcast_keeps_state_for_retry() {
        let (_store, registry, transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
        registry.set_dates("lamp-1", Some("2026-10-14".to_string()), None).await.unwrap();

        *transport.fail.lock().unwrap() = true;
        let report = scheduler.run_pass(today()).await.unwrap();
        assert_eq!(report.failed, vec![("lamp-1".to_string(), Command::On)]);
        assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::Off);

        *transport.fail.lock().unwrap() = false;
        let report = scheduler.run_pass(today()).await.unwrap();
        assert_eq!(report.sent, vec![("lamp-1".to_string(), Command::On)]);
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_memory_is_unchanged() {
        let (store, registry, _transport, scheduler) = setup().await;
        registry.upsert("lamp-1", PowerState::Off, 1).await.unwrap();
        registry.set_dates("lamp-1", Some("2026-10-14".to_string()), None).await.unwrap();
        store.set_failing(true);

        assert!(scheduler.run_pass(today()).await.is_err());
        assert_eq!(registry.get("lamp-1").await.unwrap().last_state, PowerState::Off);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_store, _registry, _transport, scheduler) = setup().await;
        let scheduler = scheduler.with_interval(Duration::from_secs(3600));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
