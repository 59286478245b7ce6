//! Poll loop driving a submitted operation to a terminal state

use std::collections::BTreeMap;

use kube::core::TypeMeta;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapters::ObjectStore;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::{ClusterHandle, ClusterState, OutputMsg, StatusReport};
use crate::settings::EngineSettings;

use super::handle::Reporter;

/// What a tick reads to decide whether the operation is done
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Probe {
    /// Cluster document status
    Cluster,
    /// Status of the named backup object
    Backup(String),
    /// Cluster document no longer present
    Gone,
}

pub(crate) struct Poller<'a> {
    pub store: &'a dyn ObjectStore,
    pub settings: &'a EngineSettings,
    pub reporter: &'a Reporter,
    pub cluster: ClusterHandle,
    pub type_meta: TypeMeta,
}

impl Poller<'_> {
    /// Poll until Ready, Error or the attempt budget runs out
    pub async fn run(mut self, probe: Probe) -> Result<StatusReport> {
        let engine = self.cluster.engine();
        let max_attempts = self.settings.max_poll_attempts;

        if !self.settings.settle_delay().is_zero() {
            sleep(self.settings.settle_delay()).await;
        }

        let mut ticker = interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=max_attempts {
            ticker.tick().await;
            metrics::POLL_ATTEMPTS
                .with_label_values(&[engine.as_str()])
                .inc();

            self.tail_logs(attempt).await;

            match self.check(&probe).await {
                Ok(report) => match report.state {
                    ClusterState::Ready => {
                        info!(cluster = %self.cluster.name(), attempt, "Reached ready state");
                        return Ok(report);
                    }
                    ClusterState::Error => {
                        return Err(Error::ClusterFailed {
                            messages: report.messages,
                        })
                    }
                    ClusterState::Init | ClusterState::Unknown => {
                        debug!(cluster = %self.cluster.name(), attempt, "Still reconciling");
                    }
                },
                Err(e) if e.is_transient() => {
                    if matches!(e, Error::StatusDecode(_)) {
                        metrics::STATUS_DECODE_ERRORS
                            .with_label_values(&[engine.as_str()])
                            .inc();
                    }
                    warn!(cluster = %self.cluster.name(), attempt, error = %e, "Status check failed");
                    self.reporter.progress(OutputMsg::Debug(e.to_string())).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ReconcileExhausted {
            attempts: max_attempts,
        })
    }

    /// Forward new operator log events; failures only cost this tick
    async fn tail_logs(&mut self, attempt: u32) {
        let engine = self.cluster.engine();
        let events = match self.store.operator_logs(engine.operator_name()).await {
            Ok(raw) => self.cluster.classify_logs(&raw),
            Err(e) => Err(e),
        };

        match events {
            Ok(events) => {
                for event in events {
                    metrics::LOG_EVENTS
                        .with_label_values(&[engine.as_str(), event.level()])
                        .inc();
                    self.reporter.progress(event).await;
                }
            }
            Err(e) => {
                debug!(cluster = %self.cluster.name(), attempt, error = %e, "Operator log unavailable");
                self.reporter.progress(OutputMsg::Debug(e.to_string())).await;
            }
        }
    }

    async fn check(&self, probe: &Probe) -> Result<StatusReport> {
        let name = self.cluster.name();
        match probe {
            Probe::Cluster => {
                let raw = self.store.get(&self.type_meta, name).await?;
                let report = self.cluster.classify_status(&raw, &BTreeMap::new())?;
                if report.state != ClusterState::Ready {
                    return Ok(report);
                }
                // Credentials are only read once the endpoint is reported
                let secret = self.cluster.engine().users_secret(name);
                let secrets = match self.store.secret_values(&secret).await {
                    Ok(values) => values,
                    Err(e) => {
                        warn!(secret = %secret, error = %e, "Unable to read cluster credentials");
                        BTreeMap::new()
                    }
                };
                self.cluster.classify_status(&raw, &secrets)
            }
            Probe::Backup(backup) => {
                let backup_type = self.cluster.engine().backup_type_meta();
                let raw = self.store.get(&backup_type, backup).await?;
                self.cluster.classify_backup(backup, &raw)
            }
            Probe::Gone => {
                if self.store.exists(&self.type_meta, name).await? {
                    return Ok(StatusReport::default());
                }
                Ok(StatusReport {
                    state: ClusterState::Ready,
                    messages: vec![format!(
                        "{} cluster {} deleted",
                        self.cluster.engine().product(),
                        name
                    )],
                    endpoint: None,
                })
            }
        }
    }
}
