//! Per-cluster classification state

use std::collections::BTreeMap;

use crate::crd::Engine;
use crate::error::Result;

use super::logs::{LogClassifier, OutputMsg, Watermark, WatermarkPolicy};
use super::status::{StatusNormalizer, StatusReport};

/// Everything one lifecycle operation knows about its target cluster
///
/// Handles share no state, so operations on different clusters never
/// interfere with each other's watermark.
#[derive(Clone, Debug)]
pub struct ClusterHandle {
    engine: Engine,
    name: String,
    status: StatusNormalizer,
    logs: LogClassifier,
}

impl ClusterHandle {
    pub fn new(engine: Engine, name: impl Into<String>, policy: WatermarkPolicy) -> Self {
        let name = name.into();
        Self {
            engine,
            status: StatusNormalizer::new(engine, name.clone()),
            logs: LogClassifier::new(engine, name.clone(), policy),
            name,
        }
    }

    pub fn with_replset(mut self, replset: impl Into<String>) -> Self {
        self.status = self.status.with_replset(replset);
        self
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn watermark(&self) -> Watermark {
        self.logs.watermark()
    }

    pub fn classify_status(
        &self,
        raw: &[u8],
        secrets: &BTreeMap<String, Vec<u8>>,
    ) -> Result<StatusReport> {
        self.status.classify(raw, secrets)
    }

    pub fn classify_backup(&self, backup: &str, raw: &[u8]) -> Result<StatusReport> {
        self.status.classify_backup(backup, raw)
    }

    pub fn classify_logs(&mut self, raw: &[u8]) -> Result<Vec<OutputMsg>> {
        self.logs.classify(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcilers::ClusterState;

    #[test]
    fn handles_keep_separate_watermarks() {
        let line = |ts: f64, cluster: &str| {
            serde_json::json!({
                "level": "error", "ts": ts, "msg": "m", "error": "e",
                "request": format!("default/{}", cluster),
                "controller": "psmdb-controller"
            })
            .to_string()
        };

        let mut a = ClusterHandle::new(Engine::Psmdb, "a", WatermarkPolicy::OwnLines);
        let mut b = ClusterHandle::new(Engine::Psmdb, "b", WatermarkPolicy::OwnLines);
        let raw = format!("{}\n{}", line(1.0, "a"), line(2.0, "b"));

        assert_eq!(a.classify_logs(raw.as_bytes()).unwrap().len(), 1);
        assert_eq!(b.classify_logs(raw.as_bytes()).unwrap().len(), 1);
        assert_eq!(a.watermark().get(), 1.0);
        assert_eq!(b.watermark().get(), 2.0);
    }

    #[test]
    fn replset_override_reaches_status() {
        let handle =
            ClusterHandle::new(Engine::Psmdb, "c", WatermarkPolicy::AllLines).with_replset("main");
        let raw = br#"{"status":{"replsets":{"main":{"status":"ready"}}}}"#;
        let report = handle.classify_status(raw, &BTreeMap::new()).unwrap();
        assert_eq!(report.state, ClusterState::Ready);
    }
}
