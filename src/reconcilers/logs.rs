//! Operator log stream classification

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::Engine;
use crate::error::{Error, Result};

/// Error text of the platform's optimistic-concurrency conflict
pub const CONFLICT_PHRASE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// Start of the retry hint kept when a conflict is demoted
const CONFLICT_HINT: &str = "Operation cannot be fulfilled on";

/// Progress event derived from the operator log
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "text", rename_all = "lowercase")]
pub enum OutputMsg {
    Debug(String),
    Error(String),
}

impl OutputMsg {
    pub fn level(&self) -> &'static str {
        match self {
            OutputMsg::Debug(_) => "debug",
            OutputMsg::Error(_) => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            OutputMsg::Debug(text) | OutputMsg::Error(text) => text,
        }
    }
}

/// One line of operator output
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OperatorLogEntry {
    pub level: String,
    pub ts: f64,
    pub msg: String,
    pub error: String,
    /// `<namespace>/<name>` of the reconciled object
    #[serde(alias = "Request")]
    pub request: String,
    #[serde(alias = "Controller")]
    pub controller: String,
}

impl OperatorLogEntry {
    /// Cluster name from the request, when it has the `ns/name` shape
    pub fn cluster(&self) -> Option<&str> {
        let mut parts = self.request.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(name), None) => Some(name),
            _ => None,
        }
    }
}

/// Highest log timestamp a handle has admitted
///
/// Never moves backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Watermark(f64);

impl Watermark {
    pub fn get(self) -> f64 {
        self.0
    }

    /// True when `ts` is newer than anything admitted so far
    pub fn admits(self, ts: f64) -> bool {
        ts > self.0
    }

    fn advance(&mut self, ts: f64) {
        if ts > self.0 {
            self.0 = ts;
        }
    }
}

/// Which admitted lines move the watermark
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPolicy {
    /// Every line of this engine's controller, whichever cluster it is about
    #[default]
    AllLines,
    /// Only lines about this handle's cluster
    OwnLines,
}

/// Stateful classifier for one cluster's operator log
#[derive(Clone, Debug)]
pub struct LogClassifier {
    controller: &'static str,
    cluster: String,
    watermark: Watermark,
    policy: WatermarkPolicy,
}

impl LogClassifier {
    pub fn new(engine: Engine, cluster: impl Into<String>, policy: WatermarkPolicy) -> Self {
        Self {
            controller: engine.controller(),
            cluster: cluster.into(),
            watermark: Watermark::default(),
            policy,
        }
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Classify a batch of newline-delimited JSON log lines
    ///
    /// Any undecodable line fails the whole batch and leaves the watermark
    /// where it was, so the batch can be fed again.
    pub fn classify(&mut self, raw: &[u8]) -> Result<Vec<OutputMsg>> {
        let mut watermark = self.watermark;
        let mut events = Vec::new();

        for line in raw.split(|b| *b == b'\n') {
            let line = trim_line(line);
            if line.is_empty() {
                continue;
            }

            let entry: OperatorLogEntry = serde_json::from_slice(line).map_err(Error::LogDecode)?;

            if entry.controller != self.controller {
                continue;
            }
            if !watermark.admits(entry.ts) {
                continue;
            }

            let own = entry.cluster() == Some(self.cluster.as_str());
            if own || self.policy == WatermarkPolicy::AllLines {
                watermark.advance(entry.ts);
            }

            if entry.level != "error" || !own {
                continue;
            }

            events.push(rewrite_entry(&entry));
        }

        self.watermark = watermark;
        Ok(events)
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

/// Conflicts become debug lines; anything else reads `msg: error`
fn rewrite_entry(entry: &OperatorLogEntry) -> OutputMsg {
    if entry.error.contains(CONFLICT_PHRASE) {
        let hint = entry
            .error
            .find(CONFLICT_HINT)
            .map(|i| &entry.error[i..])
            .unwrap_or(&entry.error);
        return OutputMsg::Debug(hint.to_string());
    }
    OutputMsg::Error(format!("{}: {}", entry.msg, entry.error))
}
