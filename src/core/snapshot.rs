use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a distinct origin of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "mem")]
    Memory,
    #[serde(rename = "disk")]
    Disk,
    #[serde(rename = "net")]
    Network,
    #[serde(rename = "proc")]
    Process,
    #[serde(rename = "docker")]
    Docker,
    #[serde(rename = "fps")]
    Fps,
}

impl SourceId {
    pub const COUNT: usize = 7;

    pub const ALL: [SourceId; SourceId::COUNT] = [
        SourceId::Cpu,
        SourceId::Memory,
        SourceId::Disk,
        SourceId::Network,
        SourceId::Process,
        SourceId::Docker,
        SourceId::Fps,
    ];

    /// Dense index, used for per-source slot arrays
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::Cpu => "cpu",
            SourceId::Memory => "mem",
            SourceId::Disk => "disk",
            SourceId::Network => "net",
            SourceId::Process => "proc",
            SourceId::Docker => "docker",
            SourceId::Fps => "fps",
        }
    }

    /// Polling cadence used when neither the CLI nor the config overrides it
    pub fn default_interval(self) -> Duration {
        match self {
            SourceId::Disk | SourceId::Docker => Duration::from_secs(3),
            SourceId::Process => Duration::from_secs(2),
            SourceId::Cpu | SourceId::Memory | SourceId::Network | SourceId::Fps => {
                Duration::from_secs(1)
            }
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(SourceId::Cpu),
            "mem" | "memory" => Ok(SourceId::Memory),
            "disk" => Ok(SourceId::Disk),
            "net" | "network" => Ok(SourceId::Network),
            "proc" | "process" => Ok(SourceId::Process),
            "docker" => Ok(SourceId::Docker),
            "fps" => Ok(SourceId::Fps),
            other => Err(format!(
                "unknown source '{}' (expected one of: cpu, mem, disk, net, proc, docker, fps)",
                other
            )),
        }
    }
}

/// Parse a comma-separated source list, keeping first-seen order and dropping duplicates.
pub fn parse_source_list(list: &str) -> Result<Vec<SourceId>, String> {
    let mut sources = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let id: SourceId = part.parse()?;
        if !sources.contains(&id) {
            sources.push(id);
        }
    }
    if sources.is_empty() {
        return Err("at least one source is required".to_string());
    }
    Ok(sources)
}

/// One row inside a snapshot: a process, container, core, disk, interface or stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    pub label: String,
    pub values: BTreeMap<String, f64>,
}

impl Entity {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// One timestamped set of readings from a single source.
///
/// Built once by an adapter and then shared read-only (`Arc<Snapshot>`)
/// between the store and the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: SourceId,
    pub taken_at: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
    pub entities: Vec<Entity>,
}

impl Snapshot {
    pub fn new(source: SourceId) -> Self {
        Self::at(source, Utc::now())
    }

    pub fn at(source: SourceId, taken_at: DateTime<Utc>) -> Self {
        Self {
            source,
            taken_at,
            values: BTreeMap::new(),
            entities: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value or zero, for display code that always needs a number
    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.value(name).unwrap_or(0.0)
    }
}
