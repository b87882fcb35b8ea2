//! Frame-rate counters fed by a background line reader.
//!
//! The reader consumes frame events from an HTTP NDJSON status stream or a
//! tailed log file and buckets them per wall-clock second. `fetch` only reads
//! the counters, so a slow feed never blocks the scheduler.
//!
//! HTTP feeds also get their stream names and analysis flags from the
//! server's `/api/streams` endpoints, polled every few seconds.

use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::MetricSource;
use crate::core::{Entity, HistoryRing, Snapshot, SourceId, DEFAULT_HISTORY_SIZE};
use crate::error::FetchError;

pub const FPS_LATEST: &str = "fps";
pub const FPS_MEDIAN: &str = "fps_median";
pub const FPS_MIN: &str = "fps_min";
pub const FPS_MAX: &str = "fps_max";
pub const FPS_AVG: &str = "fps_avg";
pub const STREAM_COUNT: &str = "streams";
pub const STREAMS_MIN: &str = "streams_fps_min";
pub const STREAMS_MAX: &str = "streams_fps_max";
pub const STREAMS_AVG: &str = "streams_fps_avg";
/// Per-stream flag: 1 when the server analyzes the stream, 0 when it only keeps it
pub const STREAM_ANALYZE: &str = "analyze";

/// Stream name used for bare-timestamp lines
pub const DEFAULT_STREAM: &str = "default";

const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STREAM_CONFIG_INTERVAL: Duration = Duration::from_secs(3);

/// Feed lines longer than this are dropped whole
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Summary over a counter's committed history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FpsStats {
    pub latest: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

/// Frames bucketed per second, with a bounded history of committed seconds.
#[derive(Debug, Clone)]
pub struct FrameCounter {
    current_second: Option<u64>,
    pending: u64,
    latest: u64,
    history: HistoryRing<u64>,
}

impl FrameCounter {
    pub fn new(history_size: usize) -> Self {
        Self {
            current_second: None,
            pending: 0,
            latest: 0,
            history: HistoryRing::with_capacity(history_size),
        }
    }

    /// Count `count` frames observed during `second`.
    pub fn record(&mut self, second: u64, count: u64) {
        match self.current_second {
            None => {
                self.current_second = Some(second);
                self.pending = count;
            }
            // Late or clock-skewed events land in the open bucket
            Some(current) if second <= current => self.pending += count,
            Some(_) => {
                self.advance_to(second);
                self.pending = count;
            }
        }
    }

    /// Commit every finished second before `second`; idle seconds commit as zero.
    pub fn advance_to(&mut self, second: u64) {
        let Some(current) = self.current_second else {
            return;
        };
        if second <= current {
            return;
        }

        self.latest = self.pending;
        self.history.push(self.pending);

        let idle = (second - current - 1).min(self.history.capacity() as u64);
        for _ in 0..idle {
            self.history.push(0);
            self.latest = 0;
        }

        self.current_second = Some(second);
        self.pending = 0;
    }

    /// Frames counted in the last committed second
    pub fn latest(&self) -> u64 {
        self.latest
    }

    pub fn history(&self) -> &HistoryRing<u64> {
        &self.history
    }

    pub fn stats(&self) -> FpsStats {
        if self.history.is_empty() {
            return FpsStats::default();
        }

        let mut sorted = self.history.to_vec();
        sorted.sort_unstable();
        let len = sorted.len();
        let median = if len % 2 == 0 {
            (sorted[len / 2 - 1] + sorted[len / 2]) as f64 / 2.0
        } else {
            sorted[len / 2] as f64
        };

        FpsStats {
            latest: self.latest as f64,
            median,
            min: sorted[0] as f64,
            max: sorted[len - 1] as f64,
            average: sorted.iter().sum::<u64>() as f64 / len as f64,
        }
    }
}

/// Parse one feed line into `(stream, tstamp)` frame events.
///
/// A line is either a bare numeric timestamp or a status packet of the form
/// `{"<stream>": {"Screen": {"tstamp": n}}}`. Returns `None` for blank or
/// unparseable lines.
pub fn parse_frame_line(line: &str) -> Option<Vec<(String, f64)>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Ok(tstamp) = line.parse::<f64>() {
        return Some(vec![(DEFAULT_STREAM.to_string(), tstamp)]);
    }

    let packet: serde_json::Value = serde_json::from_str(line).ok()?;
    let events = packet
        .as_object()?
        .iter()
        .filter_map(|(stream, status)| {
            let tstamp = status.get("Screen")?.get("tstamp")?.as_f64()?;
            Some((stream.clone(), tstamp))
        })
        .collect();
    Some(events)
}

/// A stream as configured on the feed server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConf {
    pub id: String,
    pub name: String,
    pub analyze: bool,
}

/// Counters shared between the feed reader and the adapter
#[derive(Debug)]
pub struct FpsState {
    history_size: usize,
    total: FrameCounter,
    streams: BTreeMap<String, FrameCounter>,
    last_tstamp: HashMap<String, f64>,
    configs: Vec<StreamConf>,
}

impl FpsState {
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size,
            total: FrameCounter::new(history_size),
            streams: BTreeMap::new(),
            last_tstamp: HashMap::new(),
            configs: Vec::new(),
        }
    }

    /// Replace the known stream configurations. Configured streams are listed
    /// even before their first frame.
    pub fn set_configs(&mut self, configs: Vec<StreamConf>) {
        self.configs = configs;
    }

    /// Count the frames carried by one feed line. Returns how many were new.
    pub fn ingest_line(&mut self, line: &str, second: u64) -> u64 {
        let Some(events) = parse_frame_line(line) else {
            log::trace!("Ignoring FPS feed line: {}", line.trim());
            return 0;
        };

        let mut received = 0;
        for (stream, tstamp) in events {
            let previous = self.last_tstamp.get(&stream).copied().unwrap_or(f64::MIN);
            if tstamp <= previous {
                continue;
            }
            self.last_tstamp.insert(stream.clone(), tstamp);
            received += 1;

            let history_size = self.history_size;
            self.streams
                .entry(stream)
                .or_insert_with(|| FrameCounter::new(history_size))
                .record(second, 1);
        }
        self.total.record(second, received);
        received
    }

    pub fn advance_to(&mut self, second: u64) {
        self.total.advance_to(second);
        for counter in self.streams.values_mut() {
            counter.advance_to(second);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let total = self.total.stats();
        let latest: Vec<f64> = self.streams.values().map(|c| c.latest() as f64).collect();
        let (streams_min, streams_max, streams_avg) = if latest.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = latest.iter().sum();
            (
                latest.iter().copied().fold(f64::INFINITY, f64::min),
                latest.iter().copied().fold(0.0, f64::max),
                sum / latest.len() as f64,
            )
        };

        let mut entities: Vec<Entity> = self
            .configs
            .iter()
            .map(|conf| {
                stream_entity(&conf.id, &conf.name, self.streams.get(&conf.id))
                    .with(STREAM_ANALYZE, if conf.analyze { 1.0 } else { 0.0 })
            })
            .collect();
        // Streams sending frames without a configuration come last
        entities.extend(
            self.streams
                .iter()
                .filter(|(stream, _)| !self.configs.iter().any(|conf| &conf.id == *stream))
                .map(|(stream, counter)| stream_entity(stream, stream, Some(counter))),
        );

        Snapshot::new(SourceId::Fps)
            .with(FPS_LATEST, self.total.latest() as f64)
            .with(FPS_MEDIAN, total.median)
            .with(FPS_MIN, total.min)
            .with(FPS_MAX, total.max)
            .with(FPS_AVG, total.average)
            .with(STREAM_COUNT, entities.len() as f64)
            .with(STREAMS_MIN, streams_min)
            .with(STREAMS_MAX, streams_max)
            .with(STREAMS_AVG, streams_avg)
            .with_entities(entities)
    }
}

fn stream_entity(key: &str, label: &str, counter: Option<&FrameCounter>) -> Entity {
    let stats = counter.map(FrameCounter::stats).unwrap_or_default();
    Entity::new(key, label)
        .with(FPS_LATEST, counter.map_or(0.0, |c| c.latest() as f64))
        .with(FPS_AVG, stats.average)
        .with(FPS_MIN, stats.min)
        .with(FPS_MAX, stats.max)
}

/// Where frame events come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FpsFeed {
    /// HTTP endpoint streaming newline-delimited status packets
    Http(String),
    /// Log file tailed from its current end
    File(PathBuf),
}

impl std::fmt::Display for FpsFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FpsFeed::Http(url) => write!(f, "{}", url),
            FpsFeed::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn now_second() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

#[derive(Debug)]
struct Shared {
    state: FpsState,
    failure: Option<FetchError>,
}

type SharedState = Arc<Mutex<Shared>>;

fn ingest(shared: &SharedState, line: &str) {
    shared.lock().state.ingest_line(line, now_second());
}

/// Splits a byte stream into lines, dropping lines over [`MAX_LINE_BYTES`].
#[derive(Debug, Default)]
struct LineSplitter {
    buffer: Vec<u8>,
    discarding: bool,
}

impl LineSplitter {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            if !self.discarding {
                self.buffer.extend_from_slice(piece);
                if self.buffer.len() > MAX_LINE_BYTES {
                    log::debug!("Dropping FPS feed line longer than {} bytes", MAX_LINE_BYTES);
                    self.buffer.clear();
                    self.discarding = true;
                }
            }
            if piece.ends_with(b"\n") {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(String::from_utf8_lossy(&self.buffer).into_owned());
                    self.buffer.clear();
                }
            }
        }
        lines
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

async fn read_http(url: &str, shared: &SharedState) -> Result<(), FetchError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| FetchError::not_available(format!("FPS feed {}: {}", url, e)))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::permission_denied(format!("FPS feed {} returned {}", url, status)));
    }
    if !status.is_success() {
        return Err(FetchError::not_available(format!("FPS feed {} returned {}", url, status)));
    }

    let mut body = response.bytes_stream();
    let mut lines = LineSplitter::default();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FetchError::not_available(format!("FPS feed {}: {}", url, e)))?;
        for line in lines.push(&chunk) {
            ingest(shared, &line);
        }
    }
    Err(FetchError::not_available(format!("FPS feed {} closed", url)))
}

/// Device and inode of a file, used to notice log rotation
#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

async fn tail_file(path: &Path, shared: &SharedState) -> Result<(), FetchError> {
    let io_error = |e: std::io::Error| FetchError::from_io("FPS feed file", &e);

    let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let mut position = file.seek(SeekFrom::End(0)).await.map_err(io_error)?;
    let mut identity = file_identity(&file.metadata().await.map_err(io_error)?);

    let mut lines = LineSplitter::default();
    let mut chunk = vec![0u8; 8192];
    loop {
        let read = file.read(&mut chunk).await.map_err(io_error)?;
        if read > 0 {
            position += read as u64;
            for line in lines.push(&chunk[..read]) {
                ingest(shared, &line);
            }
            continue;
        }
        tokio::time::sleep(TAIL_POLL_INTERVAL).await;

        // Missing between a rotation and the writer re-creating it
        let Ok(meta) = tokio::fs::metadata(path).await else {
            continue;
        };
        if file_identity(&meta) != identity {
            log::debug!("FPS feed file {} was replaced, reopening", path.display());
            file = tokio::fs::File::open(path).await.map_err(io_error)?;
            identity = file_identity(&file.metadata().await.map_err(io_error)?);
            position = 0;
            lines.reset();
        } else if meta.len() < position {
            log::debug!("FPS feed file {} was truncated, reading from the start", path.display());
            position = file.seek(SeekFrom::Start(0)).await.map_err(io_error)?;
            lines.reset();
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    id: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
}

/// Server root of an HTTP feed, where the stream API lives
fn api_base(feed_url: &str) -> Option<reqwest::Url> {
    let mut url = reqwest::Url::parse(feed_url).ok()?;
    if url.cannot_be_a_base() {
        return None;
    }
    url.set_path("/");
    url.set_query(None);
    Some(url)
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    base: &reqwest::Url,
    path: &str,
) -> Result<T, FetchError> {
    let url = base
        .join(path)
        .map_err(|e| FetchError::not_available(format!("stream API {}: {}", path, e)))?;
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::not_available(format!("stream API {}: {}", url, e)))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::permission_denied(format!("stream API {} returned {}", url, status)));
    }
    if !status.is_success() {
        return Err(FetchError::not_available(format!("stream API {} returned {}", url, status)));
    }
    response
        .json()
        .await
        .map_err(|e| FetchError::not_available(format!("stream API {}: {}", url, e)))
}

/// Any non-empty, non-zero, non-false answer counts as analyzed
fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::Object(fields) => !fields.is_empty(),
    }
}

/// List the streams configured on the feed server, with their analysis flag.
pub async fn list_streams(
    client: &reqwest::Client,
    base: &reqwest::Url,
) -> Result<Vec<StreamConf>, FetchError> {
    let records: Vec<StreamRecord> = get_json(client, base, "api/streams").await?;

    let mut configs = Vec::with_capacity(records.len());
    for record in records {
        let id = match record.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };
        let analysis: serde_json::Value =
            get_json(client, base, &format!("api/streams/{}/analyze", id)).await?;
        configs.push(StreamConf {
            name: record.name.unwrap_or_else(|| id.clone()),
            analyze: is_truthy(&analysis),
            id,
        });
    }
    Ok(configs)
}

async fn poll_stream_configs(base: reqwest::Url, shared: SharedState) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(STREAM_CONFIG_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match tokio::time::timeout(STREAM_CONFIG_INTERVAL, list_streams(&client, &base)).await {
            Ok(Ok(configs)) => shared.lock().state.set_configs(configs),
            // Keep the last known configurations
            Ok(Err(e)) => log::debug!("Stream configuration poll failed: {}", e),
            Err(_) => log::debug!("Stream configuration poll timed out"),
        }
    }
}

async fn run_reader(feed: FpsFeed, shared: SharedState) {
    log::info!("Reading FPS feed from {}", feed);
    let result = match &feed {
        FpsFeed::Http(url) => read_http(url, &shared).await,
        FpsFeed::File(path) => tail_file(path, &shared).await,
    };
    if let Err(e) = result {
        log::warn!("FPS feed {} stopped: {}", feed, e);
        shared.lock().failure = Some(e);
    }
}

/// Frame-rate adapter over an [`FpsFeed`].
pub struct FpsSource {
    feed: Option<FpsFeed>,
    shared: SharedState,
    reader: Option<JoinHandle<()>>,
    config_poller: Option<JoinHandle<()>>,
}

impl FpsSource {
    pub fn new(feed: Option<FpsFeed>) -> Self {
        Self::with_history_size(feed, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(feed: Option<FpsFeed>, history_size: usize) -> Self {
        Self {
            feed,
            shared: Arc::new(Mutex::new(Shared {
                state: FpsState::new(history_size),
                failure: None,
            })),
            reader: None,
            config_poller: None,
        }
    }

    fn ensure_reader(&mut self, feed: FpsFeed) {
        let running = self.reader.as_ref().is_some_and(|handle| !handle.is_finished());
        if !running {
            self.reader = Some(tokio::spawn(run_reader(feed, Arc::clone(&self.shared))));
        }
    }

    fn ensure_config_poller(&mut self, feed: &FpsFeed) {
        if self.config_poller.is_some() {
            return;
        }
        if let FpsFeed::Http(url) = feed {
            if let Some(base) = api_base(url) {
                self.config_poller =
                    Some(tokio::spawn(poll_stream_configs(base, Arc::clone(&self.shared))));
            }
        }
    }
}

impl Drop for FpsSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(poller) = self.config_poller.take() {
            poller.abort();
        }
    }
}

impl MetricSource for FpsSource {
    fn id(&self) -> SourceId {
        SourceId::Fps
    }

    async fn fetch(&mut self) -> Result<Snapshot, FetchError> {
        let Some(feed) = self.feed.clone() else {
            return Err(FetchError::not_available(
                "no FPS feed configured (use --fps-url or --fps-file)",
            ));
        };

        let failure = self.shared.lock().failure.take();
        self.ensure_config_poller(&feed);
        // A failed reader has already exited; the next one starts right away
        self.ensure_reader(feed);
        if let Some(err) = failure {
            return Err(err);
        }

        let mut shared = self.shared.lock();
        shared.state.advance_to(now_second());
        Ok(shared.state.snapshot())
    }
}
