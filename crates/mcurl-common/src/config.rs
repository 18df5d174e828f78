use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{McurlError, Result};

const DATA_PREVIEW_LEN: usize = 128;

/// Values used for every flag the operator did not pass explicitly.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    pub requests: usize,
    pub repeat: u32,
    pub duration_ms: u64,
    pub cooldown_ms: u64,
    pub timeout_ms: Option<u64>,
    pub headers: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            requests: 10,
            repeat: 1,
            duration_ms: 0,
            cooldown_ms: 1000,
            timeout_ms: None,
            headers: Vec::new(),
        }
    }
}

impl Defaults {
    /// Reads `MCURL_CONFIG` when set, otherwise the built-in values with
    /// `MCURL_*` environment overrides applied.
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var("MCURL_CONFIG") {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path).map_err(|e| McurlError::ConfigFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            return Self::from_yaml(&text).map_err(|e| match e {
                McurlError::ConfigFile { reason, .. } => McurlError::ConfigFile { path, reason },
                other => other,
            });
        }
        let mut cfg = Self::default();
        if let Some(v) = env::var("MCURL_REQUESTS").ok().and_then(|v| v.parse().ok()) { cfg.requests = v; }
        if let Some(v) = env::var("MCURL_REPEAT").ok().and_then(|v| v.parse().ok()) { cfg.repeat = v; }
        if let Some(v) = env::var("MCURL_DURATION_MS").ok().and_then(|v| v.parse().ok()) { cfg.duration_ms = v; }
        if let Some(v) = env::var("MCURL_COOLDOWN_MS").ok().and_then(|v| v.parse().ok()) { cfg.cooldown_ms = v; }
        if let Some(v) = env::var("MCURL_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) { cfg.timeout_ms = Some(v); }
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| McurlError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }
}

/// Raw, unvalidated run options as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub method: String,
    pub url: String,
    pub requests: Option<usize>,
    pub repeat: Option<u32>,
    pub data: String,
    pub file: Option<PathBuf>,
    pub headers: Vec<String>,
    pub verbose: bool,
    pub duration_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl Options {
    /// Validates the options and turns them into the immutable [`Config`]
    /// every request of the run is built from.
    pub fn resolve(self, defaults: &Defaults) -> Result<Config> {
        if self.method.is_empty() {
            return Err(McurlError::MissingMethod);
        }
        if self.url.is_empty() {
            return Err(McurlError::MissingUrl);
        }

        let concurrency = self.requests.unwrap_or(defaults.requests);
        if concurrency == 0 {
            return Err(McurlError::InvalidConcurrency);
        }

        let body = match &self.file {
            Some(path) => std::fs::read(path).map_err(|source| McurlError::ReadBody {
                path: path.clone(),
                source,
            })?,
            None => self.data.into_bytes(),
        };

        // defaults first so explicit flags override them
        let headers = parse_headers(defaults.headers.iter().chain(self.headers.iter()))?;

        Ok(Config {
            method: self.method,
            url: self.url,
            body,
            headers,
            concurrency,
            repeat: self.repeat.unwrap_or(defaults.repeat),
            max_duration_ms: self.duration_ms.unwrap_or(defaults.duration_ms),
            verbose: self.verbose,
            cooldown: Duration::from_millis(self.cooldown_ms.unwrap_or(defaults.cooldown_ms)),
            request_timeout: self.timeout_ms.or(defaults.timeout_ms).map(Duration::from_millis),
        })
    }
}

/// Splits a `Name: Value` line at its first colon.
pub fn parse_header(line: &str) -> Result<(String, String)> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(McurlError::InvalidHeader(line.to_string()));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(McurlError::InvalidHeader(line.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub fn parse_headers<'a, I>(lines: I) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut headers = BTreeMap::new();
    for line in lines {
        let (name, value) = parse_header(line)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Fully resolved settings of one run. Shared read-only by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    /// Requests launched together in every batch.
    pub concurrency: usize,
    /// Number of batches; 0 repeats until stopped.
    pub repeat: u32,
    /// Cap on the whole run, checked between batches; 0 means none.
    pub max_duration_ms: u64,
    pub verbose: bool,
    /// Pause between two batches.
    pub cooldown: Duration,
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn new(method: impl Into<String>, url: impl Into<String>, concurrency: usize) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body: Vec::new(),
            headers: BTreeMap::new(),
            concurrency,
            repeat: 1,
            max_duration_ms: 0,
            verbose: false,
            cooldown: Duration::from_secs(1),
            request_timeout: None,
        }
    }

    pub fn repeat_limit(&self) -> Option<u32> {
        (self.repeat > 0).then_some(self.repeat)
    }

    /// The run stops before a new batch once elapsed time exceeds this; a
    /// batch starting exactly at the cap still runs.
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_ms > 0).then(|| Duration::from_millis(self.max_duration_ms))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = if self.body.len() > DATA_PREVIEW_LEN {
            format!("{} [...]", String::from_utf8_lossy(&self.body[..DATA_PREVIEW_LEN]))
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        };
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        writeln!(f, "Running options =")?;
        writeln!(f, "method        : {}", self.method)?;
        writeln!(f, "url           : {}", self.url)?;
        writeln!(f, "requests      : {}", self.concurrency)?;
        writeln!(f, "repeat        : {}", self.repeat)?;
        writeln!(f, "duration (ms) : {}", self.max_duration_ms)?;
        writeln!(f, "cooldown      : {:?}", self.cooldown)?;
        writeln!(f, "data          : {data}")?;
        write!(f, "headers       : {}", headers.join(", "))
    }
}
