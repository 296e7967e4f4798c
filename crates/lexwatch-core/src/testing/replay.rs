use crate::config::{ConfigError, ConsoleConfig};
use crate::decoder::{Inbound, decode};
use crate::workflow_state::{WorkflowSnapshot, WorkflowState};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What to replay and with which console settings.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub fixture_path: PathBuf,
    pub console: ConsoleConfig,
}

impl ReplayConfig {
    pub fn new(fixture_path: impl Into<PathBuf>) -> Self {
        Self {
            fixture_path: fixture_path.into(),
            console: ConsoleConfig::default(),
        }
    }

    #[must_use]
    pub fn with_console(mut self, console: ConsoleConfig) -> Self {
        self.console = console;
        self
    }
}

/// A fixture line that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number in the fixture.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ReplayResult {
    snapshot: WorkflowSnapshot,
    frames_read: usize,
    events_applied: usize,
    control_frames: usize,
    malformed: Vec<MalformedLine>,
}

impl ReplayResult {
    pub fn snapshot(&self) -> &WorkflowSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> WorkflowSnapshot {
        self.snapshot
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Events the reducers accepted, including redeliveries.
    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    pub fn control_frames(&self) -> usize {
        self.control_frames
    }

    pub fn malformed(&self) -> &[MalformedLine] {
        &self.malformed
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Feeds recorded frames through the decoder and the reducers.
pub struct ReplayRunner;

impl ReplayRunner {
    pub fn run(config: &ReplayConfig) -> Result<ReplayResult, ReplayError> {
        let content =
            fs::read_to_string(&config.fixture_path).map_err(|source| ReplayError::Io {
                path: config.fixture_path.clone(),
                source,
            })?;
        debug!(fixture = %config.fixture_path.display(), "replaying fixture");
        Ok(Self::run_str(&content, &config.console)?)
    }

    /// Replays JSONL text. Blank lines and `#` comments are skipped.
    pub fn run_str(content: &str, console: &ConsoleConfig) -> Result<ReplayResult, ConfigError> {
        let mut state = WorkflowState::new(console)?;
        let mut frames_read = 0;
        let mut control_frames = 0;
        let mut malformed = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            frames_read += 1;
            match decode(line) {
                Ok(frame) => {
                    let at = frame.timestamp.unwrap_or_else(Utc::now);
                    match frame.inbound {
                        Inbound::Event(event) => {
                            state.apply(&event, at);
                        }
                        Inbound::Control(_) => control_frames += 1,
                    }
                }
                Err(err) => {
                    warn!(line = index + 1, error = %err, "skipping malformed fixture line");
                    malformed.push(MalformedLine {
                        line: index + 1,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(ReplayResult {
            snapshot: state.snapshot(),
            frames_read,
            events_applied: state.events_applied(),
            control_frames,
            malformed,
        })
    }
}

/// Lists `.jsonl` fixtures in a directory, sorted by name.
pub fn list_fixtures(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut fixtures: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    fixtures.sort();
    Ok(fixtures)
}
