use crate::error::{Result, SupervisorError};
use crate::process::{Category, EscalationPolicy, MatchRule, PatternSet};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// On-disk configuration, `test-reaper.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pause between the graceful and the forceful signal
    pub grace_window_ms: u64,
    pub grace_signal: String,
    pub kill_signal: String,
    /// Replaces the built-in categories when present
    #[serde(rename = "category")]
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub kind: PatternKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Regex,
    Substring,
}

/// Validated configuration, ready for a supervisor
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub patterns: PatternSet,
    pub policy: EscalationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let policy = EscalationPolicy::default();
        let categories = PatternSet::default()
            .categories()
            .iter()
            .map(|c| CategoryConfig {
                name: c.name.clone(),
                pattern: c.rule.as_str().to_string(),
                kind: match c.rule {
                    MatchRule::Substring(_) => PatternKind::Substring,
                    MatchRule::Regex(_) => PatternKind::Regex,
                },
            })
            .collect();

        Self {
            grace_window_ms: policy.grace_window.as_millis() as u64,
            grace_signal: policy.grace_signal.as_str().to_string(),
            kill_signal: policy.kill_signal.as_str().to_string(),
            categories,
        }
    }
}

impl Config {
    /// Load the first readable config, falling back to the built-in defaults.
    ///
    /// An explicit path wins over the search locations. Broken files are
    /// logged and skipped rather than aborting the run.
    pub fn load(explicit: Option<&Path>) -> Self {
        let paths: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => Self::search_paths(),
        };

        for path in paths {
            if !path.exists() {
                if explicit.is_some() {
                    warn!(path = %path.display(), "config file not found, using defaults");
                }
                continue;
            }
            match Self::from_path(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring config file");
                }
            }
        }

        Config::default()
    }

    fn search_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("test-reaper/config.toml")),
            dirs::home_dir().map(|p| p.join(".test-reaper.toml")),
            Some(PathBuf::from("test-reaper.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SupervisorError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SupervisorError::Config(e.to_string()))
    }

    /// Compile patterns and resolve signal names
    pub fn settings(&self) -> Result<Settings> {
        let categories = self
            .categories
            .iter()
            .map(|c| {
                let literal = c.kind == PatternKind::Substring;
                PatternSet::compile_rule(&c.name, &c.pattern, literal)
                    .map(|rule| Category::new(c.name.clone(), rule))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Settings {
            patterns: PatternSet::new(categories),
            policy: EscalationPolicy {
                grace_signal: parse_signal(&self.grace_signal)?,
                grace_window: Duration::from_millis(self.grace_window_ms),
                kill_signal: parse_signal(&self.kill_signal)?,
            },
        })
    }
}

/// Accepts `SIGTERM`, `TERM` or `term`
pub fn parse_signal(name: &str) -> Result<Signal> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).map_err(|_| SupervisorError::InvalidSignal(name.to_string()))
}
