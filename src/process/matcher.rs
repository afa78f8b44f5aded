//! Command-line matching against a process snapshot

use super::table::{ProcessRecord, ProcessSnapshot};
use crate::error::{Result, SupervisorError};
use regex::Regex;

/// A rule over the full command line of a process
#[derive(Debug, Clone)]
pub enum MatchRule {
    Substring(String),
    Regex(Regex),
}

impl MatchRule {
    pub fn substring(text: impl Into<String>) -> Self {
        MatchRule::Substring(text.into())
    }

    pub fn regex(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Regex::new(pattern).map(MatchRule::Regex)
    }

    pub fn matches(&self, command_line: &str) -> bool {
        match self {
            MatchRule::Substring(text) => command_line.contains(text.as_str()),
            MatchRule::Regex(re) => re.is_match(command_line),
        }
    }

    /// The rule as written, for logs and reports
    pub fn as_str(&self) -> &str {
        match self {
            MatchRule::Substring(text) => text,
            MatchRule::Regex(re) => re.as_str(),
        }
    }
}

/// A named group of processes escalated together
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub rule: MatchRule,
}

impl Category {
    pub fn new(name: impl Into<String>, rule: MatchRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }
}

/// Ordered categories, processed in declaration order
#[derive(Debug, Clone)]
pub struct PatternSet {
    categories: Vec<Category>,
}

impl PatternSet {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Compile a pattern for `category`, as either a regex or a literal substring
    pub fn compile_rule(category: &str, pattern: &str, literal: bool) -> Result<MatchRule> {
        if pattern.is_empty() {
            return Err(SupervisorError::InvalidPattern {
                category: category.to_string(),
                reason: "empty pattern would match every process".to_string(),
            });
        }
        if literal {
            return Ok(MatchRule::substring(pattern));
        }
        MatchRule::regex(pattern).map_err(|e| SupervisorError::InvalidPattern {
            category: category.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        let rule = |p: &str| MatchRule::Regex(Regex::new(p).expect("built-in pattern compiles"));
        Self::new(vec![
            Category::new("worker", rule(r"(pytest|xdist).*worker|worker.*pytest")),
            Category::new("runner", rule(r"python[0-9.]*\s+-m\s+pytest")),
            Category::new("generic", MatchRule::substring("pytest")),
        ])
    }
}

/// Every record in `snapshot` whose command line satisfies `rule`, in pid order
pub fn discover(snapshot: &ProcessSnapshot, rule: &MatchRule) -> Vec<ProcessRecord> {
    snapshot
        .records()
        .iter()
        .filter(|r| rule.matches(&r.command_line))
        .cloned()
        .collect()
}
