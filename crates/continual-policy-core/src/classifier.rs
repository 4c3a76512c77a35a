//! Task classifier
//!
//! Maps a free-text query to a [`Route`] by evaluating an ordered list of
//! keyword rules. The first rule with a keyword contained in the normalized
//! query wins; order is significant and must not be changed into a set.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::contracts::{GO_MODE_CODE, GO_MODE_RESPONSE};

/// Kind of task a query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Build,
    Decision,
    Research,
    Analysis,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Build => "build",
            TaskType::Decision => "decision",
            TaskType::Research => "research",
            TaskType::Analysis => "analysis",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(TaskType::Build),
            "decision" => Ok(TaskType::Decision),
            "research" => Ok(TaskType::Research),
            "analysis" => Ok(TaskType::Analysis),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Classifier decision for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub task_type: TaskType,
    pub contract_id: String,
}

impl Route {
    pub fn new(task_type: TaskType, contract_id: impl Into<String>) -> Self {
        Self {
            task_type,
            contract_id: contract_id.into(),
        }
    }

    /// Route used when no keyword rule matches
    pub fn default_route() -> Self {
        Self::new(TaskType::Analysis, GO_MODE_RESPONSE)
    }
}

/// One entry of the priority list
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub task_type: TaskType,
    pub contract_id: &'static str,
    pub keywords: &'static [&'static str],
}

impl KeywordRule {
    fn matches(&self, normalized: &str) -> bool {
        self.keywords.iter().any(|k| normalized.contains(k))
    }

    fn route(&self) -> Route {
        Route::new(self.task_type, self.contract_id)
    }
}

/// Keyword rules in priority order
pub static RULES: &[KeywordRule] = &[
    KeywordRule {
        task_type: TaskType::Build,
        contract_id: GO_MODE_CODE,
        keywords: &[
            "build",
            "implement",
            "full",
            "nitty-gritty",
            "every file",
            "repo",
            "wire",
            "module",
            "server",
            "mcp",
        ],
    },
    KeywordRule {
        task_type: TaskType::Decision,
        contract_id: GO_MODE_RESPONSE,
        keywords: &[
            "compare", "vs", "pros", "cons", "tradeoff", "which", "better", "should i",
        ],
    },
    KeywordRule {
        task_type: TaskType::Research,
        contract_id: GO_MODE_RESPONSE,
        keywords: &[
            "cite", "sources", "evidence", "paper", "study", "latest", "news",
        ],
    },
];

/// Lowercase, trim and collapse whitespace runs
pub fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classify a query
pub fn classify(query: &str) -> Route {
    let normalized = normalize(query);

    RULES
        .iter()
        .find(|rule| rule.matches(&normalized))
        .map(KeywordRule::route)
        .unwrap_or_else(Route::default_route)
}
