//! Error classification types consumed by the recovery engine.
//!
//! The engine never classifies errors itself. An [`ErrorCategorizer`] supplied by the
//! integrator maps an arbitrary error plus its context to a [`CategorizedError`], and
//! everything downstream (planning, auto-recovery gating, statistics) keys off that
//! classification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Free-form context attached to an error when it is reported for recovery.
///
/// Typical keys are `source`, `operation` or `request_id`. Values are arbitrary JSON.
pub type ErrorContext = HashMap<String, serde_json::Value>;

/// Broad category an error falls into. Drives the strategy table used by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Database,
    Validation,
    Security,
    Performance,
    Authentication,
    Authorization,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        Self::Network,
        Self::Database,
        Self::Validation,
        Self::Security,
        Self::Performance,
        Self::Authentication,
        Self::Authorization,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Database => "database",
            Self::Validation => "validation",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to [`ErrorCategory::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(Self::Unknown);
        Ok(category)
    }
}

/// Severity of a categorized error.
///
/// Totally ordered: `Info < Low < Medium < High < Critical`. Severity names that are not
/// recognised deserialize to [`ErrorSeverity::Medium`], so they compare as Medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a severity name, falling back to Medium for anything unrecognised.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ErrorSeverity {
    fn from(value: String) -> Self {
        Self::parse_lossy(&value)
    }
}

impl From<ErrorSeverity> for String {
    fn from(value: ErrorSeverity) -> Self {
        value.as_str().to_string()
    }
}

/// Handling priority of a categorized error. Maps onto the integers 1 (urgent) to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorPriority {
    Urgent,
    High,
    Medium,
    Low,
    Deferred,
}

impl ErrorPriority {
    pub fn as_int(&self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
            Self::Deferred => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Deferred => "deferred",
        }
    }

    /// Parse a priority name, falling back to Medium (3) for anything unrecognised.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Self::Urgent,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "deferred" => Self::Deferred,
            _ => Self::Medium,
        }
    }
}

impl fmt::Display for ErrorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ErrorPriority {
    fn from(value: String) -> Self {
        Self::parse_lossy(&value)
    }
}

impl From<ErrorPriority> for String {
    fn from(value: ErrorPriority) -> Self {
        value.as_str().to_string()
    }
}

/// Classification produced by an [`ErrorCategorizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedError {
    /// Identifier of the categorized error occurrence
    pub id: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub priority: ErrorPriority,
}

impl CategorizedError {
    /// Create a classification with a fresh identifier.
    pub fn new(category: ErrorCategory, severity: ErrorSeverity, priority: ErrorPriority) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            priority,
        }
    }
}

/// Maps an error and its context to a [`CategorizedError`].
///
/// Returning `None` means the error could not be classified; callers treat that as a
/// hard failure and never build a plan from it.
#[async_trait]
pub trait ErrorCategorizer: Send + Sync {
    async fn categorize_error(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        context: &ErrorContext,
    ) -> Option<CategorizedError>;
}
