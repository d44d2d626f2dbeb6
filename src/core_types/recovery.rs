//! Recovery plan, execution and statistics types.

use crate::core_types::errors::{ErrorCategory, ErrorSeverity};
use crate::error::ResilienceError;
use crate::logging::log_warn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Arbitrary key/value data carried by actions, results and executions.
pub type RecoveryData = HashMap<String, serde_json::Value>;

/// Remediation strategy an action applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Fallback,
    CircuitBreaker,
    ManualIntervention,
    GracefulDegradation,
    Rollback,
    Compensation,
    Timeout,
    ResourceCleanup,
    DataRecovery,
}

impl RecoveryStrategy {
    pub const ALL: [RecoveryStrategy; 10] = [
        Self::Retry,
        Self::Fallback,
        Self::CircuitBreaker,
        Self::ManualIntervention,
        Self::GracefulDegradation,
        Self::Rollback,
        Self::Compensation,
        Self::Timeout,
        Self::ResourceCleanup,
        Self::DataRecovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Fallback => "fallback",
            Self::CircuitBreaker => "circuit_breaker",
            Self::ManualIntervention => "manual_intervention",
            Self::GracefulDegradation => "graceful_degradation",
            Self::Rollback => "rollback",
            Self::Compensation => "compensation",
            Self::Timeout => "timeout",
            Self::ResourceCleanup => "resource_cleanup",
            Self::DataRecovery => "data_recovery",
        }
    }

    /// A successful action of a terminal strategy ends the plan as Completed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ManualIntervention
                | Self::GracefulDegradation
                | Self::Rollback
                | Self::Compensation
        )
    }

    /// A failed action of a critical strategy ends the plan as Failed.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::ManualIntervention | Self::ResourceCleanup)
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryStrategy {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ResilienceError::unknown_strategy(s))
    }
}

/// One remediation step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: String,
    pub strategy: RecoveryStrategy,
    pub description: String,
    pub parameters: RecoveryData,
    /// Lower is more urgent. Informational only, never used to reorder a plan.
    pub priority: u8,
    /// Upper bound for a single run of this action's handler
    pub timeout: Duration,
    pub max_retries: u32,
    /// Initial delay between retries for strategies that retry
    pub backoff: Duration,
}

impl RecoveryAction {
    /// Create an action with a fresh identifier and no parameters.
    pub fn new(
        strategy: RecoveryStrategy,
        description: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy,
            description: description.into(),
            parameters: RecoveryData::new(),
            priority: 1,
            timeout,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Read a numeric parameter, if present.
    pub fn parameter_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Read a string parameter, if present.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Ordered remediation actions derived from a categorized error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub id: String,
    pub error_id: String,
    pub error_message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    /// Integer form of the error priority (1 = urgent, 5 = deferred)
    pub priority: u8,
    pub actions: Vec<RecoveryAction>,
    /// Sequential worst case: the sum of every action's timeout
    pub estimated_time: Duration,
    /// Always within [0, 1]
    pub success_probability: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: RecoveryData,
}

/// Outcome of running one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub action_id: String,
    pub strategy: RecoveryStrategy,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
    pub attempts: u32,
    pub metadata: RecoveryData,
    pub recovery_data: RecoveryData,
    pub timestamp: DateTime<Utc>,
}

impl RecoveryResult {
    /// A successful outcome for `action`.
    pub fn succeeded(action: &RecoveryAction, attempts: u32, duration: Duration) -> Self {
        Self {
            action_id: action.id.clone(),
            strategy: action.strategy,
            success: true,
            error: None,
            duration,
            attempts,
            metadata: RecoveryData::new(),
            recovery_data: RecoveryData::new(),
            timestamp: Utc::now(),
        }
    }

    /// A failed outcome for `action` carrying `error` as its message.
    pub fn failed(
        action: &RecoveryAction,
        attempts: u32,
        duration: Duration,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            action_id: action.id.clone(),
            strategy: action.strategy,
            success: false,
            error: Some(error.to_string()),
            duration,
            attempts,
            metadata: RecoveryData::new(),
            recovery_data: RecoveryData::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_recovery_data(mut self, data: RecoveryData) -> Self {
        self.recovery_data = data;
        self
    }
}

/// Lifecycle state of a plan execution.
///
/// ```text
/// Pending -> Running -> Completed | Failed | Cancelled | Timeout
/// Pending -> Cancelled
/// ```
///
/// `Timeout` is part of the model but the executor currently has no path that
/// produces it; per-action timeouts surface as failed results instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Whether moving to `next` keeps the lifecycle moving forward.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Record of one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryExecution {
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub results: Vec<RecoveryResult>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Duration,
    /// Plan-level failure, if the execution did not complete
    pub error: Option<ResilienceError>,
    pub metadata: RecoveryData,
}

impl RecoveryExecution {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            status: ExecutionStatus::Pending,
            results: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            duration: Duration::ZERO,
            error: None,
            metadata: RecoveryData::new(),
        }
    }

    /// Move to `next` if the transition is forward, otherwise keep the current status.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), ResilienceError> {
        if !self.status.can_transition_to(next) {
            return Err(ResilienceError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// Move to `status` and record the plan-level error, if any.
    ///
    /// Refused transitions leave the execution untouched apart from a warning.
    pub(crate) fn advance(&mut self, status: ExecutionStatus, error: Option<ResilienceError>) {
        if let Err(refused) = self.transition(status) {
            log_warn!(
                plan_id = %self.plan_id,
                error = %refused,
                "Ignoring execution status change"
            );
            return;
        }
        self.error = error;
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn successful_results(&self) -> impl Iterator<Item = &RecoveryResult> {
        self.results.iter().filter(|r| r.success)
    }
}

/// Counters for one strategy across all executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub average_duration: Duration,
}

impl StrategyStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }
}

/// Counters for one error category across all executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_duration: Duration,
    pub average_duration: Duration,
}

/// Aggregate recovery statistics. Counters only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub total_recoveries: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub total_recovery_time: Duration,
    pub average_recovery_time: Duration,
    pub strategy_stats: HashMap<RecoveryStrategy, StrategyStats>,
    pub category_stats: HashMap<ErrorCategory, CategoryStats>,
    pub last_updated: DateTime<Utc>,
}

impl Default for RecoveryStats {
    fn default() -> Self {
        Self {
            total_recoveries: 0,
            successful_recoveries: 0,
            failed_recoveries: 0,
            total_recovery_time: Duration::ZERO,
            average_recovery_time: Duration::ZERO,
            strategy_stats: HashMap::new(),
            category_stats: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl RecoveryStats {
    /// Fold one finished execution into the aggregate.
    ///
    /// Only `Completed` counts as a success; every other final status is a failure.
    pub fn record(&mut self, category: ErrorCategory, execution: &RecoveryExecution) {
        let succeeded = execution.is_success();

        self.total_recoveries += 1;
        self.total_recovery_time += execution.duration;
        if succeeded {
            self.successful_recoveries += 1;
        } else {
            self.failed_recoveries += 1;
        }
        self.average_recovery_time = mean(self.total_recovery_time, self.total_recoveries);

        for result in &execution.results {
            let entry = self.strategy_stats.entry(result.strategy).or_default();
            entry.attempts += 1;
            if result.success {
                entry.successes += 1;
            } else {
                entry.failures += 1;
            }
            entry.total_duration += result.duration;
            entry.average_duration = mean(entry.total_duration, entry.attempts);
        }

        let entry = self.category_stats.entry(category).or_default();
        entry.total += 1;
        if succeeded {
            entry.successful += 1;
        } else {
            entry.failed += 1;
        }
        entry.total_duration += execution.duration;
        entry.average_duration = mean(entry.total_duration, entry.total);

        self.last_updated = Utc::now();
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_recoveries == 0 {
            return 0.0;
        }
        self.successful_recoveries as f64 / self.total_recoveries as f64
    }
}

fn mean(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}
