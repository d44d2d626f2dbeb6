//! Test helper utilities for resilience-engine tests
//!
//! This module provides reusable test fixtures and helper functions
//! that are shared across multiple test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use crate::config::RecoveryConfig;
use crate::core_types::{
    CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorPriority, ErrorSeverity,
    RecoveryAction, RecoveryData, RecoveryPlan, RecoveryStrategy,
};
use crate::executor::{FnOperation, RecoveryOperation};
use crate::service::RecoveryService;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Categorizer returning a fixed classification and counting its calls
pub struct StaticCategorizer {
    categorized: Option<CategorizedError>,
    calls: AtomicU32,
}

impl StaticCategorizer {
    pub fn new(category: ErrorCategory, severity: ErrorSeverity) -> Self {
        Self {
            categorized: Some(CategorizedError::new(
                category,
                severity,
                ErrorPriority::Medium,
            )),
            calls: AtomicU32::new(0),
        }
    }

    /// Categorizer that can never classify anything
    pub fn returning_none() -> Self {
        Self {
            categorized: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ErrorCategorizer for StaticCategorizer {
    async fn categorize_error(
        &self,
        _error: &(dyn std::error::Error + Send + Sync),
        _context: &ErrorContext,
    ) -> Option<CategorizedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.categorized.clone()
    }
}

/// Plain error carrying a message
#[derive(Debug)]
pub struct TestError(pub String);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TestError {}

pub fn test_error(message: &str) -> TestError {
    TestError(message.to_string())
}

pub fn context(pairs: &[(&str, &str)]) -> ErrorContext {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::from(*value)))
        .collect()
}

pub fn always_succeed() -> Arc<dyn RecoveryOperation> {
    Arc::new(FnOperation::new(|_action: &RecoveryAction| {
        Ok(RecoveryData::new())
    }))
}

pub fn always_fail() -> Arc<dyn RecoveryOperation> {
    Arc::new(FnOperation::new(|action: &RecoveryAction| {
        Err(anyhow::anyhow!("{} operation failed", action.strategy))
    }))
}

/// Operation that only succeeds for the listed strategies
pub fn succeed_only_for(strategies: Vec<RecoveryStrategy>) -> Arc<dyn RecoveryOperation> {
    Arc::new(FnOperation::new(move |action: &RecoveryAction| {
        if strategies.contains(&action.strategy) {
            Ok(RecoveryData::new())
        } else {
            Err(anyhow::anyhow!("{} operation failed", action.strategy))
        }
    }))
}

mock! {
    pub Operation {}

    #[async_trait]
    impl RecoveryOperation for Operation {
        async fn perform(&self, action: &RecoveryAction) -> anyhow::Result<RecoveryData>;
    }
}

/// Action with short timings suitable for tests
pub fn test_action(strategy: RecoveryStrategy) -> RecoveryAction {
    let action = RecoveryAction::new(strategy, format!("test {strategy}"), Duration::from_secs(1))
        .with_parameter("operation", "test_operation");
    match strategy {
        RecoveryStrategy::Retry => action.with_retries(3, Duration::from_millis(10)),
        _ => action,
    }
}

/// Plan running the given strategies in order
pub fn plan_with(strategies: &[RecoveryStrategy]) -> RecoveryPlan {
    let actions: Vec<RecoveryAction> = strategies.iter().copied().map(test_action).collect();
    let now = Utc::now();
    RecoveryPlan {
        id: uuid::Uuid::new_v4().to_string(),
        error_id: uuid::Uuid::new_v4().to_string(),
        error_message: "test failure".to_string(),
        category: ErrorCategory::Network,
        severity: ErrorSeverity::Medium,
        priority: 3,
        estimated_time: crate::planner::calculate_estimated_time(&actions),
        actions,
        success_probability: 0.5,
        created_at: now,
        updated_at: now,
        metadata: RecoveryData::new(),
    }
}

/// Service configuration with fast timings
pub fn fast_config() -> RecoveryConfig {
    RecoveryConfig {
        default_timeout: Duration::from_secs(1),
        ..RecoveryConfig::default()
    }
}

pub fn test_service(
    category: ErrorCategory,
    severity: ErrorSeverity,
    operation: Arc<dyn RecoveryOperation>,
) -> RecoveryService {
    RecoveryService::new(fast_config(), Arc::new(StaticCategorizer::new(category, severity)))
        .expect("fast test config should be valid")
        .with_operation(operation)
}
