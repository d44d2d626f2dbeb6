//! Test helper utilities for resilience-engine integration tests
//!
//! This module provides reusable test fixtures and helper functions
//! that are shared across multiple test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use async_trait::async_trait;
use resilience_engine::{
    CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorPriority, ErrorSeverity,
    FnOperation, RecoveryAction, RecoveryConfig, RecoveryData, RecoveryOperation,
    RecoveryService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Keyword categorizer, roughly what an application would plug in
///
/// Severity comes from the `severity` context key when present.
pub struct KeywordCategorizer;

#[async_trait]
impl ErrorCategorizer for KeywordCategorizer {
    async fn categorize_error(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        context: &ErrorContext,
    ) -> Option<CategorizedError> {
        let message = error.to_string().to_lowercase();
        let category = if message.contains("timeout") || message.contains("connection") {
            ErrorCategory::Network
        } else if message.contains("sql") || message.contains("deadlock") {
            ErrorCategory::Database
        } else if message.contains("slow") {
            ErrorCategory::Performance
        } else if message.contains("breach") {
            ErrorCategory::Security
        } else if message.is_empty() {
            return None;
        } else {
            ErrorCategory::Unknown
        };

        let severity = context
            .get("severity")
            .and_then(serde_json::Value::as_str)
            .map(ErrorSeverity::parse_lossy)
            .unwrap_or(ErrorSeverity::Medium);

        Some(CategorizedError::new(category, severity, ErrorPriority::High))
    }
}

/// Error with a fixed message
#[derive(Debug)]
pub struct AppError(pub &'static str);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for AppError {}

pub fn ctx(pairs: &[(&str, &str)]) -> ErrorContext {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::from(*value)))
        .collect()
}

/// Operation that succeeds and counts how often it ran
pub fn counting_operation(counter: Arc<AtomicUsize>) -> Arc<dyn RecoveryOperation> {
    Arc::new(FnOperation::new(move |_action: &RecoveryAction| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(RecoveryData::new())
    }))
}

/// Operation that always fails
pub fn failing_operation() -> Arc<dyn RecoveryOperation> {
    Arc::new(FnOperation::new(|action: &RecoveryAction| {
        Err(anyhow::anyhow!("{} did not help", action.strategy))
    }))
}

pub fn test_config() -> RecoveryConfig {
    RecoveryConfig {
        default_timeout: Duration::from_millis(500),
        ..RecoveryConfig::default()
    }
}

/// Service with the keyword categorizer and fast timings
pub fn create_test_service(operation: Arc<dyn RecoveryOperation>) -> RecoveryService {
    RecoveryService::new(test_config(), Arc::new(KeywordCategorizer))
        .expect("test config should be valid")
        .with_operation(operation)
}
