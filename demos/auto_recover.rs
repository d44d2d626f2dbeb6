//! Auto-recovery example demonstrating the full categorize → plan → execute flow.
//!
//! This example shows how to:
//! - Plug an application-specific categorizer into the recovery service
//! - Drive recovery actions with a real operation instead of the simulated one
//! - Read execution results, statistics and history afterwards
//! - Use the standalone retry mechanism for a flaky call
//!
//! # Running
//!
//! ```bash
//! cargo run --example auto_recover
//! ```
//!
//! # Severity Gating
//!
//! | Severity | Default behaviour |
//! |----------|-------------------|
//! | Info, Low, Medium | Recovered automatically |
//! | High, Critical | Refused, an operator has to act |

use async_trait::async_trait;
use resilience_engine::{
    CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorPriority, ErrorSeverity,
    FnOperation, RecoveryAction, RecoveryConfig, RecoveryData, RecoveryService, ResilienceError,
    RetryConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Maps error messages onto categories the way a web backend might
struct BackendCategorizer;

#[async_trait]
impl ErrorCategorizer for BackendCategorizer {
    async fn categorize_error(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        _context: &ErrorContext,
    ) -> Option<CategorizedError> {
        let message = error.to_string().to_lowercase();
        let (category, severity) = if message.contains("connection") {
            (ErrorCategory::Network, ErrorSeverity::Medium)
        } else if message.contains("deadlock") {
            (ErrorCategory::Database, ErrorSeverity::Low)
        } else if message.contains("tampered") {
            (ErrorCategory::Security, ErrorSeverity::Critical)
        } else {
            (ErrorCategory::Unknown, ErrorSeverity::Low)
        };
        Some(CategorizedError::new(category, severity, ErrorPriority::Medium))
    }
}

fn context(operation: &str) -> ErrorContext {
    let mut context = ErrorContext::new();
    context.insert("operation".to_string(), operation.into());
    context
}

/// Runs a few errors through the service and prints what happened
async fn demonstrate_auto_recovery(service: &RecoveryService) {
    println!("=== Auto Recovery ===\n");

    let errors = [
        ("connection reset by peer", "payments_api"),
        ("deadlock detected on orders", "orders_db"),
        ("session token tampered", "auth"),
    ];

    for (message, operation) in errors {
        let error = std::io::Error::other(message);
        match service
            .auto_recover(&error, &context(operation), &CancellationToken::new())
            .await
        {
            Ok(execution) => {
                println!("{message}:");
                println!("  Status: {:?}", execution.status);
                for result in &execution.results {
                    println!(
                        "  {:<20} success={} attempts={}",
                        result.strategy.to_string(),
                        result.success,
                        result.attempts
                    );
                }
            }
            Err(error @ ResilienceError::ManualInterventionRequired { .. }) => {
                println!("{message}:");
                println!("  Refused: {error}");
            }
            Err(error) => println!("{message}: unexpected error: {error}"),
        }
        println!();
    }
}

/// Prints the running statistics and the most recent executions
fn print_statistics(service: &RecoveryService) {
    println!("=== Statistics ===\n");

    let stats = service.recovery_stats();
    println!("Total recoveries: {}", stats.total_recoveries);
    println!("Successful:       {}", stats.successful_recoveries);
    println!("Failed:           {}", stats.failed_recoveries);
    println!("Success rate:     {:.0}%", stats.success_rate() * 100.0);

    for execution in service.recovery_history(5) {
        println!("  plan {} -> {:?}", execution.plan_id, execution.status);
    }
    println!();
}

/// Retries a call that fails twice before succeeding
async fn demonstrate_retry_mechanism(service: &RecoveryService) {
    println!("=== Retry Mechanism ===\n");

    let mechanism = service.retry_mechanism(RetryConfig {
        base_delay: Duration::from_millis(50),
        ..RetryConfig::default()
    });
    let calls = Arc::new(AtomicUsize::new(0));

    let outcome = mechanism
        .retry(&CancellationToken::new(), "inventory", || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("503 service unavailable")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

    println!("Result after {} calls: {:?}", calls.load(Ordering::SeqCst), outcome);
    println!("Retry stats: {:?}\n", mechanism.stats());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let performed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&performed);
    let operation = Arc::new(FnOperation::new(move |action: &RecoveryAction| {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut data = RecoveryData::new();
        data.insert("handled_by".to_string(), action.strategy.to_string().into());
        Ok(data)
    }));

    let service = RecoveryService::new(
        RecoveryConfig {
            default_timeout: Duration::from_secs(2),
            ..RecoveryConfig::default()
        },
        Arc::new(BackendCategorizer),
    )?
    .with_operation(operation);

    // Section 1: Severity-gated recovery
    demonstrate_auto_recovery(&service).await;

    // Section 2: What the service remembers
    print_statistics(&service);

    // Section 3: Retry with circuit breaking outside of plans
    demonstrate_retry_mechanism(&service).await;

    println!(
        "Recovery operation ran {} times",
        performed.load(Ordering::SeqCst)
    );
    Ok(())
}
