//! Side-effecting operations behind recovery actions.
//!
//! Strategy handlers decide *how* an action is applied (how often, under which
//! guard, what a success means for the plan). The [`RecoveryOperation`] decides
//! *what* actually happens. Integrators implement it to reconnect pools, switch
//! endpoints, roll back transactions and so on.

use crate::core_types::{RecoveryAction, RecoveryData, RecoveryStrategy};
use crate::logging::log_trace;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Performs the real work of a recovery action.
///
/// An `Err` marks the attempt as failed; its message ends up on the action's
/// [`RecoveryResult`](crate::RecoveryResult). The returned data is attached to the
/// result as `recovery_data`.
#[async_trait]
pub trait RecoveryOperation: Send + Sync {
    async fn perform(&self, action: &RecoveryAction) -> anyhow::Result<RecoveryData>;
}

/// Simulated operation with a fixed target success rate per strategy.
///
/// Outcomes come from a seeded generator, so a given seed always produces the same
/// sequence of successes and failures. Used when no real operation is injected.
#[derive(Debug)]
pub struct SimulatedOperation {
    rng: Mutex<fastrand::Rng>,
    success_rates: HashMap<RecoveryStrategy, f64>,
}

impl Default for SimulatedOperation {
    fn default() -> Self {
        Self::with_seed(fastrand::u64(..))
    }
}

impl SimulatedOperation {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
            success_rates: RecoveryStrategy::ALL
                .into_iter()
                .map(|strategy| (strategy, Self::target_success_rate(strategy)))
                .collect(),
        }
    }

    /// Override the success rate of one strategy. Values are clamped to `[0, 1]`.
    pub fn with_success_rate(mut self, strategy: RecoveryStrategy, rate: f64) -> Self {
        self.success_rates.insert(strategy, rate.clamp(0.0, 1.0));
        self
    }

    /// Default success rate of the simulation for `strategy`
    pub fn target_success_rate(strategy: RecoveryStrategy) -> f64 {
        match strategy {
            RecoveryStrategy::Retry => 0.7,
            RecoveryStrategy::Fallback => 0.8,
            RecoveryStrategy::CircuitBreaker => 0.9,
            RecoveryStrategy::ManualIntervention => 0.0,
            RecoveryStrategy::GracefulDegradation => 0.85,
            RecoveryStrategy::Rollback => 0.75,
            RecoveryStrategy::Compensation => 0.7,
            RecoveryStrategy::Timeout => 0.8,
            RecoveryStrategy::ResourceCleanup => 0.95,
            RecoveryStrategy::DataRecovery => 0.6,
        }
    }
}

#[async_trait]
impl RecoveryOperation for SimulatedOperation {
    async fn perform(&self, action: &RecoveryAction) -> anyhow::Result<RecoveryData> {
        let rate = self
            .success_rates
            .get(&action.strategy)
            .copied()
            .unwrap_or(0.0);
        let roll = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .f64();

        log_trace!(
            action_id = %action.id,
            strategy = %action.strategy,
            roll = roll,
            success_rate = rate,
            "Simulated recovery operation"
        );

        if roll < rate {
            let mut data = RecoveryData::new();
            data.insert("simulated".to_string(), true.into());
            Ok(data)
        } else {
            anyhow::bail!("simulated {} failure", action.strategy)
        }
    }
}

/// Adapts a synchronous closure into a [`RecoveryOperation`].
///
/// ```rust
/// use resilience_engine::executor::FnOperation;
/// use resilience_engine::{RecoveryAction, RecoveryData};
///
/// let always_ok = FnOperation::new(|_action: &RecoveryAction| Ok(RecoveryData::new()));
/// # let _ = always_ok;
/// ```
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn(&RecoveryAction) -> anyhow::Result<RecoveryData> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnOperation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnOperation")
    }
}

#[async_trait]
impl<F> RecoveryOperation for FnOperation<F>
where
    F: Fn(&RecoveryAction) -> anyhow::Result<RecoveryData> + Send + Sync,
{
    async fn perform(&self, action: &RecoveryAction) -> anyhow::Result<RecoveryData> {
        (self.f)(action)
    }
}
