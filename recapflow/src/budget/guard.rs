//! The timeout budget guard.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::token::CancellationToken;
use crate::errors::BudgetExceeded;
use crate::utils::millis;

fn default_hard_ceiling_secs() -> u64 {
    360
}

fn default_safety_margin_secs() -> u64 {
    5
}

fn default_warn_threshold_secs() -> u64 {
    60
}

/// Execution budget limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// The runtime's hard execution limit.
    #[serde(default = "default_hard_ceiling_secs")]
    pub hard_ceiling_secs: u64,
    /// Buffer kept free before the hard limit.
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
    /// Remaining time below which checkpoints report `Warn`.
    #[serde(default = "default_warn_threshold_secs")]
    pub warn_threshold_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            hard_ceiling_secs: default_hard_ceiling_secs(),
            safety_margin_secs: default_safety_margin_secs(),
            warn_threshold_secs: default_warn_threshold_secs(),
        }
    }
}

impl BudgetConfig {
    /// Creates a config with the given ceiling and margin.
    #[must_use]
    pub fn new(hard_ceiling: Duration, safety_margin: Duration) -> Self {
        Self {
            hard_ceiling_secs: hard_ceiling.as_secs(),
            safety_margin_secs: safety_margin.as_secs(),
            ..Self::default()
        }
    }

    /// Sets the warn threshold.
    #[must_use]
    pub fn with_warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold_secs = threshold.as_secs();
        self
    }

    /// The hard ceiling.
    #[must_use]
    pub fn hard_ceiling(&self) -> Duration {
        Duration::from_secs(self.hard_ceiling_secs)
    }

    /// The safety margin.
    #[must_use]
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    /// The warn threshold.
    #[must_use]
    pub fn warn_threshold(&self) -> Duration {
        Duration::from_secs(self.warn_threshold_secs)
    }

    /// Hard ceiling minus safety margin.
    #[must_use]
    pub fn effective_deadline(&self) -> Duration {
        self.hard_ceiling().saturating_sub(self.safety_margin())
    }
}

/// Result of a budget checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCheck {
    /// Plenty of time left.
    Ok,
    /// Below the warn threshold. Logged, not fatal.
    Warn,
    /// Past the effective deadline.
    Exceeded,
}

impl fmt::Display for BudgetCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warn => write!(f, "warn"),
            Self::Exceeded => write!(f, "exceeded"),
        }
    }
}

/// Tracks elapsed time against the execution ceiling.
///
/// The guard never terminates anything itself. Once a checkpoint observes
/// the deadline (or an unaffordable cost) its cancellation token trips and
/// every later checkpoint reports `Exceeded`.
pub struct TimeoutBudgetGuard {
    config: BudgetConfig,
    clock: Arc<dyn Clock>,
    started: Instant,
    token: CancellationToken,
}

impl TimeoutBudgetGuard {
    /// Starts a guard on the system clock.
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Starts a guard on the given clock.
    #[must_use]
    pub fn with_clock(config: BudgetConfig, clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            config,
            clock,
            started,
            token: CancellationToken::new(),
        }
    }

    /// Returns the budget configuration.
    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Returns the clock the guard reads.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Time since the guard started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }

    /// Time left before the effective deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.config.effective_deadline().saturating_sub(self.elapsed())
    }

    /// Returns true once the budget has been declared exceeded.
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The label of the checkpoint that first observed the overrun.
    #[must_use]
    pub fn exceeded_at(&self) -> Option<String> {
        self.token.reason()
    }

    /// Checks the budget at a named point.
    pub fn checkpoint(&self, label: &str) -> BudgetCheck {
        if self.token.is_cancelled() {
            return BudgetCheck::Exceeded;
        }

        let remaining = self.remaining();
        if remaining.is_zero() {
            self.trip(label);
            return BudgetCheck::Exceeded;
        }

        if remaining <= self.config.warn_threshold() {
            warn!(
                checkpoint = label,
                remaining_ms = millis(remaining),
                elapsed_ms = millis(self.elapsed()),
                "Execution budget running low"
            );
            return BudgetCheck::Warn;
        }

        debug!(checkpoint = label, remaining_ms = millis(remaining), "Budget ok");
        BudgetCheck::Ok
    }

    /// Like [`checkpoint`](Self::checkpoint) but returns the typed
    /// cancellation condition on `Exceeded`.
    pub fn ensure(&self, label: &str) -> Result<BudgetCheck, BudgetExceeded> {
        match self.checkpoint(label) {
            BudgetCheck::Exceeded => Err(self.exceeded(label)),
            check => Ok(check),
        }
    }

    /// Returns true if `cost` fits in the remaining budget.
    #[must_use]
    pub fn can_afford(&self, cost: Duration) -> bool {
        !self.token.is_cancelled() && self.remaining() >= cost
    }

    /// Fails with [`BudgetExceeded`] unless `cost` fits in the remaining budget.
    ///
    /// An unaffordable cost trips the guard the same way the deadline does.
    pub fn ensure_affordable(&self, label: &str, cost: Duration) -> Result<(), BudgetExceeded> {
        self.ensure(label)?;
        if self.can_afford(cost) {
            return Ok(());
        }
        warn!(
            checkpoint = label,
            cost_ms = millis(cost),
            remaining_ms = millis(self.remaining()),
            "Remaining budget cannot cover the next step"
        );
        self.trip(label);
        Err(self.exceeded(label))
    }

    /// Runs `work`, giving up once the remaining budget has passed.
    ///
    /// The limit is wall-clock time, so a call that never returns still
    /// leaves room to finish the run. Giving up trips the guard.
    pub async fn bounded<F>(&self, label: &str, work: F) -> Result<F::Output, BudgetExceeded>
    where
        F: Future,
    {
        self.ensure(label)?;
        let limit = self.remaining();
        if let Ok(output) = tokio::time::timeout(limit, work).await {
            Ok(output)
        } else {
            warn!(
                checkpoint = label,
                limit_ms = millis(limit),
                "Call outlived the remaining budget"
            );
            self.trip(label);
            Err(self.exceeded(label))
        }
    }

    /// Waits on the guard's clock.
    pub async fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration).await;
    }

    /// Builds the cancellation condition for `label`.
    #[must_use]
    pub fn exceeded(&self, label: &str) -> BudgetExceeded {
        BudgetExceeded {
            label: label.to_string(),
            elapsed: self.elapsed(),
            deadline: self.config.effective_deadline(),
        }
    }

    fn trip(&self, label: &str) {
        if self.token.cancel(label) {
            warn!(
                checkpoint = label,
                elapsed_ms = millis(self.elapsed()),
                deadline_ms = millis(self.config.effective_deadline()),
                "Execution budget exceeded, cancelling remaining work"
            );
        }
    }
}

impl fmt::Debug for TimeoutBudgetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutBudgetGuard")
            .field("config", &self.config)
            .field("elapsed", &self.elapsed())
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    fn guard(clock: &Arc<ManualClock>) -> TimeoutBudgetGuard {
        TimeoutBudgetGuard::with_clock(
            BudgetConfig::new(Duration::from_secs(100), Duration::from_secs(5))
                .with_warn_threshold(Duration::from_secs(20)),
            clock.clone(),
        )
    }

    #[test]
    fn test_default_config() {
        let config = BudgetConfig::default();
        assert_eq!(config.effective_deadline(), Duration::from_secs(355));
        assert_eq!(config.warn_threshold(), Duration::from_secs(60));
    }

    #[test]
    fn test_remaining_counts_margin() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        clock.advance(Duration::from_secs(30));

        assert_eq!(guard.elapsed(), Duration::from_secs(30));
        assert_eq!(guard.remaining(), Duration::from_secs(65));
        assert_eq!(guard.checkpoint("a"), BudgetCheck::Ok);
    }

    #[test]
    fn test_warn_is_not_fatal() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        clock.advance(Duration::from_secs(80));

        assert_eq!(guard.checkpoint("late"), BudgetCheck::Warn);
        assert!(guard.ensure("late").is_ok());
        assert!(!guard.is_exceeded());
    }

    #[test]
    fn test_exceeded_is_sticky() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        clock.advance(Duration::from_secs(95));

        let err = guard.ensure("ai_analysis").unwrap_err();
        assert_eq!(err.label, "ai_analysis");
        assert_eq!(err.deadline, Duration::from_secs(95));
        assert_eq!(guard.exceeded_at().as_deref(), Some("ai_analysis"));

        assert_eq!(guard.checkpoint("notification"), BudgetCheck::Exceeded);
        assert_eq!(guard.exceeded_at().as_deref(), Some("ai_analysis"));
    }

    #[test]
    fn test_unaffordable_cost_trips() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        clock.advance(Duration::from_secs(50));

        assert!(guard.can_afford(Duration::from_secs(40)));
        assert_ok!(guard.ensure_affordable("upload", Duration::from_secs(40)));

        assert!(!guard.can_afford(Duration::from_secs(60)));
        assert_err!(guard.ensure_affordable("upload", Duration::from_secs(60)));
        assert!(guard.is_exceeded());
        assert!(!guard.can_afford(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_bounded_returns_prompt_output() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        let value = assert_ok!(guard.bounded("generate", async { 7 }).await);
        assert_eq!(value, 7);
        assert!(!guard.is_exceeded());
    }

    #[tokio::test]
    async fn test_bounded_gives_up_on_stalled_call() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        clock.advance(Duration::from_secs(95) - Duration::from_millis(50));

        let err = guard
            .bounded("generate", std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err.label, "generate");
        assert_eq!(guard.exceeded_at().as_deref(), Some("generate"));
        assert_err!(guard.bounded("post", async {}).await);
    }

    #[tokio::test]
    async fn test_sleep_consumes_budget() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(&clock);
        guard.sleep(Duration::from_secs(10)).await;
        assert_eq!(guard.remaining(), Duration::from_secs(85));
    }
}
