//! Wall-clock budget tracking and cooperative cancellation.
//!
//! The hosting runtime kills an invocation at a hard ceiling. The guard
//! keeps the remaining-time fact available so stages and retry loops can
//! stop on their own before that happens.

mod clock;
mod guard;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{BudgetCheck, BudgetConfig, TimeoutBudgetGuard};
pub use token::CancellationToken;
