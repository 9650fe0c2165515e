//! The checkout saga.
//!
//! `Idle → ChoicesLocked → StoreRequestsBuilt → StoreExchanged → Paid → ProviderRequestsBuilt → ProviderExchanged →
//! TokensCommitted → Done`, with `Aborted` reachable from every stage. If no promotion takes part, the checkout goes
//! straight from `ChoicesLocked` to `Paid` and then `Done`.
//!
//! Until the basket is paid, an aborted checkout leaves no trace: the token store is untouched, the pending requests
//! are discarded and the basket is unfrozen, so the shopper can simply try again. After payment, the basket is
//! discarded whatever happens, and errors are surfaced for manual reconciliation rather than retried.

mod context;
mod error;
mod orchestrator;
mod outcome;
mod stage;

pub use context::{CheckoutContext, Participation};
pub use error::{CheckoutError, ErrorClass, ErrorCode};
pub use orchestrator::{CheckoutCanceller, CheckoutOptions, CheckoutOrchestrator};
pub use outcome::{CheckoutOutcome, CheckoutReport, CheckoutWarning};
pub use stage::CheckoutStage;
