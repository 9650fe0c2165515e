use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The stages of a checkout, in the order they are visited.
///
/// A checkout never moves backwards. Any stage can end in [`CheckoutStage::Aborted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckoutStage {
    Idle,
    /// The basket is frozen and the choices that will be attempted are fixed.
    ChoicesLocked,
    StoreRequestsBuilt,
    StoreExchanged,
    /// The basket has been paid. There is no way back from here.
    Paid,
    ProviderRequestsBuilt,
    ProviderExchanged,
    TokensCommitted,
    Done,
    Aborted,
}

impl CheckoutStage {
    /// True once payment has gone through.
    pub fn is_irreversible(&self) -> bool {
        matches!(
            self,
            CheckoutStage::Paid
                | CheckoutStage::ProviderRequestsBuilt
                | CheckoutStage::ProviderExchanged
                | CheckoutStage::TokensCommitted
                | CheckoutStage::Done
        )
    }

    /// Cancellation is honoured up to and including the store exchange.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            CheckoutStage::Idle
                | CheckoutStage::ChoicesLocked
                | CheckoutStage::StoreRequestsBuilt
                | CheckoutStage::StoreExchanged
        )
    }
}

impl Display for CheckoutStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutStage::Idle => write!(f, "Idle"),
            CheckoutStage::ChoicesLocked => write!(f, "ChoicesLocked"),
            CheckoutStage::StoreRequestsBuilt => write!(f, "StoreRequestsBuilt"),
            CheckoutStage::StoreExchanged => write!(f, "StoreExchanged"),
            CheckoutStage::Paid => write!(f, "Paid"),
            CheckoutStage::ProviderRequestsBuilt => write!(f, "ProviderRequestsBuilt"),
            CheckoutStage::ProviderExchanged => write!(f, "ProviderExchanged"),
            CheckoutStage::TokensCommitted => write!(f, "TokensCommitted"),
            CheckoutStage::Done => write!(f, "Done"),
            CheckoutStage::Aborted => write!(f, "Aborted"),
        }
    }
}
