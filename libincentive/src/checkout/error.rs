use crate::crypto::CryptoError;
use crate::ids::{BasketId, PromotionId, UpdateId};
use crate::pending::PendingRequestError;
use crate::promotion::PromotionError;
use crate::services::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// How a checkout failure should be handled by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Caught before any network call. Nothing happened; re-evaluate the choices and try again.
    Validation,
    /// A collaborator call failed. Safe to retry before payment, a matter for support after it.
    Transport,
    /// A counterparty sent something that does not check out. Never retried automatically.
    ProtocolIntegrity,
    /// The token was spent before.
    DoubleSpend,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Network,
    Payment,
    InvalidCoupon,
    AmbiguousUpdate,
    DoubleSpend,
    Internal,
    Storage,
    Cancelled,
    AlreadyPaid,
    InProgress,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Validation => write!(f, "validation"),
            ErrorCode::Network => write!(f, "network"),
            ErrorCode::Payment => write!(f, "payment"),
            ErrorCode::InvalidCoupon => write!(f, "invalid_coupon"),
            ErrorCode::AmbiguousUpdate => write!(f, "ambiguous_update"),
            ErrorCode::DoubleSpend => write!(f, "double_spend"),
            ErrorCode::Internal => write!(f, "internal"),
            ErrorCode::Storage => write!(f, "storage"),
            ErrorCode::Cancelled => write!(f, "cancelled"),
            ErrorCode::AlreadyPaid => write!(f, "already_paid"),
            ErrorCode::InProgress => write!(f, "in_progress"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Basket {0} has already been paid")]
    AlreadyPaid(BasketId),
    #[error("A checkout is already in progress for basket {0}")]
    CheckoutInProgress(BasketId),
    #[error("Update {update_id} of promotion {promotion_id} has {candidates} possible outcomes")]
    AmbiguousUpdate { promotion_id: PromotionId, update_id: UpdateId, candidates: usize },
    #[error("Promotion {promotion_id}: {source}")]
    Promotion { promotion_id: PromotionId, source: PromotionError },
    #[error("Could not build the request for promotion {promotion_id}: {source}")]
    RequestBuild { promotion_id: PromotionId, source: CryptoError },
    #[error("Could not load the promotion catalog: {0}")]
    Catalog(ServiceError),
    #[error("Basket service failed: {0}")]
    Basket(ServiceError),
    #[error("The store exchange failed: {0}")]
    StoreExchange(ServiceError),
    #[error("Payment failed: {0}")]
    Payment(ServiceError),
    #[error("The provider exchange failed: {0}")]
    ProviderExchange(ServiceError),
    #[error("The store's coupon for promotion {promotion_id} is invalid: {source}")]
    InvalidCoupon { promotion_id: PromotionId, source: CryptoError },
    #[error("The store's response is inconsistent with the request: {0}")]
    InconsistentStoreResponse(String),
    #[error("The provider's response is inconsistent with the request: {0}")]
    InconsistentProviderResponse(String),
    #[error("Could not derive the new token for promotion {promotion_id}: {source}")]
    TokenDerivation { promotion_id: PromotionId, source: CryptoError },
    #[error("The token for promotion {0} has already been spent")]
    DoubleSpend(PromotionId),
    #[error("Token storage failed for promotion {promotion_id}: {message}")]
    Storage { promotion_id: PromotionId, message: String },
    #[error("Pending request error: {0}")]
    Pending(#[from] PendingRequestError),
    #[error("This is a bug. {0}")]
    Internal(String),
    #[error("Checkout was cancelled")]
    Cancelled,
}

impl CheckoutError {
    pub fn class(&self) -> ErrorClass {
        use CheckoutError::*;
        match self {
            AlreadyPaid(_)
            | CheckoutInProgress(_)
            | AmbiguousUpdate { .. }
            | Promotion { .. }
            | RequestBuild { .. }
            | Cancelled => ErrorClass::Validation,
            Catalog(_) | Basket(_) | StoreExchange(_) | Payment(_) | ProviderExchange(_) | Storage { .. } => {
                ErrorClass::Transport
            }
            InvalidCoupon { .. }
            | InconsistentStoreResponse(_)
            | InconsistentProviderResponse(_)
            | TokenDerivation { .. }
            | Pending(_)
            | Internal(_) => ErrorClass::ProtocolIntegrity,
            DoubleSpend(_) => ErrorClass::DoubleSpend,
        }
    }

    pub fn code(&self) -> ErrorCode {
        use CheckoutError::*;
        match self {
            AlreadyPaid(_) => ErrorCode::AlreadyPaid,
            CheckoutInProgress(_) => ErrorCode::InProgress,
            AmbiguousUpdate { .. } => ErrorCode::AmbiguousUpdate,
            Promotion { .. } => ErrorCode::Validation,
            Catalog(_) | Basket(_) | StoreExchange(_) | ProviderExchange(_) => ErrorCode::Network,
            Payment(_) => ErrorCode::Payment,
            InvalidCoupon { .. } => ErrorCode::InvalidCoupon,
            RequestBuild { .. }
            | InconsistentStoreResponse(_)
            | InconsistentProviderResponse(_)
            | TokenDerivation { .. }
            | Pending(_)
            | Internal(_) => ErrorCode::Internal,
            DoubleSpend(_) => ErrorCode::DoubleSpend,
            Storage { .. } => ErrorCode::Storage,
            Cancelled => ErrorCode::Cancelled,
        }
    }

    pub(crate) fn from_promotion(promotion_id: &PromotionId, error: PromotionError) -> Self {
        match error {
            PromotionError::Ambiguous { update_id, candidates } => {
                CheckoutError::AmbiguousUpdate { promotion_id: promotion_id.clone(), update_id, candidates }
            }
            source => CheckoutError::Promotion { promotion_id: promotion_id.clone(), source },
        }
    }

    pub(crate) fn storage(promotion_id: &PromotionId, error: anyhow::Error) -> Self {
        CheckoutError::Storage { promotion_id: promotion_id.clone(), message: error.to_string() }
    }
}
