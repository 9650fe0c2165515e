use crate::checkout::error::{CheckoutError, ErrorCode};
use crate::checkout::stage::CheckoutStage;
use crate::ids::{BasketId, PromotionId};
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// What the surrounding application learns about a checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Success(BasketId),
    DoubleSpendDetected,
    Error { code: ErrorCode, message: String },
}

impl CheckoutOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckoutOutcome::Success(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CheckoutOutcome::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<&CheckoutError> for CheckoutOutcome {
    fn from(error: &CheckoutError) -> Self {
        match error {
            CheckoutError::DoubleSpend(_) => CheckoutOutcome::DoubleSpendDetected,
            e => CheckoutOutcome::Error { code: e.code(), message: e.to_string() },
        }
    }
}

impl Display for CheckoutOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutOutcome::Success(basket_id) => write!(f, "Success ({basket_id})"),
            CheckoutOutcome::DoubleSpendDetected => write!(f, "Double spend detected"),
            CheckoutOutcome::Error { code, message } => write!(f, "Error [{code}]: {message}"),
        }
    }
}

/// A consistency problem that was tolerated. The promotion's token was left unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutWarning {
    /// The provider answered for a promotion that had no pending request.
    UnmatchedResponse(PromotionId),
    /// A pending request got no answer from the provider.
    MissingResponse(PromotionId),
}

impl CheckoutWarning {
    pub fn promotion_id(&self) -> &PromotionId {
        match self {
            CheckoutWarning::UnmatchedResponse(id) | CheckoutWarning::MissingResponse(id) => id,
        }
    }
}

impl Display for CheckoutWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutWarning::UnmatchedResponse(id) => write!(f, "Unmatched provider response for {id}"),
            CheckoutWarning::MissingResponse(id) => write!(f, "No provider response for {id}"),
        }
    }
}

/// Everything that happened during one checkout attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReport {
    pub outcome: CheckoutOutcome,
    /// Every stage visited, in order.
    pub stages: Vec<CheckoutStage>,
    /// The new tokens written to the token store.
    pub committed: Vec<Token>,
    pub warnings: Vec<CheckoutWarning>,
    /// Promotions whose recorded choice was not feasible when the choices were locked, and so were left unchanged.
    pub coerced: Vec<PromotionId>,
    pub paid: bool,
}

impl CheckoutReport {
    pub fn final_stage(&self) -> CheckoutStage {
        self.stages.last().copied().unwrap_or(CheckoutStage::Idle)
    }

    pub fn visited(&self, stage: CheckoutStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn committed_for(&self, promotion_id: &PromotionId) -> Option<&Token> {
        self.committed.iter().find(|t| &t.promotion_id == promotion_id)
    }
}
