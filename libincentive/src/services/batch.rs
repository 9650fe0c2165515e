use crate::crypto::{
    EarnCoupon, EarnRequest, IssuanceResult, ProviderEarnRequest, ProviderSpendRequest, SpendCoupon, SpendRequest,
};
use crate::ids::BasketId;
use serde::{Deserialize, Serialize};

/// Every store-side request for one basket, sent in a single call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreBatch {
    pub basket_id: BasketId,
    pub earn_requests: Vec<EarnRequest>,
    pub spend_requests: Vec<SpendRequest>,
}

impl StoreBatch {
    pub fn new(basket_id: BasketId) -> Self {
        StoreBatch { basket_id, earn_requests: Vec::new(), spend_requests: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.earn_requests.len() + self.spend_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreBatchResponse {
    pub earn_coupons: Vec<EarnCoupon>,
    pub spend_coupons: Vec<SpendCoupon>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBatch {
    pub earn_requests: Vec<ProviderEarnRequest>,
    pub spend_requests: Vec<ProviderSpendRequest>,
}

impl ProviderBatch {
    pub fn len(&self) -> usize {
        self.earn_requests.len() + self.spend_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBatchResponse {
    pub earn_results: Vec<IssuanceResult>,
    pub spend_results: Vec<IssuanceResult>,
}

impl ProviderBatchResponse {
    /// All results, earn results first.
    pub fn into_results(self) -> impl Iterator<Item = IssuanceResult> {
        self.earn_results.into_iter().chain(self.spend_results)
    }
}
