use crate::basket::Basket;
use crate::crypto::{IncentiveCrypto, IssuanceResult, JoinRequest};
use crate::promotion::Promotion;
use crate::services::batch::{ProviderBatch, ProviderBatchResponse, StoreBatch, StoreBatchResponse};
use crate::services::error::ServiceError;
use std::future::Future;

//------------------------------------------   Promotion catalog   ----------------------------------------------------

pub trait PromotionCatalog {
    fn active_promotions(&self) -> impl Future<Output = Result<Vec<Promotion>, ServiceError>> + Send;
}

//------------------------------------------        Basket         ----------------------------------------------------

pub trait BasketView {
    fn current(&self) -> impl Future<Output = Result<Basket, ServiceError>> + Send;

    /// Freeze the basket for checkout and return it as frozen. The flags are checked and the freeze is set in one
    /// atomic step. A basket that is already frozen fails with `BasketError::Frozen`, and a paid one with
    /// `BasketError::Paid`.
    fn try_freeze(&self) -> impl Future<Output = Result<Basket, ServiceError>> + Send;

    /// A frozen basket rejects every modification.
    fn set_frozen(&self, frozen: bool) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Trigger payment of the basket. Success is irreversible.
    fn mark_paid(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn discard(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

//------------------------------------------      Remote services     -------------------------------------------------

/// The point-of-sale service. Issues coupons bound to the basket.
pub trait StoreService {
    fn batch_request(&self, batch: StoreBatch) -> impl Future<Output = Result<StoreBatchResponse, ServiceError>> + Send;
}

/// The central provider. Turns coupons into signed tokens.
pub trait ProviderService {
    fn batch_request(
        &self,
        batch: ProviderBatch,
    ) -> impl Future<Output = Result<ProviderBatchResponse, ServiceError>> + Send;

    /// Sign the first token for a promotion.
    fn join(&self, request: JoinRequest) -> impl Future<Output = Result<IssuanceResult, ServiceError>> + Send;
}

//--------------------       Convenience all-inclusive delegate trait     ----------------------------------------------

pub trait CheckoutDelegate:
    Sync + Send + Clone + PromotionCatalog + BasketView + StoreService + ProviderService + IncentiveCrypto
{
}
