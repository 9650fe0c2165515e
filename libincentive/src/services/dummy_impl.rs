//----------------------------------------   Dummy Services   ---------------------------------------------------------
//
// In-process stand-ins for the catalog, basket, store and provider. The store and provider perform the same checks
// their real counterparts would, using the dummy crypto's keyed hashes. Each service can be switched to a
// misbehaving mode to exercise the checkout's failure handling.

use crate::basket::{Basket, BasketError, LineItem};
use crate::crypto::{
    CryptoError, DummyCrypto, DummyKeys, EarnCoupon, EarnRequest, IncentiveCrypto, Issuance, IssuanceResult,
    JoinRequest, Prepared, ProviderEarnRequest, ProviderSpendRequest, RequestSecret, SpendCoupon, SpendRequest,
};
use crate::ids::{BasketId, ItemId, PromotionId, UpdateId};
use crate::points::PointVector;
use crate::promotion::{Promotion, UpdateMetadata};
use crate::services::batch::{ProviderBatch, ProviderBatchResponse, StoreBatch, StoreBatchResponse};
use crate::services::error::ServiceError;
use crate::services::traits::{BasketView, CheckoutDelegate, PromotionCatalog, ProviderService, StoreService};
use crate::token::Token;
use chrono::Utc;
use log::*;
use rand::{CryptoRng, RngCore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

//------------------------------------------   Catalog   --------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    promotions: Arc<Vec<Promotion>>,
}

impl StaticCatalog {
    pub fn new(promotions: Vec<Promotion>) -> Self {
        StaticCatalog { promotions: Arc::new(promotions) }
    }

    pub fn promotions(&self) -> &[Promotion] {
        &self.promotions
    }

    pub fn find(&self, promotion_id: &PromotionId) -> Option<&Promotion> {
        self.promotions.iter().find(|p| &p.promotion_id == promotion_id)
    }
}

impl PromotionCatalog for StaticCatalog {
    async fn active_promotions(&self) -> Result<Vec<Promotion>, ServiceError> {
        Ok(self.promotions.as_ref().clone())
    }
}

//------------------------------------------   Basket   ---------------------------------------------------------------

/// A single basket, held in memory.
#[derive(Clone, Debug, Default)]
pub struct LocalBasket {
    basket: Arc<RwLock<Option<Basket>>>,
    decline_payment: Arc<AtomicBool>,
}

impl LocalBasket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current basket.
    pub async fn open(&self, basket: Basket) {
        debug!("Opening basket {}", basket.basket_id());
        *self.basket.write().await = Some(basket);
    }

    /// Open a new, empty basket with a random id.
    pub async fn open_new(&self) -> BasketId {
        let basket_id = BasketId::random(&mut rand::rng());
        self.open(Basket::new(basket_id.clone(), Utc::now())).await;
        basket_id
    }

    pub async fn add_item(&self, item: LineItem) -> Result<(), ServiceError> {
        let mut lock = self.basket.write().await;
        let basket = lock.as_mut().ok_or(ServiceError::NoBasket)?;
        basket.add_item(item)?;
        Ok(())
    }

    pub async fn remove_item(&self, item_id: &ItemId, quantity: u32) -> Result<(), ServiceError> {
        let mut lock = self.basket.write().await;
        let basket = lock.as_mut().ok_or(ServiceError::NoBasket)?;
        basket.remove_item(item_id, quantity)?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Option<Basket> {
        self.basket.read().await.clone()
    }

    /// While set, every payment attempt is declined.
    pub fn decline_payments(&self, decline: bool) {
        self.decline_payment.store(decline, Ordering::SeqCst);
    }
}

impl BasketView for LocalBasket {
    async fn current(&self) -> Result<Basket, ServiceError> {
        self.basket.read().await.clone().ok_or(ServiceError::NoBasket)
    }

    async fn try_freeze(&self) -> Result<Basket, ServiceError> {
        let mut lock = self.basket.write().await;
        let basket = lock.as_mut().ok_or(ServiceError::NoBasket)?;
        if basket.is_paid() {
            return Err(BasketError::Paid.into());
        }
        if basket.is_frozen() {
            return Err(BasketError::Frozen.into());
        }
        basket.set_frozen(true);
        Ok(basket.clone())
    }

    async fn set_frozen(&self, frozen: bool) -> Result<(), ServiceError> {
        let mut lock = self.basket.write().await;
        let basket = lock.as_mut().ok_or(ServiceError::NoBasket)?;
        basket.set_frozen(frozen);
        Ok(())
    }

    async fn mark_paid(&self) -> Result<(), ServiceError> {
        let mut lock = self.basket.write().await;
        let basket = lock.as_mut().ok_or(ServiceError::NoBasket)?;
        if basket.is_paid() {
            return Err(BasketError::Paid.into());
        }
        if self.decline_payment.load(Ordering::SeqCst) {
            info!("Declining payment for basket {}", basket.basket_id());
            return Err(ServiceError::PaymentDeclined("The card was declined".into()));
        }
        info!("Basket {} paid: {} cents", basket.basket_id(), basket.total_price());
        basket.mark_paid();
        Ok(())
    }

    async fn discard(&self) -> Result<(), ServiceError> {
        let mut lock = self.basket.write().await;
        match lock.take() {
            Some(basket) => debug!("Discarded basket {}", basket.basket_id()),
            None => debug!("No basket to discard"),
        }
        Ok(())
    }
}

//------------------------------------------   Store   ----------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StoreBehaviour {
    #[default]
    Honest,
    /// Every batch request fails.
    Unavailable,
    /// Earn coupons carry the wrong signature.
    ForgeEarnCoupons,
    /// The response has no coupon for this promotion.
    OmitCoupon(PromotionId),
    /// Every earn coupon is sent twice.
    DuplicateCoupons,
    /// The response carries an extra earn coupon for this promotion, whether it asked for one or not.
    UnsolicitedCoupon(PromotionId),
}

#[derive(Clone, Debug)]
pub struct DummyStore {
    crypto: DummyCrypto,
    catalog: StaticCatalog,
    basket: LocalBasket,
    behaviour: Arc<RwLock<StoreBehaviour>>,
    calls: Arc<AtomicUsize>,
}

impl DummyStore {
    pub fn new(crypto: DummyCrypto, catalog: StaticCatalog, basket: LocalBasket) -> Self {
        DummyStore {
            crypto,
            catalog,
            basket,
            behaviour: Arc::new(RwLock::new(StoreBehaviour::Honest)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_behaviour(&self, behaviour: StoreBehaviour) {
        *self.behaviour.write().await = behaviour;
    }

    /// The number of batch requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn earn_coupon(&self, basket: &Basket, request: &EarnRequest) -> Result<EarnCoupon, ServiceError> {
        let promotion = self
            .catalog
            .find(&request.promotion_id)
            .ok_or_else(|| ServiceError::Rejected(format!("Unknown promotion {}", request.promotion_id)))?;
        let amount = promotion.point_contribution(basket).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        let signature =
            self.crypto.sign_earn_coupon(&request.promotion_id, basket.basket_id(), &amount, &request.commitment);
        debug!("Store: issuing earn coupon for {} worth {amount}", request.promotion_id);
        Ok(EarnCoupon {
            promotion_id: request.promotion_id.clone(),
            basket_id: basket.basket_id().clone(),
            amount,
            signature,
        })
    }

    fn spend_coupon(&self, request: &SpendRequest) -> Result<SpendCoupon, ServiceError> {
        self.crypto.check_spend_proof(request).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        debug!("Store: approving {} for {}", request.update_id, request.promotion_id);
        Ok(SpendCoupon {
            promotion_id: request.promotion_id.clone(),
            basket_id: request.basket_id.clone(),
            update_id: request.update_id.clone(),
            signature: self.crypto.sign_spend_coupon(request),
        })
    }
}

impl StoreService for DummyStore {
    async fn batch_request(&self, batch: StoreBatch) -> Result<StoreBatchResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.read().await.clone();
        if behaviour == StoreBehaviour::Unavailable {
            warn!("Store: refusing batch for basket {}", batch.basket_id);
            return Err(ServiceError::Unavailable("store offline".into()));
        }
        let basket = self.basket.current().await?;
        if basket.basket_id() != &batch.basket_id {
            return Err(ServiceError::Rejected(format!("Unknown basket {}", batch.basket_id)));
        }
        // Coupons are only issued for a basket that is about to be paid
        if basket.is_paid() {
            return Err(ServiceError::Rejected(format!("Basket {} has already been paid", batch.basket_id)));
        }
        info!("Store: processing {} requests for basket {}", batch.len(), batch.basket_id);
        let mut response = StoreBatchResponse::default();
        for request in &batch.earn_requests {
            let mut coupon = self.earn_coupon(&basket, request)?;
            if behaviour == StoreBehaviour::ForgeEarnCoupons {
                coupon.signature = vec![0u8; coupon.signature.len()];
            }
            response.earn_coupons.push(coupon);
        }
        for request in &batch.spend_requests {
            response.spend_coupons.push(self.spend_coupon(request)?);
        }
        match &behaviour {
            StoreBehaviour::OmitCoupon(omit) => {
                response.earn_coupons.retain(|c| &c.promotion_id != omit);
                response.spend_coupons.retain(|c| &c.promotion_id != omit);
            }
            StoreBehaviour::DuplicateCoupons => {
                let copies = response.earn_coupons.clone();
                response.earn_coupons.extend(copies);
            }
            StoreBehaviour::UnsolicitedCoupon(promotion_id) => {
                let amount = PointVector::zeros(1);
                let signature = self.crypto.sign_earn_coupon(promotion_id, basket.basket_id(), &amount, &[]);
                response.earn_coupons.push(EarnCoupon {
                    promotion_id: promotion_id.clone(),
                    basket_id: basket.basket_id().clone(),
                    amount,
                    signature,
                });
            }
            _ => {}
        }
        Ok(response)
    }
}

//------------------------------------------   Provider   -------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ProviderBehaviour {
    #[default]
    Honest,
    Unavailable,
    /// The result for this promotion goes missing.
    DropResult(PromotionId),
}

#[derive(Clone, Debug)]
pub struct DummyProvider {
    crypto: DummyCrypto,
    spent_tags: Arc<RwLock<HashSet<Vec<u8>>>>,
    behaviour: Arc<RwLock<ProviderBehaviour>>,
    calls: Arc<AtomicUsize>,
}

impl DummyProvider {
    pub fn new(crypto: DummyCrypto) -> Self {
        DummyProvider {
            crypto,
            spent_tags: Arc::new(RwLock::new(HashSet::new())),
            behaviour: Arc::new(RwLock::new(ProviderBehaviour::Honest)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_behaviour(&self, behaviour: ProviderBehaviour) {
        *self.behaviour.write().await = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn spent_count(&self) -> usize {
        self.spent_tags.read().await.len()
    }

    fn earn(&self, request: &ProviderEarnRequest) -> Result<IssuanceResult, ServiceError> {
        self.crypto.check_provider_earn_request(request).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        let signature = self.crypto.issue(&request.promotion_id, &request.commitment);
        Ok(IssuanceResult::signed(request.promotion_id.clone(), signature))
    }

    async fn spend(&self, request: &ProviderSpendRequest) -> Result<IssuanceResult, ServiceError> {
        self.crypto.check_provider_spend_request(request).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        if !self.spent_tags.write().await.insert(request.double_spend_tag.clone()) {
            warn!("Provider: double spend detected for {}", request.promotion_id);
            return Ok(IssuanceResult::double_spend(request.promotion_id.clone()));
        }
        let signature = self.crypto.issue(&request.promotion_id, &request.commitment);
        Ok(IssuanceResult::signed(request.promotion_id.clone(), signature))
    }
}

impl ProviderService for DummyProvider {
    async fn batch_request(&self, batch: ProviderBatch) -> Result<ProviderBatchResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = self.behaviour.read().await.clone();
        if behaviour == ProviderBehaviour::Unavailable {
            warn!("Provider: refusing batch");
            return Err(ServiceError::Unavailable("provider offline".into()));
        }
        info!("Provider: processing {} requests", batch.len());
        let mut response = ProviderBatchResponse::default();
        for request in &batch.earn_requests {
            response.earn_results.push(self.earn(request)?);
        }
        for request in &batch.spend_requests {
            response.spend_results.push(self.spend(request).await?);
        }
        if let ProviderBehaviour::DropResult(dropped) = &behaviour {
            response.earn_results.retain(|r| &r.promotion_id != dropped);
            response.spend_results.retain(|r| &r.promotion_id != dropped);
        }
        Ok(response)
    }

    async fn join(&self, request: JoinRequest) -> Result<IssuanceResult, ServiceError> {
        info!("Provider: issuing a new token for {}", request.promotion_id);
        let signature = self.crypto.issue(&request.promotion_id, &request.commitment);
        Ok(IssuanceResult::signed(request.promotion_id, signature))
    }
}

//----------------------------------------   Dummy Delegate   ---------------------------------------------------------

/// Every collaborator the checkout needs, wired together in-process and sharing one basket.
#[derive(Clone, Debug)]
pub struct DummyDelegate {
    pub catalog: StaticCatalog,
    pub basket: LocalBasket,
    pub store: DummyStore,
    pub provider: DummyProvider,
    pub crypto: DummyCrypto,
}

impl DummyDelegate {
    pub fn new(keys: DummyKeys, promotions: Vec<Promotion>) -> Self {
        let crypto = DummyCrypto::new(keys);
        let catalog = StaticCatalog::new(promotions);
        let basket = LocalBasket::new();
        let store = DummyStore::new(crypto.clone(), catalog.clone(), basket.clone());
        let provider = DummyProvider::new(crypto.clone());
        DummyDelegate { catalog, basket, store, provider, crypto }
    }
}

impl PromotionCatalog for DummyDelegate {
    async fn active_promotions(&self) -> Result<Vec<Promotion>, ServiceError> {
        self.catalog.active_promotions().await
    }
}

impl BasketView for DummyDelegate {
    async fn current(&self) -> Result<Basket, ServiceError> {
        self.basket.current().await
    }

    async fn try_freeze(&self) -> Result<Basket, ServiceError> {
        self.basket.try_freeze().await
    }

    async fn set_frozen(&self, frozen: bool) -> Result<(), ServiceError> {
        self.basket.set_frozen(frozen).await
    }

    async fn mark_paid(&self) -> Result<(), ServiceError> {
        self.basket.mark_paid().await
    }

    async fn discard(&self) -> Result<(), ServiceError> {
        self.basket.discard().await
    }
}

impl StoreService for DummyDelegate {
    async fn batch_request(&self, batch: StoreBatch) -> Result<StoreBatchResponse, ServiceError> {
        self.store.batch_request(batch).await
    }
}

impl ProviderService for DummyDelegate {
    async fn batch_request(&self, batch: ProviderBatch) -> Result<ProviderBatchResponse, ServiceError> {
        self.provider.batch_request(batch).await
    }

    async fn join(&self, request: JoinRequest) -> Result<IssuanceResult, ServiceError> {
        self.provider.join(request).await
    }
}

impl IncentiveCrypto for DummyDelegate {
    fn build_join_request<R: RngCore + CryptoRng>(
        &self,
        promotion_id: &PromotionId,
        rng: &mut R,
    ) -> Prepared<JoinRequest> {
        self.crypto.build_join_request(promotion_id, rng)
    }

    fn derive_joined_token(
        &self,
        prepared: &Prepared<JoinRequest>,
        dimensions: usize,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        self.crypto.derive_joined_token(prepared, dimensions, issuance)
    }

    fn build_earn_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        basket_id: &BasketId,
        rng: &mut R,
    ) -> Prepared<EarnRequest> {
        self.crypto.build_earn_request(token, basket_id, rng)
    }

    fn build_spend_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        update_id: &UpdateId,
        target: &PointVector,
        metadata: &UpdateMetadata,
        rng: &mut R,
    ) -> Result<Prepared<SpendRequest>, CryptoError> {
        self.crypto.build_spend_request(token, update_id, target, metadata, rng)
    }

    fn verify_coupon(&self, request: &EarnRequest, coupon: &EarnCoupon) -> Result<PointVector, CryptoError> {
        self.crypto.verify_coupon(request, coupon)
    }

    fn build_provider_earn_request(
        &self,
        request: &EarnRequest,
        coupon: EarnCoupon,
    ) -> Result<ProviderEarnRequest, CryptoError> {
        self.crypto.build_provider_earn_request(request, coupon)
    }

    fn build_provider_spend_request(
        &self,
        request: &SpendRequest,
        coupon: SpendCoupon,
    ) -> Result<ProviderSpendRequest, CryptoError> {
        self.crypto.build_provider_spend_request(request, coupon)
    }

    fn derive_new_token(
        &self,
        snapshot: &Token,
        secret: &RequestSecret,
        commitment: &[u8],
        target: &PointVector,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        self.crypto.derive_new_token(snapshot, secret, commitment, target, issuance)
    }
}

impl CheckoutDelegate for DummyDelegate {}
