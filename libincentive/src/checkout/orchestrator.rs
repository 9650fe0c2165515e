use crate::basket::BasketError;
use crate::checkout::context::CheckoutContext;
use crate::checkout::error::CheckoutError;
use crate::checkout::outcome::{CheckoutOutcome, CheckoutReport, CheckoutWarning};
use crate::checkout::stage::CheckoutStage;
use crate::choice::{ChoiceBook, UpdateChoice};
use crate::crypto::{CryptoError, EarnCoupon, SpendCoupon};
use crate::evaluator::{evaluate, Evaluation, TokenSnapshot};
use crate::ids::{BasketId, PromotionId};
use crate::pending::{PendingKind, PendingRequest, PendingRequestCache};
use crate::promotion::Promotion;
use crate::services::{
    BasketView, CheckoutDelegate, PromotionCatalog, ProviderBatch, ProviderBatchResponse, ProviderService,
    ServiceError, StoreBatch, StoreBatchResponse, StoreService,
};
use crate::storage::TokenStore;
use crate::token::Token;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    /// Treat unmatched or missing provider responses as a failed checkout instead of a warning. Tokens that were
    /// matched are still committed.
    #[serde(default)]
    pub strict_consistency: bool,
}

/// A handle for cancelling a checkout from elsewhere.
///
/// Cancellation is only honoured until the store exchange has completed. Once payment has been taken, the checkout
/// runs to the end. A cancelled checkout is reported as an `Error` with code `cancelled`, and its stage trail ends
/// in `Aborted`, so the caller can tell it apart from a checkout that was never started. The orchestrator itself is
/// back to idle: the basket is unfrozen, nothing is pending and the same choices can be checked out again.
#[derive(Clone, Debug, Default)]
pub struct CheckoutCanceller(Arc<AtomicBool>);

impl CheckoutCanceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Book-keeping for a single checkout attempt.
#[derive(Default)]
struct SagaRun {
    basket_id: Option<BasketId>,
    stages: Vec<CheckoutStage>,
    committed: Vec<Token>,
    warnings: Vec<CheckoutWarning>,
    coerced: Vec<PromotionId>,
    frozen: bool,
}

impl SagaRun {
    fn stage(&self) -> CheckoutStage {
        self.stages.last().copied().unwrap_or(CheckoutStage::Idle)
    }

    fn paid(&self) -> bool {
        self.stages.iter().any(CheckoutStage::is_irreversible)
    }

    fn enter(&mut self, stage: CheckoutStage) {
        match &self.basket_id {
            Some(id) => info!("Checkout of basket {id}: {stage}"),
            None => info!("Checkout: {stage}"),
        }
        self.stages.push(stage);
    }

    fn warn(&mut self, warning: CheckoutWarning) {
        warn!("{warning}. The token for {} is left unchanged", warning.promotion_id());
        self.warnings.push(warning);
    }
}

/// Drives a basket through checkout: lock the choices, exchange requests with the store, pay, exchange the store's
/// coupons with the provider, and commit the new tokens.
pub struct CheckoutOrchestrator<T, D> {
    tokens: T,
    delegate: D,
    pending: PendingRequestCache,
    canceller: CheckoutCanceller,
    options: CheckoutOptions,
}

impl<T, D> CheckoutOrchestrator<T, D>
where
    T: TokenStore,
    D: CheckoutDelegate,
{
    pub fn new(tokens: T, delegate: D) -> Self {
        CheckoutOrchestrator {
            tokens,
            delegate,
            pending: PendingRequestCache::new(),
            canceller: CheckoutCanceller::default(),
            options: CheckoutOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CheckoutOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `cache` for pending requests instead of a private one.
    pub fn with_pending_cache(mut self, cache: PendingRequestCache) -> Self {
        self.pending = cache;
        self
    }

    pub fn options(&self) -> &CheckoutOptions {
        &self.options
    }

    pub fn token_store(&self) -> &T {
        &self.tokens
    }

    pub fn token_store_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    pub fn into_token_store(self) -> T {
        self.tokens
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn pending_requests(&self) -> &PendingRequestCache {
        &self.pending
    }

    pub fn canceller(&self) -> CheckoutCanceller {
        self.canceller.clone()
    }

    /// Evaluate every active promotion against the current basket and tokens.
    pub async fn evaluate(&self, choices: &ChoiceBook) -> Result<Evaluation, CheckoutError> {
        let basket = self.delegate.current().await.map_err(CheckoutError::Basket)?;
        let promotions = self.delegate.active_promotions().await.map_err(CheckoutError::Catalog)?;
        let tokens = self.token_snapshot(&promotions)?;
        Ok(evaluate(&promotions, &tokens, &basket, choices.as_map()))
    }

    pub async fn start_checkout(&mut self, choices: &ChoiceBook) -> CheckoutOutcome {
        self.run_checkout(choices).await.outcome
    }

    /// Run a checkout and report on everything that happened along the way.
    pub async fn run_checkout(&mut self, choices: &ChoiceBook) -> CheckoutReport {
        let mut run = SagaRun::default();
        run.enter(CheckoutStage::Idle);
        let result = self.drive(choices, &mut run).await;
        self.clean_up(&mut run).await;
        let outcome = match result {
            Ok(basket_id) => {
                run.enter(CheckoutStage::Done);
                info!("Checkout of basket {basket_id} complete. {} tokens updated", run.committed.len());
                CheckoutOutcome::Success(basket_id)
            }
            Err(e) => {
                match &e {
                    CheckoutError::DoubleSpend(id) => warn!("Checkout aborted: the token for {id} was already spent"),
                    e if run.paid() => error!("Checkout failed after payment. This needs manual reconciliation. {e}"),
                    e => warn!("Checkout aborted: {e}"),
                }
                run.enter(CheckoutStage::Aborted);
                CheckoutOutcome::from(&e)
            }
        };
        self.canceller.reset();
        let paid = run.paid();
        CheckoutReport {
            outcome,
            stages: run.stages,
            committed: run.committed,
            warnings: run.warnings,
            coerced: run.coerced,
            paid,
        }
    }

    async fn drive(&mut self, choices: &ChoiceBook, run: &mut SagaRun) -> Result<BasketId, CheckoutError> {
        let ctx = self.lock_choices(choices, run).await?;
        run.coerced = ctx.coerced().to_vec();
        run.enter(CheckoutStage::ChoicesLocked);
        self.check_cancelled(run)?;

        if ctx.is_pay_only() {
            debug!("No promotion takes part in this checkout. Only taking payment");
            self.pay(run).await?;
            return Ok(ctx.basket_id().clone());
        }

        let (batch, entries) = self.build_store_requests(&ctx)?;
        for (promotion_id, entry) in entries {
            self.pending.put(promotion_id, entry).await?;
        }
        run.enter(CheckoutStage::StoreRequestsBuilt);
        self.check_cancelled(run)?;

        debug!(
            "Sending {} earn and {} spend requests to the store",
            batch.earn_requests.len(),
            batch.spend_requests.len()
        );
        let response = StoreService::batch_request(&self.delegate, batch).await.map_err(CheckoutError::StoreExchange)?;
        run.enter(CheckoutStage::StoreExchanged);
        self.check_cancelled(run)?;

        self.pay(run).await?;
        self.check_cancelled(run)?;

        let batch = self.build_provider_requests(response).await?;
        run.enter(CheckoutStage::ProviderRequestsBuilt);

        debug!("Sending {} requests to the provider", batch.len());
        let response =
            ProviderService::batch_request(&self.delegate, batch).await.map_err(CheckoutError::ProviderExchange)?;
        run.enter(CheckoutStage::ProviderExchanged);

        self.commit_tokens(response, run).await?;
        run.enter(CheckoutStage::TokensCommitted);

        if self.options.strict_consistency && !run.warnings.is_empty() {
            let ids = run.warnings.iter().map(|w| w.promotion_id().to_string()).collect::<Vec<_>>().join(", ");
            return Err(CheckoutError::InconsistentProviderResponse(format!("no usable response for {ids}")));
        }
        Ok(ctx.basket_id().clone())
    }

    //------------------------------------------   Stages   -----------------------------------------------------------

    async fn lock_choices(&self, choices: &ChoiceBook, run: &mut SagaRun) -> Result<CheckoutContext, CheckoutError> {
        let basket = match self.delegate.try_freeze().await {
            Ok(basket) => basket,
            Err(ServiceError::Basket(BasketError::Paid)) => {
                return Err(CheckoutError::AlreadyPaid(self.current_basket_id().await?));
            }
            // Someone else's checkout. Their freeze is left alone.
            Err(ServiceError::Basket(BasketError::Frozen)) => {
                return Err(CheckoutError::CheckoutInProgress(self.current_basket_id().await?));
            }
            Err(e) => return Err(CheckoutError::Basket(e)),
        };
        run.basket_id = Some(basket.basket_id().clone());
        run.frozen = true;
        let promotions = self.delegate.active_promotions().await.map_err(CheckoutError::Catalog)?;
        let tokens = self.token_snapshot(&promotions)?;
        let ctx = CheckoutContext::lock(basket, promotions, tokens, choices);
        for p in ctx.participants() {
            debug!("{} takes part with choice {}", p.promotion.promotion_id, p.choice);
        }
        Ok(ctx)
    }

    /// Build one request per participating promotion, along with the cache entries needed to finish them later.
    fn build_store_requests(
        &self,
        ctx: &CheckoutContext,
    ) -> Result<(StoreBatch, Vec<(PromotionId, PendingRequest)>), CheckoutError> {
        let mut rng = rand::rng();
        let basket = ctx.basket();
        let metadata = ctx.metadata();
        let mut batch = StoreBatch::new(ctx.basket_id().clone());
        let mut entries = Vec::with_capacity(ctx.participants().len());
        for participant in ctx.participants() {
            let promotion_id = &participant.promotion.promotion_id;
            let snapshot = &participant.snapshot;
            let contribution = participant
                .promotion
                .point_contribution(basket)
                .map_err(|e| CheckoutError::from_promotion(promotion_id, e))?;
            let kind = match &participant.choice {
                UpdateChoice::Earn => {
                    let prepared = self.delegate.build_earn_request(snapshot, ctx.basket_id(), &mut rng);
                    batch.earn_requests.push(prepared.request.clone());
                    PendingKind::EarnAwaitingCoupon(prepared)
                }
                UpdateChoice::Zkp(update_id) => {
                    let target = participant
                        .promotion
                        .candidate_points(update_id, &snapshot.points, &contribution, metadata)
                        .map_err(|e| CheckoutError::from_promotion(promotion_id, e))?;
                    let prepared = self
                        .delegate
                        .build_spend_request(snapshot, update_id, &target, metadata, &mut rng)
                        .map_err(|source| CheckoutError::RequestBuild { promotion_id: promotion_id.clone(), source })?;
                    batch.spend_requests.push(prepared.request.clone());
                    PendingKind::Spend { update_id: update_id.clone(), prepared, target }
                }
                UpdateChoice::None => {
                    return Err(CheckoutError::Internal(format!("{promotion_id} participates without a choice")));
                }
            };
            let entry = PendingRequest {
                snapshot: snapshot.clone(),
                contribution,
                metadata: metadata.clone(),
                kind,
            };
            entries.push((promotion_id.clone(), entry));
        }
        Ok((batch, entries))
    }

    async fn pay(&self, run: &mut SagaRun) -> Result<(), CheckoutError> {
        self.delegate.mark_paid().await.map_err(CheckoutError::Payment)?;
        run.enter(CheckoutStage::Paid);
        Ok(())
    }

    /// Check the store's coupons and turn them into provider requests.
    ///
    /// Every pending entry is taken out and put back, so that earn entries can record the amount the store vouched
    /// for. Any bad coupon fails the whole checkout.
    async fn build_provider_requests(&self, response: StoreBatchResponse) -> Result<ProviderBatch, CheckoutError> {
        let mut earn_coupons = index_coupons(response.earn_coupons, |c: &EarnCoupon| &c.promotion_id)?;
        let mut spend_coupons = index_coupons(response.spend_coupons, |c: &SpendCoupon| &c.promotion_id)?;
        let mut batch = ProviderBatch::default();
        for promotion_id in self.pending.ids().await {
            let Some(entry) = self.pending.take(&promotion_id).await else {
                return Err(CheckoutError::Internal(format!("The pending request for {promotion_id} vanished")));
            };
            let PendingRequest { snapshot, contribution, metadata, kind } = entry;
            let kind = match kind {
                PendingKind::EarnAwaitingCoupon(prepared) => {
                    let coupon = earn_coupons.remove(&promotion_id).ok_or_else(|| {
                        CheckoutError::InconsistentStoreResponse(format!("no earn coupon for {promotion_id}"))
                    })?;
                    let invalid = |source: CryptoError| CheckoutError::InvalidCoupon {
                        promotion_id: promotion_id.clone(),
                        source,
                    };
                    let amount = self.delegate.verify_coupon(&prepared.request, &coupon).map_err(invalid)?;
                    if amount != contribution {
                        debug!("Store credited {amount} to {promotion_id}; the basket suggested {contribution}");
                    }
                    let target =
                        snapshot.points.checked_add(&amount).map_err(|e| invalid(CryptoError::Points(e)))?;
                    let request =
                        self.delegate.build_provider_earn_request(&prepared.request, coupon).map_err(invalid)?;
                    batch.earn_requests.push(request);
                    PendingKind::EarnAwaitingIssuance { prepared, target }
                }
                PendingKind::Spend { update_id, prepared, target } => {
                    let coupon = spend_coupons.remove(&promotion_id).ok_or_else(|| {
                        CheckoutError::InconsistentStoreResponse(format!("no spend coupon for {promotion_id}"))
                    })?;
                    let request = self.delegate.build_provider_spend_request(&prepared.request, coupon).map_err(
                        |source| CheckoutError::InvalidCoupon { promotion_id: promotion_id.clone(), source },
                    )?;
                    batch.spend_requests.push(request);
                    PendingKind::Spend { update_id, prepared, target }
                }
                PendingKind::EarnAwaitingIssuance { .. } => {
                    return Err(CheckoutError::Internal(format!("{promotion_id} already has a verified coupon")));
                }
            };
            self.pending.put(promotion_id, PendingRequest { snapshot, contribution, metadata, kind }).await?;
        }
        if let Some(id) = earn_coupons.keys().chain(spend_coupons.keys()).next() {
            return Err(CheckoutError::InconsistentStoreResponse(format!("unsolicited coupon for {id}")));
        }
        Ok(batch)
    }

    /// Derive and store the new tokens. Each promotion is committed on its own; a double spend stops the loop, but
    /// tokens that were already written stay written.
    async fn commit_tokens(&mut self, response: ProviderBatchResponse, run: &mut SagaRun) -> Result<(), CheckoutError> {
        for result in response.into_results() {
            let promotion_id = result.promotion_id.clone();
            let Some(entry) = self.pending.take(&promotion_id).await else {
                run.warn(CheckoutWarning::UnmatchedResponse(promotion_id));
                continue;
            };
            let Some(target) = entry.kind.target() else {
                let message = format!("{promotion_id} reached the provider without a coupon");
                return Err(CheckoutError::Internal(message));
            };
            let (secret, commitment) = (entry.kind.secret(), entry.kind.commitment());
            let token = self
                .delegate
                .derive_new_token(&entry.snapshot, secret, commitment, target, &result.issuance)
                .map_err(|e| match e {
                    CryptoError::DoubleSpend(id) => CheckoutError::DoubleSpend(id),
                    source => CheckoutError::TokenDerivation { promotion_id: promotion_id.clone(), source },
                })?;
            self.tokens.put(&token).map_err(|e| CheckoutError::storage(&promotion_id, e))?;
            info!("Committed new token for {promotion_id}: {} -> {}", entry.snapshot.points, token.points);
            run.committed.push(token);
        }
        for promotion_id in self.pending.ids().await {
            run.warn(CheckoutWarning::MissingResponse(promotion_id));
        }
        Ok(())
    }

    /// Runs on every way out of the checkout.
    async fn clean_up(&self, run: &mut SagaRun) {
        let discarded = self.pending.clear().await;
        if discarded > 0 {
            debug!("Discarded {discarded} unfinished pending requests");
        }
        if run.paid() {
            if let Err(e) = self.delegate.discard().await {
                error!("Could not discard the paid basket: {e}");
            }
        } else if run.frozen {
            if let Err(e) = self.delegate.set_frozen(false).await {
                error!("Could not unfreeze the basket: {e}");
            }
        }
    }

    //------------------------------------------   Helpers   ----------------------------------------------------------

    fn token_snapshot(&self, promotions: &[Promotion]) -> Result<TokenSnapshot, CheckoutError> {
        let mut snapshot = TokenSnapshot::new();
        for promotion in promotions {
            let id = &promotion.promotion_id;
            if let Some(token) = self.tokens.get(id).map_err(|e| CheckoutError::storage(id, e))? {
                snapshot.insert(id.clone(), token);
            }
        }
        Ok(snapshot)
    }

    async fn current_basket_id(&self) -> Result<BasketId, CheckoutError> {
        let basket = self.delegate.current().await.map_err(CheckoutError::Basket)?;
        Ok(basket.basket_id().clone())
    }

    fn check_cancelled(&self, run: &SagaRun) -> Result<(), CheckoutError> {
        if !self.canceller.is_cancelled() {
            return Ok(());
        }
        let stage = run.stage();
        if !stage.is_cancellable() {
            warn!("Ignoring the cancellation request at {stage}. The basket has been paid, so the checkout completes");
            return Ok(());
        }
        info!("Checkout cancelled at {stage}");
        Err(CheckoutError::Cancelled)
    }
}

fn index_coupons<C, F>(coupons: Vec<C>, key: F) -> Result<HashMap<PromotionId, C>, CheckoutError>
where
    F: Fn(&C) -> &PromotionId,
{
    let mut map = HashMap::with_capacity(coupons.len());
    for coupon in coupons {
        let id = key(&coupon).clone();
        if map.insert(id.clone(), coupon).is_some() {
            return Err(CheckoutError::InconsistentStoreResponse(format!("more than one coupon for {id}")));
        }
    }
    Ok(map)
}
