//! Tests for the checkout saga, run against the dummy services.

use crate::basket::{Basket, BasketError};
use crate::checkout::{
    CheckoutError, CheckoutOptions, CheckoutOrchestrator, CheckoutOutcome, CheckoutStage, CheckoutWarning, ErrorClass,
    ErrorCode,
};
use crate::choice::{ChoiceBook, UpdateChoice};
use crate::crypto::{
    CryptoError, EarnCoupon, EarnRequest, IncentiveCrypto, Issuance, IssuanceResult, JoinRequest, Prepared,
    ProviderEarnRequest, ProviderSpendRequest, RequestSecret, SpendCoupon, SpendRequest,
};
use crate::ids::{BasketId, ItemId, PromotionId, UpdateId};
use crate::pending::PendingRequestCache;
use crate::points::PointVector;
use crate::promotion::{Promotion, UpdateMetadata};
use crate::services::{
    BasketView, CheckoutDelegate, DummyDelegate, PromotionCatalog, ProviderBatch, ProviderBatchResponse,
    ProviderBehaviour, ProviderService, ServiceError, StoreBatch, StoreBatchResponse, StoreBehaviour, StoreService,
};
use crate::storage::{InMemoryTokenStore, TokenStore};
use crate::tests::fixtures::*;
use crate::token::Token;
use rand::{CryptoRng, RngCore};

const FULL_RUN: [CheckoutStage; 9] = [
    CheckoutStage::Idle,
    CheckoutStage::ChoicesLocked,
    CheckoutStage::StoreRequestsBuilt,
    CheckoutStage::StoreExchanged,
    CheckoutStage::Paid,
    CheckoutStage::ProviderRequestsBuilt,
    CheckoutStage::ProviderExchanged,
    CheckoutStage::TokensCommitted,
    CheckoutStage::Done,
];

fn book(choices: &[(&str, UpdateChoice)]) -> ChoiceBook {
    let mut book = ChoiceBook::new();
    for (id, choice) in choices {
        book.record(pid(id), choice.clone());
    }
    book
}

fn zkp(update_id: &str) -> UpdateChoice {
    UpdateChoice::Zkp(UpdateId::new(update_id))
}

fn all_tokens(orchestrator: &TestOrchestrator) -> Vec<Token> {
    orchestrator.token_store().list().unwrap()
}

async fn current_basket(orchestrator: &TestOrchestrator) -> Option<Basket> {
    orchestrator.delegate().basket.snapshot().await
}

/// 3 units of X earn 3 points for P1.
#[tokio::test]
async fn scenario_1_earn_points() {
    let mut orchestrator = setup(vec![p1()], vec![x(3)]).await;
    let evaluation = orchestrator.evaluate(&ChoiceBook::new()).await.unwrap();
    let state = evaluation[&pid("P1")].as_ref().unwrap();
    assert_eq!(state.choices().cloned().collect::<Vec<_>>(), vec![UpdateChoice::None, UpdateChoice::Earn]);

    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn)])).await;
    assert_eq!(report.outcome, CheckoutOutcome::Success(BasketId::new("B-test")));
    assert_eq!(report.stages, FULL_RUN.to_vec());
    assert!(report.warnings.is_empty());
    assert!(report.paid);
    assert_eq!(points_of(&orchestrator, "P1"), pv(&[3]));
    assert_eq!(report.committed_for(&pid("P1")).unwrap().points, pv(&[3]));
    // The basket is gone and nothing is left over in the cache
    assert!(current_basket(&orchestrator).await.is_none());
    assert!(orchestrator.pending_requests().is_empty().await);
    assert_eq!(orchestrator.delegate().store.calls(), 1);
    assert_eq!(orchestrator.delegate().provider.calls(), 1);
}

/// Earned points accumulate over several checkouts, and each new token can be spent later.
#[tokio::test]
async fn earned_tokens_can_be_used_again() {
    let mut orchestrator = setup(vec![p2()], vec![y(1)]).await;
    let outcome = orchestrator.start_checkout(&book(&[("P2", UpdateChoice::Earn)])).await;
    assert!(outcome.is_success());
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[2]));

    orchestrator.delegate().basket.open(basket(vec![y(2)])).await;
    let outcome = orchestrator.start_checkout(&book(&[("P2", UpdateChoice::Earn)])).await;
    assert!(outcome.is_success());
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[6]));

    orchestrator.delegate().basket.open(basket(vec![x(1)])).await;
    let outcome = orchestrator.start_checkout(&book(&[("P2", zkp("update_17"))])).await;
    assert!(outcome.is_success());
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[4]));
}

/// A choice that was valid when it was made is demoted once the basket changes.
#[tokio::test]
async fn scenario_2_removed_item_demotes_choice() {
    let mut orchestrator = setup(vec![p2()], vec![y(1)]).await;
    let before = all_tokens(&orchestrator);
    let mut choices = book(&[("P2", zkp("update_17"))]);
    let evaluation = orchestrator.evaluate(&choices).await.unwrap();
    assert_eq!(evaluation[&pid("P2")].as_ref().unwrap().selected_choice(), zkp("update_17"));

    orchestrator.delegate().basket.remove_item(&ItemId::new(ITEM_Y), 1).await.unwrap();
    let evaluation = orchestrator.evaluate(&choices).await.unwrap();
    let state = evaluation[&pid("P2")].as_ref().unwrap();
    assert_eq!(state.contribution, pv(&[0]));
    assert_eq!(state.selected_choice(), UpdateChoice::None);
    assert_eq!(state.demoted, Some(zkp("update_17")));

    // Start the checkout with the stale choices. The orchestrator must not trust them.
    let report = orchestrator.run_checkout(&choices).await;
    assert!(report.outcome.is_success());
    assert!(report.committed.is_empty());
    assert_eq!(report.coerced, vec![pid("P2")]);
    assert!(!report.visited(CheckoutStage::StoreRequestsBuilt));
    assert_eq!(all_tokens(&orchestrator), before);
    assert_eq!(orchestrator.pending_requests().inserted(), 0);

    assert_eq!(choices.reconcile(&evaluation), vec![pid("P2")]);
}

#[tokio::test]
async fn scenario_3_double_spend_is_detected() {
    let mut orchestrator = setup(vec![p2()], vec![y(1)]).await;
    let spent = orchestrator.token_store().get(&pid("P2")).unwrap().unwrap();
    let outcome = orchestrator.start_checkout(&book(&[("P2", zkp("update_17"))])).await;
    assert!(outcome.is_success());
    assert_ne!(orchestrator.token_store().get(&pid("P2")).unwrap().unwrap(), spent);

    // Restore the old token, e.g. from a backup, and try to spend it again
    orchestrator.token_store_mut().put(&spent).unwrap();
    orchestrator.delegate().basket.open(basket(vec![y(1)])).await;
    let report = orchestrator.run_checkout(&book(&[("P2", zkp("update_17"))])).await;
    assert_eq!(report.outcome, CheckoutOutcome::DoubleSpendDetected);
    assert!(report.committed.is_empty());
    assert_eq!(report.final_stage(), CheckoutStage::Aborted);
    assert_eq!(orchestrator.token_store().get(&pid("P2")).unwrap().unwrap(), spent);
    // Payment happened, so the basket is discarded all the same
    assert!(report.paid);
    assert!(current_basket(&orchestrator).await.is_none());
}

/// Commits are atomic per promotion: a double spend stops the commit loop, but earlier commits stay.
#[tokio::test]
async fn double_spend_keeps_earlier_commits() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(2), y(1)]).await;
    let spent = orchestrator.token_store().get(&pid("P2")).unwrap().unwrap();
    let outcome = orchestrator.start_checkout(&book(&[("P2", zkp("update_17"))])).await;
    assert!(outcome.is_success());
    orchestrator.token_store_mut().put(&spent).unwrap();

    orchestrator.delegate().basket.open(basket(vec![x(2), y(1)])).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", zkp("update_17"))])).await;
    assert_eq!(report.outcome, CheckoutOutcome::DoubleSpendDetected);
    assert_eq!(points_of(&orchestrator, "P1"), pv(&[2]));
    assert_eq!(report.committed.len(), 1);
    assert_eq!(orchestrator.token_store().get(&pid("P2")).unwrap().unwrap(), spent);
}

/// Nothing selected: pay and finish without touching the cache or the remote services.
#[tokio::test]
async fn scenario_4_pay_only() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(1), y(1)]).await;
    let before = all_tokens(&orchestrator);
    let report = orchestrator.run_checkout(&ChoiceBook::new()).await;
    assert!(report.outcome.is_success());
    assert_eq!(
        report.stages,
        vec![CheckoutStage::Idle, CheckoutStage::ChoicesLocked, CheckoutStage::Paid, CheckoutStage::Done]
    );
    assert_eq!(orchestrator.pending_requests().inserted(), 0);
    assert_eq!(orchestrator.delegate().store.calls(), 0);
    assert_eq!(orchestrator.delegate().provider.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(current_basket(&orchestrator).await.is_none());
}

#[tokio::test]
async fn store_failure_leaves_tokens_untouched() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(1), y(1)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().store.set_behaviour(StoreBehaviour::Unavailable).await;
    let choices = book(&[("P1", UpdateChoice::Earn), ("P2", zkp("update_17"))]);
    let report = orchestrator.run_checkout(&choices).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Network));
    assert!(!report.paid);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(orchestrator.pending_requests().is_empty().await);
    // The basket can be checked out again
    let basket = current_basket(&orchestrator).await.unwrap();
    assert!(!basket.is_frozen());
    assert!(!basket.is_paid());

    orchestrator.delegate().store.set_behaviour(StoreBehaviour::Honest).await;
    let report = orchestrator.run_checkout(&choices).await;
    assert!(report.outcome.is_success());
    assert_eq!(points_of(&orchestrator, "P1"), pv(&[1]));
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[0]));
    assert_eq!(report.committed.len(), 2);
}

#[tokio::test]
async fn payment_failure_keeps_the_basket() {
    let mut orchestrator = setup(vec![p1()], vec![x(2)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().basket.decline_payments(true);
    let choices = book(&[("P1", UpdateChoice::Earn)]);
    let report = orchestrator.run_checkout(&choices).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Payment));
    assert!(!report.visited(CheckoutStage::Paid));
    assert!(!report.visited(CheckoutStage::ProviderRequestsBuilt));
    assert_eq!(orchestrator.delegate().provider.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    let basket = current_basket(&orchestrator).await.unwrap();
    assert!(!basket.is_paid());
    assert!(!basket.is_frozen());

    orchestrator.delegate().basket.decline_payments(false);
    assert!(orchestrator.start_checkout(&choices).await.is_success());
    assert_eq!(points_of(&orchestrator, "P1"), pv(&[2]));
}

/// Once paid there is no going back: a provider outage surfaces as an error, but the basket is still discarded so
/// the shopper is never asked to pay twice.
#[tokio::test]
async fn provider_failure_after_payment() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(2), y(1)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().provider.set_behaviour(ProviderBehaviour::Unavailable).await;
    let choices = book(&[("P1", UpdateChoice::Earn), ("P2", zkp("update_17"))]);
    let report = orchestrator.run_checkout(&choices).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Network));
    assert!(report.paid);
    assert!(report.visited(CheckoutStage::ProviderRequestsBuilt));
    assert!(!report.visited(CheckoutStage::ProviderExchanged));
    assert_eq!(report.final_stage(), CheckoutStage::Aborted);
    assert!(report.committed.is_empty());
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(current_basket(&orchestrator).await.is_none());
    assert!(orchestrator.pending_requests().is_empty().await);
}

#[tokio::test]
async fn duplicate_coupons_are_rejected() {
    let mut orchestrator = setup(vec![p1()], vec![x(2)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().store.set_behaviour(StoreBehaviour::DuplicateCoupons).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn)])).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Internal));
    assert!(report.paid);
    assert_eq!(orchestrator.delegate().provider.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(current_basket(&orchestrator).await.is_none());
}

/// The store hands out a coupon for P2, which is not part of this checkout.
#[tokio::test]
async fn unsolicited_coupons_are_rejected() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(2), y(1)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().store.set_behaviour(StoreBehaviour::UnsolicitedCoupon(pid("P2"))).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn)])).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Internal));
    match &report.outcome {
        CheckoutOutcome::Error { message, .. } => assert!(message.contains("unsolicited coupon for P2"), "{message}"),
        other => panic!("Expected an error, got {other}"),
    }
    assert!(report.paid);
    assert_eq!(orchestrator.delegate().provider.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(orchestrator.pending_requests().is_empty().await);
}

/// A forged coupon fails the whole checkout, even for promotions whose coupons were fine.
#[tokio::test]
async fn invalid_coupon_aborts_everything() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(1), y(1)]).await;
    let before = all_tokens(&orchestrator);
    orchestrator.delegate().store.set_behaviour(StoreBehaviour::ForgeEarnCoupons).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", zkp("update_17"))])).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::InvalidCoupon));
    assert!(report.paid);
    assert!(!report.visited(CheckoutStage::ProviderExchanged));
    assert_eq!(orchestrator.delegate().provider.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(orchestrator.pending_requests().is_empty().await);
    // Already paid: no retry
    assert!(current_basket(&orchestrator).await.is_none());
}

#[tokio::test]
async fn missing_coupon_is_a_protocol_error() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(1), y(1)]).await;
    orchestrator.delegate().store.set_behaviour(StoreBehaviour::OmitCoupon(pid("P2"))).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", zkp("update_17"))])).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Internal));
    assert!(report.committed.is_empty());
    assert!(orchestrator.pending_requests().is_empty().await);
}

#[tokio::test]
async fn missing_provider_result_is_a_warning() {
    let mut orchestrator = setup(vec![p1(), p2()], vec![x(1), y(1)]).await;
    orchestrator.delegate().provider.set_behaviour(ProviderBehaviour::DropResult(pid("P1"))).await;
    let before = orchestrator.token_store().get(&pid("P1")).unwrap();
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", UpdateChoice::Earn)])).await;
    assert!(report.outcome.is_success());
    assert_eq!(report.warnings, vec![CheckoutWarning::MissingResponse(pid("P1"))]);
    assert_eq!(orchestrator.token_store().get(&pid("P1")).unwrap(), before);
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[2]));
    assert!(orchestrator.pending_requests().is_empty().await);
}

#[tokio::test]
async fn update_with_two_outcomes_is_rejected() {
    let mut orchestrator = setup(vec![ambiguous()], vec![x(1)]).await;
    set_points(&mut orchestrator, "AMB", &[5]);
    let choices = book(&[("AMB", zkp("either"))]);
    let evaluation = orchestrator.evaluate(&choices).await.unwrap();
    assert_eq!(evaluation[&pid("AMB")].as_ref().unwrap().selected_choice(), zkp("either"));

    let report = orchestrator.run_checkout(&choices).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::AmbiguousUpdate));
    assert!(!report.paid);
    assert_eq!(orchestrator.delegate().store.calls(), 0);
    assert_eq!(points_of(&orchestrator, "AMB"), pv(&[5]));
    assert!(!current_basket(&orchestrator).await.unwrap().is_frozen());
}

/// Several promotions with different kinds of update, settled in one store call and one provider call.
#[tokio::test]
async fn mixed_updates_share_one_batch() {
    let mut orchestrator = setup(vec![p1(), p2(), vip(), streak()], vec![x(2), y(1), coffee(1)]).await;
    set_points(&mut orchestrator, "P2", &[1]);
    set_points(&mut orchestrator, "VIP", &[150]);
    set_points(&mut orchestrator, "STREAK", &[3, 19_998]);
    let choices = book(&[
        ("P1", UpdateChoice::Earn),
        ("P2", zkp("update_17")),
        ("VIP", zkp("prove-vip")),
        ("STREAK", zkp("visit")),
    ]);
    let report = orchestrator.run_checkout(&choices).await;
    assert!(report.outcome.is_success(), "{}", report.outcome);
    assert_eq!(report.committed.len(), 4);
    assert_eq!(orchestrator.delegate().store.calls(), 1);
    assert_eq!(orchestrator.delegate().provider.calls(), 1);
    assert_eq!(points_of(&orchestrator, "P1"), pv(&[2]));
    assert_eq!(points_of(&orchestrator, "P2"), pv(&[1]));
    // 12.50 spent
    assert_eq!(points_of(&orchestrator, "VIP"), pv(&[162]));
    assert_eq!(points_of(&orchestrator, "STREAK"), pv(&[4, 20_000]));
    assert_eq!(orchestrator.delegate().provider.spent_count().await, 3);
}

#[tokio::test]
async fn cancelled_before_payment() {
    let mut orchestrator = setup(vec![p1()], vec![x(1)]).await;
    let before = all_tokens(&orchestrator);
    let choices = book(&[("P1", UpdateChoice::Earn)]);
    orchestrator.canceller().cancel();
    let report = orchestrator.run_checkout(&choices).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Cancelled));
    assert_eq!(report.stages, vec![CheckoutStage::Idle, CheckoutStage::ChoicesLocked, CheckoutStage::Aborted]);
    assert_eq!(orchestrator.delegate().store.calls(), 0);
    assert_eq!(all_tokens(&orchestrator), before);
    assert!(!current_basket(&orchestrator).await.unwrap().is_frozen());
    // The cancellation applied to that attempt only
    assert!(!orchestrator.canceller().is_cancelled());
    assert!(orchestrator.start_checkout(&choices).await.is_success());
}

#[tokio::test]
async fn checkout_is_locked_by_basket_flags() {
    let mut orchestrator = setup(vec![p1()], vec![x(1)]).await;
    orchestrator.delegate().basket.set_frozen(true).await.unwrap();
    let outcome = orchestrator.start_checkout(&ChoiceBook::new()).await;
    assert_eq!(outcome.error_code(), Some(ErrorCode::InProgress));
    // The other checkout's freeze is left alone
    assert!(current_basket(&orchestrator).await.unwrap().is_frozen());

    orchestrator.delegate().basket.set_frozen(false).await.unwrap();
    orchestrator.delegate().basket.mark_paid().await.unwrap();
    let outcome = orchestrator.start_checkout(&ChoiceBook::new()).await;
    assert_eq!(outcome.error_code(), Some(ErrorCode::AlreadyPaid));
    assert_eq!(orchestrator.pending_requests().inserted(), 0);
}

#[tokio::test]
async fn frozen_basket_cannot_be_modified() {
    let orchestrator = setup(vec![p1()], vec![x(1)]).await;
    let basket = &orchestrator.delegate().basket;
    basket.set_frozen(true).await.unwrap();
    let err = basket.add_item(x(1)).await.unwrap_err();
    assert_eq!(err, ServiceError::Basket(BasketError::Frozen));
}

#[tokio::test]
async fn promotions_without_tokens_are_skipped() {
    let delegate = DummyDelegate::new(Default::default(), vec![p1()]);
    delegate.basket.open(basket(vec![x(3)])).await;
    let mut orchestrator = CheckoutOrchestrator::new(InMemoryTokenStore::new(), delegate);
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn)])).await;
    // No token means no participation, so this is a plain payment
    assert!(report.outcome.is_success());
    assert!(report.committed.is_empty());
    assert!(orchestrator.token_store().is_empty());
}

#[test]
fn error_taxonomy() {
    assert_eq!(CheckoutError::Cancelled.class(), ErrorClass::Validation);
    assert_eq!(CheckoutError::StoreExchange(ServiceError::Unavailable("x".into())).class(), ErrorClass::Transport);
    let source = CryptoError::InvalidCoupon(pid("P1"));
    let invalid = CheckoutError::InvalidCoupon { promotion_id: pid("P1"), source };
    assert_eq!(invalid.class(), ErrorClass::ProtocolIntegrity);
    assert_eq!(CheckoutError::DoubleSpend(pid("P1")).class(), ErrorClass::DoubleSpend);
    assert_eq!(CheckoutOutcome::from(&CheckoutError::DoubleSpend(pid("P1"))), CheckoutOutcome::DoubleSpendDetected);
    assert_eq!(ErrorCode::AmbiguousUpdate.to_string(), "ambiguous_update");
}

//------------------------------------   Delegates that get in the way   ----------------------------------------------

/// Forwards everything to the dummy services.
///
/// With `lose` set, that promotion's entry is taken out of the pending request cache just before the provider
/// exchange, as if it had been lost. With `yield_on_basket` set, every basket read and freeze hands control back to
/// the runtime, so that checkouts running side by side interleave.
#[derive(Clone)]
struct MeddlingDelegate {
    inner: DummyDelegate,
    cache: PendingRequestCache,
    lose: Option<PromotionId>,
    yield_on_basket: bool,
}

impl MeddlingDelegate {
    async fn pause(&self) {
        if self.yield_on_basket {
            tokio::task::yield_now().await;
        }
    }
}

impl PromotionCatalog for MeddlingDelegate {
    async fn active_promotions(&self) -> Result<Vec<Promotion>, ServiceError> {
        self.inner.active_promotions().await
    }
}

impl BasketView for MeddlingDelegate {
    async fn current(&self) -> Result<Basket, ServiceError> {
        let basket = self.inner.current().await;
        self.pause().await;
        basket
    }

    async fn try_freeze(&self) -> Result<Basket, ServiceError> {
        let basket = self.inner.try_freeze().await;
        self.pause().await;
        basket
    }

    async fn set_frozen(&self, frozen: bool) -> Result<(), ServiceError> {
        self.inner.set_frozen(frozen).await
    }

    async fn mark_paid(&self) -> Result<(), ServiceError> {
        self.inner.mark_paid().await
    }

    async fn discard(&self) -> Result<(), ServiceError> {
        self.inner.discard().await
    }
}

impl StoreService for MeddlingDelegate {
    async fn batch_request(&self, batch: StoreBatch) -> Result<StoreBatchResponse, ServiceError> {
        StoreService::batch_request(&self.inner, batch).await
    }
}

impl ProviderService for MeddlingDelegate {
    async fn batch_request(&self, batch: ProviderBatch) -> Result<ProviderBatchResponse, ServiceError> {
        if let Some(lose) = &self.lose {
            let lost = self.cache.take(lose).await;
            assert!(lost.is_some(), "the entry to lose should be pending");
        }
        ProviderService::batch_request(&self.inner, batch).await
    }

    async fn join(&self, request: JoinRequest) -> Result<IssuanceResult, ServiceError> {
        self.inner.join(request).await
    }
}

impl IncentiveCrypto for MeddlingDelegate {
    fn build_join_request<R: RngCore + CryptoRng>(&self, id: &PromotionId, rng: &mut R) -> Prepared<JoinRequest> {
        self.inner.build_join_request(id, rng)
    }

    fn derive_joined_token(
        &self,
        prepared: &Prepared<JoinRequest>,
        dimensions: usize,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        self.inner.derive_joined_token(prepared, dimensions, issuance)
    }

    fn build_earn_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        basket_id: &BasketId,
        rng: &mut R,
    ) -> Prepared<EarnRequest> {
        self.inner.build_earn_request(token, basket_id, rng)
    }

    fn build_spend_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        update_id: &UpdateId,
        target: &PointVector,
        metadata: &UpdateMetadata,
        rng: &mut R,
    ) -> Result<Prepared<SpendRequest>, CryptoError> {
        self.inner.build_spend_request(token, update_id, target, metadata, rng)
    }

    fn verify_coupon(&self, request: &EarnRequest, coupon: &EarnCoupon) -> Result<PointVector, CryptoError> {
        self.inner.verify_coupon(request, coupon)
    }

    fn build_provider_earn_request(
        &self,
        request: &EarnRequest,
        coupon: EarnCoupon,
    ) -> Result<ProviderEarnRequest, CryptoError> {
        self.inner.build_provider_earn_request(request, coupon)
    }

    fn build_provider_spend_request(
        &self,
        request: &SpendRequest,
        coupon: SpendCoupon,
    ) -> Result<ProviderSpendRequest, CryptoError> {
        self.inner.build_provider_spend_request(request, coupon)
    }

    fn derive_new_token(
        &self,
        snapshot: &Token,
        secret: &RequestSecret,
        commitment: &[u8],
        target: &PointVector,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        self.inner.derive_new_token(snapshot, secret, commitment, target, issuance)
    }
}

impl CheckoutDelegate for MeddlingDelegate {}

type MeddlingOrchestrator = CheckoutOrchestrator<InMemoryTokenStore, MeddlingDelegate>;

async fn losing_setup(options: CheckoutOptions) -> MeddlingOrchestrator {
    let plain = setup(vec![p1(), p2()], vec![x(3), y(1)]).await;
    let inner = plain.delegate().clone();
    let tokens = plain.into_token_store();
    let cache = PendingRequestCache::new();
    let delegate = MeddlingDelegate { inner, cache: cache.clone(), lose: Some(pid("P2")), yield_on_basket: false };
    CheckoutOrchestrator::new(tokens, delegate).with_pending_cache(cache).with_options(options)
}

/// The provider answers for P1 and P2, but only P1 still has a pending request. P1 is committed, P2 is left alone,
/// and the checkout reports a warning instead of failing.
#[tokio::test]
async fn lost_cache_entry_commits_the_rest() {
    let mut orchestrator = losing_setup(CheckoutOptions::default()).await;
    let p2_before = orchestrator.token_store().get(&pid("P2")).unwrap();
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", UpdateChoice::Earn)])).await;
    assert!(report.outcome.is_success());
    assert_eq!(report.warnings, vec![CheckoutWarning::UnmatchedResponse(pid("P2"))]);
    assert_eq!(report.stages, FULL_RUN.to_vec());
    let store = orchestrator.token_store();
    assert_eq!(store.get(&pid("P1")).unwrap().unwrap().points, pv(&[3]));
    assert_eq!(store.get(&pid("P2")).unwrap(), p2_before);
}

#[tokio::test]
async fn lost_cache_entry_fails_strict_checkouts() {
    let mut orchestrator = losing_setup(CheckoutOptions { strict_consistency: true }).await;
    let report = orchestrator.run_checkout(&book(&[("P1", UpdateChoice::Earn), ("P2", UpdateChoice::Earn)])).await;
    assert_eq!(report.outcome.error_code(), Some(ErrorCode::Internal));
    // Matched tokens are committed regardless
    assert_eq!(orchestrator.token_store().get(&pid("P1")).unwrap().unwrap().points, pv(&[3]));
    assert!(report.paid);
    assert!(orchestrator.delegate().inner.basket.snapshot().await.is_none());
}

/// Two tills start a checkout of the same basket at the same time. Exactly one of them gets to freeze it; the other
/// is turned away before it sends anything to the store.
#[tokio::test]
async fn concurrent_checkouts_of_one_basket() {
    let plain = setup(vec![p1()], vec![x(3)]).await;
    let inner = plain.delegate().clone();
    let tokens = plain.into_token_store();
    let delegate = MeddlingDelegate { inner, cache: PendingRequestCache::new(), lose: None, yield_on_basket: true };
    let mut first = CheckoutOrchestrator::new(tokens.clone(), delegate.clone());
    let mut second = CheckoutOrchestrator::new(tokens, delegate.clone());
    let choices = book(&[("P1", UpdateChoice::Earn)]);

    let (a, b) = tokio::join!(first.run_checkout(&choices), second.run_checkout(&choices));
    let (won, lost) = if a.outcome.is_success() { (a, b) } else { (b, a) };
    assert!(won.outcome.is_success(), "Expected one checkout to succeed, got {}", won.outcome);
    assert_eq!(won.stages, FULL_RUN.to_vec());
    assert_eq!(lost.outcome.error_code(), Some(ErrorCode::InProgress));
    assert_eq!(lost.stages, vec![CheckoutStage::Idle, CheckoutStage::Aborted]);
    assert!(!lost.paid);
    assert_eq!(delegate.inner.store.calls(), 1);
    assert_eq!(delegate.inner.provider.calls(), 1);
}
