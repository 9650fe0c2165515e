//! Requests awaiting a response during a checkout.
//!
//! The response to a store or provider request is not enough to derive a new token. The derivation also needs the
//! secret the request was built with, the token snapshot it was built from, and the basket-derived values that were
//! current at the time. These are parked here under the promotion id until the response arrives.

use crate::crypto::{EarnRequest, Prepared, RequestSecret, SpendRequest};
use crate::ids::{PromotionId, UpdateId};
use crate::points::PointVector;
use crate::promotion::UpdateMetadata;
use crate::token::Token;
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PendingRequestError {
    #[error("A request for promotion {0} is already pending")]
    Duplicate(PromotionId),
}

#[derive(Clone, Debug)]
pub enum PendingKind {
    /// An earn request, sent to the store. The amount is only known once the coupon arrives.
    EarnAwaitingCoupon(Prepared<EarnRequest>),
    /// An earn request whose coupon has been verified, waiting for the provider to sign `target`.
    EarnAwaitingIssuance { prepared: Prepared<EarnRequest>, target: PointVector },
    /// A relation-based update to `target`.
    Spend { update_id: UpdateId, prepared: Prepared<SpendRequest>, target: PointVector },
}

impl PendingKind {
    /// The points the new token will carry, if they are known yet.
    pub fn target(&self) -> Option<&PointVector> {
        match self {
            PendingKind::EarnAwaitingCoupon(_) => None,
            PendingKind::EarnAwaitingIssuance { target, .. } | PendingKind::Spend { target, .. } => Some(target),
        }
    }

    /// The randomness the request was built with.
    pub fn secret(&self) -> &RequestSecret {
        match self {
            PendingKind::EarnAwaitingCoupon(prepared) | PendingKind::EarnAwaitingIssuance { prepared, .. } => {
                &prepared.secret
            }
            PendingKind::Spend { prepared, .. } => &prepared.secret,
        }
    }

    pub fn commitment(&self) -> &[u8] {
        match self {
            PendingKind::EarnAwaitingCoupon(prepared) | PendingKind::EarnAwaitingIssuance { prepared, .. } => {
                &prepared.request.commitment
            }
            PendingKind::Spend { prepared, .. } => &prepared.request.commitment,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendingRequest {
    /// The token as it was when the request was built.
    pub snapshot: Token,
    pub contribution: PointVector,
    pub metadata: UpdateMetadata,
    pub kind: PendingKind,
}

/// A single-use, promotion-keyed store of [`PendingRequest`]s.
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct PendingRequestCache {
    entries: Arc<RwLock<HashMap<PromotionId, PendingRequest>>>,
    inserted: Arc<AtomicUsize>,
}

impl PendingRequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request. An existing entry for the same promotion is kept, and the new one is rejected.
    pub async fn put(&self, promotion_id: PromotionId, entry: PendingRequest) -> Result<(), PendingRequestError> {
        let mut lock = self.entries.write().await;
        if lock.contains_key(&promotion_id) {
            error!("A request for {promotion_id} is already pending. There should only be one per promotion.");
            return Err(PendingRequestError::Duplicate(promotion_id));
        }
        trace!("Parking pending request for {promotion_id}");
        lock.insert(promotion_id, entry);
        self.inserted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove and return the entry for `promotion_id`. Each entry can be taken exactly once.
    pub async fn take(&self, promotion_id: &PromotionId) -> Option<PendingRequest> {
        let mut lock = self.entries.write().await;
        let entry = lock.remove(promotion_id);
        if entry.is_some() {
            trace!("Took pending request for {promotion_id}");
        }
        entry
    }

    /// Discard every entry. Returns the number of entries discarded.
    pub async fn clear(&self) -> usize {
        let mut lock = self.entries.write().await;
        let n = lock.len();
        lock.clear();
        if n > 0 {
            debug!("Discarded {n} pending requests");
        }
        n
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, promotion_id: &PromotionId) -> bool {
        self.entries.read().await.contains_key(promotion_id)
    }

    /// The promotions with a pending request, in sorted order.
    pub async fn ids(&self) -> Vec<PromotionId> {
        let mut ids = self.entries.read().await.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// The number of entries ever inserted into this cache (or any of its clones).
    pub fn inserted(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PendingRequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequestCache").field("inserted", &self.inserted()).finish_non_exhaustive()
    }
}
