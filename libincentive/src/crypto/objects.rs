//! The cryptographic objects exchanged during checkout.
//!
//! Their contents are opaque to the checkout flow, which only ever moves them between the crypto layer, the
//! pending request cache and the remote services.

use crate::ids::{BasketId, PromotionId, UpdateId};
use crate::points::PointVector;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use zeroize::Zeroizing;

/// The randomness used to blind a request. The token cannot be derived from the response without it.
///
/// The bytes are wiped from memory when the secret is dropped.
#[derive(Clone)]
pub struct RequestSecret(Zeroizing<[u8; 32]>);

impl RequestSecret {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(bytes.as_mut());
        RequestSecret(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        RequestSecret(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for RequestSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestSecret(****)")
    }
}

/// A request, together with the secret it was built with.
#[derive(Clone, Debug)]
pub struct Prepared<R> {
    pub request: R,
    pub secret: RequestSecret,
}

impl<R> Prepared<R> {
    pub fn new(request: R, secret: RequestSecret) -> Self {
        Prepared { request, secret }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub promotion_id: PromotionId,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub commitment: Vec<u8>,
}

/// Asks the store for a coupon covering whatever the basket earns. The amount is decided by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnRequest {
    pub promotion_id: PromotionId,
    pub basket_id: BasketId,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub commitment: Vec<u8>,
}

/// Asks the store to approve a relation-based update on a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRequest {
    pub promotion_id: PromotionId,
    pub basket_id: BasketId,
    pub update_id: UpdateId,
    /// The tag of the token being replaced.
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub double_spend_tag: Vec<u8>,
    /// Commitment to the new points.
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub commitment: Vec<u8>,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub proof: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnCoupon {
    pub promotion_id: PromotionId,
    pub basket_id: BasketId,
    /// The amount the store says the basket earned.
    pub amount: PointVector,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendCoupon {
    pub promotion_id: PromotionId,
    pub basket_id: BasketId,
    pub update_id: UpdateId,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEarnRequest {
    pub promotion_id: PromotionId,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub commitment: Vec<u8>,
    pub coupon: EarnCoupon,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpendRequest {
    pub promotion_id: PromotionId,
    pub update_id: UpdateId,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub double_spend_tag: Vec<u8>,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub commitment: Vec<u8>,
    pub coupon: SpendCoupon,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Issuance {
    /// A blind signature on the committed token.
    Signed(
        #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")] Vec<u8>,
    ),
    /// The provider has seen this token's double-spend tag before.
    DoubleSpendDetected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceResult {
    pub promotion_id: PromotionId,
    pub issuance: Issuance,
}

impl IssuanceResult {
    pub fn signed(promotion_id: PromotionId, signature: Vec<u8>) -> Self {
        IssuanceResult { promotion_id, issuance: Issuance::Signed(signature) }
    }

    pub fn double_spend(promotion_id: PromotionId) -> Self {
        IssuanceResult { promotion_id, issuance: Issuance::DoubleSpendDetected }
    }
}
