//! A stand-in for the incentive system's cryptography.
//!
//! Signatures and commitments are keyed Blake2b hashes. Both keys are known to every party, so this offers no
//! security whatsoever, but every object is bound to the values it would be bound to in the real protocol. A coupon
//! for one basket does not verify for another, a token cannot be derived without the request secret, and so on.

use crate::crypto::error::CryptoError;
use crate::crypto::objects::{
    EarnCoupon, EarnRequest, Issuance, JoinRequest, Prepared, ProviderEarnRequest, ProviderSpendRequest,
    RequestSecret, SpendCoupon, SpendRequest,
};
use crate::crypto::traits::IncentiveCrypto;
use crate::ids::{BasketId, PromotionId, UpdateId};
use crate::points::{PointVector, PointsError};
use crate::promotion::UpdateMetadata;
use crate::token::Token;
use blake2::{Blake2b512, Digest};
use log::*;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DummyKeys {
    #[serde(serialize_with = "crate::helpers::array_to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub store_key: [u8; 32],
    #[serde(serialize_with = "crate::helpers::array_to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub provider_key: [u8; 32],
}

impl DummyKeys {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut store_key = [0u8; 32];
        let mut provider_key = [0u8; 32];
        rng.fill_bytes(&mut store_key);
        rng.fill_bytes(&mut provider_key);
        DummyKeys { store_key, provider_key }
    }
}

impl Default for DummyKeys {
    fn default() -> Self {
        DummyKeys { store_key: [1u8; 32], provider_key: [2u8; 32] }
    }
}

impl std::fmt::Debug for DummyKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyKeys").finish_non_exhaustive()
    }
}

impl Drop for DummyKeys {
    fn drop(&mut self) {
        self.store_key.zeroize();
        self.provider_key.zeroize();
    }
}

fn hash(domain: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Blake2b512::new().chain_update(domain);
    for part in parts {
        hasher = hasher.chain_update((part.len() as u64).to_le_bytes()).chain_update(part);
    }
    hasher.finalize().to_vec()
}

#[derive(Clone, Debug, Default)]
pub struct DummyCrypto {
    keys: DummyKeys,
}

impl DummyCrypto {
    pub fn new(keys: DummyKeys) -> Self {
        DummyCrypto { keys }
    }

    pub fn keys(&self) -> &DummyKeys {
        &self.keys
    }

    //-------------------------------------   Store and provider operations   -----------------------------------------
    // The remote services are simulated in-process, and use these to produce and check signatures.

    pub fn sign_earn_coupon(
        &self,
        promotion_id: &PromotionId,
        basket_id: &BasketId,
        amount: &PointVector,
        commitment: &[u8],
    ) -> Vec<u8> {
        hash(
            b"earn-coupon",
            &[&self.keys.store_key, promotion_id.as_bytes(), basket_id.as_bytes(), &amount.to_le_bytes(), commitment],
        )
    }

    pub fn sign_spend_coupon(&self, request: &SpendRequest) -> Vec<u8> {
        hash(
            b"spend-coupon",
            &[
                &self.keys.store_key,
                request.promotion_id.as_bytes(),
                request.basket_id.as_bytes(),
                request.update_id.as_bytes(),
                &request.commitment,
                &request.double_spend_tag,
            ],
        )
    }

    pub fn check_spend_proof(&self, request: &SpendRequest) -> Result<(), CryptoError> {
        let expected = spend_proof(
            &request.promotion_id,
            &request.update_id,
            &request.basket_id,
            &request.double_spend_tag,
            &request.commitment,
        );
        if expected != request.proof {
            return Err(CryptoError::InvalidProof(request.promotion_id.clone()));
        }
        Ok(())
    }

    /// Check a coupon presented to the provider.
    pub fn check_provider_earn_request(&self, request: &ProviderEarnRequest) -> Result<(), CryptoError> {
        let coupon = &request.coupon;
        let expected =
            self.sign_earn_coupon(&coupon.promotion_id, &coupon.basket_id, &coupon.amount, &request.commitment);
        if coupon.promotion_id != request.promotion_id || expected != coupon.signature {
            return Err(CryptoError::InvalidCoupon(request.promotion_id.clone()));
        }
        Ok(())
    }

    pub fn check_provider_spend_request(&self, request: &ProviderSpendRequest) -> Result<(), CryptoError> {
        let coupon = &request.coupon;
        let expected = hash(
            b"spend-coupon",
            &[
                &self.keys.store_key,
                coupon.promotion_id.as_bytes(),
                coupon.basket_id.as_bytes(),
                coupon.update_id.as_bytes(),
                &request.commitment,
                &request.double_spend_tag,
            ],
        );
        if coupon.promotion_id != request.promotion_id || expected != coupon.signature {
            return Err(CryptoError::InvalidCoupon(request.promotion_id.clone()));
        }
        Ok(())
    }

    pub fn issue(&self, promotion_id: &PromotionId, commitment: &[u8]) -> Vec<u8> {
        hash(b"issue", &[&self.keys.provider_key, promotion_id.as_bytes(), commitment])
    }

    //-------------------------------------             Helpers              -----------------------------------------

    fn unblind(
        &self,
        promotion_id: &PromotionId,
        secret: &RequestSecret,
        commitment: &[u8],
        points: PointVector,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        let signature = match issuance {
            Issuance::Signed(signature) => signature,
            Issuance::DoubleSpendDetected => return Err(CryptoError::DoubleSpend(promotion_id.clone())),
        };
        if *signature != self.issue(promotion_id, commitment) {
            return Err(CryptoError::InvalidIssuance(promotion_id.clone()));
        }
        let credential = hash(b"credential", &[signature, secret.as_bytes(), &points.to_le_bytes()]);
        let double_spend_tag = hash(b"dstag", &[&credential]);
        Ok(Token::new(promotion_id.clone(), points, credential, double_spend_tag))
    }
}

fn spend_proof(
    promotion_id: &PromotionId,
    update_id: &UpdateId,
    basket_id: &BasketId,
    double_spend_tag: &[u8],
    commitment: &[u8],
) -> Vec<u8> {
    hash(
        b"proof",
        &[promotion_id.as_bytes(), update_id.as_bytes(), basket_id.as_bytes(), double_spend_tag, commitment],
    )
}

impl IncentiveCrypto for DummyCrypto {
    fn build_join_request<R: RngCore + CryptoRng>(
        &self,
        promotion_id: &PromotionId,
        rng: &mut R,
    ) -> Prepared<JoinRequest> {
        let secret = RequestSecret::random(rng);
        let commitment = hash(b"join-commit", &[promotion_id.as_bytes(), secret.as_bytes()]);
        Prepared::new(JoinRequest { promotion_id: promotion_id.clone(), commitment }, secret)
    }

    fn derive_joined_token(
        &self,
        prepared: &Prepared<JoinRequest>,
        dimensions: usize,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        let request = &prepared.request;
        let zeros = PointVector::zeros(dimensions);
        self.unblind(&request.promotion_id, &prepared.secret, &request.commitment, zeros, issuance)
    }

    fn build_earn_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        basket_id: &BasketId,
        rng: &mut R,
    ) -> Prepared<EarnRequest> {
        let secret = RequestSecret::random(rng);
        let commitment =
            hash(b"earn-commit", &[token.promotion_id.as_bytes(), &token.credential, secret.as_bytes()]);
        trace!("Built earn request for {} on basket {basket_id}", token.promotion_id);
        let request =
            EarnRequest { promotion_id: token.promotion_id.clone(), basket_id: basket_id.clone(), commitment };
        Prepared::new(request, secret)
    }

    fn build_spend_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        update_id: &UpdateId,
        target: &PointVector,
        metadata: &UpdateMetadata,
        rng: &mut R,
    ) -> Result<Prepared<SpendRequest>, CryptoError> {
        if target.dimensions() != token.points.dimensions() {
            return Err(PointsError::DimensionMismatch {
                expected: token.points.dimensions(),
                actual: target.dimensions(),
            }
            .into());
        }
        let secret = RequestSecret::random(rng);
        let promotion_id = &token.promotion_id;
        let commitment = hash(b"spend-commit", &[promotion_id.as_bytes(), &target.to_le_bytes(), secret.as_bytes()]);
        let proof =
            spend_proof(promotion_id, update_id, &metadata.basket_id, &token.double_spend_tag, &commitment);
        trace!("Built spend request for {promotion_id}/{update_id} on basket {}", metadata.basket_id);
        let request = SpendRequest {
            promotion_id: promotion_id.clone(),
            basket_id: metadata.basket_id.clone(),
            update_id: update_id.clone(),
            double_spend_tag: token.double_spend_tag.clone(),
            commitment,
            proof,
        };
        Ok(Prepared::new(request, secret))
    }

    fn verify_coupon(&self, request: &EarnRequest, coupon: &EarnCoupon) -> Result<PointVector, CryptoError> {
        if coupon.promotion_id != request.promotion_id || coupon.basket_id != request.basket_id {
            return Err(CryptoError::CouponMismatch(request.promotion_id.clone()));
        }
        let expected =
            self.sign_earn_coupon(&coupon.promotion_id, &coupon.basket_id, &coupon.amount, &request.commitment);
        if expected != coupon.signature {
            warn!("Earn coupon for {} failed verification", request.promotion_id);
            return Err(CryptoError::InvalidCoupon(request.promotion_id.clone()));
        }
        Ok(coupon.amount.clone())
    }

    fn build_provider_earn_request(
        &self,
        request: &EarnRequest,
        coupon: EarnCoupon,
    ) -> Result<ProviderEarnRequest, CryptoError> {
        if coupon.promotion_id != request.promotion_id {
            return Err(CryptoError::CouponMismatch(request.promotion_id.clone()));
        }
        Ok(ProviderEarnRequest {
            promotion_id: request.promotion_id.clone(),
            commitment: request.commitment.clone(),
            coupon,
        })
    }

    fn build_provider_spend_request(
        &self,
        request: &SpendRequest,
        coupon: SpendCoupon,
    ) -> Result<ProviderSpendRequest, CryptoError> {
        if coupon.promotion_id != request.promotion_id
            || coupon.basket_id != request.basket_id
            || coupon.update_id != request.update_id
        {
            return Err(CryptoError::CouponMismatch(request.promotion_id.clone()));
        }
        Ok(ProviderSpendRequest {
            promotion_id: request.promotion_id.clone(),
            update_id: request.update_id.clone(),
            double_spend_tag: request.double_spend_tag.clone(),
            commitment: request.commitment.clone(),
            coupon,
        })
    }

    fn derive_new_token(
        &self,
        snapshot: &Token,
        secret: &RequestSecret,
        commitment: &[u8],
        target: &PointVector,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError> {
        if target.dimensions() != snapshot.points.dimensions() {
            return Err(PointsError::DimensionMismatch {
                expected: snapshot.points.dimensions(),
                actual: target.dimensions(),
            }
            .into());
        }
        self.unblind(&snapshot.promotion_id, secret, commitment, target.clone(), issuance)
    }
}
