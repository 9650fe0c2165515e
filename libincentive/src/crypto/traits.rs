use crate::crypto::error::CryptoError;
use crate::crypto::objects::{
    EarnCoupon, EarnRequest, Issuance, JoinRequest, Prepared, ProviderEarnRequest, ProviderSpendRequest,
    RequestSecret, SpendCoupon, SpendRequest,
};
use crate::ids::{BasketId, PromotionId, UpdateId};
use crate::points::PointVector;
use crate::promotion::UpdateMetadata;
use crate::token::Token;
use rand::{CryptoRng, RngCore};

/// The client side of the incentive system's cryptography.
///
/// All operations are local and synchronous. Anything that needs randomness takes the RNG explicitly.
pub trait IncentiveCrypto {
    //------------------------------------------   Joining   ----------------------------------------------------------

    fn build_join_request<R: RngCore + CryptoRng>(
        &self,
        promotion_id: &PromotionId,
        rng: &mut R,
    ) -> Prepared<JoinRequest>;

    /// Turn the provider's response to a join request into the first token for the promotion, with zero points.
    fn derive_joined_token(
        &self,
        prepared: &Prepared<JoinRequest>,
        dimensions: usize,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError>;

    //------------------------------------------   Store side   -------------------------------------------------------

    fn build_earn_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        basket_id: &BasketId,
        rng: &mut R,
    ) -> Prepared<EarnRequest>;

    /// Build a request for a relation-based update that replaces `token` with a token holding `target` points.
    fn build_spend_request<R: RngCore + CryptoRng>(
        &self,
        token: &Token,
        update_id: &UpdateId,
        target: &PointVector,
        metadata: &UpdateMetadata,
        rng: &mut R,
    ) -> Result<Prepared<SpendRequest>, CryptoError>;

    /// Check the store's signature on an earn coupon and return the amount it vouches for.
    fn verify_coupon(&self, request: &EarnRequest, coupon: &EarnCoupon) -> Result<PointVector, CryptoError>;

    //------------------------------------------   Provider side   ----------------------------------------------------

    fn build_provider_earn_request(
        &self,
        request: &EarnRequest,
        coupon: EarnCoupon,
    ) -> Result<ProviderEarnRequest, CryptoError>;

    fn build_provider_spend_request(
        &self,
        request: &SpendRequest,
        coupon: SpendCoupon,
    ) -> Result<ProviderSpendRequest, CryptoError>;

    /// Unblind the provider's issuance into the replacement for `snapshot`.
    ///
    /// Returns [`CryptoError::DoubleSpend`] if the provider reported that the snapshot was already spent.
    fn derive_new_token(
        &self,
        snapshot: &Token,
        secret: &RequestSecret,
        commitment: &[u8],
        target: &PointVector,
        issuance: &Issuance,
    ) -> Result<Token, CryptoError>;
}
