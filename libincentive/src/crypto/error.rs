use crate::ids::PromotionId;
use crate::points::PointsError;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("The coupon signature for promotion {0} does not verify")]
    InvalidCoupon(PromotionId),
    #[error("The coupon for promotion {0} was issued for a different request")]
    CouponMismatch(PromotionId),
    #[error("The provider's issuance for promotion {0} does not verify")]
    InvalidIssuance(PromotionId),
    #[error("The provider detected that the token for promotion {0} was already spent")]
    DoubleSpend(PromotionId),
    #[error("The update proof for promotion {0} is invalid")]
    InvalidProof(PromotionId),
    #[error("Points error: {0}")]
    Points(#[from] PointsError),
}
