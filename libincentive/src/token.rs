use crate::helpers::short_hex;
use crate::ids::PromotionId;
use crate::points::PointVector;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A shopper's point balance for one promotion, bound to a credential issued by the provider.
///
/// Tokens are replaced as a whole, never mutated in place. The credential and double-spend tag are opaque to this
/// crate; only the cryptographic layer interprets them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub promotion_id: PromotionId,
    pub points: PointVector,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub credential: Vec<u8>,
    /// Revealed when the token is spent, so that the provider can detect a second spend of the same token.
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::from_hex")]
    pub double_spend_tag: Vec<u8>,
}

impl Token {
    pub fn new(promotion_id: PromotionId, points: PointVector, credential: Vec<u8>, double_spend_tag: Vec<u8>) -> Self {
        Token { promotion_id, points, credential, double_spend_tag }
    }

    /// A short identifier for the credential, suitable for logs.
    pub fn fingerprint(&self) -> String {
        short_hex(&self.credential)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.promotion_id, self.points, self.fingerprint())
    }
}
