//! Provisioning the first token for a promotion.
//!
//! Joining happens outside of checkout. The shopper's client commits to a fresh, zero-point token and the provider
//! signs it.

use crate::crypto::{CryptoError, IncentiveCrypto};
use crate::promotion::Promotion;
use crate::services::{ProviderService, ServiceError};
use crate::token::Token;
use log::*;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("The provider could not issue a token: {0}")]
    Service(#[from] ServiceError),
    #[error("The issued token is invalid: {0}")]
    Crypto(#[from] CryptoError),
    #[error("The provider answered for promotion {actual} instead of {expected}")]
    WrongPromotion { expected: String, actual: String },
}

pub async fn join_promotion<D>(delegate: &D, promotion: &Promotion) -> Result<Token, JoinError>
where
    D: ProviderService + IncentiveCrypto + Sync,
{
    let prepared = {
        let mut rng = rand::rng();
        delegate.build_join_request(&promotion.promotion_id, &mut rng)
    };
    let result = delegate.join(prepared.request.clone()).await?;
    if result.promotion_id != promotion.promotion_id {
        return Err(JoinError::WrongPromotion {
            expected: promotion.promotion_id.to_string(),
            actual: result.promotion_id.to_string(),
        });
    }
    let token = delegate.derive_joined_token(&prepared, promotion.dimension_count(), &result.issuance)?;
    info!("Joined promotion {}: {token}", promotion.promotion_id);
    Ok(token)
}
