use crate::ids::PromotionId;
use crate::token::Token;

/// Durable storage for the shopper's tokens. There is at most one token per promotion.
pub trait TokenStore {
    fn get(&self, promotion_id: &PromotionId) -> Result<Option<Token>, anyhow::Error>;

    /// Replace the token for `token.promotion_id` as a whole.
    fn put(&mut self, token: &Token) -> Result<(), anyhow::Error>;

    /// Every stored token, ordered by promotion id.
    fn list(&self) -> Result<Vec<Token>, anyhow::Error>;
}
