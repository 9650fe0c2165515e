use crate::ids::PromotionId;
use crate::storage::traits::TokenStore;
use crate::token::Token;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: BTreeMap<PromotionId, Token>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I: IntoIterator<Item = Token>>(tokens: I) -> Self {
        let tokens = tokens.into_iter().map(|t| (t.promotion_id.clone(), t)).collect();
        InMemoryTokenStore { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self, promotion_id: &PromotionId) -> Result<Option<Token>, anyhow::Error> {
        Ok(self.tokens.get(promotion_id).cloned())
    }

    fn put(&mut self, token: &Token) -> Result<(), anyhow::Error> {
        self.tokens.insert(token.promotion_id.clone(), token.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Token>, anyhow::Error> {
        Ok(self.tokens.values().cloned().collect())
    }
}
