//! A self-contained shop for the acceptance tests: a promotion catalog, an in-process store and provider, one basket
//! and the shopper's tokens, wired to a checkout orchestrator.

use anyhow::{anyhow, Result};
use libincentive::basket::{Basket, LineItem};
use libincentive::checkout::{CheckoutOrchestrator, CheckoutReport};
use libincentive::choice::{ChoiceBook, UpdateChoice};
use libincentive::crypto::DummyKeys;
use libincentive::evaluator::Evaluation;
use libincentive::ids::{ItemId, PromotionId, UpdateId};
use libincentive::join::join_promotion;
use libincentive::promotion::{ContributionRule, Promotion, Relation, SideEffect, UpdateRule};
use libincentive::services::{BasketView, DummyDelegate};
use libincentive::storage::{InMemoryTokenStore, TokenStore};
use libincentive::token::Token;
use log::*;
use std::collections::HashMap;

pub type ShopOrchestrator = CheckoutOrchestrator<InMemoryTokenStore, DummyDelegate>;

/// The promotions the feature files can refer to by id.
pub fn promotion(promotion_id: &str) -> Option<Promotion> {
    let per_item = |item: &str, points_per_unit| ContributionRule::PerItem {
        item_id: ItemId::new(item),
        dimension: 0,
        points_per_unit,
    };
    let promotion = match promotion_id {
        "P1" => Promotion {
            promotion_id: PromotionId::new("P1"),
            name: "A point for every X".into(),
            dimensions: vec!["points".into()],
            native_earn: true,
            contributions: vec![per_item("x", 1)],
            rules: vec![],
            valid_until: None,
        },
        "P2" => Promotion {
            promotion_id: PromotionId::new("P2"),
            name: "Stars for Y".into(),
            dimensions: vec!["stars".into()],
            native_earn: true,
            contributions: vec![per_item("y", 2)],
            rules: vec![UpdateRule {
                update_id: UpdateId::new("update_17"),
                description: "Redeem two stars for a free Y".into(),
                side_effect: Some(SideEffect::Reward { reward_id: "free-y".into(), description: "A free Y".into() }),
                relation: Relation::Spend { dimension: 0, cost: 2 },
            }],
            valid_until: None,
        },
        _ => return None,
    };
    Some(promotion)
}

pub fn line_item(item_id: &str, quantity: u32) -> LineItem {
    LineItem::new(item_id, format!("Item {item_id}"), 300, quantity)
}

pub struct Shop {
    orchestrator: ShopOrchestrator,
    choices: ChoiceBook,
    backups: HashMap<PromotionId, Token>,
    last_report: Option<CheckoutReport>,
}

impl std::fmt::Debug for Shop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shop")
            .field("choices", &self.choices)
            .field("last_report", &self.last_report)
            .finish_non_exhaustive()
    }
}

impl Shop {
    /// Open a shop running the promotions with the given ids, with an empty basket ready for scanning.
    pub async fn open(promotion_ids: &[&str]) -> Result<Self> {
        let promotions = promotion_ids
            .iter()
            .map(|id| promotion(id).ok_or_else(|| anyhow!("No promotion called {id}")))
            .collect::<Result<Vec<_>>>()?;
        let delegate = DummyDelegate::new(DummyKeys::default(), promotions);
        let basket_id = delegate.basket.open_new().await;
        info!("Shop open. Basket {basket_id} is ready");
        let orchestrator = CheckoutOrchestrator::new(InMemoryTokenStore::new(), delegate);
        Ok(Shop { orchestrator, choices: ChoiceBook::new(), backups: HashMap::new(), last_report: None })
    }

    pub fn orchestrator(&self) -> &ShopOrchestrator {
        &self.orchestrator
    }

    pub fn delegate(&self) -> &DummyDelegate {
        self.orchestrator.delegate()
    }

    pub async fn join(&mut self, promotion_id: &str) -> Result<Token> {
        let promotion = promotion(promotion_id).ok_or_else(|| anyhow!("No promotion called {promotion_id}"))?;
        let token = join_promotion(self.orchestrator.delegate(), &promotion).await?;
        self.orchestrator.token_store_mut().put(&token)?;
        Ok(token)
    }

    pub async fn new_basket(&mut self) {
        let basket_id = self.delegate().basket.open_new().await;
        self.choices.clear();
        debug!("Started basket {basket_id}");
    }

    pub async fn scan(&self, item_id: &str, quantity: u32) -> Result<()> {
        self.delegate().basket.add_item(line_item(item_id, quantity)).await?;
        Ok(())
    }

    pub async fn remove(&self, item_id: &str, quantity: u32) -> Result<()> {
        self.delegate().basket.remove_item(&ItemId::new(item_id), quantity).await?;
        Ok(())
    }

    pub fn choose(&mut self, promotion_id: &str, choice: UpdateChoice) {
        self.choices.record(PromotionId::new(promotion_id), choice);
    }

    pub fn choice(&self, promotion_id: &str) -> UpdateChoice {
        self.choices.get(&PromotionId::new(promotion_id))
    }

    /// Evaluate the basket and drop any recorded choice that is no longer feasible, as a till UI would.
    pub async fn refresh(&mut self) -> Result<Evaluation> {
        let evaluation = self.orchestrator.evaluate(&self.choices).await?;
        let demoted = self.choices.reconcile(&evaluation);
        if !demoted.is_empty() {
            info!("Choices reset for {demoted:?}");
        }
        Ok(evaluation)
    }

    pub async fn checkout(&mut self) -> &CheckoutReport {
        let report = self.orchestrator.run_checkout(&self.choices).await;
        info!("Checkout finished: {}", report.outcome);
        self.last_report.insert(report)
    }

    pub fn last_report(&self) -> Option<&CheckoutReport> {
        self.last_report.as_ref()
    }

    pub fn token(&self, promotion_id: &str) -> Result<Token> {
        self.orchestrator
            .token_store()
            .get(&PromotionId::new(promotion_id))?
            .ok_or_else(|| anyhow!("The shopper has no token for {promotion_id}"))
    }

    pub fn back_up(&mut self, promotion_id: &str) -> Result<()> {
        let token = self.token(promotion_id)?;
        self.backups.insert(token.promotion_id.clone(), token);
        Ok(())
    }

    pub fn backup(&self, promotion_id: &str) -> Option<&Token> {
        self.backups.get(&PromotionId::new(promotion_id))
    }

    /// Put a backed-up token back in the store, replacing the current one.
    pub fn restore(&mut self, promotion_id: &str) -> Result<()> {
        let token = self.backup(promotion_id).cloned().ok_or_else(|| anyhow!("No backup for {promotion_id}"))?;
        self.orchestrator.token_store_mut().put(&token)?;
        Ok(())
    }

    pub async fn basket(&self) -> Result<Basket> {
        Ok(self.delegate().current().await?)
    }
}
