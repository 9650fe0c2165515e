use crate::error::CliError;
use chrono::{DateTime, Utc};
use libincentive::basket::{Basket, LineItem};
use libincentive::checkout::CheckoutOptions;
use libincentive::crypto::DummyKeys;
use libincentive::ids::{BasketId, ItemId, PromotionId, UpdateId};
use libincentive::promotion::{ContributionRule, Promotion, Relation, SideEffect, UpdateRule};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The contents of `config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Keys for the in-process store and provider.
    pub keys: DummyKeys,
    #[serde(default)]
    pub checkout: CheckoutOptions,
    pub promotions: Vec<Promotion>,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CliError::MissingConfig(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let reader = std::io::BufReader::new(file);
        let config = serde_yml::from_reader(reader)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CliError> {
        // Create directory path if required
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_yml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn promotion(&self, promotion_id: &PromotionId) -> Option<&Promotion> {
        self.promotions.iter().find(|p| &p.promotion_id == promotion_id)
    }

    /// A configuration with the given keys and a small catalog to play with.
    pub fn sample(keys: DummyKeys) -> Self {
        AppConfig { keys, checkout: CheckoutOptions::default(), promotions: sample_promotions() }
    }
}

fn sample_promotions() -> Vec<Promotion> {
    let coffee_club = Promotion {
        promotion_id: PromotionId::new("coffee-club"),
        name: "Coffee club".into(),
        dimensions: vec!["visits".into(), "last_visit".into()],
        native_earn: false,
        contributions: vec![ContributionRule::PerItem {
            item_id: ItemId::new("coffee"),
            dimension: 0,
            points_per_unit: 1,
        }],
        rules: vec![
            UpdateRule {
                update_id: UpdateId::new("visit"),
                description: "Count today's visit towards the streak".into(),
                side_effect: None,
                relation: Relation::Streak { count: 0, last_visit: 1, interval_days: 7 },
            },
            UpdateRule {
                update_id: UpdateId::new("free-coffee"),
                description: "Five visits in a row earn a free coffee".into(),
                side_effect: Some(SideEffect::Reward {
                    reward_id: "coffee".into(),
                    description: "A free coffee".into(),
                }),
                relation: Relation::StreakRedeem { count: 0, required: 5 },
            },
        ],
        valid_until: None,
    };
    let bakery = Promotion {
        promotion_id: PromotionId::new("bakery-stars"),
        name: "Bakery stars".into(),
        dimensions: vec!["stars".into()],
        native_earn: true,
        contributions: vec![
            ContributionRule::PerItem { item_id: ItemId::new("croissant"), dimension: 0, points_per_unit: 1 },
            ContributionRule::PerItem { item_id: ItemId::new("sourdough"), dimension: 0, points_per_unit: 2 },
        ],
        rules: vec![UpdateRule {
            update_id: UpdateId::new("free-croissant"),
            description: "Swap 5 stars for a croissant".into(),
            side_effect: Some(SideEffect::Reward {
                reward_id: "croissant".into(),
                description: "A free croissant".into(),
            }),
            relation: Relation::Spend { dimension: 0, cost: 5 },
        }],
        valid_until: None,
    };
    let vip = Promotion {
        promotion_id: PromotionId::new("vip"),
        name: "VIP tier".into(),
        dimensions: vec!["spend".into()],
        native_earn: true,
        contributions: vec![ContributionRule::PerSpend { dimension: 0, cents_per_point: 100 }],
        rules: vec![UpdateRule {
            update_id: UpdateId::new("prove-vip"),
            description: "Show that you have spent at least 100 in total".into(),
            side_effect: None,
            relation: Relation::Threshold { dimension: 0, at_least: 100 },
        }],
        valid_until: None,
    };
    vec![coffee_club, bakery, vip]
}

/// A basket as described in a YAML file. Missing ids and timestamps are filled in when the basket is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketFile {
    #[serde(default)]
    pub basket_id: Option<BasketId>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    pub items: Vec<LineItem>,
}

impl BasketFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let basket = serde_yml::from_reader(reader)?;
        Ok(basket)
    }

    pub fn into_basket(self) -> Basket {
        let basket_id = self.basket_id.unwrap_or_else(|| BasketId::random(&mut rand::rng()));
        let opened_at = self.opened_at.unwrap_or_else(Utc::now);
        Basket::with_items(basket_id, opened_at, self.items)
    }
}
