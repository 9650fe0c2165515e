use crate::config::{BasketArgs, GlobalOptions};
use crate::error::CliError;
use crate::settings::{AppConfig, BasketFile};
use anyhow::Result;
use libincentive::checkout::{CheckoutOrchestrator, CheckoutReport};
use libincentive::choice::{ChoiceBook, PromotionUpdateState};
use libincentive::crypto::DummyKeys;
use libincentive::evaluator::Evaluation;
use libincentive::ids::PromotionId;
use libincentive::join::join_promotion;
use libincentive::services::DummyDelegate;
use libincentive::storage::{FileTokenStore, TokenStore};
use libincentive::token::Token;
use log::*;
use serde::Serialize;
use std::path::PathBuf;

pub type CliOrchestrator = CheckoutOrchestrator<FileTokenStore, DummyDelegate>;

/// One promotion's line in the machine-readable evaluation output.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationEntry {
    pub promotion_id: PromotionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PromotionUpdateState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn evaluation_entries(evaluation: &Evaluation) -> Vec<EvaluationEntry> {
    evaluation
        .iter()
        .map(|(promotion_id, state)| {
            let promotion_id = promotion_id.clone();
            match state {
                Ok(state) => EvaluationEntry { promotion_id, state: Some(state.clone()), error: None },
                Err(err) => EvaluationEntry { promotion_id, state: None, error: Some(err.to_string()) },
            }
        })
        .collect()
}

pub fn init(options: &GlobalOptions, force: bool) -> Result<PathBuf> {
    let path = options.config_path();
    if path.exists() && !force {
        return Err(CliError::ConfigExists(path).into());
    }
    let config = AppConfig::sample(DummyKeys::random(&mut rand::rng()));
    config.save(&path)?;
    info!("Wrote configuration with {} promotions to {}", config.promotions.len(), path.display());
    Ok(path)
}

pub fn load_config(options: &GlobalOptions) -> Result<AppConfig> {
    let path = options.config_path();
    debug!("Loading configuration from {}", path.display());
    Ok(AppConfig::load(&path)?)
}

fn token_store(options: &GlobalOptions) -> Result<FileTokenStore> {
    Ok(FileTokenStore::new(options.tokens_path())?)
}

pub async fn join(options: &GlobalOptions, promotion_id: &PromotionId) -> Result<Token> {
    let config = load_config(options)?;
    let promotion =
        config.promotion(promotion_id).ok_or_else(|| CliError::UnknownPromotion(promotion_id.to_string()))?;
    let mut store = token_store(options)?;
    if store.get(promotion_id)?.is_some() {
        return Err(CliError::AlreadyJoined(promotion_id.to_string()).into());
    }
    let delegate = DummyDelegate::new(config.keys.clone(), config.promotions.clone());
    let token = join_promotion(&delegate, promotion).await?;
    store.put(&token)?;
    info!("Joined {promotion_id}: {token}");
    Ok(token)
}

pub fn tokens(options: &GlobalOptions) -> Result<Vec<Token>> {
    let store = token_store(options)?;
    store.list()
}

async fn orchestrator(options: &GlobalOptions, config: &AppConfig, basket: &BasketArgs) -> Result<CliOrchestrator> {
    let basket = BasketFile::load(&basket.basket)?.into_basket();
    let delegate = DummyDelegate::new(config.keys.clone(), config.promotions.clone());
    debug!("Opening basket {} with {} items", basket.basket_id(), basket.items().len());
    delegate.basket.open(basket).await;
    Ok(CheckoutOrchestrator::new(token_store(options)?, delegate).with_options(config.checkout))
}

fn choice_book(args: &BasketArgs) -> ChoiceBook {
    let mut book = ChoiceBook::new();
    for (promotion_id, choice) in &args.choose {
        book.record(promotion_id.clone(), choice.clone());
    }
    book
}

pub async fn evaluate(options: &GlobalOptions, args: &BasketArgs) -> Result<Evaluation> {
    let config = load_config(options)?;
    let orchestrator = orchestrator(options, &config, args).await?;
    let evaluation = orchestrator.evaluate(&choice_book(args)).await?;
    Ok(evaluation)
}

/// Check out the basket with the requested choices. Choices the basket does not support are treated as `none` and
/// listed in the report's `coerced` field.
pub async fn checkout(options: &GlobalOptions, args: &BasketArgs) -> Result<CheckoutReport> {
    let config = load_config(options)?;
    let mut orchestrator = orchestrator(options, &config, args).await?;
    let report = orchestrator.run_checkout(&choice_book(args)).await;
    for promotion_id in &report.coerced {
        warn!("The choice for {promotion_id} is not available for this basket. The token was left unchanged.");
    }
    Ok(report)
}
