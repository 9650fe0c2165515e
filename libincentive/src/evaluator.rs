//! The update-feasibility evaluator.
//!
//! Given the active promotions, the shopper's tokens, the basket, and the choices recorded so far, work out what the
//! shopper can do with each promotion right now. Evaluation is pure: it reads its inputs and returns a fresh
//! [`Evaluation`], so it can be re-run every time the basket or the tokens change.
//!
//! Failures are isolated per promotion. A promotion without a token, or whose rules fail to evaluate, is reported
//! as an error in its own slot and does not affect any other promotion.

use crate::basket::Basket;
use crate::choice::{ChoiceStatus, FeasibleUpdate, PromotionUpdateState, UpdateChoice};
use crate::ids::PromotionId;
use crate::promotion::{Promotion, PromotionError, SideEffect, UpdateMetadata};
use crate::token::Token;
use log::*;
use std::collections::BTreeMap;
use thiserror::Error;

/// The shopper's tokens, keyed by promotion.
pub type TokenSnapshot = BTreeMap<PromotionId, Token>;

/// The result of evaluating every active promotion.
pub type Evaluation = BTreeMap<PromotionId, Result<PromotionUpdateState, EvaluationError>>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("There is no token for promotion {0}. Tokens are provisioned when joining a promotion.")]
    MissingToken(PromotionId),
    #[error("The token for promotion {promotion_id} has {actual} dimensions, but the promotion defines {expected}")]
    TokenShape { promotion_id: PromotionId, expected: usize, actual: usize },
    #[error("{0}")]
    Promotion(#[from] PromotionError),
}

pub const EARN_DESCRIPTION: &str = "Collect the points for this basket";
pub const NONE_DESCRIPTION: &str = "Leave the token unchanged";

/// Evaluate every promotion. See the [module documentation](self) for the failure semantics.
pub fn evaluate(
    promotions: &[Promotion],
    tokens: &TokenSnapshot,
    basket: &Basket,
    recorded: &BTreeMap<PromotionId, UpdateChoice>,
) -> Evaluation {
    promotions
        .iter()
        .map(|promotion| {
            let id = &promotion.promotion_id;
            let result = evaluate_promotion(promotion, tokens.get(id), basket, recorded.get(id));
            if let Err(e) = &result {
                warn!("Could not evaluate promotion {id}: {e}");
            }
            (id.clone(), result)
        })
        .collect()
}

/// Evaluate a single promotion.
pub fn evaluate_promotion(
    promotion: &Promotion,
    token: Option<&Token>,
    basket: &Basket,
    recorded: Option<&UpdateChoice>,
) -> Result<PromotionUpdateState, EvaluationError> {
    let promotion_id = &promotion.promotion_id;
    let token = token.ok_or_else(|| EvaluationError::MissingToken(promotion_id.clone()))?;
    if token.points.dimensions() != promotion.dimension_count() {
        return Err(EvaluationError::TokenShape {
            promotion_id: promotion_id.clone(),
            expected: promotion.dimension_count(),
            actual: token.points.dimensions(),
        });
    }
    let contribution = promotion.point_contribution(basket)?;
    let metadata = UpdateMetadata::for_basket(basket);
    let feasible_ids = promotion.feasible_updates(&token.points, &contribution, &metadata)?;

    let mut updates = vec![offer(UpdateChoice::None, NONE_DESCRIPTION, None)];
    if promotion.native_earn && contribution.is_positive() {
        updates.push(offer(UpdateChoice::Earn, EARN_DESCRIPTION, None));
    }
    for update_id in feasible_ids {
        if let Some(rule) = promotion.rule(&update_id) {
            updates.push(offer(UpdateChoice::Zkp(update_id), &rule.description, rule.side_effect.clone()));
        }
    }

    let mut demoted = None;
    if let Some(choice) = recorded {
        match updates.iter_mut().find(|u| &u.choice == choice) {
            Some(update) => update.status = ChoiceStatus::Selected,
            None => {
                debug!("Choice {choice} for promotion {promotion_id} is no longer feasible");
                demoted = Some(choice.clone());
            }
        }
    }
    trace!("Promotion {promotion_id}: contribution {contribution}, {} feasible choices", updates.len());
    Ok(PromotionUpdateState { promotion_id: promotion_id.clone(), contribution, updates, demoted })
}

fn offer(choice: UpdateChoice, description: &str, side_effect: Option<SideEffect>) -> FeasibleUpdate {
    FeasibleUpdate { choice, description: description.to_string(), side_effect, status: ChoiceStatus::Candidate }
}
