//! Promotions and their update rules.
//!
//! A promotion is loaded wholesale from the catalog at the start of a session and never changes afterwards. It
//! defines how a basket contributes points ([`ContributionRule`]), whether the promotion supports plain earning,
//! and a list of relation-based [`UpdateRule`]s the shopper can choose from at checkout.

mod error;
mod relation;

pub use error::{PromotionError, RelationError};
pub use relation::{Relation, UpdateRelation};

use crate::basket::Basket;
use crate::ids::{BasketId, ItemId, PromotionId, UpdateId};
use crate::points::PointVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Values derived from the basket that a relation may depend on, besides the points themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMetadata {
    pub basket_id: BasketId,
    pub timestamp: DateTime<Utc>,
}

impl UpdateMetadata {
    pub fn for_basket(basket: &Basket) -> Self {
        UpdateMetadata { basket_id: basket.basket_id().clone(), timestamp: basket.opened_at() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContributionRule {
    /// Every unit of `item_id` adds `points_per_unit` to `dimension`.
    PerItem { item_id: ItemId, dimension: usize, points_per_unit: u64 },
    /// One point in `dimension` for every `cents_per_point` cents spent on the basket.
    PerSpend { dimension: usize, cents_per_point: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    /// The update grants a reward, to be handed out at the till.
    Reward { reward_id: String, description: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRule {
    pub update_id: UpdateId,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effect: Option<SideEffect>,
    pub relation: Relation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub promotion_id: PromotionId,
    pub name: String,
    /// Labels for each point dimension, in order.
    pub dimensions: Vec<String>,
    /// Whether the promotion supports plain earning of the basket's contribution.
    #[serde(default)]
    pub native_earn: bool,
    #[serde(default)]
    pub contributions: Vec<ContributionRule>,
    #[serde(default)]
    pub rules: Vec<UpdateRule>,
    /// Relation-based updates cannot be applied to baskets opened after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Promotion {
    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    pub fn rule(&self, update_id: &UpdateId) -> Option<&UpdateRule> {
        self.rules.iter().find(|r| &r.update_id == update_id)
    }

    pub fn is_expired_at(&self, timestamp: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| timestamp > until)
    }

    /// The points the basket contributes to this promotion. This is a pure function of the basket contents.
    pub fn point_contribution(&self, basket: &Basket) -> Result<PointVector, PromotionError> {
        let dimensions = self.dimension_count();
        let mut contribution = PointVector::zeros(dimensions);
        for rule in &self.contributions {
            let (dimension, amount) = match rule {
                ContributionRule::PerItem { item_id, dimension, points_per_unit } => {
                    let amount = basket
                        .quantity_of(item_id)
                        .checked_mul(*points_per_unit)
                        .ok_or(PromotionError::ContributionOverflow)?;
                    (*dimension, amount)
                }
                ContributionRule::PerSpend { dimension, cents_per_point } => {
                    if *cents_per_point == 0 {
                        return Err(PromotionError::ZeroRate);
                    }
                    (*dimension, basket.total_price() / cents_per_point)
                }
            };
            if dimension >= dimensions {
                return Err(PromotionError::InvalidContributionDimension { dimension, dimensions });
            }
            contribution.add_to(dimension, amount).map_err(|_| PromotionError::ContributionOverflow)?;
        }
        Ok(contribution)
    }

    /// The ids of every relation-based update whose precondition currently holds, in declared rule order.
    ///
    /// An expired promotion has no feasible relation-based updates.
    pub fn feasible_updates(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<Vec<UpdateId>, PromotionError> {
        if self.is_expired_at(metadata.timestamp) {
            return Ok(Vec::new());
        }
        let mut feasible = Vec::new();
        for rule in &self.rules {
            let satisfied = rule
                .relation
                .is_satisfied(old, contribution, metadata)
                .map_err(|source| PromotionError::Relation { update_id: rule.update_id.clone(), source })?;
            if satisfied {
                feasible.push(rule.update_id.clone());
            }
        }
        Ok(feasible)
    }

    /// The unique new point vector that results from applying `update_id`.
    ///
    /// It is an error if the relation is unsatisfiable, or if more than one point vector satisfies it.
    pub fn candidate_points(
        &self,
        update_id: &UpdateId,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<PointVector, PromotionError> {
        let rule = self.rule(update_id).ok_or_else(|| PromotionError::UnknownUpdate(update_id.clone()))?;
        if self.is_expired_at(metadata.timestamp) {
            return Err(PromotionError::Infeasible(update_id.clone()));
        }
        let mut candidates = rule
            .relation
            .candidates(old, contribution, metadata)
            .map_err(|source| PromotionError::Relation { update_id: update_id.clone(), source })?;
        match candidates.len() {
            0 => Err(PromotionError::Infeasible(update_id.clone())),
            1 => Ok(candidates.remove(0)),
            n => Err(PromotionError::Ambiguous { update_id: update_id.clone(), candidates: n }),
        }
    }
}
