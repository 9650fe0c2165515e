//! Relations over old points, basket contribution and update metadata.
//!
//! In the deployed protocol a relation is a statement the shopper proves in zero knowledge. The checkout core only
//! needs two things from it: whether it is currently satisfiable, and which new point vectors satisfy it. Both are
//! exposed through [`UpdateRelation`]; [`Relation`] is the built-in family of relations that promotions are
//! configured with.

use crate::points::PointVector;
use crate::promotion::error::RelationError;
use crate::promotion::UpdateMetadata;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

pub trait UpdateRelation {
    /// Whether a new point vector satisfying the relation exists for the given inputs.
    fn is_satisfied(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<bool, RelationError>;

    /// Every distinct new point vector that satisfies the relation. Empty when the relation is not satisfiable.
    fn candidates(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<Vec<PointVector>, RelationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// Redeem `cost` points from `dimension`. The basket's contribution is credited in the same update.
    Spend { dimension: usize, cost: u64 },
    /// Prove that `dimension` is at least `at_least` without spending anything.
    Threshold { dimension: usize, at_least: u64 },
    /// Count a visit towards a streak. The streak restarts if more than `interval_days` passed since the last visit.
    Streak { count: usize, last_visit: usize, interval_days: u64 },
    /// Redeem a reward once the streak has reached `required` visits.
    StreakRedeem { count: usize, required: u64 },
    /// Satisfied if any branch is.
    AnyOf { branches: Vec<Relation> },
}

fn value_at(points: &PointVector, dimension: usize) -> Result<u64, RelationError> {
    points.get(dimension).ok_or(RelationError::DimensionOutOfRange { dimension, dimensions: points.dimensions() })
}

fn day_number(metadata: &UpdateMetadata) -> Result<u64, RelationError> {
    let day = metadata.timestamp.timestamp().div_euclid(SECONDS_PER_DAY);
    u64::try_from(day).map_err(|_| RelationError::InvalidTimestamp)
}

impl UpdateRelation for Relation {
    fn is_satisfied(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<bool, RelationError> {
        match self {
            Relation::Spend { dimension, cost } => {
                let total = old.checked_add(contribution)?;
                Ok(value_at(&total, *dimension)? >= *cost)
            }
            Relation::Threshold { dimension, at_least } => {
                // still validates the contribution shape, since the new points include it
                old.checked_add(contribution)?;
                Ok(value_at(old, *dimension)? >= *at_least)
            }
            Relation::Streak { count, last_visit, .. } => {
                value_at(old, *count)?;
                let last = value_at(old, *last_visit)?;
                let today = day_number(metadata)?;
                Ok(contribution.is_positive() && today > last)
            }
            Relation::StreakRedeem { count, required } => Ok(value_at(old, *count)? >= *required),
            Relation::AnyOf { branches } => {
                for branch in branches {
                    if branch.is_satisfied(old, contribution, metadata)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn candidates(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<Vec<PointVector>, RelationError> {
        if let Relation::AnyOf { branches } = self {
            let mut result: Vec<PointVector> = Vec::new();
            for branch in branches {
                for candidate in branch.candidates(old, contribution, metadata)? {
                    if !result.contains(&candidate) {
                        result.push(candidate);
                    }
                }
            }
            return Ok(result);
        }
        if !self.is_satisfied(old, contribution, metadata)? {
            return Ok(Vec::new());
        }
        Ok(self.single_candidate(old, contribution, metadata)?.into_iter().collect())
    }
}

impl Relation {
    /// The new points for a satisfied, non-branching relation.
    fn single_candidate(
        &self,
        old: &PointVector,
        contribution: &PointVector,
        metadata: &UpdateMetadata,
    ) -> Result<Option<PointVector>, RelationError> {
        let candidate = match self {
            Relation::Spend { dimension, cost } => {
                let total = old.checked_add(contribution)?;
                let balance = value_at(&total, *dimension)?;
                total.with(*dimension, balance.saturating_sub(*cost))?
            }
            Relation::Threshold { .. } => old.checked_add(contribution)?,
            Relation::Streak { count, last_visit, interval_days } => {
                let last = value_at(old, *last_visit)?;
                let today = day_number(metadata)?;
                let streak = value_at(old, *count)?;
                let within = last != 0 && today.saturating_sub(last) <= *interval_days;
                let next = if within { streak.saturating_add(1) } else { 1 };
                old.with(*count, next)?.with(*last_visit, today)?
            }
            Relation::StreakRedeem { count, required } => {
                let streak = value_at(old, *count)?;
                old.with(*count, streak.saturating_sub(*required))?
            }
            Relation::AnyOf { .. } => return Ok(None),
        };
        Ok(Some(candidate))
    }
}
