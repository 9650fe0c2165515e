use crate::evaluator::Evaluation;
use crate::ids::{PromotionId, UpdateId};
use crate::points::PointVector;
use crate::promotion::SideEffect;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// What the shopper wants to do with a promotion's token at checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateChoice {
    /// Leave the token untouched.
    #[default]
    None,
    /// Add the basket's contribution to the token.
    Earn,
    /// Apply a relation-based update rule.
    Zkp(UpdateId),
}

impl UpdateChoice {
    pub fn is_none(&self) -> bool {
        matches!(self, UpdateChoice::None)
    }
}

impl Display for UpdateChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateChoice::None => write!(f, "none"),
            UpdateChoice::Earn => write!(f, "earn"),
            UpdateChoice::Zkp(id) => write!(f, "zkp:{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("'{0}' is not a valid choice. Use 'none', 'earn' or 'zkp:<update-id>'")]
pub struct ChoiceParseError(pub String);

impl FromStr for UpdateChoice {
    type Err = ChoiceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "none" => return Ok(UpdateChoice::None),
            "earn" => return Ok(UpdateChoice::Earn),
            _ => {}
        }
        match s.split_once(':') {
            Some((kind, id)) if kind.eq_ignore_ascii_case("zkp") && !id.is_empty() => {
                Ok(UpdateChoice::Zkp(UpdateId::new(id)))
            }
            _ => Err(ChoiceParseError(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChoiceStatus {
    /// This is the shopper's recorded choice and it is still feasible.
    Selected,
    /// Feasible, but not selected.
    Candidate,
}

/// One entry in the list of choices offered for a promotion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibleUpdate {
    pub choice: UpdateChoice,
    pub description: String,
    pub side_effect: Option<SideEffect>,
    pub status: ChoiceStatus,
}

/// The evaluated state of a single promotion against the current basket and token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionUpdateState {
    pub promotion_id: PromotionId,
    pub contribution: PointVector,
    /// Feasible choices in presentation order: `None`, then `Earn` (if offered), then rules in declared order.
    pub updates: Vec<FeasibleUpdate>,
    /// The recorded choice, if it was demoted because it is no longer feasible.
    pub demoted: Option<UpdateChoice>,
}

impl PromotionUpdateState {
    pub fn is_feasible(&self, choice: &UpdateChoice) -> bool {
        self.choices().any(|c| c == choice)
    }

    /// The selected choice, falling back to `None` when nothing (still) feasible was selected.
    pub fn selected_choice(&self) -> UpdateChoice {
        self.updates
            .iter()
            .find(|u| u.status == ChoiceStatus::Selected)
            .map(|u| u.choice.clone())
            .unwrap_or_default()
    }

    pub fn choices(&self) -> impl Iterator<Item = &UpdateChoice> {
        self.updates.iter().map(|u| &u.choice)
    }
}

/// The shopper's choices, kept across navigation so they don't have to be re-selected.
///
/// Choices are never trusted blindly: call [`ChoiceBook::reconcile`] with every fresh evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceBook {
    choices: BTreeMap<PromotionId, UpdateChoice>,
}

impl ChoiceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a choice. Recording `None` forgets any previous choice for the promotion.
    pub fn record(&mut self, promotion_id: PromotionId, choice: UpdateChoice) {
        if choice.is_none() {
            self.choices.remove(&promotion_id);
        } else {
            self.choices.insert(promotion_id, choice);
        }
    }

    pub fn get(&self, promotion_id: &PromotionId) -> UpdateChoice {
        self.choices.get(promotion_id).cloned().unwrap_or_default()
    }

    pub fn as_map(&self) -> &BTreeMap<PromotionId, UpdateChoice> {
        &self.choices
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn clear(&mut self) {
        self.choices.clear();
    }

    /// Drop every choice that the evaluation could not confirm as selected. Returns the promotions whose choice was
    /// dropped.
    pub fn reconcile(&mut self, evaluation: &Evaluation) -> Vec<PromotionId> {
        let mut dropped = Vec::new();
        self.choices.retain(|id, choice| {
            let keep = match evaluation.get(id) {
                Some(Ok(state)) => state.selected_choice() == *choice,
                Some(Err(_)) | None => false,
            };
            if !keep {
                debug!("Dropping choice {choice} for promotion {id}");
                dropped.push(id.clone());
            }
            keep
        });
        dropped
    }
}
