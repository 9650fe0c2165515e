//! The frozen view of a checkout.
//!
//! A [`CheckoutContext`] is built exactly once, when the choices are locked, and only read afterwards. It is the
//! single source of truth for which promotions take part in the checkout and how.

use crate::basket::Basket;
use crate::choice::{ChoiceBook, UpdateChoice};
use crate::evaluator::{evaluate, TokenSnapshot};
use crate::ids::{BasketId, PromotionId};
use crate::promotion::{Promotion, UpdateMetadata};
use crate::token::Token;
use log::*;

/// A promotion that takes part in the checkout with a non-trivial choice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participation {
    pub promotion: Promotion,
    pub choice: UpdateChoice,
    /// The token as it was when the choices were locked.
    pub snapshot: Token,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutContext {
    basket: Basket,
    metadata: UpdateMetadata,
    participants: Vec<Participation>,
    coerced: Vec<PromotionId>,
}

impl CheckoutContext {
    /// Re-evaluate every promotion against the frozen basket and lock in the choices.
    ///
    /// A recorded choice that is not feasible right now, or that belongs to a promotion that fails to evaluate, is
    /// coerced to `None`. Promotions whose choice is `None` do not participate.
    pub fn lock(basket: Basket, promotions: Vec<Promotion>, mut tokens: TokenSnapshot, choices: &ChoiceBook) -> Self {
        let evaluation = evaluate(&promotions, &tokens, &basket, choices.as_map());
        let mut participants = Vec::new();
        let mut coerced = Vec::new();
        for promotion in promotions {
            let id = promotion.promotion_id.clone();
            let requested = choices.get(&id);
            let choice = match evaluation.get(&id) {
                Some(Ok(state)) => state.selected_choice(),
                _ => UpdateChoice::None,
            };
            if choice != requested {
                info!("Choice {requested} for {id} is not feasible any more. Treating it as none");
                coerced.push(id.clone());
            }
            if choice.is_none() {
                continue;
            }
            // A selected choice implies the promotion evaluated, which implies it has a token
            let Some(snapshot) = tokens.remove(&id) else {
                error!("Promotion {id} was evaluated without a token");
                coerced.push(id);
                continue;
            };
            participants.push(Participation { promotion, choice, snapshot });
        }
        let metadata = UpdateMetadata::for_basket(&basket);
        CheckoutContext { basket, metadata, participants, coerced }
    }

    pub fn basket(&self) -> &Basket {
        &self.basket
    }

    pub fn basket_id(&self) -> &BasketId {
        self.basket.basket_id()
    }

    pub fn metadata(&self) -> &UpdateMetadata {
        &self.metadata
    }

    pub fn participants(&self) -> &[Participation] {
        &self.participants
    }

    /// Promotions whose recorded choice was replaced by `None`.
    pub fn coerced(&self) -> &[PromotionId] {
        &self.coerced
    }

    /// True when no promotion participates, so the checkout only has to take payment.
    pub fn is_pay_only(&self) -> bool {
        self.participants.is_empty()
    }
}
