use crate::ids::{BasketId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BasketError {
    #[error("The basket is frozen for checkout and cannot be modified")]
    Frozen,
    #[error("The basket has already been paid")]
    Paid,
    #[error("Item {0} is not in the basket")]
    UnknownItem(ItemId),
    #[error("Cannot remove {requested} units of {item}, only {available} in the basket")]
    InsufficientQuantity { item: ItemId, requested: u32, available: u32 },
    #[error("Quantity must be greater than zero")]
    ZeroQuantity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: ItemId,
    pub title: String,
    /// Price of a single unit, in cents.
    pub unit_price: u64,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item_id: impl Into<ItemId>, title: impl Into<String>, unit_price: u64, quantity: u32) -> Self {
        LineItem { item_id: item_id.into(), title: title.into(), unit_price, quantity }
    }

    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// The shopper's basket, as owned by the basket collaborator.
///
/// A basket is mutated by scanning and removing items until checkout begins. From then on it is frozen, and once it
/// has been paid it can only be discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    basket_id: BasketId,
    items: Vec<LineItem>,
    opened_at: DateTime<Utc>,
    frozen: bool,
    paid: bool,
}

impl Basket {
    pub fn new(basket_id: BasketId, opened_at: DateTime<Utc>) -> Self {
        Basket { basket_id, items: Vec::new(), opened_at, frozen: false, paid: false }
    }

    pub fn with_items(basket_id: BasketId, opened_at: DateTime<Utc>, items: Vec<LineItem>) -> Self {
        Basket { basket_id, items, opened_at, frozen: false, paid: false }
    }

    pub fn basket_id(&self) -> &BasketId {
        &self.basket_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The total number of units of `item` in the basket.
    pub fn quantity_of(&self, item: &ItemId) -> u64 {
        self.items.iter().filter(|i| &i.item_id == item).map(|i| u64::from(i.quantity)).sum()
    }

    /// The basket total, in cents.
    pub fn total_price(&self) -> u64 {
        self.items.iter().fold(0u64, |acc, i| acc.saturating_add(i.line_total()))
    }

    /// Scan an item into the basket. Scanning an item that is already present increases its quantity.
    pub fn add_item(&mut self, item: LineItem) -> Result<(), BasketError> {
        self.check_mutable()?;
        if item.quantity == 0 {
            return Err(BasketError::ZeroQuantity);
        }
        match self.items.iter_mut().find(|i| i.item_id == item.item_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
        Ok(())
    }

    /// Remove `quantity` units of an item. The line is dropped when its quantity reaches zero.
    pub fn remove_item(&mut self, item_id: &ItemId, quantity: u32) -> Result<(), BasketError> {
        self.check_mutable()?;
        let pos =
            self.items.iter().position(|i| &i.item_id == item_id).ok_or(BasketError::UnknownItem(item_id.clone()))?;
        let line = &mut self.items[pos];
        if line.quantity < quantity {
            return Err(BasketError::InsufficientQuantity {
                item: item_id.clone(),
                requested: quantity,
                available: line.quantity,
            });
        }
        line.quantity -= quantity;
        if line.quantity == 0 {
            self.items.remove(pos);
        }
        Ok(())
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn mark_paid(&mut self) {
        self.paid = true;
    }

    fn check_mutable(&self) -> Result<(), BasketError> {
        if self.paid {
            return Err(BasketError::Paid);
        }
        if self.frozen {
            return Err(BasketError::Frozen);
        }
        Ok(())
    }
}
