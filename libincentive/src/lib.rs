pub mod basket;
pub mod checkout;
pub mod choice;
pub mod crypto;
pub mod evaluator;
pub mod helpers;
pub mod ids;
pub mod join;
pub mod pending;
pub mod points;
pub mod promotion;
pub mod services;
pub mod storage;
pub mod token;

#[cfg(test)]
mod tests;
