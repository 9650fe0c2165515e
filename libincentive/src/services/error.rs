use crate::basket::BasketError;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("The service is unavailable: {0}")]
    Unavailable(String),
    #[error("The service rejected the request: {0}")]
    Rejected(String),
    #[error("Payment was declined: {0}")]
    PaymentDeclined(String),
    #[error("There is no open basket")]
    NoBasket,
    #[error("Basket error: {0}")]
    Basket(#[from] BasketError),
}

impl From<&str> for ServiceError {
    fn from(s: &str) -> Self {
        ServiceError::Rejected(s.to_string())
    }
}
