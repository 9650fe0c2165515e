//! The collaborators the checkout depends on.

mod batch;
mod error;
mod traits;

#[cfg(feature = "dummy_services")]
mod dummy_impl;

pub use batch::{ProviderBatch, ProviderBatchResponse, StoreBatch, StoreBatchResponse};
#[cfg(feature = "dummy_services")]
pub use dummy_impl::{
    DummyDelegate, DummyProvider, DummyStore, LocalBasket, ProviderBehaviour, StaticCatalog, StoreBehaviour,
};
pub use error::ServiceError;
pub use traits::{BasketView, CheckoutDelegate, PromotionCatalog, ProviderService, StoreService};
