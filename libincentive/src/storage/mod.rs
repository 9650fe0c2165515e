mod file_store;
mod memory_store;
mod traits;

pub use file_store::FileTokenStore;
pub use memory_store::InMemoryTokenStore;
pub use traits::TokenStore;
