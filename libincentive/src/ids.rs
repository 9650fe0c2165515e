//! Identifiers used throughout the checkout flow.
//!
//! All identifiers are opaque strings assigned by someone else: promotion and update ids come from the catalog, basket
//! ids from the store, item ids from the product database. They are kept as distinct types so that a basket id can
//! never be passed where a promotion id is expected.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn as_bytes(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.to_string()))
            }
        }
    };
}

string_id!(PromotionId, "The unique, stable identifier of a promotion in the catalog.");
string_id!(UpdateId, "Identifies a relation-based update rule. Unique only within its promotion.");
string_id!(BasketId, "The basket identifier assigned by the store when the basket is created.");
string_id!(ItemId, "A product identifier, as scanned at the point of sale.");

impl BasketId {
    /// Generate a fresh basket id. Stores assign these; this is used by the in-process basket.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        BasketId(format!("B{}", hex::encode(bytes)))
    }
}
