use cucumber::World;
use e2e::Shop;
use libincentive::token::Token;

#[derive(Debug, Default, World)]
pub struct ShopWorld {
    pub shop: Option<Shop>,
}

impl ShopWorld {
    pub fn shop(&self) -> &Shop {
        self.shop.as_ref().expect("The shop has not been opened")
    }

    pub fn shop_mut(&mut self) -> &mut Shop {
        self.shop.as_mut().expect("The shop has not been opened")
    }

    pub fn token(&self, promotion_id: &str) -> Token {
        self.shop().token(promotion_id).expect("Failed to read the token")
    }
}
