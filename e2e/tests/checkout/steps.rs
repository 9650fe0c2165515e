use crate::checkout::ShopWorld;
use cucumber::{given, then, when};
use e2e::Shop;
use libincentive::checkout::{CheckoutOutcome, CheckoutStage};
use libincentive::choice::UpdateChoice;
use libincentive::ids::PromotionId;
use libincentive::points::PointVector;
use log::*;

fn parse_points(points: &str) -> PointVector {
    let values = points
        .split(',')
        .map(|v| v.trim().parse::<u64>().unwrap_or_else(|_| panic!("'{v}' is not a point value")))
        .collect::<Vec<_>>();
    PointVector::new(values)
}

fn parse_choice(choice: &str) -> UpdateChoice {
    choice.parse().unwrap_or_else(|e| panic!("{e}"))
}

//------------------------------------------   Given   ----------------------------------------------------------------

#[given(expr = "the shop runs the promotions {string}")]
async fn open_shop(world: &mut ShopWorld, promotions: String) {
    let ids = promotions.split(',').map(str::trim).collect::<Vec<_>>();
    let shop = Shop::open(&ids).await.expect("Failed to open the shop");
    world.shop = Some(shop);
}

#[given(expr = "the shopper has joined {word}")]
async fn join(world: &mut ShopWorld, promotion_id: String) {
    let token = world.shop_mut().join(&promotion_id).await.expect("Failed to join the promotion");
    info!("Joined {promotion_id}: {token}");
}

//------------------------------------------   When   -----------------------------------------------------------------

#[when(expr = "the shopper scans {int} {string}")]
async fn scan(world: &mut ShopWorld, quantity: u32, item_id: String) {
    world.shop().scan(&item_id, quantity).await.expect("Failed to scan the item");
}

#[when(expr = "the shopper removes {int} {string}")]
async fn remove(world: &mut ShopWorld, quantity: u32, item_id: String) {
    world.shop().remove(&item_id, quantity).await.expect("Failed to remove the item");
}

#[when(expr = "the shopper chooses {string} for {word}")]
async fn choose(world: &mut ShopWorld, choice: String, promotion_id: String) {
    world.shop_mut().choose(&promotion_id, parse_choice(&choice));
}

#[when(expr = "the shopper starts a new basket")]
async fn new_basket(world: &mut ShopWorld) {
    world.shop_mut().new_basket().await;
}

#[when(expr = "the shopper backs up the {word} token")]
async fn back_up(world: &mut ShopWorld, promotion_id: String) {
    world.shop_mut().back_up(&promotion_id).expect("Failed to back up the token");
}

#[when(expr = "the shopper restores the {word} token from the backup")]
async fn restore(world: &mut ShopWorld, promotion_id: String) {
    world.shop_mut().restore(&promotion_id).expect("Failed to restore the token");
}

#[when(expr = "the shopper checks out")]
async fn check_out(world: &mut ShopWorld) {
    world.shop_mut().checkout().await;
}

//------------------------------------------   Then   -----------------------------------------------------------------

#[then(expr = "{string} is offered for {word}")]
async fn offered(world: &mut ShopWorld, choice: String, promotion_id: String) {
    let evaluation = world.shop_mut().refresh().await.expect("Failed to evaluate the basket");
    let state = evaluation[&PromotionId::new(&promotion_id)].as_ref().expect("Promotion failed to evaluate");
    let choice = parse_choice(&choice);
    assert!(state.is_feasible(&choice), "{choice} is not offered for {promotion_id}");
}

#[then(expr = "the choice for {word} falls back to {string}")]
async fn falls_back(world: &mut ShopWorld, promotion_id: String, choice: String) {
    let evaluation = world.shop_mut().refresh().await.expect("Failed to evaluate the basket");
    let state = evaluation[&PromotionId::new(&promotion_id)].as_ref().expect("Promotion failed to evaluate");
    let choice = parse_choice(&choice);
    assert!(state.demoted.is_some(), "The choice for {promotion_id} was not demoted");
    assert_eq!(state.selected_choice(), choice);
    assert_eq!(world.shop().choice(&promotion_id), choice);
}

#[then(expr = "the checkout succeeds")]
async fn succeeds(world: &mut ShopWorld) {
    let report = world.shop().last_report().expect("No checkout has run");
    assert!(report.outcome.is_success(), "Expected success, but got {}", report.outcome);
    assert!(report.warnings.is_empty(), "Unexpected warnings: {:?}", report.warnings);
}

#[then(expr = "the checkout reports a double spend")]
async fn double_spend(world: &mut ShopWorld) {
    let report = world.shop().last_report().expect("No checkout has run");
    assert_eq!(report.outcome, CheckoutOutcome::DoubleSpendDetected);
    assert!(report.committed.is_empty());
}

#[then(expr = "the checkout went through {string}")]
async fn stages(world: &mut ShopWorld, expected_stages: String) {
    let report = world.shop().last_report().expect("No checkout has run");
    let visited = report.stages.iter().map(CheckoutStage::to_string).collect::<Vec<_>>();
    let expected = expected_stages.split(',').map(|s| s.trim().to_string()).collect::<Vec<_>>();
    assert_eq!(visited, expected);
}

#[then(expr = "the {word} token holds {string}")]
async fn token_holds(world: &mut ShopWorld, promotion_id: String, points: String) {
    let token = world.token(&promotion_id);
    assert_eq!(token.points, parse_points(&points), "Unexpected points for {promotion_id}");
}

#[then(expr = "the {word} token matches the backup")]
async fn token_matches_backup(world: &mut ShopWorld, promotion_id: String) {
    let token = world.token(&promotion_id);
    let backup = world.shop().backup(&promotion_id).expect("No backup for the token");
    assert_eq!(&token, backup);
}

#[then(expr = "the {word} token no longer matches the backup")]
async fn token_replaced(world: &mut ShopWorld, promotion_id: String) {
    let token = world.token(&promotion_id);
    let backup = world.shop().backup(&promotion_id).expect("No backup for the token");
    assert_ne!(token.credential, backup.credential);
}

#[then(expr = "the basket has been discarded")]
async fn discarded(world: &mut ShopWorld) {
    assert!(world.shop().basket().await.is_err(), "The basket is still open");
}

#[then(expr = "no store or provider requests were made")]
async fn no_requests(world: &mut ShopWorld) {
    let shop = world.shop();
    assert_eq!(shop.delegate().store.calls(), 0);
    assert_eq!(shop.delegate().provider.calls(), 0);
    assert_eq!(shop.orchestrator().pending_requests().inserted(), 0);
}
