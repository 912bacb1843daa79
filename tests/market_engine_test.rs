use cpmm_ledger::db::init_db;
use cpmm_ledger::domain::{Direction, MarketStatus, MarketTerms, NewMarket, TransactionKind};
use cpmm_ledger::{
    CurrencyId, EngineError, MarketEngine, MarketId, PortfolioId, Repository, ShareId, Side,
    TimeMs,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const STARTING_BALANCE: f64 = 1_000.0;
const EPS: f64 = 1e-6;

struct Harness {
    engine: MarketEngine,
    repo: Arc<Repository>,
    currency: CurrencyId,
    alice: PortfolioId,
    bob: PortfolioId,
    _temp: TempDir,
}

async fn setup() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let currency = CurrencyId::new("pts");
    let alice = PortfolioId::new("pf-alice");
    let bob = PortfolioId::new("pf-bob");
    repo.insert_currency(&currency, "Points", "PTS", false)
        .await
        .unwrap();
    repo.insert_portfolio(&alice, "alice", "Main").await.unwrap();
    repo.insert_portfolio(&bob, "bob", "Main").await.unwrap();

    let engine = MarketEngine::with_sql_registry(repo.clone());
    engine
        .deposit(&alice, &currency, STARTING_BALANCE)
        .await
        .unwrap();
    engine
        .deposit(&bob, &currency, STARTING_BALANCE)
        .await
        .unwrap();

    Harness {
        engine,
        repo,
        currency,
        alice,
        bob,
        _temp: temp_dir,
    }
}

async fn open_market(h: &Harness) -> MarketId {
    h.engine
        .create_market(NewMarket::binary_text(
            "Will it rain tomorrow?",
            "Resolves yes on any measurable rain",
            TimeMs::new(TimeMs::now().as_i64() + 86_400_000),
            "decider-1",
            1_000.0,
            h.currency.clone(),
        ))
        .await
        .unwrap()
}

async fn balance(h: &Harness, portfolio: &PortfolioId) -> f64 {
    h.engine.get_balance(portfolio, &h.currency).await.unwrap()
}

#[tokio::test]
async fn test_create_market_splits_pool_evenly() {
    let h = setup().await;
    let id = open_market(&h).await;

    let data = h.engine.get_market_data(&[id.clone()]).await.unwrap();
    assert_eq!(data.len(), 1);
    let market = &data[0].market;
    assert_eq!(market.status, MarketStatus::Pending);
    assert_eq!(market.result, None);
    assert_eq!(market.yes_pool, 500.0);
    assert_eq!(market.no_pool, 500.0);

    assert_eq!(data[0].history.len(), 1);
    assert_eq!(data[0].history[0].probability, 0.5);
}

#[tokio::test]
async fn test_create_price_target_market() {
    let h = setup().await;
    let id = h
        .engine
        .create_market(NewMarket {
            title: "BTC above 100k".to_string(),
            description: None,
            end_date: TimeMs::new(1_900_000_000_000),
            terms: MarketTerms::PriceTarget {
                asset_id: "btc".to_string(),
                target_price: 100_000.0,
                direction: Direction::Above,
            },
            pool_size: 200.0,
            currency_id: h.currency.clone(),
        })
        .await
        .unwrap();

    let market = h.repo.get_market(&id).await.unwrap().unwrap();
    assert_eq!(market.terms.kind(), "price_target");
    assert_eq!(market.yes_pool, 100.0);
}

#[tokio::test]
async fn test_create_market_rejects_bad_input() {
    let h = setup().await;

    let mut bad_pool = NewMarket::binary_text("T", "D", TimeMs::new(0), "d", 0.0, h.currency.clone());
    assert!(matches!(
        h.engine.create_market(bad_pool.clone()).await,
        Err(EngineError::Validation(_))
    ));

    bad_pool.pool_size = 100.0;
    bad_pool.title = "  ".to_string();
    assert!(matches!(
        h.engine.create_market(bad_pool).await,
        Err(EngineError::Validation(_))
    ));

    let unknown_currency =
        NewMarket::binary_text("T", "D", TimeMs::new(0), "d", 100.0, CurrencyId::new("usd"));
    assert!(matches!(
        h.engine.create_market(unknown_currency).await,
        Err(EngineError::Validation(_))
    ));

    assert_eq!(h.engine.list_markets().await.unwrap().total_count, 0);
}

#[tokio::test]
async fn test_buy_moves_pools_and_debits_balance() {
    let h = setup().await;
    let id = open_market(&h).await;

    let purchase = h
        .engine
        .buy_shares(&id, &h.alice, 200.0, Side::Yes)
        .await
        .unwrap();
    assert!((purchase.shares_bought - 342.857142857).abs() < EPS);

    let data = h.engine.get_market_data(&[id.clone()]).await.unwrap();
    let market = &data[0].market;
    assert!((market.no_pool - 700.0).abs() < EPS);
    assert!((market.yes_pool - 250_000.0 / 700.0).abs() < EPS);
    assert!((market.pool_product() - 250_000.0).abs() < 1e-3);

    assert_eq!(data[0].history.len(), 2);
    assert!((data[0].history[1].probability - 700.0 / 1057.142857142).abs() < EPS);

    assert!((balance(&h, &h.alice).await - 800.0).abs() < EPS);

    let positions = h.engine.list_positions(&h.alice, None).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].id, purchase.share_id);
    assert_eq!(positions[0].choice, Side::Yes);

    let txs = h.engine.list_transactions(&h.alice).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].kind, TransactionKind::PredictionCost);
    assert_eq!(txs[0].total_value, -200.0);
    assert_eq!(txs[0].share_id.as_ref(), Some(&purchase.share_id));
    assert_eq!(txs[1].kind, TransactionKind::Deposit);
}

#[tokio::test]
async fn test_sell_round_trip_restores_pools() {
    let h = setup().await;
    let id = open_market(&h).await;

    let purchase = h
        .engine
        .buy_shares(&id, &h.alice, 200.0, Side::Yes)
        .await
        .unwrap();
    let price = h
        .engine
        .sell_shares(&id, &h.alice, &purchase.share_id)
        .await
        .unwrap();
    assert!((price - 200.0).abs() < EPS);

    let market = h.repo.get_market(&id).await.unwrap().unwrap();
    assert!((market.yes_pool - 500.0).abs() < EPS);
    assert!((market.no_pool - 500.0).abs() < EPS);

    assert!((balance(&h, &h.alice).await - STARTING_BALANCE).abs() < EPS);
    assert!(h.engine.list_positions(&h.alice, None).await.unwrap().is_empty());

    let txs = h.engine.list_transactions(&h.alice).await.unwrap();
    assert_eq!(txs[0].kind, TransactionKind::PredictionSale);
    assert_eq!(txs[0].share_id.as_ref(), Some(&purchase.share_id));
}

#[tokio::test]
async fn test_buy_rejections_leave_no_trace() {
    let h = setup().await;
    let id = open_market(&h).await;

    assert!(matches!(
        h.engine.buy_shares(&id, &h.alice, 0.0, Side::Yes).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        h.engine.buy_shares(&id, &h.alice, -5.0, Side::No).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        h.engine.buy_shares(&id, &h.alice, 5_000.0, Side::Yes).await,
        Err(EngineError::InsufficientBalance { required, available })
            if required == 5_000.0 && available == STARTING_BALANCE
    ));
    assert!(matches!(
        h.engine
            .buy_shares(&MarketId::new("missing"), &h.alice, 10.0, Side::Yes)
            .await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine
            .buy_shares(&id, &PortfolioId::new("pf-ghost"), 10.0, Side::Yes)
            .await,
        Err(EngineError::NotFound(_))
    ));

    let market = h.repo.get_market(&id).await.unwrap().unwrap();
    assert_eq!((market.yes_pool, market.no_pool), (500.0, 500.0));
    assert_eq!(market.version, 0);
    assert_eq!(h.repo.market_history(&id).await.unwrap().len(), 1);
    assert!(h.engine.list_positions(&h.alice, None).await.unwrap().is_empty());
    assert_eq!(balance(&h, &h.alice).await, STARTING_BALANCE);
    assert_eq!(h.engine.list_transactions(&h.alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sell_requires_ownership() {
    let h = setup().await;
    let id = open_market(&h).await;
    let purchase = h
        .engine
        .buy_shares(&id, &h.alice, 100.0, Side::No)
        .await
        .unwrap();

    assert!(matches!(
        h.engine.sell_shares(&id, &h.bob, &purchase.share_id).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine
            .sell_shares(&id, &h.alice, &ShareId::new("no-such-share"))
            .await,
        Err(EngineError::NotFound(_))
    ));

    let other = open_market(&h).await;
    assert!(matches!(
        h.engine.sell_shares(&other, &h.alice, &purchase.share_id).await,
        Err(EngineError::NotFound(_))
    ));

    // The failed sells rolled back; the share and balances are intact.
    assert_eq!(h.engine.list_positions(&h.alice, None).await.unwrap().len(), 1);
    assert_eq!(balance(&h, &h.bob).await, STARTING_BALANCE);
    assert_eq!(h.repo.get_market(&id).await.unwrap().unwrap().version, 1);
}

#[tokio::test]
async fn test_resolve_pays_winning_side() {
    let h = setup().await;
    let id = open_market(&h).await;

    let yes = h
        .engine
        .buy_shares(&id, &h.alice, 200.0, Side::Yes)
        .await
        .unwrap();
    h.engine
        .buy_shares(&id, &h.bob, 100.0, Side::No)
        .await
        .unwrap();
    let pools_before = h.repo.get_market(&id).await.unwrap().unwrap();

    let settlement = h.engine.resolve_market(&id, Some(Side::Yes)).await.unwrap();
    assert_eq!(settlement.market.status, MarketStatus::Resolved);
    assert_eq!(settlement.market.result, Some(Side::Yes));
    assert_eq!(settlement.payouts, 1);
    assert!((settlement.total_paid - yes.shares_bought).abs() < EPS);

    assert!((balance(&h, &h.alice).await - (800.0 + yes.shares_bought)).abs() < EPS);
    assert!((balance(&h, &h.bob).await - 900.0).abs() < EPS);

    // Pools are frozen; shares stay as the audit record.
    let market = h.repo.get_market(&id).await.unwrap().unwrap();
    assert_eq!(market.yes_pool, pools_before.yes_pool);
    assert_eq!(market.no_pool, pools_before.no_pool);
    assert_eq!(h.engine.list_positions(&h.alice, None).await.unwrap().len(), 1);
    assert_eq!(h.engine.list_positions(&h.bob, None).await.unwrap().len(), 1);

    let txs = h.engine.list_transactions(&h.alice).await.unwrap();
    assert_eq!(txs[0].kind, TransactionKind::PredictionWin);
    assert_eq!(txs[0].price_per_unit, Some(1.0));
    assert!(h
        .engine
        .list_transactions(&h.bob)
        .await
        .unwrap()
        .iter()
        .all(|t| t.kind != TransactionKind::PredictionWin));
}

#[tokio::test]
async fn test_resolve_draw_pays_half_to_everyone() {
    let h = setup().await;
    let id = open_market(&h).await;

    let yes = h
        .engine
        .buy_shares(&id, &h.alice, 200.0, Side::Yes)
        .await
        .unwrap();
    let no = h
        .engine
        .buy_shares(&id, &h.bob, 100.0, Side::No)
        .await
        .unwrap();

    let settlement = h.engine.resolve_market(&id, None).await.unwrap();
    assert_eq!(settlement.market.result, None);
    assert_eq!(settlement.payouts, 2);

    assert!((balance(&h, &h.alice).await - (800.0 + yes.shares_bought * 0.5)).abs() < EPS);
    assert!((balance(&h, &h.bob).await - (900.0 + no.shares_bought * 0.5)).abs() < EPS);

    let txs = h.engine.list_transactions(&h.bob).await.unwrap();
    assert_eq!(txs[0].kind, TransactionKind::PredictionDraw);
}

#[tokio::test]
async fn test_closed_market_rejects_everything() {
    let h = setup().await;
    let id = open_market(&h).await;
    let purchase = h
        .engine
        .buy_shares(&id, &h.alice, 50.0, Side::Yes)
        .await
        .unwrap();
    assert_ok!(h.engine.resolve_market(&id, Some(Side::No)).await);

    assert!(matches!(
        h.engine.buy_shares(&id, &h.alice, 10.0, Side::Yes).await,
        Err(EngineError::MarketNotOpen(_))
    ));
    assert!(matches!(
        h.engine.sell_shares(&id, &h.alice, &purchase.share_id).await,
        Err(EngineError::MarketNotOpen(_))
    ));
    assert!(matches!(
        h.engine.resolve_market(&id, Some(Side::Yes)).await,
        Err(EngineError::MarketNotOpen(_))
    ));
    assert!(matches!(
        h.engine.cancel_market(&id).await,
        Err(EngineError::MarketNotOpen(_))
    ));
    assert!(matches!(
        h.engine.resolve_market(&MarketId::new("missing"), None).await,
        Err(EngineError::NotFound(_))
    ));

    // The losing side got nothing, and no second settlement happened.
    assert!((balance(&h, &h.alice).await - 950.0).abs() < EPS);
}

#[tokio::test]
async fn test_cancel_refunds_cost_basis() {
    let h = setup().await;
    let id = open_market(&h).await;

    h.engine
        .buy_shares(&id, &h.alice, 200.0, Side::Yes)
        .await
        .unwrap();
    h.engine
        .buy_shares(&id, &h.bob, 120.0, Side::No)
        .await
        .unwrap();
    let sold = h
        .engine
        .buy_shares(&id, &h.bob, 30.0, Side::Yes)
        .await
        .unwrap();
    let sale_price = h
        .engine
        .sell_shares(&id, &h.bob, &sold.share_id)
        .await
        .unwrap();

    let settlement = h.engine.cancel_market(&id).await.unwrap();
    assert_eq!(settlement.market.status, MarketStatus::Cancelled);
    assert_eq!(settlement.payouts, 2);
    assert!((settlement.total_paid - 320.0).abs() < EPS);
    assert_eq!((settlement.market.yes_pool, settlement.market.no_pool), (500.0, 500.0));

    assert!((balance(&h, &h.alice).await - STARTING_BALANCE).abs() < EPS);
    // Bob keeps whatever the early sale returned on the sold share.
    let expected_bob = STARTING_BALANCE - 30.0 + sale_price;
    assert!((balance(&h, &h.bob).await - expected_bob).abs() < EPS);

    let market = h.repo.get_market(&id).await.unwrap().unwrap();
    assert_eq!((market.yes_pool, market.no_pool), (500.0, 500.0));
    assert_eq!(market.version, settlement.market.version);

    let txs = h.engine.list_transactions(&h.alice).await.unwrap();
    assert_eq!(txs[0].kind, TransactionKind::PredictionReimbursement);
    assert_eq!(txs[0].total_value, 200.0);

    assert!(matches!(
        h.engine.buy_shares(&id, &h.alice, 10.0, Side::Yes).await,
        Err(EngineError::MarketNotOpen(_))
    ));
}

#[tokio::test]
async fn test_get_market_data_skips_missing_ids() {
    let h = setup().await;
    let first = open_market(&h).await;
    let second = open_market(&h).await;

    let data = h
        .engine
        .get_market_data(&[second.clone(), MarketId::new("missing"), first.clone()])
        .await
        .unwrap();
    let ids: Vec<_> = data.iter().map(|d| d.market.id.clone()).collect();
    assert_eq!(ids, vec![second, first]);

    assert!(h.engine.get_market_data(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_positions_filters_by_market() {
    let h = setup().await;
    let first = open_market(&h).await;
    let second = open_market(&h).await;

    h.engine
        .buy_shares(&first, &h.alice, 10.0, Side::Yes)
        .await
        .unwrap();
    h.engine
        .buy_shares(&second, &h.alice, 10.0, Side::No)
        .await
        .unwrap();

    assert_eq!(h.engine.list_positions(&h.alice, None).await.unwrap().len(), 2);

    let only_second = h
        .engine
        .list_positions(&h.alice, Some(&[second.clone()][..]))
        .await
        .unwrap();
    assert_eq!(only_second.len(), 1);
    assert_eq!(only_second[0].market_id, second);

    assert!(h
        .engine
        .list_positions(&h.alice, Some(&[][..]))
        .await
        .unwrap()
        .is_empty());
    assert_err!(
        h.engine
            .list_positions(&PortfolioId::new("pf-ghost"), None)
            .await
    );
}

#[tokio::test]
async fn test_list_markets_counts_all() {
    let h = setup().await;
    open_market(&h).await;
    let second = open_market(&h).await;
    h.engine.resolve_market(&second, None).await.unwrap();

    let list = h.engine.list_markets().await.unwrap();
    assert_eq!(list.total_count, 2);
    assert_eq!(list.markets.len(), 2);
    assert_eq!(h.repo.count_markets().await.unwrap(), 2);
}

#[tokio::test]
async fn test_deposit_rejections() {
    let h = setup().await;

    assert!(matches!(
        h.engine.deposit(&h.alice, &h.currency, 0.0).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        h.engine
            .deposit(&h.alice, &CurrencyId::new("usd"), 10.0)
            .await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        h.engine
            .deposit(&PortfolioId::new("pf-ghost"), &h.currency, 10.0)
            .await,
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(balance(&h, &h.alice).await, STARTING_BALANCE);

    let balances = h.engine.list_balances(&h.alice).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].currency_id, h.currency);
    assert_eq!(balances[0].amount, STARTING_BALANCE);
}
