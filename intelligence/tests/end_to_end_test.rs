//! End-to-end integration tests for the arbitrage pipeline
//!
//! Mock chain → bootstrap scan → full pass → swap notification → localized
//! recompute → sinks

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use qenus_arb_intelligence::*;
use qenus_pool_dataplane::config::{EndpointsConfig, ExchangeConfig, TokenConfig};
use qenus_pool_dataplane::prices::StaticPriceSource;
use qenus_pool_dataplane::providers::RotationReason;
use qenus_pool_dataplane::testkit::{log_for, MockConnector};

const READ_0: &str = "ws://e2e-0.local";
const READ_1: &str = "ws://e2e-1.local";

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Whole tokens at 18 decimals
fn whole(tokens: u64) -> U256 {
    U256::from(tokens) * U256::exp10(18)
}

struct PairSpec {
    pair: Address,
    token0: Address,
    token1: Address,
    reserve0: u64,
    reserve1: u64,
}

fn pair(pair: u8, token0: u8, token1: u8, reserve0: u64, reserve1: u64) -> PairSpec {
    PairSpec {
        pair: addr(pair),
        token0: addr(token0),
        token1: addr(token1),
        reserve0,
        reserve1,
    }
}

/// Exchanges as `(name, factory, fee_bps, pairs)`
fn setup(connector: &MockConnector, exchanges: Vec<(&str, u8, u32, Vec<PairSpec>)>) -> ArbConfig {
    let mut config = ArbConfig::default();
    config.dataplane.endpoints = EndpointsConfig {
        read: vec![READ_0.to_string(), READ_1.to_string()],
        write: Vec::new(),
        request_timeout_ms: 200,
    };
    config.dataplane.liquidity.min_reserve_usd = 500.0;
    config.strategy.notional_usd = 10_000.0;
    config.strategy.min_profit_usd_direct = 10.0;
    config.strategy.min_profit_usd_triangular = 10.0;
    config.runtime.rescan_interval_secs = 0;

    for (name, factory, fee_bps, pairs) in exchanges {
        connector
            .chain()
            .add_factory(addr(factory), &pairs.iter().map(|p| p.pair).collect::<Vec<_>>());

        for pool in &pairs {
            connector
                .chain()
                .add_pair(pool.pair, pool.token0, pool.token1, whole(pool.reserve0), whole(pool.reserve1));
            for token in [pool.token0, pool.token1] {
                config.dataplane.tokens.insert(
                    token,
                    TokenConfig {
                        symbol: None,
                        usd_price: 1.0,
                        decimals: Some(18),
                    },
                );
            }
        }

        config.dataplane.exchanges.push(ExchangeConfig {
            name: name.to_string(),
            factory: Some(addr(factory)),
            fee_bps: Some(fee_bps),
            page_size: 10,
            max_pairs: None,
            enabled: true,
        });
    }

    config
}

fn runtime(connector: &MockConnector, config: &ArbConfig) -> (Runtime, Arc<OpportunityBook>) {
    let book = Arc::new(OpportunityBook::new());
    let runtime = Runtime::new(
        config.clone(),
        Arc::new(connector.clone()),
        Arc::new(StaticPriceSource::from_tokens(&config.dataplane.tokens)),
        SinkSet::new().with(BookSink::new(book.clone())),
        book.clone(),
    );
    (runtime, book)
}

/// Direct pair A/B priced 100 on uniswap and 102 on sushiswap
fn direct_exchanges() -> Vec<(&'static str, u8, u32, Vec<PairSpec>)> {
    vec![
        ("uniswap", 0xf1, 0, vec![pair(0xa0, 1, 2, 100_000, 1_000), pair(0xd0, 4, 5, 50_000, 50_000)]),
        ("sushiswap", 0xf2, 0, vec![pair(0xa1, 1, 2, 102_000, 1_000), pair(0xd1, 4, 5, 50_000, 51_000)]),
    ]
}

#[tokio::test]
async fn test_direct_opportunity_from_bootstrap() {
    let connector = MockConnector::new();
    let config = setup(&connector, direct_exchanges());
    let (runtime, book) = runtime(&connector, &config);

    let boot = runtime.bootstrap().await.unwrap();
    assert_eq!(boot.report.pools_inserted, 4);

    let ab: Vec<_> = boot
        .initial
        .iter()
        .filter(|r| r.pools.contains(&addr(0xa0)))
        .collect();
    assert_eq!(ab.len(), 1);

    let record = ab[0];
    assert_eq!(record.kind, OpportunityKind::Direct);
    assert!((record.edge - 0.0196).abs() < 5e-4, "edge {}", record.edge);
    assert!((record.estimated_profit_usd - record.edge * 10_000.0).abs() < 1e-9);
    assert_eq!(record.pools, vec![addr(0xa1), addr(0xa0)]);
    assert_eq!(record.exchanges, vec!["sushiswap".to_string(), "uniswap".to_string()]);

    // Ranked by descending profit
    assert!(boot
        .initial
        .windows(2)
        .all(|w| w[0].estimated_profit_usd >= w[1].estimated_profit_usd));
    assert_eq!(book.len(), boot.initial.len());
}

#[tokio::test]
async fn test_triangular_opportunity_from_bootstrap() {
    let connector = MockConnector::new();
    // A->B 2.0, B->C 0.6, C->A 0.9; 20 bps per leg
    let config = setup(
        &connector,
        vec![(
            "uniswap",
            0xf1,
            20,
            vec![
                pair(0xb0, 1, 2, 100_000, 200_000),
                pair(0xb1, 2, 3, 100_000, 60_000),
                pair(0xb2, 3, 1, 100_000, 90_000),
            ],
        )],
    );
    let (runtime, _book) = runtime(&connector, &config);

    let boot = runtime.bootstrap().await.unwrap();
    assert_eq!(boot.initial.len(), 1);

    let record = &boot.initial[0];
    assert_eq!(record.kind, OpportunityKind::Triangular);
    assert!((record.edge - 0.074).abs() < 1e-6, "edge {}", record.edge);
    assert_eq!(record.route.first(), record.route.last());
    assert_eq!(record.pools.len(), 3);
}

#[tokio::test]
async fn test_gated_pool_never_tracked() {
    let connector = MockConnector::new();
    let mut exchanges = direct_exchanges();
    // $100 of liquidity per side against a $500 floor
    exchanges[1].3.push(pair(0xa2, 1, 2, 100, 50));
    let config = setup(&connector, exchanges);
    let (runtime, _book) = runtime(&connector, &config);

    let boot = runtime.bootstrap().await.unwrap();
    assert_eq!(boot.report.gated_out, 1);
    assert!(boot.registry.read().pool_by_address(addr(0xa2)).is_none());
    assert!(boot.initial.iter().all(|r| !r.pools.contains(&addr(0xa2))));

    // Notifications for the gated pool are dropped
    let (mut driver, _rx) = EventRecomputeDriver::new(
        boot.client.clone(),
        boot.registry.clone(),
        boot.manager.clone(),
        SinkSet::new(),
        config.dataplane.events.clone(),
    );
    assert_eq!(driver.notify(addr(0xa2)), qenus_arb_intelligence::driver::Notification::Unknown);
}

#[tokio::test]
async fn test_swap_recompute_is_localized() {
    let connector = MockConnector::new();
    let config = setup(&connector, direct_exchanges());
    let (runtime, book) = runtime(&connector, &config);
    let boot = runtime.bootstrap().await.unwrap();

    let (mut driver, mut rx) = EventRecomputeDriver::new(
        boot.client.clone(),
        boot.registry.clone(),
        boot.manager.clone(),
        SinkSet::new().with(BookSink::new(book.clone())),
        config.dataplane.events.clone(),
    );
    driver.subscribe_tracked().await.unwrap();

    let untouched: Vec<_> = [addr(0xa0), addr(0xd0), addr(0xd1)]
        .iter()
        .map(|a| boot.registry.read().pool_by_address(*a).cloned().unwrap())
        .collect();

    connector.chain().set_reserves(addr(0xa1), whole(105_000), whole(1_000));
    let endpoint = connector.endpoint(READ_0);
    let calls_before = endpoint.calls();

    connector.emit(log_for(addr(0xa1)));
    let log = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    let report = driver.drain(log, &mut rx).await;

    assert_eq!(report.refreshed, 1);
    assert_eq!(report.emitted, 1);
    // Exactly one reserve read for the notified pool
    assert_eq!(endpoint.calls() - calls_before, 1);

    let registry = boot.registry.read();
    assert_eq!(registry.pool_by_address(addr(0xa1)).unwrap().reserve0, whole(105_000));
    for before in &untouched {
        assert_eq!(registry.pool_by_address(before.address).unwrap(), before);
    }
}

#[tokio::test]
async fn test_notifications_survive_rotation() {
    let connector = MockConnector::new();
    let config = setup(&connector, direct_exchanges());
    let (runtime, _book) = runtime(&connector, &config);
    let boot = runtime.bootstrap().await.unwrap();

    let (channel, mut records) = ChannelSink::channel(16);
    let (mut driver, mut rx) = EventRecomputeDriver::new(
        boot.client.clone(),
        boot.registry.clone(),
        boot.manager.clone(),
        SinkSet::new().with(channel),
        config.dataplane.events.clone(),
    );
    driver.subscribe_tracked().await.unwrap();

    connector.endpoint(READ_0).set_healthy(false);
    let active = boot.client.read().force_rotate(RotationReason::Forced).await.unwrap();
    assert_eq!(active, READ_1);
    assert_eq!(connector.endpoint(READ_1).subscription_count(), driver.subscription_count());

    connector.chain().set_reserves(addr(0xa1), whole(110_000), whole(1_000));
    connector.emit(log_for(addr(0xa1)));

    let log = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    let report = driver.drain(log, &mut rx).await;
    assert_eq!(report.refreshed, 1);

    let record = records.try_recv().unwrap();
    assert_eq!(record.kind, OpportunityKind::Direct);
    assert!(record.edge > 0.09);
}
