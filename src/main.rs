use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bridgeswitch::bridges::registry::BridgeRegistry;
use bridgeswitch::bridges::switch::SettlementSwitch;
use bridgeswitch::config::SwitchConfig;
use bridgeswitch::events::EventBus;
use bridgeswitch::mocks::SimulatedAdapter;
use bridgeswitch::oracle::{BasisPointFeeEngine, FeeEngine, InMemoryVault, SystemClock};
use bridgeswitch::types::{ChainId, CrossChainToken, RoutePreferences, RoutingMode};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("bridgeswitch")
        .version("0.1.0")
        .author("BridgeSwitch Team <team@bridgeswitch.dev>")
        .about("🌉 Cross-chain bridge aggregation and settlement switch")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/switch.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .get_matches();

    dotenvy::dotenv().ok();

    let log_level = matches.get_one::<String>("log-level").unwrap();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = SwitchConfig::load(config_path).context("loading switch configuration")?;
    info!(
        "Loaded configuration: {} chains, {} tokens",
        config.chains.len(),
        config.tokens.len()
    );

    let clock = Arc::new(SystemClock);
    let events = EventBus::default();
    let registry = Arc::new(BridgeRegistry::new(
        config.registry.clone(),
        clock.clone(),
        events.clone(),
    ));
    let vault = Arc::new(InMemoryVault::new());
    let fees = Arc::new(BasisPointFeeEngine::new(config.limits.fee_bps));
    let (switch, admin) = SettlementSwitch::new(
        &config,
        registry.clone(),
        vault.clone(),
        fees.clone(),
        clock,
        events.clone(),
    );

    // Log everything the switch announces
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            info!("📣 {:?}", event);
        }
    });

    // Three simulated protocols with different cost/speed profiles
    let gwei = U256::from(1_000_000_000u64);
    let stable_rail = Arc::new(
        SimulatedAdapter::builder("stable-rail")
            .fee_bps(6)
            .gas_fee_wei(gwei * U256::from(50_000u64))
            .minutes(5)
            .build(),
    );
    let fast_lane = Arc::new(
        SimulatedAdapter::builder("fast-lane")
            .fee_bps(25)
            .gas_fee_wei(gwei * U256::from(80_000u64))
            .minutes(1)
            .build(),
    );
    let deep_pool = Arc::new(
        SimulatedAdapter::builder("deep-pool")
            .fee_bps(12)
            .gas_fee_wei(gwei * U256::from(30_000u64))
            .minutes(12)
            .liquidity(U256::from(5_000_000u64) * U256::from(10u64).pow(U256::from(18u64)))
            .build(),
    );
    for adapter in [stable_rail, fast_lane, deep_pool] {
        switch
            .register_bridge(
                &admin,
                adapter,
                ChainId::all().to_vec(),
                config.token_symbols(),
            )
            .await?;
    }

    let usdc = CrossChainToken::new("USDC", 6);
    let sender = Address::from([0xA1; 20]);
    let recipient = Address::from([0xB2; 20]);
    let funding = U256::from(10u64).pow(U256::from(24u64));
    vault.fund(sender, "USDC", ChainId::Ethereum, funding);

    // Cheapest single-path transfer
    let amount = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(6u64));
    let id = switch
        .bridge_with_auto_route(
            &usdc,
            &usdc,
            amount,
            ChainId::Ethereum,
            ChainId::Arbitrum,
            &RoutePreferences {
                mode: RoutingMode::Cheapest,
                ..RoutePreferences::default()
            },
            sender,
            recipient,
            b"demo-permit",
        )
        .await?;
    info!("Cheapest-mode transfer settled: {}", id);

    // Fastest single-path transfer (interval-gated, so wait out the limit)
    tokio::time::sleep(std::time::Duration::from_secs(
        config.limits.min_transfer_interval_secs + 1,
    ))
    .await;
    let id = switch
        .bridge_with_auto_route(
            &usdc,
            &usdc,
            amount,
            ChainId::Ethereum,
            ChainId::Optimism,
            &RoutePreferences {
                mode: RoutingMode::Fastest,
                ..RoutePreferences::default()
            },
            sender,
            recipient,
            b"demo-permit",
        )
        .await?;
    info!("Fastest-mode transfer settled: {}", id);

    // Multi-path split of a larger amount
    tokio::time::sleep(std::time::Duration::from_secs(
        config.limits.min_transfer_interval_secs + 1,
    ))
    .await;
    let total = U256::from(90_000u64) * U256::from(10u64).pow(U256::from(6u64));
    let multi_path = switch
        .find_multi_path_route(
            &usdc,
            &usdc,
            total,
            ChainId::Ethereum,
            ChainId::Polygon,
            &RoutePreferences {
                mode: RoutingMode::Balanced,
                allow_multi_path: true,
                ..RoutePreferences::default()
            },
        )
        .await?;
    match switch
        .execute_multi_path(&multi_path, sender, recipient, b"demo-permit")
        .await
    {
        Ok(ids) => info!("Multi-path transfer settled across {} legs", ids.len()),
        Err(e) => warn!("Multi-path transfer degraded: {}", e),
    }

    // Ledger and adapter summary
    for transfer in switch.user_transfers(sender) {
        info!(
            "📒 {} | {} | {} {} {} -> {} | {:?}",
            transfer.id,
            transfer.route.bridge,
            transfer.route.amount_in,
            transfer.route.token_in.symbol,
            transfer.route.source_chain,
            transfer.route.dest_chain,
            transfer.status
        );
    }
    for name in registry.enabled_bridges().await {
        if let (Some(details), Some(metrics)) =
            (registry.bridge_details(&name).await, registry.metrics(&name).await)
        {
            info!(
                "📊 {} | transfers={} failed={} volume={} | success={}bps reliability={}bps",
                details.name,
                details.total_transfers,
                details.failed_transfers,
                details.total_volume,
                metrics.success_rate_bps,
                metrics.reliability_score_bps
            );
        }
    }
    info!("💰 Switch fees collected: {} wei", fees.total_collected());

    Ok(())
}
