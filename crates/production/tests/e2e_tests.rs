//! Runners syncing over the in-process network.

use fastsync_core::{BlockStore, SyncOutcome};
use fastsync_engine::{ChainExecutor, MemBlockStore};
use fastsync_production::{LocalNetwork, RunnerConfig, SyncHandle, SyncRunner};
use fastsync_sync::{SyncPhase, SyncStateMachine};
use fastsync_test_helpers::{store_matches, TestChain};
use fastsync_types::{BlockHeight, ChainState, PeerId};
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;

type Handle = SyncHandle<MemBlockStore, ChainExecutor>;

const DEADLINE: Duration = Duration::from_secs(30);

fn start_node(
    network: &Arc<LocalNetwork>,
    config: &RunnerConfig,
    id: u64,
    state: ChainState,
    store: MemBlockStore,
) -> Handle {
    let machine = SyncStateMachine::new(config.sync_config(), state, store, ChainExecutor::new());
    let runner = SyncRunner::new(config, machine);
    let transport = network
        .register(PeerId(id), runner.inbox())
        .unwrap();
    runner.spawn(transport)
}

fn fast_config() -> RunnerConfig {
    RunnerConfig::from_toml_str(
        r#"
        [sync]
        request_timeout_ms = 1000
        timeout_check_interval_ms = 100
        max_timeout_strikes = 2
        "#,
    )
    .unwrap()
}

async fn wait_completed(handle: &mut Handle) -> SyncOutcome {
    tokio::time::timeout(DEADLINE, handle.completed())
        .await
        .expect("sync did not complete in time")
        .unwrap()
}

#[traced_test]
#[tokio::test]
async fn test_two_runners_sync() {
    let chain = TestChain::honest(200);
    let config = fast_config();
    let network = LocalNetwork::new(config.rate_limit_config());

    let server = start_node(&network, &config, 1, chain.state_at(200), chain.store_up_to(200));
    let mut joiner = start_node(&network, &config, 2, chain.genesis(), MemBlockStore::new());
    network.connect(PeerId(1), PeerId(2)).unwrap();

    assert_eq!(
        wait_completed(&mut joiner).await,
        SyncOutcome::Finished {
            height: BlockHeight(200)
        }
    );
    assert_eq!(joiner.height(), BlockHeight(200));

    let machine = joiner.shutdown().await.unwrap();
    assert_eq!(machine.phase(), SyncPhase::Finished);
    assert!(store_matches(machine.store(), &chain, 200));

    let server = server.shutdown().await.unwrap();
    assert_eq!(
        server.stats().requests_served,
        machine.stats().requests_sent
    );
    assert_eq!(network.stats().codec_failures, 0);
}

#[traced_test]
#[tokio::test]
async fn test_finished_node_serves_a_third() {
    let chain = TestChain::honest(60);
    let config = fast_config();
    let network = LocalNetwork::new(config.rate_limit_config());

    let origin = start_node(&network, &config, 1, chain.state_at(60), chain.store_up_to(60));
    let mut relay = start_node(&network, &config, 2, chain.genesis(), MemBlockStore::new());
    network.connect(PeerId(1), PeerId(2)).unwrap();
    wait_completed(&mut relay).await;

    // The origin leaves; the relay alone serves the newcomer.
    network.unregister(PeerId(1));
    origin.shutdown().await.unwrap();

    let mut newcomer = start_node(&network, &config, 3, chain.genesis(), MemBlockStore::new());
    network.connect(PeerId(2), PeerId(3)).unwrap();
    assert!(wait_completed(&mut newcomer).await.is_finished());

    let machine = newcomer.shutdown().await.unwrap();
    assert!(store_matches(machine.store(), &chain, 60));
    relay.shutdown().await.unwrap();
}

#[traced_test]
#[tokio::test]
async fn test_forging_peer_is_disconnected() {
    let honest = TestChain::honest(80);
    let forged = TestChain::forked(80);
    let config = fast_config();
    let network = LocalNetwork::new(config.rate_limit_config());

    // Lowest id so it is preferred on ties.
    let bad = start_node(&network, &config, 1, forged.state_at(80), forged.store_up_to(80));
    let good = start_node(&network, &config, 2, honest.state_at(80), honest.store_up_to(80));
    let mut joiner = start_node(&network, &config, 3, honest.genesis(), MemBlockStore::new());
    network.connect(PeerId(1), PeerId(3)).unwrap();
    network.connect(PeerId(2), PeerId(3)).unwrap();

    assert_eq!(
        wait_completed(&mut joiner).await,
        SyncOutcome::Finished {
            height: BlockHeight(80)
        }
    );
    assert!(!network.is_connected(PeerId(1), PeerId(3)));
    assert!(network.is_connected(PeerId(2), PeerId(3)));

    let machine = joiner.shutdown().await.unwrap();
    assert!(machine.stats().bad_blocks >= 1);
    assert!(store_matches(machine.store(), &honest, 80));
    bad.shutdown().await.unwrap();
    good.shutdown().await.unwrap();
}

#[traced_test]
#[tokio::test]
async fn test_stop_before_any_peer() {
    let chain = TestChain::honest(10);
    let config = RunnerConfig::default();
    let network = LocalNetwork::new(config.rate_limit_config());
    let mut joiner = start_node(&network, &config, 1, chain.genesis(), MemBlockStore::new());

    joiner.stop().await.unwrap();
    assert_eq!(
        wait_completed(&mut joiner).await,
        SyncOutcome::Stopped {
            height: BlockHeight::GENESIS
        }
    );
    let machine = joiner.join().await.unwrap();
    assert_eq!(machine.phase(), SyncPhase::Stopped);
    assert_eq!(machine.store().height(), BlockHeight::GENESIS);
}

#[traced_test]
#[tokio::test]
async fn test_cancellation_leaves_runner_mid_sync() {
    let chain = TestChain::honest(100);
    let config = RunnerConfig::default();
    let network = LocalNetwork::new(config.rate_limit_config());
    let server = start_node(&network, &config, 1, chain.state_at(100), chain.store_up_to(100));
    let joiner = start_node(&network, &config, 2, chain.genesis(), MemBlockStore::new());

    // Cancel before connecting: the joiner never learns of a peer.
    joiner.cancellation_token().cancel();
    network.connect(PeerId(1), PeerId(2)).unwrap();

    let machine = joiner.join().await.unwrap();
    assert!(!machine.phase().is_terminal());
    assert_eq!(machine.store().height(), BlockHeight::GENESIS);
    server.shutdown().await.unwrap();
}
