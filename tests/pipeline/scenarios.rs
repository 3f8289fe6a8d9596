use std::time::Duration;

use crate::support::helpers::{
    fruit_basket, init_tracing, position, wait_for_acks, Event, FruitHooks, FRUITS,
};
use anyhow::Result;
use pullstack::{DrainPolicy, Engine, EngineConfig, HookStage, RoleLayout};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn reversed_basket() -> Vec<String> {
    FRUITS.iter().rev().map(|name| name.to_string()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seeded_items_flow_lifo_through_bounded_bridge() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket())
        .handling_delay(Duration::from_millis(5));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(3)
        .roles(RoleLayout::new(1, 1, 1))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert_eq!(recorder.pulled(), reversed_basket());
    assert_eq!(recorder.acked(), reversed_basket());
    assert!(recorder.errors().is_empty());

    let snapshot = engine.telemetry().snapshot();
    assert!(
        snapshot.bridge_high_watermark <= 3,
        "bridge held {} items",
        snapshot.bridge_high_watermark
    );
    assert_eq!(snapshot.handled, FRUITS.len() as u64);
    assert!(engine.store().is_empty().await);
    assert!(engine.bridge().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_capacity_behaves_like_one() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new().seeded(fruit_basket());
    let recorder = hooks.recorder();
    let config = EngineConfig::builder().capacity(0).build()?;

    let mut engine = Engine::new(config, hooks);
    assert_eq!(engine.bridge().capacity(), 1);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert!(engine.telemetry().bridge_high_watermark() <= 1);
    assert_eq!(recorder.acked(), reversed_basket());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_item_is_redispatched_before_older_items() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket())
        .failing_once("Fig")
        .handling_delay(Duration::from_millis(5));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder().capacity(3).build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert_eq!(
        recorder.errors(),
        vec![(HookStage::Handling, Some("Fig".to_string()))]
    );

    let events = recorder.events();
    let fig_pulled = Event::Pulled("Fig".to_string());
    assert_eq!(recorder.count(&fig_pulled), 2);
    let retry = position(&events, &fig_pulled, 1).expect("fig is dispatched twice");
    for older in ["Banana", "Apple"] {
        let dispatched = position(&events, &Event::Pulled(older.to_string()), 0)
            .expect("older items are dispatched");
        assert!(
            retry < dispatched,
            "fig should be retried before {older}: {events:?}"
        );
    }

    let pushed_back = position(&events, &Event::PushedBack("Fig".to_string()), 0)
        .expect("fig is pushed back");
    let reported = position(&events, &Event::Error(HookStage::Handling, Some("Fig".to_string())), 0)
        .expect("fig failure is reported");
    assert!(pushed_back < reported, "push_back runs before on_error");

    let acked = recorder.acked();
    assert_eq!(acked.len(), FRUITS.len());
    assert_eq!(acked.iter().filter(|key| *key == "Fig").count(), 1);
    let fig_acked = position(&events, &Event::Acked("Fig".to_string()), 0).expect("fig acked");
    assert!(fig_acked > retry, "fig is only acknowledged after the retry");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_layout_only_grows_store() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new().pulling_from(fruit_basket()[..3].to_vec());
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .roles(RoleLayout::from_parallelism(1))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    assert_eq!(engine.workers().len(), 1);

    timeout(Duration::from_secs(2), async {
        while engine.store().len().await < 3 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    sleep(Duration::from_millis(50)).await;
    engine.stop().await?;

    assert_eq!(engine.store().len().await, 3);
    assert!(recorder.pulled().is_empty());
    assert!(recorder.acked().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_worker_layout_fills_bridge_without_draining() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new().pulling_from(fruit_basket()[..3].to_vec());
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(2)
        .roles(RoleLayout::from_parallelism(2))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    assert_eq!(engine.workers().len(), 2);

    timeout(Duration::from_secs(2), async {
        while !(engine.bridge().is_full() && engine.store().len().await == 1) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    sleep(Duration::from_millis(50)).await;
    engine.stop().await?;

    assert_eq!(engine.bridge().len(), 2);
    assert_eq!(engine.store().len().await, 1);
    assert_eq!(recorder.pulled().len(), 2);
    assert!(recorder.acked().is_empty());
    assert_eq!(engine.telemetry().snapshot().handled, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_abandons_inflight_handling() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket()[..1].to_vec())
        .handling_delay(Duration::from_secs(60));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder().build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    timeout(Duration::from_secs(2), recorder.handling_started()).await?;

    timeout(Duration::from_secs(1), engine.stop())
        .await
        .expect("stop should not wait for the in-flight call")?;

    assert!(!engine.is_running());
    assert!(recorder.errors().is_empty());
    assert!(recorder.acked().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grace_period_lets_inflight_handling_finish() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket()[..1].to_vec())
        .handling_delay(Duration::from_millis(100));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .shutdown_grace(Duration::from_secs(2))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    timeout(Duration::from_secs(2), recorder.handling_started()).await?;
    engine.stop().await?;

    assert_eq!(recorder.count(&Event::Handled("Apple".to_string())), 1);
    assert_eq!(recorder.acked(), vec!["Apple".to_string()]);
    assert_eq!(engine.telemetry().acked(), 1);
    assert_eq!(engine.store().len().await, 0);
    assert!(engine.bridge().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prefer_refill_strands_items_when_source_is_dry() -> Result<()> {
    init_tracing();
    // Banana is dispatched at ~100ms and handled until ~150ms; Apple reaches the bridge at
    // ~200ms, leaving the store empty before the handler's next check at ~250ms.
    let hooks = FruitHooks::new()
        .seeded(fruit_basket()[..2].to_vec())
        .handling_delay(Duration::from_millis(50));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(2)
        .throttle(Duration::from_millis(100))
        .drain_policy(DrainPolicy::PreferRefill)
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, 1, Duration::from_secs(2)).await?;
    sleep(Duration::from_millis(400)).await;

    assert_eq!(recorder.acked(), vec!["Banana".to_string()]);
    assert!(engine.store().is_empty().await);
    assert_eq!(engine.bridge().len(), 1, "apple waits for a refill that never comes");

    engine.stop().await?;
    assert_eq!(engine.bridge().len(), 1, "stranded items stay in place");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handlers_share_a_single_handling_permit() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket())
        .handling_delay(Duration::from_millis(10));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(3)
        .roles(RoleLayout::new(1, 1, 3))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert_eq!(recorder.max_in_flight(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handling_concurrency_bounds_parallel_calls() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket())
        .handling_delay(Duration::from_millis(20));
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(3)
        .roles(RoleLayout::new(1, 1, 4))
        .handling_concurrency(2)
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert!(recorder.max_in_flight() <= 2);
    let mut acked = recorder.acked();
    acked.sort();
    let mut expected: Vec<String> = FRUITS.iter().map(|name| name.to_string()).collect();
    expected.sort();
    assert_eq!(acked, expected);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pulled_items_reach_handlers() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new().pulling_from(fruit_basket());
    let recorder = hooks.recorder();
    let config = EngineConfig::builder()
        .capacity(2)
        .throttle(Duration::from_millis(1))
        .build()?;

    let mut engine = Engine::new(config, hooks);
    engine.start().await?;
    wait_for_acks(&recorder, FRUITS.len(), Duration::from_secs(5)).await?;
    engine.stop().await?;

    assert_eq!(engine.telemetry().snapshot().pulled, FRUITS.len() as u64);
    Ok(())
}

#[tokio::test]
async fn second_start_is_rejected_while_running() -> Result<()> {
    init_tracing();
    let mut engine = Engine::new(EngineConfig::default(), FruitHooks::new());
    engine.start().await?;

    let err = engine.start().await.expect_err("engine is already running");
    assert!(format!("{err}").contains("already running"));

    engine.stop().await?;
    engine.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_restarts_after_aborted_run() -> Result<()> {
    init_tracing();
    let hooks = FruitHooks::new()
        .seeded(fruit_basket()[..2].to_vec())
        .failing_once("Banana")
        .aborting();
    let recorder = hooks.recorder();

    let mut engine = Engine::new(EngineConfig::default(), hooks);
    engine.start().await?;
    timeout(Duration::from_secs(2), async {
        while recorder.errors().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    let err = engine.stop().await.expect_err("aborted run surfaces its error");
    assert!(format!("{err:#}").contains("item pipeline aborted"));
    assert!(recorder.acked().is_empty());
    let leftover = engine.store().len().await + engine.bridge().len();

    // The second run seeds both fruits again on top of the leftovers.
    engine.start().await?;
    assert!(engine.is_running());
    wait_for_acks(&recorder, leftover + 2, Duration::from_secs(3)).await?;
    engine.stop().await?;

    let acked = recorder.acked();
    assert_eq!(acked.len(), leftover + 2);
    assert!(acked.contains(&"Apple".to_string()));
    assert!(acked.contains(&"Banana".to_string()));
    assert_eq!(
        recorder.errors(),
        vec![(HookStage::Handling, Some("Banana".to_string()))]
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_external_root_rejects_start() -> Result<()> {
    init_tracing();
    let root = CancellationToken::new();
    let mut engine =
        Engine::with_cancellation_token(EngineConfig::default(), FruitHooks::new(), root.clone());
    root.cancel();

    let err = engine.start().await.expect_err("cancelled root cannot drive a run");
    assert!(format!("{err}").contains("shutdown token already cancelled"));
    assert!(!engine.is_running());

    engine.replace_shutdown_root(CancellationToken::new());
    engine.start().await?;
    assert!(engine.is_running());
    engine.stop().await?;
    Ok(())
}
