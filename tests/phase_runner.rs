// tests/phase_runner.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use nightcheck::engine::{Phase, PhaseRunner, RunnerSettings};
use nightcheck::errors::NightcheckError;
use nightcheck::exec::Collaborators;
use nightcheck::nodes::{NodeNaming, NodePool, NodeState};
use nightcheck::types::{PowerMode, Reason};
use nightcheck_test_utils::fake_testbed::{Call, FakeTestbed, Misbehaviour};
use nightcheck_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn settings() -> RunnerSettings {
    RunnerSettings {
        bandwidth: 50,
        ssh_backoff: Duration::from_millis(100),
        power_check_delay: Duration::from_millis(10),
        status_timeout: Duration::from_millis(100),
    }
}

fn runner(testbed: &Arc<FakeTestbed>) -> PhaseRunner {
    PhaseRunner::new(Collaborators::from_shared(Arc::clone(testbed)), settings())
}

fn pool(ids: &[u32]) -> NodePool {
    NodePool::new(ids.iter().copied().collect(), NodeNaming::default())
}

#[tokio::test(start_paused = true)]
async fn failures_exclude_nodes_after_fan_in() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .power(1, PowerMode::On, Misbehaviour::Fail)
            .power(3, PowerMode::On, Misbehaviour::Hang),
    );
    let mut pool = pool(&[1, 2, 3]);

    let summary = with_timeout(
        runner(&testbed).run_phase(&mut pool, &Phase::power(PowerMode::On, Duration::from_secs(1))),
    )
    .await?;

    assert_eq!(summary.dispatched, vec![1, 2, 3]);
    assert_eq!(
        summary.excluded,
        vec![(1, Reason::WontTurnOn), (3, Reason::WontTurnOn)]
    );
    assert_eq!(summary.survivors(), 1);
    assert_eq!(pool.active().to_vec(), vec![2]);
    assert_eq!(pool.state_of(3), Some(NodeState::Excluded(Reason::WontTurnOn)));

    let notified: Vec<_> = testbed
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::SetAttribute { .. }))
        .collect();
    assert_eq!(notified.len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_pool_skips_the_phase() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let mut pool = pool(&[1]);
    pool.exclude(1, Reason::WontSsh);

    let summary = runner(&testbed)
        .run_phase(&mut pool, &Phase::power(PowerMode::Off, Duration::from_secs(1)))
        .await?;

    assert!(summary.dispatched.is_empty());
    assert!(testbed.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn intolerant_phase_aborts_on_node_failure() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly").power(2, PowerMode::Reset, Misbehaviour::Fail),
    );
    let mut pool = pool(&[1, 2]);
    let mut phase = Phase::power(PowerMode::Reset, Duration::from_secs(1));
    phase.per_node = false;

    let result = runner(&testbed).run_phase(&mut pool, &phase).await;

    match result {
        Err(NightcheckError::PhaseAborted { phase, excluded }) => {
            assert_eq!(phase, "power-reset");
            assert_eq!(excluded, 1);
        }
        other => panic!("expected PhaseAborted, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_failures_are_only_logged() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .probe(1, Misbehaviour::Fail)
            .status_fails(),
    );
    let mut pool = pool(&[1, 2]);
    let image = nightcheck::fs::ResolvedImage {
        name: "u18".to_string(),
        path: Some("/images/u18.ndz".into()),
        markers: vec!["u18".to_string()],
    };

    let summary = runner(&testbed)
        .run_phase(&mut pool, &Phase::wait_reachable(&image, Duration::from_secs(1)))
        .await?;

    assert_eq!(summary.excluded, vec![(1, Reason::WontSsh)]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn status_notifications_share_one_timeout() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .power(1, PowerMode::Off, Misbehaviour::Fail)
            .power(2, PowerMode::Off, Misbehaviour::Fail)
            .power(3, PowerMode::Off, Misbehaviour::Fail)
            .status_hangs(),
    );
    let mut pool = pool(&[1, 2, 3, 4]);
    let started = Instant::now();

    let summary = with_timeout(
        runner(&testbed).run_phase(&mut pool, &Phase::power(PowerMode::Off, Duration::from_secs(1))),
    )
    .await?;

    assert_eq!(summary.survivors(), 1);
    // One status timeout for the whole phase, not one per excluded node.
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");

    let notified: Vec<_> = testbed
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SetAttribute { node, .. } => Some(node),
            _ => None,
        })
        .collect();
    assert_eq!(notified.len(), 3);
    Ok(())
}
