// tests/nightly_scenarios.rs

use std::error::Error;
use std::sync::Arc;

use nightcheck::config::ConfigFile;
use nightcheck::engine::{Nightly, NightlySettings, PipelineOptions, RunOutcome, RunSummary};
use nightcheck::errors::NightcheckError;
use nightcheck::exec::Collaborators;
use nightcheck::fs::ImageRepo;
use nightcheck::fs::mock::MockFileSystem;
use nightcheck::report::Cell;
use nightcheck::types::{NodeFailurePolicy, PowerMode, Reason};
use nightcheck_test_utils::builders::{ConfigFileBuilder, nightly};
use nightcheck_test_utils::fake_testbed::{Call, FakeTestbed, Misbehaviour};
use nightcheck_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn config() -> ConfigFile {
    ConfigFileBuilder::new().build()
}

fn two_images() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_image("f31", &["fedora-31", "f31"])
        .build()
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

async fn run(cfg: &ConfigFile, testbed: &Arc<FakeTestbed>, options: PipelineOptions) -> RunOutcome {
    with_timeout(nightly(cfg, &[1, 2, 3], options, testbed).run())
        .await
        .expect("run failed")
}

#[tokio::test(start_paused = true)]
async fn other_owner_leaves_the_testbed_alone() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("someone"));

    let outcome = run(&config(), &testbed, PipelineOptions::default()).await;

    assert_eq!(
        outcome,
        RunOutcome::NotOwner {
            principal: "someone".to_string()
        }
    );
    assert!(outcome.success(NodeFailurePolicy::Fail));
    assert_eq!(testbed.calls(), vec![Call::LeaseQuery]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_lease_switches_the_selection_off() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::unleased());

    let outcome = run(&config(), &testbed, PipelineOptions::default()).await;

    assert_eq!(outcome, RunOutcome::NoLease);
    assert_eq!(testbed.off_all(), vec![vec![1, 2, 3]]);
    assert!(testbed.power_calls(PowerMode::On).is_empty());
    assert!(testbed.mails().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_lease_in_dry_mode_touches_nothing() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::unleased());
    let options = PipelineOptions {
        dry_run: true,
        speedy: false,
    };

    let outcome = run(&config(), &testbed, options).await;

    assert_eq!(outcome, RunOutcome::NoLease);
    assert!(!testbed.touched());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lease_service_failure_aborts_the_run() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::broken_lease_service());

    let result = with_timeout(
        nightly(&config(), &[1, 2, 3], PipelineOptions::default(), &testbed).run(),
    )
    .await;

    assert!(matches!(result, Err(NightcheckError::LeaseQuery(_))));
    assert!(!testbed.touched());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_image_aborts_before_any_phase() -> TestResult {
    init_tracing();
    let cfg = config();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let empty_repo = ImageRepo::new(
        Arc::new(MockFileSystem::new()),
        cfg.image_search_path.clone(),
    );
    let nightly = Nightly::new(
        [1, 2, 3].into_iter().collect(),
        NightlySettings::from_config(&cfg, PipelineOptions::default()),
        Collaborators::from_shared(Arc::clone(&testbed)),
        empty_repo,
    );

    let result = with_timeout(nightly.run()).await;

    match result {
        Err(NightcheckError::ImageNotFound(msg)) => assert!(msg.contains("u18")),
        other => panic!("expected ImageNotFound, got {other:?}"),
    }
    assert_eq!(testbed.calls(), vec![Call::LeaseQuery]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dry_run_needs_no_image_artifacts() -> TestResult {
    init_tracing();
    let cfg = two_images();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let empty_repo = ImageRepo::new(
        Arc::new(MockFileSystem::new()),
        cfg.image_search_path.clone(),
    );
    let options = PipelineOptions {
        dry_run: true,
        speedy: false,
    };
    let nightly = Nightly::new(
        [1, 2, 3].into_iter().collect(),
        NightlySettings::from_config(&cfg, options),
        Collaborators::from_shared(Arc::clone(&testbed)),
        empty_repo,
    );

    let summary = completed(with_timeout(nightly.run()).await?);

    assert!(summary.report.all_clear());
    assert!(testbed.loads().is_empty());
    assert_eq!(testbed.probed(), vec![1, 1, 2, 2, 3, 3]);
    assert!(testbed.calls().contains(&Call::Remote {
        node: 3,
        command: "tail -1 /etc/rhubarbe-image | grep -E -q 'fedora-31|f31'".to_string(),
    }));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn clean_run_goes_through_every_phase() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    assert!(summary.report.all_clear());
    for mode in [PowerMode::On, PowerMode::Reset, PowerMode::Off] {
        assert_eq!(testbed.power_calls(mode), vec![1, 2, 3]);
    }
    assert_eq!(testbed.loads(), vec![vec![1, 2, 3]]);
    assert_eq!(testbed.probed(), vec![1, 2, 3]);
    assert!(testbed.calls().contains(&Call::Remote {
        node: 2,
        command: "tail -1 /etc/rhubarbe-image | grep -E -q 'ubuntu-18|u18'".to_string(),
    }));
    assert_eq!(
        testbed.mails(),
        vec![(
            vec!["ops@example.org".to_string()],
            "testbed nightly : all is fine on 3 node(s)".to_string()
        )]
    );
    assert_eq!(testbed.off_all(), vec![vec![1, 2, 3]]);
    assert_eq!(testbed.calls().last(), Some(&Call::PowerOffAll(vec![1, 2, 3])));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn node_refusing_to_power_on_is_excluded_for_good() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly").power(2, PowerMode::On, Misbehaviour::Fail),
    );

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    let row = summary.report.row(2).expect("row for node 2");
    assert_eq!(row.reason, Some(Reason::WontTurnOn));
    assert_eq!(row.cells, [Cell::Red, Cell::Gray, Cell::Gray]);
    assert_eq!(summary.report.issue_count(), 1);

    assert_eq!(testbed.power_calls(PowerMode::Reset), vec![1, 3]);
    assert_eq!(testbed.loads(), vec![vec![1, 3]]);
    assert_eq!(testbed.probed(), vec![1, 3]);
    assert_eq!(testbed.remote_nodes(), vec![1, 3]);
    assert!(testbed.calls().contains(&Call::SetAttribute {
        node: 2,
        key: "available".to_string(),
        value: "ko".to_string(),
    }));

    // Excluded nodes are still switched off at the end.
    assert_eq!(testbed.off_all(), vec![vec![1, 2, 3]]);
    assert_eq!(
        testbed.mails()[0].1,
        "testbed nightly : 1 issue(s) on 3 node(s)"
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_power_action_times_out() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly").power(1, PowerMode::Reset, Misbehaviour::Hang),
    );

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    assert_eq!(summary.report.row(1).unwrap().reason, Some(Reason::WontReset));
    assert_eq!(testbed.power_calls(PowerMode::Off), vec![2, 3]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unreachable_node_is_wont_ssh() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly").probe(3, Misbehaviour::Hang));

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    let row = summary.report.row(3).unwrap();
    assert_eq!(row.reason, Some(Reason::WontSsh));
    assert_eq!(row.cells, [Cell::Green, Cell::Red, Cell::Gray]);
    assert_eq!(testbed.remote_nodes(), vec![1, 2]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wrong_image_is_did_not_load_and_skips_later_images() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly").remote_status(1, 1));

    let summary = completed(run(&two_images(), &testbed, PipelineOptions::default()).await);

    let row = summary.report.row(1).unwrap();
    assert_eq!(row.reason, Some(Reason::DidNotLoad));
    assert_eq!(row.cells, [Cell::Green, Cell::Green, Cell::Red]);
    assert_eq!(testbed.loads(), vec![vec![1, 2, 3], vec![2, 3]]);
    assert_eq!(testbed.remote_nodes(), vec![1, 2, 2, 3, 3]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_marker_check_is_cant_check_image() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly").remote(2, Misbehaviour::Fail));

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    let row = summary.report.row(2).unwrap();
    assert_eq!(row.reason, Some(Reason::CantCheckImage));
    assert_eq!(row.cells, [Cell::Green, Cell::Red, Cell::Gray]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn load_failures_are_left_to_later_phases() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly").load_fails(2));

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    // The fake node still answers and carries the right image.
    assert!(summary.report.all_clear());
    assert_eq!(testbed.probed(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_load_keeps_nodes_active() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .load_hangs()
            .probe(1, Misbehaviour::Fail),
    );

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    assert_eq!(summary.report.row(1).unwrap().reason, Some(Reason::WontSsh));
    assert!(summary.report.row(2).unwrap().is_clear());
    assert_eq!(testbed.probed(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn selection_only_shrinks_phase_over_phase() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .power(2, PowerMode::On, Misbehaviour::Fail)
            .probe(3, Misbehaviour::Hang),
    );

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    let names: Vec<&str> = summary.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(
        names,
        vec!["power-on", "power-reset", "power-off", "load-u18", "wait-ssh-u18", "check-u18"]
    );
    for pair in summary.phases.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        let survivors: Vec<_> = before
            .dispatched
            .iter()
            .copied()
            .filter(|id| !before.excluded.iter().any(|(x, _)| x == id))
            .collect();
        assert_eq!(after.dispatched, survivors, "{} -> {}", before.phase, after.phase);
    }
    assert_eq!(summary.phases[0].excluded, vec![(2, Reason::WontTurnOn)]);
    assert_eq!(summary.phases[4].excluded, vec![(3, Reason::WontSsh)]);
    assert_eq!(summary.phases[5].dispatched, vec![1]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dry_run_powers_on_only_and_mails_developers() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let options = PipelineOptions {
        dry_run: true,
        speedy: false,
    };

    let summary = completed(run(&two_images(), &testbed, options).await);

    assert!(summary.report.all_clear());
    assert_eq!(testbed.power_calls(PowerMode::On), vec![1, 2, 3]);
    assert!(testbed.power_calls(PowerMode::Reset).is_empty());
    assert!(testbed.power_calls(PowerMode::Off).is_empty());
    assert!(testbed.loads().is_empty());
    assert_eq!(testbed.probed(), vec![1, 1, 2, 2, 3, 3]);
    assert_eq!(testbed.mails()[0].0, vec!["dev@example.org".to_string()]);
    assert!(testbed.off_all().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dry_run_without_developers_sends_no_mail() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new().with_dev_to(&[]).build();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let options = PipelineOptions {
        dry_run: true,
        speedy: false,
    };

    completed(run(&cfg, &testbed, options).await);

    assert!(testbed.mails().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn speedy_checks_the_first_image_only() -> TestResult {
    init_tracing();
    let testbed = Arc::new(FakeTestbed::leased_to("nightly"));
    let options = PipelineOptions {
        dry_run: false,
        speedy: true,
    };

    let summary = completed(run(&two_images(), &testbed, options).await);

    assert_eq!(summary.phases.len(), 6);
    assert_eq!(testbed.loads().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn side_channel_failures_do_not_fail_the_run() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .power(3, PowerMode::Off, Misbehaviour::Fail)
            .status_fails()
            .mail_fails(),
    );

    let outcome = run(&config(), &testbed, PipelineOptions::default()).await;

    assert!(outcome.success(NodeFailurePolicy::Succeed));
    assert!(!outcome.success(NodeFailurePolicy::Fail));
    let report = outcome.report().expect("completed run has a report");
    assert_eq!(report.row(3).unwrap().reason, Some(Reason::WontTurnOff));
    assert_eq!(testbed.mails().len(), 1);
    assert_eq!(testbed.off_all().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hanging_dashboard_does_not_block_the_run() -> TestResult {
    init_tracing();
    let testbed = Arc::new(
        FakeTestbed::leased_to("nightly")
            .power(1, PowerMode::On, Misbehaviour::Fail)
            .power(3, PowerMode::On, Misbehaviour::Fail)
            .status_hangs(),
    );

    let summary = completed(run(&config(), &testbed, PipelineOptions::default()).await);

    for node in [1, 3] {
        let row = summary.report.row(node).expect("row for excluded node");
        assert_eq!(row.reason, Some(Reason::WontTurnOn));
        assert!(testbed.calls().contains(&Call::SetAttribute {
            node,
            key: "available".to_string(),
            value: "ko".to_string(),
        }));
    }
    assert_eq!(testbed.loads(), vec![vec![2]]);
    assert_eq!(testbed.mails().len(), 1);
    assert_eq!(testbed.off_all(), vec![vec![1, 2, 3]]);
    Ok(())
}
