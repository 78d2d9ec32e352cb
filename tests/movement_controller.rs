use std::cell::RefCell;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

use desk::{
    CommandTransport, DEFAULT_FAKE_ADDRESS, DeskError, DeviceSession, Direction, EndpointId,
    FakeDesk, FakeDeskConfig, FakeFailures, FakeMotion, LinkError, MAX_HEIGHT, MIN_HEIGHT,
    MovementController, SETTLE_DURATION, SampleSource,
};

fn pulsing_desk(initial_height: f64, step: u16) -> FakeDesk {
    FakeDesk::new(
        FakeDeskConfig::builder()
            .initial_height(initial_height)
            .motion(FakeMotion::Pulse { step })
            .build(),
    )
}

async fn connect(desk: &FakeDesk) -> anyhow::Result<DeviceSession> {
    Ok(DeviceSession::connect(desk, DEFAULT_FAKE_ADDRESS).await?)
}

#[tokio::test(start_paused = true)]
async fn target_equal_to_current_height_only_stops() -> anyhow::Result<()> {
    let desk = pulsing_desk(0.74, 100);
    let session = connect(&desk).await?;

    let outcome = MovementController::new(&session).move_to_target(0.74).await?;

    let journal = desk.journal();
    assert_eq!(0, outcome.pulses());
    assert_eq!(Vec::<Direction>::new(), journal.pulses());
    assert_eq!(2, journal.writes().len());
    assert_eq!(1, journal.stops());
    assert_eq!(SampleSource::Read, outcome.reached().source());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rising_desk_stops_inside_guard_then_settles() -> anyhow::Result<()> {
    let desk = pulsing_desk(0.74, 40);
    let session = connect(&desk).await?;
    let start = tokio::time::Instant::now();

    let outcome = MovementController::new(&session).move_to_target(1.00).await?;

    assert_eq!(SETTLE_DURATION, start.elapsed());
    let journal = desk.journal();
    assert_eq!(64, outcome.pulses());
    assert_eq!(vec![Direction::Up; 64], journal.pulses());
    // One stop inside the 10 mm guard at 0.992 m, then the final stop at 0.996 m.
    assert_eq!(2, journal.stops());
    assert!((outcome.reached().meters() - 0.996).abs() < 1e-9);
    assert!((outcome.starting().meters() - 0.74).abs() < 1e-9);
    assert_eq!(SampleSource::Notification, outcome.reached().source());
    Ok(())
}

#[rstest]
#[case::rising(0.74, 0.80)]
#[case::falling(0.74, 0.65)]
#[case::long_rise(0.74, 1.20)]
#[case::from_top(1.25, 0.70)]
#[tokio::test(start_paused = true)]
async fn reached_height_is_within_tolerance(
    #[case] initial_height: f64,
    #[case] target: f64,
) -> anyhow::Result<()> {
    let desk = pulsing_desk(initial_height, 40);
    let session = connect(&desk).await?;

    let outcome = MovementController::new(&session).move_to_target(target).await?;

    assert!((outcome.reached().meters() - target).abs() <= 0.005);
    Ok(())
}

#[rstest]
#[case::above_max(MAX_HEIGHT + 0.01)]
#[case::below_min(MIN_HEIGHT - 0.01)]
#[tokio::test]
async fn out_of_range_target_touches_nothing(#[case] target: f64) -> anyhow::Result<()> {
    let desk = pulsing_desk(0.74, 100);
    let session = connect(&desk).await?;

    let result = MovementController::new(&session).move_to_target(target).await;

    assert_matches!(result, Err(DeskError::TargetOutOfRange { .. }));
    let journal = desk.journal();
    assert!(journal.writes().is_empty());
    assert_eq!(0, journal.reads());
    assert_eq!(0, journal.subscriptions_opened());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reversal_away_from_target_aborts_without_further_pulses() -> anyhow::Result<()> {
    let desk = FakeDesk::new(
        FakeDeskConfig::builder()
            .initial_height(0.74)
            .motion(FakeMotion::Script(vec![0.80, 0.78, 0.90]))
            .build(),
    );
    let session = connect(&desk).await?;

    let result = MovementController::new(&session).move_to_target(1.00).await;

    assert_matches!(
        result,
        Err(DeskError::SafetyKickIn { height, target })
        if (height - 0.78).abs() < 1e-9 && (target - 1.00).abs() < 1e-9
    );
    assert_eq!(vec![Direction::Up, Direction::Up], desk.journal().pulses());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_pulse_is_followed_by_a_stop() -> anyhow::Result<()> {
    let failures = FakeFailures::builder().move_pulse(3).build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
    let session = connect(&desk).await?;

    let result = MovementController::new(&session).move_to_target(1.00).await;

    assert_matches!(
        result,
        Err(DeskError::Write {
            endpoint: EndpointId::Command,
            source: LinkError::Simulated { .. },
        })
    );
    assert_eq!(3, desk.journal().pulses().len());
    assert_eq!(1, desk.journal().stops());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_pulse_and_failed_stop_keep_both_causes() -> anyhow::Result<()> {
    let failures = FakeFailures::builder()
        .move_pulse(1)
        .stop_command(true)
        .build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
    let session = connect(&desk).await?;

    let result = MovementController::new(&session).move_to_target(1.00).await;

    assert_matches!(
        result,
        Err(DeskError::CombinedFailure { movement, stop })
        if matches!(*movement, DeskError::Write { endpoint: EndpointId::Command, .. })
            && matches!(*stop, DeskError::Write { endpoint: EndpointId::Command, .. })
    );
    Ok(())
}

#[rstest]
#[case::reached(FakeMotion::Pulse { step: 100 }, FakeFailures::default())]
#[case::safety(FakeMotion::Script(vec![0.80, 0.78]), FakeFailures::default())]
#[case::pulse_failure(
    FakeMotion::Pulse { step: 100 },
    FakeFailures::builder().move_pulse(1).build()
)]
#[tokio::test(start_paused = true)]
async fn height_notifications_are_released_on_every_exit(
    #[case] motion: FakeMotion,
    #[case] failures: FakeFailures,
) -> anyhow::Result<()> {
    let desk = FakeDesk::new(
        FakeDeskConfig::builder()
            .motion(motion)
            .failures(failures)
            .build(),
    );
    let session = connect(&desk).await?;

    let _ = MovementController::new(&session).move_to_target(1.00).await;

    let journal = desk.journal();
    assert_eq!(1, journal.subscriptions_opened());
    assert!(journal.active_subscriptions().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_release_does_not_fail_the_move() -> anyhow::Result<()> {
    let failures = FakeFailures::builder().unsubscribe(true).build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
    let session = connect(&desk).await?;

    let outcome = MovementController::new(&session).move_to_target(0.74).await?;

    assert_eq!(0, outcome.pulses());
    assert_eq!(vec![EndpointId::Height], desk.journal().active_subscriptions());
    Ok(())
}

#[tokio::test]
async fn monitor_reports_every_notification_without_moving() -> anyhow::Result<()> {
    let desk = pulsing_desk(0.74, 100);
    let session = connect(&desk).await?;
    let seen = RefCell::new(Vec::new());

    let shutdown = async {
        for _ in 0..3 {
            CommandTransport::move_direction(&session, Direction::Up).await?;
        }
        Ok::<(), DeskError>(())
    };
    let summary = MovementController::new(&session)
        .monitor_until(shutdown, |index, sample| {
            seen.borrow_mut().push((index, sample.meters()));
        })
        .await?;

    let seen = seen.into_inner();
    assert_eq!(3, summary.received());
    assert_eq!(vec![1, 2, 3], seen.iter().map(|(index, _)| *index).collect::<Vec<_>>());
    for ((_, meters), expected) in seen.iter().zip([0.75, 0.76, 0.77]) {
        assert!((meters - expected).abs() < 1e-9);
    }
    let journal = desk.journal();
    assert_eq!(0, journal.stops());
    assert_eq!(3, journal.writes().len());
    assert!(journal.active_subscriptions().is_empty());
    Ok(())
}

#[tokio::test]
async fn monitor_surfaces_shutdown_errors() -> anyhow::Result<()> {
    let desk = pulsing_desk(0.74, 100);
    let session = connect(&desk).await?;

    let shutdown = async {
        Err::<(), DeskError>(DeskError::Interrupt {
            source: std::io::Error::other("signal handler unavailable"),
        })
    };
    let result = MovementController::new(&session)
        .monitor_until(shutdown, |_, _| {})
        .await;

    assert_matches!(result, Err(DeskError::Interrupt { .. }));
    assert!(desk.journal().active_subscriptions().is_empty());
    Ok(())
}
