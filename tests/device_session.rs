use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;

use desk::{
    CommandTransport, DEFAULT_FAKE_ADDRESS, DeskError, DeviceSession, EndpointId, FakeDesk,
    FakeDeskConfig, FakeFailures, LinkError, MovementController, SampleSource,
};

#[tokio::test]
async fn get_height_reads_and_decodes_the_height_characteristic() -> anyhow::Result<()> {
    let desk = FakeDesk::new(FakeDeskConfig::builder().initial_height(1.0).build());
    let session = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await?;

    let sample = session.get_height().await?;

    assert!((sample.meters() - 1.0).abs() < 1e-9);
    assert_eq!(SampleSource::Read, sample.source());
    assert_eq!(1, desk.journal().reads());
    Ok(())
}

#[tokio::test]
async fn address_matching_ignores_case() -> anyhow::Result<()> {
    let desk = FakeDesk::new(FakeDeskConfig::default());

    let session =
        DeviceSession::connect(&desk, &DEFAULT_FAKE_ADDRESS.to_ascii_lowercase()).await?;

    assert_eq!(DEFAULT_FAKE_ADDRESS.to_ascii_lowercase(), session.address());
    Ok(())
}

#[rstest]
#[case::unnamed(None, "desk")]
#[case::blank(Some("   "), "desk")]
#[case::named(Some("Desk 8421"), "Desk 8421")]
#[tokio::test]
async fn name_falls_back_to_desk(
    #[case] name: Option<&str>,
    #[case] expected: &str,
) -> anyhow::Result<()> {
    let desk = FakeDesk::new(FakeDeskConfig::default());
    let session = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await?;

    let session = match name {
        Some(name) => session.with_name(name),
        None => session,
    };

    assert_eq!(expected, session.name());
    Ok(())
}

#[rstest]
#[case::height(EndpointId::Height)]
#[case::command(EndpointId::Command)]
#[case::reference_input(EndpointId::ReferenceInput)]
#[tokio::test(start_paused = true)]
async fn missing_characteristic_is_reported_by_name(
    #[case] missing: EndpointId,
) -> anyhow::Result<()> {
    let desk = FakeDesk::new(
        FakeDeskConfig::builder()
            .missing_endpoints(vec![missing])
            .build(),
    );
    let session = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await?;

    let result = MovementController::new(&session).move_to_target(0.74).await;

    assert_matches!(
        result,
        Err(DeskError::CharacteristicMissing { endpoint }) if endpoint == missing
    );
    Ok(())
}

#[test]
fn missing_characteristic_message_names_the_uuid() {
    let error = DeskError::CharacteristicMissing {
        endpoint: EndpointId::Command,
    };

    assert!(
        error
            .to_string()
            .contains("99fa0002-338a-1024-8a49-009c0215f78a")
    );
}

#[tokio::test]
async fn refused_connection_carries_the_address() {
    let failures = FakeFailures::builder().connect(true).build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());

    let result = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await;

    assert_matches!(
        result,
        Err(DeskError::Connection { address, source: LinkError::Simulated { .. } })
        if address == DEFAULT_FAKE_ADDRESS
    );
}

#[tokio::test]
async fn failed_discovery_disconnects() {
    let failures = FakeFailures::builder().discover(true).build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());

    let result = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await;

    assert_matches!(result, Err(DeskError::Discovery { .. }));
    assert_eq!(1, desk.journal().disconnects());
}

#[tokio::test(start_paused = true)]
async fn slow_desk_times_out() {
    let desk = FakeDesk::new(
        FakeDeskConfig::builder()
            .connect_delay(Duration::from_secs(20))
            .build(),
    );

    let result =
        DeviceSession::connect_with_timeout(&desk, DEFAULT_FAKE_ADDRESS, Duration::from_secs(2))
            .await;

    assert_matches!(
        result,
        Err(DeskError::Connection { source: LinkError::Timeout(limit), .. })
        if limit == Duration::from_secs(2)
    );
}

#[tokio::test]
async fn read_failure_names_the_endpoint() -> anyhow::Result<()> {
    let failures = FakeFailures::builder().read(true).build();
    let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
    let session = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await?;

    let result = session.get_height().await;

    assert_matches!(
        result,
        Err(DeskError::Read { endpoint: EndpointId::Height, .. })
    );
    Ok(())
}

#[tokio::test]
async fn close_disconnects_the_link() -> anyhow::Result<()> {
    let desk = FakeDesk::new(FakeDeskConfig::default());
    let session = DeviceSession::connect(&desk, DEFAULT_FAKE_ADDRESS).await?;
    CommandTransport::stop(&session).await?;

    session.close().await?;

    assert_eq!(1, desk.journal().disconnects());
    Ok(())
}
