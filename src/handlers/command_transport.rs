use tracing::instrument;

use crate::error::DeskError;
use crate::hw::{DeviceSession, Direction};
use crate::protocol::{DOWN_OPCODE, EndpointId, REFERENCE_INPUT_OPCODE, STOP_OPCODE, UP_OPCODE};

/// Handler for desk motion commands.
pub struct CommandTransport;

impl CommandTransport {
    fn opcode_for(direction: Direction) -> Option<[u8; 2]> {
        match direction {
            Direction::Up => Some(UP_OPCODE),
            Direction::Down => Some(DOWN_OPCODE),
            Direction::Unknown => None,
        }
    }

    /// Halts the desk.
    ///
    /// Writes the stop opcode and the reference input concurrently; both writes are
    /// always attempted.
    ///
    /// ```
    /// # async fn demo(session: desk::DeviceSession) -> Result<(), desk::DeskError> {
    /// desk::CommandTransport::stop(&session).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the failing write's error, or [`DeskError::StopFailed`] carrying both
    /// causes when neither write succeeds.
    #[instrument(skip(session), level = "debug")]
    pub async fn stop(session: &DeviceSession) -> Result<(), DeskError> {
        let (command, reference) = tokio::join!(
            session.write(EndpointId::Command, &STOP_OPCODE),
            session.write(EndpointId::ReferenceInput, &REFERENCE_INPUT_OPCODE),
        );

        match (command, reference) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
            (Err(command), Err(reference)) => Err(DeskError::StopFailed {
                command: Box::new(command),
                reference: Box::new(reference),
            }),
        }
    }

    /// Issues one move pulse, roughly a second of travel.
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::UnknownDirection`] without writing when `direction` is
    /// [`Direction::Unknown`], or an error when the write fails.
    #[instrument(skip(session), level = "debug", fields(%direction))]
    pub async fn move_direction(
        session: &DeviceSession,
        direction: Direction,
    ) -> Result<(), DeskError> {
        let opcode = Self::opcode_for(direction).ok_or(DeskError::UnknownDirection)?;
        session.write(EndpointId::Command, &opcode).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::error::LinkError;
    use crate::hw::{DEFAULT_FAKE_ADDRESS, FakeDesk, FakeDeskConfig, FakeFailures};

    async fn connect(desk: &FakeDesk) -> DeviceSession {
        DeviceSession::connect(desk, DEFAULT_FAKE_ADDRESS)
            .await
            .expect("fake desk should connect")
    }

    #[rstest]
    #[case(Direction::Up, Some([0x47, 0x00]))]
    #[case(Direction::Down, Some([0x46, 0x00]))]
    #[case(Direction::Unknown, None)]
    fn opcode_for_direction_matches_protocol(
        #[case] direction: Direction,
        #[case] expected: Option<[u8; 2]>,
    ) {
        assert_eq!(expected, CommandTransport::opcode_for(direction));
    }

    #[tokio::test]
    async fn stop_writes_command_and_reference_input() {
        let desk = FakeDesk::new(FakeDeskConfig::default());
        let session = connect(&desk).await;

        CommandTransport::stop(&session).await.expect("stop should succeed");

        let mut writes: Vec<_> = desk
            .journal()
            .writes()
            .into_iter()
            .map(|write| (write.endpoint(), write.payload().to_vec()))
            .collect();
        writes.sort_by_key(|(endpoint, _)| endpoint.to_string());
        assert_eq!(
            vec![
                (EndpointId::Command, vec![0xFF, 0x00]),
                (EndpointId::ReferenceInput, vec![0x01, 0x80]),
            ],
            writes
        );
    }

    #[tokio::test]
    async fn stop_attempts_both_writes_when_one_fails() {
        let failures = FakeFailures::builder().stop_command(true).build();
        let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
        let session = connect(&desk).await;

        let result = CommandTransport::stop(&session).await;

        assert_matches!(
            result,
            Err(DeskError::Write {
                endpoint: EndpointId::Command,
                source: LinkError::Simulated { .. },
            })
        );
        assert_eq!(2, desk.journal().writes().len());
    }

    #[tokio::test]
    async fn stop_reports_both_causes_when_both_writes_fail() {
        let failures = FakeFailures::builder()
            .stop_command(true)
            .reference_input(true)
            .build();
        let desk = FakeDesk::new(FakeDeskConfig::builder().failures(failures).build());
        let session = connect(&desk).await;

        let result = CommandTransport::stop(&session).await;

        assert_matches!(
            result,
            Err(DeskError::StopFailed { command, reference })
            if matches!(*command, DeskError::Write { endpoint: EndpointId::Command, .. })
                && matches!(*reference, DeskError::Write { endpoint: EndpointId::ReferenceInput, .. })
        );
    }

    #[tokio::test]
    async fn move_direction_writes_one_pulse() {
        let desk = FakeDesk::new(FakeDeskConfig::default());
        let session = connect(&desk).await;

        CommandTransport::move_direction(&session, Direction::Down)
            .await
            .expect("pulse should be written");

        assert_eq!(vec![Direction::Down], desk.journal().pulses());
    }

    #[tokio::test]
    async fn move_direction_rejects_unknown_without_writing() {
        let desk = FakeDesk::new(FakeDeskConfig::default());
        let session = connect(&desk).await;

        let result = CommandTransport::move_direction(&session, Direction::Unknown).await;

        assert_matches!(result, Err(DeskError::UnknownDirection));
        assert!(desk.journal().writes().is_empty());
    }
}
