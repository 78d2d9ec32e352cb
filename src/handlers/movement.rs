use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use strum_macros::Display;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::{CommandTransport, HeightCodec};
use crate::error::DeskError;
use crate::hw::{DeviceSession, Direction, HeightSample};
use crate::protocol::{
    EndpointId, MAX_HEIGHT, MIN_HEIGHT, SAFETY_GUARD, SETTLE_DURATION, STOP_TOLERANCE,
};

/// Stages of one `move_to_target` call.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MovePhase {
    Idle,
    Moving,
    Stopping,
    Reached,
    SafetyAborted,
    Failed,
}

/// Result of a completed move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveOutcome {
    target: f64,
    starting: HeightSample,
    reached: HeightSample,
    pulses: usize,
}

impl MoveOutcome {
    pub(crate) fn new(
        target: f64,
        starting: HeightSample,
        reached: HeightSample,
        pulses: usize,
    ) -> Self {
        Self {
            target,
            starting,
            reached,
            pulses,
        }
    }

    /// Requested height in meters.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Height read before the first pulse.
    #[must_use]
    pub fn starting(&self) -> HeightSample {
        self.starting
    }

    /// Last height observed before the final stop, within tolerance of the target.
    #[must_use]
    pub fn reached(&self) -> HeightSample {
        self.reached
    }

    /// Number of move pulses issued.
    #[must_use]
    pub fn pulses(&self) -> usize {
        self.pulses
    }
}

/// Result of a monitoring run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct MonitorSummary {
    received: usize,
}

impl MonitorSummary {
    pub(crate) fn new(received: usize) -> Self {
        Self { received }
    }

    /// Number of height notifications observed.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }
}

/// Sole writer of the latest notified height. Lives inside the notification callback.
#[derive(Debug)]
struct HeightWriter {
    latest: Arc<RwLock<HeightSample>>,
}

/// Reader side of the latest notified height.
#[derive(Debug, Clone)]
struct HeightReader {
    latest: Arc<RwLock<HeightSample>>,
}

fn height_cell(initial: HeightSample) -> (HeightWriter, HeightReader) {
    let latest = Arc::new(RwLock::new(initial));
    (
        HeightWriter {
            latest: Arc::clone(&latest),
        },
        HeightReader { latest },
    )
}

impl HeightWriter {
    fn publish(&self, payload: &[u8]) {
        match HeightCodec::decode_frame(payload) {
            Ok(meters) => {
                *self.latest.write().unwrap_or_else(PoisonError::into_inner) =
                    HeightSample::notified(meters);
            }
            Err(error) => warn!(%error, "ignoring undecodable height notification"),
        }
    }
}

impl HeightReader {
    fn snapshot(&self) -> HeightSample {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Closed-loop movement and observation on one desk session.
#[derive(Debug)]
pub struct MovementController<'a> {
    session: &'a DeviceSession,
}

impl<'a> MovementController<'a> {
    #[must_use]
    pub fn new(session: &'a DeviceSession) -> Self {
        Self { session }
    }

    /// Moves the desk until it is within 5 mm of `target`.
    ///
    /// ```
    /// # async fn demo(session: desk::DeviceSession) -> Result<(), desk::DeskError> {
    /// let outcome = desk::MovementController::new(&session).move_to_target(1.12).await?;
    /// assert!((outcome.reached().meters() - 1.12).abs() <= 0.005);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`DeskError::TargetOutOfRange`] before touching the desk when `target`
    /// is outside the desk's travel, [`DeskError::SafetyKickIn`] when the desk
    /// reverses on its own, and transport errors otherwise.
    #[instrument(skip(self), level = "info", fields(desk = self.session.name()))]
    pub async fn move_to_target(&self, target: f64) -> Result<MoveOutcome, DeskError> {
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&target) {
            return Err(DeskError::TargetOutOfRange {
                target,
                min: MIN_HEIGHT,
                max: MAX_HEIGHT,
            });
        }

        let starting = self.session.get_height().await?;
        let (writer, reader) = height_cell(starting);
        self.session
            .subscribe(
                EndpointId::Height,
                Box::new(move |payload: &[u8]| writer.publish(payload)),
            )
            .await?;

        let result = self.drive(target, starting, &reader).await;
        self.release().await;
        result
    }

    async fn drive(
        &self,
        target: f64,
        starting: HeightSample,
        reader: &HeightReader,
    ) -> Result<MoveOutcome, DeskError> {
        let will_move_up = target > starting.meters();
        let mut previous = starting.meters();
        let mut pulses = 0usize;
        enter(MovePhase::Idle);
        enter(MovePhase::Moving);

        loop {
            let current = reader.snapshot();
            let height = current.meters();
            let diff = target - height;
            let distance = diff.abs();
            debug!(height, previous, diff, pulses, "control tick");

            if Direction::observed(previous, height).contradicts(will_move_up)
                && distance > SAFETY_GUARD
            {
                enter(MovePhase::SafetyAborted);
                error!(height, target, "desk reversed away from target");
                return Err(DeskError::SafetyKickIn { height, target });
            }

            if distance <= STOP_TOLERANCE {
                enter(MovePhase::Stopping);
                CommandTransport::stop(self.session).await?;
                sleep(SETTLE_DURATION).await;
                let settled = reader.snapshot();
                enter(MovePhase::Reached);
                info!(
                    reached = height,
                    settled = settled.meters(),
                    pulses,
                    "target reached"
                );
                return Ok(MoveOutcome::new(target, starting, current, pulses));
            }

            if distance < SAFETY_GUARD {
                CommandTransport::stop(self.session).await?;
            }

            let direction = if diff > 0.0 {
                Direction::Up
            } else {
                Direction::Down
            };
            if let Err(movement) = CommandTransport::move_direction(self.session, direction).await
            {
                enter(MovePhase::Failed);
                return Err(match CommandTransport::stop(self.session).await {
                    Ok(()) => movement,
                    Err(stop) => DeskError::CombinedFailure {
                        movement: Box::new(movement),
                        stop: Box::new(stop),
                    },
                });
            }
            pulses += 1;
            previous = height;
        }
    }

    /// Logs every notified height until Ctrl+C. Issues no movement commands.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription fails or the Ctrl+C handler cannot be
    /// installed.
    pub async fn monitor(&self) -> Result<MonitorSummary, DeskError> {
        let interrupt = async {
            tokio::signal::ctrl_c()
                .await
                .map_err(|source| DeskError::Interrupt { source })
        };
        self.monitor_until(interrupt, |_, _| {}).await
    }

    /// Reports every notified height to `on_sample` until `shutdown` resolves.
    ///
    /// Samples delivered before `shutdown` resolves are all reported.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription fails or `shutdown` resolves to one.
    #[instrument(skip_all, level = "info", fields(desk = self.session.name()))]
    pub async fn monitor_until<F, S>(
        &self,
        shutdown: F,
        mut on_sample: S,
    ) -> Result<MonitorSummary, DeskError>
    where
        F: Future<Output = Result<(), DeskError>>,
        S: FnMut(usize, HeightSample),
    {
        let (sender, mut samples) = mpsc::unbounded_channel();
        self.session
            .subscribe(
                EndpointId::Height,
                Box::new(move |payload: &[u8]| match HeightCodec::decode_frame(payload) {
                    Ok(meters) => {
                        let _ = sender.send(HeightSample::notified(meters));
                    }
                    Err(error) => warn!(%error, "ignoring undecodable height notification"),
                }),
            )
            .await?;

        let mut received = 0usize;
        let mut observe = |sample: HeightSample| {
            received += 1;
            info!(height = sample.meters(), "height");
            on_sample(received, sample);
        };

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                outcome = &mut shutdown => break outcome,
                Some(sample) = samples.recv() => observe(sample),
            }
        };
        while let Ok(sample) = samples.try_recv() {
            observe(sample);
        }

        self.release().await;
        outcome.map(|()| MonitorSummary::new(received))
    }

    async fn release(&self) {
        if let Err(error) = self.session.unsubscribe(EndpointId::Height).await {
            warn!(%error, "failed to release height notifications");
        }
    }
}

fn enter(phase: MovePhase) {
    debug!(%phase, "move phase");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::SampleSource;

    #[test]
    fn height_cell_reader_sees_latest_publish() {
        let (writer, reader) = height_cell(HeightSample::read(0.74));
        let second_reader = reader.clone();

        writer.publish(&[0xD8, 0x0E, 0x00, 0x00]);

        assert_eq!(SampleSource::Notification, reader.snapshot().source());
        assert!((second_reader.snapshot().meters() - 1.00).abs() < 1e-9);
    }

    #[test]
    fn height_cell_ignores_short_frames() {
        let (writer, reader) = height_cell(HeightSample::read(0.74));

        writer.publish(&[0x01]);

        assert_eq!(HeightSample::read(0.74), reader.snapshot());
    }

    #[test]
    fn move_phase_names_are_snake_case() {
        assert_eq!("safety_aborted", MovePhase::SafetyAborted.to_string());
    }
}
