mod command_transport;
mod height_codec;
mod movement;

pub use self::command_transport::CommandTransport;
pub use self::height_codec::{HeightCodec, HeightCodecError};
pub use self::movement::{MonitorSummary, MoveOutcome, MovePhase, MovementController};
