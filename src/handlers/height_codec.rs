use thiserror::Error;

use crate::protocol::MIN_HEIGHT;

const RAW_UNITS_PER_METER: f64 = 10_000.0;

/// Errors returned by height encoding and decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HeightCodecError {
    /// The frame carries fewer than the two significant height bytes.
    #[error("height frame is too short: expected at least 2 bytes, got {actual}")]
    ShortFrame { actual: usize },
    /// The height cannot be represented by the 16-bit wire value.
    #[error("height {meters}m cannot be encoded as a raw desk height")]
    OutOfRange { meters: f64 },
}

/// Converts between the desk's little-endian raw height and meters.
///
/// The raw value counts tenths of a millimetre above [`MIN_HEIGHT`].
pub struct HeightCodec;

impl HeightCodec {
    /// Decodes the two significant height bytes `[lo, hi]`.
    ///
    /// ```
    /// use desk::HeightCodec;
    ///
    /// assert!((HeightCodec::decode([0x00, 0x00]) - 0.62).abs() < 1e-9);
    /// assert!((HeightCodec::decode([0x10, 0x27]) - 1.62).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn decode(bytes: [u8; 2]) -> f64 {
        f64::from(u16::from_le_bytes(bytes)) / RAW_UNITS_PER_METER + MIN_HEIGHT
    }

    /// Decodes a device frame, of which only the first two bytes carry height.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame is shorter than two bytes.
    pub fn decode_frame(frame: &[u8]) -> Result<f64, HeightCodecError> {
        match frame {
            [lo, hi, ..] => Ok(Self::decode([*lo, *hi])),
            _ => Err(HeightCodecError::ShortFrame {
                actual: frame.len(),
            }),
        }
    }

    /// Encodes meters as `[lo, hi]`, rounding to the nearest raw unit.
    ///
    /// # Errors
    ///
    /// Returns an error when the height is below [`MIN_HEIGHT`] or beyond the
    /// 16-bit range.
    pub fn encode(meters: f64) -> Result<[u8; 2], HeightCodecError> {
        let raw = ((meters - MIN_HEIGHT) * RAW_UNITS_PER_METER).round();
        if !(0.0..=f64::from(u16::MAX)).contains(&raw) {
            return Err(HeightCodecError::OutOfRange { meters });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw = raw as u16;
        Ok(raw.to_le_bytes())
    }
}
