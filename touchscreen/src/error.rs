use core::fmt;

/// Errors produced while building or solving a calibration matrix
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationError {
    /// The divisor M6 is zero
    ZeroDivisor,
    /// The three reference points are collinear in raw or screen space
    Degenerate,
    /// A solved coefficient does not fit in 32 bits
    Overflow,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDivisor => f.write_str("calibration divisor is zero"),
            Self::Degenerate => f.write_str("calibration points are collinear"),
            Self::Overflow => f.write_str("calibration coefficient out of range"),
        }
    }
}
