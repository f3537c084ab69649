//! Deriving a calibration matrix from three touches.
//!
//! The user touches three targets in turn. For each one the raw readings are
//! averaged while the pen rests on it, and the three (screen, raw) pairs are
//! solved for M0..M6 in closed form (C. E. Vidales, "How to calibrate touch
//! screens", Embedded Systems Design, June 2002).

use crate::calibration::Calibration;
use crate::error::CalibrationError;
use crate::RawSample;

/// Number of touching samples discarded before averaging starts
pub const SETTLE_SAMPLES: i32 = 5;

/// A screen location and the averaged raw reading taken there
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationPoint {
    pub screen: (i32, i32),
    pub raw: RawSample,
}

/// The three targets for a `width` x `height` screen. They are spread out so
/// that no two share a row or column.
pub fn calibration_targets(width: i32, height: i32) -> [(i32, i32); 3] {
    [
        (width / 10, (height * 2) / 10),
        (width / 2, (height * 9) / 10),
        ((width * 9) / 10, height / 2),
    ]
}

/// Averages raw readings over one touch
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct PointCapture {
    sum_x: i64,
    sum_y: i64,
    count: i32,
}

impl PointCapture {
    pub const fn new() -> Self {
        Self {
            sum_x: 0,
            sum_y: 0,
            count: -SETTLE_SAMPLES,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed one raw reading. Returns the average once the pen lifts after at
    /// least one sample past the settling period. Lifting earlier starts over.
    pub fn push(&mut self, raw: RawSample, touch_min: i16) -> Option<RawSample> {
        if !raw.is_touching(touch_min) {
            let average = if self.count > 0 {
                let n = self.count as i64;
                Some(RawSample::new(
                    (self.sum_x / n) as i16,
                    (self.sum_y / n) as i16,
                ))
            } else {
                None
            };
            self.reset();
            return average;
        }

        self.count += 1;
        if self.count > 0 {
            self.sum_x += raw.x as i64;
            self.sum_y += raw.y as i64;
        }
        None
    }
}

impl Default for PointCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Solve for the matrix mapping each point's raw reading to its screen
/// location
pub fn solve(points: &[CalibrationPoint; 3]) -> Result<Calibration, CalibrationError> {
    let s = points.map(|p| (p.screen.0 as i64, p.screen.1 as i64));
    let r = points.map(|p| (p.raw.x as i64, p.raw.y as i64));

    let m6 = (r[0].0 - r[2].0) * (r[1].1 - r[2].1) - (r[1].0 - r[2].0) * (r[0].1 - r[2].1);
    if m6 == 0 {
        return Err(CalibrationError::Degenerate);
    }

    // One row of the matrix from the screen coordinate selected by `axis`
    let row = |axis: fn(&(i64, i64)) -> i64| {
        let (a0, a1, a2) = (axis(&s[0]), axis(&s[1]), axis(&s[2]));
        let scale_x = (a0 - a2) * (r[1].1 - r[2].1) - (a1 - a2) * (r[0].1 - r[2].1);
        let scale_y = (r[0].0 - r[2].0) * (a1 - a2) - (a0 - a2) * (r[1].0 - r[2].0);
        let offset = (r[2].0 * a1 - r[1].0 * a2) * r[0].1
            + (r[0].0 * a2 - r[2].0 * a0) * r[1].1
            + (r[1].0 * a0 - r[0].0 * a1) * r[2].1;
        [scale_x, scale_y, offset]
    };
    let [m0, m1, m2] = row(|p| p.0);
    let [m3, m4, m5] = row(|p| p.1);

    let mut m = [0i32; 7];
    for (slot, value) in m.iter_mut().zip([m0, m1, m2, m3, m4, m5, m6]) {
        *slot = i32::try_from(value).map_err(|_| CalibrationError::Overflow)?;
    }

    #[cfg(feature = "defmt")]
    defmt::info!("calibration solved: {}", m);

    Calibration::new(m)
}

/// Outcome of feeding a reading to a [`Calibrator`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// Still waiting on the target with this index
    Pending(usize),
    /// The target with this index was captured
    Captured(usize),
    /// All targets captured and solved
    Done(Result<Calibration, CalibrationError>),
}

/// Walks through the three calibration targets
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct Calibrator {
    targets: [(i32, i32); 3],
    raw: [RawSample; 3],
    index: usize,
    capture: PointCapture,
}

impl Calibrator {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            targets: calibration_targets(width, height),
            raw: [RawSample::default(); 3],
            index: 0,
            capture: PointCapture::new(),
        }
    }

    /// The target the user should touch next, or `None` once finished
    pub fn current_target(&self) -> Option<(i32, i32)> {
        self.targets.get(self.index).copied()
    }

    pub fn push(&mut self, raw: RawSample, touch_min: i16) -> Progress {
        let index = self.index;
        if index >= self.targets.len() {
            return Progress::Done(self.solve());
        }

        match self.capture.push(raw, touch_min) {
            None => Progress::Pending(index),
            Some(average) => {
                self.raw[index] = average;
                self.index += 1;
                if self.index == self.targets.len() {
                    Progress::Done(self.solve())
                } else {
                    Progress::Captured(index)
                }
            }
        }
    }

    fn solve(&self) -> Result<Calibration, CalibrationError> {
        let points = [0, 1, 2].map(|i| CalibrationPoint {
            screen: self.targets[i],
            raw: self.raw[i],
        });
        solve(&points)
    }
}
