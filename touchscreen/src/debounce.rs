//! Pen up / pen down debouncing.
//!
//! A change of pen state needs [`DEBOUNCE_COUNT`] agreeing raw samples in a
//! row. Once the pen is confirmed down, calibrated points go through a short
//! queue so that what the application sees lags the panel by
//! [`QUEUE_DEPTH`] samples. The first point of a touch is reported only after
//! the queue has filled, and the points taken while the pen is being lifted
//! never reach the application.

use crate::{EventKind, PointerEvent, DEBOUNCE_COUNT};

/// Number of calibrated points held back while the pen is down
pub const QUEUE_DEPTH: usize = 4;

/// Debouncer state. The counts are the number of agreeing samples seen so far
/// and are always below `DEBOUNCE_COUNT`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    Up,
    BecomingDown(u8),
    Down,
    BecomingUp(u8),
}

impl DebounceState {
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Down | Self::BecomingUp(_))
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fill {
    /// Number of slots written since the seed, including the seed
    Priming(usize),
    /// Slot holding the oldest point, which is the next one delivered
    Primed(usize),
}

/// Delay line for calibrated points while the pen is down
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct SampleQueue {
    points: [(i32, i32); QUEUE_DEPTH],
    fill: Fill,
}

impl SampleQueue {
    pub const fn new() -> Self {
        Self {
            points: [(0, 0); QUEUE_DEPTH],
            fill: Fill::Priming(0),
        }
    }

    /// Start a new touch with `seed` as the first buffered point
    pub fn reset(&mut self, seed: (i32, i32)) {
        self.points[0] = seed;
        self.fill = Fill::Priming(1);
    }

    pub fn is_primed(&self) -> bool {
        matches!(self.fill, Fill::Primed(_))
    }

    /// Buffer a point. Returns the down event once the queue fills, and a move
    /// event carrying the oldest point on every push after that.
    pub fn push(&mut self, point: (i32, i32)) -> Option<PointerEvent> {
        match self.fill {
            Fill::Priming(n) if n < QUEUE_DEPTH => {
                self.points[n] = point;
                self.fill = Fill::Priming(n + 1);
                None
            }
            Fill::Priming(_) => {
                let (x, y) = self.points[0];
                self.points[0] = point;
                self.fill = Fill::Primed(1 % QUEUE_DEPTH);
                Some(PointerEvent::new(EventKind::Down, x, y))
            }
            Fill::Primed(next) => {
                let (x, y) = self.points[next];
                self.points[next] = point;
                self.fill = Fill::Primed((next + 1) % QUEUE_DEPTH);
                Some(PointerEvent::new(EventKind::Move, x, y))
            }
        }
    }

    /// The next point that would be delivered. While still priming this is
    /// the seed.
    pub fn oldest(&self) -> (i32, i32) {
        match self.fill {
            Fill::Priming(_) => self.points[0],
            Fill::Primed(next) => self.points[next],
        }
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug)]
pub struct Debouncer {
    state: DebounceState,
    queue: SampleQueue,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            state: DebounceState::Up,
            queue: SampleQueue::new(),
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Feed one raw sample's touch status and its calibrated point
    pub fn update(&mut self, touching: bool, point: (i32, i32)) -> Option<PointerEvent> {
        if touching {
            self.pen_down(point)
        } else {
            self.pen_up()
        }
    }

    fn pen_down(&mut self, point: (i32, i32)) -> Option<PointerEvent> {
        match self.state {
            DebounceState::Up => {
                self.rise(1, point);
                None
            }
            DebounceState::BecomingDown(count) => {
                self.rise(count + 1, point);
                None
            }
            DebounceState::Down => self.queue.push(point),
            // One good sample is enough to cancel a release in progress. The
            // sample itself is dropped.
            DebounceState::BecomingUp(_) => {
                self.state = DebounceState::Down;
                None
            }
        }
    }

    fn rise(&mut self, count: u8, point: (i32, i32)) {
        if count >= DEBOUNCE_COUNT {
            #[cfg(feature = "defmt")]
            defmt::debug!("pen down at {}, {}", point.0, point.1);
            self.state = DebounceState::Down;
            self.queue.reset(point);
        } else {
            self.state = DebounceState::BecomingDown(count);
        }
    }

    fn pen_up(&mut self) -> Option<PointerEvent> {
        let count = match self.state {
            DebounceState::Up => return None,
            DebounceState::BecomingDown(_) => {
                self.state = DebounceState::Up;
                return None;
            }
            DebounceState::Down => 1,
            DebounceState::BecomingUp(count) => count + 1,
        };

        if count >= DEBOUNCE_COUNT {
            self.state = DebounceState::Up;
            let (x, y) = self.queue.oldest();
            #[cfg(feature = "defmt")]
            defmt::debug!("pen up at {}, {}", x, y);
            Some(PointerEvent::new(EventKind::Up, x, y))
        } else {
            self.state = DebounceState::BecomingUp(count);
            None
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    fn p(i: i32) -> (i32, i32) {
        (i, 10 * i)
    }

    fn ev(kind: EventKind, point: (i32, i32)) -> Option<PointerEvent> {
        Some(PointerEvent::new(kind, point.0, point.1))
    }

    /// Drive a debouncer to a primed down state using points 1..=7, the last
    /// of which emits Down(p(3))
    fn primed() -> Debouncer {
        let mut d = Debouncer::new();
        for i in 1..=6 {
            assert_eq!(d.update(true, p(i)), None);
        }
        assert_eq!(d.update(true, p(7)), ev(EventKind::Down, p(3)));
        d
    }

    #[test]
    fn test_two_touches_not_enough() {
        let mut d = Debouncer::new();
        assert_eq!(d.update(true, p(1)), None);
        assert_eq!(d.update(true, p(2)), None);
        assert_eq!(d.state(), DebounceState::BecomingDown(2));
        assert_eq!(d.update(false, p(0)), None);
        assert_eq!(d.state(), DebounceState::Up);
        for _ in 0..10 {
            assert_eq!(d.update(false, p(0)), None);
        }
    }

    #[test]
    fn test_third_touch_confirms_down() {
        let mut d = Debouncer::new();
        d.update(true, p(1));
        d.update(true, p(2));
        assert_eq!(d.update(true, p(3)), None);
        assert_eq!(d.state(), DebounceState::Down);

        // Exactly one Down, after the queue has filled, reporting the
        // confirming sample
        let mut events = Vec::new();
        for i in 4..=7 {
            events.extend(d.update(true, p(i)));
        }
        assert_eq!(events, vec![PointerEvent::new(EventKind::Down, 3, 30)]);
    }

    #[test]
    fn test_aborted_press_restarts_count() {
        let mut d = Debouncer::new();
        d.update(true, p(1));
        d.update(true, p(2));
        d.update(false, p(0));
        d.update(true, p(3));
        d.update(true, p(4));
        assert_eq!(d.state(), DebounceState::BecomingDown(2));
        d.update(true, p(5));
        assert_eq!(d.state(), DebounceState::Down);
    }

    #[test]
    fn test_moves_lag_by_queue_depth() {
        let mut d = primed();
        for i in 8..=20 {
            assert_eq!(
                d.update(true, p(i)),
                ev(EventKind::Move, p(i - QUEUE_DEPTH as i32))
            );
        }
    }

    #[test]
    fn test_release_needs_three() {
        let mut d = primed();
        for i in 8..=10 {
            d.update(true, p(i));
        }
        assert_eq!(d.update(false, (-1, -1)), None);
        assert_eq!(d.update(false, (-1, -1)), None);
        assert_eq!(d.state(), DebounceState::BecomingUp(2));
        // Up carries the next buffered point, never the released reading
        assert_eq!(d.update(false, (-1, -1)), ev(EventKind::Up, p(7)));
        assert_eq!(d.state(), DebounceState::Up);
        assert_eq!(d.update(false, (-1, -1)), None);
    }

    #[test]
    fn test_touch_cancels_release() {
        let mut d = primed();
        d.update(false, (-1, -1));
        d.update(false, (-1, -1));
        assert_eq!(d.update(true, p(8)), None);
        assert_eq!(d.state(), DebounceState::Down);

        // The release count starts over
        assert_eq!(d.update(false, (-1, -1)), None);
        assert_eq!(d.update(false, (-1, -1)), None);
        assert_eq!(d.update(false, (-1, -1)), ev(EventKind::Up, p(4)));
    }

    #[test]
    fn test_release_while_priming_reports_seed() {
        let mut d = Debouncer::new();
        for i in 1..=4 {
            assert_eq!(d.update(true, p(i)), None);
        }
        d.update(false, (-1, -1));
        d.update(false, (-1, -1));
        assert_eq!(d.update(false, (-1, -1)), ev(EventKind::Up, p(3)));
    }

    #[test]
    fn test_second_touch_primes_again() {
        let mut d = primed();
        for _ in 0..3 {
            d.update(false, (-1, -1));
        }
        for i in 100..106 {
            assert_eq!(d.update(true, p(i)), None);
        }
        assert_eq!(d.update(true, p(106)), ev(EventKind::Down, p(102)));
        assert_eq!(d.update(true, p(107)), ev(EventKind::Move, p(103)));
    }

    #[test]
    fn test_queue_wraps() {
        let mut q = SampleQueue::new();
        q.reset((0, 0));
        for i in 1..QUEUE_DEPTH as i32 {
            assert_eq!(q.push((i, i)), None);
        }
        assert!(!q.is_primed());
        assert_eq!(
            q.push((4, 4)),
            Some(PointerEvent::new(EventKind::Down, 0, 0))
        );
        assert!(q.is_primed());
        for i in 5..40 {
            let old = i - QUEUE_DEPTH as i32;
            assert_eq!(q.oldest(), (old, old));
            assert_eq!(
                q.push((i, i)),
                Some(PointerEvent::new(EventKind::Move, old, old))
            );
        }
    }
}
