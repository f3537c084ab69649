//! Panel scanning state machine.
//!
//! A resistive panel is read one axis at a time: drive a voltage gradient
//! across one layer and sense the other. After every change of drive the
//! first conversion is thrown away because the panel has not settled yet, so
//! one X/Y pair takes four conversions:
//!
//! ```text
//! Init -> SkipX -> ReadX -> SkipY -> ReadY -> SkipX -> ...
//! ```
//!
//! The engine advances by one state per conversion complete interrupt and
//! runs the debouncer once per pair, when leaving `ReadY`.
//!
//! `initialize` and `set_event_callback` are meant for setup code. The engine
//! does no locking of its own; if the conversion interrupt may already be
//! running, the caller has to keep it out while they are called.

use crate::calibration::{Calibration, Variant};
use crate::debounce::{DebounceState, Debouncer};
use crate::{EngineConfig, EventCallback, PointerEvent, RawSample};

/// Electrode configuration applied before the next conversion
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrivePhase {
    /// All electrodes driven low
    Release,
    /// X layer driven across, Y layer grounded to discharge it, ADC on the Y
    /// layer's positive electrode
    DriveX,
    /// Y layer released so it floats to the X layer voltage at the touch point
    SenseX,
    /// Y layer driven across, X layer grounded to discharge it, ADC on the X
    /// layer's positive electrode
    DriveY,
    /// X layer released so it floats to the Y layer voltage at the touch point
    SenseY,
}

/// The board side of the touch panel: electrode drive, the ADC and the timer
/// that triggers conversions.
pub trait Panel {
    /// Result of the conversion that just completed. Also acknowledges it.
    fn read_conversion(&mut self) -> i16;

    /// Set electrode directions and levels and select the ADC channel for the
    /// next conversion
    fn drive(&mut self, phase: DrivePhase);

    /// True if the conversion trigger is already running, for instance
    /// because another driver sharing the timer set it up
    fn trigger_armed(&self) -> bool;

    /// Start triggering one conversion every `1 / rate_hz` seconds
    fn arm_trigger(&mut self, rate_hz: u32);
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Init,
    SkipX,
    ReadX,
    SkipY,
    ReadY,
}

pub struct TouchEngine<P> {
    panel: P,
    config: EngineConfig,
    variant: Variant,
    calibration: Calibration,
    touch_min: i16,
    state: AcquisitionState,
    raw: RawSample,
    debouncer: Debouncer,
    callback: Option<EventCallback>,
    pairs: u32,
}

impl<P: Panel> TouchEngine<P> {
    /// Create an engine around a board panel. Nothing is touched until
    /// `initialize` is called.
    pub fn new(panel: P, config: EngineConfig) -> Self {
        let variant = Variant::Default;
        Self {
            panel,
            config,
            variant,
            calibration: Calibration::for_panel(variant, config.orientation),
            touch_min: config.touch_min.unwrap_or(variant.touch_min()),
            state: AcquisitionState::Init,
            raw: RawSample::default(),
            debouncer: Debouncer::new(),
            callback: None,
            pairs: 0,
        }
    }

    /// Select the calibration and threshold for `variant`, reset the state
    /// machine, drop the callback and start the conversion trigger.
    ///
    /// The trigger is only armed if it is not running already, so calling
    /// this again is safe.
    pub fn initialize(&mut self, variant: Variant) {
        self.state = AcquisitionState::Init;
        self.variant = variant;
        self.calibration = Calibration::for_panel(variant, self.config.orientation);
        self.touch_min = self.config.touch_min.unwrap_or(variant.touch_min());
        self.raw = RawSample::default();
        self.debouncer = Debouncer::new();
        self.callback = None;

        self.panel.drive(DrivePhase::Release);

        if !self.panel.trigger_armed() {
            self.panel.arm_trigger(self.config.sample_rate_hz);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("touch init {} min {}", variant, self.touch_min);
    }

    /// Replace the event callback. `None` unregisters it.
    pub fn set_event_callback(&mut self, callback: Option<EventCallback>) {
        self.callback = callback;
    }

    /// Advance the scan by one conversion. Call from the conversion complete
    /// interrupt.
    ///
    /// Returns the event delivered to the callback, if any.
    pub fn on_conversion_complete(&mut self) -> Option<PointerEvent> {
        let reading = self.panel.read_conversion();

        match self.state {
            AcquisitionState::SkipX => {
                self.panel.drive(DrivePhase::SenseX);
                self.state = AcquisitionState::ReadX;
                None
            }
            AcquisitionState::ReadX => {
                self.raw.x = reading;
                self.panel.drive(DrivePhase::DriveY);
                self.state = AcquisitionState::SkipY;
                None
            }
            AcquisitionState::SkipY => {
                self.panel.drive(DrivePhase::SenseY);
                self.state = AcquisitionState::ReadY;
                None
            }
            AcquisitionState::Init => {
                self.panel.drive(DrivePhase::DriveX);
                self.state = AcquisitionState::SkipX;
                None
            }
            AcquisitionState::ReadY => {
                self.raw.y = reading;
                self.panel.drive(DrivePhase::DriveX);
                self.state = AcquisitionState::SkipX;
                self.debounce()
            }
        }
    }

    fn debounce(&mut self) -> Option<PointerEvent> {
        self.pairs = self.pairs.wrapping_add(1);

        let point = self.calibration.transform(self.raw.x, self.raw.y);
        let touching = self.raw.is_touching(self.touch_min);

        #[cfg(feature = "defmt")]
        defmt::trace!("raw {} -> {}, {}", self.raw, point.0, point.1);

        let event = self.debouncer.update(touching, point)?;
        if let Some(callback) = self.callback {
            callback(event);
        }
        Some(event)
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn pen_state(&self) -> DebounceState {
        self.debouncer.state()
    }

    /// Last committed raw readings
    pub fn raw_sample(&self) -> RawSample {
        self.raw
    }

    /// Minimum raw reading counted as a touch
    pub fn touch_min(&self) -> i16 {
        self.touch_min
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Number of complete X/Y pairs debounced so far, wrapping
    pub fn pairs(&self) -> u32 {
        self.pairs
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::calibration::Orientation;
    use crate::{EventKind, DEFAULT_ENGINE_CONFIG};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted panel: hands out queued readings (0 once empty) and records
    /// every drive phase and trigger arm.
    #[derive(Default)]
    struct MockPanel {
        readings: VecDeque<i16>,
        phases: Vec<DrivePhase>,
        armed_at: Vec<u32>,
    }

    impl MockPanel {
        fn queue_pair(&mut self, x: i16, y: i16) {
            // SkipX, ReadX, SkipY, ReadY
            self.readings.extend([0, x, 0, y]);
        }
    }

    impl Panel for MockPanel {
        fn read_conversion(&mut self) -> i16 {
            self.readings.pop_front().unwrap_or(0)
        }

        fn drive(&mut self, phase: DrivePhase) {
            self.phases.push(phase);
        }

        fn trigger_armed(&self) -> bool {
            !self.armed_at.is_empty()
        }

        fn arm_trigger(&mut self, rate_hz: u32) {
            self.armed_at.push(rate_hz);
        }
    }

    fn engine(config: EngineConfig, variant: Variant) -> TouchEngine<MockPanel> {
        let mut engine = TouchEngine::new(MockPanel::default(), config);
        engine.initialize(variant);
        // Leave Init so that every four conversions make one pair
        engine.panel_mut().readings.push_back(0);
        assert_eq!(engine.on_conversion_complete(), None);
        engine
    }

    /// Run one full X/Y pair through the engine
    fn feed(engine: &mut TouchEngine<MockPanel>, x: i16, y: i16) -> Option<PointerEvent> {
        engine.panel_mut().queue_pair(x, y);
        let mut events = Vec::new();
        for _ in 0..4 {
            events.extend(engine.on_conversion_complete());
        }
        assert!(events.len() <= 1);
        events.pop()
    }

    #[test]
    fn test_scan_sequence() {
        let mut e = TouchEngine::new(MockPanel::default(), DEFAULT_ENGINE_CONFIG);
        e.initialize(Variant::Default);
        assert_eq!(e.state(), AcquisitionState::Init);

        let expected = [
            (AcquisitionState::SkipX, DrivePhase::DriveX),
            (AcquisitionState::ReadX, DrivePhase::SenseX),
            (AcquisitionState::SkipY, DrivePhase::DriveY),
            (AcquisitionState::ReadY, DrivePhase::SenseY),
            (AcquisitionState::SkipX, DrivePhase::DriveX),
            (AcquisitionState::ReadX, DrivePhase::SenseX),
        ];
        for (state, phase) in expected {
            e.on_conversion_complete();
            assert_eq!(e.state(), state);
            assert_eq!(e.panel().phases.last(), Some(&phase));
        }
        assert_eq!(e.panel().phases[0], DrivePhase::Release);
    }

    #[test]
    fn test_one_pair_per_four_conversions() {
        let mut e = engine(DEFAULT_ENGINE_CONFIG, Variant::Default);
        assert_eq!(e.pairs(), 0);

        for n in 1..=5u32 {
            let start = e.state();
            for _ in 0..4 {
                e.on_conversion_complete();
            }
            assert_eq!(e.state(), start);
            assert_eq!(e.pairs(), n);
        }

        // Starting mid-cycle makes no difference
        e.on_conversion_complete();
        let start = e.state();
        let pairs = e.pairs();
        for _ in 0..4 {
            e.on_conversion_complete();
        }
        assert_eq!(e.state(), start);
        assert_eq!(e.pairs(), pairs + 1);
    }

    #[test]
    fn test_skipped_conversions_are_discarded() {
        let mut e = engine(DEFAULT_ENGINE_CONFIG, Variant::Default);
        e.panel_mut().readings.extend([999, 321, 888, 654]);
        for _ in 0..4 {
            e.on_conversion_complete();
        }
        assert_eq!(e.raw_sample(), RawSample::new(321, 654));
    }

    #[test]
    fn test_landscape_scenario() {
        let config = EngineConfig {
            orientation: Orientation::Landscape,
            touch_min: Some(0),
            ..DEFAULT_ENGINE_CONFIG
        };
        let mut e = engine(config, Variant::Default);
        assert_eq!(e.touch_min(), 0);

        let events: Vec<_> = (0..10).map(|_| feed(&mut e, 500, 500)).collect();

        for event in &events[..6] {
            assert_eq!(*event, None);
        }
        assert_eq!(events[6], Some(PointerEvent::new(EventKind::Down, 125, 151)));
        for event in &events[7..] {
            assert_eq!(*event, Some(PointerEvent::new(EventKind::Move, 125, 151)));
        }
    }

    #[test]
    fn test_threshold_from_variant() {
        let e = engine(DEFAULT_ENGINE_CONFIG, Variant::SramFlash);
        assert_eq!(e.touch_min(), 40);

        let mut e = engine(DEFAULT_ENGINE_CONFIG, Variant::Fpga);
        assert_eq!(e.touch_min(), 70);

        // 60 is a touch on the SRAM/flash board but not on the FPGA board
        for _ in 0..10 {
            assert_eq!(feed(&mut e, 60, 500), None);
        }
        assert_eq!(e.pen_state(), DebounceState::Up);
    }

    #[test]
    fn test_partial_contact_is_not_a_touch() {
        let mut e = engine(DEFAULT_ENGINE_CONFIG, Variant::Default);
        for _ in 0..10 {
            assert_eq!(feed(&mut e, 800, 100), None);
            assert_eq!(feed(&mut e, 100, 800), None);
        }
        assert_eq!(e.pen_state(), DebounceState::Up);
    }

    #[test]
    fn test_press_and_release() {
        let mut e = engine(DEFAULT_ENGINE_CONFIG, Variant::Default);
        let cal = e.calibration();

        let mut events = Vec::new();
        for i in 0..10 {
            events.extend(feed(&mut e, 300 + 10 * i, 600 - 10 * i));
        }
        for _ in 0..3 {
            events.extend(feed(&mut e, 0, 0));
        }

        let at = |i: i16, kind| {
            let (x, y) = cal.transform(300 + 10 * i, 600 - 10 * i);
            PointerEvent::new(kind, x, y)
        };
        assert_eq!(
            events,
            vec![
                at(2, EventKind::Down),
                at(3, EventKind::Move),
                at(4, EventKind::Move),
                at(5, EventKind::Move),
                at(6, EventKind::Up),
            ]
        );
    }

    thread_local! {
        static SEEN: RefCell<Vec<PointerEvent>> = RefCell::new(Vec::new());
    }

    fn record(event: PointerEvent) {
        SEEN.with(|seen| seen.borrow_mut().push(event));
    }

    #[test]
    fn test_callback_delivery() {
        let config = EngineConfig {
            touch_min: Some(0),
            ..DEFAULT_ENGINE_CONFIG
        };
        let mut e = engine(config, Variant::Default);
        SEEN.with(|seen| seen.borrow_mut().clear());
        e.set_event_callback(Some(record));

        for _ in 0..8 {
            feed(&mut e, 500, 500);
        }
        let kinds: Vec<_> = SEEN.with(|seen| seen.borrow().iter().map(|ev| ev.kind).collect());
        assert_eq!(kinds, vec![EventKind::Down, EventKind::Move]);

        // Unregistered: events are still returned but nothing is recorded
        e.set_event_callback(None);
        assert!(feed(&mut e, 500, 500).is_some());
        assert_eq!(SEEN.with(|seen| seen.borrow().len()), 2);
    }

    #[test]
    fn test_reinitialize() {
        let mut e = TouchEngine::new(MockPanel::default(), DEFAULT_ENGINE_CONFIG);
        e.initialize(Variant::Default);
        e.set_event_callback(Some(record));
        for _ in 0..3 {
            e.on_conversion_complete();
        }
        assert_ne!(e.state(), AcquisitionState::Init);

        e.initialize(Variant::Fpga);
        assert_eq!(e.state(), AcquisitionState::Init);
        assert_eq!(e.panel().armed_at, vec![1000]);
        assert_eq!(e.variant(), Variant::Fpga);
        assert_eq!(
            e.calibration(),
            Calibration::for_panel(Variant::Fpga, Orientation::LandscapeFlip)
        );
        assert!(e.callback.is_none());
    }

    #[test]
    fn test_trigger_rate_from_config() {
        let config = EngineConfig {
            sample_rate_hz: 2000,
            ..DEFAULT_ENGINE_CONFIG
        };
        let e = engine(config, Variant::Default);
        assert_eq!(e.panel().armed_at, vec![2000]);
    }
}
