#![no_main]
#![no_std]

use core::cell::RefCell;
use core::fmt::Write;
use cortex_m;
use cortex_m::interrupt::Mutex;
use cortex_m_rt::entry;
use heapless::spsc::{Producer, Queue};
use panic_halt as _;

use stm32f0xx_hal as hal;

use touchscreen::{EngineConfig, Orientation, PointerEvent, TouchEngine, Variant, DEFAULT_ENGINE_CONFIG};

use crate::board::PanelPins;
use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;
use crate::scribble::Scribble;

mod board;
mod scribble;
mod serial;
mod trigger;

#[cfg(feature = "calibrate")]
const SCREEN_WIDTH: i32 = 320;
#[cfg(feature = "calibrate")]
const SCREEN_HEIGHT: i32 = 240;

const EVENT_Q_SIZE: usize = 16;

static TOUCH_CONFIG: EngineConfig = EngineConfig {
    orientation: Orientation::Landscape,
    ..DEFAULT_ENGINE_CONFIG
};

static TOUCH: Mutex<RefCell<Option<TouchEngine<PanelPins>>>> = Mutex::new(RefCell::new(None));
static mut EVENT_PRODUCER: Option<Producer<'static, PointerEvent, EVENT_Q_SIZE>> = None;

/// Runs in the ADC interrupt: hand the event to the main loop and get out
fn post_event(event: PointerEvent) {
    let producer = unsafe { EVENT_PRODUCER.as_mut().unwrap_unchecked() };
    // Drop the event if the main loop has fallen behind
    let _ = producer.enqueue(event);
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(48.mhz()).freeze(&mut flash);
    let gpiob = dp.GPIOB.split(&mut rcc);

    // A library requiring a critical section to set a gpio AF register is bad and I just won't.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    let tx_pin = gpiob.pb6.into_alternate_af0(&fake_cs);
    let rx_pin = gpiob.pb7.into_alternate_af0(&fake_cs);
    let uart = hal::serial::Serial::usart1(dp.USART1, (tx_pin, rx_pin), 115200.bps(), &mut rcc);
    serial::uart1::init(uart, 0xc0);

    static mut EVENT_Q: Queue<PointerEvent, EVENT_Q_SIZE> = Queue::new();
    let (event_producer, mut events) = unsafe { EVENT_Q.split() };
    unsafe {
        EVENT_PRODUCER = Some(event_producer);
    }

    let panel = PanelPins::new(dp.GPIOA, dp.ADC, dp.TIM2, &rcc);
    let mut touch = TouchEngine::new(panel, TOUCH_CONFIG);
    touch.initialize(Variant::Default);
    if cfg!(not(feature = "calibrate")) {
        touch.set_event_callback(Some(post_event));
    }

    let mut writer = serial::uart1::writer();
    writeln!(writer, "touch: {:?} min {}", touch.variant(), touch.touch_min()).ok();

    cortex_m::interrupt::free(|cs| {
        TOUCH.borrow(cs).replace(Some(touch));
    });

    unsafe {
        nvic.set_priority(pac::Interrupt::ADC_COMP, 0x40);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::ADC_COMP);
    }

    #[cfg(feature = "calibrate")]
    calibrate(&mut writer);

    let mut pad = Scribble::new();
    loop {
        while let Some(event) = events.dequeue() {
            pad.handle(event, &mut writer).ok();
        }
        cortex_m::asm::wfi();
    }
}

/// Walk the user through the three calibration targets and print the solved
/// matrix
#[cfg(feature = "calibrate")]
fn calibrate(writer: &mut serial::uart1::Uart1Tx) -> ! {
    use touchscreen::calibrate::{Calibrator, Progress};

    let mut calibrator = Calibrator::new(SCREEN_WIDTH, SCREEN_HEIGHT);
    let mut last_pair = 0;

    if let Some((x, y)) = calibrator.current_target() {
        writeln!(writer, "touch the box at {},{}", x, y).ok();
    }

    loop {
        let sample = cortex_m::interrupt::free(|cs| {
            TOUCH
                .borrow(cs)
                .borrow()
                .as_ref()
                .map(|t| (t.pairs(), t.raw_sample(), t.touch_min()))
        });
        let Some((pairs, raw, touch_min)) = sample else {
            continue;
        };
        if pairs == last_pair {
            cortex_m::asm::wfi();
            continue;
        }
        last_pair = pairs;

        match calibrator.push(raw, touch_min) {
            Progress::Pending(_) => {}
            Progress::Captured(_) => {
                if let Some((x, y)) = calibrator.current_target() {
                    writeln!(writer, "touch the box at {},{}", x, y).ok();
                }
            }
            Progress::Done(Ok(calibration)) => {
                writeln!(writer, "calibration data:").ok();
                for (i, m) in calibration.coefficients().iter().enumerate() {
                    writeln!(writer, "M{} = {}", i, m).ok();
                }
                loop {
                    cortex_m::asm::wfi();
                }
            }
            Progress::Done(Err(e)) => {
                writeln!(writer, "calibration failed: {}, starting over", e).ok();
                calibrator = Calibrator::new(SCREEN_WIDTH, SCREEN_HEIGHT);
                if let Some((x, y)) = calibrator.current_target() {
                    writeln!(writer, "touch the box at {},{}", x, y).ok();
                }
            }
        }
    }
}

#[interrupt]
fn ADC_COMP() {
    // We don't need the mutex, because the IRQ is the highest prio accessor.
    let fake_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };

    if let Some(touch) = TOUCH.borrow(&fake_cs).borrow_mut().as_mut() {
        touch.on_conversion_complete();
    }
}
