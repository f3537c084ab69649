//! Resistive panel wiring for the scribble board.
//!
//! The four panel electrodes sit on PA0..PA3. The two positive electrodes
//! double as ADC inputs, so the ADC always senses on the positive side of the
//! layer that is not being driven.
//!
//! | pin | electrode | ADC  |
//! |-----|-----------|------|
//! | PA0 | XP        | IN0  |
//! | PA1 | YP        | IN1  |
//! | PA2 | XN        |      |
//! | PA3 | YN        |      |
//!
//! The GPIO and ADC are driven through raw registers: pin modes change on
//! every conversion and the HAL's typestate pins can't follow that.

use touchscreen::{DrivePhase, Panel};

use crate::hal::rcc::Rcc;
use crate::pac;
use crate::trigger::ConversionTimer;

const XP: u32 = 0;
const YP: u32 = 1;
const XN: u32 = 2;
const YN: u32 = 3;

const ADC_CH_XP: u32 = 0;
const ADC_CH_YP: u32 = 1;

// GPIO MODER values
const MODE_INPUT: u32 = 0b00;
const MODE_OUTPUT: u32 = 0b01;
const MODE_ANALOG: u32 = 0b11;

// ADC register bits
const ADC_ISR_ADRDY: u32 = 1 << 0;
const ADC_ISR_EOC: u32 = 1 << 2;
const ADC_ISR_EOSEQ: u32 = 1 << 3;
const ADC_CR_ADEN: u32 = 1 << 0;
const ADC_CR_ADSTART: u32 = 1 << 2;
const ADC_CR_ADSTP: u32 = 1 << 4;
const ADC_CR_ADCAL: u32 = 1 << 31;
// EXTEN = 01 (rising edge), EXTSEL = 010 (TIM2_TRGO), 12 bit, right aligned
const ADC_CFGR1_TIM2_TRIGGER: u32 = (0b01 << 10) | (0b010 << 6);
// 239.5 cycles: the panel is a high impedance source
const ADC_SMPR_SLOW: u32 = 0b111;

pub struct PanelPins {
    gpio: pac::GPIOA,
    adc: pac::ADC,
    trigger: ConversionTimer,
}

impl PanelPins {
    pub fn new(gpio: pac::GPIOA, adc: pac::ADC, tim: pac::TIM2, rcc: &Rcc) -> Self {
        let rccregs = unsafe { pac::Peripherals::steal().RCC };
        rccregs.ahbenr.modify(|_, w| w.iopaen().set_bit());
        rccregs.apb2enr.modify(|_, w| w.adcen().set_bit());

        // Calibrate with the ADC disabled, then enable it
        adc.cr.write(|w| unsafe { w.bits(ADC_CR_ADCAL) });
        while adc.cr.read().bits() & ADC_CR_ADCAL != 0 {}
        adc.cfgr1.write(|w| unsafe { w.bits(ADC_CFGR1_TIM2_TRIGGER) });
        adc.smpr.write(|w| unsafe { w.bits(ADC_SMPR_SLOW) });
        adc.chselr.write(|w| unsafe { w.bits(1 << ADC_CH_YP) });
        adc.ier.write(|w| unsafe { w.bits(ADC_ISR_EOC) });
        adc.cr.write(|w| unsafe { w.bits(ADC_CR_ADEN) });
        while adc.isr.read().bits() & ADC_ISR_ADRDY == 0 {}
        adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADSTART) });

        Self {
            gpio,
            adc,
            trigger: ConversionTimer::new(tim, rcc),
        }
    }

    fn set_mode(&mut self, pin: u32, mode: u32) {
        self.gpio.moder.modify(|r, w| unsafe {
            w.bits((r.bits() & !(0b11 << (pin * 2))) | (mode << (pin * 2)))
        });
    }

    /// Drive `high` to VDD and every pin in `low` to GND
    fn drive_levels(&mut self, high: Option<u32>, low: &[u32]) {
        let mut bsrr = 0;
        for pin in low {
            bsrr |= 1 << (pin + 16);
        }
        if let Some(pin) = high {
            bsrr |= 1 << pin;
        }
        self.gpio.bsrr.write(|w| unsafe { w.bits(bsrr) });

        for pin in [XP, YP, XN, YN] {
            self.set_mode(pin, MODE_OUTPUT);
        }
    }

    /// The channel can only be changed while no conversion is armed
    fn select_channel(&mut self, channel: u32) {
        self.adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADSTP) });
        while self.adc.cr.read().bits() & ADC_CR_ADSTART != 0 {}
        self.adc.chselr.write(|w| unsafe { w.bits(1 << channel) });
        self.adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADSTART) });
    }
}

impl Panel for PanelPins {
    fn read_conversion(&mut self) -> i16 {
        let value = self.adc.dr.read().bits() as i16;
        self.adc.isr.write(|w| unsafe { w.bits(ADC_ISR_EOC | ADC_ISR_EOSEQ) });
        value
    }

    fn drive(&mut self, phase: DrivePhase) {
        match phase {
            DrivePhase::Release => {
                self.drive_levels(None, &[XP, YP, XN, YN]);
            }
            DrivePhase::DriveX => {
                self.drive_levels(Some(XP), &[XN, YP, YN]);
                self.select_channel(ADC_CH_YP);
            }
            DrivePhase::SenseX => {
                self.set_mode(YP, MODE_ANALOG);
                self.set_mode(YN, MODE_INPUT);
            }
            DrivePhase::DriveY => {
                self.drive_levels(Some(YP), &[YN, XP, XN]);
                self.select_channel(ADC_CH_XP);
            }
            DrivePhase::SenseY => {
                self.set_mode(XP, MODE_ANALOG);
                self.set_mode(XN, MODE_INPUT);
            }
        }
    }

    fn trigger_armed(&self) -> bool {
        self.trigger.is_running()
    }

    fn arm_trigger(&mut self, rate_hz: u32) {
        self.trigger.start(rate_hz);
    }
}
