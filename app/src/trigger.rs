use crate::pac;
use crate::hal::rcc::Rcc;

/// TIM2 in master mode, pulsing TRGO on every update event. The ADC uses TRGO
/// as its external conversion trigger.
pub struct ConversionTimer {
    tim: pac::TIM2,
    clk_freq: u32,
}

impl ConversionTimer {
    pub fn new(tim: pac::TIM2, rcc: &Rcc) -> Self {
        let rccregs = unsafe { pac::Peripherals::steal().RCC };
        rccregs.apb1enr.modify(|_, w| w.tim2en().set_bit());

        // If pclk is prescaled from hclk, the frequency fed into the timers is doubled
        let clk_freq = if rcc.clocks.hclk().0 == rcc.clocks.pclk().0 {
            rcc.clocks.pclk().0
        } else {
            rcc.clocks.pclk().0 * 2
        };

        // MMS = 010: update event drives TRGO
        tim.cr2.write(|w| unsafe { w.bits(0b010 << 4) });

        Self { tim, clk_freq }
    }

    pub fn is_running(&self) -> bool {
        self.tim.cr1.read().cen().bit_is_set()
    }

    pub fn start(&mut self, freq: u32) {
        let arr = self.clk_freq / freq;
        self.tim.arr.write(|w| w.arr().bits(arr));
        self.tim.egr.write(|w| w.ug().set_bit());
        self.tim.cr1.modify(|_, w| {
            w.cen().set_bit()
            .arpe().set_bit()
        });
    }
}
