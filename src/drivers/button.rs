//! Debounced press counter for an active-low button.
//!
//! ## Hardware
//!
//! Momentary switch to ground with pull-up. The GPIO fires on the falling
//! edge; the ISR timestamps the edge and [`PressCounter::on_edge`] drops
//! edges closer than [`DEBOUNCE_MS`] to the last accepted one. Only the ISR
//! writes; readers load the count lock-free.

use core::sync::atomic::{AtomicU32, Ordering};

pub const DEBOUNCE_MS: u32 = 50;

#[derive(Debug, Default)]
pub struct PressCounter {
    count: AtomicU32,
    last_edge_ms: AtomicU32,
}

impl PressCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            last_edge_ms: AtomicU32::new(0),
        }
    }

    /// Record a falling edge at `now_ms`. Returns `true` if it counted.
    /// Safe to call from interrupt context.
    pub fn on_edge(&self, now_ms: u32) -> bool {
        let last = self.last_edge_ms.load(Ordering::Relaxed);
        let first = self.count.load(Ordering::Relaxed) == 0;
        if !first && now_ms.wrapping_sub(last) < DEBOUNCE_MS {
            return false;
        }
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);
        true
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

// ── GPIO ISR ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod isr {
    use std::sync::Arc;

    use esp_idf_sys::{
        ESP_ERR_INVALID_STATE, ESP_OK, EspError, esp_timer_get_time, gpio_install_isr_service,
        gpio_int_type_t_GPIO_INTR_NEGEDGE, gpio_intr_enable, gpio_isr_handler_add,
        gpio_set_intr_type,
    };
    use log::info;

    use super::PressCounter;

    unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
        // SAFETY: `arg` is the leaked `Arc<PressCounter>` from `attach`,
        // valid for the program lifetime. esp_timer_get_time is ISR-safe.
        let counter = unsafe { &*arg.cast::<PressCounter>() };
        let now_ms = (unsafe { esp_timer_get_time() } / 1_000) as u32;
        counter.on_edge(now_ms);
    }

    /// Count falling edges on `gpio` into `counter`. The pin must already be
    /// configured as an input with pull-up.
    pub fn attach(gpio: i32, counter: Arc<PressCounter>) -> Result<(), EspError> {
        // Never freed: the handler stays installed until reset.
        let arg = Arc::into_raw(counter).cast_mut().cast::<core::ffi::c_void>();
        // SAFETY: installing the ISR service is idempotent
        // (ESP_ERR_INVALID_STATE = already installed); `arg` outlives the
        // handler.
        unsafe {
            let ret = gpio_install_isr_service(0);
            if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
                return EspError::convert(ret);
            }
            EspError::convert(gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE))?;
            EspError::convert(gpio_isr_handler_add(gpio, Some(button_gpio_isr), arg))?;
            EspError::convert(gpio_intr_enable(gpio))?;
        }
        info!("button: ISR attached on GPIO{}", gpio);
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use isr::attach;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_edge_always_counts() {
        let c = PressCounter::new();
        assert!(c.on_edge(0));
        assert_eq!(c.count(), 1);
    }

    #[test]
    fn bounce_is_filtered() {
        let c = PressCounter::new();
        c.on_edge(1000);
        assert!(!c.on_edge(1010));
        assert!(!c.on_edge(1049));
        assert!(c.on_edge(1050));
        assert_eq!(c.count(), 2);
    }

    #[test]
    fn timestamp_wrap_is_handled() {
        let c = PressCounter::new();
        c.on_edge(u32::MAX - 10);
        assert!(!c.on_edge(20));
        assert!(c.on_edge(60));
    }
}
