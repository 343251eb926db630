//! Adapters from `embedded-hal` blocking SPI and GPIO traits.
//!
//! A microcontroller HAL already exposes its SPI peripheral as
//! [`Transfer<u8>`] and its pins as [`OutputPin`]. Wrapping them here lets
//! the same host code drive a peer from firmware instead of spidev.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use tracing::trace;

use crate::error::{BusError, Result};
use crate::traits::{ChipSelect, SpiTransfer};

/// An `embedded-hal` SPI peripheral used as a [`SpiTransfer`].
///
/// HAL transfers block without a deadline, so the timeout is checked after
/// the transfer returns.
#[derive(Debug)]
pub struct HalSpi<S> {
    spi: S,
}

impl<S> HalSpi<S> {
    pub fn new(spi: S) -> Self {
        Self { spi }
    }
}

impl<S> SpiTransfer for HalSpi<S>
where
    S: Transfer<u8>,
    S::Error: Debug,
{
    fn transfer_in_place(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let len = buf.len();
        let received = self
            .spi
            .transfer(buf)
            .map_err(|err| BusError::Fault(format!("spi transfer failed: {err:?}")))?;
        if received.len() != len {
            return Err(BusError::LengthMismatch {
                tx: len,
                rx: received.len(),
            });
        }
        if started.elapsed() > timeout {
            return Err(BusError::Timeout(timeout));
        }
        Ok(())
    }
}

/// An active-low `embedded-hal` output pin used as a [`ChipSelect`].
///
/// Asserting drives the pin low, releasing drives it high.
#[derive(Debug)]
pub struct PinSelect<P> {
    pin: P,
}

impl<P> PinSelect<P>
where
    P: OutputPin,
    P::Error: Debug,
{
    /// Take the pin and drive it high (released).
    pub fn new(mut pin: P) -> Result<Self> {
        pin.set_high()
            .map_err(|err| BusError::Select(format!("{err:?}")))?;
        Ok(Self { pin })
    }
}

impl<P> ChipSelect for PinSelect<P>
where
    P: OutputPin,
    P::Error: Debug,
{
    fn assert_select(&mut self) -> Result<()> {
        trace!("cs pin low");
        self.pin
            .set_low()
            .map_err(|err| BusError::Select(format!("{err:?}")))
    }

    fn release_select(&mut self) -> Result<()> {
        trace!("cs pin high");
        self.pin
            .set_high()
            .map_err(|err| BusError::Select(format!("{err:?}")))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::transaction::BusHandle;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Low,
        High,
        Transfer(usize),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Pin {
        log: Log,
        fail_low: bool,
    }

    impl OutputPin for Pin {
        type Error = &'static str;

        fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
            if self.fail_low {
                return Err("pin stuck");
            }
            self.log.borrow_mut().push(Event::Low);
            Ok(())
        }

        fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
            self.log.borrow_mut().push(Event::High);
            Ok(())
        }
    }

    /// Answers every byte with its complement.
    struct Peripheral {
        log: Log,
        fail: bool,
    }

    impl Transfer<u8> for Peripheral {
        type Error = &'static str;

        fn transfer<'w>(
            &mut self,
            words: &'w mut [u8],
        ) -> std::result::Result<&'w [u8], Self::Error> {
            if self.fail {
                return Err("overrun");
            }
            self.log.borrow_mut().push(Event::Transfer(words.len()));
            for word in words.iter_mut() {
                *word = !*word;
            }
            Ok(words)
        }
    }

    fn parts(fail_transfer: bool, fail_low: bool) -> (Log, HalSpi<Peripheral>, Pin) {
        let log = Log::default();
        let spi = HalSpi::new(Peripheral {
            log: log.clone(),
            fail: fail_transfer,
        });
        let pin = Pin {
            log: log.clone(),
            fail_low,
        };
        (log, spi, pin)
    }

    #[test]
    fn exchange_drives_pin_low_around_transfer() {
        let (log, spi, pin) = parts(false, false);
        let cs = PinSelect::new(pin).unwrap();
        let mut bus = BusHandle::new(spi, cs);
        let mut frame = [0x00, 0xFF, 0x0F];

        bus.exchange(&mut frame).unwrap();

        assert_eq!(frame, [0xFF, 0x00, 0xF0]);
        assert_eq!(
            *log.borrow(),
            vec![Event::High, Event::Low, Event::Transfer(3), Event::High]
        );
    }

    #[test]
    fn transfer_error_still_raises_pin() {
        let (log, spi, pin) = parts(true, false);
        let mut bus = BusHandle::new(spi, PinSelect::new(pin).unwrap());
        let mut frame = [0u8; 5];

        let err = bus.exchange(&mut frame).unwrap_err();

        assert!(matches!(err, BusError::Fault(ref msg) if msg.contains("overrun")));
        assert_eq!(*log.borrow(), vec![Event::High, Event::Low, Event::High]);
    }

    #[test]
    fn stuck_pin_is_a_select_error_and_skips_transfer() {
        let (log, spi, pin) = parts(false, true);
        let mut bus = BusHandle::new(spi, PinSelect::new(pin).unwrap());
        let mut frame = [0u8; 5];

        let err = bus.exchange(&mut frame).unwrap_err();

        assert!(matches!(err, BusError::Select(ref msg) if msg.contains("pin stuck")));
        assert!(!log.borrow().contains(&Event::Transfer(5)));
    }

    #[test]
    fn new_pin_select_starts_released() {
        let (log, _spi, pin) = parts(false, false);
        let _cs = PinSelect::new(pin).unwrap();
        assert_eq!(*log.borrow(), vec![Event::High]);
    }
}
