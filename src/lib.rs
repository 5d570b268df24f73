//! # BH1750 driver
//! A platform-agnostic, 'no_std' compatible Rust driver for the BH1750 ambient light sensor using the `embedded-hal` traits.
//!
//! The I²C instruction set is based on the following datasheet: [BH1750 datasheet](https://www.mouser.com/datasheet/2/348/bh1750fvi-e-186247.pdf) \
//! All instructions are implemented and supported.
//!
//! Measurements are reported as whole lux (`raw * 5 / 6`, halved in the highest resolution mode),
//! computed without floating point arithmetic.
//!
//! ## Usage
//! To use this driver, import it and an `embedded_hal` implementation, then create an instance of the driver.
//!
//! You can call `measure_once` to get a single measurement from the sensor.
//!
//! Alternatively, you can call `start_continuous` to start continuous measurements and then call `fetch_measured`
//! to get the latest measurement. `start_continuous` returns the time to wait between two fetches.
//!
//! The driver logs through the [`log`](https://docs.rs/log) facade, install any logger to see its output.
//!
//! ## Example
//! This example drives a mocked bus, on real hardware pass the HAL's I²C peripheral and delay instead.
//!
//! ```
//! use bh1750_lux::{BH1750, Resolution};
//! use embedded_hal_mock::eh1::delay::NoopDelay;
//! use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
//!
//! let expectations = [
//!     I2cTransaction::write(0x23, vec![0x20]),
//!     I2cTransaction::read(0x23, vec![0x01, 0x68]),
//! ];
//! let mut bh1750 = BH1750::new(I2cMock::new(&expectations), NoopDelay::new(), false);
//!
//! let lux = bh1750.measure_once(Resolution::High).unwrap();
//! assert_eq!(lux, 300);
//!
//! let (mut i2c, _delay) = bh1750.release();
//! i2c.done();
//! ```

#![no_std]
extern crate embedded_hal;

use core::fmt;
use core::time::Duration;

use embedded_hal::delay;
use embedded_hal::i2c::I2c;

const DEFAULT_SENSITIVITY_FACTOR: u8 = 69;
const MIN_SENSITIVITY_FACTOR: u8 = 31;
const MAX_SENSITIVITY_FACTOR: u8 = 254;

const STANDARD_ADDRESS_HIGH: u8 = 0x5c;
const STANDARD_ADDRESS_LOW: u8 = 0x23;

const POWER_DOWN_INSTRUCTION: u8 = 0b0000_0000;
const POWER_ON_INSTRUCTION: u8 = 0b0000_0001;
const RESET_INSTRUCTION: u8 = 0b0000_0111;
const CHANGE_MTREG_HIGH_INSTRUCTION: u8 = 0b0100_0000; // Last 3 bits are the value
const CHANGE_MTREG_LOW_INSTRUCTION: u8 = 0b0110_0000; // Last 5 bits are the value

const RESET_SETTLE_US: u32 = 3;

/// Enum representing the possible errors that can occur when using the BH1750 driver
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BH1750Error<I2CError> {
    /// The sensitivity factor is outside 31..=254
    SensitivityFactorOutOfRange(u8),
    /// `fetch_measured` was called while no continuous measurement is running
    ContinuousMeasurementNotStarted,
    /// I²C error
    I2C(I2CError),
}

impl<I2CError> From<I2CError> for BH1750Error<I2CError> {
    fn from(err: I2CError) -> Self {
        BH1750Error::I2C(err)
    }
}

impl<I2CError: fmt::Debug> fmt::Display for BH1750Error<I2CError> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BH1750Error::SensitivityFactorOutOfRange(factor) => write!(
                f,
                "sensitivity factor {} outside range [{}..{}]",
                factor, MIN_SENSITIVITY_FACTOR, MAX_SENSITIVITY_FACTOR
            ),
            BH1750Error::ContinuousMeasurementNotStarted => f.write_str(
                "can't fetch measured ambient light, last command was not a continuous measurement",
            ),
            BH1750Error::I2C(err) => write!(f, "I²C error: {:?}", err),
        }
    }
}

/// Enum representing the possible resolution modes of the sensor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    Low, // 4 lx resolution
    High, // 1 lx resolution
    Highest, // 0.5 lx resolution
}

impl Resolution {
    const fn one_time_measurement_instruction(&self) -> u8 {
        match self {
            Resolution::Low => 0b0010_0011,
            Resolution::High => 0b0010_0000,
            Resolution::Highest => 0b0010_0001,
        }
    }

    const fn continuous_measurement_instruction(&self) -> u8 {
        match self {
            Resolution::Low => 0b0001_0011,
            Resolution::High => 0b0001_0000,
            Resolution::Highest => 0b0001_0001,
        }
    }

    // Low is typically 16 ms, the 24 ms maximum gives more stable readings
    const fn base_wait_ms(&self) -> u32 {
        match self {
            Resolution::Low => 24,
            Resolution::High => 120,
            Resolution::Highest => 120,
        }
    }

    const fn divider(&self) -> u32 {
        match self {
            Resolution::Low | Resolution::High => 1,
            Resolution::Highest => 2,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Low => "Low Resolution",
            Resolution::High => "High Resolution",
            Resolution::Highest => "Highest Resolution",
        };
        return f.write_str(name);
    }
}

pub struct BH1750<I2C, DELAY> {
    com: I2C,
    delay: DELAY,
    address: u8,
    // The sensor has no status register, so the last instruction stands in for it
    last_instruction: Option<u8>,
    last_resolution: Option<Resolution>,
    sensitivity_factor: u8,
}

impl<I2C: I2c, DELAY: delay::DelayNs> BH1750<I2C, DELAY> {
    /// Create a new instance of the BH1750 driver
    ///
    /// # Arguments
    /// * `i2c` - The I2C bus the sensor is connected to
    /// * `delay` - The delay provider
    /// * `address_pin_high` - The state of the address pin on the sensor (This determines the I2C address)
    pub fn new(i2c: I2C, delay: DELAY, address_pin_high: bool) -> Self {
        let address = if address_pin_high { STANDARD_ADDRESS_HIGH } else { STANDARD_ADDRESS_LOW };
        return Self::new_with_address(i2c, delay, address);
    }

    /// Create a new instance of the BH1750 driver with a custom I2C address
    /// This is useful if you have a sensor that has been modified to use a different address
    ///
    /// # Arguments
    /// * `i2c` - The I2C bus the sensor is connected to
    /// * `delay` - The delay provider
    /// * `address` - The I2C address of the sensor
    pub fn new_with_address(i2c: I2C, delay: DELAY, address: u8) -> Self {
        return Self {
            com: i2c,
            delay,
            address,
            last_instruction: None,
            last_resolution: None,
            sensitivity_factor: DEFAULT_SENSITIVITY_FACTOR,
        };
    }

    /// Destroys the driver, giving back the I2C bus and the delay provider
    pub fn release(self) -> (I2C, DELAY) {
        return (self.com, self.delay);
    }

    pub fn address(&self) -> u8 {
        return self.address;
    }

    /// The sensitivity factor to use for a sensor without a protective cover (69, as per datasheet)
    pub const fn default_sensitivity_factor() -> u8 {
        return DEFAULT_SENSITIVITY_FACTOR;
    }

    pub fn sensitivity_factor(&self) -> u8 {
        return self.sensitivity_factor;
    }

    /// Gets the time a measurement at the given resolution takes, taking into account the current sensitivity factor
    /// This is the same duration `start_continuous` recommends waiting between fetches
    ///
    /// # Arguments
    /// * `resolution` - The resolution to get the measurement time for
    pub fn measurement_time(&self, resolution: Resolution) -> Duration {
        return Duration::from_nanos(self.measurement_time_ns(resolution) as u64);
    }

    /// Clears the data register
    /// The sensor does not accept this instruction while powered down, call `power_on` first
    pub fn reset(&mut self) -> Result<(), BH1750Error<I2C::Error>> {
        log::debug!("Reset sensor...");
        self.send_instruction(RESET_INSTRUCTION)?;
        self.last_instruction = Some(RESET_INSTRUCTION);
        self.delay.delay_us(RESET_SETTLE_US);
        return Ok(());
    }

    /// Returns the sensor to its idle state, this also stops continuous measurements
    pub fn power_down(&mut self) -> Result<(), BH1750Error<I2C::Error>> {
        log::debug!("Power down sensor...");
        self.send_instruction(POWER_DOWN_INSTRUCTION)?;
        self.last_instruction = Some(POWER_DOWN_INSTRUCTION);
        return Ok(());
    }

    /// Wakes the sensor up, it then waits for a measurement instruction
    pub fn power_on(&mut self) -> Result<(), BH1750Error<I2C::Error>> {
        log::debug!("Power on sensor...");
        self.send_instruction(POWER_ON_INSTRUCTION)?;
        self.last_instruction = Some(POWER_ON_INSTRUCTION);
        return Ok(());
    }

    /// Takes a single measurement and returns it in lux
    /// The sensor is automatically set to power down mode after the measurement is taken
    ///
    /// This function is blocking and will wait for the measurement to complete
    ///
    /// # Arguments
    /// * `resolution` - The resolution to take the measurement at
    pub fn measure_once(&mut self, resolution: Resolution) -> Result<u16, BH1750Error<I2C::Error>> {
        log::debug!("Run one time measure ({})...", resolution);
        let instruction = resolution.one_time_measurement_instruction();
        self.send_instruction(instruction)?;
        self.last_instruction = Some(instruction);
        self.last_resolution = Some(resolution);

        let wait_ns = self.measurement_time_ns(resolution);
        self.delay.delay_ns(wait_ns);

        return self.read_lux(resolution);
    }

    /// Starts continuous measurement at a given resolution and waits for the first measurement to complete
    /// The measurements can then be read using `fetch_measured`, `power_down` stops them
    ///
    /// Returns the time to wait between two fetches, the sensor keeps averaging in between so waiting
    /// longer is harmless
    ///
    /// # Arguments
    /// * `resolution` - The resolution to take the measurements at
    pub fn start_continuous(&mut self, resolution: Resolution) -> Result<Duration, BH1750Error<I2C::Error>> {
        log::debug!("Start measures continuously ({})...", resolution);
        let instruction = resolution.continuous_measurement_instruction();
        self.send_instruction(instruction)?;
        self.last_instruction = Some(instruction);
        self.last_resolution = Some(resolution);

        let wait_ns = self.measurement_time_ns(resolution);
        self.delay.delay_ns(wait_ns);

        return Ok(Duration::from_nanos(wait_ns as u64));
    }

    /// Gets the latest continuous measurement from the sensor in lux
    /// This function is non-blocking
    ///
    /// Fails with `ContinuousMeasurementNotStarted` unless the last instruction sent was `start_continuous`
    pub fn fetch_measured(&mut self) -> Result<u16, BH1750Error<I2C::Error>> {
        log::debug!("Fetch measured data...");
        let resolution = match self.last_resolution {
            Some(resolution) if self.last_instruction == Some(resolution.continuous_measurement_instruction()) => {
                resolution
            }
            _ => {
                log::warn!("Fetch rejected, last instruction was {:?}", self.last_instruction);
                return Err(BH1750Error::ContinuousMeasurementNotStarted);
            }
        };

        return self.read_lux(resolution);
    }

    /// Sets the sensitivity factor (the measurement time register)
    /// Use this to calibrate a sensor behind a protective cover, which lets less light through
    /// Higher values result in longer measurement times and higher sensitivity
    ///
    /// The sensitivity factor must be between 31 and 254 (inclusive), default is 69
    ///
    /// # Arguments
    /// * `factor` - The value to set the measurement time register to (31-254)
    pub fn change_sensitivity_factor(&mut self, factor: u8) -> Result<(), BH1750Error<I2C::Error>> {
        log::debug!("Change sensitivity factor to {}...", factor);
        if factor < MIN_SENSITIVITY_FACTOR || factor > MAX_SENSITIVITY_FACTOR {
            log::warn!("Sensitivity factor {} rejected", factor);
            return Err(BH1750Error::SensitivityFactorOutOfRange(factor));
        }

        self.send_instruction(CHANGE_MTREG_HIGH_INSTRUCTION | (factor >> 5))?;
        self.send_instruction(CHANGE_MTREG_LOW_INSTRUCTION | (factor & 0b0001_1111))?;

        self.sensitivity_factor = factor;

        return Ok(());
    }

    // Fits in u32: 120 ms * 254 / 69 is below 0.5 s
    fn measurement_time_ns(&self, resolution: Resolution) -> u32 {
        let base_ns = resolution.base_wait_ms() as u64 * 1_000_000;
        let scaled = base_ns * self.sensitivity_factor as u64 / DEFAULT_SENSITIVITY_FACTOR as u64;
        return scaled as u32;
    }

    fn send_instruction(&mut self, instr: u8) -> Result<(), BH1750Error<I2C::Error>> {
        self.com.write(self.address, &[instr])?;
        return Ok(());
    }

    fn read_lux(&mut self, resolution: Resolution) -> Result<u16, BH1750Error<I2C::Error>> {
        let mut data: [u8; 2] = [0; 2];
        self.com.read(self.address, &mut data)?;
        let raw = u16::from_be_bytes(data);
        log::trace!("Raw measurement {:#06x}", raw);
        return Ok(raw_to_lux(raw, resolution));
    }
}

fn raw_to_lux(raw: u16, resolution: Resolution) -> u16 {
    return (raw as u32 * 5 / 6 / resolution.divider()) as u16;
}
