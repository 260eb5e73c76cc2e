/// Transfer functions from raw sensor codes to physical units
///
/// Each physical sensor model on the device has one function. The formulas
/// reproduce the firmware vendor's reference conversions, so the constants
/// below must not be rounded or rearranged.
use crate::models::CalibrationParameters;

/// Conversion applied to a sensor's raw value
///
/// The set of sensor models is fixed by the device hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Raw value is already in its final unit
    Identity,
    /// Button press duration in milliseconds to seconds
    Button,
    /// LM94022 thermistor bridge sampled through the RN171 SMU
    Lm94022Temperature,
    /// SFH3710 photodiode sampled through the RN171 SMU
    Sfh3710Light,
    /// Soil temperature probe
    SoilTemperature,
    /// Capacitive soil moisture probe
    SoilMoisture,
    /// SHT21 digital temperature, 16-bit reading
    Sht21Temperature,
    /// TSL2561 digital dual-diode light sensor, packed channel word
    Tsl2561Light,
}

impl Conversion {
    pub fn apply(self, raw: f64, params: &CalibrationParameters) -> f64 {
        match self {
            Conversion::Identity => raw,
            Conversion::Button => button(raw),
            Conversion::Lm94022Temperature => lm94022_temperature(raw, params),
            Conversion::Sfh3710Light => sfh3710_light(raw, params),
            Conversion::SoilTemperature => soil_temperature(raw),
            Conversion::SoilMoisture => soil_moisture(raw, params),
            Conversion::Sht21Temperature => sht21_temperature(raw),
            Conversion::Tsl2561Light => tsl2561_light(raw),
        }
    }
}

/// Integer power by repeated squaring, matching the device-side evaluation
fn powi(base: f64, exp: u32) -> f64 {
    let mut result = 1.0;
    let mut square = base;
    let mut n = exp;
    while n != 0 {
        if n & 1 == 1 {
            result *= square;
        }
        n >>= 1;
        if n != 0 {
            square *= square;
        }
    }
    result
}

pub fn button(raw: f64) -> f64 {
    raw / 1000.0
}

pub fn soil_temperature(raw: f64) -> f64 {
    raw - 2.5
}

pub fn sht21_temperature(raw: f64) -> f64 {
    -46.85 + 175.72 * raw / 65536.0
}

/// Degrees Celsius
pub fn lm94022_temperature(raw: f64, params: &CalibrationParameters) -> f64 {
    let x = (raw - params.smu_dc_offset) * params.smu_gain * 3.0;
    453.512485591335 - 163.565776259726 * x - 10.5408332222805 * powi(x, 2)
        - params.temperature_offset
        - 273.15
}

/// Lux; negative photocurrent clamps to zero
pub fn sfh3710_light(raw: f64, params: &CalibrationParameters) -> f64 {
    let x = (raw - params.dc_offset_correction) * params.smu_gain / 20.0 * 7.2;
    3333326.67 * ((x.abs() + x) / 2.0)
}

/// Lower and upper bound of the reference range the probe is rescaled into
const MOISTURE_REF_MIN: f64 = 3515.25;
const MOISTURE_REF_MAX: f64 = 8778.25;

/// Dimensionless moisture level in `[0, 6]`
pub fn soil_moisture(raw: f64, params: &CalibrationParameters) -> f64 {
    let x = (raw - params.moisture_min)
        * ((MOISTURE_REF_MAX - MOISTURE_REF_MIN)
            / (params.moisture_continuity - params.moisture_min))
        + MOISTURE_REF_MIN;
    let y = 8.130159393183e-018 * powi(x, 5) - 0.000000000000259586800701037 * powi(x, 4)
        + 0.00000000328783014726288 * powi(x, 3)
        - 0.0000206371829755294 * powi(x, 2)
        + 0.0646453707101697 * x
        - 79.7740602786336;
    y.clamp(0.0, 6.0)
}

/// Lux from the packed TSL2561 word
///
/// Layout: bits 17..31 channel 0, bit 16 gain flag, bits 1..15 channel 1,
/// bit 0 integration time flag. A cleared flag means low gain (x16) or the
/// short 13.7 ms integration window (scaled by 1/0.252).
pub fn tsl2561_light(raw: f64) -> f64 {
    let word = raw as i64;
    let mut ch0 = ((word >> 16) & 0xfffe) as f64;
    let mut ch1 = (word & 0xfffe) as f64;
    let high_gain = (word >> 16) & 0x1 == 1;
    let long_integration = word & 0x1 == 1;

    if !high_gain {
        ch0 *= 16.0;
        ch1 *= 16.0;
    }
    if !long_integration {
        ch0 *= 1.0 / 0.252;
        ch1 *= 1.0 / 0.252;
    }

    if ch0 == 0.0 {
        return 0.0;
    }
    let ratio = ch1 / ch0;
    let lux = if ratio > 1.30 {
        0.0
    } else if ratio > 0.80 {
        0.00146 * ch0 - 0.00112 * ch1
    } else if ratio > 0.61 {
        0.0128 * ch0 - 0.0153 * ch1
    } else if ratio > 0.50 {
        0.0224 * ch0 - 0.031 * ch1
    } else {
        0.0304 * ch0 - 0.062 * ch0 * ratio.powf(1.4)
    };
    lux * 5.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn params() -> CalibrationParameters {
        CalibrationParameters {
            temperature_offset: 2.0,
            smu_dc_offset: 0.25,
            smu_gain: 0.5,
            dc_offset_correction: 0.2,
            moisture_continuity: 1.5,
            moisture_min: 0.5,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = EPSILON * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn powi_matches_multiplication() {
        assert_eq!(powi(3.0, 0), 1.0);
        assert_eq!(powi(3.0, 2), 9.0);
        assert_eq!(powi(3.0, 5), 243.0);
        assert_eq!(powi(-2.0, 3), -8.0);
    }

    #[test]
    fn simple_conversions() {
        assert_close(button(1500.0), 1.5);
        assert_close(soil_temperature(22.5), 20.0);
        assert_close(sht21_temperature(0.0), -46.85);
        assert_close(sht21_temperature(26000.0), 22.863134765625);
    }

    #[test]
    fn lm94022_at_dc_offset_is_the_constant_term() {
        let p = params();
        assert_close(lm94022_temperature(0.25, &p), 453.512485591335 - 2.0 - 273.15);
        assert_close(lm94022_temperature(1.0, &p), -18.989754747805478);
    }

    #[test]
    fn sfh3710_clamps_negative_photocurrent() {
        let p = params();
        assert_eq!(sfh3710_light(0.0, &p), 0.0);
        assert_eq!(sfh3710_light(0.2, &p), 0.0);
        assert_close(sfh3710_light(1.2, &p), 599998.8006000001);
    }

    #[test]
    fn soil_moisture_at_minimum_clamps_to_zero() {
        let p = params();
        // Polynomial at the reference minimum 3515.25 is slightly negative
        assert_eq!(soil_moisture(p.moisture_min, &p), 0.0);
    }

    #[test]
    fn soil_moisture_inside_range() {
        let p = params();
        assert_close(soil_moisture(1.0, &p), 2.1984076516765896);
        assert_close(soil_moisture(1.5, &p), 3.8196112068369104);
    }

    #[test]
    fn soil_moisture_never_exceeds_bounds() {
        let p = params();
        for i in -100..100 {
            let v = soil_moisture(i as f64 * 0.1, &p);
            assert!((0.0..=6.0).contains(&v));
        }
    }

    #[test]
    fn tsl2561_ratio_bands() {
        // high gain, long integration: no scaling
        assert_close(tsl2561_light(((0x1001u32 << 16) | 0x0401) as f64), 440.2705970948706);
        assert_close(tsl2561_light(((0x1001u32 << 16) | 0x0A81) as f64), 56.51200000000003);
        assert_close(tsl2561_light(((0x1001u32 << 16) | 0x0C01) as f64), 27.13600000000003);
        assert_close(tsl2561_light(((0x1001u32 << 16) | 0x0901) as f64), 101.63199999999996);
        assert_eq!(tsl2561_light(((0x1001u32 << 16) | 0x1801) as f64), 0.0);
    }

    #[test]
    fn tsl2561_scales_low_gain_and_short_integration() {
        // both flags cleared
        assert_close(tsl2561_light(((0x0100u32 << 16) | 0x0040) as f64), 1747.1055440272642);
        // gain flag set, short integration only
        assert_close(tsl2561_light(((0x0101u32 << 16) | 0x0040) as f64), 109.19409650170401);
    }

    #[test]
    fn tsl2561_dark_channel_is_zero() {
        assert_eq!(tsl2561_light(0.0), 0.0);
        assert_eq!(tsl2561_light(0x0001_0001 as f64), 0.0);
    }

    #[test]
    fn conversions_do_not_depend_on_call_order() {
        let p = params();
        let all = [
            Conversion::Identity,
            Conversion::Button,
            Conversion::Lm94022Temperature,
            Conversion::Sfh3710Light,
            Conversion::SoilTemperature,
            Conversion::SoilMoisture,
            Conversion::Sht21Temperature,
            Conversion::Tsl2561Light,
        ];
        for conversion in all {
            let first = conversion.apply(1234.5, &p);
            let second = conversion.apply(1234.5, &p);
            assert_eq!(first.to_bits(), second.to_bits());
        }
        assert_eq!(p, params());
    }
}
