//! Special functions needed by the spectral estimator and theoretical spectra.

use std::f64::consts::PI;

/// Euler-Mascheroni constant.
pub const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

const SQRT_2PI: f64 = 2.506_628_274_631_000_5;
const LANCZOS_G: f64 = 7.0;
#[allow(clippy::excessive_precision)] // published Lanczos coefficients
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

// Below this |x| the Taylor series of sin(x)/x is exact to f64 precision.
const SINC_TAYLOR_LIMIT: f64 = 1e-4;

/// Gamma function for real arguments.
///
/// Lanczos approximation, with the reflection formula for `z < 0.5`.
/// Returns NaN at the poles (zero and negative integers).
pub fn gamma(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z <= 0.0 && (z - z.round()).abs() < 1e-15 {
        return f64::NAN;
    }
    if z < 0.5 {
        let sin_pi = (PI * z).sin();
        return PI / (sin_pi * gamma(1.0 - z));
    }

    let z_minus = z - 1.0;
    let mut x = LANCZOS_COEFFS[0];
    for (i, coeff) in LANCZOS_COEFFS.iter().enumerate().skip(1) {
        x += coeff / (z_minus + i as f64);
    }
    let t = z_minus + LANCZOS_G + 0.5;
    SQRT_2PI * t.powf(z_minus + 0.5) * (-t).exp() * x
}

/// Unnormalized sinc, `sin(x) / x`, finite at `x = 0`.
pub fn sinc(x: f64) -> f64 {
    if x.abs() < SINC_TAYLOR_LIMIT {
        let x2 = x * x;
        1.0 - x2 / 6.0 + x2 * x2 / 120.0
    } else {
        x.sin() / x
    }
}
