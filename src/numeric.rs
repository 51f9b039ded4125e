//! Floating point helpers used by the geometry code and in tests. The comparison functions are thin
//! wrappers around the `approx` crate.

use std::f64::consts::TAU;

use approx::AbsDiffEq;

/// Targeted accuracy instantiated over `f64`
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// Compares two angles modulo a full turn, so that `0` and `2π - ε` are close.
#[must_use]
pub fn angles_almost_eq(a: f64, b: f64, acc: f64) -> bool {
    let diff = (a - b).rem_euclid(TAU);
    diff <= acc || TAU - diff <= acc
}

/// Clamps a probability into `[0, 1]`. `NaN` maps to zero.
#[must_use]
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Asserts two floats differ by less than `prec`.
#[macro_export]
macro_rules! assert_almost_eq {
    ($a:expr, $b:expr, $prec:expr $(,)?) => {
        if !$crate::numeric::almost_eq($a, $b, $prec) {
            panic!(
                "assertion failed: `abs(left - right) < {:e}`, (left: `{}`, right: `{}`)",
                $prec, $a, $b
            );
        }
    };
}
pub use assert_almost_eq;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn almost_eq_within_tolerance() {
        assert!(almost_eq(1.0, 1.0 + 0.5e-11, ACC));
    }

    #[test]
    fn almost_eq_outside_tolerance() {
        assert!(!almost_eq(1.0, 1.0 + 2e-10, ACC));
    }

    #[test]
    fn almost_eq_infinities() {
        assert!(almost_eq(f64::INFINITY, f64::INFINITY, ACC));
        assert!(!almost_eq(f64::INFINITY, f64::NEG_INFINITY, ACC));
    }

    #[test]
    fn angles_wrap_around() {
        assert!(angles_almost_eq(0.0, TAU - 1e-12, 1e-9));
        assert!(angles_almost_eq(TAU, 0.0, 1e-9));
        assert!(!angles_almost_eq(0.0, 0.1, 1e-9));
    }

    #[test]
    fn clamps_probabilities() {
        assert_eq!(clamp_probability(f64::NAN), 0.0);
        assert_eq!(clamp_probability(1.5), 1.0);
        assert_eq!(clamp_probability(-0.2), 0.0);
        assert_eq!(clamp_probability(0.3), 0.3);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn assert_almost_eq_macro_panics() {
        assert_almost_eq!(1.0, 1.001, 1e-4);
    }
}
