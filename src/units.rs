//! Distinct scalar types carrying units (spec §3): ratios, angles,
//! temperatures, velocities, accelerations, jerks, durations. Angles wrap
//! modulo 360 degrees on construction and arithmetic (spec testable
//! property 9: "For every value returned from a degrees-type operation,
//! `0 <= v < 360`").

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

macro_rules! newtype_scalar {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub f64);

        impl $name {
            pub fn new(v: f64) -> Self {
                Self(v)
            }

            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl From<f64> for $name {
            fn from(v: f64) -> Self {
                Self(v)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                Self(self.0 / rhs)
            }
        }
    };
}

newtype_scalar!(Ratio);
newtype_scalar!(Temperature);
newtype_scalar!(Velocity);
newtype_scalar!(Acceleration);
newtype_scalar!(Jerk);
newtype_scalar!(Duration);

impl Duration {
    pub fn zero() -> Self {
        Duration(0.0)
    }

    pub fn max(self, rhs: Self) -> Self {
        Duration(self.0.max(rhs.0))
    }
}

impl Div for Temperature {
    type Output = f64;
    fn div(self, rhs: Temperature) -> f64 {
        self.0 / rhs.0
    }
}

/// An angle that always normalizes itself into `[0, 360)` degrees, per
/// spec testable property 9.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleDegrees(f64);

impl AngleDegrees {
    pub fn new(degrees: f64) -> Self {
        Self(Self::wrap(degrees))
    }

    pub fn from_radians(radians: f64) -> Self {
        Self::new(radians.to_degrees())
    }

    pub fn degrees(self) -> f64 {
        self.0
    }

    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }

    fn wrap(degrees: f64) -> f64 {
        let wrapped = degrees % 360.0;
        if wrapped < 0.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }
}

impl Add for AngleDegrees {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.0 + rhs.0)
    }
}

impl Sub for AngleDegrees {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.0 - rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_wraps_into_0_360() {
        assert_eq!(AngleDegrees::new(370.0).degrees(), 10.0);
        assert_eq!(AngleDegrees::new(-10.0).degrees(), 350.0);
        assert_eq!(AngleDegrees::new(720.0).degrees(), 0.0);
        assert!(AngleDegrees::new(-1e-9).degrees() < 360.0);
    }

    #[test]
    fn angle_addition_wraps() {
        let a = AngleDegrees::new(200.0);
        let b = AngleDegrees::new(200.0);
        assert_eq!((a + b).degrees(), 40.0);
    }
}
