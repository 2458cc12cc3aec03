/*
 * 17.14 Signed Fixed-Point Arithmetic
 *
 * The MLFQ engine runs entirely on signed 17.14 fixed point: one sign bit,
 * 17 integer bits, 14 fraction bits in an i32. Kernel context permits no
 * floating point, so `load_avg` and per-thread `recent_cpu` use this type.
 *
 * Products and quotients of two fixed-point values widen through i64 and
 * divide (rather than shift) so truncation is toward zero for negative
 * values as well.
 */

use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Fraction bits in the representation.
pub const FRACTION_BITS: u32 = 14;

const F: i32 = 1 << FRACTION_BITS;

/// A signed 17.14 fixed-point number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub const fn from_int(n: i32) -> Fixed {
        Fixed(n * F)
    }

    /// `num / den` as a fixed-point value. `den` must be nonzero.
    pub const fn from_ratio(num: i32, den: i32) -> Fixed {
        Fixed((num as i64 * F as i64 / den as i64) as i32)
    }

    /// Raw 17.14 representation.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Integer part, truncated toward zero.
    pub const fn to_int(self) -> i32 {
        self.0 / F
    }

    /// Nearest integer, rounding half away from zero.
    pub const fn to_int_nearest(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    pub const fn add_int(self, n: i32) -> Fixed {
        Fixed(self.0 + n * F)
    }

    pub const fn sub_int(self, n: i32) -> Fixed {
        Fixed(self.0 - n * F)
    }

    pub const fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n)
    }

    pub const fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n)
    }

    /// Fixed × fixed through a widened 64-bit intermediate.
    pub const fn mul(self, other: Fixed) -> Fixed {
        Fixed((self.0 as i64 * other.0 as i64 / F as i64) as i32)
    }

    /// Fixed ÷ fixed through a widened 64-bit intermediate.
    pub const fn div(self, other: Fixed) -> Fixed {
        Fixed((self.0 as i64 * F as i64 / other.0 as i64) as i32)
    }
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        self.0 += rhs.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Fixed) {
        self.0 -= rhs.0;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl fmt::Display for Fixed {
    /// Renders with two decimal places, e.g. "1.50".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / F as u32;
        let hundredths = (magnitude % F as u32) * 100 / F as u32;
        write!(f, "{}{}.{:02}", sign, whole, hundredths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        assert_eq!(Fixed::from_int(7).to_int(), 7);
        assert_eq!(Fixed::from_int(-7).to_int(), -7);
    }

    #[test]
    fn truncation_is_toward_zero() {
        let three_halves = Fixed::from_ratio(3, 2);
        assert_eq!(three_halves.to_int(), 1);
        assert_eq!((-three_halves).to_int(), -1);
    }

    #[test]
    fn nearest_rounds_half_away_from_zero() {
        assert_eq!(Fixed::from_ratio(3, 2).to_int_nearest(), 2);
        assert_eq!((-Fixed::from_ratio(3, 2)).to_int_nearest(), -2);
        assert_eq!(Fixed::from_ratio(1, 4).to_int_nearest(), 0);
    }

    #[test]
    fn mixed_arithmetic() {
        let x = Fixed::from_int(5);
        assert_eq!(x.add_int(3), Fixed::from_int(8));
        assert_eq!(x.sub_int(3), Fixed::from_int(2));
        assert_eq!(x.mul_int(4), Fixed::from_int(20));
        assert_eq!(x.div_int(5), Fixed::from_int(1));
        assert_eq!((x + Fixed::from_int(1)).to_int(), 6);
        assert_eq!((x - Fixed::from_int(1)).to_int(), 4);
    }

    #[test]
    fn widened_mul_div() {
        let a = Fixed::from_ratio(59, 60);
        let b = Fixed::from_int(60);
        assert_eq!(a.mul(b).to_int_nearest(), 59);
        assert_eq!(Fixed::from_int(59).div(Fixed::from_int(60)).raw(), a.raw());
        // Negative operands truncate toward zero.
        assert_eq!(Fixed::from_int(-3).div(Fixed::from_int(2)).to_int(), -1);
    }

    #[test]
    fn load_average_step_from_zero() {
        // One ready thread, load_avg = 0: one update leaves 1/60, which
        // reads as 2 at 100x (1.66 rounded) and exactly 1 at 60x.
        let load =
            Fixed::from_ratio(59, 60).mul(Fixed::ZERO) + Fixed::from_ratio(1, 60).mul_int(1);
        assert_eq!(load.mul_int(100).to_int_nearest(), 2);
        assert_eq!(load.mul_int(60).to_int_nearest(), 1);
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(alloc::format!("{}", Fixed::from_ratio(3, 2)), "1.50");
        assert_eq!(alloc::format!("{}", -Fixed::from_ratio(1, 4)), "-0.25");
    }
}
