//! Checked numeric narrowing, used at every API boundary that accepts a
//! width or signedness conversion (e.g. `u64` external ids down to `u32`
//! internal ids, or `usize` counts into on-disk `u64` fields).
//!
//! A narrowing conversion round-trips through the reverse cast and is
//! rejected (`Error::Narrowing`) if it does not, including the
//! signedness-flip case that a plain `as` cast would silently get wrong.

use crate::error::{Error, Result};

/// A narrowing cast that is known (or asserted) to be lossless.
///
/// Use only when the caller can prove the value fits; prefer [`narrow`]
/// everywhere else.
#[inline]
pub fn narrow_cast<T, U>(u: U) -> T
where
    U: NarrowInto<T>,
{
    u.narrow_cast()
}

/// A checked narrowing conversion: returns `Err(Error::Narrowing)` if
/// converting `u` to `T` and back does not reproduce the original value.
#[inline]
pub fn narrow<T, U>(u: U) -> Result<T>
where
    U: NarrowInto<T>,
{
    u.narrow()
}

pub trait NarrowInto<T> {
    fn narrow_cast(self) -> T;
    fn narrow(self) -> Result<T>;
}

macro_rules! impl_narrow_int {
    ($from:ty => $to:ty) => {
        impl NarrowInto<$to> for $from {
            #[inline]
            fn narrow_cast(self) -> $to {
                self as $to
            }

            #[inline]
            fn narrow(self) -> Result<$to> {
                let t = self as $to;
                let roundtrip = t as $from;
                let sign_preserved = (self as i128 >= 0) == (t as i128 >= 0);
                if roundtrip == self && sign_preserved {
                    Ok(t)
                } else {
                    Err(Error::Narrowing {
                        value: self.to_string(),
                        target_type: stringify!($to),
                    })
                }
            }
        }
    };
}

impl_narrow_int!(u64 => u32);
impl_narrow_int!(u64 => usize);
impl_narrow_int!(usize => u32);
impl_narrow_int!(usize => u64);
impl_narrow_int!(u32 => u64);
impl_narrow_int!(u32 => usize);
impl_narrow_int!(i64 => i32);
impl_narrow_int!(i64 => usize);
impl_narrow_int!(usize => i64);

impl NarrowInto<f32> for f64 {
    #[inline]
    fn narrow_cast(self) -> f32 {
        self as f32
    }

    #[inline]
    fn narrow(self) -> Result<f32> {
        let t = self as f32;
        if (t as f64) == self {
            Ok(t)
        } else {
            Err(Error::Narrowing { value: self.to_string(), target_type: "f32" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_small_values() {
        assert_eq!(narrow::<u32, u64>(42).unwrap(), 42u32);
        assert_eq!(narrow::<usize, u32>(7).unwrap(), 7usize);
    }

    #[test]
    fn rejects_overflowing_values() {
        let huge: u64 = u64::MAX;
        assert!(narrow::<u32, u64>(huge).is_err());
    }

    #[test]
    fn rejects_sign_flip() {
        let negative: i64 = -1;
        assert!(narrow::<usize, i64>(negative).is_err());
    }

    #[test]
    fn f64_to_f32_exact_values_roundtrip() {
        assert!(narrow::<f32, f64>(1.5).is_ok());
    }
}
