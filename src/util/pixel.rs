// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use num_traits::{AsPrimitive, PrimInt};
use std::fmt::{Debug, Display};

/// Trait for casting between primitive types.
pub trait CastFromPrimitive<T>: Copy + 'static {
  /// Casts the given value into `Self`.
  fn cast_from(v: T) -> Self;
}

macro_rules! impl_cast_from_primitive {
  ( $T:ty => $U:ty ) => {
    impl CastFromPrimitive<$U> for $T {
      #[inline(always)]
      fn cast_from(v: $U) -> Self { v as Self }
    }
  };
  ( $T:ty => { $( $U:ty ),* } ) => {
    $( impl_cast_from_primitive!($T => $U); )*
  };
}

// casts to { u8, u16 } go through RegisteredPrimitive so that
// CastFromPrimitive<T: Pixel> is known to hold for every sample type
impl_cast_from_primitive!(u8 => { u64, i64 });
impl_cast_from_primitive!(u16 => { u64, i64 });
impl_cast_from_primitive!(i32 => { u64, i64 });

pub trait RegisteredPrimitive:
  PrimInt
  + AsPrimitive<u8>
  + AsPrimitive<u16>
  + AsPrimitive<i32>
  + AsPrimitive<u32>
  + CastFromPrimitive<u8>
  + CastFromPrimitive<u16>
  + CastFromPrimitive<i32>
  + CastFromPrimitive<u32>
{
}

impl RegisteredPrimitive for u8 {}
impl RegisteredPrimitive for u16 {}
impl RegisteredPrimitive for i32 {}
impl RegisteredPrimitive for u32 {}

macro_rules! impl_cast_from_pixel_to_primitive {
  ( $T:ty ) => {
    impl<T: RegisteredPrimitive> CastFromPrimitive<T> for $T {
      #[inline(always)]
      fn cast_from(v: T) -> Self {
        v.as_()
      }
    }
  };
}

impl_cast_from_pixel_to_primitive!(u8);
impl_cast_from_pixel_to_primitive!(u16);
impl_cast_from_pixel_to_primitive!(i32);
impl_cast_from_pixel_to_primitive!(u32);

/// Storage classes for samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
  /// 8 bits per sample, stored in a `u8`.
  U8,
  /// 10 or 12 bits per sample, stored in a `u16`.
  U16,
}

/// A type that can hold one picture sample.
pub trait Pixel:
  RegisteredPrimitive
  + Into<u32>
  + Into<i32>
  + Debug
  + Display
  + Default
  + Send
  + Sync
  + 'static
{
  /// Returns a [`PixelType`] variant corresponding to this type.
  fn type_enum() -> PixelType;

  /// Widest bit depth the storage type can carry.
  fn max_bit_depth() -> usize {
    match Self::type_enum() {
      PixelType::U8 => 8,
      PixelType::U16 => 16,
    }
  }

  /// Clips a signed intermediate value to `[0, (1 << bit_depth) - 1]`.
  #[inline(always)]
  fn clip_from(v: i32, bit_depth: usize) -> Self {
    Self::cast_from(v.clamp(0, (1 << bit_depth) - 1))
  }
}

impl Pixel for u8 {
  fn type_enum() -> PixelType {
    PixelType::U8
  }
}

impl Pixel for u16 {
  fn type_enum() -> PixelType {
    PixelType::U16
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn clip_saturates_both_ends() {
    assert_eq!(u8::clip_from(-7, 8), 0);
    assert_eq!(u8::clip_from(300, 8), 255);
    assert_eq!(u16::clip_from(1100, 10), 1023);
    assert_eq!(u16::clip_from(512, 10), 512);
  }

  #[test]
  fn cast_roundtrips_sample_range() {
    for v in [0i32, 1, 127, 255] {
      assert_eq!(i32::cast_from(u8::cast_from(v)), v);
    }
    assert_eq!(i32::cast_from(u16::cast_from(1023i32)), 1023);
  }
}
