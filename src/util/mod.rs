// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

mod pixel;

pub use pixel::*;

/// Index of the most significant set bit, `-1` for zero.
#[inline(always)]
pub const fn msb(x: i32) -> i32 {
  31 ^ (x.leading_zeros() as i32)
}

#[inline(always)]
pub const fn floor_log2(x: usize) -> usize {
  debug_assert!(x > 0);
  (usize::BITS - 1 - x.leading_zeros()) as usize
}

/// Rounded right shift of a signed value, symmetric around zero.
#[inline(always)]
pub fn round_shift_signed(v: i64, shift: u32) -> i64 {
  if shift == 0 {
    return v;
  }
  let r = 1i64 << (shift - 1);
  if v >= 0 {
    (v + r) >> shift
  } else {
    -((-v + r) >> shift)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn log_helpers() {
    assert_eq!(msb(1), 0);
    assert_eq!(msb(8), 3);
    assert_eq!(floor_log2(64), 6);
    assert_eq!(floor_log2(65), 6);
  }

  #[test]
  fn signed_rounding_is_symmetric() {
    assert_eq!(round_shift_signed(6, 2), 2);
    assert_eq!(round_shift_signed(-6, 2), -2);
    assert_eq!(round_shift_signed(5, 0), 5);
  }
}
