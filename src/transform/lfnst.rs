// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::OnceLock;

use crate::predict::{DIA_IDX, NUM_LUMA_MODE};

/// Side of the low-frequency region the secondary transform covers.
pub const LFNST_SIZE: usize = 4;
const LFNST_LEN: usize = LFNST_SIZE * LFNST_SIZE;

/// Secondary transform kernels available per block.
pub const NUM_LFNST_KERNELS: u8 = 2;

type Kernel = [[f64; LFNST_LEN]; LFNST_LEN];

fn kernels() -> &'static [Kernel; 2] {
  static KERNELS: OnceLock<[Kernel; 2]> = OnceLock::new();
  KERNELS.get_or_init(|| {
    let mut k = [[[0.0; LFNST_LEN]; LFNST_LEN]; 2];
    let n = LFNST_LEN as f64;
    for r in 0..LFNST_LEN {
      for c in 0..LFNST_LEN {
        let w0 = if r == 0 { FRAC_1_SQRT_2 } else { 1.0 };
        k[0][r][c] = w0
          * (2.0 / n).sqrt()
          * (PI * r as f64 * (2 * c + 1) as f64 / (2.0 * n)).cos();
        let sign = if (r & c).count_ones() & 1 == 0 { 1.0 } else { -1.0 };
        k[1][r][c] = sign / 4.0;
      }
    }
    k
  })
}

/// Whether the secondary transform reads its input transposed for
/// `intra_dir`.
#[inline]
pub fn lfnst_transposed(intra_dir: u8) -> bool {
  intra_dir > DIA_IDX && (intra_dir as usize) < NUM_LUMA_MODE
}

/// A `w`x`h` block can carry a secondary transform.
#[inline]
pub fn lfnst_allowed(w: usize, h: usize) -> bool {
  w >= LFNST_SIZE && h >= LFNST_SIZE
}

#[inline(always)]
fn region_pos(i: usize, w: usize, transpose: bool) -> usize {
  let (y, x) = (i / LFNST_SIZE, i % LFNST_SIZE);
  if transpose {
    x * w + y
  } else {
    y * w + x
  }
}

/// Secondary transform of the primary coefficients of a `w`x`h` block.
///
/// Only the top-left 4x4 survives; everything else is cleared.
pub fn lfnst_forward(
  coeffs: &mut [f64], w: usize, h: usize, idx: u8, transpose: bool,
) {
  debug_assert!((1..=NUM_LFNST_KERNELS).contains(&idx) && lfnst_allowed(w, h));
  let m = &kernels()[idx as usize - 1];
  let mut input = [0.0; LFNST_LEN];
  for (i, v) in input.iter_mut().enumerate() {
    *v = coeffs[region_pos(i, w, transpose)];
  }
  coeffs[..w * h].fill(0.0);
  for (r, row) in m.iter().enumerate() {
    coeffs[region_pos(r, w, false)] =
      row.iter().zip(&input).map(|(a, b)| a * b).sum();
  }
}

/// Inverse of [`lfnst_forward`] on dequantised coefficients.
pub fn lfnst_inverse(
  coeffs: &mut [f64], w: usize, h: usize, idx: u8, transpose: bool,
) {
  debug_assert!((1..=NUM_LFNST_KERNELS).contains(&idx) && lfnst_allowed(w, h));
  let m = &kernels()[idx as usize - 1];
  let mut input = [0.0; LFNST_LEN];
  for (i, v) in input.iter_mut().enumerate() {
    *v = coeffs[region_pos(i, w, false)];
  }
  coeffs[..w * h].fill(0.0);
  for c in 0..LFNST_LEN {
    coeffs[region_pos(c, w, transpose)] =
      (0..LFNST_LEN).map(|r| m[r][c] * input[r]).sum();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn secondary_transform_inverts_low_frequencies() {
    for idx in 1..=NUM_LFNST_KERNELS {
      for transpose in [false, true] {
        let (w, h) = (8, 4);
        let orig: Vec<f64> = (0..w * h)
          .map(|i| if i % w < 4 { (i as f64 * 1.7).sin() * 50.0 } else { 0.0 })
          .collect();
        let mut c = orig.clone();
        lfnst_forward(&mut c, w, h, idx, transpose);
        lfnst_inverse(&mut c, w, h, idx, transpose);
        for (a, b) in orig.iter().zip(&c) {
          assert!((a - b).abs() < 1e-9);
        }
      }
    }
  }

  #[test]
  fn outside_region_is_cleared() {
    let mut c = vec![1.0; 16 * 16];
    lfnst_forward(&mut c, 16, 16, 1, false);
    assert!(c.iter().enumerate().all(|(i, &v)| {
      (i % 16 < 4 && i / 16 < 4) || v == 0.0
    }));
  }

  #[test]
  fn wide_angle_modes_transpose() {
    assert!(!lfnst_transposed(DIA_IDX));
    assert!(lfnst_transposed(DIA_IDX + 1));
    assert!(!lfnst_transposed(crate::predict::LM_CHROMA_IDX));
  }
}
