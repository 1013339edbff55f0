// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::collections::HashMap;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Block sides a transform or scan can have.
pub const TX_SIZES: [usize; 6] = [2, 4, 8, 16, 32, 64];

/// One-dimensional transform kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kernel1D {
  Dct2,
  Dst7,
  Dct8,
  Identity,
}

/// Basis value of frequency `k` at sample `i` of an `n`-point kernel.
fn basis_value(kernel: Kernel1D, n: usize, k: usize, i: usize) -> f64 {
  let nf = n as f64;
  let (k, i) = (k as f64, i as f64);
  match kernel {
    Kernel1D::Dct2 => {
      let w0 = if k == 0.0 { FRAC_1_SQRT_2 } else { 1.0 };
      w0 * (2.0 / nf).sqrt() * (PI * k * (2.0 * i + 1.0) / (2.0 * nf)).cos()
    }
    Kernel1D::Dst7 => {
      (4.0 / (2.0 * nf + 1.0)).sqrt()
        * (PI * (2.0 * k + 1.0) * (i + 1.0) / (2.0 * nf + 1.0)).sin()
    }
    Kernel1D::Dct8 => {
      (4.0 / (2.0 * nf + 1.0)).sqrt()
        * (PI * (2.0 * k + 1.0) * (2.0 * i + 1.0) / (4.0 * nf + 2.0)).cos()
    }
    Kernel1D::Identity => {
      if k == i {
        1.0
      } else {
        0.0
      }
    }
  }
}

/// Precomputed orthonormal basis matrices, row `k` holding frequency `k`.
#[derive(Debug, Clone)]
pub struct KernelBank {
  mats: HashMap<(Kernel1D, usize), Vec<f64>>,
}

impl Default for KernelBank {
  fn default() -> Self {
    Self::new()
  }
}

impl KernelBank {
  pub fn new() -> Self {
    let mut mats = HashMap::new();
    let mut build = |kernel: Kernel1D, n: usize| {
      let m = (0..n)
        .flat_map(|k| (0..n).map(move |i| basis_value(kernel, n, k, i)))
        .collect();
      mats.insert((kernel, n), m);
    };
    for n in TX_SIZES {
      build(Kernel1D::Dct2, n);
    }
    for n in [4, 8, 16, 32] {
      build(Kernel1D::Dst7, n);
      build(Kernel1D::Dct8, n);
    }
    KernelBank { mats }
  }

  /// `n`x`n` basis of `kernel`, `None` for identity or an unsupported size.
  pub fn basis(&self, kernel: Kernel1D, n: usize) -> Option<&[f64]> {
    self.mats.get(&(kernel, n)).map(Vec::as_slice)
  }
}

/// Applies `m` (or its transpose) along rows or columns of `data`.
fn apply_1d(
  m: &[f64], data: &mut [f64], tmp: &mut Vec<f64>, w: usize, h: usize,
  along_rows: bool, transpose: bool,
) {
  let n = if along_rows { w } else { h };
  tmp.clear();
  tmp.resize(w * h, 0.0);
  for line in 0..(if along_rows { h } else { w }) {
    let at = |i: usize| if along_rows { line * w + i } else { i * w + line };
    for k in 0..n {
      let mut acc = 0.0;
      for i in 0..n {
        let c = if transpose { m[i * n + k] } else { m[k * n + i] };
        acc += c * data[at(i)];
      }
      tmp[at(k)] = acc;
    }
  }
  data.copy_from_slice(&tmp[..w * h]);
}

/// Separable forward transform of a `w`x`h` block in place.
pub fn forward_2d(
  bank: &KernelBank, data: &mut [f64], tmp: &mut Vec<f64>, w: usize,
  h: usize, hor: Kernel1D, ver: Kernel1D,
) {
  if let Some(m) = bank.basis(hor, w) {
    apply_1d(m, data, tmp, w, h, true, false);
  }
  if let Some(m) = bank.basis(ver, h) {
    apply_1d(m, data, tmp, w, h, false, false);
  }
}

/// Separable inverse transform of a `w`x`h` block in place.
pub fn inverse_2d(
  bank: &KernelBank, data: &mut [f64], tmp: &mut Vec<f64>, w: usize,
  h: usize, hor: Kernel1D, ver: Kernel1D,
) {
  if let Some(m) = bank.basis(ver, h) {
    apply_1d(m, data, tmp, w, h, false, true);
  }
  if let Some(m) = bank.basis(hor, w) {
    apply_1d(m, data, tmp, w, h, true, true);
  }
}

/// Number of coefficients kept along an `n`-point kernel.
#[inline]
const fn kept_coeffs(kernel: Kernel1D, n: usize) -> usize {
  match kernel {
    Kernel1D::Dct2 if n == 64 => 32,
    Kernel1D::Dst7 | Kernel1D::Dct8 if n == 32 => 16,
    _ => n,
  }
}

/// Clears the coefficients the high-frequency zero-out never codes.
pub fn zero_out_high_freq(
  data: &mut [f64], w: usize, h: usize, hor: Kernel1D, ver: Kernel1D,
) {
  let kw = kept_coeffs(hor, w);
  let kh = kept_coeffs(ver, h);
  if kw == w && kh == h {
    return;
  }
  for (y, row) in data.chunks_mut(w).take(h).enumerate() {
    if y >= kh {
      row.fill(0.0);
    } else {
      row[kw..].fill(0.0);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn kernels_are_orthonormal() {
    let bank = KernelBank::new();
    for (kernel, n) in [
      (Kernel1D::Dct2, 2),
      (Kernel1D::Dct2, 64),
      (Kernel1D::Dst7, 4),
      (Kernel1D::Dst7, 32),
      (Kernel1D::Dct8, 8),
      (Kernel1D::Dct8, 16),
    ] {
      let m = bank.basis(kernel, n).unwrap();
      for a in 0..n {
        for b in 0..n {
          let dot: f64 = (0..n).map(|i| m[a * n + i] * m[b * n + i]).sum();
          let expected = if a == b { 1.0 } else { 0.0 };
          assert!((dot - expected).abs() < 1e-9, "{kernel:?} {n} {a} {b}");
        }
      }
    }
  }

  #[test]
  fn dct_compacts_flat_block_into_dc() {
    let bank = KernelBank::new();
    let mut data = vec![3.0; 8 * 4];
    let mut tmp = Vec::new();
    let dct = Kernel1D::Dct2;
    forward_2d(&bank, &mut data, &mut tmp, 8, 4, dct, dct);
    assert!((data[0] - 3.0 * (32f64).sqrt()).abs() < 1e-9);
    assert!(data[1..].iter().all(|c| c.abs() < 1e-9));
  }

  #[test]
  fn zero_out_keeps_low_quadrant_of_64() {
    let mut data = vec![1.0; 64 * 4];
    zero_out_high_freq(&mut data, 64, 4, Kernel1D::Dct2, Kernel1D::Dct2);
    assert_eq!(data.iter().filter(|&&c| c != 0.0).count(), 32 * 4);
    assert_eq!(data[31], 1.0);
    assert_eq!(data[32], 0.0);
  }
}
