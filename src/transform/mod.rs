// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub use self::ict::*;
pub use self::kernels::*;
pub use self::lfnst::*;

use std::collections::HashMap;

use num_derive::FromPrimitive;

use crate::quantize::QuantizationContext;
use crate::serialize::{Deserialize, Serialize};

mod ict;
mod kernels;
mod lfnst;

/// Largest transform-skip block side.
pub const MAX_TS_SIZE: usize = 32;
/// Largest block side alternate kernels apply to.
pub const MTS_MAX_SIZE: usize = 32;

/// Primary transform hypothesis of a transform block.
#[derive(
  Copy,
  Clone,
  Debug,
  Default,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  FromPrimitive,
  Serialize,
  Deserialize,
)]
pub enum MtsIdx {
  #[default]
  Dct2Dct2 = 0,
  Skip = 1,
  Dst7Dst7 = 2,
  Dct8Dst7 = 3,
  Dst7Dct8 = 4,
  Dct8Dct8 = 5,
}

impl MtsIdx {
  /// Horizontal and vertical 1-D kernels.
  pub const fn kernels(self) -> (Kernel1D, Kernel1D) {
    use self::Kernel1D::*;
    match self {
      MtsIdx::Dct2Dct2 => (Dct2, Dct2),
      MtsIdx::Skip => (Identity, Identity),
      MtsIdx::Dst7Dst7 => (Dst7, Dst7),
      MtsIdx::Dct8Dst7 => (Dct8, Dst7),
      MtsIdx::Dst7Dct8 => (Dst7, Dct8),
      MtsIdx::Dct8Dct8 => (Dct8, Dct8),
    }
  }

  /// One of the signalled alternate kernel pairs.
  #[inline(always)]
  pub const fn is_alternate(self) -> bool {
    (self as u8) > (MtsIdx::Skip as u8)
  }
}

/// Shape of one coded transform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
  pub width: usize,
  pub height: usize,
  pub mts: MtsIdx,
  pub lfnst_idx: u8,
  /// LFNST input is read transposed (wide-angle side of the mode range).
  pub lfnst_transpose: bool,
}

/// Outcome of a forward transform and quantisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxStats {
  pub abs_sum: u32,
  /// Scan index of the last non-zero level.
  pub last_scan_pos: Option<usize>,
}

/// Transform and quantisation engine with preallocated kernels, scans and
/// scratch.
#[derive(Debug, Clone)]
pub struct TrQuant {
  bank: KernelBank,
  scans: HashMap<(usize, usize), Vec<u16>>,
  qc: QuantizationContext,
  lambda: f64,
  coeffs: Vec<f64>,
  tmp: Vec<f64>,
}

impl Default for TrQuant {
  fn default() -> Self {
    Self::new()
  }
}

impl TrQuant {
  pub fn new() -> Self {
    let mut scans = HashMap::new();
    for w in TX_SIZES {
      for h in TX_SIZES {
        scans.insert((w, h), diag_scan(w, h));
      }
    }
    TrQuant {
      bank: KernelBank::new(),
      scans,
      qc: QuantizationContext::default(),
      lambda: 0.0,
      coeffs: Vec::with_capacity(64 * 64),
      tmp: Vec::with_capacity(64 * 64),
    }
  }

  pub fn set_qp(&mut self, qp: i32, bit_depth: usize) {
    self.qc.update(qp, bit_depth);
  }

  /// Lambda for the next blocks' level decisions.
  pub fn select_lambda(&mut self, lambda: f64) {
    self.lambda = lambda;
    self.qc.set_lambda(lambda);
  }

  /// Scales the selected lambda without forgetting it.
  pub fn scale_lambda(&mut self, factor: f64) {
    self.qc.set_lambda(self.lambda * factor);
  }

  #[inline(always)]
  pub fn lambda(&self) -> f64 {
    self.qc.lambda()
  }

  /// Up-right diagonal scan of a `w`x`h` block, raster positions.
  pub fn scan(&self, w: usize, h: usize) -> &[u16] {
    &self.scans[&(w, h)]
  }

  fn forward(&mut self, resi: &[i32], p: &TxParams) {
    let (w, h) = (p.width, p.height);
    self.coeffs.clear();
    self.coeffs.extend(resi[..w * h].iter().map(|&r| r as f64));
    let (hor, ver) = p.mts.kernels();
    forward_2d(&self.bank, &mut self.coeffs, &mut self.tmp, w, h, hor, ver);
    zero_out_high_freq(&mut self.coeffs, w, h, hor, ver);
    if p.lfnst_idx > 0 {
      debug_assert_eq!(p.mts, MtsIdx::Dct2Dct2);
      lfnst_forward(&mut self.coeffs, w, h, p.lfnst_idx, p.lfnst_transpose);
    }
  }

  /// Forward transform and quantisation of a `w`x`h` residual.
  pub fn transform_quant(
    &mut self, resi: &[i32], p: &TxParams, levels: &mut Vec<i32>,
  ) -> TxStats {
    let (w, h) = (p.width, p.height);
    self.forward(resi, p);
    levels.clear();
    levels.resize(w * h, 0);
    let abs_sum = self.qc.quantize(&self.coeffs, levels);
    let last_scan_pos = if abs_sum == 0 {
      None
    } else {
      self.scans[&(w, h)].iter().rposition(|&pos| levels[pos as usize] != 0)
    };
    TxStats { abs_sum, last_scan_pos }
  }

  /// Dequantisation and inverse transform into a `w`x`h` residual.
  pub fn inv_transform(
    &mut self, levels: &[i32], p: &TxParams, resi: &mut [i32],
  ) {
    let (w, h) = (p.width, p.height);
    self.coeffs.clear();
    self.coeffs.resize(w * h, 0.0);
    self.qc.dequantize(&levels[..w * h], &mut self.coeffs);
    if p.lfnst_idx > 0 {
      lfnst_inverse(&mut self.coeffs, w, h, p.lfnst_idx, p.lfnst_transpose);
    }
    let (hor, ver) = p.mts.kernels();
    inverse_2d(&self.bank, &mut self.coeffs, &mut self.tmp, w, h, hor, ver);
    for (r, &c) in resi[..w * h].iter_mut().zip(self.coeffs.iter()) {
      *r = c.round() as i32;
    }
  }

  /// Transform-domain L1 energy of `resi` under `mts`, used to rank
  /// alternate kernels before trying them.
  pub fn kernel_energy(
    &mut self, resi: &[i32], w: usize, h: usize, mts: MtsIdx,
  ) -> f64 {
    let p = TxParams {
      width: w,
      height: h,
      mts,
      lfnst_idx: 0,
      lfnst_transpose: false,
    };
    self.forward(resi, &p);
    self.coeffs.iter().map(|c| c.abs()).sum()
  }
}

fn diag_scan(w: usize, h: usize) -> Vec<u16> {
  let mut scan = Vec::with_capacity(w * h);
  for d in 0..(w + h - 1) {
    for y in (0..=d.min(h - 1)).rev() {
      let x = d - y;
      if x < w {
        scan.push((y * w + x) as u16);
      }
    }
  }
  scan
}

#[cfg(test)]
mod test {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;

  fn random_residual(ra: &mut ChaChaRng, n: usize) -> Vec<i32> {
    (0..n).map(|_| ra.gen_range(-64..64)).collect()
  }

  #[test]
  fn diag_scan_visits_every_position_once() {
    for (w, h) in [(4, 4), (8, 4), (2, 16), (64, 64)] {
      let mut scan = diag_scan(w, h);
      assert_eq!(scan[0], 0);
      assert_eq!(scan[1] as usize, w);
      scan.sort_unstable();
      assert!(scan.iter().enumerate().all(|(i, &p)| i == p as usize));
    }
  }

  #[test]
  fn fine_quantiser_reconstructs_every_kernel() {
    let mut ra = ChaChaRng::from_seed([0; 32]);
    let mut tq = TrQuant::new();
    tq.set_qp(-24, 12);
    for mts in [
      MtsIdx::Dct2Dct2,
      MtsIdx::Skip,
      MtsIdx::Dst7Dst7,
      MtsIdx::Dct8Dst7,
      MtsIdx::Dst7Dct8,
      MtsIdx::Dct8Dct8,
    ] {
      let resi = random_residual(&mut ra, 8 * 16);
      let p = TxParams {
        width: 8,
        height: 16,
        mts,
        lfnst_idx: 0,
        lfnst_transpose: false,
      };
      let mut levels = Vec::new();
      let stats = tq.transform_quant(&resi, &p, &mut levels);
      assert!(stats.abs_sum > 0);
      let mut out = vec![0; 8 * 16];
      tq.inv_transform(&levels, &p, &mut out);
      for (a, b) in resi.iter().zip(&out) {
        assert!((a - b).abs() <= 1, "{mts:?}: {a} vs {b}");
      }
    }
  }

  #[test]
  fn zero_residual_has_no_last_position() {
    let mut tq = TrQuant::new();
    tq.set_qp(30, 8);
    let p = TxParams {
      width: 4,
      height: 4,
      mts: MtsIdx::Dct2Dct2,
      lfnst_idx: 0,
      lfnst_transpose: false,
    };
    let mut levels = Vec::new();
    let stats = tq.transform_quant(&[0; 16], &p, &mut levels);
    assert_eq!(stats, TxStats { abs_sum: 0, last_scan_pos: None });
  }

  #[test]
  fn dc_only_residual_ends_at_scan_start() {
    let mut tq = TrQuant::new();
    tq.set_qp(22, 8);
    let p = TxParams {
      width: 8,
      height: 8,
      mts: MtsIdx::Dct2Dct2,
      lfnst_idx: 0,
      lfnst_transpose: false,
    };
    let mut levels = Vec::new();
    let stats = tq.transform_quant(&[40; 64], &p, &mut levels);
    assert_eq!(stats.last_scan_pos, Some(0));
    assert!(levels[1..].iter().all(|&l| l == 0));
  }
}
