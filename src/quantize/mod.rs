// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub const MAX_QP: i32 = 63;

/// Quantiser step of `qp` for residuals at `bit_depth`.
///
/// The step doubles every 6 QP; QP 4 is unit step at 8 bits.
pub fn qp_to_qstep(qp: i32, bit_depth: usize) -> f64 {
  let qp = qp.clamp(-6 * (bit_depth as i32 - 8), MAX_QP);
  2f64.powf((qp - 4) as f64 / 6.0) * (1 << (bit_depth - 8)) as f64
}

/// Approximate bits of a quantised level, used only to bias rounding.
#[inline(always)]
fn level_rate(level: u32) -> f64 {
  if level == 0 {
    0.0
  } else {
    2.0 + 2.0 * (level as f64).log2()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct QuantizationContext {
  qstep: f64,
  /// Lambda the level decision trades squared error against bits with.
  lambda: f64,
  /// Rounding offset, in steps, applied before the level decision.
  offset: f64,
}

impl Default for QuantizationContext {
  fn default() -> Self {
    QuantizationContext { qstep: 1.0, lambda: 0.0, offset: 1.0 / 3.0 }
  }
}

impl QuantizationContext {
  pub fn update(&mut self, qp: i32, bit_depth: usize) {
    self.qstep = qp_to_qstep(qp, bit_depth);
  }

  #[inline(always)]
  pub fn qstep(&self) -> f64 {
    self.qstep
  }

  pub fn set_lambda(&mut self, lambda: f64) {
    self.lambda = lambda;
  }

  #[inline(always)]
  pub fn lambda(&self) -> f64 {
    self.lambda
  }

  /// Quantises orthonormal transform coefficients into `levels`, returning
  /// the sum of absolute levels.
  ///
  /// Each coefficient picks between the dead-zone level and one below it,
  /// whichever has the lower squared error plus lambda-weighted rate.
  pub fn quantize(&self, coeffs: &[f64], levels: &mut [i32]) -> u32 {
    debug_assert!(levels.len() >= coeffs.len());
    let mut abs_sum = 0;
    for (&c, l) in coeffs.iter().zip(levels.iter_mut()) {
      let q = c.abs() / self.qstep;
      let hi = (q + self.offset).floor() as u32;
      let level = if hi == 0 || self.lambda == 0.0 {
        hi
      } else {
        let cost = |lv: u32| {
          let err = (q - lv as f64) * self.qstep;
          err * err + self.lambda * level_rate(lv)
        };
        if cost(hi - 1) < cost(hi) {
          hi - 1
        } else {
          hi
        }
      };
      *l = if c < 0.0 { -(level as i32) } else { level as i32 };
      abs_sum += level;
    }
    abs_sum
  }

  pub fn dequantize(&self, levels: &[i32], coeffs: &mut [f64]) {
    for (&l, c) in levels.iter().zip(coeffs.iter_mut()) {
      *c = l as f64 * self.qstep;
    }
  }
}
