// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Piecewise-linear luma mapping with chroma residual scaling.
//!
//! The luma range is cut into 16 equal bins; bin `i` is stretched to
//! `bin_codewords[i]` codewords of the reshaped domain.

use crate::dist::WEIGHT_SHIFT;
use crate::serialize::{Deserialize, Serialize};

/// Fixed-point precision of chroma residual scales.
pub const CSCALE_FP_PREC: u32 = 11;
pub const PIC_CODE_CW_BINS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReshapeTable {
  bit_depth: usize,
  bin_codewords: [u32; PIC_CODE_CW_BINS],
  fwd_lut: Vec<i32>,
  inv_lut: Vec<i32>,
  /// Reshaped-domain start of every bin, plus the end of the last one.
  rsp_pivot: [i32; PIC_CODE_CW_BINS + 1],
  chroma_scale: [i32; PIC_CODE_CW_BINS],
  weights: Vec<u32>,
}

impl ReshapeTable {
  /// Builds the mapping. Codeword totals beyond the sample range saturate
  /// at the top code value.
  pub fn new(
    bit_depth: usize, bin_codewords: [u32; PIC_CODE_CW_BINS],
  ) -> Self {
    let range = 1usize << bit_depth;
    let max = range as i32 - 1;
    let org_cw = (range / PIC_CODE_CW_BINS) as i64;

    let mut rsp_pivot = [0i32; PIC_CODE_CW_BINS + 1];
    for i in 0..PIC_CODE_CW_BINS {
      rsp_pivot[i + 1] = rsp_pivot[i] + bin_codewords[i] as i32;
    }

    let fwd_lut = (0..range)
      .map(|v| {
        let bin = v / org_cw as usize;
        let off = (v as i64) - bin as i64 * org_cw;
        let cw = bin_codewords[bin] as i64;
        let r = rsp_pivot[bin] as i64 + (off * cw + org_cw / 2) / org_cw;
        r.clamp(0, max as i64) as i32
      })
      .collect();

    let inv_lut = (0..range as i32)
      .map(|r| {
        let bin = (0..PIC_CODE_CW_BINS)
          .find(|&i| bin_codewords[i] > 0 && r < rsp_pivot[i + 1]);
        match bin {
          None => max,
          Some(i) => {
            let cw = bin_codewords[i] as i64;
            let off = (r - rsp_pivot[i]).max(0) as i64;
            let v = i as i64 * org_cw + (off * org_cw + cw / 2) / cw;
            v.clamp(0, max as i64) as i32
          }
        }
      })
      .collect();

    let mut chroma_scale = [1 << CSCALE_FP_PREC; PIC_CODE_CW_BINS];
    for (s, &cw) in chroma_scale.iter_mut().zip(&bin_codewords) {
      if cw > 0 {
        *s = (((org_cw << CSCALE_FP_PREC) + cw as i64 / 2) / cw as i64) as i32;
      }
    }

    let weights = (0..range)
      .map(|v| {
        let ratio = bin_codewords[v / org_cw as usize] as f64 / org_cw as f64;
        ((ratio * ratio * (1u64 << WEIGHT_SHIFT) as f64).round() as u32).max(1)
      })
      .collect();

    ReshapeTable {
      bit_depth,
      bin_codewords,
      fwd_lut,
      inv_lut,
      rsp_pivot,
      chroma_scale,
      weights,
    }
  }

  /// Mapping that leaves every sample where it is.
  pub fn identity(bit_depth: usize) -> Self {
    let org_cw = ((1usize << bit_depth) / PIC_CODE_CW_BINS) as u32;
    Self::new(bit_depth, [org_cw; PIC_CODE_CW_BINS])
  }

  #[inline(always)]
  pub fn bit_depth(&self) -> usize {
    self.bit_depth
  }

  pub fn bin_codewords(&self) -> &[u32; PIC_CODE_CW_BINS] {
    &self.bin_codewords
  }

  #[inline(always)]
  pub fn fwd(&self, v: i32) -> i32 {
    self.fwd_lut[v.clamp(0, self.fwd_lut.len() as i32 - 1) as usize]
  }

  #[inline(always)]
  pub fn inv(&self, v: i32) -> i32 {
    self.inv_lut[v.clamp(0, self.inv_lut.len() as i32 - 1) as usize]
  }

  pub fn inv_lut(&self) -> &[i32] {
    &self.inv_lut
  }

  /// Chroma residual scale, in `CSCALE_FP_PREC` units, for a block whose
  /// neighbouring reshaped luma averages `avg_rsp_luma`.
  pub fn chroma_adj(&self, avg_rsp_luma: i32) -> i32 {
    let bin = (0..PIC_CODE_CW_BINS)
      .find(|&i| avg_rsp_luma < self.rsp_pivot[i + 1])
      .unwrap_or(PIC_CODE_CW_BINS - 1);
    self.chroma_scale[bin]
  }

  /// Distortion weights indexed by original-domain luma, unit weight being
  /// `1 << WEIGHT_SHIFT`.
  pub fn weights(&self) -> &[u32] {
    &self.weights
  }
}

/// Applies a chroma residual scale in the forward direction.
#[inline(always)]
pub fn scale_chroma_resi_fwd(resi: &mut [i32], chroma_adj: i32) {
  let s = chroma_adj as i64;
  for r in resi.iter_mut() {
    let v = (*r as i64) << CSCALE_FP_PREC;
    *r = if v >= 0 {
      ((v + s / 2) / s) as i32
    } else {
      -((-v + s / 2) / s) as i32
    };
  }
}

/// Undoes [`scale_chroma_resi_fwd`] on a reconstructed residual.
#[inline(always)]
pub fn scale_chroma_resi_inv(resi: &mut [i32], chroma_adj: i32) {
  let round = 1i64 << (CSCALE_FP_PREC - 1);
  for r in resi.iter_mut() {
    let v = *r as i64 * chroma_adj as i64;
    *r = if v >= 0 {
      ((v + round) >> CSCALE_FP_PREC) as i32
    } else {
      -((-v + round) >> CSCALE_FP_PREC) as i32
    };
  }
}

/// Distortion weights favouring dark content: a luma level `v` gets
/// `2^(-dqp/3)` with `dqp` growing from -3 for the darkest to +2 for the
/// brightest samples.
pub fn luma_level_weights(bit_depth: usize) -> Vec<u32> {
  (0..1usize << bit_depth)
    .map(|v| {
      let l8 = (v >> (bit_depth - 8)) as i32;
      let dqp = ((l8 - 128) * 3).div_euclid(128).clamp(-3, 2);
      let w = 2f64.powf(-dqp as f64 / 3.0);
      (w * (1u64 << WEIGHT_SHIFT) as f64).round() as u32
    })
    .collect()
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn identity_maps_onto_itself() {
    let t = ReshapeTable::identity(10);
    for v in [0, 1, 63, 64, 511, 1023] {
      assert_eq!(t.fwd(v), v);
      assert_eq!(t.inv(v), v);
    }
    assert_eq!(t.chroma_adj(300), 1 << CSCALE_FP_PREC);
    assert!(t.weights().iter().all(|&w| w == 1 << WEIGHT_SHIFT));
  }

  #[test]
  fn stretched_bin_scales_chroma_down() {
    let mut cw = [16u32; PIC_CODE_CW_BINS];
    cw[4] = 32;
    cw[5] = 0;
    let t = ReshapeTable::new(8, cw);
    assert_eq!(t.fwd(64), 64);
    assert_eq!(t.fwd(72), 80);
    assert_eq!(t.fwd(80), 96);
    // the empty bin collapses
    assert_eq!(t.fwd(88), 96);
    assert_eq!(t.inv(80), 72);
    assert_eq!(t.chroma_adj(70), 1 << (CSCALE_FP_PREC - 1));
    assert_eq!(t.weights()[70], 4 << WEIGHT_SHIFT);
    assert_eq!(t.weights()[85], 1);
  }

  #[test]
  fn chroma_scaling_round_trips() {
    let orig = [-40, -3, 0, 5, 100];
    let mut r = orig;
    scale_chroma_resi_fwd(&mut r, 1 << (CSCALE_FP_PREC - 1));
    assert_eq!(r, [-80, -6, 0, 10, 200]);
    scale_chroma_resi_inv(&mut r, 1 << (CSCALE_FP_PREC - 1));
    assert_eq!(r, orig);
  }

  #[test]
  fn dark_samples_weigh_more() {
    let w = luma_level_weights(8);
    assert!(w[10] > w[128]);
    assert!(w[128] > w[250]);
    assert_eq!(w[128], 1 << WEIGHT_SHIFT);
  }
}
