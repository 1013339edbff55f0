// Copyright (c) 2001-2016, Alliance for Open Media. All rights reserved
// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Transform, quantisation and reconstruction of one transform block
//! under a fixed hypothesis.

use crate::dist::*;
use crate::encoder::reshape::{
  scale_chroma_resi_fwd, scale_chroma_resi_inv, CSCALE_FP_PREC,
};
use crate::frame::PlaneRegion;
use crate::partition::{ComponentId, TransformUnit};
use crate::rdo::{Distortion, MAX_DISTORTION};
use crate::transform::{
  fwd_ict, inv_ict, MtsIdx, TrQuant, TxParams, TxStats,
};
use crate::util::*;

/// Lambda factor of a joint trial coding both chroma channels from one
/// block.
const JOINT_BOTH_LAMBDA: f64 = 0.5;
/// Lambda factor of a joint trial with a single-sided mask.
const JOINT_ONE_SIDED_LAMBDA: f64 = 0.8;
/// Chroma lambda boost at higher slice QPs with joint coding enabled.
const CHROMA_BOOST_LAMBDA: f64 = 1.3;

/// How the distortion of a reconstruction is measured.
#[derive(Debug, Clone, Copy)]
pub enum DistMode<'a, T: Pixel> {
  /// Plain sum of squared errors.
  Plain,
  /// Squared error weighted by the level of the co-located original luma.
  Weighted {
    luma: PlaneRegion<'a, T>,
    xdec: usize,
    ydec: usize,
    weights: &'a [u32],
  },
  /// Luma reconstructed in the reshaped domain, mapped back before
  /// comparing against the original and weighted by its level.
  InvReshaped { inv_lut: &'a [i32], weights: &'a [u32] },
}

/// Everything the coder needs to code one block. Built fresh for every
/// trial; nothing in it is written back.
#[derive(Debug, Clone, Copy)]
pub struct TuHypothesis<'a, T: Pixel> {
  pub comp: ComponentId,
  pub width: usize,
  pub height: usize,
  pub bit_depth: usize,
  pub qp: i32,
  pub mts: MtsIdx,
  pub lfnst_idx: u8,
  pub lfnst_transpose: bool,
  /// Joint Cb-Cr mask under trial, 0 for separate coding.
  pub joint_cb_cr: u8,
  pub joint_sign_neg: bool,
  /// Chroma residual scale, 0 when chroma scaling is off for this block.
  pub chroma_adj: i32,
  pub lambda: f64,
  pub boost_chroma: bool,
  pub pred: &'a [T],
  /// Cr prediction of a joint trial.
  pub pred_cr: Option<&'a [T]>,
  /// Samples the residual is taken against.
  pub src: PlaneRegion<'a, T>,
  pub src_cr: Option<PlaneRegion<'a, T>>,
  /// Samples the distortion is measured against.
  pub org: PlaneRegion<'a, T>,
  pub org_cr: Option<PlaneRegion<'a, T>>,
  pub dist: DistMode<'a, T>,
}

impl<T: Pixel> TuHypothesis<'_, T> {
  #[inline(always)]
  pub fn is_joint(&self) -> bool {
    self.joint_cb_cr != 0
  }

  /// Component whose levels carry the joint residual.
  #[inline(always)]
  fn coded_comp(&self) -> ComponentId {
    if !self.is_joint() {
      self.comp
    } else if self.joint_cb_cr >> 1 != 0 {
      ComponentId::Cb
    } else {
      ComponentId::Cr
    }
  }

  fn lambda_factor(&self) -> f64 {
    let mut f = 1.0;
    if self.comp.is_chroma() && self.chroma_adj != 0 {
      let s = self.chroma_adj as f64 / (1 << CSCALE_FP_PREC) as f64;
      f *= s * s;
    }
    if self.is_joint() {
      f *= if self.joint_cb_cr == 3 {
        JOINT_BOTH_LAMBDA
      } else {
        JOINT_ONE_SIDED_LAMBDA
      };
    }
    if self.boost_chroma && self.comp.is_chroma() {
      f *= CHROMA_BOOST_LAMBDA;
    }
    f
  }
}

/// Outcome of coding one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuResult {
  pub dist: Distortion,
  pub abs_sum: u32,
  /// Scan index of the last coded level.
  pub last_scan_pos: Option<usize>,
}

impl TuResult {
  const REJECTED: TuResult =
    TuResult { dist: MAX_DISTORTION, abs_sum: 0, last_scan_pos: None };

  #[inline(always)]
  pub fn cbf(&self) -> bool {
    self.abs_sum > 0
  }
}

/// Residual of `src` against a packed `w`x`h` prediction.
pub fn compute_residual<T: Pixel>(
  src: &PlaneRegion<'_, T>, pred: &[T], w: usize, h: usize,
  out: &mut Vec<i32>,
) {
  out.clear();
  for (row, p) in src.rows_iter().take(h).zip(pred.chunks_exact(w)) {
    out.extend(
      row[..w]
        .iter()
        .zip(p)
        .map(|(&o, &p)| i32::cast_from(o) - i32::cast_from(p)),
    );
  }
}

fn reconstruct<T: Pixel>(
  pred: &[T], resi: &[i32], bit_depth: usize, reco: &mut [T],
) {
  for ((r, &p), &d) in reco.iter_mut().zip(pred).zip(resi) {
    *r = T::clip_from(i32::cast_from(p) + d, bit_depth);
  }
}

fn inv_reshaped_sse<T: Pixel>(
  org: &PlaneRegion<'_, T>, reco: &PlaneRegion<'_, T>, w: usize, h: usize,
  inv_lut: &[i32], weights: &[u32],
) -> u64 {
  let mut sum = 0u64;
  for (o, r) in org.rows_iter().take(h).zip(reco.rows_iter()) {
    for (&a, &b) in o[..w].iter().zip(r) {
      let level = i32::cast_from(a);
      let idx = (i32::cast_from(b) as usize).min(inv_lut.len() - 1);
      let mapped = inv_lut[idx];
      let d = (level - mapped) as i64;
      let wt = weights[(level as usize).min(weights.len() - 1)] as u64;
      sum += wt * (d * d) as u64;
    }
  }
  (sum + (1 << WEIGHT_SHIFT >> 1)) >> WEIGHT_SHIFT
}

fn measure<T: Pixel>(
  mode: &DistMode<'_, T>, org: &PlaneRegion<'_, T>, reco: &[T], w: usize,
  h: usize,
) -> Distortion {
  let reco = PlaneRegion::from_slice(reco, w, h);
  match mode {
    DistMode::Plain => get_sse(org, &reco, w, h),
    DistMode::Weighted { luma, xdec, ydec, weights } => {
      get_weighted_sse(org, &reco, w, h, luma, *xdec, *ydec, weights)
    }
    DistMode::InvReshaped { inv_lut, weights } => {
      inv_reshaped_sse(org, &reco, w, h, inv_lut, weights)
    }
  }
}

/// Shared transform-block coder of the luma and chroma searches.
#[derive(Debug, Clone, Default)]
pub struct ResidualCoder {
  trq: TrQuant,
  resi: Vec<i32>,
  resi_cr: Vec<i32>,
  joint: Vec<i32>,
}

impl ResidualCoder {
  pub fn new() -> Self {
    ResidualCoder {
      trq: TrQuant::new(),
      resi: Vec::with_capacity(64 * 64),
      resi_cr: Vec::with_capacity(64 * 64),
      joint: Vec::with_capacity(64 * 64),
    }
  }

  pub fn trq_mut(&mut self) -> &mut TrQuant {
    &mut self.trq
  }

  /// Scan order the levels of a `w`x`h` block are coded in.
  pub fn scan(&self, w: usize, h: usize) -> &[u16] {
    self.trq.scan(w, h)
  }

  /// Codes `hyp` into `tu` and writes the reconstruction into `reco` (and
  /// `reco_cr` for a joint trial).
  ///
  /// A joint trial whose coded flags come out different from its mask
  /// reports [`MAX_DISTORTION`] and leaves the reconstruction untouched.
  #[profiling::function]
  pub fn code_tu_block<T: Pixel>(
    &mut self, hyp: &TuHypothesis<'_, T>, tu: &mut TransformUnit,
    reco: &mut [T], reco_cr: Option<&mut [T]>,
  ) -> TuResult {
    let (w, h) = (hyp.width, hyp.height);
    let n = w * h;
    let joint = hyp.is_joint();
    debug_assert!(!joint || hyp.comp == ComponentId::Cb);

    compute_residual(&hyp.src, hyp.pred, w, h, &mut self.resi);
    if joint {
      let (Some(src_cr), Some(pred_cr)) = (hyp.src_cr, hyp.pred_cr) else {
        return TuResult::REJECTED;
      };
      compute_residual(&src_cr, pred_cr, w, h, &mut self.resi_cr);
    }
    let scale_chroma = hyp.comp.is_chroma() && hyp.chroma_adj != 0;
    if scale_chroma {
      scale_chroma_resi_fwd(&mut self.resi, hyp.chroma_adj);
      if joint {
        scale_chroma_resi_fwd(&mut self.resi_cr, hyp.chroma_adj);
      }
    }

    self.trq.set_qp(hyp.qp, hyp.bit_depth);
    self.trq.select_lambda(hyp.lambda);
    self.trq.scale_lambda(hyp.lambda_factor());

    let coded = hyp.coded_comp() as usize;
    if joint {
      self.joint.clear();
      self.joint.resize(n, 0);
      fwd_ict(
        &self.resi,
        &self.resi_cr,
        hyp.joint_cb_cr,
        hyp.joint_sign_neg,
        &mut self.joint,
      );
    }

    let p = TxParams {
      width: w,
      height: h,
      mts: hyp.mts,
      lfnst_idx: hyp.lfnst_idx,
      lfnst_transpose: hyp.lfnst_transpose,
    };
    let input = if joint { &self.joint } else { &self.resi };
    let TxStats { abs_sum, last_scan_pos } =
      self.trq.transform_quant(input, &p, &mut tu.coeffs[coded]);

    tu.cbf[coded] = abs_sum > 0;
    tu.mts_idx[coded] = hyp.mts;
    if hyp.comp.is_chroma() {
      tu.joint_cb_cr = hyp.joint_cb_cr;
      tu.chroma_adj = hyp.chroma_adj;
    }

    let out = if joint { &mut self.joint } else { &mut self.resi };
    if abs_sum > 0 {
      self.trq.inv_transform(&tu.coeffs[coded], &p, out);
    } else {
      out[..n].fill(0);
    }

    if joint {
      let other = 3 - coded;
      tu.cbf[other] = false;
      tu.coeffs[other].clear();
      let mut coded_mask = 0;
      if abs_sum > 0 {
        coded_mask += if coded == ComponentId::Cb as usize { 2 } else { 1 };
      }
      if hyp.joint_cb_cr == 3 && coded_mask == 2 {
        coded_mask = 3;
        tu.cbf[ComponentId::Cr as usize] = true;
      }
      if hyp.joint_cb_cr != coded_mask {
        return TuResult::REJECTED;
      }
      inv_ict(
        &self.joint,
        hyp.joint_cb_cr,
        hyp.joint_sign_neg,
        &mut self.resi,
        &mut self.resi_cr,
      );
    }

    if scale_chroma && abs_sum > 0 {
      scale_chroma_resi_inv(&mut self.resi[..n], hyp.chroma_adj);
      if joint {
        scale_chroma_resi_inv(&mut self.resi_cr[..n], hyp.chroma_adj);
      }
    }

    reconstruct(hyp.pred, &self.resi, hyp.bit_depth, &mut reco[..n]);
    let mut dist = measure(&hyp.dist, &hyp.org, reco, w, h);

    if joint {
      let (Some(reco_cr), Some(pred_cr), Some(org_cr)) =
        (reco_cr, hyp.pred_cr, hyp.org_cr)
      else {
        return TuResult::REJECTED;
      };
      reconstruct(pred_cr, &self.resi_cr, hyp.bit_depth, &mut reco_cr[..n]);
      dist += measure(&hyp.dist, &org_cr, reco_cr, w, h);
    }

    TuResult { dist, abs_sum, last_scan_pos }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;

  const W: usize = 8;
  const H: usize = 8;

  fn hyp<'a>(
    comp: ComponentId, pred: &'a [u8], org: &'a [u8],
  ) -> TuHypothesis<'a, u8> {
    let org = PlaneRegion::from_slice(org, W, H);
    TuHypothesis {
      comp,
      width: W,
      height: H,
      bit_depth: 8,
      qp: 0,
      mts: MtsIdx::Dct2Dct2,
      lfnst_idx: 0,
      lfnst_transpose: false,
      joint_cb_cr: 0,
      joint_sign_neg: false,
      chroma_adj: 0,
      lambda: 0.0,
      boost_chroma: false,
      pred,
      pred_cr: None,
      src: org,
      src_cr: None,
      org,
      org_cr: None,
      dist: DistMode::Plain,
    }
  }

  fn noisy_block(ra: &mut ChaChaRng) -> Vec<u8> {
    (0..W * H).map(|_| ra.gen_range(60..200)).collect()
  }

  #[test]
  fn exact_prediction_codes_nothing() {
    let pred = vec![128u8; W * H];
    let org = pred.clone();
    let mut coder = ResidualCoder::new();
    let mut tu = TransformUnit::default();
    let mut reco = vec![0u8; W * H];
    let r = coder.code_tu_block(
      &hyp(ComponentId::Y, &pred, &org),
      &mut tu,
      &mut reco,
      None,
    );
    assert_eq!(r, TuResult { dist: 0, abs_sum: 0, last_scan_pos: None });
    assert!(!tu.cbf[0]);
    assert_eq!(reco, pred);
  }

  #[test]
  fn fine_quantiser_reconstructs_closely() {
    let mut ra = ChaChaRng::from_seed([0; 32]);
    let org = noisy_block(&mut ra);
    let pred = vec![128u8; W * H];
    let mut coder = ResidualCoder::new();
    let mut tu = TransformUnit::default();
    let mut reco = vec![0u8; W * H];
    let r = coder.code_tu_block(
      &hyp(ComponentId::Y, &pred, &org),
      &mut tu,
      &mut reco,
      None,
    );
    assert!(r.cbf());
    assert!(tu.cbf[0]);
    assert!(r.last_scan_pos.is_some());
    assert!(r.dist <= 2 * (W * H) as u64, "dist {}", r.dist);
  }

  #[test]
  fn coarse_quantiser_costs_distortion() {
    let mut ra = ChaChaRng::from_seed([0; 32]);
    let org = noisy_block(&mut ra);
    let pred = vec![128u8; W * H];
    let mut coder = ResidualCoder::new();
    let mut tu = TransformUnit::default();
    let mut reco = vec![0u8; W * H];
    let mut h = hyp(ComponentId::Y, &pred, &org);
    let fine = coder.code_tu_block(&h, &mut tu, &mut reco, None);
    h.qp = 50;
    let coarse = coder.code_tu_block(&h, &mut tu, &mut reco, None);
    assert!(coarse.dist > fine.dist);
    assert!(coarse.abs_sum < fine.abs_sum);
  }

  #[test]
  fn joint_trial_with_missing_levels_is_rejected() {
    let pred = vec![100u8; W * H];
    let org = pred.clone();
    let mut coder = ResidualCoder::new();
    for mask in 1..=3 {
      let mut h = hyp(ComponentId::Cb, &pred, &org);
      h.joint_cb_cr = mask;
      h.pred_cr = Some(&pred);
      h.src_cr = Some(h.src);
      h.org_cr = Some(h.org);
      let mut tu = TransformUnit::default();
      let mut reco = vec![0u8; W * H];
      let mut reco_cr = vec![0u8; W * H];
      let r = coder.code_tu_block(&h, &mut tu, &mut reco, Some(&mut reco_cr));
      assert_eq!(r.dist, MAX_DISTORTION);
      assert!(!tu.cbf[1] && !tu.cbf[2]);
    }
  }

  #[test]
  fn joint_trial_rebuilds_both_channels() {
    let mut ra = ChaChaRng::from_seed([0; 32]);
    let org = noisy_block(&mut ra);
    let pred = vec![128u8; W * H];
    let mut h = hyp(ComponentId::Cb, &pred, &org);
    h.joint_cb_cr = 3;
    h.pred_cr = Some(&pred);
    h.src_cr = Some(h.src);
    h.org_cr = Some(h.org);
    let mut coder = ResidualCoder::new();
    let mut tu = TransformUnit::default();
    let mut reco = vec![0u8; W * H];
    let mut reco_cr = vec![0u8; W * H];
    let r = coder.code_tu_block(&h, &mut tu, &mut reco, Some(&mut reco_cr));
    assert!(r.dist <= 4 * (W * H) as u64, "dist {}", r.dist);
    assert_eq!(tu.cbf, [false, true, true]);
    assert_eq!(tu.joint_cb_cr, 3);
    assert!(tu.coeffs[2].is_empty());
    assert_eq!(reco, reco_cr);
  }

  #[test]
  fn unit_weights_measure_plain_sse() {
    let mut ra = ChaChaRng::from_seed([1; 32]);
    let org = noisy_block(&mut ra);
    let pred = vec![128u8; W * H];
    let weights = vec![1u32 << WEIGHT_SHIFT; 256];
    let mut coder = ResidualCoder::new();
    let mut tu = TransformUnit::default();
    let mut reco = vec![0u8; W * H];
    let mut h = hyp(ComponentId::Y, &pred, &org);
    h.qp = 30;
    let plain = coder.code_tu_block(&h, &mut tu, &mut reco, None);
    h.dist =
      DistMode::Weighted { luma: h.org, xdec: 0, ydec: 0, weights: &weights };
    let weighted = coder.code_tu_block(&h, &mut tu, &mut reco, None);
    assert_eq!(plain, weighted);
    let inv_lut: Vec<i32> = (0..256).collect();
    h.dist = DistMode::InvReshaped { inv_lut: &inv_lut, weights: &weights };
    let inv = coder.code_tu_block(&h, &mut tu, &mut reco, None);
    assert_eq!(plain, inv);
  }
}
