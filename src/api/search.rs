// Copyright (c) 2018-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use thiserror::Error;

use crate::encoder::reshape::ReshapeTable;
use crate::partition::ComponentId;
use crate::predict::ModeInfo;
use crate::quantize::MAX_QP;
use crate::rdo::{Distortion, RdCost};
use crate::transform::MtsIdx;

/// Conditions that abort the search of one coding unit.
///
/// These signal misuse or a broken invariant, never a poor RD outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SearchError {
  /// The luma RD loop accepted no candidate.
  #[error("no luma candidate survived RD confirmation")]
  NoLumaCandidate,
  /// The chroma search ran before the luma decision was committed.
  #[error("chroma search requires a committed luma decision")]
  LumaNotDecided,
  /// The block does not fit the configured transform or pool sizes.
  #[error("unsupported block size {width}x{height}")]
  UnsupportedBlockSize {
    /// Block width.
    width: usize,
    /// Block height.
    height: usize,
  },
  /// Chroma search on a monochrome picture.
  #[error("the picture carries no chroma planes")]
  NoChromaPlanes,
  /// The chroma RD loop accepted no candidate.
  #[error("no chroma candidate survived RD confirmation")]
  NoChromaCandidate,
}

/// Slice-level inputs of the search.
#[derive(Debug, Clone)]
pub struct SliceParams {
  /// The slice only allows intra prediction.
  pub is_intra: bool,
  /// Slice QP.
  pub slice_qp: i32,
  /// QP offset of Cb (and of joint Cb-Cr blocks).
  pub cb_qp_offset: i32,
  /// QP offset of Cr.
  pub cr_qp_offset: i32,
  /// Lagrange multiplier.
  pub lambda: f64,
  /// Weight of chroma distortion relative to luma.
  pub chroma_weight: f64,
  /// Sign of the joint Cb-Cr relation.
  pub joint_cbcr_sign_neg: bool,
  /// Luma mapping of the slice, when active.
  pub reshaper: Option<ReshapeTable>,
  /// Scale chroma residuals by the luma mapping.
  pub lmcs_chroma_scaling: bool,
  /// Weight luma distortion by the original luma level.
  pub luma_level_weighting: bool,
}

impl SliceParams {
  /// Intra slice at `slice_qp` with plain distortion.
  pub fn new(slice_qp: i32, lambda: f64) -> Self {
    SliceParams {
      is_intra: true,
      slice_qp,
      cb_qp_offset: 0,
      cr_qp_offset: 0,
      lambda,
      chroma_weight: 1.0,
      joint_cbcr_sign_neg: false,
      reshaper: None,
      lmcs_chroma_scaling: false,
      luma_level_weighting: false,
    }
  }

  /// Cost function of the slice.
  pub fn rd_cost(&self) -> RdCost {
    RdCost::new(self.lambda, self.chroma_weight)
  }

  /// QP of `comp` in a coding unit at `cu_qp`.
  pub fn comp_qp(&self, cu_qp: i32, comp: ComponentId) -> i32 {
    let offset = match comp {
      ComponentId::Y => 0,
      ComponentId::Cb => self.cb_qp_offset,
      ComponentId::Cr => self.cr_qp_offset,
    };
    (cu_qp + offset).min(MAX_QP)
  }

  /// Chroma residual scaling is in effect.
  #[inline]
  pub fn scales_chroma(&self) -> bool {
    self.lmcs_chroma_scaling && self.reshaper.is_some()
  }
}

/// Caller knowledge about the area under search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LumaHints {
  /// Hadamard cost of the best inter hypothesis.
  pub inter_had: Option<u64>,
  /// Best cost known for the area so far.
  pub best_cost: f64,
  /// RD cost of the co-located inter coding, if already searched.
  pub inter_cost: Option<f64>,
}

impl Default for LumaHints {
  fn default() -> Self {
    LumaHints { inter_had: None, best_cost: f64::MAX, inter_cost: None }
  }
}

/// Luma decision committed to the coding unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LumaDecision {
  /// Winning prediction hypothesis.
  pub mode: ModeInfo,
  /// Secondary transform index.
  pub lfnst_idx: u8,
  /// Primary kernels.
  pub mts: MtsIdx,
  /// RD cost.
  pub cost: f64,
  /// Luma distortion.
  pub dist: Distortion,
  /// Estimated bits, fractional units.
  pub frac_bits: u64,
  /// Luma coded-block flag.
  pub cbf: bool,
}

/// Result of the luma search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LumaOutcome {
  /// A luma mode was chosen and committed.
  Chosen(LumaDecision),
  /// No intra candidate is competitive with inter coding; nothing was
  /// committed.
  DeferToInter,
}

/// Chroma decision committed to the coding unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaDecision {
  /// Chroma intra mode.
  pub mode: u8,
  /// Joint Cb-Cr mask, 0 for separate coding.
  pub joint_cb_cr: u8,
  /// Secondary transform index after the chroma decision.
  pub lfnst_idx: u8,
  /// RD cost.
  pub cost: f64,
  /// Chroma distortion on the luma scale.
  pub dist: Distortion,
  /// Cb and Cr coded-block flags.
  pub cbf: [bool; 2],
}
