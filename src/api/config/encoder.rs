// Copyright (c) 2020, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use itertools::*;

use crate::api::SpeedSettings;
use crate::frame::ChromaSampling;
use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Empirical constants of the pruning heuristics.
///
/// None of them has a derivation; they are exposed so they can be re-tuned.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchTuning {
  /// Numerator of the `1 + x / sqrt(area)` slack the DCT-II cost may exceed
  /// the best known cost by before alternate kernels are abandoned.
  pub mts_slack_numerator: f64,
  /// Numerator of the `1 + x / sqrt(area)` cost ratio above which MIP
  /// candidates leave the Hadamard list.
  pub mip_slack_numerator: f64,
  /// Luma RD stops once its best cost exceeds this multiple of the inter
  /// cost.
  pub inter_cost_stop_ratio: f64,
  /// Discount of MIP costs in the Hadamard-only list.
  pub mip_had_discount: f64,
  /// A Hadamard candidate is only RD tested when cheaper than this multiple
  /// of the inter Hadamard cost.
  pub pb_intra_ratio: f64,
  /// Kernel groups keep being searched while DCT-II stays within this
  /// ratio of the group's best.
  pub tr_group_stop_threshold: f64,
  /// Trailing chroma prescreen candidates dropped before RD.
  pub chroma_reduced_modes: usize,
}

impl Default for SearchTuning {
  fn default() -> Self {
    SearchTuning {
      mts_slack_numerator: 1.4,
      mip_slack_numerator: 1.4,
      inter_cost_stop_ratio: 1.5,
      mip_had_discount: 0.8,
      pb_intra_ratio: 1.1,
      tr_group_stop_threshold: 1.001,
      chroma_reduced_modes: 2,
    }
  }
}

impl SearchTuning {
  /// Ratios that must be positive and finite, by name.
  pub(crate) fn ratios(&self) -> [(&'static str, f64); 6] {
    [
      ("mts_slack_numerator", self.mts_slack_numerator),
      ("mip_slack_numerator", self.mip_slack_numerator),
      ("inter_cost_stop_ratio", self.inter_cost_stop_ratio),
      ("mip_had_discount", self.mip_had_discount),
      ("pb_intra_ratio", self.pb_intra_ratio),
      ("tr_group_stop_threshold", self.tr_group_stop_threshold),
    ]
  }
}

/// Tools and limits of the intra search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntraSearchConfig {
  /// Bit depth.
  pub bit_depth: usize,
  /// Chroma subsampling.
  pub chroma_sampling: ChromaSampling,
  /// Side of the coding tree unit.
  pub ctu_size: usize,
  /// Largest transform block side.
  pub max_tb_size: usize,

  /// Matrix-weighted intra prediction.
  pub mip: bool,
  /// Multiple reference lines.
  pub mrl: bool,
  /// Low-frequency non-separable secondary transform.
  pub lfnst: bool,
  /// Alternate primary transform kernels.
  pub mts: bool,
  /// Transform skip for luma.
  pub transform_skip: bool,
  /// Joint coding of the chroma residuals.
  pub joint_cbcr: bool,
  /// Cross-component linear model chroma prediction.
  pub cclm: bool,
  /// Alternate kernels tried per block.
  pub mts_intra_max_cand: usize,

  /// Settings which affect the search speed.
  pub speed_settings: SpeedSettings,
  /// Pruning constants.
  pub tuning: SearchTuning,
}

/// Default preset for IntraSearchConfig: it is a balance between quality
/// and speed. See [`with_speed_preset()`].
///
/// [`with_speed_preset()`]: IntraSearchConfig::with_speed_preset
impl Default for IntraSearchConfig {
  fn default() -> Self {
    const DEFAULT_SPEED: usize = 6;
    Self::with_speed_preset(DEFAULT_SPEED)
  }
}

impl IntraSearchConfig {
  /// Default tools with the speed settings of preset `speed`, see
  /// [`SpeedSettings::from_preset()`].
  pub fn with_speed_preset(speed: usize) -> Self {
    IntraSearchConfig {
      bit_depth: 8,
      chroma_sampling: ChromaSampling::Cs420,
      ctu_size: 128,
      max_tb_size: 64,

      mip: true,
      mrl: true,
      lfnst: true,
      mts: true,
      transform_skip: false,
      joint_cbcr: true,
      cclm: true,
      mts_intra_max_cand: 3,

      speed_settings: SpeedSettings::from_preset(speed),
      tuning: SearchTuning::default(),
    }
  }

  /// Log2 of the coding tree unit side.
  #[inline]
  pub fn ctu_log2(&self) -> usize {
    self.ctu_size.trailing_zeros() as usize
  }
}

impl fmt::Display for IntraSearchConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    let pairs = [
      ("bit_depth", self.bit_depth.to_string()),
      ("chroma_sampling", format!("{:?}", self.chroma_sampling)),
      ("ctu_size", self.ctu_size.to_string()),
      ("max_tb_size", self.max_tb_size.to_string()),
      ("mip", self.mip.to_string()),
      ("mrl", self.mrl.to_string()),
      ("lfnst", self.lfnst.to_string()),
      ("mts", self.mts.to_string()),
      ("transform_skip", self.transform_skip.to_string()),
      ("joint_cbcr", self.joint_cbcr.to_string()),
      ("cclm", self.cclm.to_string()),
      ("mts_intra_max_cand", self.mts_intra_max_cand.to_string()),
    ];
    write!(
      f,
      "{} {}",
      pairs.iter().map(|pair| format!("{}={}", pair.0, pair.1)).join(" "),
      self.speed_settings
    )
  }
}
