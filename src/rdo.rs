// Copyright (c) 2001-2016, Alliance for Open Media. All rights reserved
// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use arrayvec::ArrayVec;

use crate::ec::FRAC_BITS_SCALE;
use crate::partition::{BlockSize, MIN_CU_LOG2};

pub type Distortion = u64;

/// Distortion of a hypothesis that must never win. Leaves headroom so
/// that sums of a few of them do not wrap.
pub const MAX_DISTORTION: Distortion = u64::MAX >> 4;

/// Inter cost of an area nothing was recorded for.
pub const COST_UNKNOWN: f64 = -65536.0;

/// Capacity of every ranked candidate list.
pub const FAST_UDI_MAX_RDMODE_NUM: usize = 40;

/// Candidates per list when every luma mode goes to full RD.
pub const FULL_SEARCH_RD_MODES: usize = 12;

/// Full-RD candidate count by log2 width and log2 height, 4 through 128.
const INTRA_MODE_NUM_FAST: [[u8; 6]; 6] = [
  [3, 3, 3, 3, 2, 2],
  [3, 3, 3, 3, 3, 2],
  [3, 3, 3, 3, 3, 2],
  [3, 3, 3, 3, 3, 2],
  [2, 3, 3, 3, 3, 2],
  [2, 2, 2, 2, 2, 3],
];

/// Number of candidates kept for full RD on a block of size `bs`.
pub fn num_modes_for_full_rd(bs: BlockSize, full_search: bool) -> usize {
  if full_search {
    return FULL_SEARCH_RD_MODES;
  }
  let w = (bs.w_log2 - MIN_CU_LOG2) as usize;
  let h = (bs.h_log2 - MIN_CU_LOG2) as usize;
  INTRA_MODE_NUM_FAST[w.min(5)][h.min(5)] as usize
}

/// Rate-distortion cost function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RdCost {
  lambda: f64,
  /// Square root of lambda, used against Hadamard costs.
  motion_lambda: f64,
  /// Weight of chroma distortion relative to luma.
  chroma_weight: f64,
}

impl RdCost {
  pub fn new(lambda: f64, chroma_weight: f64) -> Self {
    RdCost { lambda, motion_lambda: lambda.sqrt(), chroma_weight }
  }

  #[inline(always)]
  pub fn lambda(&self) -> f64 {
    self.lambda
  }

  #[inline(always)]
  pub fn motion_lambda(&self) -> f64 {
    self.motion_lambda
  }

  #[inline(always)]
  pub fn chroma_weight(&self) -> f64 {
    self.chroma_weight
  }

  /// `dist + lambda * bits`, with `frac_bits` in fractional bit units.
  #[inline(always)]
  pub fn calc_rd_cost(&self, frac_bits: u64, dist: Distortion) -> f64 {
    dist as f64 + self.lambda * frac_bits as f64 * FRAC_BITS_SCALE
  }

  /// Prescreen cost: Hadamard distortion plus bits at the square root of
  /// lambda.
  #[inline(always)]
  pub fn calc_had_cost(&self, frac_bits: u64, had: Distortion) -> f64 {
    had as f64 + self.motion_lambda * frac_bits as f64 * FRAC_BITS_SCALE
  }

  /// Chroma distortion brought onto the luma scale.
  #[inline(always)]
  pub fn scale_chroma_dist(&self, dist: Distortion) -> Distortion {
    if dist >= MAX_DISTORTION {
      return MAX_DISTORTION;
    }
    (dist as f64 * self.chroma_weight).round() as Distortion
  }
}

/// Bounded list of entries kept sorted ascending by cost.
#[derive(Debug, Clone)]
pub struct CandidateList<T> {
  items: ArrayVec<T, FAST_UDI_MAX_RDMODE_NUM>,
  costs: ArrayVec<f64, FAST_UDI_MAX_RDMODE_NUM>,
}

impl<T> Default for CandidateList<T> {
  fn default() -> Self {
    CandidateList { items: ArrayVec::new(), costs: ArrayVec::new() }
  }
}

impl<T: Copy + PartialEq> CandidateList<T> {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.items.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn costs(&self) -> &[f64] {
    &self.costs
  }

  pub fn get(&self, idx: usize) -> Option<(T, f64)> {
    Some((*self.items.get(idx)?, self.costs[idx]))
  }

  pub fn contains(&self, item: &T) -> bool {
    self.items.contains(item)
  }

  /// Inserts `item` keeping the list sorted and at most `max` long, the
  /// worst entry falling off a full list. Ties go behind existing entries.
  ///
  /// Returns the insert position, `None` if `item` was not kept.
  pub fn update(&mut self, item: T, cost: f64, max: usize) -> Option<usize> {
    let max = max.min(FAST_UDI_MAX_RDMODE_NUM);
    let len = self.len().min(max);
    let shift = self.costs[..len]
      .iter()
      .rev()
      .take_while(|&&c| cost < c)
      .count();
    if len >= max {
      if shift == 0 {
        return None;
      }
      self.items.truncate(len - 1);
      self.costs.truncate(len - 1);
    }
    let pos = len - shift;
    self.items.insert(pos, item);
    self.costs.insert(pos, cost);
    Some(pos)
  }

  /// Appends without ordering, as forced entries are.
  pub fn push(&mut self, item: T, cost: f64) -> bool {
    if self.items.is_full() {
      return false;
    }
    self.items.push(item);
    self.costs.push(cost);
    true
  }

  pub fn truncate(&mut self, len: usize) {
    self.items.truncate(len);
    self.costs.truncate(len);
  }

  pub fn clear(&mut self) {
    self.truncate(0);
  }

  pub fn swap(&mut self, a: usize, b: usize) {
    self.items.swap(a, b);
    self.costs.swap(a, b);
  }

  /// Whether the leading `n` costs are in ascending order.
  pub fn is_sorted_prefix(&self, n: usize) -> bool {
    self.costs[..n.min(self.len())].windows(2).all(|w| w[0] <= w[1])
  }
}
