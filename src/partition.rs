// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use num_derive::FromPrimitive;

use crate::frame::{ChromaSampling, Rect};
use crate::predict::{ModeInfo, DC_IDX, PLANAR_IDX};
use crate::serialize::{Deserialize, Serialize};
use crate::transform::MtsIdx;

pub const MIN_CU_LOG2: u8 = 2;
pub const MAX_CU_LOG2: u8 = 7;
pub const MAX_CU_SIZE: usize = 1 << MAX_CU_LOG2;

/// Dimensions of a coding block as log2 width and height.
///
/// Doubles as the key of the snapshot pool.
#[derive(
  Copy,
  Clone,
  Debug,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
pub struct BlockSize {
  pub w_log2: u8,
  pub h_log2: u8,
}

/// Key of the per-size scratch structures.
pub type SizeKey = BlockSize;

impl BlockSize {
  pub const BLOCK_4X4: BlockSize = BlockSize::new(2, 2);
  pub const BLOCK_8X8: BlockSize = BlockSize::new(3, 3);
  pub const BLOCK_16X16: BlockSize = BlockSize::new(4, 4);
  pub const BLOCK_32X32: BlockSize = BlockSize::new(5, 5);
  pub const BLOCK_64X64: BlockSize = BlockSize::new(6, 6);

  #[inline(always)]
  pub const fn new(w_log2: u8, h_log2: u8) -> Self {
    BlockSize { w_log2, h_log2 }
  }

  /// Block size for `width`x`height`, `None` unless both are powers of two
  /// within the coding-unit range.
  pub fn from_width_and_height(width: usize, height: usize) -> Option<Self> {
    if !width.is_power_of_two() || !height.is_power_of_two() {
      return None;
    }
    let bs = BlockSize::new(
      width.trailing_zeros() as u8,
      height.trailing_zeros() as u8,
    );
    bs.is_valid_cu().then_some(bs)
  }

  #[inline(always)]
  pub const fn width(self) -> usize {
    1 << self.w_log2
  }

  #[inline(always)]
  pub const fn height(self) -> usize {
    1 << self.h_log2
  }

  #[inline(always)]
  pub const fn area(self) -> usize {
    self.width() * self.height()
  }

  pub const fn is_valid_cu(self) -> bool {
    self.w_log2 >= MIN_CU_LOG2
      && self.h_log2 >= MIN_CU_LOG2
      && self.w_log2 <= MAX_CU_LOG2
      && self.h_log2 <= MAX_CU_LOG2
  }

  /// Every size the snapshot pool holds an entry for.
  pub fn all_cu_sizes(max_log2: u8) -> impl Iterator<Item = BlockSize> {
    (MIN_CU_LOG2..=max_log2).flat_map(move |w| {
      (MIN_CU_LOG2..=max_log2).map(move |h| BlockSize::new(w, h))
    })
  }
}

#[derive(
  Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive,
)]
pub enum ComponentId {
  Y = 0,
  Cb = 1,
  Cr = 2,
}

impl ComponentId {
  pub const CHROMA: [ComponentId; 2] = [ComponentId::Cb, ComponentId::Cr];

  #[inline(always)]
  pub const fn channel_type(self) -> ChannelType {
    match self {
      ComponentId::Y => ChannelType::Luma,
      _ => ChannelType::Chroma,
    }
  }

  #[inline(always)]
  pub const fn is_chroma(self) -> bool {
    !matches!(self, ComponentId::Y)
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelType {
  Luma,
  Chroma,
}

/// Intra sub-partition split.
#[derive(
  Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum IspMode {
  #[default]
  NotIsp,
  Hor,
  Ver,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PredictionUnit {
  /// Luma and chroma intra directions.
  pub intra_dir: [u8; 2],
  pub mip_transposed: bool,
  pub multi_ref_idx: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TransformUnit {
  pub cbf: [bool; 3],
  pub mts_idx: [MtsIdx; 3],
  /// Joint Cb-Cr coded-block mask, 0 when the channels are coded apart.
  pub joint_cb_cr: u8,
  /// Quantised levels per component, raster order.
  pub coeffs: [Vec<i32>; 3],
  /// Chroma residual scale in CSCALE_FP_PREC units, 0 when unused.
  pub chroma_adj: i32,
}

impl TransformUnit {
  pub fn clear(&mut self) {
    self.cbf = [false; 3];
    self.mts_idx = [MtsIdx::Dct2Dct2; 3];
    self.joint_cb_cr = 0;
    self.coeffs.iter_mut().for_each(Vec::clear);
    self.chroma_adj = 0;
  }

  /// Copies one component's coded data from `other`.
  pub fn copy_component_from(&mut self, other: &TransformUnit, comp: usize) {
    self.cbf[comp] = other.cbf[comp];
    self.mts_idx[comp] = other.mts_idx[comp];
    self.coeffs[comp].clear();
    self.coeffs[comp].extend_from_slice(&other.coeffs[comp]);
    if comp > 0 {
      self.joint_cb_cr = other.joint_cb_cr;
      self.chroma_adj = other.chroma_adj;
    }
  }
}

/// A coding unit under intra search.
#[derive(Clone, Debug)]
pub struct CodingUnit {
  /// Luma-sample area inside the picture.
  pub area: Rect,
  pub size: BlockSize,
  pub chroma_sampling: ChromaSampling,
  pub qp: i32,
  /// Luma and chroma are partitioned separately.
  pub sep_tree: bool,
  /// Constrained to intra by a small-chroma-block region.
  pub cons_intra: bool,
  pub mip_flag: bool,
  pub isp_mode: IspMode,
  pub lfnst_idx: u8,
  pub pu: PredictionUnit,
  pub tu: TransformUnit,
  /// The luma search has committed its decision.
  pub luma_decided: bool,
}

impl CodingUnit {
  /// New coding unit covering `area`; `None` if the area is not a legal
  /// coding-unit shape.
  pub fn new(
    area: Rect, chroma_sampling: ChromaSampling, qp: i32,
  ) -> Option<Self> {
    let size = BlockSize::from_width_and_height(area.width, area.height)?;
    Some(CodingUnit {
      area,
      size,
      chroma_sampling,
      qp,
      sep_tree: false,
      cons_intra: false,
      mip_flag: false,
      isp_mode: IspMode::NotIsp,
      lfnst_idx: 0,
      pu: PredictionUnit {
        intra_dir: [PLANAR_IDX, DC_IDX],
        ..Default::default()
      },
      tu: TransformUnit::default(),
      luma_decided: false,
    })
  }

  /// Area of `comp` in its own plane.
  pub fn comp_rect(&self, comp: ComponentId) -> Rect {
    match comp {
      ComponentId::Y => self.area,
      _ => {
        let (xdec, ydec) =
          self.chroma_sampling.get_decimation().unwrap_or((0, 0));
        self.area.decimated(xdec, ydec)
      }
    }
  }

  /// Current luma hypothesis.
  pub fn mode_info(&self) -> ModeInfo {
    ModeInfo {
      mip_flag: self.mip_flag,
      mip_transposed: self.pu.mip_transposed,
      ref_line_idx: self.pu.multi_ref_idx,
      isp_mode: self.isp_mode,
      mode_id: self.pu.intra_dir[0],
    }
  }

  pub fn apply_mode_info(&mut self, mode: &ModeInfo) {
    self.mip_flag = mode.mip_flag;
    self.pu.mip_transposed = mode.mip_transposed;
    self.pu.multi_ref_idx = mode.ref_line_idx;
    self.isp_mode = mode.isp_mode;
    self.pu.intra_dir[0] = mode.mode_id;
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block_size_from_dimensions() {
    assert_eq!(
      BlockSize::from_width_and_height(16, 8),
      Some(BlockSize::new(4, 3))
    );
    assert_eq!(BlockSize::from_width_and_height(2, 8), None);
    assert_eq!(BlockSize::from_width_and_height(12, 8), None);
    assert_eq!(BlockSize::from_width_and_height(256, 8), None);
  }

  #[test]
  fn pool_sizes_cover_square_and_rectangular() {
    let sizes: Vec<_> = BlockSize::all_cu_sizes(4).collect();
    assert_eq!(sizes.len(), 9);
    assert!(sizes.contains(&BlockSize::new(2, 4)));
    assert!(sizes.iter().all(|bs| bs.is_valid_cu()));
  }

  #[test]
  fn chroma_rect_is_decimated() {
    let cu =
      CodingUnit::new(Rect::new(16, 8, 16, 8), ChromaSampling::Cs420, 32)
        .unwrap();
    assert_eq!(cu.comp_rect(ComponentId::Cb), Rect::new(8, 4, 8, 4));
    assert_eq!(cu.comp_rect(ComponentId::Y), Rect::new(16, 8, 16, 8));
  }
}
