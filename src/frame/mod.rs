// Copyright (c) 2018-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

mod plane;

pub use plane::*;

use crate::encoder::reshape::ReshapeTable;
use crate::partition::ComponentId;
use crate::serialize::{Deserialize, Serialize};
use crate::util::*;

/// Chroma subsampling format
#[derive(
  Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum ChromaSampling {
  /// Both vertically and horizontally subsampled.
  #[default]
  Cs420,
  /// Horizontally subsampled.
  Cs422,
  /// Not subsampled.
  Cs444,
  /// Monochrome.
  Cs400,
}

impl ChromaSampling {
  /// Provides the amount to right shift the luma plane dimensions to get the
  /// chroma plane dimensions. Returns `None` for monochrome.
  pub const fn get_decimation(self) -> Option<(usize, usize)> {
    use self::ChromaSampling::*;
    match self {
      Cs420 => Some((1, 1)),
      Cs422 => Some((1, 0)),
      Cs444 => Some((0, 0)),
      Cs400 => None,
    }
  }

  pub const fn has_chroma(self) -> bool {
    !matches!(self, ChromaSampling::Cs400)
  }
}

/// Luma intra directions of decoded blocks, stored per 4x4 unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeMap {
  cols: usize,
  rows: usize,
  modes: Vec<u8>,
}

impl ModeMap {
  pub const NOT_INTRA: u8 = u8::MAX;
  const UNIT_LOG2: usize = 2;

  pub fn new(width: usize, height: usize) -> Self {
    let cols = (width + 3) >> Self::UNIT_LOG2;
    let rows = (height + 3) >> Self::UNIT_LOG2;
    ModeMap { cols, rows, modes: vec![Self::NOT_INTRA; cols * rows] }
  }

  /// Intra direction covering luma sample (x, y), `None` when outside the
  /// picture or not intra coded.
  pub fn get(&self, x: isize, y: isize) -> Option<u8> {
    if x < 0 || y < 0 {
      return None;
    }
    let (c, r) =
      ((x as usize) >> Self::UNIT_LOG2, (y as usize) >> Self::UNIT_LOG2);
    if c >= self.cols || r >= self.rows {
      return None;
    }
    match self.modes[r * self.cols + c] {
      Self::NOT_INTRA => None,
      m => Some(m),
    }
  }

  pub fn set(&mut self, area: Rect, mode: u8) {
    let c0 = area.x >> Self::UNIT_LOG2;
    let r0 = area.y >> Self::UNIT_LOG2;
    let c1 = ((area.x + area.width + 3) >> Self::UNIT_LOG2).min(self.cols);
    let r1 = ((area.y + area.height + 3) >> Self::UNIT_LOG2).min(self.rows);
    for r in r0..r1 {
      self.modes[r * self.cols + c0..r * self.cols + c1].fill(mode);
    }
  }

  pub fn clear(&mut self) {
    self.modes.fill(Self::NOT_INTRA);
  }
}

/// Picture-level sample state seen by the intra search.
#[derive(Debug, Clone)]
pub struct FrameState<T: Pixel> {
  pub width: usize,
  pub height: usize,
  pub bit_depth: usize,
  pub chroma_sampling: ChromaSampling,
  /// Original samples.
  pub input: [Plane<T>; 3],
  /// Reconstructed samples, luma in the reshaped domain when a reshaper is
  /// attached.
  pub rec: [Plane<T>; 3],
  /// Forward-reshaped original luma.
  pub rsp_input: Option<Plane<T>>,
  pub modes: ModeMap,
}

impl<T: Pixel> FrameState<T> {
  pub fn new(
    width: usize, height: usize, chroma_sampling: ChromaSampling,
    bit_depth: usize,
  ) -> Self {
    let (xdec, ydec) = chroma_sampling.get_decimation().unwrap_or((0, 0));
    let (cw, ch) = if chroma_sampling.has_chroma() {
      ((width + xdec) >> xdec, (height + ydec) >> ydec)
    } else {
      (0, 0)
    };
    let mk = |w, h, xd, yd| Plane::new(w, h, xd, yd);
    FrameState {
      width,
      height,
      bit_depth,
      chroma_sampling,
      input: [
        mk(width, height, 0, 0),
        mk(cw, ch, xdec, ydec),
        mk(cw, ch, xdec, ydec),
      ],
      rec: [
        mk(width, height, 0, 0),
        mk(cw, ch, xdec, ydec),
        mk(cw, ch, xdec, ydec),
      ],
      rsp_input: None,
      modes: ModeMap::new(width, height),
    }
  }

  #[inline(always)]
  pub fn input_plane(&self, comp: ComponentId) -> &Plane<T> {
    &self.input[comp as usize]
  }

  #[inline(always)]
  pub fn rec_plane(&self, comp: ComponentId) -> &Plane<T> {
    &self.rec[comp as usize]
  }

  #[inline(always)]
  pub fn rec_plane_mut(&mut self, comp: ComponentId) -> &mut Plane<T> {
    &mut self.rec[comp as usize]
  }

  /// Maps the original luma into the reshaped domain.
  pub fn apply_reshaper(&mut self, table: &ReshapeTable) {
    let mut rsp = self.input[0].clone();
    for p in rsp.data.iter_mut() {
      *p = T::cast_from(table.fwd(i32::cast_from(*p)));
    }
    self.rsp_input = Some(rsp);
  }

  /// Luma original in the domain residuals are computed in.
  pub fn luma_residual_source(&self) -> &Plane<T> {
    self.rsp_input.as_ref().unwrap_or(&self.input[0])
  }
}
