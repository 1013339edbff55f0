// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Preallocated scratch coding structures.
//!
//! Every structure is sized once; trials only overwrite samples and
//! metadata.

use std::collections::HashMap;

use crate::context::ContextState;
use crate::frame::ChromaSampling;
use crate::partition::{SizeKey, TransformUnit, MIN_CU_LOG2};
use crate::predict::{ModeInfo, DC_IDX};
use crate::rdo::Distortion;
use crate::transform::MtsIdx;
use crate::util::Pixel;

/// Number of CTU-sized save layers.
pub const NUM_SAVE_LAYERS: usize = 3;

/// Samples and coded state of one hypothesis.
#[derive(Debug, Clone)]
pub struct Snapshot<T: Pixel> {
  pub size: SizeKey,
  pub pred: [Vec<T>; 3],
  pub reco: [Vec<T>; 3],
  pub tu: TransformUnit,
  pub mode: ModeInfo,
  pub chroma_mode: u8,
  pub lfnst_idx: u8,
  pub mts: MtsIdx,
  pub dist: Distortion,
  pub frac_bits: u64,
  pub cost: f64,
  /// Entropy state at the end of the hypothesis.
  pub ctx: ContextState,
}

fn plane_len(
  size: SizeKey, chroma_sampling: ChromaSampling, comp: usize,
) -> usize {
  if comp == 0 {
    return size.area();
  }
  match chroma_sampling.get_decimation() {
    Some((xdec, ydec)) => (size.width() >> xdec) * (size.height() >> ydec),
    None => 0,
  }
}

impl<T: Pixel> Snapshot<T> {
  pub fn new(size: SizeKey, chroma_sampling: ChromaSampling) -> Self {
    let buf = |c| vec![T::default(); plane_len(size, chroma_sampling, c)];
    Snapshot {
      size,
      pred: [buf(0), buf(1), buf(2)],
      reco: [buf(0), buf(1), buf(2)],
      tu: TransformUnit::default(),
      mode: ModeInfo::regular(DC_IDX),
      chroma_mode: DC_IDX,
      lfnst_idx: 0,
      mts: MtsIdx::Dct2Dct2,
      dist: 0,
      frac_bits: 0,
      cost: f64::MAX,
      ctx: ContextState::default(),
    }
  }

  /// Logical reset before a new search on this structure.
  pub fn init_struct_data(&mut self) {
    self.release_intermediate_data();
    self.mode = ModeInfo::regular(DC_IDX);
    self.chroma_mode = DC_IDX;
    self.lfnst_idx = 0;
    self.mts = MtsIdx::Dct2Dct2;
    self.cost = f64::MAX;
  }

  /// Drops per-trial bookkeeping; sample storage stays allocated.
  pub fn release_intermediate_data(&mut self) {
    self.tu.clear();
    self.dist = 0;
    self.frac_bits = 0;
  }

  /// Copies `comp`'s samples and coded data from `other`.
  pub fn copy_component_from(&mut self, other: &Snapshot<T>, comp: usize) {
    let n = self.reco[comp].len().min(other.reco[comp].len());
    self.pred[comp][..n].copy_from_slice(&other.pred[comp][..n]);
    self.reco[comp][..n].copy_from_slice(&other.reco[comp][..n]);
    self.tu.copy_component_from(&other.tu, comp);
  }
}

/// Scratch structures for every block size the search can meet.
#[derive(Debug, Clone)]
pub struct SnapshotPool<T: Pixel> {
  best: HashMap<SizeKey, Snapshot<T>>,
  temp: HashMap<SizeKey, Snapshot<T>>,
  save: [Snapshot<T>; NUM_SAVE_LAYERS],
}

impl<T: Pixel> SnapshotPool<T> {
  /// Allocates a best and a temp structure for every size from the
  /// minimum coding-unit size up to `max_log2`.
  pub fn new(max_log2: u8, chroma_sampling: ChromaSampling) -> Self {
    let sizes = || SizeKey::all_cu_sizes(max_log2);
    let alloc =
      |size: SizeKey| (size, Snapshot::new(size, chroma_sampling));
    let ctu = SizeKey::new(max_log2, max_log2);
    SnapshotPool {
      best: sizes().map(alloc).collect(),
      temp: sizes().map(alloc).collect(),
      save: [
        Snapshot::new(ctu, chroma_sampling),
        Snapshot::new(ctu, chroma_sampling),
        Snapshot::new(ctu, chroma_sampling),
      ],
    }
  }

  pub fn contains(&self, key: SizeKey) -> bool {
    key.w_log2 >= MIN_CU_LOG2 && self.best.contains_key(&key)
  }

  /// The best and temp structures of `key`, `None` for sizes the pool was
  /// not built for.
  pub fn best_and_temp(
    &mut self, key: SizeKey,
  ) -> Option<(&mut Snapshot<T>, &mut Snapshot<T>)> {
    let best = self.best.get_mut(&key)?;
    let temp = self.temp.get_mut(&key)?;
    Some((best, temp))
  }

  /// Like [`best_and_temp`], with the save layers borrowed alongside.
  ///
  /// [`best_and_temp`]: SnapshotPool::best_and_temp
  pub fn best_temp_and_save(
    &mut self, key: SizeKey,
  ) -> Option<(
    &mut Snapshot<T>,
    &mut Snapshot<T>,
    &mut [Snapshot<T>; NUM_SAVE_LAYERS],
  )> {
    let best = self.best.get_mut(&key)?;
    let temp = self.temp.get_mut(&key)?;
    Some((best, temp, &mut self.save))
  }

  /// Makes the temp structure of `key` the best one.
  pub fn promote_temp(&mut self, key: SizeKey) {
    if let Some((best, temp)) = self.best_and_temp(key) {
      std::mem::swap(best, temp);
    }
  }
}
