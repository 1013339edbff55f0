// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use arrayvec::ArrayVec;

use crate::frame::Rect;

/// Coding units remembered per small-chroma-block region.
pub const NUM_INTER_CU_INFO_SAVE: usize = 8;

/// Inter costs of the coding units inside the current intra-constrained
/// region, looked up by exact luma area.
#[derive(Debug, Clone, Default)]
pub struct CuAreaCosts {
  entries: ArrayVec<(Rect, f64), NUM_INTER_CU_INFO_SAVE>,
}

impl CuAreaCosts {
  pub fn new() -> Self {
    Self::default()
  }

  /// Remembers `cost` for `area`. Once full, further areas are ignored.
  pub fn save(&mut self, area: Rect, cost: f64) {
    if let Some(e) = self.entries.iter_mut().find(|e| e.0 == area) {
      e.1 = cost;
    } else {
      let _ = self.entries.try_push((area, cost));
    }
  }

  pub fn find(&self, area: Rect) -> Option<f64> {
    self.entries.iter().find(|e| e.0 == area).map(|e| e.1)
  }

  pub fn reset(&mut self) {
    self.entries.clear();
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn lookup_is_by_exact_area() {
    let mut costs = CuAreaCosts::new();
    costs.save(Rect::new(0, 0, 8, 8), 10.0);
    costs.save(Rect::new(8, 0, 8, 8), 20.0);
    assert_eq!(costs.find(Rect::new(8, 0, 8, 8)), Some(20.0));
    assert_eq!(costs.find(Rect::new(0, 0, 8, 4)), None);
    costs.save(Rect::new(0, 0, 8, 8), 5.0);
    assert_eq!(costs.find(Rect::new(0, 0, 8, 8)), Some(5.0));
    costs.reset();
    assert_eq!(costs.find(Rect::new(8, 0, 8, 8)), None);
  }

  #[test]
  fn full_cache_drops_new_areas() {
    let mut costs = CuAreaCosts::new();
    for i in 0..NUM_INTER_CU_INFO_SAVE + 2 {
      costs.save(Rect::new(4 * i, 0, 4, 4), i as f64);
    }
    assert_eq!(costs.find(Rect::new(0, 0, 4, 4)), Some(0.0));
    let last = NUM_INTER_CU_INFO_SAVE;
    assert_eq!(costs.find(Rect::new(4 * last, 0, 4, 4)), None);
  }
}
