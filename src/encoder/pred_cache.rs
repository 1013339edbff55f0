// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::util::Pixel;

/// Rendered predictions kept in the same order as a ranked candidate list.
///
/// Position `i` holds the prediction of list entry `i`, for as many leading
/// entries as were rendered during the prescreen. Every edit of the list
/// must be mirrored here.
#[derive(Debug, Clone, Default)]
pub struct PredBufCache<T: Pixel> {
  bufs: Vec<Vec<T>>,
  /// Storage slot of each list position.
  sorted: Vec<usize>,
  free: Vec<usize>,
  test: usize,
  samples: usize,
}

impl<T: Pixel> PredBufCache<T> {
  pub fn new() -> Self {
    PredBufCache {
      bufs: Vec::new(),
      sorted: Vec::new(),
      free: Vec::new(),
      test: 0,
      samples: 0,
    }
  }

  /// Empties the cache for a `w`x`h` block and a list of up to `capacity`
  /// entries. Storage is only grown, never released.
  pub fn prepare(&mut self, w: usize, h: usize, capacity: usize) {
    self.samples = w * h;
    if self.bufs.len() < capacity + 1 {
      self.bufs.resize_with(capacity + 1, Vec::new);
    }
    for b in self.bufs.iter_mut() {
      if b.len() < self.samples {
        b.resize(self.samples, T::default());
      }
    }
    self.sorted.clear();
    self.free.clear();
    self.free.extend((1..=capacity).rev());
    self.test = 0;
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.sorted.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.sorted.is_empty()
  }

  /// Buffer the next hypothesis is rendered into.
  pub fn test_buf_mut(&mut self) -> &mut [T] {
    &mut self.bufs[self.test][..self.samples]
  }

  pub fn test_buf(&self) -> &[T] {
    &self.bufs[self.test][..self.samples]
  }

  /// Files the test buffer at `pos` after the list accepted its entry
  /// there and now holds `list_len` entries. A full list's evicted buffer
  /// becomes the next test buffer; a refused entry keeps the current one.
  ///
  /// An entry placed past the rendered prefix is left unrendered, so every
  /// cached position keeps matching its list entry.
  pub fn insert(&mut self, pos: Option<usize>, list_len: usize) {
    let Some(pos) = pos else {
      return;
    };
    if pos > self.sorted.len() {
      return;
    }
    self.sorted.insert(pos, self.test);
    if self.sorted.len() > list_len {
      if let Some(evicted) = self.sorted.pop() {
        self.test = evicted;
      }
    } else {
      self.test = match self.free.pop() {
        Some(slot) => slot,
        None => {
          // the list outgrew the prepared capacity
          self.bufs.push(vec![T::default(); self.samples]);
          self.bufs.len() - 1
        }
      };
    }
  }

  pub fn swap(&mut self, a: usize, b: usize) {
    if a < self.sorted.len() && b < self.sorted.len() {
      self.sorted.swap(a, b);
    }
  }

  /// Keeps the listed positions, in the given order, dropping the rest.
  pub fn retain_positions(&mut self, keep: &[usize]) {
    let kept: Vec<usize> =
      keep.iter().filter_map(|&i| self.sorted.get(i).copied()).collect();
    for slot in self.sorted.drain(..) {
      if !kept.contains(&slot) {
        self.free.push(slot);
      }
    }
    self.sorted = kept;
  }

  pub fn reduce_to(&mut self, n: usize) {
    while self.sorted.len() > n {
      if let Some(slot) = self.sorted.pop() {
        self.free.push(slot);
      }
    }
  }

  /// Prediction of list entry `idx`, `None` if it was never rendered.
  pub fn get(&self, idx: usize) -> Option<&[T]> {
    self.sorted.get(idx).map(|&s| &self.bufs[s][..self.samples])
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::rdo::CandidateList;

  fn render(cache: &mut PredBufCache<u8>, v: u8) {
    cache.test_buf_mut().fill(v);
  }

  #[test]
  fn buffers_follow_list_order() {
    let mut list = CandidateList::new();
    let mut cache = PredBufCache::new();
    cache.prepare(4, 4, 3);
    let trials = [(10u8, 5.0), (20, 3.0), (30, 4.0), (40, 9.0), (50, 1.0)];
    for (mode, cost) in trials {
      render(&mut cache, mode);
      let pos = list.update(mode, cost, 3);
      cache.insert(pos, list.len());
    }
    assert_eq!(list.items(), &[50, 20, 30]);
    for (i, &m) in list.items().iter().enumerate() {
      assert!(cache.get(i).unwrap().iter().all(|&v| v == m));
    }
    assert_eq!(cache.get(3), None);
  }

  #[test]
  fn retain_and_swap_mirror_the_list() {
    let mut cache = PredBufCache::new();
    cache.prepare(2, 2, 4);
    for (i, v) in [1u8, 2, 3, 4].iter().enumerate() {
      render(&mut cache, *v);
      cache.insert(Some(i), i + 1);
    }
    cache.retain_positions(&[0, 2, 3]);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get(1).unwrap()[0], 3);
    cache.swap(0, 2);
    assert_eq!(cache.get(0).unwrap()[0], 4);
    cache.reduce_to(1);
    assert_eq!(cache.len(), 1);
    // freed storage is handed out again
    render(&mut cache, 9);
    cache.insert(Some(1), 2);
    assert_eq!(cache.get(1).unwrap()[0], 9);
    assert_ne!(cache.test_buf().as_ptr(), cache.get(0).unwrap().as_ptr());
  }

  #[test]
  fn list_beyond_capacity_stays_aligned() {
    let mut list = CandidateList::new();
    let mut cache = PredBufCache::new();
    cache.prepare(2, 2, 2);
    for (mode, cost) in [(10u8, 4.0), (20, 2.0), (30, 3.0), (40, 1.0)] {
      render(&mut cache, mode);
      let pos = list.update(mode, cost, 6);
      cache.insert(pos, list.len());
    }
    assert_eq!(list.items(), &[40, 20, 30, 10]);
    assert_eq!(cache.len(), 4);
    for (i, &m) in list.items().iter().enumerate() {
      assert_eq!(cache.get(i).unwrap()[0], m);
    }
    let test = cache.test_buf().as_ptr();
    assert!((0..4).all(|i| cache.get(i).unwrap().as_ptr() != test));
  }

  #[test]
  fn entry_past_the_rendered_prefix_is_not_filed() {
    let mut cache = PredBufCache::new();
    cache.prepare(2, 2, 4);
    render(&mut cache, 1);
    cache.insert(Some(0), 1);
    // the list holds an unrendered entry at 1
    render(&mut cache, 3);
    cache.insert(Some(2), 3);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(0).unwrap()[0], 1);
    assert_eq!(cache.get(2), None);
  }
}
