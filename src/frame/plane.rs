// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::ops::{Index, IndexMut};

use crate::util::*;

/// Rectangle of a plane, in samples of that plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
  pub x: usize,
  pub y: usize,
  pub width: usize,
  pub height: usize,
}

impl Rect {
  #[inline(always)]
  pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
    Rect { x, y, width, height }
  }

  #[inline(always)]
  pub fn decimated(&self, xdec: usize, ydec: usize) -> Self {
    Self {
      x: self.x >> xdec,
      y: self.y >> ydec,
      width: self.width >> xdec,
      height: self.height >> ydec,
    }
  }

  #[inline(always)]
  pub const fn area(&self) -> usize {
    self.width * self.height
  }
}

/// Plane geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneConfig {
  /// Data stride.
  pub stride: usize,
  /// Width in samples.
  pub width: usize,
  /// Height in samples.
  pub height: usize,
  /// Decimator along the X axis, 1 for 4:2:0 chroma.
  pub xdec: usize,
  /// Decimator along the Y axis, 1 for 4:2:0 chroma.
  pub ydec: usize,
}

/// Backing buffer for one colour plane.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane<T: Pixel> {
  pub data: Vec<T>,
  pub cfg: PlaneConfig,
}

impl<T: Pixel> std::fmt::Debug for Plane<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "Plane {{ width: {}, height: {}, xdec: {}, ydec: {} }}",
      self.cfg.width, self.cfg.height, self.cfg.xdec, self.cfg.ydec
    )
  }
}

impl<T: Pixel> Plane<T> {
  pub fn new(width: usize, height: usize, xdec: usize, ydec: usize) -> Self {
    Plane {
      data: vec![T::cast_from(0); width * height],
      cfg: PlaneConfig { stride: width, width, height, xdec, ydec },
    }
  }

  /// Builds a plane from row-major samples.
  ///
  /// # Panics
  ///
  /// - If `data` does not hold `width * height` samples.
  pub fn from_slice(data: &[T], width: usize, height: usize) -> Self {
    assert_eq!(data.len(), width * height);
    Plane {
      data: data.to_vec(),
      cfg: PlaneConfig { stride: width, width, height, xdec: 0, ydec: 0 },
    }
  }

  #[inline(always)]
  pub fn p(&self, x: usize, y: usize) -> T {
    self.data[y * self.cfg.stride + x]
  }

  pub fn fill(&mut self, v: T) {
    self.data.iter_mut().for_each(|p| *p = v);
  }

  #[inline(always)]
  pub fn row(&self, y: usize) -> &[T] {
    let start = y * self.cfg.stride;
    &self.data[start..start + self.cfg.width]
  }

  #[inline(always)]
  pub fn row_mut(&mut self, y: usize) -> &mut [T] {
    let start = y * self.cfg.stride;
    let width = self.cfg.width;
    &mut self.data[start..start + width]
  }

  pub fn rows_iter(&self) -> impl Iterator<Item = &[T]> {
    self
      .data
      .chunks(self.cfg.stride)
      .take(self.cfg.height)
      .map(move |row| &row[..self.cfg.width])
  }

  /// Bounded read-only view of `rect`.
  ///
  /// # Panics
  ///
  /// - If `rect` is not inside the plane.
  #[inline(always)]
  pub fn region(&self, rect: Rect) -> PlaneRegion<'_, T> {
    assert!(rect.x + rect.width <= self.cfg.width);
    assert!(rect.y + rect.height <= self.cfg.height);
    let start = rect.y * self.cfg.stride + rect.x;
    let end = if rect.height == 0 {
      start
    } else {
      start + (rect.height - 1) * self.cfg.stride + rect.width
    };
    PlaneRegion {
      data: &self.data[start..end],
      stride: self.cfg.stride,
      width: rect.width,
      height: rect.height,
    }
  }

  /// Bounded mutable view of `rect`.
  ///
  /// # Panics
  ///
  /// - If `rect` is not inside the plane.
  #[inline(always)]
  pub fn region_mut(&mut self, rect: Rect) -> PlaneRegionMut<'_, T> {
    assert!(rect.x + rect.width <= self.cfg.width);
    assert!(rect.y + rect.height <= self.cfg.height);
    let start = rect.y * self.cfg.stride + rect.x;
    let end = if rect.height == 0 {
      start
    } else {
      start + (rect.height - 1) * self.cfg.stride + rect.width
    };
    PlaneRegionMut {
      data: &mut self.data[start..end],
      stride: self.cfg.stride,
      width: rect.width,
      height: rect.height,
    }
  }

  #[inline(always)]
  pub fn as_region(&self) -> PlaneRegion<'_, T> {
    self.region(Rect::new(0, 0, self.cfg.width, self.cfg.height))
  }

  /// Copies `src` into `rect` of this plane.
  pub fn copy_region_from(&mut self, rect: Rect, src: &PlaneRegion<'_, T>) {
    let mut dst = self.region_mut(rect);
    dst.copy_from(src);
  }
}

/// Bounded region of a plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRegion<'a, T: Pixel> {
  data: &'a [T],
  stride: usize,
  width: usize,
  height: usize,
}

/// Mutable bounded region of a plane.
#[derive(Debug)]
pub struct PlaneRegionMut<'a, T: Pixel> {
  data: &'a mut [T],
  stride: usize,
  width: usize,
  height: usize,
}

impl<'a, T: Pixel> PlaneRegion<'a, T> {
  /// Wraps a packed `width`-stride buffer.
  pub fn from_slice(data: &'a [T], width: usize, height: usize) -> Self {
    assert!(data.len() >= width * height);
    PlaneRegion { data, stride: width, width, height }
  }

  #[inline(always)]
  pub const fn width(&self) -> usize {
    self.width
  }

  #[inline(always)]
  pub const fn height(&self) -> usize {
    self.height
  }

  pub fn rows_iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
    let (data, stride, width, height) =
      (self.data, self.stride, self.width, self.height);
    (0..height).map(move |y| &data[y * stride..y * stride + width])
  }

  /// Sub-rectangle relative to this region.
  pub fn subregion(&self, rect: Rect) -> PlaneRegion<'a, T> {
    assert!(rect.x + rect.width <= self.width);
    assert!(rect.y + rect.height <= self.height);
    let start = rect.y * self.stride + rect.x;
    let end = if rect.height == 0 {
      start
    } else {
      start + (rect.height - 1) * self.stride + rect.width
    };
    let data = self.data;
    PlaneRegion {
      data: &data[start..end],
      stride: self.stride,
      width: rect.width,
      height: rect.height,
    }
  }
}

impl<'a, T: Pixel> PlaneRegionMut<'a, T> {
  /// Wraps a packed `width`-stride buffer.
  pub fn from_slice(data: &'a mut [T], width: usize, height: usize) -> Self {
    assert!(data.len() >= width * height);
    PlaneRegionMut { data, stride: width, width, height }
  }

  #[inline(always)]
  pub const fn width(&self) -> usize {
    self.width
  }

  #[inline(always)]
  pub const fn height(&self) -> usize {
    self.height
  }

  pub fn as_const(&self) -> PlaneRegion<'_, T> {
    PlaneRegion {
      data: &*self.data,
      stride: self.stride,
      width: self.width,
      height: self.height,
    }
  }

  pub fn rows_iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
    let (stride, width) = (self.stride, self.width);
    self
      .data
      .chunks_mut(stride)
      .take(self.height)
      .map(move |row| &mut row[..width])
  }

  pub fn copy_from(&mut self, src: &PlaneRegion<'_, T>) {
    assert!(src.width >= self.width && src.height >= self.height);
    for (dst, src) in self.rows_iter_mut().zip(src.rows_iter()) {
      let w = dst.len();
      dst.copy_from_slice(&src[..w]);
    }
  }
}

impl<T: Pixel> Index<usize> for PlaneRegion<'_, T> {
  type Output = [T];

  #[inline(always)]
  fn index(&self, y: usize) -> &Self::Output {
    assert!(y < self.height);
    &self.data[y * self.stride..y * self.stride + self.width]
  }
}

impl<T: Pixel> Index<usize> for PlaneRegionMut<'_, T> {
  type Output = [T];

  #[inline(always)]
  fn index(&self, y: usize) -> &Self::Output {
    assert!(y < self.height);
    &self.data[y * self.stride..y * self.stride + self.width]
  }
}

impl<T: Pixel> IndexMut<usize> for PlaneRegionMut<'_, T> {
  #[inline(always)]
  fn index_mut(&mut self, y: usize) -> &mut Self::Output {
    assert!(y < self.height);
    let (stride, width) = (self.stride, self.width);
    &mut self.data[y * stride..y * stride + width]
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  #[test]
  fn region_rows_follow_stride() {
    let mut plane = Plane::<u8>::new(8, 6, 0, 0);
    for (i, p) in plane.data.iter_mut().enumerate() {
      *p = i as u8;
    }
    let region = plane.region(Rect::new(2, 1, 3, 2));
    let rows: Vec<Vec<u8>> = region.rows_iter().map(|r| r.to_vec()).collect();
    assert_eq!(rows, vec![vec![10, 11, 12], vec![18, 19, 20]]);
    assert_eq!(region[1][2], 20);

    let sub = region.subregion(Rect::new(1, 1, 2, 1));
    assert_eq!(&sub[0], &[19, 20]);
  }

  #[test]
  fn copy_region_touches_only_target() {
    let src = Plane::<u16>::from_slice(&[7; 4], 2, 2);
    let mut dst = Plane::<u16>::new(4, 4, 0, 0);
    dst.copy_region_from(Rect::new(1, 2, 2, 2), &src.as_region());
    assert_eq!(dst.p(1, 2), 7);
    assert_eq!(dst.p(2, 3), 7);
    assert_eq!(dst.p(0, 2), 0);
    assert_eq!(dst.p(3, 3), 0);
    assert_eq!(dst.data.iter().filter(|&&v| v == 7).count(), 4);
  }
}
