// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub use self::native::*;

mod native {
  use crate::frame::*;
  use crate::util::*;

  /// Fixed-point precision of luma-level distortion weights.
  pub const WEIGHT_SHIFT: u32 = 16;

  #[inline(always)]
  pub fn get_sad<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>, plane_ref: &PlaneRegion<'_, T>,
    blk_w: usize, blk_h: usize,
  ) -> u32 {
    let mut sum = 0 as u32;

    for (slice_org, slice_ref) in
      plane_org.rows_iter().take(blk_h).zip(plane_ref.rows_iter())
    {
      sum += slice_org
        .iter()
        .take(blk_w)
        .zip(slice_ref)
        .map(|(&a, &b)| (i32::cast_from(a) - i32::cast_from(b)).unsigned_abs())
        .sum::<u32>();
    }

    sum
  }

  #[inline(always)]
  fn butterfly(a: i32, b: i32) -> (i32, i32) {
    ((a + b), (a - b))
  }

  #[inline(always)]
  #[allow(clippy::identity_op, clippy::erasing_op)]
  fn hadamard4_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
    for i in 0..n {
      let sub: &mut [i32] = &mut data[i * stride0..];
      let (a0, a1) = butterfly(sub[0 * stride1], sub[1 * stride1]);
      let (a2, a3) = butterfly(sub[2 * stride1], sub[3 * stride1]);
      let (b0, b2) = butterfly(a0, a2);
      let (b1, b3) = butterfly(a1, a3);
      sub[0 * stride1] = b0;
      sub[1 * stride1] = b1;
      sub[2 * stride1] = b2;
      sub[3 * stride1] = b3;
    }
  }

  #[inline(always)]
  #[allow(clippy::identity_op, clippy::erasing_op)]
  fn hadamard8_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
    for i in 0..n {
      let sub: &mut [i32] = &mut data[i * stride0..];

      let (a0, a1) = butterfly(sub[0 * stride1], sub[1 * stride1]);
      let (a2, a3) = butterfly(sub[2 * stride1], sub[3 * stride1]);
      let (a4, a5) = butterfly(sub[4 * stride1], sub[5 * stride1]);
      let (a6, a7) = butterfly(sub[6 * stride1], sub[7 * stride1]);

      let (b0, b2) = butterfly(a0, a2);
      let (b1, b3) = butterfly(a1, a3);
      let (b4, b6) = butterfly(a4, a6);
      let (b5, b7) = butterfly(a5, a7);

      let (c0, c4) = butterfly(b0, b4);
      let (c1, c5) = butterfly(b1, b5);
      let (c2, c6) = butterfly(b2, b6);
      let (c3, c7) = butterfly(b3, b7);

      sub[0 * stride1] = c0;
      sub[1 * stride1] = c1;
      sub[2 * stride1] = c2;
      sub[3 * stride1] = c3;
      sub[4 * stride1] = c4;
      sub[5 * stride1] = c5;
      sub[6 * stride1] = c6;
      sub[7 * stride1] = c7;
    }
  }

  #[inline(always)]
  fn hadamard2d(data: &mut [i32], (w, h): (usize, usize)) {
    let vert_func = if h == 4 { hadamard4_1d } else { hadamard8_1d };
    vert_func(data, w, 1, h);
    let horz_func = if w == 4 { hadamard4_1d } else { hadamard8_1d };
    horz_func(data, h, w, 1);
  }

  /// Sum of absolute transformed differences.
  ///
  /// Blocks with a side of 4 use 4x4 Hadamard tiles, all others 8x8. Each
  /// tile is normalised on its own, which puts the result on the scale of
  /// twice the SAD for uncorrelated residuals.
  #[inline(always)]
  pub fn get_satd<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>, plane_ref: &PlaneRegion<'_, T>,
    blk_w: usize, blk_h: usize,
  ) -> u32 {
    let size: usize = blk_w.min(blk_h).min(8);
    let shift = if size == 4 { 1 } else { 2 };

    let mut sum = 0 as u64;

    for chunk_y in (0..blk_h).step_by(size) {
      for chunk_x in (0..blk_w).step_by(size) {
        let chunk_area = Rect::new(chunk_x, chunk_y, size, size);
        let chunk_org = plane_org.subregion(chunk_area);
        let chunk_ref = plane_ref.subregion(chunk_area);
        let buf: &mut [i32] = &mut [0; 8 * 8][..size * size];

        for (row_diff, (row_org, row_ref)) in buf
          .chunks_mut(size)
          .zip(chunk_org.rows_iter().zip(chunk_ref.rows_iter()))
        {
          for (diff, (a, b)) in
            row_diff.iter_mut().zip(row_org.iter().zip(row_ref.iter()))
          {
            *diff = i32::cast_from(*a) - i32::cast_from(*b);
          }
        }

        hadamard2d(buf, (size, size));

        let tile = buf.iter().map(|a| a.unsigned_abs() as u64).sum::<u64>();
        sum += (tile + (1 << shift >> 1)) >> shift;
      }
    }

    sum as u32
  }

  /// Prescreen distortion: the smaller of doubled SAD and SATD.
  #[inline(always)]
  pub fn get_had_2sad<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>, plane_ref: &PlaneRegion<'_, T>,
    blk_w: usize, blk_h: usize,
  ) -> u64 {
    let sad = get_sad(plane_org, plane_ref, blk_w, blk_h) as u64 * 2;
    let satd = get_satd(plane_org, plane_ref, blk_w, blk_h) as u64;
    sad.min(satd)
  }

  /// Sum of squared errors.
  pub fn get_sse<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>, plane_ref: &PlaneRegion<'_, T>,
    blk_w: usize, blk_h: usize,
  ) -> u64 {
    plane_org
      .rows_iter()
      .take(blk_h)
      .zip(plane_ref.rows_iter())
      .map(|(o, r)| {
        o.iter()
          .take(blk_w)
          .zip(r)
          .map(|(&a, &b)| {
            let d = (i32::cast_from(a) - i32::cast_from(b)) as i64;
            (d * d) as u64
          })
          .sum::<u64>()
      })
      .sum()
  }

  /// Squared error weighted by the level of the co-located original luma.
  ///
  /// `weights` is indexed by luma sample value and holds
  /// `1 << WEIGHT_SHIFT` for unit weight. `luma` covers the block at full
  /// luma resolution; (`xdec`, `ydec`) map block samples onto it.
  pub fn get_weighted_sse<T: Pixel>(
    plane_org: &PlaneRegion<'_, T>, plane_ref: &PlaneRegion<'_, T>,
    blk_w: usize, blk_h: usize, luma: &PlaneRegion<'_, T>, xdec: usize,
    ydec: usize, weights: &[u32],
  ) -> u64 {
    let mut sum = 0u64;
    for (y, (o, r)) in
      plane_org.rows_iter().take(blk_h).zip(plane_ref.rows_iter()).enumerate()
    {
      let luma_row = &luma[y << ydec];
      for (x, (&a, &b)) in o.iter().take(blk_w).zip(r).enumerate() {
        let d = (i32::cast_from(a) - i32::cast_from(b)) as i64;
        let level = u32::cast_from(luma_row[x << xdec]) as usize;
        let w = weights[level.min(weights.len() - 1)] as u64;
        sum += w * (d * d) as u64;
      }
    }
    (sum + (1 << WEIGHT_SHIFT >> 1)) >> WEIGHT_SHIFT
  }
}

#[cfg(test)]
pub mod test {
  use super::*;
  use crate::frame::*;
  use crate::partition::BlockSize;
  use crate::util::Pixel;
  use interpolate_name::interpolate_test;

  // Two diagonal ramps running in opposite directions.
  fn setup_planes<T: Pixel>() -> (Plane<T>, Plane<T>) {
    let (w, h) = (96, 80);
    let mut input_plane = Plane::new(w, h, 0, 0);
    let mut rec_plane = Plane::new(w, h, 0, 0);

    for (i, row) in input_plane.data.chunks_mut(w).enumerate() {
      for (j, pixel) in row.iter_mut().enumerate() {
        *pixel = T::cast_from((j + i) as i32 & 255);
      }
    }

    for (i, row) in rec_plane.data.chunks_mut(w).enumerate() {
      for (j, pixel) in row.iter_mut().enumerate() {
        *pixel = T::cast_from((j as i32 - i as i32) & 255);
      }
    }

    (input_plane, rec_plane)
  }

  const BLOCKS: [(BlockSize, u32, u32, u64); 8] = [
    (BlockSize::new(2, 2), 176, 112, 2016),
    (BlockSize::new(2, 3), 1768, 3520, 337600),
    (BlockSize::new(3, 2), 352, 224, 4032),
    (BlockSize::new(3, 3), 2248, 6816, 345472),
    (BlockSize::new(4, 4), 18648, 24352, 3423744),
    (BlockSize::new(5, 4), 24536, 26272, 3580928),
    (BlockSize::new(3, 5), 40336, 23872, 8246784),
    (BlockSize::new(6, 6), 406456, 205952, 55842816),
  ];

  fn dist_same_inner<T: Pixel>() {
    let (input_plane, rec_plane) = setup_planes::<T>();

    for (bs, sad, satd, sse) in BLOCKS {
      let (bsw, bsh) = (bs.width(), bs.height());
      let area = Rect::new(8, 4, bsw, bsh);
      let input_region = input_plane.region(area);
      let rec_region = rec_plane.region(area);

      assert_eq!(sad, get_sad(&input_region, &rec_region, bsw, bsh));
      assert_eq!(satd, get_satd(&input_region, &rec_region, bsw, bsh));
      assert_eq!(sse, get_sse(&input_region, &rec_region, bsw, bsh));
      assert_eq!(
        (sad as u64 * 2).min(satd as u64),
        get_had_2sad(&input_region, &rec_region, bsw, bsh)
      );
    }
  }

  #[interpolate_test(u8, 8)]
  #[interpolate_test(u16, 10)]
  fn dist_same(bit_depth: usize) {
    if bit_depth <= 8 {
      dist_same_inner::<u8>();
    } else {
      dist_same_inner::<u16>();
    }
  }

  #[test]
  fn unit_weights_match_plain_sse() {
    let (input_plane, rec_plane) = setup_planes::<u16>();
    let area = Rect::new(8, 4, 16, 16);
    let weights = vec![1u32 << WEIGHT_SHIFT; 256];
    let plain =
      get_sse(&input_plane.region(area), &rec_plane.region(area), 16, 16);
    let weighted = get_weighted_sse(
      &input_plane.region(area),
      &rec_plane.region(area),
      16,
      16,
      &input_plane.region(area),
      0,
      0,
      &weights,
    );
    assert_eq!(plain, weighted);
  }

  #[test]
  fn identical_blocks_cost_nothing() {
    let (input_plane, _) = setup_planes::<u8>();
    let area = Rect::new(0, 0, 32, 32);
    let r = input_plane.region(area);
    assert_eq!(get_satd(&r, &r, 32, 32), 0);
    assert_eq!(get_sad(&r, &r, 32, 32), 0);
  }
}
