// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::frame::*;
use crate::partition::{BlockSize, ComponentId, IspMode};
use crate::serialize::{Deserialize, Serialize};
use crate::util::*;

pub const PLANAR_IDX: u8 = 0;
pub const DC_IDX: u8 = 1;
pub const HOR_IDX: u8 = 18;
pub const DIA_IDX: u8 = 34;
pub const VER_IDX: u8 = 50;
pub const VDIA_IDX: u8 = 66;
pub const NUM_LUMA_MODE: usize = 67;
pub const NUM_MOST_PROBABLE_MODES: usize = 6;

pub const LM_CHROMA_IDX: u8 = 67;
pub const MDLM_L_IDX: u8 = 68;
pub const MDLM_T_IDX: u8 = 69;
pub const DM_CHROMA_IDX: u8 = 70;
pub const NUM_CHROMA_MODE: usize = 8;

/// Reference line offsets; index 0 is the adjacent line.
pub const MULTI_REF_LINE_IDX: [u8; 3] = [0, 1, 2];

pub const MIP_MAX_WIDTH: usize = 64;
pub const MIP_MAX_HEIGHT: usize = 64;

const ANG_TABLE: [i32; 17] =
  [0, 1, 2, 3, 4, 6, 8, 10, 12, 14, 16, 18, 20, 23, 26, 29, 32];

/// One luma intra hypothesis.
#[derive(
  Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct ModeInfo {
  pub mip_flag: bool,
  pub mip_transposed: bool,
  pub ref_line_idx: u8,
  pub isp_mode: IspMode,
  pub mode_id: u8,
}

impl ModeInfo {
  pub const fn regular(mode_id: u8) -> Self {
    ModeInfo {
      mip_flag: false,
      mip_transposed: false,
      ref_line_idx: 0,
      isp_mode: IspMode::NotIsp,
      mode_id,
    }
  }

  pub const fn mrl(mode_id: u8, ref_line_idx: u8) -> Self {
    ModeInfo { ref_line_idx, ..ModeInfo::regular(mode_id) }
  }

  pub const fn mip(mode_id: u8, mip_transposed: bool) -> Self {
    ModeInfo { mip_flag: true, mip_transposed, ..ModeInfo::regular(mode_id) }
  }

  /// Checks the combinations a caller must never request.
  ///
  /// # Panics
  ///
  /// - On MIP with a non-adjacent reference line, Planar with a non-adjacent
  ///   reference line, or ISP combined with either.
  pub fn assert_legal(&self) {
    assert!(
      !(self.mip_flag && self.ref_line_idx != 0),
      "MIP with multi-reference line"
    );
    assert!(
      !(self.ref_line_idx != 0 && self.mode_id == PLANAR_IDX),
      "multi-reference line with Planar"
    );
    assert!(
      !(self.isp_mode != IspMode::NotIsp && self.mip_flag),
      "ISP with MIP"
    );
    assert!(
      !(self.isp_mode != IspMode::NotIsp && self.ref_line_idx != 0),
      "ISP with multi-reference line"
    );
  }
}

#[inline(always)]
pub const fn is_lm_mode(mode: u8) -> bool {
  mode >= LM_CHROMA_IDX && mode <= MDLM_T_IDX
}

pub fn mip_size_id(bs: BlockSize) -> usize {
  let (w, h) = (bs.width(), bs.height());
  if w == 4 && h == 4 {
    0
  } else if w == 4 || h == 4 || (w == 8 && h == 8) {
    1
  } else {
    2
  }
}

pub fn num_mip_modes(bs: BlockSize) -> usize {
  [16, 8, 6][mip_size_id(bs)]
}

/// Most probable luma modes from the decoded neighbours of `area`.
///
/// The above neighbour is only used inside the current CTU row.
pub fn get_intra_mpms(
  modes: &ModeMap, area: Rect, ctu_log2: usize,
) -> [u8; NUM_MOST_PROBABLE_MODES] {
  const OFFSET: i32 = NUM_LUMA_MODE as i32 - 6;
  const MOD: i32 = OFFSET + 3;
  let wrap = |m: i32| (((m % MOD) + MOD) % MOD + 2) as u8;

  let (x, y) = (area.x as isize, area.y as isize);
  let left = modes
    .get(x - 1, y + area.height as isize - 1)
    .unwrap_or(PLANAR_IDX) as i32;
  let above = if area.y > 0
    && ((area.y - 1) >> ctu_log2) == (area.y >> ctu_log2)
  {
    modes.get(x + area.width as isize - 1, y - 1).unwrap_or(PLANAR_IDX) as i32
  } else {
    PLANAR_IDX as i32
  };

  let dc = DC_IDX as i32;
  let default = [
    PLANAR_IDX,
    DC_IDX,
    VER_IDX,
    HOR_IDX,
    VER_IDX - 4,
    VER_IDX + 4,
  ];

  if left == above {
    if left > dc {
      return [
        PLANAR_IDX,
        left as u8,
        wrap(left + OFFSET),
        wrap(left - 1),
        wrap(left + OFFSET - 1),
        wrap(left),
      ];
    }
    return default;
  }

  if left > dc && above > dc {
    let (min, max) = (left.min(above), left.max(above));
    let diff = max - min;
    let tail = if diff == 1 {
      [wrap(min + OFFSET), wrap(max - 1), wrap(min + OFFSET - 1)]
    } else if diff >= 62 {
      [wrap(min - 1), wrap(max + OFFSET), wrap(min)]
    } else if diff == 2 {
      [wrap(min - 1), wrap(min + OFFSET), wrap(max - 1)]
    } else {
      [wrap(min + OFFSET), wrap(min - 1), wrap(max + OFFSET)]
    };
    return [PLANAR_IDX, left as u8, above as u8, tail[0], tail[1], tail[2]];
  }

  if left + above >= 2 {
    let max = left.max(above);
    return [
      PLANAR_IDX,
      max as u8,
      wrap(max + OFFSET),
      wrap(max - 1),
      wrap(max + OFFSET - 1),
      wrap(max),
    ];
  }

  default
}

/// Luma direction a derived chroma mode inherits.
pub const fn chroma_dm(luma_dir: u8, luma_mip: bool) -> u8 {
  if luma_mip {
    PLANAR_IDX
  } else {
    luma_dir
  }
}

/// Chroma candidates in signalling order. A fixed mode equal to the derived
/// one is replaced by the top-right diagonal.
pub fn get_intra_chroma_cand_modes(
  luma_dir: u8, luma_mip: bool,
) -> [u8; NUM_CHROMA_MODE] {
  let mut modes = [
    PLANAR_IDX,
    VER_IDX,
    HOR_IDX,
    DC_IDX,
    LM_CHROMA_IDX,
    MDLM_L_IDX,
    MDLM_T_IDX,
    DM_CHROMA_IDX,
  ];
  let dm = chroma_dm(luma_dir, luma_mip);
  for m in modes.iter_mut().take(4) {
    if *m == dm {
      *m = VDIA_IDX;
    }
  }
  modes
}

/// Reference samples around a block, after substitution.
///
/// `above[0]` and `left[0]` both hold the corner sample of the chosen
/// reference line; `above[1 + ref_line + i]` lies over column `i`.
#[derive(Debug, Clone)]
pub struct IntraEdge {
  pub above: Vec<i32>,
  pub left: Vec<i32>,
  pub ref_line: usize,
  pub width: usize,
  pub height: usize,
}

impl IntraEdge {
  pub fn new<T: Pixel>(
    rec: &Plane<T>, rect: Rect, ref_line: usize, bit_depth: usize,
  ) -> Self {
    let (w, h, k) = (rect.width, rect.height, ref_line);
    let n = w + h + 2 * k + 2;
    let (x0, y0) = (rect.x as isize, rect.y as isize);
    let (pw, ph) = (rec.cfg.width as isize, rec.cfg.height as isize);
    let line_x = x0 - 1 - k as isize;
    let line_y = y0 - 1 - k as isize;

    let fetch = |sx: isize, sy: isize| -> Option<i32> {
      (sx >= 0 && sy >= 0 && sx < pw && sy < ph)
        .then(|| i32::cast_from(rec.p(sx as usize, sy as usize)))
    };

    let mut seq: Vec<Option<i32>> = Vec::with_capacity(2 * n - 1);
    for i in (1..n).rev() {
      let sy = line_y + i as isize;
      seq.push(if sy < y0 + h as isize { fetch(line_x, sy) } else { None });
    }
    seq.push(fetch(line_x, line_y));
    for i in 1..n {
      let sx = line_x + i as isize;
      seq.push(if sx < x0 + w as isize { fetch(sx, line_y) } else { None });
    }

    let values = match seq.iter().position(Option::is_some) {
      None => vec![1 << (bit_depth - 1); seq.len()],
      Some(first) => {
        let mut prev = seq[first].unwrap_or_default();
        seq
          .iter()
          .map(|s| {
            if let Some(v) = s {
              prev = *v;
            }
            prev
          })
          .collect()
      }
    };

    let left = (0..n).map(|i| values[n - 1 - i]).collect();
    let above = values[n - 1..].to_vec();
    IntraEdge { above, left, ref_line, width: w, height: h }
  }

  /// Edge with every reference sample set to `v`.
  pub fn flat(width: usize, height: usize, ref_line: usize, v: i32) -> Self {
    let n = width + height + 2 * ref_line + 2;
    IntraEdge {
      above: vec![v; n],
      left: vec![v; n],
      ref_line,
      width,
      height,
    }
  }
}

/// Sample prediction kernels.
pub trait IntraPredictor<T: Pixel> {
  /// Planar, DC or angular prediction of `edge`'s block.
  fn predict_intra(
    &self, edge: &IntraEdge, mode: u8, bit_depth: usize,
    dst: &mut PlaneRegionMut<'_, T>,
  );

  /// Matrix-weighted prediction.
  fn predict_mip(
    &self, edge: &IntraEdge, mode: u8, transposed: bool, bit_depth: usize,
    dst: &mut PlaneRegionMut<'_, T>,
  );

  /// Cross-component linear-model prediction of `rect` in `comp`'s plane
  /// from the reconstructed luma.
  fn predict_lm(
    &self, fs: &FrameState<T>, comp: ComponentId, rect: Rect, mode: u8,
    dst: &mut PlaneRegionMut<'_, T>,
  );
}

/// Straightforward reference kernels: no edge filtering, no position
/// dependent combination, reduced MIP weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefIntraPredictor;

fn pred_angle(mode: u8) -> (bool, i32) {
  let m = mode as i32;
  let is_ver = m >= DIA_IDX as i32;
  let delta =
    if is_ver { m - VER_IDX as i32 } else { -(m - HOR_IDX as i32) };
  (is_ver, ANG_TABLE[delta.unsigned_abs() as usize] * delta.signum())
}

/// Projects `main` (with `side` for negative angles) onto a `bw`x`bh`
/// block, rows along the main reference.
fn predict_directional(
  main: &[i32], side: &[i32], angle: i32, k: usize, bw: usize, bh: usize,
  out: &mut [i32],
) {
  let neg = if angle < 0 { bh + k + 2 } else { 0 };
  let mut ext = vec![0; neg + main.len()];
  ext[neg..].copy_from_slice(main);
  if angle < 0 {
    let abs = -angle;
    let inv = (256 * 32 + abs / 2) / abs;
    for j in 1..=neg {
      let sidx = ((j as i32 * inv + 128) >> 8) as usize;
      ext[neg - j] = side[sidx.min(side.len() - 1)];
    }
  }
  let last = ext.len() - 1;
  for py in 0..bh {
    let dpos = (py as i32 + 1 + k as i32) * angle;
    let (dint, frac) = (dpos >> 5, dpos & 31);
    for px in 0..bw {
      let idx = (neg as i32 + px as i32 + 1 + k as i32 + dint) as usize;
      let (a, b) = (ext[idx.min(last)], ext[(idx + 1).min(last)]);
      out[py * bw + px] = ((32 - frac) * a + frac * b + 16) >> 5;
    }
  }
}

fn reduce_boundary(src: &[i32], size: usize) -> Vec<i32> {
  let group = (src.len() / size).max(1);
  src
    .chunks(group)
    .take(size)
    .map(|c| (c.iter().sum::<i32>() + (c.len() as i32 >> 1)) / c.len() as i32)
    .collect()
}

impl<T: Pixel> IntraPredictor<T> for RefIntraPredictor {
  fn predict_intra(
    &self, edge: &IntraEdge, mode: u8, bit_depth: usize,
    dst: &mut PlaneRegionMut<'_, T>,
  ) {
    let (w, h, k) = (edge.width, edge.height, edge.ref_line);
    debug_assert!(dst.width() == w && dst.height() == h);
    match mode {
      PLANAR_IDX => {
        debug_assert_eq!(k, 0);
        let (lw, lh) = (w.trailing_zeros(), h.trailing_zeros());
        let top_right = edge.above[1 + w];
        let bottom_left = edge.left[1 + h];
        for y in 0..h {
          let row = &mut dst[y];
          for x in 0..w {
            let hor = (((w - 1 - x) as i32) * edge.left[1 + y]
              + (x as i32 + 1) * top_right)
              << lh;
            let ver = (((h - 1 - y) as i32) * edge.above[1 + x]
              + (y as i32 + 1) * bottom_left)
              << lw;
            let v = (hor + ver + (1 << (lw + lh))) >> (lw + lh + 1);
            row[x] = T::clip_from(v, bit_depth);
          }
        }
      }
      DC_IDX => {
        let top = &edge.above[1 + k..1 + k + w];
        let left = &edge.left[1 + k..1 + k + h];
        let (sum, n) = if w == h {
          (top.iter().chain(left).sum::<i32>(), w + h)
        } else if w > h {
          (top.iter().sum(), w)
        } else {
          (left.iter().sum(), h)
        };
        let dc = (sum + (n as i32 >> 1)) >> n.trailing_zeros();
        let v = T::clip_from(dc, bit_depth);
        dst.rows_iter_mut().for_each(|row| row.fill(v));
      }
      _ => {
        let (is_ver, angle) = pred_angle(mode);
        let mut out = vec![0; w * h];
        let (above, left) = (&edge.above, &edge.left);
        if is_ver {
          predict_directional(above, left, angle, k, w, h, &mut out);
          for y in 0..h {
            let row = &mut dst[y];
            for x in 0..w {
              row[x] = T::clip_from(out[y * w + x], bit_depth);
            }
          }
        } else {
          predict_directional(left, above, angle, k, h, w, &mut out);
          for y in 0..h {
            let row = &mut dst[y];
            for x in 0..w {
              row[x] = T::clip_from(out[x * h + y], bit_depth);
            }
          }
        }
      }
    }
  }

  fn predict_mip(
    &self, edge: &IntraEdge, mode: u8, transposed: bool, bit_depth: usize,
    dst: &mut PlaneRegionMut<'_, T>,
  ) {
    let (w, h) = (edge.width, edge.height);
    let bs =
      BlockSize::new(w.trailing_zeros() as u8, h.trailing_zeros() as u8);
    let size_id = mip_size_id(bs);
    let rs = if size_id == 0 { 2 } else { 4 };
    let bt = reduce_boundary(&edge.above[1..=w], rs);
    let bl = reduce_boundary(&edge.left[1..=h], rs);
    let red = if size_id == 2 { 8 } else { 4 };
    let (red_w, red_h) = (w.min(red), h.min(red));

    let alpha = (mode as f64 + 1.0) / (num_mip_modes(bs) as f64 + 1.0);
    let (top, left, tw, th) = if transposed {
      (&bl, &bt, red_h, red_w)
    } else {
      (&bt, &bl, red_w, red_h)
    };
    let mut reduced = vec![0f64; red_w * red_h];
    for i in 0..th {
      for j in 0..tw {
        let t = top[j * top.len() / tw] as f64;
        let l = left[i * left.len() / th] as f64;
        let wt = alpha * (th - i) as f64;
        let wl = (1.0 - alpha) * (tw - j) as f64;
        let v = (wt * t + wl * l) / (wt + wl);
        if transposed {
          reduced[j * red_w + i] = v;
        } else {
          reduced[i * red_w + j] = v;
        }
      }
    }

    let coord = |p: usize, full: usize, red: usize| -> (usize, usize, f64) {
      let f = ((2 * p + 1) * red) as f64 / (2 * full) as f64 - 0.5;
      let f = f.clamp(0.0, (red - 1) as f64);
      let i0 = f.floor() as usize;
      (i0, (i0 + 1).min(red - 1), f - i0 as f64)
    };
    for y in 0..h {
      let (y0, y1, fy) = coord(y, h, red_h);
      let row = &mut dst[y];
      for x in 0..w {
        let (x0, x1, fx) = coord(x, w, red_w);
        let a = reduced[y0 * red_w + x0] * (1.0 - fx)
          + reduced[y0 * red_w + x1] * fx;
        let b = reduced[y1 * red_w + x0] * (1.0 - fx)
          + reduced[y1 * red_w + x1] * fx;
        let v = a * (1.0 - fy) + b * fy;
        row[x] = T::clip_from(v.round() as i32, bit_depth);
      }
    }
  }

  fn predict_lm(
    &self, fs: &FrameState<T>, comp: ComponentId, rect: Rect, mode: u8,
    dst: &mut PlaneRegionMut<'_, T>,
  ) {
    let (xdec, ydec) =
      fs.chroma_sampling.get_decimation().unwrap_or((0, 0));
    let luma = fs.rec_plane(ComponentId::Y);
    let chroma = fs.rec_plane(comp);
    let (cw, ch) = (chroma.cfg.width, chroma.cfg.height);
    let bit_depth = fs.bit_depth;

    let luma_ds = |cx: usize, cy: usize| -> f64 {
      let (lx, ly) = (cx << xdec, cy << ydec);
      let mut sum = 0i32;
      let mut n = 0;
      for dy in 0..(1 << ydec) {
        for dx in 0..(1 << xdec) {
          let (sx, sy) = (lx + dx, ly + dy);
          if sx < luma.cfg.width && sy < luma.cfg.height {
            sum += i32::cast_from(luma.p(sx, sy));
            n += 1;
          }
        }
      }
      if n == 0 {
        0.0
      } else {
        sum as f64 / n as f64
      }
    };

    let mut pairs: Vec<(f64, f64)> = Vec::new();
    let use_top = mode != MDLM_L_IDX && rect.y > 0;
    let use_left = mode != MDLM_T_IDX && rect.x > 0;
    let ext = |len: usize| if mode == LM_CHROMA_IDX { len } else { 2 * len };
    if use_top {
      let y = rect.y - 1;
      for x in rect.x..(rect.x + ext(rect.width)).min(cw) {
        pairs.push((luma_ds(x, y), i32::cast_from(chroma.p(x, y)) as f64));
      }
    }
    if use_left {
      let x = rect.x - 1;
      for y in rect.y..(rect.y + ext(rect.height)).min(ch) {
        pairs.push((luma_ds(x, y), i32::cast_from(chroma.p(x, y)) as f64));
      }
    }

    let (alpha, beta) = if pairs.is_empty() {
      (0.0, (1 << (bit_depth - 1)) as f64)
    } else {
      let n = pairs.len() as f64;
      let ml = pairs.iter().map(|p| p.0).sum::<f64>() / n;
      let mc = pairs.iter().map(|p| p.1).sum::<f64>() / n;
      let var = pairs.iter().map(|p| (p.0 - ml) * (p.0 - ml)).sum::<f64>();
      let cov = pairs.iter().map(|p| (p.0 - ml) * (p.1 - mc)).sum::<f64>();
      if var > f64::EPSILON {
        let a = cov / var;
        (a, mc - a * ml)
      } else {
        (0.0, mc)
      }
    };

    for y in 0..rect.height {
      let row = &mut dst[y];
      for x in 0..rect.width {
        let v = alpha * luma_ds(rect.x + x, rect.y + y) + beta;
        row[x] = T::clip_from(v.round() as i32, bit_depth);
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn predict(edge: &IntraEdge, mode: u8) -> Vec<u16> {
    let mut buf = vec![0u16; edge.width * edge.height];
    let mut dst =
      PlaneRegionMut::from_slice(&mut buf, edge.width, edge.height);
    RefIntraPredictor.predict_intra(edge, mode, 10, &mut dst);
    buf
  }

  #[test]
  fn flat_edge_predicts_flat_block() {
    let edge = IntraEdge::flat(8, 8, 0, 300);
    for mode in [PLANAR_IDX, DC_IDX, 2, HOR_IDX, DIA_IDX, VER_IDX, 66] {
      assert!(predict(&edge, mode).iter().all(|&v| v == 300), "{mode}");
    }
    let mut buf = vec![0u16; 64];
    let mut dst = PlaneRegionMut::from_slice(&mut buf, 8, 8);
    RefIntraPredictor.predict_mip(&edge, 3, true, 10, &mut dst);
    assert!(buf.iter().all(|&v| v == 300));
  }

  #[test]
  fn vertical_copies_above_row() {
    let mut edge = IntraEdge::flat(4, 4, 0, 0);
    for (i, v) in edge.above.iter_mut().enumerate() {
      *v = 10 * i as i32;
    }
    let pred = predict(&edge, VER_IDX);
    for y in 0..4 {
      assert_eq!(&pred[y * 4..y * 4 + 4], &[10, 20, 30, 40]);
    }
    let mut edge = IntraEdge::flat(4, 4, 0, 0);
    for (i, v) in edge.left.iter_mut().enumerate() {
      *v = 10 * i as i32;
    }
    let pred = predict(&edge, HOR_IDX);
    for y in 0..4 {
      let row = &pred[y * 4..y * 4 + 4];
      assert!(row.iter().all(|&v| v == 10 * (y as u16 + 1)));
    }
  }

  #[test]
  fn edge_substitutes_missing_neighbours() {
    let plane = Plane::<u8>::from_slice(&[77; 16 * 16], 16, 16);
    let edge = IntraEdge::new(&plane, Rect::new(0, 0, 8, 8), 0, 8);
    assert!(edge.above.iter().chain(&edge.left).all(|&v| v == 128));
    let edge = IntraEdge::new(&plane, Rect::new(8, 8, 8, 8), 1, 8);
    assert!(edge.above.iter().chain(&edge.left).all(|&v| v == 77));
  }

  #[test]
  fn mpm_equal_angular_neighbours() {
    let mut map = ModeMap::new(32, 32);
    map.set(Rect::new(0, 0, 32, 8), 50);
    map.set(Rect::new(0, 8, 8, 8), 50);
    let mpm = get_intra_mpms(&map, Rect::new(8, 8, 8, 8), 7);
    assert_eq!(mpm, [PLANAR_IDX, 50, 49, 51, 48, 52]);
  }

  #[test]
  fn mpm_ignores_above_ctu_row() {
    let mut map = ModeMap::new(64, 64);
    map.set(Rect::new(0, 0, 64, 32), 20);
    let mpm = get_intra_mpms(&map, Rect::new(0, 32, 8, 8), 5);
    assert_eq!(mpm, [PLANAR_IDX, DC_IDX, VER_IDX, HOR_IDX, 46, 54]);
    let mpm = get_intra_mpms(&map, Rect::new(0, 32, 8, 8), 6);
    assert_eq!(mpm[1], 20);
  }

  #[test]
  fn chroma_candidates_replace_duplicate_of_dm() {
    let modes = get_intra_chroma_cand_modes(VER_IDX, false);
    assert_eq!(modes[1], VDIA_IDX);
    assert_eq!(modes[7], DM_CHROMA_IDX);
    let modes = get_intra_chroma_cand_modes(12, true);
    assert_eq!(modes[0], VDIA_IDX);
  }

  #[test]
  #[should_panic]
  fn mip_with_reference_line_is_rejected() {
    ModeInfo { ref_line_idx: 1, ..ModeInfo::mip(0, false) }.assert_legal();
  }
}
