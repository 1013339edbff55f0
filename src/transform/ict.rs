// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Inter-component transform for joint Cb-Cr coding.
//!
//! The coded-block mask names which chroma channels carry the shared
//! residual: 2 codes it in Cb and derives half of it for Cr, 1 mirrors that
//! with Cr coded, 3 shares it at full amplitude.

use arrayvec::ArrayVec;

/// Joint residual of one chroma pair.
#[inline(always)]
fn fwd_sample(cb: i32, cr: i32, mask: u8, sign: i32) -> i32 {
  let div_round = |n: i32, d: i32| {
    if n >= 0 {
      (n + d / 2) / d
    } else {
      -((-n + d / 2) / d)
    }
  };
  match mask {
    3 => div_round(cb + sign * cr, 2),
    2 => div_round(4 * cb + 2 * sign * cr, 5),
    _ => div_round(4 * cr + 2 * sign * cb, 5),
  }
}

/// Chroma pair reconstructed from one joint residual sample.
#[inline(always)]
fn inv_sample(c: i32, mask: u8, sign: i32) -> (i32, i32) {
  match mask {
    3 => (c, sign * c),
    2 => (c, (sign * c) >> 1),
    _ => ((sign * c) >> 1, c),
  }
}

/// Folds two chroma residuals into the joint residual for `mask`.
pub fn fwd_ict(
  resi_cb: &[i32], resi_cr: &[i32], mask: u8, sign_neg: bool,
  joint: &mut [i32],
) {
  debug_assert!((1..=3).contains(&mask));
  let sign = if sign_neg { -1 } else { 1 };
  for ((&cb, &cr), j) in resi_cb.iter().zip(resi_cr).zip(joint.iter_mut()) {
    *j = fwd_sample(cb, cr, mask, sign);
  }
}

/// Expands a reconstructed joint residual into both chroma residuals.
pub fn inv_ict(
  joint: &[i32], mask: u8, sign_neg: bool, resi_cb: &mut [i32],
  resi_cr: &mut [i32],
) {
  debug_assert!((1..=3).contains(&mask));
  let sign = if sign_neg { -1 } else { 1 };
  for ((&c, cb), cr) in joint.iter().zip(resi_cb.iter_mut()).zip(resi_cr) {
    (*cb, *cr) = inv_sample(c, mask, sign);
  }
}

/// Squared error of folding and expanding the pair under `mask`, before
/// any quantisation.
fn ict_loss(resi_cb: &[i32], resi_cr: &[i32], mask: u8, sign: i32) -> u64 {
  resi_cb
    .iter()
    .zip(resi_cr)
    .map(|(&cb, &cr)| {
      let (rcb, rcr) = inv_sample(fwd_sample(cb, cr, mask, sign), mask, sign);
      let (dcb, dcr) = ((cb - rcb) as i64, (cr - rcr) as i64);
      (dcb * dcb + dcr * dcr) as u64
    })
    .sum()
}

/// Joint coded-block masks worth a full trial, best first.
///
/// The runner-up is kept only when its folding loss is within 9/8 of the
/// best one's.
pub fn select_ict_candidates(
  resi_cb: &[i32], resi_cr: &[i32], sign_neg: bool,
) -> ArrayVec<u8, 2> {
  let sign = if sign_neg { -1 } else { 1 };
  let mut scored: ArrayVec<(u64, u8), 3> = [3u8, 2, 1]
    .iter()
    .map(|&m| (ict_loss(resi_cb, resi_cr, m, sign), m))
    .collect();
  scored.sort_by_key(|&(loss, _)| loss);
  let mut cands = ArrayVec::new();
  cands.push(scored[0].1);
  if 8 * scored[1].0 < 9 * scored[0].0 {
    cands.push(scored[1].1);
  }
  cands
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn identical_channels_pick_shared_mask() {
    let r: Vec<i32> = (0..16).map(|i| i * 3 - 20).collect();
    assert_eq!(select_ict_candidates(&r, &r, false).as_slice(), &[3]);
  }

  #[test]
  fn half_amplitude_cr_picks_cb_mask() {
    let cb: Vec<i32> = (0..16).map(|i| (i - 8) * 8).collect();
    let cr: Vec<i32> = cb.iter().map(|&c| -(c >> 1)).collect();
    let cands = select_ict_candidates(&cb, &cr, true);
    assert_eq!(cands[0], 2);

    let mut joint = vec![0; 16];
    fwd_ict(&cb, &cr, 2, true, &mut joint);
    let (mut rcb, mut rcr) = (vec![0; 16], vec![0; 16]);
    inv_ict(&joint, 2, true, &mut rcb, &mut rcr);
    assert_eq!(rcb, cb);
    assert_eq!(rcr, cr);
  }
}
