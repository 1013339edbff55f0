// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Hadamard-cost prescreen of the luma intra hypotheses.

use arrayvec::ArrayVec;
use log::trace;

use crate::api::IntraSearchConfig;
use crate::context::{ContextState, ContextWriter};
use crate::dist::get_had_2sad;
use crate::ec::{Writer, WriterCounter};
use crate::encoder::pred_cache::PredBufCache;
use crate::encoder::tx_search::LumaSyntax;
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::rdo::*;
use crate::util::{floor_log2, Pixel};

/// Largest MIP mode count of any block size, transposed variants included.
const MAX_MIP_HYPOTHESES: usize = 32;

/// Renders `mode` for a `w`x`h` block into the packed buffer `dst`.
pub(crate) fn predict_luma<T: Pixel, P: IntraPredictor<T>>(
  predictor: &P, edge: &IntraEdge, mode: &ModeInfo, bit_depth: usize,
  w: usize, h: usize, dst: &mut [T],
) {
  let mut dst = PlaneRegionMut::from_slice(&mut dst[..w * h], w, h);
  if mode.mip_flag {
    predictor.predict_mip(
      edge,
      mode.mode_id,
      mode.mip_transposed,
      bit_depth,
      &mut dst,
    );
  } else {
    predictor.predict_intra(edge, mode.mode_id, bit_depth, &mut dst);
  }
}

pub(crate) struct PreselectEnv<'a, T: Pixel, P: IntraPredictor<T>> {
  pub fs: &'a FrameState<T>,
  pub cu: &'a CodingUnit,
  pub cfg: &'a IntraSearchConfig,
  pub rd: RdCost,
  pub mpms: &'a [u8; NUM_MOST_PROBABLE_MODES],
  pub syntax: LumaSyntax,
  pub predictor: &'a P,
  /// Entropy state every mode is estimated from.
  pub ctx: &'a ContextState,
  pub test_mip: bool,
}

impl<T: Pixel, P: IntraPredictor<T>> PreselectEnv<'_, T, P> {
  /// Hadamard distortion of `pred` and its cost with the mode bits.
  fn score(&self, mode: &ModeInfo, pred: &[T]) -> (Distortion, f64) {
    let bs = self.cu.size;
    let (w, h) = (bs.width(), bs.height());
    let org = self.fs.luma_residual_source().region(self.cu.area);
    let pred = PlaneRegion::from_slice(pred, w, h);
    let had = get_had_2sad(&org, &pred, w, h);

    let mut ctx = self.ctx.clone();
    let mut wc = WriterCounter::new();
    ContextWriter::new(&mut ctx).write_intra_luma_mode(
      &mut wc,
      mode,
      self.mpms,
      bs,
      self.syntax.mip_allowed,
      self.syntax.mrl_allowed,
    );
    (had, self.rd.calc_had_cost(wc.tell_frac(), had))
  }
}

/// Ranked hypotheses handed to the RD loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct Preselection {
  /// Candidates for full RD, cheapest first; forced entries trail at
  /// cost 0.
  pub rd_list: CandidateList<ModeInfo>,
  /// Cheapest plain Hadamard costs, MIP costs discounted.
  pub had_list: CandidateList<ModeInfo>,
  pub num_full_rd: usize,
}

struct Prescreen<'c, T: Pixel> {
  sel: Preselection,
  cache: &'c mut PredBufCache<T>,
  num_had: usize,
}

impl<T: Pixel> Prescreen<'_, T> {
  fn test<P: IntraPredictor<T>>(
    &mut self, env: &PreselectEnv<'_, T, P>, edge: &IntraEdge,
    mode: ModeInfo, max_rd: usize, had_weight: f64,
  ) -> f64 {
    let (w, h) = (env.cu.size.width(), env.cu.size.height());
    predict_luma(
      env.predictor,
      edge,
      &mode,
      env.fs.bit_depth,
      w,
      h,
      self.cache.test_buf_mut(),
    );
    let (had, cost) = env.score(&mode, self.cache.test_buf());
    let pos = self.sel.rd_list.update(mode, cost, max_rd);
    self.cache.insert(pos, self.sel.rd_list.len());
    self.sel.had_list.update(mode, had as f64 * had_weight, self.num_had);
    cost
  }
}

/// Candidates kept for full RD once MIP joins the list.
fn num_full_rd_with_mip(n: usize, bs: BlockSize, fast_mip: u8) -> usize {
  if fast_mip > 0 {
    let min_log2 = floor_log2(bs.width().min(bs.height()));
    n + n.max(min_log2.saturating_sub(fast_mip as usize))
  } else {
    2 * n
  }
}

/// Builds the ranked list of luma hypotheses worth a full RD trial.
///
/// Predictions rendered on the way stay in `cache`, in list order.
#[profiling::function]
pub(crate) fn estimate_luma_rd_mode_list<T: Pixel, P: IntraPredictor<T>>(
  env: &PreselectEnv<'_, T, P>, cache: &mut PredBufCache<T>,
) -> Preselection {
  let cu = env.cu;
  let bs = cu.size;
  let (w, h) = (bs.width(), bs.height());
  let ss = &env.cfg.speed_settings;
  let rec = env.fs.rec_plane(ComponentId::Y);
  let bd = env.fs.bit_depth;

  // MIP widens the list before the regular passes fill it
  let mut n = num_modes_for_full_rd(bs, ss.full_search);
  if env.test_mip {
    n = num_full_rd_with_mip(n, bs, ss.fast_mip);
  }
  cache.prepare(w, h, n + 1);
  let mut ps = Prescreen {
    sel: Preselection::default(),
    cache,
    num_had: if env.test_mip { 6 } else { 3 },
  };

  let edge = IntraEdge::new(rec, cu.area, 0, bd);
  let mut satd_checked = [false; NUM_LUMA_MODE];
  for mode in 0..NUM_LUMA_MODE as u8 {
    // odd angles wait for the refinement around the winners
    if mode > DC_IDX && mode & 1 == 1 {
      continue;
    }
    ps.test(env, &edge, ModeInfo::regular(mode), n, 1.0);
    satd_checked[mode as usize] = true;
  }

  let parents: ArrayVec<ModeInfo, FAST_UDI_MAX_RDMODE_NUM> =
    ps.sel.rd_list.items().iter().take(n).copied().collect();
  for parent in parents {
    let m = parent.mode_id;
    if m <= DC_IDX + 1 || m >= VDIA_IDX {
      continue;
    }
    for neighbour in [m - 1, m + 1] {
      if !satd_checked[neighbour as usize] {
        ps.test(env, &edge, ModeInfo::regular(neighbour), n, 1.0);
        satd_checked[neighbour as usize] = true;
      }
    }
  }

  if env.syntax.mrl_allowed {
    for &ref_line in &MULTI_REF_LINE_IDX[1..] {
      let edge = IntraEdge::new(rec, cu.area, ref_line as usize, bd);
      for &m in &env.mpms[1..] {
        ps.test(env, &edge, ModeInfo::mrl(m, ref_line), n, 1.0);
      }
    }
  }

  if env.test_mip {
    let num_mip = num_mip_modes(bs);
    let discount = env.cfg.tuning.mip_had_discount;
    let mut mip_had_cost = [f64::MAX; MAX_MIP_HYPOTHESES];
    for mode_full in 0..2 * num_mip {
      let transposed = mode_full >= num_mip;
      let mode_id = (mode_full % num_mip) as u8;
      let mode = ModeInfo::mip(mode_id, transposed);
      mip_had_cost[mode_full] = ps.test(env, &edge, mode, n + 1, discount);
    }
    let thr =
      1.0 + env.cfg.tuning.mip_slack_numerator / ((w * h) as f64).sqrt();
    let kept = reduce_had_cand_list(
      &mut ps.sel.rd_list,
      &mut n,
      thr,
      &mip_had_cost[..2 * num_mip],
      bs,
      ss.fast_mip > 0,
    );
    ps.cache.retain_positions(&kept);
  }

  if ss.fast_udi_use_mpm {
    for &m in env.mpms {
      let mode = ModeInfo::regular(m);
      if !ps.sel.rd_list.contains(&mode) && ps.sel.rd_list.push(mode, 0.0) {
        n += 1;
      }
    }
  }

  ps.sel.num_full_rd = n.min(ps.sel.rd_list.len());
  trace!(
    "preselect {}x{}: {} for RD, {:?}",
    w,
    h,
    ps.sel.num_full_rd,
    ps.sel.rd_list.items()
  );
  ps.sel
}

/// Thins a list mixing regular and MIP hypotheses: at most three regular
/// ones, MIP ones while few or close to the best, and the cheapest MIP
/// modes of larger blocks always represented.
///
/// Returns the kept positions of the incoming list in their new order;
/// `n` becomes the new length.
fn reduce_had_cand_list(
  list: &mut CandidateList<ModeInfo>, n: &mut usize, thr: f64,
  mip_had_cost: &[f64], bs: BlockSize, fast_mip: bool,
) -> ArrayVec<usize, FAST_UDI_MAX_RDMODE_NUM> {
  let max_per_type = *n >> 1;
  let min_cost = list.costs().first().copied().unwrap_or(0.0);
  let mut keep_one_mip = list.len() > *n;
  let end = list.len().saturating_sub(if keep_one_mip { 0 } else { 1 });

  let mut kept = ArrayVec::new();
  let mut reduced = CandidateList::new();
  let (mut num_conv, mut num_mip) = (0, 0);
  for idx in 0..end {
    let Some((mode, cost)) = list.get(idx) else {
      break;
    };
    let add = if !mode.mip_flag {
      num_conv < 3
    } else {
      let add =
        num_mip < max_per_type || cost < thr * min_cost || keep_one_mip;
      keep_one_mip = false;
      add
    };
    if add {
      if mode.mip_flag {
        num_mip += 1;
      } else {
        num_conv += 1;
      }
      reduced.push(mode, cost);
      kept.push(idx);
    }
  }

  if bs.width() > 8 && bs.height() > 8 {
    let transp_off = mip_had_cost.len() / 2;
    let mut sorted: CandidateList<usize> = CandidateList::new();
    for mode in 0..3 {
      let cand = if mip_had_cost[mode + transp_off] < mip_had_cost[mode] {
        mode + transp_off
      } else {
        mode
      };
      sorted.update(cand, mip_had_cost[cand], 3);
    }
    let listed = reduced.len();
    for &cand in sorted.items() {
      let transposed = cand >= transp_off;
      let mode_id = if transposed { cand - transp_off } else { cand };
      let mode = ModeInfo::mip(mode_id as u8, transposed);
      if !reduced.items()[..listed].contains(&mode) {
        reduced.push(mode, 0.0);
        if fast_mip {
          break;
        }
      }
    }
  }

  *list = reduced;
  *n = list.len();
  kept
}

#[cfg(test)]
mod test {
  use super::*;
  use interpolate_name::interpolate_test;
  use pretty_assertions::assert_eq;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;
  use std::cell::RefCell;

  fn mip(mode: u8) -> ModeInfo {
    ModeInfo::mip(mode, false)
  }

  fn fill(dst: &mut PlaneRegionMut<'_, u8>, v: u8) {
    for row in dst.rows_iter_mut() {
      row.fill(v);
    }
  }

  /// Paints each regular mode a fixed level and records the ones rendered
  /// on the nearest reference line.
  #[derive(Default)]
  struct LevelPredictor {
    levels: Vec<(u8, u8)>,
    rendered: RefCell<Vec<u8>>,
  }

  impl LevelPredictor {
    fn level(&self, mode: u8) -> u8 {
      self.levels.iter().find(|l| l.0 == mode).map_or(208, |l| l.1)
    }
  }

  impl IntraPredictor<u8> for LevelPredictor {
    fn predict_intra(
      &self, edge: &IntraEdge, mode: u8, _bit_depth: usize,
      dst: &mut PlaneRegionMut<'_, u8>,
    ) {
      if edge.ref_line == 0 {
        self.rendered.borrow_mut().push(mode);
      }
      fill(dst, self.level(mode));
    }

    fn predict_mip(
      &self, _edge: &IntraEdge, _mode: u8, _transposed: bool,
      _bit_depth: usize, dst: &mut PlaneRegionMut<'_, u8>,
    ) {
      fill(dst, 208);
    }

    fn predict_lm(
      &self, _fs: &FrameState<u8>, _comp: ComponentId, _rect: Rect,
      _mode: u8, dst: &mut PlaneRegionMut<'_, u8>,
    ) {
      fill(dst, 128);
    }
  }

  fn preselect<P: IntraPredictor<u8>>(
    fs: &FrameState<u8>, cu: &CodingUnit, cfg: &IntraSearchConfig,
    predictor: &P, test_mip: bool,
  ) -> Preselection {
    let mpms = get_intra_mpms(&fs.modes, cu.area, cfg.ctu_log2());
    let ctx = ContextState::default();
    let env = PreselectEnv {
      fs,
      cu,
      cfg,
      rd: RdCost::new(1.0, 1.0),
      mpms: &mpms,
      syntax: LumaSyntax::new(cfg, cu),
      predictor,
      ctx: &ctx,
      test_mip,
    };
    let mut cache = PredBufCache::new();
    estimate_luma_rd_mode_list(&env, &mut cache)
  }

  fn coding_unit(x: usize, y: usize, w: usize, h: usize) -> CodingUnit {
    let cs = ChromaSampling::Cs420;
    CodingUnit::new(Rect::new(x, y, w, h), cs, 32).unwrap()
  }

  fn textured_frame() -> FrameState<u8> {
    let mut fs = FrameState::new(64, 64, ChromaSampling::Cs420, 8);
    let mut ra = ChaChaRng::from_seed([0; 32]);
    let plane = &mut fs.input[0];
    let w = plane.cfg.width;
    for (i, p) in plane.data.iter_mut().enumerate() {
      let (x, y) = (i % w, i / w);
      *p = (((x * 3 + y * 2) & 0x7f) + ra.gen_range(0..64)) as u8;
    }
    fs
  }

  /// Six even angles ahead of everything else, none of them an MPM.
  fn ranked_angles() -> LevelPredictor {
    let ranked = [10u8, 14, 22, 30, 40, 58];
    let levels = ranked.iter().zip(1..).map(|(&m, r)| (m, 128 + 4 * r));
    LevelPredictor { levels: levels.collect(), ..Default::default() }
  }

  #[test]
  fn mip_widens_angular_refinement() {
    let mut fs = FrameState::new(64, 64, ChromaSampling::Cs420, 8);
    fs.input[0].fill(128);
    let cu = coding_unit(16, 16, 16, 16);
    let cfg = IntraSearchConfig { mrl: false, ..Default::default() };

    let with_mip = ranked_angles();
    preselect(&fs, &cu, &cfg, &with_mip, true);
    let rendered = with_mip.rendered.borrow();
    for m in [9, 11, 13, 15, 21, 23, 29, 31, 39, 41, 57, 59] {
      assert!(rendered.contains(&m), "mode {} not refined", m);
    }

    let without_mip = ranked_angles();
    preselect(&fs, &cu, &cfg, &without_mip, false);
    let rendered = without_mip.rendered.borrow();
    for m in [9, 11, 13, 15, 21, 23] {
      assert!(rendered.contains(&m), "mode {} not refined", m);
    }
    for m in [29, 31, 39, 41, 57, 59] {
      assert!(!rendered.contains(&m), "mode {} refined", m);
    }
  }

  #[test]
  fn mip_widens_the_regular_list() {
    let mut fs = FrameState::new(64, 64, ChromaSampling::Cs420, 8);
    fs.input[0].fill(128);
    let cu = coding_unit(16, 16, 16, 16);
    let mut cfg = IntraSearchConfig { mrl: false, ..Default::default() };
    cfg.speed_settings.fast_udi_use_mpm = false;

    // MIP predictions are far off; the reduction keeps the three best
    // regular modes of the widened list
    let sel = preselect(&fs, &cu, &cfg, &ranked_angles(), true);
    let regular: Vec<u8> = sel
      .rd_list
      .items()
      .iter()
      .filter(|m| !m.mip_flag)
      .map(|m| m.mode_id)
      .collect();
    assert_eq!(regular, vec![10, 14, 22]);
    assert_eq!(sel.num_full_rd, sel.rd_list.len());
  }

  #[interpolate_test(tools_off_8x8, 8, 8)]
  #[interpolate_test(tools_off_16x16, 16, 16)]
  #[interpolate_test(tools_off_32x8, 32, 8)]
  fn disabled_tools_list_only_regular_modes(w: usize, h: usize) {
    let fs = textured_frame();
    let cu = coding_unit(16, 16, w, h);
    let mut cfg =
      IntraSearchConfig { mip: false, mrl: false, ..Default::default() };
    cfg.speed_settings.fast_udi_use_mpm = false;

    let sel = preselect(&fs, &cu, &cfg, &RefIntraPredictor, false);
    assert!(!sel.rd_list.is_empty());
    for m in sel.rd_list.items() {
      assert!(!m.mip_flag);
      assert_eq!(m.ref_line_idx, 0);
    }
    let bound = num_modes_for_full_rd(cu.size, false);
    assert!(sel.rd_list.len() <= bound);
    assert_eq!(sel.num_full_rd, sel.rd_list.len());
  }

  #[interpolate_test(top_row_8x8, 8, 8)]
  #[interpolate_test(top_row_16x16, 16, 16)]
  fn top_ctu_row_lists_only_the_nearest_line(w: usize, h: usize) {
    let fs = textured_frame();
    let cu = coding_unit(16, 0, w, h);
    let cfg = IntraSearchConfig::default();

    let sel = preselect(&fs, &cu, &cfg, &RefIntraPredictor, true);
    assert!(sel.rd_list.items().iter().all(|m| m.ref_line_idx == 0));
    assert!(sel.had_list.items().iter().all(|m| m.ref_line_idx == 0));
  }

  #[test]
  fn reduction_caps_regular_modes() {
    let mut list = CandidateList::new();
    for (i, m) in [0u8, 1, 50, 18, 34].iter().enumerate() {
      list.update(ModeInfo::regular(*m), i as f64, 8);
    }
    list.update(mip(4), 10.0, 8);
    let mut n = 4;
    let kept = reduce_had_cand_list(
      &mut list,
      &mut n,
      1.1,
      &[f64::MAX; 12],
      BlockSize::BLOCK_8X8,
      false,
    );
    // the list outgrew n, so the trailing MIP entry is kept
    assert_eq!(kept.as_slice(), &[0, 1, 2, 5]);
    assert_eq!(n, 4);
    assert_eq!(list.items()[3], mip(4));
  }

  #[test]
  fn reduction_drops_far_mip_modes() {
    let mut list = CandidateList::new();
    list.update(ModeInfo::regular(0), 100.0, 8);
    for (i, cost) in [101.0, 102.0, 150.0, 160.0].iter().enumerate() {
      list.update(mip(i as u8), *cost, 8);
    }
    list.update(ModeInfo::regular(1), 200.0, 8);
    let mut n = 6;
    let kept = reduce_had_cand_list(
      &mut list,
      &mut n,
      1.2,
      &[f64::MAX; 12],
      BlockSize::BLOCK_8X8,
      false,
    );
    // three MIP slots by count, none by threshold; the last entry is
    // excluded from the scan
    assert_eq!(kept.as_slice(), &[0, 1, 2, 3]);
    assert_eq!(n, 4);
  }

  #[test]
  fn reduction_appends_best_mip_of_large_blocks() {
    let mut list = CandidateList::new();
    list.update(ModeInfo::regular(0), 1.0, 8);
    list.update(ModeInfo::regular(1), 2.0, 8);
    list.update(ModeInfo::regular(50), 3.0, 8);
    let mut mip_had = [50.0; 12];
    mip_had[1] = 30.0;
    mip_had[6 + 2] = 20.0;
    let mut n = 2;
    reduce_had_cand_list(
      &mut list,
      &mut n,
      1.1,
      &mip_had,
      BlockSize::BLOCK_16X16,
      true,
    );
    assert_eq!(
      list.items(),
      &[
        ModeInfo::regular(0),
        ModeInfo::regular(1),
        ModeInfo::regular(50),
        ModeInfo::mip(2, true),
      ]
    );
    assert_eq!(list.costs()[3], 0.0);
    assert_eq!(n, 4);
  }

  #[test]
  fn fast_mip_grows_full_rd_count() {
    assert_eq!(num_full_rd_with_mip(3, BlockSize::BLOCK_32X32, 0), 6);
    assert_eq!(num_full_rd_with_mip(3, BlockSize::BLOCK_32X32, 1), 7);
    assert_eq!(num_full_rd_with_mip(3, BlockSize::BLOCK_8X8, 4), 6);
  }
}
