// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use log::{debug, trace};

use crate::api::*;
use crate::context::ContextState;
use crate::encoder::pred_cache::PredBufCache;
use crate::encoder::preselect::*;
use crate::encoder::tx_search::*;
use crate::encoder::IntraSearch;
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::util::Pixel;

/// Largest RD list the inter Hadamard pruning still looks at.
const NUM_HAD_CAND_PB_INTRA: usize = 3;

/// Cuts the RD list down to the candidates whose Hadamard cost beats the
/// inter one, keeping the cheapest MIP hypothesis in play.
///
/// Returns `false` when no candidate is left, in which case the list is
/// untouched.
fn prune_against_inter<T: Pixel>(
  sel: &mut Preselection, cache: &mut PredBufCache<T>, inter_had: u64,
  ratio: f64,
) -> bool {
  let had = sel.had_list.costs();
  let thr = inter_had as f64 * ratio;
  let mut max_size = None;
  for k in (0..NUM_HAD_CAND_PB_INTRA).rev() {
    if had.len() < k + 1 || had[k] > thr {
      max_size = Some(k);
    }
  }
  let Some(max_size) = max_size else {
    return true;
  };
  if max_size == 0 {
    return false;
  }

  let best_mip =
    sel.rd_list.items().iter().position(|m| m.mip_flag).and_then(|idx| {
      sel.rd_list.get(idx).map(|(mode, cost)| (idx, mode, cost))
    });
  sel.rd_list.truncate(max_size);
  match best_mip {
    Some((idx, mode, cost)) if idx >= max_size => {
      sel.rd_list.push(mode, cost);
      if idx < cache.len() {
        cache.swap(max_size, idx);
        cache.reduce_to(max_size + 1);
      } else {
        cache.reduce_to(max_size);
      }
    }
    _ => cache.reduce_to(max_size),
  }
  sel.num_full_rd = sel.rd_list.len();
  true
}

/// Whether a constrained-intra area can stop trying luma candidates once
/// the best one costs `best_cost`.
fn local_dual_tree_stop(
  level: u8, best_cost: f64, cost_inter: Option<f64>, ratio: f64,
) -> bool {
  if level == 0 || best_cost == f64::MAX {
    return false;
  }
  match cost_inter {
    Some(cost_inter) => level == 2 || best_cost > cost_inter * ratio,
    None => false,
  }
}

impl<T: Pixel, P: IntraPredictor<T>> IntraSearch<T, P> {
  /// Chooses the luma intra hypothesis of `cu` and its transform.
  ///
  /// The winner is committed: reconstruction to `fs`, mode and transform
  /// data to `cu`, the entropy state after coding it to `ctx`, and its
  /// direction to the decoded mode map. Nothing is committed when the
  /// search defers to inter coding.
  ///
  /// # Errors
  ///
  /// - `UnsupportedBlockSize` for blocks larger than a transform block or
  ///   the coding tree unit.
  /// - `NoLumaCandidate` if the RD loop accepted nothing.
  #[profiling::function]
  pub fn search_luma_mode(
    &mut self, fs: &mut FrameState<T>, cu: &mut CodingUnit,
    ctx: &mut ContextState, slice: &SliceParams, hints: &LumaHints,
  ) -> Result<LumaOutcome, SearchError> {
    let IntraSearch {
      cfg,
      pool,
      coder,
      cache,
      predictor,
      area_costs,
      luma_weights,
      scratch,
    } = self;
    let bs = cu.size;
    let (w, h) = (bs.width(), bs.height());
    let unsupported =
      SearchError::UnsupportedBlockSize { width: w, height: h };
    if w > cfg.max_tb_size || h > cfg.max_tb_size || !pool.contains(bs) {
      return Err(unsupported);
    }
    let ss = &cfg.speed_settings;
    let rd = slice.rd_cost();
    let inter_constrained = cu.cons_intra && !slice.is_intra;
    let cost_inter = if inter_constrained {
      area_costs.find(cu.area).or(hints.inter_cost)
    } else {
      None
    };

    let mip_allowed = cfg.mip
      && (cu.lfnst_idx == 0 || allow_lfnst_with_mip(bs))
      && w <= MIP_MAX_WIDTH
      && h <= MIP_MAX_HEIGHT;
    let size_thr = 8 >> ss.fast_mip.saturating_sub(2);
    let test_mip = mip_allowed && w <= size_thr * h && h <= size_thr * w;
    cu.lfnst_idx = 0;
    cu.luma_decided = false;

    let mpms = get_intra_mpms(&fs.modes, cu.area, cfg.ctu_log2());
    let syntax = LumaSyntax::new(cfg, cu);
    let ctx_start = ctx.clone();

    let mut sel = {
      let env = PreselectEnv {
        fs: &*fs,
        cu: &*cu,
        cfg: &*cfg,
        rd,
        mpms: &mpms,
        syntax,
        predictor: &*predictor,
        ctx: &ctx_start,
        test_mip,
      };
      estimate_luma_rd_mode_list(&env, cache)
    };

    if ss.use_pb_intra_fast
      && !slice.is_intra
      && sel.rd_list.len() < NUM_LUMA_MODE
    {
      if let Some(inter_had) = hints.inter_had {
        if !prune_against_inter(
          &mut sel,
          cache,
          inter_had,
          cfg.tuning.pb_intra_ratio,
        ) {
          debug!(
            "luma {}x{} at ({}, {}): no candidate beats inter",
            w, h, cu.area.x, cu.area.y
          );
          return Ok(LumaOutcome::DeferToInter);
        }
      }
    }

    let (best, temp, saves) =
      pool.best_temp_and_save(bs).ok_or(unsupported)?;
    best.init_struct_data();
    let n = w * h;
    if scratch.len() < n {
      scratch.resize(n, T::default());
    }

    for idx in 0..sel.num_full_rd.min(sel.rd_list.len()) {
      let Some((mode, _)) = sel.rd_list.get(idx) else {
        break;
      };
      mode.assert_legal();
      cu.apply_mode_info(&mode);

      let pred: &[T] = match cache.get(idx) {
        Some(pred) => pred,
        None => {
          let edge = IntraEdge::new(
            fs.rec_plane(ComponentId::Y),
            cu.area,
            mode.ref_line_idx as usize,
            fs.bit_depth,
          );
          predict_luma(predictor, &edge, &mode, fs.bit_depth, w, h, scratch);
          &scratch[..n]
        }
      };

      temp.init_struct_data();
      let env = LumaTxEnv {
        fs: &*fs,
        cu: &*cu,
        cfg: &*cfg,
        slice,
        luma_weights: luma_weights.as_slice(),
        mpms: &mpms,
        syntax,
        best_cost_so_far: hints.best_cost,
      };
      code_luma_qt(&env, coder, pred, &ctx_start, temp, &mut saves[0]);
      trace!(
        "luma {:?}: cost {} dist {} bits {}",
        mode,
        temp.cost,
        temp.dist,
        temp.frac_bits
      );

      if temp.cost < best.cost {
        std::mem::swap(best, temp);
      }

      if inter_constrained
        && local_dual_tree_stop(
          ss.fast_local_dual_tree,
          best.cost,
          cost_inter,
          cfg.tuning.inter_cost_stop_ratio,
        )
      {
        break;
      }
    }

    if best.cost == f64::MAX {
      return Err(SearchError::NoLumaCandidate);
    }

    cu.apply_mode_info(&best.mode);
    cu.lfnst_idx = best.lfnst_idx;
    cu.tu.copy_component_from(&best.tu, 0);
    let reco = PlaneRegion::from_slice(&best.reco[0], w, h);
    fs.rec_plane_mut(ComponentId::Y).copy_region_from(cu.area, &reco);
    ctx.clone_from(&best.ctx);
    let map_dir =
      if best.mode.mip_flag { PLANAR_IDX } else { best.mode.mode_id };
    fs.modes.set(cu.area, map_dir);
    cu.luma_decided = true;

    let decision = LumaDecision {
      mode: best.mode,
      lfnst_idx: best.lfnst_idx,
      mts: best.mts,
      cost: best.cost,
      dist: best.dist,
      frac_bits: best.frac_bits,
      cbf: best.tu.cbf[0],
    };
    debug!(
      "luma {}x{} at ({}, {}): {:?} lfnst {} {:?} cost {}",
      w,
      h,
      cu.area.x,
      cu.area.y,
      decision.mode,
      decision.lfnst_idx,
      decision.mts,
      decision.cost
    );
    Ok(LumaOutcome::Chosen(decision))
  }
}
