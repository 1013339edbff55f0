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
use crate::context::{ContextState, ContextWriter};
use crate::dist::get_had_2sad;
use crate::ec::{Writer, WriterCounter};
use crate::encoder::reshape::{scale_chroma_resi_fwd, ReshapeTable};
use crate::encoder::residual::*;
use crate::encoder::snapshot::Snapshot;
use crate::encoder::IntraSearch;
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::rdo::*;
use crate::transform::*;
use crate::util::{CastFromPrimitive, Pixel};

/// Chroma lambda is boosted above this slice QP when joint coding is on.
const CHROMA_BOOST_MIN_QP: i32 = 18;
/// Chroma residual scaling only applies to blocks larger than this.
const CHROMA_SCALE_MIN_AREA: usize = 4;

/// Chroma scale of a block from the mean of the reconstructed luma just
/// above and left of it; mid-gray when neither is available.
fn chroma_scale_for<T: Pixel>(
  fs: &FrameState<T>, area: Rect, table: &ReshapeTable,
) -> i32 {
  let rec = fs.rec_plane(ComponentId::Y);
  let (pw, ph) = (rec.cfg.width, rec.cfg.height);
  let mut sum = 0i64;
  let mut count = 0i64;
  if area.y > 0 {
    for x in area.x..(area.x + area.width).min(pw) {
      sum += i32::cast_from(rec.p(x, area.y - 1)) as i64;
      count += 1;
    }
  }
  if area.x > 0 {
    for y in area.y..(area.y + area.height).min(ph) {
      sum += i32::cast_from(rec.p(area.x - 1, y)) as i64;
      count += 1;
    }
  }
  let avg = if count > 0 {
    (sum + count / 2) / count
  } else {
    1 << (fs.bit_depth - 1)
  };
  table.chroma_adj(avg as i32)
}

/// Renders chroma `mode` (already resolved from the derived mode) for
/// `comp` into the packed buffer `dst`.
fn predict_chroma<T: Pixel, P: IntraPredictor<T>>(
  predictor: &P, fs: &FrameState<T>, rect: Rect, comp: ComponentId,
  mode: u8, dst: &mut [T],
) {
  let (w, h) = (rect.width, rect.height);
  let mut dst = PlaneRegionMut::from_slice(&mut dst[..w * h], w, h);
  if is_lm_mode(mode) {
    predictor.predict_lm(fs, comp, rect, mode, &mut dst);
  } else {
    let edge = IntraEdge::new(fs.rec_plane(comp), rect, 0, fs.bit_depth);
    predictor.predict_intra(&edge, mode, fs.bit_depth, &mut dst);
  }
}

/// Chroma syntax of one coding unit.
#[derive(Debug, Clone, Copy)]
struct ChromaSyntax {
  cands: [u8; NUM_CHROMA_MODE],
  cclm: bool,
  joint_cbcr: bool,
  /// Chroma carries its own secondary transform index.
  lfnst: bool,
  sep_tree: bool,
  width: usize,
  height: usize,
}

impl ChromaSyntax {
  fn write<W: Writer>(
    &self, cw: &mut ContextWriter, w: &mut W, mode: u8, tu: &TransformUnit,
    lfnst_idx: u8, past_dc: bool, scan: &[u16],
  ) {
    let (width, height) = (self.width, self.height);
    cw.write_intra_chroma_mode(w, mode, &self.cands, self.cclm);

    let mask = tu.joint_cb_cr;
    if mask != 0 {
      let (cb, cr) = (mask >> 1 != 0, mask & 1 != 0);
      cw.write_cbf(w, ComponentId::Cb, cb, false);
      cw.write_cbf(w, ComponentId::Cr, cr, cb);
      cw.write_joint_cb_cr(w, cb, cr, true);
      let coded = if cb { ComponentId::Cb } else { ComponentId::Cr };
      cw.write_residual(
        w,
        &tu.coeffs[coded as usize],
        width,
        height,
        scan,
        ChannelType::Chroma,
      );
    } else {
      let (cb, cr) = (tu.cbf[1], tu.cbf[2]);
      cw.write_cbf(w, ComponentId::Cb, cb, false);
      if cb {
        cw.write_residual(
          w,
          &tu.coeffs[1],
          width,
          height,
          scan,
          ChannelType::Chroma,
        );
      }
      cw.write_cbf(w, ComponentId::Cr, cr, cb);
      if self.joint_cbcr && (cb || cr) {
        cw.write_joint_cb_cr(w, cb, cr, false);
      }
      if cr {
        cw.write_residual(
          w,
          &tu.coeffs[2],
          width,
          height,
          scan,
          ChannelType::Chroma,
        );
      }
    }

    if self.sep_tree && self.lfnst && past_dc {
      cw.write_lfnst_idx(w, lfnst_idx, true);
    }
  }
}

/// Fixed inputs of the chroma trials of one coding unit.
struct ChromaEnv<'a, T: Pixel> {
  fs: &'a FrameState<T>,
  rect: Rect,
  rd: RdCost,
  qp: [i32; 2],
  chroma_adj: i32,
  boost: bool,
  joint_sign_neg: bool,
  dist: DistMode<'a, T>,
  syntax: ChromaSyntax,
  ctx_start: &'a ContextState,
}

/// Cost of one trial and the entropy state it ends in.
struct Trial {
  cost: f64,
  dist: Distortion,
  past_dc: bool,
  ctx: ContextState,
}

impl<'a, T: Pixel> ChromaEnv<'a, T> {
  fn hypothesis<'b>(
    &'b self, comp: ComponentId, dir: u8, lfnst_idx: u8, joint: u8,
    pred: &'b [T], pred_cr: Option<&'b [T]>,
  ) -> TuHypothesis<'b, T> {
    let input = |c: ComponentId| self.fs.input_plane(c).region(self.rect);
    let src_cr = pred_cr.map(|_| input(ComponentId::Cr));
    TuHypothesis {
      comp,
      width: self.rect.width,
      height: self.rect.height,
      bit_depth: self.fs.bit_depth,
      qp: self.qp[comp as usize - 1],
      mts: MtsIdx::Dct2Dct2,
      lfnst_idx,
      lfnst_transpose: lfnst_transposed(dir),
      joint_cb_cr: joint,
      joint_sign_neg: self.joint_sign_neg,
      chroma_adj: self.chroma_adj,
      lambda: self.rd.lambda(),
      boost_chroma: self.boost,
      pred,
      pred_cr,
      src: input(comp),
      src_cr,
      org: input(comp),
      org_cr: src_cr,
      dist: self.dist,
    }
  }

  fn cost(
    &self, coder: &ResidualCoder, mode: u8, tu: &TransformUnit,
    lfnst_idx: u8, dist: Distortion, past_dc: bool,
  ) -> Trial {
    let mut ctx = self.ctx_start.clone();
    let mut wc = WriterCounter::new();
    self.syntax.write(
      &mut ContextWriter::new(&mut ctx),
      &mut wc,
      mode,
      tu,
      lfnst_idx,
      past_dc,
      coder.scan(self.rect.width, self.rect.height),
    );
    let mut cost = self.rd.calc_rd_cost(wc.tell_frac(), dist);
    let cbf = tu.cbf[1] || tu.cbf[2];
    if lfnst_idx > 0 && !past_dc && cbf {
      cost = f64::MAX;
    }
    Trial { cost, dist, past_dc, ctx }
  }

  /// Codes Cb and Cr apart into `temp`.
  fn code_separate(
    &self, coder: &mut ResidualCoder, mode: u8, dir: u8, lfnst_idx: u8,
    held: &Snapshot<T>, temp: &mut Snapshot<T>,
  ) -> Trial {
    let nc = self.rect.area();
    let mut dist: Distortion = 0;
    let mut past_dc = false;
    for comp in ComponentId::CHROMA {
      let c = comp as usize;
      let hyp =
        self.hypothesis(comp, dir, lfnst_idx, 0, &held.pred[c][..nc], None);
      let r =
        coder.code_tu_block(&hyp, &mut temp.tu, &mut temp.reco[c][..nc], None);
      dist = dist.saturating_add(self.rd.scale_chroma_dist(r.dist));
      past_dc |= r.last_scan_pos.map_or(false, |p| p > 0);
    }
    self.cost(coder, mode, &temp.tu, lfnst_idx, dist, past_dc)
  }

  /// Codes both channels as one joint residual under `mask` into `joint`.
  fn code_joint(
    &self, coder: &mut ResidualCoder, mode: u8, dir: u8, lfnst_idx: u8,
    mask: u8, held: &Snapshot<T>, joint: &mut Snapshot<T>,
  ) -> Option<Trial> {
    let nc = self.rect.area();
    let hyp = self.hypothesis(
      ComponentId::Cb,
      dir,
      lfnst_idx,
      mask,
      &held.pred[1][..nc],
      Some(&held.pred[2][..nc]),
    );
    joint.tu.clear();
    let (reco_cb, reco_cr) = joint.reco.split_at_mut(2);
    let r = coder.code_tu_block(
      &hyp,
      &mut joint.tu,
      &mut reco_cb[1][..nc],
      Some(&mut reco_cr[0][..nc]),
    );
    if r.dist >= MAX_DISTORTION {
      return None;
    }
    let past_dc = r.last_scan_pos.map_or(false, |p| p > 0);
    let dist = self.rd.scale_chroma_dist(r.dist);
    Some(self.cost(coder, mode, &joint.tu, lfnst_idx, dist, past_dc))
  }

  /// Tries the joint `masks` against the separate trial left in `temp`.
  /// A joint trial replaces the chroma of `temp` only when strictly
  /// cheaper; none runs unless the separate trial coded a channel.
  fn try_joint(
    &self, coder: &mut ResidualCoder, (mode, dir, lfnst_idx): (u8, u8, u8),
    masks: &[u8], held: &Snapshot<T>, joint: &mut Snapshot<T>,
    temp: &mut Snapshot<T>, separate: Trial,
  ) -> Trial {
    let mut trial = separate;
    if !temp.tu.cbf[1] && !temp.tu.cbf[2] {
      return trial;
    }
    for &mask in masks {
      let Some(jt) =
        self.code_joint(coder, mode, dir, lfnst_idx, mask, held, joint)
      else {
        continue;
      };
      if jt.cost < trial.cost {
        for c in 1..3 {
          temp.copy_component_from(joint, c);
        }
        trial = jt;
      }
    }
    trial
  }
}

impl<T: Pixel, P: IntraPredictor<T>> IntraSearch<T, P> {
  /// Chooses the chroma intra mode of a coding unit whose luma is decided,
  /// joint Cb-Cr coding included, and commits it to `cu`, `fs` and `ctx`.
  ///
  /// # Errors
  ///
  /// - `NoChromaPlanes` on monochrome content.
  /// - `LumaNotDecided` before [`search_luma_mode`] committed a decision.
  ///
  /// [`search_luma_mode`]: IntraSearch::search_luma_mode
  #[profiling::function]
  pub fn search_chroma_mode(
    &mut self, fs: &mut FrameState<T>, cu: &mut CodingUnit,
    ctx: &mut ContextState, slice: &SliceParams,
  ) -> Result<ChromaDecision, SearchError> {
    if !cu.chroma_sampling.has_chroma() {
      return Err(SearchError::NoChromaPlanes);
    }
    if !cu.luma_decided {
      return Err(SearchError::LumaNotDecided);
    }
    let IntraSearch { cfg, pool, coder, predictor, luma_weights, .. } = self;
    let bs = cu.size;
    let (best, temp, saves) = pool.best_temp_and_save(bs).ok_or(
      SearchError::UnsupportedBlockSize {
        width: bs.width(),
        height: bs.height(),
      },
    )?;
    let [_, joint, held] = saves;

    let rect = cu.comp_rect(ComponentId::Cb);
    let nc = rect.area();
    let (xdec, ydec) =
      cu.chroma_sampling.get_decimation().unwrap_or((0, 0));
    let luma_dir = cu.pu.intra_dir[0];
    let cands = get_intra_chroma_cand_modes(luma_dir, cu.mip_flag);
    let resolve = |mode: u8| {
      if mode == DM_CHROMA_IDX {
        chroma_dm(luma_dir, cu.mip_flag)
      } else {
        mode
      }
    };
    let ctx_start = ctx.clone();

    let chroma_adj = match &slice.reshaper {
      Some(table) if slice.scales_chroma() && nc > CHROMA_SCALE_MIN_AREA => {
        chroma_scale_for(fs, cu.area, table)
      }
      _ => 0,
    };
    let lfnst =
      cu.sep_tree && cfg.lfnst && lfnst_allowed(rect.width, rect.height);
    let env = ChromaEnv {
      fs: &*fs,
      rect,
      rd: slice.rd_cost(),
      qp: [
        slice.comp_qp(cu.qp, ComponentId::Cb),
        slice.comp_qp(cu.qp, ComponentId::Cr),
      ],
      chroma_adj,
      boost: cfg.joint_cbcr && slice.slice_qp > CHROMA_BOOST_MIN_QP,
      joint_sign_neg: slice.joint_cbcr_sign_neg,
      dist: if slice.luma_level_weighting {
        DistMode::Weighted {
          luma: fs.input_plane(ComponentId::Y).region(cu.area),
          xdec,
          ydec,
          weights: luma_weights.as_slice(),
        }
      } else {
        DistMode::Plain
      },
      syntax: ChromaSyntax {
        cands,
        cclm: cfg.cclm,
        joint_cbcr: cfg.joint_cbcr,
        lfnst,
        sep_tree: cu.sep_tree,
        width: rect.width,
        height: rect.height,
      },
      ctx_start: &ctx_start,
    };

    // Stage A: Hadamard prescreen of the directional and MDLM candidates
    let mut enabled = [true; NUM_CHROMA_MODE];
    if cfg.cclm {
      let mut order: [(f64, usize); NUM_CHROMA_MODE] =
        std::array::from_fn(|i| (0.0, i));
      for (idx, &mode) in cands.iter().enumerate() {
        if [LM_CHROMA_IDX, PLANAR_IDX, DM_CHROMA_IDX].contains(&mode) {
          continue;
        }
        let mut had = 0;
        for comp in ComponentId::CHROMA {
          let c = comp as usize;
          let (w, h) = (rect.width, rect.height);
          let buf = &mut held.pred[c];
          predict_chroma(&*predictor, env.fs, rect, comp, mode, buf);
          let org = env.fs.input_plane(comp).region(rect);
          let pred = PlaneRegion::from_slice(&held.pred[c][..nc], w, h);
          had += get_had_2sad(&org, &pred, w, h);
        }
        order[idx].0 = had as f64;
      }
      for i in 0..NUM_CHROMA_MODE {
        for j in i + 1..NUM_CHROMA_MODE {
          if order[j].0 < order[i].0 {
            order.swap(i, j);
          }
        }
      }
      let reduced = cfg.tuning.chroma_reduced_modes;
      for &(_, idx) in order.iter().rev().take(reduced) {
        enabled[idx] = false;
      }
    }

    // Stage B: full coding of the remaining candidates
    best.init_struct_data();
    let mut resi_cb = Vec::with_capacity(nc);
    let mut resi_cr = Vec::with_capacity(nc);
    for (idx, &mode) in cands.iter().enumerate() {
      if (is_lm_mode(mode) && !cfg.cclm) || !enabled[idx] {
        continue;
      }
      let dir = resolve(mode);
      let (w, h) = (rect.width, rect.height);
      for comp in ComponentId::CHROMA {
        let buf = &mut held.pred[comp as usize];
        predict_chroma(&*predictor, env.fs, rect, comp, dir, buf);
      }
      let ict_cands = if cfg.joint_cbcr {
        let input = |c: ComponentId| env.fs.input_plane(c).region(rect);
        let (pred_cb, pred_cr) = (&held.pred[1][..nc], &held.pred[2][..nc]);
        compute_residual(&input(ComponentId::Cb), pred_cb, w, h, &mut resi_cb);
        compute_residual(&input(ComponentId::Cr), pred_cr, w, h, &mut resi_cr);
        if chroma_adj != 0 {
          scale_chroma_resi_fwd(&mut resi_cb, chroma_adj);
          scale_chroma_resi_fwd(&mut resi_cr, chroma_adj);
        }
        select_ict_candidates(&resi_cb, &resi_cr, slice.joint_cbcr_sign_neg)
      } else {
        Default::default()
      };

      let end_lfnst = if lfnst { NUM_LFNST_KERNELS } else { 0 };
      for lfnst_idx in 0..=end_lfnst {
        temp.init_struct_data();
        let separate =
          env.code_separate(coder, mode, dir, lfnst_idx, held, temp);
        let trial = env.try_joint(
          coder,
          (mode, dir, lfnst_idx),
          &ict_cands,
          held,
          joint,
          temp,
          separate,
        );
        trace!(
          "chroma mode {} lfnst {} joint {}: cost {} dist {}",
          mode,
          lfnst_idx,
          temp.tu.joint_cb_cr,
          trial.cost,
          trial.dist
        );

        let coded = temp.tu.cbf[1] || temp.tu.cbf[2];
        if trial.cost < best.cost {
          temp.chroma_mode = mode;
          temp.lfnst_idx = lfnst_idx;
          temp.cost = trial.cost;
          temp.dist = trial.dist;
          temp.ctx = trial.ctx;
          std::mem::swap(best, temp);
        }
        if !coded || !trial.past_dc {
          break;
        }
      }
    }

    if best.cost == f64::MAX {
      return Err(SearchError::NoChromaCandidate);
    }

    for comp in ComponentId::CHROMA {
      let c = comp as usize;
      let src =
        PlaneRegion::from_slice(&best.reco[c][..nc], rect.width, rect.height);
      fs.rec_plane_mut(comp).copy_region_from(rect, &src);
      cu.tu.copy_component_from(&best.tu, c);
    }
    cu.pu.intra_dir[1] = best.chroma_mode;
    if cu.sep_tree {
      cu.lfnst_idx = best.lfnst_idx;
    }
    ctx.clone_from(&best.ctx);

    let decision = ChromaDecision {
      mode: best.chroma_mode,
      joint_cb_cr: best.tu.joint_cb_cr,
      lfnst_idx: cu.lfnst_idx,
      cost: best.cost,
      dist: best.dist,
      cbf: [best.tu.cbf[1], best.tu.cbf[2]],
    };
    debug!(
      "chroma at ({}, {}): mode {} joint {} cost {}",
      cu.area.x, cu.area.y, decision.mode, decision.joint_cb_cr, decision.cost
    );
    Ok(decision)
  }
}
