// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::ec::{BinModel, Writer};
use crate::partition::{BlockSize, ChannelType, ComponentId, IspMode};
use crate::predict::*;
use crate::transform::MtsIdx;
use crate::util::*;

const LAST_CTX: usize = 20;
const SIG_CTX: usize = 12;
const LEVEL_CTX: usize = 8;
/// Rice prefix length past which the remainder switches to Exp-Golomb.
const RICE_PREFIX_MAX: u32 = 5;

#[inline(always)]
const fn ch_idx(ch: ChannelType) -> usize {
  match ch {
    ChannelType::Luma => 0,
    ChannelType::Chroma => 1,
  }
}

/// Probability state of every intra syntax element.
///
/// A plain value: trials clone it and compare or hash snapshots freely.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextState {
  pub mip_flag: [BinModel; 4],
  pub mrl_idx: [BinModel; 2],
  pub mpm_flag: BinModel,
  pub planar_flag: [BinModel; 2],
  pub chroma_pred_mode: BinModel,
  pub cclm_flag: BinModel,
  pub cclm_idx: BinModel,
  pub cbf_luma: [BinModel; 4],
  pub cbf_cb: [BinModel; 2],
  pub cbf_cr: [BinModel; 3],
  pub joint_cb_cr: [BinModel; 3],
  pub transform_skip: [BinModel; 2],
  pub mts_idx: [BinModel; 4],
  pub lfnst_idx: [BinModel; 3],
  pub last_x_prefix: [[BinModel; LAST_CTX]; 2],
  pub last_y_prefix: [[BinModel; LAST_CTX]; 2],
  pub sig: [[BinModel; SIG_CTX]; 2],
  pub gt1: [[BinModel; LEVEL_CTX]; 2],
  pub par: [[BinModel; LEVEL_CTX]; 2],
  pub gt3: [[BinModel; LEVEL_CTX]; 2],
}

impl Default for ContextState {
  fn default() -> Self {
    let even = BinModel::default();
    ContextState {
      mip_flag: [BinModel::new(10240); 4],
      mrl_idx: [BinModel::new(8192); 2],
      mpm_flag: BinModel::new(22528),
      planar_flag: [BinModel::new(18432); 2],
      chroma_pred_mode: BinModel::new(12288),
      cclm_flag: BinModel::new(14336),
      cclm_idx: even,
      cbf_luma: [BinModel::new(20480); 4],
      cbf_cb: [BinModel::new(12288); 2],
      cbf_cr: [BinModel::new(12288), BinModel::new(20480), even],
      joint_cb_cr: [BinModel::new(10240); 3],
      transform_skip: [BinModel::new(8192); 2],
      mts_idx: [BinModel::new(10240), even, even, even],
      lfnst_idx: [BinModel::new(12288), BinModel::new(12288), even],
      last_x_prefix: [[BinModel::new(20480); LAST_CTX]; 2],
      last_y_prefix: [[BinModel::new(20480); LAST_CTX]; 2],
      sig: [[BinModel::new(14336); SIG_CTX]; 2],
      gt1: [[BinModel::new(12288); LEVEL_CTX]; 2],
      par: [[even; LEVEL_CTX]; 2],
      gt3: [[BinModel::new(12288); LEVEL_CTX]; 2],
    }
  }
}

#[derive(Clone, Debug)]
pub struct ContextWriterCheckpoint {
  pub fc: ContextState,
}

/// Codes intra syntax elements against a [`ContextState`].
pub struct ContextWriter<'a> {
  pub fc: &'a mut ContextState,
}

/// Group index of a last-position coordinate.
#[inline]
fn last_group(pos: usize) -> usize {
  if pos < 4 {
    pos
  } else {
    let l = floor_log2(pos);
    2 * l + ((pos >> (l - 1)) & 1)
  }
}

/// First coordinate of group `g`.
#[inline]
fn last_group_start(g: usize) -> usize {
  if g < 4 {
    g
  } else {
    (2 + (g & 1)) << ((g >> 1) - 1)
  }
}

/// Codes `v` in `0..n` with a truncated binary code.
fn write_truncated_binary<W: Writer>(w: &mut W, v: u32, n: u32) {
  debug_assert!(v < n);
  let k = n.ilog2();
  let u = (1 << (k + 1)) - n;
  if v < u {
    w.bypass(v, k);
  } else {
    w.bypass(v + u, k + 1);
  }
}

/// Golomb-Rice code with an Exp-Golomb escape.
fn write_golomb_rice<W: Writer>(w: &mut W, v: u32, rice: u32) {
  let q = v >> rice;
  if q < RICE_PREFIX_MAX {
    w.bypass((1 << (q + 1)) - 2, q + 1);
    w.bypass(v, rice);
  } else {
    let esc = q - RICE_PREFIX_MAX + 1;
    let len = esc.ilog2();
    w.bypass(0, RICE_PREFIX_MAX + len);
    w.bypass(esc, len + 1);
    w.bypass(v, rice);
  }
}

impl<'a> ContextWriter<'a> {
  pub fn new(fc: &'a mut ContextState) -> Self {
    ContextWriter { fc }
  }

  pub fn checkpoint(&self) -> ContextWriterCheckpoint {
    ContextWriterCheckpoint { fc: self.fc.clone() }
  }

  pub fn rollback(&mut self, checkpoint: &ContextWriterCheckpoint) {
    self.fc.clone_from(&checkpoint.fc);
  }

  /// Luma intra mode: MIP, reference line, MPM flags and index or the
  /// truncated-binary remainder.
  pub fn write_intra_luma_mode<W: Writer>(
    &mut self, w: &mut W, mode: &ModeInfo,
    mpms: &[u8; NUM_MOST_PROBABLE_MODES], bs: BlockSize, mip_allowed: bool,
    mrl_allowed: bool,
  ) {
    if mip_allowed {
      let ctx = if bs.w_log2.abs_diff(bs.h_log2) > 1 { 3 } else { 0 };
      w.bin(mode.mip_flag, &mut self.fc.mip_flag[ctx]);
      if mode.mip_flag {
        w.bypass(mode.mip_transposed as u32, 1);
        write_truncated_binary(
          w,
          mode.mode_id as u32,
          num_mip_modes(bs) as u32,
        );
        return;
      }
    }
    if mrl_allowed {
      w.bin(mode.ref_line_idx != 0, &mut self.fc.mrl_idx[0]);
      if mode.ref_line_idx != 0 {
        w.bin(mode.ref_line_idx == 2, &mut self.fc.mrl_idx[1]);
      }
    }

    let mpm_idx = mpms.iter().position(|&m| m == mode.mode_id);
    if mode.ref_line_idx == 0 {
      w.bin(mpm_idx.is_some(), &mut self.fc.mpm_flag);
    }
    match mpm_idx {
      Some(idx) => {
        if mode.ref_line_idx == 0 {
          let ctx = (mode.isp_mode == IspMode::NotIsp) as usize;
          w.bin(idx > 0, &mut self.fc.planar_flag[ctx]);
        }
        if idx > 0 {
          // truncated unary over the remaining five
          let v = idx as u32 - 1;
          let len = if v < 4 { v + 1 } else { 4 };
          w.bypass((1 << v.min(4)) - 1, len);
        }
      }
      None => {
        let below = mpms.iter().filter(|&&m| m < mode.mode_id).count();
        let rank = mode.mode_id - below as u8;
        write_truncated_binary(
          w,
          rank as u32,
          (NUM_LUMA_MODE - NUM_MOST_PROBABLE_MODES) as u32,
        );
      }
    }
  }

  /// Chroma intra mode, as its position in the candidate list.
  pub fn write_intra_chroma_mode<W: Writer>(
    &mut self, w: &mut W, mode: u8, cands: &[u8; NUM_CHROMA_MODE],
    cclm_enabled: bool,
  ) {
    if cclm_enabled {
      w.bin(is_lm_mode(mode), &mut self.fc.cclm_flag);
      if is_lm_mode(mode) {
        w.bin(mode != LM_CHROMA_IDX, &mut self.fc.cclm_idx);
        if mode != LM_CHROMA_IDX {
          w.bypass((mode == MDLM_T_IDX) as u32, 1);
        }
        return;
      }
    }
    w.bin(mode != DM_CHROMA_IDX, &mut self.fc.chroma_pred_mode);
    if mode != DM_CHROMA_IDX {
      let idx = cands.iter().take(4).position(|&m| m == mode).unwrap_or(0);
      w.bypass(idx as u32, 2);
    }
  }

  /// Coded-block flag; `prev_cbf` is the Cb flag when coding Cr.
  pub fn write_cbf<W: Writer>(
    &mut self, w: &mut W, comp: ComponentId, cbf: bool, prev_cbf: bool,
  ) {
    let model = match comp {
      ComponentId::Y => &mut self.fc.cbf_luma[0],
      ComponentId::Cb => &mut self.fc.cbf_cb[0],
      ComponentId::Cr => &mut self.fc.cbf_cr[prev_cbf as usize],
    };
    w.bin(cbf, model);
  }

  /// Joint Cb-Cr flag, present when either chroma flag is set.
  pub fn write_joint_cb_cr<W: Writer>(
    &mut self, w: &mut W, cbf_cb: bool, cbf_cr: bool, joint: bool,
  ) {
    debug_assert!(cbf_cb || cbf_cr);
    let ctx = 2 * cbf_cb as usize + cbf_cr as usize - 1;
    w.bin(joint, &mut self.fc.joint_cb_cr[ctx]);
  }

  pub fn write_transform_skip<W: Writer>(
    &mut self, w: &mut W, ch: ChannelType, skip: bool,
  ) {
    w.bin(skip, &mut self.fc.transform_skip[ch_idx(ch)]);
  }

  /// Alternate-kernel index of a luma block that does not skip.
  pub fn write_mts_idx<W: Writer>(&mut self, w: &mut W, mts: MtsIdx) {
    debug_assert_ne!(mts, MtsIdx::Skip);
    w.bin(mts.is_alternate(), &mut self.fc.mts_idx[0]);
    if mts.is_alternate() {
      let v = mts as usize - MtsIdx::Dst7Dst7 as usize;
      for i in 0..3 {
        w.bin(v > i, &mut self.fc.mts_idx[i + 1]);
        if v == i {
          break;
        }
      }
    }
  }

  pub fn write_lfnst_idx<W: Writer>(
    &mut self, w: &mut W, idx: u8, sep_tree: bool,
  ) {
    w.bin(idx > 0, &mut self.fc.lfnst_idx[sep_tree as usize]);
    if idx > 0 {
      w.bin(idx == 2, &mut self.fc.lfnst_idx[2]);
    }
  }

  fn write_last_coord<W: Writer>(
    &mut self, w: &mut W, pos: usize, n: usize, ch: ChannelType,
    is_y: bool,
  ) {
    let log2n = floor_log2(n);
    let (offset, shift) = match ch {
      ChannelType::Luma => {
        let l = log2n.max(2);
        (3 * (l - 2) + ((l - 1) >> 2), (l + 1) >> 2)
      }
      ChannelType::Chroma => (0, log2n.saturating_sub(2).min(2)),
    };
    let models = if is_y {
      &mut self.fc.last_y_prefix[ch_idx(ch)]
    } else {
      &mut self.fc.last_x_prefix[ch_idx(ch)]
    };
    let g = last_group(pos);
    let max_g = last_group(n - 1);
    for i in 0..g {
      w.bin(true, &mut models[(offset + (i >> shift)).min(LAST_CTX - 1)]);
    }
    if g < max_g {
      w.bin(false, &mut models[(offset + (g >> shift)).min(LAST_CTX - 1)]);
    }
    if g > 3 {
      let suffix_len = ((g >> 1) - 1) as u32;
      w.bypass((pos - last_group_start(g)) as u32, suffix_len);
    }
  }

  /// Quantised levels of one transform block, from the last non-zero
  /// position back to DC.
  pub fn write_residual<W: Writer>(
    &mut self, w: &mut W, levels: &[i32], width: usize, height: usize,
    scan: &[u16], ch: ChannelType,
  ) {
    let Some(last) = scan.iter().rposition(|&p| levels[p as usize] != 0)
    else {
      return;
    };
    let last_pos = scan[last] as usize;
    self.write_last_coord(w, last_pos % width, width, ch, false);
    self.write_last_coord(w, last_pos / width, height, ch, true);

    let c = ch_idx(ch);
    let abs_at = |x: usize, y: usize| -> u32 {
      if x < width && y < height {
        levels[y * width + x].unsigned_abs()
      } else {
        0
      }
    };
    for (i, &p) in scan[..=last].iter().enumerate().rev() {
      let p = p as usize;
      let (x, y) = (p % width, p / width);
      let template = [
        abs_at(x + 1, y),
        abs_at(x + 2, y),
        abs_at(x, y + 1),
        abs_at(x, y + 2),
        abs_at(x + 1, y + 1),
      ];
      let nz = template.iter().filter(|&&a| a != 0).count().min(3);
      let sum: u32 = template.iter().sum();
      let d = x + y;
      let level = levels[p].unsigned_abs();

      if i != last {
        let band = if d < 2 {
          0
        } else if d < 5 {
          1
        } else {
          2
        };
        w.bin(level != 0, &mut self.fc.sig[c][band * 4 + nz]);
      }
      if level == 0 {
        continue;
      }
      let lctx = nz + if d == 0 { 4 } else { 0 };
      w.bin(level > 1, &mut self.fc.gt1[c][lctx]);
      if level > 1 {
        w.bin((level - 2) & 1 == 1, &mut self.fc.par[c][lctx]);
        w.bin(level > 3, &mut self.fc.gt3[c][lctx]);
        if level > 3 {
          let rice = if sum < 7 {
            0
          } else if sum < 14 {
            1
          } else {
            2
          };
          write_golomb_rice(w, (level - 4) >> 1, rice);
        }
      }
      w.bypass((levels[p] < 0) as u32, 1);
    }
  }
}
