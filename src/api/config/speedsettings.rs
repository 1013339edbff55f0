// Copyright (c) 2020-2021, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use log::warn;

use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Highest supported fast MIP level.
pub const MAX_FAST_MIP: u8 = 4;

/// Contains the speed settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedSettings {
  /// Reduces the matrix-weighted prediction search. 0 doubles the RD list
  /// for MIP candidates; higher levels enlarge it less, restrict MIP to
  /// squarer blocks and append a single MIP mode.
  ///
  /// Higher is faster.
  pub fast_mip: u8,

  /// Secondary transform search: 1 tries every index, 2 stops the LFNST
  /// loop at the first loss, 3 also gives up LFNST when DCT-II is far off
  /// the best known cost and caps the search at index 1.
  ///
  /// Higher is faster.
  pub lfnst_speed: u8,

  /// Alternate kernel search: 1 tries every candidate, 2 abandons it when
  /// DCT-II is far off the best known cost and stops between kernel
  /// groups.
  pub mts_mode: u8,

  /// Prunes the luma RD list against the inter Hadamard cost in inter
  /// slices.
  ///
  /// Enabled is faster.
  pub use_pb_intra_fast: bool,

  /// Early stop of the luma RD loop against the inter cost in
  /// intra-constrained regions of inter slices: 1 stops at 1.5x the inter
  /// cost, 2 after the first candidate.
  pub fast_local_dual_tree: u8,

  /// Adds the most probable modes missing from the RD list.
  ///
  /// Enabled is slower.
  pub fast_udi_use_mpm: bool,

  /// Sends a fixed, larger number of luma candidates to full RD.
  ///
  /// Enabled is slower.
  pub full_search: bool,
}

impl Default for SpeedSettings {
  /// The default settings are equivalent to speed 0
  fn default() -> Self {
    SpeedSettings {
      fast_mip: 0,
      lfnst_speed: 1,
      mts_mode: 1,
      use_pb_intra_fast: false,
      fast_local_dual_tree: 0,
      fast_udi_use_mpm: true,
      full_search: false,
    }
  }
}

impl SpeedSettings {
  /// Set the speed setting according to a numeric speed preset.
  pub fn from_preset(speed: usize) -> Self {
    // The default settings are equivalent to speed 0
    let mut settings = SpeedSettings::default();

    if speed >= 1 {
      settings.mts_mode = 2;
    }

    if speed >= 2 {
      settings.fast_mip = 1;
    }

    if speed >= 3 {
      settings.lfnst_speed = 2;
      settings.use_pb_intra_fast = true;
    }

    if speed >= 4 {
      settings.fast_local_dual_tree = 1;
    }

    if speed >= 5 {
      settings.fast_mip = 2;
    }

    if speed >= 6 {
      settings.lfnst_speed = 3;
    }

    if speed >= 7 {
      settings.fast_mip = 3;
    }

    if speed >= 8 {
      settings.fast_local_dual_tree = 2;
    }

    if speed >= 9 {
      settings.fast_mip = MAX_FAST_MIP;
    }

    if speed >= 10 {
      settings.fast_udi_use_mpm = false;
    }

    settings
  }

  /// Brings every level into its supported range.
  pub fn clamped(self) -> Self {
    let mut s = self;
    if s.fast_mip > MAX_FAST_MIP {
      warn!("fast_mip {} clamped to {}", s.fast_mip, MAX_FAST_MIP);
      s.fast_mip = MAX_FAST_MIP;
    }
    if !(1..=3).contains(&s.lfnst_speed) {
      let v = s.lfnst_speed.clamp(1, 3);
      warn!("lfnst_speed {} clamped to {}", s.lfnst_speed, v);
      s.lfnst_speed = v;
    }
    if !(1..=2).contains(&s.mts_mode) {
      let v = s.mts_mode.clamp(1, 2);
      warn!("mts_mode {} clamped to {}", s.mts_mode, v);
      s.mts_mode = v;
    }
    if s.fast_local_dual_tree > 2 {
      warn!(
        "fast_local_dual_tree {} clamped to 2",
        s.fast_local_dual_tree
      );
      s.fast_local_dual_tree = 2;
    }
    s
  }
}

impl fmt::Display for SpeedSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "fast_mip={} lfnst_speed={} mts_mode={} pb_intra_fast={} \
       fast_local_dual_tree={} mpm={} full_search={}",
      self.fast_mip,
      self.lfnst_speed,
      self.mts_mode,
      self.use_pb_intra_fast,
      self.fast_local_dual_tree,
      self.fast_udi_use_mpm,
      self.full_search
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use interpolate_name::interpolate_test;

  #[interpolate_test(speed_0, 0)]
  #[interpolate_test(speed_5, 5)]
  #[interpolate_test(speed_10, 10)]
  #[interpolate_test(speed_200, 200)]
  fn presets_are_in_range(speed: usize) {
    let s = SpeedSettings::from_preset(speed);
    assert_eq!(s, s.clamped());
  }

  #[test]
  fn presets_only_get_faster() {
    let slow = SpeedSettings::from_preset(0);
    let fast = SpeedSettings::from_preset(10);
    assert!(fast.fast_mip > slow.fast_mip);
    assert!(fast.lfnst_speed > slow.lfnst_speed);
    assert!(fast.use_pb_intra_fast && !slow.use_pb_intra_fast);
    assert_eq!(slow, SpeedSettings::default());
  }

  #[test]
  fn out_of_range_levels_are_clamped() {
    let s = SpeedSettings {
      fast_mip: 9,
      lfnst_speed: 0,
      mts_mode: 7,
      fast_local_dual_tree: 3,
      ..Default::default()
    }
    .clamped();
    assert_eq!(
      (s.fast_mip, s.lfnst_speed, s.mts_mode, s.fast_local_dual_tree),
      (MAX_FAST_MIP, 1, 2, 2)
    );
  }
}
