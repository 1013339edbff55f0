// Copyright (c) 2020-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use thiserror::Error;

use crate::predict::NUM_CHROMA_MODE;

mod encoder;
pub use encoder::*;

mod speedsettings;
pub use speedsettings::*;

/// Largest alternate kernel count, the size of the kernel set.
pub const MAX_MTS_INTRA_CAND: usize = 4;

/// Enumeration of possible invalid configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[non_exhaustive]
pub enum InvalidConfig {
  /// The bit depth is unsupported.
  #[error("invalid bit depth {0} (expected 8, 10 or 12)")]
  InvalidBitDepth(usize),
  /// The bit depth does not fit the sample type.
  #[error("bit depth {actual} does not fit the sample type (max {max})")]
  BitDepthExceedsPixel {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// The CTU size is unsupported.
  #[error("invalid CTU size {0} (expected 32, 64 or 128)")]
  InvalidCtuSize(usize),
  /// The maximal transform size is unsupported.
  #[error("invalid max transform size {actual} (expected 32 or 64, <= {ctu})")]
  InvalidMaxTbSize {
    /// The actual value.
    actual: usize,
    /// The configured CTU size.
    ctu: usize,
  },
  /// More alternate kernels requested than exist.
  #[error("invalid MTS candidate count {actual} (expected <= {max})")]
  InvalidMtsCandidates {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// More chroma candidates dropped than exist.
  #[error("invalid reduced chroma mode count {actual} (expected < {max})")]
  InvalidChromaReducedModes {
    /// The actual value.
    actual: usize,
    /// The candidate count.
    max: usize,
  },
  /// A tuning ratio is not a positive finite number.
  #[error("invalid tuning ratio {name} = {value} (expected > 0)")]
  InvalidTuningRatio {
    /// The field name.
    name: &'static str,
    /// The actual value.
    value: f64,
  },
}

impl IntraSearchConfig {
  /// Validates the configuration.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidConfig` if a size, a bit depth, a candidate count or
  ///   a tuning ratio is out of range.
  pub fn validate(&self) -> Result<(), InvalidConfig> {
    use InvalidConfig::*;

    if ![8, 10, 12].contains(&self.bit_depth) {
      return Err(InvalidBitDepth(self.bit_depth));
    }
    if ![32, 64, 128].contains(&self.ctu_size) {
      return Err(InvalidCtuSize(self.ctu_size));
    }
    if ![32, 64].contains(&self.max_tb_size)
      || self.max_tb_size > self.ctu_size
    {
      return Err(InvalidMaxTbSize {
        actual: self.max_tb_size,
        ctu: self.ctu_size,
      });
    }
    if self.mts_intra_max_cand > MAX_MTS_INTRA_CAND {
      return Err(InvalidMtsCandidates {
        actual: self.mts_intra_max_cand,
        max: MAX_MTS_INTRA_CAND,
      });
    }
    if self.tuning.chroma_reduced_modes >= NUM_CHROMA_MODE {
      return Err(InvalidChromaReducedModes {
        actual: self.tuning.chroma_reduced_modes,
        max: NUM_CHROMA_MODE,
      });
    }
    for (name, value) in self.tuning.ratios() {
      if !(value.is_finite() && value > 0.0) {
        return Err(InvalidTuningRatio { name, value });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn presets_validate() {
    for speed in 0..=10 {
      let cfg = IntraSearchConfig::with_speed_preset(speed);
      assert_eq!(cfg.validate(), Ok(()));
    }
  }

  #[test]
  fn rejects_out_of_range_sizes() {
    let mut cfg = IntraSearchConfig { ctu_size: 16, ..Default::default() };
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidCtuSize(16)));
    cfg.ctu_size = 32;
    assert_eq!(
      cfg.validate(),
      Err(InvalidConfig::InvalidMaxTbSize { actual: 64, ctu: 32 })
    );
    cfg.max_tb_size = 32;
    cfg.bit_depth = 9;
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidBitDepth(9)));
  }

  #[test]
  fn rejects_bad_counts_and_ratios() {
    let cfg =
      IntraSearchConfig { mts_intra_max_cand: 5, ..Default::default() };
    assert!(matches!(
      cfg.validate(),
      Err(InvalidConfig::InvalidMtsCandidates { actual: 5, .. })
    ));

    let mut cfg = IntraSearchConfig::default();
    cfg.tuning.inter_cost_stop_ratio = 0.0;
    assert!(matches!(
      cfg.validate(),
      Err(InvalidConfig::InvalidTuningRatio {
        name: "inter_cost_stop_ratio",
        ..
      })
    ));

    let mut cfg = IntraSearchConfig::default();
    cfg.tuning.chroma_reduced_modes = NUM_CHROMA_MODE;
    assert!(cfg.validate().is_err());
  }
}
