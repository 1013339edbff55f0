// Copyright (c) 2018-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use log::info;

use crate::api::{IntraSearchConfig, InvalidConfig};
use crate::frame::Rect;
use crate::predict::{IntraPredictor, RefIntraPredictor};
use crate::util::Pixel;

pub mod reshape;
pub mod residual;
pub mod snapshot;

mod chroma;
mod luma;
mod pred_cache;
mod preselect;
mod scipu;
mod tx_search;

pub use self::scipu::NUM_INTER_CU_INFO_SAVE;
pub use self::tx_search::{
  TxHypothesis, TxOutcome, TxPolicyParams, TxSearchPolicy, TxTrial,
  TxVerdict,
};

use self::pred_cache::PredBufCache;
use self::residual::ResidualCoder;
use self::scipu::CuAreaCosts;
use self::snapshot::SnapshotPool;

/// Intra mode decision of one encoder thread.
///
/// Owns every scratch structure the luma and chroma searches reuse from
/// one coding unit to the next. Searches on different coding units must
/// not overlap, so a thread keeps its own instance.
pub struct IntraSearch<T: Pixel, P: IntraPredictor<T> = RefIntraPredictor> {
  cfg: IntraSearchConfig,
  pool: SnapshotPool<T>,
  coder: ResidualCoder,
  cache: PredBufCache<T>,
  predictor: P,
  area_costs: CuAreaCosts,
  luma_weights: Vec<u32>,
  scratch: Vec<T>,
}

impl<T: Pixel> IntraSearch<T> {
  /// Creates a search using the reference predictors.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidConfig` if `cfg` does not validate or its bit depth
  ///   does not fit `T`.
  pub fn new(cfg: IntraSearchConfig) -> Result<Self, InvalidConfig> {
    Self::with_predictor(cfg, RefIntraPredictor)
  }
}

impl<T: Pixel, P: IntraPredictor<T>> IntraSearch<T, P> {
  /// Creates a search rendering its hypotheses with `predictor`.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidConfig` if `cfg` does not validate or its bit depth
  ///   does not fit `T`.
  pub fn with_predictor(
    mut cfg: IntraSearchConfig, predictor: P,
  ) -> Result<Self, InvalidConfig> {
    cfg.validate()?;
    if cfg.bit_depth > T::max_bit_depth() {
      return Err(InvalidConfig::BitDepthExceedsPixel {
        actual: cfg.bit_depth,
        max: T::max_bit_depth(),
      });
    }
    cfg.speed_settings = cfg.speed_settings.clamped();
    info!(
      "intra search: {}-bit {:?}, ctu {}, {}",
      cfg.bit_depth, cfg.chroma_sampling, cfg.ctu_size, cfg.speed_settings
    );

    let pool = SnapshotPool::new(cfg.ctu_log2() as u8, cfg.chroma_sampling);
    let luma_weights = reshape::luma_level_weights(cfg.bit_depth);
    Ok(IntraSearch {
      cfg,
      pool,
      coder: ResidualCoder::new(),
      cache: PredBufCache::new(),
      predictor,
      area_costs: CuAreaCosts::new(),
      luma_weights,
      scratch: Vec::new(),
    })
  }

  pub fn config(&self) -> &IntraSearchConfig {
    &self.cfg
  }

  /// Records the inter cost of the coding unit at `area`, for the early
  /// exit of intra-constrained regions.
  pub fn save_cu_area_cost(&mut self, area: Rect, cost: f64) {
    self.area_costs.save(area, cost);
  }

  pub fn find_inter_cu_cost(&self, area: Rect) -> Option<f64> {
    self.area_costs.find(area)
  }

  /// Forgets the inter costs of the previous intra-constrained region.
  pub fn reset_cu_area_costs(&mut self) {
    self.area_costs.reset();
  }
}
