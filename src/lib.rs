// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Intra mode rate-distortion search for VVC-style block encoders.
//!
//! [`IntraSearch`] picks the luma mode of a coding unit among the regular
//! directions, matrix-based modes and extended reference lines, together
//! with its transform, then the chroma mode with joint Cb-Cr coding.
//! Everything else an encoder needs (partitioning, bitstream writing,
//! inter prediction) stays with the caller.

#![deny(bare_trait_objects)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::float_cmp)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::unreadable_literal)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::map_unwrap_or)]

mod serialize {
  cfg_if::cfg_if! {
    if #[cfg(feature="serialize")] {
      pub use serde::*;
    } else {
      pub use noop_proc_macro::{Deserialize, Serialize};
    }
  }
}

pub mod context;
pub mod dist;
pub mod ec;
pub mod frame;
pub mod partition;
pub mod predict;
pub mod quantize;
pub mod rdo;
pub mod transform;
pub mod util;

mod api;
pub mod encoder;

pub use crate::api::*;
pub use crate::encoder::IntraSearch;
pub use crate::frame::{ChromaSampling, FrameState, Plane, Rect};
pub use crate::partition::{CodingUnit, ComponentId};
pub use crate::util::Pixel;

/// Commonly used types and traits.
pub mod prelude {
  pub use crate::api::*;
  pub use crate::context::ContextState;
  pub use crate::encoder::IntraSearch;
  pub use crate::frame::*;
  pub use crate::partition::*;
  pub use crate::predict::{IntraPredictor, ModeInfo, RefIntraPredictor};
  pub use crate::util::Pixel;
}
