// Copyright (c) 2001-2016, Alliance for Open Media. All rights reserved
// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Binary arithmetic coding models and a bit-counting writer.
//!
//! Nothing here emits a bitstream; the writer only accumulates the
//! fractional cost of the bins it is handed.

use std::sync::OnceLock;

use crate::serialize::{Deserialize, Serialize};

/// Fractional bits are counted in units of `2^-FRAC_BITS_PRECISION`.
pub const FRAC_BITS_PRECISION: u32 = 15;
pub const FRAC_BITS_SCALE: f64 = 1.0 / (1u32 << FRAC_BITS_PRECISION) as f64;
/// One whole bit in fractional units.
pub const FRAC_BITS_ONE: u64 = 1 << FRAC_BITS_PRECISION;

const PROB_BITS: u32 = 15;
const PROB_ONE: i32 = 1 << PROB_BITS;
const ENTROPY_TABLE_BITS: u32 = 9;
const FAST_RATE: u32 = 4;
const SLOW_RATE: u32 = 7;

fn entropy_table() -> &'static [u32; 1 << ENTROPY_TABLE_BITS] {
  static TABLE: OnceLock<[u32; 1 << ENTROPY_TABLE_BITS]> = OnceLock::new();
  TABLE.get_or_init(|| {
    let n = 1 << ENTROPY_TABLE_BITS;
    let mut t = [0; 1 << ENTROPY_TABLE_BITS];
    for (i, e) in t.iter_mut().enumerate() {
      let p = (i as f64 + 0.5) / n as f64;
      *e = (-p.log2() * FRAC_BITS_ONE as f64).round() as u32;
    }
    t
  })
}

/// Adaptive probability of one context-coded bin, tracked in two windows.
#[derive(
  Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct BinModel {
  fast: u16,
  slow: u16,
}

impl Default for BinModel {
  fn default() -> Self {
    BinModel::new(1 << (PROB_BITS - 1))
  }
}

impl BinModel {
  /// Model whose initial probability of a 1 bin is `p_one / 2^15`.
  pub const fn new(p_one: u16) -> Self {
    BinModel { fast: p_one, slow: p_one }
  }

  #[inline(always)]
  pub const fn prob_one(&self) -> u32 {
    (self.fast as u32 + self.slow as u32) >> 1
  }

  /// Estimated cost of coding `bin`, in fractional bits.
  #[inline(always)]
  pub fn frac_bits(&self, bin: bool) -> u32 {
    let p1 = self.prob_one();
    let p = if bin { p1 } else { PROB_ONE as u32 - p1 };
    let idx = (p >> (PROB_BITS - ENTROPY_TABLE_BITS))
      .min((1 << ENTROPY_TABLE_BITS) - 1);
    entropy_table()[idx as usize]
  }

  #[inline(always)]
  pub fn update(&mut self, bin: bool) {
    let target = if bin { PROB_ONE - 1 } else { 0 };
    let step = |p: u16, rate: u32| {
      let p = p as i32;
      (p + ((target - p) >> rate)).clamp(1, PROB_ONE - 1) as u16
    };
    self.fast = step(self.fast, FAST_RATE);
    self.slow = step(self.slow, SLOW_RATE);
  }
}

/// Sink for coded bins.
pub trait Writer {
  /// Codes `bin` with `model` and adapts the model.
  fn bin(&mut self, bin: bool, model: &mut BinModel);
  /// Codes the low `bits` bits of `value` at equal probability.
  fn bypass(&mut self, value: u32, bits: u32);
  /// Fractional bits written so far.
  fn tell_frac(&self) -> u64;
  fn reset(&mut self);
}

/// Writer that only counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterCounter {
  frac_bits: u64,
}

impl WriterCounter {
  pub const fn new() -> Self {
    WriterCounter { frac_bits: 0 }
  }
}

impl Writer for WriterCounter {
  #[inline(always)]
  fn bin(&mut self, bin: bool, model: &mut BinModel) {
    self.frac_bits += model.frac_bits(bin) as u64;
    model.update(bin);
  }

  #[inline(always)]
  fn bypass(&mut self, _value: u32, bits: u32) {
    self.frac_bits += bits as u64 * FRAC_BITS_ONE;
  }

  fn tell_frac(&self) -> u64 {
    self.frac_bits
  }

  fn reset(&mut self) {
    self.frac_bits = 0;
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn even_model_costs_about_one_bit() {
    let m = BinModel::default();
    let bits = m.frac_bits(true) as f64 * FRAC_BITS_SCALE;
    assert!((bits - 1.0).abs() < 0.01, "{bits}");
    assert_eq!(m.frac_bits(true), m.frac_bits(false));
  }

  #[test]
  fn model_adapts_towards_observed_bins() {
    let mut w = WriterCounter::new();
    let mut m = BinModel::default();
    let first = m.frac_bits(true);
    for _ in 0..64 {
      w.bin(true, &mut m);
    }
    assert!(m.frac_bits(true) < first / 3);
    assert!(m.frac_bits(false) > first * 2);
    assert!(w.tell_frac() < 64 * FRAC_BITS_ONE);
  }

  #[test]
  fn bypass_bins_cost_whole_bits() {
    let mut w = WriterCounter::new();
    w.bypass(5, 3);
    assert_eq!(w.tell_frac(), 3 * FRAC_BITS_ONE);
    w.reset();
    assert_eq!(w.tell_frac(), 0);
  }
}
