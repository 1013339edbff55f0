// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use criterion::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use vvrdo::dist;
use vvrdo::prelude::*;

const DIST_BENCH_SET: &[(usize, usize)] =
  &[(4, 4), (8, 8), (16, 16), (32, 32), (64, 64), (16, 4), (32, 8)];

const SEARCH_BENCH_SET: &[(usize, usize)] =
  &[(8, 8), (16, 16), (32, 32), (16, 8)];

fn new_plane(ra: &mut ChaChaRng, width: usize, height: usize) -> Plane<u8> {
  let mut p = Plane::new(width, height, 0, 0);
  for px in p.data.iter_mut() {
    *px = ra.gen();
  }
  p
}

type DistFn =
  fn(&PlaneRegion<'_, u8>, &PlaneRegion<'_, u8>, usize, usize) -> u32;

fn run_dist_bench(c: &mut Criterion, name: &str, func: DistFn) {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let org = new_plane(&mut ra, 64, 64);
  let rec = new_plane(&mut ra, 64, 64);

  let mut group = c.benchmark_group(name);
  for &(w, h) in DIST_BENCH_SET {
    let rect = Rect::new(0, 0, w, h);
    let (a, b) = (org.region(rect), rec.region(rect));
    group.bench_with_input(
      BenchmarkId::from_parameter(format!("{w}x{h}")),
      &(w, h),
      |bench, &(w, h)| bench.iter(|| black_box(func(&a, &b, w, h))),
    );
  }
  group.finish();
}

fn get_sad(c: &mut Criterion) {
  run_dist_bench(c, "get_sad", dist::get_sad::<u8>);
}

fn get_satd(c: &mut Criterion) {
  run_dist_bench(c, "get_satd", dist::get_satd::<u8>);
}

fn textured_frame(ra: &mut ChaChaRng) -> FrameState<u8> {
  let mut fs = FrameState::new(64, 64, ChromaSampling::Cs420, 8);
  for plane in fs.input.iter_mut() {
    let w = plane.cfg.width;
    for (i, p) in plane.data.iter_mut().enumerate() {
      let (x, y) = (i % w, i / w);
      *p = (((x + 2 * y) & 0x7f) + ra.gen_range(0..32)) as u8;
    }
  }
  fs
}

fn luma_search(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let fs = textured_frame(&mut ra);
  let slice = SliceParams::new(32, 58.0);
  let mut search =
    IntraSearch::<u8>::new(IntraSearchConfig::default()).unwrap();

  let mut group = c.benchmark_group("search_luma_mode");
  for &(w, h) in SEARCH_BENCH_SET {
    let area = Rect::new(16, 16, w, h);
    let cu = CodingUnit::new(area, ChromaSampling::Cs420, 32).unwrap();
    group.bench_with_input(
      BenchmarkId::from_parameter(format!("{w}x{h}")),
      &cu,
      |bench, cu| {
        bench.iter_batched(
          || (fs.clone(), cu.clone(), ContextState::default()),
          |(mut fs, mut cu, mut ctx)| {
            let hints = LumaHints::default();
            black_box(
              search
                .search_luma_mode(&mut fs, &mut cu, &mut ctx, &slice, &hints)
                .unwrap(),
            )
          },
          BatchSize::SmallInput,
        )
      },
    );
  }
  group.finish();
}

criterion_group!(dist_benches, get_sad, get_satd);
criterion_group!(search_benches, luma_search);
criterion_main!(dist_benches, search_benches);
