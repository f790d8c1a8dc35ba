//! Replay Operations Benchmarks
//!
//! Benchmarks for profile merging, test ordering and dead-code pruning.
//!
//! Run with: `cargo bench --bench replay_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use covreplay::syntax::parse_source;
use covreplay::{
    CoverageBlock, CoverageMode, CoverageProfile, MergedCoverage, Position, Pruner, SortStrategy,
    TestOrderer, TestProfiles,
};

fn profile(seed: u32, blocks: u32) -> CoverageProfile {
    CoverageProfile::from_blocks(
        CoverageMode::Count,
        (0..blocks).map(|i| {
            let line = (i * 7 + seed * 13) % 2000 + 1;
            CoverageBlock::new(
                format!("src/file{}.rs", i % 8),
                Position::new(line, 1),
                Position::new(line + 2, 10),
                (i % 4) + 1,
                (i + seed) % 3,
            )
        }),
    )
}

fn source(functions: usize) -> String {
    let mut src = String::new();
    for f in 0..functions {
        src.push_str(&format!("fn f{f}(c: bool) {{\n"));
        src.push_str("    let x = 1;\n");
        src.push_str("    if c {\n        a(x);\n    } else {\n        b();\n    }\n");
        src.push_str("    for i in 0..3 {\n        c(i);\n    }\n");
        src.push_str("}\n");
    }
    src
}

fn bench_profile_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile_merge");

    for count in [10, 50, 200] {
        let profiles: Vec<CoverageProfile> = (0..count).map(|s| profile(s, 500)).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_profiles")),
            &profiles,
            |bench, profiles| {
                bench.iter(|| {
                    let mut merged = MergedCoverage::new();
                    for p in profiles {
                        merged.merge(black_box(p));
                    }
                    black_box(merged);
                });
            },
        );
    }

    group.finish();
}

fn bench_test_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("test_ordering");

    let profiles: TestProfiles = (0..40)
        .map(|s| (format!("Test{s}"), profile(s, 200)))
        .collect();

    for strategy in SortStrategy::ALL {
        let orderer = TestOrderer::new(strategy);
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy.name()),
            &profiles,
            |bench, profiles| {
                bench.iter(|| black_box(orderer.order(black_box(profiles))));
            },
        );
    }

    group.finish();
}

fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");

    for functions in [10, 100, 400] {
        let src = source(functions);
        let lines = u32::try_from(src.lines().count()).unwrap_or(u32::MAX);
        // Every third line never executed
        let blocks = (1..=lines).map(|line| {
            CoverageBlock::new("f.rs", Position::new(line, 1), Position::new(line, 200), 1, u32::from(line % 3 != 0))
        });
        let merged = MergedCoverage::new().merged(&CoverageProfile::from_blocks(CoverageMode::Set, blocks));
        let Ok(tree) = parse_source("f.rs", &src) else {
            continue;
        };

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{functions}_functions")),
            &tree,
            |bench, tree| {
                bench.iter(|| black_box(Pruner::new(&merged).prune(tree.clone())));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_profile_merge, bench_test_ordering, bench_prune);
criterion_main!(benches);
