// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use revcap::codec::DiffBlob;
use revcap::contents::DecodedDiffs;
use revcap::models::ChangesetDiffs;
use revcap_git::{Hunk, HunkLine, ParsedDiff};

/// `files` diffs, each replacing every tenth line of a 200-line file
fn sample_diffs(files: usize) -> Vec<ParsedDiff> {
    (0..files)
        .map(|f| {
            let hunks = (0..20)
                .map(|h| Hunk {
                    old_start: h * 10 + 1,
                    old_lines: 1,
                    new_start: h * 10 + 1,
                    new_lines: 1,
                    lines: vec![
                        HunkLine::Removed(format!("let value_{h} = old_{f}();")),
                        HunkLine::Added(format!("let value_{h} = new_{f}();")),
                    ],
                })
                .collect();
            ParsedDiff {
                old_file_name: format!("src/module_{f}.rs"),
                new_file_name: format!("src/module_{f}.rs"),
                hunks,
                is_binary: false,
            }
        })
        .collect()
}

fn codec_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for files in [1, 25, 250] {
        let diffs = sample_diffs(files);
        let blob = DiffBlob::encode(&diffs).expect("encode");

        group.bench_with_input(BenchmarkId::new("encode", files), &diffs, |b, diffs| {
            b.iter(|| DiffBlob::encode(std::hint::black_box(diffs)).expect("encode"))
        });
        group.bench_with_input(BenchmarkId::new("decode", files), &blob, |b, blob| {
            b.iter(|| std::hint::black_box(blob).decode().expect("decode"))
        });
    }

    group.finish();
}

fn changeset_decode_benchmark(c: &mut Criterion) {
    let blob = DiffBlob::encode(&sample_diffs(50)).expect("encode");
    let diffs = ChangesetDiffs {
        left_base_author: "Author".to_string(),
        left_base_sha: "a".repeat(40),
        left_diffs: blob.clone(),
        right_base_author: "Author".to_string(),
        right_base_sha: "a".repeat(40),
        right_diffs: blob.clone(),
        right_reverse_diffs: blob.clone(),
        latest_commit_sha: "b".repeat(40),
        right_to_latest_commit_diffs: blob.clone(),
        latest_commit_to_right_diffs: blob,
    };

    c.bench_function("changeset_decode_all", |b| {
        b.iter(|| DecodedDiffs::decode(std::hint::black_box(&diffs)).expect("decode"))
    });
}

criterion_group!(benches, codec_benchmarks, changeset_decode_benchmark);
criterion_main!(benches);
