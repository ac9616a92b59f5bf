use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use procwatch::system::process::{ProcessRecord, ProcessState};
use procwatch::tree::{build_tree, flatten};
use std::hint::black_box;

fn make_processes(n: usize) -> Vec<ProcessRecord> {
    (0..n)
        .map(|i| {
            let pid = i as u32 + 1;
            let ppid = if i == 0 { 0 } else { (i as u32 / 2) + 1 };
            ProcessRecord {
                pid,
                ppid,
                name: format!("proc_{i}"),
                user: format!("u{}", i % 8),
                command: format!("proc_{i} --work"),
                cwd: "/".to_string(),
                cpu_percent: (i % 100) as f32,
                mem_percent: 0.1,
                vsz: ((n - i) as u64 + 1) * 4096,
                rss: ((n - i) as u64 + 1) * 1024,
                status: ProcessState::Running,
                threads: 1,
                priority: 0,
                created_at: Some(1_700_000_000),
                cpu_time_user: 0.0,
                cpu_time_sys: 0.0,
                open_files: 3,
                network_connections: 0,
            }
        })
        .collect()
}

fn bench_build_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_tree_build_500_1000_2000");

    for size in [500usize, 1000, 2000] {
        let processes = make_processes(size);
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &processes,
            |b, processes| {
                b.iter(|| {
                    let forest = build_tree(black_box(processes), 10);
                    black_box(forest);
                })
            },
        );
    }

    group.finish();
}

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_tree_flatten_500_1000_2000");

    for size in [500usize, 1000, 2000] {
        let forest = build_tree(&make_processes(size), 10);
        group.bench_with_input(BenchmarkId::from_parameter(size), &forest, |b, forest| {
            b.iter(|| {
                let rows = flatten(black_box(forest));
                black_box(rows.len());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_tree, bench_flatten);
criterion_main!(benches);
