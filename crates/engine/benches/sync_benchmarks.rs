//! Benchmarks for the synchronization hot paths
//!
//! - Manifest generation (parallel hashing of a whole distribution)
//! - Structured document normalization
//! - A no-op re-run of a fully installed distribution

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use stowage_config::Config;
use stowage_engine::{
    AbsPath, DryRunSystem, FileSync, Installer, Manifest, RealSystem, StructuredSettings,
    StructuredSync, SyncSettings,
};
use tempfile::TempDir;

/// Create a distribution with N files spread over two components
fn create_distribution(num_files: usize) -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let dist = temp.path().join("dist");

    for i in 0..num_files {
        let relative = match i % 3 {
            0 => format!("hooks/hook_{i}.sh"),
            1 => format!("commands/command_{i}.md"),
            2 => format!("hooks/settings_{i}.json"),
            _ => unreachable!(),
        };
        let path = dist.join(&relative);
        std::fs::create_dir_all(path.parent().expect("file has a parent"))
            .expect("Failed to create component directory");

        let content = if relative.ends_with(".json") {
            format!("{{\"_comment\": \"generated\", \"index\": {i}, \"path\": \"${{HOME}}/x\"}}")
        } else {
            format!("Content for artifact {i}\n")
        };
        std::fs::write(&path, content)
            .unwrap_or_else(|_| panic!("Failed to write artifact: {relative}"));
    }
    std::fs::write(dist.join("VERSION"), "1.0.0\n").expect("Failed to write version file");

    temp
}

fn bench_manifest_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_build");

    for size in &[10, 100, 500] {
        let temp = create_distribution(*size);
        let dist = temp.path().join("dist");

        group.bench_with_input(BenchmarkId::from_parameter(size), &dist, |b, dist| {
            b.iter(|| {
                let manifest = Manifest::build(black_box(dist), "integrity-manifest.json", &[]);
                black_box(manifest.len())
            });
        });
    }

    group.finish();
}

fn bench_structured_render(c: &mut Criterion) {
    let config = Config::default();
    let system = DryRunSystem::new();
    let sync_settings = SyncSettings::from_config(&config);
    let files = FileSync::new(&system, &sync_settings);
    let mut settings = StructuredSettings::from_config(&config);
    settings.home = Some("/home/bench".to_string());
    let structured = StructuredSync::new(&files, &settings);

    let document = br#"{
        "_comment": "hook registry",
        "hooks": {
            "PreToolUse": [{"command": "${HOME}/.agent/hooks/guard.sh", "_comment_why": "x"}],
            "PostToolUse": [{"command": "$HOME/.agent/hooks/log.sh"}]
        },
        "env": {"PATH": "$HOME/bin:$HOMEBREW_PREFIX/bin"}
    }"#;

    c.bench_function("structured_render", |b| {
        b.iter(|| black_box(structured.render(black_box(document))));
    });
}

fn bench_noop_rerun(c: &mut Criterion) {
    let temp = create_distribution(100);
    let source = AbsPath::new(temp.path().join("dist")).expect("absolute source");
    let dest = AbsPath::new(temp.path().join("install")).expect("absolute dest");

    let installer = Installer::new(source, dest, Config::default(), RealSystem);
    installer.run(&[]).expect("Initial install failed");

    c.bench_function("noop_rerun_100", |b| {
        b.iter(|| {
            let summary = installer.plan().run(&[]).expect("Planned run failed");
            black_box(summary.entries.len())
        });
    });
}

criterion_group!(
    benches,
    bench_manifest_build,
    bench_structured_render,
    bench_noop_rerun
);
criterion_main!(benches);
