//! Benchmarks for turning a server answer into layered configuration.

use confhub::client::{ConfigData, assemble};
use confhub::environment::{Environment, PropertySource};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::{Map, json};

fn environment(sources: usize, keys: usize) -> Environment {
    let mut environment = Environment::new("bench", vec!["prod".to_string(), "eu".to_string()]);
    environment.state = Some("s-1".to_string());
    environment.version = Some("abc123".to_string());
    for s in 0..sources {
        let mut source = Map::new();
        for k in 0..keys {
            let value = if k % 2 == 0 {
                json!({"origin": format!("bench-{}.yml:{}:3", s, k), "value": k})
            } else {
                json!(format!("value-{}", k))
            };
            source.insert(format!("key.{}", k), value);
        }
        let name = if s % 2 == 0 {
            format!("git:repo/bench-prod-{}.yml", s)
        } else {
            format!("git:repo/bench-{}.yml", s)
        };
        environment.add(PropertySource::new(name, source));
    }
    environment
}

fn profiles() -> Vec<String> {
    vec!["prod".to_string(), "eu".to_string()]
}

/// Benchmark assembly for growing numbers of property sources
fn benchmark_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    for sources in [1, 4, 16] {
        let environment = environment(sources, 50);
        group.throughput(Throughput::Elements((sources * 50) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sources), &environment, |b, env| {
            b.iter(|| assemble(black_box(env), black_box(&profiles())));
        });
    }
    group.finish();
}

/// Benchmark layered lookups
fn benchmark_lookup(c: &mut Criterion) {
    let data: ConfigData = assemble(&environment(8, 100), &profiles());

    let mut group = c.benchmark_group("lookup");
    group.bench_function("hit_profile_specific", |b| {
        b.iter(|| black_box(data.get(black_box("key.0"))));
    });
    group.bench_function("miss", |b| {
        b.iter(|| black_box(data.get(black_box("absent.key"))));
    });
    group.bench_function("state", |b| {
        b.iter(|| black_box(data.state()));
    });
    group.finish();
}

/// Benchmark decoding a server response body
fn benchmark_decode(c: &mut Criterion) {
    let body = serde_json::to_string(&environment(8, 100)).unwrap_or_default();

    c.bench_function("decode_environment", |b| {
        b.iter(|| serde_json::from_str::<Environment>(black_box(&body)));
    });
}

criterion_group!(benches, benchmark_assemble, benchmark_lookup, benchmark_decode);
criterion_main!(benches);
