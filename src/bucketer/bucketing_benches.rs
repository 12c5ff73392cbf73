use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use xdecide_core::bucketer::{bucket_experiment_in_group, find_bucket, generate_bucket_value, TrafficAllocationEntry};

fn bench_generate_bucket_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_bucket_value");
    group.bench_function("single_user", |b| {
        b.iter(|| generate_bucket_value("bench_user_1", "experiment_1"));
    });

    for user_count in [1, 100, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("many_users", user_count),
            user_count,
            |b, &count| {
                b.iter(|| {
                    for i in 0..count {
                        let user_id = format!("bench_user_{i}");
                        generate_bucket_value(&user_id, "experiment_1");
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_find_bucket(c: &mut Criterion) {
    let traffic: Vec<TrafficAllocationEntry> = (0..20)
        .map(|i| TrafficAllocationEntry {
            entity_id: format!("variation_{i}"),
            end_of_range: (i + 1) * 500,
        })
        .collect();

    c.bench_function("find_bucket_20_entries", |b| {
        b.iter(|| find_bucket(4242, &traffic));
    });
}

fn bench_bucket_experiment_in_group(c: &mut Criterion) {
    let group_traffic = vec![TrafficAllocationEntry {
        entity_id: "exp_a".to_string(),
        end_of_range: 5000,
    }];
    let exp_traffic = vec![TrafficAllocationEntry {
        entity_id: "v1".to_string(),
        end_of_range: 10000,
    }];
    let group = xdecide_core::bucketer::GroupBucketingInput {
        group_id: "group_1",
        traffic_allocation: &group_traffic,
    };

    c.bench_function("bucket_experiment_in_group", |b| {
        b.iter(|| bucket_experiment_in_group("bench_user", "exp_a", &exp_traffic, Some(&group)));
    });
}

criterion_group!(
    benches,
    bench_generate_bucket_value,
    bench_find_bucket,
    bench_bucket_experiment_in_group
);
criterion_main!(benches);
