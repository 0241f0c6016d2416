use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use detour::index::{IndexOptions, SiteIndex};
use detour::matcher::resolve;
use detour::model::{QueryParams, Rule, RuleRecord, SourceParamRecord, SourceUrlType, TargetRecord};

fn create_record(id: usize, source: String, kind: SourceUrlType) -> RuleRecord {
    RuleRecord {
        id: id.to_string(),
        source,
        source_url_type: kind,
        target: Some(TargetRecord {
            url: Some(format!("https://example.com/target/{id}")),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_rules(count: usize) -> Vec<Rule> {
    (0..count)
        .filter_map(|i| {
            Rule::from_record(
                create_record(i, format!("/legacy/page{i}"), SourceUrlType::Plain),
                None,
            )
            .ok()
        })
        .collect()
}

fn pattern_rules(count: usize) -> Vec<Rule> {
    (0..count)
        .filter_map(|i| {
            Rule::from_record(
                create_record(i, format!(r"/archive/{i}/\d+/.*"), SourceUrlType::Regex),
                None,
            )
            .ok()
        })
        .collect()
}

fn build_index(rules: Vec<Rule>) -> SiteIndex {
    SiteIndex::build(rules, IndexOptions::default()).0
}

fn bench_plain_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("plain_lookup");
    let query = QueryParams::new();

    for rule_count in [10, 100, 1000, 10_000].iter() {
        let index = build_index(plain_rules(*rule_count));
        let hit = format!("/Legacy/Page{}/", rule_count / 2);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("hit", rule_count), rule_count, |b, _| {
            b.iter(|| resolve(black_box(&index), black_box(&hit), &query, Utc::now()));
        });
        group.bench_with_input(BenchmarkId::new("miss", rule_count), rule_count, |b, _| {
            b.iter(|| resolve(black_box(&index), black_box("/nowhere"), &query, Utc::now()));
        });
    }

    group.finish();
}

fn bench_pattern_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_lookup");
    let query = QueryParams::new();

    // Patterns are scanned in order, so the cost grows with the group count
    for rule_count in [10, 50, 100, 500].iter() {
        let index = build_index(pattern_rules(*rule_count));
        let first = "/archive/0/2019/post".to_string();
        let last = format!("/archive/{}/2019/post", rule_count - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("first", rule_count), rule_count, |b, _| {
            b.iter(|| resolve(black_box(&index), black_box(&first), &query, Utc::now()));
        });
        group.bench_with_input(BenchmarkId::new("last", rule_count), rule_count, |b, _| {
            b.iter(|| resolve(black_box(&index), black_box(&last), &query, Utc::now()));
        });
    }

    group.finish();
}

fn bench_param_tie_break(c: &mut Criterion) {
    let mut group = c.benchmark_group("param_tie_break");

    let rules: Vec<Rule> = (0..20)
        .filter_map(|i| {
            let mut record = create_record(i, "/campaign".to_string(), SourceUrlType::Plain);
            record.source_params = (0..i % 4)
                .map(|p| SourceParamRecord {
                    name: format!("p{p}"),
                    value: "x".to_string(),
                    operator: None,
                })
                .collect();
            Rule::from_record(record, None).ok()
        })
        .collect();
    let index = build_index(rules);
    let query = QueryParams::parse("p0=x&p1=x&p2=x&utm_source=mail");

    group.throughput(Throughput::Elements(1));
    group.bench_function("twenty_siblings", |b| {
        b.iter(|| resolve(black_box(&index), black_box("/campaign"), &query, Utc::now()));
    });

    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for rule_count in [100, 1000, 10_000].iter() {
        let rules = plain_rules(*rule_count);
        group.throughput(Throughput::Elements(*rule_count as u64));
        group.bench_with_input(BenchmarkId::new("plain", rule_count), rule_count, |b, _| {
            b.iter(|| build_index(black_box(rules.clone())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_plain_lookup,
    bench_pattern_lookup,
    bench_param_tie_break,
    bench_index_build
);
criterion_main!(benches);
