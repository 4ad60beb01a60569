use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quarry::{Database, Document, Enquire, Op, ParseFlags, Query, QueryParser, WritableDatabase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VOCABULARY: &[&str] = &[
    "search", "engine", "index", "query", "term", "posting", "weight", "document", "rank",
    "match", "phrase", "stem", "value", "range", "sort", "collapse", "expand", "spelling",
    "synonym", "field", "prefix", "boolean", "filter", "score",
];

fn build_database(count: usize) -> Database {
    let mut rng = StdRng::seed_from_u64(7);
    let db = WritableDatabase::inmemory();
    for _ in 0..count {
        let mut doc = Document::new();
        let len = rng.random_range(8..40);
        for pos in 1..=len {
            let word = VOCABULARY[rng.random_range(0..VOCABULARY.len())];
            doc.add_posting(word, pos, 1).unwrap();
        }
        doc.add_value(0, format!("{:04}", rng.random_range(0..1000)));
        db.add_document(doc).unwrap();
    }
    db.commit().unwrap();
    db.reader().unwrap()
}

fn bench_or_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("OR Query");
    group.sample_size(20);

    for count in [1000, 10000].iter() {
        let db = build_database(*count);
        let query = Query::new(
            Op::Or,
            ["search", "engine", "posting"].into_iter().map(Query::term),
        )
        .unwrap();
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            let mut enquire = Enquire::new(&db);
            enquire.set_query(query.clone());
            b.iter(|| enquire.get_mset(0, 10).unwrap())
        });
    }
    group.finish();
}

fn bench_and_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("AND Query");
    group.sample_size(20);

    let db = build_database(10000);
    let query = Query::new(Op::And, ["rank", "match"].into_iter().map(Query::term)).unwrap();
    group.bench_function("two terms", |b| {
        let mut enquire = Enquire::new(&db);
        enquire.set_query(query.clone());
        b.iter(|| enquire.get_mset(0, 10).unwrap())
    });
    group.finish();
}

fn bench_phrase_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("Phrase Query");
    group.sample_size(20);

    let db = build_database(10000);
    let mut parser = QueryParser::new();
    let query = parser
        .parse_query("\"search engine\"", ParseFlags::DEFAULT)
        .unwrap();
    group.bench_function("two words", |b| {
        let mut enquire = Enquire::new(&db);
        enquire.set_query(query.clone());
        b.iter(|| enquire.get_mset(0, 10).unwrap())
    });
    group.finish();
}

fn bench_sorted_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sorted Query");
    group.sample_size(20);

    let db = build_database(10000);
    let query = Query::term("score");
    group.bench_function("by value", |b| {
        let mut enquire = Enquire::new(&db);
        enquire.set_query(query.clone());
        enquire.set_sort_by_value(0, true);
        b.iter(|| enquire.get_mset(0, 10).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_or_query,
    bench_and_query,
    bench_phrase_query,
    bench_sorted_query
);
criterion_main!(benches);
