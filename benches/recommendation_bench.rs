use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shoprec::algorithms::{ContentBasedFilter, HybridCombiner, TfIdfVectorizer, UserBasedCollaborative};
use shoprec::config::RecommendationConfig;
use shoprec::services::store::seed::{synthetic_dataset, SyntheticDataset};
use shoprec::services::store::InMemoryStore;
use shoprec::*;
use std::sync::Arc;

fn dataset() -> SyntheticDataset {
    synthetic_dataset(200, 500, 25, 42)
}

fn history(data: &SyntheticDataset, user_id: UserId) -> Vec<Interaction> {
    data.interactions.iter().filter(|i| i.user_id == user_id).cloned().collect()
}

fn benchmark_tfidf(c: &mut Criterion) {
    let data = dataset();
    let documents: Vec<String> = data.products.iter().map(Product::feature_text).collect();

    c.bench_function("tfidf_fit_transform_500", |b| {
        b.iter(|| {
            let mut vectorizer = TfIdfVectorizer::new(100);
            black_box(vectorizer.fit_transform(&documents));
        });
    });
}

fn benchmark_models(c: &mut Criterion) {
    let data = dataset();
    let config = RecommendationConfig::default();
    let rated: Vec<Interaction> = data.interactions.iter().filter(|i| i.is_rating()).cloned().collect();
    let user_history = history(&data, 1);

    let collaborative = UserBasedCollaborative::new(&config.collaborative);
    c.bench_function("collaborative_recommend", |b| {
        b.iter(|| {
            black_box(collaborative.recommend(1, &rated, &user_history, 10).ok());
        });
    });

    let content = ContentBasedFilter::new(&config.content);
    c.bench_function("content_recommend", |b| {
        b.iter(|| {
            black_box(content.recommend(&user_history, &data.products, 10).ok());
        });
    });

    let combiner = HybridCombiner::new(&config.hybrid);
    let first = collaborative.recommend(1, &rated, &user_history, 50).unwrap_or_default();
    let second = content.recommend(&user_history, &data.products, 50).unwrap_or_default();
    c.bench_function("hybrid_combine", |b| {
        b.iter(|| {
            black_box(combiner.combine(&first, &second, 10));
        });
    });
}

fn benchmark_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let data = dataset();

    let store = Arc::new(InMemoryStore::new());
    store.insert_products(data.products.clone());
    store.insert_users(data.users.clone());
    store.insert_interactions(data.interactions.clone());

    let state = rt.block_on(async { AppState::with_stores(Config::default(), Stores::memory(store)) });

    c.bench_function("engine_generate", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(state.engine.generate(7, 10).await);
        });
    });

    c.bench_function("generate_and_persist", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(state.serving.generate_and_persist(7, 10).await.unwrap());
        });
    });
}

criterion_group!(benches, benchmark_tfidf, benchmark_models, benchmark_pipeline);
criterion_main!(benches);
