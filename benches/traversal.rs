//! Performance benchmarks for traversal, planning and history construction.
//!
//! Run with: `cargo bench --bench traversal`
//!
//! Graphs are long conversations: `rounds` prompt/reply pairs in a chain,
//! with a side prompt hanging off every fifth reply.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

use async_trait::async_trait;
use context_kernel::store::InMemoryGraphStore;
use context_kernel::{
    ContextKernel, Edge, GenerationParams, GraphId, GraphTraversal, HistoryOptions, KernelConfig, Message,
    ModelClient, ModelError, NodeId, NodeRecord, NodeSelector, NodeType, StaticSettings,
};

struct NullModel;

#[async_trait]
impl ModelClient for NullModel {
    async fn generate_non_streaming(
        &self,
        _messages: &[Message],
        _model: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelError> {
        Ok(String::new())
    }
}

fn graph() -> GraphId {
    GraphId::from("bench")
}

/// Build a conversation of `rounds` prompt/reply pairs. Returns the store and last reply id.
fn conversation(rounds: usize) -> (Arc<InMemoryGraphStore>, NodeId) {
    let store = InMemoryGraphStore::new();
    let mut previous: Option<NodeId> = None;

    for i in 0..rounds {
        let p = NodeId::from(format!("p{:05}", i));
        let g = NodeId::from(format!("g{:05}", i));
        store.add_node(&graph(), NodeRecord::new(p.clone(), NodeType::Prompt, json!({ "prompt": format!("question {}", i) })));
        store.add_node(&graph(), NodeRecord::new(g.clone(), NodeType::TextToText, json!({ "reply": format!("answer {}", i) })));
        if let Some(prev) = previous {
            store.add_edge(&graph(), Edge::connect(prev, p.clone()));
        }
        store.add_edge(&graph(), Edge::connect(p, g.clone()));

        if i % 5 == 0 {
            let side = NodeId::from(format!("s{:05}", i));
            store.add_node(&graph(), NodeRecord::new(side.clone(), NodeType::Prompt, json!({ "prompt": "aside" })));
            store.add_edge(&graph(), Edge::connect(g.clone(), side));
        }
        previous = Some(g);
    }

    let last = previous.unwrap_or_else(|| NodeId::from("g00000"));
    (Arc::new(store), last)
}

fn kernel(store: Arc<InMemoryGraphStore>) -> ContextKernel<InMemoryGraphStore> {
    ContextKernel::new(store, Arc::new(StaticSettings::new()), Arc::new(NullModel), KernelConfig::default())
}

/// Benchmark generator-ancestor lookup from the end of a long chain.
fn bench_ancestors(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("ancestors");

    for rounds in [10, 100, 1000] {
        let (store, last) = conversation(rounds);
        let traversal = GraphTraversal::new(store);

        group.throughput(Throughput::Elements(rounds as u64));
        group.bench_with_input(BenchmarkId::new("rounds", rounds), &last, |b, last| {
            b.to_async(&rt).iter(|| async {
                traversal
                    .get_ancestor_by_types(&graph(), black_box(last), NodeType::generators())
                    .await
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark an `all` execution plan.
fn bench_plan_all(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("plan_all");

    for rounds in [10, 100, 1000] {
        let (store, _) = conversation(rounds);
        let kernel = kernel(store);

        group.throughput(Throughput::Elements(rounds as u64));
        group.bench_function(BenchmarkId::new("rounds", rounds), |b| {
            b.to_async(&rt).iter(|| async {
                kernel.get_execution_plan_by_node(&graph(), "all", None).await.unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark a downstream plan from the first prompt.
fn bench_plan_downstream(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, _) = conversation(500);
    let kernel = kernel(store);
    let root = NodeSelector::One(NodeId::from("p00000"));

    c.bench_function("plan_downstream_500", |b| {
        b.to_async(&rt).iter(|| async {
            kernel
                .get_execution_plan_by_node(&graph(), "downstream", Some(black_box(&root)))
                .await
                .unwrap()
        })
    });
}

/// Benchmark full history reconstruction.
fn bench_history(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("history");
    let options = HistoryOptions::default();

    for rounds in [10, 100, 500] {
        let (store, last) = conversation(rounds);
        let kernel = kernel(store);

        group.throughput(Throughput::Elements(rounds as u64));
        group.bench_with_input(BenchmarkId::new("rounds", rounds), &last, |b, last| {
            b.to_async(&rt).iter(|| async {
                kernel
                    .construct_message_history(&graph(), black_box(last), &options)
                    .await
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ancestors,
    bench_plan_all,
    bench_plan_downstream,
    bench_history,
);
criterion_main!(benches);
