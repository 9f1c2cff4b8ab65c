use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mocksrv::handler::{MockState, RequestHead, handle_request, lock};
use mocksrv::record::ResponseRecorder;
use mocksrv::response::{PredefinedResponse, ResponseQueue};
use std::io::Cursor;
use std::sync::Mutex;

fn bench_queue_consumption(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_consumption");

    for depth in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::new("push_then_drain", depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut queue = ResponseQueue::new();
                for i in 0..depth {
                    queue.push(PredefinedResponse::new(200 + (i % 100) as u16));
                }
                for _ in 0..depth {
                    black_box(queue.next());
                }
            });
        });
    }

    group.finish();
}

fn bench_request_handling(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_handling");

    // Test different body sizes
    let sizes = vec![0usize, 256, 4096, 65536];

    for size in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("handle_request", size), &size, |b, &size| {
            let state = Mutex::new(MockState::new());
            lock(&state)
                .responses
                .push(PredefinedResponse::new(200).with_body("response payload"));
            let body = vec![b'x'; size];

            b.iter(|| {
                let head = RequestHead::new(http::Method::POST, "/bench".parse().unwrap())
                    .with_header("content-type", "application/octet-stream");
                let mut cursor = Cursor::new(body.clone());
                let mut client = ResponseRecorder::new();
                handle_request(&state, head, &mut cursor, &mut client);
                // Keep the store bounded across iterations
                black_box(lock(&state).records.pop());
            });
        });
    }

    group.finish();
}

fn bench_form_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("form_parsing");

    for pairs in [4usize, 32, 128] {
        let body: String = (0..pairs)
            .map(|i| format!("key{i}=value+{i}"))
            .collect::<Vec<_>>()
            .join("&");
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", pairs), &body, |b, body| {
            b.iter(|| black_box(mocksrv::form::parse(body).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_consumption,
    bench_request_handling,
    bench_form_parsing
);
criterion_main!(benches);
