use bencher::raw_requests;
use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_api_http::codec::RequestDecoder;
use std::hint::black_box;
use tokio_util::codec::Decoder;

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_decoder");

    for request in raw_requests() {
        group.throughput(Throughput::Bytes(request.content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(request.name()), &request, |b, request| {
            let mut request_decoder = RequestDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(request.content()),
                |bytes_mut| {
                    let request = request_decoder.decode(bytes_mut).expect("input should be a valid http request").unwrap();
                    black_box(request);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);
