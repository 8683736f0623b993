use criterion::{black_box, criterion_group, criterion_main, Criterion};
use coedit_collab::{BroadcastGroup, OfflineQueue, Outbound, SyncMessage};
use coedit_core::{AwarenessMessage, DocumentKey, Selection};
use std::sync::Arc;

fn bench_update_encode(c: &mut Criterion) {
    let update = vec![0u8; 64];

    c.bench_function("update_encode_64B", |b| {
        b.iter(|| {
            let msg = SyncMessage::update(black_box(42), "coedit", black_box(update.clone()));
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_update_decode(c: &mut Criterion) {
    let encoded = SyncMessage::update(42, "coedit", vec![0u8; 64])
        .encode()
        .unwrap();

    c.bench_function("update_decode_64B", |b| {
        b.iter(|| black_box(SyncMessage::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_cursor_roundtrip(c: &mut Criterion) {
    let cursor = AwarenessMessage::Cursor {
        client_id: 42,
        key: DocumentKey::from("file:///project/src/main.rs"),
        selection: Selection::new(120, 128),
        clock: 7,
    };

    c.bench_function("cursor_msg_roundtrip", |b| {
        b.iter(|| {
            let bytes = SyncMessage::awareness(42, "coedit", black_box(&cursor))
                .unwrap()
                .encode()
                .unwrap();
            let decoded = SyncMessage::decode(&bytes).unwrap();
            black_box(decoded.awareness_message().unwrap());
        })
    });
}

fn bench_broadcast_1000_messages(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("broadcast_1000_msgs_100_peers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let group = BroadcastGroup::new(2048);

                let mut receivers = Vec::new();
                for id in 1..=100 {
                    receivers.push(group.add_peer(id).await);
                }

                for i in 0..1000u64 {
                    let data = Arc::new(vec![i as u8; 64]);
                    group.broadcast_raw(black_box(i % 100 + 1), data);
                }
                black_box(receivers.len());
            });
        })
    });
}

fn bench_offline_queue(c: &mut Criterion) {
    c.bench_function("offline_queue_1000_ops", |b| {
        b.iter(|| {
            let mut queue = OfflineQueue::new(2000);
            for i in 0..1000u32 {
                queue.enqueue(Outbound::Update(i.to_le_bytes().to_vec()));
            }
            black_box(queue.drain());
        })
    });
}

criterion_group!(
    benches,
    bench_update_encode,
    bench_update_decode,
    bench_cursor_roundtrip,
    bench_broadcast_1000_messages,
    bench_offline_queue,
);
criterion_main!(benches);
