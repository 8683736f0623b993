use criterion::{black_box, criterion_group, criterion_main, Criterion};
use coedit_core::{Awareness, Binding, DocumentKey, TextEdit, TextModel, SHARED_TEXTS};
use std::sync::Arc;
use yrs::{Doc, Map, Text, TextPrelim, Transact};

const KEY: &str = "file:///bench.txt";

fn setup(content: &str) -> (Doc, yrs::TextRef, Arc<TextModel>, Binding) {
    let doc = Doc::new();
    let texts = doc.get_or_insert_map(SHARED_TEXTS);
    let text = {
        let mut txn = doc.transact_mut();
        texts.insert(&mut txn, KEY, TextPrelim::new(content))
    };
    let model = Arc::new(TextModel::new(DocumentKey::from(KEY), ""));
    let awareness = Arc::new(Awareness::new(doc.client_id(), "bench"));
    let binding = Binding::new(
        DocumentKey::from(KEY),
        doc.clone(),
        text.clone(),
        model.clone(),
        awareness,
    )
    .unwrap();
    (doc, text, model, binding)
}

fn bench_local_typing(c: &mut Criterion) {
    let (_doc, _text, model, _binding) = setup("");

    c.bench_function("local_insert_1_char", |b| {
        b.iter(|| {
            let end = model.len();
            model.insert(black_box(end), "a").unwrap();
        })
    });
}

fn bench_remote_typing(c: &mut Criterion) {
    let (doc, text, model, _binding) = setup("");

    c.bench_function("remote_insert_1_char", |b| {
        b.iter(|| {
            let mut txn = doc.transact_mut_with("peer");
            let end = text.len(&txn);
            text.insert(&mut txn, black_box(end), "a");
        })
    });
    black_box(model.len());
}

fn bench_initial_alignment(c: &mut Criterion) {
    let content = "lorem ipsum dolor sit amet\n".repeat(1_000);

    c.bench_function("bind_27KB_document", |b| {
        b.iter(|| {
            let (_doc, _text, model, binding) = setup(black_box(&content));
            black_box((model.len(), binding.editor_count()));
        })
    });
}

fn bench_edit_between(c: &mut Criterion) {
    let old = "fn main() {\n    println!(\"hello\");\n}\n".repeat(200);
    let mut new = old.clone();
    new.insert_str(old.len() / 2, "// inserted\n");

    c.bench_function("text_edit_between_8KB", |b| {
        b.iter(|| black_box(TextEdit::between(black_box(&old), black_box(&new))))
    });
}

criterion_group!(
    benches,
    bench_local_typing,
    bench_remote_typing,
    bench_initial_alignment,
    bench_edit_between,
);
criterion_main!(benches);
