// Codec and signature benchmarks for the card ledger.
//
// Covers block encoding and decoding at several transaction counts, block
// hashing, and P-256 signing and verification of trades.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cardledger_protocol::codec::{decode_block, encode_block};
use cardledger_protocol::crypto::{card_hash, verify_signature, CardKeypair};
use cardledger_protocol::storage::Block;
use cardledger_protocol::transaction::{MintTransaction, TradeTransaction, Transaction};

fn signed_mints(count: usize) -> Vec<Transaction> {
    let authority = CardKeypair::generate();
    let recipient = CardKeypair::generate();
    (0..count)
        .map(|i| {
            let mut tx = MintTransaction::new(
                authority.public_key_bytes(),
                recipient.public_key_bytes(),
                card_hash(&format!("card-{i}")),
            );
            tx.sign(&authority).expect("sign mint");
            tx.into()
        })
        .collect()
}

fn bench_encode_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode_block");
    for count in [1usize, 16, 128] {
        let block = Block::new([7; 32], signed_mints(count));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &block, |b, block| {
            b.iter(|| encode_block(block));
        });
    }
    group.finish();
}

fn bench_decode_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode_block");
    for count in [1usize, 16, 128] {
        let bytes = encode_block(&Block::new([7; 32], signed_mints(count)));
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| decode_block(bytes).expect("decode"));
        });
    }
    group.finish();
}

fn bench_block_hash(c: &mut Criterion) {
    let block = Block::new([7; 32], signed_mints(16));
    c.bench_function("block/hash_16_txs", |b| {
        b.iter(|| block.hash().expect("hash"));
    });
}

fn bench_sign_trade(c: &mut Criterion) {
    let alice = CardKeypair::generate();
    let bob = CardKeypair::generate();
    let cards: Vec<_> = (0..4).map(|i| card_hash(&format!("trade-{i}"))).collect();

    c.bench_function("p256/sign_trade", |b| {
        b.iter(|| {
            let mut tx = TradeTransaction::new(
                alice.public_key_bytes(),
                bob.public_key_bytes(),
                cards.clone(),
                Vec::new(),
            );
            tx.sign(&alice).expect("sign");
            tx.sign(&bob).expect("sign");
        });
    });
}

fn bench_verify_signature(c: &mut Criterion) {
    let keypair = CardKeypair::generate();
    let message = b"02ab:03cd:7f00:2026-03-01T09:30:00.0000000Z";
    let signature = keypair.sign(message);
    let public_key = keypair.public_key_bytes();

    c.bench_function("p256/verify_signature", |b| {
        b.iter(|| verify_signature(&public_key, message, &signature));
    });
}

criterion_group!(
    benches,
    bench_encode_block,
    bench_decode_block,
    bench_block_hash,
    bench_sign_trade,
    bench_verify_signature,
);
criterion_main!(benches);
