//! Object memory allocation benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pnvm::memory::bag::BlockPool;
use pnvm::memory::block::BLOCK_SIZE;
use pnvm::memory::heap::Heap;
use pnvm::memory::signature::Signature;
use pnvm::memory::token::Token;

/// Drain and refill one bag
fn pool_churn(pool: &mut BlockPool) {
    let mut taken = Vec::with_capacity(64);
    while let Some(addr) = pool.allocate(BLOCK_SIZE) {
        taken.push(addr);
    }
    for addr in taken {
        pool.free(Some(addr));
    }
}

/// Build a string that spans several blocks, then destroy it
fn string_build(heap: &mut Heap, length: u32) {
    let s = heap.string_new().unwrap();
    for i in 0..length {
        heap.string_push(s, (i % 251) as u8).unwrap();
    }
    heap.value_delete(black_box(s.addr()));
}

/// Push integer tokens through a tuple and read them back
fn tuple_traffic(heap: &mut Heap, length: u32) {
    let t = heap.tuple_new().unwrap();
    for i in 0..length {
        heap.tuple_push(t, Token::integer(i as isize)).unwrap();
    }
    for i in 0..length {
        let token = heap.tuple_get(t, i).unwrap();
        black_box(token.as_integer());
        heap.release_token(token);
    }
    heap.value_delete(t.addr());
}

/// Update the marking weights of a populated place
fn place_marking(heap: &mut Heap, rounds: u32) {
    let p = heap.place_new().unwrap();
    for i in 0..8 {
        heap.place_push(p, Token::integer(i), 1).unwrap();
    }
    for round in 0..rounds {
        let index = round % 8;
        heap.place_inc_at(p, index, 3).unwrap();
        heap.place_dec_at(p, index, 2).unwrap();
    }
    heap.value_delete(p.addr());
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let spec = Signature::String.chain_spec().unwrap();
    let three_blocks = spec.last + spec.tail_not_last + spec.tail_last / 2;

    c.bench_function("pool_churn", |b| {
        let mut pool = BlockPool::new();
        pool.add_bag(BLOCK_SIZE, 64);
        b.iter(|| pool_churn(&mut pool))
    });

    c.bench_function("string_build_three_blocks", |b| {
        let mut heap = Heap::new();
        b.iter(|| string_build(&mut heap, black_box(three_blocks)))
    });

    c.bench_function("tuple_traffic", |b| {
        let mut heap = Heap::new();
        b.iter(|| tuple_traffic(&mut heap, black_box(24)))
    });

    c.bench_function("place_marking", |b| {
        let mut heap = Heap::new();
        b.iter(|| place_marking(&mut heap, black_box(64)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
