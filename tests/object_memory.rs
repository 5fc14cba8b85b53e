//! Cross-module invariants of the object memory: the closed-form
//! layout against real chains, reference lifecycles against the
//! allocator's accounting, and the allocator's own contract.

use pnvm::memory::bag::BlockPool;
use pnvm::memory::block::{BlockAddr, BLOCK_SIZE};
use pnvm::memory::heap::Heap;
use pnvm::memory::signature::Signature;
use pnvm::memory::token::Token;

/// Block counts computed by formula equal blocks reachable by links
/// and blocks drawn from the pool, at every size across several
/// growth boundaries.
#[test]
fn block_count_formula_matches_chain_and_pool() {
    let spec = Signature::String.chain_spec().unwrap();
    let limit = spec.last + 2 * spec.tail_not_last + 3;

    let mut heap = Heap::new();
    let baseline = heap.free_bytes();

    let s = heap.string_new().unwrap();
    for size in 0..limit {
        let formula = spec.block_count(size);
        assert_eq!(heap.walked_block_count(s.addr()), formula, "chain at {size}");
        assert_eq!(
            baseline - heap.free_bytes(),
            formula as usize * BLOCK_SIZE,
            "pool accounting at {size}"
        );

        let chain = heap.chain_blocks(s.addr());
        assert_eq!(chain.len() as u32, formula);
        let mut distinct = chain.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), chain.len(), "chain reuses a block at {size}");

        heap.string_push(s, (size % 256) as u8).unwrap();
    }

    heap.value_delete(s.addr());
    assert_eq!(heap.free_bytes(), baseline);
}

/// Seeking to any valid index reads the same item a linear walk
/// reaches.
#[test]
fn seek_agrees_with_direct_walk() {
    let mut heap = Heap::new();
    let spec = Signature::String.chain_spec().unwrap();
    let total = spec.last + spec.tail_last + spec.tail_not_last + 5;

    let s = heap.string_new().unwrap();
    for i in 0..total {
        heap.string_push(s, (i * 7 % 253) as u8).unwrap();
    }

    let mut walker = heap.cursor(s.addr());
    for i in 0..total {
        let walked = walker.read_byte(&heap).unwrap();
        assert_eq!(heap.string_byte_at(s, i).unwrap(), walked, "index {i}");
        walker.advance(&heap);
    }

    heap.value_delete(s.addr());
}

/// Every previously written item survives each chain-growth append
/// with its original value.
#[test]
fn growth_never_disturbs_written_items() {
    let mut heap = Heap::new();
    let spec = Signature::Array.chain_spec().unwrap();
    let total = spec.last + 2 * spec.tail_not_last + 2;

    let array = heap.array_new().unwrap();
    for i in 0..total {
        heap.array_push(array, Token::integer(i as isize * 11 - 3)).unwrap();
        assert_eq!(
            heap.walked_block_count(array.addr()),
            spec.block_count(i + 1),
            "after append {i}"
        );
        for j in 0..=i {
            let token = heap.array_get(array, j).unwrap();
            assert_eq!(token.as_integer(), j as isize * 11 - 3, "item {j} after append {i}");
            heap.release_token(token);
        }
    }

    heap.value_delete(array.addr());
}

/// A reference/unreference round trip on a fresh collectable value
/// destroys it and everything it transitively owned: total free
/// memory returns exactly to its pre-creation level.
#[test]
fn unreference_releases_transitively() {
    let mut heap = Heap::new();
    let baseline = heap.free_bytes();

    let tuple = heap.tuple_new().unwrap();
    let inner = heap.tuple_new().unwrap();
    let name = heap.string_from_str("a string long enough to chain across several blocks of the heap").unwrap();
    assert!(heap.block_count(name.addr()) > 1);

    let name_token = heap.new_value_token(name.addr());
    heap.tuple_push(inner, name_token).unwrap();
    let inner_token = heap.new_value_token(inner.addr());
    heap.tuple_push(tuple, inner_token).unwrap();
    heap.tuple_push(tuple, Token::integer(12)).unwrap();

    assert!(heap.free_bytes() < baseline);

    heap.reference(tuple.addr());
    assert_eq!(heap.unreference(tuple.addr()), None);
    assert_eq!(heap.free_bytes(), baseline);
}

/// N tokens aliasing one value: destruction happens exactly when the
/// last alias is released, never earlier.
#[test]
fn aliased_tokens_release_exactly_once() {
    let mut heap = Heap::new();
    let baseline = heap.free_bytes();

    let s = heap.string_from_str("shared").unwrap();
    let first = heap.new_value_token(s.addr());
    let mut aliases = vec![first];
    for _ in 1..5 {
        let copy = heap.clone_token(aliases.last().unwrap());
        aliases.push(copy);
    }
    assert_eq!(heap.ref_count(s.addr()), 5);

    for (n, token) in aliases.into_iter().enumerate() {
        assert_eq!(
            heap.pool().is_free(s.addr()),
            Some(false),
            "destroyed after only {n} releases"
        );
        heap.release_token(token);
    }
    assert_eq!(heap.pool().is_free(s.addr()), Some(true));
    assert_eq!(heap.free_bytes(), baseline);
}

/// Token assignment through the heap never double-counts or leaks,
/// whatever the source and destination held.
#[test]
fn token_assignment_keeps_counts_exact() {
    let mut heap = Heap::new();
    let baseline = heap.free_bytes();

    let a = heap.string_from_str("first").unwrap();
    let b = heap.string_from_str("second").unwrap();
    let mut holder = heap.new_value_token(a.addr());
    let other = heap.new_value_token(b.addr());

    // retarget: a loses its only reference and dies, b gains one
    heap.assign_token(&mut holder, &other);
    assert_eq!(heap.pool().is_free(a.addr()), Some(true));
    assert_eq!(heap.ref_count(b.addr()), 2);

    // self-assignment is inert
    let again = heap.clone_token(&holder);
    heap.assign_token(&mut holder, &again);
    assert_eq!(heap.ref_count(b.addr()), 3);
    heap.release_token(again);

    heap.token_set_integer(&mut holder, 4);
    heap.release_token(holder);
    heap.release_token(other);
    assert_eq!(heap.free_bytes(), baseline);
}

/// The allocator contract of the bag pool: distinct regions, counted
/// invalid frees, null free as no-op.
#[test]
fn pool_contract() {
    let mut pool = BlockPool::new();
    pool.add_bag(BLOCK_SIZE, 6);

    let mut taken = Vec::new();
    while let Some(addr) = pool.allocate(BLOCK_SIZE) {
        assert!(!taken.contains(&addr), "overlapping allocation {addr}");
        taken.push(addr);
    }
    assert_eq!(taken.len(), 6);

    pool.free(None);
    assert_eq!(pool.invalid_free_count(), 0);

    pool.free(BlockAddr::from_raw(1000));
    assert_eq!(pool.invalid_free_count(), 1);
    assert_eq!(pool.free_bytes(), 0);

    for addr in taken {
        pool.free(Some(addr));
    }
    assert_eq!(pool.free_bytes(), 6 * BLOCK_SIZE);
}

/// Instantiating a template with three places yields a three-item,
/// single-block instance whose cursor lands inside the head block at
/// index two.
#[test]
fn small_instance_stays_in_one_block() {
    let mut heap = Heap::new();
    let tmpl = heap.template_new().unwrap();
    heap.template_set_place_count(tmpl, 3);

    let spec = Signature::NetInstance.chain_spec().unwrap();
    assert!(3 <= spec.last, "three places fit the head block");

    let inst = heap.net_instance_new_with_places(tmpl, 3).unwrap();
    assert_eq!(heap.net_place_count(inst), 3);
    assert_eq!(heap.block_count(inst.addr()), 1);

    let mut cursor = heap.cursor(inst.addr());
    cursor.seek(&heap, 2).unwrap();
    assert_eq!(cursor.block_index(&heap), 0);
    assert_eq!(cursor.current_block(), inst.addr());
    assert!(cursor.at_last_block(&heap));

    heap.value_delete(inst.addr());
    heap.value_delete(tmpl.addr());
}

/// A value rendered for diagnostics reflects its live contents.
#[test]
fn rendering_reflects_state() {
    let mut heap = Heap::new();
    let tuple = heap.tuple_new().unwrap();
    let s = heap.string_from_str("depot").unwrap();
    let token = heap.new_value_token(s.addr());
    heap.tuple_push(tuple, token).unwrap();
    heap.tuple_push(tuple, Token::integer(-7)).unwrap();

    let rendered = heap.render(tuple.addr());
    assert!(rendered.contains("ic=2"));
    assert!(rendered.contains("-7"));
    assert!(heap.render(s.addr()).contains("depot"));

    heap.value_delete(tuple.addr());
}
