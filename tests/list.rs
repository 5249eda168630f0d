//! Tests for incremental lists: construction, `map`, `reduce` and suffix replay.

use std::cell::Cell;
use std::rc::Rc;

use adaptive::{Adaptive, AList, Node};

struct Pipeline {
    engine: Adaptive,
    head: Node<AList<i32>>,
    tail: Node<AList<i32>>,
    mapped: Node<AList<i32>>,
    sum: Node<i32>,
    map_calls: Rc<Cell<usize>>,
    reduce_calls: Rc<Cell<usize>>,
}

/// `[values] -> map(+1) -> reduce(+)`, counting every transform call.
fn pipeline(values: Vec<i32>) -> Pipeline {
    let engine = Adaptive::new();
    let (head, tail) = engine.from_sequence(values);

    let map_calls = Rc::new(Cell::new(0));
    let counter = map_calls.clone();
    let mapped = engine.map(&head, move |x: &i32| {
        counter.set(counter.get() + 1);
        x + 1
    });

    let reduce_calls = Rc::new(Cell::new(0));
    let counter = reduce_calls.clone();
    let sum = engine.reduce(&mapped, 0, move |acc: &i32, x: &i32| {
        counter.set(counter.get() + 1);
        acc + x
    });

    Pipeline {
        engine,
        head,
        tail,
        mapped,
        sum,
        map_calls,
        reduce_calls,
    }
}

#[test]
fn test_map_reduce_initial_result() {
    let p = pipeline(vec![4, 3, 2]);
    assert_eq!(p.head.to_vec(), vec![4, 3, 2]);
    assert_eq!(p.mapped.to_vec(), vec![5, 4, 3]);
    assert_eq!(p.sum.get(), 12);
    assert_eq!(p.map_calls.get(), 3);
    assert_eq!(p.reduce_calls.get(), 3);
}

#[test]
fn test_append_replays_only_the_new_suffix() {
    let p = pipeline(vec![4, 3, 2]);
    let next = p.engine.value(AList::Empty);
    p.tail.write(AList::Cons(7, next.clone()));

    // One read of the old tail by `map`, then the reduce step that read the old
    // end of the mapped list.
    assert_eq!(p.engine.propagate(), 2);
    assert_eq!(p.sum.get(), 20);
    assert_eq!(p.mapped.to_vec(), vec![5, 4, 3, 8]);
    assert_eq!(p.map_calls.get(), 4);
    assert_eq!(p.reduce_calls.get(), 4);

    next.write(AList::Cons(-8, p.engine.value(AList::Empty)));
    assert_eq!(p.engine.propagate(), 2);
    assert_eq!(p.sum.get(), 13);
    assert_eq!(p.map_calls.get(), 5);
    assert_eq!(p.reduce_calls.get(), 5);
}

#[test]
fn test_rewriting_a_middle_cell_replays_from_there() {
    let p = pipeline(vec![4, 3, 2]);
    let second = p.head.get().tail().cloned().unwrap();
    let third = second.get().tail().cloned().unwrap();

    second.write(AList::Cons(30, third));
    p.engine.propagate();

    assert_eq!(p.head.to_vec(), vec![4, 30, 2]);
    assert_eq!(p.mapped.to_vec(), vec![5, 31, 3]);
    assert_eq!(p.sum.get(), 39);
    // The mapped suffix after the rewritten cell is rebuilt, the prefix is not.
    assert_eq!(p.map_calls.get(), 5);

    // Reads reclaimed by the rebuild no longer react to the old tail.
    let next = p.engine.value(AList::Empty);
    p.tail.write(AList::Cons(1, next));
    p.engine.propagate();
    assert_eq!(p.mapped.to_vec(), vec![5, 31, 3, 2]);
    assert_eq!(p.sum.get(), 41);
}

#[test]
fn test_reduce_stops_on_equal_result() {
    let engine = Adaptive::new();
    let (head, _tail) = engine.from_sequence(vec![1, 2, 3]);
    let max = engine.reduce(&head, i32::MIN, |acc: &i32, x: &i32| (*acc).max(*x));

    let observed = Rc::new(Cell::new(0));
    let counter = observed.clone();
    max.read(move |_: &i32| counter.set(counter.get() + 1));

    let second = head.get().tail().cloned().unwrap();
    let third = second.get().tail().cloned().unwrap();
    head.write(AList::Cons(0, second));
    engine.propagate();
    assert_eq!(max.get(), 3);
    assert_eq!(observed.get(), 1);

    third.write(AList::Cons(9, engine.value(AList::Empty)));
    engine.propagate();
    assert_eq!(max.get(), 9);
    assert_eq!(observed.get(), 2);
}

#[test]
fn test_reduce_with_custom_equality() {
    let engine = Adaptive::new();
    let (head, tail) = engine.from_sequence(vec![2, 4]);
    let total = engine.reduce_with(
        |old: &i32, new: &i32| old % 2 == new % 2,
        &head,
        0,
        |acc: &i32, x: &i32| acc + x,
    );
    let parity_changes = Rc::new(Cell::new(0));
    let counter = parity_changes.clone();
    total.read(move |_: &i32| counter.set(counter.get() + 1));

    let next = engine.value(AList::Empty);
    tail.write(AList::Cons(6, next.clone()));
    engine.propagate();
    // Same parity: the stored result is kept.
    assert_eq!(total.get(), 6);
    assert_eq!(parity_changes.get(), 1);

    next.write(AList::Cons(1, engine.value(AList::Empty)));
    engine.propagate();
    assert_eq!(total.get(), 13);
    assert_eq!(parity_changes.get(), 2);
}

#[test]
fn test_map_over_empty_list_grows() {
    let engine = Adaptive::new();
    let (head, tail) = engine.from_sequence(Vec::<String>::new());
    let lengths = engine.map(&head, |s: &String| s.len());
    assert!(lengths.to_vec().is_empty());

    let next = engine.value(AList::Empty);
    tail.write(AList::Cons(String::from("four"), next.clone()));
    engine.propagate();
    next.write(AList::Cons(String::from("ab"), engine.value(AList::Empty)));
    engine.propagate();

    assert_eq!(lengths.to_vec(), vec![4, 2]);
}

#[test]
fn test_truncating_the_list() {
    let p = pipeline(vec![1, 2, 3]);
    p.head.write(AList::Empty);
    p.engine.propagate();
    assert!(p.mapped.to_vec().is_empty());
    assert_eq!(p.sum.get(), 0);
}

#[test]
fn test_long_list_runs_on_default_stack() {
    const LEN: i64 = 50_000;
    let engine = Adaptive::new();
    let (head, tail) = engine.from_sequence(0..LEN);
    let mapped = engine.map(&head, |x: &i64| x + 1);
    let sum = engine.reduce(&mapped, 0, |acc: &i64, x: &i64| acc + x);
    assert_eq!(sum.get(), LEN * (LEN + 1) / 2);

    tail.write(AList::Cons(9, engine.value(AList::Empty)));
    assert_eq!(engine.propagate(), 2);
    assert_eq!(sum.get(), LEN * (LEN + 1) / 2 + 10);

    // Rewriting the first cell replays the whole chain.
    let second = head.get().tail().cloned().unwrap();
    head.write(AList::Cons(100, second));
    engine.propagate();
    assert_eq!(sum.get(), LEN * (LEN + 1) / 2 + 10 + 100);
    assert_eq!(mapped.to_vec().len(), LEN as usize + 1);
}

#[test]
fn test_long_chain_replay_keeps_timestamps_bounded() {
    let engine = Adaptive::new();
    let (head, _tail) = engine.from_sequence(0..5_000u32);
    let count = engine.reduce(&head, 0u32, |acc: &u32, _: &u32| acc + 1);
    let before = engine.stats().timestamps;

    for first in 1..20 {
        let rest = head.get().tail().cloned().unwrap();
        head.write(AList::Cons(first, rest));
        engine.propagate();
    }

    assert_eq!(count.get(), 5_000);
    assert_eq!(engine.stats().timestamps, before);
}
