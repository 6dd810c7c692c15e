//! Property-based tests for the merge laws every variant must satisfy:
//! - Commutativity: merge(A, B) == merge(B, A)
//! - Associativity: merge(merge(A, B), C) == merge(A, merge(B, C))
//! - Idempotence: merge(A, A) == A
//!
//! and for delta propagation: applying `a.generate_delta(b's context)` to B
//! gives the same state as merging all of A into B.
//!
//! States are produced by simulating a few replicas that apply random local
//! operations through their own environment and gossip full states to one
//! another, so every state is one a real replica could reach.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use replikit_crdt::{
    BCounter, BoundMode, DeltaCrdt, LWWMap, LWWRegister, MVMap, MVRegister, Map, PNCounter, RGA,
    Ratchet, Scalar, ValueKind,
};
use replikit_types::{Environment, ReplicaEnvironment, ReplicaId, Timestamp};
use std::fmt::Debug;

const REPLICAS: usize = 3;

fn replica(i: usize) -> ReplicaId {
    let mut bytes = [0u8; 16];
    bytes[0] = i as u8 + 1;
    ReplicaId::from_uuid(uuid::Uuid::from_bytes(bytes))
}

// =============================================================================
// SIMULATION
// =============================================================================

#[derive(Debug, Clone)]
enum Step<Op> {
    Local(usize, Op),
    Sync { from: usize, to: usize },
}

fn steps<Op: Debug + Clone + 'static>(
    op: impl Strategy<Value = Op> + 'static,
) -> impl Strategy<Value = Vec<Step<Op>>> {
    prop::collection::vec(
        prop_oneof![
            3 => (0..REPLICAS, op).prop_map(|(r, op)| Step::Local(r, op)),
            1 => (0..REPLICAS, 0..REPLICAS).prop_map(|(from, to)| Step::Sync { from, to }),
        ],
        0..24,
    )
}

/// Runs `steps` over `REPLICAS` copies of `init` and returns the final states.
fn simulate<C, Op>(
    init: &C,
    steps: &[Step<Op>],
    apply: impl Fn(&mut C, &Op, &mut ReplicaEnvironment),
) -> Vec<C>
where
    C: DeltaCrdt,
{
    let mut states: Vec<C> = (0..REPLICAS).map(|_| init.clone()).collect();
    let mut envs: Vec<ReplicaEnvironment> = (0..REPLICAS)
        .map(|i| ReplicaEnvironment::with_state(replica(i), init.causal_context()))
        .collect();
    for step in steps {
        match step {
            Step::Local(r, op) => apply(&mut states[*r], op, &mut envs[*r]),
            Step::Sync { from, to } if from != to => {
                let source = states[*from].clone();
                states[*to].merge_observed(&source, &mut envs[*to]);
            }
            Step::Sync { .. } => {}
        }
    }
    states
}

fn check_lattice<C: DeltaCrdt + PartialEq + Debug>(states: &[C]) -> Result<(), TestCaseError> {
    for a in states {
        prop_assert_eq!(&a.merged(a), a);
        for b in states {
            prop_assert_eq!(a.merged(b), b.merged(a));
            for c in states {
                prop_assert_eq!(a.merged(b).merged(c), a.merged(&b.merged(c)));
            }
        }
    }
    Ok(())
}

fn check_delta<C: DeltaCrdt + PartialEq + Debug>(states: &[C]) -> Result<(), TestCaseError> {
    for a in states {
        for b in states {
            let delta = a.generate_delta(&b.causal_context());
            prop_assert_eq!(b.merged(&delta), b.merged(a));
            prop_assert_eq!(&a.merged(&delta), a);
        }
    }
    Ok(())
}

fn check_converged<C: DeltaCrdt + PartialEq + Debug>(states: &[C]) -> Result<(), TestCaseError> {
    let forward = states.iter().fold(states[0].clone(), |acc, s| acc.merged(s));
    let backward = states
        .iter()
        .rev()
        .fold(states[REPLICAS - 1].clone(), |acc, s| acc.merged(s));
    prop_assert_eq!(forward, backward);
    Ok(())
}

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[abc]").unwrap()
}

fn kind_strategy() -> impl Strategy<Value = ValueKind> {
    prop::sample::select(ValueKind::ALL.to_vec())
}

/// Finite values only; NaN never compares equal to itself.
fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::from),
        (-50i64..50).prop_map(Scalar::from),
        (-400i32..400).prop_map(|n| Scalar::from(f64::from(n) / 8.0)),
        prop::string::string_regex("[xyz]{0,2}")
            .unwrap()
            .prop_map(Scalar::from),
    ]
}

#[derive(Debug, Clone)]
enum KeyedOp {
    Assign(String, Scalar),
    Remove(String, ValueKind),
}

fn keyed_op_strategy() -> impl Strategy<Value = KeyedOp> {
    prop_oneof![
        3 => (key_strategy(), scalar_strategy()).prop_map(|(k, v)| KeyedOp::Assign(k, v)),
        1 => (key_strategy(), kind_strategy()).prop_map(|(k, kind)| KeyedOp::Remove(k, kind)),
    ]
}

fn tick(env: &mut ReplicaEnvironment) -> Timestamp {
    env.new_timestamp().unwrap()
}

// =============================================================================
// PN-COUNTER
// =============================================================================

mod pn_counter_properties {
    use super::*;

    fn apply(c: &mut PNCounter, amount: &i64, env: &mut ReplicaEnvironment) {
        c.increment(*amount, tick(env)).unwrap();
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(-20i64..20)) {
            let states = simulate(&PNCounter::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(-20i64..20)) {
            let states = simulate(&PNCounter::new(), &steps, apply);
            check_delta(&states)?;
        }

        /// The converged value is the sum of every applied amount.
        #[test]
        fn value_is_sum_of_operations(steps in steps(-20i64..20)) {
            let states = simulate(&PNCounter::new(), &steps, apply);
            let merged = states.iter().fold(PNCounter::new(), |acc, s| acc.merged(s));
            let expected: i64 = steps
                .iter()
                .filter_map(|s| match s {
                    Step::Local(_, amount) => Some(*amount),
                    Step::Sync { .. } => None,
                })
                .sum();
            prop_assert_eq!(merged.value(), expected);
        }
    }
}

// =============================================================================
// B-COUNTER
// =============================================================================

mod b_counter_properties {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Increment(u64),
        Decrement(u64),
        Transfer(u64, usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            1 => (1u64..5).prop_map(Op::Increment),
            3 => (1u64..8).prop_map(Op::Decrement),
            2 => (1u64..8, 0..REPLICAS).prop_map(|(n, to)| Op::Transfer(n, to)),
        ]
    }

    fn init() -> BCounter {
        BCounter::new(BoundMode::GreaterOrEqual, 0, 20, 1, Timestamp::new(replica(0), 1)).unwrap()
    }

    // Rights shortfalls are expected outcomes; the state is untouched then.
    fn apply(c: &mut BCounter, op: &Op, env: &mut ReplicaEnvironment) {
        let ts = tick(env);
        let _ = match op {
            Op::Increment(n) => c.increment(*n, ts),
            Op::Decrement(n) => c.decrement(*n, ts),
            Op::Transfer(n, to) => c.transfer(*n, replica(*to), ts),
        };
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(op_strategy())) {
            let states = simulate(&init(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(op_strategy())) {
            let states = simulate(&init(), &steps, apply);
            check_delta(&states)?;
        }

        /// No interleaving of local operations and gossip crosses the bound.
        #[test]
        fn bound_holds_everywhere(steps in steps(op_strategy())) {
            let states = simulate(&init(), &steps, apply);
            for s in &states {
                prop_assert!(s.value() >= 0);
            }
            let merged = states.iter().fold(init(), |acc, s| acc.merged(s));
            prop_assert!(merged.value() >= 0);
            for i in 0..REPLICAS {
                prop_assert!(merged.local_rights(&replica(i)) <= merged.value().unsigned_abs());
            }
        }
    }
}

// =============================================================================
// REGISTERS
// =============================================================================

mod lww_register_properties {
    use super::*;

    fn apply(r: &mut LWWRegister<i64>, value: &i64, env: &mut ReplicaEnvironment) {
        r.assign(*value, tick(env));
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(-10i64..10)) {
            let states = simulate(&LWWRegister::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(-10i64..10)) {
            let states = simulate(&LWWRegister::new(), &steps, apply);
            check_delta(&states)?;
        }
    }
}

mod mv_register_properties {
    use super::*;

    fn apply(r: &mut MVRegister<i64>, value: &i64, env: &mut ReplicaEnvironment) {
        r.assign(*value, tick(env));
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(-10i64..10)) {
            let states = simulate(&MVRegister::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(-10i64..10)) {
            let states = simulate(&MVRegister::new(), &steps, apply);
            check_delta(&states)?;
        }

        /// Never more live values than replicas that wrote.
        #[test]
        fn conflicts_bounded_by_writers(steps in steps(-10i64..10)) {
            let states = simulate(&MVRegister::new(), &steps, apply);
            let merged = states.iter().fold(MVRegister::new(), |acc, s| acc.merged(s));
            prop_assert!(merged.values().len() <= REPLICAS);
        }
    }
}

mod ratchet_properties {
    use super::*;

    fn apply(r: &mut Ratchet<i64>, value: &i64, env: &mut ReplicaEnvironment) {
        r.assign(*value, tick(env));
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(-10i64..10)) {
            let states = simulate(&Ratchet::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(-10i64..10)) {
            let states = simulate(&Ratchet::new(), &steps, apply);
            check_delta(&states)?;
        }

        /// The converged value is the largest value ever assigned.
        #[test]
        fn converges_to_maximum(steps in steps(-10i64..10)) {
            let states = simulate(&Ratchet::new(), &steps, apply);
            let merged = states.iter().fold(Ratchet::new(), |acc, s| acc.merged(s));
            let max = steps
                .iter()
                .filter_map(|s| match s {
                    Step::Local(_, v) => Some(*v),
                    Step::Sync { .. } => None,
                })
                .max();
            prop_assert_eq!(merged.value().copied(), max);
        }
    }
}

// =============================================================================
// RGA
// =============================================================================

mod rga_properties {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize, char),
        Remove(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (any::<usize>(), prop::char::range('a', 'e')).prop_map(|(i, c)| Op::Insert(i, c)),
            1 => any::<usize>().prop_map(Op::Remove),
        ]
    }

    fn apply(rga: &mut RGA<char>, op: &Op, env: &mut ReplicaEnvironment) {
        match op {
            Op::Insert(seed, ch) => {
                let index = seed % (rga.len() + 1);
                rga.insert_at(index, *ch, env).unwrap();
            }
            Op::Remove(seed) if !rga.is_empty() => {
                let index = seed % rga.len();
                rga.remove_at(index, env).unwrap();
            }
            Op::Remove(_) => {}
        }
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(op_strategy())) {
            let states = simulate(&RGA::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(op_strategy())) {
            let states = simulate(&RGA::new(), &steps, apply);
            check_delta(&states)?;
        }

        /// Every insert survives as a node, live or tombstoned.
        #[test]
        fn no_insert_is_lost(steps in steps(op_strategy())) {
            let states = simulate(&RGA::new(), &steps, apply);
            let merged = states.iter().fold(RGA::new(), |acc, s| acc.merged(s));
            let inserts = steps
                .iter()
                .filter(|s| matches!(s, Step::Local(_, Op::Insert(..))))
                .count();
            prop_assert_eq!(merged.physical_len(), inserts);
        }

        /// Per-operation deltas rebuild the source whatever order they
        /// arrive in.
        #[test]
        fn deltas_in_any_order(
            (ops, order) in prop::collection::vec(op_strategy(), 1..20).prop_flat_map(|ops| {
                let order = Just((0..ops.len()).collect::<Vec<_>>()).prop_shuffle();
                (Just(ops), order)
            })
        ) {
            let mut env = ReplicaEnvironment::new(replica(1));
            let mut source = RGA::new();
            let mut deltas = Vec::new();
            for op in &ops {
                let before = source.causal_context();
                apply(&mut source, op, &mut env);
                deltas.push(source.generate_delta(&before));
            }
            let target = order
                .iter()
                .fold(RGA::new(), |acc, &i| acc.merged(&deltas[i]));
            prop_assert_eq!(target.pending_len(), 0);
            prop_assert_eq!(target, source);
        }
    }
}

// =============================================================================
// MAPS
// =============================================================================

mod lww_map_properties {
    use super::*;

    fn apply(m: &mut LWWMap, op: &KeyedOp, env: &mut ReplicaEnvironment) {
        match op {
            KeyedOp::Assign(k, v) => m.assign(k.clone(), v.clone(), tick(env)),
            KeyedOp::Remove(k, kind) => m.remove(k.clone(), *kind, tick(env)),
        };
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(keyed_op_strategy())) {
            let states = simulate(&LWWMap::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(keyed_op_strategy())) {
            let states = simulate(&LWWMap::new(), &steps, apply);
            check_delta(&states)?;
        }
    }
}

mod mv_map_properties {
    use super::*;

    fn apply(m: &mut MVMap, op: &KeyedOp, env: &mut ReplicaEnvironment) {
        match op {
            KeyedOp::Assign(k, v) => m.assign(k.clone(), v.clone(), tick(env)),
            KeyedOp::Remove(k, kind) => m.remove(k.clone(), *kind, tick(env)),
        };
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(keyed_op_strategy())) {
            let states = simulate(&MVMap::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(keyed_op_strategy())) {
            let states = simulate(&MVMap::new(), &steps, apply);
            check_delta(&states)?;
        }
    }
}

mod map_properties {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Keyed(KeyedOp),
        Concurrent(KeyedOp),
        Count(String, i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            keyed_op_strategy().prop_map(Op::Keyed),
            keyed_op_strategy().prop_map(Op::Concurrent),
            (key_strategy(), -5i64..5).prop_map(|(k, n)| Op::Count(k, n)),
        ]
    }

    fn apply(m: &mut Map, op: &Op, env: &mut ReplicaEnvironment) {
        match op {
            Op::Keyed(KeyedOp::Assign(k, v)) => {
                m.set(k.clone(), v.clone(), env).unwrap();
            }
            Op::Keyed(KeyedOp::Remove(k, kind)) => {
                m.remove(k.clone(), *kind, env).unwrap();
            }
            Op::Concurrent(KeyedOp::Assign(k, v)) => {
                m.set_concurrent(k.clone(), v.clone(), env).unwrap();
            }
            Op::Concurrent(KeyedOp::Remove(k, kind)) => {
                m.remove_concurrent(k.clone(), *kind, env).unwrap();
            }
            Op::Count(k, n) => m.increment(k, *n, env).unwrap(),
        }
    }

    proptest! {
        #[test]
        fn merge_laws(steps in steps(op_strategy())) {
            let states = simulate(&Map::new(), &steps, apply);
            check_lattice(&states)?;
            check_converged(&states)?;
        }

        #[test]
        fn delta_matches_full_merge(steps in steps(op_strategy())) {
            let states = simulate(&Map::new(), &steps, apply);
            check_delta(&states)?;
        }
    }
}
