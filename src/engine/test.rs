use std::collections::BTreeMap;

use crate::engine::*;
use crate::expr::*;

fn compatible_pair() -> (ExecutionState, ExecutionState) {
    let mut a = ExecutionState::new(1, 100);
    let mut b = ExecutionState::new(2, 100);
    for s in [&mut a, &mut b].iter_mut() {
        s.symbolics.push(Symbolic {
            name: "packet".to_string(),
            size: 64,
        });
        s.address_space = {
            let mut mem = BTreeMap::new();
            mem.insert(16, SymExpr::int(1));
            mem
        };
    }
    (a, b)
}

#[test]
fn test_merge_disjoins_constraints() {
    let (mut a, mut b) = compatible_pair();
    let p = SymExpr::eq(SymExpr::sym("n"), SymExpr::int(0));
    let q = SymExpr::cmp(Predicate::Slt, SymExpr::sym("m"), SymExpr::int(10));
    let r = SymExpr::cmp(Predicate::Sge, SymExpr::sym("m"), SymExpr::int(10));
    a.constraints = vec![p.clone(), q.clone()];
    b.constraints = vec![p.clone(), r.clone()];

    assert!(a.merge(&b));
    assert_eq!(a.constraints, vec![p, SymExpr::or(q, r)]);
}

#[test]
fn test_merge_builds_ite_for_disagreeing_memory() {
    let (mut a, mut b) = compatible_pair();
    let q = SymExpr::cmp(Predicate::Slt, SymExpr::sym("m"), SymExpr::int(10));
    a.constraints = vec![q.clone()];
    b.constraints = vec![SymExpr::not(q.clone())];
    a.address_space.insert(32, SymExpr::int(1));
    b.address_space.insert(32, SymExpr::int(2));

    assert!(a.merge(&b));
    assert_eq!(
        a.address_space[&32],
        SymExpr::ite(q.clone(), SymExpr::int(1), SymExpr::int(2))
    );
    // The agreeing cell is untouched
    assert_eq!(a.address_space[&16], SymExpr::int(1));
}

#[test]
fn test_merge_rejects_different_location() {
    let (mut a, mut b) = compatible_pair();
    b.pc = 101;
    assert!(!a.merge(&b));
}

#[test]
fn test_merge_rejects_different_symbolics() {
    let (mut a, mut b) = compatible_pair();
    b.symbolics.push(Symbolic {
        name: "extra".to_string(),
        size: 8,
    });
    assert!(!a.merge(&b));
}

#[test]
fn test_merge_rejects_different_memory_domain() {
    let (mut a, mut b) = compatible_pair();
    b.address_space.insert(48, SymExpr::int(0));
    assert!(!a.merge(&b));
}

#[test]
fn test_merge_of_identical_states_keeps_constraints_common() {
    let (mut a, mut b) = compatible_pair();
    let p = SymExpr::eq(SymExpr::sym("n"), SymExpr::int(0));
    a.constraints = vec![p.clone()];
    b.constraints = vec![p.clone()];
    assert!(a.merge(&b));
    // Common prefix survives; the leftover disjunction is trivially true
    assert_eq!(a.constraints[0], p);
    assert_eq!(
        a.constraints[1],
        SymExpr::or(SymExpr::boolean(true), SymExpr::boolean(true))
    );
}
