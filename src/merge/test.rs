use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::engine::*;
use crate::merge::*;
use crate::options::MergeOptions;

#[derive(Default)]
struct MockScheduler {
    paused: Vec<usize>,
    continued: Vec<usize>,
    terminated: Vec<usize>,
    closing: HashSet<usize>,
}

impl MergeScheduler for MockScheduler {
    fn pause_state(&mut self, state: &StateRef) {
        self.paused.push(state.borrow().id);
    }

    fn continue_state(&mut self, state: &StateRef) {
        self.continued.push(state.borrow().id);
    }

    fn terminate_state(&mut self, state: &StateRef) {
        self.terminated.push(state.borrow().id);
    }

    fn in_close_merge(&self, state: &StateRef) -> bool {
        self.closing.contains(&state.borrow().id)
    }
}

struct TestMergeOptions {
    merge: bool,
}

impl MergeOptions for TestMergeOptions {
    fn use_merge(&self) -> bool {
        self.merge
    }

    fn debug_log_merge(&self) -> bool {
        false
    }
}

fn scheduler() -> (Rc<RefCell<MockScheduler>>, Rc<RefCell<dyn MergeScheduler>>) {
    let mock = Rc::new(RefCell::new(MockScheduler::default()));
    let dynamic: Rc<RefCell<dyn MergeScheduler>> = mock.clone();
    (mock, dynamic)
}

fn mk_state(id: usize, stepped: u64) -> StateRef {
    let state = ExecutionState::new_ref(id, 100);
    state.borrow_mut().stepped_instructions = stepped;
    state
}

#[test]
fn test_mean_tracks_closed_distances() {
    let (_, sched) = scheduler();
    let opener = mk_state(1, 0);
    let handler = MergeHandler::new(sched, &opener);
    assert_eq!(handler.borrow().get_mean(), 0.0);

    let a = mk_state(2, 10);
    let b = mk_state(3, 12);
    handler.borrow_mut().add_open_state(a.clone());
    handler.borrow_mut().add_open_state(b.clone());

    handler.borrow_mut().add_closed_state(a, 7);
    assert!((handler.borrow().get_mean() - 10.0).abs() < 1e-9);
    handler.borrow_mut().add_closed_state(b, 7);
    assert!((handler.borrow().get_mean() - 11.0).abs() < 1e-9);
    assert_eq!(handler.borrow().closed_state_count(), 2);
}

#[test]
fn test_mean_is_order_independent() {
    let distances = [3u64, 5, 7, 9];
    let mut means = Vec::new();
    for order in [[0usize, 1, 2, 3], [3, 1, 0, 2]].iter() {
        let (_, sched) = scheduler();
        let opener = mk_state(1, 0);
        let handler = MergeHandler::new(sched, &opener);
        for (i, &idx) in order.iter().enumerate() {
            let state = mk_state(10 + i, distances[idx]);
            handler.borrow_mut().add_open_state(state.clone());
            handler.borrow_mut().add_closed_state(state, 5);
        }
        means.push(handler.borrow().get_mean());
    }
    assert!((means[0] - 6.0).abs() < 1e-9);
    assert!((means[0] - means[1]).abs() < 1e-9);
}

#[test]
fn test_first_arrival_is_paused_alone() {
    let (mock, sched) = scheduler();
    let a = mk_state(1, 0);
    let handler = MergeHandler::new(sched, &a);
    a.borrow_mut().stepped_instructions = 10;
    handler.borrow_mut().add_closed_state(a.clone(), 5);

    assert_eq!(mock.borrow().paused, vec![1]);
    assert!(mock.borrow().terminated.is_empty());
    assert_eq!(handler.borrow().states_at_close_point(5), 1);
    assert!(handler.borrow().has_merged_states());
}

#[test]
fn test_second_arrival_merges_and_terminates() {
    // Open at I=0, fork into A and B, close at 10 and 12, merge succeeds
    let (mock, sched) = scheduler();
    let a = mk_state(1, 0);
    let b = mk_state(2, 12);
    let handler = MergeHandler::new(sched, &a);
    handler.borrow_mut().add_open_state(b.clone());
    a.borrow_mut().stepped_instructions = 10;

    handler.borrow_mut().add_closed_state(a.clone(), 5);
    handler.borrow_mut().add_closed_state(b.clone(), 5);

    assert_eq!(handler.borrow().closed_state_count(), 2);
    assert!((handler.borrow().get_mean() - 11.0).abs() < 1e-9);
    assert_eq!(mock.borrow().terminated, vec![2]);
    assert_eq!(mock.borrow().paused, vec![1]);
    assert_eq!(handler.borrow().states_at_close_point(5), 1);
    assert_eq!(handler.borrow().num_open_states(), 0);
}

#[test]
fn test_rejected_merge_pauses_both_until_release() {
    // Same scenario but the states cannot merge (different locations)
    let (mock, sched) = scheduler();
    let a = mk_state(1, 0);
    let b = mk_state(2, 12);
    b.borrow_mut().pc = 101;
    let handler = MergeHandler::new(sched, &a);
    handler.borrow_mut().add_open_state(b.clone());
    a.borrow_mut().stepped_instructions = 10;

    handler.borrow_mut().add_closed_state(a.clone(), 5);
    handler.borrow_mut().add_closed_state(b.clone(), 5);

    assert!(mock.borrow().terminated.is_empty());
    assert_eq!(mock.borrow().paused, vec![1, 2]);
    assert_eq!(handler.borrow().states_at_close_point(5), 2);

    handler.borrow_mut().release_states();
    assert_eq!(mock.borrow().continued, vec![1, 2]);
    assert!(!handler.borrow().has_merged_states());
}

#[test]
fn test_arrivals_at_distinct_close_points_do_not_meet() {
    let (mock, sched) = scheduler();
    let a = mk_state(1, 0);
    let b = mk_state(2, 12);
    let handler = MergeHandler::new(sched, &a);
    handler.borrow_mut().add_open_state(b.clone());
    a.borrow_mut().stepped_instructions = 10;

    handler.borrow_mut().add_closed_state(a.clone(), 5);
    handler.borrow_mut().add_closed_state(b.clone(), 6);

    assert!(mock.borrow().terminated.is_empty());
    assert_eq!(mock.borrow().paused, vec![1, 2]);
    assert_eq!(handler.borrow().states_at_close_point(5), 1);
    assert_eq!(handler.borrow().states_at_close_point(6), 1);
}

#[test]
fn test_prioritize_state_gate() {
    // closeMean = 6; open states at distances 5, 100, 8; candidates are
    // those under 12, ties resolved by insertion order
    let (mock, sched) = scheduler();
    let opener = mk_state(1, 0);
    let handler = MergeHandler::new(sched, &opener);
    opener.borrow_mut().stepped_instructions = 6;
    handler.borrow_mut().add_closed_state(opener, 99);

    let s5 = mk_state(5, 5);
    let s100 = mk_state(6, 100);
    let s8 = mk_state(7, 8);
    handler.borrow_mut().add_open_state(s5.clone());
    handler.borrow_mut().add_open_state(s100.clone());
    handler.borrow_mut().add_open_state(s8.clone());

    let picked = handler.borrow().get_prioritize_state().unwrap();
    assert_eq!(picked.borrow().id, 5);

    mock.borrow_mut().closing.insert(5);
    let picked = handler.borrow().get_prioritize_state().unwrap();
    assert_eq!(picked.borrow().id, 7);

    mock.borrow_mut().closing.insert(7);
    assert!(handler.borrow().get_prioritize_state().is_none());
}

#[test]
fn test_prioritize_state_none_before_first_close() {
    let (_, sched) = scheduler();
    let opener = mk_state(1, 5);
    let handler = MergeHandler::new(sched, &opener);
    // Mean is zero, so no distance can be under twice the mean
    assert!(handler.borrow().get_prioritize_state().is_none());
}

#[test]
#[should_panic]
fn test_remove_unknown_open_state_panics() {
    let (_, sched) = scheduler();
    let opener = mk_state(1, 0);
    let handler = MergeHandler::new(sched, &opener);
    let other = mk_state(2, 0);
    handler.borrow_mut().remove_open_state(&other);
}

#[test]
fn test_open_merge_registers_region() {
    let (_, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };
    let state = mk_state(1, 0);

    let handler = open_merge(&mut registry, &sched, &state, &opts).unwrap();
    assert_eq!(registry.num_active_groups(), 1);
    assert_eq!(state.borrow().open_merge_stack.len(), 1);
    assert_eq!(handler.borrow().num_open_states(), 1);
}

#[test]
fn test_open_merge_disabled_is_a_no_op() {
    let (_, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: false };
    let state = mk_state(1, 0);

    assert!(open_merge(&mut registry, &sched, &state, &opts).is_none());
    assert_eq!(registry.num_active_groups(), 0);
    assert!(state.borrow().open_merge_stack.is_empty());
}

#[test]
fn test_close_merge_without_open_region() {
    let opts = TestMergeOptions { merge: true };
    let state = mk_state(1, 0);
    assert!(!close_merge(&state, 5, &opts));
}

#[test]
fn test_fork_joins_enclosing_regions() {
    let (_, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };
    let parent = mk_state(1, 0);

    let handler = open_merge(&mut registry, &sched, &parent, &opts).unwrap();
    let child = Rc::new(RefCell::new(parent.borrow().clone()));
    child.borrow_mut().id = 2;
    register_fork(&child);

    assert_eq!(handler.borrow().num_open_states(), 2);
    assert!(handler.borrow().contains_open_state(&child));
}

#[test]
fn test_region_releases_paused_states_on_last_close() {
    // A pauses at the close point; B fails to merge and pauses too; when the
    // last participant has closed, the region ends and both continue.
    let (mock, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };

    let a = mk_state(1, 0);
    open_merge(&mut registry, &sched, &a, &opts);
    let b = Rc::new(RefCell::new(a.borrow().clone()));
    b.borrow_mut().id = 2;
    b.borrow_mut().pc = 101;
    register_fork(&b);

    a.borrow_mut().stepped_instructions = 10;
    b.borrow_mut().stepped_instructions = 12;

    assert!(close_merge(&a, 5, &opts));
    assert_eq!(mock.borrow().paused, vec![1]);
    assert!(mock.borrow().continued.is_empty());
    assert_eq!(registry.num_active_groups(), 1);

    assert!(close_merge(&b, 5, &opts));
    // Last reference dropped with B's close: the handler released both
    assert_eq!(mock.borrow().paused, vec![1, 2]);
    assert_eq!(mock.borrow().continued, vec![1, 2]);
    assert_eq!(registry.num_active_groups(), 0);
}

#[test]
fn test_region_release_on_terminated_participant() {
    let (mock, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };

    let a = mk_state(1, 0);
    open_merge(&mut registry, &sched, &a, &opts);
    let b = Rc::new(RefCell::new(a.borrow().clone()));
    b.borrow_mut().id = 2;
    register_fork(&b);

    assert!(close_merge(&a, 5, &opts));
    // B dies inside the region (e.g. an error path): it leaves the open set
    // and drops its handler reference, which ends the region
    release_state(&b);

    assert_eq!(mock.borrow().continued, vec![1]);
    assert_eq!(registry.num_active_groups(), 0);
}

#[test]
fn test_registry_polls_topmost_region() {
    let (_, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };

    let outer_state = mk_state(1, 0);
    let outer = open_merge(&mut registry, &sched, &outer_state, &opts).unwrap();
    let inner_state = mk_state(2, 0);
    let inner = open_merge(&mut registry, &sched, &inner_state, &opts).unwrap();

    assert_eq!(registry.num_active_groups(), 2);
    let topmost = registry.topmost().unwrap();
    assert!(Rc::ptr_eq(&topmost, &inner));
    assert!(!Rc::ptr_eq(&topmost, &outer));

    // With no closed state yet the topmost region offers no candidate
    assert!(registry.prioritized_state().is_none());
}

#[test]
fn test_states_are_not_shared_across_sequential_regions() {
    let (_, sched) = scheduler();
    let mut registry = MergeGroupRegistry::new();
    let opts = TestMergeOptions { merge: true };

    let state = mk_state(1, 0);
    let first = open_merge(&mut registry, &sched, &state, &opts).unwrap();
    assert!(close_merge(&state, 5, &opts));
    assert_eq!(first.borrow().num_open_states(), 0);

    state.borrow_mut().stepped_instructions = 20;
    let second = open_merge(&mut registry, &sched, &state, &opts).unwrap();
    assert!(second.borrow().contains_open_state(&state));
    assert!(!first.borrow().contains_open_state(&state));
    drop(first);
}
