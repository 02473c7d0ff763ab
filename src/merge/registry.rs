//! Process-level bookkeeping of live merge regions and the hooks the
//! interpreter calls around `open_merge` / `close_merge` / fork /
//! termination.
//!
//! Ownership follows the region protocol: every participating state holds a
//! strong handle to each enclosing handler on its `open_merge_stack`; the
//! registry keeps only weak handles and prunes the dead ones on access. When
//! the last participating state lets go, the handler drops and releases its
//! paused states.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::engine::*;
use crate::options::MergeOptions;

use super::handler::MergeHandler;

pub struct MergeGroupRegistry {
    groups: Vec<Weak<RefCell<MergeHandler>>>,
}

impl MergeGroupRegistry {
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    pub fn register(&mut self, handler: &Rc<RefCell<MergeHandler>>) {
        self.groups.push(Rc::downgrade(handler));
    }

    fn prune(&mut self) {
        self.groups.retain(|w| w.strong_count() > 0);
    }

    pub fn num_active_groups(&mut self) -> usize {
        self.prune();
        self.groups.len()
    }

    pub fn live_groups(&mut self) -> Vec<Rc<RefCell<MergeHandler>>> {
        self.prune();
        self.groups.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// The innermost active region, the one the scheduler polls.
    pub fn topmost(&mut self) -> Option<Rc<RefCell<MergeHandler>>> {
        self.prune();
        self.groups.last().and_then(|w| w.upgrade())
    }

    /// Scheduler hint from the topmost active region, if any qualifies.
    pub fn prioritized_state(&mut self) -> Option<StateRef> {
        self.topmost().and_then(|h| h.borrow().get_prioritize_state())
    }
}

/// A running state executed `open_merge`: construct the region handler bound
/// to it, register the region, and push it on the state's region stack.
/// Returns the handler, or `None` when merging is disabled.
pub fn open_merge(
    registry: &mut MergeGroupRegistry,
    scheduler: &Rc<RefCell<dyn MergeScheduler>>,
    state: &StateRef,
    options: &impl MergeOptions,
) -> Option<Rc<RefCell<MergeHandler>>> {
    if !options.use_merge() {
        return None;
    }
    let handler = MergeHandler::new(scheduler.clone(), state);
    registry.register(&handler);
    state.borrow_mut().open_merge_stack.push(handler.clone());
    if options.debug_log_merge() {
        println!(
            "open merge: state {} at instruction {}",
            state.borrow().id,
            handler.borrow().open_instruction()
        );
    }
    Some(handler)
}

/// A running state executed `close_merge` at `close_point`: hand it to the
/// innermost region. Returns false on an unpaired close (reported by the
/// caller, not an error).
pub fn close_merge(state: &StateRef, close_point: InstrId, options: &impl MergeOptions) -> bool {
    if !options.use_merge() {
        return true;
    }
    let handler = state.borrow_mut().open_merge_stack.pop();
    match handler {
        Some(handler) => {
            if options.debug_log_merge() {
                println!("close merge: state {} at instruction {}", state.borrow().id, close_point);
            }
            handler.borrow_mut().add_closed_state(state.clone(), close_point);
            true
        }
        None => false,
    }
}

/// A fork produced `child` inside the regions it inherited from its parent:
/// the child joins every enclosing region's open set.
pub fn register_fork(child: &StateRef) {
    let handlers: Vec<_> = child.borrow().open_merge_stack.clone();
    for handler in handlers {
        handler.borrow_mut().add_open_state(child.clone());
    }
}

/// A state is being terminated while still inside merge regions: it leaves
/// every open set and drops its handler references. Dropping the last
/// reference releases the region's paused states.
pub fn release_state(state: &StateRef) {
    let handlers: Vec<_> = std::mem::replace(&mut state.borrow_mut().open_merge_stack, Vec::new());
    for handler in handlers {
        {
            let mut h = handler.borrow_mut();
            if h.contains_open_state(state) {
                h.remove_open_state(state);
            }
        }
    }
}
