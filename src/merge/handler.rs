use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::engine::*;

/// One dynamic region between an `open_merge` call and its matching close
/// points. Tracks the states still running inside the region, the states
/// paused at each close point, and a running mean of the instruction
/// distance from the opening point, used to keep siblings advancing roughly
/// together.
///
/// The handler is shared by every participating state; when the last
/// reference is dropped the paused states are released.
pub struct MergeHandler {
    scheduler: Rc<RefCell<dyn MergeScheduler>>,
    open_instruction: u64,
    open_states: Vec<StateRef>,
    reached_close: BTreeMap<InstrId, Vec<StateRef>>,
    closed_state_count: u64,
    close_mean: f64,
}

impl MergeHandler {
    pub fn new(scheduler: Rc<RefCell<dyn MergeScheduler>>, state: &StateRef) -> Rc<RefCell<MergeHandler>> {
        let open_instruction = state.borrow().stepped_instructions;
        let handler = Rc::new(RefCell::new(MergeHandler {
            scheduler,
            open_instruction,
            open_states: Vec::new(),
            reached_close: BTreeMap::new(),
            closed_state_count: 0,
            close_mean: 0.0,
        }));
        handler.borrow_mut().add_open_state(state.clone());
        handler
    }

    pub fn open_instruction(&self) -> u64 {
        self.open_instruction
    }

    pub fn get_mean(&self) -> f64 {
        if self.closed_state_count == 0 {
            return 0.0;
        }
        self.close_mean
    }

    pub fn closed_state_count(&self) -> u64 {
        self.closed_state_count
    }

    pub fn instr_distance(&self, state: &StateRef) -> u64 {
        state.borrow().stepped_instructions - self.open_instruction
    }

    /// Scheduler hint: the first open state, in insertion order, that is not
    /// already entering a close point and whose distance stays under twice
    /// the running mean.
    pub fn get_prioritize_state(&self) -> Option<StateRef> {
        let scheduler = self.scheduler.borrow();
        for state in self.open_states.iter() {
            let state_is_closing = scheduler.in_close_merge(state);
            if !state_is_closing && (self.instr_distance(state) as f64) < 2.0 * self.get_mean() {
                return Some(state.clone());
            }
        }
        None
    }

    pub fn add_open_state(&mut self, state: StateRef) {
        debug_assert!(!self.contains_open_state(&state));
        self.open_states.push(state);
    }

    pub fn contains_open_state(&self, state: &StateRef) -> bool {
        self.open_states.iter().any(|s| Rc::ptr_eq(s, state))
    }

    pub fn remove_open_state(&mut self, state: &StateRef) {
        let idx = self
            .open_states
            .iter()
            .position(|s| Rc::ptr_eq(s, state))
            .expect("state is not in the open set");
        self.open_states.swap_remove(idx);
    }

    pub fn num_open_states(&self) -> usize {
        self.open_states.len()
    }

    /// A state reached `close_point`. The first arrival is paused there;
    /// later arrivals try to merge into the paused peers oldest-first and
    /// are terminated on the first acceptance, otherwise paused alongside.
    pub fn add_closed_state(&mut self, state: StateRef, close_point: InstrId) {
        // Update stats
        self.closed_state_count += 1;
        let distance = self.instr_distance(&state) as f64;
        self.close_mean += (distance - self.close_mean) / self.closed_state_count as f64;

        self.remove_open_state(&state);

        if !self.reached_close.contains_key(&close_point) {
            // No other state has encountered this close point yet
            self.reached_close.insert(close_point, vec![state.clone()]);
            self.scheduler.borrow_mut().pause_state(&state);
        } else {
            let bucket = self.reached_close.get_mut(&close_point).unwrap();
            let mut merged_successful = false;
            for peer in bucket.iter() {
                let merged = peer.borrow_mut().merge(&state.borrow());
                if merged {
                    self.scheduler.borrow_mut().terminate_state(&state);
                    merged_successful = true;
                    break;
                }
            }
            if !merged_successful {
                bucket.push(state.clone());
                self.scheduler.borrow_mut().pause_state(&state);
            }
        }
    }

    /// Continue every paused state and forget the close points.
    pub fn release_states(&mut self) {
        for (_, bucket) in self.reached_close.iter() {
            for state in bucket.iter() {
                self.scheduler.borrow_mut().continue_state(state);
            }
        }
        self.reached_close.clear();
    }

    pub fn has_merged_states(&self) -> bool {
        !self.reached_close.is_empty()
    }

    pub fn states_at_close_point(&self, close_point: InstrId) -> usize {
        self.reached_close.get(&close_point).map_or(0, |b| b.len())
    }
}

impl Drop for MergeHandler {
    fn drop(&mut self) {
        self.release_states();
    }
}
