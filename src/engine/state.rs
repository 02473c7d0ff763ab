use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::call_trace::CallPath;
use crate::expr::*;
use crate::merge::MergeHandler;

/// Identity of an instruction inside the loaded program, as assigned by the
/// interpreter. The core never dereferences it.
pub type InstrId = u64;

pub type StateRef = Rc<RefCell<ExecutionState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbolic {
    pub name: String,
    pub size: usize,
}

/// One execution in progress. The interpreter owns the authoritative state
/// registry; the core only holds shared references and never schedules a
/// state itself.
#[derive(Clone)]
pub struct ExecutionState {
    pub id: usize,
    pub pc: InstrId,
    pub stepped_instructions: u64,
    pub constraints: Vec<ExprRef>,
    pub address_space: BTreeMap<u64, ExprRef>,
    pub symbolics: Vec<Symbolic>,
    pub call_path: CallPath,
    pub concrete_branches: Vec<u8>,
    pub symbolic_branches: Vec<u8>,
    // Innermost merge region last
    pub open_merge_stack: Vec<Rc<RefCell<MergeHandler>>>,
}

impl ExecutionState {
    pub fn new(id: usize, pc: InstrId) -> Self {
        Self {
            id,
            pc,
            stepped_instructions: 0,
            constraints: Vec::new(),
            address_space: BTreeMap::new(),
            symbolics: Vec::new(),
            call_path: Vec::new(),
            concrete_branches: Vec::new(),
            symbolic_branches: Vec::new(),
            open_merge_stack: Vec::new(),
        }
    }

    pub fn new_ref(id: usize, pc: InstrId) -> StateRef {
        Rc::new(RefCell::new(Self::new(id, pc)))
    }

    pub fn add_constraint(&mut self, cond: ExprRef) {
        self.constraints.push(cond);
    }

    /// Best-effort join of `other` into `self`. Succeeds only when both
    /// states sit at the same program location with the same symbolic layout
    /// and call history. The merged constraints are the common set plus the
    /// disjunction of the two leftover conjunctions; memory cells the states
    /// disagree on become if-then-else on the left state's leftover
    /// conjunction.
    pub fn merge(&mut self, other: &ExecutionState) -> bool {
        if self.pc != other.pc {
            return false;
        }
        if self.symbolics != other.symbolics {
            return false;
        }
        if self.call_path != other.call_path {
            return false;
        }
        if self.address_space.len() != other.address_space.len()
            || !self
                .address_space
                .keys()
                .zip(other.address_space.keys())
                .all(|(a, b)| a == b)
        {
            return false;
        }

        let own: HashSet<ExprRef> = self.constraints.iter().cloned().collect();
        let theirs: HashSet<ExprRef> = other.constraints.iter().cloned().collect();
        let common: Vec<ExprRef> = self.constraints.iter().filter(|c| theirs.contains(*c)).cloned().collect();
        let own_suffix: Vec<ExprRef> = self.constraints.iter().filter(|c| !theirs.contains(*c)).cloned().collect();
        let their_suffix: Vec<ExprRef> = other.constraints.iter().filter(|c| !own.contains(*c)).cloned().collect();
        let in_own = SymExpr::and_all(&own_suffix);
        let in_theirs = SymExpr::and_all(&their_suffix);

        for (addr, val) in self.address_space.iter_mut() {
            let other_val = &other.address_space[addr];
            if *val != *other_val {
                *val = SymExpr::ite(in_own.clone(), val.clone(), other_val.clone());
            }
        }

        self.constraints = common;
        self.constraints.push(SymExpr::or(in_own, in_theirs));
        true
    }
}
