//! Open graph fragments and their composition primitives.
//!
//! A fragment is a pair of entry and exit instructions: empty while the
//! entry is unset, open while an exit awaits a successor, closed once a
//! terminator (or an adopted join) ends it. `temp_index` tracks the
//! expression-stack height flowing through the fragment; `bind` allocates
//! one slot, `perform` none, and both release one slot per operand.

use crate::builder::FlowGraphBuilder;
use crate::ir::instruction::{BlockInfo, DefInfo};
use crate::ir::{Computation, InstrId, InstructionKind, SuccessorSlot, Value};

pub(crate) fn target_entry_kind() -> InstructionKind {
    InstructionKind::TargetEntry {
        try_index: None,
        block: BlockInfo::default(),
    }
}

pub(crate) fn join_entry_kind() -> InstructionKind {
    InstructionKind::JoinEntry {
        phis: Vec::new(),
        block: BlockInfo::default(),
    }
}

#[derive(Debug)]
pub struct Fragment {
    pub entry: Option<InstrId>,
    pub exit: Option<InstrId>,
    pub temp_index: usize,
}

impl Fragment {
    pub fn new(temp_index: usize) -> Self {
        Fragment {
            entry: None,
            exit: None,
            temp_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn is_open(&self) -> bool {
        self.is_empty() || self.exit.is_some()
    }

    pub fn close(&mut self) {
        self.exit = None;
    }
}

/// A closed fragment ending in a branch whose two successors are still
/// unset; the slots stay settable through the graph arena.
#[derive(Debug)]
pub struct TestFragment {
    pub entry: InstrId,
    pub temp_index: usize,
    branch: InstrId,
}

impl TestFragment {
    pub(crate) fn new(entry: InstrId, temp_index: usize, branch: InstrId) -> Self {
        TestFragment {
            entry,
            temp_index,
            branch,
        }
    }

    pub fn true_successor_slot(&self) -> SuccessorSlot {
        SuccessorSlot::True(self.branch)
    }

    pub fn false_successor_slot(&self) -> SuccessorSlot {
        SuccessorSlot::False(self.branch)
    }
}

impl<'a> FlowGraphBuilder<'a> {
    fn splice(&mut self, frag: &mut Fragment, id: InstrId) {
        if frag.is_empty() {
            frag.entry = Some(id);
        } else {
            self.graph.set_successor(frag.exit.expect("fragment is open"), id);
        }
        frag.exit = Some(id);
    }

    /// Splice `other` behind this fragment, adopting its exit and temp
    /// height. No-op when `other` is empty.
    pub(crate) fn append(&mut self, frag: &mut Fragment, other: Fragment) {
        assert!(frag.is_open());
        if other.is_empty() {
            return;
        }
        if frag.is_empty() {
            frag.entry = other.entry;
        } else {
            self.graph
                .set_successor(frag.exit.expect("fragment is open"), other.entry.unwrap());
        }
        frag.exit = other.exit;
        frag.temp_index = other.temp_index;
    }

    /// Splice a (closed) test fragment behind this fragment. The caller
    /// wires the branch successors afterwards.
    pub(crate) fn append_test(&mut self, frag: &mut Fragment, test: &TestFragment) {
        assert!(frag.is_open());
        if frag.is_empty() {
            frag.entry = Some(test.entry);
        } else {
            self.graph
                .set_successor(frag.exit.expect("fragment is open"), test.entry);
        }
        frag.exit = None;
        frag.temp_index = test.temp_index;
    }

    /// Wrap a computation in a `Bind`, allocate its expression-stack slot
    /// and return a use of it.
    pub(crate) fn bind(&mut self, frag: &mut Fragment, comp: Computation) -> Value {
        assert!(frag.is_open());
        frag.temp_index -= comp.input_count();
        let def = DefInfo {
            temp_index: Some(frag.temp_index),
            ssa_temp_index: None,
        };
        frag.temp_index += 1;
        let id = self.graph.add(InstructionKind::Bind { comp, def });
        self.splice(frag, id);
        Value::Use(id)
    }

    /// Wrap a computation in a `Do`: evaluated for effect, no slot
    /// allocated.
    pub(crate) fn perform(&mut self, frag: &mut Fragment, comp: Computation) {
        assert!(frag.is_open());
        frag.temp_index -= comp.input_count();
        let id = self.graph.add(InstructionKind::Do { comp });
        self.splice(frag, id);
    }

    /// Splice a prebuilt non-Bind/non-Do instruction (block entries,
    /// branches, terminators).
    pub(crate) fn add_instruction(&mut self, frag: &mut Fragment, id: InstrId) {
        assert!(frag.is_open());
        assert!(!matches!(
            self.graph.kind(id),
            InstructionKind::Bind { .. } | InstructionKind::Do { .. }
        ));
        frag.temp_index -= self.graph.instr(id).input_count();
        if self.graph.instr(id).is_definition() {
            let temp = frag.temp_index;
            frag.temp_index += 1;
            self.graph
                .instr_mut(id)
                .def_info_mut()
                .expect("definition")
                .temp_index = Some(temp);
        }
        self.splice(frag, id);
    }

    /// Attach a fragment behind a block entry; returns the resulting exit
    /// (the entry itself for an empty fragment, nothing for a closed one).
    pub(crate) fn append_fragment(
        &mut self,
        entry: InstrId,
        fragment: Fragment,
    ) -> Option<InstrId> {
        if fragment.is_empty() {
            return Some(entry);
        }
        self.graph.set_successor(entry, fragment.entry.unwrap());
        fragment.exit
    }

    /// Append `test` and wire `true_frag`/`false_frag` to its successors,
    /// merging open arms through a fresh join.
    pub(crate) fn join(
        &mut self,
        frag: &mut Fragment,
        test: TestFragment,
        true_frag: Fragment,
        false_frag: Fragment,
    ) {
        assert!(frag.is_open());
        self.append_test(frag, &test);

        let true_entry = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.true_successor_slot(), true_entry);
        let true_temp = true_frag.temp_index;
        let true_exit = self.append_fragment(true_entry, true_frag);

        let false_entry = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.false_successor_slot(), false_entry);
        let false_temp = false_frag.temp_index;
        let false_exit = self.append_fragment(false_entry, false_frag);

        match (true_exit, false_exit) {
            (None, None) => frag.exit = None,
            (None, Some(false_exit)) => {
                frag.exit = Some(false_exit);
                frag.temp_index = false_temp;
            }
            (Some(true_exit), None) => {
                frag.exit = Some(true_exit);
                frag.temp_index = true_temp;
            }
            (Some(true_exit), Some(false_exit)) => {
                let join = self.graph.add(join_entry_kind());
                self.graph.set_successor(true_exit, join);
                self.graph.set_successor(false_exit, join);
                assert_eq!(true_temp, false_temp, "temp indices diverge at join");
                frag.exit = Some(join);
                frag.temp_index = true_temp;
            }
        }
    }

    /// Append `while (test) body`: the body loops back to the test
    /// (through a fresh join when the body stays open) and the fragment
    /// exits through the test's false successor.
    pub(crate) fn tie_loop(&mut self, frag: &mut Fragment, test: TestFragment, body: Fragment) {
        assert!(frag.is_open());

        let body_entry = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.true_successor_slot(), body_entry);
        let body_exit = self.append_fragment(body_entry, body);

        match body_exit {
            None => self.append_test(frag, &test),
            Some(body_exit) => {
                let loop_join = self.graph.add(join_entry_kind());
                self.add_instruction(frag, loop_join);
                self.graph.set_successor(loop_join, test.entry);
                self.graph.set_successor(body_exit, loop_join);
            }
        }

        let loop_exit = self.graph.add(target_entry_kind());
        self.graph
            .set_branch_successor(test.false_successor_slot(), loop_exit);
        frag.exit = Some(loop_exit);
    }
}
