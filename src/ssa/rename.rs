//! SSA renaming with local-variable elimination.
//!
//! Renaming walks the dominator tree carrying an environment: one slot per
//! frame variable, with the tail of the same array doubling as the
//! expression stack. Load/store-local instructions are deleted; loads push
//! the variable's current value, stores update the slot. Every surviving
//! bind gets a fresh, globally unique `ssa_temp_index`, and φ operands are
//! filled in edge order on the way down to each join.

use crate::error::{BuildError, BuildResult};
use crate::ir::instruction::DefInfo;
use crate::ir::{Computation, Environment, FlowGraph, InstrId, InstructionKind, Value};
use crate::ssa::SsaParams;
use crate::types::Literal;

pub fn rename(
    graph: &mut FlowGraph,
    params: &SsaParams<'_>,
    next_ssa_index: &mut usize,
) -> BuildResult<()> {
    let entry = graph.graph_entry.expect("graph entry not set");
    if graph.block_successors(entry).len() > 1 {
        return Err(BuildError::bailout(
            params.function_name,
            "Catch-entry support in SSA.",
        ));
    }
    if params.copied_parameter_count > 0 {
        return Err(BuildError::bailout(
            params.function_name,
            "Copied parameter support in SSA",
        ));
    }

    // Start environment: a fresh Parameter definition per fixed parameter,
    // null for every stack local.
    let mut start_env: Vec<Value> = Vec::with_capacity(params.variable_count);
    for index in 0..params.num_fixed_parameters {
        let param = graph.add(InstructionKind::Parameter {
            index,
            def: DefInfo {
                temp_index: None,
                ssa_temp_index: Some(*next_ssa_index),
            },
        });
        *next_ssa_index += 1;
        start_env.push(Value::Use(param));
    }
    for _ in params.num_fixed_parameters..params.variable_count {
        start_env.push(Value::Constant(Literal::Null));
    }

    let normal_entry = match &mut graph.instr_mut(entry).kind {
        InstructionKind::GraphEntry {
            normal_entry,
            start_env: slot,
            ..
        } => {
            *slot = Some(Environment::new(start_env.clone()));
            *normal_entry
        }
        _ => unreachable!("graph entry has the wrong kind"),
    };

    let mut renamer = Renamer {
        graph,
        var_count: params.variable_count,
        function_name: params.function_name,
        next_ssa_index,
    };
    let mut env = start_env;
    renamer.rename_recursive(normal_entry, &mut env)
}

struct Renamer<'g> {
    graph: &'g mut FlowGraph,
    var_count: usize,
    function_name: &'g str,
    next_ssa_index: &'g mut usize,
}

enum Step {
    Load { bit_index: usize },
    Store { bit_index: usize, value: Value, is_bind: bool },
    Other { is_bind: bool },
}

impl<'g> Renamer<'g> {
    fn fresh_ssa_index(&mut self) -> usize {
        let index = *self.next_ssa_index;
        *self.next_ssa_index += 1;
        index
    }

    fn rename_recursive(
        &mut self,
        block_entry: InstrId,
        env: &mut Vec<Value>,
    ) -> BuildResult<()> {
        // Phis of a join define their variables for the whole subtree.
        let phis = match self.graph.kind(block_entry) {
            InstructionKind::JoinEntry { phis, .. } => phis.clone(),
            _ => Vec::new(),
        };
        for (var_index, phi) in phis.iter().enumerate() {
            if let Some(phi_id) = phi {
                env[var_index] = Value::Use(*phi_id);
                let index = self.fresh_ssa_index();
                self.graph
                    .instr_mut(*phi_id)
                    .def_info_mut()
                    .expect("phi is a definition")
                    .ssa_temp_index = Some(index);
            }
        }

        let mut current = self.graph.instr(block_entry).successor;
        while let Some(id) = current {
            if self.graph.instr(id).is_block_entry() {
                break;
            }
            // Snapshot for deoptimization before any rewriting.
            self.graph.instr_mut(id).env = Some(Environment::new(env.clone()));

            // Pop the expression stack once per use; uses of load/store
            // locals are redirected to the variable's current value.
            let input_count = self.graph.instr(id).input_count();
            for i in 0..input_count {
                let value = self.graph.instr(id).input_at(i).clone();
                let def_id = match value {
                    Value::Use(def_id) => def_id,
                    Value::Constant(_) => continue,
                };
                if env.len() <= self.var_count {
                    return Err(BuildError::bailout(
                        self.function_name,
                        "expression stack underflow in SSA rename",
                    ));
                }
                env.pop();
                let replacement = match self.graph.kind(def_id) {
                    InstructionKind::Bind { comp, .. } => match comp {
                        Computation::LoadLocal { local, .. } => {
                            Some(env[local.bit_index()].clone())
                        }
                        Computation::StoreLocal { local, .. } => {
                            Some(env[local.bit_index()].clone())
                        }
                        _ => None,
                    },
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    self.graph.instr_mut(id).set_input_at(i, replacement);
                }
            }

            let step = match self.graph.kind(id) {
                InstructionKind::Bind { comp, .. } => match comp {
                    Computation::LoadLocal { local, .. } => Step::Load {
                        bit_index: local.bit_index(),
                    },
                    Computation::StoreLocal { local, value, .. } => Step::Store {
                        bit_index: local.bit_index(),
                        value: value.clone(),
                        is_bind: true,
                    },
                    _ => Step::Other { is_bind: true },
                },
                InstructionKind::Do { comp } => match comp {
                    Computation::LoadLocal { .. } => {
                        unreachable!("load-local has no effect-only form")
                    }
                    Computation::StoreLocal { local, value, .. } => Step::Store {
                        bit_index: local.bit_index(),
                        value: value.clone(),
                        is_bind: false,
                    },
                    _ => Step::Other { is_bind: false },
                },
                _ => Step::Other { is_bind: false },
            };

            match step {
                Step::Load { bit_index } => {
                    env.push(env[bit_index].clone());
                    current = self.graph.remove_from_graph(id);
                }
                Step::Store {
                    bit_index,
                    value,
                    is_bind,
                } => {
                    env[bit_index] = value;
                    if is_bind {
                        env.push(env[bit_index].clone());
                    }
                    current = self.graph.remove_from_graph(id);
                }
                Step::Other { is_bind } => {
                    if is_bind {
                        let index = self.fresh_ssa_index();
                        self.graph
                            .instr_mut(id)
                            .def_info_mut()
                            .expect("bind is a definition")
                            .ssa_temp_index = Some(index);
                        env.push(Value::Use(id));
                    }
                    current = self.graph.instr(id).successor;
                }
            }
        }

        // Recurse over the dominator tree with a copy of the environment.
        let dominated = self.graph.block_info(block_entry).dominated_blocks.clone();
        for block in dominated {
            let mut child_env = env.clone();
            self.rename_recursive(block, &mut child_env)?;
        }

        // Edge-split form: only single-successor blocks can flow into a
        // join. Fill this edge's φ operands from the current environment.
        let last = self
            .graph
            .block_info(block_entry)
            .last_instruction
            .expect("block not discovered");
        let successors = self.graph.block_successors(last);
        if successors.len() == 1 {
            let successor = successors[0];
            let phis = match self.graph.kind(successor) {
                InstructionKind::JoinEntry { phis, .. } => phis.clone(),
                _ => Vec::new(),
            };
            if !phis.is_empty() {
                let pred_index = self.graph.which_pred(successor, block_entry);
                for phi_id in phis.into_iter().flatten() {
                    if let InstructionKind::Phi {
                        var_index, inputs, ..
                    } = &mut self.graph.instr_mut(phi_id).kind
                    {
                        inputs[pred_index] = Some(env[*var_index].clone());
                    }
                }
            }
        }
        Ok(())
    }
}
