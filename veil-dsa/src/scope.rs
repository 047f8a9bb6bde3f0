#![forbid(unsafe_code)]

use std::collections::HashMap;

use tracing::{debug, trace};
use veil_ir::{LocalId, ProcId, Procedure, Stmt, Variable};

use crate::global_env::GlobalEnv;

/// Current incarnation and version number of one declared variable.
#[derive(Clone, Debug)]
pub struct Binding {
    pub var: Variable,
    pub version: u32,
}

struct Frame {
    bindings: Vec<Binding>,
    stmts: Vec<Stmt>,
}

/// Per-procedure versioning state: a stack of binding frames mirroring the
/// block structure being converted, plus a per-variable persist cache that
/// outlives individual frames.
///
/// Every `push` copies the top binding row by value, so branch exploration
/// never mutates the parent frame through aliasing.
pub struct ProcEnv<'g, 'a> {
    global: &'g mut GlobalEnv<'a>,
    proc_id: ProcId,
    /// Original declarations, indexed by the input program's local ids.
    originals: Vec<Variable>,
    frames: Vec<Frame>,
    /// Per original variable: version number -> incarnation. Persists for
    /// the whole procedure pass so re-derived versions reuse the same
    /// incarnation.
    caches: Vec<HashMap<u32, Variable>>,
    /// Procedure-local slice of the global alias table.
    aliases: Vec<Vec<LocalId>>,
    next_local: u32,
    /// This procedure's incarnations, in creation order.
    created: Vec<Variable>,
}

impl<'g, 'a> ProcEnv<'g, 'a> {
    pub fn new(global: &'g mut GlobalEnv<'a>, proc: &Procedure) -> Self {
        let originals = proc.vars.clone();
        let bindings = originals
            .iter()
            .map(|v| Binding {
                var: v.clone(),
                version: 0,
            })
            .collect();
        let caches = originals
            .iter()
            .map(|v| HashMap::from([(0, v.clone())]))
            .collect();

        // Filter the global alias table down to this procedure. Entries
        // whose target does not resolve locally belong to some other
        // procedure and are irrelevant here.
        let mut aliases = Vec::with_capacity(originals.len());
        for v in &originals {
            let mut local: Vec<LocalId> = Vec::new();
            for g in global.aliases_of(v.global) {
                match proc.global_to_local.get(g) {
                    Some(l) => local.push(*l),
                    None => trace!(
                        var = %v.qualified_name,
                        alias = g.0,
                        "alias target not local to this procedure, dropped"
                    ),
                }
            }
            aliases.push(local);
        }

        let next_local = originals.len() as u32;
        Self {
            global,
            proc_id: proc.sig.id,
            originals,
            frames: vec![Frame {
                bindings,
                stmts: Vec::new(),
            }],
            caches,
            aliases,
            next_local,
            created: Vec::new(),
        }
    }

    /// Open a nested frame seeded with a by-value copy of the current
    /// bindings and an empty statement accumulator.
    pub fn push(&mut self) {
        let bindings = self.top().bindings.clone();
        self.frames.push(Frame {
            bindings,
            stmts: Vec::new(),
        });
    }

    /// Close the top frame, returning its final bindings and accumulated
    /// statements in emission order. The parent frame is unaffected.
    pub fn pop(&mut self) -> (Vec<Binding>, Vec<Stmt>) {
        let frame = self.frames.pop().expect("scope stack underflow");
        (frame.bindings, frame.stmts)
    }

    pub fn emit(&mut self, stmt: Stmt) {
        self.top_mut().stmts.push(stmt);
    }

    pub fn current(&self, id: LocalId) -> &Variable {
        &self.top().bindings[id.index()].var
    }

    pub fn version(&self, id: LocalId) -> u32 {
        self.top().bindings[id.index()].version
    }

    pub(crate) fn set_binding(&mut self, id: LocalId, var: Variable, version: u32) {
        let binding = &mut self.top_mut().bindings[id.index()];
        binding.var = var;
        binding.version = version;
    }

    /// Mint the next incarnation of `id`: a clone of the original
    /// declaration with its name suffixed `#<version>` and fresh local and
    /// global ids, registered with the global environment.
    pub fn new_version(&mut self, id: LocalId) -> Variable {
        let version = self.version(id) + 1;
        let decl = &self.originals[id.index()];
        let var = Variable {
            name: format!("{}#{version}", decl.name),
            qualified_name: format!("{}#{version}", decl.qualified_name),
            ty: decl.ty.clone(),
            global: self.global.fresh_global_id(),
            local: LocalId(self.next_local),
            by_ref: decl.by_ref,
            param_index: decl.param_index,
            proc: self.proc_id,
        };
        self.next_local += 1;
        debug!(var = %var.qualified_name, version, "new incarnation");
        self.caches[id.index()].insert(version, var.clone());
        self.global.record(var.clone());
        self.created.push(var.clone());
        self.set_binding(id, var.clone(), version);
        var
    }

    /// Advance `id` to its next version, reusing the cached incarnation if
    /// this exact version was already minted on another path. For a fixed
    /// `(id, version)` pair within one procedure pass the result is always
    /// the identical variable.
    pub fn fresh_version(&mut self, id: LocalId) -> Variable {
        let version = self.version(id) + 1;
        if let Some(var) = self.caches[id.index()].get(&version).cloned() {
            self.set_binding(id, var.clone(), version);
            return var;
        }
        self.new_version(id)
    }

    /// `fresh_version`, then havoc every local registered as a may-alias of
    /// `id`: a write through a possibly overlapping reference invalidates
    /// the known value of the aliased variable.
    pub fn fresh_aliased_version(&mut self, id: LocalId) -> Variable {
        let var = self.fresh_version(id);
        let aliases = self.aliases[id.index()].clone();
        for alias in aliases {
            if alias == id {
                continue;
            }
            trace!(
                var = %self.originals[id.index()].qualified_name,
                alias = %self.originals[alias.index()].qualified_name,
                "havoc through may-alias"
            );
            let _ = self.fresh_version(alias);
        }
        var
    }

    /// Tear down the base frame, yielding the converted body and this
    /// procedure's incarnations in creation order.
    pub fn finish(mut self) -> (Vec<Stmt>, Vec<Variable>) {
        let (_, stmts) = self.pop();
        debug_assert!(self.frames.is_empty(), "unbalanced scope stack");
        (stmts, self.created)
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("scope stack underflow")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("scope stack underflow")
    }
}
