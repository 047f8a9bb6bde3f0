#![forbid(unsafe_code)]

use std::collections::HashMap;

use veil_ir::{GlobalId, Variable};

/// May-alias relation over global variable ids, produced by an external
/// points-to analysis and consumed read-only here.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    entries: HashMap<GlobalId, Vec<GlobalId>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `var` may denote storage overlapping `may_alias`.
    pub fn record(&mut self, var: GlobalId, may_alias: GlobalId) {
        self.entries.entry(var).or_default().push(may_alias);
    }

    pub fn aliases_of(&self, var: GlobalId) -> &[GlobalId] {
        self.entries.get(&var).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pass-wide mutable state: the global id allocator and the accumulator of
/// every incarnation created anywhere in the pass, in creation order.
/// Threaded explicitly through the conversion, never ambient.
pub struct GlobalEnv<'a> {
    aliases: &'a AliasTable,
    next_global: u32,
    created: Vec<Variable>,
}

impl<'a> GlobalEnv<'a> {
    /// `first_free` must lie above every global id already present in the
    /// input program.
    pub fn new(aliases: &'a AliasTable, first_free: GlobalId) -> Self {
        Self {
            aliases,
            next_global: first_free.0,
            created: Vec::new(),
        }
    }

    /// Fresh, monotonically increasing global id, unique for the lifetime
    /// of one program-level pass.
    pub fn fresh_global_id(&mut self) -> GlobalId {
        let id = GlobalId(self.next_global);
        self.next_global += 1;
        id
    }

    /// Append a freshly minted incarnation to the pass-wide list.
    pub fn record(&mut self, var: Variable) {
        self.created.push(var);
    }

    pub fn aliases_of(&self, var: GlobalId) -> &[GlobalId] {
        self.aliases.aliases_of(var)
    }

    /// All incarnations created during the pass, in creation order.
    pub fn into_created(self) -> Vec<Variable> {
        self.created
    }
}
