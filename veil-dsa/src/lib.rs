#![forbid(unsafe_code)]

pub mod bounds;
pub mod error;
pub mod expr;
pub mod global_env;
pub mod scope;
pub mod stmt;

pub use error::DsaError;
pub use expr::convert_expr;
pub use global_env::{AliasTable, GlobalEnv};
pub use scope::{Binding, ProcEnv};
pub use stmt::convert_stmt;

use tracing::debug;
use veil_ir::{GlobalId, Procedure, Program};

/// Convert a whole program into dynamic-single-assignment form with
/// bounds-check obligations.
///
/// The input is never mutated: the result is a new program whose procedure
/// bodies are fully replaced by their converted form, whose per-procedure
/// variable arrays carry the freshly minted incarnations appended after the
/// originals in creation order, and whose global variable array is extended
/// with every incarnation created anywhere in the pass, in the order
/// procedures were processed.
pub fn convert_program(program: &Program, aliases: &AliasTable) -> Result<Program, DsaError> {
    let first_free = program
        .max_global_id()
        .map(|g| GlobalId(g.0 + 1))
        .unwrap_or(GlobalId(0));
    let mut genv = GlobalEnv::new(aliases, first_free);

    let mut procs = Vec::with_capacity(program.procs.len());
    for proc in &program.procs {
        debug!(procedure = %proc.sig.qualified_name, "converting procedure");
        let mut env = ProcEnv::new(&mut genv, proc);
        for stmt in &proc.body {
            stmt::convert_stmt(&mut env, stmt)?;
        }
        let (body, created) = env.finish();

        let mut vars = proc.vars.clone();
        let mut global_to_local = proc.global_to_local.clone();
        for v in &created {
            global_to_local.insert(v.global, v.local);
        }
        vars.extend(created);

        procs.push(Procedure {
            sig: proc.sig.clone(),
            body,
            vars,
            scope_offsets: proc.scope_offsets.clone(),
            global_to_local,
            is_leaf: proc.is_leaf,
        });
    }

    let mut globals = program.globals.clone();
    globals.extend(genv.into_created());
    Ok(Program { procs, globals })
}
