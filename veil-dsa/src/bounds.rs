#![forbid(unsafe_code)]

use veil_ir::{AssertStmt, AssumeStmt, Expr, Stmt, Type};

use crate::error::DsaError;
use crate::scope::ProcEnv;

/// Synthesize the `0 <= index && index < length` obligation for one array
/// access and emit it as an assertion (proof obligation) immediately
/// followed by an assumption (downstream reasoning may rely on it), both
/// placed directly before the access. `base` and `index` are already
/// converted.
pub fn emit_index_check(
    env: &mut ProcEnv<'_, '_>,
    base: &Expr,
    index: &Expr,
) -> Result<(), DsaError> {
    let len = match base.ty() {
        Type::Array { len, .. } => len,
        other => {
            return Err(DsaError::NotAnArray {
                found: other.to_string(),
                span: base.span,
            });
        }
    };

    let span = index.span;
    let prop = Expr::and(
        Expr::le(Expr::int(0, span), index.clone(), span),
        Expr::lt(index.clone(), Expr::int(len as i64, span), span),
        span,
    );
    env.emit(Stmt::Assert(AssertStmt {
        span,
        expr: prop.clone(),
    }));
    env.emit(Stmt::Assume(AssumeStmt { span, expr: prop }));
    Ok(())
}
