#![forbid(unsafe_code)]

use veil_ir::{BinOp, Expr, ExprKind};

use crate::bounds;
use crate::error::DsaError;
use crate::scope::ProcEnv;

/// Rewrite an expression against the current bindings: variable references
/// resolve to their current incarnation, operands convert left to right
/// (bounds checks must land in program order relative to nested accesses),
/// and every array read triggers bounds-check emission as a side effect.
pub fn convert_expr(env: &mut ProcEnv<'_, '_>, expr: &Expr) -> Result<Expr, DsaError> {
    match &expr.kind {
        ExprKind::IntLit(_) | ExprKind::BoolLit(_) => Ok(expr.clone()),

        ExprKind::Var(v) => Ok(Expr::var(env.current(v.local).clone(), expr.span)),

        ExprKind::Unary { op, ty, operand } => {
            let operand = convert_expr(env, operand)?;
            Ok(Expr::unary(*op, ty.clone(), operand, expr.span))
        }

        ExprKind::Binary {
            op,
            ty,
            left,
            right,
        } => {
            let left = convert_expr(env, left)?;
            let right = convert_expr(env, right)?;
            if *op == BinOp::Select {
                bounds::emit_index_check(env, &left, &right)?;
            }
            Ok(Expr::binary(*op, ty.clone(), left, right, expr.span))
        }

        ExprKind::Ternary {
            op,
            ty,
            first,
            second,
            third,
        } => {
            let first = convert_expr(env, first)?;
            let second = convert_expr(env, second)?;
            let third = convert_expr(env, third)?;
            Ok(Expr {
                span: expr.span,
                kind: ExprKind::Ternary {
                    op: *op,
                    ty: ty.clone(),
                    first: Box::new(first),
                    second: Box::new(second),
                    third: Box::new(third),
                },
            })
        }
    }
}
