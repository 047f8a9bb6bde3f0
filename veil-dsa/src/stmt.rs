#![forbid(unsafe_code)]

use std::cmp::Ordering;

use veil_ir::{
    ArrayStoreStmt, AssertStmt, AssignStmt, AssumeStmt, BinOp, CallStmt, Expr, ExprKind, IfStmt,
    LocalId, RepeatUntilStmt, Stmt,
};

use crate::bounds;
use crate::error::DsaError;
use crate::expr::convert_expr;
use crate::scope::ProcEnv;

/// Convert one statement, emitting its converted form (and any synthesized
/// obligations) into the current frame.
pub fn convert_stmt(env: &mut ProcEnv<'_, '_>, stmt: &Stmt) -> Result<(), DsaError> {
    match stmt {
        Stmt::Assign(s) => {
            let value = convert_expr(env, &s.value)?;
            let target = env.fresh_aliased_version(s.target.local);
            env.emit(Stmt::Assign(AssignStmt {
                span: s.span,
                target,
                value,
            }));
            Ok(())
        }

        Stmt::Assert(s) => {
            let expr = convert_expr(env, &s.expr)?;
            env.emit(Stmt::Assert(AssertStmt { span: s.span, expr }));
            Ok(())
        }

        Stmt::Assume(s) => {
            let expr = convert_expr(env, &s.expr)?;
            env.emit(Stmt::Assume(AssumeStmt { span: s.span, expr }));
            Ok(())
        }

        Stmt::If(s) => convert_if(env, s),

        Stmt::RepeatUntil(s) => convert_repeat_until(env, s),

        Stmt::Call(s) => {
            let mut args = Vec::with_capacity(s.args.len());
            for a in &s.args {
                args.push(convert_expr(env, a)?);
            }
            // Outputs are written exactly like assignment targets, alias
            // havoc included. The callee body is never traversed.
            let mut outs = Vec::with_capacity(s.outs.len());
            for o in &s.outs {
                outs.push(env.fresh_aliased_version(o.local));
            }
            env.emit(Stmt::Call(CallStmt {
                span: s.span,
                outs,
                callee: s.callee.clone(),
                args,
            }));
            Ok(())
        }

        Stmt::ArrayStore(s) => convert_array_store(env, s),
    }
}

/// Branches convert in fresh frames seeded from the same pre-branch
/// bindings; afterwards the branch whose version ended older catches up via
/// an explicit copy-assignment into the newer incarnation, so no merge-point
/// phi node is ever needed.
fn convert_if(env: &mut ProcEnv<'_, '_>, s: &IfStmt) -> Result<(), DsaError> {
    let cond = convert_expr(env, &s.cond)?;

    env.push();
    for stmt in &s.then_body {
        convert_stmt(env, stmt)?;
    }
    let (then_tab, mut then_body) = env.pop();

    env.push();
    for stmt in &s.else_body {
        convert_stmt(env, stmt)?;
    }
    let (else_tab, mut else_body) = env.pop();

    for (slot, (t, e)) in then_tab.iter().zip(else_tab.iter()).enumerate() {
        let id = LocalId(slot as u32);
        match t.version.cmp(&e.version) {
            Ordering::Equal => {
                // Same version means the identical incarnation on both
                // sides; nothing to reconcile.
                env.set_binding(id, t.var.clone(), t.version);
            }
            Ordering::Less => {
                then_body.push(Stmt::Assign(AssignStmt {
                    span: s.span,
                    target: e.var.clone(),
                    value: Expr::var(t.var.clone(), s.span),
                }));
                env.set_binding(id, e.var.clone(), e.version);
            }
            Ordering::Greater => {
                else_body.push(Stmt::Assign(AssignStmt {
                    span: s.span,
                    target: t.var.clone(),
                    value: Expr::var(e.var.clone(), s.span),
                }));
                env.set_binding(id, t.var.clone(), t.version);
            }
        }
    }

    env.emit(Stmt::If(IfStmt {
        span: s.span,
        cond,
        then_body,
        else_body,
    }));
    Ok(())
}

/// Post-condition loops flatten into straight-line obligations:
///
///   assert inv            (entry, pre-loop bindings)
///   havoc loop-assigned variables
///   assume inv            (an arbitrary iteration starts)
///   body
///   assert !cond' ==> inv' (the iteration re-establishes the invariant)
///   assume cond'          (later code runs after loop exit)
fn convert_repeat_until(env: &mut ProcEnv<'_, '_>, s: &RepeatUntilStmt) -> Result<(), DsaError> {
    let entry_inv = convert_expr(env, &s.invariant)?;
    env.emit(Stmt::Assert(AssertStmt {
        span: s.span,
        expr: entry_inv,
    }));

    // Only top-level assignment statements of the body are scanned here;
    // writes nested in inner conditionals or loops are not havoced. A known
    // under-approximation, kept for compatibility with the consumers of
    // this pass.
    let mut assigned: Vec<LocalId> = Vec::new();
    for stmt in &s.body {
        if let Stmt::Assign(a) = stmt {
            if !assigned.contains(&a.target.local) {
                assigned.push(a.target.local);
            }
        }
    }
    for id in assigned {
        let _ = env.fresh_version(id);
    }

    let havoc_inv = convert_expr(env, &s.invariant)?;
    env.emit(Stmt::Assume(AssumeStmt {
        span: s.span,
        expr: havoc_inv,
    }));

    for stmt in &s.body {
        convert_stmt(env, stmt)?;
    }

    let cond = convert_expr(env, &s.cond)?;
    let exit_inv = convert_expr(env, &s.invariant)?;
    env.emit(Stmt::Assert(AssertStmt {
        span: s.span,
        expr: Expr::implies(Expr::not(cond.clone(), s.span), exit_inv, s.span),
    }));
    env.emit(Stmt::Assume(AssumeStmt {
        span: s.span,
        expr: cond,
    }));
    Ok(())
}

/// Rewrite `base[index] := value` (possibly multi-dimensional) into one
/// terminal assignment of nested functional updates, with a bounds-check
/// pair per subscript level, innermost index first.
fn convert_array_store(env: &mut ProcEnv<'_, '_>, s: &ArrayStoreStmt) -> Result<(), DsaError> {
    // Flatten the write target: levels[0] is the innermost access, the last
    // level's base is the plain-variable root the final assignment targets.
    let mut levels: Vec<(&Expr, &Expr)> = Vec::new();
    let mut base = &s.base;
    let mut index = &s.index;
    let root = loop {
        match &base.kind {
            ExprKind::Var(v) => {
                levels.push((base, index));
                break v.clone();
            }
            ExprKind::Binary {
                op: BinOp::Select,
                left,
                right,
                ..
            } => {
                levels.push((base, index));
                index = right;
                base = left;
            }
            _ => return Err(DsaError::StoreTarget { span: base.span }),
        }
    };

    // Subscripts convert outermost first, then the stored value: the
    // left-to-right program order of `root[i0][i1].. := value`.
    let n = levels.len();
    let mut index_c: Vec<Expr> = Vec::with_capacity(n);
    for (_, idx) in levels.iter().rev() {
        index_c.push(convert_expr(env, idx)?);
    }
    index_c.reverse();
    let value_c = convert_expr(env, &s.value)?;

    // Converted base expression per level, built outward from the root's
    // current incarnation (the one read by the functional updates, not the
    // one assigned).
    let mut base_c: Vec<Expr> = Vec::with_capacity(n);
    base_c.push(Expr::var(env.current(root.local).clone(), levels[n - 1].0.span));
    for k in (0..n - 1).rev() {
        let parent = base_c[base_c.len() - 1].clone();
        let (level_base, _) = levels[k];
        base_c.push(Expr::select(
            parent,
            index_c[k + 1].clone(),
            level_base.ty(),
            level_base.span,
        ));
    }
    base_c.reverse();

    // Innermost level first: its bounds check, then fold the stored value
    // into the next functional update out.
    let mut stored = value_c;
    for k in 0..n {
        bounds::emit_index_check(env, &base_c[k], &index_c[k])?;
        stored = Expr::store(
            base_c[k].clone(),
            index_c[k].clone(),
            stored,
            base_c[k].ty(),
            s.span,
        );
    }

    let target = env.fresh_aliased_version(root.local);
    env.emit(Stmt::Assign(AssignStmt {
        span: s.span,
        target,
        value: stored,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_env::{AliasTable, GlobalEnv};
    use veil_ir::{
        format_stmt, span, GlobalId, ProcId, Procedure, Signature, Span, Type, Variable,
    };

    fn sp() -> Span {
        span(0, 0)
    }

    fn mkvar(name: &str, ty: Type, global: u32, local: u32) -> Variable {
        Variable {
            name: name.to_string(),
            qualified_name: format!("main::{name}"),
            ty,
            global: GlobalId(global),
            local: LocalId(local),
            by_ref: false,
            param_index: None,
            proc: ProcId(0),
        }
    }

    fn mkproc(vars: Vec<Variable>) -> Procedure {
        let global_to_local = vars.iter().map(|v| (v.global, v.local)).collect();
        Procedure {
            sig: Signature {
                name: "main".to_string(),
                qualified_name: "main".to_string(),
                params: vec![],
                id: ProcId(0),
                depth: 0,
                parent: None,
            },
            body: vec![],
            vars,
            scope_offsets: vec![0],
            global_to_local,
            is_leaf: true,
        }
    }

    fn assign(target: &Variable, value: Expr) -> Stmt {
        Stmt::Assign(AssignStmt {
            span: sp(),
            target: target.clone(),
            value,
        })
    }

    #[test]
    fn untouched_variables_need_no_reconciliation() {
        let x = mkvar("x", Type::Int, 0, 0);
        let proc = mkproc(vec![x.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::If(IfStmt {
            span: sp(),
            cond: Expr::bool(true, sp()),
            then_body: vec![Stmt::Assert(AssertStmt {
                span: sp(),
                expr: Expr::bool(true, sp()),
            })],
            else_body: vec![],
        });
        convert_stmt(&mut env, &stmt).unwrap();

        assert_eq!(env.version(LocalId(0)), 0);
        assert_eq!(env.current(LocalId(0)).name, "x");
        let (stmts, created) = env.finish();
        assert!(created.is_empty());
        let Stmt::If(out) = &stmts[0] else {
            panic!("expected an if statement");
        };
        assert_eq!(out.then_body.len(), 1);
        assert!(out.else_body.is_empty());
    }

    #[test]
    fn one_sided_assignment_inserts_one_copy_in_the_other_branch() {
        let x = mkvar("x", Type::Int, 0, 0);
        let proc = mkproc(vec![x.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::If(IfStmt {
            span: sp(),
            cond: Expr::bool(true, sp()),
            then_body: vec![assign(&x, Expr::int(1, sp()))],
            else_body: vec![],
        });
        convert_stmt(&mut env, &stmt).unwrap();

        assert_eq!(env.version(LocalId(0)), 1);
        assert_eq!(env.current(LocalId(0)).name, "x#1");
        let (stmts, _) = env.finish();
        let Stmt::If(out) = &stmts[0] else {
            panic!("expected an if statement");
        };
        assert_eq!(out.then_body.len(), 1);
        assert_eq!(format_stmt(&out.then_body[0]), "x#1 := 1\n");
        // The else branch catches up to the then branch's incarnation.
        assert_eq!(out.else_body.len(), 1);
        assert_eq!(format_stmt(&out.else_body[0]), "x#1 := x\n");
    }

    #[test]
    fn both_branches_reuse_the_same_incarnation() {
        let x = mkvar("x", Type::Int, 0, 0);
        let proc = mkproc(vec![x.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::If(IfStmt {
            span: sp(),
            cond: Expr::bool(true, sp()),
            then_body: vec![assign(&x, Expr::int(1, sp()))],
            else_body: vec![assign(&x, Expr::int(2, sp()))],
        });
        convert_stmt(&mut env, &stmt).unwrap();

        let (stmts, created) = env.finish();
        // Both branches advanced x to version 1 and got the identical
        // incarnation; no reconciliation copy appears anywhere.
        assert_eq!(created.len(), 1);
        let Stmt::If(out) = &stmts[0] else {
            panic!("expected an if statement");
        };
        assert_eq!(out.then_body.len(), 1);
        assert_eq!(out.else_body.len(), 1);
        let (Stmt::Assign(t), Stmt::Assign(e)) = (&out.then_body[0], &out.else_body[0]) else {
            panic!("expected assignments");
        };
        assert_eq!(t.target, e.target);
        assert_eq!(t.target.name, "x#1");
    }

    #[test]
    fn loop_entry_assertion_precedes_every_havoc_incarnation() {
        let x = mkvar("x", Type::Int, 0, 0);
        let proc = mkproc(vec![x.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let inv = Expr::le(Expr::var(x.clone(), sp()), Expr::int(10, sp()), sp());
        let body = vec![assign(
            &x,
            Expr::binary(
                BinOp::Add,
                Type::Int,
                Expr::var(x.clone(), sp()),
                Expr::int(1, sp()),
                sp(),
            ),
        )];
        let cond = Expr::binary(
            BinOp::Eq,
            Type::Bool,
            Expr::var(x.clone(), sp()),
            Expr::int(10, sp()),
            sp(),
        );
        let stmt = Stmt::RepeatUntil(RepeatUntilStmt {
            span: sp(),
            invariant: inv,
            body,
            cond,
        });
        convert_stmt(&mut env, &stmt).unwrap();

        let (stmts, _) = env.finish();
        let rendered: Vec<String> = stmts.iter().map(format_stmt).collect();
        assert_eq!(
            rendered,
            vec![
                // Entry check under pre-loop bindings only.
                "assert (x <= 10)\n",
                // Havoc'd iteration state.
                "assume (x#1 <= 10)\n",
                "x#2 := (x#1 + 1)\n",
                // Inductive step: a non-exiting iteration re-establishes
                // the invariant.
                "assert (!((x#2 == 10)) ==> (x#2 <= 10))\n",
                "assume (x#2 == 10)\n",
            ]
        );
    }

    #[test]
    fn nested_store_checks_inner_index_first_and_assigns_once() {
        let outer_ty = Type::array(Type::array(Type::Int, 3), 2);
        let a = mkvar("a", outer_ty.clone(), 0, 0);
        let i = mkvar("i", Type::Int, 1, 1);
        let j = mkvar("j", Type::Int, 2, 2);
        let proc = mkproc(vec![a.clone(), i.clone(), j.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(3));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::ArrayStore(ArrayStoreStmt {
            span: sp(),
            base: Expr::select(
                Expr::var(a.clone(), sp()),
                Expr::var(i.clone(), sp()),
                Type::array(Type::Int, 3),
                sp(),
            ),
            index: Expr::var(j.clone(), sp()),
            value: Expr::int(7, sp()),
        });
        convert_stmt(&mut env, &stmt).unwrap();

        let (stmts, created) = env.finish();
        assert_eq!(created.len(), 1);
        let rendered: Vec<String> = stmts.iter().map(format_stmt).collect();
        assert_eq!(
            rendered,
            vec![
                "assert ((0 <= j) && (j < 3))\n",
                "assume ((0 <= j) && (j < 3))\n",
                "assert ((0 <= i) && (i < 2))\n",
                "assume ((0 <= i) && (i < 2))\n",
                "a#1 := store(a, i, store(a[i], j, 7))\n",
            ]
        );
    }

    #[test]
    fn single_level_store_is_the_terminal_case() {
        let a = mkvar("a", Type::array(Type::Int, 5), 0, 0);
        let proc = mkproc(vec![a.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::ArrayStore(ArrayStoreStmt {
            span: sp(),
            base: Expr::var(a.clone(), sp()),
            index: Expr::int(2, sp()),
            value: Expr::int(9, sp()),
        });
        convert_stmt(&mut env, &stmt).unwrap();

        let (stmts, _) = env.finish();
        let rendered: Vec<String> = stmts.iter().map(format_stmt).collect();
        assert_eq!(
            rendered,
            vec![
                "assert ((0 <= 2) && (2 < 5))\n",
                "assume ((0 <= 2) && (2 < 5))\n",
                "a#1 := store(a, 2, 9)\n",
            ]
        );
    }

    #[test]
    fn store_through_a_literal_base_is_rejected() {
        let a = mkvar("a", Type::array(Type::Int, 5), 0, 0);
        let proc = mkproc(vec![a]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let stmt = Stmt::ArrayStore(ArrayStoreStmt {
            span: sp(),
            base: Expr::int(1, sp()),
            index: Expr::int(0, sp()),
            value: Expr::int(0, sp()),
        });
        let err = convert_stmt(&mut env, &stmt).unwrap_err();
        assert!(matches!(err, DsaError::StoreTarget { .. }));
    }

    #[test]
    fn assignment_to_an_aliased_variable_havocs_the_alias() {
        let x = mkvar("x", Type::Int, 0, 0);
        let y = mkvar("y", Type::Int, 1, 1);
        let proc = mkproc(vec![x.clone(), y.clone()]);
        let mut table = AliasTable::new();
        table.record(GlobalId(0), GlobalId(1));
        let mut genv = GlobalEnv::new(&table, GlobalId(2));
        let mut env = ProcEnv::new(&mut genv, &proc);

        convert_stmt(&mut env, &assign(&x, Expr::int(1, sp()))).unwrap();

        // y never appears in the statement text, yet its version advances.
        assert_eq!(env.version(LocalId(1)), 1);
        let (stmts, created) = env.finish();
        assert_eq!(stmts.len(), 1);
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].name, "y#1");
    }

    #[test]
    fn call_outputs_are_written_like_assignments() {
        let x = mkvar("x", Type::Int, 0, 0);
        let proc = mkproc(vec![x.clone()]);
        let table = AliasTable::new();
        let mut genv = GlobalEnv::new(&table, GlobalId(1));
        let mut env = ProcEnv::new(&mut genv, &proc);

        let callee = Signature {
            name: "f".to_string(),
            qualified_name: "f".to_string(),
            params: vec![],
            id: ProcId(1),
            depth: 0,
            parent: None,
        };
        let stmt = Stmt::Call(CallStmt {
            span: sp(),
            outs: vec![x.clone()],
            callee,
            args: vec![Expr::binary(
                BinOp::Add,
                Type::Int,
                Expr::var(x.clone(), sp()),
                Expr::int(1, sp()),
                sp(),
            )],
        });
        convert_stmt(&mut env, &stmt).unwrap();

        let (stmts, _) = env.finish();
        // The argument reads the old incarnation; the output gets a new one.
        assert_eq!(format_stmt(&stmts[0]), "x#1 := call f((x + 1))\n");
    }
}
