#![forbid(unsafe_code)]

use crate::ir::{
    ArrayStoreStmt, AssertStmt, AssignStmt, AssumeStmt, BinOp, CallStmt, Expr, ExprKind, IfStmt,
    Procedure, Program, RepeatUntilStmt, Stmt, TernaryOp, UnaryOp, Variable,
};

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    for (i, p) in program.procs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        fmt_procedure(&mut out, p);
    }
    out
}

pub fn format_procedure(proc: &Procedure) -> String {
    let mut out = String::new();
    fmt_procedure(&mut out, proc);
    out
}

pub fn format_stmt(stmt: &Stmt) -> String {
    let mut out = String::new();
    fmt_stmt(&mut out, 0, stmt);
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr);
    out
}

fn fmt_procedure(out: &mut String, proc: &Procedure) {
    out.push_str("proc ");
    out.push_str(&proc.sig.qualified_name);
    out.push('(');
    for (i, p) in proc.sig.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_var_decl(out, p);
    }
    out.push_str(") {\n");

    // Declarations for locals that are not parameters, incarnations included.
    for v in &proc.vars {
        if v.param_index.is_some() {
            continue;
        }
        indent_line(out, 1);
        out.push_str("var ");
        fmt_var_decl(out, v);
        out.push('\n');
    }

    for stmt in &proc.body {
        fmt_stmt(out, 1, stmt);
    }
    out.push_str("}\n");
}

fn fmt_var_decl(out: &mut String, v: &Variable) {
    out.push_str(&v.name);
    out.push_str(": ");
    out.push_str(&v.ty.to_string());
}

fn fmt_stmt(out: &mut String, indent: usize, stmt: &Stmt) {
    match stmt {
        Stmt::Assign(AssignStmt { target, value, .. }) => {
            indent_line(out, indent);
            out.push_str(&target.name);
            out.push_str(" := ");
            fmt_expr(out, value);
            out.push('\n');
        }
        Stmt::Assert(AssertStmt { expr, .. }) => {
            indent_line(out, indent);
            out.push_str("assert ");
            fmt_expr(out, expr);
            out.push('\n');
        }
        Stmt::Assume(AssumeStmt { expr, .. }) => {
            indent_line(out, indent);
            out.push_str("assume ");
            fmt_expr(out, expr);
            out.push('\n');
        }
        Stmt::If(IfStmt {
            cond,
            then_body,
            else_body,
            ..
        }) => {
            indent_line(out, indent);
            out.push_str("if ");
            fmt_expr(out, cond);
            out.push_str(" {\n");
            for s in then_body {
                fmt_stmt(out, indent + 1, s);
            }
            indent_line(out, indent);
            if else_body.is_empty() {
                out.push_str("}\n");
            } else {
                out.push_str("} else {\n");
                for s in else_body {
                    fmt_stmt(out, indent + 1, s);
                }
                indent_line(out, indent);
                out.push_str("}\n");
            }
        }
        Stmt::RepeatUntil(RepeatUntilStmt {
            invariant,
            body,
            cond,
            ..
        }) => {
            indent_line(out, indent);
            out.push_str("repeat invariant ");
            fmt_expr(out, invariant);
            out.push_str(" {\n");
            for s in body {
                fmt_stmt(out, indent + 1, s);
            }
            indent_line(out, indent);
            out.push_str("} until ");
            fmt_expr(out, cond);
            out.push('\n');
        }
        Stmt::Call(CallStmt {
            outs, callee, args, ..
        }) => {
            indent_line(out, indent);
            for (i, o) in outs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&o.name);
            }
            if !outs.is_empty() {
                out.push_str(" := ");
            }
            out.push_str("call ");
            out.push_str(&callee.qualified_name);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_expr(out, a);
            }
            out.push_str(")\n");
        }
        Stmt::ArrayStore(ArrayStoreStmt {
            base, index, value, ..
        }) => {
            indent_line(out, indent);
            fmt_expr(out, base);
            out.push('[');
            fmt_expr(out, index);
            out.push_str("] := ");
            fmt_expr(out, value);
            out.push('\n');
        }
    }
}

fn fmt_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::IntLit(n) => out.push_str(&n.to_string()),
        ExprKind::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprKind::Var(v) => out.push_str(&v.name),
        ExprKind::Unary { op, operand, .. } => {
            out.push_str(unary_token(*op));
            out.push('(');
            fmt_expr(out, operand);
            out.push(')');
        }
        ExprKind::Binary {
            op: BinOp::Select,
            left,
            right,
            ..
        } => {
            fmt_expr(out, left);
            out.push('[');
            fmt_expr(out, right);
            out.push(']');
        }
        ExprKind::Binary {
            op, left, right, ..
        } => {
            // Fully parenthesized; this output feeds diagnostics, not a parser.
            out.push('(');
            fmt_expr(out, left);
            out.push(' ');
            out.push_str(binary_token(*op));
            out.push(' ');
            fmt_expr(out, right);
            out.push(')');
        }
        ExprKind::Ternary {
            op: TernaryOp::Store,
            first,
            second,
            third,
            ..
        } => {
            out.push_str("store(");
            fmt_expr(out, first);
            out.push_str(", ");
            fmt_expr(out, second);
            out.push_str(", ");
            fmt_expr(out, third);
            out.push(')');
        }
    }
}

fn unary_token(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
    }
}

fn binary_token(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Implies => "==>",
        // Select never reaches here; it renders as base[index] above.
        BinOp::Select => "[]",
    }
}

fn indent_line(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}
