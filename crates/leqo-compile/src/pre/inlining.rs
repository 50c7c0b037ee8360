//! Constant and alias inlining.
//!
//! Two rewrites run here, in order:
//!
//! 1. integer `const` declarations with literal initializers are folded into
//!    their uses and dropped;
//! 2. alias statements whose right-hand side is a constant slice/concat over
//!    earlier declarations are substituted into their uses and dropped.
//!
//! Aliases carrying `@leqo.output` or `@leqo.reusable` are the contract
//! surface and always retained. An alias with a use that cannot be expressed
//! after substitution (non-constant index, out-of-range access) is retained
//! as well — aliases are legal QASM, so keeping one is always safe.

use leqo_qasm3::ast::{
    ClassicalType, Expression, Program, RegisterExpr, Statement, StatementKind,
    ANNOTATION_OUTPUT, ANNOTATION_REUSABLE,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Fold `const int`/`const uint` declarations with literal initializers.
pub fn inline_constants(program: &mut Program) {
    let mut values: FxHashMap<String, i64> = FxHashMap::default();
    let mut duplicated: FxHashSet<String> = FxHashSet::default();

    for statement in &program.statements {
        if let StatementKind::ConstDecl { ty, name, init } = &statement.kind {
            if !matches!(
                ty,
                ClassicalType::Int { .. } | ClassicalType::Uint { .. }
            ) {
                continue;
            }
            if let Some(value) = init.as_i64() {
                if values.insert(name.clone(), value).is_some() {
                    duplicated.insert(name.clone());
                }
            }
        }
    }
    // Redeclared constants are left alone.
    for name in &duplicated {
        values.remove(name);
    }
    if values.is_empty() {
        return;
    }

    substitute_statements(&mut program.statements, &values);
    program.statements.retain(|statement| {
        !matches!(
            &statement.kind,
            StatementKind::ConstDecl { name, .. } if values.contains_key(name)
        )
    });
}

fn substitute_statements(statements: &mut [Statement], values: &FxHashMap<String, i64>) {
    for statement in statements {
        match &mut statement.kind {
            StatementKind::ClassicalDecl { init: Some(init), .. } => {
                substitute_expr(init, values);
            }
            StatementKind::ConstDecl { init, .. } => substitute_expr(init, values),
            StatementKind::Alias { value, .. } => substitute_register(value, values),
            StatementKind::Assignment { index, value, .. } => {
                if let Some(index) = index {
                    substitute_expr(index, values);
                }
                substitute_expr(value, values);
            }
            StatementKind::GateCall { params, qubits, .. } => {
                for param in params {
                    substitute_expr(param, values);
                }
                for qubit in qubits {
                    substitute_register(qubit, values);
                }
            }
            StatementKind::GateDef { body, .. } => substitute_statements(body, values),
            StatementKind::Measure { qubits, target } => {
                substitute_register(qubits, values);
                if let Some(target) = target {
                    substitute_register(target, values);
                }
            }
            StatementKind::Reset { qubits } => substitute_register(qubits, values),
            StatementKind::Barrier { qubits } => {
                for qubit in qubits {
                    substitute_register(qubit, values);
                }
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => {
                substitute_expr(condition, values);
                substitute_statements(then_body, values);
                substitute_statements(else_body, values);
            }
            _ => {}
        }
    }
}

fn substitute_expr(expr: &mut Expression, values: &FxHashMap<String, i64>) {
    match expr {
        Expression::Ident(name) => {
            if let Some(&value) = values.get(name.as_str()) {
                *expr = Expression::Int(value);
            }
        }
        Expression::Neg(e) | Expression::Not(e) | Expression::Paren(e) => {
            substitute_expr(e, values);
        }
        Expression::BinOp { left, right, .. } => {
            substitute_expr(left, values);
            substitute_expr(right, values);
        }
        Expression::FnCall { args, .. } => {
            for arg in args {
                substitute_expr(arg, values);
            }
        }
        Expression::Index { target, index } => {
            substitute_expr(target, values);
            substitute_expr(index, values);
        }
        Expression::Measure(reg) => substitute_register(reg, values),
        _ => {}
    }
}

fn substitute_register(reg: &mut RegisterExpr, values: &FxHashMap<String, i64>) {
    match reg {
        RegisterExpr::Index { index, .. } => substitute_expr(index, values),
        RegisterExpr::Range { start, end, .. } => {
            substitute_expr(start, values);
            substitute_expr(end, values);
        }
        RegisterExpr::Set { indices, .. } => {
            for index in indices {
                substitute_expr(index, values);
            }
        }
        RegisterExpr::Concat(lhs, rhs) => {
            substitute_register(lhs, values);
            substitute_register(rhs, values);
        }
        RegisterExpr::Ident(_) => {}
    }
}

/// One qubit of a resolved alias: its base register and element index
/// (`None` for scalar declarations).
type Element = (String, Option<i64>);

/// Inline constant slice/concat aliases into their uses.
pub fn inline_aliases(program: &mut Program) {
    // Resolve every alias down to base-register elements.
    let mut env: FxHashMap<String, Vec<Element>> = FxHashMap::default();
    for statement in &program.statements {
        match &statement.kind {
            StatementKind::QubitDecl { name, size } => {
                let elements = match size {
                    None => vec![(name.clone(), None)],
                    Some(size) => (0..i64::from(*size))
                        .map(|i| (name.clone(), Some(i)))
                        .collect(),
                };
                env.insert(name.clone(), elements);
            }
            StatementKind::Alias { name, value } => {
                if let Some(elements) = resolve(value, &env) {
                    env.insert(name.clone(), elements);
                }
            }
            _ => {}
        }
    }

    // Candidates: resolved aliases without contract annotations.
    let mut candidates: Vec<String> = program
        .statements
        .iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::Alias { name, .. }
                if statement.annotation(ANNOTATION_OUTPUT).is_none()
                    && statement.annotation(ANNOTATION_REUSABLE).is_none()
                    && env.contains_key(name) =>
            {
                Some(name.clone())
            }
            _ => None,
        })
        .collect();

    // Keep any alias with a use that substitution cannot express.
    candidates.retain(|name| {
        let elements = &env[name];
        program.statements.iter().all(|statement| {
            if matches!(&statement.kind, StatementKind::Alias { name: n, .. } if n == name) {
                return true;
            }
            statement_registers(&statement.kind)
                .into_iter()
                .all(|reg| try_rewrite(reg, name, elements).is_ok())
        })
    });

    for name in &candidates {
        let elements = env[name].clone();
        for statement in &mut program.statements {
            if matches!(&statement.kind, StatementKind::Alias { name: n, .. } if n == name) {
                continue;
            }
            for reg in statement_registers_mut(&mut statement.kind) {
                if let Ok(Some(rewritten)) = try_rewrite(reg, name, &elements) {
                    *reg = rewritten;
                }
            }
        }
    }

    let dropped: FxHashSet<&String> = candidates.iter().collect();
    program.statements.retain(|statement| {
        !matches!(
            &statement.kind,
            StatementKind::Alias { name, .. } if dropped.contains(name)
        )
    });
}

/// Resolve a register expression to base elements, through earlier aliases.
fn resolve(expr: &RegisterExpr, env: &FxHashMap<String, Vec<Element>>) -> Option<Vec<Element>> {
    match expr {
        RegisterExpr::Ident(name) => env.get(name).cloned(),
        RegisterExpr::Index { register, index } => {
            let elements = env.get(register)?;
            let index = usize::try_from(index.as_i64()?).ok()?;
            Some(vec![elements.get(index)?.clone()])
        }
        RegisterExpr::Range {
            register,
            start,
            end,
        } => {
            let elements = env.get(register)?;
            let start = usize::try_from(start.as_i64()?).ok()?;
            let end = usize::try_from(end.as_i64()?).ok()?;
            Some(elements.get(start..=end)?.to_vec())
        }
        RegisterExpr::Set { register, indices } => {
            let elements = env.get(register)?;
            indices
                .iter()
                .map(|index| {
                    let index = usize::try_from(index.as_i64()?).ok()?;
                    elements.get(index).cloned()
                })
                .collect()
        }
        RegisterExpr::Concat(lhs, rhs) => {
            let mut elements = resolve(lhs, env)?;
            elements.extend(resolve(rhs, env)?);
            Some(elements)
        }
    }
}

/// Rewrite one use of `name`; `Ok(None)` means the use does not touch it,
/// `Err` means it cannot be expressed after substitution.
fn try_rewrite(
    reg: &RegisterExpr,
    name: &str,
    elements: &[Element],
) -> Result<Option<RegisterExpr>, ()> {
    match reg {
        RegisterExpr::Ident(n) if n == name => build_expr(elements).map(Some).ok_or(()),
        RegisterExpr::Index { register, index } if register == name => {
            let index = usize::try_from(index.as_i64().ok_or(())?).map_err(|_| ())?;
            let element = elements.get(index).ok_or(())?;
            build_expr(std::slice::from_ref(element)).map(Some).ok_or(())
        }
        RegisterExpr::Range {
            register,
            start,
            end,
        } if register == name => {
            let start = usize::try_from(start.as_i64().ok_or(())?).map_err(|_| ())?;
            let end = usize::try_from(end.as_i64().ok_or(())?).map_err(|_| ())?;
            let slice = elements.get(start..=end).ok_or(())?;
            build_expr(slice).map(Some).ok_or(())
        }
        RegisterExpr::Set { register, indices } if register == name => {
            let picks: Option<Vec<Element>> = indices
                .iter()
                .map(|index| {
                    let index = usize::try_from(index.as_i64()?).ok()?;
                    elements.get(index).cloned()
                })
                .collect();
            build_expr(&picks.ok_or(())?).map(Some).ok_or(())
        }
        RegisterExpr::Concat(lhs, rhs) => {
            let new_lhs = try_rewrite(lhs, name, elements)?;
            let new_rhs = try_rewrite(rhs, name, elements)?;
            if new_lhs.is_none() && new_rhs.is_none() {
                return Ok(None);
            }
            let lhs = new_lhs.unwrap_or_else(|| (**lhs).clone());
            let rhs = new_rhs.unwrap_or_else(|| (**rhs).clone());
            Ok(Some(RegisterExpr::Concat(Box::new(lhs), Box::new(rhs))))
        }
        _ => Ok(None),
    }
}

/// Build the minimal register expression denoting the given elements.
fn build_expr(elements: &[Element]) -> Option<RegisterExpr> {
    if elements.is_empty() {
        return None;
    }

    let mut groups: Vec<RegisterExpr> = Vec::new();
    let mut i = 0;
    while i < elements.len() {
        let (register, index) = &elements[i];
        match index {
            None => {
                groups.push(RegisterExpr::Ident(register.clone()));
                i += 1;
            }
            Some(_) => {
                let mut indices = Vec::new();
                while i < elements.len() && elements[i].0 == *register {
                    match elements[i].1 {
                        Some(index) => indices.push(index),
                        None => break,
                    }
                    i += 1;
                }
                let expr = if indices.len() == 1 {
                    RegisterExpr::index(register.clone(), indices[0])
                } else {
                    RegisterExpr::set(register.clone(), indices)
                };
                groups.push(expr);
            }
        }
    }

    let mut expr = groups.remove(0);
    for group in groups {
        expr = RegisterExpr::concat(expr, group);
    }
    Some(expr)
}

/// All register-expression positions of a statement, immutably.
///
/// Recurses into branching and gate bodies so that uses inside nested
/// blocks count as uses.
fn statement_registers(kind: &StatementKind) -> Vec<&RegisterExpr> {
    match kind {
        StatementKind::Alias { value, .. } => vec![value],
        StatementKind::GateCall { qubits, .. } | StatementKind::Barrier { qubits } => {
            qubits.iter().collect()
        }
        StatementKind::Measure { qubits, target } => {
            let mut regs = vec![qubits];
            if let Some(target) = target {
                regs.push(target);
            }
            regs
        }
        StatementKind::Reset { qubits } => vec![qubits],
        StatementKind::ClassicalDecl {
            init: Some(Expression::Measure(reg)),
            ..
        } => vec![reg],
        StatementKind::Assignment {
            value: Expression::Measure(reg),
            ..
        } => vec![reg],
        StatementKind::If {
            then_body,
            else_body,
            ..
        } => then_body
            .iter()
            .chain(else_body.iter())
            .flat_map(|statement| statement_registers(&statement.kind))
            .collect(),
        StatementKind::GateDef { body, .. } => body
            .iter()
            .flat_map(|statement| statement_registers(&statement.kind))
            .collect(),
        _ => vec![],
    }
}

/// All register-expression positions of a statement, mutably.
fn statement_registers_mut(kind: &mut StatementKind) -> Vec<&mut RegisterExpr> {
    match kind {
        StatementKind::Alias { value, .. } => vec![value],
        StatementKind::GateCall { qubits, .. } | StatementKind::Barrier { qubits } => {
            qubits.iter_mut().collect()
        }
        StatementKind::Measure { qubits, target } => {
            let mut regs = vec![qubits];
            if let Some(target) = target {
                regs.push(target);
            }
            regs
        }
        StatementKind::Reset { qubits } => vec![qubits],
        StatementKind::ClassicalDecl {
            init: Some(Expression::Measure(reg)),
            ..
        } => vec![reg],
        StatementKind::Assignment {
            value: Expression::Measure(reg),
            ..
        } => vec![reg],
        StatementKind::If {
            then_body,
            else_body,
            ..
        } => then_body
            .iter_mut()
            .chain(else_body.iter_mut())
            .flat_map(|statement| statement_registers_mut(&mut statement.kind))
            .collect(),
        StatementKind::GateDef { body, .. } => body
            .iter_mut()
            .flat_map(|statement| statement_registers_mut(&mut statement.kind))
            .collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leqo_qasm3::{emit, parse};

    #[test]
    fn test_inline_integer_constant() {
        let mut program = parse("const int[32] n = 2;\nrx(n) q;").unwrap();
        inline_constants(&mut program);
        let text = emit(&program);
        assert_eq!(text, "rx(2) q;\n");
    }

    #[test]
    fn test_float_constant_kept() {
        let mut program = parse("const float[32] theta = 0.5;\nrx(theta) q;").unwrap();
        inline_constants(&mut program);
        let text = emit(&program);
        assert!(text.contains("const float[32] theta = 0.5;"));
    }

    #[test]
    fn test_inline_plain_alias() {
        let mut program = parse("qubit[3] q;\nlet a = q[0:1];\nh a[0];\ncx a[0], a[1];").unwrap();
        inline_aliases(&mut program);
        let text = emit(&program);
        assert!(!text.contains("let a"));
        assert!(text.contains("h q[0];"));
        assert!(text.contains("cx q[0], q[1];"));
    }

    #[test]
    fn test_annotated_alias_kept() {
        let mut program = parse("qubit[2] q;\n@leqo.output 0\nlet out = q;").unwrap();
        inline_aliases(&mut program);
        let text = emit(&program);
        assert!(text.contains("let out = q;"));
    }

    #[test]
    fn test_alias_over_alias_inlined() {
        let mut program =
            parse("qubit[4] q;\nlet a = q[0:2];\nlet b = a[{0, 2}];\nh b[1];").unwrap();
        inline_aliases(&mut program);
        let text = emit(&program);
        assert!(!text.contains("let a"));
        assert!(!text.contains("let b"));
        assert!(text.contains("h q[2];"));
    }

    #[test]
    fn test_concat_alias_use_in_annotated_alias() {
        let mut program = parse(
            "qubit[2] q;\nqubit p;\nlet both = q ++ p;\n@leqo.output 0\nlet out = both;",
        )
        .unwrap();
        inline_aliases(&mut program);
        let text = emit(&program);
        assert!(!text.contains("let both"));
        assert!(text.contains("let out = q[{0, 1}] ++ p;"));
    }

    #[test]
    fn test_non_constant_index_keeps_alias() {
        let mut program = parse("qubit[2] q;\nint[32] i;\nlet a = q;\nh a[i];").unwrap();
        inline_aliases(&mut program);
        let text = emit(&program);
        assert!(text.contains("let a = q;"));
        assert!(text.contains("h a[i];"));
    }
}
