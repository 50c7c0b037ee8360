//! IO parsing: resolving `@leqo.*` annotations into binding tables.
//!
//! Walks a renamed, inlined snippet and produces the qubit table and the
//! input/output bindings of the prepared node. Every contract violation is
//! an [`AnnotationErrorKind`] with the offending node attached.

use leqo_qasm3::ast::{
    ClassicalType, Program, RegisterExpr, Statement, StatementKind, ANNOTATION_DIRTY,
    ANNOTATION_INPUT, ANNOTATION_OUTPUT, ANNOTATION_REUSABLE,
};
use rustc_hash::FxHashMap;

use crate::diagnostics::Diagnostic;
use crate::error::{AnnotationErrorKind, CompileError, CompileResult};
use crate::pre::{IoBindings, LocalQubitId, PortValue, QubitTable};

/// The result of IO parsing.
#[derive(Debug)]
pub struct ParsedIo {
    pub qubits: QubitTable,
    pub io: IoBindings,
    pub warnings: Vec<Diagnostic>,
}

/// Annotations allowed on declarations.
struct DeclAnnotations {
    input: Option<u32>,
    dirty: bool,
}

/// Annotations allowed on aliases.
struct AliasAnnotations {
    output: Option<u32>,
    reusable: bool,
}

struct IoParser<'a> {
    node: &'a str,
    qubits: QubitTable,
    io: IoBindings,
    warnings: Vec<Diagnostic>,
    classical_types: FxHashMap<String, ClassicalType>,
    qubit_aliases: FxHashMap<String, Vec<LocalQubitId>>,
}

/// Parse the IO contract of a snippet.
pub fn parse_io(node: &str, program: &Program) -> CompileResult<ParsedIo> {
    let mut parser = IoParser {
        node,
        qubits: QubitTable::default(),
        io: IoBindings::default(),
        warnings: vec![],
        classical_types: FxHashMap::default(),
        qubit_aliases: FxHashMap::default(),
    };
    parser.run(program)?;
    Ok(ParsedIo {
        qubits: parser.qubits,
        io: parser.io,
        warnings: parser.warnings,
    })
}

impl<'a> IoParser<'a> {
    fn error(&self, kind: AnnotationErrorKind, message: impl Into<String>) -> CompileError {
        CompileError::AnnotationError {
            node: self.node.to_string(),
            kind,
            message: message.into(),
        }
    }

    fn run(&mut self, program: &Program) -> CompileResult<()> {
        for statement in &program.statements {
            self.visit_statement(statement)?;
        }
        self.check_contiguous(true)?;
        self.check_contiguous(false)?;
        self.check_overlaps()?;
        Ok(())
    }

    fn visit_statement(&mut self, statement: &Statement) -> CompileResult<()> {
        match &statement.kind {
            StatementKind::QubitDecl { name, size } => {
                let annotations = self.decl_annotations(statement, name, true)?;
                let ids = self.qubits.declare(name, *size);
                if annotations.dirty {
                    self.qubits.dirty.extend(ids.iter().copied());
                }
                if let Some(index) = annotations.input {
                    self.bind_input(
                        index,
                        PortValue::Qubits {
                            name: name.clone(),
                            ids,
                        },
                    )?;
                }
            }

            StatementKind::ClassicalDecl { ty, name, .. } => {
                let annotations = self.decl_annotations(statement, name, false)?;
                self.classical_types.insert(name.clone(), *ty);
                if let Some(index) = annotations.input {
                    self.bind_input(
                        index,
                        PortValue::Classical {
                            name: name.clone(),
                            ty: *ty,
                        },
                    )?;
                }
            }

            StatementKind::ConstDecl { ty, name, .. } => {
                self.forbid_annotations(statement, "a const declaration")?;
                self.classical_types.insert(name.clone(), *ty);
            }

            StatementKind::Alias { name, value } => {
                self.visit_alias(statement, name, value)?;
            }

            StatementKind::GateDef { body, .. } => {
                self.forbid_annotations(statement, "a gate definition")?;
                for inner in body {
                    self.forbid_annotations(inner, "a gate body statement")?;
                }
            }

            StatementKind::If {
                then_body,
                else_body,
                ..
            } => {
                // Fused if-then-else nodes keep aliases and declarations
                // inside their arms; walk them like the original visitor.
                self.forbid_annotations(statement, "a branching statement")?;
                for inner in then_body.iter().chain(else_body.iter()) {
                    self.visit_statement(inner)?;
                }
            }

            _ => self.forbid_annotations(statement, "this statement")?,
        }
        Ok(())
    }

    fn visit_alias(
        &mut self,
        statement: &Statement,
        name: &str,
        value: &RegisterExpr,
    ) -> CompileResult<()> {
        let annotations = self.alias_annotations(statement, name)?;

        if let Some(ids) = self.resolve_qubit_expr(value) {
            self.qubit_aliases.insert(name.to_string(), ids.clone());
            if annotations.reusable {
                self.qubits.reusable.extend(ids.iter().copied());
            }
            if let Some(index) = annotations.output {
                self.bind_output(
                    index,
                    PortValue::Qubits {
                        name: name.to_string(),
                        ids,
                    },
                )?;
            }
            return Ok(());
        }

        if let Some(ty) = self.resolve_classical_expr(value) {
            if annotations.reusable {
                return Err(self.error(
                    AnnotationErrorKind::WrongHost,
                    format!("reusable annotation over classical alias {name}"),
                ));
            }
            self.classical_types.insert(name.to_string(), ty);
            if let Some(index) = annotations.output {
                self.bind_output(
                    index,
                    PortValue::Classical {
                        name: name.to_string(),
                        ty,
                    },
                )?;
            }
            return Ok(());
        }

        if annotations.output.is_some() || annotations.reusable {
            return Err(self.error(
                AnnotationErrorKind::WrongHost,
                format!("alias {name} does not resolve to declared registers"),
            ));
        }
        Ok(())
    }

    fn bind_input(&mut self, index: u32, value: PortValue) -> CompileResult<()> {
        if self.io.inputs.insert(index, value).is_some() {
            return Err(self.error(
                AnnotationErrorKind::DuplicateIndex,
                format!("duplicate input index {index}"),
            ));
        }
        Ok(())
    }

    fn bind_output(&mut self, index: u32, value: PortValue) -> CompileResult<()> {
        if self.io.outputs.insert(index, value).is_some() {
            return Err(self.error(
                AnnotationErrorKind::DuplicateIndex,
                format!("duplicate output index {index}"),
            ));
        }
        Ok(())
    }

    /// Extract and validate the annotations of a declaration.
    fn decl_annotations(
        &self,
        statement: &Statement,
        name: &str,
        allow_dirty: bool,
    ) -> CompileResult<DeclAnnotations> {
        let mut input = None;
        let mut dirty = false;

        for annotation in &statement.annotations {
            match annotation.keyword.as_str() {
                ANNOTATION_INPUT => {
                    if input.is_some() {
                        return Err(self.error(
                            AnnotationErrorKind::MultipleOnStatement,
                            format!("two input annotations over {name}"),
                        ));
                    }
                    input = Some(self.parse_index(annotation.command.as_deref(), name)?);
                }
                ANNOTATION_DIRTY => {
                    if !allow_dirty {
                        return Err(self.error(
                            AnnotationErrorKind::WrongHost,
                            format!("dirty annotation over classical declaration {name}"),
                        ));
                    }
                    if dirty {
                        return Err(self.error(
                            AnnotationErrorKind::MultipleOnStatement,
                            format!("two dirty annotations over {name}"),
                        ));
                    }
                    if annotation.command.is_some() {
                        return Err(self.error(
                            AnnotationErrorKind::WrongHost,
                            format!("unexpected command on dirty annotation over {name}"),
                        ));
                    }
                    dirty = true;
                }
                ANNOTATION_OUTPUT | ANNOTATION_REUSABLE => {
                    return Err(self.error(
                        AnnotationErrorKind::WrongHost,
                        format!(
                            "{} annotation over declaration {name}",
                            annotation.keyword
                        ),
                    ));
                }
                _ => {}
            }
        }

        if input.is_some() && dirty {
            return Err(self.error(
                AnnotationErrorKind::WrongHost,
                format!("dirty and input annotations over declaration {name}"),
            ));
        }
        Ok(DeclAnnotations { input, dirty })
    }

    /// Extract and validate the annotations of an alias.
    fn alias_annotations(
        &self,
        statement: &Statement,
        name: &str,
    ) -> CompileResult<AliasAnnotations> {
        let mut output = None;
        let mut reusable = false;

        for annotation in &statement.annotations {
            match annotation.keyword.as_str() {
                ANNOTATION_OUTPUT => {
                    if output.is_some() {
                        return Err(self.error(
                            AnnotationErrorKind::MultipleOnStatement,
                            format!("two output annotations over {name}"),
                        ));
                    }
                    output = Some(self.parse_index(annotation.command.as_deref(), name)?);
                }
                ANNOTATION_REUSABLE => {
                    if reusable {
                        return Err(self.error(
                            AnnotationErrorKind::MultipleOnStatement,
                            format!("two reusable annotations over {name}"),
                        ));
                    }
                    if annotation.command.is_some() {
                        return Err(self.error(
                            AnnotationErrorKind::WrongHost,
                            format!("unexpected command on reusable annotation over {name}"),
                        ));
                    }
                    reusable = true;
                }
                ANNOTATION_INPUT | ANNOTATION_DIRTY => {
                    return Err(self.error(
                        AnnotationErrorKind::WrongHost,
                        format!("{} annotation over alias {name}", annotation.keyword),
                    ));
                }
                _ => {}
            }
        }

        if output.is_some() && reusable {
            return Err(self.error(
                AnnotationErrorKind::ReusableOverlapsOutput,
                format!("output and reusable annotations over alias {name}"),
            ));
        }
        Ok(AliasAnnotations { output, reusable })
    }

    /// Reject leqo annotations on statements that cannot host them.
    fn forbid_annotations(&self, statement: &Statement, host: &str) -> CompileResult<()> {
        for annotation in &statement.annotations {
            if annotation.keyword.starts_with("leqo.") {
                return Err(self.error(
                    AnnotationErrorKind::WrongHost,
                    format!("{} annotation over {host}", annotation.keyword),
                ));
            }
        }
        Ok(())
    }

    fn parse_index(&self, command: Option<&str>, name: &str) -> CompileResult<u32> {
        command
            .and_then(|c| c.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                self.error(
                    AnnotationErrorKind::MissingIndex,
                    format!("annotation over {name} requires a non-negative integer index"),
                )
            })
    }

    /// Resolve a register expression to qubit ids, through aliases.
    fn resolve_qubit_expr(&self, expr: &RegisterExpr) -> Option<Vec<LocalQubitId>> {
        match expr {
            RegisterExpr::Ident(name) => self.lookup_qubits(name),
            RegisterExpr::Index { register, index } => {
                let ids = self.lookup_qubits(register)?;
                let index = usize::try_from(index.as_i64()?).ok()?;
                Some(vec![*ids.get(index)?])
            }
            RegisterExpr::Range {
                register,
                start,
                end,
            } => {
                let ids = self.lookup_qubits(register)?;
                let start = usize::try_from(start.as_i64()?).ok()?;
                let end = usize::try_from(end.as_i64()?).ok()?;
                Some(ids.get(start..=end)?.to_vec())
            }
            RegisterExpr::Set { register, indices } => {
                let ids = self.lookup_qubits(register)?;
                indices
                    .iter()
                    .map(|index| {
                        let index = usize::try_from(index.as_i64()?).ok()?;
                        ids.get(index).copied()
                    })
                    .collect()
            }
            RegisterExpr::Concat(lhs, rhs) => {
                let mut ids = self.resolve_qubit_expr(lhs)?;
                ids.extend(self.resolve_qubit_expr(rhs)?);
                Some(ids)
            }
        }
    }

    fn lookup_qubits(&self, name: &str) -> Option<Vec<LocalQubitId>> {
        self.qubits
            .ids_of(name)
            .map(<[LocalQubitId]>::to_vec)
            .or_else(|| self.qubit_aliases.get(name).cloned())
    }

    /// Resolve the classical type of an alias value, if it is classical.
    fn resolve_classical_expr(&self, expr: &RegisterExpr) -> Option<ClassicalType> {
        match expr {
            RegisterExpr::Ident(name) => self.classical_types.get(name).copied(),
            RegisterExpr::Index { register, .. } => {
                match self.classical_types.get(register)? {
                    ClassicalType::Bit { .. } => Some(ClassicalType::Bit { size: None }),
                    _ => None,
                }
            }
            RegisterExpr::Range {
                register,
                start,
                end,
            } => match self.classical_types.get(register)? {
                ClassicalType::Bit { .. } => {
                    let width = u32::try_from(end.as_i64()? - start.as_i64()? + 1).ok()?;
                    Some(ClassicalType::Bit { size: Some(width) })
                }
                _ => None,
            },
            RegisterExpr::Set { register, indices } => {
                match self.classical_types.get(register)? {
                    ClassicalType::Bit { .. } => Some(ClassicalType::Bit {
                        size: Some(indices.len() as u32),
                    }),
                    _ => None,
                }
            }
            RegisterExpr::Concat(lhs, rhs) => {
                let lhs = self.resolve_classical_expr(lhs)?;
                let rhs = self.resolve_classical_expr(rhs)?;
                match (lhs, rhs) {
                    (ClassicalType::Bit { .. }, ClassicalType::Bit { .. }) => {
                        Some(ClassicalType::Bit {
                            size: Some(
                                crate::pre::effective_width(&lhs)
                                    + crate::pre::effective_width(&rhs),
                            ),
                        })
                    }
                    _ => None,
                }
            }
        }
    }

    fn check_contiguous(&self, inputs: bool) -> CompileResult<()> {
        let (keys, what): (Vec<u32>, _) = if inputs {
            (self.io.inputs.keys().copied().collect(), "input")
        } else {
            (self.io.outputs.keys().copied().collect(), "output")
        };
        for (expected, &actual) in keys.iter().enumerate() {
            let expected = expected as u32;
            if expected != actual {
                return Err(self.error(
                    AnnotationErrorKind::NonContiguousIndex,
                    format!("missing {what} index {expected}, next index was {actual}"),
                ));
            }
        }
        Ok(())
    }

    fn check_overlaps(&self) -> CompileResult<()> {
        let mut owner: FxHashMap<LocalQubitId, u32> = FxHashMap::default();
        for (&index, value) in &self.io.outputs {
            if let PortValue::Qubits { ids, .. } = value {
                for &id in ids {
                    if let Some(&other) = owner.get(&id) {
                        return Err(self.error(
                            AnnotationErrorKind::OutputOverlap,
                            format!("qubit belongs to outputs {other} and {index}"),
                        ));
                    }
                    owner.insert(id, index);
                }
            }
        }
        for &id in &self.qubits.reusable {
            if let Some(&index) = owner.get(&id) {
                return Err(self.error(
                    AnnotationErrorKind::ReusableOverlapsOutput,
                    format!("reusable qubit is part of output {index}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leqo_qasm3::parse;

    fn parse_io_of(source: &str) -> CompileResult<ParsedIo> {
        parse_io("n1", &parse(source).unwrap())
    }

    #[test]
    fn test_bindings_collected() {
        let parsed = parse_io_of(
            "@leqo.input 0\nqubit[2] q;\nqubit a;\nh a;\n@leqo.output 0\nlet out = q ++ a;",
        )
        .unwrap();
        assert_eq!(parsed.qubits.total(), 3);
        assert_eq!(
            parsed.io.inputs[&0],
            PortValue::Qubits {
                name: "q".into(),
                ids: vec![0, 1]
            }
        );
        assert_eq!(
            parsed.io.outputs[&0],
            PortValue::Qubits {
                name: "out".into(),
                ids: vec![0, 1, 2]
            }
        );
    }

    #[test]
    fn test_duplicate_input_index() {
        let err = parse_io_of("@leqo.input 0\nqubit a;\n@leqo.input 0\nqubit b;").unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::DuplicateIndex,
                ..
            }
        ));
    }

    #[test]
    fn test_non_contiguous_output() {
        let err = parse_io_of("qubit a;\n@leqo.output 1\nlet out = a;").unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::NonContiguousIndex,
                ..
            }
        ));
    }

    #[test]
    fn test_output_on_declaration_rejected() {
        let err = parse_io_of("@leqo.output 0\nqubit a;").unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::WrongHost,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_index_rejected() {
        let err = parse_io_of("@leqo.input\nqubit a;").unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::MissingIndex,
                ..
            }
        ));
    }

    #[test]
    fn test_output_overlap_rejected() {
        let err = parse_io_of(
            "qubit[2] q;\n@leqo.output 0\nlet a = q[0];\n@leqo.output 1\nlet b = q[{0, 1}];",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::OutputOverlap,
                ..
            }
        ));
    }

    #[test]
    fn test_reusable_overlapping_output_rejected() {
        let err = parse_io_of(
            "qubit[2] q;\n@leqo.output 0\nlet a = q[0];\n@leqo.reusable\nlet b = q[0];",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::AnnotationError {
                kind: AnnotationErrorKind::ReusableOverlapsOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_reusable_ids_recorded() {
        let parsed =
            parse_io_of("qubit[3] q;\n@leqo.reusable\nlet free = q[{1, 2}];").unwrap();
        assert_eq!(parsed.qubits.reusable, vec![1, 2]);
    }

    #[test]
    fn test_classical_output() {
        let parsed =
            parse_io_of("qubit[2] q;\nbit[2] c = measure q;\n@leqo.output 0\nlet out = c;")
                .unwrap();
        assert_eq!(
            parsed.io.outputs[&0],
            PortValue::Classical {
                name: "out".into(),
                ty: ClassicalType::Bit { size: Some(2) }
            }
        );
    }

    #[test]
    fn test_classical_input_binding() {
        let parsed = parse_io_of("@leqo.input 0\nint[32] n;").unwrap();
        assert_eq!(
            parsed.io.inputs[&0],
            PortValue::Classical {
                name: "n".into(),
                ty: ClassicalType::Int { size: Some(32) }
            }
        );
    }

    #[test]
    fn test_dirty_tracked() {
        let parsed = parse_io_of("@leqo.dirty\nqubit[2] junk;").unwrap();
        assert_eq!(parsed.qubits.dirty, vec![0, 1]);
    }
}
