//! Projects a compiler AST (the generic `nodeType`/`src`/`nodes` tree solc's
//! standard-json output emits) onto a [`SyntaxTable`]: a per-byte feature
//! list plus branch/function/statement descriptor maps.

use crate::{BranchDescriptor, Feature, FunctionDescriptor, Location, Position, StatementDescriptor, SyntaxTable};
use serde_json::Value;

/// Mutable build state threaded through the recursive walk.
struct Walker<'a> {
    positions: &'a [Position],
    features: Vec<Vec<Feature>>,
    branch_map: std::collections::BTreeMap<u32, BranchDescriptor>,
    fn_map: std::collections::BTreeMap<u32, FunctionDescriptor>,
    statement_map: std::collections::BTreeMap<u32, StatementDescriptor>,
    next_branch: u32,
    next_fn: u32,
    next_statement: u32,
}

pub fn build(content: &str, ast: &Value) -> SyntaxTable {
    let positions = offsets_to_positions(content);
    let mut walker = Walker {
        positions: &positions,
        features: vec![Vec::new(); content.len()],
        branch_map: Default::default(),
        fn_map: Default::default(),
        statement_map: Default::default(),
        next_branch: 0,
        next_fn: 0,
        next_statement: 0,
    };
    for (i, feature_list) in walker.features.iter_mut().enumerate() {
        feature_list.push(Feature::Line(positions[i].line));
    }
    walker.walk(ast);

    let significant_lines = walker.significant_lines();
    SyntaxTable {
        features: walker.features,
        positions,
        branch_map: walker.branch_map,
        fn_map: walker.fn_map,
        statement_map: walker.statement_map,
        significant_lines,
    }
}

/// `offsetToPosition`: 1-based line, 0-based column, advancing on `\n`.
fn offsets_to_positions(content: &str) -> Vec<Position> {
    let mut positions = Vec::with_capacity(content.len());
    let mut line = 1usize;
    let mut column = 0usize;
    for byte in content.bytes() {
        positions.push(Position { line, column });
        if byte == b'\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    positions
}

/// Common child-bearing fields across Solidity/Yul AST node shapes. Not
/// every node type uses every field; absent ones are simply skipped.
const CHILD_FIELDS: &[&str] = &[
    "nodes",
    "statements",
    "body",
    "expression",
    "condition",
    "trueBody",
    "falseBody",
    "trueExpression",
    "falseExpression",
    "leftExpression",
    "rightExpression",
    "leftHandSide",
    "rightHandSide",
    "initialValue",
    "declarations",
    "arguments",
    "components",
    "parameters",
    "returnParameters",
    "cases",
    "clauses",
    "initializationExpression",
    "loopExpression",
    "subExpression",
    "baseExpression",
    "indexExpression",
    "eventCall",
    "errorCall",
];

fn src_range(node: &Value) -> Option<(usize, usize, i64)> {
    let src = node.get("src")?.as_str()?;
    let mut parts = src.split(':');
    let start: i64 = parts.next()?.parse().ok()?;
    let length: i64 = parts.next()?.parse().ok()?;
    let index: i64 = parts.next()?.parse().ok()?;
    Some((start.max(0) as usize, length.max(0) as usize, index))
}

fn field<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    node.get(key).filter(|v| !v.is_null())
}

fn collect_into<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
    match v {
        Value::Array(items) => {
            for item in items {
                if !item.is_null() {
                    out.push(item);
                }
            }
        }
        Value::Object(_) => out.push(v),
        _ => {}
    }
}

fn generic_children(node: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    for key in CHILD_FIELDS {
        if let Some(v) = field(node, key) {
            collect_into(v, &mut out);
        }
    }
    out
}

impl<'a> Walker<'a> {
    fn install(&mut self, start: usize, length: usize, feature: Feature) {
        if length == 0 {
            return;
        }
        if let Some(list) = self.features.get_mut(start) {
            list.push(feature);
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.positions.get(offset).map(|p| p.line).unwrap_or(1)
    }

    fn location(&self, start: usize, length: usize) -> Location {
        let end = (start + length).saturating_sub(1).min(self.positions.len().saturating_sub(1));
        Location {
            start: self.positions.get(start).copied().unwrap_or(Position { line: 1, column: 0 }),
            end: self.positions.get(end).copied().unwrap_or(Position { line: 1, column: 0 }),
        }
    }

    fn install_statement(&mut self, node: &Value, skip: bool) {
        if let Some((start, length, _)) = src_range(node) {
            let id = self.next_statement;
            self.next_statement += 1;
            self.install(start, length, Feature::Statement(id));
            self.statement_map.insert(
                id,
                StatementDescriptor { start: self.positions.get(start).copied().unwrap_or_default(), end: self.location(start, length).end, skip },
            );
        }
    }

    fn install_function(&mut self, node: &Value, name: &str, has_body: bool) {
        if !has_body {
            self.install_statement(node, true);
            return;
        }
        if let Some((start, length, _)) = src_range(node) {
            let id = self.next_fn;
            self.next_fn += 1;
            self.install(start, length, Feature::Function(id));
            self.fn_map.insert(
                id,
                FunctionDescriptor { name: name.to_string(), line: self.line_of(start), loc: self.location(start, length), skip: false },
            );
        }
    }

    fn install_branch(&mut self, node: &Value, kind: &str, alternatives: Vec<Option<&'a Value>>) {
        let id = self.next_branch;
        self.next_branch += 1;
        let mut locations = Vec::with_capacity(alternatives.len());
        for (alt_index, alt) in alternatives.iter().enumerate() {
            if let Some(alt_node) = alt {
                if let Some((start, length, _)) = src_range(alt_node) {
                    self.install(start, length, Feature::Branch { branch_id: id, alt_index: alt_index as u32 });
                    locations.push(self.location(start, length));
                    continue;
                }
            }
            locations.push(Location::default());
        }
        let line = src_range(node).map(|(s, _, _)| self.line_of(s)).unwrap_or(1);
        self.branch_map.insert(id, BranchDescriptor { line, kind: kind.to_string(), locations });
        for alt in alternatives.into_iter().flatten() {
            self.walk(alt);
        }
    }

    fn significant_lines(&self) -> std::collections::BTreeSet<usize> {
        let mut lines = std::collections::BTreeSet::new();
        for branch in self.branch_map.values() {
            lines.insert(branch.line);
        }
        for f in self.fn_map.values().filter(|f| !f.skip) {
            lines.insert(f.line);
        }
        for s in self.statement_map.values().filter(|s| !s.skip) {
            lines.insert(s.start.line);
        }
        lines
    }

    fn walk(&mut self, node: &'a Value) {
        let Some(node_type) = node.get("nodeType").and_then(Value::as_str) else { return };

        match node_type {
            "BinaryOperation" => {
                let operator = node.get("operator").and_then(Value::as_str).unwrap_or("");
                if operator == "&&" || operator == "||" {
                    let left = field(node, "leftExpression");
                    let right = field(node, "rightExpression");
                    self.install_branch(node, operator, vec![left, right]);
                } else {
                    self.install_statement(node, false);
                    for child in generic_children(node) {
                        self.walk(child);
                    }
                }
            }
            "Conditional" => {
                let (cond, t, f) = (field(node, "condition"), field(node, "trueExpression"), field(node, "falseExpression"));
                self.install_branch(node, "if", vec![t, f]);
                if let Some(cond) = cond {
                    self.walk(cond);
                }
            }
            "IfStatement" => {
                let cond = field(node, "condition");
                // Unlike `Conditional`/`YulIf`/`YulSwitch`, an `IfStatement`'s
                // alternatives are filtered non-null: an `if` with no `else`
                // gets a single-alternative branch, not a placeholder.
                let alts: Vec<Option<&Value>> =
                    vec![field(node, "trueBody"), field(node, "falseBody")].into_iter().filter(|a| a.is_some()).collect();
                self.install_branch(node, "if", alts);
                if let Some(cond) = cond {
                    self.walk(cond);
                }
            }
            "YulIf" => {
                let body = field(node, "body");
                let condition = field(node, "condition");
                self.install_branch(node, "if", vec![body, condition]);
            }
            "YulSwitch" => {
                let expression = field(node, "expression");
                let mut cases: Vec<Option<&Value>> = Vec::new();
                if let Some(Value::Array(items)) = field(node, "cases") {
                    cases.extend(items.iter().map(Some));
                }
                self.install_branch(node, "switch", cases);
                if let Some(expression) = expression {
                    self.walk(expression);
                }
            }
            "ContractDefinition" => {
                self.install_statement(node, true);
                for child in generic_children(node) {
                    self.walk(child);
                }
            }
            "FunctionDefinition" | "ModifierDefinition" | "YulFunctionDefinition" => {
                let name = node.get("name").and_then(Value::as_str).unwrap_or("");
                let has_body = field(node, "body").is_some();
                self.install_function(node, name, has_body);
                for child in generic_children(node) {
                    self.walk(child);
                }
            }
            "Assignment" | "IndexAccess" | "MemberAccess" | "Return" | "Break" | "Continue"
            | "EmitStatement" | "Identifier" | "NewExpression" | "RevertStatement"
            | "PlaceholderStatement" | "UnaryOperation" | "VariableDeclaration"
            | "YulAssignment" | "YulBreak" | "YulExpressionStatement" | "YulIdentifier"
            | "YulLeave" | "YulTypedName" | "YulVariableDeclaration" => {
                self.install_statement(node, false);
                for child in generic_children(node) {
                    self.walk(child);
                }
            }
            "ParameterList" => {
                self.install_statement(node, true);
            }
            "ElementaryTypeNameExpression" | "EnumDefinition" | "EventDefinition"
            | "ErrorDefinition" | "StructDefinition" | "FunctionCallOptions" | "Literal"
            | "YulLiteral" => {
                self.install_statement(node, true);
            }
            "FunctionCall" | "YulFunctionCall" | "Block" | "UncheckedBlock" | "YulBlock"
            | "InlineAssembly" | "ExpressionStatement" | "ForStatement" | "YulForLoop"
            | "TryStatement" | "TryCatchClause" | "TupleExpression" | "VariableDeclarationStatement"
            | "YulCase" | "SourceUnit" => {
                for child in generic_children(node) {
                    self.walk(child);
                }
            }
            "ImportDirective" | "PragmaDirective" => {}
            other => {
                tracing::warn!(node_type = other, "unrecognized AST node kind, skipping");
            }
        }
    }
}
