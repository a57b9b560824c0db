//! Python callable-unit extraction over the rustpython AST.
//!
//! Walks module and class bodies for function definitions, collecting for
//! each one its parameters, `self` attribute reads/writes, call expressions
//! with their receiver shape, a cyclomatic complexity estimate, and the
//! authoritative source line range (decorators included). Nested defs
//! become their own units, attached to the innermost enclosing class or to
//! module scope.

use super::{ImportStatement, LineIndex, ParsedModule};
use crate::core::{CallReceiver, CallableUnit, RawCall};
use crate::errors::DecomposeError;
use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Mode;
use std::collections::BTreeSet;
use std::path::Path;

pub(crate) fn parse(content: &str, logical_path: &Path) -> Result<ParsedModule, DecomposeError> {
    let source_name = logical_path.display().to_string();
    let module = rustpython_parser::parse(content, Mode::Module, &source_name)
        .map_err(|e| to_parse_error(content, &e))?;

    let index = LineIndex::new(content);
    let mut units = Vec::new();
    let mut imports = Vec::new();

    if let ast::Mod::Module(module) = &module {
        let mut extractor = UnitExtractor {
            source: content,
            index: &index,
            class_stack: Vec::new(),
            units: Vec::new(),
        };
        extractor.extract_body(&module.body);
        units = extractor.units;
        imports = extract_imports(&module.body, content);
    }

    // Nested defs finish extraction after their parent; restore source order.
    units.sort_by(|a, b| {
        (a.start_line, &a.qualified_name).cmp(&(b.start_line, &b.qualified_name))
    });

    Ok(ParsedModule::new(
        logical_path.to_path_buf(),
        units,
        imports,
        content,
    ))
}

fn to_parse_error(content: &str, err: &rustpython_parser::ParseError) -> DecomposeError {
    let index = LineIndex::new(content);
    DecomposeError::Parse {
        reason: err.error.to_string(),
        line: index.line_of(err.offset.to_usize()),
    }
}

/// Sync and async defs share field names; this borrows the parts common
/// to both so extraction is written once.
struct FunctionParts<'a> {
    name: &'a ast::Identifier,
    args: &'a ast::Arguments,
    body: &'a [ast::Stmt],
    decorators: &'a [ast::Expr],
    returns: Option<&'a ast::Expr>,
    start: usize,
    end: usize,
}

impl<'a> FunctionParts<'a> {
    fn from_def(def: &'a ast::StmtFunctionDef) -> Self {
        Self {
            name: &def.name,
            args: &def.args,
            body: &def.body,
            decorators: &def.decorator_list,
            returns: def.returns.as_deref(),
            start: def.range.start().to_usize(),
            end: def.range.end().to_usize(),
        }
    }

    fn from_async_def(def: &'a ast::StmtAsyncFunctionDef) -> Self {
        Self {
            name: &def.name,
            args: &def.args,
            body: &def.body,
            decorators: &def.decorator_list,
            returns: def.returns.as_deref(),
            start: def.range.start().to_usize(),
            end: def.range.end().to_usize(),
        }
    }
}

struct UnitExtractor<'a> {
    source: &'a str,
    index: &'a LineIndex,
    class_stack: Vec<String>,
    units: Vec<CallableUnit>,
}

impl<'a> UnitExtractor<'a> {
    fn extract_body(&mut self, body: &'a [ast::Stmt]) {
        for stmt in body {
            self.extract_stmt(stmt, false);
        }
    }

    fn extract_stmt(&mut self, stmt: &'a ast::Stmt, nested: bool) {
        match stmt {
            ast::Stmt::FunctionDef(def) => {
                self.extract_function(&FunctionParts::from_def(def), nested)
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                self.extract_function(&FunctionParts::from_async_def(def), nested)
            }
            ast::Stmt::ClassDef(def) => {
                self.class_stack.push(def.name.to_string());
                for stmt in &def.body {
                    self.extract_stmt(stmt, nested);
                }
                self.class_stack.pop();
            }
            _ => {}
        }
    }

    fn extract_function(&mut self, parts: &FunctionParts<'a>, nested: bool) {
        let owning_type = self.class_stack.last().cloned();
        let name = parts.name.to_string();
        let qualified_name = match &owning_type {
            Some(class_name) => format!("{}.{}", class_name, name),
            None => name.clone(),
        };

        let mut collector = BodyCollector::default();
        collector.visit_stmts(parts.body);

        let mut start = parts.start;
        for decorator in parts.decorators {
            start = start.min(decorator.range().start().to_usize());
        }

        self.units.push(CallableUnit {
            qualified_name,
            name,
            owning_type,
            parameters: parameter_names(parts.args),
            return_annotation: parts.returns.map(|expr| self.expr_text(expr)),
            accessed_attributes: collector.accessed,
            modified_attributes: collector.modified,
            calls: collector.calls,
            complexity: cyclomatic(parts.body),
            start_line: self.index.line_of(start),
            end_line: self.index.line_of(parts.end.saturating_sub(1)),
            nested,
        });

        // Nested defs attach to the innermost enclosing class, which is
        // still on the stack here.
        for stmt in collector.nested {
            self.extract_stmt(stmt, true);
        }
    }

    fn expr_text(&self, expr: &ast::Expr) -> String {
        let range = expr.range();
        self.source[range.start().to_usize()..range.end().to_usize()].to_string()
    }
}

fn parameter_names(args: &ast::Arguments) -> Vec<String> {
    let mut params = Vec::new();
    for arg in args.posonlyargs.iter().chain(&args.args) {
        params.push(arg.def.arg.to_string());
    }
    if let Some(vararg) = &args.vararg {
        params.push(format!("*{}", vararg.arg));
    }
    for arg in &args.kwonlyargs {
        params.push(arg.def.arg.to_string());
    }
    if let Some(kwarg) = &args.kwarg {
        params.push(format!("**{}", kwarg.arg));
    }
    params
}

/// Cyclomatic complexity over a body: 1 plus one per branch point.
/// Nested defs are separate units and contribute nothing here.
fn cyclomatic(body: &[ast::Stmt]) -> u32 {
    1 + branches_in(body)
}

fn branches_in(body: &[ast::Stmt]) -> u32 {
    body.iter().map(count_branches_stmt).sum()
}

fn count_branches_stmt(stmt: &ast::Stmt) -> u32 {
    match stmt {
        ast::Stmt::If(s) => 1 + branches_in(&s.body) + branches_in(&s.orelse),
        ast::Stmt::While(s) => 1 + branches_in(&s.body) + branches_in(&s.orelse),
        ast::Stmt::For(s) => 1 + branches_in(&s.body) + branches_in(&s.orelse),
        ast::Stmt::AsyncFor(s) => 1 + branches_in(&s.body) + branches_in(&s.orelse),
        ast::Stmt::With(s) => branches_in(&s.body),
        ast::Stmt::AsyncWith(s) => branches_in(&s.body),
        ast::Stmt::Try(s) => {
            let mut count = s.handlers.len() as u32 + branches_in(&s.body);
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(handler) = handler;
                count += branches_in(&handler.body);
            }
            count + branches_in(&s.orelse) + branches_in(&s.finalbody)
        }
        ast::Stmt::Match(s) => {
            s.cases.len() as u32
                + s.cases
                    .iter()
                    .map(|case| branches_in(&case.body))
                    .sum::<u32>()
        }
        _ => 0,
    }
}

/// Walks one function body collecting attribute accesses and calls.
/// Stops at nested def boundaries; those are extracted as separate units.
#[derive(Default)]
struct BodyCollector<'a> {
    accessed: BTreeSet<String>,
    modified: BTreeSet<String>,
    calls: Vec<RawCall>,
    nested: Vec<&'a ast::Stmt>,
}

impl<'a> BodyCollector<'a> {
    fn visit_stmts(&mut self, stmts: &'a [ast::Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &'a ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_) => {
                self.nested.push(stmt);
            }
            ast::Stmt::Return(s) => {
                if let Some(value) = &s.value {
                    self.visit_expr(value);
                }
            }
            ast::Stmt::Delete(s) => self.visit_exprs(&s.targets),
            ast::Stmt::Assign(s) => {
                self.visit_exprs(&s.targets);
                self.visit_expr(&s.value);
            }
            ast::Stmt::AugAssign(s) => {
                // read-modify-write: the target is both accessed and modified
                if let ast::Expr::Attribute(attr) = s.target.as_ref() {
                    if is_self(&attr.value) {
                        self.accessed.insert(attr.attr.to_string());
                    }
                }
                self.visit_expr(&s.target);
                self.visit_expr(&s.value);
            }
            ast::Stmt::AnnAssign(s) => {
                self.visit_expr(&s.target);
                if let Some(value) = &s.value {
                    self.visit_expr(value);
                }
            }
            ast::Stmt::For(s) => {
                self.visit_expr(&s.target);
                self.visit_expr(&s.iter);
                self.visit_stmts(&s.body);
                self.visit_stmts(&s.orelse);
            }
            ast::Stmt::AsyncFor(s) => {
                self.visit_expr(&s.target);
                self.visit_expr(&s.iter);
                self.visit_stmts(&s.body);
                self.visit_stmts(&s.orelse);
            }
            ast::Stmt::While(s) => {
                self.visit_expr(&s.test);
                self.visit_stmts(&s.body);
                self.visit_stmts(&s.orelse);
            }
            ast::Stmt::If(s) => {
                self.visit_expr(&s.test);
                self.visit_stmts(&s.body);
                self.visit_stmts(&s.orelse);
            }
            ast::Stmt::With(s) => {
                for item in &s.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_stmts(&s.body);
            }
            ast::Stmt::AsyncWith(s) => {
                for item in &s.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_stmts(&s.body);
            }
            ast::Stmt::Match(s) => {
                self.visit_expr(&s.subject);
                for case in &s.cases {
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_stmts(&case.body);
                }
            }
            ast::Stmt::Raise(s) => {
                if let Some(exc) = &s.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &s.cause {
                    self.visit_expr(cause);
                }
            }
            ast::Stmt::Try(s) => {
                self.visit_stmts(&s.body);
                for handler in &s.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_);
                    }
                    self.visit_stmts(&handler.body);
                }
                self.visit_stmts(&s.orelse);
                self.visit_stmts(&s.finalbody);
            }
            ast::Stmt::Assert(s) => {
                self.visit_expr(&s.test);
                if let Some(msg) = &s.msg {
                    self.visit_expr(msg);
                }
            }
            ast::Stmt::Expr(s) => self.visit_expr(&s.value),
            _ => {}
        }
    }

    fn visit_exprs(&mut self, exprs: &'a [ast::Expr]) {
        for expr in exprs {
            self.visit_expr(expr);
        }
    }

    fn visit_expr(&mut self, expr: &'a ast::Expr) {
        match expr {
            ast::Expr::Call(call) => {
                self.record_call(call);
                // The callee name was consumed by record_call; only its
                // receiver expression is walked so method names do not
                // leak into the attribute sets.
                match call.func.as_ref() {
                    ast::Expr::Attribute(attr) => self.visit_expr(&attr.value),
                    ast::Expr::Name(_) => {}
                    other => self.visit_expr(other),
                }
                self.visit_exprs(&call.args);
                for keyword in &call.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            ast::Expr::Attribute(attr) => {
                if is_self(&attr.value) {
                    match attr.ctx {
                        ast::ExprContext::Load => {
                            self.accessed.insert(attr.attr.to_string());
                        }
                        _ => {
                            self.modified.insert(attr.attr.to_string());
                        }
                    }
                }
                self.visit_expr(&attr.value);
            }
            ast::Expr::BoolOp(e) => self.visit_exprs(&e.values),
            ast::Expr::NamedExpr(e) => {
                self.visit_expr(&e.target);
                self.visit_expr(&e.value);
            }
            ast::Expr::BinOp(e) => {
                self.visit_expr(&e.left);
                self.visit_expr(&e.right);
            }
            ast::Expr::UnaryOp(e) => self.visit_expr(&e.operand),
            ast::Expr::Lambda(e) => self.visit_expr(&e.body),
            ast::Expr::IfExp(e) => {
                self.visit_expr(&e.test);
                self.visit_expr(&e.body);
                self.visit_expr(&e.orelse);
            }
            ast::Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                self.visit_exprs(&e.values);
            }
            ast::Expr::Set(e) => self.visit_exprs(&e.elts),
            ast::Expr::ListComp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            ast::Expr::SetComp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            ast::Expr::DictComp(e) => {
                self.visit_expr(&e.key);
                self.visit_expr(&e.value);
                self.visit_comprehensions(&e.generators);
            }
            ast::Expr::GeneratorExp(e) => {
                self.visit_expr(&e.elt);
                self.visit_comprehensions(&e.generators);
            }
            ast::Expr::Await(e) => self.visit_expr(&e.value),
            ast::Expr::Yield(e) => {
                if let Some(value) = &e.value {
                    self.visit_expr(value);
                }
            }
            ast::Expr::YieldFrom(e) => self.visit_expr(&e.value),
            ast::Expr::Compare(e) => {
                self.visit_expr(&e.left);
                self.visit_exprs(&e.comparators);
            }
            ast::Expr::FormattedValue(e) => {
                self.visit_expr(&e.value);
                if let Some(spec) = &e.format_spec {
                    self.visit_expr(spec);
                }
            }
            ast::Expr::JoinedStr(e) => self.visit_exprs(&e.values),
            ast::Expr::Subscript(e) => {
                self.visit_expr(&e.value);
                self.visit_expr(&e.slice);
            }
            ast::Expr::Starred(e) => self.visit_expr(&e.value),
            ast::Expr::List(e) => self.visit_exprs(&e.elts),
            ast::Expr::Tuple(e) => self.visit_exprs(&e.elts),
            ast::Expr::Slice(e) => {
                if let Some(lower) = &e.lower {
                    self.visit_expr(lower);
                }
                if let Some(upper) = &e.upper {
                    self.visit_expr(upper);
                }
                if let Some(step) = &e.step {
                    self.visit_expr(step);
                }
            }
            _ => {}
        }
    }

    fn visit_comprehensions(&mut self, generators: &'a [ast::Comprehension]) {
        for comp in generators {
            self.visit_expr(&comp.target);
            self.visit_expr(&comp.iter);
            self.visit_exprs(&comp.ifs);
        }
    }

    fn record_call(&mut self, call: &'a ast::ExprCall) {
        match call.func.as_ref() {
            ast::Expr::Name(name) => self.calls.push(RawCall {
                name: name.id.to_string(),
                receiver: CallReceiver::Bare,
            }),
            ast::Expr::Attribute(attr) => {
                let receiver = match attr.value.as_ref() {
                    ast::Expr::Name(name) if name.id.as_str() == "self" => CallReceiver::SelfMethod,
                    ast::Expr::Name(name) => CallReceiver::Named(name.id.to_string()),
                    _ => CallReceiver::Dynamic,
                };
                self.calls.push(RawCall {
                    name: attr.attr.to_string(),
                    receiver,
                });
            }
            // Computed callables carry no resolvable name
            _ => {}
        }
    }
}

fn is_self(expr: &ast::Expr) -> bool {
    matches!(expr, ast::Expr::Name(name) if name.id.as_str() == "self")
}

fn extract_imports(body: &[ast::Stmt], source: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();
    for stmt in body {
        match stmt {
            ast::Stmt::Import(import) => {
                let bound_names = import
                    .names
                    .iter()
                    .map(|alias| match &alias.asname {
                        Some(asname) => asname.to_string(),
                        None => alias
                            .name
                            .as_str()
                            .split('.')
                            .next()
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect();
                imports.push(ImportStatement {
                    text: statement_text(source, import.range.start().to_usize(), import.range.end().to_usize()),
                    bound_names,
                    is_star: false,
                });
            }
            ast::Stmt::ImportFrom(import) => {
                let is_star = import.names.iter().any(|alias| alias.name.as_str() == "*");
                let bound_names = if is_star {
                    Vec::new()
                } else {
                    import
                        .names
                        .iter()
                        .map(|alias| match &alias.asname {
                            Some(asname) => asname.to_string(),
                            None => alias.name.to_string(),
                        })
                        .collect()
                };
                imports.push(ImportStatement {
                    text: statement_text(source, import.range.start().to_usize(), import.range.end().to_usize()),
                    bound_names,
                    is_star,
                });
            }
            _ => {}
        }
    }
    imports
}

fn statement_text(source: &str, start: usize, end: usize) -> String {
    source[start..end.min(source.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::parse_module;
    use std::path::Path;

    fn parse_ok(code: &str) -> ParsedModule {
        parse_module(code, Path::new("test.py")).unwrap()
    }

    #[test]
    fn extracts_methods_with_qualified_names() {
        let parsed = parse_ok(
            r#"
class DataProcessor:
    def validate_input(self, payload):
        return self.schema.check(payload)

    def process(self, payload):
        self.validate_input(payload)
"#,
        );
        let names: Vec<&str> = parsed
            .units
            .iter()
            .map(|u| u.qualified_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["DataProcessor.validate_input", "DataProcessor.process"]
        );
        assert_eq!(
            parsed.units[0].owning_type.as_deref(),
            Some("DataProcessor")
        );
    }

    #[test]
    fn records_attribute_reads_and_writes() {
        let parsed = parse_ok(
            r#"
class Cache:
    def store_entry(self, key, value):
        self.entries[key] = value
        self.size = self.size + 1
        self.dirty = True
"#,
        );
        let unit = &parsed.units[0];
        assert!(unit.accessed_attributes.contains("entries"));
        assert!(unit.accessed_attributes.contains("size"));
        assert!(unit.modified_attributes.contains("size"));
        assert!(unit.modified_attributes.contains("dirty"));
    }

    #[test]
    fn method_calls_do_not_pollute_attribute_sets() {
        let parsed = parse_ok(
            r#"
class Worker:
    def run(self):
        self.execute_step()
"#,
        );
        let unit = &parsed.units[0];
        assert!(unit.accessed_attributes.is_empty());
        assert_eq!(unit.calls.len(), 1);
        assert_eq!(unit.calls[0].name, "execute_step");
        assert_eq!(unit.calls[0].receiver, CallReceiver::SelfMethod);
    }

    #[test]
    fn classifies_call_receivers() {
        let parsed = parse_ok(
            r#"
def dispatch(task):
    helper(task)
    Registry.lookup(task)
    task.queue.push(task)
"#,
        );
        let calls = &parsed.units[0].calls;
        assert_eq!(calls[0].receiver, CallReceiver::Bare);
        assert_eq!(calls[1].receiver, CallReceiver::Named("Registry".to_string()));
        assert_eq!(calls[2].receiver, CallReceiver::Dynamic);
        assert_eq!(calls[2].name, "push");
    }

    #[test]
    fn nested_defs_attach_to_innermost_class() {
        let parsed = parse_ok(
            r#"
class Panel:
    def deliver(self, observers):
        def notify(observer):
            observer.ping()
        for observer in observers:
            notify(observer)
"#,
        );
        let names: Vec<&str> = parsed
            .units
            .iter()
            .map(|u| u.qualified_name.as_str())
            .collect();
        assert_eq!(names, vec!["Panel.deliver", "Panel.notify"]);
        assert!(!parsed.units[0].nested);
        assert!(parsed.units[1].nested);
    }

    #[test]
    fn line_ranges_cover_decorators() {
        let code = "\
class Service:
    @property
    def state(self):
        return self.current
";
        let parsed = parse_ok(code);
        let unit = &parsed.units[0];
        assert_eq!(unit.start_line, 2);
        assert_eq!(unit.end_line, 4);
    }

    #[test]
    fn varargs_keep_star_prefixes() {
        let parsed = parse_ok(
            r#"
def forward(target, *args, **kwargs):
    return target(*args, **kwargs)
"#,
        );
        assert_eq!(
            parsed.units[0].parameters,
            vec!["target", "*args", "**kwargs"]
        );
    }

    #[test]
    fn complexity_counts_branches() {
        let parsed = parse_ok(
            r#"
def triage(value):
    if value > 10:
        for item in range(value):
            if item % 2:
                value += 1
    return value
"#,
        );
        assert_eq!(parsed.units[0].complexity, 4);
    }

    #[test]
    fn imports_capture_bound_names() {
        let parsed = parse_ok(
            r#"
import os.path
import json as j
from typing import Optional, List
from glob import *

def noop():
    pass
"#,
        );
        assert_eq!(parsed.imports.len(), 4);
        assert_eq!(parsed.imports[0].bound_names, vec!["os"]);
        assert_eq!(parsed.imports[1].bound_names, vec!["j"]);
        assert_eq!(parsed.imports[2].bound_names, vec!["Optional", "List"]);
        assert!(parsed.imports[3].is_star);
        assert_eq!(parsed.imports[2].text, "from typing import Optional, List");
    }

    #[test]
    fn malformed_source_reports_line() {
        let err = parse_module("def broken(:\n    pass\n", Path::new("bad.py")).unwrap_err();
        match err {
            DecomposeError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn return_annotation_is_verbatim_text() {
        let parsed = parse_ok(
            r#"
def load_config(path) -> dict:
    return {}
"#,
        );
        assert_eq!(parsed.units[0].return_annotation.as_deref(), Some("dict"));
    }
}
