//! Relative-import bundler
//!
//! Each module is wrapped in its own function scope and evaluated once,
//! dependencies first. `import` statements are removed and every use of an
//! imported name becomes a read from the dependency's exports object, so
//! imports are available from the top of the module and stay live. Exports
//! are getters on the object the module function returns. Package (bare)
//! imports and import cycles are errors.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Statement};
use oxc_ecmascript::BoundNames;
use oxc_ast::AstKind;
use oxc_parser::Parser;
use oxc_semantic::{Semantic, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};

/// Extensions tried when an import omits one
const EXTENSIONS: &[&str] = &["js", "mjs"];

/// Local name given to anonymous default exports
const DEFAULT_LOCAL: &str = "__sf_default";

/// Copies `export *` names onto an exports object as live getters
const EXPORT_STAR: &str = "function __sf_export_star(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key !== 'default' && !Object.prototype.hasOwnProperty.call(target, key)) {
      Object.defineProperty(target, key, {
        enumerable: true,
        get: function () { return source[key]; }
      });
    }
  });
  return target;
}
";

/// One concatenated script
#[derive(Debug)]
pub struct Bundle {
    pub code: String,
    /// Every module included, in evaluation order
    pub modules: Vec<PathBuf>,
}

/// Where an exported name reads its value from
#[derive(Debug, Clone)]
enum Export {
    /// A binding of the module itself
    Local(String),
    /// A name exported by a dependency
    Member { specifier: String, name: String },
    /// A dependency's whole exports object
    Module { specifier: String },
}

/// How a rewritten reference to an imported name is written
#[derive(Debug, Clone, PartialEq, Eq)]
enum Form {
    Plain,
    /// Callee of a call; called without a receiver like a plain function
    Callee,
    /// `{ x }` shorthand property, kept as `{ x: ... }`
    Shorthand(String),
}

#[derive(Debug)]
enum RewriteKind {
    /// Replace the span with fixed text
    Replace(String),
    /// Use of an imported name
    Reference {
        specifier: String,
        imported: String,
        form: Form,
    },
}

#[derive(Debug)]
struct Rewrite {
    start: usize,
    end: usize,
    kind: RewriteKind,
}

impl Rewrite {
    fn remove(span: Span) -> Self {
        Self::replace(span, String::new())
    }

    fn replace(span: Span, text: String) -> Self {
        Rewrite {
            start: span.start as usize,
            end: span.end as usize,
            kind: RewriteKind::Replace(text),
        }
    }

    fn contains(&self, span: Span) -> bool {
        self.start < self.end && self.start <= span.start as usize && span.end as usize <= self.end
    }
}

/// A parsed module, before its imports are resolved
#[derive(Debug, Default)]
struct Parsed {
    source: String,
    /// Every specifier imported or re-exported from, in source order
    specifiers: Vec<String>,
    /// `import * as local` bindings: (local, specifier)
    namespaces: Vec<(String, String)>,
    /// Sorted by position, non-overlapping
    rewrites: Vec<Rewrite>,
    exports: Vec<(String, Export)>,
    /// `export * from` specifiers
    stars: Vec<String>,
}

/// Bundle `entry` and everything it imports
pub fn bundle(entry: &Path) -> Result<Bundle, String> {
    let entry = entry
        .canonicalize()
        .map_err(|e| format!("{}: {}", entry.display(), e))?;

    let mut loader = Loader::default();
    loader.load(entry)?;

    let mut code = String::from("(function () {\n'use strict';\n");
    if loader.export_star {
        code.push_str(EXPORT_STAR);
    }
    for &idx in &loader.order {
        code.push_str(&format!(
            "var {} = (function () {{\n{}\n}})();\n",
            module_var(idx),
            loader.rendered[idx]
        ));
    }
    code.push_str("})();\n");

    let modules = loader
        .order
        .iter()
        .map(|&idx| loader.paths[idx].clone())
        .collect();

    Ok(Bundle { code, modules })
}

#[derive(Default)]
struct Loader {
    paths: Vec<PathBuf>,
    rendered: Vec<String>,
    index: HashMap<PathBuf, usize>,
    /// Modules whose dependencies are still loading
    loading: HashSet<usize>,
    /// Post-order: dependencies before dependents
    order: Vec<usize>,
    /// Some module uses `export * from`
    export_star: bool,
}

impl Loader {
    fn load(&mut self, path: PathBuf) -> Result<usize, String> {
        if let Some(&idx) = self.index.get(&path) {
            if self.loading.contains(&idx) {
                return Err(format!("circular import of {}", path.display()));
            }
            return Ok(idx);
        }

        let idx = self.paths.len();
        self.paths.push(path.clone());
        self.rendered.push(String::new());
        self.index.insert(path.clone(), idx);
        self.loading.insert(idx);

        let source =
            std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let parsed = parse_module(&path, source)?;

        let dir = path.parent().unwrap_or(Path::new("."));
        let mut deps = HashMap::new();
        for specifier in &parsed.specifiers {
            if deps.contains_key(specifier) {
                continue;
            }
            let resolved = resolve(dir, specifier)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            let dep = self.load(resolved)?;
            deps.insert(specifier.clone(), dep);
        }

        self.export_star |= !parsed.stars.is_empty();
        self.rendered[idx] = render(&parsed, &deps)?;
        self.loading.remove(&idx);
        self.order.push(idx);
        Ok(idx)
    }
}

fn module_var(idx: usize) -> String {
    format!("__sf_m{}", idx)
}

fn quote(name: &str) -> String {
    serde_json::Value::String(name.to_string()).to_string()
}

fn member(module: &str, name: &str) -> String {
    format!("{}[{}]", module, quote(name))
}

/// Resolve a relative specifier to an existing file
fn resolve(dir: &Path, specifier: &str) -> Result<PathBuf, String> {
    let relative =
        specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/');
    if !relative {
        return Err(format!(
            "package import '{}' is not supported, only relative imports are bundled",
            specifier
        ));
    }

    let base = dir.join(specifier);
    let mut candidates = vec![base.clone()];
    for ext in EXTENSIONS {
        let mut with_ext = base.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        candidates.push(PathBuf::from(with_ext));
    }
    for ext in EXTENSIONS {
        candidates.push(base.join(format!("index.{}", ext)));
    }

    candidates
        .into_iter()
        .find(|c| c.is_file())
        .map(|p| p.canonicalize().unwrap_or(p))
        .ok_or_else(|| format!("cannot resolve '{}'", specifier))
}

fn parse_module(path: &Path, source: String) -> Result<Parsed, String> {
    let mut parsed = scan(path, &source)?;
    parsed.source = source;
    Ok(parsed)
}

fn scan(path: &Path, source: &str) -> Result<Parsed, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(format!("{}: {}", path.display(), error));
    }
    let program = ret.program;
    let semantic = SemanticBuilder::new().build(&program).semantic;

    let mut parsed = Parsed::default();
    // Named and default imports: local name -> (specifier, imported name)
    let mut imports: HashMap<String, (String, String)> = HashMap::new();

    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        let specifier = decl.source.value.to_string();
        parsed.specifiers.push(specifier.clone());
        parsed.rewrites.push(Rewrite::remove(decl.span));

        for spec in decl.specifiers.iter().flatten() {
            let (local, imported) = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    (&s.local, s.imported.name().to_string())
                }
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    (&s.local, "default".to_string())
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    parsed
                        .namespaces
                        .push((s.local.name.to_string(), specifier.clone()));
                    continue;
                }
            };
            imports.insert(local.name.to_string(), (specifier.clone(), imported.clone()));
            if let Some(symbol) = local.symbol_id.get() {
                references(&semantic, symbol, &specifier, &imported, &mut parsed.rewrites);
            }
        }
    }

    let local_export = |local: String| match imports.get(&local) {
        Some((specifier, name)) => Export::Member {
            specifier: specifier.clone(),
            name: name.clone(),
        },
        None => Export::Local(local),
    };

    let mut statements = Vec::new();
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    declaration.bound_names(&mut |id| {
                        parsed
                            .exports
                            .push((id.name.to_string(), Export::Local(id.name.to_string())));
                    });
                    statements.push(Rewrite::remove(Span::new(
                        decl.span.start,
                        declaration.span().start,
                    )));
                } else if let Some(source) = &decl.source {
                    let specifier = source.value.to_string();
                    parsed.specifiers.push(specifier.clone());
                    for s in decl.specifiers.iter() {
                        parsed.exports.push((
                            s.exported.name().to_string(),
                            Export::Member {
                                specifier: specifier.clone(),
                                name: s.local.name().to_string(),
                            },
                        ));
                    }
                    statements.push(Rewrite::remove(decl.span));
                } else {
                    for s in decl.specifiers.iter() {
                        parsed.exports.push((
                            s.exported.name().to_string(),
                            local_export(s.local.name().to_string()),
                        ));
                    }
                    statements.push(Rewrite::remove(decl.span));
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let inner = decl.declaration.span();
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };

                let prefix = Span::new(decl.span.start, inner.start);
                match named {
                    Some(name) => {
                        parsed
                            .exports
                            .push(("default".to_string(), Export::Local(name)));
                        statements.push(Rewrite::remove(prefix));
                    }
                    None => {
                        parsed.exports.push((
                            "default".to_string(),
                            Export::Local(DEFAULT_LOCAL.to_string()),
                        ));
                        statements.push(Rewrite::replace(
                            prefix,
                            format!("var {} = ", DEFAULT_LOCAL),
                        ));
                        statements.push(Rewrite::replace(
                            Span::new(inner.end, inner.end),
                            ";".to_string(),
                        ));
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let specifier = decl.source.value.to_string();
                parsed.specifiers.push(specifier.clone());
                match &decl.exported {
                    Some(name) => parsed
                        .exports
                        .push((name.name().to_string(), Export::Module { specifier })),
                    None => parsed.stars.push(specifier),
                }
                statements.push(Rewrite::remove(decl.span));
            }
            _ => {}
        }
    }

    // `export { x }` names an import; the statement is dropped whole
    parsed.rewrites.retain(|r| {
        let span = Span::new(r.start as u32, r.end as u32);
        !statements.iter().any(|s| s.contains(span))
    });
    parsed.rewrites.extend(statements);
    parsed.rewrites.sort_by_key(|r| (r.start, r.end));

    Ok(parsed)
}

/// Rewrites for every use of an imported binding
fn references(
    semantic: &Semantic<'_>,
    symbol: SymbolId,
    specifier: &str,
    imported: &str,
    rewrites: &mut Vec<Rewrite>,
) {
    for reference in semantic.symbol_references(symbol) {
        let span = semantic.reference_span(reference);
        let form = match semantic.nodes().parent_kind(reference.node_id()) {
            Some(AstKind::CallExpression(call)) if call.callee.span() == span => Form::Callee,
            Some(AstKind::ObjectProperty(prop)) if prop.shorthand => {
                Form::Shorthand(semantic.reference_name(reference).to_string())
            }
            _ => Form::Plain,
        };
        rewrites.push(Rewrite {
            start: span.start as usize,
            end: span.end as usize,
            kind: RewriteKind::Reference {
                specifier: specifier.to_string(),
                imported: imported.to_string(),
                form,
            },
        });
    }
}

/// Module body with imports resolved, ending in `return <exports>`
fn render(parsed: &Parsed, deps: &HashMap<String, usize>) -> Result<String, String> {
    let dep_var = |specifier: &str| {
        deps.get(specifier)
            .map(|&idx| module_var(idx))
            .ok_or_else(|| format!("unresolved import '{}'", specifier))
    };

    let source = &parsed.source;
    let mut out = String::with_capacity(source.len() + 128);

    for (local, specifier) in &parsed.namespaces {
        out.push_str(&format!("var {} = {};\n", local, dep_var(specifier)?));
    }

    let mut cursor = 0;
    for rewrite in &parsed.rewrites {
        out.push_str(&source[cursor..rewrite.start]);
        match &rewrite.kind {
            RewriteKind::Replace(text) => out.push_str(text),
            RewriteKind::Reference {
                specifier,
                imported,
                form,
            } => {
                let access = member(&dep_var(specifier)?, imported);
                match form {
                    Form::Plain => out.push_str(&access),
                    Form::Callee => out.push_str(&format!("(0, {})", access)),
                    Form::Shorthand(local) => out.push_str(&format!("{}: {}", local, access)),
                }
            }
        }
        cursor = rewrite.end;
    }
    out.push_str(&source[cursor..]);

    let mut getters = Vec::new();
    for (name, export) in &parsed.exports {
        let value = match export {
            Export::Local(local) => local.clone(),
            Export::Member { specifier, name } => member(&dep_var(specifier)?, name),
            Export::Module { specifier } => dep_var(specifier)?,
        };
        getters.push(format!("get {}() {{ return {}; }}", quote(name), value));
    }
    let mut object = if getters.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", getters.join(", "))
    };
    for specifier in &parsed.stars {
        object = format!("__sf_export_star({}, {})", object, dep_var(specifier)?);
    }

    out.push_str("\nreturn ");
    out.push_str(&object);
    out.push(';');

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_modules_are_ordered_dependencies_first() {
        let temp = tempfile::tempdir().unwrap();
        write(
            temp.path(),
            "math.js",
            "export const double = (x) => x * 2;\nexport default function triple(x) { return x * 3; }\n",
        );
        write(
            temp.path(),
            "util/index.js",
            "export { double as twice } from '../math.js';\nexport const name = 'util';\n",
        );
        let entry = write(
            temp.path(),
            "script.js",
            "import triple, { double } from './math';\nimport * as util from './util';\nconsole.log(double(2), triple(3), util.twice(4), util.name);\n",
        );

        let bundle = bundle(&entry).unwrap();

        let names: Vec<String> = bundle
            .modules
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["math.js", "index.js", "script.js"]);

        let code = &bundle.code;
        let math = code.find("x * 3").unwrap();
        let util = code.find("'util'").unwrap();
        let main = code.find("console.log").unwrap();
        assert!(math < util && util < main);

        assert!(code.contains("var util = __sf_m2;"));
        assert!(code.contains(
            r#"console.log((0, __sf_m1["double"])(2), (0, __sf_m1["default"])(3), util.twice(4)"#
        ));
        assert!(code.contains(r#"get "twice"() { return __sf_m1["double"]; }"#));
        assert!(code.contains(r#"get "default"() { return triple; }"#));
        assert!(!code.contains("export "));
        assert!(!code.contains("import "));
    }

    #[test]
    fn test_anonymous_default_export() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "answer.js", "export default 40 + 2;\n");
        let entry = write(
            temp.path(),
            "script.js",
            "import answer from './answer.js';\nconsole.log(answer);\n",
        );

        let code = bundle(&entry).unwrap().code;

        assert!(code.contains("var __sf_default = 40 + 2"));
        assert!(code.contains(r#"get "default"() { return __sf_default; }"#));
        assert!(code.contains(r#"console.log(__sf_m1["default"]);"#));
    }

    #[test]
    fn test_imports_are_bound_before_the_module_body() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.js", "export const x = 1;\n");
        let entry = write(
            temp.path(),
            "script.js",
            "console.log(x);\nimport { x } from './a.js';\n",
        );

        let code = bundle(&entry).unwrap().code;

        assert!(code.contains(r#"console.log(__sf_m1["x"]);"#), "{code}");
        assert!(!code.contains("var x"));
        let dependency = code.find("var __sf_m1 =").unwrap();
        let entry = code.find("var __sf_m0 =").unwrap();
        assert!(dependency < entry);
    }

    #[test]
    fn test_imported_bindings_stay_live() {
        let temp = tempfile::tempdir().unwrap();
        write(
            temp.path(),
            "counter.js",
            "export let count = 0;\nexport function bump() { count += 1; }\n",
        );
        let entry = write(
            temp.path(),
            "script.js",
            "import { count, bump } from './counter.js';\nbump();\nconsole.log(count, { count });\n",
        );

        let code = bundle(&entry).unwrap().code;

        assert!(code.contains(r#"get "count"() { return count; }"#));
        assert!(code.contains(r#"(0, __sf_m1["bump"])();"#));
        assert!(code.contains(r#"console.log(__sf_m1["count"], { count: __sf_m1["count"] });"#));
    }

    #[test]
    fn test_reexported_imports_and_star_exports() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.js", "export const x = 1;\n");
        write(temp.path(), "c.js", "export const z = 3;\n");
        write(
            temp.path(),
            "b.js",
            "import { x } from './a.js';\nexport { x as y };\nexport * from './c.js';\n",
        );
        let entry = write(
            temp.path(),
            "script.js",
            "import { y, z } from './b.js';\nconsole.log(y + z);\n",
        );

        let code = bundle(&entry).unwrap().code;

        // script.js = 0, b.js = 1, a.js = 2, c.js = 3
        assert!(code.contains(r#"get "y"() { return __sf_m2["x"]; }"#), "{code}");
        assert!(code.contains("__sf_export_star({ get \"y\""));
        assert!(code.contains(", __sf_m3);"));
        assert_eq!(code.matches("function __sf_export_star").count(), 1);
        assert!(code.contains(r#"console.log(__sf_m1["y"] + __sf_m1["z"]);"#));
    }

    #[test]
    fn test_shared_dependency_is_included_once() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "shared.js", "export const x = 1;\n");
        write(temp.path(), "a.js", "import { x } from './shared.js';\nexport const a = x;\n");
        write(temp.path(), "b.js", "import { x } from './shared.js';\nexport const b = x;\n");
        let entry = write(
            temp.path(),
            "script.js",
            "import { a } from './a.js';\nimport { b } from './b.js';\nconsole.log(a + b);\n",
        );

        let bundle = bundle(&entry).unwrap();

        assert_eq!(bundle.modules.len(), 4);
        assert_eq!(bundle.code.matches("export const x").count(), 0);
        assert_eq!(bundle.code.matches("const x = 1").count(), 1);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.js", "import { b } from './b.js';\nexport const a = 1;\n");
        write(temp.path(), "b.js", "import { a } from './a.js';\nexport const b = 2;\n");

        let err = bundle(&temp.path().join("a.js")).unwrap_err();
        assert!(err.contains("circular"), "{err}");
    }

    #[test]
    fn test_package_import_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let entry = write(temp.path(), "script.js", "import _ from 'lodash';\n");

        let err = bundle(&entry).unwrap_err();
        assert!(err.contains("lodash"), "{err}");
    }

    #[test]
    fn test_syntax_error_names_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let entry = write(temp.path(), "script.js", "let = ;\n");

        let err = bundle(&entry).unwrap_err();
        assert!(err.contains("script.js"), "{err}");
    }
}
