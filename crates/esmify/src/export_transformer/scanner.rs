//! Lexical scanning of an already ESM-ified module
//!
//! Everything here is pattern matching over the text; nothing is parsed.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

static DEFAULT_EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export[ \t]+default[ \t]+([A-Za-z_$][\w$]*)[ \t]*;")
        .expect("default export pattern must compile")
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+([^'";]+?)\s+from\s+['"]([^'"\n]+)['"]"#)
        .expect("import pattern must compile")
});

static REGISTRATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?m)^([A-Za-z_$][\w$]*)[ \t]*\([ \t]*([\w$]+)[ \t]*,[ \t]*['"]([\w$]+)['"][ \t]*,"#,
        r"[ \t]*([A-Za-z_$][\w$]*)[ \t]*\)[ \t]*;[ \t]*\r?$",
    ))
    .expect("registration call pattern must compile")
});

static ANNOTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*//[ \t]*exports:[ \t]*(\{.*\})[ \t]*\r?$")
        .expect("exports annotation pattern must compile")
});

static EXPORT_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export[ \t]*\{([^}]*)\}").expect("export list pattern must compile")
});

static EXPORT_DESTRUCTURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export[ \t]+(?:const|let|var)[ \t]*\{([^}]*)\}")
        .expect("destructuring export pattern must compile")
});

static EXPORT_DECLARATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^[ \t]*export[ \t]+(?:async[ \t]+)?",
        r"(?:const|let|var|function[ \t]*\*?|class)[ \t]+([A-Za-z_$][\w$]*)",
    ))
    .expect("declaration export pattern must compile")
});

/// Last path segments of modules whose default export defines a read-only
/// property, i.e. whose local binding behaves like `setReadOnly`
const READ_ONLY_HELPERS: &[&str] = &[
    "set-read-only",
    "set-nonenumerable-read-only",
    "define-read-only-property",
    "define-nonenumerable-read-only-property",
];

/// Words matching the identifier shape that cannot be re-exported by name
const RESERVED_VALUES: &[&str] = &[
    "true", "false", "null", "this", "undefined", "NaN", "Infinity", "void", "typeof", "new",
];

/// One `import ... from '...'` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    pub specifier: String,
    pub default_binding: Option<String>,
    /// Every local name the declaration introduces, default included
    pub bindings: Vec<String>,
}

impl ImportDeclaration {
    /// Whether the default import is a read-only-property helper
    pub fn imports_read_only_helper(&self) -> bool {
        let last = self
            .specifier
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let last = last.strip_suffix(".js").unwrap_or(last);
        let last = last.strip_prefix("utils-").unwrap_or(last);
        READ_ONLY_HELPERS.contains(&last)
    }
}

/// `callee( namespace, 'name', identifier );`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCall {
    pub callee: String,
    pub namespace: String,
    pub name: String,
    pub identifier: String,
}

pub(crate) fn default_export(code: &str) -> Option<&str> {
    DEFAULT_EXPORT_RE
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub(crate) fn imports(code: &str) -> Vec<ImportDeclaration> {
    IMPORT_RE
        .captures_iter(code)
        .map(|caps| parse_import_clause(&caps[1], &caps[2]))
        .collect()
}

fn parse_import_clause(clause: &str, specifier: &str) -> ImportDeclaration {
    let mut default_binding = None;
    let mut bindings = Vec::new();
    let mut rest = clause.trim();

    if !rest.starts_with(['{', '*']) {
        let (head, tail) = rest.split_once(',').unwrap_or((rest, ""));
        let head = head.trim();
        if is_identifier(head) {
            default_binding = Some(head.to_owned());
            bindings.push(head.to_owned());
        }
        rest = tail.trim();
    }

    if let Some(namespace) = rest.strip_prefix('*') {
        if let Some(local) = namespace.trim().strip_prefix("as") {
            let local = local.trim();
            if is_identifier(local) {
                bindings.push(local.to_owned());
            }
        }
    } else if let Some(named) = rest.strip_prefix('{') {
        let named = named.trim_end().strip_suffix('}').unwrap_or(named);
        bindings.extend(
            named
                .split(',')
                .filter_map(aliased_name)
                .map(ToOwned::to_owned),
        );
    }

    ImportDeclaration {
        specifier: specifier.to_owned(),
        default_binding,
        bindings,
    }
}

/// Name a list item binds: `a` binds `a`, `a as b` binds `b`
///
/// Used for both import lists (local name) and export lists (exported name).
fn aliased_name(item: &str) -> Option<&str> {
    let tokens: Vec<&str> = item.split_whitespace().collect();
    let name = match tokens.as_slice() {
        [name] | ["type", name] => *name,
        [_, "as", name] | ["type", _, "as", name] => *name,
        _ => return None,
    };
    is_identifier(name).then_some(name)
}

/// Registration calls whose value argument is a plain binding
pub(crate) fn registration_calls(code: &str) -> Vec<RegistrationCall> {
    REGISTRATION_RE
        .captures_iter(code)
        .filter(|caps| !RESERVED_VALUES.contains(&&caps[4]))
        .map(|caps| RegistrationCall {
            callee: caps[1].to_owned(),
            namespace: caps[2].to_owned(),
            name: caps[3].to_owned(),
            identifier: caps[4].to_owned(),
        })
        .collect()
}

/// Raw JSON bodies of every `// exports: {...}` comment, in file order
pub(crate) fn annotations(code: &str) -> Vec<&str> {
    ANNOTATION_RE
        .captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Names the module already exports by name
pub(crate) fn existing_exports(code: &str) -> FxHashSet<String> {
    let mut names = FxHashSet::default();

    for caps in EXPORT_LIST_RE.captures_iter(code) {
        names.extend(
            caps[1]
                .split(',')
                .filter_map(aliased_name)
                .map(ToOwned::to_owned),
        );
    }
    for caps in EXPORT_DESTRUCTURE_RE.captures_iter(code) {
        names.extend(
            caps[1]
                .split(',')
                .filter_map(destructured_name)
                .map(ToOwned::to_owned),
        );
    }
    for caps in EXPORT_DECLARATION_RE.captures_iter(code) {
        names.insert(caps[1].to_owned());
    }

    names
}

/// `k` binds `k`, `k: n` binds `n`
fn destructured_name(item: &str) -> Option<&str> {
    let item = item.trim();
    let name = item.rsplit_once(':').map_or(item, |(_, name)| name).trim();
    let name = name.split('=').next().unwrap_or(name).trim();
    is_identifier(name).then_some(name)
}

pub(crate) fn is_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_import_clauses() {
        let code = "\
import gamma from './gamma.js';
import { qux as foo, bar } from \"bar\";
import * as ns from './ns.js';
import main, { helper as h } from './main.js';
import {
    a,
    b as c,
} from './multi.js';
import './side-effect.js';
";
        let bindings: Vec<(String, Vec<String>)> = imports(code)
            .into_iter()
            .map(|import| (import.specifier, import.bindings))
            .collect();
        assert_eq!(
            bindings,
            vec![
                ("./gamma.js".to_owned(), vec!["gamma".to_owned()]),
                ("bar".to_owned(), vec!["foo".to_owned(), "bar".to_owned()]),
                ("./ns.js".to_owned(), vec!["ns".to_owned()]),
                ("./main.js".to_owned(), vec!["main".to_owned(), "h".to_owned()]),
                ("./multi.js".to_owned(), vec!["a".to_owned(), "c".to_owned()]),
            ]
        );
    }

    #[test]
    fn test_read_only_helper_specifiers() {
        let helper = |specifier: &str| ImportDeclaration {
            specifier: specifier.to_owned(),
            default_binding: Some("x".to_owned()),
            bindings: vec!["x".to_owned()],
        };
        assert!(helper("@stdlib/utils-define-nonenumerable-read-only-property").imports_read_only_helper());
        assert!(helper("@stdlib/utils/define-read-only-property").imports_read_only_helper());
        assert!(helper("./utils/set-read-only.js").imports_read_only_helper());
        assert!(!helper("@stdlib/utils-define-property").imports_read_only_helper());
    }

    #[test]
    fn test_registration_calls_need_full_statement_shape() {
        let code = "\
setReadOnly( ns, 'gamma', gamma );
setReadOnly(ns, \"beta\", beta);
\tsetReadOnly( ns, 'nested', nested );
setReadOnly( ns, 'computed', foo.bar );
setReadOnly( ns, 'trailing', trailing ); // comment
setReadOnly( ns, 'FLAG', true );
setReadOnly( ns, 'EMPTY', null );
";
        let names: Vec<String> = registration_calls(code)
            .into_iter()
            .map(|call| call.name)
            .collect();
        assert_eq!(names, vec!["gamma", "beta"]);
    }

    #[test]
    fn test_default_export_identifier() {
        assert_eq!(default_export("var a;\nexport default a;\n"), Some("a"));
        assert_eq!(default_export("export default function main() {}\n"), None);
        assert_eq!(default_export("export default {};\n"), None);
    }

    #[test]
    fn test_existing_exports() {
        let code = "\
export { a, b as c };
export const { d: e, f } = obj;
export function g() {}
export async function h() {}
export class K {}
export let l = 1;
export default m;
";
        let mut names: Vec<String> = existing_exports(code).into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["K", "a", "c", "e", "f", "g", "h", "l"]);
    }

    #[test]
    fn test_annotations() {
        let code = "// exports: {\"a\":\"x.a\"}\n  //exports: {}\n/* exports: {\"b\":\"x.b\"} */\n";
        assert_eq!(annotations(code), vec!["{\"a\":\"x.a\"}", "{}"]);
    }
}
