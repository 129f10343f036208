//! Bulk `require` to `import` rewriting
//!
//! An ordered table of whole-file substitutions applied to every eligible
//! file of a tree. Rules run strictly in table order and each one sees the
//! output of the previous one, so the more specific registration rule has to
//! come before the generic one, and both before the plain `var = require`
//! rules.
//!
//! Line rules only match top-level statements starting at column 0 and never
//! span a newline. Anything that does not have the exact literal shape is
//! left alone.

use std::{borrow::Cow, fs, path::PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info, trace};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::source_files::FileFilter;

/// How a rule produces its replacement text
#[derive(Debug, Clone, Copy)]
pub enum Replacement {
    /// `regex` expansion template (`${1}` style group references)
    Template(&'static str),
    /// Computed replacement; `None` leaves the match untouched
    Computed(fn(&Captures<'_>) -> Option<String>),
}

#[derive(Debug)]
pub struct RewriteRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub replacement: Replacement,
}

impl RewriteRule {
    fn new(name: &'static str, pattern: &str, replacement: Replacement) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("rewrite rule pattern must compile"),
            replacement,
        }
    }

    /// Apply the rule to every match, returning the new text and the number
    /// of matches actually replaced
    pub fn apply<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let mut hits = 0;
        let rewritten = self.pattern.replace_all(text, |caps: &Captures<'_>| {
            let replaced = match self.replacement {
                Replacement::Template(template) => {
                    let mut expanded = String::new();
                    caps.expand(template, &mut expanded);
                    Some(expanded)
                }
                Replacement::Computed(compute) => compute(caps),
            };
            match replaced {
                Some(replacement) => {
                    hits += 1;
                    replacement
                }
                None => caps[0].to_owned(),
            }
        });
        (rewritten, hits)
    }
}

const IDENT: &str = r"[A-Za-z_$][\w$]*";

static RULES: Lazy<Vec<RewriteRule>> = Lazy::new(|| {
    vec![
        RewriteRule::new(
            "module-exports",
            r"(?m)^module\.exports[ \t]*=[ \t]*([^=\s])",
            Replacement::Template("export default ${1}"),
        ),
        // the namespace re-registering its own helper already has it bound
        RewriteRule::new(
            "self-registration",
            r"(?m)^setReadOnly\([ \t]*([\w$]+)[ \t]*,[ \t]*'setReadOnly'[ \t]*,[ \t]*require\([ \t]*'[^'\n]+'[ \t]*\)[ \t]*\);",
            Replacement::Template("setReadOnly( ${1}, 'setReadOnly', setReadOnly );"),
        ),
        RewriteRule::new(
            "registration-require",
            r"(?m)^setReadOnly\([ \t]*([\w$]+)[ \t]*,[ \t]*'([\w$]+)'[ \t]*,[ \t]*require\([ \t]*'([^'\n]+)'[ \t]*\)[ \t]*\);",
            Replacement::Template("import ${2} from '${3}';\nsetReadOnly( ${1}, '${2}', ${2} );"),
        ),
        RewriteRule::new(
            "readable-stream",
            r"(?m)^var[ \t]+Readable[ \t]*=[ \t]*require\([ \t]*'readable-stream'[ \t]*\)\.Readable;",
            Replacement::Template(
                "import readableStream from 'readable-stream'; const Readable = readableStream.Readable;",
            ),
        ),
        RewriteRule::new(
            "require-default",
            &format!(r"(?m)^var[ \t]+({IDENT})[ \t]*=[ \t]*require\([ \t]*([^)\n]+?)[ \t]*\);"),
            Replacement::Template("import ${1} from ${2};"),
        ),
        RewriteRule::new(
            "require-property",
            &format!(
                r"(?m)^var[ \t]+({IDENT})[ \t]*=[ \t]*require\([ \t]*([^)\n]+?)[ \t]*\)\.({IDENT});"
            ),
            Replacement::Template("import { ${3} as ${1} } from ${2};"),
        ),
        RewriteRule::new(
            "native-fallback",
            &format!(
                concat!(
                    r"(?m)^var[ \t]+(?P<tmp>{ident})[ \t]*=[ \t]*tryRequire\([ \t]*(?:join|resolve)\([ \t]*__dirname[ \t]*,[ \t]*'\./native\.js'[ \t]*\)[ \t]*\);[ \t]*\r?\n",
                    r"[ \t]*if[ \t]*\([ \t]*isError\([ \t]*(?P<check>{ident})[ \t]*\)[ \t]*\)[ \t]*\{{\s*",
                    r"(?P<target>{ident})[ \t]*=[ \t]*(?P<fallback>{ident})[ \t]*;\s*",
                    r"\}}[ \t]*else[ \t]*\{{\s*",
                    r"(?P<target2>{ident})[ \t]*=[ \t]*(?P<native>{ident})[ \t]*;\s*\}}",
                ),
                ident = IDENT
            ),
            Replacement::Computed(collapse_native_fallback),
        ),
    ]
});

/// Collapse the try-native-else-portable block into a static re-binding
fn collapse_native_fallback(caps: &Captures<'_>) -> Option<String> {
    let tmp = &caps["tmp"];
    let target = &caps["target"];
    if &caps["check"] != tmp || &caps["native"] != tmp || &caps["target2"] != target {
        trace!("Native fallback block does not bind consistently: {}", &caps[0]);
        return None;
    }
    Some(format!("{target} = {};", &caps["fallback"]))
}

/// The ordered rule table
pub fn rules() -> &'static [RewriteRule] {
    &RULES
}

/// Result of rewriting one source text
#[derive(Debug)]
pub struct SourceRewrite<'a> {
    pub text: Cow<'a, str>,
    /// Rule name and replacement count, in table order, for rules that fired
    pub hits: Vec<(&'static str, usize)>,
}

impl SourceRewrite<'_> {
    pub fn is_changed(&self) -> bool {
        !self.hits.is_empty()
    }
}

/// Apply every rule, in order, to one source text
pub fn rewrite_source(source: &str) -> SourceRewrite<'_> {
    let mut current: Cow<'_, str> = Cow::Borrowed(source);
    let mut hits = Vec::new();

    for rule in rules() {
        let (rewritten, count) = rule.apply(&current);
        if count > 0 {
            let owned = rewritten.into_owned();
            current = Cow::Owned(owned);
            hits.push((rule.name, count));
        }
    }

    SourceRewrite {
        text: current,
        hits,
    }
}

/// Outcome of a tree-wide rewrite
#[derive(Debug, Default)]
pub struct RewriteSummary {
    pub files_scanned: usize,
    pub files_changed: Vec<PathBuf>,
    pub rule_hits: IndexMap<&'static str, usize>,
}

/// Rewrite every eligible file under the filter's root in place
///
/// All files are read and rewritten in memory before anything is written,
/// so an unreadable file aborts the pass with the tree untouched.
pub fn rewrite_tree(filter: &FileFilter) -> Result<RewriteSummary> {
    let files = filter.discover()?;
    let mut summary = RewriteSummary {
        files_scanned: files.len(),
        ..RewriteSummary::default()
    };

    let mut pending = Vec::new();
    for path in files {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;
        let rewrite = rewrite_source(&source);
        if !rewrite.is_changed() {
            continue;
        }
        debug!("Rewrote {}: {:?}", path.display(), rewrite.hits);
        for (name, count) in &rewrite.hits {
            *summary.rule_hits.entry(*name).or_default() += *count;
        }
        pending.push((path, rewrite.text.into_owned()));
    }

    for (path, text) in pending {
        fs::write(&path, text)
            .with_context(|| format!("Failed to write rewritten file: {}", path.display()))?;
        summary.files_changed.push(path);
    }

    info!(
        "Rewrote {} of {} files under {}",
        summary.files_changed.len(),
        summary.files_scanned,
        filter.root().display()
    );
    Ok(summary)
}
