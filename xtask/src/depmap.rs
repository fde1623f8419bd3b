//! Dependency map: the deduplicated set of local files transitively
//! imported by a set of entry files.
//!
//! Each file is scanned tolerantly — comments are stripped, then import
//! specifiers are harvested from static imports, re-exports, string-literal
//! dynamic `import()`, and `require()` / `require.resolve()` calls. Only
//! filesystem-local specifiers resolve; bare package names and anything
//! under `node_modules` are external. Every file is visited at most once,
//! so import cycles terminate naturally. Unreadable files and unresolvable
//! specifiers are skipped, never fatal; the only hard failure is a
//! non-absolute entry path.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Extensions the resolver will try, in order.
pub const RESOLVABLE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs", "json",
];

const VENDOR_DIR: &str = "node_modules";

#[derive(Debug, Error)]
pub enum DepMapError {
    #[error("entry path `{}` is not absolute", .0.display())]
    RelativeEntry(PathBuf),
}

#[derive(Clone, Debug, Default)]
pub struct DependencyMapQuery {
    /// Absolute paths to start from; never part of the result.
    pub entries: Vec<PathBuf>,
    /// Absolute paths that are neither reported nor traversed.
    pub exclude: Vec<PathBuf>,
    /// When set, imports and re-exports that only carry types are ignored.
    pub skip_type_only_dependencies: bool,
}

/// Walks the import graph breadth-first from the entries.
pub fn dependency_map(query: &DependencyMapQuery) -> Result<BTreeSet<PathBuf>, DepMapError> {
    for entry in &query.entries {
        if !entry.is_absolute() {
            return Err(DepMapError::RelativeEntry(entry.clone()));
        }
    }
    let exclude: HashSet<PathBuf> = query.exclude.iter().map(|path| normalize(path)).collect();
    let entries: HashSet<PathBuf> = query.entries.iter().map(|path| normalize(path)).collect();

    let mut visited = entries.clone();
    let mut pending: VecDeque<PathBuf> = entries.iter().cloned().collect();
    let mut result = BTreeSet::new();

    while let Some(path) = pending.pop_front() {
        // Missing or unreadable files are silently skipped.
        let Ok(source) = std::fs::read_to_string(&path) else {
            continue;
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("/")).to_owned();
        for specifier in extract_specifiers(&source, query.skip_type_only_dependencies) {
            let Some(target) = resolve(&dir, &specifier) else {
                continue;
            };
            if exclude.contains(&target) {
                continue;
            }
            if visited.insert(target.clone()) {
                result.insert(target.clone());
                pending.push_back(target);
            }
        }
    }
    Ok(result)
}

/// Lexical normalization: resolves `.` and `..` without touching the
/// filesystem (targets may not exist).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `pop` refuses to remove the root, which is what we want.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve(dir: &Path, specifier: &str) -> Option<PathBuf> {
    let base = if specifier.starts_with("./") || specifier.starts_with("../") {
        dir.join(specifier)
    } else if specifier.starts_with('/') {
        PathBuf::from(specifier)
    } else {
        // A bare package name; external by definition.
        return None;
    };
    let base = normalize(&base);
    if base.components().any(|c| c.as_os_str() == VENDOR_DIR) {
        return None;
    }

    let has_resolvable_extension = base
        .extension()
        .is_some_and(|ext| RESOLVABLE_EXTENSIONS.iter().any(|known| ext == *known));
    if has_resolvable_extension && base.is_file() {
        return Some(base);
    }

    for ext in RESOLVABLE_EXTENSIONS {
        let mut with_ext = base.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        let candidate = PathBuf::from(with_ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

static FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\b(import|export)\b([^;]*?)\bfrom\s*["']([^"']+)["']"#).expect("static regex")
});
static SIDE_EFFECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*["']([^"']+)["']"#).expect("static regex"));
static DYNAMIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#).expect("static regex"));
static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*(?:\.\s*resolve\s*)?\(\s*["']([^"']+)["']\s*\)"#)
        .expect("static regex")
});

fn extract_specifiers(source: &str, skip_type_only: bool) -> Vec<String> {
    let code = strip_comments(source);
    let mut specifiers = Vec::new();

    for captures in FROM_RE.captures_iter(&code) {
        let clause = &captures[2];
        if skip_type_only && clause_is_type_only(clause) {
            continue;
        }
        specifiers.push(captures[3].to_owned());
    }
    for captures in SIDE_EFFECT_RE.captures_iter(&code) {
        specifiers.push(captures[1].to_owned());
    }
    for captures in DYNAMIC_RE.captures_iter(&code) {
        specifiers.push(captures[1].to_owned());
    }
    for captures in REQUIRE_RE.captures_iter(&code) {
        specifiers.push(captures[1].to_owned());
    }
    specifiers
}

/// `import type … from`, `export type … from`, and named imports whose
/// every specifier is marked `type`.
fn clause_is_type_only(clause: &str) -> bool {
    let clause = clause.trim();
    if clause.starts_with("type ") || clause.starts_with("type{") || clause.starts_with("type*") {
        return true;
    }
    if let (Some(open), Some(close)) = (clause.find('{'), clause.rfind('}')) {
        if open < close {
            // A default import before the braces makes this a value import.
            let before = clause[..open].trim().trim_end_matches(',').trim();
            if !before.is_empty() {
                return false;
            }
            let names: Vec<&str> = clause[open + 1..close]
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
            return !names.is_empty() && names.iter().all(|name| name.starts_with("type "));
        }
    }
    false
}

/// Removes `//` and `/* */` comments while preserving string contents.
/// Tolerant by design: template-literal interpolation and regex literals are
/// not fully modelled, which matches the "skip what we cannot parse" policy.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '/' => match chars.peek() {
                Some('/') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        prev = next;
                    }
                    out.push(' ');
                }
                _ => out.push(c),
            },
            '\'' | '"' | '`' => {
                out.push(c);
                let quote = c;
                let mut escaped = false;
                for next in chars.by_ref() {
                    out.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == quote {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}
