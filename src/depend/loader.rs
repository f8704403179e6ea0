//! Parses the `depinfo_<i>_*` key/value stream produced by the shell helper
//! for each init script. A stream for two services looks like:
//!
//! ```text
//! depinfo_0_service='net.eth0'
//! depinfo_0_provide_0='net'
//! depinfo_1_service='sshd'
//! depinfo_1_need_0='net'
//! depinfo_1_use_0='logger'
//! depinfo_1_use_1='dns'
//! depinfo_1_keyword_0='notimeout'
//! ```
//!
//! Each service starts with a `depinfo_<i>_service='<name>'` line; every
//! subsequent `depinfo_<i>_<type>_<j>='<target>'` line belonging to the same
//! `<i>` adds one target to that relation type. `<j>` is an ordinal and is
//! not otherwise meaningful; targets are collected in the order they appear.
//! Unknown relation types are kept verbatim under [`ServiceDecl::other`] so a
//! round trip through [`super::cache::publish`] never silently drops data.
use std::fs;
use std::path::Path;

use crate::error::DependError;

/// The parsed dependency declaration for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDecl {
    /// Service name, derived from the init script's file name.
    pub name: String,
    /// Hard dependencies: must be `started` (or the start fails/defers).
    pub need: Vec<String>,
    /// Soft dependencies: started first if present, but absence is not fatal.
    pub use_: Vec<String>,
    /// Ordering-only constraint: start after these, no hard requirement.
    pub after: Vec<String>,
    /// Ordering-only constraint: start before these.
    pub before: Vec<String>,
    /// Provider aliases this service satisfies (e.g. `net` for `net.eth0`).
    pub provide: Vec<String>,
    /// Weak pull: start if present in the runlevel, but don't auto-add it.
    pub want: Vec<String>,
    /// Free-form keywords (`notimeout`, `broken`, ...).
    pub keywords: Vec<String>,
    /// Relation types the loader doesn't recognize, preserved verbatim by
    /// type name so a stanza round-trips through the cache unchanged even as
    /// new relation types are introduced upstream.
    pub other: Vec<(String, Vec<String>)>,
}

/// Strips a single layer of matching quotes (`'...'` or `"..."`) from a
/// value, tolerating an unquoted value as-is.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// One `depinfo_<i>_<rest>='<value>'` line, already split at the first `=`.
struct ParsedLine<'a> {
    index: &'a str,
    rest: &'a str,
    value: &'a str,
}

fn parse_line(line: &str) -> Option<ParsedLine<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let rest = line.strip_prefix("depinfo_")?;
    let (index, rest) = rest.split_once('_')?;
    let (rest, value) = rest.split_once('=')?;
    Some(ParsedLine {
        index,
        rest,
        value: unquote(value.trim()),
    })
}

impl ServiceDecl {
    /// Appends one target for relation `deptype` to the right field.
    fn push_relation(&mut self, deptype: &str, target: String) {
        match deptype {
            "need" => self.need.push(target),
            "use" => self.use_.push(target),
            "after" => self.after.push(target),
            "before" => self.before.push(target),
            "provide" => self.provide.push(target),
            "want" => self.want.push(target),
            "keyword" => self.keywords.push(target),
            other => {
                if let Some((_, targets)) = self.other.iter_mut().find(|(t, _)| t == other) {
                    targets.push(target);
                } else {
                    self.other.push((other.to_string(), vec![target]));
                }
            }
        }
    }
}

/// Parses an entire `depinfo_<i>_*` key/value stream into one declaration
/// per distinct `<i>` ordinal, in the order each `<i>` is first introduced
/// by its `_service=` line.
pub fn parse_stream(stream: &str) -> Result<Vec<ServiceDecl>, DependError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_index: std::collections::BTreeMap<String, ServiceDecl> = std::collections::BTreeMap::new();

    for line in stream.lines() {
        let Some(parsed) = parse_line(line) else {
            continue;
        };

        if parsed.rest == "service" {
            let decl = ServiceDecl {
                name: parsed.value.to_string(),
                ..Default::default()
            };
            if !by_index.contains_key(parsed.index) {
                order.push(parsed.index.to_string());
            }
            by_index.insert(parsed.index.to_string(), decl);
            continue;
        }

        let Some((deptype, _ordinal)) = parsed.rest.rsplit_once('_') else {
            continue;
        };
        if let Some(decl) = by_index.get_mut(parsed.index) {
            decl.push_relation(deptype, parsed.value.to_string());
        }
    }

    let decls: Vec<ServiceDecl> = order
        .into_iter()
        .filter_map(|idx| by_index.remove(&idx))
        .collect();

    for decl in &decls {
        if decl.need.contains(&decl.name) {
            return Err(DependError::SelfDependency {
                service: decl.name.clone(),
            });
        }
    }

    Ok(decls)
}

/// Serializes declarations back into the same key/value grammar
/// [`parse_stream`] consumes, in the same field order `push_relation`
/// dispatches on.
pub fn render_stream(decls: &[ServiceDecl]) -> String {
    let mut out = String::new();
    for (i, decl) in decls.iter().enumerate() {
        out.push_str(&format!("depinfo_{i}_service='{}'\n", decl.name));
        render_relation(&mut out, i, "need", &decl.need);
        render_relation(&mut out, i, "use", &decl.use_);
        render_relation(&mut out, i, "after", &decl.after);
        render_relation(&mut out, i, "before", &decl.before);
        render_relation(&mut out, i, "provide", &decl.provide);
        render_relation(&mut out, i, "want", &decl.want);
        render_relation(&mut out, i, "keyword", &decl.keywords);
        for (deptype, targets) in &decl.other {
            render_relation(&mut out, i, deptype, targets);
        }
    }
    out
}

fn render_relation(out: &mut String, index: usize, deptype: &str, targets: &[String]) {
    for (j, target) in targets.iter().enumerate() {
        out.push_str(&format!("depinfo_{index}_{deptype}_{j}='{target}'\n"));
    }
}

/// Loads and parses every init script under `scripts_dir` into declarations,
/// one per executable file, by reading the `depinfo_*` stream each script
/// emits on the special `depend` invocation of the shell helper. Scripts
/// that emit no stream still produce a declaration with empty relations:
/// every service is a node in the graph even if it declares nothing.
pub fn load_all(scripts_dir: &Path) -> Result<Vec<ServiceDecl>, DependError> {
    let mut decls = Vec::new();

    let entries = fs::read_dir(scripts_dir).map_err(DependError::ScanFailed)?;
    for entry in entries {
        let entry = entry.map_err(DependError::ScanFailed)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let contents = fs::read_to_string(&path).map_err(DependError::ScanFailed)?;
        let mut parsed = parse_stream(&contents)?;
        if parsed.is_empty() {
            decls.push(ServiceDecl {
                name: name.to_string(),
                ..Default::default()
            });
        } else {
            decls.append(&mut parsed);
        }
    }

    decls.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(decls)
}
