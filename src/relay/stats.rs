//! Compiler stats normalization.
//!
//! The only place that sniffs the shape of compiler stats. Everything
//! downstream works with [`BundleSnapshot`]s.

use serde_json::{Map, Value};

use super::payload::{BundleSnapshot, ModuleMap};

/// Projection requested from [`BuildStats::to_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsOptions {
    pub all: bool,
    pub cached: bool,
    pub children: bool,
    pub modules: bool,
    pub timings: bool,
    pub hash: bool,
    pub errors: bool,
    pub warnings: bool,
}

impl StatsOptions {
    /// Everything the relay forwards, nothing else.
    pub const RELAY: Self = Self {
        all: false,
        cached: true,
        children: true,
        modules: true,
        timings: true,
        hash: true,
        errors: true,
        warnings: true,
    };
}

/// Stats of one finished compilation.
pub trait BuildStats: Send + Sync {
    /// JSON projection of the stats restricted to `options`.
    fn to_json(&self, options: &StatsOptions) -> Value;

    /// Name of the owning compilation, if the stats expose one.
    fn compilation_name(&self) -> Option<&str> {
        None
    }
}

/// Result handed to the `done` hook.
pub enum BuildResult {
    /// One compiler
    Single(Box<dyn BuildStats>),
    /// A multi-compiler, one entry per child compiler
    Multi(Vec<Box<dyn BuildStats>>),
}

impl BuildResult {
    /// Wrap a raw stats document: an array is a multi-compiler result,
    /// anything else a single one.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Multi(
                items
                    .into_iter()
                    .map(|item| Box::new(JsonStats::new(item)) as Box<dyn BuildStats>)
                    .collect(),
            ),
            other => Self::Single(Box::new(JsonStats::new(other))),
        }
    }

    fn stats(&self) -> Vec<&dyn BuildStats> {
        match self {
            Self::Single(stats) => vec![stats.as_ref()],
            Self::Multi(all) => all.iter().map(AsRef::as_ref).collect(),
        }
    }
}

/// [`BuildStats`] backed by an already serialized stats document
/// (`webpack --json` output).
#[derive(Debug, Clone)]
pub struct JsonStats {
    value: Value,
    compilation_name: Option<String>,
}

impl JsonStats {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            compilation_name: None,
        }
    }

    pub fn with_compilation_name(mut self, name: impl Into<String>) -> Self {
        self.compilation_name = Some(name.into());
        self
    }
}

impl BuildStats for JsonStats {
    fn to_json(&self, options: &StatsOptions) -> Value {
        project(&self.value, options)
    }

    fn compilation_name(&self) -> Option<&str> {
        self.compilation_name.as_deref()
    }
}

/// Keep only the keys `options` asks for. Children are projected recursively.
fn project(value: &Value, options: &StatsOptions) -> Value {
    let Value::Object(source) = value else {
        return value.clone();
    };
    if options.all {
        return value.clone();
    }

    let wanted = [
        ("name", true),
        ("hash", options.hash),
        ("time", options.timings),
        ("modules", options.modules),
        ("errors", options.errors),
        ("warnings", options.warnings),
    ];

    let mut out = Map::new();
    for (key, keep) in wanted {
        if let Some(field) = source.get(key).filter(|_| keep) {
            out.insert(key.to_string(), field.clone());
        }
    }

    if options.children
        && let Some(Value::Array(children)) = source.get("children")
    {
        let children = children.iter().map(|child| project(child, options)).collect();
        out.insert("children".to_string(), Value::Array(children));
    }

    Value::Object(out)
}

/// Derive one snapshot per bundle from a build result.
///
/// Multi-compiler results contribute the bundles of every child compiler,
/// in order.
pub fn collect_bundles(result: &BuildResult) -> Vec<BundleSnapshot> {
    result
        .stats()
        .into_iter()
        .flat_map(|stats| {
            let json = stats.to_json(&StatsOptions::RELAY);
            let fallback = stats.compilation_name().unwrap_or_default().to_string();
            extract_bundles(json)
                .iter()
                .map(|bundle| snapshot(bundle, &fallback))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// One level of flattening:
/// stats with `modules` are one bundle, otherwise non-empty `children` are
/// the bundles, otherwise assume a single bundle.
fn extract_bundles(stats: Value) -> Vec<Value> {
    if stats.get("modules").is_some_and(|m| !m.is_null()) {
        return vec![stats];
    }
    match stats.get("children") {
        Some(Value::Array(children)) if !children.is_empty() => children.clone(),
        _ => vec![stats],
    }
}

fn snapshot(bundle: &Value, compilation_name: &str) -> BundleSnapshot {
    let name = bundle
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(compilation_name)
        .to_string();

    BundleSnapshot {
        name,
        time: bundle.get("time").and_then(Value::as_u64),
        hash: bundle.get("hash").and_then(Value::as_str).map(str::to_string),
        warnings: format_diagnostics(bundle.get("warnings")),
        errors: format_diagnostics(bundle.get("errors")),
        modules: module_map(bundle.get("modules")),
    }
}

/// Flatten diagnostics to strings.
///
/// Structured entries become `"<moduleName> <loc>\n<message>"`; missing
/// fields render as empty strings.
pub fn format_diagnostics(entries: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(text) => text.clone(),
            Value::Object(fields) => {
                let field = |key: &str| fields.get(key).map(display).unwrap_or_default();
                format!("{} {}\n{}", field("moduleName"), field("loc"), field("message"))
            }
            other => display(other),
        })
        .collect()
}

fn module_map(modules: Option<&Value>) -> ModuleMap {
    let Some(Value::Array(modules)) = modules else {
        return ModuleMap::new();
    };

    modules
        .iter()
        .filter_map(|module| {
            let id = module.get("id").filter(|id| !id.is_null())?;
            let name = module.get("name").map(display).unwrap_or_default();
            Some((display(id), name))
        })
        .collect()
}

/// Strings without quotes, everything else as JSON text.
fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
