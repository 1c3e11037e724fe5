use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    /// Counters the OS prints as unsigned 64-bit values. Negative literals are
    /// stored as their two's-complement bit pattern.
    Uint,
    Float,
    Bool,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl FieldKind {
    fn default_value(self) -> FieldValue {
        match self {
            FieldKind::Int => FieldValue::Int(0),
            FieldKind::Uint => FieldValue::Uint(0),
            FieldKind::Float => FieldValue::Float(0.0),
            FieldKind::Bool => FieldValue::Bool(false),
            FieldKind::Str => FieldValue::Str(String::new()),
        }
    }

    fn value_pattern(self) -> &'static str {
        match self {
            FieldKind::Int | FieldKind::Uint => r"(?P<v>-?\d+)",
            FieldKind::Float => r"(?P<v>-?\d+(?:\.\d+)?)",
            FieldKind::Bool => r"(?P<v>(?i:yes|no))\b",
            FieldKind::Str => r#"(?:"(?P<q>[^"]*)"|(?P<v>[^\s",;}()]+))"#,
        }
    }

    fn parse(self, raw: &str) -> Option<FieldValue> {
        match self {
            FieldKind::Int => raw.parse().ok().map(FieldValue::Int),
            FieldKind::Uint => raw
                .parse::<u64>()
                .ok()
                .or_else(|| raw.parse::<i64>().ok().map(|v| v as u64))
                .map(FieldValue::Uint),
            FieldKind::Float => raw.parse().ok().map(FieldValue::Float),
            FieldKind::Bool => Some(FieldValue::Bool(raw.eq_ignore_ascii_case("yes"))),
            FieldKind::Str => Some(FieldValue::Str(raw.to_string())),
        }
    }
}

#[derive(Debug)]
struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    pattern: Option<Regex>,
}

#[derive(Debug)]
pub struct FieldSet {
    rules: Vec<FieldRule>,
}

impl FieldSet {
    pub fn new(specs: &[(&'static str, FieldKind)]) -> Self {
        let rules = specs
            .iter()
            .map(|&(name, kind)| FieldRule {
                name,
                kind,
                // word boundaries keep `Amperage` from matching `InstantAmperage`
                pattern: compile(&format!(
                    r#""?\b{}\b"?[ \t]*=[ \t]*{}"#,
                    regex::escape(name),
                    kind.value_pattern()
                )),
            })
            .collect();
        Self { rules }
    }

    pub fn extract(&self, text: &str) -> Fields {
        let mut values = HashMap::with_capacity(self.rules.len());
        let mut matched = HashSet::new();

        for rule in &self.rules {
            let parsed = rule
                .pattern
                .as_ref()
                .and_then(|re| re.captures(text))
                .and_then(|caps| {
                    let raw = caps.name("q").or_else(|| caps.name("v"))?;
                    rule.kind.parse(raw.as_str())
                });

            match parsed {
                Some(value) => {
                    matched.insert(rule.name);
                    values.insert(rule.name, value);
                }
                None => {
                    values.insert(rule.name, rule.kind.default_value());
                }
            }
        }

        Fields { values, matched }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fields {
    values: HashMap<&'static str, FieldValue>,
    matched: HashSet<&'static str>,
}

impl Fields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn matched(&self, name: &str) -> bool {
        self.matched.contains(name)
    }

    pub fn int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(FieldValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn int_or(&self, name: &str, fallback: i64) -> i64 {
        if self.matched(name) {
            self.int(name)
        } else {
            fallback
        }
    }

    pub fn uint(&self, name: &str) -> u64 {
        match self.values.get(name) {
            Some(FieldValue::Uint(v)) => *v,
            _ => 0,
        }
    }

    pub fn float(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(FieldValue::Float(v)) => *v,
            Some(FieldValue::Int(v)) => *v as f64,
            Some(FieldValue::Uint(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(FieldValue::Bool(true)))
    }

    pub fn text(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(FieldValue::Str(v)) => v,
            _ => "",
        }
    }
}

pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "invalid extraction pattern");
            None
        }
    }
}
