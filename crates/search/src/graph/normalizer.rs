//! Graph records to prose
//!
//! Each usable record becomes exactly one sentence. Only the first labeled
//! element of a record is rendered; further columns are dropped so that
//! `MATCH (n)-[r]->(m)` style rows do not produce repeated sentences.

use super::{GraphElement, GraphRecord};
use serde_json::{Map, Value};
use tracing::debug;

/// Label that switches to the person sentence form
pub const PERSON_LABEL: &str = "人物";

/// Placeholder when no name-like property is present
pub const UNKNOWN_NAME: &str = "未知";

/// Name candidates, canonical first
const NAME_KEYS: &[&str] = &["nodeName", "人物名称", "名称", "name", "title", "标题"];

/// Properties never listed as extra attributes
const INTERNAL_KEYS: &[&str] = &["resourceId"];

const MAX_EXTRA_PROPERTIES: usize = 3;
const MAX_VALUE_CHARS: usize = 100;

/// Renders graph store records as natural-language sentences
#[derive(Debug, Clone, Default)]
pub struct GraphResultNormalizer;

impl GraphResultNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Concatenate one sentence per usable record
    pub fn normalize(&self, records: &[GraphRecord]) -> String {
        let mut sentences = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            match record.first_labeled() {
                Some(element) => sentences.push(self.sentence(element)),
                None => debug!(index, "Skipping graph record without a labeled element"),
            }
        }

        sentences.join("\n").trim().to_string()
    }

    fn sentence(&self, element: &GraphElement) -> String {
        let empty = Map::new();
        let props = element.properties().unwrap_or(&empty);
        let name = resolve_name(props);

        if element.has_label(PERSON_LABEL) {
            person_sentence(&name, props)
        } else {
            let label = element.primary_label().unwrap_or_default();
            entity_sentence(&name, label, props)
        }
    }
}

fn person_sentence(name: &str, props: &Map<String, Value>) -> String {
    let mut text = name.to_string();

    if let Some(career) = text_prop(props, "职业") {
        text.push('，');
        text.push_str(&career);
    }
    if let Some(achievements) = text_prop(props, "主要成就") {
        // First clause only
        let first = achievements.split('；').next().unwrap_or_default();
        text.push('，');
        text.push_str(first);
    }
    if let Some(death_date) = text_prop(props, "逝世日期") {
        text.push_str("，逝世于");
        text.push_str(&death_date);
    }
    if let Some(birthplace) = text_prop(props, "出生地") {
        if birthplace != UNKNOWN_NAME {
            text.push_str("，出生地为");
            text.push_str(&birthplace);
        }
    }

    text.push('。');
    text
}

fn entity_sentence(name: &str, label: &str, props: &Map<String, Value>) -> String {
    let extras: Vec<String> = props
        .iter()
        .filter(|(key, _)| !NAME_KEYS.contains(&key.as_str()) && !INTERNAL_KEYS.contains(&key.as_str()))
        .filter(|(_, value)| !is_blank(value))
        .take(MAX_EXTRA_PROPERTIES)
        .map(|(key, value)| {
            let value: String = value_text(value).chars().take(MAX_VALUE_CHARS).collect();
            format!("{}：{}", key, value)
        })
        .collect();

    let mut text = format!("{}（{}）", name, label);
    if !extras.is_empty() {
        text.push('，');
        text.push_str(&extras.join("，"));
    }
    text.push('。');
    text
}

fn resolve_name(props: &Map<String, Value>) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| text_prop(props, key))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// Property rendered as text, or `None` when absent or blank
fn text_prop(props: &Map<String, Value>, key: &str) -> Option<String> {
    props
        .get(key)
        .filter(|value| !is_blank(value))
        .map(value_text)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
