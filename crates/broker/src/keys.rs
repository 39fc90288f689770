//! Persisted key layout
//!
//! | key | value |
//! |---|---|
//! | `topic#<topic>#key#<ts>-<tone>` | entry body |
//! | `~~internal~~#topic#<topic>#idKey#<tone>` | full primary key |
//! | `~~system~~#activeTopics#<topic>` | creation timestamp |
//! | `~~system~~#currentTone#<topic>` | current tone |
//! | `~~system~~#proc#<topic>#<name>#<field>` | one proc field |
//! | `~~system~~#systemProc#<topic>#<name>#<field>` | one system-proc field |
//!
//! Topic and proc names may not contain the `#` separator, which keeps every
//! key splittable without escaping.

use crate::id::LogId;
use crate::tone::Tone;

pub const SEPARATOR: char = '#';
pub const SYSTEM_ROOT: &str = "~~system~~";
pub const INTERNAL_ROOT: &str = "~~internal~~";

/// System key families scanned during restoration
pub const ACTIVE_TOPICS: &str = "activeTopics";
pub const CURRENT_TONE: &str = "currentTone";
pub const PROC: &str = "proc";
pub const SYSTEM_PROC: &str = "systemProc";

/// Suffix that sorts after every `-<tone>` continuation of a timestamp
pub const WIDEN_SUFFIX: &str = "~";

/// Names used as key segments must be non-empty and separator free
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(SEPARATOR)
}

pub fn entry_prefix(topic: &str) -> String {
    format!("topic#{topic}#key#")
}

pub fn entry_key(topic: &str, id: &LogId) -> String {
    format!("{}{}", entry_prefix(topic), id)
}

/// Extract the id from a primary key of `topic`
pub fn parse_entry_key(topic: &str, key: &str) -> Option<LogId> {
    key.strip_prefix(&entry_prefix(topic))?.parse().ok()
}

pub fn id_index_prefix(topic: &str) -> String {
    format!("{INTERNAL_ROOT}#topic#{topic}#idKey#")
}

pub fn id_index_key(topic: &str, tone: Tone) -> String {
    format!("{}{}", id_index_prefix(topic), tone)
}

pub fn system_prefix(family: &str) -> String {
    format!("{SYSTEM_ROOT}#{family}#")
}

pub fn active_topic_key(topic: &str) -> String {
    format!("{}{}", system_prefix(ACTIVE_TOPICS), topic)
}

pub fn current_tone_key(topic: &str) -> String {
    format!("{}{}", system_prefix(CURRENT_TONE), topic)
}

pub fn proc_prefix(topic: &str, name: &str) -> String {
    format!("{}{topic}#{name}#", system_prefix(PROC))
}

pub fn proc_field_key(topic: &str, name: &str, field: &str) -> String {
    format!("{}{field}", proc_prefix(topic, name))
}

pub fn system_proc_prefix(topic: &str, name: &str) -> String {
    format!("{}{topic}#{name}#", system_prefix(SYSTEM_PROC))
}

pub fn system_proc_field_key(topic: &str, name: &str, field: &str) -> String {
    format!("{}{field}", system_proc_prefix(topic, name))
}

/// Topic named by an `activeTopics` or `currentTone` key
pub fn parse_topic_key<'a>(family: &str, key: &'a str) -> Option<&'a str> {
    let topic = key.strip_prefix(&system_prefix(family))?;
    is_valid_name(topic).then_some(topic)
}

/// `(topic, name, field)` of a `proc` or `systemProc` field key
pub fn parse_record_key<'a>(family: &str, key: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
    let rest = key.strip_prefix(&system_prefix(family))?;
    let mut parts = rest.splitn(3, SEPARATOR);
    let topic = parts.next()?;
    let name = parts.next()?;
    let field = parts.next()?;
    if topic.is_empty() || name.is_empty() || field.is_empty() || field.contains(SEPARATOR) {
        return None;
    }
    Some((topic, name, field))
}
