use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type GrooveId = String;

pub const LINK_SLOTS: usize = 3;
pub const MIN_PROGRESS: u8 = 1;
pub const MAX_PROGRESS: u8 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GrooveRecord {
    #[serde(deserialize_with = "lenient_id")]
    pub id: GrooveId,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub artist: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub note: String,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
    #[serde(default = "empty_slots", deserialize_with = "lenient_slots")]
    pub links: [Link; LINK_SLOTS],
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(default = "initial_progress", deserialize_with = "lenient_progress")]
    pub progress: u8,
    #[serde(skip)]
    origin: Origin,
}

/// Where a record came from, so saving can hand stored JSON back untouched.
#[derive(Debug, Clone, Default, PartialEq)]
enum Origin {
    #[default]
    Fresh,
    /// Parsed from a stored object; `parsed` is how the typed fields
    /// serialized right after loading.
    Stored {
        source: Map<String, Value>,
        parsed: Map<String, Value>,
    },
    /// A stored element that is not a readable groove, carried verbatim.
    Opaque(Value),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Link {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: String,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GrooveError {
    #[error("groove not found: {0}")]
    NotFound(String),
    #[error("progress must be between 1 and 5, got {0}")]
    InvalidProgress(u8),
    #[error("link slot {0} does not exist (slots are 1-3)")]
    InvalidSlot(usize),
}

impl GrooveRecord {
    pub fn new(
        id: GrooveId,
        title: String,
        artist: String,
        note: String,
        tags: Vec<String>,
        links: [Link; LINK_SLOTS],
    ) -> Self {
        GrooveRecord {
            id,
            title,
            artist,
            note,
            tags,
            links,
            date: Some(Utc::now()),
            progress: MIN_PROGRESS,
            origin: Origin::Fresh,
        }
    }

    /// Reads one stored element. Anything that is not a groove-shaped
    /// object comes back unreadable but is still written out on save.
    pub fn from_stored(value: Value) -> Self {
        let source = match &value {
            Value::Object(map) => map.clone(),
            _ => return Self::opaque(value),
        };
        let mut record = match serde_json::from_value::<GrooveRecord>(value.clone()) {
            Ok(record) => record,
            Err(_) => return Self::opaque(value),
        };
        match serde_json::to_value(&record) {
            Ok(Value::Object(parsed)) => {
                record.origin = Origin::Stored { source, parsed };
                record
            }
            _ => Self::opaque(value),
        }
    }

    /// The element to persist. Stored objects keep every original key;
    /// only fields whose typed value changed since loading are replaced.
    pub fn to_stored(&self) -> Result<Value, serde_json::Error> {
        match &self.origin {
            Origin::Fresh => serde_json::to_value(self),
            Origin::Opaque(value) => Ok(value.clone()),
            Origin::Stored { source, parsed } => {
                let mut merged = source.clone();
                if let Value::Object(current) = serde_json::to_value(self)? {
                    for (key, value) in current {
                        if parsed.get(&key) != Some(&value) {
                            merged.insert(key, value);
                        }
                    }
                }
                Ok(Value::Object(merged))
            }
        }
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self.origin, Origin::Opaque(_))
    }

    fn opaque(value: Value) -> Self {
        GrooveRecord {
            id: String::new(),
            title: String::new(),
            artist: String::new(),
            note: String::new(),
            tags: Vec::new(),
            links: empty_slots(),
            date: None,
            progress: MIN_PROGRESS,
            origin: Origin::Opaque(value),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress == MAX_PROGRESS
    }

    /// Links worth rendering, paired with their display label.
    pub fn visible_links(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, link)| !link.url.is_empty())
            .map(|(idx, link)| {
                let label = if link.name.is_empty() {
                    format!("Link {}", idx + 1)
                } else {
                    link.name.clone()
                };
                (label, link.url.as_str())
            })
    }
}

impl Link {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.url.is_empty()
    }
}

pub fn empty_slots() -> [Link; LINK_SLOTS] {
    Default::default()
}

pub fn check_progress(level: u8) -> Result<u8, GrooveError> {
    if (MIN_PROGRESS..=MAX_PROGRESS).contains(&level) {
        Ok(level)
    } else {
        Err(GrooveError::InvalidProgress(level))
    }
}

/// Mints an id that does not collide with any of `existing`.
pub fn generate_id<'a>(existing: impl Iterator<Item = &'a str> + Clone) -> GrooveId {
    loop {
        let candidate: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        if !existing.clone().any(|id| id == candidate) {
            return candidate;
        }
    }
}

fn initial_progress() -> u8 {
    MIN_PROGRESS
}

fn lenient_id<'de, D>(deserializer: D) -> Result<GrooveId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!("unusable id: {other}"))),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(tags) => tags
            .into_iter()
            .filter_map(|tag| match tag {
                Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

// Older exports carry fewer (or more) than three slots, or `null`.
fn lenient_slots<'de, D>(deserializer: D) -> Result<[Link; LINK_SLOTS], D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Array(raw) => raw,
        _ => Vec::new(),
    };
    let mut slots = empty_slots();
    for (slot, link) in slots.iter_mut().zip(raw) {
        *slot = serde_json::from_value(link).unwrap_or_default();
    }
    Ok(slots)
}

// RFC 3339 or a bare `YYYY-MM-DD`; anything else reads as no date.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::String(text) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(date) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(date.with_timezone(&Utc)));
    }
    Ok(NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight)))
}

fn lenient_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let level = match Value::deserialize(deserializer)? {
        Value::Number(level) => level.as_u64(),
        Value::String(level) => level.trim().parse().ok(),
        _ => None,
    };
    Ok(level
        .filter(|level| (u64::from(MIN_PROGRESS)..=u64::from(MAX_PROGRESS)).contains(level))
        .map_or(MIN_PROGRESS, |level| level as u8))
}
