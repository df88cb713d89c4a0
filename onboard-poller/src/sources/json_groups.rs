//! A data source that caches whole JSON documents.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::cache::CacheStore;
use crate::engine::DataSource;
use crate::transport::{ConnectionError, Transport};

/// Error returned when parsing an invalid `key=path` group.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid data group {input:?}: {reason}")]
pub struct InvalidGroup {
    input: String,
    reason: &'static str,
}

/// One JSON document fetched from `path` and cached under `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataGroup {
    key: String,
    path: String,
    once: bool,
    keep_on_empty: bool,
}

impl DataGroup {
    /// A group refreshed on every cycle.
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            once: false,
            keep_on_empty: false,
        }
    }

    /// Fetch this group only until it has succeeded once per connection.
    ///
    /// For documents that do not change during a journey, like the portal's
    /// service description.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Keep the previous value when the portal answers with an empty
    /// document (`null`, `""`, `{}` or `[]`).
    ///
    /// Some portals only fill a document part of the time, e.g. connecting
    /// trains shortly before a stop.
    pub fn keep_on_empty(mut self) -> Self {
        self.keep_on_empty = true;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for DataGroup {
    type Err = InvalidGroup;

    /// Parse `key=path`. A trailing `?` after the key (`key?=path`) marks
    /// the group as [`keep_on_empty`](DataGroup::keep_on_empty) and a
    /// trailing `!` (`key!=path`) as [`once`](DataGroup::once).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidGroup {
            input: s.to_string(),
            reason,
        };

        let (key, path) = s
            .split_once('=')
            .ok_or_else(|| invalid("expected key=path"))?;
        let mut key = key.trim();
        let path = path.trim().trim_start_matches('/');

        let mut once = false;
        let mut keep_on_empty = false;
        loop {
            if let Some(k) = key.strip_suffix('!') {
                once = true;
                key = k;
            } else if let Some(k) = key.strip_suffix('?') {
                keep_on_empty = true;
                key = k;
            } else {
                break;
            }
        }

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if path.is_empty() {
            return Err(invalid("path is empty"));
        }

        Ok(Self {
            key: key.to_string(),
            path: path.to_string(),
            once,
            keep_on_empty,
        })
    }
}

impl fmt::Display for DataGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if self.once {
            f.write_str("!")?;
        }
        if self.keep_on_empty {
            f.write_str("?")?;
        }
        write!(f, "={}", self.path)
    }
}

/// Fetches each [`DataGroup`] in order and caches the JSON as-is.
///
/// A refresh stops at the first failing group; groups fetched before it
/// keep their new values and the rest keep their old ones.
#[derive(Debug, Clone, Default)]
pub struct JsonGroups {
    groups: Vec<GroupState>,
}

#[derive(Debug, Clone)]
struct GroupState {
    group: DataGroup,
    fetched: bool,
}

impl JsonGroups {
    pub fn new(groups: impl IntoIterator<Item = DataGroup>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|group| GroupState {
                    group,
                    fetched: false,
                })
                .collect(),
        }
    }

    /// Parse a comma-separated list of `key=path` groups.
    pub fn parse(list: &str) -> Result<Self, InvalidGroup> {
        let groups = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<DataGroup>, _>>()?;
        Ok(Self::new(groups))
    }

    pub fn groups(&self) -> impl Iterator<Item = &DataGroup> {
        self.groups.iter().map(|state| &state.group)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl DataSource for JsonGroups {
    async fn refresh(
        &mut self,
        transport: &Transport,
        cache: &CacheStore,
    ) -> Result<(), ConnectionError> {
        for state in &mut self.groups {
            let group = &state.group;
            if group.once && state.fetched {
                continue;
            }

            let value = transport.get_json(&group.path, &[]).await?;
            state.fetched = true;

            if group.keep_on_empty && is_empty_document(&value) && cache.contains(&group.key) {
                debug!(key = %group.key, "empty document, keeping previous value");
                continue;
            }
            cache.put(group.key.clone(), value);
        }
        Ok(())
    }

    fn reset(&mut self) {
        for state in &mut self.groups {
            state.fetched = false;
        }
    }
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_group() {
        let group: DataGroup = "status=api1/rs/status".parse().unwrap();
        assert_eq!(group, DataGroup::new("status", "api1/rs/status"));

        let group: DataGroup = " trip = /api1/rs/tripInfo/trip ".parse().unwrap();
        assert_eq!(group.key(), "trip");
        assert_eq!(group.path(), "api1/rs/tripInfo/trip");
    }

    #[test]
    fn parse_group_flags() {
        let group: DataGroup = "bap!=bap/api/bap-service-status".parse().unwrap();
        assert_eq!(group, DataGroup::new("bap", "bap/api/bap-service-status").once());

        let group: DataGroup = "connections?!=api1/rs/tripInfo/connection".parse().unwrap();
        assert_eq!(
            group,
            DataGroup::new("connections", "api1/rs/tripInfo/connection")
                .once()
                .keep_on_empty()
        );
        assert_eq!(
            group.to_string(),
            "connections!?=api1/rs/tripInfo/connection"
        );
    }

    #[test]
    fn parse_group_rejects_invalid() {
        assert!("status".parse::<DataGroup>().is_err());
        assert!("=api1/rs/status".parse::<DataGroup>().is_err());
        assert!("status=".parse::<DataGroup>().is_err());
        assert!("!=api1/rs/status".parse::<DataGroup>().is_err());

        let err = "status".parse::<DataGroup>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid data group \"status\": expected key=path"
        );
    }

    #[test]
    fn parse_group_list() {
        let groups = JsonGroups::parse("status=api1/rs/status, trip=api1/rs/tripInfo/trip,").unwrap();
        let keys: Vec<_> = groups.groups().map(DataGroup::key).collect();
        assert_eq!(keys, ["status", "trip"]);

        assert!(JsonGroups::parse("").unwrap().is_empty());
        assert!(JsonGroups::parse("status=api1/rs/status,trip").is_err());
    }

    #[test]
    fn display_roundtrips() {
        let group = DataGroup::new("status", "api1/rs/status");
        assert_eq!(group.to_string().parse::<DataGroup>().unwrap(), group);
    }

    #[test]
    fn empty_documents() {
        assert!(is_empty_document(&json!(null)));
        assert!(is_empty_document(&json!("")));
        assert!(is_empty_document(&json!([])));
        assert!(is_empty_document(&json!({})));

        assert!(!is_empty_document(&json!(0)));
        assert!(!is_empty_document(&json!(false)));
        assert!(!is_empty_document(&json!([1])));
        assert!(!is_empty_document(&json!({"speed": 80})));
    }

    #[test]
    fn reset_forgets_fetched_groups() {
        let mut groups = JsonGroups::new([DataGroup::new("bap", "bap").once()]);
        groups.groups[0].fetched = true;

        groups.reset();
        assert!(!groups.groups[0].fetched);
    }
}
