use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the two crawled catalogs an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogTag {
    Projects,
    Users,
}

impl CatalogTag {
    pub const ALL: [CatalogTag; 2] = [CatalogTag::Projects, CatalogTag::Users];

    /// Path segment and JSON key used by the catalog endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogTag::Projects => "projects",
            CatalogTag::Users => "users",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            CatalogTag::Projects => CatalogTag::Users,
            CatalogTag::Users => CatalogTag::Projects,
        }
    }
}

impl fmt::Display for CatalogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique key of an item within its catalog.
///
/// Integer ids are kept in their decimal form so that `7` and `"7"` name the
/// same item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an id from a JSON value; only strings and integers qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("catalog item is not a JSON object")]
    NotAnObject,
    #[error("catalog item has no usable `id` field")]
    MissingId,
}

/// A raw catalog record together with its extracted key.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub id: ItemId,
    pub record: Value,
}

impl CatalogItem {
    pub fn from_json(record: Value) -> Result<Self, ItemError> {
        let object = record.as_object().ok_or(ItemError::NotAnObject)?;
        let id = object
            .get("id")
            .and_then(ItemId::from_json)
            .ok_or(ItemError::MissingId)?;
        Ok(Self { id, record })
    }

    /// Builds an item whose record only carries the id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = ItemId::new(id);
        let record = serde_json::json!({ "id": id.as_str() });
        Self { id, record }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedItem {
    pub tag: CatalogTag,
    pub item: CatalogItem,
}

impl TaggedItem {
    pub fn new(tag: CatalogTag, item: CatalogItem) -> Self {
        Self { tag, item }
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }
}

/// One discovered (project, user) combination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairEvent {
    pub project_id: ItemId,
    pub user_id: ItemId,
}

impl PairEvent {
    pub fn new(project_id: impl Into<ItemId>, user_id: impl Into<ItemId>) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Orients a newly seen id and an id from the opposite catalog.
    pub(crate) fn between(tag: CatalogTag, new_id: &ItemId, opposite_id: &ItemId) -> Self {
        match tag {
            CatalogTag::Projects => Self {
                project_id: new_id.clone(),
                user_id: opposite_id.clone(),
            },
            CatalogTag::Users => Self {
                project_id: opposite_id.clone(),
                user_id: new_id.clone(),
            },
        }
    }
}

impl fmt::Display for PairEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.project_id, self.user_id)
    }
}
