//! Tag, category, and user entities.

use serde::{Deserialize, Serialize};

/// A tag; many-to-many with documents.
///
/// A tag without a persisted `id` is created during reconciliation; one
/// with an `id` is connected to the existing row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Tag {
    pub fn existing(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            alias: None,
        }
    }
}

/// A document category; one-to-many with documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// A user record. Carried through the entity dispatch for parity with
/// the metadata schema; authentication is out of scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}
