use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::CatalogError;

/// Opaque item identity. Generated as a time-ordered UUID (v7) at creation.
///
/// Serialized as its hyphenated string in every format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        ItemId(Uuid::now_v7())
    }

    /// The nil id. Items created with it get a fresh id assigned by the store.
    pub fn nil() -> Self {
        ItemId(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<Uuid> for ItemId {
    fn from(value: Uuid) -> Self {
        ItemId(value)
    }
}

impl FromStr for ItemId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ItemId)
            .map_err(|e| CatalogError::validation(format!("invalid item id {s:?}: {e}")))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Uuid::parse_str(&raw).map(ItemId).map_err(de::Error::custom)
    }
}

/// Non-negative, finite price.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(f64);

impl Price {
    pub const ZERO: Price = Price(0.0);

    pub fn new(value: f64) -> Result<Self, CatalogError> {
        if !value.is_finite() {
            return Err(CatalogError::validation("price must be a finite number"));
        }
        if value < 0.0 {
            return Err(CatalogError::validation("price must not be negative"));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A catalog item. Only the [`Catalog`](crate::Catalog) coordinator mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Build a new item from validated input. The id is left nil so the store
    /// assigns one unless the caller sets it first.
    pub(crate) fn from_fields(fields: ItemFields, created_at: DateTime<Utc>) -> Self {
        Item {
            id: ItemId::nil(),
            name: fields.name,
            description: fields.description,
            price: fields.price,
            created_at,
        }
    }

    /// Replace the mutable fields wholesale. `id` and `created_at` never change.
    pub(crate) fn replace(&mut self, fields: ItemFields) {
        self.name = fields.name;
        self.description = fields.description;
        self.price = fields.price;
    }
}

/// Caller-supplied fields for create and update.
///
/// Absent fields deserialize to their empty value; updates are full
/// replacements, so an omitted description becomes `""` and an omitted
/// price becomes zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemInput {
    pub name: String,
    pub description: String,
    pub price: f64,
}

impl ItemInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>, price: f64) -> Self {
        ItemInput {
            name: name.into(),
            description: description.into(),
            price,
        }
    }

    /// Check the input before anything is written.
    pub(crate) fn validate(self) -> Result<ItemFields, CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::validation("name is required"));
        }
        let price = Price::new(self.price)?;
        Ok(ItemFields {
            name: self.name,
            description: self.description,
            price,
        })
    }
}

/// Input that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ItemFields {
    pub name: String,
    pub description: String,
    pub price: Price,
}
