use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Item = BTreeMap<String, AttributeValue>;

/// A typed attribute value using the store's tag convention, so
/// `AttributeValue::S("a".into())` serializes as `{"S":"a"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    /// Numbers travel as decimal text.
    N(String),
    M(BTreeMap<String, AttributeValue>),
    L(Vec<AttributeValue>),
    #[serde(rename = "BOOL")]
    Bool(bool),
}

impl AttributeValue {
    pub fn s(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    pub fn n(value: impl Display) -> Self {
        AttributeValue::N(value.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Bytes this value contributes to an item, counted the way the store
    /// sizes items: text length for strings and numbers, names plus values
    /// for nested maps.
    pub fn size(&self) -> usize {
        match self {
            AttributeValue::S(s) | AttributeValue::N(s) => s.len(),
            AttributeValue::M(map) => map.iter().map(|(k, v)| k.len() + v.size()).sum(),
            AttributeValue::L(list) => list.iter().map(AttributeValue::size).sum(),
            AttributeValue::Bool(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidItem {
    #[error("missing key attribute '{0}'")]
    MissingKey(String),
    #[error("key attribute '{0}' must be a non-empty string")]
    BadKey(String),
    #[error("attribute names must not be empty")]
    EmptyAttributeName,
    #[error("attribute '{name}' holds a non-numeric N value '{value}'")]
    InvalidNumber { name: String, value: String },
}

/// One row destined for the store. Always carries its key attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    item: Item,
}

impl Record {
    pub fn new(key_attribute: &str, id: impl Into<String>) -> Self {
        let mut item = Item::new();
        item.insert(key_attribute.to_string(), AttributeValue::S(id.into()));
        Record { item }
    }

    pub fn from_item(item: Item) -> Self {
        Record { item }
    }

    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.item.insert(name.into(), value);
        self
    }

    pub fn id(&self, key_attribute: &str) -> Option<&str> {
        self.item.get(key_attribute).and_then(AttributeValue::as_str)
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    pub fn into_item(self) -> Item {
        self.item
    }

    pub fn size(&self) -> usize {
        self.item.iter().map(|(k, v)| k.len() + v.size()).sum()
    }

    /// Checks the item shape before it is handed to a store.
    pub fn validate(&self, key_attribute: &str) -> Result<(), InvalidItem> {
        match self.item.get(key_attribute) {
            None => return Err(InvalidItem::MissingKey(key_attribute.to_string())),
            Some(AttributeValue::S(id)) if !id.trim().is_empty() => {}
            Some(_) => return Err(InvalidItem::BadKey(key_attribute.to_string())),
        }
        validate_map(&self.item)
    }
}

fn validate_map(map: &Item) -> Result<(), InvalidItem> {
    for (name, value) in map {
        if name.is_empty() {
            return Err(InvalidItem::EmptyAttributeName);
        }
        validate_value(name, value)?;
    }
    Ok(())
}

fn validate_value(name: &str, value: &AttributeValue) -> Result<(), InvalidItem> {
    match value {
        AttributeValue::N(text) => match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(()),
            _ => Err(InvalidItem::InvalidNumber {
                name: name.to_string(),
                value: text.clone(),
            }),
        },
        AttributeValue::M(nested) => validate_map(nested),
        AttributeValue::L(list) => list.iter().try_for_each(|v| validate_value(name, v)),
        AttributeValue::S(_) | AttributeValue::Bool(_) => Ok(()),
    }
}
