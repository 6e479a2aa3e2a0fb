//! Scalar member types and the name → type registry.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::diagnostic::ErrorList;

/// Primitive kind of a scalar field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarKind {
    /// Short identifier text, typically a key.
    Identifier,
    /// Short free text.
    Word,
    /// Long free text.
    Sentence,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Enumeration(Arc<EnumDefinition>),
}

/// How a scalar is filtered on a search screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStyle {
    /// `from`/`to` bounds.
    Range,
    /// One of the enumeration items.
    Select,
    /// Case-insensitive substring match.
    FreeText,
    /// Exact value.
    Exact,
}

impl ScalarKind {
    pub fn filter_style(&self) -> FilterStyle {
        match self {
            ScalarKind::Integer | ScalarKind::Decimal | ScalarKind::Date | ScalarKind::DateTime => {
                FilterStyle::Range
            }
            ScalarKind::Enumeration(_) => FilterStyle::Select,
            ScalarKind::Identifier | ScalarKind::Word | ScalarKind::Sentence => FilterStyle::FreeText,
            ScalarKind::Boolean => FilterStyle::Exact,
        }
    }

    /// Column type used by the persistence model.
    pub fn sql_type(&self) -> SqlType {
        match self {
            ScalarKind::Identifier | ScalarKind::Word | ScalarKind::Sentence => SqlType::Text,
            ScalarKind::Integer | ScalarKind::Boolean | ScalarKind::Enumeration(_) => SqlType::Integer,
            ScalarKind::Decimal => SqlType::Decimal,
            ScalarKind::Date | ScalarKind::DateTime => SqlType::DateTime,
        }
    }

    /// Short, stable name used in diagnostics and model dumps.
    pub fn name(&self) -> &str {
        match self {
            ScalarKind::Identifier => "identifier",
            ScalarKind::Word => "word",
            ScalarKind::Sentence => "sentence",
            ScalarKind::Integer => "integer",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Date => "date",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Enumeration(def) => &def.name,
        }
    }
}

impl Serialize for ScalarKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Column types of the persistence model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Text,
    Integer,
    Decimal,
    DateTime,
}

/// A named enumeration with integer-valued items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumDefinition {
    pub name: String,
    pub items: Vec<EnumItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumItem {
    pub name: String,
    pub value: i64,
}

impl EnumDefinition {
    /// Validates item names and values.
    pub fn try_create(name: &str, items: Vec<EnumItem>) -> Result<Self, ErrorList> {
        let mut errors = ErrorList::new();
        if name.trim().is_empty() {
            errors.push("Enumeration name is empty.");
        }
        if items.is_empty() {
            errors.push(format!("Enumeration '{name}' has no items."));
        }
        let mut names = HashSet::new();
        let mut values = HashSet::new();
        for item in &items {
            if item.name.trim().is_empty() {
                errors.push(format!("Enumeration '{name}' has an item without a name."));
            }
            if !names.insert(item.name.as_str()) {
                errors.push(format!("Enumeration '{name}' declares '{}' twice.", item.name));
            }
            if !values.insert(item.value) {
                errors.push(format!(
                    "Enumeration '{name}' uses value {} more than once.",
                    item.value
                ));
            }
        }
        errors.into_result(Self {
            name: name.to_string(),
            items,
        })
    }

    /// Builds items from `(name, explicit value)` pairs; missing values take
    /// the smallest non-negative integer not used by any other item.
    pub fn with_auto_values(name: &str, items: Vec<(String, Option<i64>)>) -> Result<Self, ErrorList> {
        let mut used: HashSet<i64> = items.iter().filter_map(|(_, v)| *v).collect();
        let mut next = 0;
        let mut resolved = Vec::with_capacity(items.len());
        for (item_name, value) in items {
            let value = match value {
                Some(v) => v,
                None => {
                    while used.contains(&next) {
                        next += 1;
                    }
                    used.insert(next);
                    next
                }
            };
            resolved.push(EnumItem {
                name: item_name,
                value,
            });
        }
        Self::try_create(name, resolved)
    }

    pub fn value_of(&self, item_name: &str) -> Option<i64> {
        self.items.iter().find(|i| i.name == item_name).map(|i| i.value)
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.value == value)
            .map(|i| i.name.as_str())
    }
}

/// Resolves declared type names to scalar kinds.
#[derive(Debug, Clone)]
pub struct MemberTypeResolver {
    types: BTreeMap<String, ScalarKind>,
}

impl Default for MemberTypeResolver {
    fn default() -> Self {
        let mut resolver = Self::empty();
        resolver.register("identifier", ScalarKind::Identifier);
        resolver.register("word", ScalarKind::Word);
        resolver.register("sentence", ScalarKind::Sentence);
        resolver.register("integer", ScalarKind::Integer);
        resolver.register("sequence", ScalarKind::Integer);
        resolver.register("numeric", ScalarKind::Decimal);
        resolver.register("decimal", ScalarKind::Decimal);
        resolver.register("boolean", ScalarKind::Boolean);
        resolver.register("date", ScalarKind::Date);
        resolver.register("datetime", ScalarKind::DateTime);
        resolver
    }
}

impl MemberTypeResolver {
    /// A registry with no names at all.
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) a type name.
    pub fn register(&mut self, name: impl Into<String>, kind: ScalarKind) -> &mut Self {
        self.types.insert(name.into(), kind);
        self
    }

    /// Registers an enumeration under its own name.
    pub fn register_enum(&mut self, definition: EnumDefinition) -> &mut Self {
        let name = definition.name.clone();
        self.register(name, ScalarKind::Enumeration(Arc::new(definition)))
    }

    pub fn try_resolve(&self, name: &str) -> Option<ScalarKind> {
        self.types.get(name).cloned()
    }
}
