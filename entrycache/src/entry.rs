// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use entrycache_common::dn::{CacheKey, Dn};

/// A named attribute and its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<String>,
}

impl Attribute {
    /// Attribute type as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute values.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// A directory entry: a DN, its object classes and its user attributes.
///
/// Attribute types are matched case-insensitively but kept as given, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    object_classes: Vec<String>,
    attributes: Vec<Attribute>,
}

impl Entry {
    /// Create an entry without object classes or attributes.
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            object_classes: vec![],
            attributes: vec![],
        }
    }

    /// Add an object class.
    pub fn with_object_class(mut self, object_class: impl Into<String>) -> Self {
        self.add_object_class(object_class);
        self
    }

    /// Add values to an attribute, creating it if needed.
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.add_attribute(name, values);
        self
    }

    /// Add an object class, ignoring duplicates.
    pub fn add_object_class(&mut self, object_class: impl Into<String>) {
        let object_class = object_class.into();
        if !self.has_object_class(&object_class) {
            self.object_classes.push(object_class);
        }
    }

    /// Add values to an attribute, creating it if needed.
    pub fn add_attribute<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values = values.into_iter().map(Into::<String>::into);
        match self.attributes.iter_mut().find(|a| a.name.eq_ignore_ascii_case(&name)) {
            Some(attribute) => attribute.values.extend(values),
            None => self.attributes.push(Attribute {
                name,
                values: values.collect(),
            }),
        }
    }

    /// DN of the entry.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Replace the DN of the entry.
    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Cache key of the entry.
    pub fn key(&self) -> CacheKey {
        self.dn.key()
    }

    /// Object classes of the entry.
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// Whether the entry has the object class, ignoring case.
    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.object_classes.iter().any(|oc| oc.eq_ignore_ascii_case(object_class))
    }

    /// User attributes of the entry.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute, ignoring case.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let entry = Entry::new(Dn::parse("cn=Alice,dc=example").unwrap())
            .with_object_class("top")
            .with_object_class("person")
            .with_object_class("Person")
            .with_attribute("cn", ["Alice"])
            .with_attribute("mail", ["a@example.com"])
            .with_attribute("CN", ["Al"]);

        assert_eq!(entry.object_classes(), &["top", "person"]);
        assert!(entry.has_object_class("PERSON"));
        assert_eq!(entry.attribute("Cn").unwrap().values(), &["Alice", "Al"]);
        assert_eq!(entry.attributes().len(), 2);
        assert_eq!(entry.key().as_str(), "cn=alice,dc=example");
    }
}
