/*!
Document model of a snapshot stream.

A snapshot is a [`Container`] holding named [`Section`]s in a fixed order
("templates", then "components"). Each section holds [`Entry`] records, and each
entry is an optional type tag followed by named [`Field`]s. The same model is
written by the binary and the text encodings, so framing is symmetric by
construction.
*/

use serde::{Deserialize, Serialize};

use crate::format::Encoding;

/// Section holding one entry per spawned template instance.
pub const TEMPLATES_SECTION: &str = "templates";
/// Section holding one entry per persistable component.
pub const COMPONENTS_SECTION: &str = "components";

/// Template entry field carrying the template name.
pub const TEMPLATE_NAME_FIELD: &str = "template_name";
/// Template entry field carrying the parent node reference.
pub const PARENT_FIELD: &str = "parent";
/// Component entry field carrying the weak reference to the component itself.
pub const OBJECT_FIELD: &str = "$object";

/// Top-level snapshot document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Container {
    /// Encoding the document was written with
    pub encoding: Encoding,
    pub sections: Vec<Section>,
}

impl Container {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            sections: Vec::new(),
        }
    }

    /// First section with the given name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Total number of entries across all sections.
    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|section| section.entries.len()).sum()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<EntryTag>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(tag: EntryTag) -> Self {
        Self {
            tag: Some(tag),
            fields: Vec::new(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    /// Value of the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        find_field(&self.fields, name)
    }
}

/// Display name and runtime type of the object an entry describes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EntryTag {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Encoded value of a single field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain data, encoded with the value's serde rules
    Data(serde_json::Value),
    /// Reference to another node or component
    Ref(Reference),
    /// Ordered list of references
    Refs(Vec<Reference>),
    /// Runtime-typed reference used to reconstruct polymorphic objects
    Weak(WeakReference),
    /// Nested structure written field by field
    Nested(Vec<Field>),
    /// Plain data holding NaN or infinite floats, which `Data` cannot carry,
    /// as named MessagePack
    Packed(Vec<u8>),
}

/// Address of a referenced object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    Null,
    /// Transient index, valid only within one snapshot
    Index(u32),
    /// Hierarchy path such as `Player/Health` or `@3/Weapon/`
    Path(String),
}

/// A reference carrying the runtime type needed to construct its target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WeakReference {
    #[serde(rename = "type")]
    pub type_name: String,
    pub address: Reference,
}

pub(crate) fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a FieldValue> {
    fields
        .iter()
        .find(|field| field.name == name)
        .map(|field| &field.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_field_lookup() {
        let mut entry = Entry::new();
        entry.push(TEMPLATE_NAME_FIELD, FieldValue::Data(json!("Goblin")));
        entry.push(PARENT_FIELD, FieldValue::Ref(Reference::Path("Player/".into())));

        assert_eq!(
            entry.field(TEMPLATE_NAME_FIELD),
            Some(&FieldValue::Data(json!("Goblin")))
        );
        assert!(entry.field("missing").is_none());
    }

    #[test]
    fn test_container_section_lookup() {
        let mut container = Container::new(Encoding::Text);
        container.sections.push(Section::new(TEMPLATES_SECTION));
        let mut components = Section::new(COMPONENTS_SECTION);
        components.entries.push(Entry::tagged(EntryTag {
            name: "Player".into(),
            type_name: "Health".into(),
        }));
        container.sections.push(components);

        assert_eq!(container.entry_count(), 1);
        assert!(container.section(COMPONENTS_SECTION).is_some());
        assert!(container.section("resources").is_none());
    }

    #[test]
    fn test_text_layout_is_readable() {
        let mut entry = Entry::tagged(EntryTag {
            name: "Player".into(),
            type_name: "Health".into(),
        });
        entry.push(
            OBJECT_FIELD,
            FieldValue::Weak(WeakReference {
                type_name: "Health".into(),
                address: Reference::Path("Player/Health".into()),
            }),
        );
        entry.push("target", FieldValue::Ref(Reference::Index(2)));
        entry.push("owner", FieldValue::Ref(Reference::Null));

        let text = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            text,
            json!({
                "tag": {"name": "Player", "type": "Health"},
                "fields": [
                    {"name": "$object", "value": {"weak": {"type": "Health", "address": {"path": "Player/Health"}}}},
                    {"name": "target", "value": {"ref": {"index": 2}}},
                    {"name": "owner", "value": {"ref": "null"}}
                ]
            })
        );
    }
}
