/*!
Per-field value codec driven by the snapshot codec.

Persistable types describe their own bodies through [`FieldSet`]: they push
fields into a [`FieldWriter`] on save and pull them back out of a
[`FieldReader`] on load. Plain values are encoded with their serde rules.
References go through the operation's [`Resolver`], so a field never contains
an inline copy of another object.

JSON numbers cannot hold NaN or infinities, so a plain value containing such
floats is stored as named MessagePack instead ([`FieldValue::Packed`]) and
reads back bit for bit in every format.

Which fields are persisted is decided by the active [`FieldPolicy`]. When the
codec runs with `require_explicit_fields`, only fields marked with
[`FieldSpec::marked`] pass, and nested structures written through
[`FieldWriter::nested`] are filtered field by field instead of being encoded
wholesale with serde.
*/

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::{find_field, Field, FieldValue};
use crate::hierarchy::{Hierarchy, ObjectRef};
use crate::resolver::Resolver;
use crate::{Result, SnapshotError};

/// A type whose body is written and read field by field.
pub trait FieldSet {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()>;

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()>;
}

/// Static description of a field: its name, visibility and persistence mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub public: bool,
    pub marked: bool,
}

impl FieldSpec {
    pub const fn public(name: &'static str) -> Self {
        Self {
            name,
            public: true,
            marked: false,
        }
    }

    pub const fn private(name: &'static str) -> Self {
        Self {
            name,
            public: false,
            marked: false,
        }
    }

    /// Explicitly mark the field as persistable.
    pub const fn marked(self) -> Self {
        Self {
            marked: true,
            ..self
        }
    }
}

impl From<&'static str> for FieldSpec {
    fn from(name: &'static str) -> Self {
        FieldSpec::public(name)
    }
}

/// Predicate deciding which fields of a type are persisted.
///
/// Any `Fn(&str, &FieldSpec) -> bool` closure is a policy; the first argument is
/// the runtime type name of the owner.
pub trait FieldPolicy {
    fn persists(&self, owner: &str, field: &FieldSpec) -> bool;
}

impl<F> FieldPolicy for F
where
    F: Fn(&str, &FieldSpec) -> bool,
{
    fn persists(&self, owner: &str, field: &FieldSpec) -> bool {
        self(owner, field)
    }
}

/// Persists public fields and any explicitly marked field.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFieldPolicy;

impl FieldPolicy for DefaultFieldPolicy {
    fn persists(&self, _owner: &str, field: &FieldSpec) -> bool {
        field.public || field.marked
    }
}

/// Persists explicitly marked fields only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitFieldPolicy;

impl FieldPolicy for ExplicitFieldPolicy {
    fn persists(&self, _owner: &str, field: &FieldSpec) -> bool {
        field.marked
    }
}

/// Serialize and FieldSet at once: a nested structure that can be written either way.
pub trait NestedFields: FieldSet + Serialize + for<'de> Deserialize<'de> {}

impl<T> NestedFields for T where T: FieldSet + Serialize + for<'de> Deserialize<'de> {}

/// Collects the encoded fields of one object body.
pub struct FieldWriter<'a> {
    owner: &'a str,
    hierarchy: &'a Hierarchy,
    resolver: &'a mut Resolver,
    policy: &'a dyn FieldPolicy,
    explicit_only: bool,
    fields: Vec<Field>,
}

impl<'a> FieldWriter<'a> {
    pub fn new(
        owner: &'a str,
        hierarchy: &'a Hierarchy,
        resolver: &'a mut Resolver,
        policy: &'a dyn FieldPolicy,
        explicit_only: bool,
    ) -> Self {
        Self {
            owner,
            hierarchy,
            resolver,
            policy,
            explicit_only,
            fields: Vec::new(),
        }
    }

    /// Runtime type name of the object being written.
    pub fn owner(&self) -> &str {
        self.owner
    }

    /// Write a plain value with its serde rules.
    pub fn value<T, S>(&mut self, spec: S, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
        S: Into<FieldSpec>,
    {
        let spec = spec.into();
        if !self.admits(&spec) {
            return Ok(());
        }
        let data = serde_json::to_value(value)
            .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string()))?;
        if contains_null(&data) && float_scan::has_non_finite_float(value) {
            let packed = rmp_serde::to_vec_named(value)
                .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string()))?;
            self.push(spec, FieldValue::Packed(packed));
        } else {
            self.push(spec, FieldValue::Data(data));
        }
        Ok(())
    }

    /// Write a reference to another node or component.
    pub fn reference<S: Into<FieldSpec>>(&mut self, spec: S, target: Option<ObjectRef>) -> Result<()> {
        let spec = spec.into();
        if !self.admits(&spec) {
            return Ok(());
        }
        let reference = self.resolver.encode_reference(self.hierarchy, target);
        self.push(spec, FieldValue::Ref(reference));
        Ok(())
    }

    /// Write an ordered list of references.
    pub fn references<S: Into<FieldSpec>>(
        &mut self,
        spec: S,
        targets: &[Option<ObjectRef>],
    ) -> Result<()> {
        let spec = spec.into();
        if !self.admits(&spec) {
            return Ok(());
        }
        let references = targets
            .iter()
            .map(|target| self.resolver.encode_reference(self.hierarchy, *target))
            .collect();
        self.push(spec, FieldValue::Refs(references));
        Ok(())
    }

    /// Write a nested structure.
    ///
    /// With explicit marking required the structure is written field by field
    /// through its [`FieldSet`] impl; otherwise it is a plain serde value.
    pub fn nested<T, S>(&mut self, spec: S, value: &T) -> Result<()>
    where
        T: NestedFields,
        S: Into<FieldSpec>,
    {
        let spec = spec.into();
        if !self.explicit_only {
            return self.value(spec, value);
        }
        if !self.admits(&spec) {
            return Ok(());
        }

        let mut child = FieldWriter {
            owner: std::any::type_name::<T>(),
            hierarchy: self.hierarchy,
            resolver: &mut *self.resolver,
            policy: self.policy,
            explicit_only: true,
            fields: Vec::new(),
        };
        value.write_fields(&mut child)?;
        let fields = child.into_fields();
        self.push(spec, FieldValue::Nested(fields));
        Ok(())
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    fn admits(&self, spec: &FieldSpec) -> bool {
        (!self.explicit_only || spec.marked) && self.policy.persists(self.owner, spec)
    }

    fn push(&mut self, spec: FieldSpec, value: FieldValue) {
        self.fields.push(Field {
            name: spec.name.to_string(),
            value,
        });
    }
}

/// Reads fields of one object body back.
///
/// Every read returns `None` (or leaves the target untouched) when the field is
/// absent from the stream or excluded by the active policy.
pub struct FieldReader<'a> {
    owner: &'a str,
    hierarchy: &'a Hierarchy,
    resolver: &'a mut Resolver,
    policy: &'a dyn FieldPolicy,
    explicit_only: bool,
    fields: &'a [Field],
}

impl<'a> FieldReader<'a> {
    pub fn new(
        owner: &'a str,
        hierarchy: &'a Hierarchy,
        resolver: &'a mut Resolver,
        policy: &'a dyn FieldPolicy,
        explicit_only: bool,
        fields: &'a [Field],
    ) -> Self {
        Self {
            owner,
            hierarchy,
            resolver,
            policy,
            explicit_only,
            fields,
        }
    }

    pub fn owner(&self) -> &str {
        self.owner
    }

    /// Whether the stream carries a field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        find_field(self.fields, name).is_some()
    }

    pub fn value<T, S>(&mut self, spec: S) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        S: Into<FieldSpec>,
    {
        let spec = spec.into();
        match self.lookup(&spec) {
            None => Ok(None),
            Some(FieldValue::Data(data)) => T::deserialize(data)
                .map(Some)
                .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string())),
            Some(FieldValue::Packed(bytes)) => rmp_serde::from_slice(bytes)
                .map(Some)
                .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string())),
            Some(other) => Err(self.mismatch(&spec, "data", other)),
        }
    }

    /// Overwrite `target` when the field is present.
    pub fn value_into<T, S>(&mut self, spec: S, target: &mut T) -> Result<()>
    where
        T: DeserializeOwned,
        S: Into<FieldSpec>,
    {
        if let Some(value) = self.value(spec)? {
            *target = value;
        }
        Ok(())
    }

    /// Read a reference. The inner `None` is a null or unresolvable reference.
    pub fn reference<S: Into<FieldSpec>>(&mut self, spec: S) -> Result<Option<Option<ObjectRef>>> {
        let spec = spec.into();
        match self.lookup(&spec) {
            None => Ok(None),
            Some(FieldValue::Ref(reference)) => {
                Ok(Some(self.resolver.decode_reference(self.hierarchy, reference)))
            }
            Some(other) => Err(self.mismatch(&spec, "reference", other)),
        }
    }

    pub fn reference_into<S: Into<FieldSpec>>(
        &mut self,
        spec: S,
        target: &mut Option<ObjectRef>,
    ) -> Result<()> {
        if let Some(resolved) = self.reference(spec)? {
            *target = resolved;
        }
        Ok(())
    }

    pub fn references<S: Into<FieldSpec>>(
        &mut self,
        spec: S,
    ) -> Result<Option<Vec<Option<ObjectRef>>>> {
        let spec = spec.into();
        match self.lookup(&spec) {
            None => Ok(None),
            Some(FieldValue::Refs(references)) => Ok(Some(
                references
                    .iter()
                    .map(|reference| self.resolver.decode_reference(self.hierarchy, reference))
                    .collect(),
            )),
            Some(other) => Err(self.mismatch(&spec, "reference list", other)),
        }
    }

    pub fn references_into<S: Into<FieldSpec>>(
        &mut self,
        spec: S,
        target: &mut Vec<Option<ObjectRef>>,
    ) -> Result<()> {
        if let Some(resolved) = self.references(spec)? {
            *target = resolved;
        }
        Ok(())
    }

    /// Read a nested structure written by [`FieldWriter::nested`].
    ///
    /// Accepts both layouts, so snapshots written with and without explicit
    /// marking stay readable.
    pub fn nested_into<T, S>(&mut self, spec: S, target: &mut T) -> Result<()>
    where
        T: NestedFields,
        S: Into<FieldSpec>,
    {
        let spec = spec.into();
        match self.lookup(&spec) {
            None => Ok(()),
            Some(FieldValue::Nested(fields)) => {
                let mut child = FieldReader {
                    owner: std::any::type_name::<T>(),
                    hierarchy: self.hierarchy,
                    resolver: &mut *self.resolver,
                    policy: self.policy,
                    explicit_only: self.explicit_only,
                    fields,
                };
                target.read_fields(&mut child)
            }
            Some(FieldValue::Data(data)) => {
                *target = T::deserialize(data)
                    .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string()))?;
                Ok(())
            }
            Some(FieldValue::Packed(bytes)) => {
                *target = rmp_serde::from_slice(bytes)
                    .map_err(|e| SnapshotError::field(self.owner, spec.name, e.to_string()))?;
                Ok(())
            }
            Some(other) => Err(self.mismatch(&spec, "nested structure", other)),
        }
    }

    fn lookup(&self, spec: &FieldSpec) -> Option<&'a FieldValue> {
        let admitted =
            (!self.explicit_only || spec.marked) && self.policy.persists(self.owner, spec);
        if admitted {
            find_field(self.fields, spec.name)
        } else {
            None
        }
    }

    fn mismatch(&self, spec: &FieldSpec, expected: &str, found: &FieldValue) -> SnapshotError {
        let found = match found {
            FieldValue::Data(_) => "data",
            FieldValue::Ref(_) => "reference",
            FieldValue::Refs(_) => "reference list",
            FieldValue::Weak(_) => "weak reference",
            FieldValue::Nested(_) => "nested structure",
            FieldValue::Packed(_) => "packed data",
        };
        SnapshotError::field(
            self.owner,
            spec.name,
            format!("expected {expected}, found {found}"),
        )
    }
}

fn contains_null(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}

mod float_scan {
    //! A serializer that only looks for NaN and infinite floats.

    use std::fmt;

    use serde::ser::{self, Serialize};

    pub(super) fn has_non_finite_float<T: Serialize + ?Sized>(value: &T) -> bool {
        let mut scan = FloatScan { found: false };
        value.serialize(&mut scan).is_ok() && scan.found
    }

    struct FloatScan {
        found: bool,
    }

    #[derive(Debug)]
    struct ScanError(String);

    impl fmt::Display for ScanError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl std::error::Error for ScanError {}

    impl ser::Error for ScanError {
        fn custom<T: fmt::Display>(msg: T) -> Self {
            ScanError(msg.to_string())
        }
    }

    macro_rules! skip_scalars {
        ($($method:ident($ty:ty)),* $(,)?) => {
            $(
                fn $method(self, _: $ty) -> Result<(), ScanError> {
                    Ok(())
                }
            )*
        };
    }

    impl<'a> ser::Serializer for &'a mut FloatScan {
        type Ok = ();
        type Error = ScanError;
        type SerializeSeq = Self;
        type SerializeTuple = Self;
        type SerializeTupleStruct = Self;
        type SerializeTupleVariant = Self;
        type SerializeMap = Self;
        type SerializeStruct = Self;
        type SerializeStructVariant = Self;

        skip_scalars!(
            serialize_bool(bool),
            serialize_i8(i8),
            serialize_i16(i16),
            serialize_i32(i32),
            serialize_i64(i64),
            serialize_i128(i128),
            serialize_u8(u8),
            serialize_u16(u16),
            serialize_u32(u32),
            serialize_u64(u64),
            serialize_u128(u128),
            serialize_char(char),
            serialize_str(&str),
            serialize_bytes(&[u8]),
            serialize_unit_struct(&'static str),
        );

        fn serialize_f32(self, v: f32) -> Result<(), ScanError> {
            self.found |= !v.is_finite();
            Ok(())
        }

        fn serialize_f64(self, v: f64) -> Result<(), ScanError> {
            self.found |= !v.is_finite();
            Ok(())
        }

        fn serialize_none(self) -> Result<(), ScanError> {
            Ok(())
        }

        fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), ScanError> {
            value.serialize(self)
        }

        fn serialize_unit(self) -> Result<(), ScanError> {
            Ok(())
        }

        fn serialize_unit_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
        ) -> Result<(), ScanError> {
            Ok(())
        }

        fn serialize_newtype_struct<T: ?Sized + Serialize>(
            self,
            _name: &'static str,
            value: &T,
        ) -> Result<(), ScanError> {
            value.serialize(self)
        }

        fn serialize_newtype_variant<T: ?Sized + Serialize>(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            value: &T,
        ) -> Result<(), ScanError> {
            value.serialize(self)
        }

        fn serialize_seq(self, _len: Option<usize>) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_tuple(self, _len: usize) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_tuple_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            _len: usize,
        ) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_map(self, _len: Option<usize>) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, ScanError> {
            Ok(self)
        }

        fn serialize_struct_variant(
            self,
            _name: &'static str,
            _index: u32,
            _variant: &'static str,
            _len: usize,
        ) -> Result<Self, ScanError> {
            Ok(self)
        }
    }

    impl ser::SerializeSeq for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeTuple for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeTupleStruct for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeTupleVariant for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeMap for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ScanError> {
            key.serialize(&mut **self)
        }

        fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeStruct for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _key: &'static str,
            value: &T,
        ) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    impl ser::SerializeStructVariant for &mut FloatScan {
        type Ok = ();
        type Error = ScanError;

        fn serialize_field<T: ?Sized + Serialize>(
            &mut self,
            _key: &'static str,
            value: &T,
        ) -> Result<(), ScanError> {
            value.serialize(&mut **self)
        }

        fn end(self) -> Result<(), ScanError> {
            Ok(())
        }
    }
}
