/*!
Snapshot codec that orchestrates save and restore of a hierarchy.

A snapshot is a [`Container`] with two sections. The "templates" section holds
one entry per live template instance: the template name and a reference to the
instance's parent. The "components" section holds one tagged entry per
persistable component: a weak reference to the component itself followed by
its policy-filtered fields.

Both directions share one [`Resolver`] per call. Every template instance and
every component is registered right after its address has been written (save)
or resolved (load), so the index numbering of a load always matches the save
that produced the data, and references between entries survive cycles.
*/

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::component::TypeRegistry;
use crate::compression::{CompressionAdapter, GzipCompressor};
use crate::config::SnapshotConfig;
use crate::container::{
    Container, Entry, EntryTag, Field, FieldValue, Reference, Section, WeakReference,
    COMPONENTS_SECTION, OBJECT_FIELD, PARENT_FIELD, TEMPLATES_SECTION, TEMPLATE_NAME_FIELD,
};
use crate::fields::{DefaultFieldPolicy, FieldPolicy, FieldReader, FieldWriter};
use crate::format::{Encoding, SnapshotFormat};
use crate::hierarchy::{ComponentId, Hierarchy, NodeId, ObjectRef};
use crate::metadata::{LoadReport, SnapshotReport};
use crate::resolver::Resolver;
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::templates::TemplateRegistry;
use crate::walker;
use crate::{Result, SnapshotError};

/// Counts gathered while building a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveCounts {
    pub templates_written: usize,
    pub templates_skipped: usize,
    pub components_written: usize,
}

/// Persistable types reachable from one template's prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTypes {
    pub template: String,
    /// Runtime type names in walk order, duplicates removed
    pub types: Vec<&'static str>,
    /// Those of `types` the type registry cannot construct
    pub unregistered: Vec<&'static str>,
}

/// Main entry point for saving and restoring hierarchies
///
/// Owns the template list, the type registry used to re-create missing
/// components, the field policy, and the storage and compression adapters used
/// by the named-file entry points.
///
/// # Example
/// ```rust
/// use snapgraph_core::{
///     persistable_component, FieldReader, FieldSet, FieldWriter, Hierarchy, MemoryStorage,
///     NoCompression, Persistable, SnapshotCodec, SnapshotFormat,
/// };
///
/// #[derive(Clone, Default)]
/// struct Health {
///     value: i32,
/// }
///
/// impl FieldSet for Health {
///     fn write_fields(&self, w: &mut FieldWriter<'_>) -> snapgraph_core::Result<()> {
///         w.value("value", &self.value)
///     }
///
///     fn read_fields(&mut self, r: &mut FieldReader<'_>) -> snapgraph_core::Result<()> {
///         r.value_into("value", &mut self.value)
///     }
/// }
///
/// impl Persistable for Health {}
/// persistable_component!(Health, "Health");
///
/// let mut world = Hierarchy::new();
/// let player = world.create_root("Player")?;
/// world.attach(player, Health { value: 7 })?;
///
/// let codec = SnapshotCodec::new(MemoryStorage::new(), NoCompression::new());
/// let bytes = codec.save_to_bytes(&mut world, SnapshotFormat::Text)?;
///
/// let mut restored = Hierarchy::new();
/// let player = restored.create_root("Player")?;
/// let health = restored.attach(player, Health::default())?;
/// codec.load_from_bytes(&mut restored, &bytes, SnapshotFormat::Text)?;
/// assert_eq!(restored.get::<Health>(health).map(|h| h.value), Some(7));
/// # Ok::<(), snapgraph_core::SnapshotError>(())
/// ```
pub struct SnapshotCodec<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    templates: TemplateRegistry,
    types: TypeRegistry,
    config: SnapshotConfig,
    policy: Box<dyn FieldPolicy>,
    storage: S,
    compressor: C,
}

impl<S, C> SnapshotCodec<S, C>
where
    S: StorageAdapter,
    C: CompressionAdapter,
{
    /// Create a codec with default configuration and the default field policy
    pub fn new(storage: S, compressor: C) -> Self {
        Self {
            templates: TemplateRegistry::new(),
            types: TypeRegistry::new(),
            config: SnapshotConfig::default(),
            policy: Box::new(DefaultFieldPolicy),
            storage,
            compressor,
        }
    }

    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the rule deciding which fields are persisted
    pub fn with_policy<P: FieldPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Drop template entries that are duplicates or not prototypes.
    pub fn validate_templates(&mut self, hierarchy: &Hierarchy) -> usize {
        self.templates.validate(hierarchy)
    }

    /// Walk every registered template's prototype and report the persistable
    /// types a load may have to construct.
    ///
    /// Types the type registry cannot construct are logged.
    pub fn visit_templates(&self, hierarchy: &Hierarchy) -> Vec<TemplateTypes> {
        walker::walk_templates(hierarchy, &self.templates)
            .into_iter()
            .map(|(template, walk)| {
                let mut types: Vec<&'static str> = Vec::new();
                for id in walk.components {
                    if let Some(type_name) = hierarchy.component_type(id) {
                        if !types.contains(&type_name) {
                            types.push(type_name);
                        }
                    }
                }
                let unregistered: Vec<&'static str> = types
                    .iter()
                    .copied()
                    .filter(|type_name| !self.types.contains(type_name))
                    .collect();
                for type_name in &unregistered {
                    warn!(template = %template, type_name, "persistable type is not registered");
                }
                TemplateTypes {
                    template,
                    types,
                    unregistered,
                }
            })
            .collect()
    }

    /// Build the snapshot document for `hierarchy`.
    ///
    /// Takes the hierarchy mutably only to run pre-save hooks.
    pub fn encode_container(
        &self,
        hierarchy: &mut Hierarchy,
        encoding: Encoding,
    ) -> Result<(Container, SaveCounts)> {
        let walk = walker::walk(hierarchy);
        let mut resolver = Resolver::new();
        let mut counts = SaveCounts::default();
        let mut container = Container::new(encoding);

        let mut templates = Section::new(TEMPLATES_SECTION);
        for node in walk.template_instances {
            let Some(template) = hierarchy.template_of(node) else {
                continue;
            };
            if !self.templates.contains(template) {
                warn!(template, node = ?node, "template is not registered, instance not saved");
                counts.templates_skipped += 1;
                continue;
            }

            let parent = hierarchy.parent(node).map(ObjectRef::Node);
            let mut entry = Entry::new();
            entry.push(
                TEMPLATE_NAME_FIELD,
                FieldValue::Data(Value::String(template.to_string())),
            );
            entry.push(
                PARENT_FIELD,
                FieldValue::Ref(resolver.encode_reference(hierarchy, parent)),
            );
            templates.entries.push(entry);
            resolver.register(Some(ObjectRef::Node(node)));
            counts.templates_written += 1;
        }
        container.sections.push(templates);

        let mut components = Section::new(COMPONENTS_SECTION);
        for id in walk.components {
            let Some(type_name) = hierarchy.component_type(id) else {
                continue;
            };
            if hierarchy.find_component_by_type(id.node(), type_name) != Some(id) {
                warn!(
                    type_name,
                    node = ?id.node(),
                    "node carries several components of this type, only the first is addressable"
                );
            }
            let object = ObjectRef::Component(id);
            let address = match resolver.resolve_to_path(hierarchy, object) {
                Some(path) => Reference::Path(path),
                None => {
                    warn!(type_name, node = ?id.node(), "component is not addressable");
                    Reference::Null
                }
            };
            resolver.register(Some(object));

            if let Some(body) = hierarchy
                .component_mut(id)
                .and_then(|component| component.as_persistable_mut())
            {
                body.before_save();
            }

            let fields = self.write_body(hierarchy, &mut resolver, id, type_name)?;
            let mut entry = Entry::tagged(EntryTag {
                name: hierarchy.name(id.node()).unwrap_or_default().to_string(),
                type_name: type_name.to_string(),
            });
            entry.push(
                OBJECT_FIELD,
                FieldValue::Weak(WeakReference {
                    type_name: type_name.to_string(),
                    address,
                }),
            );
            entry.fields.extend(fields);
            components.entries.push(entry);
            counts.components_written += 1;
        }
        container.sections.push(components);

        debug!(
            templates = counts.templates_written,
            components = counts.components_written,
            indices = resolver.len(),
            "snapshot container built"
        );
        Ok((container, counts))
    }

    fn write_body(
        &self,
        hierarchy: &Hierarchy,
        resolver: &mut Resolver,
        id: ComponentId,
        type_name: &'static str,
    ) -> Result<Vec<Field>> {
        let Some(body) = hierarchy
            .component(id)
            .and_then(|component| component.as_persistable())
        else {
            return Ok(Vec::new());
        };
        let mut writer = FieldWriter::new(
            type_name,
            hierarchy,
            resolver,
            self.policy.as_ref(),
            self.config.require_explicit_fields,
        );
        body.write_fields(&mut writer)?;
        Ok(writer.into_fields())
    }

    /// Restore `hierarchy` from a decoded snapshot document.
    ///
    /// Live template instances are destroyed first. Missing templates,
    /// unresolvable references and undecodable component bodies are logged and
    /// counted in the returned report; malformed entries abort the rest of their
    /// section only.
    pub fn apply_container(
        &self,
        hierarchy: &mut Hierarchy,
        container: &Container,
    ) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for node in walker::walk(hierarchy).template_instances {
            if hierarchy.is_alive(node) {
                hierarchy.destroy(node);
                report.instances_destroyed += 1;
            }
        }

        let mut resolver = Resolver::for_load(hierarchy);
        let mut sections = container.sections.iter().peekable();

        if let Some(section) = sections.next_if(|section| section.name == TEMPLATES_SECTION) {
            self.read_templates(hierarchy, &mut resolver, section, &mut report);
        }
        if let Some(section) = sections.next_if(|section| section.name == COMPONENTS_SECTION) {
            self.read_components(hierarchy, &mut resolver, section, &mut report);
        }
        for section in sections {
            warn!(section = %section.name, "unexpected section, ignoring");
        }

        report.unresolved_references = resolver.unresolved_references();
        Ok(report)
    }

    fn read_templates(
        &self,
        hierarchy: &mut Hierarchy,
        resolver: &mut Resolver,
        section: &Section,
        report: &mut LoadReport,
    ) {
        for (position, entry) in section.entries.iter().enumerate() {
            let Some(FieldValue::Data(Value::String(template))) = entry.field(TEMPLATE_NAME_FIELD)
            else {
                warn!(position, "template entry without a template name, abandoning section");
                report.sections_aborted += 1;
                return;
            };
            let Some(FieldValue::Ref(parent_ref)) = entry.field(PARENT_FIELD) else {
                warn!(position, template = %template, "template entry without a parent, abandoning section");
                report.sections_aborted += 1;
                return;
            };

            let parent = match (parent_ref, resolver.decode_reference(hierarchy, parent_ref)) {
                (Reference::Null, _) => Ok(None),
                (_, Some(object)) => Ok(Some(object.node())),
                (_, None) => Err(()),
            };

            let Some(prototype) = self.templates.lookup_by_name(template) else {
                warn!(template = %template, "template is not registered, skipping instance");
                report.templates_skipped += 1;
                resolver.register(None);
                continue;
            };
            let Ok(parent) = parent else {
                warn!(template = %template, "parent of template instance not found, skipping instance");
                report.templates_skipped += 1;
                resolver.register(None);
                continue;
            };

            match hierarchy.instantiate(prototype, template, parent) {
                Ok(node) => {
                    resolver.register(Some(ObjectRef::Node(node)));
                    report.templates_spawned += 1;
                }
                Err(e) => {
                    warn!(template = %template, error = %e, "failed to spawn template instance");
                    report.templates_skipped += 1;
                    resolver.register(None);
                }
            }
        }
    }

    fn read_components(
        &self,
        hierarchy: &mut Hierarchy,
        resolver: &mut Resolver,
        section: &Section,
        report: &mut LoadReport,
    ) {
        // Every addressed component exists before the first body is read, so
        // path references to components further down the section resolve.
        let mut targets = Vec::with_capacity(section.entries.len());
        for (position, entry) in section.entries.iter().enumerate() {
            let Some(FieldValue::Weak(weak)) = entry.field(OBJECT_FIELD) else {
                warn!(position, "component entry without an object reference, abandoning section");
                report.sections_aborted += 1;
                break;
            };
            let target = self.resolve_or_construct(hierarchy, resolver, weak);
            targets.push((entry, weak, target));
        }

        for (entry, weak, target) in targets {
            resolver.register(target.map(ObjectRef::Component));
            let Some(id) = target else {
                report.components_skipped += 1;
                continue;
            };

            match self.read_body(hierarchy, resolver, id, &entry.fields) {
                Ok(()) => report.components_loaded += 1,
                Err(e) => {
                    warn!(type_name = %weak.type_name, error = %e, "failed to restore component fields");
                    report.components_skipped += 1;
                }
            }
        }
    }

    /// Find the component a weak reference names, attaching a fresh one from the
    /// type registry when the node exists but the component does not.
    fn resolve_or_construct(
        &self,
        hierarchy: &mut Hierarchy,
        resolver: &mut Resolver,
        weak: &WeakReference,
    ) -> Option<ComponentId> {
        let node = match &weak.address {
            Reference::Null => {
                warn!(type_name = %weak.type_name, "component entry has no address");
                return None;
            }
            Reference::Path(path) => resolver.resolve_path_owner(hierarchy, path)?.0,
            reference @ Reference::Index(_) => match resolver.decode_reference(hierarchy, reference)? {
                ObjectRef::Component(id) => return Some(id),
                ObjectRef::Node(node) => node,
            },
        };

        if let Some(id) = hierarchy.find_component_by_type(node, &weak.type_name) {
            return Some(id);
        }
        self.construct(hierarchy, node, &weak.type_name)
    }

    fn construct(&self, hierarchy: &mut Hierarchy, node: NodeId, type_name: &str) -> Option<ComponentId> {
        let Some(component) = self.types.create(type_name) else {
            warn!(type_name, node = ?node, "component missing and its type is not registered");
            return None;
        };
        match hierarchy.add_component(node, component) {
            Ok(id) => {
                debug!(type_name, node = ?node, "constructed missing component");
                Some(id)
            }
            Err(e) => {
                warn!(type_name, error = %e, "failed to attach constructed component");
                None
            }
        }
    }

    fn read_body(
        &self,
        hierarchy: &mut Hierarchy,
        resolver: &mut Resolver,
        id: ComponentId,
        fields: &[Field],
    ) -> Result<()> {
        let type_name = hierarchy
            .component_type(id)
            .ok_or_else(|| SnapshotError::validation("component vanished during load"))?;
        let mut body = hierarchy
            .take_body(id)
            .ok_or_else(|| SnapshotError::validation("component body is unavailable"))?;

        let result = match body.as_persistable_mut() {
            Some(persistable) => {
                let mut reader = FieldReader::new(
                    type_name,
                    hierarchy,
                    resolver,
                    self.policy.as_ref(),
                    self.config.require_explicit_fields,
                    fields,
                );
                persistable.read_fields(&mut reader)
            }
            None => Err(SnapshotError::validation(format!(
                "component type '{type_name}' is not persistable"
            ))),
        };
        hierarchy.restore_body(id, body);
        result?;

        hierarchy.set_loaded(id);
        if let Some(persistable) = hierarchy
            .component_mut(id)
            .and_then(|component| component.as_persistable_mut())
        {
            persistable.after_load();
        }
        Ok(())
    }

    /// Encode `hierarchy` into bytes of the given format, with its report
    pub fn encode(
        &self,
        hierarchy: &mut Hierarchy,
        format: SnapshotFormat,
    ) -> Result<(Vec<u8>, SnapshotReport)> {
        let (container, counts) = self.encode_container(hierarchy, format.encoding())?;
        let bytes = format.encode(&container, &self.compressor)?;

        let mut report = SnapshotReport::new(format).with_content(&bytes);
        if format.is_compressed() {
            report = report.with_compression_algorithm(self.compressor.algorithm_name());
        }
        report.templates_written = counts.templates_written;
        report.templates_skipped = counts.templates_skipped;
        report.components_written = counts.components_written;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::SnapshotMetrics::global() {
            metrics.record_save(&report);
        }
        Ok((bytes, report))
    }

    /// Save `hierarchy` into a byte buffer
    pub fn save_to_bytes(&self, hierarchy: &mut Hierarchy, format: SnapshotFormat) -> Result<Vec<u8>> {
        let (bytes, report) = self.encode(hierarchy, format)?;
        info!(
            snapshot_id = %report.snapshot_id,
            format = %format,
            size = report.size_bytes,
            "snapshot encoded"
        );
        Ok(bytes)
    }

    /// Save `hierarchy` into a stream. The stream is flushed before returning.
    pub fn save_to_writer<W: Write>(
        &self,
        hierarchy: &mut Hierarchy,
        writer: &mut W,
        format: SnapshotFormat,
    ) -> Result<SnapshotReport> {
        let (bytes, report) = self.encode(hierarchy, format)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        info!(snapshot_id = %report.snapshot_id, format = %format, size = report.size_bytes, "snapshot written to stream");
        Ok(report)
    }

    /// Save `hierarchy` to a named file, see [`get_filename`](Self::get_filename)
    pub fn save(
        &self,
        hierarchy: &mut Hierarchy,
        name: &str,
        format: SnapshotFormat,
    ) -> Result<SnapshotReport> {
        let path = self.get_filename(name, format);
        let (bytes, report) = self.encode(hierarchy, format)?;
        self.storage.save(&bytes, &path.to_string_lossy())?;
        info!(
            snapshot_id = %report.snapshot_id,
            path = %path.display(),
            templates = report.templates_written,
            components = report.components_written,
            "snapshot saved"
        );
        Ok(report)
    }

    /// Save using the configured default format
    pub fn save_default(&self, hierarchy: &mut Hierarchy, name: &str) -> Result<SnapshotReport> {
        self.save(hierarchy, name, self.config.format)
    }

    /// Restore `hierarchy` from bytes of the given format
    pub fn load_from_bytes(
        &self,
        hierarchy: &mut Hierarchy,
        bytes: &[u8],
        format: SnapshotFormat,
    ) -> Result<LoadReport> {
        let container = format.decode(bytes, &self.compressor)?;
        let report = self.apply_container(hierarchy, &container)?;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = crate::observability::SnapshotMetrics::global() {
            metrics.record_load(&report, bytes.len());
        }
        if !report.is_clean() {
            warn!(
                templates_skipped = report.templates_skipped,
                components_skipped = report.components_skipped,
                unresolved = report.unresolved_references,
                sections_aborted = report.sections_aborted,
                "snapshot restored with omissions"
            );
        }
        Ok(report)
    }

    /// Restore `hierarchy` from a stream, reading it to the end
    pub fn load_from_reader<R: Read>(
        &self,
        hierarchy: &mut Hierarchy,
        reader: &mut R,
        format: SnapshotFormat,
    ) -> Result<LoadReport> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.load_from_bytes(hierarchy, &bytes, format)
    }

    /// Restore `hierarchy` from a named file, see [`get_filename`](Self::get_filename)
    pub fn load(
        &self,
        hierarchy: &mut Hierarchy,
        name: &str,
        format: SnapshotFormat,
    ) -> Result<LoadReport> {
        let path = self.get_filename(name, format);
        let bytes = self.storage.load(&path.to_string_lossy())?;
        let report = self.load_from_bytes(hierarchy, &bytes, format)?;
        info!(
            path = %path.display(),
            spawned = report.templates_spawned,
            components = report.components_loaded,
            "snapshot loaded"
        );
        Ok(report)
    }

    /// Load using the configured default format
    pub fn load_default(&self, hierarchy: &mut Hierarchy, name: &str) -> Result<LoadReport> {
        self.load(hierarchy, name, self.config.format)
    }

    /// Check if a named snapshot exists
    pub fn snapshot_exists(&self, name: &str, format: SnapshotFormat) -> bool {
        self.storage
            .exists(&self.get_filename(name, format).to_string_lossy())
    }

    /// Delete a named snapshot
    pub fn delete_snapshot(&self, name: &str, format: SnapshotFormat) -> Result<()> {
        self.storage
            .delete(&self.get_filename(name, format).to_string_lossy())
    }

    /// Path a named snapshot is stored at.
    ///
    /// A name without extension gets the format's extension. A name without a
    /// directory component is placed in the storage directory.
    pub fn get_filename(&self, name: &str, format: SnapshotFormat) -> PathBuf {
        let mut file = name.to_string();
        if Path::new(name).extension().is_none() {
            file.push('.');
            file.push_str(format.extension());
        }
        self.storage.locate(&file)
    }
}

/// Codec storing files locally with gzip for the compressed format.
///
/// The storage directory and gzip level come from `config`.
pub fn create_codec_from_config(
    config: SnapshotConfig,
) -> Result<SnapshotCodec<LocalFileStorage, GzipCompressor>> {
    config.validate()?;
    let storage = match &config.storage_dir {
        Some(dir) => LocalFileStorage::with_base_dir(dir),
        None => LocalFileStorage::new(),
    };
    let compressor = GzipCompressor::with_level(config.compression_level);
    Ok(SnapshotCodec::new(storage, compressor).with_config(config))
}

/// Codec with local storage in the working directory and default gzip level
///
/// # Example
/// ```rust
/// use snapgraph_core::create_default_codec;
///
/// let codec = create_default_codec();
/// assert!(codec.templates().is_empty());
/// ```
pub fn create_default_codec() -> SnapshotCodec<LocalFileStorage, GzipCompressor> {
    SnapshotCodec::new(LocalFileStorage::new(), GzipCompressor::new())
}
