/*!
# Snapgraph Core

Snapshot and restore for hierarchical runtime object graphs.

A [`Hierarchy`] is a tree of named nodes carrying components. The
[`SnapshotCodec`] walks it, writes every instance of a registered template and
every [`Persistable`] component into a two-section snapshot, and restores a
hierarchy from such a snapshot later, including references between components
and nodes and re-spawned template instances.

## Architecture

- [`walker`]: deterministic pre-order traversal collecting template instances
  and persistable components
- [`resolver`]: per-operation mapping between live objects and their transient
  indices or hierarchy paths
- [`templates`]: named prototype sub-graphs that can be re-spawned on load
- [`snapshot`]: the section protocol tying everything together
- [`format`]: binary, text and compressed binary wire formats
- [`storage`] and [`compression`]: adapters for named files and gzip

## Usage

```rust
use snapgraph_core::{
    persistable_component, FieldReader, FieldSet, FieldWriter, Hierarchy, MemoryStorage,
    NoCompression, ObjectRef, Persistable, SnapshotCodec, SnapshotFormat,
};

#[derive(Clone, Default)]
struct Target {
    hp: i32,
    aim: Option<ObjectRef>,
}

impl FieldSet for Target {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> snapgraph_core::Result<()> {
        w.value("hp", &self.hp)?;
        w.reference("aim", self.aim)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> snapgraph_core::Result<()> {
        r.value_into("hp", &mut self.hp)?;
        r.reference_into("aim", &mut self.aim)
    }
}

impl Persistable for Target {}
persistable_component!(Target, "Target");

let mut world = Hierarchy::new();
let goblin = world.create_prototype("Goblin")?;
world.attach(goblin, Target::default())?;
let player = world.create_root("Player")?;
world.attach(player, Target { hp: 7, aim: None })?;

let mut codec = SnapshotCodec::new(MemoryStorage::new(), NoCompression::new());
codec.templates_mut().add("Goblin", goblin);
let enemy = world.instantiate(goblin, "Goblin", Some(player))?;

let bytes = codec.save_to_bytes(&mut world, SnapshotFormat::Binary)?;
world.destroy(enemy);

let report = codec.load_from_bytes(&mut world, &bytes, SnapshotFormat::Binary)?;
assert_eq!(report.templates_spawned, 1);
# Ok::<(), snapgraph_core::SnapshotError>(())
```
*/

pub mod component;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod fields;
pub mod format;
pub mod hierarchy;
pub mod metadata;
pub mod observability;
pub mod resolver;
pub mod snapshot;
pub mod storage;
pub mod templates;
pub mod walker;


pub use component::{Component, Persistable, TypeRegistry};
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::SnapshotConfig;
pub use container::{Container, Entry, EntryTag, Field, FieldValue, Reference, Section, WeakReference};
pub use error::{Result, SnapshotError};
pub use fields::{
    DefaultFieldPolicy, ExplicitFieldPolicy, FieldPolicy, FieldReader, FieldSet, FieldSpec,
    FieldWriter,
};
pub use format::{Encoding, SnapshotFormat};
pub use hierarchy::{ComponentId, Hierarchy, NodeId, ObjectRef};
pub use metadata::{LoadReport, SnapshotReport};
pub use observability::init_observability;
pub use resolver::Resolver;
pub use snapshot::{
    create_codec_from_config, create_default_codec, SaveCounts, SnapshotCodec, TemplateTypes,
};
pub use storage::{LocalFileStorage, MemoryStorage, StorageAdapter};
pub use templates::{Template, TemplateRegistry};
pub use walker::{walk, walk_from, walk_templates, WalkResult};

#[cfg(feature = "metrics")]
pub use observability::SnapshotMetrics;
