/*!
End-to-end tests for the snapshot codec.
These tests build live hierarchies, save them in every format and restore them
into fresh or modified hierarchies.
*/

use serde::{Deserialize, Serialize};
use snapgraph_core::{
    create_codec_from_config, persistable_component, CompressionAdapter, FieldReader, FieldSet,
    FieldSpec, FieldValue, FieldWriter, GzipCompressor, Hierarchy, MemoryStorage, NodeId,
    ObjectRef, Persistable, Result, SnapshotCodec, SnapshotConfig, SnapshotFormat,
};
use std::io::Cursor;
use tempfile::TempDir;

const ALL_FORMATS: [SnapshotFormat; 3] = [
    SnapshotFormat::Binary,
    SnapshotFormat::Text,
    SnapshotFormat::CompressedBinary,
];

#[derive(Debug, Clone, Default, PartialEq)]
struct Health {
    value: i32,
}

impl FieldSet for Health {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()> {
        w.value("value", &self.value)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()> {
        r.value_into("value", &mut self.value)
    }
}

impl Persistable for Health {}
persistable_component!(Health, "Health");

#[derive(Debug, Clone, Default, PartialEq)]
struct Stats {
    title: String,
    speed: f32,
    tags: Vec<String>,
    level: u8,
    alive: bool,
}

impl FieldSet for Stats {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()> {
        w.value("title", &self.title)?;
        w.value("speed", &self.speed)?;
        w.value("tags", &self.tags)?;
        w.value("level", &self.level)?;
        w.value("alive", &self.alive)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()> {
        r.value_into("title", &mut self.title)?;
        r.value_into("speed", &mut self.speed)?;
        r.value_into("tags", &mut self.tags)?;
        r.value_into("level", &mut self.level)?;
        r.value_into("alive", &mut self.alive)
    }
}

impl Persistable for Stats {}
persistable_component!(Stats, "Stats");

#[derive(Debug, Clone, Default, PartialEq)]
struct Link {
    target: Option<ObjectRef>,
    others: Vec<Option<ObjectRef>>,
}

impl FieldSet for Link {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()> {
        w.reference("target", self.target)?;
        w.references("others", &self.others)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()> {
        r.reference_into("target", &mut self.target)?;
        r.references_into("others", &mut self.others)
    }
}

impl Persistable for Link {}
persistable_component!(Link, "Link");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Inner {
    armor: u32,
    scratch: u32,
}

impl FieldSet for Inner {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()> {
        w.value(FieldSpec::public("armor").marked(), &self.armor)?;
        w.value("scratch", &self.scratch)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()> {
        r.value_into(FieldSpec::public("armor").marked(), &mut self.armor)?;
        r.value_into("scratch", &mut self.scratch)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Loadout {
    ammo: u32,
    cache: u32,
    inner: Inner,
}

impl FieldSet for Loadout {
    fn write_fields(&self, w: &mut FieldWriter<'_>) -> Result<()> {
        w.value(FieldSpec::private("ammo").marked(), &self.ammo)?;
        w.value("cache", &self.cache)?;
        w.nested(FieldSpec::public("inner").marked(), &self.inner)
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) -> Result<()> {
        r.value_into(FieldSpec::private("ammo").marked(), &mut self.ammo)?;
        r.value_into("cache", &mut self.cache)?;
        r.nested_into(FieldSpec::public("inner").marked(), &mut self.inner)
    }
}

impl Persistable for Loadout {}
persistable_component!(Loadout, "Loadout");

fn codec() -> SnapshotCodec<MemoryStorage, GzipCompressor> {
    SnapshotCodec::new(MemoryStorage::new(), GzipCompressor::new())
}

/// World root with `goblins` instances of the "Goblin" template below it.
struct Scene {
    h: Hierarchy,
    world: NodeId,
    player: NodeId,
    prototype: NodeId,
}

fn scene(codec: &mut SnapshotCodec<MemoryStorage, GzipCompressor>, goblins: usize) -> Scene {
    let mut h = Hierarchy::new();
    let world = h.create_root("World").unwrap();
    let player = h.create_root("Player").unwrap();
    h.attach(player, Health { value: 7 }).unwrap();

    let prototype = h.create_prototype("Enemy").unwrap();
    h.attach(prototype, Health { value: 3 }).unwrap();
    let weapon = h.create_child(prototype, "Weapon").unwrap();
    h.attach(weapon, Stats::default()).unwrap();
    codec.templates_mut().add("Goblin", prototype);

    for _ in 0..goblins {
        h.instantiate(prototype, "Goblin", Some(world)).unwrap();
    }
    Scene {
        h,
        world,
        player,
        prototype,
    }
}

fn goblins(h: &Hierarchy, world: NodeId) -> Vec<NodeId> {
    h.children(world)
        .iter()
        .copied()
        .filter(|child| h.template_of(*child) == Some("Goblin"))
        .collect()
}

#[test]
fn test_value_fields_roundtrip_in_every_format() {
    let codec = codec();
    let stats = Stats {
        title: "Ranger".to_string(),
        speed: 2.5,
        tags: vec!["fast".to_string(), "quiet".to_string()],
        level: 12,
        alive: true,
    };

    for format in ALL_FORMATS {
        let mut source = Hierarchy::new();
        let player = source.create_root("Player").unwrap();
        source.attach(player, stats.clone()).unwrap();
        let bytes = codec.save_to_bytes(&mut source, format).unwrap();

        let mut target = Hierarchy::new();
        let player = target.create_root("Player").unwrap();
        let restored = target.attach(player, Stats::default()).unwrap();
        let report = codec.load_from_bytes(&mut target, &bytes, format).unwrap();

        assert!(report.is_clean(), "{format}: {report:?}");
        assert_eq!(target.get::<Stats>(restored), Some(&stats), "{format}");
        assert!(target.is_loaded(restored));
    }
}

#[test]
fn test_self_reference_roundtrip() {
    let codec = codec();
    let mut source = Hierarchy::new();
    let player = source.create_root("Player").unwrap();
    let link = source.attach(player, Link::default()).unwrap();
    source.get_mut::<Link>(link).unwrap().target = Some(ObjectRef::Component(link));
    let bytes = codec.save_to_bytes(&mut source, SnapshotFormat::Text).unwrap();

    let mut target = Hierarchy::new();
    let player = target.create_root("Player").unwrap();
    let restored = target.attach(player, Link::default()).unwrap();
    codec
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::Text)
        .unwrap();

    assert_eq!(
        target.get::<Link>(restored).unwrap().target,
        Some(ObjectRef::Component(restored))
    );
}

#[test]
fn test_mutual_references_roundtrip() {
    let codec = codec();
    let mut source = Hierarchy::new();
    let player = source.create_root("Player").unwrap();
    let enemy = source.create_root("Enemy").unwrap();
    let a = source.attach(player, Link::default()).unwrap();
    let b = source.attach(enemy, Link::default()).unwrap();
    source.get_mut::<Link>(a).unwrap().target = Some(ObjectRef::Component(b));
    source.get_mut::<Link>(b).unwrap().target = Some(ObjectRef::Component(a));
    source.get_mut::<Link>(b).unwrap().others = vec![
        Some(ObjectRef::Node(player)),
        None,
        Some(ObjectRef::Node(enemy)),
    ];
    let bytes = codec.save_to_bytes(&mut source, SnapshotFormat::Binary).unwrap();

    let mut target = Hierarchy::new();
    let player = target.create_root("Player").unwrap();
    let enemy = target.create_root("Enemy").unwrap();
    let a = target.attach(player, Link::default()).unwrap();
    let b = target.attach(enemy, Link::default()).unwrap();
    let report = codec
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::Binary)
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(
        target.get::<Link>(a).unwrap().target,
        Some(ObjectRef::Component(b))
    );
    let restored_b = target.get::<Link>(b).unwrap();
    assert_eq!(restored_b.target, Some(ObjectRef::Component(a)));
    assert_eq!(
        restored_b.others,
        vec![
            Some(ObjectRef::Node(player)),
            None,
            Some(ObjectRef::Node(enemy))
        ]
    );
}

#[test]
fn test_cycle_between_constructed_components_roundtrip() {
    let mut codec = codec();
    codec.types_mut().register::<Link>();

    let mut source = Hierarchy::new();
    let player = source.create_root("Player").unwrap();
    let enemy = source.create_root("Enemy").unwrap();
    let a = source.attach(player, Link::default()).unwrap();
    let b = source.attach(enemy, Link::default()).unwrap();
    source.get_mut::<Link>(a).unwrap().target = Some(ObjectRef::Component(b));
    source.get_mut::<Link>(b).unwrap().target = Some(ObjectRef::Component(a));

    for format in ALL_FORMATS {
        let bytes = codec.save_to_bytes(&mut source, format).unwrap();

        // Neither component exists yet; both are constructed from the type registry.
        let mut target = Hierarchy::new();
        let player = target.create_root("Player").unwrap();
        let enemy = target.create_root("Enemy").unwrap();
        let report = codec.load_from_bytes(&mut target, &bytes, format).unwrap();

        let a = target.find_component::<Link>(player).unwrap();
        let b = target.find_component::<Link>(enemy).unwrap();
        assert!(report.is_clean(), "{format}: {report:?}");
        assert_eq!(report.components_loaded, 2, "{format}");
        assert_eq!(
            target.get::<Link>(a).unwrap().target,
            Some(ObjectRef::Component(b)),
            "{format}"
        );
        assert_eq!(
            target.get::<Link>(b).unwrap().target,
            Some(ObjectRef::Component(a)),
            "{format}"
        );
    }
}

#[test]
fn test_reference_to_unconstructible_component_is_null() {
    let codec = codec();
    let mut source = Hierarchy::new();
    let player = source.create_root("Player").unwrap();
    let enemy = source.create_root("Enemy").unwrap();
    let link = source.attach(player, Link::default()).unwrap();
    let health = source.attach(enemy, Health { value: 1 }).unwrap();
    source.get_mut::<Link>(link).unwrap().target = Some(ObjectRef::Component(health));
    let bytes = codec.save_to_bytes(&mut source, SnapshotFormat::Text).unwrap();

    // Health is saved but not registered, so the enemy never gets one back.
    let mut target = Hierarchy::new();
    let player = target.create_root("Player").unwrap();
    target.create_root("Enemy").unwrap();
    let link = target.attach(player, Link::default()).unwrap();
    let report = codec
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::Text)
        .unwrap();

    assert_eq!(report.components_loaded, 1);
    assert_eq!(report.components_skipped, 1);
    assert_eq!(report.unresolved_references, 1);
    assert_eq!(target.get::<Link>(link).unwrap().target, None);
}

#[test]
fn test_deterministic_output() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 3);
    let link = s.h.attach(s.player, Link::default()).unwrap();
    let first_goblin = goblins(&s.h, s.world)[0];
    s.h.get_mut::<Link>(link).unwrap().target = Some(ObjectRef::Node(first_goblin));

    for format in ALL_FORMATS {
        let first = codec.save_to_bytes(&mut s.h, format).unwrap();
        let second = codec.save_to_bytes(&mut s.h, format).unwrap();
        assert_eq!(first, second, "{format}");
    }
}

#[test]
fn test_template_respawn_count() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 3);
    for (i, goblin) in goblins(&s.h, s.world).into_iter().enumerate() {
        let health = s.h.find_component::<Health>(goblin).unwrap();
        s.h.get_mut::<Health>(health).unwrap().value = 10 + i as i32;
    }
    let bytes = codec.save_to_bytes(&mut s.h, SnapshotFormat::Binary).unwrap();

    // Stale instances spawned after the save must not survive the load.
    s.h.instantiate(s.prototype, "Goblin", Some(s.world)).unwrap();
    s.h.instantiate(s.prototype, "Goblin", None).unwrap();

    let report = codec
        .load_from_bytes(&mut s.h, &bytes, SnapshotFormat::Binary)
        .unwrap();
    assert_eq!(report.instances_destroyed, 5);
    assert_eq!(report.templates_spawned, 3);
    assert!(report.is_clean());

    let restored = goblins(&s.h, s.world);
    assert_eq!(restored.len(), 3);
    let values: Vec<i32> = restored
        .iter()
        .map(|goblin| {
            let health = s.h.find_component::<Health>(*goblin).unwrap();
            s.h.get::<Health>(health).unwrap().value
        })
        .collect();
    assert_eq!(values, vec![10, 11, 12]);
    assert_eq!(s.h.roots().len(), 2);

    let weapon = s.h.find_child(restored[0], "Weapon").unwrap();
    assert!(s.h.find_component::<Stats>(weapon).is_some());
}

#[test]
fn test_unknown_template_on_save_is_skipped() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 1);
    let orc = s.h.instantiate(s.prototype, "Orc", Some(s.world)).unwrap();
    s.h.set_name(orc, "Orc").unwrap();
    s.h.instantiate(s.prototype, "Goblin", Some(s.world)).unwrap();

    let (bytes, report) = codec.encode(&mut s.h, SnapshotFormat::Text).unwrap();
    assert_eq!(report.templates_written, 2);
    assert_eq!(report.templates_skipped, 1);

    let container = SnapshotFormat::Text
        .decode(&bytes, &GzipCompressor::new())
        .unwrap();
    let templates = container.section("templates").unwrap();
    assert_eq!(templates.entries.len(), 2);
    for entry in &templates.entries {
        assert_eq!(
            entry.field("template_name"),
            Some(&FieldValue::Data("Goblin".into()))
        );
    }

    let load = codec
        .load_from_bytes(&mut s.h, &bytes, SnapshotFormat::Text)
        .unwrap();
    assert_eq!(load.templates_spawned, 2);
    assert_eq!(goblins(&s.h, s.world).len(), 2);
    assert!(!s.h.is_alive(orc));
    assert_eq!(s.h.children(s.world).len(), 2);
    // The orc's components have nowhere to go; every other entry still lands.
    assert_eq!(load.components_skipped, 2);
    assert_eq!(load.components_loaded, 5);
}

#[test]
fn test_unknown_template_on_load_keeps_indices_aligned() {
    let mut saving = codec();
    let mut s = scene(&mut saving, 2);
    let link = s.h.attach(s.player, Link::default()).unwrap();
    let player_health = s.h.find_component::<Health>(s.player).unwrap();
    s.h.get_mut::<Health>(player_health).unwrap().value = 99;
    s.h.get_mut::<Link>(link).unwrap().target = Some(ObjectRef::Component(player_health));
    let bytes = saving
        .save_to_bytes(&mut s.h, SnapshotFormat::CompressedBinary)
        .unwrap();

    let loading = codec();
    let mut target = Hierarchy::new();
    let world = target.create_root("World").unwrap();
    let player = target.create_root("Player").unwrap();
    let health = target.attach(player, Health::default()).unwrap();
    let link = target.attach(player, Link::default()).unwrap();

    let report = loading
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::CompressedBinary)
        .unwrap();
    assert_eq!(report.templates_skipped, 2);
    assert_eq!(report.templates_spawned, 0);
    assert_eq!(report.components_skipped, 4);
    assert!(target.children(world).is_empty());

    assert_eq!(target.get::<Health>(health).unwrap().value, 99);
    assert_eq!(
        target.get::<Link>(link).unwrap().target,
        Some(ObjectRef::Component(health))
    );
}

#[test]
fn test_reference_into_template_instance_is_remapped() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 2);
    let link = s.h.attach(s.player, Link::default()).unwrap();
    let second = goblins(&s.h, s.world)[1];
    let weapon = s.h.find_child(second, "Weapon").unwrap();
    let stats = s.h.find_component::<Stats>(weapon).unwrap();
    s.h.get_mut::<Link>(link).unwrap().target = Some(ObjectRef::Node(second));
    s.h.get_mut::<Link>(link).unwrap().others = vec![Some(ObjectRef::Component(stats))];
    let bytes = codec.save_to_bytes(&mut s.h, SnapshotFormat::Text).unwrap();

    codec
        .load_from_bytes(&mut s.h, &bytes, SnapshotFormat::Text)
        .unwrap();
    assert!(!s.h.is_alive(second));

    let respawned = goblins(&s.h, s.world)[1];
    let weapon = s.h.find_child(respawned, "Weapon").unwrap();
    let stats = s.h.find_component::<Stats>(weapon).unwrap();
    let restored = s.h.get::<Link>(link).unwrap();
    assert_eq!(restored.target, Some(ObjectRef::Node(respawned)));
    assert_eq!(restored.others, vec![Some(ObjectRef::Component(stats))]);
}

#[test]
fn test_compressed_format_wraps_binary() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 2);

    let binary = codec.save_to_bytes(&mut s.h, SnapshotFormat::Binary).unwrap();
    let compressed = codec
        .save_to_bytes(&mut s.h, SnapshotFormat::CompressedBinary)
        .unwrap();

    assert_ne!(binary, compressed);
    assert_eq!(GzipCompressor::new().decompress(&compressed).unwrap(), binary);
}

#[test]
fn test_world_player_goblin_scenario() {
    let mut saving = codec();
    let mut source = Hierarchy::new();
    source.create_root("World").unwrap();
    let player = source.create_root("Player").unwrap();
    source.attach(player, Health { value: 7 }).unwrap();
    let prototype = source.create_prototype("Enemy").unwrap();
    source.attach(prototype, Health { value: 3 }).unwrap();
    saving.templates_mut().add("Goblin", prototype);
    let enemy = source.instantiate(prototype, "Goblin", Some(player)).unwrap();
    let enemy_health = source.find_component::<Health>(enemy).unwrap();
    source.get_mut::<Health>(enemy_health).unwrap().value = 12;

    for format in ALL_FORMATS {
        let bytes = saving.save_to_bytes(&mut source, format).unwrap();

        let mut blank = Hierarchy::new();
        let world = blank.create_root("World").unwrap();
        let player = blank.create_root("Player").unwrap();
        let prototype = blank.create_prototype("Enemy").unwrap();
        blank.attach(prototype, Health { value: 3 }).unwrap();
        let mut loading = codec();
        loading.templates_mut().add("Goblin", prototype);
        loading.types_mut().register::<Health>();

        let report = loading.load_from_bytes(&mut blank, &bytes, format).unwrap();
        assert!(report.is_clean(), "{format}: {report:?}");
        assert_eq!(report.templates_spawned, 1, "{format}");
        assert_eq!(report.components_loaded, 2, "{format}");

        assert_eq!(blank.roots(), &[world, player]);
        assert!(blank.children(world).is_empty());
        let health = blank.find_component::<Health>(player).unwrap();
        assert_eq!(blank.get::<Health>(health), Some(&Health { value: 7 }));

        let children = blank.children(player);
        assert_eq!(children.len(), 1, "{format}");
        assert_eq!(blank.name(children[0]), Some("Enemy"));
        assert_eq!(blank.template_of(children[0]), Some("Goblin"));
        let health = blank.find_component::<Health>(children[0]).unwrap();
        assert_eq!(blank.get::<Health>(health), Some(&Health { value: 12 }));
    }
}

#[test]
fn test_non_finite_floats_roundtrip() {
    let codec = codec();
    let stats = Stats {
        title: "Drifter".to_string(),
        speed: f32::INFINITY,
        tags: vec!["unbounded".to_string()],
        level: 3,
        alive: true,
    };

    for format in ALL_FORMATS {
        let mut source = Hierarchy::new();
        let player = source.create_root("Player").unwrap();
        source.attach(player, stats.clone()).unwrap();
        let enemy = source.create_root("Enemy").unwrap();
        source
            .attach(
                enemy,
                Stats {
                    speed: f32::NAN,
                    ..Stats::default()
                },
            )
            .unwrap();
        let bytes = codec.save_to_bytes(&mut source, format).unwrap();

        let mut target = Hierarchy::new();
        let player = target.create_root("Player").unwrap();
        let enemy = target.create_root("Enemy").unwrap();
        let restored = target
            .attach(
                player,
                Stats {
                    speed: 1.0,
                    ..Stats::default()
                },
            )
            .unwrap();
        let restored_nan = target.attach(enemy, Stats::default()).unwrap();
        let report = codec.load_from_bytes(&mut target, &bytes, format).unwrap();

        assert!(report.is_clean(), "{format}: {report:?}");
        assert_eq!(report.components_loaded, 2, "{format}");
        assert_eq!(target.get::<Stats>(restored), Some(&stats), "{format}");
        assert!(target.get::<Stats>(restored_nan).unwrap().speed.is_nan(), "{format}");
    }
}

#[test]
fn test_repeated_loads_reuse_arena_slots() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 3);
    let bytes = codec.save_to_bytes(&mut s.h, SnapshotFormat::Binary).unwrap();
    let capacity = s.h.capacity();
    let nodes = s.h.node_count();
    let stale = goblins(&s.h, s.world)[0];

    for _ in 0..20 {
        let report = codec
            .load_from_bytes(&mut s.h, &bytes, SnapshotFormat::Binary)
            .unwrap();
        assert_eq!(report.templates_spawned, 3);
    }

    assert_eq!(s.h.capacity(), capacity);
    assert_eq!(s.h.node_count(), nodes);
    assert_eq!(goblins(&s.h, s.world).len(), 3);
    assert!(!s.h.is_alive(stale));
}

#[test]
fn test_explicit_fields_only() {
    let loadout = Loadout {
        ammo: 30,
        cache: 5,
        inner: Inner {
            armor: 4,
            scratch: 9,
        },
    };
    let strict = codec().with_config(SnapshotConfig::new().require_explicit_fields(true));

    let mut source = Hierarchy::new();
    let player = source.create_root("Player").unwrap();
    source.attach(player, loadout.clone()).unwrap();
    let bytes = strict.save_to_bytes(&mut source, SnapshotFormat::Text).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(!text.contains("cache"));
    assert!(!text.contains("scratch"));

    let mut target = Hierarchy::new();
    let player = target.create_root("Player").unwrap();
    let restored = target.attach(player, Loadout::default()).unwrap();
    strict
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::Text)
        .unwrap();
    assert_eq!(
        target.get::<Loadout>(restored),
        Some(&Loadout {
            ammo: 30,
            cache: 0,
            inner: Inner {
                armor: 4,
                scratch: 0
            }
        })
    );

    // Without explicit marking public fields and whole nested values are kept.
    let relaxed = codec();
    let bytes = relaxed.save_to_bytes(&mut source, SnapshotFormat::Text).unwrap();
    let mut target = Hierarchy::new();
    let player = target.create_root("Player").unwrap();
    let restored = target.attach(player, Loadout::default()).unwrap();
    relaxed
        .load_from_bytes(&mut target, &bytes, SnapshotFormat::Text)
        .unwrap();
    assert_eq!(target.get::<Loadout>(restored), Some(&loadout));
}

#[test]
fn test_stream_roundtrip() {
    let mut codec = codec();
    let mut s = scene(&mut codec, 2);

    let mut stream = Cursor::new(Vec::new());
    let report = codec
        .save_to_writer(&mut s.h, &mut stream, SnapshotFormat::CompressedBinary)
        .unwrap();
    assert_eq!(report.compression_algorithm.as_deref(), Some("gzip"));
    assert!(report.verify_integrity(stream.get_ref()).is_ok());

    stream.set_position(0);
    let load = codec
        .load_from_reader(&mut s.h, &mut stream, SnapshotFormat::CompressedBinary)
        .unwrap();
    assert_eq!(load.templates_spawned, 2);
    assert_eq!(load.instances_destroyed, 2);
}

#[test]
fn test_named_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let config = SnapshotConfig::with_storage_dir(temp_dir.path()).format(SnapshotFormat::Text);
    let mut codec = create_codec_from_config(config).unwrap();

    let mut h = Hierarchy::new();
    let player = h.create_root("Player").unwrap();
    let health = h.attach(player, Health { value: 21 }).unwrap();
    let prototype = h.create_prototype("Enemy").unwrap();
    codec.templates_mut().add("Goblin", prototype);
    h.instantiate(prototype, "Goblin", Some(player)).unwrap();

    let report = codec.save_default(&mut h, "slot1").unwrap();
    let path = temp_dir.path().join("slot1.json");
    assert!(path.exists());
    assert_eq!(codec.get_filename("slot1", SnapshotFormat::Text), path);
    assert!(report
        .verify_integrity(&std::fs::read(&path).unwrap())
        .is_ok());

    h.get_mut::<Health>(health).unwrap().value = 0;
    let load = codec.load_default(&mut h, "slot1").unwrap();
    assert!(load.is_clean());
    assert_eq!(h.get::<Health>(health).unwrap().value, 21);
    assert_eq!(h.children(player).len(), 1);
}

#[test]
fn test_visit_templates_reports_unregistered_types() {
    let mut codec = codec();
    let s = scene(&mut codec, 0);
    codec.types_mut().register::<Health>();

    let visited = codec.visit_templates(&s.h);
    assert_eq!(visited.len(), 1);
    assert_eq!(visited[0].template, "Goblin");
    assert_eq!(visited[0].types, vec!["Health", "Stats"]);
    assert_eq!(visited[0].unregistered, vec!["Stats"]);
}

#[test]
fn test_corrupt_input_is_an_error() {
    let codec = codec();
    let mut h = Hierarchy::new();
    for format in ALL_FORMATS {
        assert!(codec
            .load_from_bytes(&mut h, b"definitely not a snapshot", format)
            .is_err());
    }
}
