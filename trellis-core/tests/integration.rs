//! Integration Tests for the Config Pipeline
//!
//! These tests assemble a small geometry/material/mesh system and verify
//! that stores, the bus, compilers, and cross-module references work
//! together correctly.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};
use trellis_core::engine::Engine;
use trellis_core::module::{CommandTable, Commands, ModuleDefinition, Processor};
use trellis_core::store::{Operate, Patch, Path, ReactiveStore};
use trellis_core::Error;

/// A processor whose runtime object mirrors its config.
fn plain_processor(type_name: &str, built: Rc<RefCell<Vec<String>>>) -> Processor {
    let tag = type_name.to_string();
    Processor::new(
        type_name,
        || json!({}),
        move |_ctx| {
            built.borrow_mut().push(tag.clone());
            Ok(Box::new(json!({})))
        },
        drop,
    )
}

/// A mesh processor resolving its `geometry` field against the geometry
/// module's instance map.
fn mesh_processor(built: Rc<RefCell<Vec<String>>>) -> Processor {
    Processor::new(
        "Mesh",
        || json!({ "geometry": "" }),
        move |_ctx| {
            built.borrow_mut().push("Mesh".to_string());
            Ok(Box::new(json!({ "geometry": null })))
        },
        drop,
    )
    .with_commands(
        Commands::new().set(CommandTable::new().on("geometry", |ctx| {
            let Some(vid) = ctx.patch.value.as_str() else {
                return;
            };
            let width = ctx
                .links
                .with_target("geometry", vid, |geometry| {
                    geometry
                        .downcast_ref::<Value>()
                        .and_then(|value| value.get("width").cloned())
                })
                .flatten();
            if let Some(width) = width {
                ctx.target
                    .assign("geometry", &json!({ "vid": vid, "width": width }));
            }
        })),
    )
}

fn assembled_engine(built: Rc<RefCell<Vec<String>>>) -> Engine {
    let mut engine = Engine::new();
    engine
        .assemble(vec![
            ModuleDefinition::new("mesh")
                .lifecycle(3)
                .processor(mesh_processor(built.clone()))
                .vid_rule(|_| true),
            ModuleDefinition::new("geometry")
                .lifecycle(1)
                .processor(plain_processor("BoxGeometry", built.clone()))
                .vid_rule(|_| true),
            ModuleDefinition::new("material")
                .lifecycle(2)
                .processor(plain_processor("BasicMaterial", built))
                .vid_rule(|_| true),
        ])
        .unwrap();
    engine
}

fn set_patch(key: &str, value: Value) -> Patch {
    Patch {
        operate: Operate::Set,
        path: Path::new(),
        key: key.to_string(),
        value,
    }
}

/// Loading a document compiles producers before consumers, regardless of
/// the order the document lists its sections.
#[test]
fn load_follows_lifecycle_order() {
    let built = Rc::new(RefCell::new(Vec::new()));
    let mut engine = assembled_engine(built.clone());

    // The mesh section comes first in the document; lifecycle wins.
    engine
        .load(&json!({
            "mesh": [{ "vid": "m1", "type": "Mesh", "geometry": "g1" }],
            "geometry": [{ "vid": "g1", "type": "BoxGeometry", "width": 2.0 }],
            "material": [{ "vid": "mat1", "type": "BasicMaterial" }],
        }))
        .unwrap();

    assert_eq!(*built.borrow(), vec!["BoxGeometry", "BasicMaterial", "Mesh"]);

    // The geometry existed by the time the mesh compiled, so the cross
    // reference resolved during the mesh's initial field pass.
    let mesh_map = engine.compiler("mesh").unwrap().borrow().map();
    let mesh_map = mesh_map.borrow();
    let mesh = mesh_map.get("m1").unwrap().downcast_ref::<Value>().unwrap();
    assert_eq!(mesh["geometry"]["vid"], "g1");
    assert_eq!(mesh["geometry"]["width"], 2.0);
}

/// A reference to a not-yet-compiled producer leaves the field at its
/// default; re-compiling the field once the producer exists resolves it.
#[test]
fn broken_reference_resolves_after_recompile() {
    let built = Rc::new(RefCell::new(Vec::new()));
    let engine = assembled_engine(built);

    // Mesh first: "g1" does not exist yet.
    let meshes = engine.store("mesh").unwrap();
    meshes
        .set(&[], "m1", json!({ "vid": "m1", "type": "Mesh", "geometry": "g1" }))
        .unwrap();

    {
        let map = engine.compiler("mesh").unwrap().borrow().map();
        let map = map.borrow();
        let mesh = map.get("m1").unwrap().downcast_ref::<Value>().unwrap();
        assert_eq!(mesh["geometry"], Value::Null);
    }

    // Produce the geometry, then touch the field to re-resolve it.
    engine
        .store("geometry")
        .unwrap()
        .set(&[], "g1", json!({ "vid": "g1", "type": "BoxGeometry", "width": 3.0 }))
        .unwrap();
    meshes.set(&["m1"], "geometry", json!("g1")).unwrap();

    let map = engine.compiler("mesh").unwrap().borrow().map();
    let map = map.borrow();
    let mesh = map.get("m1").unwrap().downcast_ref::<Value>().unwrap();
    assert_eq!(mesh["geometry"]["width"], 3.0);
}

/// Removing a config disposes its runtime object; later patches for that
/// vid fail with `UnknownVid`.
#[test]
fn disposal_makes_the_vid_unknown() {
    let built = Rc::new(RefCell::new(Vec::new()));
    let engine = assembled_engine(built);

    let store = engine.store("geometry").unwrap();
    store
        .set(&[], "g1", json!({ "vid": "g1", "type": "BoxGeometry", "width": 1.0 }))
        .unwrap();
    engine.remove_config("geometry", "g1").unwrap();

    let compiler = engine.compiler("geometry").unwrap();
    assert!(compiler.borrow().map().borrow().is_empty());

    let err = compiler
        .borrow_mut()
        .compile("g1", &set_patch("width", json!(2.0)))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownVid(_)));
}

/// Remove is a no-op on an absent vid, and a removed entry can be fully
/// re-covered by inserting its config again.
#[test]
fn remove_and_cover_round_trip() {
    let built = Rc::new(RefCell::new(Vec::new()));
    let engine = assembled_engine(built);

    let store = engine.store("geometry").unwrap();
    let config = json!({ "vid": "g1", "type": "BoxGeometry", "width": 1.0 });
    store.set(&[], "g1", config.clone()).unwrap();
    engine.remove_config("geometry", "g1").unwrap();

    // Deleting again fails at the store (the entry is gone) without
    // touching the compiler.
    assert!(engine.remove_config("geometry", "g1").is_err());
    let compiler = engine.compiler("geometry").unwrap();
    compiler.borrow_mut().remove(&config).unwrap();

    // Re-inserting the same config reconstructs the object.
    store.set(&[], "g1", config).unwrap();
    assert!(compiler.borrow().map().borrow().contains("g1"));
}

/// A command handler may mutate the store mid-dispatch; the induced patch
/// is queued and applied after the current one, in order.
#[test]
fn handlers_can_mutate_the_store_reentrantly() {
    let store_slot: Rc<RefCell<Option<ReactiveStore>>> = Rc::new(RefCell::new(None));
    let slot = store_slot.clone();

    let processor = Processor::new(
        "Square",
        || json!({ "width": 0.0 }),
        |_ctx| Ok(Box::new(json!({ "width": 0.0, "area": 0.0 }))),
        drop,
    )
    .with_commands(
        Commands::new().set(CommandTable::new().on("width", move |ctx| {
            let Some(width) = ctx.patch.value.as_f64() else {
                return;
            };
            ctx.target.assign("width", &ctx.patch.value);
            // Derive the area by writing it back through the store.
            let store = slot.borrow().clone();
            if let Some(store) = store {
                let _ = store.set(&[ctx.vid], "area", json!(width * width));
            }
        })),
    );

    let mut engine = Engine::new();
    engine
        .install(
            ModuleDefinition::new("square")
                .processor(processor)
                .vid_rule(|_| true),
        )
        .unwrap();
    let store = engine.store("square").unwrap();
    *store_slot.borrow_mut() = Some(store.clone());

    store
        .set(&[], "s1", json!({ "vid": "s1", "type": "Square", "width": 3.0 }))
        .unwrap();

    // The width handler ran during cover, queued the area write, and the
    // default set applied it afterwards.
    let map = engine.compiler("square").unwrap().borrow().map();
    let map = map.borrow();
    let square = map.get("s1").unwrap().downcast_ref::<Value>().unwrap();
    assert_eq!(square["width"], 3.0);
    assert_eq!(square["area"], 9.0);
    assert_eq!(store.get(&["s1", "area"]), Some(json!(9.0)));
}

/// Generated configs slot straight into the pipeline.
#[test]
fn generated_configs_compile() {
    let built = Rc::new(RefCell::new(Vec::new()));
    let engine = assembled_engine(built);

    let config = engine.generate_config("BoxGeometry").unwrap();
    let vid = config["vid"].as_str().unwrap().to_string();

    let store = engine.store("geometry").unwrap();
    store.set(&[], &vid, config).unwrap();

    let compiler = engine.compiler("geometry").unwrap();
    assert!(compiler.borrow().map().borrow().contains(&vid));
}
