//! Common test utilities for chronicle integration tests
//!
//! Stamps, engines over fresh stores, and small graph fixtures shared by
//! the authoring, schema, load-phase and persistence suites.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use chronicle::{
    Engine, EngineConfig, FieldDefinition, FieldType, Handle, MemoryStore, PublicId, Stamp, Status,
};
use std::sync::Arc;

/// Fixed reference time so stamp ordering is deterministic
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()
}

/// Reference by name
pub fn id(name: &str) -> PublicId {
    PublicId::from_name(name)
}

/// An active stamp `days` after `t0` by author U, module M, on path P
pub fn stamp_at(days: i64) -> Stamp {
    Stamp::new(Status::Active, t0() + Duration::days(days), id("U"), id("M"), id("P"))
}

pub fn stamp() -> Stamp {
    stamp_at(0)
}

pub fn stamp_with(status: Status, days: i64) -> Stamp {
    Stamp {
        status,
        ..stamp_at(days)
    }
}

/// Engine over an in-memory store that can be shared with the test
pub fn engine_with_store(config: EngineConfig) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::open(store.clone(), config).unwrap();
    (engine, store)
}

pub fn handle(engine: &Engine, name: &str) -> Handle {
    engine
        .lookup(&id(name))
        .unwrap()
        .unwrap_or_else(|| panic!("{name} was never resolved"))
}

/// Define pattern `name` with slots (STRING, COMPONENT_FIELD) in its own session
pub fn define_text_and_component_pattern(engine: &Engine, name: &str) {
    let mut session = engine.open_session(stamp());
    session
        .compose_pattern(id(name))
        .meaning(id("Pattern meaning"))
        .purpose(id("Pattern purpose"))
        .field(FieldDefinition::new(id("Label"), id("Display"), FieldType::String).with_name("label"))
        .field(
            FieldDefinition::new(id("Target"), id("Navigation"), FieldType::Component)
                .with_type_concept(id("Component field type")),
        );
    session.commit().unwrap();
}

/// Everything a fresh reader can observe, for comparing two engines
pub fn observable(engine: &Engine, names: &[&str]) -> Vec<(String, Vec<Handle>, Vec<Handle>, usize)> {
    names
        .iter()
        .map(|name| {
            let handle = handle(engine, name);
            let mut children = engine.children(handle);
            children.sort();
            (
                name.to_string(),
                engine.parents(handle),
                children,
                engine.descriptions(handle).len(),
            )
        })
        .collect()
}
