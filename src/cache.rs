//! In-memory entity cache
//!
//! Process-wide snapshot of the smart home's entities, devices, areas and
//! per-entity area names. The cache is memory-only and rebuilt wholesale on
//! every refresh; readers always observe a complete snapshot from a single
//! refresh, never a mix of two.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::api::{Area, EntityState, HassClient};

/// A physical device grouping one or more entities
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub area_id: Option<String>,
    pub entities: Vec<String>,
}

/// One complete, immutable view of the cache tables.
///
/// The tables are Arc-shared so taking a snapshot is cheap and never blocks
/// on network I/O.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub entities: Arc<Vec<EntityState>>,
    pub devices: Arc<Vec<Device>>,
    pub areas: Arc<HashMap<String, Area>>,
    pub entity_areas: Arc<HashMap<String, String>>,
}

/// Thread-safe entity cache
///
/// `None` until the first successful load; callers must treat "not yet
/// loaded" distinctly from "loaded but empty".
#[derive(Debug, Default)]
pub struct EntityCache {
    inner: Mutex<Option<CacheSnapshot>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().expect("cache lock poisoned").is_some()
    }

    /// Take a consistent snapshot of all four tables in one lock acquisition
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.inner.lock().expect("cache lock poisoned").clone()
    }

    pub fn entities(&self) -> Option<Arc<Vec<EntityState>>> {
        self.snapshot().map(|s| s.entities)
    }

    pub fn devices(&self) -> Option<Arc<Vec<Device>>> {
        self.snapshot().map(|s| s.devices)
    }

    pub fn areas(&self) -> Option<Arc<HashMap<String, Area>>> {
        self.snapshot().map(|s| s.areas)
    }

    pub fn entity_areas(&self) -> Option<Arc<HashMap<String, String>>> {
        self.snapshot().map(|s| s.entity_areas)
    }

    /// Install a fresh snapshot; all four tables swap as a unit
    pub fn install(&self, snapshot: CacheSnapshot) {
        *self.inner.lock().expect("cache lock poisoned") = Some(snapshot);
    }

    /// Reload everything from Home Assistant.
    ///
    /// Only the entity-list fetch is mandatory. Devices fall back to
    /// extraction from entity attributes, and area information degrades to
    /// "ungrouped" when the template side-channel is unavailable; neither
    /// failure blocks command handling.
    pub async fn refresh(&self, client: &HassClient) -> Result<()> {
        log::info!("Loading entity, device and area cache from Home Assistant...");
        let states = client.get_states().await?;

        let devices = extract_devices(&states);

        let areas = match client.get_areas().await {
            Ok(areas) => areas,
            Err(err) => {
                log::warn!("Failed to load area registry: {err:#}");
                HashMap::new()
            }
        };

        let entity_areas = match client.get_entity_areas().await {
            Ok(map) => map,
            Err(err) => {
                log::warn!("Failed to get entity areas: {err:#}");
                log::warn!("Devices will be shown as ungrouped.");
                HashMap::new()
            }
        };

        log::info!(
            "Entity cache loaded: {} entities, {} devices, {} areas",
            states.len(),
            devices.len(),
            areas.len()
        );

        self.install(CacheSnapshot {
            entities: Arc::new(states),
            devices: Arc::new(devices),
            areas: Arc::new(areas),
            entity_areas: Arc::new(entity_areas),
        });
        Ok(())
    }
}

/// Derive devices from entity states.
///
/// Entities without a `device_id` attribute each get a synthetic
/// `virtual_<entity_id>` device. The first entity seen for a device wins its
/// name and area; remaining entities are appended in discovery order.
pub fn extract_devices(states: &[EntityState]) -> Vec<Device> {
    let mut devices: Vec<Device> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for state in states {
        let device_id = match state.device_id() {
            Some(id) => id.to_string(),
            None => format!("virtual_{}", state.entity_id),
        };

        let slot = match index.get(&device_id) {
            Some(&i) => i,
            None => {
                let name = state
                    .attr_str("device_name")
                    .or_else(|| state.friendly_name())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| state.object_id().to_string());

                devices.push(Device {
                    id: device_id.clone(),
                    name,
                    area_id: state.area_id().map(|s| s.to_string()),
                    entities: Vec::new(),
                });
                let i = devices.len() - 1;
                index.insert(device_id, i);
                i
            }
        };

        devices[slot].entities.push(state.entity_id.clone());
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(entity_id: &str, state: &str, attributes: serde_json::Value) -> EntityState {
        EntityState {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        }
    }

    #[test]
    fn test_uninitialized_cache() {
        let cache = EntityCache::new();
        assert!(!cache.is_initialized());
        assert!(cache.snapshot().is_none());
        assert!(cache.entities().is_none());
    }

    #[test]
    fn test_install_makes_initialized() {
        let cache = EntityCache::new();
        cache.install(CacheSnapshot::default());
        assert!(cache.is_initialized());
        // loaded-but-empty is distinct from not-yet-loaded
        assert_eq!(cache.entities().unwrap().len(), 0);
    }

    #[test]
    fn test_extract_devices_groups_by_device_id() {
        let states = vec![
            entity(
                "light.desk",
                "on",
                json!({"device_id": "dev1", "friendly_name": "Desk Light", "area_id": "office"}),
            ),
            entity("sensor.desk_power", "12", json!({"device_id": "dev1"})),
            entity("switch.fan", "off", json!({})),
        ];

        let devices = extract_devices(&states);
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].id, "dev1");
        assert_eq!(devices[0].name, "Desk Light");
        assert_eq!(devices[0].area_id.as_deref(), Some("office"));
        assert_eq!(devices[0].entities, vec!["light.desk", "sensor.desk_power"]);

        assert_eq!(devices[1].id, "virtual_switch.fan");
        assert_eq!(devices[1].name, "fan");
        assert!(devices[1].area_id.is_none());
    }

    #[test]
    fn test_extract_devices_first_entity_wins_name() {
        let states = vec![
            entity(
                "sensor.a",
                "1",
                json!({"device_id": "dev1", "friendly_name": "First"}),
            ),
            entity(
                "sensor.b",
                "2",
                json!({"device_id": "dev1", "friendly_name": "Second"}),
            ),
        ];

        let devices = extract_devices(&states);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "First");
    }

    #[test]
    fn test_snapshot_is_atomic_across_refreshes() {
        // Writers alternate between two complete generations; a reader must
        // never see tables from different generations in one snapshot.
        let cache = Arc::new(EntityCache::new());

        let make_gen = |gen: &str| {
            let mut areas = HashMap::new();
            areas.insert(
                "marker".to_string(),
                Area {
                    name: gen.to_string(),
                },
            );
            let mut entity_areas = HashMap::new();
            entity_areas.insert("marker".to_string(), gen.to_string());
            CacheSnapshot {
                entities: Arc::new(vec![entity("sensor.gen", gen, json!({}))]),
                devices: Arc::new(vec![Device {
                    id: gen.to_string(),
                    name: gen.to_string(),
                    area_id: None,
                    entities: vec![],
                }]),
                areas: Arc::new(areas),
                entity_areas: Arc::new(entity_areas),
            }
        };

        cache.install(make_gen("gen0"));

        let writer_cache = Arc::clone(&cache);
        let writer = std::thread::spawn(move || {
            for i in 0..500 {
                let gen = if i % 2 == 0 { "gen1" } else { "gen2" };
                writer_cache.install(make_gen(gen));
            }
        });

        for _ in 0..500 {
            let snap = cache.snapshot().unwrap();
            let entity_gen = snap.entities[0].state.clone();
            assert_eq!(snap.devices[0].id, entity_gen);
            assert_eq!(snap.areas["marker"].name, entity_gen);
            assert_eq!(snap.entity_areas["marker"], entity_gen);
        }

        writer.join().unwrap();
    }
}
