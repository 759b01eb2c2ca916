//! Per-domain device grouping for listing commands
//!
//! Aggregates cached entities into devices, resolves each device's area and
//! renders an on/off summary. `/light` and `/switch` read this directly.

use std::collections::HashMap;

use crate::api::Area;
use crate::cache::CacheSnapshot;
use crate::text;

/// One device row in a listing
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSummary {
    pub name: String,
    /// `"<on>/<total>"` for multi-entity devices, otherwise a localized
    /// on/off/unknown label
    pub state_summary: String,
    pub entity_count: usize,
}

struct DeviceGroup {
    name: String,
    area_key: Option<String>,
    states: Vec<String>,
}

/// Group the domain's devices by area key. `None` collects ungrouped devices.
///
/// The area for a device is resolved in order: the entity-area side-channel
/// map (reverse-resolved to an area id when the registry knows the name),
/// the device registry's own area field, then entity attribute fallbacks.
pub fn devices_by_domain(
    snap: &CacheSnapshot,
    domain: &str,
) -> HashMap<Option<String>, Vec<DeviceSummary>> {
    let prefix = format!("{domain}.");

    let device_areas: HashMap<&str, Option<&str>> = snap
        .devices
        .iter()
        .map(|d| (d.id.as_str(), d.area_id.as_deref()))
        .collect();
    let device_names: HashMap<&str, &str> = snap
        .devices
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();

    let mut groups: Vec<DeviceGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for state in snap.entities.iter() {
        if !state.entity_id.starts_with(&prefix) {
            continue;
        }

        let device_id = match state.device_id() {
            Some(id) => id.to_string(),
            None => format!("virtual_{}", state.entity_id),
        };

        let slot = match index.get(&device_id) {
            Some(&i) => i,
            None => {
                let mut area_key = snap
                    .entity_areas
                    .get(&state.entity_id)
                    .filter(|name| !name.is_empty())
                    .map(|area_name| {
                        // prefer the registry id when the name is known there
                        snap.areas
                            .iter()
                            .find(|(_, info)| &info.name == area_name)
                            .map(|(id, _)| id.clone())
                            .unwrap_or_else(|| area_name.clone())
                    });

                if area_key.is_none() {
                    area_key = device_areas
                        .get(device_id.as_str())
                        .and_then(|a| a.map(|s| s.to_string()));
                }
                if area_key.is_none() {
                    area_key = state
                        .area_id()
                        .or_else(|| state.attr_str("area"))
                        .or_else(|| state.attr_str("room"))
                        .map(|s| s.to_string());
                }

                let name = device_names
                    .get(device_id.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| state.attr_str("device_name").map(|s| s.to_string()))
                    .or_else(|| state.friendly_name().map(|s| s.to_string()))
                    .unwrap_or_else(|| state.object_id().to_string());

                groups.push(DeviceGroup {
                    name,
                    area_key,
                    states: Vec::new(),
                });
                let i = groups.len() - 1;
                index.insert(device_id, i);
                i
            }
        };

        groups[slot].states.push(state.state.clone());
    }

    let mut by_area: HashMap<Option<String>, Vec<DeviceSummary>> = HashMap::new();
    for group in groups {
        by_area
            .entry(group.area_key)
            .or_default()
            .push(DeviceSummary {
                name: group.name,
                state_summary: summarize_states(&group.states),
                entity_count: group.states.len(),
            });
    }

    by_area
}

fn summarize_states(states: &[String]) -> String {
    if states.len() > 1 {
        let on = states.iter().filter(|s| s.eq_ignore_ascii_case("on")).count();
        return format!("{on}/{}", states.len());
    }

    match states.first().map(|s| s.to_lowercase()).as_deref() {
        Some("on") => text::state_on().to_string(),
        Some("off") => text::state_off().to_string(),
        _ => text::state_unknown().to_string(),
    }
}

/// Display name for an area key, preferring the registry entry
pub fn area_display_name(key: &str, areas: &HashMap<String, Area>) -> String {
    areas
        .get(key)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| key.to_string())
}

/// Order groups for display: ungrouped last, otherwise alphabetical by
/// resolved area name.
pub fn sorted_groups(
    by_area: HashMap<Option<String>, Vec<DeviceSummary>>,
    areas: &HashMap<String, Area>,
) -> Vec<(Option<String>, Vec<DeviceSummary>)> {
    let mut groups: Vec<_> = by_area.into_iter().collect();
    groups.sort_by_key(|(key, _)| match key {
        Some(k) => (false, area_display_name(k, areas)),
        None => (true, String::new()),
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::EntityState;
    use serde_json::json;
    use std::sync::Arc;

    fn entity(entity_id: &str, state: &str, attributes: serde_json::Value) -> EntityState {
        EntityState {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        }
    }

    fn snap(entities: Vec<EntityState>, entity_areas: Vec<(&str, &str)>) -> CacheSnapshot {
        CacheSnapshot {
            entities: Arc::new(entities),
            entity_areas: Arc::new(
                entity_areas
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_filters_by_domain() {
        let snap = snap(
            vec![
                entity("light.desk", "on", json!({})),
                entity("switch.fan", "off", json!({})),
            ],
            vec![],
        );

        let by_area = devices_by_domain(&snap, "light");
        let ungrouped = &by_area[&None];
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].name, "desk");
    }

    #[test]
    fn test_multi_entity_device_ratio_summary() {
        let snap = snap(
            vec![
                entity("light.strip_1", "on", json!({"device_id": "strip"})),
                entity("light.strip_2", "off", json!({"device_id": "strip"})),
                entity("light.strip_3", "on", json!({"device_id": "strip"})),
            ],
            vec![],
        );

        let by_area = devices_by_domain(&snap, "light");
        let devices = &by_area[&None];
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].state_summary, "2/3");
        assert_eq!(devices[0].entity_count, 3);
    }

    #[test]
    fn test_single_entity_localized_label() {
        let snap = snap(vec![entity("light.desk", "on", json!({}))], vec![]);
        let by_area = devices_by_domain(&snap, "light");
        assert_eq!(by_area[&None][0].state_summary, text::state_on());
    }

    #[test]
    fn test_area_from_side_channel_map() {
        let snap = snap(
            vec![entity("light.desk", "on", json!({}))],
            vec![("light.desk", "Office")],
        );
        let by_area = devices_by_domain(&snap, "light");
        assert!(by_area.contains_key(&Some("Office".to_string())));
    }

    #[test]
    fn test_area_reverse_lookup_prefers_registry_id() {
        let mut areas = HashMap::new();
        areas.insert(
            "office".to_string(),
            Area {
                name: "Office".to_string(),
            },
        );
        let mut snapshot = snap(
            vec![entity("light.desk", "on", json!({}))],
            vec![("light.desk", "Office")],
        );
        snapshot.areas = Arc::new(areas);

        let by_area = devices_by_domain(&snapshot, "light");
        assert!(by_area.contains_key(&Some("office".to_string())));
    }

    #[test]
    fn test_area_from_entity_attribute_fallback() {
        let snap = snap(
            vec![entity("light.desk", "on", json!({"area_id": "den"}))],
            vec![],
        );
        let by_area = devices_by_domain(&snap, "light");
        assert!(by_area.contains_key(&Some("den".to_string())));
    }

    #[test]
    fn test_sorted_groups_ungrouped_last() {
        let mut by_area: HashMap<Option<String>, Vec<DeviceSummary>> = HashMap::new();
        let row = DeviceSummary {
            name: "x".to_string(),
            state_summary: "1/1".to_string(),
            entity_count: 1,
        };
        by_area.insert(None, vec![row.clone()]);
        by_area.insert(Some("kitchen".to_string()), vec![row.clone()]);
        by_area.insert(Some("bedroom".to_string()), vec![row]);

        let groups = sorted_groups(by_area, &HashMap::new());
        let keys: Vec<_> = groups.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                Some("bedroom".to_string()),
                Some("kitchen".to_string()),
                None
            ]
        );
    }
}
