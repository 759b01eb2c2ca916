//! Read-only query handlers: `/info`, `/light`, `/switch`, `/search`

use std::collections::HashMap;

use crate::api::EntityState;
use crate::cache::{CacheSnapshot, Device};
use crate::grouping;
use crate::handlers::BotContext;
use crate::search;
use crate::text;

/// Words marking a temperature sensor as belonging to an appliance rather
/// than measuring the room
const DEVICE_KEYWORDS: &[&str] = &[
    "插座",
    "电源",
    "设备温度",
    "设备",
    "电暖器",
    "加热器",
    "开关",
    "outlet",
    "socket",
    "plug",
    "power",
    "device temperature",
    "device temp",
    "heater",
    "switch",
    "thermostat",
    "climate",
];

const CONTROL_DOMAINS: &[&str] = &["climate", "switch", "light", "fan", "heater", "thermostat"];

struct LightStatus {
    friendly_name: String,
    brightness_pct: Option<u8>,
}

struct ClimateStatus {
    friendly_name: String,
    hvac_mode: String,
    current_temp: Option<f64>,
    target_temp: Option<f64>,
    fan_mode: Option<String>,
    humidity: Option<f64>,
}

struct SensorReading {
    entity_id: String,
    friendly_name: String,
    value: String,
    unit: String,
}

struct WeatherStatus {
    friendly_name: String,
    condition: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

struct AlertStatus {
    friendly_name: String,
    device_class: String,
}

#[derive(Default)]
struct HomeContext {
    lights_on: Vec<LightStatus>,
    climate: Vec<ClimateStatus>,
    temperature_sensors: Vec<SensorReading>,
    humidity_sensors: Vec<SensorReading>,
    air_quality_sensors: Vec<SensorReading>,
    energy_sensors: Vec<SensorReading>,
    weather: Vec<WeatherStatus>,
    alerts: Vec<AlertStatus>,
}

/// Nonzero numeric or None; zero readings are sensor noise, not status
fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn friendly(state: &EntityState) -> String {
    state
        .friendly_name()
        .unwrap_or(&state.entity_id)
        .to_string()
}

/// Whether a temperature sensor measures an appliance instead of the room.
///
/// Checked against name keywords, the owning device's name, and whether any
/// sibling entity of the same device belongs to a control domain.
fn is_device_temperature_sensor(
    state: &EntityState,
    all_states: &[EntityState],
    devices: &[Device],
) -> bool {
    let entity_id_lower = state.entity_id.to_lowercase();
    let name_lower = friendly(state).to_lowercase();
    if DEVICE_KEYWORDS
        .iter()
        .any(|kw| entity_id_lower.contains(kw) || name_lower.contains(kw))
    {
        return true;
    }

    let Some(device_id) = state.device_id() else {
        return false;
    };

    if let Some(device) = devices.iter().find(|d| d.id == device_id) {
        let device_name = device.name.to_lowercase();
        if DEVICE_KEYWORDS.iter().any(|kw| device_name.contains(kw)) {
            return true;
        }
    }

    all_states.iter().any(|other| {
        other.entity_id != state.entity_id
            && other.device_id() == Some(device_id)
            && CONTROL_DOMAINS.contains(&other.domain())
    })
}

fn collect_context(states: &[EntityState], devices: &[Device]) -> HomeContext {
    let mut context = HomeContext::default();

    for state in states {
        let value_lower = state.state.to_lowercase();
        match state.domain() {
            "light" if value_lower == "on" => {
                let brightness_pct = state
                    .attr_f64("brightness")
                    .map(|b| ((b / 255.0) * 100.0).round() as u8);
                context.lights_on.push(LightStatus {
                    friendly_name: friendly(state),
                    brightness_pct,
                });
            }
            "climate" => {
                context.climate.push(ClimateStatus {
                    friendly_name: friendly(state),
                    hvac_mode: state
                        .attr_str("hvac_mode")
                        .unwrap_or(&state.state)
                        .to_string(),
                    current_temp: nonzero(state.attr_f64("current_temperature")),
                    target_temp: nonzero(state.attr_f64("temperature")),
                    fan_mode: state.attr_str("fan_mode").map(|s| s.to_string()),
                    humidity: nonzero(state.attr_f64("humidity")),
                });
            }
            "sensor" => {
                let unit = state.unit_of_measurement().unwrap_or("");
                let device_class = state.device_class().unwrap_or("");
                let entity_id_lower = state.entity_id.to_lowercase();
                let name = friendly(state);

                if device_class == "temperature" || entity_id_lower.contains("temperature") {
                    if !is_device_temperature_sensor(state, states, devices)
                        && state.state.parse::<f64>().is_ok_and(|v| v != 0.0)
                    {
                        context.temperature_sensors.push(SensorReading {
                            entity_id: state.entity_id.clone(),
                            friendly_name: name,
                            value: state.state.clone(),
                            unit: if unit.is_empty() { "°C" } else { unit }.to_string(),
                        });
                    }
                } else if device_class == "humidity" || entity_id_lower.contains("humidity") {
                    if state.state.parse::<f64>().is_ok_and(|v| v > 0.0) {
                        context.humidity_sensors.push(SensorReading {
                            entity_id: state.entity_id.clone(),
                            friendly_name: name,
                            value: state.state.clone(),
                            unit: if unit.is_empty() { "%" } else { unit }.to_string(),
                        });
                    }
                } else if ["aqi", "pm25", "pm10", "co2", "co", "no2", "o3"]
                    .contains(&device_class)
                    || entity_id_lower.contains("air_quality")
                    || entity_id_lower.contains("aqi")
                {
                    context.air_quality_sensors.push(SensorReading {
                        entity_id: state.entity_id.clone(),
                        friendly_name: name,
                        value: state.state.clone(),
                        unit: unit.to_string(),
                    });
                } else if device_class == "energy"
                    || entity_id_lower.contains("energy")
                    || entity_id_lower.contains("consumption")
                    || entity_id_lower.contains("daily")
                {
                    // only daily totals, not instantaneous power
                    let name_lower = name.to_lowercase();
                    if entity_id_lower.contains("daily")
                        || name_lower.contains("day")
                        || name.contains('日')
                    {
                        context.energy_sensors.push(SensorReading {
                            entity_id: state.entity_id.clone(),
                            friendly_name: name,
                            value: state.state.clone(),
                            unit: if unit.is_empty() { "kWh" } else { unit }.to_string(),
                        });
                    }
                }
            }
            "weather" => {
                context.weather.push(WeatherStatus {
                    friendly_name: friendly(state),
                    condition: state
                        .attr_str("condition")
                        .unwrap_or(&state.state)
                        .to_string(),
                    temperature: state.attr_f64("temperature"),
                    humidity: state.attr_f64("humidity"),
                });
            }
            "binary_sensor" if value_lower == "on" => {
                let device_class = state.device_class().unwrap_or("");
                if ["door", "window", "motion", "occupancy", "smoke", "gas", "moisture"]
                    .contains(&device_class)
                {
                    context.alerts.push(AlertStatus {
                        friendly_name: friendly(state),
                        device_class: device_class.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    context
}

fn alert_icon(device_class: &str) -> &'static str {
    match device_class {
        "door" => "🚪",
        "window" => "🪟",
        "motion" => "👁️",
        "occupancy" => "🏠",
        "smoke" => "🔥",
        "gas" => "⚠️",
        "moisture" => "💧",
        _ => "•",
    }
}

fn render_digest(context: &HomeContext, entity_areas: &HashMap<String, String>) -> String {
    let mut lines: Vec<String> = vec![text::context_info_header().to_string()];

    if !context.lights_on.is_empty() {
        lines.push(format!("\n{}:", text::lights_on_label()));
        for light in &context.lights_on {
            match light.brightness_pct {
                Some(pct) => lines.push(format!("  • {} ({pct}%)", light.friendly_name)),
                None => lines.push(format!("  • {}", light.friendly_name)),
            }
        }
    }

    if !context.climate.is_empty() {
        lines.push(format!("\n{}:", text::climate_devices_label()));
        for climate in &context.climate {
            let mut parts: Vec<String> = Vec::new();
            if let Some(temp) = climate.current_temp {
                parts.push(format!("{}: {temp}°C", text::current_temp_label()));
            }
            if let Some(temp) = climate.target_temp {
                parts.push(format!("{}: {temp}°C", text::target_temp_label()));
            }
            if !climate.hvac_mode.is_empty() {
                parts.push(format!("{}: {}", text::mode_label(), climate.hvac_mode));
            }
            if let Some(fan) = &climate.fan_mode {
                parts.push(format!("{}: {fan}", text::fan_label()));
            }
            if let Some(humidity) = climate.humidity {
                parts.push(format!("{}: {humidity}%", text::humidity_label()));
            }
            let status = if parts.is_empty() {
                climate.hvac_mode.clone()
            } else {
                parts.join(" - ")
            };
            lines.push(format!("  • {}: {status}", climate.friendly_name));
        }
    }

    if !context.temperature_sensors.is_empty() {
        lines.push(format!("\n{}:", text::temperature_label()));

        // one representative sensor per area, ungrouped last
        let mut by_area: Vec<(String, &SensorReading)> = Vec::new();
        for reading in &context.temperature_sensors {
            let area = entity_areas
                .get(&reading.entity_id)
                .filter(|a| !a.is_empty())
                .cloned()
                .unwrap_or_else(|| text::ungrouped().to_string());
            if !by_area.iter().any(|(existing, _)| *existing == area) {
                by_area.push((area, reading));
            }
        }
        by_area.sort_by_key(|(area, _)| (area == text::ungrouped(), area.clone()));

        for (area, reading) in by_area {
            if area == text::ungrouped() {
                lines.push(format!(
                    "  • {}: {} {}",
                    reading.friendly_name, reading.value, reading.unit
                ));
            } else {
                lines.push(format!("  • {area}: {} {}", reading.value, reading.unit));
            }
        }
    }

    if !context.humidity_sensors.is_empty() {
        lines.push(format!("\n{}:", text::humidity_label()));
        for reading in &context.humidity_sensors {
            lines.push(format!(
                "  • {}: {} {}",
                reading.friendly_name, reading.value, reading.unit
            ));
        }
    }

    if !context.air_quality_sensors.is_empty() {
        lines.push(format!("\n{}:", text::air_quality_label()));
        for reading in &context.air_quality_sensors {
            if reading.unit.is_empty() {
                lines.push(format!("  • {}: {}", reading.friendly_name, reading.value));
            } else {
                lines.push(format!(
                    "  • {}: {} {}",
                    reading.friendly_name, reading.value, reading.unit
                ));
            }
        }
    }

    if !context.energy_sensors.is_empty() {
        lines.push(format!("\n{}:", text::energy_label()));
        for reading in &context.energy_sensors {
            lines.push(format!(
                "  • {}: {} {}",
                reading.friendly_name, reading.value, reading.unit
            ));
        }
    }

    if !context.weather.is_empty() {
        lines.push(format!("\n{}:", text::weather_label()));
        for weather in &context.weather {
            let mut parts: Vec<String> = Vec::new();
            if !weather.condition.is_empty() {
                parts.push(weather.condition.clone());
            }
            if let Some(temp) = weather.temperature {
                parts.push(format!("{}: {temp}°C", text::temperature_label()));
            }
            if let Some(humidity) = weather.humidity {
                parts.push(format!("{}: {humidity}%", text::humidity_label()));
            }
            let status = if parts.is_empty() {
                weather.condition.clone()
            } else {
                parts.join(" - ")
            };
            lines.push(format!("  • {}: {status}", weather.friendly_name));
        }
    }

    if !context.alerts.is_empty() {
        lines.push(format!("\n{}:", text::important_status_label()));
        for alert in &context.alerts {
            lines.push(format!(
                "  {} {}",
                alert_icon(&alert.device_class),
                alert.friendly_name
            ));
        }
    }

    if lines.len() == 1 {
        lines.push(format!("\n{}", text::no_status_info()));
    }

    lines.join("\n")
}

/// Handle `/info`: fetch fresh states and summarize what matters
pub async fn home_digest(bot: &BotContext) -> String {
    let states = match bot.client.get_states().await {
        Ok(states) => states,
        Err(err) => {
            log::error!("Error getting context: {err:#}");
            return text::unable_to_get_context().to_string();
        }
    };

    let snapshot = bot.cache.snapshot().unwrap_or_default();
    let context = collect_context(&states, &snapshot.devices);
    render_digest(&context, &snapshot.entity_areas)
}

/// Handle `/light` and `/switch`: list the domain's devices grouped by area
pub fn list_domain(bot: &BotContext, domain: &str) -> String {
    let snapshot: CacheSnapshot = bot.cache.snapshot().unwrap_or_default();
    let by_area = grouping::devices_by_domain(&snapshot, domain);

    if by_area.is_empty() {
        return text::no_devices_found(domain);
    }

    let mut lines: Vec<String> = vec![text::devices_list_header(domain)];
    for (area_key, devices) in grouping::sorted_groups(by_area, &snapshot.areas) {
        match area_key {
            Some(key) => lines.push(format!(
                "\n{}: {}",
                text::area_label(),
                grouping::area_display_name(&key, &snapshot.areas)
            )),
            None => lines.push(format!("\n{}", text::ungrouped())),
        }
        for device in devices {
            lines.push(format!("  •{} - {}", device.name, device.state_summary));
        }
    }

    lines.join("\n")
}

/// Handle `/search <query>`
pub fn search(bot: &BotContext, query: &str) -> String {
    if query.is_empty() {
        return text::search_usage().to_string();
    }

    let results = search::search_entities(&bot.cache, query);
    if results.hits.is_empty() {
        return text::search_no_results(query);
    }

    let mut lines: Vec<String> = vec![text::search_results_header(query, results.hits.len())];
    for hit in &results.hits {
        lines.push(format!("  • {} ({})", hit.friendly_name, hit.entity_id));
    }
    if results.truncated {
        lines.push(text::search_results_truncated(search::MAX_RESULTS));
    }

    lines.join("\n")
}
