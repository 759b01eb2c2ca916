//! User-facing response templates
//!
//! All chat-visible strings live here so handlers stay readable and tests can
//! assert on exact phrasing in one place.

pub fn conversation_context_cleared() -> &'static str {
    "Conversation context cleared."
}

pub fn no_conversation_context() -> &'static str {
    "No conversation context to clear."
}

pub fn please_specify_entity_id(service_name: &str) -> String {
    format!("Please specify entity ID. Usage: /{service_name} <entity_id> [<entity_id2> ...]")
}

pub fn action_label(service: &str) -> &'static str {
    match service {
        "turn_on" => "Turn on",
        "turn_off" => "Turn off",
        _ => "Toggle",
    }
}

pub fn action_failed(action: &str, errors: &str) -> String {
    format!("{action} failed:\n{errors}")
}

pub fn success_action_with_errors(action: &str, count: usize, errors: &str) -> String {
    format!("Successfully {action} {count} entity/entities.\nErrors:\n{errors}")
}

pub fn success_action(action: &str, entity_list: &str) -> String {
    format!("Successfully {action}: {entity_list}")
}

pub fn error_processing_command(error: &str) -> String {
    format!("Error processing command: {error}")
}

pub fn entity_not_found() -> &'static str {
    "Entity not found"
}

pub fn multiple_entities_found(count: usize, alias: &str, first: &str) -> String {
    format!("⚠️ Found {count} entities with same alias ({alias}), will control the first one: {first}")
}

pub fn unable_to_get_context() -> &'static str {
    "Unable to get context information"
}

pub fn no_devices_found(domain: &str) -> String {
    format!("No {domain} devices found")
}

pub fn devices_list_header(domain: &str) -> String {
    format!("{domain} devices (grouped by area):")
}

pub fn area_label() -> &'static str {
    "Area"
}

pub fn ungrouped() -> &'static str {
    "Ungrouped"
}

pub fn state_on() -> &'static str {
    "On"
}

pub fn state_off() -> &'static str {
    "Off"
}

pub fn state_unknown() -> &'static str {
    "Unknown"
}

pub fn context_info_header() -> &'static str {
    "🏠 Home Status"
}

pub fn lights_on_label() -> &'static str {
    "💡 Lights On"
}

pub fn climate_devices_label() -> &'static str {
    "❄️ Climate Control"
}

pub fn temperature_label() -> &'static str {
    "🌡️ Ambient Temperature"
}

pub fn humidity_label() -> &'static str {
    "💧 Humidity"
}

pub fn air_quality_label() -> &'static str {
    "🌬️ Air Quality"
}

pub fn energy_label() -> &'static str {
    "⚡ Daily Energy Consumption"
}

pub fn weather_label() -> &'static str {
    "☀️ Weather"
}

pub fn important_status_label() -> &'static str {
    "⚠️ Important Status"
}

pub fn current_temp_label() -> &'static str {
    "Current"
}

pub fn target_temp_label() -> &'static str {
    "Target"
}

pub fn mode_label() -> &'static str {
    "Mode"
}

pub fn fan_label() -> &'static str {
    "Fan"
}

pub fn no_status_info() -> &'static str {
    "No status information available"
}

pub fn script_usage() -> &'static str {
    "Usage: /script <script_id>"
}

pub fn script_executed(script_id: &str) -> String {
    format!("✅ Script executed successfully: {script_id}")
}

pub fn script_execution_failed(script_id: &str, error: &str) -> String {
    format!("❌ Script execution failed: {script_id}\nError: {error}")
}

pub fn climate_usage() -> &'static str {
    "Usage: /climate <entity_id> [mode] [temperature]\n\
     Example: /climate living_room_ac cool 26\n\
     \u{20}        /climate living_room_ac temp 25\n\
     \u{20}        /climate living_room_ac off"
}

pub fn climate_mode_set(mode: &str) -> String {
    format!("✅ Mode set to: {}", climate_mode_label(mode))
}

pub fn climate_temp_set(temp: f64) -> String {
    format!("✅ Temperature set to: {temp}°C")
}

pub fn climate_no_params() -> &'static str {
    "Please specify mode or temperature. Usage: /climate <entity_id> [mode] [temperature]"
}

pub fn climate_mode_label(mode: &str) -> &str {
    match mode {
        "cool" => "Cool",
        "heat" => "Heat",
        "fan_only" => "Fan Only",
        "off" => "Off",
        other => other,
    }
}

pub fn search_usage() -> &'static str {
    "Usage: /search <query>"
}

pub fn search_results_header(query: &str, count: usize) -> String {
    format!("🔍 Search Results (query: {query}, found {count}):")
}

pub fn search_no_results(query: &str) -> String {
    format!("No entities found matching '{query}'")
}

pub fn search_results_truncated(limit: usize) -> String {
    format!("(Results truncated, showing first {limit})")
}

pub fn cache_refreshed(entities: usize, devices: usize, areas: usize) -> String {
    format!("✅ Cache refreshed: {entities} entities, {devices} devices, {areas} areas")
}

pub fn cache_refresh_failed(error: &str) -> String {
    format!("❌ Cache refresh failed: {error}")
}

pub fn help_text(nickname: &str) -> String {
    format!(
        "📋 {nickname} supported commands:\n\
         /help - Show all supported commands and brief descriptions\n\
         /echo <text> - Echo the input text (for testing)\n\
         /clear - Clear conversation context\n\
         /turnon <id> - Turn on specified device(s) (entity_id, friendly name, or alias; multiple allowed)\n\
         /turnoff <id> - Turn off specified device(s) (entity_id, friendly name, or alias; multiple allowed)\n\
         /toggle <id> - Toggle specified device(s) (entity_id, friendly name, or alias; multiple allowed)\n\
         /info - Get home context information\n\
         /light - List all light devices (grouped by area)\n\
         /switch - List all switch devices (grouped by area)\n\
         /script <id> - Execute a script (script ID or entity ID)\n\
         /climate <id> [mode] [temp] - Control climate device (cool/heat/fan_only/off, temperature)\n\
         /search <query> - Fuzzy search entities (entity_id, friendly name, or alias)\n\
         /refresh - Reload the entity cache\n\
         Anything else is forwarded to the conversation agent."
    )
}

pub fn request_processed() -> &'static str {
    "Request processed"
}

pub fn error_processing_request(error: &str) -> String {
    format!("Error processing request: {error}")
}

pub fn invalid_webhook_token() -> &'static str {
    "Invalid webhook token"
}

pub fn group_id_and_message_required() -> &'static str {
    "group_id and message are required"
}

pub fn notification_sent() -> &'static str {
    "Notification sent"
}

pub fn group_id_required() -> &'static str {
    "group_id is required"
}

pub fn message_or_url_required() -> &'static str {
    "At least one of message or url is required"
}

pub fn failed_to_process_video_stream(error: &str) -> String {
    format!("Failed to process video stream: {error}")
}
