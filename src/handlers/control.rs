//! Device control handlers: `/turnon`, `/turnoff`, `/toggle`, `/climate`,
//! `/script`

use serde_json::{json, Value};

use crate::handlers::BotContext;
use crate::resolver;
use crate::text;
use crate::tokenizer;

/// Domain prefix of an entity id; bare ids default to the switch domain
fn extract_domain(entity_id: &str) -> &str {
    match entity_id.split_once('.') {
        Some((domain, _)) => domain,
        None => "switch",
    }
}

/// Turn on, turn off or toggle every entity named in `args`.
///
/// Aliases resolve independently; one unresolvable or failing entity never
/// aborts the rest. The reply distinguishes all-success, partial and
/// all-failure, and appends an ambiguity warning per alias that matched more
/// than one entity.
pub async fn control_entities(bot: &BotContext, service: &str, args: &str) -> String {
    let aliases = tokenizer::tokenize(args, "");
    if aliases.is_empty() {
        return text::please_specify_entity_id(&service.replace('_', ""));
    }

    let action = text::action_label(service);
    let mut succeeded: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for alias in &aliases {
        let resolution = resolver::resolve(&bot.cache, alias);
        let Some(entity_id) = resolution.primary.as_deref() else {
            log::warn!("Entity not found for name/ID: {alias}");
            errors.push(format!("{alias}: {}", text::entity_not_found()));
            continue;
        };

        if resolution.is_ambiguous() {
            log::warn!(
                "Multiple entities found for name '{alias}': {:?}, using first: {entity_id}",
                resolution.all_matches
            );
            warnings.push(text::multiple_entities_found(
                resolution.all_matches.len(),
                alias,
                entity_id,
            ));
        }

        let domain = extract_domain(entity_id);
        match bot
            .client
            .call_service(domain, service, Some(entity_id), Value::Null)
            .await
        {
            Ok(_) => succeeded.push(alias.clone()),
            Err(err) => {
                log::error!("Error calling {service} for {alias}: {err:#}");
                errors.push(format!("{alias}: {err:#}"));
            }
        }
    }

    let mut response = if succeeded.is_empty() {
        text::action_failed(action, &errors.join("\n"))
    } else if !errors.is_empty() {
        text::success_action_with_errors(action, succeeded.len(), &errors.join("\n"))
    } else {
        text::success_action(action, &succeeded.join(", "))
    };

    if !succeeded.is_empty() && !warnings.is_empty() {
        response.push_str("\n\n");
        response.push_str(&warnings.join("\n"));
    }

    response
}

/// Parsed `/climate` arguments
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClimateArgs {
    pub alias: String,
    pub mode: Option<&'static str>,
    pub temperature: Option<f64>,
}

fn mode_keyword(token: &str) -> Option<&'static str> {
    match token.to_lowercase().as_str() {
        "cool" | "制冷" => Some("cool"),
        "heat" | "制热" => Some("heat"),
        "fan" | "fan_only" | "通风" => Some("fan_only"),
        "off" | "关闭" => Some("off"),
        _ => None,
    }
}

fn is_numeric_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .filter(|c| *c != '.' && *c != '-')
            .all(|c| c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Parse `/climate` arguments: alias first (quoting allowed), then mode and
/// temperature in any order. The first mode keyword and the first numeric
/// token win; later ones are ignored. `temp <value>` is the explicit
/// two-token temperature form.
pub(crate) fn parse_climate(args: &str) -> Option<ClimateArgs> {
    let tokens = tokenizer::tokenize(args, "");
    let (alias, rest) = tokens.split_first()?;

    let mut mode: Option<&'static str> = None;
    let mut temperature: Option<f64> = None;

    let mut i = 0;
    while i < rest.len() {
        let token = &rest[i];
        if is_numeric_token(token) {
            if temperature.is_none() {
                temperature = token.parse().ok();
            }
        } else if token.eq_ignore_ascii_case("temp") && i + 1 < rest.len() {
            if temperature.is_none() {
                if let Ok(value) = rest[i + 1].parse() {
                    temperature = Some(value);
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if let Some(keyword) = mode_keyword(token) {
            if mode.is_none() {
                mode = Some(keyword);
            }
        }
        i += 1;
    }

    Some(ClimateArgs {
        alias: alias.clone(),
        mode,
        temperature,
    })
}

/// Handle `/climate <alias> [mode] [temperature]`
pub async fn climate(bot: &BotContext, args: &str) -> String {
    let Some(parsed) = parse_climate(args) else {
        return text::climate_usage().to_string();
    };

    let resolution = resolver::resolve(&bot.cache, &parsed.alias);
    let Some(entity_id) = resolution.primary.as_deref() else {
        log::warn!("Climate entity not found for name/ID: {}", parsed.alias);
        return text::entity_not_found().to_string();
    };

    let mut warning = None;
    if resolution.is_ambiguous() {
        warning = Some(text::multiple_entities_found(
            resolution.all_matches.len(),
            &parsed.alias,
            entity_id,
        ));
    }

    let mut results: Vec<String> = Vec::new();

    if let Some(mode) = parsed.mode {
        let call = if mode == "off" {
            bot.client
                .call_service("climate", "turn_off", Some(entity_id), Value::Null)
                .await
        } else {
            bot.client
                .call_service(
                    "climate",
                    "set_hvac_mode",
                    Some(entity_id),
                    json!({"hvac_mode": mode}),
                )
                .await
        };
        match call {
            Ok(_) => results.push(text::climate_mode_set(mode)),
            Err(err) => {
                log::error!("Error controlling climate device: {err:#}");
                return text::error_processing_command(&format!("{err:#}"));
            }
        }
    }

    if let Some(temperature) = parsed.temperature {
        match bot
            .client
            .call_service(
                "climate",
                "set_temperature",
                Some(entity_id),
                json!({"temperature": temperature}),
            )
            .await
        {
            Ok(_) => results.push(text::climate_temp_set(temperature)),
            Err(err) => {
                log::error!("Error controlling climate device: {err:#}");
                return text::error_processing_command(&format!("{err:#}"));
            }
        }
    }

    if results.is_empty() {
        return text::climate_no_params().to_string();
    }

    let mut response = results.join(" ");
    if let Some(warning) = warning {
        response.push('\n');
        response.push_str(&warning);
    }
    response
}

/// Handle `/script <id>`. Bare ids get the `script.` prefix added.
pub async fn run_script(bot: &BotContext, script_id: &str) -> String {
    if script_id.is_empty() {
        return text::script_usage().to_string();
    }

    let entity_id = if script_id.starts_with("script.") {
        script_id.to_string()
    } else {
        format!("script.{script_id}")
    };

    match bot
        .client
        .call_service("script", "turn_on", Some(&entity_id), Value::Null)
        .await
    {
        Ok(_) => text::script_executed(&entity_id),
        Err(err) => {
            log::error!("Error executing script {script_id}: {err:#}");
            text::script_execution_failed(script_id, &format!("{err:#}"))
        }
    }
}
