//! Home Assistant REST API client
//!
//! Handles all HTTP communication with the Home Assistant REST API,
//! including the conversation endpoint and the template side-channel
//! used for area information.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::RuntimeContext;

/// Jinja template evaluated server-side to map every entity to its area name.
/// Per-entity area assignment is not reliably present on state attributes,
/// so this side-channel is the only dependable source.
const ENTITY_AREAS_TEMPLATE: &str = r#"
{
  "entities": [
    {%- for entity_id in states | map(attribute='entity_id') | list -%}
    {
      "entity_id": "{{ entity_id }}",
      "area": "{{ area_name(entity_id) if area_name(entity_id) else '' }}"
    }{%- if not loop.last -%},{%- endif -%}
    {%- endfor -%}
  ]
}
"#;

/// Jinja template listing the area registry (id and display name).
const AREAS_TEMPLATE: &str = r#"
{
  "areas": [
    {%- for area_id in areas() -%}
    {
      "area_id": "{{ area_id }}",
      "name": "{{ area_name(area_id) }}"
    }{%- if not loop.last -%},{%- endif -%}
    {%- endfor -%}
  ]
}
"#;

/// Home Assistant REST API client
pub struct HassClient {
    client: Client,
    base_url: String,
    token: String,
    agent_id: String,
}

impl HassClient {
    /// Create a new Home Assistant client from runtime context
    pub fn new(ctx: &RuntimeContext) -> Result<Self> {
        let base_url = ctx.ha_url().to_string();
        let token = ctx.ha_token()?.to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(ctx.config.homeassistant.timeout))
            .user_agent(format!("habridge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token,
            agent_id: ctx.config.homeassistant.agent_id.clone(),
        })
    }

    /// Make a GET request to the API
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        self.handle_response(response).await
    }

    /// Make a POST request to the API
    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}/api{}", self.base_url, path);
        log::debug!("POST {} {:?}", url, body);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.status_to_error(status, &url, &error_text));
        }

        response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))
    }

    fn status_to_error(&self, status: StatusCode, url: &str, body: &str) -> anyhow::Error {
        let hint = match status {
            StatusCode::UNAUTHORIZED => "Check your Home Assistant token",
            StatusCode::FORBIDDEN => "Your token may not have sufficient permissions",
            StatusCode::NOT_FOUND => "The requested resource was not found",
            StatusCode::SERVICE_UNAVAILABLE => "Home Assistant may be starting up or restarting",
            StatusCode::BAD_REQUEST => "Invalid request parameters",
            _ => "",
        };

        let msg = if body.is_empty() {
            format!("HTTP {status} from {url}")
        } else {
            format!("HTTP {status} from {url}: {body}")
        };

        if hint.is_empty() {
            anyhow!(msg)
        } else {
            anyhow!("{msg}\nHint: {hint}")
        }
    }

    // --- API Methods ---

    /// Get all entity states
    pub async fn get_states(&self) -> Result<Vec<EntityState>> {
        self.get("/states").await
    }

    /// Call a service, targeting an entity with optional extra parameters
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: Option<&str>,
        params: Value,
    ) -> Result<Value> {
        let mut body = match params {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(anyhow!("service params must be an object, got {other}"));
            }
        };
        if let Some(id) = entity_id {
            body.insert("entity_id".to_string(), json!(id));
        }

        log::info!("Calling service {domain}.{service} (entity_id={entity_id:?})");
        self.post(&format!("/services/{domain}/{service}"), &Value::Object(body))
            .await
    }

    /// Render a template server-side and parse the JSON it produces
    async fn render_json_template(&self, template: &str) -> Result<Value> {
        let body = json!({ "template": template });
        let url = format!("{}/api/template", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.status_to_error(status, &url, &error_text));
        }

        let text = response.text().await.context("reading template response")?;
        serde_json::from_str(&text).context("parsing template output as JSON")
    }

    /// Get entity_id -> area display name for every entity
    pub async fn get_entity_areas(&self) -> Result<HashMap<String, String>> {
        let value = self.render_json_template(ENTITY_AREAS_TEMPLATE).await?;

        let mut entity_areas = HashMap::new();
        if let Some(entities) = value.get("entities").and_then(|v| v.as_array()) {
            for entry in entities {
                let Some(entity_id) = entry.get("entity_id").and_then(|v| v.as_str()) else {
                    continue;
                };
                let area = entry.get("area").and_then(|v| v.as_str()).unwrap_or("");
                entity_areas.insert(entity_id.to_string(), area.to_string());
            }
        }

        let with_area = entity_areas.values().filter(|a| !a.is_empty()).count();
        log::info!(
            "Entity areas: {}/{} entities have an area",
            with_area,
            entity_areas.len()
        );
        Ok(entity_areas)
    }

    /// Get the area registry (best-effort; template API may be unavailable)
    pub async fn get_areas(&self) -> Result<HashMap<String, Area>> {
        let value = self.render_json_template(AREAS_TEMPLATE).await?;

        let mut areas = HashMap::new();
        if let Some(entries) = value.get("areas").and_then(|v| v.as_array()) {
            for entry in entries {
                let Some(area_id) = entry.get("area_id").and_then(|v| v.as_str()) else {
                    continue;
                };
                let name = entry
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(area_id);
                areas.insert(
                    area_id.to_string(),
                    Area {
                        name: name.to_string(),
                    },
                );
            }
        }
        Ok(areas)
    }

    /// Send a free-form text turn to the conversation agent
    pub async fn process_conversation(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<Value> {
        let mut payload = json!({
            "text": text,
            "agent_id": self.agent_id,
        });
        if let Some(id) = conversation_id {
            payload["conversation_id"] = json!(id);
        }

        log::info!(
            "Sending conversation request: {}...",
            text.chars().take(50).collect::<String>()
        );
        self.post("/conversation/process", &payload).await
    }
}

// --- API Types ---

/// One entity's state snapshot, with attributes kept semi-structured
/// because upstream entities legitimately carry heterogeneous attribute sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
}

impl EntityState {
    /// Domain prefix before the first dot (empty if the id has no dot)
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }

    /// Object id after the last dot
    pub fn object_id(&self) -> &str {
        self.entity_id
            .rsplit('.')
            .next()
            .unwrap_or(&self.entity_id)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        let value = self.attributes.get(key)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attr_str("friendly_name")
    }

    pub fn device_id(&self) -> Option<&str> {
        self.attr_str("device_id")
    }

    pub fn area_id(&self) -> Option<&str> {
        self.attr_str("area_id")
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.attr_str("unit_of_measurement")
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attr_str("device_class")
    }

    /// All registry aliases carried on this entity. The alias-bearing keys
    /// may hold a single string or a list of strings.
    pub fn aliases(&self) -> Vec<String> {
        let mut out = Vec::new();
        for key in ["aliases", "alias", "device_aliases"] {
            match self.attributes.get(key) {
                Some(Value::String(s)) if !s.is_empty() => out.push(s.clone()),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            out.push(s.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// A named physical zone from the area registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
}
