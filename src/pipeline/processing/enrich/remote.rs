use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{rank_candidates, Candidate, Enricher, EnrichmentError};
use crate::app::ports::Cache;
use crate::config::{EnricherConfig, Settings};
use crate::constants::DEFAULT_CACHE_DAYS;
use crate::domain::Entity;
use crate::error::{PipelineError, Result};
use crate::idempotency::fingerprint;
use crate::pipeline::processing::cleaning::{CleanOptions, Cleaner};

const USER_AGENT: &str = concat!("entity_enrich/", env!("CARGO_PKG_VERSION"));

/// Matches against a third-party reference service over HTTP. Responses are
/// kept in the shared cache, keyed by a fingerprint of the request.
pub struct RemoteMatchEnricher {
    api: String,
    dataset: String,
    api_key: Option<String>,
    cache_days: u32,
    threshold: f64,
    limit: usize,
    client: Client,
    cache: Arc<dyn Cache>,
    cleaner: Cleaner,
    closed: bool,
}

/// Cache key of one request
pub fn request_key(method: &str, url: &str, body: &str) -> String {
    fingerprint(&[method, url, body])
}

impl RemoteMatchEnricher {
    pub fn new(config: &EnricherConfig, settings: &Settings, cache: Arc<dyn Cache>) -> Result<Self> {
        let api = config.require_str("api")?.trim_end_matches('/').to_string();
        let dataset = config.param_str("dataset").unwrap_or("default").to_string();
        let api_key = config
            .param_str("api_key")
            .map(str::to_string)
            .or_else(|| settings.api_key.clone());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(PipelineError::Http)?;
        Ok(Self {
            api,
            dataset,
            api_key,
            cache_days: config.param_u32("cache_days").unwrap_or(DEFAULT_CACHE_DAYS),
            threshold: config.threshold,
            limit: config.limit,
            client,
            cache,
            cleaner: Cleaner::default(),
            closed: false,
        })
    }

    pub fn match_url(&self) -> String {
        format!("{}/match/{}", self.api, self.dataset)
    }

    /// The nested entity endpoint, with the ID encoded as one path segment.
    pub fn entity_url(&self, id: &str) -> std::result::Result<String, EnrichmentError> {
        let invalid = |message: String| EnrichmentError::Response {
            url: self.api.clone(),
            message,
        };
        let mut url = reqwest::Url::parse(&self.api).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(&["entities", id]);
        url.set_query(Some("nested=true"));
        Ok(url.to_string())
    }

    fn fetch(&self, method: &str, url: &str, body: Option<String>) -> std::result::Result<Value, EnrichmentError> {
        let payload = body.as_deref().unwrap_or("");
        let key = request_key(method, url, payload);
        let cached = self
            .cache
            .get(&key, self.cache_days)
            .map_err(|e| EnrichmentError::Cache(e.to_string()))?;
        if let Some(text) = cached {
            debug!(%url, "Using cached response");
            return Ok(serde_json::from_str(&text)?);
        }

        let mut request = match body {
            Some(body) => self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
            None => self.client.get(url),
        };
        if let Some(api_key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", api_key));
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Response {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        let text = response.text()?;
        let value: Value = serde_json::from_str(&text)?;
        self.cache
            .set(&key, &text)
            .map_err(|e| EnrichmentError::Cache(e.to_string()))?;
        Ok(value)
    }
}

/// Turn a service entity into local entities. Nested entities in property
/// values become separate entities referenced by ID. The outer entity comes
/// first, followed by everything nested inside it.
pub fn flatten_entity(value: &Value, cleaner: &Cleaner, out: &mut Vec<Entity>) -> Option<String> {
    let obj = value.as_object()?;
    let schema = obj.get("schema")?.as_str()?;
    let mut entity = match Entity::new(schema) {
        Ok(entity) => entity,
        Err(_) => {
            warn!(schema, "Skipping remote entity with unknown schema");
            return None;
        }
    };
    entity.id = obj.get("id").and_then(Value::as_str).map(str::to_string);

    let position = out.len();
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (prop, values) in props {
            // Reverse references arrive nested under properties the outer
            // schema does not declare; the nested entity still gets imported.
            let known = entity.property(prop).is_ok();
            if !known {
                debug!(schema, prop = %prop, "Remote property not in schema");
            }
            for item in values.as_array().into_iter().flatten() {
                let text = match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => flatten_entity(item, cleaner, out),
                    _ => None,
                };
                match text {
                    Some(text) if known => {
                        if let Err(e) =
                            entity.add_with(cleaner, prop, Some(text.as_str()), CleanOptions::default())
                        {
                            debug!(error = %e, "Dropping remote value");
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    let id = entity.id.clone();
    out.insert(position, entity);
    id
}

impl Enricher for RemoteMatchEnricher {
    fn name(&self) -> &str {
        "remote"
    }

    fn match_entity(&mut self, entity: &Entity) -> std::result::Result<Vec<Candidate>, EnrichmentError> {
        let url = self.match_url();
        let body = json!({ "queries": { "entity": entity.to_data() } }).to_string();
        let response = self.fetch("POST", &url, Some(body))?;
        let results = response
            .pointer("/responses/entity/results")
            .and_then(Value::as_array)
            .ok_or_else(|| EnrichmentError::Response {
                url: url.clone(),
                message: "missing match results".to_string(),
            })?;

        let mut candidates = Vec::new();
        for result in results {
            let score = result.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let mut flat = Vec::new();
            flatten_entity(result, &self.cleaner, &mut flat);
            if let Some(candidate) = flat.into_iter().next() {
                candidates.push(Candidate::new(candidate, score));
            }
        }
        Ok(rank_candidates(candidates, self.threshold, self.limit))
    }

    fn expand(
        &mut self,
        _entity: &Entity,
        matched: &Entity,
    ) -> std::result::Result<Vec<Entity>, EnrichmentError> {
        let id = matched.id.as_deref().ok_or_else(|| EnrichmentError::Response {
            url: self.api.clone(),
            message: format!("match has no ID: {}", matched),
        })?;
        let url = self.entity_url(id)?;
        let response = self.fetch("GET", &url, None)?;
        let mut expanded = Vec::new();
        flatten_entity(&response, &self.cleaner, &mut expanded);
        Ok(expanded)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.cache.flush() {
            warn!(error = %e, "Failed to flush cache on close");
        }
    }
}
