use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::catalog::{PatternCatalog, SCANNER_USER_AGENTS};
use crate::{EventType, RequestSnapshot, Severity, ThreatFinding};

/// Inspector de peticiones HTTP contra el catálogo de patrones.
///
/// La inspección es pura: no muta estado, no falla y devuelve a lo sumo un
/// hallazgo por categoría. Una petición malformada produce una lista vacía,
/// nunca un error.
pub struct RequestInspector {
    catalog: Arc<PatternCatalog>,
}

impl RequestInspector {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Evalúa todas las categorías del catálogo más las heurísticas de
    /// user agent y content type.
    pub fn detect_threats(&self, request: &RequestSnapshot) -> Vec<ThreatFinding> {
        let surface = build_surface(request);
        let mut findings = Vec::new();

        for category in self.catalog.categories() {
            if let Some(pattern) = category.first_match(&surface) {
                debug!(
                    category = category.event_type.as_str(),
                    pattern = pattern.name.as_str(),
                    "Threat pattern matched"
                );
                findings.push(ThreatFinding {
                    event_type: category.event_type,
                    severity: category.severity,
                    description: category.description.clone(),
                    details: json!({
                        "pattern": pattern.name,
                        "path": request.path,
                    }),
                });
            }
        }

        if let Some(finding) = check_user_agent(request) {
            findings.push(finding);
        }
        if let Some(finding) = check_content_type(request) {
            findings.push(finding);
        }

        findings
    }
}

/// Une url, path, query, body y parámetros de ruta en una sola superficie
/// decodificada y en minúsculas.
fn build_surface(request: &RequestSnapshot) -> String {
    let combined = format!(
        "{} {} {} {} {}",
        request.url,
        request.path,
        serialize_field(&request.query),
        serialize_field(&request.body),
        serialize_field(&request.route_params),
    );
    let url_decoded =
        urlencoding::decode(&combined).unwrap_or(std::borrow::Cow::Borrowed(combined.as_str()));
    let entity_decoded = html_escape::decode_html_entities(url_decoded.as_ref());
    entity_decoded.to_lowercase()
}

fn serialize_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_user_agent(request: &RequestSnapshot) -> Option<ThreatFinding> {
    let user_agent = request.user_agent()?.to_lowercase();
    let token = SCANNER_USER_AGENTS
        .iter()
        .find(|candidate| user_agent.contains(*candidate))?;
    Some(ThreatFinding {
        event_type: EventType::SuspiciousUserAgent,
        severity: Severity::Low,
        description: EventType::SuspiciousUserAgent.describe().to_string(),
        details: json!({
            "user_agent": request.user_agent(),
            "matched_token": token,
        }),
    })
}

fn check_content_type(request: &RequestSnapshot) -> Option<ThreatFinding> {
    if !request.method.eq_ignore_ascii_case("get") {
        return None;
    }
    let content_type = request.content_type()?.to_lowercase();
    let suspicious = content_type.contains("application/x-www-form-urlencoded")
        || content_type.contains("multipart/form-data");
    if !suspicious {
        return None;
    }
    Some(ThreatFinding {
        event_type: EventType::SuspiciousContentType,
        severity: Severity::Low,
        description: EventType::SuspiciousContentType.describe().to_string(),
        details: json!({
            "method": request.method,
            "content_type": request.content_type(),
        }),
    })
}
