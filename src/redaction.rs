use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(bearer)\s+[A-Za-z0-9_\-\.=]{6,}").expect("valid regex"),
        Regex::new(r#"(?i)\b(access[_-]?token|api[_-]?key|token|secret|password)\s*[:=]\s*["']?[A-Za-z0-9_\-\.]{6,}["']?"#)
            .expect("valid regex"),
        Regex::new(r"\b(dapi)[A-Fa-f0-9]{32}(-\d+)?\b").expect("valid regex"),
    ]
});

/// Scrubs warehouse credentials from text before it reaches a log line or
/// the browser. The configured token is removed verbatim; well-known token
/// shapes are removed even when they are not the configured one.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    known_secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.known_secrets.push(secret.to_string());
        }
        self
    }

    pub fn redact(&self, input: &str) -> String {
        let mut result = input.to_string();
        for secret in &self.known_secrets {
            if result.contains(secret.as_str()) {
                result = result.replace(secret.as_str(), "[REDACTED]");
            }
        }

        for pattern in SECRET_PATTERNS.iter() {
            if !pattern.is_match(&result) {
                continue;
            }
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| {
                    let key = caps.get(1).map(|m| m.as_str()).unwrap_or("secret");
                    if key.eq_ignore_ascii_case("bearer") {
                        "Bearer [REDACTED]".to_string()
                    } else if key == "dapi" {
                        "[REDACTED]".to_string()
                    } else {
                        format!("{}=[REDACTED]", key.to_ascii_lowercase())
                    }
                })
                .to_string();
        }

        result
    }
}
