use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: String,
    allow: bool,
}

/// Parsed robots.txt for the origin being crawled.
///
/// Only `User-agent`, `Allow` and `Disallow` are honoured; a missing or
/// unreadable file allows everything.
#[derive(Debug, Default)]
pub struct RobotsTxt {
    /// Rules keyed by lowercased user-agent token
    groups: HashMap<String, Vec<Rule>>,
}

impl RobotsTxt {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Fetches `/robots.txt` for `url`'s origin
    pub async fn fetch(client: &reqwest::Client, url: &Url) -> Self {
        let Ok(robots_url) = url.join("/robots.txt") else {
            return Self::allow_all();
        };

        let response = match client.get(robots_url.as_str()).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::info!(
                    url = %robots_url,
                    status = %resp.status(),
                    "robots.txt not found, allowing all paths"
                );
                return Self::allow_all();
            }
            Err(e) => {
                tracing::info!(url = %robots_url, error = %e, "robots.txt unavailable, allowing all paths");
                return Self::allow_all();
            }
        };

        match response.text().await {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "Failed to read robots.txt body");
                Self::allow_all()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut groups: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group
                    if in_rules {
                        agents.clear();
                        in_rules = false;
                    }
                    let agent = value.to_lowercase();
                    groups.entry(agent.clone()).or_default();
                    agents.push(agent);
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if value.is_empty() {
                        continue;
                    }
                    let rule = Rule {
                        pattern: value.to_string(),
                        allow: field == "allow",
                    };
                    for agent in &agents {
                        groups.entry(agent.clone()).or_default().push(rule.clone());
                    }
                }
                _ => {}
            }
        }

        Self { groups }
    }

    pub fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let agent = user_agent.to_lowercase();
        let rules = self
            .groups
            .iter()
            .filter(|(key, _)| key.as_str() != "*" && agent.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, rules)| rules)
            .or_else(|| self.groups.get("*"));

        let Some(rules) = rules else {
            return true;
        };

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        // Longest matching pattern wins; allow wins ties
        rules
            .iter()
            .filter(|rule| pattern_matches(&rule.pattern, &target))
            .max_by_key(|rule| (rule.pattern.len(), rule.allow))
            .is_none_or(|rule| rule.allow)
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };

    let pieces: Vec<&str> = parts.collect();
    for (i, piece) in pieces.iter().enumerate() {
        let is_last = i == pieces.len() - 1;
        if is_last && anchored {
            return rest.ends_with(piece);
        }
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }

    !anchored || rest.is_empty()
}
