use url::{Host, Url};

/// Query parameters that only carry campaign tracking data
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "msclkid"];

/// Second-level suffixes under which registrations happen one label deeper
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "com.br", "co.in", "co.za", "com.mx",
];

/// Canonical form of a URL used as the crawl's visited-set key.
///
/// Drops the fragment, tracking parameters and an empty query, and trims a
/// trailing slash from non-root paths. Only http and https URLs canonicalize.
pub fn canonicalize(url: &Url) -> Option<Url> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    let mut url = url.clone();
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url)
}

/// Parses and canonicalizes in one step
pub fn canonicalize_str(raw: &str) -> Option<Url> {
    Url::parse(raw.trim()).ok().and_then(|u| canonicalize(&u))
}

/// The registrable part of a host, e.g. `blog.example.co.uk` → `example.co.uk`.
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            let labels: Vec<&str> = domain.split('.').collect();
            if labels.len() <= 2 {
                return Some(domain);
            }

            let last_two = labels[labels.len() - 2..].join(".");
            let keep = if SECOND_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
                3
            } else {
                2
            };
            Some(labels[labels.len() - keep..].join("."))
        }
    }
}

/// Whether two URLs belong to the same site
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (registrable_domain(a), registrable_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
