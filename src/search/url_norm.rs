//! URL Normalization
//!
//! Canonical form used for run-wide deduplication: lowercased host,
//! fragment removed, known tracking parameters stripped, trailing slash
//! removed. Normalization is idempotent.

use url::Url;

/// Query parameters that never change page identity.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "igshid", "mc_cid", "mc_eid", "ref", "ref_src",
];

/// Normalize a URL for deduplication. Unparseable input is returned
/// trimmed, so the function stays total and idempotent.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    // Host lowercasing is handled by the parser; normalize the rest.
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_ascii_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let mut out = url.to_string();
    while out.ends_with('/') {
        out.pop();
    }
    out
}
