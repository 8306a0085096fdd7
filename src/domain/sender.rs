//! Sender domain normalization.
//!
//! Maps a raw `From` header to the registrable domain used as the
//! aggregation key. The effective-TLD handling is a heuristic: a domain
//! whose second-to-last label is one of a handful of generic words
//! (`co.uk`, `com.au`, `org.br`, ...) keeps three labels, everything else
//! keeps two. It is not a public-suffix-list lookup, so suffixes such as
//! `ac.uk` or `github.io` fold to the suffix itself.

use super::SenderDomain;

/// Second-level labels treated as part of a two-level public suffix.
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "edu"];

/// Normalizes a `From` header value to a [`SenderDomain`].
///
/// Total and deterministic: `None`, empty input and input without an `@`
/// map to [`SenderDomain::unknown`].
///
/// # Example
///
/// ```
/// use mailsweep::domain::normalize_domain;
///
/// let domain = normalize_domain(Some("Promo <deals@news.example.co.uk>"));
/// assert_eq!(domain.as_str(), "example.co.uk");
/// ```
pub fn normalize_domain(header: Option<&str>) -> SenderDomain {
    let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) else {
        return SenderDomain::unknown();
    };

    let address = bracketed_address(header).unwrap_or(header);

    let Some((_, host)) = address.rsplit_once('@') else {
        return SenderDomain::unknown();
    };

    let host = host
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '\''))
        .trim_end_matches('.')
        .to_lowercase();
    if host.is_empty() {
        return SenderDomain::unknown();
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return SenderDomain(host);
    }

    let second_to_last = labels[labels.len() - 2];
    let keep = if SECOND_LEVEL_SUFFIXES.contains(&second_to_last) {
        3
    } else {
        2
    };

    SenderDomain(labels[labels.len() - keep..].join("."))
}

/// Extracts `addr` from the first `<addr>` pair that holds an address.
fn bracketed_address(header: &str) -> Option<&str> {
    let mut rest = header;
    while let Some(start) = rest.find('<') {
        let end = start + rest[start..].find('>')?;
        let inner = rest[start + 1..end].trim();
        if inner.contains('@') {
            return Some(inner);
        }
        rest = &rest[end + 1..];
    }
    None
}
