//! Server address normalization.

/// Normalize a list of server addresses for a backend.
///
/// Empty entries are dropped, `scheme` (e.g. `"nats://"`) is prepended to any
/// entry that lacks it, and an empty result falls back to `default`.
pub fn normalize_addresses<I, S>(addrs: I, scheme: &str, default: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = addrs
        .into_iter()
        .filter_map(|addr| {
            let addr = addr.as_ref();
            if addr.is_empty() {
                None
            } else if addr.starts_with(scheme) {
                Some(addr.to_string())
            } else {
                Some(format!("{}{}", scheme, addr))
            }
        })
        .collect();

    if normalized.is_empty() {
        normalized.push(default.to_string());
    }

    normalized
}

/// First address of a normalized list, or `""` when there is none.
pub fn first_address(addrs: &[String]) -> &str {
    addrs.first().map(String::as_str).unwrap_or("")
}
