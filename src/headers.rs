//! Outgoing header assembly.
//!
//! Precedence, lowest first: profile defaults, the request's `userAgent`,
//! caller headers, then the `Cookie` header built from the fetch's jar.
//! Matching is case-insensitive; the winning entry keeps its own casing.

/// Replace the first header named `name` (any case) or append it.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// First value of `name`, compared case-insensitively.
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Remove every header named `name`.
pub fn remove_header(headers: &mut Vec<(String, String)>, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

/// Merge profile defaults, the User-Agent override and caller headers.
///
/// A caller header takes the slot of the default it overrides; caller
/// headers with no default counterpart follow in caller order.
pub fn merge(
    defaults: &[(String, String)],
    user_agent: Option<&str>,
    caller: &[(String, String)],
) -> Vec<(String, String)> {
    let mut base = defaults.to_vec();
    if let Some(ua) = user_agent {
        set_header(&mut base, "User-Agent", ua);
    }

    let mut used = vec![false; caller.len()];
    let mut merged = Vec::with_capacity(base.len() + caller.len());
    for (name, value) in base {
        match caller.iter().position(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(idx) => {
                if !used[idx] {
                    used[idx] = true;
                    merged.push(caller[idx].clone());
                }
            }
            None => merged.push((name, value)),
        }
    }
    merged.extend(
        caller
            .iter()
            .zip(used)
            .filter(|(_, used)| !used)
            .map(|(header, _)| header.clone()),
    );
    merged
}

/// Add jar cookies, appending to a caller-supplied `Cookie` header if any.
pub fn with_cookies(mut headers: Vec<(String, String)>, cookies: Option<String>) -> Vec<(String, String)> {
    let Some(cookies) = cookies else {
        return headers;
    };
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case("cookie"))
    {
        Some(entry) if !entry.1.is_empty() => entry.1 = format!("{}; {}", entry.1, cookies),
        Some(entry) => entry.1 = cookies,
        None => headers.push(("Cookie".to_string(), cookies)),
    }
    headers
}

/// Stable sort by a lower-case name order. Unknown names go last in their
/// existing relative order. An empty order leaves the list untouched.
pub fn apply_order(mut headers: Vec<(String, String)>, order: &[String]) -> Vec<(String, String)> {
    if order.is_empty() {
        return headers;
    }
    headers.sort_by_key(|(name, _)| {
        order
            .iter()
            .position(|known| known.eq_ignore_ascii_case(name))
            .unwrap_or(order.len())
    });
    headers
}
