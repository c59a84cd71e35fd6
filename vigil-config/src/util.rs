/// Resolves a variable name to its value, if set.
pub type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// [`EnvLookup`] backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Looks `name` up and drops blank values.
pub fn non_blank(lookup: &EnvLookup, name: &str) -> Option<String> {
    lookup(name).filter(|raw| !raw.trim().is_empty())
}

pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_var(lookup: &EnvLookup, name: &str) -> Option<bool> {
    lookup(name).and_then(|raw| parse_bool(&raw))
}
