//! Utility functions for identity attributes and HTML output.

/// Normalise an email for lookups: trimmed and lower-cased.
///
/// # Examples
///
/// ```
/// use relay_auth::utils::normalize_email;
///
/// assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
/// ```
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Collapse runs of whitespace into single spaces and trim the ends.
///
/// # Examples
///
/// ```
/// use relay_auth::utils::squish;
///
/// assert_eq!(squish("  Ada   Lovelace "), "Ada Lovelace");
/// assert_eq!(squish(" \t "), "");
/// ```
#[must_use]
pub fn squish(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive a local uid from a provider's external identifier.
///
/// Only configured prefixes are stripped; any other identifier is kept
/// whole (trimmed), so identifiers from different issuers stay distinct.
///
/// # Examples
///
/// ```
/// use relay_auth::utils::derive_uid;
///
/// let prefixes = vec!["https://openid.intuit.com/".to_string()];
/// assert_eq!(derive_uid("https://openid.intuit.com/abc", &prefixes), "abc");
/// assert_eq!(derive_uid("https://openid.acme.com/42", &prefixes), "https://openid.acme.com/42");
/// assert_eq!(derive_uid("12345", &prefixes), "12345");
/// ```
#[must_use]
pub fn derive_uid(external_uid: &str, prefixes: &[String]) -> String {
    let trimmed = external_uid.trim();

    prefixes
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix.as_str()).filter(|rest| !rest.is_empty()))
        .unwrap_or(trimmed)
        .to_string()
}

/// Escape text for inclusion in HTML element content or attributes.
///
/// # Examples
///
/// ```
/// use relay_auth::utils::escape_html;
///
/// assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;");
/// ```
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Serialise a JSON value so it can be embedded inside a `<script>` block.
///
/// `<`, `>`, `&` and the JavaScript line separators are written as unicode
/// escapes, so no value can close the script element.
#[must_use]
pub fn script_safe_json(value: &serde_json::Value) -> String {
    let json = value.to_string();
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            _ => escaped.push(c),
        }
    }
    escaped
}
