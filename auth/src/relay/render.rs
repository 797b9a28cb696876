//! Response bodies for the three relay outcomes.

use crate::constants::params;
use crate::utils::{escape_html, script_safe_json};
use serde_json::{Map, Value};
use url::Url;

/// Page that hands `payload` to the window that opened it, then closes.
///
/// The payload is posted to `window.opener` as soon as the page loads, and
/// again to any window that asks with a `"requestCredentials"` message
/// (in-app browsers without an opener poll this way).
#[must_use]
pub fn post_message_page(payload: &Value, target_origin: &str) -> String {
    let data = script_safe_json(payload);
    let origin = script_safe_json(&Value::String(target_origin.to_string()));

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Signing in</title></head>
<body>
<script>
  var data = {data};
  var targetOrigin = {origin};
  window.addEventListener("message", function (ev) {{
    if (ev.data === "requestCredentials") {{
      ev.source.postMessage(data, targetOrigin);
      window.close();
    }}
  }});
  if (window.opener) {{
    window.opener.postMessage(data, targetOrigin);
    window.close();
  }}
</script>
</body>
</html>
"#
    )
}

/// Minimal page showing nothing but `message`.
#[must_use]
pub fn fallback_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body><p>{}</p></body>
</html>
"#,
        escape_html(message)
    )
}

/// `origin_url` with every scalar of `payload` and `blank=true` appended
/// as query parameters. Existing query parameters are kept.
#[must_use]
pub fn redirect_location(origin_url: &Url, payload: &Map<String, Value>) -> String {
    let mut url = origin_url.clone();
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in payload {
            match value {
                Value::Null | Value::Array(_) | Value::Object(_) => {}
                Value::String(s) => {
                    query.append_pair(key, s);
                }
                other => {
                    query.append_pair(key, &other.to_string());
                }
            }
        }
        query.append_pair(params::BLANK, "true");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_message_page_embeds_payload_safely() {
        let payload = json!({"message": "authFailure", "error": "</script><b>"});
        let html = post_message_page(&payload, "https://app.example.com");

        assert!(html.contains("postMessage(data, targetOrigin)"));
        assert!(html.contains("\"https://app.example.com\""));
        assert!(html.contains("authFailure"));
        assert!(!html.contains("</script><b>"));
    }

    #[test]
    fn test_fallback_page_escapes_message() {
        let html = fallback_page("<img src=x onerror=alert(1)>");

        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn test_redirect_location_appends_scalars_and_blank() {
        let origin = Url::parse("https://app.example.com/done?keep=1").unwrap();
        let payload = json!({
            "auth_token": "t o&k",
            "expiry": 1_700_000_000,
            "oauth_registration": true,
            "name": null,
        });
        let location = redirect_location(&origin, payload.as_object().unwrap());
        let url = Url::parse(&location).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("app.example.com"));
        assert!(pairs.contains(&("keep".into(), "1".into())));
        assert!(pairs.contains(&("auth_token".into(), "t o&k".into())));
        assert!(pairs.contains(&("expiry".into(), "1700000000".into())));
        assert!(pairs.contains(&("oauth_registration".into(), "true".into())));
        assert!(pairs.contains(&("blank".into(), "true".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "name"));
    }
}
