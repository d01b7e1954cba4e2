//! Reproducible `curl` command lines for failed requests

use reqwest::{Method, Url};
use std::collections::BTreeMap;

use super::request::Body;

/// Bodies longer than this are not inlined
pub const MAX_BODY_LENGTH: usize = 500;

const LONG_BODY_PLACEHOLDER: &str = "Long body string replaced here !";

/// Describe a request as a curl command
pub fn curlify(
    method: &Method,
    url: &str,
    headers: &BTreeMap<String, String>,
    basic_auth_user: Option<&str>,
    query: &[(String, String)],
    body: &Body,
) -> String {
    let mut parts = vec![format!("curl -X {}", method)];

    if let Some(user) = basic_auth_user {
        parts.push(format!("-u '{}:***'", user));
    }

    for (name, value) in headers {
        parts.push(format!("-H \"{}: {}\"", name, value));
    }

    match body {
        Body::Empty => {}
        Body::ZipFile { .. } => parts.push(format!("-F '{}'", body.describe())),
        _ => {
            if matches!(body, Body::Json(_)) {
                parts.push("-H \"Content-Type: application/json\"".to_string());
            }
            let rendered = body.describe();
            if rendered.len() > MAX_BODY_LENGTH {
                parts.push(format!("-d '{}'", LONG_BODY_PLACEHOLDER));
            } else {
                parts.push(format!("-d '{}'", rendered.replace('\'', "'\\''")));
            }
        }
    }

    parts.push(full_url(url, query));
    parts.join(" ")
}

fn full_url(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    match Url::parse_with_params(url, query) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    }
}
