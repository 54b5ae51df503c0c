use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn eprint_json(value: &serde_json::Value) {
    eprintln!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Print a structured CLI error to stderr and exit with status 1.
pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprint_json(&err);
    std::process::exit(1);
}

/// Exit status for an HTTP status: 0=2xx, 1=4xx, 2=anything else.
pub fn exit_code_for_status(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// Call the API, print the JSON response, return the structured exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{}{path}", api_url.trim_end_matches('/'))) {
        Ok(url) => url,
        Err(e) => {
            eprint_json(&json!({
                "error": "cli_error",
                "message": format!("Invalid URL: {api_url}{path}: {e}")
            }));
            return 1;
        }
    };

    let mut req = client().request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            eprint_json(&json!({
                "error": "connection_error",
                "message": e.to_string(),
                "docs_hint": "Is the API server running? Check --api-url or CALMLINE_API_URL."
            }));
            return 3;
        }
    };

    let exit_code = exit_code_for_status(resp.status().as_u16());
    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    if exit_code == 0 {
        print_json(&resp_body);
    } else {
        eprint_json(&resp_body);
    }
    exit_code
}
