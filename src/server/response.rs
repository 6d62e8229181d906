use http::StatusCode;
use may_minihttp::Response;
use serde_json::{json, Value};

fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Write `body` as `application/json` with `status`.
pub fn write_json(res: &mut Response, status: u16, body: &Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.header("Cache-Control: no-store");
    res.body_vec(body.to_string().into_bytes());
}

/// Write `{"ok":false,"error":code}`.
pub fn write_json_error(res: &mut Response, status: u16, code: &str) {
    write_json(res, status, &error_body(code));
}

pub fn error_body(code: &str) -> Value {
    json!({ "ok": false, "error": code })
}
