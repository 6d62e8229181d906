use super::request::{parse_request, ParsedRequest};
use super::response::{write_json, write_json_error};
use crate::progress::ProgressStore;
use crate::runtime_config::ConfigError;
use crate::security::BearerAuthenticator;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::{error, info};

/// HTTP surface of the progress service.
///
/// `auth` is `Err` when no trusted audience is configured; the service still
/// answers `/health` and reports the misconfiguration on `/progress` with a
/// `500`, never a `401`.
#[derive(Clone)]
pub struct ProgressService {
    pub auth: Result<Arc<BearerAuthenticator>, ConfigError>,
    pub store: Arc<dyn ProgressStore>,
}

impl ProgressService {
    pub fn new(auth: Arc<BearerAuthenticator>, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            auth: Ok(auth),
            store,
        }
    }

    /// Service that rejects every `/progress` call with `err`.
    pub fn misconfigured(err: ConfigError, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            auth: Err(err),
            store,
        }
    }

    fn progress(&self, req: &ParsedRequest, res: &mut Response) {
        if req.method != "GET" {
            write_json_error(res, 405, "method_not_allowed");
            return;
        }

        let auth = match &self.auth {
            Ok(auth) => auth,
            Err(err) => {
                error!(error = %err, "Progress request with no trusted audience configured");
                write_json_error(res, 500, err.code());
                return;
            }
        };

        let claims = match auth.authenticate(req.header("authorization")) {
            Ok(claims) => claims,
            Err(err) => {
                write_json_error(res, 401, err.code());
                return;
            }
        };

        match self.store.load_progress(&claims.subject) {
            Ok(progress) => {
                info!(sub = %claims.subject, "Progress served");
                write_json(
                    res,
                    200,
                    &json!({
                        "ok": true,
                        "user": { "userId": claims.subject, "email": claims.email },
                        "progress": progress,
                    }),
                );
            }
            Err(err) => {
                error!(sub = %claims.subject, error = %format!("{err:#}"), "Progress store failed");
                write_json_error(res, 500, "progress_unavailable");
            }
        }
    }
}

/// Basic health check endpoint returning `{ "status": "ok" }`.
pub fn health_endpoint(res: &mut Response) {
    write_json(res, 200, &json!({ "status": "ok" }));
}

impl HttpService for ProgressService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let req = parse_request(req);
        match req.path.as_str() {
            "/health" => health_endpoint(res),
            "/progress" => self.progress(&req, res),
            _ => write_json_error(res, 404, "not_found"),
        }
        Ok(())
    }
}
