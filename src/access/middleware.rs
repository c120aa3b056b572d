// Per-handler access check for /api routes
use actix_web::HttpRequest;
use log::debug;

use crate::access::{AccessGate, AccessVerdict, RequestMeta};
use crate::error::VfsError;

/// Consult `gate` before running an administrative operation
pub fn require_access(req: &HttpRequest, gate: &dyn AccessGate) -> Result<(), VfsError> {
    let meta = RequestMeta::from_request(req);
    match gate.verify(&meta) {
        AccessVerdict::Allow => {
            debug!("{} allowed {} {}", gate.name(), meta.method, meta.path);
            Ok(())
        }
        AccessVerdict::Deny => Err(VfsError::Unauthorized),
    }
}
