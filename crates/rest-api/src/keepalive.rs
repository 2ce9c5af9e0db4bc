//! Health check for load balancers and process supervisors.

use actix_web::{HttpResponse, web::{self, Data, ServiceConfig}};
use failure::Fail;
use log::warn;
use newsdesk_error::ApiError;
use newsdesk_models::{Workflow, store::Health};

use crate::Result;

/// Configure routes.
pub fn configure(app: &mut ServiceConfig) {
    app.route("/keepalive", web::get().to(keepalive));
}

/// Check whether this server can serve requests.
///
/// ## Method
///
/// ```text
/// GET /keepalive
/// ```
fn keepalive(workflow: Data<Workflow>) -> Result<HttpResponse> {
    let health = workflow.store().health()?;

    if !health.is_available() {
        warn!("Store is unavailable (health {:?})", health);
        return Err(StoreUnavailableError(health).into());
    }

    Ok(HttpResponse::Ok()
        .content_type("text/plain")
        .body("I'm all good!"))
}

#[derive(ApiError, Debug, Fail)]
#[api(internal)]
#[fail(display = "store is unavailable (health {:?})", _0)]
struct StoreUnavailableError(Health);
