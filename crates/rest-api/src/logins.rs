use actix_web::{
    HttpResponse,
    web::{self, Data, Json, Query, ServiceConfig},
};
use failure::Fail;
use newsdesk_error::ApiError;
use newsdesk_models::{
    Login,
    Workflow,
    audit::Actor,
    permissions::{ManageLogins, Roles},
};
use newsdesk_util::SealingError;
use newsdesk_web::{MissingArgumentError, Secret, Session, SessionManager};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Configure routes.
pub fn configure(app: &mut ServiceConfig) {
    app
        .route("/login", web::get().to(login))
        .service(web::scope("/login")
            .route("/create", web::get().to(create_login))
            .route("/update", web::get().to(update_login))
            .route("/delete", web::get().to(delete_login))
        )
    ;
}

#[derive(Deserialize)]
struct LoginParams {
    username: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

impl LoginParams {
    fn username(&self) -> Result<&str> {
        required(&self.username, "username")
    }

    fn password(&self) -> Result<&str> {
        required(&self.password, "password")
    }

    fn roles(&self) -> Result<Option<Roles>> {
        match self.role {
            Some(ref names) => Ok(Some(names.parse()?)),
            None => Ok(None),
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
    match value.as_ref().map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MissingArgumentError(name).into()),
    }
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

/// Authenticate and obtain a session token.
///
/// ## Method
///
/// ```text
/// GET /api/login?username=<name>&password=<password>
/// ```
fn login(workflow: Data<Workflow>, secret: Data<Secret>, params: Query<LoginParams>)
-> Result<Json<TokenResponse>> {
    let username = params.username()?;
    let password = params.password.as_ref().map(String::as_str).unwrap_or("");

    let login = Login::authenticate(workflow.store(), username, password)?;
    let token = SessionManager::issue(&secret, &login).map_err(IssueTokenError)?;

    Ok(Json(TokenResponse { token }))
}

#[derive(ApiError, Debug, Fail)]
#[api(internal)]
#[fail(display = "cannot issue session token: {}", _0)]
struct IssueTokenError(#[cause] SealingError);

/// Create a new login.
///
/// ## Method
///
/// ```text
/// GET /api/login/create?username=<name>&password=<password>&role=<roles>
/// ```
fn create_login(
    workflow: Data<Workflow>,
    session: Session<ManageLogins>,
    params: Query<LoginParams>,
) -> Result<HttpResponse> {
    let roles = params.roles()?.unwrap_or_else(Roles::empty);

    Login::create(
        workflow.store(),
        Actor::User(session.user()),
        params.username()?,
        params.password()?,
        roles,
    )?;

    Ok(HttpResponse::Ok().content_type("text/plain").finish())
}

/// Change password or roles of a login.
///
/// Arguments which are not given are left unchanged.
///
/// ## Method
///
/// ```text
/// GET /api/login/update?username=<name>[&password=<password>][&role=<roles>]
/// ```
fn update_login(
    workflow: Data<Workflow>,
    session: Session<ManageLogins>,
    params: Query<LoginParams>,
) -> Result<HttpResponse> {
    let store = workflow.store();
    let roles = params.roles()?;
    let mut login = Login::by_name(store, params.username()?)?;

    if let Some(ref password) = params.password {
        login.set_password(store, Actor::User(session.user()), password)?;
    }

    if let Some(roles) = roles {
        login.set_roles(store, Actor::User(session.user()), roles)?;
    }

    Ok(HttpResponse::Ok().content_type("text/plain").finish())
}

/// Delete a login.
///
/// Tokens issued for it stay valid until they expire.
///
/// ## Method
///
/// ```text
/// GET /api/login/delete?username=<name>
/// ```
fn delete_login(
    workflow: Data<Workflow>,
    session: Session<ManageLogins>,
    params: Query<LoginParams>,
) -> Result<HttpResponse> {
    let login = Login::by_name(workflow.store(), params.username()?)?;
    login.delete(workflow.store(), Actor::User(session.user()))?;

    Ok(HttpResponse::Ok().content_type("text/plain").finish())
}
