//! Newsdesk's REST API.

use actix_web::web::{self, ServiceConfig};

mod articles;
mod config;
mod keepalive;
mod logins;

pub use self::config::Config;

pub type Result<T, E=newsdesk_error::Error> = std::result::Result<T, E>;

/// Configure [`App`] for an API server.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg
        .service(web::scope("/api")
            .configure(articles::configure)
            .configure(logins::configure)
        )
    ;
    keepalive::configure(cfg);
}
