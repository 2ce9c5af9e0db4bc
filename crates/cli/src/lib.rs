use failure::Error;
use newsdesk_web::TOKEN_HEADER;
use sentry::protocol::Event;
use std::{env, mem, path::PathBuf, sync::Arc};
use structopt::StructOpt;

mod config;
mod server;
mod store;
mod user;
mod util;

use self::config::Config;

pub type Result<T, E=Error> = std::result::Result<T, E>;

#[derive(StructOpt)]
#[structopt(name = "newsdesk")]
struct Opts {
    /// Path to the configuration file
    #[structopt(long = "config", short = "c", default_value = "config.toml", parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Manage server
    #[structopt(name = "server")]
    Server(server::Opts),
    /// Manage logins
    #[structopt(name = "user")]
    User(user::Opts),
    /// Manage the document store
    #[structopt(name = "store")]
    Store(store::Opts),
}

pub fn main() -> Result<(), Error> {
    let opts = Opts::from_args();
    let config = config::load(&opts.config)?;

    setup_sentry(&config);
    setup_logging(&config.logging)?;

    match opts.command {
        Command::Server(opts) => server::main(config, opts),
        Command::User(opts) => user::main(&config, opts),
        Command::Store(opts) => store::main(&config, opts),
    }
}

fn setup_sentry(config: &Config) {
    if let Some(ref sentry) = config.sentry {
        env::set_var("RUST_BACKTRACE", "1");
        mem::forget(sentry::init((sentry.dsn.as_str(), sentry::ClientOptions {
            trim_backtraces: true,
            debug: cfg!(debug_assertions),
            release: Some(env!("CARGO_PKG_VERSION").into()),
            server_name: Some(config.server.domain.clone().into()),
            before_send: Some(Arc::new(Box::new(before_send_event_to_sentry))),
            .. Default::default()
        })));
        sentry::integrations::panic::register_panic_handler();
    }
}

fn setup_logging(config: &config::Logging) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.level);

    if let Some(level) = config.network {
        builder.filter_module("actix_web", level);
    }

    if let Some(level) = config.audit {
        builder.filter_module(newsdesk_models::audit::TARGET, level);
    }

    for (module, level) in &config.filters {
        builder.filter_module(&module, *level);
    }

    builder.try_init()?;

    Ok(())
}

fn before_send_event_to_sentry(mut ev: Event<'static>) -> Option<Event<'static>> {
    if let Some(ref mut request) = ev.request {
        let tokens = request.headers.keys()
            .filter(|name| name.eq_ignore_ascii_case(TOKEN_HEADER))
            .cloned()
            .collect::<Vec<_>>();
        for name in tokens {
            request.headers.remove(&name);
        }
        // Login credentials travel in the query string.
        request.query_string = None;
    }
    Some(ev)
}
