//! Server administration.

use actix::System;
use actix_web::{App, HttpServer, middleware::Logger, web::Data};
use failure::Error;
use log::info;
use newsdesk_web::{Secret, SessionManager};
use structopt::StructOpt;

use crate::Config;

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
pub enum Command {
    /// Start the server
    #[structopt(name = "start")]
    Start,
}

pub fn main(cfg: Config, opts: Opts) -> Result<(), Error> {
    match opts.command {
        Command::Start => start(cfg),
    }
}

pub fn start(config: Config) -> Result<(), Error> {
    let system = System::new("newsdesk");

    let workflow = config.model.workflow()?;
    workflow.store().init()?;

    // One engine, and thus one lock registry, shared by all workers.
    let workflow = Data::new(workflow);

    let address = config.server.address;
    let domain = config.server.domain.clone();
    let secret = config.server.secret.clone();

    let server = HttpServer::new(move ||
        App::new()
            .hostname(&domain)
            .register_data(workflow.clone())
            .data(Secret::new(&secret))
            .wrap(Logger::default())
            .wrap(SessionManager::new(&secret))
            .configure(newsdesk_rest_api::configure)
    );

    let server = if let Some(fd) = listenfd::ListenFd::from_env().take_tcp_listener(0)? {
        server.listen(fd)?
    } else {
        server.bind(address)?
    };

    info!("Listening on {}", address);

    server
        .server_hostname(config.server.domain.clone())
        .start();

    system.run()?;

    Ok(())
}
