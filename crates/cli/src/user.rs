//! Commands for managing logins.

use failure::Error;
use log::warn;
use newsdesk_models::{
    Login,
    audit::Actor,
    permissions::Roles,
    store::{self, Store},
};
use structopt::StructOpt;

use crate::{Config, Result};
use super::util::print_table;

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
pub enum Command {
    /// List all logins
    #[structopt(name = "list")]
    List,
    /// Add a new login
    #[structopt(name = "add")]
    Add(AddOpts),
    /// Modify a login
    #[structopt(name = "modify")]
    Modify(ModifyOpts),
    /// Delete a login
    #[structopt(name = "delete")]
    Delete {
        /// User's name
        username: String,
    },
}

pub fn main(cfg: &Config, opts: Opts) -> Result<(), Error> {
    if let store::Config::Memory = cfg.model.store {
        warn!("Using an in-memory store; changes will be lost on exit");
    }

    let store = store::connect(&cfg.model.store)?;
    store.init()?;

    match opts.command {
        Command::List => list(&*store),
        Command::Add(opts) => add(&*store, opts),
        Command::Modify(opts) => modify(&*store, opts),
        Command::Delete { username } => {
            Login::by_name(&*store, &username)?.delete(&*store, Actor::System)?;
            println!("Deleted login {}", username);
            Ok(())
        }
    }
}

pub fn list(store: &dyn Store) -> Result<()> {
    let logins = Login::all(store)?;

    let rows = logins.iter()
        .map(|login| (login.username(), login.roles().to_string()))
        .collect::<Vec<_>>();

    print_table(("Name", "Roles"), &rows);

    Ok(())
}

#[derive(StructOpt)]
pub struct AddOpts {
    /// User's name
    username: String,
    /// User's password
    #[structopt(long = "password", short = "p")]
    password: String,
    /// Comma-separated list of roles
    #[structopt(long = "roles", short = "r", default_value = "")]
    roles: Roles,
}

pub fn add(store: &dyn Store, opts: AddOpts) -> Result<()> {
    let login = Login::create(store, Actor::System, &opts.username, &opts.password, opts.roles)?;

    println!("Created login {} with roles [{}]", login.username(), login.roles());

    Ok(())
}

#[derive(StructOpt)]
pub struct ModifyOpts {
    /// User's name
    username: String,
    /// Set user's password
    #[structopt(long = "password", short = "p")]
    password: Option<String>,
    /// Set user's roles
    #[structopt(long = "roles", short = "r")]
    roles: Option<Roles>,
}

pub fn modify(store: &dyn Store, opts: ModifyOpts) -> Result<()> {
    let mut login = Login::by_name(store, &opts.username)?;

    if let Some(ref password) = opts.password {
        login.set_password(store, Actor::System, password)?;
    }

    if let Some(roles) = opts.roles {
        login.set_roles(store, Actor::System, roles)?;
    }

    Ok(())
}
