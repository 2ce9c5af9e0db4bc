//! Commands for managing the document store.

use failure::{Error, Fail};
use newsdesk_models::store;
use structopt::StructOpt;

use crate::Config;

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
pub enum Command {
    /// Create missing partitions
    #[structopt(name = "init")]
    Init,
    /// Delete all partitions and everything in them
    #[structopt(name = "drop")]
    Drop {
        /// Confirm that all data should be deleted
        #[structopt(long = "force")]
        force: bool,
    },
}

pub fn main(cfg: &Config, opts: Opts) -> Result<(), Error> {
    let store = store::connect(&cfg.model.store)?;

    match opts.command {
        Command::Init => {
            store.init()?;
            println!("Store initialized");
        }
        Command::Drop { force: false } => return Err(NotConfirmedError.into()),
        Command::Drop { force: true } => {
            store.drop_all()?;
            println!("Store dropped");
        }
    }

    Ok(())
}

#[derive(Debug, Fail)]
#[fail(display = "Refusing to delete all data without --force")]
struct NotConfirmedError;
