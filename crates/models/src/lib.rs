mod config;

pub mod audit;
pub mod cursor;
pub mod listing;
pub mod lock;
pub mod models;
pub mod permissions;
pub mod store;
pub mod version;
pub mod workflow;

pub use self::{
    config::Config,
    listing::{ArticleSet, ListPage, ListQuery},
    models::*,
    permissions::{Permission, Roles},
    workflow::{Workflow, WorkflowError},
};
