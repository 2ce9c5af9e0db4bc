pub mod article;
pub mod login;

pub use self::{
    article::{Article, Content},
    login::Login,
};
