mod extractors;

pub mod session;

pub use self::{
    extractors::{
        BadBodyError,
        Id,
        MissingArgumentError,
        OptionalJson,
        Secret,
        parse_body,
    },
    session::{Claims, Session, SessionManager, TOKEN_HEADER},
};
