use failure::Fail;
use newsdesk_error::ApiError;
use newsdesk_macros::From;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    audit::{self, Actor},
    permissions::Roles,
    store::{Created, Deleted, Partition, Refresh, Search, Store, StoreError},
};

static ARGON2_CONFIG: argon2::Config = argon2::Config {
    ad: &[],
    hash_length: 32,
    lanes: 1,
    mem_cost: 4096,
    secret: &[],
    thread_mode: argon2::ThreadMode::Sequential,
    time_cost: 3,
    variant: argon2::Variant::Argon2id,
    version: argon2::Version::Version13,
};

/// Upper bound on the number of logins returned by [`Login::all`].
const MAX_LOGINS: usize = 10_000;

/// Credentials and roles of a single user.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Login {
    username: String,
    /// Argon2 hash in the PHC string format.
    password: String,
    roles: Roles,
}

/// A subset of a login's data that can safely be publicly exposed.
#[derive(Debug, Serialize)]
pub struct Public {
    pub username: String,
    pub roles: Roles,
}

impl Login {
    /// Create a new login.
    pub fn create(
        store: &dyn Store,
        actor: Actor,
        username: &str,
        password: &str,
        roles: Roles,
    ) -> Result<Login, CreateLoginError> {
        if username.is_empty() {
            return Err(CreateLoginError::EmptyName);
        }

        if password.is_empty() {
            return Err(CreateLoginError::EmptyPassword);
        }

        let login = Login {
            username: username.to_string(),
            password: hash_password(password)?,
            roles,
        };

        let doc = serde_json::to_value(&login)?;

        match store.create(Partition::Login, username, &doc, Refresh::WaitFor)? {
            Created::Created => (),
            Created::Conflict => return Err(CreateLoginError::Exists),
        }

        audit::login(actor, "create", username);

        Ok(login)
    }

    /// Find a login by user name.
    pub fn by_name(store: &dyn Store, username: &str)
    -> Result<Login, FindLoginError> {
        match store.get(Partition::Login, username, true)? {
            Some(doc) => Ok(doc.parse()?),
            None => Err(FindLoginError::NotFound),
        }
    }

    /// Get all logins, sorted by user name.
    pub fn all(store: &dyn Store) -> Result<Vec<Login>, StoreError> {
        let mut logins = store.search(&Search::new(&[Partition::Login], MAX_LOGINS))?
            .into_iter()
            .map(|hit| hit.document.parse::<Login>())
            .collect::<Result<Vec<_>, _>>()?;

        logins.sort_by(|a, b| a.username.cmp(&b.username));

        Ok(logins)
    }

    /// Find a login for given name and try to authenticate as it.
    pub fn authenticate(store: &dyn Store, username: &str, password: &str)
    -> Result<Login, AuthenticateError> {
        let login = match Login::by_name(store, username) {
            Ok(login) => login,
            Err(FindLoginError::NotFound) => return Err(AuthenticateError::BadCredentials),
            Err(FindLoginError::Store(err)) => return Err(err.into()),
        };

        if login.check_password(password) {
            Ok(login)
        } else {
            Err(AuthenticateError::BadCredentials)
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> Roles {
        self.roles
    }

    pub fn get_public(&self) -> Public {
        Public {
            username: self.username.clone(),
            roles: self.roles,
        }
    }

    /// Verify correctness of a password.
    pub fn check_password(&self, password: &str) -> bool {
        match argon2::verify_encoded(&self.password, password.as_bytes()) {
            Ok(valid) => valid,
            Err(err) => {
                log::error!("Malformed password hash for {}: {}", self.username, err);
                false
            }
        }
    }

    /// Change this login's password.
    pub fn set_password(&mut self, store: &dyn Store, actor: Actor, password: &str)
    -> Result<(), CreateLoginError> {
        if password.is_empty() {
            return Err(CreateLoginError::EmptyPassword);
        }

        self.password = hash_password(password)?;
        self.save(store)?;

        audit::login(actor, "change-password", &self.username);

        Ok(())
    }

    /// Change roles granted to this login.
    pub fn set_roles(&mut self, store: &dyn Store, actor: Actor, roles: Roles)
    -> Result<(), StoreError> {
        self.roles = roles;
        self.save(store)?;

        audit::login(actor, "set-roles", &self.username);

        Ok(())
    }

    /// Delete this login.
    pub fn delete(self, store: &dyn Store, actor: Actor) -> Result<(), FindLoginError> {
        match store.delete(Partition::Login, &self.username, Refresh::WaitFor)? {
            Deleted::Deleted => (),
            Deleted::NotFound => return Err(FindLoginError::NotFound),
        }

        audit::login(actor, "delete", &self.username);

        Ok(())
    }

    fn save(&self, store: &dyn Store) -> Result<(), StoreError> {
        let doc = serde_json::to_value(self)?;
        store.upsert(Partition::Login, &self.username, &doc, Refresh::WaitFor)
    }
}

fn hash_password(password: &str) -> Result<String, argon2::Error> {
    let mut salt = [0; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &ARGON2_CONFIG)
}

#[derive(ApiError, Debug, Fail, From)]
pub enum CreateLoginError {
    #[api(code = "login:new:empty-name", status = "BAD_REQUEST")]
    #[fail(display = "user name cannot be empty")]
    EmptyName,
    #[api(code = "login:new:empty-password", status = "BAD_REQUEST")]
    #[fail(display = "password cannot be empty")]
    EmptyPassword,
    #[api(code = "login:new:exists", status = "CONFLICT")]
    #[fail(display = "a login with this name already exists")]
    Exists,
    #[api(internal)]
    #[fail(display = "cannot hash password: {}", _0)]
    Hash(#[cause] #[from] argon2::Error),
    #[api(internal)]
    #[fail(display = "{}", _0)]
    Json(#[cause] #[from] serde_json::Error),
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
}

#[derive(ApiError, Debug, Fail, From)]
pub enum FindLoginError {
    #[api(code = "login:not-found", status = "NOT_FOUND")]
    #[fail(display = "no such login")]
    NotFound,
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
}

#[derive(ApiError, Debug, Fail, From)]
pub enum AuthenticateError {
    /// Either the login doesn't exist or the password doesn't match. We don't
    /// tell which.
    #[api(code = "login:authenticate:bad-credentials", status = "FORBIDDEN")]
    #[fail(display = "bad user name or password")]
    BadCredentials,
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStore;
    use super::*;

    fn store_with_alice() -> MemoryStore {
        let store = MemoryStore::new();
        Login::create(&store, Actor::System, "alice", "secret", Roles::ARTICLE_CREATE)
            .unwrap();
        store
    }

    #[test]
    fn authenticate_checks_password() {
        let store = store_with_alice();

        let login = Login::authenticate(&store, "alice", "secret").unwrap();
        assert_eq!(login.username(), "alice");
        assert_eq!(login.roles(), Roles::ARTICLE_CREATE);

        assert!(match Login::authenticate(&store, "alice", "wrong") {
            Err(AuthenticateError::BadCredentials) => true,
            _ => false,
        });
        assert!(match Login::authenticate(&store, "bob", "secret") {
            Err(AuthenticateError::BadCredentials) => true,
            _ => false,
        });
    }

    #[test]
    fn names_are_unique() {
        let store = store_with_alice();
        assert!(match Login::create(&store, Actor::System, "alice", "x", Roles::empty()) {
            Err(CreateLoginError::Exists) => true,
            _ => false,
        });
    }

    #[test]
    fn passwords_are_never_stored_in_plain() {
        let store = store_with_alice();
        let doc = store.get(Partition::Login, "alice", true).unwrap().unwrap();
        let hash = doc.source["password"].as_str().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("secret"));
        assert_eq!(doc.source["roles"], serde_json::json!(["article:create"]));
    }

    #[test]
    fn modify_and_delete() {
        let store = store_with_alice();

        let mut login = Login::by_name(&store, "alice").unwrap();
        login.set_password(&store, Actor::System, "changed").unwrap();
        login.set_roles(&store, Actor::System, Roles::ARTICLE_PUBLISH).unwrap();

        let login = Login::authenticate(&store, "alice", "changed").unwrap();
        assert_eq!(login.roles(), Roles::ARTICLE_PUBLISH);

        login.delete(&store, Actor::System).unwrap();
        assert!(Login::all(&store).unwrap().is_empty());
    }
}
