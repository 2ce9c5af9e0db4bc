use rand::RngCore;
use serde::{Deserialize, de::{Deserializer, Error, Unexpected}};
use std::{fs, net::{Ipv4Addr, SocketAddr}};

/// Server configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Address on which to listen.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Domain (host name) of this server.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Key sealing session tokens.
    ///
    /// When not configured a random key is used, and tokens don't survive
    /// a restart.
    #[serde(default = "random_secret", deserialize_with = "de_secret")]
    pub secret: Vec<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: default_address(),
            domain: default_domain(),
            secret: random_secret(),
        }
    }
}

/// Default address (127.0.0.1:80).
fn default_address() -> SocketAddr {
    (Ipv4Addr::LOCALHOST, 80).into()
}

fn default_domain() -> String {
    "localhost".to_string()
}

/// Default secret (32 random bytes).
fn random_secret() -> Vec<u8> {
    let mut secret = vec![0; MIN_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Minimal length of a secret, which is an AES-256 key.
const MIN_SECRET_LEN: usize = 32;

/// Deserialize a secret key given either inline as `base64:<data>` or as
/// a path to a file, `file:<path>`.
fn de_secret<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(d)?;

    let secret = if value.starts_with("base64:") {
        base64::decode(&value["base64:".len()..]).map_err(D::Error::custom)?
    } else if value.starts_with("file:") {
        let path = &value["file:".len()..];
        fs::read(path).map_err(|err| D::Error::custom(
            format!("cannot read secret from {}: {}", path, err)))?
    } else {
        return Err(D::Error::invalid_value(
            Unexpected::Str(&value), &"base64:<data> or file:<path>"));
    };

    if secret.len() < MIN_SECRET_LEN {
        return Err(D::Error::invalid_length(secret.len(), &"at least 32 bytes"));
    }

    Ok(secret)
}
