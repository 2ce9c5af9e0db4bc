//! Sealing of values handed out to clients, such as authentication tokens.
//!
//! A sealed value is its MessagePack encoding encrypted and authenticated
//! with AES-256-GCM, followed by the 12-byte nonce used.

use failure::Fail;
use newsdesk_macros::From;
use rand::Rng;
use ring::aead::{self, Aad, BoundKey, Nonce, NONCE_LEN};
use serde::{Serialize, de::DeserializeOwned};

/// Encrypt and sign a value.
pub fn seal<T>(key: &[u8], value: &T) -> Result<Vec<u8>, SealingError>
where
    T: Serialize,
{
    let mut data = rmps::to_vec(value)?;

    let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let key = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| SealingError::Key)?;
    let mut key = aead::SealingKey::new(key, SingleNonce(Some(nonce)));

    key.seal_in_place_append_tag(Aad::empty(), &mut data)
        .map_err(|_| SealingError::Key)?;

    data.extend_from_slice(&nonce_bytes);

    Ok(data)
}

/// Decode and verify a value.
pub fn unseal<T>(key: &[u8], data: &mut [u8]) -> Result<T, UnsealingError>
where
    T: DeserializeOwned,
{
    if data.len() < NONCE_LEN {
        return Err(UnsealingError::TooShort);
    }

    let index = data.len() - NONCE_LEN;
    let (ciphertext, nonce) = data.split_at_mut(index);
    let nonce = SingleNonce(Some(Nonce::try_assume_unique_for_key(nonce)?));

    let key = aead::UnboundKey::new(&aead::AES_256_GCM, key)?;
    let mut key = aead::OpeningKey::new(key, nonce);

    let decrypted = key.open_in_place(Aad::empty(), ciphertext)?;

    Ok(rmps::from_slice(decrypted)?)
}

/// Seal a value and encode it as URL-safe text.
pub fn seal_to_string<T>(key: &[u8], value: &T) -> Result<String, SealingError>
where
    T: Serialize,
{
    seal(key, value).map(|data| base64::encode_config(&data, base64::URL_SAFE_NO_PAD))
}

/// Reverse of [`seal_to_string`].
pub fn unseal_from_str<T>(key: &[u8], text: &str) -> Result<T, UnsealingError>
where
    T: DeserializeOwned,
{
    let mut data = base64::decode_config(text, base64::URL_SAFE_NO_PAD)?;
    unseal(key, &mut data)
}

struct SingleNonce(Option<Nonce>);

impl aead::NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        self.0.take().ok_or(ring::error::Unspecified)
    }
}

#[derive(Debug, Fail, From)]
pub enum SealingError {
    #[fail(display = "could not serialize: {}", _0)]
    Serialization(#[cause] #[from] rmps::encode::Error),
    /// Sealing key is not a valid AES-256 key.
    #[fail(display = "invalid sealing key")]
    Key,
}

#[derive(Debug, Fail, From)]
pub enum UnsealingError {
    #[fail(display = "could not decode text: {}", _0)]
    Text(#[cause] #[from] base64::DecodeError),
    #[fail(display = "could not deserialize: {}", _0)]
    Serialization(#[cause] #[from] rmps::decode::Error),
    #[fail(display = "could not decrypt: {}", _0)]
    Crypto(#[from] ring::error::Unspecified),
    #[fail(display = "not enough data to unseal")]
    TooShort,
}
