use crate::error::ExchangeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API key, base64 secret and passphrase for the exchange
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("passphrase", &"***")
            .finish()
    }
}

/// Headers attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub key: String,
    pub signature: String,
    pub timestamp: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// Sign a request
    ///
    /// The prehash string is `timestamp + METHOD + request_path + body`, where
    /// the path includes the query string. The HMAC key is the decoded secret.
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<SignedHeaders, ExchangeError> {
        let key = STANDARD
            .decode(self.api_secret.trim())
            .map_err(|e| ExchangeError::InvalidSecret(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| ExchangeError::InvalidSecret(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.to_uppercase().as_bytes());
        mac.update(request_path.as_bytes());
        mac.update(body.as_bytes());

        Ok(SignedHeaders {
            key: self.api_key.clone(),
            signature: STANDARD.encode(mac.finalize().into_bytes()),
            timestamp: timestamp.to_string(),
            passphrase: self.passphrase.clone(),
        })
    }
}
