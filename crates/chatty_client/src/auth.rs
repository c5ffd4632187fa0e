use tracing::{info, warn};
use zeroize::Zeroizing;

use chatty_crypto::{vault, CryptoError, PrivateKeyEnvelope, PublicKeyBytes};
use chatty_proto::api::{password_digest, LoginRequest, SignupRequest};

use crate::client::ChatClient;
use crate::error::ClientError;
use crate::relay::Relay;
use crate::session::{SessionUser, UserProfile};

impl<R: Relay> ChatClient<R> {
    /// Create an identity, seal it under `password` and register it.
    ///
    /// Only the public key and the sealed envelope leave this process. Returns
    /// the new public key so callers can show its fingerprint.
    pub async fn signup(&self, username: &str, email: Option<&str>, password: &str) -> Result<PublicKeyBytes, ClientError> {
        let iterations = self.config.kdf_iterations;
        let secret = Zeroizing::new(password.as_bytes().to_vec());
        let (identity, envelope) = run_kdf(move || {
            let identity = vault::generate_identity();
            let envelope = vault::wrap_private_key(&identity, &secret, iterations)?;
            Ok((identity, envelope))
        })
        .await?;

        let req = SignupRequest {
            username: username.to_string(),
            email: email.map(str::to_string),
            password: password_digest(password),
            public_key: identity.public_b64(),
            encrypted_private_key: envelope.to_b64(),
        };
        self.relay.signup(&req).await?;
        info!("[auth] registered {username}");
        Ok(identity.public)
    }

    /// Authenticate with the relay and unlock the identity key.
    ///
    /// Fails with `AuthenticationFailure` if the envelope does not open under
    /// `password`; the session is left untouched in that case.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ClientError> {
        let record = self
            .relay
            .login(&LoginRequest {
                username: username.to_string(),
                password: password_digest(password),
            })
            .await?;

        let envelope = PrivateKeyEnvelope::from_b64(&record.encrypted_private_key, self.config.kdf_iterations)?;
        let secret = Zeroizing::new(password.as_bytes().to_vec());
        let identity = run_kdf(move || vault::unwrap_private_key(&envelope, &secret))
            .await
            .map_err(|e| {
                warn!("[auth] could not unlock identity for {username}: {e}");
                e
            })?;

        if let Some(published) = record.published_key()? {
            if published != identity.public {
                warn!("[auth] published key for {username} does not match the unlocked identity");
                return Err(ClientError::MalformedEnvelope(
                    "published public key does not match the decrypted identity".into(),
                ));
            }
        }

        let user = SessionUser {
            id: record.id,
            username: record.username,
            identity,
        };
        let profile = UserProfile::from(&user);
        self.session.lock().await.start(user);
        info!("[auth] {} logged in", profile.username);
        Ok(profile)
    }

    /// Drop the identity and every cached chat key.
    pub async fn logout(&self) {
        let mut session = self.session.lock().await;
        if let Ok(user) = session.user() {
            info!("[auth] {} logged out", user.username);
        }
        session.end();
    }
}

/// PBKDF2 is deliberately slow; keep it off the async workers.
async fn run_kdf<T, F>(f: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, CryptoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClientError::Crypto(CryptoError::KeyDerivation(format!("kdf task failed: {e}"))))?
        .map_err(ClientError::from)
}
