// config.rs
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::Deserialize;
use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::server::HEALTH_PATH;
use crate::signature::SignatureVerifier;
use crate::{ConfigError, SharedSecret, SignatureScheme, VerificationKey};

const DEFAULT_CONFIG_FILE: &str = "hook-verifier.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub webhook_path: String,
    pub verifier: SignatureVerifier,
    pub max_body_bytes: usize,
}

/// Settings as they come out of the layered sources, before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    bind_address: String,
    webhook_path: String,
    shared_secret: Option<String>,
    shared_secret_file: Option<PathBuf>,
    public_key: Option<String>,
    public_key_file: Option<PathBuf>,
    signature_scheme: String,
    max_body_bytes: usize,
}

impl Config {
    /// Defaults, then `hook-verifier.toml` (or `HOOK_CONFIG_FILE`) if it
    /// exists, then `HOOK_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file =
            env::var("HOOK_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        // No `try_parsing`: secrets must reach us exactly as provisioned.
        Self::load_from(
            Some(Path::new(&file)),
            config::Environment::with_prefix("HOOK"),
        )
    }

    pub fn load_from(
        file: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8000")?
            .set_default("webhook_path", "/")?
            .set_default("signature_scheme", "sha512")?
            .set_default("max_body_bytes", 1_048_576i64)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let raw: RawConfig = builder.add_source(environment).build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let bind_address = raw
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(raw.bind_address.clone()))?;

        if !raw.webhook_path.starts_with('/') || raw.webhook_path == HEALTH_PATH {
            return Err(ConfigError::InvalidWebhookPath(raw.webhook_path));
        }

        let scheme: SignatureScheme = raw.signature_scheme.parse()?;

        let key = if scheme.uses_public_key() {
            let public_key = match (raw.public_key, raw.public_key_file) {
                (Some(inline), _) => parse_public_key(&inline)?,
                (None, Some(path)) => read_public_key_file(&path)?,
                (None, None) => return Err(ConfigError::MissingPublicKey),
            };
            VerificationKey::RsaPublic(public_key)
        } else {
            let secret = match (raw.shared_secret, raw.shared_secret_file) {
                (Some(inline), _) => SharedSecret::new(inline)?,
                (None, Some(path)) => read_secret_file(&path)?,
                (None, None) => return Err(ConfigError::MissingSecret),
            };
            VerificationKey::Shared(secret)
        };

        Ok(Config {
            bind_address,
            webhook_path: raw.webhook_path,
            verifier: SignatureVerifier::with_key(key, scheme)?,
            max_body_bytes: raw.max_body_bytes,
        })
    }
}

fn read_secret_file(path: &Path) -> Result<SharedSecret, ConfigError> {
    let mut bytes = fs::read(path).map_err(|source| ConfigError::SecretFile {
        path: path.to_path_buf(),
        source,
    })?;

    // Files written by editors and `echo` end with a newline.
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }

    SharedSecret::new(bytes)
}

fn read_public_key_file(path: &Path) -> Result<RsaPublicKey, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::PublicKeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_public_key(&text)
}

/// Accepts a SubjectPublicKeyInfo as PEM or as bare base64 DER (the form
/// senders publish), or a PKCS#1 `RSA PUBLIC KEY` PEM.
pub fn parse_public_key(text: &str) -> Result<RsaPublicKey, ConfigError> {
    let text = text.trim();
    let parsed = if text.starts_with("-----BEGIN RSA PUBLIC KEY-----") {
        RsaPublicKey::from_pkcs1_pem(text).map_err(|e| e.to_string())
    } else if text.starts_with("-----BEGIN") {
        RsaPublicKey::from_public_key_pem(text).map_err(|e| e.to_string())
    } else {
        let compact: String = text.split_whitespace().collect();
        STANDARD
            .decode(compact)
            .map_err(|e| e.to_string())
            .and_then(|der| RsaPublicKey::from_public_key_der(&der).map_err(|e| e.to_string()))
    };
    parsed.map_err(ConfigError::PublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("HOOK").source(Some(map))
    }

    fn secret_of(config: &Config) -> Vec<u8> {
        config.verifier.shared_secret().unwrap().expose().to_vec()
    }

    const RSA_PUBLIC_PEM: &str = include_str!("../tests/fixtures/rsa_public.pem");
    const RSA_PUBLIC_DER_B64: &str = include_str!("../tests/fixtures/rsa_public.der.b64");
    const HELLO_RSA_SHA512: &str = "qnTRxt3dlx5BvwN8HiLz4W6UGzBDi0SWflMwIxd6szKHEplGKmjP3ucMgIqIur0RjTCcrWR7CSGtRBKsSLE4iUQr1czdYVODXMjisX/p+J4S0KLTZluFX6ivzXtNJZWbTbAfxobgc2kaDaCU9MwrMlJnFL2iGWZ2E+iCjoarXeU5U9baz4Z9DUXQyfeciM7l2wj2nAfvCTwGyBDKyvHNlrKF+a5JnKToqJ1MyKLVlcKBkgYssSXu4JX0Ul+rKVwUkEHA0M3wXOSZbc15MlpeZoKST/3wiPYVmeTGrVegnnGCBGS5tGIxpT00K9xJT4VK6XCDWDSYT9WjtyCeBYwynQ==";

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name))
    }

    #[test]
    fn test_defaults_with_inline_secret() {
        let config =
            Config::load_from(None, env_of(&[("HOOK_SHARED_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8000".parse().unwrap());
        assert_eq!(config.webhook_path, "/");
        assert_eq!(secret_of(&config), b"s3cret");
        assert_eq!(config.verifier.scheme(), SignatureScheme::Sha512Concat);
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "s3cret"),
                ("HOOK_BIND_ADDRESS", "127.0.0.1:9000"),
                ("HOOK_WEBHOOK_PATH", "/hooks/bank"),
                ("HOOK_SIGNATURE_SCHEME", "hmac-sha512"),
                ("HOOK_MAX_BODY_BYTES", "2048"),
            ]),
        )
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.webhook_path, "/hooks/bank");
        assert_eq!(config.verifier.scheme(), SignatureScheme::HmacSha512);
        assert_eq!(config.max_body_bytes, 2048);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = Config::load_from(None, env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn test_empty_secret_is_fatal() {
        let err = Config::load_from(None, env_of(&[("HOOK_SHARED_SECRET", "")])).unwrap_err();
        // Depending on the source, an empty variable reads as empty or unset.
        assert!(matches!(
            err,
            ConfigError::EmptySecret | ConfigError::MissingSecret
        ));
    }

    #[test]
    fn test_unknown_scheme_is_fatal() {
        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "s3cret"),
                ("HOOK_SIGNATURE_SCHEME", "md5"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScheme(_)));
    }

    #[test]
    fn test_empty_secret_file_is_fatal() {
        let path = temp_path("empty-secret");
        fs::write(&path, "\n").unwrap();

        let err = Config::load_from(
            None,
            env_of(&[("HOOK_SHARED_SECRET_FILE", path.to_str().unwrap())]),
        )
        .unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::EmptySecret));
    }

    #[test]
    fn test_invalid_bind_address() {
        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "s3cret"),
                ("HOOK_BIND_ADDRESS", "not-an-address"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddress(_)));
    }

    #[test]
    fn test_invalid_webhook_path() {
        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "s3cret"),
                ("HOOK_WEBHOOK_PATH", "hooks"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWebhookPath(_)));

        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "s3cret"),
                ("HOOK_WEBHOOK_PATH", "/health"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWebhookPath(_)));
    }

    #[test]
    fn test_secret_file_trailing_newline_trimmed() {
        let path = temp_path("secret");
        fs::write(&path, "from-file\n").unwrap();

        let config = Config::load_from(
            None,
            env_of(&[("HOOK_SHARED_SECRET_FILE", path.to_str().unwrap())]),
        )
        .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(secret_of(&config), b"from-file");
    }

    #[test]
    fn test_inline_secret_wins_over_file() {
        let config = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SHARED_SECRET", "inline"),
                ("HOOK_SHARED_SECRET_FILE", "/does/not/exist"),
            ]),
        )
        .unwrap();
        assert_eq!(secret_of(&config), b"inline");
    }

    #[test]
    fn test_unreadable_secret_file() {
        let err = Config::load_from(
            None,
            env_of(&[("HOOK_SHARED_SECRET_FILE", "/does/not/exist")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SecretFile { .. }));
    }

    #[test]
    fn test_config_file_layer() {
        let path = temp_path("hook-verifier.toml");
        fs::write(
            &path,
            "bind_address = \"127.0.0.1:7000\"\nsignature_scheme = \"v1-hmac\"\nshared_secret = \"file-secret\"\n",
        )
        .unwrap();

        let config = Config::load_from(
            Some(path.as_path()),
            env_of(&[("HOOK_BIND_ADDRESS", "127.0.0.1:7001")]),
        )
        .unwrap();
        fs::remove_file(&path).ok();

        // Environment beats the file.
        assert_eq!(config.bind_address, "127.0.0.1:7001".parse().unwrap());
        assert_eq!(config.verifier.scheme(), SignatureScheme::HmacSha512);
        assert_eq!(secret_of(&config), b"file-secret");
    }

    #[test]
    fn test_missing_config_file_is_ignored() {
        let config = Config::load_from(
            Some(Path::new("/does/not/exist.toml")),
            env_of(&[("HOOK_SHARED_SECRET", "s3cret")]),
        )
        .unwrap();
        assert_eq!(config.webhook_path, "/");
    }

    #[test]
    fn test_numeric_looking_secrets_kept_verbatim() {
        for secret in ["00001234", "1e3", "1.50", "0x10", "true"] {
            let config =
                Config::load_from(None, env_of(&[("HOOK_SHARED_SECRET", secret)])).unwrap();
            assert_eq!(secret_of(&config), secret.as_bytes(), "{}", secret);
        }
    }

    #[test]
    fn test_rsa_scheme_with_inline_der_key() {
        let config = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SIGNATURE_SCHEME", "v2"),
                ("HOOK_PUBLIC_KEY", RSA_PUBLIC_DER_B64.trim()),
            ]),
        )
        .unwrap();

        assert_eq!(config.verifier.scheme(), SignatureScheme::RsaSha512);
        assert!(config.verifier.shared_secret().is_none());
        assert!(config.verifier.verify(b"hello", HELLO_RSA_SHA512).is_valid());
    }

    #[test]
    fn test_rsa_scheme_with_pem_key_file() {
        let path = temp_path("public.pem");
        fs::write(&path, RSA_PUBLIC_PEM).unwrap();

        let config = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SIGNATURE_SCHEME", "rsa-sha512"),
                ("HOOK_PUBLIC_KEY_FILE", path.to_str().unwrap()),
                // Ignored by the public-key scheme.
                ("HOOK_SHARED_SECRET", "unused"),
            ]),
        )
        .unwrap();
        fs::remove_file(&path).ok();

        assert!(config.verifier.verify(b"hello", HELLO_RSA_SHA512).is_valid());
    }

    #[test]
    fn test_rsa_scheme_without_key_is_fatal() {
        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SIGNATURE_SCHEME", "v2"),
                ("HOOK_SHARED_SECRET", "not-a-public-key"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPublicKey));
    }

    #[test]
    fn test_invalid_public_key_is_fatal() {
        for key in ["not base64!", "aGVsbG8=", "-----BEGIN PUBLIC KEY-----\ngarbage\n-----END PUBLIC KEY-----"] {
            assert!(matches!(parse_public_key(key), Err(ConfigError::PublicKey(_))), "{}", key);
        }

        let err = Config::load_from(
            None,
            env_of(&[
                ("HOOK_SIGNATURE_SCHEME", "v2"),
                ("HOOK_PUBLIC_KEY_FILE", "/does/not/exist.pem"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::PublicKeyFile { .. }));
    }

    #[test]
    fn test_debug_output_hides_secret() {
        let config =
            Config::load_from(None, env_of(&[("HOOK_SHARED_SECRET", "do-not-print")])).unwrap();
        assert!(!format!("{:?}", config).contains("do-not-print"));
    }
}
