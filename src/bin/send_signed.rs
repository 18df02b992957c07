use anyhow::{bail, Context};
use reqwest::header;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::env;
use std::io::Read;

use hook_verifier::config::Config;
use hook_verifier::{sign_rsa_sha512, SIGNATURE_HEADER};

const USAGE: &str = "Usage: send-signed <payload-file | -> [target-url]";

/// Signs a payload with the configured secret and scheme, or with the PKCS#8
/// PEM key in `HOOK_PRIVATE_KEY_FILE` for the v2 scheme. Prints the
/// signature, or POSTs the payload to `target-url` with the signature header.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let Some(source) = args.next() else {
        bail!(USAGE);
    };
    let target = args.next();
    if args.next().is_some() {
        bail!(USAGE);
    }

    let payload = read_payload(&source)?;

    let signature = match env::var_os("HOOK_PRIVATE_KEY_FILE") {
        Some(path) => {
            let pem = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read private key {:?}", path))?;
            let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
                .map_err(|e| anyhow::anyhow!("invalid private key {:?}: {}", path, e))?;
            sign_rsa_sha512(&private_key, &payload)
        }
        None => {
            let config = Config::load()?;
            config.verifier.sign(&payload).with_context(|| {
                format!(
                    "scheme {} needs HOOK_PRIVATE_KEY_FILE to sign",
                    config.verifier.scheme()
                )
            })?
        }
    };

    let Some(url) = target else {
        println!("{}", signature);
        return Ok(());
    };

    let response = reqwest::Client::new()
        .post(&url)
        .header(SIGNATURE_HEADER, &signature)
        .header(header::CONTENT_TYPE, "application/json")
        .body(payload)
        .send()
        .await
        .with_context(|| format!("failed to POST to {}", url))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("failed to read response body")?;
    println!("{} {}", status, body);

    if !status.is_success() {
        bail!("webhook rejected with {}", status);
    }
    Ok(())
}

fn read_payload(source: &str) -> anyhow::Result<Vec<u8>> {
    if source == "-" {
        let mut payload = Vec::new();
        std::io::stdin()
            .read_to_end(&mut payload)
            .context("failed to read payload from stdin")?;
        return Ok(payload);
    }
    std::fs::read(source).with_context(|| format!("failed to read payload file {}", source))
}
