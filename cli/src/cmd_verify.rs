//! Offline message helpers: `chainmirror verify` and `chainmirror address`.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use chainmirror_core::{auth, Message};

/// Verify a base64 envelope against `args` and return the sender address.
pub fn verify(message: &str, args: &[String]) -> Result<String> {
    let msg = Message::from_base64_str(message).context("decoding message")?;
    let sender = auth::verify(&msg, args).context("verifying message")?;
    println!("signature valid");
    println!("  nonce:   {}", msg.nonce);
    println!("  address: {sender}");
    Ok(sender)
}

/// Address for a base64 DER public key.
pub fn address(public_key: &str) -> Result<String> {
    let der = STANDARD
        .decode(public_key.trim())
        .context("public key is not base64")?;
    let address = auth::address_from_der(&der).context("parsing public key")?;
    println!("{address}");
    Ok(address)
}
