use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Checks `X-Line-Signature`: base64 HMAC-SHA256 of the raw body keyed by
/// the channel secret.
pub fn verify_signature(body: &[u8], signature_header: &str, channel_secret: &str) -> bool {
    let expected = match general_purpose::STANDARD.decode(signature_header.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!("signature header is not valid base64");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => {
            warn!("failed to create HMAC");
            return false;
        }
    };

    mac.update(body);
    // Constant-time comparison.
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub fn sign(body: &[u8], channel_secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).unwrap();
    mac.update(body);
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_matching_signature() {
        let body = br#"{"events":[]}"#;
        let signature = sign(body, "secret");
        assert!(verify_signature(body, &signature, "secret"));
        assert!(!verify_signature(body, &signature, "other-secret"));
        assert!(!verify_signature(br#"{"events":[{}]}"#, &signature, "secret"));
        assert!(!verify_signature(body, "not base64!", "secret"));
    }
}
