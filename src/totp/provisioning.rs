//! `otpauth://` provisioning URIs consumed by authenticator apps.
//!
//! The layout is a compatibility contract with already-enrolled devices:
//! `otpauth://totp/<issuer (name)>?secret=..&issuer=..&accountname=<name <id>>`,
//! with label and parameter values percent-encoded as URI components
//! (RFC 3986 unreserved characters plus `!*'()` pass through).

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, SecretString};

/// Everything except the URI component safe set is escaped.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

#[must_use]
pub fn provisioning_uri(
    issuer: &str,
    principal_id: &str,
    principal_name: &str,
    secret: &SecretString,
) -> String {
    let label = encode_component(&format!("{issuer} ({principal_name})"));
    let account = encode_component(&format!("{principal_name} <{principal_id}>"));
    format!(
        "otpauth://totp/{label}?secret={}&issuer={}&accountname={account}",
        secret.expose_secret(),
        encode_component(issuer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_layout_is_stable() {
        let secret = SecretString::from("JBSWY3DPEHPK3PXP".to_string());
        let uri = provisioning_uri("NiuNiu Admin", "admin_001", "ops-lead", &secret);
        assert_eq!(
            uri,
            "otpauth://totp/NiuNiu%20Admin%20(ops-lead)?secret=JBSWY3DPEHPK3PXP\
             &issuer=NiuNiu%20Admin&accountname=ops-lead%20%3Cadmin_001%3E"
        );
    }

    #[test]
    fn non_ascii_names_are_utf8_percent_encoded() {
        let secret = SecretString::from("JBSWY3DPEHPK3PXP".to_string());
        let uri = provisioning_uri("Pitboss", "admin_002", "财务", &secret);
        assert!(uri.starts_with("otpauth://totp/Pitboss%20(%E8%B4%A2%E5%8A%A1)?"));
        assert!(uri.ends_with("accountname=%E8%B4%A2%E5%8A%A1%20%3Cadmin_002%3E"));
    }
}
