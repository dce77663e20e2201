//! AWS Signature V4 request signing.
//!
//! Minimal signer for the Lambda and API Gateway management calls this
//! crate makes: JSON or zip payloads, no query strings requiring special
//! canonicalization beyond sorting, signed headers fixed to
//! `host;x-amz-date`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Headers a signed request must carry.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

const SIGNED_HEADER_LIST: &str = "host;x-amz-date";

/// Sign one request.
///
/// `path` is the absolute request path, `query` the raw query string
/// (already URL-encoded, possibly empty).
pub fn sign(
    credentials: &Credentials,
    method: &str,
    host: &str,
    path: &str,
    query: &str,
    body: &[u8],
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let payload_hash = hex(&Sha256::digest(body));
    let canonical_query = canonicalize_query(query);
    let canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
    let canonical_request = format!(
        "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{SIGNED_HEADER_LIST}\n{payload_hash}"
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_key(&credentials.secret_access_key, &date, region, service);
    let signature = hex(&hmac(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADER_LIST}, Signature={signature}",
        credentials.access_key_id
    );

    SignedHeaders {
        amz_date,
        authorization,
    }
}

fn canonicalize_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_unstable();
    pairs.join("&")
}

fn derive_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
        }
    }

    #[test]
    fn signature_shape_is_stable() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let signed = sign(
            &credentials(),
            "POST",
            "lambda.us-east-2.amazonaws.com",
            "/2015-03-31/functions",
            "",
            b"{}",
            "us-east-2",
            "lambda",
            now,
        );

        assert_eq!(signed.amz_date, "20260805T120000Z");
        assert!(signed.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260805/us-east-2/lambda/aws4_request"));
        assert!(signed.authorization.contains("SignedHeaders=host;x-amz-date"));
        // 64 hex chars of signature at the end.
        let signature = signed.authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_time() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let a = sign(&credentials(), "GET", "h", "/", "", b"", "us-east-2", "lambda", now);
        let b = sign(&credentials(), "GET", "h", "/", "", b"", "us-east-2", "lambda", now);
        assert_eq!(a.authorization, b.authorization);
    }

    #[test]
    fn query_is_sorted() {
        assert_eq!(canonicalize_query("b=2&a=1"), "a=1&b=2");
        assert_eq!(canonicalize_query(""), "");
    }
}
