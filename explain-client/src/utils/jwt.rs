use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claims the client reads from an identity token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "cognito:groups", default)]
    pub groups: Vec<String>,
    /// Expiry in epoch seconds. Simulated tokens carry a fractional value.
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.exp?;
        Utc.timestamp_opt(exp.trunc() as i64, 0).single()
    }

    /// A token is expired once `now >= exp`; no expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

/// Result of decoding a token's payload. Decoding never panics or errors;
/// callers decide what a malformed token means for them.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedToken {
    Valid(Claims),
    Malformed(String),
}

impl DecodedToken {
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            DecodedToken::Valid(claims) => Some(claims),
            DecodedToken::Malformed(_) => None,
        }
    }

    pub fn into_claims(self) -> Option<Claims> {
        match self {
            DecodedToken::Valid(claims) => Some(claims),
            DecodedToken::Malformed(_) => None,
        }
    }
}

/// Decode token claims without validating the signature.
///
/// The signature is checked by the identity provider and the backend; the
/// client only reads group membership, expiry and profile attributes.
///
/// Three-segment tokens are read as JWTs. Anything else is tried as a
/// standard-base64 JSON document (simulation mode).
pub fn decode_claims(token: &str) -> DecodedToken {
    let parts: Vec<&str> = token.split('.').collect();

    let payload = if parts.len() == 3 {
        general_purpose::URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))
    } else {
        general_purpose::STANDARD.decode(token.trim())
    };

    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => return DecodedToken::Malformed(format!("invalid base64 payload: {}", e)),
    };

    match serde_json::from_slice::<Claims>(&payload) {
        Ok(claims) => DecodedToken::Valid(claims),
        Err(e) => DecodedToken::Malformed(format!("invalid claims: {}", e)),
    }
}

/// Build a simulation-mode token granting membership of `org_names`.
///
/// Names are lowercased and whitespace runs become hyphens, so
/// "Globex Corp" grants `org-globex-corp`.
pub fn simulated_token(org_names: &[&str], expires_at: DateTime<Utc>) -> String {
    let groups: Vec<String> = org_names
        .iter()
        .map(|name| {
            let slug = name
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-");
            format!("org-{}", slug)
        })
        .collect();

    let payload = serde_json::json!({
        "cognito:groups": groups,
        "exp": expires_at.timestamp(),
    });

    general_purpose::STANDARD.encode(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn jwt_with_payload(payload: &serde_json::Value) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decode_jwt_claims() {
        let token = jwt_with_payload(&serde_json::json!({
            "sub": "user_123",
            "email": "test@example.com",
            "exp": 9999999999i64,
            "cognito:groups": ["org-acme", "admins"]
        }));

        let claims = decode_claims(&token).into_claims().unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user_123"));
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert_eq!(claims.groups, vec!["org-acme", "admins"]);
    }

    #[test]
    fn two_segment_garbage_is_malformed() {
        assert!(matches!(decode_claims("abc.def"), DecodedToken::Malformed(_)));
        assert!(matches!(decode_claims(""), DecodedToken::Malformed(_)));
    }

    #[test]
    fn three_segments_with_bad_payload_is_malformed() {
        assert!(matches!(
            decode_claims("header.!!!.sig"),
            DecodedToken::Malformed(_)
        ));
    }

    #[test]
    fn simulated_token_round_trips_through_fallback() {
        let token = simulated_token(&["Acme", "Globex Corp"], Utc::now() + Duration::hours(1));
        let claims = decode_claims(&token).into_claims().unwrap();
        assert_eq!(claims.groups, vec!["org-acme", "org-globex-corp"]);
        assert!(claims.exp.is_some());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let claims = Claims {
            exp: Some(1_700_000_000.0),
            ..Default::default()
        };
        assert!(claims.is_expired_at(now));
        assert!(!claims.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        assert!(Claims::default().is_expired_at(Utc::now()));
    }
}
