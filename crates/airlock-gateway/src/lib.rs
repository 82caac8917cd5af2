//! HTTP ingress for Airlock.
//!
//! The agent surface (credential discovery, profile assembly, execute,
//! polling) and the operator mirror under `/api/admin` share one router.
//! Handlers authenticate, validate, and delegate to the service crates; the
//! error module is the single place typed service errors become statuses.

mod admin_handlers;
mod agent_handlers;
mod endpoints;
mod error;
mod server;
mod state;
mod types;

pub use endpoints::execution_poll_url;
pub use error::ApiError;
pub use server::{build_router, run_server};
pub use state::{AdminAuthMode, GatewayState};

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, StatusCode};

    use crate::error::ApiError;
    use crate::state::{bearer_token_from_headers, parse_json_body};

    #[test]
    fn bearer_parsing_requires_the_scheme_and_a_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token_from_headers(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token_from_headers(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token_from_headers(&headers), None);

        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer ark_aaaaaaaaaaaaaaaaaaaaaaaa"),
        );
        assert_eq!(
            bearer_token_from_headers(&headers).as_deref(),
            Some("ark_aaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn malformed_bodies_map_to_422() {
        #[derive(serde::Deserialize, Debug)]
        struct Body {
            #[allow(dead_code)]
            script: String,
        }
        let error = parse_json_body::<Body>(&axum::body::Bytes::from_static(b"not json"))
            .expect_err("must reject");
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        let error = parse_json_body::<Body>(&axum::body::Bytes::from_static(b"{}"))
            .expect_err("missing field");
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn auth_failures_map_to_401_with_stable_messages() {
        use airlock_profile::AuthError;

        let revoked = ApiError::from(AuthError::Revoked);
        assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);
        assert_eq!(revoked.message, "Profile has been revoked");

        let expired = ApiError::from(AuthError::Expired);
        assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired.message, "Profile has expired");

        let unknown = ApiError::from(AuthError::NotFound);
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.message, "Invalid API key");
    }

    #[test]
    fn state_conflicts_map_to_409_and_name_blockers() {
        use airlock_credential::CredentialError;

        let error = ApiError::from(CredentialError::InUse {
            name: "K".to_string(),
            locked_profile_ids: vec!["p2".to_string()],
        });
        assert_eq!(error.status, StatusCode::CONFLICT);
        assert!(error.message.contains("p2"));
    }

    #[test]
    fn validation_failures_map_to_422() {
        use airlock_credential::CredentialError;

        let error = ApiError::from(CredentialError::InvalidName("123bad".to_string()));
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn integrity_failures_stay_opaque() {
        use airlock_credential::CredentialError;
        use airlock_crypto::CryptoError;

        let error = ApiError::from(CredentialError::Crypto(CryptoError::BadCiphertext));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message, "internal error");
    }
}
