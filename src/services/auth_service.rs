use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use validator::Validate;

use crate::config::Config;
use crate::dto::auth_dto::{AdminLoginRequest, CandidateLoginRequest, TokenResponse};
use crate::error::{Error, Result};
use crate::models::invitation::InvitationStatus;
use crate::models::user::{Claims, Role};
use crate::services::invitation_service::{normalize_email, InvitationService};
use crate::utils::crypto::verify_password;
use crate::utils::token::tokens_match;

#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    ttl_minutes: i64,
    admin_email: String,
    admin_password_hash: String,
    invitations: InvitationService,
}

impl AuthService {
    pub fn new(config: &Config, invitations: InvitationService) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            ttl_minutes: config.jwt_ttl_minutes,
            admin_email: normalize_email(&config.admin_email),
            admin_password_hash: config.admin_password_hash.clone(),
            invitations,
        }
    }

    pub async fn login_admin(&self, req: AdminLoginRequest) -> Result<TokenResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);
        let password_ok = verify_password(&req.password, &self.admin_password_hash)
            .map_err(|e| Error::Config(format!("ADMIN_PASSWORD_HASH is not a valid hash: {}", e)))?;
        if email != self.admin_email || !password_ok {
            tracing::warn!(email = %email, "admin login refused");
            return Err(Error::Unauthorized("invalid_credentials".to_string()));
        }
        tracing::info!(email = %email, "admin signed in");
        self.issue(&email, Role::Admin)
    }

    /// Candidates sign in with the access token from any of their
    /// invitations that has not been revoked.
    pub async fn login_candidate(&self, req: CandidateLoginRequest) -> Result<TokenResponse> {
        req.validate()?;
        let email = normalize_email(&req.email);
        let presented = req.access_token.trim();
        let matched = self
            .invitations
            .list_for_email(&email)
            .await
            .into_iter()
            .filter(|inv| inv.status != InvitationStatus::Revoked)
            .fold(false, |found, inv| tokens_match(presented, &inv.access_token) | found);
        if !matched {
            tracing::warn!(email = %email, "candidate login refused");
            return Err(Error::Unauthorized("invalid_credentials".to_string()));
        }
        self.issue(&email, Role::Candidate)
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<TokenResponse> {
        let exp = Utc::now() + Duration::minutes(self.ttl_minutes);
        let claims = Claims {
            sub: subject.to_string(),
            role,
            exp: exp.timestamp() as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_minutes * 60,
            role,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::admin_dto::InviteCandidate;
    use crate::models::test::fixtures::physics_101;
    use crate::services::mail_service::LogMailer;
    use crate::utils::crypto::hash_password;
    use std::sync::Arc;

    fn service() -> AuthService {
        let invitations = InvitationService::new(Arc::new(LogMailer), "http://localhost:3000".into(), 72);
        AuthService {
            jwt_secret: "test_secret_key".into(),
            ttl_minutes: 60,
            admin_email: "admin@example.com".into(),
            admin_password_hash: hash_password("s3cret").unwrap(),
            invitations,
        }
    }

    #[tokio::test]
    async fn admin_login_issues_admin_token() {
        let auth = service();
        let resp = auth
            .login_admin(AdminLoginRequest {
                email: "Admin@Example.com".into(),
                password: "s3cret".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.role, Role::Admin);
        assert_eq!(resp.expires_in, 3600);

        let claims = auth.verify(&resp.access_token).unwrap();
        assert_eq!(claims.sub, "admin@example.com");
        assert_eq!(claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let auth = service();
        let err = auth
            .login_admin(AdminLoginRequest {
                email: "admin@example.com".into(),
                password: "guess".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn candidate_login_needs_a_live_invitation_token() {
        let auth = service();
        let outcome = auth
            .invitations
            .invite(
                &physics_101(),
                vec![InviteCandidate {
                    email: "ada@example.com".into(),
                    name: None,
                }],
                None,
            )
            .await
            .unwrap();
        let invitation = &outcome.created[0];

        let ok = auth
            .login_candidate(CandidateLoginRequest {
                email: "ada@example.com".into(),
                access_token: invitation.access_token.clone(),
            })
            .await
            .unwrap();
        assert_eq!(auth.verify(&ok.access_token).unwrap().role, Role::Candidate);

        let wrong = auth
            .login_candidate(CandidateLoginRequest {
                email: "bob@example.com".into(),
                access_token: invitation.access_token.clone(),
            })
            .await;
        assert!(matches!(wrong, Err(Error::Unauthorized(_))));

        auth.invitations.revoke(invitation.id).await.unwrap();
        let revoked = auth
            .login_candidate(CandidateLoginRequest {
                email: "ada@example.com".into(),
                access_token: invitation.access_token.clone(),
            })
            .await;
        assert!(matches!(revoked, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = service();
        let token = auth.issue("admin@example.com", Role::Admin).unwrap().access_token;
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(matches!(auth.verify(&tampered), Err(Error::Jwt(_))));
    }
}
