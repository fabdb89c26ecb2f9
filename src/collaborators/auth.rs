use std::collections::HashMap;

use async_trait::async_trait;

use super::{Authenticator, CollaboratorResult};
use crate::common::Requester;
use crate::error::CollaboratorError;

/// Static bearer-token table. Stands in for the real token issuer: each
/// token maps straight to the identity and role it was issued for.
pub struct TokenAuthenticator {
    grants: HashMap<String, Requester>,
}

impl TokenAuthenticator {
    pub fn new(grants: HashMap<String, Requester>) -> Self {
        let grants = grants
            .into_iter()
            .map(|(token, requester)| (token, Requester::new(&requester.identity, requester.role)))
            .collect();
        Self { grants }
    }
}

/// Accepts both `Bearer <token>` and a bare token.
fn bearer_token(credential: &str) -> Option<&str> {
    let credential = credential.trim();
    let token = match credential.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        Some(_) => return None,
        None => credential,
    };
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn verify(&self, credential: &str) -> CollaboratorResult<Requester> {
        let token = bearer_token(credential).ok_or(CollaboratorError::InvalidCredential)?;
        self.grants
            .get(token)
            .cloned()
            .ok_or(CollaboratorError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Role;

    fn authenticator() -> TokenAuthenticator {
        let mut grants = HashMap::new();
        grants.insert(
            "t-ada".to_string(),
            Requester {
                identity: " Ada@X.io ".into(),
                role: Role::Customer,
            },
        );
        TokenAuthenticator::new(grants)
    }

    #[tokio::test]
    async fn verifies_bearer_and_bare_tokens() {
        let auth = authenticator();
        let requester = auth.verify("Bearer t-ada").await.unwrap();
        assert_eq!(requester.identity, "ada@x.io");
        assert_eq!(requester.role, Role::Customer);
        assert_eq!(auth.verify("t-ada").await.unwrap(), requester);
    }

    #[tokio::test]
    async fn rejects_unknown_or_malformed_credentials() {
        let auth = authenticator();
        assert!(matches!(
            auth.verify("Bearer nope").await,
            Err(CollaboratorError::InvalidCredential)
        ));
        assert!(auth.verify("Basic t-ada").await.is_err());
        assert!(auth.verify("   ").await.is_err());
    }
}
