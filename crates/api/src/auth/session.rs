//! Caller identity forwarded by the GraphQL gateway

use scholarsync_billing::Caller;
use scholarsync_shared::UserRole;
use serde::Deserialize;

use super::middleware::AuthError;

/// `session_variables` block of an action payload
///
/// The gateway has already verified the caller's token; these values are
/// trusted once the shared webhook secret has been checked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionVariables {
    #[serde(rename = "x-hasura-role", default)]
    pub role: Option<String>,
    #[serde(rename = "x-hasura-user-id", default)]
    pub user_id: Option<String>,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: UserRole,
    pub user_id: String,
}

impl Identity {
    pub fn from_session(session: &SessionVariables) -> Result<Self, AuthError> {
        let user_id = session
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::MissingAuth)?;
        let role = session.role.as_deref().ok_or(AuthError::MissingAuth)?;

        // Roles outside our vocabulary (anonymous, service roles) are not allowed through
        let role = role
            .parse::<UserRole>()
            .map_err(|_| AuthError::InsufficientPermissions)?;

        Ok(Self {
            role,
            user_id: user_id.to_string(),
        })
    }
}

impl From<Identity> for Caller {
    fn from(identity: Identity) -> Self {
        Caller {
            role: identity.role,
            user_id: identity.user_id,
        }
    }
}
