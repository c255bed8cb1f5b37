//! Role checks applied before action handlers run

use scholarsync_shared::UserRole;

use super::middleware::AuthError;
use super::session::Identity;

/// Allow the identity through only if its role is in `allowed`
pub fn authorize(identity: &Identity, allowed: &[UserRole]) -> Result<(), AuthError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %identity.user_id,
            role = %identity.role,
            "authorize: role not permitted"
        );
        Err(AuthError::InsufficientPermissions)
    }
}
