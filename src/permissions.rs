use crate::{auth::AuthUser, errors::ApiError, models::user::ROLE_ADMIN};

/// Role gate for admin-only operations. The role comes from the validated
/// token claims, so this is a pure check with no store lookup.
pub fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if user.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::ROLE_USER;

    #[test]
    fn admin_passes_user_is_forbidden() {
        let admin = AuthUser {
            user_id: "a".into(),
            role: ROLE_ADMIN.into(),
        };
        let user = AuthUser {
            user_id: "u".into(),
            role: ROLE_USER.into(),
        };
        assert!(require_admin(&admin).is_ok());
        assert_eq!(require_admin(&user), Err(ApiError::Forbidden));
    }
}
