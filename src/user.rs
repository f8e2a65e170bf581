//! Profile of the launching user, read from the stored ID token.

use serde::{Deserialize, Serialize};

use crate::client::jwt::IdTokenClaims;

/// The signed-in EHR user.
///
/// Fields map to the standard OpenID Connect claims plus `fhirUser`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Subject claim of the ID token.
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,

    pub preferred_username: Option<String>,

    /// FHIR resource reference, e.g. `Practitioner/a-1.Practitioner-2`.
    ///
    /// Only present when the `fhirUser` scope was granted.
    pub fhir_user: Option<String>,
}

impl User {
    /// Creates a user with only the subject set.
    ///
    /// # Example
    ///
    /// ```
    /// # use oidc_launch::User;
    /// let user = User::new("a-1.User-2".to_string());
    /// assert_eq!(user.id, "a-1.User-2");
    /// assert!(user.fhir_user.is_none());
    /// ```
    pub fn new(id: String) -> Self {
        Self {
            id,
            email: None,
            name: None,
            preferred_username: None,
            fhir_user: None,
        }
    }

    /// Name to show in the UI.
    ///
    /// Prefers `name`, then `preferred_username`, then email, then the subject.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.preferred_username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }

    /// Resource type half of `fhir_user` (`Practitioner`, `Patient`, ...).
    pub fn fhir_resource_type(&self) -> Option<&str> {
        self.fhir_user
            .as_deref()
            .and_then(|reference| reference.split_once('/'))
            .map(|(resource_type, _)| resource_type)
    }
}

impl From<IdTokenClaims> for User {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            preferred_username: claims.preferred_username,
            fhir_user: claims.fhir_user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> IdTokenClaims {
        IdTokenClaims {
            sub: "a-1.User-2".to_string(),
            name: None,
            preferred_username: Some("jdoe".to_string()),
            email: Some("jdoe@example.com".to_string()),
            fhir_user: Some("Practitioner/a-1.Practitioner-2".to_string()),
        }
    }

    #[test]
    fn test_user_from_claims() {
        let user = User::from(claims());

        assert_eq!(user.id, "a-1.User-2");
        assert_eq!(user.email.as_deref(), Some("jdoe@example.com"));
        assert_eq!(
            user.fhir_user.as_deref(),
            Some("Practitioner/a-1.Practitioner-2")
        );
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = User::from(claims());
        assert_eq!(user.display_name(), "jdoe");

        user.name = Some("Jane Doe".to_string());
        assert_eq!(user.display_name(), "Jane Doe");

        let bare = User::new("a-1.User-3".to_string());
        assert_eq!(bare.display_name(), "a-1.User-3");
    }

    #[test]
    fn test_fhir_resource_type() {
        assert_eq!(
            User::from(claims()).fhir_resource_type(),
            Some("Practitioner")
        );
        assert_eq!(User::new("x".to_string()).fhir_resource_type(), None);
    }
}
