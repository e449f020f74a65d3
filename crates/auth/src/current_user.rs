use crate::principal::Principal;

/// Read-only access to the identity of the current request.
///
/// Every accessor is total: an anonymous request yields `None`/empty values
/// and `is_authenticated() == false`.
pub trait CurrentUser {
    fn principal(&self) -> Option<&Principal>;

    fn user_id(&self) -> Option<&str> {
        self.principal().map(|p| p.user_id.as_str()).filter(|id| !id.is_empty())
    }

    /// `preferred_username`, then `name`.
    fn user_name(&self) -> Option<&str> {
        self.principal().and_then(Principal::user_name)
    }

    fn email(&self) -> Option<&str> {
        self.principal().and_then(|p| p.email.as_deref())
    }

    fn roles(&self) -> Vec<&str> {
        self.principal()
            .map(|p| p.roles.iter().map(|r| r.as_str()).collect())
            .unwrap_or_default()
    }

    fn capabilities(&self) -> Vec<&str> {
        self.principal()
            .map(|p| p.capabilities.iter().map(|c| c.as_str()).collect())
            .unwrap_or_default()
    }

    fn is_authenticated(&self) -> bool {
        self.principal().is_some()
    }

    fn is_in_role(&self, role: &str) -> bool {
        self.principal().is_some_and(|p| p.has_role(role))
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.principal().is_some_and(|p| p.has_capability(capability))
    }

    fn claim(&self, kind: &str) -> Option<String> {
        self.principal().and_then(|p| p.claim(kind))
    }
}

impl CurrentUser for Principal {
    fn principal(&self) -> Option<&Principal> {
        Some(self)
    }
}

impl CurrentUser for Option<Principal> {
    fn principal(&self) -> Option<&Principal> {
        self.as_ref()
    }
}
