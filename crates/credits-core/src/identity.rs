use crate::types::UserProfile;

/// Session identity consumed from the authentication collaborator.
///
/// The ledger treats an absent user as `NotAuthenticated` for every mutating
/// operation; it never manages sessions itself.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;
}
