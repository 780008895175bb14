//! Capability matrix: `(role, action) -> allowed`. A plain `match`, in the
//! teacher's style (the codebase elsewhere prefers explicit matches over
//! pulling in a policy-table crate for a three-role system).

use super::principal::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Mutate,
    Admin,
}

/// `admin` can do anything; `user` may read and mutate (subject to the
/// resource-ownership check done separately by `PageManager`); `readonly`
/// may only read.
pub fn is_allowed(principal: &Principal, op: Operation) -> bool {
    if principal.is_admin() {
        return true;
    }
    match op {
        Operation::Admin => false,
        Operation::Mutate => principal.has_role("user"),
        Operation::Read => principal.has_role("user") || principal.has_role("readonly"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::Principal;

    fn principal(roles: &[&str]) -> Principal {
        Principal {
            user_id: "u1".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            scopes: vec![],
            session_id: None,
        }
    }

    #[test]
    fn readonly_cannot_mutate() {
        let p = principal(&["readonly"]);
        assert!(is_allowed(&p, Operation::Read));
        assert!(!is_allowed(&p, Operation::Mutate));
    }

    #[test]
    fn admin_bypasses_everything() {
        let p = principal(&["admin"]);
        assert!(is_allowed(&p, Operation::Admin));
    }

    #[test]
    fn user_cannot_administer() {
        let p = principal(&["user"]);
        assert!(is_allowed(&p, Operation::Mutate));
        assert!(!is_allowed(&p, Operation::Admin));
    }
}
