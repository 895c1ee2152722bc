//! # Permissions
//!
//! Permission predicates gate two things: whole packages during the site
//! introspection walk, and individual endpoints during dispatch. A predicate
//! only sees the [`Requester`]; how a requester is authenticated is decided
//! by the transport in front of the dispatcher.
//!
//! Predicates compose with [`all`], [`any`] and [`not`]:
//!
//! ```rust
//! use nsrouter::permissions::{any, not, HasPerm, InGroup, Permission, Requester};
//!
//! let rule = any(vec![HasPerm::arc("blog.publish"), InGroup::arc("editors")]);
//! let alice = Requester::user("alice").with_group("editors");
//! assert!(rule.has_permission(&alice));
//! assert!(!not(rule).has_permission(&alice));
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity and grants of whoever sent a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Authenticated user name; `None` for anonymous requests
    pub user: Option<String>,
    /// Group memberships
    #[serde(default)]
    pub groups: BTreeSet<String>,
    /// Individually granted permission names (e.g. `blog.publish`)
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Requester {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn user(name: &str) -> Self {
        Self {
            user: Some(name.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: &str) -> Self {
        self.groups.insert(group.to_string());
        self
    }

    #[must_use]
    pub fn with_permission(mut self, perm: &str) -> Self {
        self.permissions.insert(perm.to_string());
        self
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn has_perm(&self, perm: &str) -> bool {
        self.permissions.contains(perm)
    }

    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// A single permission predicate.
pub trait Permission: Send + Sync {
    fn has_permission(&self, requester: &Requester) -> bool;

    /// Label used in endpoint descriptions.
    fn name(&self) -> String;
}

/// Shared handle to a predicate, as stored in bindings and endpoint metadata.
pub type PermissionRef = Arc<dyn Permission>;

/// True when every predicate passes; an empty list passes.
#[must_use]
pub fn check_all(predicates: &[PermissionRef], requester: &Requester) -> bool {
    predicates.iter().all(|p| p.has_permission(requester))
}

pub struct AllowAny;

impl Permission for AllowAny {
    fn has_permission(&self, _requester: &Requester) -> bool {
        true
    }

    fn name(&self) -> String {
        "AllowAny".to_string()
    }
}

pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, requester: &Requester) -> bool {
        requester.is_authenticated()
    }

    fn name(&self) -> String {
        "IsAuthenticated".to_string()
    }
}

/// Requester is one specific user.
pub struct IsUser(pub String);

impl IsUser {
    pub fn arc(user: &str) -> PermissionRef {
        Arc::new(Self(user.to_string()))
    }
}

impl Permission for IsUser {
    fn has_permission(&self, requester: &Requester) -> bool {
        requester.user.as_deref() == Some(self.0.as_str())
    }

    fn name(&self) -> String {
        format!("user:{}", self.0)
    }
}

/// Requester holds a named permission.
pub struct HasPerm(pub String);

impl HasPerm {
    pub fn arc(perm: &str) -> PermissionRef {
        Arc::new(Self(perm.to_string()))
    }
}

impl Permission for HasPerm {
    fn has_permission(&self, requester: &Requester) -> bool {
        requester.has_perm(&self.0)
    }

    fn name(&self) -> String {
        format!("perm:{}", self.0)
    }
}

/// Requester belongs to a group (e.g. `user_manager`, `user_trusted`).
pub struct InGroup(pub String);

impl InGroup {
    pub fn arc(group: &str) -> PermissionRef {
        Arc::new(Self(group.to_string()))
    }
}

impl Permission for InGroup {
    fn has_permission(&self, requester: &Requester) -> bool {
        requester.in_group(&self.0)
    }

    fn name(&self) -> String {
        format!("group:{}", self.0)
    }
}

pub struct AllOf(pub Vec<PermissionRef>);

impl Permission for AllOf {
    fn has_permission(&self, requester: &Requester) -> bool {
        check_all(&self.0, requester)
    }

    fn name(&self) -> String {
        join_names("all", &self.0)
    }
}

pub struct AnyOf(pub Vec<PermissionRef>);

impl Permission for AnyOf {
    fn has_permission(&self, requester: &Requester) -> bool {
        self.0.iter().any(|p| p.has_permission(requester))
    }

    fn name(&self) -> String {
        join_names("any", &self.0)
    }
}

pub struct Not(pub PermissionRef);

impl Permission for Not {
    fn has_permission(&self, requester: &Requester) -> bool {
        !self.0.has_permission(requester)
    }

    fn name(&self) -> String {
        format!("not({})", self.0.name())
    }
}

fn join_names(op: &str, preds: &[PermissionRef]) -> String {
    let names: Vec<String> = preds.iter().map(|p| p.name()).collect();
    format!("{op}({})", names.join(", "))
}

pub fn all(preds: Vec<PermissionRef>) -> PermissionRef {
    Arc::new(AllOf(preds))
}

pub fn any(preds: Vec<PermissionRef>) -> PermissionRef {
    Arc::new(AnyOf(preds))
}

pub fn not(pred: PermissionRef) -> PermissionRef {
    Arc::new(Not(pred))
}
