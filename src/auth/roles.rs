//! Role names, role sets and named policies.
//!
//! A policy maps to exactly one required role. A role list is satisfied by
//! any one of its members.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::AuthorizationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    ProductManager,
    InventoryManager,
    CustomerSupport,
    FinanceTeam,
    DeliveryTeam,
    AuditTeam,
    Customer,
    Seller,
}

impl Role {
    pub const ALL: [Self; 9] = [
        Self::Administrator,
        Self::ProductManager,
        Self::InventoryManager,
        Self::CustomerSupport,
        Self::FinanceTeam,
        Self::DeliveryTeam,
        Self::AuditTeam,
        Self::Customer,
        Self::Seller,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::ProductManager => "ProductManager",
            Self::InventoryManager => "InventoryManager",
            Self::CustomerSupport => "CustomerSupport",
            Self::FinanceTeam => "FinanceTeam",
            Self::DeliveryTeam => "DeliveryTeam",
            Self::AuditTeam => "AuditTeam",
            Self::Customer => "Customer",
            Self::Seller => "Seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Parses a comma separated role list such as `"Administrator,FinanceTeam"`.
pub fn parse_role_list(list: &str) -> Result<Vec<Role>, UnknownRole> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Roles held by an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    #[must_use]
    pub fn contains_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.0.contains(role))
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|role| role.as_str().to_string()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    #[must_use]
    pub const fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }

    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Allow iff the required role list and the held roles intersect.
#[must_use]
pub fn evaluate_role_list(required: &[Role], roles: &RoleSet) -> Decision {
    Decision::from_bool(roles.contains_any(required))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("Policy '{policy}' requires unknown role '{role}'")]
    UnknownRole { policy: String, role: String },
}

/// Named policies loaded from configuration. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Role>,
}

impl PolicyRegistry {
    pub fn from_config(config: &AuthorizationConfig) -> Result<Self, PolicyError> {
        let policies = config
            .policies
            .iter()
            .map(|(name, role)| {
                role.parse::<Role>()
                    .map(|role| (name.clone(), role))
                    .map_err(|_| PolicyError::UnknownRole {
                        policy: name.clone(),
                        role: role.clone(),
                    })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self { policies })
    }

    /// Returns the single role a policy requires.
    pub fn required_role(&self, policy: &str) -> Result<Role, PolicyError> {
        self.policies
            .get(policy)
            .copied()
            .ok_or_else(|| PolicyError::UnknownPolicy(policy.to_string()))
    }

    pub fn evaluate(&self, policy: &str, roles: &RoleSet) -> Result<Decision, PolicyError> {
        let role = self.required_role(policy)?;
        Ok(Decision::from_bool(roles.contains(role)))
    }

    pub fn requirement(&self, policy: &str) -> Result<Requirement, PolicyError> {
        let role = self.required_role(policy)?;
        Ok(Requirement::Policy {
            name: policy.to_string(),
            role,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// What a route demands of its caller before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Identity is resolved when a session is present but not required.
    Anonymous,
    Authenticated,
    Policy { name: String, role: Role },
    AnyRole(Vec<Role>),
}

impl Requirement {
    #[must_use]
    pub const fn requires_identity(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    /// Role stage of the gate. Only meaningful once an identity is known.
    #[must_use]
    pub fn evaluate(&self, roles: &RoleSet) -> Decision {
        match self {
            Self::Anonymous | Self::Authenticated => Decision::Allow,
            Self::Policy { role, .. } => Decision::from_bool(roles.contains(*role)),
            Self::AnyRole(required) => evaluate_role_list(required, roles),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Policy { name, .. } => write!(f, "policy {name}"),
            Self::AnyRole(roles) => {
                let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
                write!(f, "roles {}", names.join(","))
            }
        }
    }
}

/// Ownership stage of the gate.
///
/// Allowed when the caller owns the resource or holds one of the override
/// roles. A resource without an owner is reachable through overrides only.
#[must_use]
pub fn check_ownership(
    caller_id: &str,
    roles: &RoleSet,
    owner_id: Option<&str>,
    overrides: &[Role],
) -> Decision {
    if roles.contains_any(overrides) {
        return Decision::Allow;
    }

    Decision::from_bool(owner_id.is_some_and(|owner| owner == caller_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(list: &[Role]) -> RoleSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_role_round_trips_through_its_name() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("administrator".parse::<Role>().is_err());
    }

    #[test]
    fn test_parse_role_list() {
        assert_eq!(
            parse_role_list("Administrator, FinanceTeam"),
            Ok(vec![Role::Administrator, Role::FinanceTeam])
        );
        assert!(parse_role_list("Administrator,Wizard").is_err());
    }

    #[test]
    fn test_policy_allows_iff_role_present() {
        let registry = PolicyRegistry::from_config(&AuthorizationConfig::default()).unwrap();

        for required in Role::ALL {
            let policy = format!("Require{required}Role");
            let Ok(role) = registry.required_role(&policy) else {
                continue;
            };
            assert_eq!(role, required);

            for held in Role::ALL {
                let decision = registry.evaluate(&policy, &roles(&[held])).unwrap();
                assert_eq!(decision.is_allowed(), held == required, "{policy} vs {held}");
            }
            assert_eq!(
                registry.evaluate(&policy, &RoleSet::default()).unwrap(),
                Decision::Deny
            );
        }
    }

    #[test]
    fn test_unknown_policy_is_an_error() {
        let registry = PolicyRegistry::from_config(&AuthorizationConfig::default()).unwrap();
        assert_eq!(
            registry.requirement("RequireWizardRole"),
            Err(PolicyError::UnknownPolicy("RequireWizardRole".to_string()))
        );
    }

    #[test]
    fn test_policy_with_unknown_role_fails_to_load() {
        let mut config = AuthorizationConfig::default();
        config
            .policies
            .insert("RequireWizardRole".to_string(), "Wizard".to_string());

        assert!(matches!(
            PolicyRegistry::from_config(&config),
            Err(PolicyError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_role_list_is_logical_or() {
        let required = [Role::Administrator, Role::FinanceTeam];
        assert_eq!(
            evaluate_role_list(&required, &roles(&[Role::FinanceTeam])),
            Decision::Allow
        );
        assert_eq!(
            evaluate_role_list(&required, &roles(&[Role::Customer, Role::AuditTeam])),
            Decision::Deny
        );
        assert_eq!(evaluate_role_list(&[], &roles(&[Role::Administrator])), Decision::Deny);
    }

    #[test]
    fn test_ownership_override_bypasses_owner_check() {
        let overrides = [Role::Administrator, Role::CustomerSupport];

        assert_eq!(
            check_ownership("u1", &roles(&[Role::Customer]), Some("u1"), &overrides),
            Decision::Allow
        );
        assert_eq!(
            check_ownership("u1", &roles(&[Role::Customer]), Some("u2"), &overrides),
            Decision::Deny
        );
        assert_eq!(
            check_ownership("admin", &roles(&[Role::Administrator]), Some("u2"), &overrides),
            Decision::Allow
        );
        assert_eq!(
            check_ownership("u1", &roles(&[Role::Seller]), None, &overrides),
            Decision::Deny
        );
    }

    #[test]
    fn test_requirement_evaluation() {
        let customer = roles(&[Role::Customer]);
        assert!(Requirement::Authenticated.evaluate(&customer).is_allowed());
        assert!(!Requirement::Anonymous.requires_identity());
        assert!(
            !Requirement::Policy {
                name: "RequireFinanceTeamRole".to_string(),
                role: Role::FinanceTeam,
            }
            .evaluate(&customer)
            .is_allowed()
        );
        assert!(
            Requirement::AnyRole(vec![Role::Administrator, Role::Customer])
                .evaluate(&customer)
                .is_allowed()
        );
    }
}
