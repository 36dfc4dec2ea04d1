//! Authentication and authorization primitives shared by the HTTP layer.

pub mod lockout;
pub mod password;
pub mod roles;
pub mod session;

pub use lockout::{LockoutPolicy, LockoutState};
pub use password::{PasswordHasher, validate_password};
pub use roles::{
    Decision, PolicyError, PolicyRegistry, Requirement, Role, RoleSet, UnknownRole,
    check_ownership, evaluate_role_list, parse_role_list,
};
pub use session::{AUTH_SCHEME, SessionCookies, SessionTicket};
