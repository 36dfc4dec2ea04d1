pub mod audit;
pub use audit::{AuditError, AuditEvent, AuditSink, Auditor, RequestContext, SeaOrmAuditSink};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, LoginOutcome, Profile, Registration};
pub use auth_service_impl::SeaOrmAuthService;
