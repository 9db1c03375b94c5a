//! Application services and ports for the authorization and workflow core.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_service;
mod authorization_ports;
mod authorization_service;
mod gateway;
mod workflow_ports;
mod workflow_service;

pub use audit_ports::{AuditTrailQuery, AuditTrailReader, MAX_AUDIT_PAGE_SIZE};
pub use audit_service::{AUDIT_READ_ACTION, AUDIT_RESOURCE, AuditTrailService};
pub use authorization_ports::{AuthorizationRepository, PermissionSetCache, TemplateTarget};
pub use authorization_service::{
    AuthorizationService, USER_RESOURCE, admin_actions,
};
pub use gateway::AuthorizationGateway;
pub use workflow_ports::ApplicationRepository;
pub use workflow_service::WorkflowService;
