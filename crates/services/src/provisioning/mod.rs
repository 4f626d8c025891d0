pub mod ports;
pub mod service;

// Re-export commonly used types
pub use ports::{
    AdminUserRequest, CredentialEmail, CredentialMailer, EmailError, ProvisioningError,
    TenantProvisioner,
};
pub use service::test_helpers;
pub use service::{DisabledMailer, HttpTenantProvisioner, SmtpCredentialMailer};
