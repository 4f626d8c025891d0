use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Body of the admin-user creation call to a tenant storefront instance.
#[derive(Debug, Clone, Serialize)]
pub struct AdminUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub external_subscription_id: String,
}

#[derive(Debug)]
pub enum ProvisioningError {
    /// No provisioning API key configured; configuration error, not retryable
    NotConfigured,
    /// The shop has no instance URL; configuration error, not retryable
    MissingInstanceUrl,
    /// Network-level failure or timeout talking to the instance
    RequestFailed(String),
    /// The instance answered with a non-2xx status
    RejectedByInstance { status: u16, body: String },
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Provisioning API key is not configured"),
            Self::MissingInstanceUrl => write!(f, "Shop has no instance URL"),
            Self::RequestFailed(msg) => write!(f, "Provisioning request failed: {}", msg),
            Self::RejectedByInstance { status, body } => {
                write!(f, "Instance rejected provisioning: status={} body={}", status, body)
            }
        }
    }
}

impl std::error::Error for ProvisioningError {}

/// Port for creating an admin account on a tenant storefront instance.
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// POST the admin-user request to `{instance_url}/external/admin-users/`.
    /// Any 2xx response counts as success.
    async fn create_admin_user(
        &self,
        instance_url: &str,
        request: &AdminUserRequest,
    ) -> Result<(), ProvisioningError>;
}

/// Credential email handed to a new shop owner after provisioning succeeds.
#[derive(Debug, Clone)]
pub struct CredentialEmail {
    pub recipient: String,
    pub full_name: String,
    pub username: String,
    pub password: String,
    pub login_url: String,
}

#[derive(Debug)]
pub enum EmailError {
    NotConfigured,
    /// Address or message assembly failed
    BuildFailed(String),
    /// SMTP delivery failed
    SendFailed(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "SMTP is not configured"),
            Self::BuildFailed(msg) => write!(f, "Failed to build email: {}", msg),
            Self::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
        }
    }
}

impl std::error::Error for EmailError {}

/// Port for the transactional credential email.
#[async_trait]
pub trait CredentialMailer: Send + Sync {
    async fn send_credentials(&self, email: &CredentialEmail) -> Result<(), EmailError>;
}
