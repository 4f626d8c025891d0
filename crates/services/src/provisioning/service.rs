use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::ports::{
    AdminUserRequest, CredentialEmail, CredentialMailer, EmailError, ProvisioningError,
    TenantProvisioner,
};

/// Calls the storefront instance admin API over HTTP.
pub struct HttpTenantProvisioner {
    client: reqwest::Client,
    api_key: String,
}

impl HttpTenantProvisioner {
    pub fn new(config: &config::ProvisioningConfig) -> Self {
        // Timeout prevents a hung instance from stalling webhook processing
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TenantProvisioner for HttpTenantProvisioner {
    async fn create_admin_user(
        &self,
        instance_url: &str,
        request: &AdminUserRequest,
    ) -> Result<(), ProvisioningError> {
        if self.api_key.is_empty() {
            return Err(ProvisioningError::NotConfigured);
        }
        if instance_url.is_empty() {
            return Err(ProvisioningError::MissingInstanceUrl);
        }

        let url = format!(
            "{}/external/admin-users/",
            instance_url.trim_end_matches('/')
        );

        tracing::info!(
            "Provisioning admin user: instance_url={}, username={}",
            instance_url,
            request.username
        );

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProvisioningError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                "Admin user provisioned: instance_url={}, username={}, status={}",
                instance_url,
                request.username,
                status
            );
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProvisioningError::RejectedByInstance {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Sends the credential email through the configured SMTP relay.
pub struct SmtpCredentialMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpCredentialMailer {
    pub fn new(config: &config::EmailConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

const CREDENTIAL_EMAIL_SUBJECT: &str = "Suas Credenciais de Acesso ao BarberSites!";

fn credential_text_body(email: &CredentialEmail) -> String {
    format!(
        "Olá, {}!\n\n\
         Sua barbearia já está no ar. Use as credenciais abaixo para acessar o \
         painel administrativo da sua loja:\n\n\
         Usuário: {}\n\
         Senha: {}\n\n\
         Acesse em: {}\n\n\
         Recomendamos alterar a senha após o primeiro acesso.\n\n\
         Equipe BarberSites",
        email.full_name, email.username, email.password, email.login_url
    )
}

fn credential_html_body(email: &CredentialEmail) -> String {
    format!(
        "<html><body>\
         <p>Olá, <strong>{}</strong>!</p>\
         <p>Sua barbearia já está no ar. Use as credenciais abaixo para acessar o \
         painel administrativo da sua loja:</p>\
         <p>Usuário: <strong>{}</strong><br>\
         Senha: <strong>{}</strong></p>\
         <p><a href=\"{}\">Acessar o painel administrativo</a></p>\
         <p>Recomendamos alterar a senha após o primeiro acesso.</p>\
         <p>Equipe BarberSites</p>\
         </body></html>",
        email.full_name, email.username, email.password, email.login_url
    )
}

#[async_trait]
impl CredentialMailer for SmtpCredentialMailer {
    async fn send_credentials(&self, email: &CredentialEmail) -> Result<(), EmailError> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e| EmailError::BuildFailed(format!("from address: {}", e)))?;
        let to: Mailbox = email
            .recipient
            .parse()
            .map_err(|e| EmailError::BuildFailed(format!("recipient: {}", e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(CREDENTIAL_EMAIL_SUBJECT)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(credential_text_body(email)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(credential_html_body(email)),
                    ),
            )
            .map_err(|e| EmailError::BuildFailed(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        tracing::info!("Credential email sent: recipient={}", email.recipient);
        Ok(())
    }
}

/// Mailer used when SMTP is not configured. Every send fails, which the
/// caller logs and moves past.
pub struct DisabledMailer;

#[async_trait]
impl CredentialMailer for DisabledMailer {
    async fn send_credentials(&self, _email: &CredentialEmail) -> Result<(), EmailError> {
        Err(EmailError::NotConfigured)
    }
}

/// Test helpers for the provisioning and email ports
pub mod test_helpers {
    use super::*;
    use std::sync::Mutex;

    /// Records provisioning requests; optionally fails every call to exercise
    /// the email-suppression path.
    pub struct RecordingProvisioner {
        pub requests: Mutex<Vec<(String, AdminUserRequest)>>,
        fail: bool,
    }

    impl RecordingProvisioner {
        pub fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        /// A provisioner whose calls are recorded but always rejected
        pub fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl Default for RecordingProvisioner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TenantProvisioner for RecordingProvisioner {
        async fn create_admin_user(
            &self,
            instance_url: &str,
            request: &AdminUserRequest,
        ) -> Result<(), ProvisioningError> {
            self.requests
                .lock()
                .expect("lock poisoned")
                .push((instance_url.to_string(), request.clone()));

            if self.fail {
                Err(ProvisioningError::RejectedByInstance {
                    status: 500,
                    body: "simulated failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// Records sent credential emails instead of talking to SMTP.
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<CredentialEmail>>,
    }

    impl RecordingMailer {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl Default for RecordingMailer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CredentialMailer for RecordingMailer {
        async fn send_credentials(&self, email: &CredentialEmail) -> Result<(), EmailError> {
            self.sent.lock().expect("lock poisoned").push(email.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_email() -> CredentialEmail {
        CredentialEmail {
            recipient: "dono@example.com".to_string(),
            full_name: "João da Silva".to_string(),
            username: "dono".to_string(),
            password: "S3nha!forte".to_string(),
            login_url: "https://barbearia-alfa.com.br/admin/".to_string(),
        }
    }

    #[test]
    fn test_text_body_carries_credentials_and_login_url() {
        let body = credential_text_body(&sample_email());
        assert!(body.contains("João da Silva"));
        assert!(body.contains("Usuário: dono"));
        assert!(body.contains("Senha: S3nha!forte"));
        assert!(body.contains("https://barbearia-alfa.com.br/admin/"));
    }

    #[test]
    fn test_html_body_links_login_url() {
        let body = credential_html_body(&sample_email());
        assert!(body.contains("href=\"https://barbearia-alfa.com.br/admin/\""));
        assert!(body.contains("<strong>dono</strong>"));
    }
}
