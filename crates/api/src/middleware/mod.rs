pub mod service_auth;

pub use service_auth::{service_auth_middleware, ServiceAuthState};
