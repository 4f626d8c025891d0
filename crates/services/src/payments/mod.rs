pub mod gateway;
pub mod ports;

// Re-export commonly used types
pub use gateway::test_helpers;
pub use gateway::StripeGateway;
pub use ports::{
    CheckoutSessionSpec, CreatedCheckoutSession, PaymentGateway, PaymentGatewayError,
    ProviderSubscription,
};
