pub mod ports;
pub mod service;

// Re-export commonly used types
pub use ports::{
    access_action_for, AccessAction, CancellationMode, CancellationOutcome, CheckoutRequest,
    CheckoutSessionCreated, FieldError, NewSubscription, StoreEventResult, Subscription,
    SubscriptionError, SubscriptionRepository, SubscriptionService, SubscriptionStatus,
    SubscriptionStatusPatch, SubscriptionStatusView, WebhookEvent, WebhookEventRepository,
};
pub use service::{SubscriptionServiceConfig, SubscriptionServiceImpl};
