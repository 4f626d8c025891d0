pub mod ports;

// Re-export commonly used types
pub use ports::{
    BillingInterval, Customer, CustomerRepository, NewCustomer, NewPlan, NewShop, Plan,
    PlanRepository, Shop, ShopRepository, BRAZILIAN_STATES,
};
