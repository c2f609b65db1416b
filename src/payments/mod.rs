pub mod paypal_client;
pub mod provider;
pub mod stripe_client;
