pub mod contact_tags;
pub mod enrollments;
pub mod orders;
pub mod products;
pub mod subscriptions;
pub mod users;
pub mod webhook_events;
