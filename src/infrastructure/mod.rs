pub mod axum_http;
pub mod mailer;
pub mod postgres;
