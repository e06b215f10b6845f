pub mod admin_handler;
pub mod gateway_handler;
pub mod health_handler;
