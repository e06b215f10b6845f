//! # Web 层
//!
//! 基于 axum 的薄 HTTP 外壳：把请求交给 [`crate::gateway::Gateway`]，
//! 再把结果和错误映射成 HTTP 响应。

pub mod server;
pub mod handlers;
pub mod dto;
pub mod middleware;
pub mod error;

pub use server::{AppState, WebServer, router};
