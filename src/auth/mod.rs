pub mod auth;
pub mod authorizer;
