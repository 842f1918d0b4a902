//! Example services and wiring for the demo binaries: process-wide
//! config, the `UserService` example, and the glue that registers both
//! the cache service and the user service into one provider.

pub mod config;
pub mod user_service;
