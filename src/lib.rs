pub mod api;
pub mod config;
pub mod count;
pub mod fetch;
pub mod group;
pub mod navigation;
pub mod pattern;
pub mod query;
pub mod session;
pub mod viewer;
pub mod viewport;
pub mod worker;
