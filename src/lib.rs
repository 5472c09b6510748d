pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod normalize;
pub mod pipeline;
pub mod poller;
pub mod state;
pub mod store;
pub mod window;
