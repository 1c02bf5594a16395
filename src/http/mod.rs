pub mod client;
pub mod connector;
pub mod handler;
pub(crate) mod pool;
pub mod resolver;
pub(crate) mod stream;
