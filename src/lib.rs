pub mod browser;
pub mod catalog;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod export;
pub mod frame;
pub mod history;
pub mod pool;
pub mod session;
pub mod subscription;
pub mod tls;

pub use browser::Browser;
pub use command::Command;
pub use config::Config;
pub use connection::Connection;
pub use endpoint::Endpoint;
pub use error::Error;
pub use frame::{Frame, Protocol};
pub use pool::Pool;
pub use session::Session;

pub type Result<T> = std::result::Result<T, Error>;
