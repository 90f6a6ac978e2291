pub mod calendar;
pub mod domain;
pub mod history;
pub mod ports;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use domain::{Me, Role, User, UserCredentials};
pub use ports::{PortError, PortResult};
pub use services::{ServiceConfig, Services};
