pub mod blocking;
pub mod client;
pub mod command;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod session;
pub mod transport;

pub use blocking::BlockingCulliganApi;
pub use client::CulliganApi;
pub use command::{Action, Command, CommandPayload, DEFAULT_BYPASS_SECS};
pub use credentials::{AuthState, Credentials, LinkedCredentials};
pub use device::{Device, DeviceKind, RegistryEntry, SoftenerInfo};
pub use error::{AuthFailure, Error, Result};
pub use session::{Session, DEFAULT_BASE_URL};
pub use transport::{ApiRequest, ApiResponse, BlockingTransport, HttpMethod, Transport};
