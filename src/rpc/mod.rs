pub mod proto;
pub mod request_sender;
pub mod service;
pub mod transport;
