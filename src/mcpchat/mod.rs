pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod orchestration;
pub mod session_store;
pub mod tool_protocol;
pub mod tool_protocols;

#[cfg(feature = "server")]
pub mod http_adapter;
#[cfg(feature = "server")]
pub mod ws_adapter;

