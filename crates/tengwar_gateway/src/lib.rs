pub mod server;
pub mod types;

pub use server::{router, AppState, GatewayServer};
pub use types::{ChatRequest, ChatResponse, WsInbound, WsOutbound};
