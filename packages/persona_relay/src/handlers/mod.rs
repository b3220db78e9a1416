mod chat;
mod health;
mod websocket;

pub use chat::*;
pub use health::*;
pub use websocket::*;
