//! WebSocket Real-Time Streaming
//!
//! Pushes the session's snapshot, stats, status and new-lead notifications
//! to dashboard clients.
//!
//! ## Usage
//!
//! Clients connect to `/ws` and receive, in order, `connected`, `snapshot`,
//! `stats` and `status` messages, then updates as they happen. Sending
//! `{"type": "refresh"}` asks for a fresh snapshot and stats.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8090/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'notification') console.log(msg.message);
//! };
//! ```

mod handler;
mod messages;

pub use handler::websocket_handler;
pub use messages::{ClientMessage, ServerMessage};
