//! Gateway Wire Protocol
//!
//! Frame types, handshake payloads and chat payload normalization shared by
//! the gateway client and anything that speaks to a gateway endpoint.
//!
//! ## Frames
//!
//! | kind  | fields                                   |
//! |-------|------------------------------------------|
//! | req   | `id`, `method`, `params`                 |
//! | res   | `id`, `ok`, `payload` or `error.message` |
//! | event | `event`, `payload`, optional `seq`       |

mod chat;
mod error;
mod frames;
mod handshake;

pub use chat::{
    ChatContent, ChatEvent, ChatEventKind, ContentBlock, MessageContent, CHAT_EVENT,
    PRESENCE_EVENT,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frames::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use handshake::{
    AuthToken, ChallengePayload, ClientIdentity, ConnectParams, HelloOk, CHALLENGE_EVENT,
    CLOSE_CONNECT_FAILED, CONNECT_METHOD, PROTOCOL_VERSION,
};
