//! 联机对战的会话生命周期与消息路由。

pub mod messages;
pub mod registry;

pub use messages::{ClientMessage, Outbound, ParticipantId, ServerMessage, SessionId};
pub use registry::{Lifecycle, Participant, Session, SessionRegistry};
