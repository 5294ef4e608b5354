//! Session bounded context - lifecycle of call sessions on the device

pub mod aggregate;
pub mod conference;
pub mod event;
pub mod record;
pub mod store;
pub mod value_object;

pub use aggregate::CallSession;
pub use conference::ConferenceGroups;
pub use event::{CallEvent, EventEnvelope, PendingEvent};
pub use record::SessionRecord;
pub use store::{Applied, Merged, SessionStore};
pub use value_object::{
    attr, Attributes, AudioRoute, AudioState, Direction, DisconnectCause, DisconnectReason,
    SessionState,
};
