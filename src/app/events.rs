use super::actions::Action;
use crate::catalog::{Resolution, ResolveError, ResolveRequest};
use crate::notifier::InboundMessage;

#[derive(Debug)]
pub enum Event {
    Input(Action),
    Player(PlayerEvent),
    Network(NetworkEvent),
    Window(WindowEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Started,
    Paused,
    Position { seconds: f64 },
    Duration { seconds: f64 },
    Ended,
    Error(String),
}

#[derive(Debug)]
pub enum NetworkEvent {
    Resolved {
        request: ResolveRequest,
        result: Result<Resolution, ResolveError>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Attached,
    Message(InboundMessage),
    Detached,
}
