use serde::{Deserialize, Serialize};
use std::fmt;

use crate::actions::{ActionRequest, ActionResult};

/// Problems with a connection rather than with what it asked for. The
/// server drops a connection right after telling it about one of these.
#[derive(Debug, Deserialize, Eq, thiserror::Error, PartialEq, Serialize)]
pub enum ClientError {
    #[error("identity already associated with another connection")]
    AlreadyAssociated,
    #[error("does not exist")]
    DoesNotExist,
    #[error("request identity doesn't match the connection's")]
    Unassociated,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientMessage(pub ActionRequest);

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0.player_id {
            Some(player_id) => write!(f, "{player_id} {}", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ServerMessage {
    /// The outcome of an action. Sent to whoever took the action, and on
    /// success to everyone else seated at the same table.
    Result(ActionResult),
    ClientError(ClientError),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            ServerMessage::Result(result) => write!(f, "{result}"),
            ServerMessage::ClientError(error) => write!(f, "{error}"),
        }
    }
}
