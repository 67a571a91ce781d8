pub mod actions;
pub use actions::{ActionKind, ActionRequest, ActionResult, dispatch};

pub mod net;
pub use net::{client::Client, messages, server, utils};

pub mod game;
pub use game::{
    GameError, InternalError, Table, TableSettings, UserError,
    constants::{self, DEFAULT_MAX_SEATS, MAX_SEATS},
    entities::{
        self, DEFAULT_BIG_BLIND, DEFAULT_SMALL_BLIND, DEFAULT_STARTING_STACK, MAX_STARTING_STACK,
    },
    functional,
};

pub mod registry;
pub use registry::TableRegistry;
