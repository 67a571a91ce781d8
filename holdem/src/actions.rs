//! Typed action requests and the handlers that apply them to tables.
//!
//! Every request goes through [`dispatch`], which picks a handler based on
//! the request's kind. Handlers either succeed with a message and a view of
//! the table, fail with a [`UserError`] that leaves the table untouched, or
//! fail with an [`InternalError`] that means something is broken.

use enum_dispatch::enum_dispatch;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    game::{
        Departure, GameError, InternalError, Joined, Table, UserError,
        entities::{Action, Chips, SeatIndex, TableSnapshot},
    },
    registry::{self, TableRegistry},
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    JoinTable,
    LeaveTable,
    Sit,
    SitOut,
    Ready,
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
    StartHand,
    Timeout,
    Chat,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::JoinTable => "JOIN_TABLE",
            Self::LeaveTable => "LEAVE_TABLE",
            Self::Sit => "SIT",
            Self::SitOut => "SIT_OUT",
            Self::Ready => "READY",
            Self::Fold => "FOLD",
            Self::Check => "CHECK",
            Self::Call => "CALL",
            Self::Bet => "BET",
            Self::Raise => "RAISE",
            Self::AllIn => "ALL_IN",
            Self::StartHand => "START_HAND",
            Self::Timeout => "TIMEOUT",
            Self::Chat => "CHAT",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionRequest {
    pub action_type: ActionKind,
    /// Chips to put in for bets and raises.
    pub amount: Option<Chips>,
    pub table_id: String,
    pub seat_index: Option<SeatIndex>,
    /// Self-declared identity. Only used when whoever forwards the request
    /// has nothing better to go on.
    pub player_id: Option<String>,
}

impl ActionRequest {
    pub fn new(action_type: ActionKind, table_id: &str) -> Self {
        Self {
            action_type,
            amount: None,
            table_id: table_id.to_string(),
            seat_index: None,
            player_id: None,
        }
    }

    #[must_use]
    pub fn with_amount(mut self, amount: Chips) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn with_seat(mut self, seat_idx: SeatIndex) -> Self {
        self.seat_index = Some(seat_idx);
        self
    }

    #[must_use]
    pub fn with_player_id(mut self, player_id: &str) -> Self {
        self.player_id = Some(player_id.to_string());
        self
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:?}", self.action_type, self.table_id)?;
        if let Some(seat_idx) = self.seat_index {
            write!(f, " seat {seat_idx}")?;
        }
        if let Some(amount) = self.amount {
            write!(f, " for ${amount}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: Option<String>,
    pub action_type: ActionKind,
    pub player_id: String,
    pub table_id: String,
    pub seat_index: Option<SeatIndex>,
    pub amount: Option<Chips>,
    /// The table as seen by whoever this result is addressed to.
    pub table_state: Option<TableSnapshot>,
}

impl ActionResult {
    /// A failed result. Failures never carry table state.
    pub fn rejected(identity: &str, request: &ActionRequest, message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            action_type: request.action_type,
            player_id: identity.to_string(),
            table_id: request.table_id.clone(),
            seat_index: request.seat_index,
            amount: request.amount,
            table_state: None,
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "failed" };
        write!(f, "{} {} {status}", self.player_id, self.action_type)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// What a handler hands back on success.
#[derive(Debug, Default)]
pub struct Handled {
    pub message: Option<String>,
    pub seat_index: Option<SeatIndex>,
    pub amount: Option<Chips>,
    pub snapshot: Option<TableSnapshot>,
}

impl Handled {
    fn new(table: &Table, identity: &str, message: String) -> Self {
        Self {
            message: Some(message),
            seat_index: table.seat_of(identity),
            amount: None,
            snapshot: Some(table.snapshot(Some(identity))),
        }
    }
}

fn require_table_id(request: &ActionRequest) -> Result<&str, UserError> {
    let table_id = request.table_id.trim();
    if table_id.is_empty() {
        return Err(UserError::MissingTableId);
    }
    Ok(table_id)
}

fn existing_table(
    registry: &TableRegistry,
    request: &ActionRequest,
) -> Result<Arc<Mutex<Table>>, GameError> {
    let table_id = require_table_id(request)?;
    match registry.get(table_id)? {
        Some(table) => Ok(table),
        None => Err(UserError::TableNotFound.into()),
    }
}

/// Turn checks shared by all betting actions. Returns the acting seat.
pub fn validate(
    registry: &TableRegistry,
    identity: &str,
    request: &ActionRequest,
) -> Result<SeatIndex, GameError> {
    let table = existing_table(registry, request)?;
    let table = registry::lock(&request.table_id, &table)?;
    Ok(table.validate_turn(identity)?)
}

#[enum_dispatch]
pub trait ActionHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError>;
}

#[derive(Debug)]
pub struct JoinTableHandler;

impl ActionHandler for JoinTableHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table_id = require_table_id(request)?;
        let table = registry.get_or_create(table_id)?;
        let mut table = registry::lock(table_id, &table)?;
        let message = match table.join(identity, request.player_id.as_deref(), request.seat_index)? {
            Joined::Seated(seat_idx) => format!("joined seat {seat_idx}"),
            Joined::AlreadySeated(_) => "already at table".to_string(),
        };
        Ok(Handled::new(&table, identity, message))
    }
}

#[derive(Debug)]
pub struct LeaveTableHandler;

impl ActionHandler for LeaveTableHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table = existing_table(registry, request)?;
        let mut table = registry::lock(&request.table_id, &table)?;
        let (seat_index, message) = match table.leave(identity)? {
            Departure::NotSeated => (None, "not at table".to_string()),
            Departure::Left { seat, name } => (Some(seat), format!("{name} left the table")),
            Departure::AfterHand { seat, name } => {
                (Some(seat), format!("{name} will leave after this hand"))
            }
        };
        Ok(Handled {
            seat_index,
            ..Handled::new(&table, identity, message)
        })
    }
}

#[derive(Debug)]
pub struct SitHandler;

impl ActionHandler for SitHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        require_table_id(request)?;
        let seat_idx = request.seat_index.ok_or(UserError::SeatRequired)?;
        let table = existing_table(registry, request)?;
        let mut table = registry::lock(&request.table_id, &table)?;
        table.sit(identity, request.player_id.as_deref(), seat_idx)?;
        Ok(Handled::new(&table, identity, format!("sat at seat {seat_idx}")))
    }
}

#[derive(Debug)]
pub struct StartHandHandler;

impl ActionHandler for StartHandHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table = existing_table(registry, request)?;
        let mut table = registry::lock(&request.table_id, &table)?;
        table.start_hand()?;
        let message = format!("hand #{} started", table.hand_count());
        Ok(Handled::new(&table, identity, message))
    }
}

/// Handles every kind that's only allowed on the player's turn.
#[derive(Debug)]
pub struct BettingHandler(pub ActionKind);

impl BettingHandler {
    fn action(&self, amount: Option<Chips>) -> Result<Action, UserError> {
        let required = || amount.filter(|amount| *amount > 0).ok_or(UserError::InvalidAmount);
        let action = match self.0 {
            ActionKind::Fold => Action::Fold,
            ActionKind::Check => Action::Check,
            ActionKind::Call => Action::Call,
            ActionKind::Bet => Action::Bet(required()?),
            ActionKind::Raise => Action::Raise(required()?),
            ActionKind::AllIn => Action::AllIn,
            _ => return Err(UserError::NotBetting),
        };
        Ok(action)
    }
}

impl ActionHandler for BettingHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table = existing_table(registry, request)?;
        let mut table = registry::lock(&request.table_id, &table)?;
        let seat_idx = table.validate_turn(identity)?;
        let action = self.action(request.amount)?;
        let committed = table.act(seat_idx, action)?;
        Ok(Handled {
            seat_index: Some(seat_idx),
            amount: Some(committed),
            ..Handled::new(&table, identity, action.to_string())
        })
    }
}

/// Folds whoever is due to act. Only the server should route these here.
#[derive(Debug)]
pub struct TimeoutHandler;

impl ActionHandler for TimeoutHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table = existing_table(registry, request)?;
        let mut table = registry::lock(&request.table_id, &table)?;
        let seat_idx = table.force_fold()?;
        Ok(Handled {
            seat_index: Some(seat_idx),
            ..Handled::new(&table, identity, format!("seat {seat_idx} timed out"))
        })
    }
}

/// Accepted but without any effect on the table.
#[derive(Debug)]
pub struct NoopHandler;

impl ActionHandler for NoopHandler {
    fn handle(
        &self,
        registry: &TableRegistry,
        identity: &str,
        request: &ActionRequest,
    ) -> Result<Handled, GameError> {
        let table_id = request.table_id.trim();
        let snapshot = match registry.get(table_id)? {
            Some(table) => Some(registry::lock(table_id, &table)?.snapshot(Some(identity))),
            None => None,
        };
        Ok(Handled {
            snapshot,
            ..Handled::default()
        })
    }
}

#[enum_dispatch(ActionHandler)]
#[derive(Debug)]
pub enum Handler {
    JoinTableHandler,
    LeaveTableHandler,
    SitHandler,
    StartHandHandler,
    BettingHandler,
    TimeoutHandler,
    NoopHandler,
}

impl From<ActionKind> for Handler {
    fn from(value: ActionKind) -> Self {
        match value {
            ActionKind::JoinTable => JoinTableHandler.into(),
            ActionKind::LeaveTable => LeaveTableHandler.into(),
            ActionKind::Sit => SitHandler.into(),
            ActionKind::StartHand => StartHandHandler.into(),
            ActionKind::Timeout => TimeoutHandler.into(),
            ActionKind::SitOut | ActionKind::Ready | ActionKind::Chat => NoopHandler.into(),
            kind => BettingHandler(kind).into(),
        }
    }
}

/// Apply a request on behalf of `identity`. User errors come back as a
/// failed result; only broken invariants are returned as errors.
pub fn dispatch(
    registry: &TableRegistry,
    identity: &str,
    request: &ActionRequest,
) -> Result<ActionResult, InternalError> {
    let handler = Handler::from(request.action_type);
    match handler.handle(registry, identity, request) {
        Ok(handled) => {
            info!("{identity} {request}");
            Ok(ActionResult {
                success: true,
                message: handled.message,
                action_type: request.action_type,
                player_id: identity.to_string(),
                table_id: request.table_id.trim().to_string(),
                seat_index: handled.seat_index.or(request.seat_index),
                amount: handled.amount.or(request.amount),
                table_state: handled.snapshot,
            })
        }
        Err(GameError::User(error)) => {
            error!("{error}: {identity} {request}");
            Ok(ActionResult::rejected(identity, request, error.to_string()))
        }
        Err(GameError::Internal(error)) => Err(error),
    }
}
