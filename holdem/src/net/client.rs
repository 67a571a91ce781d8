//! A low-level TCP poker client.
//!
//! This client is blocking and so is primarily used as a testing utility
//! rather than an actual poker client.

use anyhow::{Error, bail};
use std::{
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use super::{
    super::{
        actions::{ActionKind, ActionRequest, ActionResult},
        game::entities::{Chips, SeatIndex},
    },
    messages::{ClientMessage, ServerMessage},
    utils,
};

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Client {
    /// Declared with every request. The server binds the connection to it
    /// on the first one.
    pub player_id: String,
    pub stream: TcpStream,
}

impl Client {
    pub fn connect(player_id: &str, addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse()?;
        let mut connect_timeouts = vec![
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_millis(100),
        ];
        while let Some(connect_timeout) = connect_timeouts.pop() {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                    return Ok(Self {
                        player_id: player_id.to_string(),
                        stream,
                    });
                }
                _ => thread::sleep(connect_timeout),
            }
        }
        bail!("couldn't connect to {addr} as {player_id}")
    }

    /// Send a request, declaring this client's player id.
    pub fn send(&mut self, request: ActionRequest) -> Result<(), Error> {
        let request = request.with_player_id(&self.player_id);
        utils::write_prefixed(&mut self.stream, &ClientMessage(request))?;
        Ok(())
    }

    pub fn recv(&mut self) -> Result<ServerMessage, Error> {
        Ok(utils::read_prefixed::<ServerMessage, TcpStream>(
            &mut self.stream,
        )?)
    }

    /// Receive the next action result, whether it's a reply to this client
    /// or news about someone else at the table.
    pub fn recv_result(&mut self) -> Result<ActionResult, Error> {
        match self.recv()? {
            ServerMessage::Result(result) => Ok(result),
            ServerMessage::ClientError(error) => bail!(error),
        }
    }

    /// Send a request and wait for the next result. Only use this when no
    /// one else at the table can be acting at the same time.
    pub fn request(&mut self, request: ActionRequest) -> Result<ActionResult, Error> {
        self.send(request)?;
        self.recv_result()
    }

    pub fn join_table(
        &mut self,
        table_id: &str,
        seat_idx: Option<SeatIndex>,
    ) -> Result<ActionResult, Error> {
        let mut request = ActionRequest::new(ActionKind::JoinTable, table_id);
        request.seat_index = seat_idx;
        self.request(request)
    }

    pub fn leave_table(&mut self, table_id: &str) -> Result<ActionResult, Error> {
        self.request(ActionRequest::new(ActionKind::LeaveTable, table_id))
    }

    pub fn sit(&mut self, table_id: &str, seat_idx: SeatIndex) -> Result<ActionResult, Error> {
        self.request(ActionRequest::new(ActionKind::Sit, table_id).with_seat(seat_idx))
    }

    pub fn start_hand(&mut self, table_id: &str) -> Result<ActionResult, Error> {
        self.request(ActionRequest::new(ActionKind::StartHand, table_id))
    }

    pub fn take_action(
        &mut self,
        table_id: &str,
        kind: ActionKind,
        amount: Option<Chips>,
    ) -> Result<ActionResult, Error> {
        let mut request = ActionRequest::new(kind, table_id);
        request.amount = amount;
        self.request(request)
    }
}
