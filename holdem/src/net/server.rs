use anyhow::{Error, bail};
use log::{debug, error, info};
use mio::{
    Events, Interest, Poll, Token, Waker,
    net::{TcpListener, TcpStream},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    io,
    net::SocketAddr,
    sync::{
        Arc,
        mpsc::{Receiver, RecvTimeoutError, Sender, channel},
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    actions::{self, ActionKind, ActionRequest, ActionResult},
    game::{
        TableSettings, UserError, constants::MAX_USER_INPUT_LENGTH,
        entities::{RandomShuffle, TurnMarker},
    },
    registry::TableRegistry,
};

use super::{
    messages::{ClientError, ClientMessage, ServerMessage},
    utils::{read_prefixed, write_prefixed},
};

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_NETWORK_EVENTS: usize = 1024;
pub const MAX_NETWORK_EVENTS_PER_USER: usize = 6;
pub const SERVER: Token = Token(0);
pub const WAKER: Token = Token(1);
/// Identity the server acts under when it times out a turn. No
/// connection may claim it.
pub const SYSTEM_IDENTITY: &str = "system";

/// A request that made it past connection checks, tagged with the
/// identity bound to the connection it came from.
#[derive(Debug)]
struct ClientRequest {
    identity: String,
    request: ActionRequest,
}

/// A message from the dispatch thread to the IO thread, addressed by
/// identity. Messages for identities without a connection are dropped.
#[derive(Debug)]
struct ServerData {
    identity: String,
    msg: ServerMessage,
}

fn token_to_string(token: &Token) -> String {
    let id = token.0;
    format!("token({id})")
}

pub struct ServerTimeouts {
    /// How long a player gets to act before they're folded.
    pub action: Duration,
    /// How often the dispatch thread wakes up to check turn timers, and
    /// how long the IO thread blocks waiting for events.
    pub poll: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            action: DEFAULT_ACTION_TIMEOUT,
            poll: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Default)]
pub struct ServerConfig {
    pub settings: TableSettings,
    pub timeouts: ServerTimeouts,
}

impl From<TableSettings> for ServerConfig {
    fn from(value: TableSettings) -> Self {
        Self {
            settings: value,
            timeouts: ServerTimeouts::default(),
        }
    }
}

impl From<ServerTimeouts> for ServerConfig {
    fn from(value: ServerTimeouts) -> Self {
        Self {
            settings: TableSettings::default(),
            timeouts: value,
        }
    }
}

/// Connection bookkeeping for the IO thread.
///
/// - Keeps tokens bounded by recycling the tokens of dropped connections.
/// - Binds each connection to an identity the first time it sends a
///   request, and keeps identities unique across connections.
/// - Owns the streams so dropping a session closes its connection.
struct Sessions {
    /// Anonymous identities are numbered separately from tokens since
    /// tokens get reused.
    anonymous_count: u64,
    identities: HashMap<Token, String>,
    recycled_tokens: BTreeSet<Token>,
    streams: BTreeMap<Token, TcpStream>,
    tokens: HashMap<String, Token>,
}

impl Sessions {
    fn new() -> Self {
        Self {
            anonymous_count: 0,
            identities: HashMap::new(),
            recycled_tokens: BTreeSet::new(),
            streams: BTreeMap::new(),
            tokens: HashMap::new(),
        }
    }

    fn new_token(&mut self) -> Token {
        match self.recycled_tokens.pop_first() {
            Some(token) => token,
            None => {
                let newest = self.streams.last_key_value().map_or(&WAKER, |(token, _)| token);
                Token(newest.0 + 1)
            }
        }
    }

    fn insert(&mut self, token: Token, stream: TcpStream) {
        self.streams.insert(token, stream);
    }

    /// Resolve the identity a request from `token` acts under. The first
    /// non-blank player id a connection declares becomes its identity for
    /// good; connections that never declare one are anonymous.
    fn identify(&mut self, token: Token, declared: Option<&str>) -> Result<String, ClientError> {
        let declared = declared
            .map(str::trim)
            .filter(|player_id| !player_id.is_empty())
            .map(|player_id| player_id.chars().take(MAX_USER_INPUT_LENGTH).collect::<String>());
        if let Some(identity) = self.identities.get(&token) {
            return match declared {
                Some(declared) if &declared != identity => Err(ClientError::Unassociated),
                _ => Ok(identity.clone()),
            };
        }
        if !self.streams.contains_key(&token) {
            return Err(ClientError::DoesNotExist);
        }
        let identity = match declared {
            Some(identity) => identity,
            None => loop {
                self.anonymous_count += 1;
                let identity = format!("anonymous-{}", self.anonymous_count);
                if !self.tokens.contains_key(&identity) {
                    break identity;
                }
            },
        };
        if identity == SYSTEM_IDENTITY || self.tokens.contains_key(&identity) {
            return Err(ClientError::AlreadyAssociated);
        }
        self.identities.insert(token, identity.clone());
        self.tokens.insert(identity.clone(), token);
        Ok(identity)
    }

    fn get_identity(&self, token: &Token) -> Option<&String> {
        self.identities.get(token)
    }

    fn get_mut_stream(&mut self, token: &Token) -> Result<&mut TcpStream, ClientError> {
        self.streams.get_mut(token).ok_or(ClientError::DoesNotExist)
    }

    fn get_token(&self, identity: &str) -> Option<Token> {
        self.tokens.get(identity).copied()
    }

    /// Forget a connection, handing back its stream so it can be
    /// deregistered.
    fn remove(&mut self, token: Token) -> Result<TcpStream, ClientError> {
        if let Some(identity) = self.identities.remove(&token) {
            self.tokens.remove(&identity);
        }
        let stream = self.streams.remove(&token).ok_or(ClientError::DoesNotExist)?;
        self.recycled_tokens.insert(token);
        Ok(stream)
    }
}

/// Run an action, turning broken invariants into a generic failure for
/// whoever sent it.
fn dispatch_or_reject(registry: &TableRegistry, identity: &str, request: &ActionRequest) -> ActionResult {
    match actions::dispatch(registry, identity, request) {
        Ok(result) => result,
        Err(error) => {
            error!("{error}: {identity} {request}");
            ActionResult::rejected(identity, request, "internal server error".to_string())
        }
    }
}

/// Send a result to whoever took the action. Successful results also go
/// to everyone else seated at the table, each with their own view of it.
fn relay(
    registry: &TableRegistry,
    tx_server: &Sender<ServerData>,
    identity: &str,
    result: ActionResult,
) -> Result<(), Error> {
    if result.success {
        let others: Vec<String> = result
            .table_state
            .iter()
            .flat_map(|snapshot| snapshot.seats.iter())
            .filter_map(|seat| seat.player.as_ref())
            .map(|player| player.id.clone())
            .filter(|id| id != identity)
            .collect();
        for other in others {
            let table_state = registry.snapshot(&result.table_id, Some(&other))?;
            let msg = ServerMessage::Result(ActionResult {
                table_state,
                ..result.clone()
            });
            tx_server.send(ServerData {
                identity: other,
                msg,
            })?;
        }
    }
    let msg = ServerMessage::Result(result);
    tx_server.send(ServerData {
        identity: identity.to_string(),
        msg,
    })?;
    Ok(())
}

/// Run the poker server in two separate threads. The parent thread owns
/// the tables, applies actions and runs turn timers while the child thread
/// manages non-blocking networking IO.
pub fn run(addr: &str, config: ServerConfig) -> Result<(), Error> {
    let addr: SocketAddr = addr.parse()?;
    let poll_timeout = config.timeouts.poll;

    let (tx_client, rx_client): (Sender<ClientRequest>, Receiver<ClientRequest>) = channel();
    let (tx_server, rx_server): (Sender<ServerData>, Receiver<ServerData>) = channel();

    let mut poll = Poll::new()?;
    let waker = Waker::new(poll.registry(), WAKER)?;

    // This thread is where the actual networking happens for non-blocking IO.
    // A server is bound to the address and manages connections to clients.
    // Messages from the main thread are queued for each client connection.
    thread::spawn(move || -> Result<(), Error> {
        let mut events = Events::with_capacity(MAX_NETWORK_EVENTS);
        let mut messages_to_process: HashMap<Token, VecDeque<ClientMessage>> = HashMap::new();
        let mut messages_to_write: HashMap<Token, VecDeque<ServerMessage>> = HashMap::new();
        let mut server = TcpListener::bind(addr)?;
        let mut sessions = Sessions::new();
        let mut tokens_to_remove: HashSet<Token> = HashSet::new();
        let mut tokens_to_reregister: HashSet<Token> = HashSet::new();
        poll.registry()
            .register(&mut server, SERVER, Interest::READABLE)?;

        loop {
            if let Err(error) = poll.poll(&mut events, Some(poll_timeout)) {
                match error.kind() {
                    io::ErrorKind::Interrupted => continue,
                    _ => bail!(error),
                }
            }

            for event in events.iter() {
                match event.token() {
                    SERVER => loop {
                        let mut stream = match server.accept() {
                            Ok((stream, _)) => stream,
                            Err(error) => match error.kind() {
                                // No more queued connections, so back to polling.
                                io::ErrorKind::WouldBlock => break,
                                _ => bail!(error),
                            },
                        };

                        let token = sessions.new_token();
                        poll.registry()
                            .register(&mut stream, token, Interest::READABLE)?;
                        sessions.insert(token, stream);
                        let repr = token_to_string(&token);
                        debug!("accepted new connection with {repr}");
                    },
                    WAKER => {
                        // Queue up everything the dispatch thread has for us.
                        while let Ok(ServerData { identity, msg }) = rx_server.try_recv() {
                            if let Some(token) = sessions.get_token(&identity) {
                                messages_to_write.entry(token).or_default().push_back(msg);
                                tokens_to_reregister.insert(token);
                            }
                        }
                    }
                    // Only care about events associated with clients that are
                    // still valid.
                    token if !tokens_to_remove.contains(&token) => {
                        let Ok(stream) = sessions.get_mut_stream(&token) else {
                            continue;
                        };
                        if event.is_writable() {
                            if let Some(messages) = messages_to_write.get_mut(&token) {
                                // Clients that never read eventually get dropped
                                // instead of growing their queue forever.
                                if messages.len() >= MAX_NETWORK_EVENTS {
                                    let repr = token_to_string(&token);
                                    error!("{repr} has not been receiving and will be removed");
                                    tokens_to_remove.insert(token);
                                    continue;
                                }
                                while let Some(msg) = messages.pop_front() {
                                    match write_prefixed::<ServerMessage, TcpStream>(stream, &msg) {
                                        Ok(()) => {
                                            // Client errors end the connection.
                                            if let ServerMessage::ClientError(_) = msg {
                                                let repr = token_to_string(&token);
                                                debug!("{repr}: {msg}");
                                                tokens_to_remove.insert(token);
                                                break;
                                            }
                                        }
                                        Err(error) => {
                                            match error.kind() {
                                                io::ErrorKind::BrokenPipe
                                                | io::ErrorKind::ConnectionAborted
                                                | io::ErrorKind::ConnectionReset
                                                | io::ErrorKind::TimedOut
                                                | io::ErrorKind::UnexpectedEof => {
                                                    let repr = token_to_string(&token);
                                                    debug!("{repr} connection dropped");
                                                    tokens_to_remove.insert(token);
                                                }
                                                // Not writable after all. Put the message
                                                // back and wait for the next writable event.
                                                io::ErrorKind::WouldBlock => {
                                                    messages.push_front(msg);
                                                    tokens_to_reregister.insert(token);
                                                }
                                                io::ErrorKind::WriteZero => {
                                                    let repr = token_to_string(&token);
                                                    debug!("{repr} got a zero write, but will retry");
                                                    messages.push_front(msg);
                                                    tokens_to_reregister.insert(token);
                                                }
                                                _ => bail!(error),
                                            }
                                            break;
                                        }
                                    }
                                }
                            }
                        }

                        if event.is_readable() {
                            loop {
                                match read_prefixed::<ClientMessage, TcpStream>(stream) {
                                    Ok(msg) => {
                                        let messages =
                                            messages_to_process.entry(token).or_default();
                                        messages.push_back(msg);
                                        if messages.len() >= MAX_NETWORK_EVENTS_PER_USER {
                                            let repr = token_to_string(&token);
                                            error!("{repr} has been spamming and will be removed");
                                            tokens_to_remove.insert(token);
                                            break;
                                        }
                                    }
                                    Err(error) => {
                                        match error.kind() {
                                            io::ErrorKind::BrokenPipe
                                            | io::ErrorKind::ConnectionAborted
                                            | io::ErrorKind::ConnectionReset
                                            | io::ErrorKind::InvalidData
                                            | io::ErrorKind::TimedOut
                                            | io::ErrorKind::UnexpectedEof => {
                                                let repr = token_to_string(&token);
                                                debug!("{repr}'s connection dropped");
                                                tokens_to_remove.insert(token);
                                            }
                                            io::ErrorKind::WouldBlock => {}
                                            _ => bail!(error),
                                        }
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    // Already queued for removal.
                    _ => {}
                }
            }

            // Bind identities and pass requests along to the dispatch thread.
            for (token, msgs) in messages_to_process
                .drain()
                .filter(|(token, _)| !tokens_to_remove.contains(token))
            {
                let repr = token_to_string(&token);
                for ClientMessage(request) in msgs {
                    match sessions.identify(token, request.player_id.as_deref()) {
                        Ok(identity) => {
                            debug!("{repr}: {identity} {request}");
                            tx_client.send(ClientRequest { identity, request })?;
                        }
                        Err(error) => {
                            debug!("{repr}: {error}");
                            let msg = ServerMessage::ClientError(error);
                            messages_to_write.entry(token).or_default().push_back(msg);
                            tokens_to_reregister.insert(token);
                            break;
                        }
                    }
                }
            }

            for token in tokens_to_reregister.drain() {
                if tokens_to_remove.contains(&token) {
                    continue;
                }
                if let Ok(stream) = sessions.get_mut_stream(&token) {
                    poll.registry().reregister(
                        stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                }
            }

            // Deregister and recycle everything that needs to go.
            for token in tokens_to_remove.drain() {
                let repr = token_to_string(&token);
                match sessions.get_identity(&token) {
                    Some(identity) => debug!("{repr} ({identity}) is being removed"),
                    None => debug!("{repr} is being removed"),
                }
                messages_to_write.remove(&token);
                if let Ok(mut stream) = sessions.remove(token) {
                    poll.registry().deregister(&mut stream)?;
                }
            }
        }
    });

    let registry = TableRegistry::new(config.settings, Arc::new(RandomShuffle));
    // When each table's pending decision was first seen.
    let mut turn_timers: HashMap<String, (TurnMarker, Instant)> = HashMap::new();
    info!("listening on {addr}");
    loop {
        match rx_client.recv_timeout(poll_timeout) {
            Ok(ClientRequest { identity, request }) => {
                let result = if request.action_type == ActionKind::Timeout {
                    let error = UserError::SystemOnly;
                    error!("{error}: {identity} {request}");
                    ActionResult::rejected(&identity, &request, error.to_string())
                } else {
                    dispatch_or_reject(&registry, &identity, &request)
                };
                relay(&registry, &tx_server, &identity, result)?;
                waker.wake()?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("networking thread stopped"),
        }

        // Fold anyone that's been sitting on a decision for too long.
        let markers = registry.turn_markers()?;
        turn_timers.retain(|table_id, _| markers.iter().any(|(id, _)| id == table_id));
        let now = Instant::now();
        for (table_id, marker) in markers {
            let (last, since) = turn_timers.entry(table_id.clone()).or_insert((marker, now));
            if *last != marker {
                *last = marker;
                *since = now;
                continue;
            }
            if now.duration_since(*since) >= config.timeouts.action {
                debug!("{table_id}: turn timer expired for seat {}", marker.seat);
                let request = ActionRequest::new(ActionKind::Timeout, &table_id);
                let result = dispatch_or_reject(&registry, SYSTEM_IDENTITY, &request);
                relay(&registry, &tx_server, SYSTEM_IDENTITY, result)?;
                waker.wake()?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mio::{
        Token,
        net::{TcpListener, TcpStream},
    };

    use super::{SYSTEM_IDENTITY, Sessions, WAKER};
    use crate::net::messages::ClientError;

    fn init_sessions(num_connections: usize) -> (TcpListener, Sessions, Vec<Token>) {
        let addr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(addr).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut sessions = Sessions::new();
        let tokens = (0..num_connections)
            .map(|_| {
                let token = sessions.new_token();
                sessions.insert(token, TcpStream::connect(addr).unwrap());
                token
            })
            .collect();
        (listener, sessions, tokens)
    }

    #[test]
    fn tokens_start_after_waker_and_recycle() {
        let (_listener, mut sessions, tokens) = init_sessions(2);
        assert_eq!(tokens, vec![Token(WAKER.0 + 1), Token(WAKER.0 + 2)]);
        assert!(sessions.remove(tokens[0]).is_ok());
        assert_eq!(sessions.remove(tokens[0]).unwrap_err(), ClientError::DoesNotExist);
        assert_eq!(sessions.new_token(), tokens[0]);
    }

    #[test]
    fn first_declared_identity_sticks() {
        let (_listener, mut sessions, tokens) = init_sessions(2);
        assert_eq!(sessions.identify(tokens[0], Some(" alice ")).unwrap(), "alice");
        assert_eq!(sessions.identify(tokens[0], None).unwrap(), "alice");
        assert_eq!(sessions.identify(tokens[0], Some("alice")).unwrap(), "alice");
        assert_eq!(
            sessions.identify(tokens[0], Some("bob")).unwrap_err(),
            ClientError::Unassociated
        );
        assert_eq!(
            sessions.identify(tokens[1], Some("alice")).unwrap_err(),
            ClientError::AlreadyAssociated
        );
        assert_eq!(sessions.get_token("alice"), Some(tokens[0]));
    }

    #[test]
    fn blank_identity_is_anonymous() {
        let (_listener, mut sessions, tokens) = init_sessions(1);
        let identity = sessions.identify(tokens[0], Some("  ")).unwrap();
        assert_eq!(identity, "anonymous-1");
    }

    #[test]
    fn anonymous_identities_survive_token_reuse() {
        let (listener, mut sessions, tokens) = init_sessions(1);
        let first = sessions.identify(tokens[0], None).unwrap();
        sessions.remove(tokens[0]).unwrap();

        let token = sessions.new_token();
        assert_eq!(token, tokens[0]);
        let addr = listener.local_addr().unwrap();
        sessions.insert(token, TcpStream::connect(addr).unwrap());
        let second = sessions.identify(token, None).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, "anonymous-2");
    }

    #[test]
    fn anonymous_identities_skip_declared_ones() {
        let (_listener, mut sessions, tokens) = init_sessions(2);
        sessions.identify(tokens[0], Some("anonymous-1")).unwrap();
        assert_eq!(sessions.identify(tokens[1], None).unwrap(), "anonymous-2");
    }

    #[test]
    fn system_identity_is_reserved() {
        let (_listener, mut sessions, tokens) = init_sessions(1);
        assert_eq!(
            sessions.identify(tokens[0], Some(SYSTEM_IDENTITY)).unwrap_err(),
            ClientError::AlreadyAssociated
        );
    }

    #[test]
    fn removing_frees_the_identity() {
        let (_listener, mut sessions, tokens) = init_sessions(2);
        sessions.identify(tokens[0], Some("alice")).unwrap();
        sessions.remove(tokens[0]).unwrap();
        assert!(sessions.get_token("alice").is_none());
        assert_eq!(sessions.identify(tokens[1], Some("alice")).unwrap(), "alice");
        assert_eq!(
            sessions.identify(tokens[0], Some("carol")).unwrap_err(),
            ClientError::DoesNotExist
        );
    }
}
