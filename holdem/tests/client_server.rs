use mio::net::TcpListener;

use std::{thread, time::Duration};

use holdem::{
    ActionKind, ActionRequest, Client, UserError,
    entities::Phase,
    messages::{ClientError, ServerMessage},
    server::{self, SYSTEM_IDENTITY, ServerConfig, ServerTimeouts},
};

fn get_random_open_port() -> u16 {
    let addr = "127.0.0.1:0".parse().unwrap();
    // Bind to port 0, which tells the OS to assign an available port
    let listener = TcpListener::bind(addr).unwrap();
    // Get the assigned port
    listener.local_addr().unwrap().port()
}

fn start_server(config: ServerConfig) -> String {
    let port = get_random_open_port();
    let addr = format!("127.0.0.1:{port}");
    thread::spawn({
        let addr = addr.clone();
        move || server::run(&addr, config)
    });
    addr
}

/// Seat alice and bob at "t1" and drain the join notice alice gets.
fn seat_two_players(addr: &str) -> (Client, Client) {
    let mut alice = Client::connect("alice", addr).unwrap();
    let result = alice.join_table("t1", Some(0)).unwrap();
    assert!(result.success);
    assert_eq!(result.player_id, "alice");
    assert_eq!(result.seat_index, Some(0));

    let mut bob = Client::connect("bob", addr).unwrap();
    let result = bob.join_table("t1", None).unwrap();
    assert!(result.success);
    assert_eq!(result.seat_index, Some(1));

    // Alice hears about bob sitting down.
    let news = alice.recv_result().unwrap();
    assert_eq!(news.action_type, ActionKind::JoinTable);
    assert_eq!(news.player_id, "bob");
    (alice, bob)
}

#[test]
fn two_players_play_a_hand() {
    let addr = start_server(ServerConfig::default());
    let (mut alice, mut bob) = seat_two_players(&addr);

    // Each player only ever sees their own hole cards.
    let result = alice.start_hand("t1").unwrap();
    assert!(result.success);
    let snapshot = result.table_state.unwrap();
    assert_eq!(snapshot.hand.phase, Phase::Preflop);
    assert_eq!(snapshot.hand.pot, 3);
    assert_eq!(snapshot.seats[0].player.as_ref().unwrap().cards.len(), 2);
    assert!(snapshot.seats[1].player.as_ref().unwrap().cards.is_empty());
    let news = bob.recv_result().unwrap();
    assert_eq!(news.action_type, ActionKind::StartHand);
    let snapshot = news.table_state.unwrap();
    assert!(snapshot.seats[0].player.as_ref().unwrap().cards.is_empty());
    assert_eq!(snapshot.seats[1].player.as_ref().unwrap().cards.len(), 2);

    // Heads-up, bob deals and acts first. Failures only go to the sender.
    let result = alice.take_action("t1", ActionKind::Fold, None).unwrap();
    assert!(!result.success);
    assert_eq!(result.message.as_deref(), Some("not your turn"));
    assert!(result.table_state.is_none());

    // Only the server can time out a turn.
    let result = alice.take_action("t1", ActionKind::Timeout, None).unwrap();
    assert!(!result.success);
    assert_eq!(result.message, Some(UserError::SystemOnly.to_string()));

    let result = bob.take_action("t1", ActionKind::Fold, None).unwrap();
    assert!(result.success);
    assert_eq!(result.seat_index, Some(1));
    let news = alice.recv_result().unwrap();
    assert_eq!(news.action_type, ActionKind::Fold);
    assert_eq!(news.player_id, "bob");
    let snapshot = news.table_state.unwrap();
    assert_eq!(snapshot.hand.phase, Phase::Waiting);
    assert_eq!(snapshot.seats[0].player.as_ref().unwrap().stack, 1001);
    assert_eq!(snapshot.seats[1].player.as_ref().unwrap().stack, 999);

    // Leaving is news for whoever's still seated.
    let result = bob.leave_table("t1").unwrap();
    assert!(result.success);
    let news = alice.recv_result().unwrap();
    assert_eq!(news.action_type, ActionKind::LeaveTable);
    assert!(news.table_state.unwrap().seats[1].player.is_none());
}

#[test]
fn identities_are_unique_per_connection() {
    let addr = start_server(ServerConfig::default());
    let mut alice = Client::connect("alice", &addr).unwrap();
    assert!(alice.join_table("t1", None).unwrap().success);

    let mut imposter = Client::connect("alice", &addr).unwrap();
    imposter
        .send(ActionRequest::new(ActionKind::JoinTable, "t1"))
        .unwrap();
    assert_eq!(
        imposter.recv().unwrap(),
        ServerMessage::ClientError(ClientError::AlreadyAssociated)
    );
}

#[test]
fn stalled_turn_is_folded() {
    let config: ServerConfig = ServerTimeouts {
        action: Duration::from_millis(200),
        poll: Duration::from_millis(50),
    }
    .into();
    let addr = start_server(config);
    let (mut alice, mut bob) = seat_two_players(&addr);
    assert!(alice.start_hand("t1").unwrap().success);
    assert_eq!(bob.recv_result().unwrap().action_type, ActionKind::StartHand);

    // Nobody acts, so bob gets folded and both players hear about it.
    for client in [&mut alice, &mut bob] {
        let news = client.recv_result().unwrap();
        assert!(news.success);
        assert_eq!(news.action_type, ActionKind::Timeout);
        assert_eq!(news.player_id, SYSTEM_IDENTITY);
        assert_eq!(news.seat_index, Some(1));
        assert_eq!(news.table_state.unwrap().hand.phase, Phase::Waiting);
    }
}
