// Nicknames, room membership and the pre-game lobby

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use oracle_backend::domain::RoomStatus;
use oracle_backend::store::RoomStore;
use oracle_backend::{AppError, ClientAction, ServerEvent};

use crate::support::table::seat;
use crate::support::{test_config, FailingSaves, ScriptedJudge, SharedBackends, TestNode};

async fn node() -> Result<TestNode, AppError> {
    TestNode::start(test_config(), ScriptedJudge::always(0)).await
}

#[tokio::test(start_paused = true)]
async fn room_actions_require_a_nickname() -> Result<(), AppError> {
    let node = node().await?;
    let mut client = node.connect("anon");

    client.act(ClientAction::CreateRoom { title: None }).await;
    assert_eq!(client.expect_error().await, "NICKNAME_REQUIRED");

    client.act(ClientAction::QuickJoin).await;
    assert_eq!(client.expect_error().await, "NICKNAME_REQUIRED");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn nicknames_are_validated_and_unique_ignoring_case() -> Result<(), AppError> {
    let node = node().await?;
    let mut alice = node.connect("alice");
    let mut other = node.connect("other");

    alice
        .act(ClientAction::SetNickname {
            nickname: "x".to_string(),
        })
        .await;
    assert_eq!(alice.expect_error().await, "NICKNAME_INVALID");

    alice
        .act(ClientAction::SetNickname {
            nickname: "  Alice  ".to_string(),
        })
        .await;
    let ServerEvent::NicknameSet { nickname } = alice.expect("NICKNAME_SET").await else {
        unreachable!()
    };
    assert_eq!(nickname, "Alice");

    other
        .act(ClientAction::SetNickname {
            nickname: "ALICE".to_string(),
        })
        .await;
    assert_eq!(other.expect_error().await, "NICKNAME_TAKEN");

    // Disconnecting frees the reservation.
    alice.disconnect().await;
    other
        .act(ClientAction::SetNickname {
            nickname: "alice".to_string(),
        })
        .await;
    other.expect("NICKNAME_SET").await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn create_and_join_by_code() -> Result<(), AppError> {
    let node = node().await?;
    let mut host = node.connect("host");
    let mut guest = node.connect("guest");
    host.register_nickname().await;
    guest.register_nickname().await;

    host.act(ClientAction::CreateRoom {
        title: Some("Friday night".to_string()),
    })
    .await;
    let ServerEvent::RoomJoined { room, session_id } = host.expect("ROOM_JOINED").await else {
        unreachable!()
    };
    assert_eq!(session_id, host.session_id);
    assert_eq!(room.title, "Friday night");
    assert_eq!(room.host_session_id, host.session_id);
    assert_eq!(room.status, RoomStatus::Waiting);

    guest
        .act(ClientAction::JoinByCode {
            room_code: format!("  {}  ", room.code.to_lowercase()),
        })
        .await;
    let ServerEvent::RoomJoined { room: joined, .. } = guest.expect("ROOM_JOINED").await else {
        unreachable!()
    };
    assert_eq!(joined.id, room.id);
    assert_eq!(joined.players.len(), 2);

    let ServerEvent::RoomUpdated { room: updated } = host.expect("ROOM_UPDATED").await else {
        unreachable!()
    };
    assert!(updated.players.iter().any(|p| p.session_id == guest.session_id));
    assert!(updated.players.iter().all(|p| p.connected));

    // Already seated: neither another room nor a nickname change.
    guest.act(ClientAction::CreateRoom { title: None }).await;
    assert_eq!(guest.expect_error().await, "ALREADY_IN_ROOM");
    guest
        .act(ClientAction::SetNickname {
            nickname: "renamed".to_string(),
        })
        .await;
    assert_eq!(guest.expect_error().await, "ALREADY_IN_ROOM");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_code_and_full_room_are_rejected() -> Result<(), AppError> {
    let config = oracle_backend::GameConfig {
        player_count: 2,
        ..test_config()
    };
    let node = TestNode::start(config, ScriptedJudge::always(0)).await?;
    let table = seat(&[&node], 2).await;

    let mut late = node.connect("late");
    late.register_nickname().await;
    late.act(ClientAction::JoinByCode {
        room_code: "ZZZZZZ".to_string(),
    })
    .await;
    assert_eq!(late.expect_error().await, "ROOM_NOT_FOUND");

    late.act(ClientAction::JoinByCode {
        room_code: table.code.clone(),
    })
    .await;
    assert_eq!(late.expect_error().await, "ROOM_FULL");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quick_join_finds_a_waiting_room() -> Result<(), AppError> {
    let node = node().await?;
    let mut seeker = node.connect("seek");
    seeker.register_nickname().await;

    seeker.act(ClientAction::QuickJoin).await;
    assert_eq!(seeker.expect_error().await, "NO_AVAILABLE_ROOM");

    let table = seat(&[&node], 2).await;
    seeker.act(ClientAction::QuickJoin).await;
    let ServerEvent::RoomJoined { room, .. } = seeker.expect("ROOM_JOINED").await else {
        unreachable!()
    };
    assert_eq!(room.id, table.room_id);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn room_list_orders_by_occupancy() -> Result<(), AppError> {
    let node = node().await?;
    let small = seat(&[&node], 1).await;
    let big = seat(&[&node], 3).await;

    let mut browser = node.connect("look");
    browser.act(ClientAction::GetRoomList).await;
    let ServerEvent::RoomList { rooms } = browser.expect("ROOM_LIST").await else {
        unreachable!()
    };
    let ids: Vec<_> = rooms.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![big.room_id.clone(), small.room_id.clone()]);
    assert_eq!(rooms[0].player_count, 3);
    assert_eq!(rooms[0].capacity, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn host_leaving_hands_over_and_last_leave_deletes() -> Result<(), AppError> {
    let node = node().await?;
    let mut table = seat(&[&node], 2).await;
    let guest_id = table.session(1);

    table.host().act(ClientAction::LeaveRoom).await;
    table.host().expect("ROOM_LEFT").await;
    let ServerEvent::RoomUpdated { room } = table.clients[1].expect("ROOM_UPDATED").await else {
        unreachable!()
    };
    assert_eq!(room.host_session_id, guest_id);
    assert_eq!(room.players.len(), 1);

    // Leaving twice is harmless.
    table.host().act(ClientAction::LeaveRoom).await;
    assert!(table.host().drain().is_empty());

    table.clients[1].act(ClientAction::LeaveRoom).await;
    table.clients[1].expect("ROOM_LEFT").await;
    assert!(node.state.flow.load_room(&table.room_id).await?.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_preconditions_are_enforced() -> Result<(), AppError> {
    let node = node().await?;
    let mut table = seat(&[&node], 3).await;

    table.clients[1].act(ClientAction::StartGame).await;
    assert_eq!(table.clients[1].expect_error().await, "NOT_HOST");

    table.host().act(ClientAction::StartGame).await;
    assert_eq!(table.host().expect_error().await, "NOT_ENOUGH_PLAYERS");

    let mut fourth = node.connect("p3");
    fourth.register_nickname().await;
    fourth
        .act(ClientAction::JoinByCode {
            room_code: table.code.clone(),
        })
        .await;
    fourth.expect("ROOM_JOINED").await;
    table.clients.push(fourth);

    table.host().act(ClientAction::StartGame).await;
    assert_eq!(table.host().expect_error().await, "PLAYERS_NOT_READY");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn leaving_during_countdown_cancels_start() -> Result<(), AppError> {
    let node = node().await?;
    let mut table = seat(&[&node], 4).await;

    table.host().act(ClientAction::StartGame).await;
    table.all_expect("GAME_COUNTDOWN").await;
    table.clients[3].act(ClientAction::LeaveRoom).await;

    let ServerEvent::GameStartCancelled { room, .. } =
        table.host().expect("GAME_START_CANCELLED").await
    else {
        unreachable!()
    };
    assert_eq!(room.status, RoomStatus::Waiting);
    assert_eq!(room.players.len(), 3);
    assert!(table.clients[3].drain_names().iter().all(|n| n != "LOAD_GAME_SCENE"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn started_rooms_refuse_newcomers() -> Result<(), AppError> {
    let node = node().await?;
    let mut table = seat(&[&node], 4).await;
    crate::support::table::start_game(&mut table).await;

    let mut late = node.connect("late");
    late.register_nickname().await;
    late.act(ClientAction::JoinByCode {
        room_code: table.code.clone(),
    })
    .await;
    assert_eq!(late.expect_error().await, "GAME_IN_PROGRESS");

    late.act(ClientAction::QuickJoin).await;
    assert_eq!(late.expect_error().await, "NO_AVAILABLE_ROOM");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chat_is_relayed_to_the_room() -> Result<(), AppError> {
    let node = node().await?;
    let mut table = seat(&[&node], 2).await;
    let sender = table.clients[1].nickname.clone();

    table.clients[1]
        .act(ClientAction::SendChat {
            message: "  hello there  ".to_string(),
        })
        .await;
    let ServerEvent::ChatMessage {
        nickname, message, ..
    } = table.host().expect("CHAT_MESSAGE").await
    else {
        unreachable!()
    };
    assert_eq!(nickname, sender);
    assert_eq!(message, "hello there");

    table.clients[1]
        .act(ClientAction::SendChat {
            message: "   ".to_string(),
        })
        .await;
    assert_eq!(table.clients[1].expect_error().await, "INVALID_MESSAGE");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_get_error_events() -> Result<(), AppError> {
    let node = node().await?;
    let mut client = node.connect("bad");

    client.send_text("not json").await;
    assert_eq!(client.expect_error().await, "BAD_REQUEST");

    client.send_text(r#"{"action":"DANCE"}"#).await;
    assert_eq!(client.expect_error().await, "UNKNOWN_ACTION");

    client
        .send_text(r#"{"action":"SELECT_CARD","payload":{}}"#)
        .await;
    assert_eq!(client.expect_error().await, "BAD_REQUEST");

    client.act(ClientAction::Ready { ready: true }).await;
    assert_eq!(client.expect_error().await, "NOT_IN_ROOM");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_create_frees_its_room_code() -> Result<(), AppError> {
    let config = test_config();
    let shared = SharedBackends::new(&config);
    let store = Arc::new(FailingSaves::new(shared.store.clone()));
    let node = TestNode::join_with_store(
        &shared,
        store.clone(),
        "node-a",
        config,
        ScriptedJudge::always(0),
    )
    .await?;
    let mut host = node.connect("host");
    host.register_nickname().await;

    host.act(ClientAction::CreateRoom { title: None }).await;
    assert_eq!(host.expect_error().await, "STORE_ERROR");

    let codes = store.bound_codes();
    assert_eq!(codes.len(), 1);
    assert!(shared.store.room_id_for_code(&codes[0]).await?.is_none());
    assert!(shared.store.session_room(&host.session_id).await?.is_none());
    assert!(shared.store.waiting_rooms().await?.is_empty());

    store.fail_saves.store(false, Ordering::SeqCst);
    host.act(ClientAction::CreateRoom { title: None }).await;
    let ServerEvent::RoomJoined { room, .. } = host.expect("ROOM_JOINED").await else {
        unreachable!()
    };
    assert_eq!(shared.store.room_id_for_code(&room.code).await?, Some(room.id));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn nickname_lapses_without_keep_alive() -> Result<(), AppError> {
    let node = node().await?;
    let ttl = node.config.nickname_ttl;
    let live = node.connect("live");
    let silent = node.connect("silent");
    let mut rival = node.connect("rival");

    for (client, nickname) in [(&live, "Kept"), (&silent, "Lapsed")] {
        client
            .act(ClientAction::SetNickname {
                nickname: nickname.to_string(),
            })
            .await;
    }

    tokio::time::sleep(ttl / 2).await;
    live.keep_alive().await;
    tokio::time::sleep(ttl / 2 + Duration::from_secs(1)).await;

    rival
        .act(ClientAction::SetNickname {
            nickname: "kept".to_string(),
        })
        .await;
    assert_eq!(rival.expect_error().await, "NICKNAME_TAKEN");

    rival
        .act(ClientAction::SetNickname {
            nickname: "lapsed".to_string(),
        })
        .await;
    let ServerEvent::NicknameSet { nickname } = rival.expect("NICKNAME_SET").await else {
        unreachable!()
    };
    assert_eq!(nickname, "lapsed");
    Ok(())
}
