mod common;

use common::*;
use tokio::sync::mpsc::UnboundedReceiver;

use parlor_core::backend::{RemoteChat, RemoteChatFull, RemoteSecretChat, RemoteUser};
use parlor_core::records::SecretChatState;
use parlor_core::{
    ChannelId, ChatId, DialogId, Event, ParticipantStatus, SecretChatId, Update, UserId,
};

const CHAT: ChatId = ChatId(10);

fn seed_chat(h: &Harness, version: i32, participant_count: i32) {
    h.engine.on_update(Update::Chats(vec![RemoteChat::Chat(chat_data(
        CHAT.0,
        version,
        participant_count,
    ))]));
}

fn add(user_id: i64, version: i32) -> Update {
    Update::ChatParticipantAdd {
        chat_id: CHAT,
        user_id: UserId(user_id),
        inviter_user_id: ME,
        date: 1_700_000_000,
        version,
    }
}

fn delete(user_id: i64, version: i32) -> Update {
    Update::ChatParticipantDelete {
        chat_id: CHAT,
        user_id: UserId(user_id),
        version,
    }
}

fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_in_order_deltas_need_no_refetch() {
    let h = harness();
    seed_chat(&h, 5, 10);

    h.engine.on_update(add(7, 6));
    h.engine.on_update(delete(8, 7));
    settle().await;

    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.version, 7);
    assert_eq!(chat.participant_count, 10);
    assert_eq!(h.backend.calls("get_full_chat"), 0);
}

#[tokio::test]
async fn test_version_gap_refetches_once() {
    let h = harness();
    seed_chat(&h, 5, 10);
    h.backend.set_chat_full(RemoteChatFull {
        chat_id: CHAT,
        participants: members([1, 2, 3]),
        version: 10,
        creator_user_id: UserId(2),
        ..RemoteChatFull::default()
    });

    h.engine.on_update(add(3, 10));
    settle().await;

    assert_eq!(h.backend.calls("get_full_chat"), 1);
    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.version, 10);
    assert_eq!(chat.participant_count, 3);
    assert!(h.engine.chat_full(CHAT).unwrap().is_up_to_date);
}

#[tokio::test]
async fn test_delete_then_duplicate_delete() {
    let h = harness();
    seed_chat(&h, 5, 10);

    h.engine.on_update(delete(8, 6));
    assert_eq!(h.engine.chat(CHAT).unwrap().participant_count, 9);

    h.engine.on_update(delete(8, 6));
    settle().await;

    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.participant_count, 9);
    assert_eq!(chat.version, 6);
    assert_eq!(h.backend.calls("get_full_chat"), 0);
}

#[tokio::test]
async fn test_duplicate_add_is_ignored() {
    let h = harness();
    seed_chat(&h, 5, 10);

    h.engine.on_update(add(7, 6));
    h.engine.on_update(add(7, 6));
    h.engine.on_update(add(7, 4));

    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.participant_count, 11);
    assert_eq!(chat.version, 6);
}

#[tokio::test]
async fn test_deleted_account_leaving_without_version_bump() {
    let h = harness();
    seed_chat(&h, 5, 10);
    h.engine.on_update(Update::ChatParticipants {
        chat_id: CHAT,
        participants: members(1..=10),
        version: 5,
    });
    let mut ghost = user_data(9, "Deleted");
    ghost.is_deleted = true;
    h.engine
        .on_update(Update::Users(vec![RemoteUser::User(ghost)]));

    h.engine.on_update(delete(9, 5));

    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.version, 5);
    assert_eq!(chat.participant_count, 9);
    let full = h.engine.chat_full(CHAT).unwrap();
    assert!(full.participant(UserId(9)).is_none());
    assert!(!full.is_up_to_date);
}

#[tokio::test]
async fn test_member_list_sets_count_and_administrators() {
    let h = harness();
    seed_chat(&h, 5, 0);
    let mut participants = members(1..=4);
    participants[1].status = ParticipantStatus::creator();

    h.engine.on_update(Update::ChatParticipants {
        chat_id: CHAT,
        participants,
        version: 6,
    });

    let chat = h.engine.chat(CHAT).unwrap();
    assert_eq!(chat.participant_count, 4);
    assert_eq!(chat.version, 6);
    let administrators = h.engine.administrators(CHAT.into()).unwrap();
    assert_eq!(administrators.len(), 1);
    assert_eq!(administrators[0].user_id, UserId(2));
    assert!(administrators[0].is_creator);

    // Older lists are ignored.
    h.engine.on_update(Update::ChatParticipants {
        chat_id: CHAT,
        participants: members([1]),
        version: 5,
    });
    assert_eq!(h.engine.chat(CHAT).unwrap().participant_count, 4);
}

#[tokio::test]
async fn test_losing_access_drops_full_record() {
    let h = harness();
    seed_chat(&h, 5, 3);
    h.engine.on_update(Update::ChatParticipants {
        chat_id: CHAT,
        participants: members(1..=3),
        version: 5,
    });
    let mut rx = h.engine.subscribe();

    h.engine.on_update(delete(ME.0, 6));

    assert_eq!(h.engine.chat(CHAT).unwrap().status, ParticipantStatus::Left);
    assert!(h.engine.chat_full(CHAT).is_none());
    assert!(!h.engine.have_dialog_access(CHAT.into()));
    assert!(drain(&mut rx).contains(&Event::AccessLost(DialogId::Chat(CHAT))));
}

#[tokio::test]
async fn test_channel_version_gap_refetches_full_and_administrators() {
    let h = harness();
    let mut data = channel_data(30, ParticipantStatus::creator(), 100);
    data.version = 3;
    h.engine
        .on_update(Update::Chats(vec![RemoteChat::Channel(data)]));
    h.backend.set_channel_full(channel_full(30, 120));

    h.engine.on_update(Update::ChannelParticipant {
        channel_id: ChannelId(30),
        user_id: UserId(5),
        old_status: ParticipantStatus::Left,
        new_status: ParticipantStatus::Member,
        version: Some(7),
    });
    settle().await;

    assert_eq!(h.backend.calls("get_full_channel"), 1);
    assert_eq!(h.backend.calls("get_channel_administrators"), 1);
    assert_eq!(h.engine.channel(ChannelId(30)).unwrap().participant_count, 120);
}

#[tokio::test]
async fn test_channel_version_gap_resynchronizes_version() {
    let h = harness();
    let mut data = channel_data(30, ParticipantStatus::creator(), 100);
    data.version = 3;
    h.engine
        .on_update(Update::Chats(vec![RemoteChat::Channel(data.clone())]));
    data.version = 7;
    h.backend.channels.lock().unwrap().insert(ChannelId(30), data);
    h.backend.set_channel_full(channel_full(30, 120));

    let joined = |user_id: i64, version: i32| Update::ChannelParticipant {
        channel_id: ChannelId(30),
        user_id: UserId(user_id),
        old_status: ParticipantStatus::Left,
        new_status: ParticipantStatus::Member,
        version: Some(version),
    };

    h.engine.on_update(joined(5, 7));
    settle().await;
    assert_eq!(h.backend.calls("get_channels"), 1);
    assert_eq!(h.engine.channel(ChannelId(30)).unwrap().version, 7);

    h.engine.on_update(joined(6, 8));
    settle().await;
    assert_eq!(h.engine.channel(ChannelId(30)).unwrap().version, 8);
    assert_eq!(h.backend.calls("get_channels"), 1);
}

#[tokio::test]
async fn test_user_deltas_apply_to_known_users_only() {
    let h = harness();
    let mut rx = h.engine.subscribe();

    h.engine.on_update(Update::UserName {
        user_id: UserId(2),
        first_name: "Nobody".into(),
        last_name: String::new(),
        username: String::new(),
    });
    assert!(h.engine.user(UserId(2)).is_none());

    let mut data = user_data(2, "Ada");
    data.is_contact = true;
    h.engine
        .on_update(Update::Users(vec![RemoteUser::User(data)]));
    h.engine.on_update(Update::SecretChat(RemoteSecretChat {
        id: SecretChatId(77),
        access_hash: 1,
        user_id: UserId(2),
        state: SecretChatState::Active,
        is_outbound: true,
        ttl: 0,
        date: 0,
        layer: 73,
    }));
    drain(&mut rx);

    h.engine.on_update(Update::UserName {
        user_id: UserId(2),
        first_name: "Augusta".into(),
        last_name: "King".into(),
        username: "ada".into(),
    });

    let events = drain(&mut rx);
    assert!(events.contains(&Event::TitleChanged(DialogId::User(UserId(2)))));
    assert!(events.contains(&Event::TitleChanged(DialogId::SecretChat(SecretChatId(77)))));
    assert!(events.contains(&Event::UserUpdated(UserId(2))));
    assert_eq!(h.engine.search_contacts("aug", 10), vec![UserId(2)]);
}

#[tokio::test]
async fn test_status_changes_are_announced_but_not_saved() {
    let h = harness();
    h.engine
        .on_update(Update::Users(vec![RemoteUser::User(user_data(2, "Ada"))]));
    h.engine.flush().await;
    let writes = h.store.write_count();
    let mut rx = h.engine.subscribe();

    h.engine.on_update(Update::UserStatus {
        user_id: UserId(2),
        was_online: 1_700_000_000,
    });
    h.engine.flush().await;

    assert_eq!(h.store.write_count(), writes);
    assert!(drain(&mut rx).contains(&Event::UserStatusChanged {
        user_id: UserId(2),
        was_online: 1_700_000_000,
    }));
}
