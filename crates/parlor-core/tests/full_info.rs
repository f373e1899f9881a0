mod common;

use std::time::Duration;

use common::*;

use parlor_core::backend::RemoteChat;
use parlor_core::{
    CacheError, ChannelId, Clock, DialogId, EngineConfig, ParticipantStatus, RestrictedRights,
    SecretChatId, Update, UserId,
};

const CHANNEL: ChannelId = ChannelId(30);

fn expire(h: &Harness) {
    h.clock.advance(chrono::Duration::seconds(61));
}

#[tokio::test]
async fn test_fresh_user_full_is_served_from_memory() {
    let h = harness();
    h.backend.add_user(user_data(2, "Ada"));

    let full = h.engine.get_user_full(UserId(2)).await.unwrap();
    assert_eq!(full.about, "about");
    h.engine.get_user_full(UserId(2)).await.unwrap();

    assert_eq!(h.backend.calls("get_users"), 1);
    assert_eq!(h.backend.calls("get_full_user"), 1);
}

#[tokio::test]
async fn test_expired_full_is_refreshed_in_background() {
    let h = harness();
    h.backend.add_user(user_data(2, "Ada"));
    h.engine.get_user_full(UserId(2)).await.unwrap();
    expire(&h);

    let stale = h.engine.get_user_full(UserId(2)).await.unwrap();
    assert!(stale.expires_at <= h.clock.now());
    assert_eq!(h.backend.calls("get_full_user"), 1);

    settle().await;
    assert_eq!(h.backend.calls("get_full_user"), 2);
    assert!(h.engine.user_full(UserId(2)).unwrap().expires_at > h.clock.now());
}

#[tokio::test]
async fn test_bots_wait_for_one_shared_refresh() {
    let h = harness_with(EngineConfig {
        is_bot: true,
        ..config()
    });
    h.backend.add_user(user_data(2, "Ada"));
    h.engine.get_user_full(UserId(2)).await.unwrap();
    expire(&h);
    *h.backend.fetch_delay.lock().unwrap() = Duration::from_millis(20);

    let (first, second) = tokio::join!(
        h.engine.get_user_full(UserId(2)),
        h.engine.get_user_full(UserId(2)),
    );

    assert_eq!(h.backend.calls("get_full_user"), 2);
    assert!(first.unwrap().expires_at > h.clock.now());
    assert!(second.unwrap().expires_at > h.clock.now());
}

#[tokio::test]
async fn test_concurrent_channel_full_requests_share_one_fetch() {
    let h = harness();
    h.engine.on_update(Update::Chats(vec![RemoteChat::Channel(channel_data(
        CHANNEL.0,
        ParticipantStatus::Member,
        100,
    ))]));
    h.backend.set_channel_full(channel_full(CHANNEL.0, 140));
    *h.backend.fetch_delay.lock().unwrap() = Duration::from_millis(20);

    let (first, second) = tokio::join!(
        h.engine.get_channel_full(CHANNEL),
        h.engine.get_channel_full(CHANNEL),
    );

    assert_eq!(first.unwrap().participant_count, 140);
    assert_eq!(second.unwrap().participant_count, 140);
    assert_eq!(h.backend.calls("get_full_channel"), 1);
    assert_eq!(h.engine.channel(CHANNEL).unwrap().participant_count, 140);
}

#[tokio::test]
async fn test_administrator_count_is_clamped_only_to_known_sizes() {
    let h = harness();
    for (id, participant_count) in [(CHANNEL.0, 0), (31, 2)] {
        h.engine.on_update(Update::Chats(vec![RemoteChat::Channel(channel_data(
            id,
            ParticipantStatus::Member,
            participant_count,
        ))]));
        let mut full = channel_full(id, participant_count);
        full.administrator_count = 3;
        h.backend.set_channel_full(full);
    }

    let unknown_size = h.engine.get_channel_full(CHANNEL).await.unwrap();
    assert_eq!(unknown_size.administrator_count, 3);

    let known_size = h.engine.get_channel_full(ChannelId(31)).await.unwrap();
    assert_eq!(known_size.administrator_count, 2);
}

#[tokio::test]
async fn test_full_info_needs_access() {
    let h = harness();
    h.engine.on_update(Update::Chats(vec![RemoteChat::Channel(channel_data(
        CHANNEL.0,
        ParticipantStatus::Left,
        100,
    ))]));

    let result = h.engine.get_channel_full(CHANNEL).await;

    assert_eq!(result.unwrap_err(), CacheError::NoAccess(CHANNEL.into()));
    assert_eq!(h.backend.calls("get_full_channel"), 0);

    let secret = h
        .engine
        .get_full_record(DialogId::SecretChat(SecretChatId(5)))
        .await;
    assert!(matches!(secret, Err(CacheError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_unknown_user_has_no_full_info() {
    let h = harness();
    let result = h.engine.get_user_full(UserId(404)).await;
    assert!(result.is_err());
    assert_eq!(h.backend.calls("get_full_user"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restriction_is_lifted_when_it_expires() {
    let h = harness();
    let until_date = h.clock.unix_time() + 60;
    h.engine.on_update(Update::Chats(vec![RemoteChat::Channel(channel_data(
        CHANNEL.0,
        ParticipantStatus::restricted(true, until_date, RestrictedRights::full()),
        100,
    ))]));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.engine.channel(CHANNEL).unwrap().status.is_restricted());

    expire(&h);
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(
        h.engine.channel(CHANNEL).unwrap().status,
        ParticipantStatus::Member
    );
}

#[tokio::test]
async fn test_channel_administrators_are_fetched_once() {
    let h = harness();
    let dialog_id = DialogId::Channel(CHANNEL);

    let administrators = h.engine.get_dialog_administrators(dialog_id).await.unwrap();
    assert_eq!(administrators.len(), 1);
    assert!(administrators[0].is_creator);
    h.engine.get_dialog_administrators(dialog_id).await.unwrap();

    assert_eq!(h.backend.calls("get_channel_administrators"), 1);
    assert!(matches!(
        h.engine
            .get_dialog_administrators(DialogId::User(UserId(2)))
            .await,
        Err(CacheError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_administered_channels_keep_owned_ones() {
    let h = harness();
    {
        let mut channels = h.backend.channels.lock().unwrap();
        channels.insert(
            ChannelId(31),
            channel_data(31, ParticipantStatus::creator(), 10),
        );
        channels.insert(ChannelId(32), channel_data(32, ParticipantStatus::Member, 10));
    }

    let owned = h.engine.get_administered_channels().await.unwrap();
    assert_eq!(owned, vec![ChannelId(31)]);
    h.engine.get_administered_channels().await.unwrap();
    assert_eq!(h.backend.calls("get_administered_public_channels"), 1);
    assert!(h.engine.channel(ChannelId(32)).is_some());
}
