//! 多实例扇出测试
//!
//! 两个网关实例共享同一条总线与同一份目录/存储，
//! 等价于挂在同一个 Redis 后面的两台聊天服务器。

mod support;

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use domain::RoomId;
use support::{spawn_server_with, SharedBackends};

#[tokio::test]
async fn message_from_one_instance_reaches_the_other() {
    let backends = SharedBackends::new();
    let server_a = spawn_server_with(&backends).await;
    let server_b = spawn_server_with(&backends).await;

    server_a.add_room(9);
    server_a.add_member(42, 9);
    server_a.add_member(43, 9);

    let mut alice = server_a.connect().await;
    alice.authenticate(&server_a.token(42, "alice")).await;
    alice.join_room(9).await;

    let mut bob = server_b.connect().await;
    bob.authenticate(&server_b.token(43, "bob")).await;
    bob.join_room(9).await;

    alice
        .send_json(json!({"type": "send_message", "content": "hi"}))
        .await;

    // 两个实例上的成员都收到，且发送者走同一条回流路径
    let to_bob = bob.recv_type("new_message").await;
    assert_eq!(to_bob["content"], "hi");
    assert_eq!(to_bob["username"], "alice");
    assert_eq!(to_bob["room_id"], 9);

    let to_alice = alice.recv_type("new_message").await;
    assert_eq!(to_alice["content"], "hi");

    // 存储只写一次
    assert_eq!(backends.store.count(RoomId::new(9)), 1);
}

#[tokio::test]
async fn presence_crosses_instances() {
    let backends = SharedBackends::new();
    let server_a = spawn_server_with(&backends).await;
    let server_b = spawn_server_with(&backends).await;

    server_a.add_room(9);
    server_a.add_member(42, 9);
    server_a.add_member(43, 9);

    let mut alice = server_a.connect().await;
    alice.authenticate(&server_a.token(42, "alice")).await;
    alice.join_room(9).await;

    let mut bob = server_b.connect().await;
    bob.authenticate(&server_b.token(43, "bob")).await;
    bob.join_room(9).await;

    // A 实例上的 alice 看到 B 实例上 bob 的加入
    // （自己注册时的 user_joined 也会回流，跳过）
    loop {
        let joined = alice.recv_type("user_joined").await;
        if joined["user_id"] == 43 {
            break;
        }
    }

    // bob 断开，alice 看到 user_left
    bob.close().await;
    let left = alice.recv_type("user_left").await;
    assert_eq!(left["user_id"], 43);
}

#[tokio::test]
async fn per_channel_publish_order_is_preserved_across_instances() {
    let backends = SharedBackends::new();
    let server_a = spawn_server_with(&backends).await;
    let server_b = spawn_server_with(&backends).await;

    server_a.add_room(9);
    server_a.add_member(42, 9);
    server_a.add_member(43, 9);

    let mut alice = server_a.connect().await;
    alice.authenticate(&server_a.token(42, "alice")).await;
    alice.join_room(9).await;

    let mut bob = server_b.connect().await;
    bob.authenticate(&server_b.token(43, "bob")).await;
    bob.join_room(9).await;
    sleep(Duration::from_millis(100)).await;

    for i in 1..=5 {
        alice
            .send_json(json!({"type": "send_message", "content": format!("m{i}")}))
            .await;
        // 等待回流确认，保证五次发布的先后关系
        let echoed = alice.recv_type("new_message").await;
        assert_eq!(echoed["content"], format!("m{i}"));
    }

    // bob 按发布顺序收到
    for i in 1..=5 {
        let received = bob.recv_type("new_message").await;
        assert_eq!(received["content"], format!("m{i}"));
    }
}

#[tokio::test]
async fn room_switch_stops_old_room_delivery() {
    let backends = SharedBackends::new();
    let server_a = spawn_server_with(&backends).await;
    let server_b = spawn_server_with(&backends).await;

    server_a.add_room(9);
    server_a.add_room(11);
    server_a.add_member(42, 9);
    server_a.add_member(42, 11);
    server_a.add_member(43, 9);

    let mut alice = server_a.connect().await;
    alice.authenticate(&server_a.token(42, "alice")).await;
    alice.join_room(9).await;

    let mut bob = server_b.connect().await;
    bob.authenticate(&server_b.token(43, "bob")).await;
    bob.join_room(9).await;
    sleep(Duration::from_millis(100)).await;

    // alice 切到房间 11，ack 即 room_joined
    alice.join_room(11).await;
    sleep(Duration::from_millis(100)).await;

    // ack 之后 bob 才在房间 9 发布
    bob.send_json(json!({"type": "send_message", "content": "old room"}))
        .await;

    // 房间 9 的消息不得到达已切走的 alice
    alice
        .expect_silence(Duration::from_millis(500), |frame| {
            frame["type"] == "new_message" && frame["room_id"] == 9
        })
        .await;

    // bob 自己收到了，说明消息确实发布成功
    let received = bob.recv_type("new_message").await;
    assert_eq!(received["content"], "old room");
}

#[tokio::test]
async fn instance_without_members_stays_quiet() {
    let backends = SharedBackends::new();
    let server_a = spawn_server_with(&backends).await;
    let server_b = spawn_server_with(&backends).await;

    server_a.add_room(9);
    server_a.add_member(42, 9);

    let mut alice = server_a.connect().await;
    alice.authenticate(&server_a.token(42, "alice")).await;
    alice.join_room(9).await;

    alice
        .send_json(json!({"type": "send_message", "content": "solo"}))
        .await;
    let echoed = alice.recv_type("new_message").await;
    assert_eq!(echoed["content"], "solo");

    // B 实例没有本地成员，注册表保持为空
    sleep(Duration::from_millis(100)).await;
    assert_eq!(server_b.hub.room_count(), 0);
}
