//! 每实例房间注册表与扇出引擎
//!
//! 注册/注销通过两条有界通道由单一控制任务串行应用，
//! 消除注册表上的写竞争；扇出路径在读锁下拷贝成员快照，
//! 释放锁后逐个做非阻塞入队——任何慢消费者都不能拖住
//! 同房间的其他人，打满队列的对端被软驱逐。

use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use domain::{RoomEvent, RoomId, ROOM_CHANNEL_PATTERN};
use infrastructure::Bus;

use crate::connection::{Connection, ConnectionId};
use crate::frames::ServerFrame;
use crate::metrics::{
    ACTIVE_ROOMS, BROADCAST_DURATION_MS, MESSAGES_RECEIVED_TOTAL, ROOM_JOINS_TOTAL,
    ROOM_LEAVES_TOTAL, TASKS_COUNT, USERS_PER_ROOM, WEBSOCKET_CONNECTIONS,
};

/// 性能快照打印周期
const PERF_LOG_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

struct Registration {
    conn: Arc<Connection>,
    room_id: RoomId,
}

/// 每实例连接注册表
pub struct Hub {
    /// roomId → {connectionId → Connection}。键不存在 ⇔ 房间无本地成员
    rooms: RwLock<HashMap<RoomId, HashMap<ConnectionId, Arc<Connection>>>>,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Registration>,
    reg_cap: usize,
    bus: Arc<dyn Bus>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl Hub {
    /// 创建 Hub 并启动控制任务与总线订阅任务
    pub fn spawn(bus: Arc<dyn Bus>, reg_cap: usize) -> Arc<Self> {
        let (register_tx, register_rx) = mpsc::channel(reg_cap);
        let (unregister_tx, unregister_rx) = mpsc::channel(reg_cap);

        let hub = Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            register_tx,
            unregister_tx,
            reg_cap,
            bus,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        });

        tokio::spawn(Arc::clone(&hub).run(register_rx, unregister_rx));
        tokio::spawn(Arc::clone(&hub).subscribe_loop());

        hub
    }

    /// 提交注册。通道打满时阻塞调用方（单个读任务），不会阻塞 Hub
    pub async fn register(&self, conn: Arc<Connection>, room_id: RoomId) {
        if self
            .register_tx
            .send(Registration { conn, room_id })
            .await
            .is_err()
        {
            warn!(%room_id, "hub control loop is gone, register dropped");
        }
    }

    /// 提交注销
    pub async fn unregister(&self, conn: Arc<Connection>, room_id: RoomId) {
        if self
            .unregister_tx
            .send(Registration { conn, room_id })
            .await
            .is_err()
        {
            warn!(%room_id, "hub control loop is gone, unregister dropped");
        }
    }

    /// 优雅关闭：停止订阅与控制任务，关闭全部本地连接的写端
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown_notify.notify_waiters();

        let connections: Vec<Arc<Connection>> = {
            let rooms = self.rooms.read().expect("rooms lock");
            rooms
                .values()
                .flat_map(|members| members.values().cloned())
                .collect()
        };
        for conn in connections {
            conn.close();
        }
        info!("hub 已关闭");
    }

    async fn wait_shutdown(&self) {
        loop {
            let notified = self.shutdown_notify.notified();
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    /// 控制循环：register/unregister 的唯一消费者
    ///
    /// biased 顺序保证：房间切换时旧房间的注销先于新注册被应用
    /// （派发任务先入队注销、后入队注册，二者可见性同序）。
    async fn run(
        self: Arc<Self>,
        mut register_rx: mpsc::Receiver<Registration>,
        mut unregister_rx: mpsc::Receiver<Registration>,
    ) {
        gauge!(TASKS_COUNT).increment(1.0);
        let mut perf = tokio::time::interval(PERF_LOG_PERIOD);
        perf.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.wait_shutdown() => break,
                registration = unregister_rx.recv() => match registration {
                    Some(registration) => self.apply_unregister(registration),
                    None => break,
                },
                registration = register_rx.recv() => match registration {
                    Some(registration) => self.apply_register(registration),
                    None => break,
                },
                _ = perf.tick() => self.log_performance(),
            }
        }

        info!("hub 控制循环退出");
        gauge!(TASKS_COUNT).decrement(1.0);
    }

    fn apply_register(&self, registration: Registration) {
        let Registration { conn, room_id } = registration;
        let (members_in_room, room_count) = {
            let mut rooms = self.rooms.write().expect("rooms lock");
            let members = rooms.entry(room_id).or_default();
            members.insert(conn.id(), Arc::clone(&conn));
            (members.len(), rooms.len())
        };

        gauge!(WEBSOCKET_CONNECTIONS).increment(1.0);
        counter!(ROOM_JOINS_TOTAL).increment(1);
        gauge!(ACTIVE_ROOMS).set(room_count as f64);
        histogram!(USERS_PER_ROOM).record(members_in_room as f64);

        info!(
            connection_id = conn.id(),
            user_id = %conn.user_id(),
            %room_id,
            members_in_room,
            "client registered in room"
        );

        // 在线状态事件跨总线同步，其他实例由此得知成员变化
        self.publish_presence(RoomEvent::UserJoined {
            room_id,
            user_id: conn.user_id(),
            username: conn.username(),
        });
    }

    fn apply_unregister(&self, registration: Registration) {
        let Registration { conn, room_id } = registration;
        let (removed, room_count) = {
            let mut rooms = self.rooms.write().expect("rooms lock");
            let removed = match rooms.get_mut(&room_id) {
                Some(members) => {
                    let removed = members.remove(&conn.id()).is_some();
                    if members.is_empty() {
                        rooms.remove(&room_id);
                    }
                    removed
                }
                None => false,
            };
            (removed, rooms.len())
        };

        // 幂等：驱逐路径与读任务退出路径可能提交同一次注销
        if !removed {
            return;
        }

        gauge!(WEBSOCKET_CONNECTIONS).decrement(1.0);
        counter!(ROOM_LEAVES_TOTAL).increment(1);
        gauge!(ACTIVE_ROOMS).set(room_count as f64);

        info!(
            connection_id = conn.id(),
            user_id = %conn.user_id(),
            %room_id,
            "client unregistered from room"
        );

        self.publish_presence(RoomEvent::UserLeft {
            room_id,
            user_id: conn.user_id(),
            username: conn.username(),
        });
    }

    /// 在独立任务中发布在线状态事件，控制循环不等待总线
    fn publish_presence(&self, event: RoomEvent) {
        let bus = Arc::clone(&self.bus);
        let channel = event.channel();
        tokio::spawn(async move {
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = bus.publish(&channel, payload).await {
                        warn!(%channel, error = %e, "presence publish failed");
                    }
                }
                Err(e) => warn!(error = %e, "presence event serialization failed"),
            }
        });
    }

    /// 总线订阅循环：唯一的本地投递入口
    ///
    /// 同一房间的所有事件经过同一条订阅流，本地观察者看到的
    /// 顺序与频道发布顺序一致。
    async fn subscribe_loop(self: Arc<Self>) {
        gauge!(TASKS_COUNT).increment(1.0);

        let mut subscription = match self.bus.subscribe_pattern(ROOM_CHANNEL_PATTERN).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "bus subscription failed, fan-out disabled");
                gauge!(TASKS_COUNT).decrement(1.0);
                return;
            }
        };

        info!(pattern = ROOM_CHANNEL_PATTERN, "总线订阅已启动");

        loop {
            tokio::select! {
                biased;
                _ = self.wait_shutdown() => break,
                received = subscription.recv() => match received {
                    Some((channel, payload)) => self.handle_bus_event(&channel, &payload),
                    None => {
                        warn!("bus subscription ended");
                        break;
                    }
                },
            }
        }

        info!("hub 订阅循环退出");
        gauge!(TASKS_COUNT).decrement(1.0);
    }

    fn handle_bus_event(self: &Arc<Self>, channel: &str, payload: &[u8]) {
        counter!(MESSAGES_RECEIVED_TOTAL).increment(1);

        let event: RoomEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(channel, error = %e, "undecodable bus payload dropped");
                return;
            }
        };

        let room_id = event.room_id();
        let encoded = ServerFrame::from_event(&event).encode();
        self.fan_out(room_id, encoded);
    }

    /// 将一条已编码负载投递给房间的全部本地成员
    pub fn fan_out(self: &Arc<Self>, room_id: RoomId, payload: String) {
        let recipients: Vec<Arc<Connection>> = {
            let rooms = self.rooms.read().expect("rooms lock");
            match rooms.get(&room_id) {
                Some(members) => members.values().cloned().collect(),
                None => return,
            }
        };

        debug!(%room_id, recipients = recipients.len(), "fanning out room event");

        // 入队本身是非阻塞的，串行入队以保持每连接的到达顺序与
        // 频道发布顺序一致；慢消费者只花费一次失败的入队尝试
        let started = Instant::now();
        for conn in recipients {
            if conn.try_send_raw(payload.clone()) {
                continue;
            }
            // 写队列打满说明对端已卡死：软驱逐，注销交给瞬时任务
            warn!(
                connection_id = conn.id(),
                user_id = %conn.user_id(),
                %room_id,
                "send queue full, evicting slow client"
            );
            conn.close();
            let hub = Arc::clone(self);
            tokio::spawn(async move {
                hub.unregister(conn, room_id).await;
            });
        }
        histogram!(BROADCAST_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
    }

    fn log_performance(&self) {
        let (clients, room_count) = {
            let rooms = self.rooms.read().expect("rooms lock");
            (rooms.values().map(HashMap::len).sum::<usize>(), rooms.len())
        };
        info!(
            clients,
            rooms = room_count,
            register_queue = self.reg_cap - self.register_tx.capacity(),
            unregister_queue = self.reg_cap - self.unregister_tx.capacity(),
            "[PERF] hub snapshot"
        );
    }

    // 下列快照接口供测试与诊断使用

    /// 房间的本地成员数
    pub fn members(&self, room_id: RoomId) -> usize {
        self.rooms
            .read()
            .expect("rooms lock")
            .get(&room_id)
            .map_or(0, HashMap::len)
    }

    /// 有本地成员的房间数
    pub fn room_count(&self) -> usize {
        self.rooms.read().expect("rooms lock").len()
    }

    /// 连接出现在哪些房间（不变式：至多一个）
    pub fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        self.rooms
            .read()
            .expect("rooms lock")
            .iter()
            .filter(|(_, members)| members.contains_key(&connection_id))
            .map(|(room_id, _)| *room_id)
            .collect()
    }
}
