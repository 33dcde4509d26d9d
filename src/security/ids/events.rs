//! Security Event Distribution
//!
//! コールバック購読者への同期通知と、非同期受信用のブロードキャストチャネル。

use super::types::{SecurityEvent, Severity};
use std::collections::HashSet;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// イベントコールバック
pub type EventCallback = Arc<dyn Fn(&SecurityEvent) + Send + Sync>;

type Registry = RwLock<Vec<(Uuid, EventCallback)>>;

/// イベントバス
///
/// コールバックは登録順に呼び出される。遅れて登録した購読者への再送はない。
pub struct EventBus {
    /// 購読者（登録順）
    subscribers: Arc<Registry>,
    /// ブロードキャスト送信側
    broadcast_tx: broadcast::Sender<SecurityEvent>,
}

impl EventBus {
    /// 新しいイベントバスを作成
    pub fn new(channel_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            broadcast_tx,
        }
    }

    /// コールバックを登録
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&SecurityEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push((id, Arc::new(callback)));

        info!(
            "Created security event subscription: id={}, total={}",
            id,
            subscribers.len()
        );

        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// 購読を解除
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        remove_subscriber(&self.subscribers, id)
    }

    /// 非同期受信用のレシーバー
    pub fn receiver(&self) -> broadcast::Receiver<SecurityEvent> {
        self.broadcast_tx.subscribe()
    }

    /// イベントを配信し、通知したコールバック数を返す
    ///
    /// ロックの外でコールバックを呼ぶため、コールバック内から購読解除できる。
    pub fn publish(&self, event: &SecurityEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &callbacks {
            callback(event);
        }

        // 受信者がいない場合の送信エラーは無視
        let receivers = self.broadcast_tx.send(event.clone()).unwrap_or(0);
        debug!(
            "Published security event {}: {} callbacks, {} receivers",
            event.id,
            callbacks.len(),
            receivers
        );

        callbacks.len()
    }

    /// 登録中のコールバック数
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn remove_subscriber(registry: &Registry, id: Uuid) -> bool {
    let mut subscribers = registry
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let before = subscribers.len();
    subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);

    let removed = subscribers.len() < before;
    if removed {
        info!("Removed security event subscription: id={}", id);
    }
    removed
}

/// 購読ハンドル
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: Uuid,
    registry: Weak<Registry>,
}

impl SubscriptionHandle {
    /// 購読ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 購読を解除（解除済み・バス破棄済みならfalse）
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => remove_subscriber(&registry, self.id),
            None => false,
        }
    }
}

/// 利用者側のイベントビュー
///
/// 非表示にしたイベントはこのビューからのみ消え、モニターのバッファには残る。
#[derive(Debug, Clone, Default)]
pub struct SecurityEventView {
    events: Vec<SecurityEvent>,
    dismissed: HashSet<Uuid>,
}

impl SecurityEventView {
    /// イベントのスナップショットからビューを作成
    pub fn new(events: Vec<SecurityEvent>) -> Self {
        Self {
            events,
            dismissed: HashSet::new(),
        }
    }

    /// 新しいスナップショットに更新（非表示状態は維持）
    pub fn refresh(&mut self, events: Vec<SecurityEvent>) {
        self.events = events;
        let present: HashSet<Uuid> = self.events.iter().map(|e| e.id).collect();
        self.dismissed.retain(|id| present.contains(id));
    }

    /// イベントを非表示にする
    pub fn dismiss(&mut self, id: Uuid) -> bool {
        if self.events.iter().any(|e| e.id == id) {
            self.dismissed.insert(id)
        } else {
            false
        }
    }

    /// 表示中のイベント
    pub fn visible(&self) -> impl Iterator<Item = &SecurityEvent> {
        self.events
            .iter()
            .filter(move |e| !self.dismissed.contains(&e.id))
    }

    /// 指定した深刻度以上の表示中イベント
    pub fn at_least(&self, severity: Severity) -> Vec<&SecurityEvent> {
        self.visible().filter(|e| e.severity >= severity).collect()
    }

    /// 表示中のイベント数
    pub fn visible_count(&self) -> usize {
        self.visible().count()
    }
}
