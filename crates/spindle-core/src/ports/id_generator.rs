//! IdGenerator port - ID 生成の抽象化
//!
//! Task の id は dispatch 順の最後のタイブレーク（作成順）に使うので、
//! ULID の時刻部分は Clock から取る。

use std::sync::Arc;

use ulid::Ulid;

use crate::domain::ids::{Id, IdMarker};
use crate::ports::Clock;

/// IdGenerator は分散システムで使える ID を生成
pub trait IdGenerator: Send + Sync {
    fn next_ulid(&self) -> Ulid;
}

/// 型付き ID を生成するヘルパー
pub fn next_id<T: IdMarker>(ids: &dyn IdGenerator) -> Id<T> {
    Id::from_ulid(ids.next_ulid())
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// 同じミリ秒内でも単調増加になるよう、前回値より大きい値を返します。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    last: std::sync::Mutex<Option<Ulid>>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: std::sync::Mutex::new(None),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let fresh = Ulid::from_parts(timestamp_ms, rand::random());

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if prev >= fresh => prev.increment().unwrap_or(fresh),
            _ => fresh,
        };
        *last = Some(next);
        next
    }
}
