//! 限流状态存储
//!
//! 以 [`LimiterKey`] 为键保存各限流器的可变状态。状态在第一次命中时惰性创建，
//! 创建过程是原子的（同一个键在并发首次访问时只会创建一个状态对象）。
//!
//! 状态一旦创建就与限流器同生命周期，只能通过 [`StateStore::evict`] 显式移除。

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 限流作用域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// 所有匹配请求共享一个状态
    #[default]
    Global,
    /// 按目标主机划分状态
    PerHost,
}

impl LimitScope {
    /// 根据作用域生成状态键
    pub fn key_for(&self, host: &str) -> LimiterKey {
        match self {
            LimitScope::Global => LimiterKey::Global,
            LimitScope::PerHost => LimiterKey::Host(host.to_lowercase()),
        }
    }
}

/// 状态键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LimiterKey {
    /// 全局哨兵键
    Global,
    /// 小写主机名（可能带端口）
    Host(String),
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterKey::Global => write!(f, "<global>"),
            LimiterKey::Host(host) => write!(f, "{}", host),
        }
    }
}

/// 并发安全的状态存储
///
/// 读路径只持有分片读锁，创建路径通过 `entry` API 原子插入。
pub struct StateStore<S> {
    states: DashMap<LimiterKey, Arc<S>>,
}

impl<S> StateStore<S> {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// 获取或创建状态
    ///
    /// `init` 只会在键不存在时被调用一次，且不能访问本存储。
    pub fn get_or_create<F>(&self, key: LimiterKey, init: F) -> Arc<S>
    where
        F: FnOnce() -> S,
    {
        if let Some(state) = self.states.get(&key) {
            return Arc::clone(state.value());
        }

        Arc::clone(
            self.states
                .entry(key)
                .or_insert_with(|| Arc::new(init()))
                .value(),
        )
    }

    /// 获取已存在的状态
    pub fn get(&self, key: &LimiterKey) -> Option<Arc<S>> {
        self.states.get(key).map(|state| Arc::clone(state.value()))
    }

    /// 显式移除状态（外部淘汰钩子）
    pub fn evict(&self, key: &LimiterKey) -> Option<Arc<S>> {
        self.states.remove(key).map(|(_, state)| state)
    }

    /// 遍历所有状态
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&LimiterKey, &S),
    {
        for entry in self.states.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// 当前所有键
    pub fn keys(&self) -> Vec<LimiterKey> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 状态数量
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// 清空所有状态
    pub fn clear(&self) {
        self.states.clear();
    }
}

impl<S> Default for StateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("keys", &self.keys())
            .finish()
    }
}
