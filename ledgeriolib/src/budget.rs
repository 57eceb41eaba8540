//! Бюджет воркеров по размеру входа.

use std::num::NonZeroUsize;

use serde::Serialize;

use crate::config::EngineConfig;

/// Сколько воркеров задача (или пакет) может занять одновременно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkerBudget(NonZeroUsize);

impl WorkerBudget {
    pub const ONE: Self = Self(NonZeroUsize::MIN);

    /// Ноль поднимается до единицы.
    pub fn new(workers: usize) -> Self {
        Self(NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Накопление и валидация могут идти параллельно.
    pub fn allows_concurrent_validation(self) -> bool {
        self.get() >= 2
    }
}

impl std::fmt::Display for WorkerBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Как читается раздел проводок.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    /// Документ целиком читается в память.
    Buffered,
    /// Документ читается из источника порциями.
    Streaming,
}

impl IngestionMode {
    /// Тяжёлые документы всегда читаются потоково.
    pub fn choose(config: &EngineConfig, size_bytes: u64) -> Self {
        if config.streaming_enabled || size_bytes >= config.size_threshold_bytes {
            Self::Streaming
        } else {
            Self::Buffered
        }
    }
}

/// Политика воркеров по размеру. Чистая: одинаковый вход даёт одинаковый бюджет.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    pub size_threshold_bytes: u64,
    pub batch_total_threshold_bytes: u64,
    pub default_workers: usize,
    pub clamped_workers: usize,
    pub heavy_parallel_workers: usize,
    pub default_batch_workers: usize,
    pub heavy_parallel: bool,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl BudgetPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            size_threshold_bytes: config.size_threshold_bytes,
            batch_total_threshold_bytes: config.batch_total_threshold_bytes,
            default_workers: config.default_workers,
            clamped_workers: config.clamped_workers,
            heavy_parallel_workers: config.heavy_parallel_workers,
            default_batch_workers: config.default_batch_workers,
            heavy_parallel: config.heavy_parallel,
        }
    }

    pub fn is_heavy(&self, size_bytes: u64) -> bool {
        size_bytes >= self.size_threshold_bytes
    }

    /// Бюджет для одного документа размером `size_bytes`.
    pub fn plan(&self, size_bytes: u64) -> WorkerBudget {
        let workers = match (self.is_heavy(size_bytes), self.heavy_parallel) {
            (false, _) => self.default_workers,
            (true, false) => self.clamped_workers,
            (true, true) => self.heavy_parallel_workers,
        };
        WorkerBudget::new(workers)
    }

    /// Бюджет для импорта нескольких документов сразу.
    pub fn plan_batch(&self, sizes: &[u64]) -> WorkerBudget {
        let count = sizes.len().max(1);
        let mut workers = count.min(self.default_batch_workers);
        if !self.heavy_parallel {
            let heavy = sizes.iter().filter(|s| self.is_heavy(**s)).count();
            let total: u64 = sizes.iter().fold(0u64, |acc, s| acc.saturating_add(*s));
            if heavy >= 2 || total >= self.batch_total_threshold_bytes {
                workers = workers.min(self.clamped_workers);
            }
        }
        WorkerBudget::new(workers)
    }
}
