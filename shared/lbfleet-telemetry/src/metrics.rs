//! Metrics primitives

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simple counter metric
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Simple gauge metric
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
    name: String,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn set(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("sweep_purged");
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("active_agents");
        gauge.set(3);
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.get(), 3);
    }
}
