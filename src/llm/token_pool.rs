//! Shared pool of API tokens, keyed by model name.
//!
//! Several concurrent sessions calling the same model spread their requests across the
//! tokens of that model. The pool is owned by the driver and handed to every
//! [`ModelAgent`](super::ModelAgent) through an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use rand::{seq::IndexedRandom, Rng};
use tracing::info;

#[derive(Debug, Default)]
struct PoolState {
    tokens: HashMap<String, Vec<String>>,
    next: HashMap<String, usize>,
    usage: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Thread-safe token pool with round-robin and random selection.
#[derive(Debug, Default)]
pub struct TokenPool {
    name: String,
    state: Mutex<PoolState>,
}

impl TokenPool {
    /// Empty pool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::default(),
        }
    }

    /// Load a YAML mapping of model name to token list.
    ///
    /// ```yaml
    /// openai/gpt-4o-mini:
    ///   - sk-first
    ///   - sk-second
    /// ```
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read token pool {}", path.display()))?;
        let tokens: BTreeMap<String, Vec<String>> = serde_yaml::from_str(&text)
            .with_context(|| format!("could not parse token pool {}", path.display()))?;
        let pool = Self::new(path.display().to_string());
        for (model, tokens) in tokens {
            pool.add_tokens(&model, tokens);
        }
        Ok(pool)
    }

    /// Name used in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // the state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `tokens` to the rotation of `model`.
    pub fn add_tokens(&self, model: &str, tokens: impl IntoIterator<Item = String>) {
        let mut state = self.lock();
        let entry = state.tokens.entry(model.to_string()).or_default();
        entry.extend(tokens);
        info!("[{}] model {model} now has {} tokens", self.name, entry.len());
    }

    /// Number of tokens registered for `model`.
    pub fn len(&self, model: &str) -> usize {
        self.lock().tokens.get(model).map_or(0, Vec::len)
    }

    /// Next token for `model` in round-robin order.
    pub fn next_token(&self, model: &str) -> Option<String> {
        let mut state = self.lock();
        let tokens = state.tokens.get(model)?;
        if tokens.is_empty() {
            return None;
        }
        let index = state.next.get(model).copied().unwrap_or(0) % tokens.len();
        let token = tokens[index].clone();
        let following = (index + 1) % tokens.len();
        state.next.insert(model.to_string(), following);
        Self::record(&mut state, model, &token);
        Some(token)
    }

    /// Uniformly random token for `model`.
    pub fn random_token<R: Rng + ?Sized>(&self, model: &str, rng: &mut R) -> Option<String> {
        let mut state = self.lock();
        let token = state.tokens.get(model)?.choose(rng)?.clone();
        Self::record(&mut state, model, &token);
        Some(token)
    }

    fn record(state: &mut PoolState, model: &str, token: &str) {
        *state
            .usage
            .entry(model.to_string())
            .or_default()
            .entry(token.to_string())
            .or_default() += 1;
    }

    /// Number of times each token was handed out, per model.
    pub fn usage_stats(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.lock().usage.clone()
    }

    /// Human-readable usage report with masked tokens.
    pub fn usage_report(&self) -> String {
        let usage = self.usage_stats();
        if usage.is_empty() {
            return format!("[{}] no token used yet", self.name);
        }
        let mut lines = vec![format!("[{}] token usage", self.name)];
        for (model, counts) in usage {
            let total: u64 = counts.values().sum();
            lines.push(format!("{model}: {total} requests"));
            for (token, count) in counts {
                let preview: String = token.chars().take(8).collect();
                let percent = count as f64 * 100.0 / total as f64;
                lines.push(format!("  {preview}...: {count} ({percent:.1}%)"));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_robin() {
        let pool = TokenPool::new("test");
        pool.add_tokens("m", tokens(&["a", "b", "c"]));
        let got = (0..4).filter_map(|_| pool.next_token("m")).collect::<Vec<_>>();
        assert_eq!(got, ["a", "b", "c", "a"]);
        assert_eq!(pool.next_token("unknown"), None);
        assert_eq!(pool.usage_stats()["m"]["a"], 2);
    }

    #[test]
    fn random_selection_is_counted() {
        let pool = TokenPool::new("test");
        pool.add_tokens("m", tokens(&["a", "b"]));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            assert!(pool.random_token("m", &mut rng).is_some());
        }
        let total: u64 = pool.usage_stats()["m"].values().sum();
        assert_eq!(total, 10);
        assert!(pool.usage_report().contains("m: 10 requests"));
    }

    #[test]
    fn shared_between_threads() {
        let pool = Arc::new(TokenPool::new("shared"));
        pool.add_tokens("m", tokens(&["a", "b"]));
        let handles = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        pool.next_token("m");
                    }
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            h.join().unwrap();
        }
        let stats = pool.usage_stats();
        assert_eq!(stats["m"]["a"], 50);
        assert_eq!(stats["m"]["b"], 50);
    }

    #[test]
    fn yaml_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tokens.yaml");
        std::fs::write(&path, "model-a:\n  - t1\n  - t2\nmodel-b: [t3]\n")?;
        let pool = TokenPool::from_yaml_file(&path)?;
        assert_eq!(pool.len("model-a"), 2);
        assert_eq!(pool.next_token("model-b").as_deref(), Some("t3"));
        Ok(())
    }
}
