//! Benchmark utilities.

use dbsync_core::Row;
use rand::seq::SliceRandom;
use rand::Rng;

/// Creation statement of the benchmark table.
pub const SCHEMA: &str = "CREATE TABLE processes (
    pid INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    cmd TEXT,
    rss INTEGER,
    cpu REAL
);";

/// Generate a random process row.
pub fn random_process(pid: i64) -> Row {
    let mut rng = rand::thread_rng();
    let name: String = (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    Row::new()
        .with("pid", pid)
        .with("cmd", format!("/usr/bin/{name} --daemon"))
        .with("name", name)
        .with("rss", rng.gen_range(1_000..10_000_000_i64))
        .with("cpu", rng.gen_range(0.0_f64..100.0))
}

/// Generate a snapshot of `count` processes.
pub fn generate_snapshot(count: usize) -> Vec<Row> {
    (0..count as i64).map(random_process).collect()
}

/// Derive the next snapshot: a fraction `churn` of rows is modified, the
/// same number removed and the same number added.
pub fn next_snapshot(previous: &[Row], churn: f64) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let changed = (previous.len() as f64 * churn) as usize;

    let mut next: Vec<Row> = previous.to_vec();
    next.shuffle(&mut rng);
    next.truncate(next.len().saturating_sub(changed));
    for row in next.iter_mut().take(changed) {
        row.insert("cpu", rng.gen_range(0.0_f64..100.0));
    }

    let base = previous.len() as i64 * 2;
    next.extend((0..changed as i64).map(|i| random_process(base + i)));
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_snapshot_keeps_size() {
        let first = generate_snapshot(100);
        let second = next_snapshot(&first, 0.1);
        assert_eq!(second.len(), 100);
    }
}
