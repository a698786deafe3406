/// Versions of one partition to delete.
///
/// `versions` must be ascending and unique. The most recent `keep_recent`
/// versions are always kept, as is anything newer than `latest - keep_recent`;
/// when `keep_every` is set, older multiples of it survive as sparse
/// checkpoints. A target at or below zero means there is nothing to prune.
pub fn prune_set(versions: &[u64], keep_recent: u64, keep_every: Option<u64>) -> Vec<u64> {
    let Some(&latest) = versions.last() else {
        return Vec::new();
    };
    let Some(target) = latest.checked_sub(keep_recent) else {
        return Vec::new();
    };
    let window_start = versions.len().saturating_sub(usize::try_from(keep_recent).unwrap_or(usize::MAX));
    let keep_every = keep_every.filter(|m| *m > 0);

    versions[..window_start]
        .iter()
        .copied()
        .filter(|v| *v <= target)
        .filter(|v| keep_every.map_or(true, |m| v % m != 0))
        .collect()
}
