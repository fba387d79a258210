use bytes::Bytes;
use memo_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Generate deterministic test data using a seeded pseudo-random generator
/// Same seed produces same output (reproducible tests)
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Every local backend, paired with the temp dir that must outlive it.
pub async fn backends_under_test() -> Vec<(Arc<dyn ObjectStore>, Option<TempDir>)> {
    let dir = TempDir::new().unwrap();
    let fs = FilesystemBackend::new(dir.path()).await.unwrap();
    let memory: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
    let fs: Arc<dyn ObjectStore> = Arc::new(fs);
    vec![(memory, None), (fs, Some(dir))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
