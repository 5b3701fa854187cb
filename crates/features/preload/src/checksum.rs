use crate::error::PreloadError;
use lithium_runtime::ThreadPool;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const CHUNK: usize = 64 * 1024;

/// Streams `path` through SHA-256; returns the lower-case hex digest.
///
/// # Errors
/// Any I/O error opening or reading the file.
pub fn sha256_file(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// [`sha256_file`] on a pool worker; `Ok(None)` when the file does not exist.
///
/// # Errors
/// [`PreloadError::Pool`] if the job cannot run, [`PreloadError::Io`] for other read
/// failures.
pub async fn sha256_on(pool: &ThreadPool, path: PathBuf) -> Result<Option<String>, PreloadError> {
    let display = path.display().to_string();
    match pool.enqueue_async(move || sha256_file(path)).await?.await? {
        Ok(digest) => Ok(Some(digest)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PreloadError::Io { source: e, context: Some(format!("Hashing {display}").into()) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        std::fs::write(&path, "test").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), TEST_DIGEST);
        assert_eq!(sha256_bytes(b"test"), TEST_DIGEST);
    }

    #[test]
    fn large_files_hash_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..CHUNK * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(&data));
    }

    #[tokio::test]
    async fn pool_hashing_reports_missing_files() {
        let pool = ThreadPool::new(1).unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(sha256_on(&pool, dir.path().join("absent")).await.unwrap(), None);

        let path = dir.path().join("t.txt");
        std::fs::write(&path, "test").unwrap();
        assert_eq!(sha256_on(&pool, path).await.unwrap().as_deref(), Some(TEST_DIGEST));
    }

    #[tokio::test]
    async fn pool_hashing_waits_for_a_busy_bounded_queue() {
        let pool = ThreadPool::builder().threads(1).queue_capacity(1).build().unwrap();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        pool.execute(move || {
            let _ = release_rx.recv_timeout(std::time::Duration::from_secs(5));
        })
        .unwrap();
        while pool.active() == 0 {
            std::thread::yield_now();
        }
        pool.execute(|| ()).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            let _ = release_tx.send(());
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        std::fs::write(&path, "test").unwrap();
        let digest = tokio::time::timeout(std::time::Duration::from_secs(3), sha256_on(&pool, path))
            .await
            .expect("hashing stalled behind a full queue")
            .unwrap();
        assert_eq!(digest.as_deref(), Some(TEST_DIGEST));
    }
}
