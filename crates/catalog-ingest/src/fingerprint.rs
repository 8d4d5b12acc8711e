//! SHA-256 content fingerprint of a stored file.

use catalog_storage::FileStorage;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::IngestError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of everything `reader` yields, read in fixed-size chunks.
pub async fn fingerprint_reader<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub async fn fingerprint_file(
    storage: &dyn FileStorage,
    storage_key: &str,
) -> Result<String, IngestError> {
    let reader = storage.open(storage_key).await?;
    Ok(fingerprint_reader(reader).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_known_digest() {
        let digest = fingerprint_reader(std::io::Cursor::new(b"abc".to_vec()))
            .await
            .unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn spans_multiple_chunks() {
        let data = vec![b'x'; CHUNK_SIZE * 2 + 17];
        let streamed = fingerprint_reader(std::io::Cursor::new(data.clone()))
            .await
            .unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(&data)));
    }
}
