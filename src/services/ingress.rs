//! Streaming ingress guard.
//!
//! Wraps a request body stream and aborts the moment the running byte total
//! exceeds the configured ceiling. The payload is never buffered whole: the
//! guard sits between the network and the storage write path, so an
//! oversized upload is cut off mid-stream and its partial temp file is
//! discarded by the store.

use crate::errors::AssetError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;

const OVERSIZE_MARKER: &str = "ingress ceiling exceeded";

/// Wrap `stream` so it errors as soon as more than `ceiling` bytes pass.
///
/// The error surfaces through the storage path as `io::Error`; use
/// [`oversize_to_asset_error`] at the boundary to turn it back into the
/// structured `PayloadTooLarge`.
pub fn enforce_ceiling<S>(stream: S, ceiling: i64) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut total: i64 = 0;
    stream.map(move |chunk_res| {
        let chunk = chunk_res?;
        total += chunk.len() as i64;
        if total > ceiling {
            Err(io::Error::new(io::ErrorKind::InvalidData, OVERSIZE_MARKER))
        } else {
            Ok(chunk)
        }
    })
}

/// Map an ingress-guard abort back to `PayloadTooLarge`; other errors pass
/// through unchanged.
pub fn oversize_to_asset_error(err: AssetError, limit: i64) -> AssetError {
    match err {
        AssetError::Io(ref io_err)
            if io_err.kind() == io::ErrorKind::InvalidData
                && io_err.to_string().contains(OVERSIZE_MARKER) =>
        {
            AssetError::PayloadTooLarge { limit }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn payload_at_the_ceiling_passes() {
        let guarded = enforce_ceiling(chunks(vec![b"1234", b"5678"]), 8);
        let collected: Vec<_> = guarded.collect().await;
        assert!(collected.iter().all(|c| c.is_ok()));
    }

    #[tokio::test]
    async fn one_byte_over_aborts_mid_stream() {
        // 9 bytes against a ceiling of 8: the second chunk must fail and the
        // third must never be needed to detect it.
        let guarded = enforce_ceiling(chunks(vec![b"12345", b"6789", b"never"]), 8);
        futures::pin_mut!(guarded);

        assert!(guarded.next().await.unwrap().is_ok());
        let err = guarded.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mapped = oversize_to_asset_error(AssetError::Io(err), 8);
        assert!(matches!(mapped, AssetError::PayloadTooLarge { limit: 8 }));
    }

    #[tokio::test]
    async fn unrelated_io_errors_pass_through() {
        let err = AssetError::Io(io::Error::other("disk on fire"));
        assert!(matches!(
            oversize_to_asset_error(err, 8),
            AssetError::Io(_)
        ));
    }
}
