//! Side-channel buffer interchange with the decryption module
//!
//! Some DRMs exchange large buffers with the CDM through shared memory
//! rather than inline. The trait encodes a payload into a small descriptor
//! the CDM can dereference, and decodes descriptors coming back.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Buffer interchange contract used by helpers that need a side channel
pub trait MemorySystem: Send + Sync {
    /// Encode `data` for transmission; returns the descriptor bytes
    fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decode a descriptor produced by [`MemorySystem::encode`]
    fn decode(&self, descriptor: &[u8]) -> io::Result<Vec<u8>>;
}

#[derive(Serialize, Deserialize)]
struct InterchangeDescriptor {
    path: PathBuf,
    size: usize,
}

/// File-backed interchange: payloads are parked in the system temp
/// directory and passed by path + size
pub struct FileInterchange {
    tag: String,
    counter: AtomicU64,
}

impl FileInterchange {
    /// Create an interchange namespace under `tag`
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            counter: AtomicU64::new(0),
        }
    }
}

impl MemorySystem for FileInterchange {
    fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "flux-{}-{}-{}.bin",
            self.tag,
            std::process::id(),
            seq
        ));
        std::fs::write(&path, data)?;
        debug!(path = %path.display(), size = data.len(), "interchange buffer parked");
        let descriptor = InterchangeDescriptor {
            path,
            size: data.len(),
        };
        serde_json::to_vec(&descriptor).map_err(io::Error::other)
    }

    fn decode(&self, descriptor: &[u8]) -> io::Result<Vec<u8>> {
        let descriptor: InterchangeDescriptor =
            serde_json::from_slice(descriptor).map_err(io::Error::other)?;
        let data = std::fs::read(&descriptor.path)?;
        if data.len() != descriptor.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "interchange buffer size mismatch",
            ));
        }
        // One-shot transfer; the parked file is consumed
        let _ = std::fs::remove_file(&descriptor.path);
        Ok(data)
    }
}
