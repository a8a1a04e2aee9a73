use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use fs3::FileExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{BlockError, BlockStore, check_index, check_len};

/// Name of the block file created inside the data directory.
pub const BLOCK_FILE_NAME: &str = "blocks.dat";

/// Block store backed by a preallocated file or a raw block device.
///
/// The backing file is locked exclusively while the store is open.
#[derive(Debug)]
pub struct FileBlocks {
    kind: &'static str,
    path: PathBuf,
    file: Mutex<Option<File>>,
    block_size: u64,
    num_blocks: u64,
}

impl FileBlocks {
    /// Open (creating if needed) `blocks.dat` in `data_dir`, sized to hold as
    /// many blocks as fit in `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails if not even one block fits, the file cannot be created, another
    /// process holds it, or the existing file is larger than `size` allows.
    pub async fn open(data_dir: &Path, size: u64, block_size: u64) -> Result<Self, BlockError> {
        let num_blocks = size.checked_div(block_size).unwrap_or(0);
        if num_blocks == 0 {
            return Err(BlockError::TooSmall { size, block_size });
        }

        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| BlockError::Io("error creating data directory", e))?;

        let path = data_dir.join(BLOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| BlockError::Io("error opening block file", e))?;
        let file = lock(file, &path).await?;

        let requested = num_blocks * block_size;
        let existing = file
            .metadata()
            .await
            .map_err(|e| BlockError::Io("error reading block file metadata", e))?
            .len();
        if existing > requested {
            return Err(BlockError::WouldShrink {
                path: path.display().to_string(),
                existing,
                requested,
            });
        }
        file.set_len(requested)
            .await
            .map_err(|e| BlockError::Io("error sizing block file", e))?;

        info!(
            "opened block file {} with {} blocks of {} bytes",
            path.display(),
            num_blocks,
            block_size
        );

        Ok(Self {
            kind: "file",
            path,
            file: Mutex::new(Some(file)),
            block_size,
            num_blocks,
        })
    }

    /// Open an existing raw block device. Capacity is the device size.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot be opened, is locked, or is smaller than a block.
    pub async fn open_device(path: &Path, block_size: u64) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| BlockError::Io("error opening block device", e))?;
        let mut file = lock(file, path).await?;

        let size = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| BlockError::Io("error sizing block device", e))?;
        let num_blocks = size.checked_div(block_size).unwrap_or(0);
        if num_blocks == 0 {
            return Err(BlockError::TooSmall { size, block_size });
        }

        info!(
            "opened block device {} with {} blocks of {} bytes",
            path.display(),
            num_blocks,
            block_size
        );

        Ok(Self {
            kind: "device",
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            block_size,
            num_blocks,
        })
    }

    /// Path of the backing file or device.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn lock(file: File, path: &Path) -> Result<File, BlockError> {
    let file = file.into_std().await;
    FileExt::try_lock_exclusive(&file)
        .map_err(|_| BlockError::Locked(path.display().to_string()))?;
    Ok(File::from_std(file))
}

#[async_trait]
impl BlockStore for FileBlocks {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    async fn read_block(&self, index: u64) -> Result<Bytes, BlockError> {
        check_index(index, self.num_blocks)?;

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(BlockError::Closed)?;

        file.seek(SeekFrom::Start(index * self.block_size))
            .await
            .map_err(|e| BlockError::Io("error seeking block", e))?;

        #[allow(clippy::cast_possible_truncation)]
        let mut buf = vec![0u8; self.block_size as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| BlockError::Io("error reading block", e))?;

        Ok(Bytes::from(buf))
    }

    async fn write_block(&self, index: u64, data: Bytes) -> Result<(), BlockError> {
        check_index(index, self.num_blocks)?;
        check_len(&data, self.block_size)?;

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(BlockError::Closed)?;

        file.seek(SeekFrom::Start(index * self.block_size))
            .await
            .map_err(|e| BlockError::Io("error seeking block", e))?;
        file.write_all(&data)
            .await
            .map_err(|e| BlockError::Io("error writing block", e))?;
        file.flush()
            .await
            .map_err(|e| BlockError::Io("error writing block", e))
    }

    async fn flush(&self) -> Result<(), BlockError> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(BlockError::Closed)?;
        file.sync_data()
            .await
            .map_err(|e| BlockError::Io("error syncing blocks", e))
    }

    async fn close(&self) -> Result<(), BlockError> {
        let file = self.file.lock().await.take().ok_or(BlockError::Closed)?;
        file.sync_all()
            .await
            .map_err(|e| BlockError::Io("error syncing blocks", e))?;
        debug!("closed {} store at {}", self.kind, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let data = Bytes::from(vec![7u8; 512]);

        let store = FileBlocks::open(dir.path(), 8 * 512, 512).await.unwrap();
        assert_eq!(store.num_blocks(), 8);
        assert_eq!(store.kind(), "file");
        store.write_block(5, data.clone()).await.unwrap();
        store.close().await.unwrap();

        let reopened = FileBlocks::open(dir.path(), 8 * 512, 512).await.unwrap();
        assert_eq!(reopened.read_block(5).await.unwrap(), data);
        assert_eq!(
            reopened.read_block(4).await.unwrap(),
            Bytes::from(vec![0u8; 512])
        );
    }

    #[tokio::test]
    async fn test_smaller_size_does_not_truncate() {
        let dir = tempdir().unwrap();
        let data = Bytes::from(vec![9u8; 512]);

        let store = FileBlocks::open(dir.path(), 8 * 512, 512).await.unwrap();
        store.write_block(7, data.clone()).await.unwrap();
        store.close().await.unwrap();

        let err = FileBlocks::open(dir.path(), 4 * 512, 512).await.unwrap_err();
        assert!(
            matches!(
                err,
                BlockError::WouldShrink {
                    existing: 4096,
                    requested: 2048,
                    ..
                }
            ),
            "{err:?}"
        );

        // The refused open released its lock and left the file alone.
        let reopened = FileBlocks::open(dir.path(), 8 * 512, 512).await.unwrap();
        assert_eq!(reopened.read_block(7).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_larger_size_grows_file() {
        let dir = tempdir().unwrap();
        let data = Bytes::from(vec![3u8; 512]);

        let store = FileBlocks::open(dir.path(), 4 * 512, 512).await.unwrap();
        store.write_block(3, data.clone()).await.unwrap();
        store.close().await.unwrap();

        let grown = FileBlocks::open(dir.path(), 8 * 512, 512).await.unwrap();
        assert_eq!(grown.num_blocks(), 8);
        assert_eq!(grown.read_block(3).await.unwrap(), data);
        assert_eq!(
            grown.read_block(7).await.unwrap(),
            Bytes::from(vec![0u8; 512])
        );
    }

    #[tokio::test]
    async fn test_file_store_is_exclusive() {
        let dir = tempdir().unwrap();
        let _store = FileBlocks::open(dir.path(), 4 * 512, 512).await.unwrap();

        let err = FileBlocks::open(dir.path(), 4 * 512, 512).await.unwrap_err();
        assert!(matches!(err, BlockError::Locked(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_device_capacity_comes_from_device() {
        let dir = tempdir().unwrap();
        let device = dir.path().join("disk.img");
        std::fs::File::create(&device)
            .unwrap()
            .set_len(16 * 4096 + 100)
            .unwrap();

        let store = FileBlocks::open_device(&device, 4096).await.unwrap();
        assert_eq!(store.kind(), "device");
        assert_eq!(store.num_blocks(), 16);
        assert_eq!(store.path(), device.as_path());

        let data = Bytes::from(vec![1u8; 4096]);
        store.write_block(15, data.clone()).await.unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.read_block(15).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_missing_device() {
        let dir = tempdir().unwrap();
        let err = FileBlocks::open_device(&dir.path().join("nope"), 4096)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockError::Io(..)));
    }

    #[tokio::test]
    async fn test_closed_file_store() {
        let dir = tempdir().unwrap();
        let store = FileBlocks::open(dir.path(), 4 * 512, 512).await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.read_block(0).await, Err(BlockError::Closed)));
        assert!(matches!(store.close().await, Err(BlockError::Closed)));
    }
}
