use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    domain::{Partition, ResultRecord},
    errors::Error,
    ports::ResultSink,
    Result,
};

/// Two UTF-8 text files, one line per record. Files are created if missing
/// and only ever appended to.
pub struct FileResultSink {
    channels_path: PathBuf,
    chats_path: PathBuf,
    channels: Mutex<File>,
    chats: Mutex<File>,
}

impl FileResultSink {
    pub fn open(channels_path: &Path, chats_path: &Path) -> Result<Self> {
        Ok(Self {
            channels: Mutex::new(open_append(channels_path)?),
            chats: Mutex::new(open_append(chats_path)?),
            channels_path: channels_path.to_path_buf(),
            chats_path: chats_path.to_path_buf(),
        })
    }

    pub fn path(&self, partition: Partition) -> &Path {
        match partition {
            Partition::Channels => &self.channels_path,
            Partition::Chats => &self.chats_path,
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

impl ResultSink for FileResultSink {
    fn append(&self, partition: Partition, record: &ResultRecord) -> Result<()> {
        let file = match partition {
            Partition::Channels => &self.channels,
            Partition::Chats => &self.chats,
        };
        let mut f = file
            .lock()
            .map_err(|_| Error::External("result sink lock poisoned".to_string()))?;
        writeln!(f, "{record}")?;
        f.flush()?;
        Ok(())
    }
}
