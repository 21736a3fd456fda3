//! 把文件选择器、目录选择器、拖拽目录树统一成上传条目列表。
//!
//! 目录通过 [`DirectoryReader`] 分批枚举，每个目录必须读到空批次为止再向下遍历。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use bytes::Bytes;
use super::errors::CollectionError;
use super::types::{FileSource, UploadItem};

/// 默认每批返回的目录条目数
const DEFAULT_BATCH_SIZE: usize = 100;

/// 原始文件句柄
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    /// 客户端提供的相对路径（选择整个目录时存在）
    pub relative_path: Option<String>,
    pub source: FileSource,
}

impl RawFile {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime_type: None,
            relative_path: None,
            source: FileSource::Bytes(data),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CollectionError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| CollectionError::io(&display, err))?;
        if !metadata.is_file() {
            return Err(CollectionError::Malformed(format!("{} is not a file", display)));
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CollectionError::Malformed(format!("{} has no file name", display)))?;

        Ok(Self {
            name,
            size: metadata.len(),
            mime_type: mime_guess::from_path(path).first().map(|mime| mime.to_string()),
            relative_path: None,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// 目录树中的一个条目
pub enum Entry {
    File(RawFile),
    Directory {
        name: String,
        reader: Box<dyn DirectoryReader>,
    },
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(file) => f.debug_tuple("File").field(&file.name).finish(),
            Self::Directory { name, .. } => f.debug_struct("Directory").field("name", name).finish(),
        }
    }
}

/// 分批枚举目录内容，返回空批次表示读完
#[async_trait]
pub trait DirectoryReader: Send {
    async fn read_entries(&mut self) -> Result<Vec<Entry>, CollectionError>;
}

/// 本地文件系统目录
pub struct LocalDirectory {
    path: PathBuf,
    batch_size: usize,
    buffered: Option<VecDeque<Entry>>,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            buffered: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn list(path: PathBuf) -> Result<VecDeque<Entry>, CollectionError> {
        let display = path.display().to_string();
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .map_err(|err| CollectionError::io(&display, err))?;

        let mut children = Vec::new();
        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|err| CollectionError::io(&display, err))?
        {
            children.push(child.path());
        }
        // read_dir 顺序不固定
        children.sort();

        let mut entries = VecDeque::with_capacity(children.len());
        for child in children {
            match local_entry(&child).await {
                Ok(entry) => entries.push_back(entry),
                Err(err) => tracing::warn!(path = %child.display(), error = %err, "skipping unreadable entry"),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl DirectoryReader for LocalDirectory {
    async fn read_entries(&mut self) -> Result<Vec<Entry>, CollectionError> {
        if self.buffered.is_none() {
            self.buffered = Some(Self::list(self.path.clone()).await?);
        }

        let Some(buffered) = self.buffered.as_mut() else {
            return Ok(Vec::new());
        };
        let take = self.batch_size.min(buffered.len());
        Ok(buffered.drain(..take).collect())
    }
}

async fn local_entry(path: &Path) -> Result<Entry, CollectionError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| CollectionError::io(path.display().to_string(), err))?;

    if metadata.is_dir() {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CollectionError::Malformed(format!("{} has no name", path.display())))?;
        Ok(Entry::Directory {
            name,
            reader: Box::new(LocalDirectory::new(path)),
        })
    } else {
        Ok(Entry::File(RawFile::from_path(path).await?))
    }
}

/// 文件收集器，没有网络和存储副作用
pub struct FileCollector;

impl FileCollector {
    /// 文件/目录选择器的结果
    ///
    /// 相对路径优先使用客户端提供的路径，其次是 `base_folder/name`，最后是文件名。
    pub fn collect(files: Vec<RawFile>, base_folder: Option<&str>) -> Vec<UploadItem> {
        files
            .into_iter()
            .filter_map(|file| match Self::to_item(file, base_folder) {
                Ok(item) => Some(item),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed file");
                    None
                }
            })
            .collect()
    }

    /// 拖拽的目录树，深度优先
    pub async fn collect_entries(entries: Vec<Entry>) -> Vec<UploadItem> {
        let mut items = Vec::new();
        let mut stack: Vec<(Entry, String)> = entries
            .into_iter()
            .rev()
            .map(|entry| (entry, String::new()))
            .collect();

        while let Some((entry, prefix)) = stack.pop() {
            match entry {
                Entry::File(file) => {
                    let path = join_path(&prefix, &file.name);
                    match Self::to_item(file.with_relative_path(path), None) {
                        Ok(item) => items.push(item),
                        Err(err) => tracing::warn!(error = %err, "skipping malformed entry"),
                    }
                }
                Entry::Directory { name, mut reader } => {
                    let children = match drain(reader.as_mut()).await {
                        Ok(children) => children,
                        Err(err) => {
                            tracing::warn!(directory = %name, error = %err, "skipping unreadable directory");
                            continue;
                        }
                    };

                    let child_prefix = join_path(&prefix, &name);
                    for child in children.into_iter().rev() {
                        stack.push((child, child_prefix.clone()));
                    }
                }
            }
        }

        items
    }

    /// 本地路径：文件直接收集，目录递归遍历
    pub async fn collect_paths(paths: &[PathBuf]) -> Vec<UploadItem> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match local_entry(path).await {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping path"),
            }
        }
        Self::collect_entries(entries).await
    }

    fn to_item(file: RawFile, base_folder: Option<&str>) -> Result<UploadItem, CollectionError> {
        if normalize_path(&file.name).is_empty() {
            return Err(CollectionError::Malformed("file without a name".to_string()));
        }

        let relative_path = file
            .relative_path
            .as_deref()
            .map(normalize_path)
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| match base_folder {
                Some(folder) => join_path(&normalize_path(folder), &file.name),
                None => file.name.clone(),
            });

        let item = UploadItem::new(relative_path, file.size, file.source);
        Ok(match file.mime_type {
            Some(mime) => item.with_mime_type(mime),
            None => item,
        })
    }
}

/// 读到空批次为止
async fn drain(reader: &mut dyn DirectoryReader) -> Result<Vec<Entry>, CollectionError> {
    let mut all = Vec::new();
    loop {
        let batch = reader.read_entries().await?;
        if batch.is_empty() {
            return Ok(all);
        }
        all.extend(batch);
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// 统一分隔符并去掉空段
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
