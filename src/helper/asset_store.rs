use actix_files::NamedFile;
use actix_web::http::header::{
    self, Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue, HeaderValue,
};
use actix_web::{http::StatusCode, HttpRequest, HttpResponse, Responder};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Uploads larger than this are rejected, whatever their kind.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];
const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Avatar,
    Thumbnail,
    Document,
}

impl AssetKind {
    /// Sub-directory of the uploads root holding this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Avatar => "avatars",
            AssetKind::Thumbnail => "thumbnails",
            AssetKind::Document => "documents",
        }
    }

    /// Multipart field the file arrives in.
    pub fn form_field(&self) -> &'static str {
        match self {
            AssetKind::Avatar => "avatar",
            AssetKind::Thumbnail => "thumbnail",
            AssetKind::Document => "document",
        }
    }

    pub fn allowed_mime_types(&self) -> &'static [&'static str] {
        match self {
            AssetKind::Avatar | AssetKind::Thumbnail => IMAGE_TYPES,
            AssetKind::Document => DOCUMENT_TYPES,
        }
    }
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Unsupported file type '{mime}'. Accepted types: {}", .allowed.join(", "))]
    UnsupportedType { mime: String, allowed: &'static [&'static str] },
    #[error("File is too large. Maximum size is {} MB.", .limit / (1024 * 1024))]
    TooLarge { limit: usize },
    #[error("The file no longer exists on the server.")]
    Missing,
    #[error("Invalid file reference.")]
    InvalidKey,
    #[error("File storage error.")]
    Io(#[from] io::Error),
}

impl AssetError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssetError::UnsupportedType { .. } | AssetError::TooLarge { .. } | AssetError::InvalidKey => {
                StatusCode::BAD_REQUEST
            }
            AssetError::Missing => StatusCode::NOT_FOUND,
            AssetError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A file received from a client, held in memory until it is stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Save-as download.
    Attachment,
    /// Rendered in the browser.
    Inline,
}

/// Maps an accepted MIME type to an extension when the client's file name has none.
fn mime_to_safe_extension(mime_type: &str) -> Option<&'static str> {
    let map: BTreeMap<&str, &str> = [
        ("application/msword", "doc"),
        ("application/pdf", "pdf"),
        ("application/vnd.ms-excel", "xls"),
        ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
        ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
        ("image/gif", "gif"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
    ].iter().cloned().collect();

    map.get(mime_type).cloned()
}

fn storage_extension(original_name: &str, mime_type: &str) -> Option<String> {
    let from_name = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    from_name.or_else(|| mime_to_safe_extension(mime_type).map(str::to_string))
}

/// `<uuid v4>[.<ext>]`
fn generate_key(extension: Option<&str>) -> String {
    let id = Uuid::new_v4();
    match extension {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Moves a fully written `.part` file to its final name without ever
/// replacing an existing file. Fails with `AlreadyExists` if the name is taken.
fn publish(part_path: &Path, final_path: &Path) -> io::Result<()> {
    fs::hard_link(part_path, final_path)?;
    if let Err(e) = fs::remove_file(part_path) {
        log::warn!("Could not remove staging file {}: {}", part_path.display(), e);
    }
    Ok(())
}

/// Keys are generated by this module; anything else is refused before it
/// can touch the filesystem.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && !key.starts_with('.')
        && !key.contains("..")
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Uploaded files on local disk, one directory per [`AssetKind`].
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AssetStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn ensure_layout(&self) -> io::Result<()> {
        for kind in [AssetKind::Avatar, AssetKind::Thumbnail, AssetKind::Document] {
            fs::create_dir_all(self.kind_dir(kind))?;
        }
        Ok(())
    }

    /// Checks the type allow-list and the size ceiling.
    pub fn validate(kind: AssetKind, mime_type: &str, size: usize) -> Result<(), AssetError> {
        if !kind.allowed_mime_types().contains(&mime_type) {
            return Err(AssetError::UnsupportedType {
                mime: mime_type.to_string(),
                allowed: kind.allowed_mime_types(),
            });
        }
        if size > MAX_UPLOAD_BYTES {
            return Err(AssetError::TooLarge { limit: MAX_UPLOAD_BYTES });
        }
        Ok(())
    }

    fn path_for(&self, kind: AssetKind, key: &str) -> Result<PathBuf, AssetError> {
        if !is_valid_key(key) {
            return Err(AssetError::InvalidKey);
        }
        Ok(self.kind_dir(kind).join(key))
    }

    /// Persists `file` and returns its storage key. The bytes are flushed to
    /// disk before the key is handed out.
    pub fn store(&self, kind: AssetKind, file: &IncomingFile) -> Result<String, AssetError> {
        Self::validate(kind, &file.mime_type, file.size())?;
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        let extension = storage_extension(&file.original_name, &file.mime_type);

        for _ in 0..5 {
            let key = generate_key(extension.as_deref());
            let final_path = dir.join(&key);
            let part_path = dir.join(format!(".{}.part", key));
            let mut f = match OpenOptions::new().write(true).create_new(true).open(&part_path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            let written = f.write_all(&file.bytes).and_then(|_| f.sync_all());
            drop(f);
            match written.and_then(|_| publish(&part_path, &final_path)) {
                Ok(()) => {
                    log::debug!("Stored {} '{}' as {}", kind.dir_name(), file.original_name, key);
                    return Ok(key);
                }
                Err(e) => {
                    let _ = fs::remove_file(&part_path);
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
        Err(AssetError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate a unique storage key",
        )))
    }

    /// Resolves an existing asset, failing with [`AssetError::Missing`] if
    /// the backing file is gone.
    pub fn locate(&self, kind: AssetKind, key: &str) -> Result<PathBuf, AssetError> {
        let path = self.path_for(kind, key)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(AssetError::Missing)
        }
    }

    /// Opens an asset for transfer. Nothing is counted here; callers account
    /// for the transfer once this succeeds.
    pub async fn open(&self, kind: AssetKind, key: &str) -> Result<NamedFile, AssetError> {
        let path = self.locate(kind, key)?;
        NamedFile::open_async(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AssetError::Missing,
            _ => AssetError::Io(e),
        })
    }

    /// Stores `file`, lets `commit` record the new key, and only then removes
    /// `old_key`. If `commit` fails the new file is discarded and the old
    /// one is left untouched.
    pub fn replace<T, E, F>(
        &self,
        kind: AssetKind,
        old_key: Option<&str>,
        file: &IncomingFile,
        commit: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: From<AssetError>,
    {
        let new_key = self.store(kind, file)?;
        match commit(&new_key) {
            Ok(value) => {
                if let Some(old) = old_key.filter(|old| *old != new_key) {
                    if let Err(e) = self.delete(kind, old) {
                        log::warn!("Failed to remove replaced {} asset {}: {}", kind.dir_name(), old, e);
                    }
                }
                Ok(value)
            }
            Err(e) => {
                self.discard_orphan(kind, &new_key);
                Err(e)
            }
        }
    }

    /// Removes an asset. A file that is already gone counts as removed.
    pub fn delete(&self, kind: AssetKind, key: &str) -> Result<(), AssetError> {
        let path = self.path_for(kind, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("{} asset {} was already missing during deletion.", kind.dir_name(), key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort cleanup of a file whose metadata never got committed.
    pub fn discard_orphan(&self, kind: AssetKind, key: &str) {
        match self.delete(kind, key) {
            Ok(()) => log::warn!("Discarded orphaned {} asset {}", kind.dir_name(), key),
            Err(e) => log::warn!(
                "Orphaned {} asset {} could not be removed and needs manual cleanup: {}",
                kind.dir_name(), key, e
            ),
        }
    }
}

fn content_disposition(disposition: Disposition, file_name: &str) -> ContentDisposition {
    let param = if file_name.is_ascii() {
        DispositionParam::Filename(file_name.replace('"', ""))
    } else {
        DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: file_name.as_bytes().to_vec(),
        })
    };
    ContentDisposition {
        disposition: match disposition {
            Disposition::Attachment => DispositionType::Attachment,
            Disposition::Inline => DispositionType::Inline,
        },
        parameters: vec![param],
    }
}

/// Builds the streamed response for an opened asset, labelled with the
/// original file name and the MIME type recorded at upload. Conditional and
/// `Range` requests are answered by `NamedFile`, so the status may be `304`,
/// `206` or `412` rather than `200`.
pub fn transfer_response(
    file: NamedFile,
    req: &HttpRequest,
    disposition: Disposition,
    file_name: &str,
    mime_type: &str,
) -> HttpResponse {
    let mut res = file
        .set_content_disposition(content_disposition(disposition, file_name))
        .respond_to(req);
    if let Ok(value) = HeaderValue::from_str(mime_type) {
        res.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    res.map_into_boxed_body()
}
