use crate::error::ApiError;
use crate::helper::asset_store::{AssetError, AssetKind, AssetStore, IncomingFile, MAX_UPLOAD_BYTES};
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::web::BytesMut;
use futures_util::StreamExt;
use std::collections::HashMap;

/// Text parts are capped separately from the file part.
const MAX_TEXT_FIELD_BYTES: usize = 1024 * 1024;

fn malformed(e: MultipartError) -> ApiError {
    ApiError::Validation(format!("Malformed multipart payload: {}", e))
}

/// A parsed multipart request: plain text fields plus at most one file.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    pub file: Option<IncomingFile>,
}

impl UploadForm {
    pub fn insert_text(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), value.to_string());
    }

    /// Trimmed value of a text field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn required(&self, name: &str, label: &str) -> Result<String, ApiError> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Validation(format!("{} is required.", label)))
    }

    /// Only the literal `"true"` is truthy; any other present value is false.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.fields.get(name).map(|v| v.trim() == "true")
    }

    pub fn parse<T: std::str::FromStr<Err = String>>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name).map(|v| v.parse::<T>().map_err(ApiError::Validation)).transpose()
    }

    pub fn id(&self, name: &str) -> Result<Option<i64>, ApiError> {
        self.text(name)
            .map(|v| v.parse::<i64>().map_err(|_| ApiError::Validation(format!("'{}' must be a numeric id.", name))))
            .transpose()
    }
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Option<Vec<u8>>, ApiError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if data.len() + chunk.len() > limit {
            return Ok(None);
        }
        data.extend_from_slice(&chunk);
    }
    Ok(Some(data.to_vec()))
}

/// Reads the whole multipart payload. The file for `kind` is checked against
/// its MIME allow-list before any bytes are buffered, and buffering stops as
/// soon as the size ceiling is crossed.
pub async fn read_upload_form(mut payload: Multipart, kind: AssetKind) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(malformed)?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let file_name = field.content_disposition().get_filename().map(str::to_string);

        if field_name == kind.form_field() {
            if form.file.is_some() {
                return Err(ApiError::Validation("Only one file may be uploaded.".to_string()));
            }
            let mime_type = field.content_type().map(|m| m.essence_str().to_string()).unwrap_or_default();
            let named = file_name.as_deref().map_or(false, |n| !n.is_empty());
            if named {
                AssetStore::validate(kind, &mime_type, 0)?;
            }
            let bytes = read_field(&mut field, MAX_UPLOAD_BYTES)
                .await?
                .ok_or(AssetError::TooLarge { limit: MAX_UPLOAD_BYTES })?;
            if !named && bytes.is_empty() {
                // Browsers send an empty part when no file was chosen.
                continue;
            }
            AssetStore::validate(kind, &mime_type, bytes.len())?;
            form.file = Some(IncomingFile {
                original_name: file_name.unwrap_or_else(|| "upload".to_string()),
                mime_type,
                bytes,
            });
        } else if file_name.is_some() {
            return Err(ApiError::Validation(format!(
                "Unexpected file field '{}'. Files must be sent in '{}'.",
                field_name,
                kind.form_field()
            )));
        } else {
            let bytes = read_field(&mut field, MAX_TEXT_FIELD_BYTES)
                .await?
                .ok_or_else(|| ApiError::Validation(format!("Field '{}' is too long.", field_name)))?;
            let value = String::from_utf8(bytes)
                .map_err(|_| ApiError::Validation("Invalid UTF-8 in form field.".to_string()))?;
            form.insert_text(&field_name, &value);
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentCategory;

    fn form(pairs: &[(&str, &str)]) -> UploadForm {
        UploadForm {
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            file: None,
        }
    }

    #[test]
    fn text_accessors() {
        let f = form(&[("title", "  Budget  "), ("blank", "   "), ("isPublic", "TRUE"), ("isPublished", "true")]);
        assert_eq!(f.text("title"), Some("Budget"));
        assert_eq!(f.text("blank"), None);
        assert_eq!(f.flag("isPublic"), Some(false));
        assert_eq!(f.flag("isPublished"), Some(true));
        assert_eq!(f.flag("missing"), None);
        assert!(f.required("blank", "Title").is_err());
    }

    #[test]
    fn typed_accessors() {
        let f = form(&[("category", "form"), ("departmentId", "7"), ("bad", "x")]);
        assert_eq!(f.parse::<DocumentCategory>("category").unwrap(), Some(DocumentCategory::Form));
        assert_eq!(f.id("departmentId").unwrap(), Some(7));
        assert!(f.id("bad").is_err());
        assert_eq!(f.id("absent").unwrap(), None);
    }
}
