use axum::extract::Multipart;

use cdcr_core::UploadedDocument;

/// Name of the multipart field carrying the documents.
pub const FILES_FIELD: &str = "files";

/// Collect every `files` part of a multipart upload. Other fields are
/// drained and ignored. An upload without any `files` part yields an empty
/// list; the pipeline rejects that as a bad request. A `files` part without
/// a filename is rejected, since documents are stored and served by name.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<Vec<UploadedDocument>, String> {
    let mut docs = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read form field: {}", e))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == FILES_FIELD {
            let filename = match field.file_name() {
                Some(name) if !name.trim().is_empty() => name.to_string(),
                _ => return Err(format!("every '{}' part needs a filename", FILES_FIELD)),
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read file data for {}: {}", filename, e))?
                .to_vec();
            tracing::debug!(file = %filename, bytes = data.len(), "received upload part");
            docs.push(UploadedDocument { filename, data });
        } else {
            // Ignore unknown fields
            let _ = field.bytes().await;
        }
    }

    Ok(docs)
}
