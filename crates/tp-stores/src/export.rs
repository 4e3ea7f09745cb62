use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
pub(crate) fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Join fields into one CSV record (no trailing newline).
pub(crate) fn csv_record<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| csv_escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}
